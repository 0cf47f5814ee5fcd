//! Token secrets and the token state model.

pub mod secret;
pub mod state;

pub use secret::*;
pub use state::*;
