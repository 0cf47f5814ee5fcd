//! Upstream-facing descriptors (data) and strategies (behavior).
//!
//! `descriptor` exposes validated metadata (`ProviderDescriptor`) covering the authorize and
//! token endpoints, supported grant flags, client authentication preferences, and wire quirks
//! (form POST versus query-string GET token requests). `strategy` defines
//! [`ProviderStrategy`], an HTTP-client-agnostic hook used by the manager to augment outgoing
//! token requests and classify upstream failures.

pub mod descriptor;
pub mod strategy;

pub use descriptor::*;
pub use strategy::*;
