//! Optional observability hooks for token exchanges.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to run every exchange inside a span named `erp_token_relay.flow` carrying
//!   the `flow` (grant) and `stage` (call site) fields, and to emit events for refresh outcomes.
//!   Events only ever carry token fingerprints.
//! - Enable `metrics` to increment the `erp_token_relay_flow_total` counter for every
//!   attempt/success/failure, labeled by `flow` + `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Token exchanges observed by the relay.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Authorization-code exchange completing an operator login.
	AuthorizationCode,
	/// Refresh-token exchange driven by `get_valid_token`.
	Refresh,
	/// Resource-owner password exchange.
	Password,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::AuthorizationCode => "authorization_code",
			FlowKind::Refresh => "refresh",
			FlowKind::Password => "password",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// An exchange was dispatched to the upstream.
	Attempt,
	/// The exchange produced a new token state.
	Success,
	/// The exchange failed and the state was left untouched.
	Failure,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
