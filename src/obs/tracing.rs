// self
use crate::{_prelude::*, auth::TokenSecret, error::ExchangeError, obs::FlowKind};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedFlow<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedFlow<F> = F;

/// A span builder used by token exchanges.
#[derive(Clone, Debug)]
pub struct FlowSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl FlowSpan {
	/// Creates a new span tagged with the provided flow kind + stage.
	pub fn new(kind: FlowKind, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!("erp_token_relay.flow", flow = kind.as_str(), stage);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage);

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedFlow<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// Emits an event for a committed exchange. Only fingerprints leave the process.
pub(crate) fn exchange_succeeded(
	kind: FlowKind,
	access: &TokenSecret,
	refresh: Option<&TokenSecret>,
	expires_at: OffsetDateTime,
) {
	#[cfg(feature = "tracing")]
	{
		let refresh = refresh.map(TokenSecret::fingerprint);

		tracing::info!(
			flow = kind.as_str(),
			access = %access.fingerprint(),
			refresh = refresh.as_deref().unwrap_or("none"),
			%expires_at,
			"token state replaced",
		);
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (kind, access, refresh, expires_at);
	}
}

/// Emits an event for a failed exchange.
pub(crate) fn exchange_failed(kind: FlowKind, err: &ExchangeError) {
	#[cfg(feature = "tracing")]
	{
		tracing::warn!(
			flow = kind.as_str(),
			transient = err.is_transient(),
			status = err.upstream_status(),
			error = %err,
			"token exchange failed",
		);
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (kind, err);
	}
}
