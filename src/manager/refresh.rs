//! Refresh-token orchestration with a single-flight guard.
//!
//! [`TokenManager::get_valid_token`] samples the flight counter, then tries the cached token
//! under a read lock. Callers that miss queue on the flight lock; the first one through runs
//! the `grant_type=refresh_token` exchange, and everyone who queued behind it reuses that
//! outcome (the new token or the same failure) instead of sending another request.

mod metrics;

pub use metrics::RefreshMetrics;

// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	error::ExchangeError,
	exchange::{GrantRequest, TransportErrorMapper},
	http::TokenHttpClient,
	manager::{FlightOutcome, TokenManager},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	provider::GrantType,
};

impl<C, M> TokenManager<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Returns an access token that outlives the safety margin, refreshing it when needed.
	///
	/// - A cached token with more than `safety_margin` left is returned without network I/O.
	/// - Without a refresh token the call fails with [`Error::NoRefreshToken`] and nothing is
	///   sent upstream.
	/// - Otherwise one refresh exchange runs for all concurrent callers. On success the whole
	///   state is replaced (the previous refresh token is kept when the upstream does not rotate
	///   it); on failure the state is untouched and every waiting caller receives
	///   [`Error::RefreshFailed`] with the shared cause.
	///
	/// The manager never retries on its own.
	pub async fn get_valid_token(&self) -> Result<TokenSecret> {
		const KIND: FlowKind = FlowKind::Refresh;

		let observed = self.flight_generation();

		if let Some(token) = self.cached_token() {
			self.refresh_metrics.record_cache_hit();

			return Ok(token);
		}

		let span = FlowSpan::new(KIND, "get_valid_token");

		span.instrument(async move {
			let mut flight = self.flight.lock().await;

			if self.flight_generation() != observed
				&& let Some(outcome) = flight.last_outcome.clone()
			{
				self.refresh_metrics.record_coalesced();

				return outcome.map_err(Error::RefreshFailed);
			}
			// A seed may have landed while this caller was queued.
			if let Some(token) = self.cached_token() {
				self.refresh_metrics.record_cache_hit();

				return Ok(token);
			}

			let refresh_token = self.state.read().refresh_token().cloned();
			let Some(refresh_token) = refresh_token else {
				return Err(Error::NoRefreshToken);
			};

			self.ensure_supported(GrantType::RefreshToken)?;

			let outcome = self.refresh_with(&refresh_token).await;

			self.finish_flight(&mut flight, Some(outcome.clone()));

			outcome.map_err(Error::RefreshFailed)
		})
		.await
	}

	async fn refresh_with(&self, refresh_token: &TokenSecret) -> FlightOutcome {
		const KIND: FlowKind = FlowKind::Refresh;

		self.refresh_metrics.record_attempt();
		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = self
			.exchange(GrantRequest::RefreshToken { refresh_token })
			.await
			.and_then(|grant| self.next_state(grant, Some(refresh_token)))
			.and_then(|state| self.install(KIND, state).ok_or(ExchangeError::EmptyAccessToken));

		match result {
			Ok(token) => {
				self.refresh_metrics.record_success();
				obs::record_flow_outcome(KIND, FlowOutcome::Success);

				Ok(token)
			},
			Err(err) => {
				self.refresh_metrics.record_failure();
				obs::record_flow_outcome(KIND, FlowOutcome::Failure);
				obs::exchange_failed(KIND, &err);

				Err(Arc::new(err))
			},
		}
	}
}
