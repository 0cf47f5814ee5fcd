//! The token manager: sole owner of the relay's [`TokenState`].
//!
//! Request forwarders hold an `Arc<TokenManager<..>>` and call
//! [`TokenManager::get_valid_token`] before every upstream call. The manager answers from
//! memory while the cached access token outlives the safety margin and otherwise runs a
//! single refresh-token exchange on behalf of every concurrent caller.
//!
//! Two primitives guard the state:
//! - a `parking_lot` read/write lock that is only ever held for a clone or a whole-value swap;
//! - an async mutex that serializes every exchange (refresh, authorization code, password) and
//!   every seed, together with a flight counter that lets waiters reuse the outcome of the
//!   exchange they queued behind.

pub mod authorization;
pub mod refresh;

pub use authorization::*;
pub use refresh::*;

// std
use std::{
	sync::atomic::{AtomicU64, Ordering},
	time::Duration as StdDuration,
};
// self
use crate::{
	_prelude::*,
	auth::{TokenSecret, TokenSnapshot, TokenState, TokenStatus},
	error::{ConfigError, ExchangeError},
	exchange::{self, ClientCredentials, GrantRequest, TokenGrant, TransportErrorMapper},
	http::TokenHttpClient,
	obs::{self, FlowKind},
	provider::{GrantType, ProviderDescriptor, ProviderStrategy},
};
#[cfg(feature = "reqwest")]
use crate::{
	config::RelayConfig, exchange::ReqwestTransportErrorMapper, http::ReqwestHttpClient,
	provider::DefaultProviderStrategy,
};

/// Manager specialized for the crate's default reqwest transport stack.
#[cfg(feature = "reqwest")]
pub type ReqwestTokenManager = TokenManager<ReqwestHttpClient, ReqwestTransportErrorMapper>;

type FlightOutcome = std::result::Result<TokenSecret, Arc<ExchangeError>>;

/// Owns the token state for one upstream client and keeps it fresh.
pub struct TokenManager<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// HTTP client wrapper used for every token endpoint request.
	pub http_client: Arc<C>,
	/// Mapper applied to transport-layer errors before surfacing them to callers.
	pub transport_mapper: Arc<M>,
	/// Upstream endpoints, grants, and wire quirks.
	pub descriptor: ProviderDescriptor,
	/// Strategy responsible for request decoration and error classification.
	pub strategy: Arc<dyn ProviderStrategy>,
	/// Client identifier presented in every grant.
	pub client_id: String,
	/// Redirect URI registered with the upstream for the authorization-code grant.
	pub redirect_uri: Option<Url>,
	/// Minimum remaining lifetime for a cached access token to be handed out.
	pub safety_margin: Duration,
	/// Upper bound for one token endpoint exchange, whatever the transport does.
	pub request_timeout: StdDuration,
	client_secret: TokenSecret,
	refresh_metrics: Arc<RefreshMetrics>,
	state: RwLock<TokenState>,
	flight: AsyncMutex<FlightLog>,
	flights: AtomicU64,
}
impl<C, M> TokenManager<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Safety margin applied unless overridden with [`Self::with_safety_margin`].
	pub const DEFAULT_SAFETY_MARGIN: Duration = Duration::seconds(60);
	/// Exchange bound applied unless overridden with [`Self::with_request_timeout`].
	pub const DEFAULT_REQUEST_TIMEOUT: StdDuration = StdDuration::from_secs(10);

	/// Creates a manager with an empty state that reuses the caller-provided transport + mapper
	/// pair.
	pub fn with_http_client(
		descriptor: ProviderDescriptor,
		strategy: Arc<dyn ProviderStrategy>,
		client_id: impl Into<String>,
		client_secret: impl Into<TokenSecret>,
		http_client: impl Into<Arc<C>>,
		mapper: impl Into<Arc<M>>,
	) -> Self {
		Self {
			http_client: http_client.into(),
			transport_mapper: mapper.into(),
			descriptor,
			strategy,
			client_id: client_id.into(),
			redirect_uri: None,
			safety_margin: Self::DEFAULT_SAFETY_MARGIN,
			request_timeout: Self::DEFAULT_REQUEST_TIMEOUT,
			client_secret: client_secret.into(),
			refresh_metrics: Default::default(),
			state: Default::default(),
			flight: Default::default(),
			flights: AtomicU64::new(0),
		}
	}

	/// Sets the redirect URI used by the authorization-code grant.
	pub fn with_redirect_uri(mut self, redirect_uri: Url) -> Self {
		self.redirect_uri = Some(redirect_uri);

		self
	}

	/// Overrides the safety margin; negative values are clamped to zero.
	pub fn with_safety_margin(mut self, margin: Duration) -> Self {
		self.safety_margin = if margin.is_negative() { Duration::ZERO } else { margin };

		self
	}

	/// Overrides the bound applied to each token endpoint exchange.
	///
	/// An exchange that outlives it fails with [`ExchangeError::Timeout`] and releases the
	/// flight lock.
	pub fn with_request_timeout(mut self, timeout: StdDuration) -> Self {
		self.request_timeout = timeout;

		self
	}

	/// Current lifecycle status of the held token.
	pub fn status(&self) -> TokenStatus {
		self.state.read().status_at(OffsetDateTime::now_utc(), self.safety_margin)
	}

	/// Secret-free view of the held state.
	pub fn snapshot(&self) -> TokenSnapshot {
		self.state.read().snapshot_at(OffsetDateTime::now_utc(), self.safety_margin)
	}

	/// Clone of the held state, secrets included.
	///
	/// Intended for operators that export the refresh token before a planned restart.
	pub fn state(&self) -> TokenState {
		self.state.read().clone()
	}

	/// Shared refresh counters.
	pub fn refresh_metrics(&self) -> Arc<RefreshMetrics> {
		self.refresh_metrics.clone()
	}

	fn cached_token(&self) -> Option<TokenSecret> {
		self.state.read().usable_token_at(OffsetDateTime::now_utc(), self.safety_margin).cloned()
	}

	fn ensure_supported(&self, grant: GrantType) -> Result<()> {
		if self.descriptor.supports(grant) {
			Ok(())
		} else {
			Err(ConfigError::UnsupportedGrant { descriptor: self.descriptor.id.clone(), grant }
				.into())
		}
	}

	async fn exchange(&self, grant: GrantRequest<'_>) -> Result<TokenGrant, ExchangeError> {
		let request = exchange::request_token(
			self.http_client.as_ref(),
			self.transport_mapper.as_ref(),
			&self.descriptor,
			self.strategy.as_ref(),
			ClientCredentials { client_id: &self.client_id, client_secret: &self.client_secret },
			grant,
		);

		tokio::time::timeout(self.request_timeout, request)
			.await
			.unwrap_or(Err(ExchangeError::Timeout))
	}

	/// Builds the state that replaces the current one after a successful exchange.
	fn next_state(
		&self,
		grant: TokenGrant,
		fallback_refresh: Option<&TokenSecret>,
	) -> Result<TokenState, ExchangeError> {
		let refresh_token = grant.refresh_token.or_else(|| fallback_refresh.cloned());

		Ok(TokenState::builder()
			.access_token(grant.access_token)
			.maybe_refresh_token(refresh_token)
			.issued_at(OffsetDateTime::now_utc())
			.expires_in(grant.expires_in)
			.build()?)
	}

	/// Swaps in `state`, emits the success event, and returns its access token.
	fn install(&self, kind: FlowKind, state: TokenState) -> Option<TokenSecret> {
		if let Some(access) = state.access() {
			obs::exchange_succeeded(
				kind,
				&access.secret,
				state.refresh_token(),
				access.expires_at,
			);
		}

		let token = state.access_token().cloned();

		*self.state.write() = state;

		token
	}

	/// Publishes the outcome of an exchange or seed to waiters queued on the flight lock.
	fn finish_flight(&self, flight: &mut FlightLog, outcome: Option<FlightOutcome>) {
		flight.last_outcome = outcome;

		self.flights.fetch_add(1, Ordering::AcqRel);
	}

	fn flight_generation(&self) -> u64 {
		self.flights.load(Ordering::Acquire)
	}
}
#[cfg(feature = "reqwest")]
impl TokenManager<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Builds a reqwest-backed manager from a [`RelayConfig`].
	///
	/// Both the transport and the manager are bounded by `config.request_timeout`; the
	/// transport never follows redirects.
	pub fn from_config(config: &RelayConfig) -> Result<Self> {
		let descriptor = config.descriptor()?;
		let http_client = ReqwestHttpClient::with_timeout(config.request_timeout)?;
		let manager = Self::with_http_client(
			descriptor,
			Arc::new(DefaultProviderStrategy),
			config.client_id.clone(),
			config.client_secret.clone(),
			http_client,
			ReqwestTransportErrorMapper,
		)
		.with_safety_margin(config.safety_margin)
		.with_request_timeout(config.request_timeout);

		Ok(match &config.redirect_uri {
			Some(redirect_uri) => manager.with_redirect_uri(redirect_uri.clone()),
			None => manager,
		})
	}
}
impl<C, M> Debug for TokenManager<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenManager")
			.field("descriptor", &self.descriptor.id)
			.field("client_id", &self.client_id)
			.field("redirect_uri", &self.redirect_uri)
			.field("safety_margin", &self.safety_margin)
			.field("request_timeout", &self.request_timeout)
			.field("state", &self.snapshot())
			.finish()
	}
}

/// Bookkeeping shared by every caller queued on the flight lock.
#[derive(Debug, Default)]
struct FlightLog {
	/// Outcome of the most recent refresh; `None` after a seed or an interactive exchange.
	last_outcome: Option<FlightOutcome>,
}
