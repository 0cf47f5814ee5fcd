//! Operations that install tokens obtained outside the refresh path.
//!
//! The relay boots with an empty state. An operator either completes the upstream's
//! authorization-code login ([`TokenManager::start_authorization`] then
//! [`TokenManager::exchange_authorization_code`]), exchanges resource-owner credentials, or
//! seeds a known refresh token. Every operation here serializes on the same flight lock as
//! the refresh path, so a seed never interleaves with a refresh write.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::Rng;
// self
use crate::{
	_prelude::*,
	auth::{TokenSecret, TokenSnapshot, TokenState},
	error::ConfigError,
	exchange::{GrantRequest, TransportErrorMapper},
	http::TokenHttpClient,
	manager::TokenManager,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	provider::{GrantType, ProviderDescriptorError},
};

const STATE_BYTES: usize = 24;

/// Authorization-code handshake metadata returned by [`TokenManager::start_authorization`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthorizationSession {
	/// Opaque state value that must round-trip via the redirect handler.
	pub state: String,
	/// Redirect URI supplied when constructing the authorize URL.
	pub redirect_uri: Url,
	/// Fully-formed authorize URL the operator's browser should be sent to.
	pub authorize_url: Url,
}
impl AuthorizationSession {
	/// Validates the `state` parameter returned by the authorization redirect.
	pub fn validate_state(&self, returned_state: &str) -> Result<()> {
		if returned_state == self.state {
			Ok(())
		} else {
			Err(ConfigError::StateMismatch.into())
		}
	}
}

impl<C, M> TokenManager<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Builds the upstream authorize URL for an operator login.
	///
	/// Requires the descriptor to enable the authorization-code grant and a configured
	/// redirect URI.
	pub fn start_authorization(&self) -> Result<AuthorizationSession> {
		self.ensure_supported(GrantType::AuthorizationCode)?;

		let redirect_uri = self.redirect_uri.clone().ok_or(ConfigError::MissingRedirectUri)?;
		let mut authorize_url = self
			.descriptor
			.endpoints
			.authorization
			.clone()
			.ok_or(ConfigError::from(ProviderDescriptorError::MissingAuthorizationEndpoint))?;
		let state = random_state();

		authorize_url
			.query_pairs_mut()
			.append_pair("response_type", "code")
			.append_pair("client_id", &self.client_id)
			.append_pair("redirect_uri", redirect_uri.as_str())
			.append_pair("state", &state);

		Ok(AuthorizationSession { state, redirect_uri, authorize_url })
	}

	/// Validates `returned_state` against `session` and exchanges `code` for tokens.
	pub async fn exchange_authorization_code(
		&self,
		session: &AuthorizationSession,
		code: &str,
		returned_state: &str,
	) -> Result<TokenSnapshot> {
		session.validate_state(returned_state)?;

		let code = non_empty("code", code)?;

		self.run_exchange(
			FlowKind::AuthorizationCode,
			"exchange_authorization_code",
			GrantRequest::AuthorizationCode { code, redirect_uri: &session.redirect_uri },
		)
		.await
	}

	/// Exchanges an authorization `code` received without a tracked session.
	///
	/// Uses the manager's configured redirect URI; callback handlers that kept the
	/// [`AuthorizationSession`] should prefer [`Self::exchange_authorization_code`].
	pub async fn exchange_code(&self, code: &str) -> Result<TokenSnapshot> {
		let code = non_empty("code", code)?;
		let redirect_uri = self.redirect_uri.as_ref().ok_or(ConfigError::MissingRedirectUri)?;

		self.run_exchange(
			FlowKind::AuthorizationCode,
			"exchange_code",
			GrantRequest::AuthorizationCode { code, redirect_uri },
		)
		.await
	}

	/// Exchanges resource-owner credentials for tokens (`grant_type=password`).
	pub async fn exchange_password(
		&self,
		username: &str,
		password: impl Into<TokenSecret>,
	) -> Result<TokenSnapshot> {
		let username = non_empty("username", username)?;
		let password = password.into();

		if password.is_blank() {
			return Err(ConfigError::MissingParameter { name: "password" }.into());
		}

		self.run_exchange(
			FlowKind::Password,
			"exchange_password",
			GrantRequest::Password { username, password: &password },
		)
		.await
	}

	/// Replaces the held state with tokens obtained elsewhere.
	pub async fn seed(&self, state: TokenState) {
		let mut flight = self.flight.lock().await;

		*self.state.write() = state;

		self.finish_flight(&mut flight, None);
	}

	/// Installs a refresh token and drops any cached access token.
	///
	/// The next [`Self::get_valid_token`] call performs a refresh.
	pub async fn seed_refresh_token(&self, token: impl Into<TokenSecret>) -> Result<()> {
		let token = token.into();

		if token.is_blank() {
			return Err(ConfigError::MissingParameter { name: "refresh_token" }.into());
		}

		self.seed(TokenState::with_refresh_token(token)).await;

		Ok(())
	}

	async fn run_exchange(
		&self,
		kind: FlowKind,
		stage: &'static str,
		grant: GrantRequest<'_>,
	) -> Result<TokenSnapshot> {
		let grant_type = grant.grant_type();

		self.ensure_supported(grant_type)?;

		let span = FlowSpan::new(kind, stage);

		span.instrument(async move {
			let mut flight = self.flight.lock().await;

			obs::record_flow_outcome(kind, FlowOutcome::Attempt);

			let result = self.exchange(grant).await.and_then(|grant| self.next_state(grant, None));

			match result {
				Ok(state) => {
					let snapshot =
						state.snapshot_at(OffsetDateTime::now_utc(), self.safety_margin);

					self.install(kind, state);
					self.finish_flight(&mut flight, None);
					obs::record_flow_outcome(kind, FlowOutcome::Success);

					Ok(snapshot)
				},
				Err(source) => {
					obs::record_flow_outcome(kind, FlowOutcome::Failure);
					obs::exchange_failed(kind, &source);

					Err(Error::ExchangeFailed { grant: grant_type, source })
				},
			}
		})
		.await
	}
}

fn non_empty<'a>(name: &'static str, value: &'a str) -> Result<&'a str> {
	let trimmed = value.trim();

	if trimmed.is_empty() {
		Err(ConfigError::MissingParameter { name }.into())
	} else {
		Ok(trimmed)
	}
}

fn random_state() -> String {
	let mut bytes = [0_u8; STATE_BYTES];

	rand::rng().fill(&mut bytes[..]);

	URL_SAFE_NO_PAD.encode(bytes)
}
