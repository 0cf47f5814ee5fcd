//! Token state held by the manager, its lifecycle status, and builders.

// self
use crate::{_prelude::*, auth::secret::TokenSecret};

/// Lifecycle status of a [`TokenState`] relative to a safety margin.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenStatus {
	/// No access token has been obtained yet.
	Empty,
	/// Access token is present and outlives the safety margin.
	Valid,
	/// Access token is present but expires within the safety margin (or already expired).
	Stale,
}
impl TokenStatus {
	/// Returns a stable label suitable for logs and diagnostics.
	pub const fn as_str(self) -> &'static str {
		match self {
			TokenStatus::Empty => "empty",
			TokenStatus::Valid => "valid",
			TokenStatus::Stale => "stale",
		}
	}
}
impl Display for TokenStatus {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Errors produced by [`TokenStateBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum TokenStateBuilderError {
	/// An expiry was configured without an access token.
	#[error("Expiry was supplied without an access token.")]
	MissingAccessToken,
	/// An access token was configured without an expiry.
	#[error("Expiry must be supplied via expires_at or expires_in.")]
	MissingExpiry,
	/// `issued_at + expires_in` does not fit in the supported date range.
	#[error("The expiry instant exceeds the supported range.")]
	ExpiryOutOfRange,
}

/// Access token together with the instants that bound its lifetime.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
	/// Bearer credential; callers must avoid logging it.
	pub secret: TokenSecret,
	/// Instant the upstream issued the token (as observed locally).
	pub issued_at: OffsetDateTime,
	/// Instant after which the token must be treated as invalid.
	pub expires_at: OffsetDateTime,
}
impl AccessToken {
	/// Remaining lifetime at `now` (negative once expired).
	pub fn remaining_at(&self, now: OffsetDateTime) -> Duration {
		self.expires_at - now
	}

	/// Returns `true` if the token outlives `margin` at `now`.
	pub fn is_usable_at(&self, now: OffsetDateTime, margin: Duration) -> bool {
		self.remaining_at(now) > margin
	}
}
impl Debug for AccessToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AccessToken")
			.field("secret", &"<redacted>")
			.field("issued_at", &self.issued_at)
			.field("expires_at", &self.expires_at)
			.finish()
	}
}

/// The complete token state owned by a [`TokenManager`](crate::manager::TokenManager).
///
/// The access token and its expiry live in one [`AccessToken`] value, so a state can never
/// carry an access token without an expiry. The manager swaps whole `TokenState` values, which
/// keeps the access token, refresh token, and expiry consistent for every reader.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenState {
	access: Option<AccessToken>,
	refresh_token: Option<TokenSecret>,
}
impl TokenState {
	/// Returns an empty state (no access token, no refresh token).
	pub fn empty() -> Self {
		Self::default()
	}

	/// Returns a builder for assembling a populated state.
	pub fn builder() -> TokenStateBuilder {
		TokenStateBuilder::default()
	}

	/// Returns a state that only carries a refresh token.
	pub fn with_refresh_token(token: impl Into<TokenSecret>) -> Self {
		Self { access: None, refresh_token: Some(token.into()) }
	}

	/// Current access token, if any.
	pub fn access(&self) -> Option<&AccessToken> {
		self.access.as_ref()
	}

	/// Current access token secret, if any.
	pub fn access_token(&self) -> Option<&TokenSecret> {
		self.access.as_ref().map(|access| &access.secret)
	}

	/// Current refresh token secret, if any.
	pub fn refresh_token(&self) -> Option<&TokenSecret> {
		self.refresh_token.as_ref()
	}

	/// Expiry instant of the current access token, if any.
	pub fn expires_at(&self) -> Option<OffsetDateTime> {
		self.access.as_ref().map(|access| access.expires_at)
	}

	/// Issued-at instant of the current access token, if any.
	pub fn issued_at(&self) -> Option<OffsetDateTime> {
		self.access.as_ref().map(|access| access.issued_at)
	}

	/// Computes the lifecycle status at `now` for the provided safety margin.
	pub fn status_at(&self, now: OffsetDateTime, margin: Duration) -> TokenStatus {
		match &self.access {
			None => TokenStatus::Empty,
			Some(access) if access.is_usable_at(now, margin) => TokenStatus::Valid,
			Some(_) => TokenStatus::Stale,
		}
	}

	/// Returns the access token when it outlives `margin` at `now`.
	pub fn usable_token_at(&self, now: OffsetDateTime, margin: Duration) -> Option<&TokenSecret> {
		self.access.as_ref().filter(|access| access.is_usable_at(now, margin)).map(|a| &a.secret)
	}

	/// Secret-free view of the state for diagnostics.
	pub fn snapshot_at(&self, now: OffsetDateTime, margin: Duration) -> TokenSnapshot {
		TokenSnapshot {
			status: self.status_at(now, margin),
			has_refresh_token: self.refresh_token.is_some(),
			issued_at: self.issued_at(),
			expires_at: self.expires_at(),
			access_fingerprint: self.access_token().map(TokenSecret::fingerprint),
		}
	}
}
impl Debug for TokenState {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenState")
			.field("access", &self.access)
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.finish()
	}
}

/// Diagnostic view of a [`TokenState`] that never carries secrets.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSnapshot {
	/// Lifecycle status when the snapshot was taken.
	pub status: TokenStatus,
	/// Whether a refresh token is held.
	pub has_refresh_token: bool,
	/// Issued-at instant of the access token, if any.
	pub issued_at: Option<OffsetDateTime>,
	/// Expiry instant of the access token, if any.
	pub expires_at: Option<OffsetDateTime>,
	/// Fingerprint of the access token, if any.
	pub access_fingerprint: Option<String>,
}

/// Builder for [`TokenState`].
#[derive(Clone, Debug, Default)]
pub struct TokenStateBuilder {
	access_token: Option<TokenSecret>,
	refresh_token: Option<TokenSecret>,
	issued_at: Option<OffsetDateTime>,
	expires_at: Option<OffsetDateTime>,
	expires_in: Option<Duration>,
}
impl TokenStateBuilder {
	/// Provides the access token value.
	pub fn access_token(mut self, token: impl Into<TokenSecret>) -> Self {
		self.access_token = Some(token.into());

		self
	}

	/// Provides the refresh token value.
	pub fn refresh_token(mut self, token: impl Into<TokenSecret>) -> Self {
		self.refresh_token = Some(token.into());

		self
	}

	/// Sets the refresh token when one is supplied; leaves it unset otherwise.
	pub fn maybe_refresh_token(mut self, token: Option<TokenSecret>) -> Self {
		self.refresh_token = token;

		self
	}

	/// Sets the issued-at instant.
	pub fn issued_at(mut self, instant: OffsetDateTime) -> Self {
		self.issued_at = Some(instant);

		self
	}

	/// Sets an absolute expiry instant.
	pub fn expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.expires_at = Some(instant);

		self
	}

	/// Sets a lifetime relative to the issued-at instant.
	pub fn expires_in(mut self, duration: Duration) -> Self {
		self.expires_in = Some(duration);

		self
	}

	/// Consumes the builder and produces a [`TokenState`].
	pub fn build(self) -> Result<TokenState, TokenStateBuilderError> {
		let Some(secret) = self.access_token else {
			if self.expires_at.is_some() || self.expires_in.is_some() {
				return Err(TokenStateBuilderError::MissingAccessToken);
			}

			return Ok(TokenState { access: None, refresh_token: self.refresh_token });
		};
		let issued_at = self.issued_at.unwrap_or_else(OffsetDateTime::now_utc);
		let expires_at = match (self.expires_at, self.expires_in) {
			(Some(instant), _) => instant,
			(None, Some(delta)) =>
				issued_at.checked_add(delta).ok_or(TokenStateBuilderError::ExpiryOutOfRange)?,
			(None, None) => return Err(TokenStateBuilderError::MissingExpiry),
		};

		Ok(TokenState {
			access: Some(AccessToken { secret, issued_at, expires_at }),
			refresh_token: self.refresh_token,
		})
	}
}
