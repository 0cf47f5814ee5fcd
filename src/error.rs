//! Relay-level error types shared by the manager, exchanges, and configuration.

// self
use crate::{
	_prelude::*,
	auth::TokenStateBuilderError,
	provider::{GrantType, ProviderDescriptorError, ProviderErrorKind},
};

/// Relay-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// No refresh token is held; the authorization flow must run again.
	#[error("No refresh token is available; re-run the upstream authorization flow.")]
	NoRefreshToken,
	/// The refresh exchange failed; the previous token state is unchanged.
	///
	/// The cause is shared between every caller that waited on the same refresh.
	#[error("Token refresh failed: {0}")]
	RefreshFailed(#[source] Arc<ExchangeError>),
	/// An authorization-code or password exchange failed.
	#[error("The {grant} exchange failed: {source}")]
	ExchangeFailed {
		/// Grant that was attempted.
		grant: GrantType,
		/// Underlying exchange failure.
		#[source]
		source: ExchangeError,
	},
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
}
impl Error {
	/// HTTP status a request forwarder should answer with when this error surfaces.
	///
	/// `401` asks the operator to re-authorize, `502`/`503` report upstream trouble, and `400`
	/// / `500` cover caller and local configuration mistakes.
	pub fn http_status(&self) -> u16 {
		match self {
			Error::NoRefreshToken => 401,
			Error::RefreshFailed(cause) => cause.http_status(),
			Error::ExchangeFailed { source, .. } => match source.kind() {
				Some(ProviderErrorKind::InvalidGrant | ProviderErrorKind::InvalidClient) => 401,
				_ => source.http_status(),
			},
			Error::Config(ConfigError::StateMismatch | ConfigError::MissingParameter { .. }) =>
				400,
			Error::Config(_) => 500,
		}
	}

	/// Returns `true` when retrying the whole operation may succeed without operator action.
	pub fn is_retryable(&self) -> bool {
		match self {
			Error::RefreshFailed(cause) => cause.is_transient(),
			Error::ExchangeFailed { source, .. } => source.is_transient(),
			Error::NoRefreshToken | Error::Config(_) => false,
		}
	}

	/// Returns `true` when the caller must complete the authorization flow again.
	pub fn requires_reauthorization(&self) -> bool {
		matches!(self, Error::NoRefreshToken)
	}
}

/// Failures of a single token endpoint exchange.
#[derive(Debug, ThisError)]
pub enum ExchangeError {
	/// Upstream answered with an error payload.
	#[error("Token endpoint rejected the request ({kind}): {message}.")]
	Rejected {
		/// Classification assigned by the provider strategy.
		kind: ProviderErrorKind,
		/// Upstream-supplied description, or a summary when none was given.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// OAuth `error` code, when the payload carried one.
		oauth_error: Option<String>,
		/// Truncated response body for diagnostics.
		body_preview: Option<String>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// The request exceeded the transport timeout.
	#[error("Request timed out while calling the token endpoint.")]
	Timeout,
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// The token request could not be assembled.
	#[error("Token request could not be built.")]
	Request(#[from] oauth2::http::Error),
	/// Token endpoint responded with JSON that could not be parsed.
	#[error("Token endpoint returned malformed JSON.")]
	TokenResponseParse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Token endpoint response omitted `expires_in`.
	#[error("Token endpoint response is missing expires_in.")]
	MissingExpiresIn,
	/// `expires_in` was a string that is not a finite number.
	#[error("Token endpoint returned a non-numeric expires_in: {value}.")]
	InvalidExpiresIn {
		/// Raw value received from the upstream.
		value: String,
	},
	/// Token endpoint returned an excessively large `expires_in`.
	#[error("The expires_in value exceeds the supported range.")]
	ExpiresInOutOfRange,
	/// Token endpoint returned a non-positive duration.
	#[error("The expires_in value must be positive.")]
	NonPositiveExpiresIn,
	/// Token endpoint returned an empty access token.
	#[error("Token endpoint returned an empty access token.")]
	EmptyAccessToken,
}
impl ExchangeError {
	/// Classification of an upstream rejection, if this is one.
	pub fn kind(&self) -> Option<ProviderErrorKind> {
		match self {
			ExchangeError::Rejected { kind, .. } => Some(*kind),
			_ => None,
		}
	}

	/// HTTP status code reported by the upstream, when one was received.
	pub fn upstream_status(&self) -> Option<u16> {
		match self {
			ExchangeError::Rejected { status, .. }
			| ExchangeError::TokenResponseParse { status, .. } => *status,
			_ => None,
		}
	}

	/// Returns `true` for timeouts, network failures, and rejections classified as transient.
	pub fn is_transient(&self) -> bool {
		matches!(
			self,
			ExchangeError::Timeout
				| ExchangeError::Transport(_)
				| ExchangeError::Rejected { kind: ProviderErrorKind::Transient, .. }
		)
	}

	/// `503` when the upstream is unreachable or temporarily failing, `502` when it answered
	/// with something unusable.
	pub fn http_status(&self) -> u16 {
		if self.is_transient() { 503 } else { 502 }
	}
}
impl From<TokenStateBuilderError> for ExchangeError {
	fn from(e: TokenStateBuilderError) -> Self {
		match e {
			TokenStateBuilderError::ExpiryOutOfRange => ExchangeError::ExpiresInOutOfRange,
			TokenStateBuilderError::MissingExpiry | TokenStateBuilderError::MissingAccessToken =>
				ExchangeError::MissingExpiresIn,
		}
	}
}

/// Configuration and validation failures raised by the relay.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// Provider descriptor failed validation.
	#[error("Provider descriptor is invalid.")]
	InvalidDescriptor(#[from] ProviderDescriptorError),
	/// A configured URL cannot be parsed.
	#[error("Option `{option}` is not a valid URL.")]
	InvalidUrl {
		/// Option or environment variable name.
		option: &'static str,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// A required configuration option is missing or blank.
	#[error("Required option `{name}` is missing.")]
	MissingOption {
		/// Option or environment variable name.
		name: &'static str,
	},
	/// A configuration option holds an unusable value.
	#[error("Option `{name}` is invalid: {reason}.")]
	InvalidOption {
		/// Option or environment variable name.
		name: &'static str,
		/// Why the value was rejected.
		reason: String,
	},
	/// The authorization-code leg needs a redirect URI but none was configured.
	#[error("No redirect URI is configured for the authorization-code grant.")]
	MissingRedirectUri,
	/// Descriptor does not enable the requested grant.
	#[error("Descriptor `{descriptor}` does not enable the {grant} grant.")]
	UnsupportedGrant {
		/// Provider identifier string.
		descriptor: String,
		/// Disabled grant.
		grant: GrantType,
	},
	/// A caller-supplied exchange parameter is empty.
	#[error("Parameter `{name}` must not be empty.")]
	MissingParameter {
		/// Parameter name.
		name: &'static str,
	},
	/// The `state` returned by the authorization redirect does not match the session.
	#[error("Authorization state mismatch.")]
	StateMismatch,
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the token endpoint.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the token endpoint.")]
	Io(#[from] std::io::Error),
	/// Transport reported a failure without a structured error.
	#[error("HTTP client error occurred while calling the token endpoint: {message}.")]
	Other {
		/// Transport-supplied message.
		message: String,
	},
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}
