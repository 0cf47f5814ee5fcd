//! Relay configuration: client credentials, endpoints, and timing knobs.
//!
//! [`RelayConfig`] is plain data. Build it in code, deserialize it with serde, or read it
//! from the process environment with [`RelayConfig::from_env`]. It is never mutated after the
//! manager is constructed.

// std
use std::time::Duration as StdDuration;
// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	error::ConfigError,
	provider::{ProviderDescriptor, ProviderDescriptorBuilder},
};

/// Environment variable holding the upstream client identifier.
pub const ENV_CLIENT_ID: &str = "MOLONI_CLIENT_ID";
/// Environment variable holding the upstream client secret.
pub const ENV_CLIENT_SECRET: &str = "MOLONI_CLIENT_SECRET";
/// Environment variable holding the redirect URI registered with the upstream.
pub const ENV_CALLBACK_URL: &str = "MOLONI_CALLBACK_URL";
/// Environment variable overriding the authorize endpoint.
pub const ENV_AUTHORIZE_URL: &str = "MOLONI_AUTHORIZE_URL";
/// Environment variable overriding the token endpoint.
pub const ENV_GRANT_URL: &str = "MOLONI_GRANT_URL";
/// Environment variable holding the token request timeout, in seconds.
pub const ENV_TIMEOUT_SECS: &str = "RELAY_TOKEN_TIMEOUT_SECS";
/// Environment variable holding the safety margin, in seconds.
pub const ENV_SAFETY_MARGIN_SECS: &str = "RELAY_TOKEN_SAFETY_MARGIN_SECS";

/// Settings needed to build a [`TokenManager`](crate::manager::TokenManager).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayConfig {
	/// Client identifier issued by the upstream.
	pub client_id: String,
	/// Client secret issued by the upstream.
	pub client_secret: TokenSecret,
	/// Redirect URI for the authorization-code grant.
	#[serde(default)]
	pub redirect_uri: Option<Url>,
	/// Overrides the upstream authorize endpoint.
	#[serde(default)]
	pub authorize_url: Option<Url>,
	/// Overrides the upstream token endpoint.
	#[serde(default)]
	pub token_url: Option<Url>,
	/// Upper bound for a single token endpoint request.
	#[serde(default = "default_request_timeout")]
	pub request_timeout: StdDuration,
	/// Minimum remaining lifetime for a cached access token to be reused.
	#[serde(default = "default_safety_margin")]
	pub safety_margin: Duration,
}
impl RelayConfig {
	/// Default for [`RelayConfig::request_timeout`].
	pub const DEFAULT_REQUEST_TIMEOUT: StdDuration = StdDuration::from_secs(10);
	/// Default for [`RelayConfig::safety_margin`].
	pub const DEFAULT_SAFETY_MARGIN: Duration = Duration::seconds(60);

	/// Creates a configuration for the Moloni endpoints with default timings.
	pub fn new(client_id: impl Into<String>, client_secret: impl Into<TokenSecret>) -> Self {
		Self {
			client_id: client_id.into(),
			client_secret: client_secret.into(),
			redirect_uri: None,
			authorize_url: None,
			token_url: None,
			request_timeout: Self::DEFAULT_REQUEST_TIMEOUT,
			safety_margin: Self::DEFAULT_SAFETY_MARGIN,
		}
	}

	/// Sets the redirect URI.
	pub fn with_redirect_uri(mut self, url: Url) -> Self {
		self.redirect_uri = Some(url);

		self
	}

	/// Overrides the authorize endpoint.
	pub fn with_authorize_url(mut self, url: Url) -> Self {
		self.authorize_url = Some(url);

		self
	}

	/// Overrides the token endpoint.
	pub fn with_token_url(mut self, url: Url) -> Self {
		self.token_url = Some(url);

		self
	}

	/// Overrides the request timeout.
	pub fn with_request_timeout(mut self, timeout: StdDuration) -> Self {
		self.request_timeout = timeout;

		self
	}

	/// Overrides the safety margin.
	pub fn with_safety_margin(mut self, margin: Duration) -> Self {
		self.safety_margin = margin;

		self
	}

	/// Reads the configuration from the process environment.
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_lookup(|name| std::env::var(name).ok())
	}

	/// Reads the configuration through `lookup`, which maps a variable name to its value.
	///
	/// Blank values count as unset. The client id and secret are required; everything else
	/// falls back to the Moloni preset and the default timings.
	pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let get = |name: &'static str| {
			lookup(name).map(|value| value.trim().to_owned()).filter(|value| !value.is_empty())
		};
		let client_id =
			get(ENV_CLIENT_ID).ok_or(ConfigError::MissingOption { name: ENV_CLIENT_ID })?;
		let client_secret =
			get(ENV_CLIENT_SECRET).ok_or(ConfigError::MissingOption { name: ENV_CLIENT_SECRET })?;
		let mut config = Self::new(client_id, client_secret);

		config.redirect_uri =
			get(ENV_CALLBACK_URL).map(|raw| parse_url(ENV_CALLBACK_URL, &raw)).transpose()?;
		config.authorize_url =
			get(ENV_AUTHORIZE_URL).map(|raw| parse_url(ENV_AUTHORIZE_URL, &raw)).transpose()?;
		config.token_url = get(ENV_GRANT_URL).map(|raw| parse_url(ENV_GRANT_URL, &raw)).transpose()?;

		if let Some(raw) = get(ENV_TIMEOUT_SECS) {
			let secs = parse_secs(ENV_TIMEOUT_SECS, &raw)?;

			if secs == 0 {
				return Err(ConfigError::InvalidOption {
					name: ENV_TIMEOUT_SECS,
					reason: "timeout must be at least one second".into(),
				});
			}

			config.request_timeout = StdDuration::from_secs(secs);
		}
		if let Some(raw) = get(ENV_SAFETY_MARGIN_SECS) {
			let secs = parse_secs(ENV_SAFETY_MARGIN_SECS, &raw)?;
			let secs = i64::try_from(secs).map_err(|_| ConfigError::InvalidOption {
				name: ENV_SAFETY_MARGIN_SECS,
				reason: "value is too large".into(),
			})?;

			config.safety_margin = Duration::seconds(secs);
		}

		Ok(config)
	}

	/// Builds the validated provider descriptor, applying endpoint overrides to the Moloni
	/// preset.
	pub fn descriptor(&self) -> Result<ProviderDescriptor, ConfigError> {
		let mut builder = ProviderDescriptorBuilder::moloni()?;

		if let Some(url) = &self.authorize_url {
			builder = builder.authorization_endpoint(url.clone());
		}
		if let Some(url) = &self.token_url {
			builder = builder.token_endpoint(url.clone());
		}

		Ok(builder.build()?)
	}
}

fn default_request_timeout() -> StdDuration {
	RelayConfig::DEFAULT_REQUEST_TIMEOUT
}

fn default_safety_margin() -> Duration {
	RelayConfig::DEFAULT_SAFETY_MARGIN
}

fn parse_url(option: &'static str, raw: &str) -> Result<Url, ConfigError> {
	Url::parse(raw).map_err(|source| ConfigError::InvalidUrl { option, source })
}

fn parse_secs(name: &'static str, raw: &str) -> Result<u64, ConfigError> {
	raw.parse::<u64>().map_err(|e| ConfigError::InvalidOption { name, reason: e.to_string() })
}
