// std
use std::iter::IntoIterator;
// crates.io
use url::Host;
// self
use crate::{
	_prelude::*,
	provider::{
		ClientAuthMethod, GrantType, ProviderDescriptor, ProviderEndpoints, ProviderQuirks,
		SupportedGrants, TokenRequestStyle,
	},
};

const MOLONI_AUTHORIZE_URL: &str = "https://api.moloni.pt/v1/authorize/";
const MOLONI_GRANT_URL: &str = "https://api.moloni.pt/v1/grant/";

/// Errors raised while constructing or validating descriptors.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum ProviderDescriptorError {
	/// Authorization endpoint is required when the Authorization Code grant is enabled.
	#[error("Missing authorization endpoint.")]
	MissingAuthorizationEndpoint,
	/// Token endpoint is mandatory for all grants.
	#[error("Missing token endpoint.")]
	MissingTokenEndpoint,
	/// At least one grant must be supported.
	#[error("Descriptor must enable at least one grant type.")]
	NoSupportedGrants,
	/// Endpoint string could not be parsed.
	#[error("The {endpoint} endpoint is not a valid URL.")]
	InvalidEndpoint {
		/// Which endpoint failed to parse.
		endpoint: &'static str,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Endpoints must use HTTPS unless they point at a loopback host.
	#[error("The {endpoint} endpoint must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Endpoint URL that failed validation.
		url: String,
	},
}

/// Builder for [`ProviderDescriptor`] values.
#[derive(Debug)]
pub struct ProviderDescriptorBuilder {
	/// Identifier for the descriptor being constructed.
	pub id: String,
	/// Optional authorization endpoint (required for the Authorization Code grant).
	pub authorization_endpoint: Option<Url>,
	/// Token endpoint used for every grant.
	pub token_endpoint: Option<Url>,
	/// Grants enabled for the upstream.
	pub supported_grants: SupportedGrants,
	/// Preferred client authentication method for the token endpoint.
	pub preferred_client_auth_method: ClientAuthMethod,
	/// Upstream-specific quirks.
	pub quirks: ProviderQuirks,
}
impl ProviderDescriptorBuilder {
	/// Creates a new builder seeded with the provided identifier.
	pub fn new(id: impl Into<String>) -> Self {
		Self {
			id: id.into(),
			authorization_endpoint: None,
			token_endpoint: None,
			supported_grants: SupportedGrants::default(),
			preferred_client_auth_method: ClientAuthMethod::default(),
			quirks: ProviderQuirks::default(),
		}
	}

	/// Builder preloaded with the Moloni endpoints and grant set.
	///
	/// Moloni expects the client credentials as query parameters of a `GET` against
	/// `https://api.moloni.pt/v1/grant/` and issues rotating refresh tokens.
	pub fn moloni() -> Result<Self, ProviderDescriptorError> {
		let authorization = parse_endpoint("authorization", MOLONI_AUTHORIZE_URL)?;
		let token = parse_endpoint("token", MOLONI_GRANT_URL)?;

		Ok(Self::new("moloni")
			.authorization_endpoint(authorization)
			.token_endpoint(token)
			.support_grants([
				GrantType::AuthorizationCode,
				GrantType::RefreshToken,
				GrantType::Password,
			])
			.preferred_client_auth_method(ClientAuthMethod::ClientSecretPost)
			.quirks(ProviderQuirks { token_request_style: TokenRequestStyle::QueryGet }))
	}

	/// Sets the authorization endpoint.
	pub fn authorization_endpoint(mut self, url: Url) -> Self {
		self.authorization_endpoint = Some(url);

		self
	}

	/// Sets the token endpoint.
	pub fn token_endpoint(mut self, url: Url) -> Self {
		self.token_endpoint = Some(url);

		self
	}

	/// Marks a single grant type as supported.
	pub fn support_grant(mut self, grant: GrantType) -> Self {
		self.supported_grants = self.supported_grants.enable(grant);

		self
	}

	/// Marks multiple grants as supported.
	pub fn support_grants<I>(mut self, grants: I) -> Self
	where
		I: IntoIterator<Item = GrantType>,
	{
		self.supported_grants = grants.into_iter().fold(self.supported_grants, SupportedGrants::enable);

		self
	}

	/// Overrides the preferred client authentication method.
	pub fn preferred_client_auth_method(mut self, method: ClientAuthMethod) -> Self {
		self.preferred_client_auth_method = method;

		self
	}

	/// Overrides the upstream quirks.
	pub fn quirks(mut self, quirks: ProviderQuirks) -> Self {
		self.quirks = quirks;

		self
	}

	/// Consumes the builder and validates the resulting descriptor.
	pub fn build(self) -> Result<ProviderDescriptor, ProviderDescriptorError> {
		let token = self.token_endpoint.ok_or(ProviderDescriptorError::MissingTokenEndpoint)?;
		let endpoints = ProviderEndpoints { authorization: self.authorization_endpoint, token };
		let descriptor = ProviderDescriptor {
			id: self.id,
			endpoints,
			supported_grants: self.supported_grants,
			preferred_client_auth_method: self.preferred_client_auth_method,
			quirks: self.quirks,
		};

		descriptor.validate()?;

		Ok(descriptor)
	}
}

impl ProviderDescriptor {
	/// Validates invariants for the descriptor.
	fn validate(&self) -> Result<(), ProviderDescriptorError> {
		if self.supported_grants.is_empty() {
			return Err(ProviderDescriptorError::NoSupportedGrants);
		}
		if self.supports(GrantType::AuthorizationCode) && self.endpoints.authorization.is_none() {
			return Err(ProviderDescriptorError::MissingAuthorizationEndpoint);
		}

		if let Some(authorization) = self.endpoints.authorization.as_ref() {
			validate_endpoint("authorization", authorization)?;
		}

		validate_endpoint("token", &self.endpoints.token)
	}
}

fn parse_endpoint(name: &'static str, raw: &str) -> Result<Url, ProviderDescriptorError> {
	Url::parse(raw).map_err(|source| ProviderDescriptorError::InvalidEndpoint { endpoint: name, source })
}

fn validate_endpoint(name: &'static str, url: &Url) -> Result<(), ProviderDescriptorError> {
	match url.scheme() {
		"https" => Ok(()),
		"http" if is_loopback(url) => Ok(()),
		_ => Err(ProviderDescriptorError::InsecureEndpoint { endpoint: name, url: url.to_string() }),
	}
}

fn is_loopback(url: &Url) -> bool {
	match url.host() {
		Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
		Some(Host::Ipv4(ip)) => ip.is_loopback(),
		Some(Host::Ipv6(ip)) => ip.is_loopback(),
		None => false,
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn moloni_preset_is_valid() {
		let descriptor = ProviderDescriptor::moloni().expect("Moloni preset should validate.");

		assert_eq!(descriptor.endpoints.token.as_str(), MOLONI_GRANT_URL);
		assert_eq!(
			descriptor.endpoints.authorization.as_ref().map(Url::as_str),
			Some(MOLONI_AUTHORIZE_URL),
		);
		assert!(descriptor.supports(GrantType::RefreshToken));
		assert!(descriptor.supports(GrantType::Password));
		assert_eq!(descriptor.preferred_client_auth_method, ClientAuthMethod::ClientSecretPost);
		assert_eq!(descriptor.quirks.token_request_style, TokenRequestStyle::QueryGet);
	}

	#[test]
	fn loopback_http_is_accepted() {
		for raw in ["http://127.0.0.1:8080/token", "http://localhost/token", "http://[::1]/token"] {
			let url = Url::parse(raw).expect("Loopback fixture should parse.");

			assert!(validate_endpoint("token", &url).is_ok(), "{raw} should be accepted");
		}

		let remote = Url::parse("http://api.example.com/token").expect("Fixture should parse.");

		assert!(matches!(
			validate_endpoint("token", &remote),
			Err(ProviderDescriptorError::InsecureEndpoint { endpoint: "token", .. })
		));
	}
}
