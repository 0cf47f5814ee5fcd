//! Token endpoint requests: parameter assembly, client authentication, and response
//! interpretation.
//!
//! Responses are decoded leniently because the upstream deviates from RFC 6749 in small ways:
//! `token_type` may be missing, `expires_in` may arrive as a numeric string, and some error
//! payloads come back with a `200` status.

// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD};
use oauth2::{
	HttpClientError, HttpRequest, HttpResponse,
	http::{
		Method, Request,
		header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
	},
};
use url::form_urlencoded;
// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	error::{ExchangeError, TransportError},
	http::{ResponseMetadata, TokenHttpClient},
	provider::{
		ClientAuthMethod, GrantType, ProviderDescriptor, ProviderErrorContext, ProviderStrategy,
		TokenRequestStyle,
	},
};

/// Maps HTTP transport failures into [`ExchangeError`] values.
pub trait TransportErrorMapper<E>
where
	Self: 'static + Send + Sync,
	E: 'static + Send + Sync + StdError,
{
	/// Converts an [`HttpClientError`] emitted by the transport into an exchange error.
	fn map_transport_error(&self, grant: GrantType, error: HttpClientError<E>) -> ExchangeError;
}

/// Default mapper for reqwest-backed transports.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransportErrorMapper;
#[cfg(feature = "reqwest")]
impl TransportErrorMapper<ReqwestError> for ReqwestTransportErrorMapper {
	fn map_transport_error(
		&self,
		_grant: GrantType,
		err: HttpClientError<ReqwestError>,
	) -> ExchangeError {
		match err {
			HttpClientError::Reqwest(inner) => map_reqwest_error(*inner),
			HttpClientError::Http(inner) => ExchangeError::Request(inner),
			HttpClientError::Io(inner) => TransportError::Io(inner).into(),
			HttpClientError::Other(message) => TransportError::Other { message }.into(),
			_ => TransportError::Other { message: "unrecognized transport failure".into() }.into(),
		}
	}
}

/// Grant-specific parameters of a token request.
#[derive(Clone, Copy)]
pub(crate) enum GrantRequest<'a> {
	RefreshToken { refresh_token: &'a TokenSecret },
	AuthorizationCode { code: &'a str, redirect_uri: &'a Url },
	Password { username: &'a str, password: &'a TokenSecret },
}
impl GrantRequest<'_> {
	pub(crate) fn grant_type(&self) -> GrantType {
		match self {
			GrantRequest::RefreshToken { .. } => GrantType::RefreshToken,
			GrantRequest::AuthorizationCode { .. } => GrantType::AuthorizationCode,
			GrantRequest::Password { .. } => GrantType::Password,
		}
	}
}

/// Tokens issued by a successful exchange.
#[derive(Clone, Debug)]
pub(crate) struct TokenGrant {
	pub(crate) access_token: TokenSecret,
	pub(crate) refresh_token: Option<TokenSecret>,
	pub(crate) expires_in: Duration,
}

/// Client identity presented to the token endpoint.
#[derive(Clone, Copy)]
pub(crate) struct ClientCredentials<'a> {
	pub(crate) client_id: &'a str,
	pub(crate) client_secret: &'a TokenSecret,
}

/// Sends one token request and interprets the response.
pub(crate) async fn request_token<C, M>(
	http_client: &C,
	mapper: &M,
	descriptor: &ProviderDescriptor,
	strategy: &dyn ProviderStrategy,
	credentials: ClientCredentials<'_>,
	grant: GrantRequest<'_>,
) -> Result<TokenGrant, ExchangeError>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	let grant_type = grant.grant_type();
	let request = build_token_request(descriptor, strategy, credentials, grant)?;
	let response = http_client
		.execute(request)
		.await
		.map_err(|err| mapper.map_transport_error(grant_type, err))?;

	interpret_token_response(strategy, grant_type, &response)
}

pub(crate) fn build_token_request(
	descriptor: &ProviderDescriptor,
	strategy: &dyn ProviderStrategy,
	credentials: ClientCredentials<'_>,
	grant: GrantRequest<'_>,
) -> Result<HttpRequest, ExchangeError> {
	let grant_type = grant.grant_type();
	let mut form = BTreeMap::new();

	form.insert("grant_type".to_owned(), grant_type.as_str().to_owned());

	match grant {
		GrantRequest::RefreshToken { refresh_token } => {
			form.insert("refresh_token".to_owned(), refresh_token.expose().to_owned());
		},
		GrantRequest::AuthorizationCode { code, redirect_uri } => {
			form.insert("code".to_owned(), code.to_owned());
			form.insert("redirect_uri".to_owned(), redirect_uri.to_string());
		},
		GrantRequest::Password { username, password } => {
			form.insert("username".to_owned(), username.to_owned());
			form.insert("password".to_owned(), password.expose().to_owned());
		},
	}

	let authorization = match descriptor.preferred_client_auth_method {
		ClientAuthMethod::ClientSecretPost => {
			form.insert("client_id".to_owned(), credentials.client_id.to_owned());
			form.insert("client_secret".to_owned(), credentials.client_secret.expose().to_owned());

			None
		},
		ClientAuthMethod::ClientSecretBasic =>
			Some(basic_authorization(credentials.client_id, credentials.client_secret)),
	};

	strategy.augment_token_request(grant_type, &mut form);

	let mut builder = Request::builder().header(ACCEPT, "application/json");
	let body = match descriptor.quirks.token_request_style {
		TokenRequestStyle::FormPost => {
			let encoded =
				form_urlencoded::Serializer::new(String::new()).extend_pairs(form.iter()).finish();

			builder = builder
				.method(Method::POST)
				.uri(descriptor.endpoints.token.as_str())
				.header(CONTENT_TYPE, "application/x-www-form-urlencoded");

			encoded.into_bytes()
		},
		TokenRequestStyle::QueryGet => {
			let mut url = descriptor.endpoints.token.clone();

			url.query_pairs_mut().extend_pairs(form.iter());

			builder = builder.method(Method::GET).uri(url.as_str());

			Vec::new()
		},
	};

	if let Some(value) = authorization {
		builder = builder.header(AUTHORIZATION, value);
	}

	Ok(builder.body(body)?)
}

pub(crate) fn interpret_token_response(
	strategy: &dyn ProviderStrategy,
	grant: GrantType,
	response: &HttpResponse,
) -> Result<TokenGrant, ExchangeError> {
	let meta = ResponseMetadata::from_response(response);
	let body = response.body().as_slice();

	if !response.status().is_success() {
		return Err(rejection(strategy, grant, &meta, body));
	}

	let mut deserializer = serde_json::Deserializer::from_slice(body);

	match serde_path_to_error::deserialize::<_, TokenEndpointResponse>(&mut deserializer) {
		Ok(parsed) => parsed.into_grant(),
		Err(source) =>
			if carries_oauth_error(body) {
				Err(rejection(strategy, grant, &meta, body))
			} else {
				Err(ExchangeError::TokenResponseParse { source, status: meta.status })
			},
	}
}

#[derive(Deserialize)]
struct TokenEndpointResponse {
	access_token: String,
	#[serde(default)]
	refresh_token: Option<String>,
	#[serde(default)]
	expires_in: Option<ExpiresIn>,
}
impl TokenEndpointResponse {
	fn into_grant(self) -> Result<TokenGrant, ExchangeError> {
		if self.access_token.trim().is_empty() {
			return Err(ExchangeError::EmptyAccessToken);
		}

		let seconds = self.expires_in.ok_or(ExchangeError::MissingExpiresIn)?.whole_seconds()?;

		if seconds <= 0 {
			return Err(ExchangeError::NonPositiveExpiresIn);
		}

		let refresh_token =
			self.refresh_token.filter(|token| !token.trim().is_empty()).map(TokenSecret::new);

		Ok(TokenGrant {
			access_token: TokenSecret::new(self.access_token),
			refresh_token,
			expires_in: Duration::seconds(seconds),
		})
	}
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ExpiresIn {
	Seconds(i64),
	Fractional(f64),
	Text(String),
}
impl ExpiresIn {
	/// Lifetime in whole seconds; fractional values are floored.
	fn whole_seconds(self) -> Result<i64, ExchangeError> {
		match self {
			ExpiresIn::Seconds(secs) => Ok(secs),
			ExpiresIn::Fractional(secs) => floor_seconds(secs),
			ExpiresIn::Text(raw) => {
				let trimmed = raw.trim();

				if let Ok(secs) = trimmed.parse::<i64>() {
					return Ok(secs);
				}

				match trimmed.parse::<f64>() {
					Ok(secs) if secs.is_finite() => floor_seconds(secs),
					_ => Err(ExchangeError::InvalidExpiresIn { value: raw }),
				}
			},
		}
	}
}

fn floor_seconds(secs: f64) -> Result<i64, ExchangeError> {
	let floored = secs.floor();

	if floored >= i64::MAX as f64 {
		return Err(ExchangeError::ExpiresInOutOfRange);
	}

	Ok(floored as i64)
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct OAuthErrorBody {
	error: Option<String>,
	error_description: Option<String>,
}

fn carries_oauth_error(body: &[u8]) -> bool {
	serde_json::from_slice::<OAuthErrorBody>(body).is_ok_and(|parsed| parsed.error.is_some())
}

fn rejection(
	strategy: &dyn ProviderStrategy,
	grant: GrantType,
	meta: &ResponseMetadata,
	body: &[u8],
) -> ExchangeError {
	let parsed = serde_json::from_slice::<OAuthErrorBody>(body).unwrap_or_default();
	let text = String::from_utf8_lossy(body);
	let mut ctx = ProviderErrorContext::new(grant);

	if let Some(status) = meta.status {
		ctx = ctx.with_http_status(status);
	}
	if let Some(error) = parsed.error {
		ctx = ctx.with_oauth_error(error);
	}
	if let Some(description) = parsed.error_description {
		ctx = ctx.with_error_description(description);
	}
	if !text.trim().is_empty() {
		ctx = ctx.with_body_preview(text.trim());
	}

	let kind = strategy.classify_token_error(&ctx);
	let message = ctx
		.error_description
		.clone()
		.or_else(|| ctx.oauth_error.clone())
		.unwrap_or_else(|| match meta.status {
			Some(status) => format!("upstream answered with HTTP {status}"),
			None => "upstream answered without a token".into(),
		});

	ExchangeError::Rejected {
		kind,
		message,
		status: meta.status,
		oauth_error: ctx.oauth_error,
		body_preview: ctx.body_preview,
		retry_after: meta.retry_after,
	}
}

fn basic_authorization(client_id: &str, client_secret: &TokenSecret) -> String {
	// RFC 6749 section 2.3.1 form-encodes both halves before joining them.
	let id: String = form_urlencoded::byte_serialize(client_id.as_bytes()).collect();
	let secret: String =
		form_urlencoded::byte_serialize(client_secret.expose().as_bytes()).collect();

	format!("Basic {}", STANDARD.encode(format!("{id}:{secret}")))
}

#[cfg(feature = "reqwest")]
fn map_reqwest_error(err: ReqwestError) -> ExchangeError {
	// Query-style requests carry the client secret and refresh token in the URL.
	let err = err.without_url();

	if err.is_timeout() {
		return ExchangeError::Timeout;
	}

	TransportError::from(err).into()
}
