// std
use std::{
	collections::BTreeMap,
	error::Error as StdError,
	fmt::{Display, Formatter, Result as FmtResult},
	sync::{Arc, Mutex},
};
// self
use erp_token_relay::{
	auth::TokenState,
	error::{Error, ExchangeError, TransportError},
	exchange::TransportErrorMapper,
	http::{HttpFuture, TokenHttpClient},
	manager::TokenManager,
	oauth2::{
		HttpClientError, HttpRequest, HttpResponse,
		http::{HeaderMap, HeaderValue, StatusCode, header::RETRY_AFTER},
	},
	provider::{
		DefaultProviderStrategy, GrantType, ProviderDescriptor, ProviderErrorContext,
		ProviderErrorKind, ProviderStrategy,
	},
	url::Url,
};
use time::Duration;

#[derive(Debug)]
enum FakeTransportError {
	ConnectionReset,
}
impl Display for FakeTransportError {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Self::ConnectionReset => write!(f, "Connection reset by peer."),
		}
	}
}
impl StdError for FakeTransportError {}

enum Script {
	Respond { status: StatusCode, retry_after: Option<&'static str>, body: &'static str },
	Fail,
}

#[derive(Clone)]
struct RecordedRequest {
	headers: HeaderMap,
	body: Vec<u8>,
}

struct FakeHttpClient {
	script: Script,
	requests: Mutex<Vec<RecordedRequest>>,
}
impl FakeHttpClient {
	fn new(script: Script) -> Self {
		Self { script, requests: Mutex::new(Vec::new()) }
	}

	fn recorded(&self) -> Vec<RecordedRequest> {
		self.requests.lock().expect("Request log should not be poisoned.").clone()
	}
}
impl TokenHttpClient for FakeHttpClient {
	type TransportError = FakeTransportError;

	fn execute(&self, request: HttpRequest) -> HttpFuture<'_, Self::TransportError> {
		self.requests
			.lock()
			.expect("Request log should not be poisoned.")
			.push(RecordedRequest { headers: request.headers().clone(), body: request.into_body() });

		Box::pin(async move {
			match &self.script {
				Script::Respond { status, retry_after, body } => {
					let mut response = HttpResponse::new(body.as_bytes().to_vec());

					*response.status_mut() = *status;

					if let Some(value) = retry_after {
						response.headers_mut().insert(RETRY_AFTER, HeaderValue::from_static(*value));
					}

					Ok(response)
				},
				Script::Fail =>
					Err(HttpClientError::Reqwest(Box::new(FakeTransportError::ConnectionReset))),
			}
		})
	}
}

#[derive(Default)]
struct RecordingTransportErrorMapper {
	grants: Mutex<Vec<GrantType>>,
}
impl TransportErrorMapper<FakeTransportError> for RecordingTransportErrorMapper {
	fn map_transport_error(
		&self,
		grant: GrantType,
		err: HttpClientError<FakeTransportError>,
	) -> ExchangeError {
		self.grants.lock().expect("Grant log should not be poisoned.").push(grant);

		match err {
			HttpClientError::Reqwest(inner) => TransportError::network(*inner).into(),
			other => TransportError::Other { message: other.to_string() }.into(),
		}
	}
}

/// Adds Moloni's `json=true` switch and treats every rejection as a client problem.
struct JsonSwitchStrategy;
impl ProviderStrategy for JsonSwitchStrategy {
	fn classify_token_error(&self, _ctx: &ProviderErrorContext) -> ProviderErrorKind {
		ProviderErrorKind::InvalidClient
	}

	fn augment_token_request(&self, _grant: GrantType, form: &mut BTreeMap<String, String>) {
		form.insert("json".into(), "true".into());
	}
}

type FakeManager = TokenManager<FakeHttpClient, RecordingTransportErrorMapper>;

fn build_manager(
	strategy: Arc<dyn ProviderStrategy>,
	script: Script,
) -> (FakeManager, Arc<FakeHttpClient>, Arc<RecordingTransportErrorMapper>) {
	let descriptor = ProviderDescriptor::builder("fake")
		.token_endpoint(
			Url::parse("https://erp.example.com/v1/grant/")
				.expect("Failed to parse fake token endpoint URL."),
		)
		.support_grants([GrantType::RefreshToken, GrantType::Password])
		.build()
		.expect("Failed to build fake provider descriptor.");
	let http_client = Arc::new(FakeHttpClient::new(script));
	let mapper = Arc::new(RecordingTransportErrorMapper::default());
	let manager = TokenManager::with_http_client(
		descriptor,
		strategy,
		"fake-client",
		"fake-secret",
		http_client.clone(),
		mapper.clone(),
	);

	(manager, http_client, mapper)
}

fn stale_state() -> TokenState {
	TokenState::builder()
		.access_token("A")
		.refresh_token("R")
		.expires_in(Duration::seconds(10))
		.build()
		.expect("Stale token state fixture should build.")
}

#[tokio::test]
async fn throttled_refresh_surfaces_retry_after() {
	let (manager, http_client, _) = build_manager(
		Arc::new(DefaultProviderStrategy),
		Script::Respond {
			status: StatusCode::TOO_MANY_REQUESTS,
			retry_after: Some("5"),
			body: "{\"error\":\"temporarily_unavailable\"}",
		},
	);

	manager.seed(stale_state()).await;

	let err = manager.get_valid_token().await.expect_err("Throttled refresh should fail.");

	assert_eq!(err.http_status(), 503);
	assert!(err.is_retryable());

	match err {
		Error::RefreshFailed(cause) => match cause.as_ref() {
			ExchangeError::Rejected { kind, status, retry_after, .. } => {
				assert_eq!(*kind, ProviderErrorKind::Transient);
				assert_eq!(*status, Some(429));
				assert_eq!(*retry_after, Some(Duration::seconds(5)));
			},
			other => panic!("Unexpected refresh cause: {other:?}."),
		},
		other => panic!("Unexpected error variant: {other:?}."),
	}

	assert_eq!(http_client.recorded().len(), 1);
}

#[tokio::test]
async fn strategy_decorates_requests_and_classifies_rejections() {
	let (manager, http_client, _) = build_manager(
		Arc::new(JsonSwitchStrategy),
		Script::Respond { status: StatusCode::BAD_REQUEST, retry_after: None, body: "denied" },
	);
	let err = manager
		.exchange_password("ops", "pw")
		.await
		.expect_err("Fake upstream rejects every password.");

	assert_eq!(err.http_status(), 401);
	assert!(matches!(
		err,
		Error::ExchangeFailed {
			grant: GrantType::Password,
			source: ExchangeError::Rejected { kind: ProviderErrorKind::InvalidClient, .. },
		}
	));

	let requests = http_client.recorded();
	let request = requests.first().expect("Password request should be recorded.");
	let body = String::from_utf8(request.body.clone()).expect("Form body should be UTF-8.");

	assert!(body.contains("json=true"));
	assert!(body.contains("grant_type=password"));
	// Descriptors default to HTTP Basic client authentication.
	assert!(!body.contains("client_secret"));
	assert!(request.headers.contains_key("authorization"));
}

#[tokio::test]
async fn transport_failures_flow_through_the_mapper() {
	let (manager, _, mapper) = build_manager(Arc::new(DefaultProviderStrategy), Script::Fail);

	manager.seed(stale_state()).await;

	let before = manager.state();
	let err = manager.get_valid_token().await.expect_err("Broken transport should fail.");

	assert!(matches!(
		&err,
		Error::RefreshFailed(cause) if matches!(
			cause.as_ref(),
			ExchangeError::Transport(TransportError::Network { .. })
		)
	));
	assert_eq!(err.http_status(), 503);
	assert_eq!(manager.state(), before);
	assert_eq!(
		mapper.grants.lock().expect("Grant log should not be poisoned.").as_slice(),
		&[GrantType::RefreshToken],
	);
}
