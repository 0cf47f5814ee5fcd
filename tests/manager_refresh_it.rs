#![cfg(feature = "reqwest")]

// std
use std::time::Duration as StdDuration;
// crates.io
use httpmock::prelude::*;
// self
use erp_token_relay::{
	_preludet::*,
	auth::{TokenState, TokenStatus},
	config::RelayConfig,
	error::ExchangeError,
	manager::ReqwestTokenManager,
	provider::ProviderErrorKind,
};

const CLIENT_ID: &str = "client-refresh";
const CLIENT_SECRET: &str = "secret-refresh";
const TIMEOUT: StdDuration = StdDuration::from_secs(5);

fn build_manager(server: &MockServer) -> ReqwestTokenManager {
	let descriptor = mock_descriptor_builder(&server.base_url())
		.build()
		.expect("Mock descriptor should build successfully.");

	build_reqwest_test_manager(descriptor, CLIENT_ID, CLIENT_SECRET, TIMEOUT)
}

fn state_expiring_in(access: &str, refresh: Option<&str>, lifetime: Duration) -> TokenState {
	TokenState::builder()
		.access_token(access)
		.maybe_refresh_token(refresh.map(Into::into))
		.expires_in(lifetime)
		.build()
		.expect("Token state fixture should build successfully.")
}

#[tokio::test]
async fn valid_cached_token_skips_the_network() {
	let server = MockServer::start_async().await;
	let manager = build_manager(&server);
	let mock = server
		.mock_async(|when, then| {
			when.path("/v1/grant/");
			then.status(500);
		})
		.await;

	manager.seed(state_expiring_in("A", Some("R"), Duration::minutes(10))).await;

	let token = manager.get_valid_token().await.expect("Cached token should be returned.");

	assert_eq!(token.expose(), "A");
	assert_eq!(manager.refresh_metrics().cache_hits(), 1);

	mock.assert_calls_async(0).await;
}

#[tokio::test]
async fn stale_token_is_refreshed_and_state_replaced() {
	let server = MockServer::start_async().await;
	let manager = build_manager(&server);
	let mock = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/v1/grant/")
				.query_param("grant_type", "refresh_token")
				.query_param("client_id", CLIENT_ID)
				.query_param("client_secret", CLIENT_SECRET)
				.query_param("refresh_token", "R");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"access_token\":\"B\",\"refresh_token\":\"R2\",\"expires_in\":3600}");
		})
		.await;

	manager.seed(state_expiring_in("A", Some("R"), Duration::seconds(30))).await;

	assert_eq!(manager.status(), TokenStatus::Stale);

	let before = OffsetDateTime::now_utc();
	let token = manager.get_valid_token().await.expect("Stale token should be refreshed.");
	let after = OffsetDateTime::now_utc();
	let state = manager.state();
	let expires_at = state.expires_at().expect("Refreshed state should carry an expiry.");

	mock.assert_async().await;

	assert_eq!(token.expose(), "B");
	assert_eq!(state.access_token().map(|secret| secret.expose()), Some("B"));
	assert_eq!(state.refresh_token().map(|secret| secret.expose()), Some("R2"));
	assert!(expires_at >= before + Duration::hours(1));
	assert!(expires_at <= after + Duration::hours(1));
	assert_eq!(manager.status(), TokenStatus::Valid);

	let metrics = manager.refresh_metrics();

	assert_eq!(metrics.attempts(), 1);
	assert_eq!(metrics.successes(), 1);
}

#[tokio::test]
async fn missing_refresh_token_is_terminal() {
	let server = MockServer::start_async().await;
	let manager = build_manager(&server);
	let mock = server
		.mock_async(|when, then| {
			when.path("/v1/grant/");
			then.status(200);
		})
		.await;
	let err = manager.get_valid_token().await.expect_err("Empty state cannot produce a token.");

	assert!(matches!(err, Error::NoRefreshToken));
	assert_eq!(err.http_status(), 401);
	assert!(err.requires_reauthorization());

	// An expired token without a refresh token behaves the same way.
	manager.seed(state_expiring_in("A", None, Duration::seconds(5))).await;

	let err = manager.get_valid_token().await.expect_err("Stale token cannot be refreshed.");

	assert!(matches!(err, Error::NoRefreshToken));

	mock.assert_calls_async(0).await;
}

#[tokio::test]
async fn upstream_rejection_leaves_state_untouched() {
	let server = MockServer::start_async().await;
	let manager = build_manager(&server);
	let mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/v1/grant/");
			then.status(400)
				.header("content-type", "application/json")
				.body("{\"error\":\"invalid_grant\",\"error_description\":\"Invalid refresh token\"}");
		})
		.await;

	manager.seed(state_expiring_in("A", Some("R"), Duration::seconds(10))).await;

	let before = manager.state();
	let err = manager.get_valid_token().await.expect_err("Rejected refresh should fail.");

	assert_eq!(manager.state(), before);
	assert_eq!(err.http_status(), 502);
	assert!(!err.is_retryable());

	match &err {
		Error::RefreshFailed(cause) => match cause.as_ref() {
			ExchangeError::Rejected { kind, message, status, oauth_error, .. } => {
				assert_eq!(*kind, ProviderErrorKind::InvalidGrant);
				assert_eq!(message, "Invalid refresh token");
				assert_eq!(*status, Some(400));
				assert_eq!(oauth_error.as_deref(), Some("invalid_grant"));
			},
			other => panic!("Unexpected refresh cause: {other:?}"),
		},
		other => panic!("Unexpected error: {other:?}"),
	}

	// The next caller starts a fresh attempt instead of replaying the old failure.
	let _ = manager.get_valid_token().await.expect_err("Second refresh should fail as well.");

	mock.assert_calls_async(2).await;
	assert_eq!(manager.refresh_metrics().failures(), 2);
}

#[tokio::test]
async fn slow_upstream_times_out() {
	let server = MockServer::start_async().await;
	let descriptor = mock_descriptor_builder(&server.base_url())
		.build()
		.expect("Mock descriptor should build successfully.");
	let manager = build_reqwest_test_manager(
		descriptor,
		CLIENT_ID,
		CLIENT_SECRET,
		StdDuration::from_millis(200),
	);
	let _mock = server
		.mock_async(|when, then| {
			when.path("/v1/grant/");
			then.status(200)
				.delay(StdDuration::from_secs(2))
				.header("content-type", "application/json")
				.body("{\"access_token\":\"late\",\"expires_in\":3600}");
		})
		.await;

	manager.seed(state_expiring_in("A", Some("R"), Duration::seconds(1))).await;

	let before = manager.state();
	let err = manager.get_valid_token().await.expect_err("Slow refresh should time out.");

	assert!(matches!(
		&err,
		Error::RefreshFailed(cause) if matches!(cause.as_ref(), ExchangeError::Timeout)
	));
	assert_eq!(err.http_status(), 503);
	assert!(err.is_retryable());
	assert_eq!(manager.state(), before);
}

#[tokio::test]
async fn unreachable_upstream_errors_do_not_leak_credentials() {
	const SECRET: &str = "client-secret-value";
	const REFRESH: &str = "refresh-secret-value";

	// Nothing listens on port 1, so the query-style refresh fails while connecting.
	let descriptor = mock_descriptor_builder("http://127.0.0.1:1")
		.build()
		.expect("Loopback descriptor should build successfully.");
	let manager = build_reqwest_test_manager(descriptor, CLIENT_ID, SECRET, TIMEOUT);

	manager.seed(state_expiring_in("A", Some(REFRESH), Duration::seconds(5))).await;

	let err = manager.get_valid_token().await.expect_err("Unreachable upstream should fail.");

	assert!(matches!(err, Error::RefreshFailed(_)));
	assert_eq!(err.http_status(), 503);

	let mut rendered = vec![format!("{err:?}"), err.to_string()];
	let mut source = StdError::source(&err);

	while let Some(cause) = source {
		rendered.push(format!("{cause:?}"));
		rendered.push(cause.to_string());

		source = cause.source();
	}

	assert!(rendered.len() > 2, "The refresh failure should expose its cause chain.");

	for text in &rendered {
		assert!(!text.contains(SECRET), "Client secret leaked: {text}");
		assert!(!text.contains(REFRESH), "Refresh token leaked: {text}");
	}
}

#[tokio::test]
async fn concurrent_callers_share_one_refresh() {
	let server = MockServer::start_async().await;
	let manager = Arc::new(build_manager(&server));
	let mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/v1/grant/").query_param("grant_type", "refresh_token");
			then.status(200)
				.delay(StdDuration::from_millis(200))
				.header("content-type", "application/json")
				.body("{\"access_token\":\"shared\",\"refresh_token\":\"R2\",\"expires_in\":3600}");
		})
		.await;

	manager.seed(state_expiring_in("A", Some("R"), Duration::seconds(5))).await;

	let handles = (0..10)
		.map(|_| {
			let manager = manager.clone();

			tokio::spawn(async move { manager.get_valid_token().await })
		})
		.collect::<Vec<_>>();

	for handle in handles {
		let token = handle
			.await
			.expect("Caller task should not panic.")
			.expect("Every caller should receive the refreshed token.");

		assert_eq!(token.expose(), "shared");
	}

	mock.assert_calls_async(1).await;

	let metrics = manager.refresh_metrics();

	assert_eq!(metrics.attempts(), 1);
	assert_eq!(metrics.coalesced() + metrics.cache_hits(), 9);
}

#[tokio::test]
async fn concurrent_callers_share_one_failure() {
	let server = MockServer::start_async().await;
	let manager = Arc::new(build_manager(&server));
	let mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/v1/grant/");
			then.status(503).delay(StdDuration::from_millis(200)).body("maintenance, retry later");
		})
		.await;

	manager.seed(state_expiring_in("A", Some("R"), Duration::seconds(5))).await;

	let (first, second, third) = tokio::join!(
		manager.get_valid_token(),
		manager.get_valid_token(),
		manager.get_valid_token(),
	);

	for result in [first, second, third] {
		let err = result.expect_err("Every waiter should observe the shared failure.");

		assert!(matches!(err, Error::RefreshFailed(_)));
		assert_eq!(err.http_status(), 503);
	}

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn refresh_token_is_kept_when_upstream_does_not_rotate() {
	let server = MockServer::start_async().await;
	let manager = build_manager(&server);
	let _mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/v1/grant/");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"access_token\":\"B\",\"expires_in\":\"3600\",\"token_type\":\"bearer\"}");
		})
		.await;

	manager.seed_refresh_token("R").await.expect("Refresh token seed should succeed.");

	assert_eq!(manager.status(), TokenStatus::Empty);

	let token = manager.get_valid_token().await.expect("Seeded refresh token should be usable.");

	assert_eq!(token.expose(), "B");
	assert_eq!(manager.state().refresh_token().map(|secret| secret.expose()), Some("R"));
}

#[tokio::test]
async fn manager_from_config_targets_overridden_endpoint() -> color_eyre::Result<()> {
	let server = MockServer::start_async().await;
	let config = RelayConfig::new(CLIENT_ID, CLIENT_SECRET)
		.with_token_url(Url::parse(&server.url("/v1/grant/"))?)
		.with_request_timeout(TIMEOUT)
		.with_safety_margin(Duration::seconds(30));
	let manager = ReqwestTokenManager::from_config(&config)?;
	let mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/v1/grant/").query_param("refresh_token", "R");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"access_token\":\"B\",\"refresh_token\":\"R2\",\"expires_in\":3600}");
		})
		.await;

	assert_eq!(manager.safety_margin, Duration::seconds(30));
	assert_eq!(manager.request_timeout, TIMEOUT);

	// 45 seconds left is outside the configured 30 second margin.
	manager.seed(state_expiring_in("A", Some("R"), Duration::seconds(45))).await;

	assert_eq!(manager.get_valid_token().await?.expose(), "A");

	manager.seed(state_expiring_in("A", Some("R"), Duration::seconds(20))).await;

	assert_eq!(manager.get_valid_token().await?.expose(), "B");

	mock.assert_calls_async(1).await;

	Ok(())
}
