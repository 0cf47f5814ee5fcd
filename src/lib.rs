//! OAuth 2.0 token lifecycle core for an ERP relay: cached access tokens, single-flight
//! refresh, redacted secrets, and typed upstream failures.
//!
//! The relay keeps exactly one [`TokenState`](auth::TokenState) per
//! [`TokenManager`](manager::TokenManager). Request forwarders hold the manager behind an
//! `Arc` and call [`get_valid_token`](manager::TokenManager::get_valid_token) before every
//! upstream call.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod config;
pub mod error;
pub mod exchange;
pub mod http;
pub mod manager;
pub mod obs;
pub mod provider;
#[cfg(feature = "reqwest")]
#[doc(hidden)]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests.

	pub use crate::_prelude::*;

	// std
	use std::time::Duration as StdDuration;
	// crates.io
	use reqwest::redirect::Policy;
	// self
	use crate::{
		exchange::ReqwestTransportErrorMapper,
		http::ReqwestHttpClient,
		manager::ReqwestTokenManager,
		provider::{
			DefaultProviderStrategy, ProviderDescriptor, ProviderDescriptorBuilder, ProviderStrategy,
		},
	};

	/// Builds a reqwest HTTP client bounded by `timeout` that accepts the self-signed
	/// certificates produced by `httpmock`.
	pub fn test_reqwest_http_client(timeout: StdDuration) -> ReqwestHttpClient {
		let client = ReqwestClient::builder()
			.timeout(timeout)
			.redirect(Policy::none())
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		ReqwestHttpClient::with_client(client)
	}

	/// Moloni preset pointed at a mock server's `/v1/authorize/` and `/v1/grant/` paths.
	pub fn mock_descriptor_builder(base_url: &str) -> ProviderDescriptorBuilder {
		let authorization = Url::parse(&format!("{base_url}/v1/authorize/"))
			.expect("Mock authorize URL should parse.");
		let token =
			Url::parse(&format!("{base_url}/v1/grant/")).expect("Mock grant URL should parse.");

		ProviderDescriptorBuilder::moloni()
			.expect("Moloni preset should validate.")
			.authorization_endpoint(authorization)
			.token_endpoint(token)
	}

	/// Constructs a [`ReqwestTokenManager`] with the default strategy and a test transport.
	pub fn build_reqwest_test_manager(
		descriptor: ProviderDescriptor,
		client_id: &str,
		client_secret: &str,
		timeout: StdDuration,
	) -> ReqwestTokenManager {
		let strategy: Arc<dyn ProviderStrategy> = Arc::new(DefaultProviderStrategy);

		ReqwestTokenManager::with_http_client(
			descriptor,
			strategy,
			client_id,
			client_secret,
			test_reqwest_http_client(timeout),
			ReqwestTransportErrorMapper,
		)
	}
}

mod _prelude {
	pub use std::{
		collections::BTreeMap,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::RwLock;
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use oauth2;
#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
