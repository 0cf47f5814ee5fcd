// self
use crate::_prelude::*;

/// How token endpoint parameters travel to the upstream.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenRequestStyle {
	/// `POST` with an `application/x-www-form-urlencoded` body (RFC 6749).
	#[default]
	FormPost,
	/// `GET` with every parameter in the query string.
	QueryGet,
}

/// Upstream-specific quirks that influence how token requests are built.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderQuirks {
	/// Transport shape of token endpoint requests.
	pub token_request_style: TokenRequestStyle,
}
