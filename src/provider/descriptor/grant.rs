// self
use crate::_prelude::*;

/// Token endpoint grants the relay knows how to send.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
	/// `authorization_code`; installs tokens after an operator login.
	AuthorizationCode,
	/// `refresh_token`; keeps the cached access token fresh.
	RefreshToken,
	/// `password`; installs tokens from resource-owner credentials.
	Password,
}
impl GrantType {
	/// Every grant, in the order [`SupportedGrants::iter`] yields them.
	pub const ALL: [GrantType; 3] =
		[GrantType::AuthorizationCode, GrantType::RefreshToken, GrantType::Password];

	/// Wire value of the `grant_type` parameter.
	pub fn as_str(self) -> &'static str {
		match self {
			GrantType::AuthorizationCode => "authorization_code",
			GrantType::RefreshToken => "refresh_token",
			GrantType::Password => "password",
		}
	}

	const fn bit(self) -> u8 {
		1 << self as u8
	}
}
impl Display for GrantType {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Grants enabled on a descriptor.
///
/// Serializes as the list of enabled grant names, e.g. `["refresh_token","password"]`.
#[derive(Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<GrantType>", into = "Vec<GrantType>")]
pub struct SupportedGrants(u8);
impl SupportedGrants {
	/// Returns `true` if `grant` is enabled.
	pub fn supports(self, grant: GrantType) -> bool {
		self.0 & grant.bit() != 0
	}

	/// Enables `grant`.
	pub fn enable(mut self, grant: GrantType) -> Self {
		self.0 |= grant.bit();

		self
	}

	/// Returns `true` when nothing is enabled.
	pub fn is_empty(self) -> bool {
		self.0 == 0
	}

	/// Enabled grants in [`GrantType::ALL`] order.
	pub fn iter(self) -> impl Iterator<Item = GrantType> {
		GrantType::ALL.into_iter().filter(move |grant| self.supports(*grant))
	}
}
impl Debug for SupportedGrants {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_set().entries(self.iter()).finish()
	}
}
impl FromIterator<GrantType> for SupportedGrants {
	fn from_iter<I>(grants: I) -> Self
	where
		I: IntoIterator<Item = GrantType>,
	{
		grants.into_iter().fold(Self::default(), Self::enable)
	}
}
impl From<Vec<GrantType>> for SupportedGrants {
	fn from(grants: Vec<GrantType>) -> Self {
		grants.into_iter().collect()
	}
}
impl From<SupportedGrants> for Vec<GrantType> {
	fn from(grants: SupportedGrants) -> Self {
		grants.iter().collect()
	}
}
