//! Serialized cache entity schema.
//!
//! Entities are owned exclusively by the [`CacheManager`](crate::cache::CacheManager);
//! no entity holds a live reference to another, relationships exist only through key
//! lookups. One serialized JSON record is persisted per entity per cache key.

// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, TokenSecret},
	cache::key::{AccountKey, AppMetadataKey, CredentialKey},
};

/// Family-of-clients id marking refresh tokens shareable across sibling apps.
pub const FAMILY_ID: &str = "1";

/// How long resolved authority metadata stays usable before re-resolution.
const AUTHORITY_METADATA_TTL: Duration = Duration::hours(24);

/// Discriminator for the three credential entity kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CredentialKind {
	/// OIDC id token.
	IdToken,
	/// OAuth2 access token.
	AccessToken,
	/// OAuth2 refresh token.
	RefreshToken,
}
impl CredentialKind {
	/// Stable lowercase label used inside cache keys.
	pub const fn label(self) -> &'static str {
		match self {
			Self::IdToken => "idtoken",
			Self::AccessToken => "accesstoken",
			Self::RefreshToken => "refreshtoken",
		}
	}

	/// Inverse of [`label`](Self::label).
	pub fn from_label(label: &str) -> Option<Self> {
		match label {
			"idtoken" => Some(Self::IdToken),
			"accesstoken" => Some(Self::AccessToken),
			"refreshtoken" => Some(Self::RefreshToken),
			_ => None,
		}
	}
}
impl Display for CredentialKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.label())
	}
}

/// Signed-in identity cached per `{home_account_id, environment, realm}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountEntity {
	/// Home account id in `{uid}.{utid}` shape.
	pub home_account_id: String,
	/// Network host the account was cached under; must belong to the alias
	/// equivalence class of the authority that created it.
	pub environment: String,
	/// Tenant the account belongs to.
	pub realm: String,
	/// Local object id within the realm.
	pub local_account_id: String,
	/// Preferred username / login hint.
	pub username: String,
	/// Authority type label (e.g. `MSSTS`, `ADFS`, `Generic`).
	pub authority_type: String,
	/// Raw client-info payload, when the server supplied one.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub client_info: Option<String>,
	/// Session id from the id token, used by sid-based filters.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub sid: Option<String>,
}
impl AccountEntity {
	/// Key this entity is stored under.
	pub fn key(&self) -> AccountKey {
		AccountKey::new(&self.home_account_id, &self.environment, &self.realm)
	}
}

/// Credential entity covering id, access, and refresh tokens.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialEntity {
	/// Home account id in `{uid}.{utid}` shape.
	pub home_account_id: String,
	/// Network host the credential was cached under.
	pub environment: String,
	/// Credential kind discriminator.
	pub credential_type: CredentialKind,
	/// Client id of the application the credential was issued to.
	pub client_id: String,
	/// Tenant the credential applies to; empty for refresh tokens.
	pub realm: String,
	/// Normalized scope target; empty for id and refresh tokens.
	pub target: ScopeSet,
	/// The token string itself.
	pub secret: TokenSecret,
	/// Instant the credential was written to the cache.
	#[serde(with = "time::serde::timestamp")]
	pub cached_at: OffsetDateTime,
	/// Expiry instant; access tokens only.
	#[serde(default, with = "time::serde::timestamp::option", skip_serializing_if = "Option::is_none")]
	pub expires_on: Option<OffsetDateTime>,
	/// Extended expiry instant for outage resilience; access tokens only.
	#[serde(default, with = "time::serde::timestamp::option", skip_serializing_if = "Option::is_none")]
	pub extended_expires_on: Option<OffsetDateTime>,
	/// Token type (`Bearer`, `pop`); access tokens only.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub token_type: Option<String>,
	/// Assertion hash partitioning on-behalf-of credentials.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub user_assertion_hash: Option<String>,
	/// Key id binding proof-of-possession tokens.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub key_id: Option<String>,
	/// Family-of-clients id; refresh tokens only.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub family_id: Option<String>,
}
impl CredentialEntity {
	/// Key this entity is stored under.
	pub fn key(&self) -> CredentialKey {
		CredentialKey::new(
			&self.home_account_id,
			&self.environment,
			self.credential_type,
			&self.client_id,
			&self.realm,
			self.target.clone(),
		)
	}

	/// Returns `true` once the credential's expiry instant has passed.
	///
	/// Credentials without an expiry (id and refresh tokens) never expire here; the
	/// server is the authority on refresh token validity.
	pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
		self.expires_on.is_some_and(|expires_on| now >= expires_on)
	}

	/// Returns `true` while the credential is valid but inside the refresh-ahead
	/// window preceding its expiry.
	pub fn within_refresh_window(&self, now: OffsetDateTime, window: Duration) -> bool {
		match self.expires_on {
			Some(expires_on) => now < expires_on && now >= expires_on - window,
			None => false,
		}
	}

	/// Returns `true` for family refresh tokens shareable across sibling apps.
	pub fn is_family_refresh_token(&self) -> bool {
		self.credential_type == CredentialKind::RefreshToken
			&& self.family_id.as_deref() == Some(FAMILY_ID)
	}
}

/// Family-of-client-ids membership per `{environment, client_id}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppMetadataEntity {
	/// Network host the metadata applies to.
	pub environment: String,
	/// Client id the metadata describes.
	pub client_id: String,
	/// Family id the app belongs to, when the server reported one.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub family_id: Option<String>,
}
impl AppMetadataEntity {
	/// Key this entity is stored under.
	pub fn key(&self) -> AppMetadataKey {
		AppMetadataKey::new(&self.environment, &self.client_id)
	}

	/// Returns `true` when the app participates in a token-sharing family.
	pub fn in_family(&self) -> bool {
		self.family_id.is_some()
	}
}

/// Resolved authority metadata keyed by the normalized authority host.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorityMetadataEntity {
	/// Hostname preferred for network calls.
	pub preferred_network: String,
	/// Hostname preferred for cache partitioning.
	pub preferred_cache: String,
	/// Equivalence class of interchangeable hostnames.
	pub aliases: Vec<String>,
	/// Whether the aliases came from a live network discovery call.
	pub aliases_from_network: bool,
	/// OAuth2 token endpoint.
	pub token_endpoint: String,
	/// OAuth2 authorization endpoint.
	pub authorization_endpoint: String,
	/// OIDC end-session endpoint, when published.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub end_session_endpoint: Option<String>,
	/// Instant after which this entry must be re-resolved.
	#[serde(with = "time::serde::timestamp")]
	pub expires_at: OffsetDateTime,
}
impl AuthorityMetadataEntity {
	/// Normalized host key this entity is stored under.
	pub fn key(&self) -> String {
		self.preferred_cache.to_lowercase()
	}

	/// Returns `true` once the entry must be re-resolved.
	pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
		now >= self.expires_at
	}

	/// Returns `true` when `host` belongs to this entry's alias equivalence class.
	pub fn has_alias(&self, host: &str) -> bool {
		self.aliases.iter().any(|alias| alias.eq_ignore_ascii_case(host))
	}

	/// Stamps the refresh deadline relative to `now`.
	pub fn stamp_expiry(&mut self, now: OffsetDateTime) {
		self.expires_at = now + AUTHORITY_METADATA_TTL;
	}
}

/// Server-signaled backoff window keyed by request thumbprint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThrottlingEntity {
	/// Instant at which the throttle window elapses.
	#[serde(with = "time::serde::timestamp")]
	pub throttle_time: OffsetDateTime,
	/// HTTP status of the response that triggered the throttle.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub status: Option<u16>,
	/// Server error code captured when the throttle was recorded.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error_code: Option<String>,
	/// Server error description captured when the throttle was recorded.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error_description: Option<String>,
}
impl ThrottlingEntity {
	/// Returns `true` once the throttle window has elapsed.
	pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
		now >= self.throttle_time
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	fn access_token_fixture() -> CredentialEntity {
		CredentialEntity {
			home_account_id: "uid.utid".into(),
			environment: "login.windows.net".into(),
			credential_type: CredentialKind::AccessToken,
			client_id: "client".into(),
			realm: "tenant".into(),
			target: ScopeSet::new(["user.read"]).expect("Target fixture should be valid."),
			secret: TokenSecret::new("at-secret"),
			cached_at: macros::datetime!(2025-01-01 00:00 UTC),
			expires_on: Some(macros::datetime!(2025-01-01 01:00 UTC)),
			extended_expires_on: None,
			token_type: Some("Bearer".into()),
			user_assertion_hash: None,
			key_id: None,
			family_id: None,
		}
	}

	#[test]
	fn credential_serde_round_trips_through_json() {
		let entity = access_token_fixture();
		let payload = serde_json::to_string(&entity).expect("Entity should serialize.");
		let round_trip: CredentialEntity =
			serde_json::from_str(&payload).expect("Entity should deserialize.");

		assert_eq!(round_trip, entity);
	}

	#[test]
	fn expiry_and_refresh_window_checks() {
		let entity = access_token_fixture();
		let window = Duration::minutes(10);

		assert!(!entity.is_expired_at(macros::datetime!(2025-01-01 00:30 UTC)));
		assert!(entity.is_expired_at(macros::datetime!(2025-01-01 01:00 UTC)));
		assert!(!entity.within_refresh_window(macros::datetime!(2025-01-01 00:30 UTC), window));
		assert!(entity.within_refresh_window(macros::datetime!(2025-01-01 00:55 UTC), window));
		assert!(!entity.within_refresh_window(macros::datetime!(2025-01-01 01:05 UTC), window));
	}

	#[test]
	fn family_refresh_token_detection() {
		let mut entity = access_token_fixture();

		assert!(!entity.is_family_refresh_token());

		entity.credential_type = CredentialKind::RefreshToken;
		entity.family_id = Some(FAMILY_ID.into());

		assert!(entity.is_family_refresh_token());
	}

	#[test]
	fn authority_metadata_expiry_stamping() {
		let now = macros::datetime!(2025-06-01 00:00 UTC);
		let mut entity = AuthorityMetadataEntity {
			preferred_network: "login.microsoftonline.com".into(),
			preferred_cache: "login.windows.net".into(),
			aliases: vec!["login.microsoftonline.com".into(), "login.windows.net".into()],
			aliases_from_network: true,
			token_endpoint: "https://login.microsoftonline.com/tenant/oauth2/v2.0/token".into(),
			authorization_endpoint:
				"https://login.microsoftonline.com/tenant/oauth2/v2.0/authorize".into(),
			end_session_endpoint: None,
			expires_at: now,
		};

		assert!(entity.is_expired_at(now));

		entity.stamp_expiry(now);

		assert!(!entity.is_expired_at(now));
		assert!(entity.is_expired_at(now + Duration::hours(25)));
		assert!(entity.has_alias("LOGIN.WINDOWS.NET"));
		assert!(!entity.has_alias("sts.chinacloudapi.cn"));
	}
}
