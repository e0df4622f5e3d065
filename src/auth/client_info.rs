//! Trusted claim payloads decoded from token responses.
//!
//! Claims arrive over the TLS channel that delivered the token response and are parsed,
//! not cryptographically re-verified. Signature verification is out of scope for the core.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
// self
use crate::{_prelude::*, error::ConfigError};

/// Client-info payload identifying the signed-in identity across tenants.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
	/// Unique object id of the identity within its home tenant.
	pub uid: String,
	/// Home tenant id.
	pub utid: String,
}
impl ClientInfo {
	/// Decodes a base64url-encoded client-info payload.
	pub fn decode(raw: &str) -> Result<Self, ConfigError> {
		let bytes =
			URL_SAFE_NO_PAD.decode(raw.trim_end_matches('=')).map_err(|_| ConfigError::MalformedClientInfo)?;

		serde_json::from_slice(&bytes).map_err(|_| ConfigError::MalformedClientInfo)
	}

	/// Home account id in the canonical `{uid}.{utid}` shape used by cache keys.
	pub fn home_account_id(&self) -> String {
		format!("{}.{}", self.uid, self.utid)
	}
}

/// Subset of OIDC id-token claims the cache layer cares about.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdTokenClaims {
	/// Subject claim.
	#[serde(default)]
	pub sub: Option<String>,
	/// Local object id of the identity.
	#[serde(default)]
	pub oid: Option<String>,
	/// Tenant (realm) the token was issued for.
	#[serde(default)]
	pub tid: Option<String>,
	/// Preferred username / login hint.
	#[serde(default)]
	pub preferred_username: Option<String>,
	/// Display name.
	#[serde(default)]
	pub name: Option<String>,
	/// Session id used by single-sign-out.
	#[serde(default)]
	pub sid: Option<String>,
}
impl IdTokenClaims {
	/// Decodes the payload segment of a compact JWT without verifying its signature.
	pub fn decode(id_token: &str) -> Result<Self, ConfigError> {
		let payload =
			id_token.split('.').nth(1).ok_or(ConfigError::MalformedIdToken)?;
		let bytes = URL_SAFE_NO_PAD
			.decode(payload.trim_end_matches('='))
			.map_err(|_| ConfigError::MalformedIdToken)?;

		serde_json::from_slice(&bytes).map_err(|_| ConfigError::MalformedIdToken)
	}

	/// Local account id preferring `oid` and falling back to `sub`.
	pub fn local_account_id(&self) -> Option<&str> {
		self.oid.as_deref().or(self.sub.as_deref())
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn encode(json: &str) -> String {
		URL_SAFE_NO_PAD.encode(json.as_bytes())
	}

	#[test]
	fn client_info_decodes_and_builds_home_account_id() {
		let raw = encode("{\"uid\":\"user-1\",\"utid\":\"tenant-1\"}");
		let info = ClientInfo::decode(&raw).expect("Client info should decode.");

		assert_eq!(info.home_account_id(), "user-1.tenant-1");
		assert!(matches!(
			ClientInfo::decode("!!not-base64!!"),
			Err(ConfigError::MalformedClientInfo)
		));
	}

	#[test]
	fn id_token_claims_decode_from_payload_segment() {
		let payload = encode(
			"{\"sub\":\"sub-1\",\"oid\":\"oid-1\",\"tid\":\"tenant-1\",\"preferred_username\":\"user@contoso.com\"}",
		);
		let jwt = format!("eyJhbGciOiJub25lIn0.{payload}.signature");
		let claims = IdTokenClaims::decode(&jwt).expect("Claims should decode.");

		assert_eq!(claims.local_account_id(), Some("oid-1"));
		assert_eq!(claims.preferred_username.as_deref(), Some("user@contoso.com"));
	}

	#[test]
	fn malformed_id_tokens_are_reported_as_such() {
		assert!(matches!(
			IdTokenClaims::decode("no-dots"),
			Err(ConfigError::MalformedIdToken)
		));
		assert!(matches!(
			IdTokenClaims::decode("header.!!not-base64!!.signature"),
			Err(ConfigError::MalformedIdToken)
		));
	}
}
