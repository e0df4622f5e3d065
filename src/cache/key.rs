//! Deterministic string keys for cache entities.
//!
//! Keys are lowercase and joined with `-`. Parsing is the strict inverse of building:
//! a key only parses when it splits into exactly the expected segments, so components
//! that embed the separator are simply not representable as parseable keys and any
//! other shape is rejected outright instead of being partially parsed. Lookups by
//! rendered key are plain string matches and do not involve parsing.

// self
use crate::{_prelude::*, auth::ScopeSet, cache::entity::CredentialKind};

const SEPARATOR: char = '-';
const APP_METADATA_PREFIX: &str = "appmetadata";

/// Error returned when a cache key cannot be parsed.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum KeyParseError {
	/// The key does not split into the expected number of segments.
	#[error("Key has an unexpected segment layout.")]
	SegmentLayout,
	/// A mandatory segment was empty.
	#[error("Key segment `{segment}` is empty.")]
	EmptySegment {
		/// Name of the offending segment.
		segment: &'static str,
	},
	/// The credential-type segment is not a known credential kind.
	#[error("Unknown credential type `{value}`.")]
	UnknownCredentialKind {
		/// The unrecognized credential-type segment.
		value: String,
	},
	/// The target segment is not a valid normalized scope string.
	#[error("Target segment is not a normalized scope string.")]
	InvalidTarget,
}

/// Key identifying an [`AccountEntity`](crate::cache::AccountEntity):
/// `{home_account_id}-{environment}-{realm}`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AccountKey {
	/// Home account id in `{uid}.{utid}` shape.
	pub home_account_id: String,
	/// Network host the account was cached under.
	pub environment: String,
	/// Tenant the account belongs to; may be empty.
	pub realm: String,
}
impl AccountKey {
	/// Builds a key from its components, lowercasing for case-insensitive matching.
	pub fn new(
		home_account_id: impl AsRef<str>,
		environment: impl AsRef<str>,
		realm: impl AsRef<str>,
	) -> Self {
		Self {
			home_account_id: home_account_id.as_ref().to_lowercase(),
			environment: environment.as_ref().to_lowercase(),
			realm: realm.as_ref().to_lowercase(),
		}
	}

	/// Renders the deterministic storage key.
	pub fn render(&self) -> String {
		format!("{}{SEPARATOR}{}{SEPARATOR}{}", self.home_account_id, self.environment, self.realm)
	}
}
impl Display for AccountKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.render())
	}
}
impl FromStr for AccountKey {
	type Err = KeyParseError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let segments: Vec<&str> = s.split(SEPARATOR).collect();
		let [home_account_id, environment, realm] = segments.as_slice() else {
			return Err(KeyParseError::SegmentLayout);
		};

		if home_account_id.is_empty() {
			return Err(KeyParseError::EmptySegment { segment: "home_account_id" });
		}
		if environment.is_empty() {
			return Err(KeyParseError::EmptySegment { segment: "environment" });
		}

		Ok(Self::new(home_account_id, environment, realm))
	}
}

/// Key identifying a [`CredentialEntity`](crate::cache::CredentialEntity):
/// `{home_account_id}-{environment}-{credential_type}-{client_id}-{realm}-{target}`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CredentialKey {
	/// Home account id in `{uid}.{utid}` shape.
	pub home_account_id: String,
	/// Network host the credential was cached under.
	pub environment: String,
	/// Credential kind discriminator.
	pub kind: CredentialKind,
	/// Client id of the application the credential was issued to.
	pub client_id: String,
	/// Tenant the credential applies to; empty for refresh tokens.
	pub realm: String,
	/// Normalized scope target; empty for id and refresh tokens.
	pub target: ScopeSet,
}
impl CredentialKey {
	/// Builds a key from its components, lowercasing for case-insensitive matching.
	pub fn new(
		home_account_id: impl AsRef<str>,
		environment: impl AsRef<str>,
		kind: CredentialKind,
		client_id: impl AsRef<str>,
		realm: impl AsRef<str>,
		target: ScopeSet,
	) -> Self {
		Self {
			home_account_id: home_account_id.as_ref().to_lowercase(),
			environment: environment.as_ref().to_lowercase(),
			kind,
			client_id: client_id.as_ref().to_lowercase(),
			realm: realm.as_ref().to_lowercase(),
			target,
		}
	}

	/// Renders the deterministic storage key.
	pub fn render(&self) -> String {
		format!(
			"{}{SEPARATOR}{}{SEPARATOR}{}{SEPARATOR}{}{SEPARATOR}{}{SEPARATOR}{}",
			self.home_account_id,
			self.environment,
			self.kind.label(),
			self.client_id,
			self.realm,
			self.target.normalized(),
		)
	}

	/// Classifies a raw storage key by its embedded credential-type token.
	///
	/// Scan paths use this cheap membership test instead of a full parse so canonical
	/// components that embed the separator (GUID client ids) still classify correctly.
	pub fn kind_of(key: &str) -> Option<CredentialKind> {
		[CredentialKind::IdToken, CredentialKind::AccessToken, CredentialKind::RefreshToken]
			.into_iter()
			.find(|kind| key.contains(&format!("{SEPARATOR}{}{SEPARATOR}", kind.label())))
	}
}
impl Display for CredentialKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.render())
	}
}
impl FromStr for CredentialKey {
	type Err = KeyParseError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let segments: Vec<&str> = s.split(SEPARATOR).collect();
		let [home_account_id, environment, kind, client_id, realm, target] = segments.as_slice()
		else {
			return Err(KeyParseError::SegmentLayout);
		};

		if home_account_id.is_empty() {
			return Err(KeyParseError::EmptySegment { segment: "home_account_id" });
		}
		if environment.is_empty() {
			return Err(KeyParseError::EmptySegment { segment: "environment" });
		}
		if client_id.is_empty() {
			return Err(KeyParseError::EmptySegment { segment: "client_id" });
		}

		let kind = CredentialKind::from_label(kind)
			.ok_or_else(|| KeyParseError::UnknownCredentialKind { value: kind.to_string() })?;
		let target = ScopeSet::from_str(target).map_err(|_| KeyParseError::InvalidTarget)?;

		Ok(Self::new(home_account_id, environment, kind, client_id, realm, target))
	}
}

/// Key identifying an [`AppMetadataEntity`](crate::cache::AppMetadataEntity):
/// `appmetadata-{environment}-{client_id}`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AppMetadataKey {
	/// Network host the metadata applies to.
	pub environment: String,
	/// Client id the metadata describes.
	pub client_id: String,
}
impl AppMetadataKey {
	/// Builds a key from its components, lowercasing for case-insensitive matching.
	pub fn new(environment: impl AsRef<str>, client_id: impl AsRef<str>) -> Self {
		Self {
			environment: environment.as_ref().to_lowercase(),
			client_id: client_id.as_ref().to_lowercase(),
		}
	}

	/// Renders the deterministic storage key.
	pub fn render(&self) -> String {
		format!("{APP_METADATA_PREFIX}{SEPARATOR}{}{SEPARATOR}{}", self.environment, self.client_id)
	}

	/// Returns `true` when the raw storage key carries the app-metadata prefix.
	pub fn matches(key: &str) -> bool {
		key.starts_with(&format!("{APP_METADATA_PREFIX}{SEPARATOR}"))
	}
}
impl Display for AppMetadataKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.render())
	}
}
impl FromStr for AppMetadataKey {
	type Err = KeyParseError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let segments: Vec<&str> = s.split(SEPARATOR).collect();
		let [prefix, environment, client_id] = segments.as_slice() else {
			return Err(KeyParseError::SegmentLayout);
		};

		if *prefix != APP_METADATA_PREFIX {
			return Err(KeyParseError::SegmentLayout);
		}
		if environment.is_empty() {
			return Err(KeyParseError::EmptySegment { segment: "environment" });
		}
		if client_id.is_empty() {
			return Err(KeyParseError::EmptySegment { segment: "client_id" });
		}

		Ok(Self::new(environment, client_id))
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn account_key_round_trips_and_lowercases() {
		let key = AccountKey::new("Uid.Utid", "Login.Windows.Net", "Tenant");
		let rendered = key.render();

		assert_eq!(rendered, "uid.utid-login.windows.net-tenant");

		let parsed = AccountKey::from_str(&rendered).expect("Rendered key should parse.");

		assert_eq!(parsed, key);
	}

	#[test]
	fn credential_key_round_trips_with_empty_and_scoped_targets() {
		let target = ScopeSet::new(["User.Read", "openid"]).expect("Target should be valid.");
		let access = CredentialKey::new(
			"uid.utid",
			"login.windows.net",
			CredentialKind::AccessToken,
			"client",
			"tenant",
			target.clone(),
		);
		let rendered = access.render();

		assert_eq!(rendered, "uid.utid-login.windows.net-accesstoken-client-tenant-openid user.read");

		let parsed = CredentialKey::from_str(&rendered).expect("Rendered key should parse.");

		assert_eq!(parsed, access);

		let refresh = CredentialKey::new(
			"uid.utid",
			"login.windows.net",
			CredentialKind::RefreshToken,
			"client",
			"",
			ScopeSet::default(),
		);
		let parsed = CredentialKey::from_str(&refresh.render())
			.expect("Refresh key with empty realm and target should parse.");

		assert_eq!(parsed, refresh);
	}

	#[test]
	fn malformed_keys_are_rejected_not_partially_parsed() {
		assert!(AccountKey::from_str("only-two").is_err());
		assert!(AccountKey::from_str("-env-realm").is_err());
		assert!(CredentialKey::from_str("uid.utid-env-sometoken-client-realm-").is_err());
		assert!(CredentialKey::from_str("uid.utid-env-accesstoken-client").is_err());
		assert!(AppMetadataKey::from_str("notmetadata-env-client").is_err());
	}

	#[test]
	fn kind_classification_survives_embedded_separators() {
		let key = "uid.utid-login.windows.net-refreshtoken-11111111-2222-3333-4444-555555555555--";

		assert_eq!(CredentialKey::kind_of(key), Some(CredentialKind::RefreshToken));
		assert_eq!(CredentialKey::kind_of("uid.utid-env-realm"), None);
	}

	#[test]
	fn app_metadata_key_round_trips() {
		let key = AppMetadataKey::new("login.windows.net", "Client-App");
		let rendered = key.render();

		assert!(AppMetadataKey::matches(&rendered));

		// The client id embeds the separator, so the strict parse rejects it even
		// though rendering and exact-match lookup still work.
		assert!(AppMetadataKey::from_str(&rendered).is_err());

		let simple = AppMetadataKey::new("login.windows.net", "client");
		let parsed =
			AppMetadataKey::from_str(&simple.render()).expect("Simple key should parse.");

		assert_eq!(parsed, simple);
	}
}
