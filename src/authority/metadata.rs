//! Static authority metadata sources: discovery document shapes and the hardcoded
//! well-known cloud table.

// std
use std::sync::OnceLock;
// self
use crate::_prelude::*;

/// One cloud entry of an instance discovery document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudDiscoveryMetadata {
	/// Hostname preferred for network calls.
	pub preferred_network: String,
	/// Hostname preferred for cache partitioning.
	pub preferred_cache: String,
	/// Equivalence class of interchangeable hostnames.
	pub aliases: Vec<String>,
}
impl CloudDiscoveryMetadata {
	/// Builds a trivial entry treating `host` as its own one-member alias class.
	pub fn from_host(host: &str) -> Self {
		let host = host.to_lowercase();

		Self { preferred_network: host.clone(), preferred_cache: host.clone(), aliases: vec![host] }
	}
}

/// Instance/cloud discovery response body.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct InstanceDiscoveryResponse {
	/// Tenant discovery endpoint advertised by the service.
	#[serde(default)]
	pub tenant_discovery_endpoint: Option<String>,
	/// Cloud entries keyed by alias membership.
	#[serde(default)]
	pub metadata: Vec<CloudDiscoveryMetadata>,
}

/// Subset of an OIDC discovery document the core consumes.
#[derive(Clone, Debug, Deserialize)]
pub struct OpenIdConfiguration {
	/// OAuth2 token endpoint.
	pub token_endpoint: String,
	/// OAuth2 authorization endpoint.
	pub authorization_endpoint: String,
	/// OIDC end-session endpoint, when published.
	#[serde(default)]
	pub end_session_endpoint: Option<String>,
	/// Issuer identifier, when published.
	#[serde(default)]
	pub issuer: Option<String>,
}

/// Hardcoded alias classes for the well-known public clouds.
///
/// Initialized lazily, shared process-wide, and never written after initialization, so
/// it is safe to consult from concurrent logical operations.
pub fn well_known_clouds() -> &'static [CloudDiscoveryMetadata] {
	static CLOUDS: OnceLock<Vec<CloudDiscoveryMetadata>> = OnceLock::new();

	CLOUDS.get_or_init(|| {
		vec![
			CloudDiscoveryMetadata {
				preferred_network: "login.microsoftonline.com".into(),
				preferred_cache: "login.windows.net".into(),
				aliases: vec![
					"login.microsoftonline.com".into(),
					"login.windows.net".into(),
					"login.microsoft.com".into(),
					"sts.windows.net".into(),
				],
			},
			CloudDiscoveryMetadata {
				preferred_network: "login.partner.microsoftonline.cn".into(),
				preferred_cache: "login.partner.microsoftonline.cn".into(),
				aliases: vec![
					"login.partner.microsoftonline.cn".into(),
					"login.chinacloudapi.cn".into(),
				],
			},
			CloudDiscoveryMetadata {
				preferred_network: "login.microsoftonline.de".into(),
				preferred_cache: "login.microsoftonline.de".into(),
				aliases: vec!["login.microsoftonline.de".into()],
			},
			CloudDiscoveryMetadata {
				preferred_network: "login.microsoftonline.us".into(),
				preferred_cache: "login.microsoftonline.us".into(),
				aliases: vec!["login.microsoftonline.us".into(), "login.usgovcloudapi.net".into()],
			},
			CloudDiscoveryMetadata {
				preferred_network: "login-us.microsoftonline.com".into(),
				preferred_cache: "login-us.microsoftonline.com".into(),
				aliases: vec!["login-us.microsoftonline.com".into()],
			},
		]
	})
}

/// Finds the discovery entry whose alias class contains `host`.
pub fn entry_for_host<'a>(
	metadata: &'a [CloudDiscoveryMetadata],
	host: &str,
) -> Option<&'a CloudDiscoveryMetadata> {
	metadata.iter().find(|entry| entry.aliases.iter().any(|alias| alias.eq_ignore_ascii_case(host)))
}

/// Returns the hardcoded alias class for `host`, when it belongs to a well-known cloud.
pub fn well_known_alias_class(host: &str) -> Option<&'static [String]> {
	entry_for_host(well_known_clouds(), host).map(|entry| entry.aliases.as_slice())
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn well_known_clouds_cover_public_cloud_aliases() {
		let class = well_known_alias_class("login.microsoftonline.com")
			.expect("Public cloud host should be hardcoded.");

		assert!(class.iter().any(|alias| alias == "sts.windows.net"));
		assert!(well_known_alias_class("login.example.org").is_none());
	}

	#[test]
	fn entry_lookup_is_case_insensitive() {
		let entry = entry_for_host(well_known_clouds(), "LOGIN.WINDOWS.NET")
			.expect("Alias lookup should ignore case.");

		assert_eq!(entry.preferred_cache, "login.windows.net");
	}

	#[test]
	fn from_host_builds_single_member_class() {
		let entry = CloudDiscoveryMetadata::from_host("Login.Contoso.Com");

		assert_eq!(entry.aliases, vec!["login.contoso.com".to_string()]);
		assert_eq!(entry.preferred_network, entry.preferred_cache);
	}
}
