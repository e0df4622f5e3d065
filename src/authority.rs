//! Authority trust resolution.
//!
//! A configured authority string resolves into an alias-normalized, trusted authority
//! plus its OIDC endpoint metadata. Resolution consults sources strictly in order:
//! caller-supplied static config, the hardcoded well-known cloud table, an unexpired
//! cached [`AuthorityMetadataEntity`], and finally live network discovery whose result
//! is written back to the cache. The first source yielding a non-empty alias set wins;
//! sources are never merged.

pub mod metadata;

pub use metadata::{CloudDiscoveryMetadata, InstanceDiscoveryResponse, OpenIdConfiguration};

// self
use crate::{
	_prelude::*,
	cache::{CacheManager, entity::AuthorityMetadataEntity},
	error::{AuthorityResolutionError, ConfigError},
	platform::{ClockCapability, NetworkCapability},
};

/// Which source satisfied an authority resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetadataSource {
	/// Caller-supplied static configuration.
	Config,
	/// Hardcoded well-known cloud table.
	Hardcoded,
	/// Previously cached, unexpired metadata entity.
	Cache,
	/// Live network discovery.
	Network,
}

/// OIDC endpoints for a resolved authority.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthorityEndpoints {
	/// OAuth2 token endpoint.
	pub token: Url,
	/// OAuth2 authorization endpoint.
	pub authorization: Url,
	/// OIDC end-session endpoint, when published.
	pub end_session: Option<Url>,
}

/// Alias-normalized authority with its endpoint metadata.
#[derive(Clone, Debug)]
pub struct ResolvedAuthority {
	/// Canonical authority URL as configured.
	pub canonical: Url,
	/// Authority host component.
	pub host: String,
	/// Tenant path segment (`common` when absent).
	pub tenant: String,
	/// Resolved OIDC endpoints.
	pub endpoints: AuthorityEndpoints,
	/// Alias equivalence class of interchangeable hostnames.
	pub aliases: Vec<String>,
	/// Hostname preferred for cache partitioning.
	pub preferred_cache: String,
	/// Source that satisfied the resolution.
	pub source: MetadataSource,
}

/// Resolves configured authority strings into trusted, alias-normalized metadata.
#[derive(Clone)]
pub struct AuthorityResolver {
	cache: CacheManager,
	network: Arc<dyn NetworkCapability>,
	clock: Arc<dyn ClockCapability>,
	static_config: Option<Vec<CloudDiscoveryMetadata>>,
}
impl AuthorityResolver {
	/// Creates a resolver over the shared cache and network capabilities.
	pub fn new(
		cache: CacheManager,
		network: Arc<dyn NetworkCapability>,
		clock: Arc<dyn ClockCapability>,
	) -> Self {
		Self { cache, network, clock, static_config: None }
	}

	/// Supplies an explicit static cloud discovery table consulted before any other source.
	pub fn with_static_config(mut self, config: Vec<CloudDiscoveryMetadata>) -> Self {
		self.static_config = Some(config);

		self
	}

	/// Resolves the authority's endpoint metadata and alias class.
	pub async fn resolve_endpoint_metadata(&self, authority: &str) -> Result<ResolvedAuthority> {
		let canonical = parse_authority(authority)?;
		let host =
			canonical.host_str().ok_or(ConfigError::AuthorityMissingHost)?.to_lowercase();
		let tenant = tenant_segment(&canonical);

		if let Some(config) = &self.static_config {
			if let Some(entry) = metadata::entry_for_host(config, &host) {
				return Ok(self.from_static_entry(
					&canonical,
					&host,
					&tenant,
					entry,
					MetadataSource::Config,
				)?);
			}
		}
		if let Some(entry) = metadata::entry_for_host(metadata::well_known_clouds(), &host) {
			return Ok(self.from_static_entry(
				&canonical,
				&host,
				&tenant,
				entry,
				MetadataSource::Hardcoded,
			)?);
		}
		if let Some(entity) = self.cache.get_authority_metadata(&host) {
			if !entity.is_expired_at(self.clock.now()) && !entity.aliases.is_empty() {
				return Ok(from_cached_entity(&canonical, &host, &tenant, &entity)?);
			}
		}

		self.resolve_from_network(&canonical, &host, &tenant).await
	}

	/// Resolves only the alias equivalence class for the authority.
	pub async fn resolve_aliases(&self, authority: &str) -> Result<Vec<String>> {
		Ok(self.resolve_endpoint_metadata(authority).await?.aliases)
	}

	fn from_static_entry(
		&self,
		canonical: &Url,
		host: &str,
		tenant: &str,
		entry: &CloudDiscoveryMetadata,
		source: MetadataSource,
	) -> Result<ResolvedAuthority> {
		Ok(ResolvedAuthority {
			canonical: canonical.clone(),
			host: host.to_owned(),
			tenant: tenant.to_owned(),
			endpoints: templated_endpoints(canonical, tenant)?,
			aliases: entry.aliases.clone(),
			preferred_cache: entry.preferred_cache.to_lowercase(),
			source,
		})
	}

	/// Performs instance discovery plus the OIDC discovery document fetch and writes
	/// the result back as a fresh cached entity.
	async fn resolve_from_network(
		&self,
		canonical: &Url,
		host: &str,
		tenant: &str,
	) -> Result<ResolvedAuthority> {
		let instance_url = instance_discovery_url(canonical, host, tenant)?;
		let instance_response = self.network.get(instance_url).await.map_err(|e| {
			AuthorityResolutionError::InstanceDiscovery { message: e.message }
		})?;

		if !instance_response.is_success() {
			return Err(AuthorityResolutionError::UntrustedAuthority { host: host.to_owned() }.into());
		}

		let discovery: InstanceDiscoveryResponse = parse_document(&instance_response.body)?;
		// A trusted response that simply omits this host yields a one-member class.
		let cloud_entry = metadata::entry_for_host(&discovery.metadata, host)
			.cloned()
			.unwrap_or_else(|| CloudDiscoveryMetadata::from_host(host));
		let openid_url = openid_configuration_url(canonical, tenant)?;
		let openid_response = self.network.get(openid_url).await.map_err(|e| {
			AuthorityResolutionError::OpenIdConfiguration { message: e.message }
		})?;

		if !openid_response.is_success() {
			return Err(AuthorityResolutionError::OpenIdConfiguration {
				message: format!("status {}", openid_response.status),
			}
			.into());
		}

		let configuration: OpenIdConfiguration = parse_document(&openid_response.body)?;
		let mut entity = AuthorityMetadataEntity {
			preferred_network: cloud_entry.preferred_network.to_lowercase(),
			preferred_cache: cloud_entry.preferred_cache.to_lowercase(),
			aliases: cloud_entry.aliases.clone(),
			aliases_from_network: true,
			token_endpoint: configuration.token_endpoint.clone(),
			authorization_endpoint: configuration.authorization_endpoint.clone(),
			end_session_endpoint: configuration.end_session_endpoint.clone(),
			expires_at: self.clock.now(),
		};

		entity.stamp_expiry(self.clock.now());
		self.cache.save_authority_metadata(&entity)?;

		Ok(ResolvedAuthority {
			canonical: canonical.clone(),
			host: host.to_owned(),
			tenant: tenant.to_owned(),
			endpoints: endpoints_from_strings(
				&configuration.token_endpoint,
				&configuration.authorization_endpoint,
				configuration.end_session_endpoint.as_deref(),
			)?,
			aliases: cloud_entry.aliases,
			preferred_cache: cloud_entry.preferred_cache.to_lowercase(),
			source: MetadataSource::Network,
		})
	}
}
impl Debug for AuthorityResolver {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthorityResolver")
			.field("static_config", &self.static_config.is_some())
			.finish_non_exhaustive()
	}
}

fn from_cached_entity(
	canonical: &Url,
	host: &str,
	tenant: &str,
	entity: &AuthorityMetadataEntity,
) -> Result<ResolvedAuthority, ConfigError> {
	Ok(ResolvedAuthority {
		canonical: canonical.clone(),
		host: host.to_owned(),
		tenant: tenant.to_owned(),
		endpoints: endpoints_from_strings(
			&entity.token_endpoint,
			&entity.authorization_endpoint,
			entity.end_session_endpoint.as_deref(),
		)?,
		aliases: entity.aliases.clone(),
		preferred_cache: entity.preferred_cache.to_lowercase(),
		source: MetadataSource::Cache,
	})
}

fn parse_authority(authority: &str) -> Result<Url, ConfigError> {
	Url::parse(authority).map_err(|source| ConfigError::InvalidAuthority { source })
}

fn tenant_segment(canonical: &Url) -> String {
	canonical
		.path_segments()
		.and_then(|mut segments| segments.next())
		.filter(|segment| !segment.is_empty())
		.unwrap_or("common")
		.to_lowercase()
}

fn templated_endpoints(canonical: &Url, tenant: &str) -> Result<AuthorityEndpoints, ConfigError> {
	let base = format!(
		"{}://{}/{tenant}",
		canonical.scheme(),
		canonical.host_str().ok_or(ConfigError::AuthorityMissingHost)?,
	);

	endpoints_from_strings(
		&format!("{base}/oauth2/v2.0/token"),
		&format!("{base}/oauth2/v2.0/authorize"),
		Some(&format!("{base}/oauth2/v2.0/logout")),
	)
}

fn endpoints_from_strings(
	token: &str,
	authorization: &str,
	end_session: Option<&str>,
) -> Result<AuthorityEndpoints, ConfigError> {
	let parse =
		|value: &str| Url::parse(value).map_err(|source| ConfigError::InvalidAuthority { source });

	Ok(AuthorityEndpoints {
		token: parse(token)?,
		authorization: parse(authorization)?,
		end_session: end_session.map(parse).transpose()?,
	})
}

fn instance_discovery_url(canonical: &Url, host: &str, tenant: &str) -> Result<Url, ConfigError> {
	let authorize = format!("{}://{host}/{tenant}/oauth2/v2.0/authorize", canonical.scheme());
	let raw = format!(
		"{}://{host}/common/discovery/instance?api-version=1.1&authorization_endpoint={authorize}",
		canonical.scheme(),
	);

	Url::parse(&raw).map_err(|source| ConfigError::InvalidAuthority { source })
}

fn openid_configuration_url(canonical: &Url, tenant: &str) -> Result<Url, ConfigError> {
	let raw = format!(
		"{}://{}/{tenant}/v2.0/.well-known/openid-configuration",
		canonical.scheme(),
		canonical.host_str().ok_or(ConfigError::AuthorityMissingHost)?,
	);

	Url::parse(&raw).map_err(|source| ConfigError::InvalidAuthority { source })
}

fn parse_document<T: for<'de> Deserialize<'de>>(body: &str) -> Result<T, AuthorityResolutionError> {
	let mut deserializer = serde_json::Deserializer::from_str(body);

	serde_path_to_error::deserialize(&mut deserializer)
		.map_err(|source| AuthorityResolutionError::MalformedDiscoveryDocument { source })
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn tenant_segment_defaults_to_common() {
		let with_tenant = Url::parse("https://login.contoso.com/my-tenant")
			.expect("Authority fixture should parse.");
		let bare = Url::parse("https://login.contoso.com").expect("Bare fixture should parse.");

		assert_eq!(tenant_segment(&with_tenant), "my-tenant");
		assert_eq!(tenant_segment(&bare), "common");
	}

	#[test]
	fn templated_endpoints_follow_the_authority() {
		let canonical = Url::parse("https://login.microsoftonline.com/organizations")
			.expect("Authority fixture should parse.");
		let endpoints = templated_endpoints(&canonical, "organizations")
			.expect("Endpoint templating should succeed.");

		assert_eq!(
			endpoints.token.as_str(),
			"https://login.microsoftonline.com/organizations/oauth2/v2.0/token",
		);
	}

	#[test]
	fn malformed_discovery_documents_surface_the_failing_path() {
		let err = parse_document::<OpenIdConfiguration>("{\"token_endpoint\":42}")
			.expect_err("Malformed document must be rejected.");

		assert!(matches!(
			err,
			AuthorityResolutionError::MalformedDiscoveryDocument { .. }
		));
	}
}
