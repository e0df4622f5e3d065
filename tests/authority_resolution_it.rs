#![cfg(feature = "test")]

// self
use oidc_silent_core::{
	_preludet::*,
	authority::{AuthorityResolver, MetadataSource},
	cache::CacheManager,
	error::AuthorityResolutionError,
	platform::MemoryStorage,
};

const AUTHORITY: &str = "https://login.discovered.example/tenant-a";
const HOST: &str = "login.discovered.example";

fn build_resolver() -> (AuthorityResolver, MockNetwork, TestClock) {
	let cache = CacheManager::new(Arc::new(MemoryStorage::default()));
	let network = MockNetwork::default();
	let clock = TestClock::default();
	let resolver =
		AuthorityResolver::new(cache, Arc::new(network.clone()), Arc::new(clock.clone()));

	(resolver, network, clock)
}

fn instance_discovery_body() -> String {
	format!(
		"{{\"tenant_discovery_endpoint\":\"https://{HOST}/tenant-a/v2.0/.well-known/openid-configuration\",\
		\"metadata\":[{{\"preferred_network\":\"{HOST}\",\"preferred_cache\":\"{HOST}\",\
		\"aliases\":[\"{HOST}\",\"sts.discovered.example\"]}}]}}",
	)
}

fn openid_configuration_body() -> String {
	format!(
		"{{\"token_endpoint\":\"https://{HOST}/tenant-a/oauth2/v2.0/token\",\
		\"authorization_endpoint\":\"https://{HOST}/tenant-a/oauth2/v2.0/authorize\",\
		\"end_session_endpoint\":\"https://{HOST}/tenant-a/oauth2/v2.0/logout\"}}",
	)
}

#[tokio::test]
async fn hardcoded_clouds_resolve_without_the_network() {
	let (resolver, network, _) = build_resolver();
	let resolved = resolver
		.resolve_endpoint_metadata("https://login.microsoftonline.com/organizations")
		.await
		.expect("A well-known cloud should resolve offline.");

	assert_eq!(resolved.source, MetadataSource::Hardcoded);
	assert_eq!(resolved.preferred_cache, "login.windows.net");
	assert!(resolved.aliases.iter().any(|alias| alias == "sts.windows.net"));
	assert_eq!(
		resolved.endpoints.token.as_str(),
		"https://login.microsoftonline.com/organizations/oauth2/v2.0/token",
	);
	assert_eq!(network.request_count(), 0);
}

#[tokio::test]
async fn unknown_hosts_resolve_over_the_network_and_cache_the_result() {
	let (resolver, network, _) = build_resolver();

	network.enqueue(200, instance_discovery_body());
	network.enqueue(200, openid_configuration_body());

	let resolved = resolver
		.resolve_endpoint_metadata(AUTHORITY)
		.await
		.expect("Discovery against a trusted host should succeed.");

	assert_eq!(resolved.source, MetadataSource::Network);
	assert!(resolved.aliases.iter().any(|alias| alias == "sts.discovered.example"));
	assert_eq!(
		resolved.endpoints.token.as_str(),
		&format!("https://{HOST}/tenant-a/oauth2/v2.0/token"),
	);
	assert_eq!(network.request_count(), 2);

	// A second resolution is served from the cached entity, no further network calls.
	let cached = resolver
		.resolve_endpoint_metadata(AUTHORITY)
		.await
		.expect("The cached entity should satisfy re-resolution.");

	assert_eq!(cached.source, MetadataSource::Cache);
	assert_eq!(network.request_count(), 2);
}

#[tokio::test]
async fn expired_cached_metadata_is_re_resolved() {
	let (resolver, network, clock) = build_resolver();

	network.enqueue(200, instance_discovery_body());
	network.enqueue(200, openid_configuration_body());
	resolver
		.resolve_endpoint_metadata(AUTHORITY)
		.await
		.expect("Initial discovery should succeed.");
	clock.advance(Duration::hours(25));
	network.enqueue(200, instance_discovery_body());
	network.enqueue(200, openid_configuration_body());

	let resolved = resolver
		.resolve_endpoint_metadata(AUTHORITY)
		.await
		.expect("Re-resolution after expiry should succeed.");

	assert_eq!(resolved.source, MetadataSource::Network);
	assert_eq!(network.request_count(), 4);
}

#[tokio::test]
async fn rejected_instance_discovery_is_an_untrusted_authority() {
	let (resolver, network, _) = build_resolver();

	network.enqueue(400, "{\"error\":\"invalid_instance\"}");

	let err = resolver
		.resolve_endpoint_metadata(AUTHORITY)
		.await
		.expect_err("A rejected discovery must fail resolution.");

	assert!(matches!(
		err,
		Error::AuthorityResolution(AuthorityResolutionError::UntrustedAuthority { host }) if host == HOST
	));
}

#[tokio::test]
async fn static_config_overrides_every_other_source() {
	let (resolver, network, _) = build_resolver();
	let resolver = resolver.with_static_config(test_cloud_config());
	let resolved = resolver
		.resolve_endpoint_metadata(TEST_AUTHORITY)
		.await
		.expect("A statically configured host should resolve offline.");

	assert_eq!(resolved.source, MetadataSource::Config);
	assert_eq!(resolved.preferred_cache, TEST_AUTHORITY_HOST);
	assert_eq!(network.request_count(), 0);
}

#[tokio::test]
async fn hosts_omitted_from_a_trusted_response_form_their_own_class() {
	let (resolver, network, _) = build_resolver();

	// The service answers, but its metadata does not mention this host.
	network.enqueue(200, "{\"metadata\":[]}");
	network.enqueue(200, openid_configuration_body());

	let resolved = resolver
		.resolve_endpoint_metadata(AUTHORITY)
		.await
		.expect("A trusted response without the host should still resolve.");

	assert_eq!(resolved.aliases, vec![HOST.to_string()]);
	assert_eq!(resolved.preferred_cache, HOST);
}
