//! Silent token acquisition orchestration.
//!
//! The flow serves cached access tokens whenever possible, schedules a detached
//! proactive refresh when a served token is near expiry, and falls back to a
//! synchronous refresh-token exchange on a miss, an expired token, or a forced
//! refresh. Concurrent acquisitions for the same request shape are intentionally
//! not deduplicated; each drives its own exchange and last-writer-wins in the cache.

// self
use crate::{
	_prelude::*,
	auth::{ClientInfo, IdTokenClaims, ScopeSet, TokenSecret},
	authority::{AuthorityResolver, CloudDiscoveryMetadata, ResolvedAuthority},
	cache::{
		CacheManager,
		entity::{
			AccountEntity, AppMetadataEntity, CredentialEntity, CredentialKind, FAMILY_ID,
		},
		manager::{AccountFilter, CredentialFilter},
	},
	error::ConfigError,
	flows::response::{self, TokenErrorPayload, TokenResponsePayload},
	obs::{MeasurementGuard, OperationKind, OperationSpan, PerfCorrelator},
	platform::{
		ClockCapability, CryptoCapability, NetworkCapability, StorageCapability, TaskSpawner,
	},
	throttle::{RequestThumbprint, ThrottlingGuard},
};

/// Refresh-ahead window applied when the host does not configure one.
pub const DEFAULT_REFRESH_WINDOW: Duration = Duration::minutes(5);

/// Tenant segments that defer to the cached account's realm.
const TENANT_PLACEHOLDERS: &[&str] = &["common", "organizations", "consumers"];

/// Static configuration for a [`SilentFlow`].
#[derive(Clone, Debug)]
pub struct SilentFlowConfig {
	/// Client id of the application acquiring tokens.
	pub client_id: String,
	/// Refresh-ahead window preceding access token expiry.
	pub refresh_window: Duration,
	/// Whether near-expiry cache hits schedule a detached background refresh.
	pub proactive_refresh: bool,
}
impl SilentFlowConfig {
	/// Creates a configuration with the default refresh window and proactive refresh on.
	pub fn new(client_id: impl Into<String>) -> Self {
		Self {
			client_id: client_id.into(),
			refresh_window: DEFAULT_REFRESH_WINDOW,
			proactive_refresh: true,
		}
	}
}

/// One silent acquisition request.
#[derive(Clone, Debug)]
pub struct SilentRequest {
	/// Home account id of the signed-in identity, `{uid}.{utid}` shape.
	pub home_account_id: String,
	/// Authority URL the token must come from.
	pub authority: String,
	/// Scopes the caller needs.
	pub scopes: ScopeSet,
	/// Correlation id tying this request to its telemetry; generated when absent.
	pub correlation_id: Option<String>,
	/// Skips the cache and forces a synchronous refresh.
	pub force_refresh: bool,
}

/// Outcome of a silent acquisition.
#[derive(Clone, Debug)]
pub struct TokenResult {
	/// The access token itself.
	pub access_token: TokenSecret,
	/// Token type, usually `Bearer`.
	pub token_type: String,
	/// Scopes the token is valid for.
	pub scopes: ScopeSet,
	/// Expiry instant of the access token.
	pub expires_on: Option<OffsetDateTime>,
	/// Cached id token for the account, when one exists.
	pub id_token: Option<TokenSecret>,
	/// Whether the token was served from the cache without a network call.
	pub from_cache: bool,
	/// Account the token belongs to.
	pub account: AccountEntity,
	/// Correlation id of the operation.
	pub correlation_id: String,
}

/// Orchestrates silent token acquisition over the injected platform capabilities.
#[derive(Clone)]
pub struct SilentFlow {
	cache: CacheManager,
	resolver: AuthorityResolver,
	throttle: ThrottlingGuard,
	network: Arc<dyn NetworkCapability>,
	crypto: Arc<dyn CryptoCapability>,
	clock: Arc<dyn ClockCapability>,
	spawner: Arc<dyn TaskSpawner>,
	perf: Option<Arc<PerfCorrelator>>,
	config: SilentFlowConfig,
}
impl SilentFlow {
	/// Creates a flow over the provided configuration and platform capabilities.
	pub fn new(
		config: SilentFlowConfig,
		storage: Arc<dyn StorageCapability>,
		network: Arc<dyn NetworkCapability>,
		crypto: Arc<dyn CryptoCapability>,
		clock: Arc<dyn ClockCapability>,
		spawner: Arc<dyn TaskSpawner>,
	) -> Self {
		let cache = CacheManager::new(storage);
		let resolver = AuthorityResolver::new(cache.clone(), network.clone(), clock.clone());
		let throttle = ThrottlingGuard::new(cache.clone(), clock.clone());

		Self { cache, resolver, throttle, network, crypto, clock, spawner, perf: None, config }
	}

	/// Attaches a performance correlator; every acquisition then emits one event.
	pub fn with_perf(mut self, perf: Arc<PerfCorrelator>) -> Self {
		self.perf = Some(perf);

		self
	}

	/// Supplies a static cloud discovery table consulted before any other metadata source.
	pub fn with_static_cloud_config(mut self, config: Vec<CloudDiscoveryMetadata>) -> Self {
		self.resolver = self.resolver.with_static_config(config);

		self
	}

	/// Shared cache manager, for host-level account enumeration and sign-out.
	pub fn cache(&self) -> &CacheManager {
		&self.cache
	}

	/// Acquires a token for the request, from the cache when possible.
	///
	/// A near-expiry cache hit is still served from the cache; when proactive refresh
	/// is enabled it additionally schedules a detached refresh whose failure is logged
	/// and never surfaced. A miss, an expired token, or `force_refresh` runs one
	/// synchronous refresh-token exchange gated by the throttling guard.
	pub async fn acquire_token_silent(&self, request: SilentRequest) -> Result<TokenResult> {
		let correlation_id =
			request.correlation_id.clone().unwrap_or_else(|| self.crypto.new_guid());
		let top = self.start_measurement(OperationKind::AcquireTokenSilent, &correlation_id);
		let span = OperationSpan::new(OperationKind::AcquireTokenSilent, "acquire");
		let result = span.instrument(self.acquire_inner(&request, &correlation_id)).await;

		end_measurement(top, result.is_ok());

		if let Some(perf) = &self.perf {
			perf.flush_measurements(OperationKind::AcquireTokenSilent.as_str(), &correlation_id);
		}

		result
	}

	async fn acquire_inner(
		&self,
		request: &SilentRequest,
		correlation_id: &str,
	) -> Result<TokenResult> {
		if self.config.client_id.is_empty() {
			return Err(ConfigError::MissingParameter { parameter: "client_id" }.into());
		}
		if request.home_account_id.is_empty() {
			return Err(ConfigError::MissingParameter { parameter: "home_account_id" }.into());
		}
		if request.scopes.is_empty() {
			return Err(ConfigError::MissingParameter { parameter: "scopes" }.into());
		}

		let resolve = self.start_measurement(OperationKind::AuthorityResolution, correlation_id);
		let resolved = self.resolver.resolve_endpoint_metadata(&request.authority).await;

		end_measurement(resolve, resolved.is_ok());

		let resolved = resolved?;
		let environment = resolved.preferred_cache.clone();
		let account_filter = AccountFilter::default()
			.with_home_account_id(&request.home_account_id)
			.with_environment(&environment);
		let Some(account) = self.cache.get_account_by_filter(&account_filter) else {
			return Err(Error::InteractionRequired {
				error_code: "no_account_found".into(),
				error_description: Some(
					"No cached account matches the request; sign in interactively.".into(),
				),
				sub_error: None,
				correlation_id: Some(correlation_id.to_owned()),
			});
		};
		let realm = self.realm_for(&resolved, &account);
		let now = self.clock.now();
		let lookup = self.start_measurement(OperationKind::SilentCacheLookup, correlation_id);
		let cached = (!request.force_refresh)
			.then(|| {
				self.cache.find_access_token(&CredentialFilter {
					home_account_id: Some(request.home_account_id.clone()),
					environment: Some(environment.clone()),
					client_id: Some(self.config.client_id.clone()),
					realm: Some(realm.clone()),
					target: Some(request.scopes.clone()),
					..Default::default()
				})
			})
			.flatten()
			.filter(|token| !token.is_expired_at(now));

		end_measurement(lookup, cached.is_some());

		if let Some(token) = cached {
			if self.config.proactive_refresh
				&& token.within_refresh_window(now, self.config.refresh_window)
			{
				self.spawn_background_refresh(&resolved, &account, &request.scopes);
			}

			return Ok(self.result_from_cache(token, account, correlation_id));
		}

		self.refresh_access_token(&resolved, &account, &request.scopes, correlation_id).await
	}

	/// Runs one synchronous refresh-token exchange and persists the issued material.
	async fn refresh_access_token(
		&self,
		resolved: &ResolvedAuthority,
		account: &AccountEntity,
		scopes: &ScopeSet,
		correlation_id: &str,
	) -> Result<TokenResult> {
		let thumbprint = RequestThumbprint {
			client_id: self.config.client_id.clone(),
			authority: resolved.canonical.as_str().to_owned(),
			scopes: scopes.clone(),
			home_account_id: Some(account.home_account_id.clone()),
		}
		.hash(self.crypto.as_ref());

		self.throttle.check(&thumbprint, correlation_id)?;

		let Some(refresh_token) =
			self.find_refresh_token(&resolved.preferred_cache, &account.home_account_id)
		else {
			return Err(Error::InteractionRequired {
				error_code: "no_tokens_found".into(),
				error_description: Some(
					"No refresh token is cached for the account; sign in interactively.".into(),
				),
				sub_error: None,
				correlation_id: Some(correlation_id.to_owned()),
			});
		};
		let body = refresh_form(&self.config.client_id, refresh_token.secret.expose(), scopes);
		let exchange = self.start_measurement(OperationKind::RefreshTokenExchange, correlation_id);
		let response = self
			.network
			.post_form(resolved.endpoints.token.clone(), body)
			.await
			.map_err(|e| Error::Transport {
				endpoint: "token",
				message: e.message,
				correlation_id: Some(correlation_id.to_owned()),
			});

		end_measurement(exchange, response.as_ref().is_ok_and(|r| r.is_success()));

		let response = response?;

		if !response.is_success() {
			let payload = TokenErrorPayload::parse(&response.body);

			if ThrottlingGuard::is_throttle_signal(response.status, response.retry_after) {
				self.throttle.record_throttle(
					&thumbprint,
					response.retry_after,
					response.status,
					payload.error.as_deref(),
					payload.error_description.as_deref(),
				)?;
			}

			return Err(response::classify_token_error(response.status, payload, correlation_id));
		}

		let payload = response::parse_token_success(&response, correlation_id)?;
		let result = self.persist_issued_material(resolved, account, scopes, payload, correlation_id)?;

		self.throttle.clear_throttle(&thumbprint)?;

		Ok(result)
	}

	/// Writes every entity issued by a successful exchange before returning the token.
	fn persist_issued_material(
		&self,
		resolved: &ResolvedAuthority,
		account: &AccountEntity,
		requested: &ScopeSet,
		payload: TokenResponsePayload,
		correlation_id: &str,
	) -> Result<TokenResult> {
		let access_token = payload.access_token.ok_or(ConfigError::MissingAccessToken)?;
		let expires_in = payload.expires_in.ok_or(ConfigError::MissingExpiresIn)?;
		let now = self.clock.now();
		let environment = resolved.preferred_cache.clone();
		let granted = payload
			.scope
			.as_deref()
			.and_then(|scope| scope.parse::<ScopeSet>().ok())
			.filter(|scope| !scope.is_empty())
			.unwrap_or_else(|| requested.clone());
		let mut account = account.clone();

		if let Some(raw) = &payload.client_info {
			account.home_account_id = ClientInfo::decode(raw)?.home_account_id();
			account.client_info = Some(raw.clone());
		}

		let claims = payload.id_token.as_deref().map(IdTokenClaims::decode).transpose()?;

		if let Some(claims) = &claims {
			if let Some(username) = &claims.preferred_username {
				account.username = username.clone();
			}
			if let Some(local_account_id) = claims.local_account_id() {
				account.local_account_id = local_account_id.to_owned();
			}
			if let Some(tid) = &claims.tid {
				account.realm = tid.clone();
			}
			if claims.sid.is_some() {
				account.sid = claims.sid.clone();
			}
		}

		let realm = match claims.as_ref().and_then(|claims| claims.tid.clone()) {
			Some(tid) => tid,
			None => self.realm_for(resolved, &account),
		};

		account.environment = environment.clone();

		self.cache.save_account(&account)?;

		let token_type = payload.token_type.unwrap_or_else(|| "Bearer".into());
		let expires_on = now + Duration::seconds(expires_in);
		let access = CredentialEntity {
			home_account_id: account.home_account_id.clone(),
			environment: environment.clone(),
			credential_type: CredentialKind::AccessToken,
			client_id: self.config.client_id.clone(),
			realm: realm.clone(),
			target: granted.clone(),
			secret: TokenSecret::new(access_token),
			cached_at: now,
			expires_on: Some(expires_on),
			extended_expires_on: payload
				.ext_expires_in
				.map(|seconds| now + Duration::seconds(seconds)),
			token_type: Some(token_type.clone()),
			user_assertion_hash: None,
			key_id: None,
			family_id: None,
		};

		self.cache.save_credential(&access)?;

		if let Some(refresh_token) = payload.refresh_token {
			self.cache.save_credential(&CredentialEntity {
				credential_type: CredentialKind::RefreshToken,
				realm: String::new(),
				target: ScopeSet::default(),
				secret: TokenSecret::new(refresh_token),
				expires_on: None,
				extended_expires_on: None,
				token_type: None,
				family_id: payload.foci.clone(),
				..access.clone()
			})?;
		}

		let id_token = payload.id_token.map(TokenSecret::new);

		if let Some(id_token) = &id_token {
			self.cache.save_credential(&CredentialEntity {
				credential_type: CredentialKind::IdToken,
				target: ScopeSet::default(),
				secret: id_token.clone(),
				expires_on: None,
				extended_expires_on: None,
				token_type: None,
				..access.clone()
			})?;
		}
		if payload.foci.is_some() {
			self.cache.save_app_metadata(&AppMetadataEntity {
				environment,
				client_id: self.config.client_id.clone(),
				family_id: payload.foci,
			})?;
		}

		Ok(TokenResult {
			access_token: access.secret,
			token_type,
			scopes: granted,
			expires_on: Some(expires_on),
			id_token,
			from_cache: false,
			account,
			correlation_id: correlation_id.to_owned(),
		})
	}

	fn result_from_cache(
		&self,
		token: CredentialEntity,
		account: AccountEntity,
		correlation_id: &str,
	) -> TokenResult {
		let id_token = self
			.cache
			.get_credentials_filtered_by(&CredentialFilter {
				home_account_id: Some(account.home_account_id.clone()),
				environment: Some(token.environment.clone()),
				credential_type: Some(CredentialKind::IdToken),
				client_id: Some(self.config.client_id.clone()),
				realm: Some(token.realm.clone()),
				..Default::default()
			})
			.into_iter()
			.next()
			.map(|credential| credential.secret);

		TokenResult {
			access_token: token.secret,
			token_type: token.token_type.unwrap_or_else(|| "Bearer".into()),
			scopes: token.target,
			expires_on: token.expires_on,
			id_token,
			from_cache: true,
			account,
			correlation_id: correlation_id.to_owned(),
		}
	}

	/// Schedules a detached refresh; its outcome never reaches the caller.
	fn spawn_background_refresh(
		&self,
		resolved: &ResolvedAuthority,
		account: &AccountEntity,
		scopes: &ScopeSet,
	) {
		let flow = self.clone();
		let resolved = resolved.clone();
		let account = account.clone();
		let scopes = scopes.clone();
		let correlation_id = self.crypto.new_guid();

		self.spawner.spawn(Box::pin(async move {
			let guard =
				flow.start_measurement(OperationKind::BackgroundRefresh, &correlation_id);
			let result =
				flow.refresh_access_token(&resolved, &account, &scopes, &correlation_id).await;

			end_measurement(guard, result.is_ok());

			if let Some(perf) = &flow.perf {
				perf.flush_measurements(OperationKind::BackgroundRefresh.as_str(), &correlation_id);
			}
			if let Err(err) = result {
				crate::obs::log_background_failure(&err);
			}
		}));
	}

	/// Prefers a family refresh token when app metadata marks the client as a family
	/// member, falling back to the client's own refresh token.
	fn find_refresh_token(
		&self,
		environment: &str,
		home_account_id: &str,
	) -> Option<CredentialEntity> {
		let in_family = self
			.cache
			.get_app_metadata_by_filter(environment, &self.config.client_id)
			.is_some_and(|metadata| metadata.in_family());

		if in_family {
			let family = self
				.cache
				.get_credentials_filtered_by(&CredentialFilter {
					home_account_id: Some(home_account_id.to_owned()),
					environment: Some(environment.to_owned()),
					credential_type: Some(CredentialKind::RefreshToken),
					family_id: Some(FAMILY_ID.to_owned()),
					..Default::default()
				})
				.into_iter()
				.next();

			if family.is_some() {
				return family;
			}
		}

		self.cache
			.get_credentials_filtered_by(&CredentialFilter {
				home_account_id: Some(home_account_id.to_owned()),
				environment: Some(environment.to_owned()),
				credential_type: Some(CredentialKind::RefreshToken),
				client_id: Some(self.config.client_id.clone()),
				..Default::default()
			})
			.into_iter()
			.next()
	}

	/// Tenant-specific authorities pin the realm; placeholder tenants defer to the
	/// cached account's realm.
	fn realm_for(&self, resolved: &ResolvedAuthority, account: &AccountEntity) -> String {
		if TENANT_PLACEHOLDERS.contains(&resolved.tenant.as_str()) {
			account.realm.clone()
		} else {
			resolved.tenant.clone()
		}
	}

	fn start_measurement(
		&self,
		kind: OperationKind,
		correlation_id: &str,
	) -> Option<MeasurementGuard> {
		self.perf.as_ref().map(|perf| perf.start_measurement(kind.as_str(), correlation_id))
	}
}
impl Debug for SilentFlow {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SilentFlow").field("config", &self.config).finish_non_exhaustive()
	}
}

fn end_measurement(guard: Option<MeasurementGuard>, success: bool) {
	if let Some(guard) = guard {
		guard.end(success);
	}
}

fn refresh_form(client_id: &str, refresh_token: &str, scopes: &ScopeSet) -> String {
	url::form_urlencoded::Serializer::new(String::new())
		.append_pair("client_id", client_id)
		.append_pair("grant_type", "refresh_token")
		.append_pair("refresh_token", refresh_token)
		.append_pair("scope", &scopes.normalized())
		.append_pair("client_info", "1")
		.finish()
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn refresh_form_encodes_the_grant() {
		let scopes = ScopeSet::new(["User.Read", "openid"]).expect("Scope fixture should be valid.");
		let body = refresh_form("client-1", "rt-secret", &scopes);

		assert!(body.contains("grant_type=refresh_token"));
		assert!(body.contains("scope=openid+user.read"));
	}

	#[test]
	fn config_defaults_enable_proactive_refresh() {
		let config = SilentFlowConfig::new("client-1");

		assert_eq!(config.refresh_window, DEFAULT_REFRESH_WINDOW);
		assert!(config.proactive_refresh);
	}
}
