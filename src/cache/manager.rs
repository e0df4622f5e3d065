//! Entity CRUD, lookup filters, and consistency enforcement over a key-value partition.

// self
use crate::{
	_prelude::*,
	auth::ScopeSet,
	authority::metadata as authority_metadata,
	cache::{
		entity::{
			AccountEntity, AppMetadataEntity, AuthorityMetadataEntity, CredentialEntity,
			CredentialKind, ThrottlingEntity,
		},
		key::{AccountKey, AppMetadataKey, CredentialKey},
	},
	error::StorageError,
	platform::StorageCapability,
};

/// Optional, ANDed constraints for account lookups.
///
/// Environment matching expands through alias equivalence: any alias of a stored
/// account's environment matches, whether the class comes from the hardcoded cloud
/// table or from cached network discovery.
#[derive(Clone, Debug, Default)]
pub struct AccountFilter {
	/// Home account id in `{uid}.{utid}` shape.
	pub home_account_id: Option<String>,
	/// Network host, expanded through alias equivalence.
	pub environment: Option<String>,
	/// Tenant the account belongs to.
	pub realm: Option<String>,
	/// Exact username match (case-insensitive).
	pub username: Option<String>,
	/// Local object id within the realm.
	pub local_account_id: Option<String>,
	/// Login hint matched against the stored username.
	pub login_hint: Option<String>,
	/// Session id matched against the stored account.
	pub sid: Option<String>,
}
impl AccountFilter {
	/// Constrains the filter to a home account id.
	pub fn with_home_account_id(mut self, value: impl Into<String>) -> Self {
		self.home_account_id = Some(value.into());

		self
	}

	/// Constrains the filter to an environment (alias-expanded).
	pub fn with_environment(mut self, value: impl Into<String>) -> Self {
		self.environment = Some(value.into());

		self
	}

	/// Constrains the filter to a realm.
	pub fn with_realm(mut self, value: impl Into<String>) -> Self {
		self.realm = Some(value.into());

		self
	}

	/// Constrains the filter to a username.
	pub fn with_username(mut self, value: impl Into<String>) -> Self {
		self.username = Some(value.into());

		self
	}
}

/// Optional, ANDed constraints for credential lookups.
#[derive(Clone, Debug, Default)]
pub struct CredentialFilter {
	/// Home account id in `{uid}.{utid}` shape.
	pub home_account_id: Option<String>,
	/// Network host, expanded through alias equivalence.
	pub environment: Option<String>,
	/// Credential kind to match.
	pub credential_type: Option<CredentialKind>,
	/// Client id of the requesting application.
	pub client_id: Option<String>,
	/// Family id for family refresh token lookups.
	pub family_id: Option<String>,
	/// Tenant the credential applies to.
	pub realm: Option<String>,
	/// Requested scopes; a stored entity matches when its target is a superset.
	pub target: Option<ScopeSet>,
	/// Assertion hash partitioning on-behalf-of credentials.
	pub user_assertion_hash: Option<String>,
}

/// Owns entity CRUD and consistency enforcement over a generic key-value store.
///
/// All operations are synchronous with respect to the storage partition; suspension
/// points only exist in callers that interleave network I/O between cache calls.
#[derive(Clone)]
pub struct CacheManager {
	storage: Arc<dyn StorageCapability>,
}
impl CacheManager {
	/// Creates a manager over the provided storage partition.
	pub fn new(storage: Arc<dyn StorageCapability>) -> Self {
		Self { storage }
	}

	// --- accounts ---

	/// Persists or replaces an account entity.
	pub fn save_account(&self, account: &AccountEntity) -> Result<(), StorageError> {
		self.write(&account.key().render(), account)
	}

	/// Fetches the account stored under `key`, dropping a corrupt record as a miss.
	pub fn get_account(&self, key: &AccountKey) -> Option<AccountEntity> {
		self.read_or_evict(&key.render())
	}

	/// Returns every cached account matching the filter.
	pub fn get_accounts(&self, filter: &AccountFilter) -> Vec<AccountEntity> {
		self.storage
			.keys()
			.into_iter()
			.filter(|key| !AppMetadataKey::matches(key) && CredentialKey::kind_of(key).is_none())
			.filter_map(|key| self.read_quietly::<AccountEntity>(&key))
			.filter(|account| self.account_matches(account, filter))
			.collect()
	}

	/// Returns the first cached account matching the filter, if any.
	pub fn get_account_by_filter(&self, filter: &AccountFilter) -> Option<AccountEntity> {
		self.get_accounts(filter).into_iter().next()
	}

	/// Removes an account and every credential entity belonging to it.
	///
	/// The cascade is transactional from the caller's point of view: if any entity
	/// cannot be removed the operation reports a partial-failure error instead of
	/// silently leaving an inconsistent cache.
	pub fn remove_account(&self, key: &AccountKey) -> Result<(), StorageError> {
		let credential_keys: Vec<String> = self
			.storage
			.keys()
			.into_iter()
			.filter(|raw| CredentialKey::kind_of(raw).is_some())
			.filter(|raw| {
				self.read_quietly::<CredentialEntity>(raw).is_some_and(|credential| {
					credential.home_account_id.eq_ignore_ascii_case(&key.home_account_id)
						&& self.environment_matches(&credential.environment, &key.environment)
						&& (credential.realm.eq_ignore_ascii_case(&key.realm)
							|| credential.realm.is_empty())
				})
			})
			.collect();
		let attempted = credential_keys.len() + 1;
		let mut failed = 0;

		for raw in &credential_keys {
			if self.storage.remove(raw).is_err() {
				failed += 1;
			}
		}

		if self.storage.remove(&key.render()).is_err() {
			failed += 1;
		}

		if failed > 0 {
			return Err(StorageError::PartialAccountRemoval { attempted, failed });
		}

		Ok(())
	}

	// --- credentials ---

	/// Persists a credential entity, enforcing access-token uniqueness.
	///
	/// Writing an access token evicts stored access tokens for the same account,
	/// client, and realm whose scope sets overlap the new target, so overlapping-scope
	/// requests always resolve to a single entry.
	pub fn save_credential(&self, credential: &CredentialEntity) -> Result<(), StorageError> {
		if credential.credential_type == CredentialKind::AccessToken {
			let new_key = credential.key().render();

			for raw in self.storage.keys() {
				if CredentialKey::kind_of(&raw) != Some(CredentialKind::AccessToken) || raw == new_key {
					continue;
				}

				let Some(existing) = self.read_quietly::<CredentialEntity>(&raw) else { continue };

				if existing.home_account_id.eq_ignore_ascii_case(&credential.home_account_id)
					&& existing.environment.eq_ignore_ascii_case(&credential.environment)
					&& existing.client_id.eq_ignore_ascii_case(&credential.client_id)
					&& existing.realm.eq_ignore_ascii_case(&credential.realm)
					&& existing.target.intersects(&credential.target)
				{
					self.storage.remove(&raw)?;
				}
			}
		}

		self.write(&credential.key().render(), credential)
	}

	/// Fetches the credential stored under `key`, dropping a corrupt record as a miss.
	pub fn get_credential(&self, key: &CredentialKey) -> Option<CredentialEntity> {
		self.read_or_evict(&key.render())
	}

	/// Returns every cached credential matching the filter.
	///
	/// Corrupt credential records encountered during the scan are evicted rather than
	/// failing the lookup.
	pub fn get_credentials_filtered_by(&self, filter: &CredentialFilter) -> Vec<CredentialEntity> {
		self.storage
			.keys()
			.into_iter()
			.filter(|key| CredentialKey::kind_of(key).is_some())
			.filter_map(|key| self.read_or_evict::<CredentialEntity>(&key))
			.filter(|credential| self.credential_matches(credential, filter))
			.collect()
	}

	/// Returns the best access token for the filter: the qualifying entry with the
	/// fewest extra scopes, ties broken by the latest `cached_at`.
	pub fn find_access_token(&self, filter: &CredentialFilter) -> Option<CredentialEntity> {
		let requested = filter.target.clone().unwrap_or_default();
		let mut filter = filter.clone();

		filter.credential_type = Some(CredentialKind::AccessToken);

		self.get_credentials_filtered_by(&filter).into_iter().min_by(|lhs, rhs| {
			lhs.target
				.extra_scope_count(&requested)
				.cmp(&rhs.target.extra_scope_count(&requested))
				.then(rhs.cached_at.cmp(&lhs.cached_at))
		})
	}

	// --- app metadata ---

	/// Persists or replaces an app metadata entity.
	pub fn save_app_metadata(&self, metadata: &AppMetadataEntity) -> Result<(), StorageError> {
		self.write(&metadata.key().render(), metadata)
	}

	/// Fetches the app metadata stored under `key`.
	pub fn get_app_metadata(&self, key: &AppMetadataKey) -> Option<AppMetadataEntity> {
		self.read_or_evict(&key.render())
	}

	/// Finds app metadata for a client across the environment's alias class.
	pub fn get_app_metadata_by_filter(
		&self,
		environment: &str,
		client_id: &str,
	) -> Option<AppMetadataEntity> {
		self.storage
			.keys()
			.into_iter()
			.filter(|key| AppMetadataKey::matches(key))
			.filter_map(|key| self.read_quietly::<AppMetadataEntity>(&key))
			.find(|metadata| {
				metadata.client_id.eq_ignore_ascii_case(client_id)
					&& self.environment_matches(&metadata.environment, environment)
			})
	}

	// --- authority metadata ---

	/// Persists or replaces an authority metadata entity under its host key.
	pub fn save_authority_metadata(
		&self,
		metadata: &AuthorityMetadataEntity,
	) -> Result<(), StorageError> {
		self.write(&metadata.key(), metadata)
	}

	/// Finds cached authority metadata whose alias class contains `host`.
	pub fn get_authority_metadata(&self, host: &str) -> Option<AuthorityMetadataEntity> {
		if let Some(exact) = self.read_quietly::<AuthorityMetadataEntity>(&host.to_lowercase()) {
			return Some(exact);
		}

		self.storage
			.keys()
			.into_iter()
			.filter(|key| !AppMetadataKey::matches(key) && CredentialKey::kind_of(key).is_none())
			.filter_map(|key| self.read_quietly::<AuthorityMetadataEntity>(&key))
			.find(|metadata| metadata.has_alias(host))
	}

	// --- throttling ---

	/// Persists or replaces a throttling entity under its request thumbprint.
	pub fn save_throttling_entity(
		&self,
		thumbprint: &str,
		entity: &ThrottlingEntity,
	) -> Result<(), StorageError> {
		self.write(thumbprint, entity)
	}

	/// Fetches the throttling entity for a request thumbprint.
	pub fn get_throttling_entity(&self, thumbprint: &str) -> Option<ThrottlingEntity> {
		self.read_or_evict(thumbprint)
	}

	/// Removes the throttling entity for a request thumbprint.
	pub fn remove_throttling_entity(&self, thumbprint: &str) -> Result<(), StorageError> {
		self.storage.remove(thumbprint)
	}

	// --- matching helpers ---

	fn account_matches(&self, account: &AccountEntity, filter: &AccountFilter) -> bool {
		if let Some(home_account_id) = &filter.home_account_id {
			if !account.home_account_id.eq_ignore_ascii_case(home_account_id) {
				return false;
			}
		}
		if let Some(environment) = &filter.environment {
			if !self.environment_matches(&account.environment, environment) {
				return false;
			}
		}
		if let Some(realm) = &filter.realm {
			if !account.realm.eq_ignore_ascii_case(realm) {
				return false;
			}
		}
		if let Some(username) = &filter.username {
			if !account.username.eq_ignore_ascii_case(username) {
				return false;
			}
		}
		if let Some(local_account_id) = &filter.local_account_id {
			if !account.local_account_id.eq_ignore_ascii_case(local_account_id) {
				return false;
			}
		}
		if let Some(login_hint) = &filter.login_hint {
			if !account.username.eq_ignore_ascii_case(login_hint) {
				return false;
			}
		}
		if let Some(sid) = &filter.sid {
			if account.sid.as_deref() != Some(sid.as_str()) {
				return false;
			}
		}

		true
	}

	fn credential_matches(&self, credential: &CredentialEntity, filter: &CredentialFilter) -> bool {
		if let Some(home_account_id) = &filter.home_account_id {
			if !credential.home_account_id.eq_ignore_ascii_case(home_account_id) {
				return false;
			}
		}
		if let Some(environment) = &filter.environment {
			if !self.environment_matches(&credential.environment, environment) {
				return false;
			}
		}
		if let Some(credential_type) = filter.credential_type {
			if credential.credential_type != credential_type {
				return false;
			}
		}
		if let Some(client_id) = &filter.client_id {
			if !credential.client_id.eq_ignore_ascii_case(client_id) {
				return false;
			}
		}
		if let Some(family_id) = &filter.family_id {
			if credential.family_id.as_deref() != Some(family_id.as_str()) {
				return false;
			}
		}
		if let Some(realm) = &filter.realm {
			if !credential.realm.eq_ignore_ascii_case(realm) {
				return false;
			}
		}
		if let Some(target) = &filter.target {
			if !credential.target.is_superset_of(target) {
				return false;
			}
		}
		if let Some(user_assertion_hash) = &filter.user_assertion_hash {
			if credential.user_assertion_hash.as_deref() != Some(user_assertion_hash.as_str()) {
				return false;
			}
		}

		true
	}

	/// Two hosts match when equal or members of the same alias equivalence class,
	/// consulting the hardcoded cloud table first and cached discovery entries second.
	fn environment_matches(&self, entity_env: &str, filter_env: &str) -> bool {
		if entity_env.eq_ignore_ascii_case(filter_env) {
			return true;
		}
		if let Some(class) = authority_metadata::well_known_alias_class(filter_env) {
			return class.iter().any(|alias| alias.eq_ignore_ascii_case(entity_env));
		}

		self.storage
			.keys()
			.into_iter()
			.filter(|key| !AppMetadataKey::matches(key) && CredentialKey::kind_of(key).is_none())
			.filter_map(|key| self.read_quietly::<AuthorityMetadataEntity>(&key))
			.any(|metadata| metadata.has_alias(filter_env) && metadata.has_alias(entity_env))
	}

	// --- raw record helpers ---

	fn write<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StorageError> {
		let payload = serde_json::to_string(value)
			.map_err(|e| StorageError::Backend { message: e.to_string() })?;

		self.storage.set(key, &payload)
	}

	/// Reads and deserializes a record; a corrupt payload is evicted and treated as a
	/// miss so one bad entry never fails the whole lookup.
	fn read_or_evict<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Option<T> {
		let payload = self.storage.get(key)?;

		match serde_json::from_str(&payload) {
			Ok(value) => Some(value),
			Err(_) => {
				let _ = self.storage.remove(key);

				None
			},
		}
	}

	/// Reads a record without evicting on failure; used on scan paths where the key
	/// shape alone cannot prove which entity kind the record holds.
	fn read_quietly<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Option<T> {
		serde_json::from_str(&self.storage.get(key)?).ok()
	}
}
impl Debug for CacheManager {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CacheManager").finish_non_exhaustive()
	}
}
