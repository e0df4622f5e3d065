//! Scope normalization and subset matching.
//!
//! Cache keys and lookup filters both rely on one canonical scope representation:
//! lowercased, deduplicated, lexicographically sorted, space-joined. Semantically
//! identical scope sets therefore always produce the same cache target regardless of
//! caller-supplied ordering or casing.

// std
use std::{cmp::Ordering, collections::BTreeSet, hash::Hash, sync::OnceLock};
// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD_NO_PAD};
use serde::{Deserializer, Serializer, de::Error as DeError};
use sha2::{Digest, Sha256};
// self
use crate::_prelude::*;

/// Errors emitted while normalizing a scope set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum ScopeValidationError {
	/// An empty string is not a scope.
	#[error("A scope entry cannot be an empty string.")]
	Empty,
	/// A scope carries embedded whitespace, which would corrupt the space-joined target.
	#[error("Scope {scope:?} contains whitespace.")]
	ContainsWhitespace {
		/// The offending entry, already lowercased.
		scope: String,
	},
}

/// Normalized, case-insensitive set of OAuth scopes.
///
/// The empty set is valid and renders as an empty target string, which is the target
/// component used for id and refresh token cache keys.
#[derive(Default)]
pub struct ScopeSet {
	entries: Arc<[String]>,
	digest: OnceLock<String>,
}
impl ScopeSet {
	/// Creates a normalized scope set from any iterator of scope strings.
	pub fn new<I, S>(scopes: I) -> Result<Self, ScopeValidationError>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		let mut canonical = BTreeSet::new();

		for scope in scopes {
			let entry = scope.into().to_lowercase();

			if entry.is_empty() {
				return Err(ScopeValidationError::Empty);
			}
			if entry.contains(char::is_whitespace) {
				return Err(ScopeValidationError::ContainsWhitespace { scope: entry });
			}

			canonical.insert(entry);
		}

		Ok(Self {
			entries: canonical.into_iter().collect::<Vec<_>>().into(),
			digest: OnceLock::new(),
		})
	}

	/// Number of distinct scopes.
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	/// Returns `true` if no scopes are defined.
	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Returns `true` if the normalized set contains the provided scope.
	pub fn contains(&self, scope: &str) -> bool {
		let needle = scope.to_lowercase();

		self.entries.binary_search(&needle).is_ok()
	}

	/// Returns `true` if every scope in `other` is present in `self`.
	///
	/// This is the cache-hit test: a stored token with target `self` satisfies a
	/// request for `other` iff `other ⊆ self`.
	pub fn is_superset_of(&self, other: &Self) -> bool {
		other.iter().all(|scope| self.contains(scope))
	}

	/// Returns `true` if any scope is shared between `self` and `other`.
	///
	/// Used when enforcing access-token uniqueness: a newly written token evicts
	/// stored tokens with overlapping scope sets instead of duplicating them.
	pub fn intersects(&self, other: &Self) -> bool {
		other.iter().any(|scope| self.contains(scope))
	}

	/// Number of scopes in `self` beyond those requested in `other`.
	///
	/// Used to rank multiple qualifying cache entries; the entry with the fewest
	/// extra scopes is the closest match.
	pub fn extra_scope_count(&self, other: &Self) -> usize {
		self.len().saturating_sub(other.len())
	}

	/// Iterator over normalized scopes.
	pub fn iter(&self) -> impl Iterator<Item = &str> {
		self.entries.iter().map(String::as_str)
	}

	/// Returns the normalized string representation (space-delimited, sorted).
	pub fn normalized(&self) -> String {
		self.entries.join(" ")
	}

	/// Stable fingerprint derived from the normalized scope list.
	///
	/// Base64 (no padding) encoding of the SHA-256 digest of the normalized string,
	/// cached after the first calculation.
	pub fn fingerprint(&self) -> String {
		self.digest
			.get_or_init(|| STANDARD_NO_PAD.encode(Sha256::digest(self.normalized().as_bytes())))
			.clone()
	}
}
impl Clone for ScopeSet {
	fn clone(&self) -> Self {
		Self { entries: self.entries.clone(), digest: OnceLock::new() }
	}
}
impl PartialEq for ScopeSet {
	fn eq(&self, other: &Self) -> bool {
		self.entries == other.entries
	}
}
impl Eq for ScopeSet {}
impl PartialOrd for ScopeSet {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}
impl Ord for ScopeSet {
	fn cmp(&self, other: &Self) -> Ordering {
		self.entries.cmp(&other.entries)
	}
}
impl Hash for ScopeSet {
	fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
		self.entries.hash(state);
	}
}
impl Debug for ScopeSet {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("ScopeSet").field(&self.entries).finish()
	}
}
impl Display for ScopeSet {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.normalized())
	}
}
impl FromStr for ScopeSet {
	type Err = ScopeValidationError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		if s.is_empty() {
			Ok(Self::default())
		} else if s.trim().is_empty() {
			Err(ScopeValidationError::Empty)
		} else {
			Self::new(s.split_whitespace())
		}
	}
}
impl Serialize for ScopeSet {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str(&self.normalized())
	}
}
impl<'de> Deserialize<'de> for ScopeSet {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		String::deserialize(deserializer)?.parse().map_err(DeError::custom)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn scopes_normalize_order_case_and_duplicates() {
		let lhs = ScopeSet::new(["User.Read", "openid", "OPENID"])
			.expect("Mixed-case scope input should normalize.");
		let rhs = ScopeSet::new(["openid", "user.read"])
			.expect("Lowercase scope input should normalize.");

		assert_eq!(lhs, rhs);
		assert_eq!(lhs.normalized(), "openid user.read");
		assert_eq!(lhs.fingerprint(), rhs.fingerprint());
	}

	#[test]
	fn subset_matching_follows_set_inclusion() {
		let stored = ScopeSet::new(["openid", "profile", "user.read"])
			.expect("Stored scope fixture should be valid.");
		let requested =
			ScopeSet::new(["user.read", "openid"]).expect("Requested fixture should be valid.");
		let foreign = ScopeSet::new(["mail.read"]).expect("Foreign fixture should be valid.");

		assert!(stored.is_superset_of(&requested));
		assert!(!stored.is_superset_of(&foreign));
		assert_eq!(stored.extra_scope_count(&requested), 1);
	}

	#[test]
	fn empty_target_round_trips() {
		let empty = ScopeSet::from_str("").expect("Empty string represents an empty scope set.");

		assert!(empty.is_empty());
		assert_eq!(empty.normalized(), "");
		assert!(ScopeSet::from_str("   ").is_err(), "Whitespace-only input must be rejected.");
	}

	#[test]
	fn invalid_scopes_error() {
		assert!(ScopeSet::new([""]).is_err());
		assert!(ScopeSet::new(["contains space"]).is_err());
	}

	#[test]
	fn serde_round_trips_as_target_string() {
		let scopes = ScopeSet::new(["profile", "email"]).expect("Fixture should be valid.");
		let payload = serde_json::to_string(&scopes).expect("ScopeSet should serialize.");

		assert_eq!(payload, "\"email profile\"");

		let round_trip: ScopeSet =
			serde_json::from_str(&payload).expect("Serialized target should deserialize.");

		assert_eq!(round_trip, scopes);
	}
}
