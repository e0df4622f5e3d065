//! Core error types shared across cache, authority, throttling, and flow modules.

// self
use crate::_prelude::*;

/// Core-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Canonical core error exposed by public APIs.
///
/// Every variant carries enough structured detail (kind plus server error code/description
/// and correlation id when available) for callers to log it and correlate it with a
/// `success=false` performance event.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Local configuration problem; always fatal, never retried.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Authority discovery failed with no usable static or cached fallback.
	#[error(transparent)]
	AuthorityResolution(#[from] AuthorityResolutionError),
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		StorageError,
	),
	/// A prior server signal forbids retrying this request shape within a window.
	#[error("Request is throttled until {retry_at}: {error_description:?}.")]
	Throttled {
		/// Instant at which the throttle window elapses.
		retry_at: OffsetDateTime,
		/// Server error code captured when the throttle was recorded.
		error_code: Option<String>,
		/// Server error description captured when the throttle was recorded.
		error_description: Option<String>,
		/// Correlation id of the failing operation.
		correlation_id: Option<String>,
	},
	/// The server indicated the grant cannot succeed silently; the caller must fall
	/// back to an interactive flow.
	#[error("Interaction is required to satisfy this request: {error_code}.")]
	InteractionRequired {
		/// Server error code (e.g. `interaction_required`, `invalid_grant`).
		error_code: String,
		/// Server error description, when supplied.
		error_description: Option<String>,
		/// Server sub-error qualifier, when supplied.
		sub_error: Option<String>,
		/// Correlation id of the failing operation.
		correlation_id: Option<String>,
	},
	/// The token endpoint rejected the request for reasons other than requiring interaction.
	#[error("Token endpoint rejected the request: {error_code}.")]
	ServerToken {
		/// Server error code.
		error_code: String,
		/// Server error description, when supplied.
		error_description: Option<String>,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Correlation id of the failing operation.
		correlation_id: Option<String>,
	},
	/// Underlying network capability reported a transport failure.
	#[error("Network error occurred while calling {endpoint}.")]
	Transport {
		/// Endpoint label (discovery, token) for diagnostics.
		endpoint: &'static str,
		/// Transport-specific failure payload.
		message: String,
		/// Correlation id of the failing operation.
		correlation_id: Option<String>,
	},
}

/// Configuration and validation failures raised by the core.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// The configured authority string is not a valid URL.
	#[error("Authority is not a valid URL.")]
	InvalidAuthority {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// The configured authority URL lacks a host component.
	#[error("Authority URL is missing a host.")]
	AuthorityMissingHost,
	/// A required request parameter was empty or absent.
	#[error("Required request parameter `{parameter}` is missing or empty.")]
	MissingParameter {
		/// Name of the absent parameter.
		parameter: &'static str,
	},
	/// Request scopes cannot be normalized.
	#[error("Requested scopes are invalid.")]
	InvalidScope(#[from] crate::auth::ScopeValidationError),
	/// Token endpoint response omitted `expires_in`.
	#[error("Token endpoint response is missing expires_in.")]
	MissingExpiresIn,
	/// Token endpoint response omitted the access token.
	#[error("Token endpoint response is missing the access token.")]
	MissingAccessToken,
	/// Client-info payload could not be decoded.
	#[error("Client info payload is malformed.")]
	MalformedClientInfo,
	/// Id token payload segment could not be decoded.
	#[error("Id token payload is malformed.")]
	MalformedIdToken,
}

/// Authority discovery failures with no usable static or cached fallback.
#[derive(Debug, ThisError)]
pub enum AuthorityResolutionError {
	/// Instance/cloud discovery call failed at the transport layer.
	#[error("Instance discovery request failed: {message}.")]
	InstanceDiscovery {
		/// Transport failure payload.
		message: String,
	},
	/// OIDC discovery document request failed at the transport layer.
	#[error("OpenID configuration request failed: {message}.")]
	OpenIdConfiguration {
		/// Transport failure payload.
		message: String,
	},
	/// A discovery document could not be parsed.
	#[error("Discovery document is malformed.")]
	MalformedDiscoveryDocument {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// No source (config, hardcoded, cache, network) produced aliases for the host.
	#[error("No metadata source could resolve authority host `{host}`.")]
	UntrustedAuthority {
		/// Authority host that failed resolution.
		host: String,
	},
}

/// Error type produced by [`StorageCapability`](crate::platform::StorageCapability)
/// implementations and cache consistency checks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StorageError {
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
	/// Account removal completed only partially; the cache may hold orphaned credentials.
	#[error("Account removal left {failed} of {attempted} entities in place.")]
	PartialAccountRemoval {
		/// Number of entities the cascade attempted to remove.
		attempted: usize,
		/// Number of entities that could not be removed.
		failed: usize,
	},
}
