//! Observability helpers: correlated performance telemetry plus optional tracing spans.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `oidc_silent_core.operation` with the
//!   `operation` and `stage` fields.
//!
//! Performance telemetry (the [`perf`] module) is always available; it only emits events
//! to callbacks the host registers.

pub mod perf;

mod tracing;

pub use perf::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Operations observed by the core.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperationKind {
	/// Top-level silent token acquisition.
	AcquireTokenSilent,
	/// Cache lookup stage of the silent flow.
	SilentCacheLookup,
	/// Authority endpoint/alias resolution.
	AuthorityResolution,
	/// Synchronous refresh-token exchange.
	RefreshTokenExchange,
	/// Detached proactive refresh scheduled from the refresh-ahead window.
	BackgroundRefresh,
}
impl OperationKind {
	/// Returns a stable label suitable for span fields and measurement names.
	pub const fn as_str(self) -> &'static str {
		match self {
			OperationKind::AcquireTokenSilent => "acquire_token_silent",
			OperationKind::SilentCacheLookup => "silent_cache_lookup",
			OperationKind::AuthorityResolution => "authority_resolution",
			OperationKind::RefreshTokenExchange => "refresh_token_exchange",
			OperationKind::BackgroundRefresh => "background_refresh",
		}
	}
}
impl Display for OperationKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
