//! Token acquisition flows built on the cache, authority, and throttling layers.

pub mod response;
pub mod silent;

pub use silent::{
	DEFAULT_REFRESH_WINDOW, SilentFlow, SilentFlowConfig, SilentRequest, TokenResult,
};
