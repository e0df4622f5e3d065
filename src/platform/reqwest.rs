//! Reqwest-backed [`NetworkCapability`] adapter.
//!
//! Token requests must not follow redirects, matching OAuth 2.0 guidance that token
//! endpoints return results directly instead of delegating to another URI. Callers who
//! supply their own [`Client`] should disable redirect following before wrapping it.

// crates.io
use reqwest::{
	Client,
	header::{CONTENT_TYPE, HeaderMap, RETRY_AFTER},
};
use time::format_description::well_known::Rfc2822;
// self
use crate::{
	_prelude::*,
	platform::{NetworkCapability, NetworkError, NetworkFuture, NetworkResponse},
};

/// Thin wrapper around [`Client`] that satisfies [`NetworkCapability`].
#[derive(Clone, Debug, Default)]
pub struct ReqwestNetworkClient(pub Client);
impl ReqwestNetworkClient {
	/// Wraps an existing reqwest [`Client`].
	pub fn with_client(client: Client) -> Self {
		Self(client)
	}

	async fn dispatch(
		request: reqwest::RequestBuilder,
	) -> Result<NetworkResponse, NetworkError> {
		let response = request.send().await.map_err(NetworkError::new)?;
		let status = response.status().as_u16();
		let retry_after = parse_retry_after(response.headers());
		let body = response.text().await.map_err(NetworkError::new)?;

		Ok(NetworkResponse { status, body, retry_after })
	}
}
impl NetworkCapability for ReqwestNetworkClient {
	fn get(&self, url: Url) -> NetworkFuture<'_, NetworkResponse> {
		let request = self.0.get(url.as_str());

		Box::pin(Self::dispatch(request))
	}

	fn post_form(&self, url: Url, body: String) -> NetworkFuture<'_, NetworkResponse> {
		let request = self
			.0
			.post(url.as_str())
			.header(CONTENT_TYPE, "application/x-www-form-urlencoded")
			.body(body);

		Box::pin(Self::dispatch(request))
	}
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
	let value = headers.get(RETRY_AFTER)?;
	let raw = value.to_str().ok()?.trim();

	if let Ok(secs) = raw.parse::<u64>() {
		return Some(Duration::seconds(secs as i64));
	}
	if let Ok(moment) = OffsetDateTime::parse(raw, &Rfc2822) {
		let delta = moment - OffsetDateTime::now_utc();

		if delta.is_positive() {
			return Some(delta);
		}
	}

	None
}
