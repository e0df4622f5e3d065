//! Token endpoint wire payloads and error classification.

// self
use crate::{_prelude::*, platform::NetworkResponse};

/// Server error codes that mean the grant cannot succeed silently.
const INTERACTION_REQUIRED_CODES: &[&str] =
	&["interaction_required", "consent_required", "login_required", "invalid_grant", "bad_token"];

/// Successful token endpoint response body.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct TokenResponsePayload {
	/// Issued access token.
	#[serde(default)]
	pub access_token: Option<String>,
	/// Token type, usually `Bearer`.
	#[serde(default)]
	pub token_type: Option<String>,
	/// Access token lifetime in seconds.
	#[serde(default)]
	pub expires_in: Option<i64>,
	/// Extended lifetime in seconds for outage resilience.
	#[serde(default)]
	pub ext_expires_in: Option<i64>,
	/// Rotated refresh token, when the server issued one.
	#[serde(default)]
	pub refresh_token: Option<String>,
	/// OIDC id token, when requested.
	#[serde(default)]
	pub id_token: Option<String>,
	/// Space-delimited scopes the server actually granted.
	#[serde(default)]
	pub scope: Option<String>,
	/// Raw base64url client-info payload.
	#[serde(default)]
	pub client_info: Option<String>,
	/// Family-of-clients id the issued refresh token belongs to.
	#[serde(default)]
	pub foci: Option<String>,
}

/// Error body returned by the token endpoint on non-2xx statuses.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct TokenErrorPayload {
	/// OAuth2 error code.
	#[serde(default)]
	pub error: Option<String>,
	/// Human-readable error description.
	#[serde(default)]
	pub error_description: Option<String>,
	/// Sub-error qualifier refining the error code.
	#[serde(default)]
	pub suberror: Option<String>,
	/// Correlation id echoed by the server.
	#[serde(default)]
	pub correlation_id: Option<String>,
}
impl TokenErrorPayload {
	/// Parses an error body leniently; an unparseable body yields an empty payload.
	pub fn parse(body: &str) -> Self {
		serde_json::from_str(body).unwrap_or_default()
	}
}

/// Parses a successful token response body.
///
/// A 2xx body that does not deserialize is treated as a server fault rather than a
/// local configuration problem.
pub fn parse_token_success(
	response: &NetworkResponse,
	correlation_id: &str,
) -> Result<TokenResponsePayload> {
	let mut deserializer = serde_json::Deserializer::from_str(&response.body);

	serde_path_to_error::deserialize(&mut deserializer).map_err(|source| Error::ServerToken {
		error_code: "invalid_response".into(),
		error_description: Some(source.to_string()),
		status: Some(response.status),
		correlation_id: Some(correlation_id.to_owned()),
	})
}

/// Classifies a token endpoint error body into the core error taxonomy.
///
/// Codes signalling that silent acquisition cannot succeed map to
/// [`Error::InteractionRequired`]; everything else surfaces as [`Error::ServerToken`].
pub fn classify_token_error(
	status: u16,
	payload: TokenErrorPayload,
	correlation_id: &str,
) -> Error {
	let error_code = payload.error.unwrap_or_else(|| "unknown_error".into());
	let correlation_id =
		Some(payload.correlation_id.unwrap_or_else(|| correlation_id.to_owned()));

	if INTERACTION_REQUIRED_CODES.contains(&error_code.as_str()) {
		Error::InteractionRequired {
			error_code,
			error_description: payload.error_description,
			sub_error: payload.suberror,
			correlation_id,
		}
	} else {
		Error::ServerToken {
			error_code,
			error_description: payload.error_description,
			status: Some(status),
			correlation_id,
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn response(status: u16, body: &str) -> NetworkResponse {
		NetworkResponse { status, body: body.into(), retry_after: None }
	}

	#[test]
	fn success_payload_parses_the_issued_material() {
		let body = r#"{
			"access_token": "at-secret",
			"token_type": "Bearer",
			"expires_in": 3600,
			"refresh_token": "rt-secret",
			"scope": "openid user.read",
			"foci": "1"
		}"#;
		let payload = parse_token_success(&response(200, body), "corr-1")
			.expect("Success body should parse.");

		assert_eq!(payload.access_token.as_deref(), Some("at-secret"));
		assert_eq!(payload.expires_in, Some(3600));
		assert_eq!(payload.foci.as_deref(), Some("1"));
	}

	#[test]
	fn malformed_success_body_is_a_server_fault() {
		let err = parse_token_success(&response(200, "{\"expires_in\":\"soon\"}"), "corr-1")
			.expect_err("Malformed body must be rejected.");

		assert!(matches!(
			err,
			Error::ServerToken { error_code, status: Some(200), .. } if error_code == "invalid_response"
		));
	}

	#[test]
	fn invalid_grant_maps_to_interaction_required() {
		let payload = TokenErrorPayload::parse(
			r#"{"error":"invalid_grant","error_description":"AADSTS70008","suberror":"token_expired"}"#,
		);
		let err = classify_token_error(400, payload, "corr-1");

		assert!(matches!(
			err,
			Error::InteractionRequired { error_code, sub_error: Some(sub), .. }
				if error_code == "invalid_grant" && sub == "token_expired"
		));
	}

	#[test]
	fn server_correlation_id_wins_over_the_local_one() {
		let payload =
			TokenErrorPayload::parse(r#"{"error":"interaction_required","correlation_id":"server-corr"}"#);

		match classify_token_error(400, payload, "local-corr") {
			Error::InteractionRequired { correlation_id, .. } => {
				assert_eq!(correlation_id.as_deref(), Some("server-corr"));
			},
			other => panic!("Unexpected classification: {other:?}."),
		}
	}

	#[test]
	fn other_errors_surface_as_server_token_failures() {
		let payload = TokenErrorPayload::parse(r#"{"error":"temporarily_unavailable"}"#);
		let err = classify_token_error(503, payload, "corr-1");

		assert!(matches!(
			err,
			Error::ServerToken { error_code, status: Some(503), .. }
				if error_code == "temporarily_unavailable"
		));
	}

	#[test]
	fn unparseable_error_body_degrades_to_unknown_error() {
		let err = classify_token_error(500, TokenErrorPayload::parse("<html>oops</html>"), "corr-1");

		assert!(matches!(
			err,
			Error::ServerToken { error_code, .. } if error_code == "unknown_error"
		));
	}
}
