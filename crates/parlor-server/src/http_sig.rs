//! Signed HTTP requests.
//!
//! The signer's key travels in a `public-key` header, the detached signature
//! over `["http", METHOD, path, body]` in a `signature` header. Verification
//! happens before any request body is parsed.

use axum::http::HeaderMap;
use subtle::ConstantTimeEq;

use parlor_shared::{canonical, signature};

use crate::config::ServerConfig;
use crate::error::ServerError;

pub const PUBLIC_KEY_HEADER: &str = "public-key";
pub const SIGNATURE_HEADER: &str = "signature";

/// Verify the request signature and return the signer's public key.
pub fn verify_signed_request(
    headers: &HeaderMap,
    method: &str,
    path: &str,
    body: &[u8],
) -> Result<String, ServerError> {
    let public_key = header_value(headers, PUBLIC_KEY_HEADER)?;
    let sig = header_value(headers, SIGNATURE_HEADER)?;
    let bytes = canonical::http_request(method, path, body);
    signature::verify_detached(&public_key, &bytes, &sig)
        .map_err(|e| ServerError::Unauthorized(format!("request signature rejected: {e}")))?;
    Ok(public_key)
}

fn header_value(headers: &HeaderMap, name: &str) -> Result<String, ServerError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| ServerError::Unauthorized(format!("missing {name} header")))
}

/// Constant-time comparison against the configured admin key.
pub fn require_admin(public_key: &str, config: &ServerConfig) -> Result<(), ServerError> {
    let Some(admin) = config.admin_public_key.as_deref() else {
        return Err(ServerError::Forbidden(
            "admin API disabled (no admin key configured)".into(),
        ));
    };
    let a = public_key.as_bytes();
    let b = admin.as_bytes();
    if a.len() != b.len() || a.ct_eq(b).unwrap_u8() != 1 {
        return Err(ServerError::Forbidden("not the admin key".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use parlor_shared::KeyPair;

    fn signed_headers(kp: &KeyPair, method: &str, path: &str, body: &[u8]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            PUBLIC_KEY_HEADER,
            HeaderValue::from_str(&kp.public_key_hex()).unwrap(),
        );
        headers.insert(
            SIGNATURE_HEADER,
            HeaderValue::from_str(&kp.sign_http_request(method, path, body)).unwrap(),
        );
        headers
    }

    #[test]
    fn accepts_valid_signature() {
        let kp = KeyPair::generate();
        let body = br#"{"roomName":"r1"}"#;
        let headers = signed_headers(&kp, "POST", "/api/admin/delete-room", body);
        let signer =
            verify_signed_request(&headers, "POST", "/api/admin/delete-room", body).unwrap();
        assert_eq!(signer, kp.public_key_hex());
    }

    #[test]
    fn rejects_wrong_path_or_body() {
        let kp = KeyPair::generate();
        let body = br#"{"roomName":"r1"}"#;
        let headers = signed_headers(&kp, "POST", "/api/admin/delete-room", body);
        assert!(verify_signed_request(&headers, "POST", "/api/admin/block-user", body).is_err());
        assert!(
            verify_signed_request(&headers, "POST", "/api/admin/delete-room", b"{}").is_err()
        );
    }

    #[test]
    fn rejects_missing_headers() {
        let headers = HeaderMap::new();
        assert!(verify_signed_request(&headers, "POST", "/x", b"").is_err());
    }

    #[test]
    fn admin_check_is_exact() {
        let kp = KeyPair::generate();
        let mut config = ServerConfig::default();
        assert!(require_admin(&kp.public_key_hex(), &config).is_err());

        config.admin_public_key = Some(kp.public_key_hex());
        assert!(require_admin(&kp.public_key_hex(), &config).is_ok());
        assert!(require_admin(&KeyPair::generate().public_key_hex(), &config).is_err());
        assert!(require_admin("short", &config).is_err());
    }
}
