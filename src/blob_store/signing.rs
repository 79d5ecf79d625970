/// Signatures for local upload URLs
use crate::error::{StockroomError, StockroomResult};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Route prefix the local upload handler is mounted on
pub const UPLOAD_ROUTE_PREFIX: &str = "/v1/uploads";

/// Signs and verifies `PUT /v1/uploads/<key>` URLs
#[derive(Clone)]
pub struct UploadSigner {
    secret: String,
    base_url: String,
}

impl UploadSigner {
    pub fn new(secret: String, base_url: String) -> Self {
        Self {
            secret,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Build the full signed URL for a key
    pub fn signed_url(
        &self,
        key: &str,
        content_type: &str,
        max_bytes: i64,
        expires_at: DateTime<Utc>,
    ) -> StockroomResult<String> {
        let expires = expires_at.timestamp();
        let signature = self.sign(key, content_type, max_bytes, expires)?;
        Ok(format!(
            "{}{}/{}?expires={}&max={}&signature={}",
            self.base_url, UPLOAD_ROUTE_PREFIX, key, expires, max_bytes, signature
        ))
    }

    /// HMAC-SHA256 over the upload parameters, hex encoded
    pub fn sign(
        &self,
        key: &str,
        content_type: &str,
        max_bytes: i64,
        expires: i64,
    ) -> StockroomResult<String> {
        let mac = self.mac(key, content_type, max_bytes, expires)?;
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Check a presented signature and its expiry
    pub fn verify(
        &self,
        key: &str,
        content_type: &str,
        max_bytes: i64,
        expires: i64,
        signature: &str,
        now: DateTime<Utc>,
    ) -> StockroomResult<()> {
        if now.timestamp() > expires {
            return Err(StockroomError::Forbidden("upload URL expired".to_string()));
        }

        let presented = hex::decode(signature)
            .map_err(|_| StockroomError::Forbidden("malformed upload signature".to_string()))?;

        self.mac(key, content_type, max_bytes, expires)?
            .verify_slice(&presented)
            .map_err(|_| StockroomError::Forbidden("invalid upload signature".to_string()))
    }

    fn mac(
        &self,
        key: &str,
        content_type: &str,
        max_bytes: i64,
        expires: i64,
    ) -> StockroomResult<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| StockroomError::Internal(format!("invalid signing key: {}", e)))?;
        mac.update(key.as_bytes());
        mac.update(b"\n");
        mac.update(content_type.as_bytes());
        mac.update(b"\n");
        mac.update(max_bytes.to_string().as_bytes());
        mac.update(b"\n");
        mac.update(expires.to_string().as_bytes());
        Ok(mac)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn signer() -> UploadSigner {
        UploadSigner::new(
            "a-test-secret-that-is-long-enough-to-use".to_string(),
            "http://localhost:8080/".to_string(),
        )
    }

    #[test]
    fn test_signed_url_shape() {
        let expires_at = Utc::now() + Duration::minutes(15);
        let url = signer()
            .signed_url("business/b/assets/a/logo.png", "image/png", 12, expires_at)
            .unwrap();

        assert!(url.starts_with("http://localhost:8080/v1/uploads/business/b/assets/a/logo.png?"));
        assert!(url.contains(&format!("expires={}", expires_at.timestamp())));
        assert!(url.contains("max=12"));
        assert!(url.contains("signature="));
    }

    #[test]
    fn test_verify_round_trip() {
        let signer = signer();
        let now = Utc::now();
        let expires = (now + Duration::minutes(5)).timestamp();
        let sig = signer.sign("k", "image/png", 100, expires).unwrap();

        assert!(signer.verify("k", "image/png", 100, expires, &sig, now).is_ok());
    }

    #[test]
    fn test_verify_rejects_tampering() {
        let signer = signer();
        let now = Utc::now();
        let expires = (now + Duration::minutes(5)).timestamp();
        let sig = signer.sign("k", "image/png", 100, expires).unwrap();

        assert!(signer.verify("k", "image/png", 101, expires, &sig, now).is_err());
        assert!(signer.verify("k", "image/gif", 100, expires, &sig, now).is_err());
        assert!(signer.verify("other", "image/png", 100, expires, &sig, now).is_err());
        assert!(signer.verify("k", "image/png", 100, expires, "zz", now).is_err());
    }

    #[test]
    fn test_verify_rejects_expired() {
        let signer = signer();
        let now = Utc::now();
        let expires = (now - Duration::seconds(1)).timestamp();
        let sig = signer.sign("k", "image/png", 100, expires).unwrap();

        let err = signer
            .verify("k", "image/png", 100, expires, &sig, now)
            .unwrap_err();
        assert!(matches!(err, StockroomError::Forbidden(_)));
    }
}
