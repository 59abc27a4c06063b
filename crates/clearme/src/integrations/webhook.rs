use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WebhookError {
    #[error("missing webhook signature header")]
    MissingSignature,
    #[error("webhook signature is not valid hex")]
    Encoding,
    #[error("webhook signature does not match payload")]
    Mismatch,
    #[error("webhook secret is not usable as an HMAC key")]
    InvalidKey,
}

/// HMAC-SHA256 check of a raw request body against a shared secret.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: Vec<u8>,
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier").finish_non_exhaustive()
    }
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Lowercase hex digest of `payload`.
    pub fn sign(&self, payload: &[u8]) -> Result<String, WebhookError> {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).map_err(|_| WebhookError::InvalidKey)?;
        mac.update(payload);
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Accepts `<hex>` or `sha256=<hex>`; comparison is constant time.
    pub fn verify(&self, payload: &[u8], header: Option<&str>) -> Result<(), WebhookError> {
        let provided = header
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or(WebhookError::MissingSignature)?;
        let provided = provided.strip_prefix("sha256=").unwrap_or(provided);
        let provided = hex::decode(provided).map_err(|_| WebhookError::Encoding)?;

        let mut mac =
            HmacSha256::new_from_slice(&self.secret).map_err(|_| WebhookError::InvalidKey)?;
        mac.update(payload);
        let expected = mac.finalize().into_bytes();

        if expected.as_slice().ct_eq(provided.as_slice()).into() {
            Ok(())
        } else {
            Err(WebhookError::Mismatch)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_payload_verifies_with_and_without_prefix() {
        let verifier = WebhookVerifier::new("shared-secret");
        let body = br#"{"event":"student.updated"}"#;
        let signature = verifier.sign(body).expect("sign");

        assert_eq!(verifier.verify(body, Some(&signature)), Ok(()));
        assert_eq!(
            verifier.verify(body, Some(&format!("sha256={signature}"))),
            Ok(())
        );
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let verifier = WebhookVerifier::new("shared-secret");
        let signature = verifier.sign(b"original").expect("sign");
        assert_eq!(
            verifier.verify(b"tampered", Some(&signature)),
            Err(WebhookError::Mismatch)
        );
    }

    #[test]
    fn missing_or_malformed_headers_are_rejected() {
        let verifier = WebhookVerifier::new("shared-secret");
        assert_eq!(
            verifier.verify(b"body", None),
            Err(WebhookError::MissingSignature)
        );
        assert_eq!(
            verifier.verify(b"body", Some("not-hex")),
            Err(WebhookError::Encoding)
        );
    }

    #[test]
    fn other_secret_does_not_verify() {
        let signature = WebhookVerifier::new("a").sign(b"body").expect("sign");
        assert_eq!(
            WebhookVerifier::new("b").verify(b"body", Some(&signature)),
            Err(WebhookError::Mismatch)
        );
    }
}
