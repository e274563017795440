use ed25519_dalek::{Signature, Verifier, VerifyingKey, PUBLIC_KEY_LENGTH, SIGNATURE_LENGTH};

use crate::error::ConfigError;

/// Checks the Ed25519 signature the platform puts on every interaction
/// request: `signature(timestamp || body)` under the application key.
#[derive(Clone)]
pub struct SignatureVerifier {
    key: VerifyingKey,
}

impl SignatureVerifier {
    pub fn from_hex(public_key: &str) -> Result<Self, ConfigError> {
        let invalid = |message: String| ConfigError::InvalidValue {
            key: "DISCORD_PUBLIC_KEY".into(),
            message,
        };

        let bytes: [u8; PUBLIC_KEY_LENGTH] = hex::decode(public_key.trim())
            .map_err(|err| invalid(err.to_string()))?
            .try_into()
            .map_err(|bytes: Vec<u8>| invalid(format!("expected 32 bytes, got {}", bytes.len())))?;
        let key = VerifyingKey::from_bytes(&bytes).map_err(|err| invalid(err.to_string()))?;
        Ok(Self { key })
    }

    pub fn from_key(key: VerifyingKey) -> Self {
        Self { key }
    }

    pub fn verify(&self, signature_hex: &str, timestamp: &str, body: &[u8]) -> bool {
        let Ok(raw) = hex::decode(signature_hex) else {
            return false;
        };
        let Ok(raw) = <[u8; SIGNATURE_LENGTH]>::try_from(raw) else {
            return false;
        };
        let signature = Signature::from_bytes(&raw);

        let mut message = Vec::with_capacity(timestamp.len() + body.len());
        message.extend_from_slice(timestamp.as_bytes());
        message.extend_from_slice(body);
        self.key.verify(&message, &signature).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};

    fn signed(key: &SigningKey, timestamp: &str, body: &str) -> String {
        let message = format!("{timestamp}{body}");
        hex::encode(key.sign(message.as_bytes()).to_bytes())
    }

    #[test]
    fn accepts_genuine_and_rejects_tampered() {
        let signing = SigningKey::from_bytes(&[7; 32]);
        let verifier =
            SignatureVerifier::from_hex(&hex::encode(signing.verifying_key().to_bytes())).unwrap();
        let signature = signed(&signing, "1700000000", r#"{"type":1}"#);

        assert!(verifier.verify(&signature, "1700000000", br#"{"type":1}"#));
        assert!(!verifier.verify(&signature, "1700000001", br#"{"type":1}"#));
        assert!(!verifier.verify(&signature, "1700000000", br#"{"type":2}"#));
        assert!(!verifier.verify("zz", "1700000000", br#"{"type":1}"#));
        assert!(!verifier.verify(&signature[..64], "1700000000", br#"{"type":1}"#));
    }

    #[test]
    fn malformed_public_key_is_a_config_error() {
        assert!(SignatureVerifier::from_hex("not hex").is_err());
        assert!(SignatureVerifier::from_hex("abcd").is_err());
    }
}
