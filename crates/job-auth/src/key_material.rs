//! The key material tokens are signed and verified with.
//!
//! [`KeyMaterial`] is a tagged variant: an RSA key pair (or only its public
//! half) or a shared HMAC secret. The variant decides the algorithm, so the
//! material can never disagree with it.

use crate::config::JwtAlgorithm;
use crate::secret::{ExposeSecret, SecretString};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::{DecodingKey, EncodingKey};
use ring::digest;
use std::fmt;

/// Claims used to check that a loaded private key matches its public key.
#[derive(serde::Serialize, serde::Deserialize)]
struct PairCheckClaims {
    sub: String,
    exp: i64,
}

/// Currently trusted key material.
#[derive(Clone)]
pub enum KeyMaterial {
    /// RSA keys. A runner holds only the public half (`private == None`).
    Rsa {
        public: DecodingKey,
        public_pem: String,
        private: Option<EncodingKey>,
    },
    /// HS256 shared secret.
    Hmac { secret: SecretString },
}

impl KeyMaterial {
    /// Parse a PEM RSA public key.
    ///
    /// # Errors
    ///
    /// Returns the `jsonwebtoken` error if the text is not a PEM RSA public key.
    pub fn rsa_public(public_pem: &str) -> Result<Self, jsonwebtoken::errors::Error> {
        let public = DecodingKey::from_rsa_pem(public_pem.as_bytes())?;
        Ok(KeyMaterial::Rsa {
            public,
            public_pem: public_pem.to_string(),
            private: None,
        })
    }

    /// Parse a PEM RSA private key (PKCS#1 or PKCS#8) and its public key.
    ///
    /// # Errors
    ///
    /// Returns the `jsonwebtoken` error of whichever half fails to parse.
    pub fn rsa_pair(
        private_pem: &str,
        public_pem: &str,
    ) -> Result<Self, jsonwebtoken::errors::Error> {
        let private = EncodingKey::from_rsa_pem(private_pem.as_bytes())?;
        let public = DecodingKey::from_rsa_pem(public_pem.as_bytes())?;
        Ok(KeyMaterial::Rsa {
            public,
            public_pem: public_pem.to_string(),
            private: Some(private),
        })
    }

    #[must_use]
    pub fn hmac(secret: SecretString) -> Self {
        KeyMaterial::Hmac { secret }
    }

    /// Drop the RSA private key, keeping only what verification needs.
    #[must_use]
    pub fn into_public_only(self) -> Self {
        match self {
            KeyMaterial::Rsa {
                public, public_pem, ..
            } => KeyMaterial::Rsa {
                public,
                public_pem,
                private: None,
            },
            hmac @ KeyMaterial::Hmac { .. } => hmac,
        }
    }

    #[must_use]
    pub fn algorithm(&self) -> JwtAlgorithm {
        match self {
            KeyMaterial::Rsa { .. } => JwtAlgorithm::Rsa256,
            KeyMaterial::Hmac { .. } => JwtAlgorithm::Hs256,
        }
    }

    /// Key for signing, if this material can sign.
    #[must_use]
    pub fn encoding_key(&self) -> Option<EncodingKey> {
        match self {
            KeyMaterial::Rsa { private, .. } => private.clone(),
            KeyMaterial::Hmac { secret } => {
                Some(EncodingKey::from_secret(secret.expose_secret().as_bytes()))
            }
        }
    }

    /// Key for verification.
    #[must_use]
    pub fn decoding_key(&self) -> DecodingKey {
        match self {
            KeyMaterial::Rsa { public, .. } => public.clone(),
            KeyMaterial::Hmac { secret } => {
                DecodingKey::from_secret(secret.expose_secret().as_bytes())
            }
        }
    }

    #[must_use]
    pub fn has_private_key(&self) -> bool {
        matches!(self, KeyMaterial::Rsa { private: Some(_), .. })
    }

    /// PEM text of the RSA public key.
    #[must_use]
    pub fn public_pem(&self) -> Option<&str> {
        match self {
            KeyMaterial::Rsa { public_pem, .. } => Some(public_pem),
            KeyMaterial::Hmac { .. } => None,
        }
    }

    /// Short, non-secret identifier of the RSA public key.
    ///
    /// First 12 bytes of the SHA-256 of the PEM text, base64url encoded. Used
    /// in logs to tell whether a refresh actually rotated the key.
    #[must_use]
    pub fn fingerprint(&self) -> Option<String> {
        let pem = self.public_pem()?;
        let hash = digest::digest(&digest::SHA256, pem.trim().as_bytes());
        let prefix = hash.as_ref().get(..12)?;
        Some(URL_SAFE_NO_PAD.encode(prefix))
    }

    /// Check that the private half signs tokens the public half accepts.
    ///
    /// Returns `true` for material without a private key and for HMAC.
    #[must_use]
    pub fn halves_match(&self) -> bool {
        let KeyMaterial::Rsa {
            public,
            private: Some(private),
            ..
        } = self
        else {
            return true;
        };

        let check = PairCheckClaims {
            sub: "key-pair-check".to_string(),
            exp: chrono::Utc::now().timestamp() + 60,
        };
        let algorithm = jsonwebtoken::Algorithm::RS256;

        crate::jwt::sign(&check, private, algorithm)
            .ok()
            .and_then(|token| crate::jwt::verify::<PairCheckClaims>(&token, public, algorithm).ok())
            .is_some()
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyMaterial::Rsa { private, .. } => f
                .debug_struct("KeyMaterial::Rsa")
                .field("fingerprint", &self.fingerprint())
                .field("private", &private.as_ref().map(|_| "[REDACTED]"))
                .finish(),
            KeyMaterial::Hmac { .. } => f
                .debug_struct("KeyMaterial::Hmac")
                .field("secret", &"[REDACTED]")
                .finish(),
        }
    }
}
