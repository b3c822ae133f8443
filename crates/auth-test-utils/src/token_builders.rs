//! Builders for token claims.

use chrono::{Duration, Utc};
use serde_json::{json, Map, Value};

/// Builder for JWT claims as JSON.
///
/// # Example
/// ```rust,ignore
/// let claims = TestClaimsBuilder::new()
///     .for_subject("job-17")
///     .with_claim("role", "runner")
///     .expires_in(60)
///     .build();
/// ```
pub struct TestClaimsBuilder {
    sub: String,
    exp: i64,
    iat: i64,
    extra: Map<String, Value>,
}

impl TestClaimsBuilder {
    /// Claims for `test-subject`, issued now, valid for an hour.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            sub: "test-subject".to_string(),
            exp: (now + Duration::seconds(3600)).timestamp(),
            iat: now.timestamp(),
            extra: Map::new(),
        }
    }

    pub fn for_subject(mut self, subject: &str) -> Self {
        self.sub = subject.to_string();
        self
    }

    /// Set expiration in seconds from now (negative for already expired).
    pub fn expires_in(mut self, seconds: i64) -> Self {
        self.exp = (Utc::now() + Duration::seconds(seconds)).timestamp();
        self
    }

    /// Set issued-at in seconds from now.
    pub fn issued_in(mut self, seconds: i64) -> Self {
        self.iat = (Utc::now() + Duration::seconds(seconds)).timestamp();
        self
    }

    pub fn with_claim(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.extra.insert(name.to_string(), value.into());
        self
    }

    pub fn build(self) -> Value {
        let mut claims = json!({
            "sub": self.sub,
            "exp": self.exp,
            "iat": self.iat,
        });
        if let Value::Object(map) = &mut claims {
            map.extend(self.extra);
        }
        claims
    }
}

impl Default for TestClaimsBuilder {
    fn default() -> Self {
        Self::new()
    }
}
