//! Process-wide holder of the live key material.
//!
//! Readers take a shared lock just long enough to clone an `Arc`; the
//! refresher takes the exclusive lock just long enough to swap it. Readers
//! keep their snapshot for the whole verification, so a concurrent swap never
//! affects a request that is already in flight.
//!
//! When a replacement carries a different public key, the outgoing key is
//! kept for verification only until the retention window passes, so tokens
//! signed before a rotation stay valid until they expire.

use crate::key_material::KeyMaterial;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

#[derive(Debug)]
struct Keys {
    current: Arc<KeyMaterial>,
    previous: Option<RetiredKey>,
}

/// A rotated-out key. `until == None` means the window never closes.
#[derive(Debug)]
struct RetiredKey {
    material: Arc<KeyMaterial>,
    until: Option<Instant>,
}

impl RetiredKey {
    fn is_live(&self, now: Instant) -> bool {
        match self.until {
            Some(until) => now < until,
            None => true,
        }
    }
}

/// Shared, swappable key material.
#[derive(Debug, Clone)]
pub struct KeyStore {
    keys: Arc<RwLock<Keys>>,
    previous_key_retention: Duration,
}

impl KeyStore {
    /// A store that forgets the old key as soon as it is replaced.
    #[must_use]
    pub fn new(initial: KeyMaterial) -> Self {
        Self::with_previous_key_retention(initial, Duration::ZERO)
    }

    /// A store that keeps a rotated-out key for verification for `retention`.
    #[must_use]
    pub fn with_previous_key_retention(initial: KeyMaterial, retention: Duration) -> Self {
        Self {
            keys: Arc::new(RwLock::new(Keys {
                current: Arc::new(initial),
                previous: None,
            })),
            previous_key_retention: retention,
        }
    }

    /// Snapshot of the current key material.
    pub async fn read(&self) -> Arc<KeyMaterial> {
        Arc::clone(&self.keys.read().await.current)
    }

    /// Snapshot of every key a token may be verified with: the current key
    /// and, inside its retention window, the key it replaced.
    pub async fn verification_keys(&self) -> (Arc<KeyMaterial>, Option<Arc<KeyMaterial>>) {
        let now = Instant::now();
        let keys = self.keys.read().await;
        let previous = keys
            .previous
            .as_ref()
            .filter(|retired| retired.is_live(now))
            .map(|retired| Arc::clone(&retired.material));
        (Arc::clone(&keys.current), previous)
    }

    /// Atomically replace the key material. Later reads see only `material`
    /// as the current key.
    ///
    /// If `material` has a different public key and retention is enabled, the
    /// outgoing key becomes the previous key. An expired previous key is
    /// dropped here.
    pub async fn replace(&self, material: KeyMaterial) {
        let incoming = material.fingerprint();
        let material = Arc::new(material);
        let now = Instant::now();

        let mut keys = self.keys.write().await;
        if keys.previous.as_ref().is_some_and(|retired| !retired.is_live(now)) {
            keys.previous = None;
        }

        let rotated = incoming.is_some() && keys.current.fingerprint() != incoming;
        let outgoing = std::mem::replace(&mut keys.current, material);
        if rotated && !self.previous_key_retention.is_zero() {
            keys.previous = Some(RetiredKey {
                material: outgoing,
                until: now.checked_add(self.previous_key_retention),
            });
        }
    }
}
