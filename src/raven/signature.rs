//! Response signature verification.
//!
//! Responses are signed with RSA PKCS#1 v1.5 over a SHA-1 digest of the
//! signed payload. The verifying key is picked by the response's `kid` from
//! either the live or the test key set, unless an explicit override key is
//! configured. Keys are parsed once and shared read-only.

use std::collections::HashMap;

use openssl::{
    hash::MessageDigest,
    pkey::{PKey, Public},
    rsa::Rsa,
    sign::Verifier,
    x509::X509,
};

use super::KeyError;
use crate::config::{KeySource, RavenConfig};

/// Immutable set of verification keys.
pub struct KeyStore {
    override_key: Option<PKey<Public>>,
    live: HashMap<String, PKey<Public>>,
    test: HashMap<String, PKey<Public>>,
    test_mode: bool,
}

impl std::fmt::Debug for KeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut live: Vec<&String> = self.live.keys().collect();
        live.sort();
        let mut test: Vec<&String> = self.test.keys().collect();
        test.sort();
        f.debug_struct("KeyStore")
            .field("override_key", &self.override_key.is_some())
            .field("live", &live)
            .field("test", &test)
            .field("test_mode", &self.test_mode)
            .finish()
    }
}

impl KeyStore {
    /// Load every configured key. Fails if the active mode has nothing to
    /// verify with.
    pub fn from_config(config: &RavenConfig) -> Result<Self, KeyError> {
        let override_key = config
            .signing_key
            .as_ref()
            .map(|source| load_key_source("override", source))
            .transpose()?;

        let live = load_key_set(&config.live_keys)?;
        let test = load_key_set(&config.test_keys)?;

        let store = Self {
            override_key,
            live,
            test,
            test_mode: config.test_mode,
        };
        store.ensure_usable()?;

        tracing::debug!(key_store = ?store, "Loaded signing keys");
        Ok(store)
    }

    /// An empty store; populate with the `with_*` methods.
    pub fn new(test_mode: bool) -> Self {
        Self {
            override_key: None,
            live: HashMap::new(),
            test: HashMap::new(),
            test_mode,
        }
    }

    pub fn with_override_key(mut self, key: PKey<Public>) -> Self {
        self.override_key = Some(key);
        self
    }

    pub fn with_live_key(mut self, kid: impl Into<String>, key: PKey<Public>) -> Self {
        self.live.insert(kid.into(), key);
        self
    }

    pub fn with_test_key(mut self, kid: impl Into<String>, key: PKey<Public>) -> Self {
        self.test.insert(kid.into(), key);
        self
    }

    pub fn is_test_mode(&self) -> bool {
        self.test_mode
    }

    fn ensure_usable(&self) -> Result<(), KeyError> {
        if self.override_key.is_some() {
            return Ok(());
        }
        if self.test_mode {
            if self.test.is_empty() {
                return Err(KeyError::TestKeysUnavailable);
            }
        } else if self.live.is_empty() {
            return Err(KeyError::NoKeys);
        }
        Ok(())
    }

    /// Key for `kid`: the override if set, else from the active set.
    /// `Ok(None)` means the active set has no such key.
    fn resolve(&self, kid: &str) -> Result<Option<&PKey<Public>>, KeyError> {
        if let Some(key) = &self.override_key {
            return Ok(Some(key));
        }
        self.ensure_usable()?;
        let set = if self.test_mode { &self.test } else { &self.live };
        Ok(set.get(kid))
    }

    /// Check `signature` over `payload` with the key named by `kid`.
    ///
    /// A mismatch, a malformed signature or an unknown `kid` all return
    /// `Ok(false)`; only an unusable key store is an error.
    pub fn verify(&self, payload: &[u8], signature: &[u8], kid: &str) -> Result<bool, KeyError> {
        let Some(key) = self.resolve(kid)? else {
            tracing::warn!(
                kid = %kid,
                test_mode = self.test_mode,
                "Response signed with unknown key"
            );
            return Ok(false);
        };

        let mut verifier = Verifier::new(MessageDigest::sha1(), key)
            .map_err(|e| KeyError::Crypto(format!("Failed to create verifier: {}", e)))?;
        verifier
            .update(payload)
            .map_err(|e| KeyError::Crypto(format!("Failed to update verifier: {}", e)))?;

        match verifier.verify(signature) {
            Ok(valid) => Ok(valid),
            Err(e) => {
                // Wrong-length or otherwise undecodable signatures land here.
                tracing::debug!(kid = %kid, error = %e, "Signature could not be checked");
                Ok(false)
            }
        }
    }
}

fn load_key_set(
    sources: &std::collections::BTreeMap<String, KeySource>,
) -> Result<HashMap<String, PKey<Public>>, KeyError> {
    sources
        .iter()
        .map(|(kid, source)| Ok((kid.clone(), load_key_source(kid, source)?)))
        .collect()
}

fn load_key_source(kid: &str, source: &KeySource) -> Result<PKey<Public>, KeyError> {
    match source {
        KeySource::Pem { pem } => load_public_key(kid, pem.as_bytes()),
        KeySource::Path { path } => {
            let pem = std::fs::read(path).map_err(|source| KeyError::Io {
                path: path.clone(),
                source,
            })?;
            load_public_key(kid, &pem)
        }
    }
}

/// Parse an RSA public key from a certificate, SPKI or PKCS#1 PEM block.
pub fn load_public_key(kid: &str, pem: &[u8]) -> Result<PKey<Public>, KeyError> {
    let key = if let Ok(cert) = X509::from_pem(pem) {
        cert.public_key().map_err(|e| KeyError::InvalidKey {
            kid: kid.to_string(),
            reason: format!("certificate has no usable public key: {}", e),
        })?
    } else if let Ok(key) = PKey::public_key_from_pem(pem) {
        key
    } else {
        let rsa = Rsa::public_key_from_pem_pkcs1(pem).map_err(|_| KeyError::InvalidKey {
            kid: kid.to_string(),
            reason: "not a PEM certificate or public key".to_string(),
        })?;
        PKey::from_rsa(rsa).map_err(|e| KeyError::InvalidKey {
            kid: kid.to_string(),
            reason: e.to_string(),
        })?
    };

    if key.rsa().is_err() {
        return Err(KeyError::InvalidKey {
            kid: kid.to_string(),
            reason: "only RSA keys are supported".to_string(),
        });
    }

    Ok(key)
}
