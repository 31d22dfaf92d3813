//! Salt → derived key cache for batch decryption under one password
//!
//! Decrypting many containers produced in one run means many KDF calls for
//! the same (password, salt). The cache remembers derived keys for the
//! lifetime of one batch and is zeroized with it.
//!
//! A cache is bound to a single password: looking up with a different
//! password than the one that populated it returns the old key, which then
//! fails authentication. Lookups take `&mut self`, so sharing one cache
//! across threads needs external locking; parallel callers should use one
//! cache per worker.

use std::collections::HashMap;

use secrecy::SecretString;

use crate::error::SymResult;
use crate::kdf::{derive_key, DerivedKey, HashParams};

#[derive(Debug, Default)]
pub struct PasswordCache {
    keys: HashMap<(HashParams, Vec<u8>), DerivedKey>,
}

impl PasswordCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached key for `salt`, deriving and inserting it on a miss.
    pub fn get_or_derive(
        &mut self,
        password: &SecretString,
        salt: &[u8],
        params: &HashParams,
    ) -> SymResult<DerivedKey> {
        let lookup = (*params, salt.to_vec());
        if let Some(key) = self.keys.get(&lookup) {
            tracing::debug!("password cache hit");
            return Ok(key.clone());
        }

        tracing::debug!("password cache miss");
        let key = derive_key(password, salt, params)?;
        self.keys.insert(lookup, key.clone());
        Ok(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn clear(&mut self) {
        self.keys.clear();
    }
}
