// Process-wide credential cache, keyed by token ID.
//
// Holds the last-supplied activation secret for each token so later token
// operations can re-authenticate without prompting the operator again.
// Entries live until explicitly cleared or the process ends; nothing is
// persisted. Owned behind an Arc and injected, never a global, so tests
// can substitute an isolated instance.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::types::Password;

#[derive(Debug, Default)]
pub struct PasswordStore {
    passwords: Mutex<HashMap<String, Password>>,
}

impl PasswordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the activation secret for a token, replacing any previous one.
    pub fn put(&self, token_id: &str, password: Password) {
        let mut passwords = self.passwords.lock().unwrap();
        passwords.insert(token_id.to_string(), password);
    }

    /// Drop the stored secret for a token. Clearing an absent entry is
    /// a no-op.
    pub fn clear(&self, token_id: &str) {
        let mut passwords = self.passwords.lock().unwrap();
        passwords.remove(token_id);
    }

    /// Last-supplied secret for a token, if one is cached.
    pub fn get(&self, token_id: &str) -> Option<Password> {
        let passwords = self.passwords.lock().unwrap();
        passwords.get(token_id).cloned()
    }

    pub fn contains(&self, token_id: &str) -> bool {
        let passwords = self.passwords.lock().unwrap();
        passwords.contains_key(token_id)
    }
}
