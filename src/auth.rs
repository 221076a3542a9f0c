//! Credential verification seam.
//!
//! The parser consults a verifier for POST requests to the login and
//! register routes. Persistent storage lives behind this trait; the
//! in-memory store below is what the standalone server runs with.

use std::collections::HashMap;
use std::sync::Mutex;

/// Contract consumed by the request parser: `is_login` selects between
/// checking an existing account and registering a new one.
pub trait CredentialVerifier: Send + Sync {
    fn verify(&self, username: &str, password: &str, is_login: bool) -> bool;
}

/// Mutex-guarded username → password map. Login requires an exact match;
/// registration claims an unused name. Empty names or passwords are always
/// rejected.
#[derive(Debug, Default)]
pub struct MemoryCredentials {
    users: Mutex<HashMap<String, String>>,
}

impl MemoryCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seed an account, e.g. from a fixture or config.
    pub fn insert(&self, username: impl Into<String>, password: impl Into<String>) {
        let mut users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        users.insert(username.into(), password.into());
    }
}

impl CredentialVerifier for MemoryCredentials {
    fn verify(&self, username: &str, password: &str, is_login: bool) -> bool {
        if username.is_empty() || password.is_empty() {
            return false;
        }
        let mut users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        if is_login {
            users.get(username).is_some_and(|p| p == password)
        } else {
            if users.contains_key(username) {
                tracing::info!(username, "registration rejected, name in use");
                return false;
            }
            users.insert(username.to_string(), password.to_string());
            true
        }
    }
}

/// Verifier that rejects everything; handy for tests and for running the
/// server with the auth routes disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct DenyAll;

impl CredentialVerifier for DenyAll {
    fn verify(&self, _username: &str, _password: &str, _is_login: bool) -> bool {
        false
    }
}
