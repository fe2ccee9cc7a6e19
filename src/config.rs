//! Connection configuration
//!
//! The graph database connection descriptor is constructed once at startup
//! and passed by reference into the gateway constructor; there is no
//! process-wide configuration state. The password is held in a container
//! that zeros its memory on drop.

use std::fmt;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::errors::{AuditError, Result};

/// A secret that automatically zeros its contents when dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecureString {
    inner: Vec<u8>,
}

impl SecureString {
    pub fn new(s: String) -> Self {
        Self {
            inner: s.into_bytes(),
        }
    }

    /// Temporarily exposes the secret. The returned reference should be
    /// used immediately and not stored.
    pub fn expose_secret(&self) -> &str {
        // Constructed from String only, so the bytes are always valid UTF-8.
        std::str::from_utf8(&self.inner).expect("SecureString contains invalid UTF-8")
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl fmt::Debug for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecureString([REDACTED])")
    }
}

/// Connection descriptor for the graph database holding the collected
/// Active Directory data.
#[derive(Clone)]
pub struct ConnectionConfig {
    pub uri: String,
    pub username: String,
    password: SecureString,
}

#[derive(Deserialize)]
struct ConfigFile {
    database: DatabaseSection,
}

#[derive(Deserialize)]
struct DatabaseSection {
    uri: String,
    username: String,
    password: String,
}

impl ConnectionConfig {
    pub fn new(uri: String, username: String, password: String) -> Self {
        Self {
            uri,
            username,
            password: SecureString::new(password),
        }
    }

    /// Load the connection descriptor from a TOML file with a
    /// `[database]` section carrying `uri`, `username`, and `password`.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| {
            AuditError::Config(format!(
                "could not read {} -- make sure it exists and is readable ({})",
                path.display(),
                e
            ))
        })?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(raw)
            .map_err(|e| AuditError::Config(format!("invalid configuration: {}", e)))?;

        if file.database.uri.is_empty() {
            return Err(AuditError::Config("database.uri must not be empty".into()));
        }
        if file.database.username.is_empty() {
            return Err(AuditError::Config(
                "database.username must not be empty".into(),
            ));
        }

        Ok(Self::new(
            file.database.uri,
            file.database.username,
            file.database.password,
        ))
    }

    /// Temporarily exposes the password for authentication.
    pub fn password(&self) -> &str {
        self.password.expose_secret()
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("uri", &self.uri)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}
