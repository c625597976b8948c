//! Read-only user directory.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::foundation::{DomainError, ErrorCode};

use super::PasswordRecord;

/// Authenticated identity attached to a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub name: String,
    pub roles: BTreeSet<String>,
    /// Default view after login. `None` keeps the connection on no view.
    pub view: Option<String>,
}

/// Directory entry: identity plus stored credentials.
#[derive(Debug, Clone)]
pub struct UserEntry {
    pub user: User,
    pub password: PasswordRecord,
}

/// Reasons a login is refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthenticationError {
    #[error("unknown user '{0}'")]
    UnknownUser(String),

    #[error("invalid password")]
    InvalidPassword,
}

impl From<AuthenticationError> for DomainError {
    // Clients learn only that authentication failed, not which part.
    fn from(err: AuthenticationError) -> Self {
        DomainError::new(ErrorCode::AuthenticationFailed, "authentication failed")
            .with_detail("reason", err.to_string())
    }
}

/// Name to user lookup, immutable after construction.
#[derive(Debug, Clone, Default)]
pub struct UserDirectory {
    entries: HashMap<String, UserEntry>,
}

impl UserDirectory {
    /// Builds the directory.
    ///
    /// # Errors
    ///
    /// Returns a configuration error on duplicate user names.
    pub fn new<I>(entries: I) -> Result<Self, DomainError>
    where
        I: IntoIterator<Item = UserEntry>,
    {
        let mut map = HashMap::new();
        for entry in entries {
            let name = entry.user.name.clone();
            if map.insert(name.clone(), entry).is_some() {
                return Err(DomainError::configuration(format!(
                    "duplicate user name '{}'",
                    name
                )));
            }
        }
        Ok(Self { entries: map })
    }

    /// Verifies credentials and returns the matching user.
    pub fn authenticate(&self, name: &str, password: &str) -> Result<User, AuthenticationError> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| AuthenticationError::UnknownUser(name.to_string()))?;

        if !entry.password.verify(password) {
            return Err(AuthenticationError::InvalidPassword);
        }

        Ok(entry.user.clone())
    }

    /// Looks up a user without checking credentials.
    pub fn get(&self, name: &str) -> Option<&User> {
        self.entries.get(name).map(|entry| &entry.user)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
