//! User configuration

use serde::Deserialize;

use crate::domain::user::{PasswordRecord, User, UserEntry};

/// One configured user.
#[derive(Debug, Clone, Deserialize)]
pub struct UserConfig {
    pub name: String,
    pub password: PasswordRecord,
    #[serde(default)]
    pub roles: Vec<String>,
    /// View shown after login
    pub view: Option<String>,
}

impl UserConfig {
    pub fn to_entry(&self) -> UserEntry {
        UserEntry {
            user: User {
                name: self.name.clone(),
                roles: self.roles.iter().cloned().collect(),
                view: self.view.clone(),
            },
            password: self.password.clone(),
        }
    }
}
