//! User module - identities, credentials and the user directory.

mod directory;
mod password;

pub use directory::{AuthenticationError, User, UserDirectory, UserEntry};
pub use password::{PasswordError, PasswordRecord};
