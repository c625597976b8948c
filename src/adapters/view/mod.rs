//! View providers.
//!
//! - `ViewDirectory` - views materialised from the filesystem
//! - `InMemoryViewProvider` - fixed views for tests

mod filesystem;
mod in_memory;

pub use filesystem::ViewDirectory;
pub use in_memory::InMemoryViewProvider;
