//! Domain layer containing the console's core types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared primitives (IDs, errors, resource groups, observable storage)
//! - `event` - Bus events and subscriptions over event types
//! - `user` - Users, password records and the user directory
//! - `view` - Client view bundles
//! - `connection` - Client connection lifecycle and request addressing
//! - `stack` - Serving stack run policy

pub mod connection;
pub mod event;
pub mod foundation;
pub mod stack;
pub mod user;
pub mod view;
