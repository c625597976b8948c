//! opview - Operator Console Backend
//!
//! Connects to an event bus, routes incoming events to configured adapter
//! plugins, and serves browser clients over WebSocket. Each client logs in
//! against the user directory, receives its view, and gets the private
//! state of one session per adapter replicated as JSON Patch messages.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
