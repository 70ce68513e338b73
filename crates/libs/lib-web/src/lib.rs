//! # Web Library
//!
//! HTTP handlers, the live channel, middleware, and server wiring for the
//! messaging core.

pub mod chat;
pub mod handlers;
pub mod middleware;
pub mod server;
pub mod services;

#[cfg(test)]
pub(crate) mod test_support;

pub use server::{create_router, start_server, AppState, ServerConfig};
