//! # HTTP Request Handlers
//!
//! Axum handlers organized by feature.
//!
//! ## Handler Modules
//!
//! - **[`conversations`]**: REST pull path (list, create, history, send, read, delete)
//! - **[`websocket`]**: the authenticated live channel at `GET /api/ws/chat`
//!
//! ## Authentication
//!
//! REST handlers extract `Extension<CurrentParticipant>`, inserted by
//! [`require_auth`](crate::middleware::require_auth). The WebSocket handler
//! authenticates the upgrade request itself.
//!
//! ## Error Handling
//!
//! Handlers return `lib_core::Result<T>`; `AppError` renders as
//! `{"error": "...", "code": "..."}` with the matching status code.

pub mod conversations;
pub mod websocket;
