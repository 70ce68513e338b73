//! # Chat Module
//!
//! Real-time messaging between marketplace participants.
//!
//! - [`registry`]: which participant is online on which session
//! - [`protocol`]: JSON frames of the live channel
//! - [`dispatcher`]: the single send path shared by the live channel and REST
//! - [`typing`]: ephemeral typing indicators

pub mod dispatcher;
pub mod protocol;
pub mod registry;
pub mod typing;

pub use dispatcher::{Delivery, DeliveryDispatcher, OutgoingMessage};
pub use protocol::{ClientEvent, SendMessagePayload, ServerEvent};
pub use registry::{ConnectionRegistry, SessionHandle};
pub use typing::relay_typing;
