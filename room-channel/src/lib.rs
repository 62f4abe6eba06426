//! Room Channel Library
//!
//! Fans out media state changes to every connection currently viewing an
//! event. Delivery is best-effort: a member that is not joined when an event
//! is published never sees it and resynchronizes by refetching.

pub mod connection;
pub mod error;
pub mod hub;
pub mod nats;
pub mod protocol;
pub mod traits;
pub mod websocket;

pub use connection::*;
pub use error::*;
pub use hub::*;
pub use nats::*;
pub use protocol::*;
pub use traits::*;
pub use websocket::*;
