//! Momentwall Types
//!
//! Shared type definitions for media items, room events, payload schemas,
//! actors and tiers used by the upload client, the gallery store and the relay.

pub mod actor;
pub mod error;
pub mod events;
pub mod headers;
pub mod media;
pub mod policy;
pub mod schemas;

pub use actor::*;
pub use error::*;
pub use events::*;
pub use media::*;
pub use schemas::*;
