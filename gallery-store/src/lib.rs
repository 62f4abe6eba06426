//! Gallery Store
//!
//! The client side of a live event gallery: the reconciliation store that
//! merges fetched, optimistic and broadcast state by media id, the gallery API
//! client, and the session object an event view owns while it is on screen.

pub mod api;
pub mod error;
pub mod session;
pub mod store;

pub use api::{GalleryApi, HttpGalleryApi};
pub use error::*;
pub use session::{GallerySession, SessionEvent};
pub use store::{GalleryStore, StoreChange};
