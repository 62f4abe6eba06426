//! HTTP headers that carry the acting identity to the relay.
//!
//! Authentication itself lives outside this system; the relay trusts these
//! headers the way it would trust claims from an upstream auth proxy and looks
//! tiers and roles up in its own directory.

use crate::actor::Actor;

pub const USER_ID: &str = "x-user-id";
pub const GUEST_IDENTITY: &str = "x-guest-identity";
pub const GUEST_NAME: &str = "x-guest-name";

/// Header pairs identifying `actor`
pub fn actor_headers(actor: &Actor) -> Vec<(&'static str, String)> {
    match actor {
        Actor::User { id, .. } => vec![(USER_ID, id.clone())],
        Actor::Guest {
            identity,
            display_name,
        } => vec![
            (GUEST_IDENTITY, identity.as_str().to_string()),
            (GUEST_NAME, display_name.clone()),
        ],
    }
}
