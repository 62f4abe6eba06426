//! Capability rules shared by the upload client and the relay.
//!
//! The client evaluates these for immediate feedback; the relay evaluates the
//! same rules again against its own records and has the final say.

use crate::actor::{Actor, TierConfig, TierName, UserRole};
use crate::media::{EventInfo, MediaItem, Visibility};

/// True when the actor is the event's host
pub fn is_host(actor: &Actor, event: &EventInfo) -> bool {
    actor.user_id() == Some(event.host_id.as_str())
}

/// The tier that decides what may be uploaded to `event`.
///
/// The host uploads under their own tier; every other contributor, guests
/// included, uploads under the host's tier.
pub fn governing_tier(actor: &Actor, event: &EventInfo) -> TierName {
    match actor {
        Actor::User { tier, .. } if is_host(actor, event) => *tier,
        _ => event.host_tier,
    }
}

pub fn governing_config(actor: &Actor, event: &EventInfo) -> TierConfig {
    TierConfig::for_tier(governing_tier(actor, event))
}

/// Watermark only when the toggle is on, the actor is a photographer and the
/// governing tier allows it.
pub fn should_watermark(toggle: bool, actor: &Actor, config: &TierConfig) -> bool {
    toggle && actor.role() == Some(UserRole::Photographer) && config.allow_watermark
}

/// Private items are visible to their uploader, the host and admins
pub fn can_view(viewer: &Actor, item: &MediaItem, event: &EventInfo) -> bool {
    match item.visibility {
        Visibility::Public => true,
        Visibility::Private => is_owner_host_or_admin(viewer, item, event),
    }
}

pub fn can_delete(actor: &Actor, item: &MediaItem, event: &EventInfo) -> bool {
    is_owner_host_or_admin(actor, item, event)
}

fn is_owner_host_or_admin(actor: &Actor, item: &MediaItem, event: &EventInfo) -> bool {
    actor.identity() == item.uploader_identity || is_host(actor, event) || actor.is_admin()
}
