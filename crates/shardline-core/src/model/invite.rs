use super::user::User;
use crate::id::marker::{ChannelMarker, GuildMarker};
use crate::id::Id;
use serde::{Deserialize, Serialize};

/// An invite as sent with INVITE_CREATE.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invite {
    pub code: String,
    pub channel_id: Id<ChannelMarker>,
    #[serde(default)]
    pub guild_id: Option<Id<GuildMarker>>,
    #[serde(default)]
    pub inviter: Option<User>,
    /// Seconds the invite stays valid; 0 for no expiry.
    #[serde(default)]
    pub max_age: u32,
    /// 0 for unlimited.
    #[serde(default)]
    pub max_uses: u32,
    #[serde(default)]
    pub uses: u32,
    #[serde(default)]
    pub temporary: bool,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub target_type: Option<u8>,
    #[serde(default)]
    pub target_user: Option<User>,
}
