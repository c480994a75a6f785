//! Guilds and the entities a guild owns.

use super::permissions::Permissions;
use super::user::User;
use crate::id::marker::{
    ChannelMarker, EmojiMarker, GuildMarker, RoleMarker, ScheduledEventMarker,
    StageInstanceMarker, UserMarker,
};
use crate::id::Id;
use serde::{Deserialize, Serialize};

/// Guild-level data. Nested entities live in the guild's cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guild {
    pub id: Id<GuildMarker>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub owner_id: Option<Id<UserMarker>>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub member_count: Option<u64>,
    #[serde(default)]
    pub premium_tier: u8,
    #[serde(default)]
    pub large: bool,
    #[serde(default)]
    pub unavailable: bool,
}

impl Guild {
    /// Copy every field but the id from a newer snapshot.
    ///
    /// `member_count` is only sent on GUILD_CREATE and is kept when absent.
    pub fn apply(&mut self, newer: &Guild) {
        self.name.clone_from(&newer.name);
        self.icon.clone_from(&newer.icon);
        self.owner_id = newer.owner_id;
        self.description.clone_from(&newer.description);
        if newer.member_count.is_some() {
            self.member_count = newer.member_count;
        }
        self.premium_tier = newer.premium_tier;
        self.large = newer.large;
        self.unavailable = newer.unavailable;
    }
}

/// Guild entry of the READY payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnavailableGuild {
    pub id: Id<GuildMarker>,
    #[serde(default)]
    pub unavailable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: Id<RoleMarker>,
    pub name: String,
    #[serde(default)]
    pub color: u32,
    #[serde(default)]
    pub hoist: bool,
    #[serde(default)]
    pub position: i64,
    #[serde(default)]
    pub permissions: Permissions,
    #[serde(default)]
    pub managed: bool,
    #[serde(default)]
    pub mentionable: bool,
}

impl Role {
    pub fn apply(&mut self, newer: &Role) {
        self.name.clone_from(&newer.name);
        self.color = newer.color;
        self.hoist = newer.hoist;
        self.position = newer.position;
        self.permissions = newer.permissions;
        self.managed = newer.managed;
        self.mentionable = newer.mentionable;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub user: User,
    #[serde(default)]
    pub nick: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub roles: Vec<Id<RoleMarker>>,
    #[serde(default)]
    pub joined_at: Option<String>,
    #[serde(default)]
    pub premium_since: Option<String>,
    #[serde(default)]
    pub deaf: bool,
    #[serde(default)]
    pub mute: bool,
    #[serde(default)]
    pub pending: bool,
    #[serde(default)]
    pub communication_disabled_until: Option<String>,
}

impl Member {
    #[must_use]
    pub fn id(&self) -> Id<UserMarker> {
        self.user.id
    }

    #[must_use]
    pub fn display_name(&self) -> &str {
        self.nick
            .as_deref()
            .or(self.user.global_name.as_deref())
            .unwrap_or(&self.user.username)
    }

    /// Copy every field but the user id from a newer snapshot.
    ///
    /// Member updates omit `deaf` and `mute`, so those are kept.
    pub fn apply(&mut self, newer: &Member) {
        self.user.apply(&newer.user);
        self.nick.clone_from(&newer.nick);
        self.avatar.clone_from(&newer.avatar);
        self.roles.clone_from(&newer.roles);
        if newer.joined_at.is_some() {
            self.joined_at.clone_from(&newer.joined_at);
        }
        self.premium_since.clone_from(&newer.premium_since);
        self.pending = newer.pending;
        self.communication_disabled_until
            .clone_from(&newer.communication_disabled_until);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Emoji {
    pub id: Id<EmojiMarker>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub roles: Vec<Id<RoleMarker>>,
    #[serde(default)]
    pub require_colons: bool,
    #[serde(default)]
    pub managed: bool,
    #[serde(default)]
    pub animated: bool,
    #[serde(default = "default_true")]
    pub available: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledEvent {
    pub id: Id<ScheduledEventMarker>,
    pub guild_id: Id<GuildMarker>,
    #[serde(default)]
    pub channel_id: Option<Id<ChannelMarker>>,
    #[serde(default)]
    pub creator_id: Option<Id<UserMarker>>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub scheduled_start_time: Option<String>,
    #[serde(default)]
    pub scheduled_end_time: Option<String>,
    #[serde(default)]
    pub status: u8,
    #[serde(default)]
    pub entity_type: u8,
    #[serde(default)]
    pub user_count: Option<u64>,
}

impl ScheduledEvent {
    pub fn apply(&mut self, newer: &ScheduledEvent) {
        self.channel_id = newer.channel_id;
        self.name.clone_from(&newer.name);
        self.description.clone_from(&newer.description);
        self.scheduled_start_time.clone_from(&newer.scheduled_start_time);
        self.scheduled_end_time.clone_from(&newer.scheduled_end_time);
        self.status = newer.status;
        self.entity_type = newer.entity_type;
        if newer.user_count.is_some() {
            self.user_count = newer.user_count;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageInstance {
    pub id: Id<StageInstanceMarker>,
    pub guild_id: Id<GuildMarker>,
    pub channel_id: Id<ChannelMarker>,
    pub topic: String,
    #[serde(default)]
    pub privacy_level: u8,
}

impl StageInstance {
    pub fn apply(&mut self, newer: &StageInstance) {
        self.channel_id = newer.channel_id;
        self.topic.clone_from(&newer.topic);
        self.privacy_level = newer.privacy_level;
    }
}
