//! Per-guild nested cache.

use super::entity::EntityMap;
use crate::id::marker::{
    ChannelMarker, EmojiMarker, RoleMarker, ScheduledEventMarker, StageInstanceMarker, UserMarker,
};
use crate::model::{Channel, Emoji, Member, Role, ScheduledEvent, StageInstance};

/// Entities owned by one guild.
#[derive(Debug, Default)]
pub struct GuildCache {
    roles: EntityMap<RoleMarker, Role>,
    members: EntityMap<UserMarker, Member>,
    channels: EntityMap<ChannelMarker, Channel>,
    emojis: EntityMap<EmojiMarker, Emoji>,
    scheduled_events: EntityMap<ScheduledEventMarker, ScheduledEvent>,
    stage_instances: EntityMap<StageInstanceMarker, StageInstance>,
}

impl GuildCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn roles(&self) -> &EntityMap<RoleMarker, Role> {
        &self.roles
    }

    /// Members keyed by user id.
    ///
    /// Insert and remove members through [`Cache`](super::Cache) so the
    /// member's user stays retained.
    pub fn members(&self) -> &EntityMap<UserMarker, Member> {
        &self.members
    }

    pub fn channels(&self) -> &EntityMap<ChannelMarker, Channel> {
        &self.channels
    }

    pub fn emojis(&self) -> &EntityMap<EmojiMarker, Emoji> {
        &self.emojis
    }

    pub fn scheduled_events(&self) -> &EntityMap<ScheduledEventMarker, ScheduledEvent> {
        &self.scheduled_events
    }

    pub fn stage_instances(&self) -> &EntityMap<StageInstanceMarker, StageInstance> {
        &self.stage_instances
    }

    /// Empty every store. Returns the removed members.
    pub fn clear(&self) -> Vec<Member> {
        self.roles.clear();
        self.channels.clear();
        self.emojis.clear();
        self.scheduled_events.clear();
        self.stage_instances.clear();
        self.members.drain()
    }
}
