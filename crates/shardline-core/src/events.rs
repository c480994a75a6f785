//! Domain events produced by the dispatch router.

use crate::id::marker::{ChannelMarker, GuildMarker, UserMarker};
use crate::id::Id;
use crate::model::{
    Channel, Emoji, Guild, Invite, Member, Message, Reaction, Role, ScheduledEvent,
    StageInstance, User,
};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Event names callbacks can be registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    GatewayDispatch,
    ShardReady,
    Ready,
    Resumed,
    UserUpdate,
    GuildAvailable,
    GuildUnavailable,
    GuildJoin,
    GuildLeave,
    GuildUpdate,
    RoleCreate,
    RoleUpdate,
    RoleDelete,
    GuildMemberJoin,
    GuildMemberUpdate,
    GuildMemberRemove,
    ChannelCreate,
    ChannelUpdate,
    ChannelDelete,
    ChannelPinsUpdate,
    TypingStart,
    MessageCreate,
    MessageUpdate,
    MessageDelete,
    MessageBulkDelete,
    ReactionAdd,
    ReactionRemove,
    ReactionClear,
    ReactionClearEmoji,
    EmojisUpdate,
    ScheduledEventCreate,
    ScheduledEventUpdate,
    ScheduledEventDelete,
    StageInstanceCreate,
    StageInstanceUpdate,
    StageInstanceDelete,
    InviteCreate,
    InviteDelete,
}

impl EventKind {
    pub const ALL: [EventKind; 38] = [
        Self::GatewayDispatch,
        Self::ShardReady,
        Self::Ready,
        Self::Resumed,
        Self::UserUpdate,
        Self::GuildAvailable,
        Self::GuildUnavailable,
        Self::GuildJoin,
        Self::GuildLeave,
        Self::GuildUpdate,
        Self::RoleCreate,
        Self::RoleUpdate,
        Self::RoleDelete,
        Self::GuildMemberJoin,
        Self::GuildMemberUpdate,
        Self::GuildMemberRemove,
        Self::ChannelCreate,
        Self::ChannelUpdate,
        Self::ChannelDelete,
        Self::ChannelPinsUpdate,
        Self::TypingStart,
        Self::MessageCreate,
        Self::MessageUpdate,
        Self::MessageDelete,
        Self::MessageBulkDelete,
        Self::ReactionAdd,
        Self::ReactionRemove,
        Self::ReactionClear,
        Self::ReactionClearEmoji,
        Self::EmojisUpdate,
        Self::ScheduledEventCreate,
        Self::ScheduledEventUpdate,
        Self::ScheduledEventDelete,
        Self::StageInstanceCreate,
        Self::StageInstanceUpdate,
        Self::StageInstanceDelete,
        Self::InviteCreate,
        Self::InviteDelete,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::GatewayDispatch => "gateway_dispatch",
            Self::ShardReady => "shard_ready",
            Self::Ready => "ready",
            Self::Resumed => "resumed",
            Self::UserUpdate => "user_update",
            Self::GuildAvailable => "guild_available",
            Self::GuildUnavailable => "guild_unavailable",
            Self::GuildJoin => "guild_join",
            Self::GuildLeave => "guild_leave",
            Self::GuildUpdate => "guild_update",
            Self::RoleCreate => "role_create",
            Self::RoleUpdate => "role_update",
            Self::RoleDelete => "role_delete",
            Self::GuildMemberJoin => "guild_member_join",
            Self::GuildMemberUpdate => "guild_member_update",
            Self::GuildMemberRemove => "guild_member_remove",
            Self::ChannelCreate => "channel_create",
            Self::ChannelUpdate => "channel_update",
            Self::ChannelDelete => "channel_delete",
            Self::ChannelPinsUpdate => "channel_pins_update",
            Self::TypingStart => "typing_start",
            Self::MessageCreate => "message_create",
            Self::MessageUpdate => "message_update",
            Self::MessageDelete => "message_delete",
            Self::MessageBulkDelete => "message_bulk_delete",
            Self::ReactionAdd => "reaction_add",
            Self::ReactionRemove => "reaction_remove",
            Self::ReactionClear => "reaction_clear",
            Self::ReactionClearEmoji => "reaction_clear_emoji",
            Self::EmojisUpdate => "emojis_update",
            Self::ScheduledEventCreate => "scheduled_event_create",
            Self::ScheduledEventUpdate => "scheduled_event_update",
            Self::ScheduledEventDelete => "scheduled_event_delete",
            Self::StageInstanceCreate => "stage_instance_create",
            Self::StageInstanceUpdate => "stage_instance_update",
            Self::StageInstanceDelete => "stage_instance_delete",
            Self::InviteCreate => "invite_create",
            Self::InviteDelete => "invite_delete",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Unrecognised event name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown event name: {0}")]
pub struct UnknownEvent(pub String);

impl FromStr for EventKind {
    type Err = UnknownEvent;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| UnknownEvent(s.to_string()))
    }
}

/// A domain event.
///
/// Variants tied to a gateway connection carry the shard index.
#[derive(Debug, Clone)]
pub enum Event {
    /// Raw dispatch, emitted before routing when debug events are enabled.
    GatewayDispatch {
        shard: u32,
        name: String,
        data: Value,
    },
    /// A shard finished receiving its initial guilds.
    ShardReady { shard: u32 },
    /// Every shard is ready. Fires once per launch.
    Ready,
    Resumed { shard: u32 },
    UserUpdate {
        shard: u32,
        before: Option<User>,
        after: User,
    },
    GuildAvailable { shard: u32, guild: Guild },
    GuildUnavailable { shard: u32, guild: Guild },
    GuildJoin { shard: u32, guild: Guild },
    GuildLeave { shard: u32, guild: Guild },
    GuildUpdate {
        shard: u32,
        before: Guild,
        after: Guild,
    },
    RoleCreate {
        shard: u32,
        guild_id: Id<GuildMarker>,
        role: Role,
    },
    RoleUpdate {
        shard: u32,
        guild_id: Id<GuildMarker>,
        before: Role,
        after: Role,
    },
    RoleDelete {
        shard: u32,
        guild_id: Id<GuildMarker>,
        role: Role,
    },
    GuildMemberJoin {
        shard: u32,
        guild_id: Id<GuildMarker>,
        member: Member,
    },
    GuildMemberUpdate {
        shard: u32,
        guild_id: Id<GuildMarker>,
        before: Member,
        after: Member,
    },
    GuildMemberRemove {
        shard: u32,
        guild_id: Id<GuildMarker>,
        member: Member,
    },
    ChannelCreate { shard: u32, channel: Channel },
    ChannelUpdate {
        shard: u32,
        before: Channel,
        after: Channel,
    },
    ChannelDelete { shard: u32, channel: Channel },
    ChannelPinsUpdate {
        shard: u32,
        channel: Channel,
        last_pin_timestamp: Option<String>,
    },
    TypingStart {
        shard: u32,
        channel: Channel,
        user_id: Id<UserMarker>,
        member: Option<Member>,
        timestamp: u64,
    },
    MessageCreate { shard: u32, message: Message },
    MessageUpdate {
        shard: u32,
        before: Message,
        after: Message,
    },
    MessageDelete { shard: u32, message: Message },
    /// Only the deleted messages that were cached.
    MessageBulkDelete {
        shard: u32,
        channel_id: Id<ChannelMarker>,
        messages: Vec<Message>,
    },
    ReactionAdd {
        shard: u32,
        message: Message,
        /// The reaction after the addition.
        reaction: Reaction,
        user_id: Id<UserMarker>,
        member: Option<Member>,
    },
    /// `member` is only known when the reactor is cached.
    ReactionRemove {
        shard: u32,
        message: Message,
        /// The reaction after the removal; a count of 0 means it is gone.
        reaction: Reaction,
        user_id: Id<UserMarker>,
        member: Option<Member>,
    },
    ReactionClear {
        shard: u32,
        message: Message,
        reactions: Vec<Reaction>,
    },
    ReactionClearEmoji {
        shard: u32,
        message: Message,
        reaction: Reaction,
    },
    EmojisUpdate {
        shard: u32,
        guild_id: Id<GuildMarker>,
        before: Vec<Emoji>,
        after: Vec<Emoji>,
    },
    ScheduledEventCreate { shard: u32, event: ScheduledEvent },
    ScheduledEventUpdate {
        shard: u32,
        before: ScheduledEvent,
        after: ScheduledEvent,
    },
    ScheduledEventDelete { shard: u32, event: ScheduledEvent },
    StageInstanceCreate { shard: u32, stage: StageInstance },
    StageInstanceUpdate {
        shard: u32,
        before: StageInstance,
        after: StageInstance,
    },
    StageInstanceDelete { shard: u32, stage: StageInstance },
    InviteCreate {
        shard: u32,
        guild: Guild,
        channel: Channel,
        invite: Invite,
    },
    InviteDelete {
        shard: u32,
        guild: Guild,
        channel: Channel,
        code: String,
    },
}

impl Event {
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::GatewayDispatch { .. } => EventKind::GatewayDispatch,
            Self::ShardReady { .. } => EventKind::ShardReady,
            Self::Ready => EventKind::Ready,
            Self::Resumed { .. } => EventKind::Resumed,
            Self::UserUpdate { .. } => EventKind::UserUpdate,
            Self::GuildAvailable { .. } => EventKind::GuildAvailable,
            Self::GuildUnavailable { .. } => EventKind::GuildUnavailable,
            Self::GuildJoin { .. } => EventKind::GuildJoin,
            Self::GuildLeave { .. } => EventKind::GuildLeave,
            Self::GuildUpdate { .. } => EventKind::GuildUpdate,
            Self::RoleCreate { .. } => EventKind::RoleCreate,
            Self::RoleUpdate { .. } => EventKind::RoleUpdate,
            Self::RoleDelete { .. } => EventKind::RoleDelete,
            Self::GuildMemberJoin { .. } => EventKind::GuildMemberJoin,
            Self::GuildMemberUpdate { .. } => EventKind::GuildMemberUpdate,
            Self::GuildMemberRemove { .. } => EventKind::GuildMemberRemove,
            Self::ChannelCreate { .. } => EventKind::ChannelCreate,
            Self::ChannelUpdate { .. } => EventKind::ChannelUpdate,
            Self::ChannelDelete { .. } => EventKind::ChannelDelete,
            Self::ChannelPinsUpdate { .. } => EventKind::ChannelPinsUpdate,
            Self::TypingStart { .. } => EventKind::TypingStart,
            Self::MessageCreate { .. } => EventKind::MessageCreate,
            Self::MessageUpdate { .. } => EventKind::MessageUpdate,
            Self::MessageDelete { .. } => EventKind::MessageDelete,
            Self::MessageBulkDelete { .. } => EventKind::MessageBulkDelete,
            Self::ReactionAdd { .. } => EventKind::ReactionAdd,
            Self::ReactionRemove { .. } => EventKind::ReactionRemove,
            Self::ReactionClear { .. } => EventKind::ReactionClear,
            Self::ReactionClearEmoji { .. } => EventKind::ReactionClearEmoji,
            Self::EmojisUpdate { .. } => EventKind::EmojisUpdate,
            Self::ScheduledEventCreate { .. } => EventKind::ScheduledEventCreate,
            Self::ScheduledEventUpdate { .. } => EventKind::ScheduledEventUpdate,
            Self::ScheduledEventDelete { .. } => EventKind::ScheduledEventDelete,
            Self::StageInstanceCreate { .. } => EventKind::StageInstanceCreate,
            Self::StageInstanceUpdate { .. } => EventKind::StageInstanceUpdate,
            Self::StageInstanceDelete { .. } => EventKind::StageInstanceDelete,
            Self::InviteCreate { .. } => EventKind::InviteCreate,
            Self::InviteDelete { .. } => EventKind::InviteDelete,
        }
    }

    /// The shard that produced the event. `None` for client-wide events.
    #[must_use]
    pub fn shard(&self) -> Option<u32> {
        match self {
            Self::Ready => None,
            Self::GatewayDispatch { shard, .. }
            | Self::ShardReady { shard }
            | Self::Resumed { shard }
            | Self::UserUpdate { shard, .. }
            | Self::GuildAvailable { shard, .. }
            | Self::GuildUnavailable { shard, .. }
            | Self::GuildJoin { shard, .. }
            | Self::GuildLeave { shard, .. }
            | Self::GuildUpdate { shard, .. }
            | Self::RoleCreate { shard, .. }
            | Self::RoleUpdate { shard, .. }
            | Self::RoleDelete { shard, .. }
            | Self::GuildMemberJoin { shard, .. }
            | Self::GuildMemberUpdate { shard, .. }
            | Self::GuildMemberRemove { shard, .. }
            | Self::ChannelCreate { shard, .. }
            | Self::ChannelUpdate { shard, .. }
            | Self::ChannelDelete { shard, .. }
            | Self::ChannelPinsUpdate { shard, .. }
            | Self::TypingStart { shard, .. }
            | Self::MessageCreate { shard, .. }
            | Self::MessageUpdate { shard, .. }
            | Self::MessageDelete { shard, .. }
            | Self::MessageBulkDelete { shard, .. }
            | Self::ReactionAdd { shard, .. }
            | Self::ReactionRemove { shard, .. }
            | Self::ReactionClear { shard, .. }
            | Self::ReactionClearEmoji { shard, .. }
            | Self::EmojisUpdate { shard, .. }
            | Self::ScheduledEventCreate { shard, .. }
            | Self::ScheduledEventUpdate { shard, .. }
            | Self::ScheduledEventDelete { shard, .. }
            | Self::StageInstanceCreate { shard, .. }
            | Self::StageInstanceUpdate { shard, .. }
            | Self::StageInstanceDelete { shard, .. }
            | Self::InviteCreate { shard, .. }
            | Self::InviteDelete { shard, .. } => Some(*shard),
        }
    }
}
