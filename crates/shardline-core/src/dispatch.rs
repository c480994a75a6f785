//! Dispatch routing.
//!
//! Turns `(shard, event name, payload)` triples from the gateway into cache
//! mutations and domain events. Names without a handler are ignored so new
//! protocol events never break a running client.

use crate::bus::EventBus;
use crate::cache::{Cache, GuildCache};
use crate::events::Event;
use crate::id::marker::{
    ChannelMarker, GuildMarker, MessageMarker, RoleMarker, ScheduledEventMarker,
    StageInstanceMarker, UserMarker,
};
use crate::id::Id;
use crate::model::{
    Channel, Emoji, Guild, Invite, Member, Message, PartialEmoji, Role, ScheduledEvent,
    StageInstance, UnavailableGuild, User,
};
use crate::ready::{ReadyBarrier, DEFAULT_READY_TIMEOUT};
use dashmap::DashSet;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, trace, warn};

/// Why a dispatch was dropped.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The payload did not have the expected shape.
    #[error("Malformed {event} payload: {source}")]
    Payload {
        event: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// A referenced entity is not cached.
    #[error("{entity} {id} is not cached")]
    Missing { entity: &'static str, id: u64 },
}

fn missing<M>(entity: &'static str, id: Id<M>) -> DispatchError {
    DispatchError::Missing {
        entity,
        id: id.get(),
    }
}

/// Gateway dispatch events with a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatchKind {
    Ready,
    Resumed,
    UserUpdate,
    GuildCreate,
    GuildUpdate,
    GuildDelete,
    GuildRoleCreate,
    GuildRoleUpdate,
    GuildRoleDelete,
    GuildMemberAdd,
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
    MessageDeleteBulk,
    MessageReactionAdd,
    MessageReactionRemove,
    MessageReactionRemoveAll,
    MessageReactionRemoveEmoji,
    GuildEmojisUpdate,
    GuildScheduledEventCreate,
    GuildScheduledEventUpdate,
    GuildScheduledEventDelete,
    StageInstanceCreate,
    StageInstanceUpdate,
    StageInstanceDelete,
    InviteCreate,
    InviteDelete,
}

impl DispatchKind {
    /// Look up the handler for a dispatch name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "READY" => Self::Ready,
            "RESUMED" => Self::Resumed,
            "USER_UPDATE" => Self::UserUpdate,
            "GUILD_CREATE" => Self::GuildCreate,
            "GUILD_UPDATE" => Self::GuildUpdate,
            "GUILD_DELETE" => Self::GuildDelete,
            "GUILD_ROLE_CREATE" => Self::GuildRoleCreate,
            "GUILD_ROLE_UPDATE" => Self::GuildRoleUpdate,
            "GUILD_ROLE_DELETE" => Self::GuildRoleDelete,
            "GUILD_MEMBER_ADD" => Self::GuildMemberAdd,
            "GUILD_MEMBER_UPDATE" => Self::GuildMemberUpdate,
            "GUILD_MEMBER_REMOVE" => Self::GuildMemberRemove,
            "CHANNEL_CREATE" => Self::ChannelCreate,
            "CHANNEL_UPDATE" => Self::ChannelUpdate,
            "CHANNEL_DELETE" => Self::ChannelDelete,
            "CHANNEL_PINS_UPDATE" => Self::ChannelPinsUpdate,
            "TYPING_START" => Self::TypingStart,
            "MESSAGE_CREATE" => Self::MessageCreate,
            "MESSAGE_UPDATE" => Self::MessageUpdate,
            "MESSAGE_DELETE" => Self::MessageDelete,
            "MESSAGE_DELETE_BULK" => Self::MessageDeleteBulk,
            "MESSAGE_REACTION_ADD" => Self::MessageReactionAdd,
            "MESSAGE_REACTION_REMOVE" => Self::MessageReactionRemove,
            "MESSAGE_REACTION_REMOVE_ALL" => Self::MessageReactionRemoveAll,
            "MESSAGE_REACTION_REMOVE_EMOJI" => Self::MessageReactionRemoveEmoji,
            "GUILD_EMOJIS_UPDATE" => Self::GuildEmojisUpdate,
            "GUILD_SCHEDULED_EVENT_CREATE" => Self::GuildScheduledEventCreate,
            "GUILD_SCHEDULED_EVENT_UPDATE" => Self::GuildScheduledEventUpdate,
            "GUILD_SCHEDULED_EVENT_DELETE" => Self::GuildScheduledEventDelete,
            "STAGE_INSTANCE_CREATE" => Self::StageInstanceCreate,
            "STAGE_INSTANCE_UPDATE" => Self::StageInstanceUpdate,
            "STAGE_INSTANCE_DELETE" => Self::StageInstanceDelete,
            "INVITE_CREATE" => Self::InviteCreate,
            "INVITE_DELETE" => Self::InviteDelete,
            _ => return None,
        })
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Ready => "READY",
            Self::Resumed => "RESUMED",
            Self::UserUpdate => "USER_UPDATE",
            Self::GuildCreate => "GUILD_CREATE",
            Self::GuildUpdate => "GUILD_UPDATE",
            Self::GuildDelete => "GUILD_DELETE",
            Self::GuildRoleCreate => "GUILD_ROLE_CREATE",
            Self::GuildRoleUpdate => "GUILD_ROLE_UPDATE",
            Self::GuildRoleDelete => "GUILD_ROLE_DELETE",
            Self::GuildMemberAdd => "GUILD_MEMBER_ADD",
            Self::GuildMemberUpdate => "GUILD_MEMBER_UPDATE",
            Self::GuildMemberRemove => "GUILD_MEMBER_REMOVE",
            Self::ChannelCreate => "CHANNEL_CREATE",
            Self::ChannelUpdate => "CHANNEL_UPDATE",
            Self::ChannelDelete => "CHANNEL_DELETE",
            Self::ChannelPinsUpdate => "CHANNEL_PINS_UPDATE",
            Self::TypingStart => "TYPING_START",
            Self::MessageCreate => "MESSAGE_CREATE",
            Self::MessageUpdate => "MESSAGE_UPDATE",
            Self::MessageDelete => "MESSAGE_DELETE",
            Self::MessageDeleteBulk => "MESSAGE_DELETE_BULK",
            Self::MessageReactionAdd => "MESSAGE_REACTION_ADD",
            Self::MessageReactionRemove => "MESSAGE_REACTION_REMOVE",
            Self::MessageReactionRemoveAll => "MESSAGE_REACTION_REMOVE_ALL",
            Self::MessageReactionRemoveEmoji => "MESSAGE_REACTION_REMOVE_EMOJI",
            Self::GuildEmojisUpdate => "GUILD_EMOJIS_UPDATE",
            Self::GuildScheduledEventCreate => "GUILD_SCHEDULED_EVENT_CREATE",
            Self::GuildScheduledEventUpdate => "GUILD_SCHEDULED_EVENT_UPDATE",
            Self::GuildScheduledEventDelete => "GUILD_SCHEDULED_EVENT_DELETE",
            Self::StageInstanceCreate => "STAGE_INSTANCE_CREATE",
            Self::StageInstanceUpdate => "STAGE_INSTANCE_UPDATE",
            Self::StageInstanceDelete => "STAGE_INSTANCE_DELETE",
            Self::InviteCreate => "INVITE_CREATE",
            Self::InviteDelete => "INVITE_DELETE",
        }
    }
}

/// Router configuration.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Emit a raw `gateway_dispatch` event for every dispatch.
    pub debug_events: bool,
    /// Quiescence timeout of the readiness barrier.
    pub ready_timeout: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            debug_events: false,
            ready_timeout: DEFAULT_READY_TIMEOUT,
        }
    }
}

// Payload shapes that are not plain model types.

#[derive(Deserialize)]
struct ReadyPayload {
    user: User,
    #[serde(default)]
    guilds: Vec<UnavailableGuild>,
}

#[derive(Deserialize)]
struct GuildContents {
    #[serde(default)]
    roles: Vec<Role>,
    #[serde(default)]
    members: Vec<Member>,
    #[serde(default)]
    channels: Vec<Channel>,
    #[serde(default)]
    emojis: Vec<Emoji>,
    #[serde(default)]
    guild_scheduled_events: Vec<ScheduledEvent>,
    #[serde(default)]
    stage_instances: Vec<StageInstance>,
}

#[derive(Deserialize)]
struct GuildScoped {
    guild_id: Id<GuildMarker>,
}

#[derive(Deserialize)]
struct RolePayload {
    guild_id: Id<GuildMarker>,
    role: Role,
}

#[derive(Deserialize)]
struct RoleDeletePayload {
    guild_id: Id<GuildMarker>,
    role_id: Id<RoleMarker>,
}

#[derive(Deserialize)]
struct MemberRemovePayload {
    guild_id: Id<GuildMarker>,
    user: User,
}

#[derive(Deserialize)]
struct PinsPayload {
    channel_id: Id<ChannelMarker>,
    #[serde(default)]
    last_pin_timestamp: Option<String>,
}

#[derive(Deserialize)]
struct TypingPayload {
    channel_id: Id<ChannelMarker>,
    #[serde(default)]
    guild_id: Option<Id<GuildMarker>>,
    user_id: Id<UserMarker>,
    #[serde(default)]
    timestamp: u64,
    #[serde(default)]
    member: Option<Member>,
}

#[derive(Deserialize)]
struct MessageRef {
    id: Id<MessageMarker>,
}

#[derive(Deserialize)]
struct BulkDeletePayload {
    ids: Vec<Id<MessageMarker>>,
    channel_id: Id<ChannelMarker>,
}

#[derive(Deserialize)]
struct ReactionPayload {
    user_id: Id<UserMarker>,
    message_id: Id<MessageMarker>,
    #[serde(default)]
    guild_id: Option<Id<GuildMarker>>,
    #[serde(default)]
    member: Option<Member>,
    emoji: PartialEmoji,
}

#[derive(Deserialize)]
struct ReactionClearPayload {
    message_id: Id<MessageMarker>,
}

#[derive(Deserialize)]
struct ReactionEmojiPayload {
    message_id: Id<MessageMarker>,
    emoji: PartialEmoji,
}

#[derive(Deserialize)]
struct InviteDeletePayload {
    channel_id: Id<ChannelMarker>,
    #[serde(default)]
    guild_id: Option<Id<GuildMarker>>,
    code: String,
}

#[derive(Deserialize)]
struct EmojisPayload {
    guild_id: Id<GuildMarker>,
    emojis: Vec<Emoji>,
}

#[derive(Deserialize)]
struct ScheduledEventRef {
    id: Id<ScheduledEventMarker>,
    guild_id: Id<GuildMarker>,
}

#[derive(Deserialize)]
struct StageInstanceRef {
    id: Id<StageInstanceMarker>,
    guild_id: Id<GuildMarker>,
}

/// Maps dispatch events onto the cache and the event bus.
pub struct DispatchRouter {
    cache: Arc<Cache>,
    bus: Arc<EventBus>,
    barrier: Arc<ReadyBarrier>,
    /// Guilds listed in READY that have not arrived yet.
    pending_guilds: DashSet<Id<GuildMarker>>,
    config: RouterConfig,
}

impl DispatchRouter {
    #[must_use]
    pub fn new(cache: Arc<Cache>, bus: Arc<EventBus>, config: RouterConfig) -> Self {
        let barrier = Arc::new(ReadyBarrier::new(Arc::clone(&bus), config.ready_timeout));
        Self {
            cache,
            bus,
            barrier,
            pending_guilds: DashSet::new(),
            config,
        }
    }

    pub fn cache(&self) -> &Arc<Cache> {
        &self.cache
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn barrier(&self) -> &Arc<ReadyBarrier> {
        &self.barrier
    }

    /// Handle one dispatch.
    ///
    /// Never fails: malformed payloads and missing references are logged
    /// and the event is dropped.
    pub fn handle(&self, shard: u32, name: &str, data: Value) {
        if self.config.debug_events {
            self.bus.invoke(Event::GatewayDispatch {
                shard,
                name: name.to_string(),
                data: data.clone(),
            });
        }

        let Some(kind) = DispatchKind::from_name(name) else {
            trace!(shard, event = name, "No handler for dispatch");
            return;
        };

        match self.route(shard, kind, &data) {
            Ok(()) => {}
            Err(e @ DispatchError::Missing { .. }) => {
                debug!(shard, event = name, "Dropped dispatch: {}", e);
            }
            Err(e) => {
                warn!(shard, event = name, "Dropped dispatch: {}", e);
            }
        }
    }

    /// Forget per-session state.
    pub fn reset(&self) {
        self.pending_guilds.clear();
        self.barrier.reset();
    }

    fn route(&self, shard: u32, kind: DispatchKind, data: &Value) -> Result<(), DispatchError> {
        match kind {
            DispatchKind::Ready => self.on_ready(shard, data),
            DispatchKind::Resumed => {
                self.bus.invoke(Event::Resumed { shard });
                Ok(())
            }
            DispatchKind::UserUpdate => self.on_user_update(shard, data),
            DispatchKind::GuildCreate => self.on_guild_create(shard, data),
            DispatchKind::GuildUpdate => self.on_guild_update(shard, data),
            DispatchKind::GuildDelete => self.on_guild_delete(shard, data),
            DispatchKind::GuildRoleCreate => self.on_role_create(shard, data),
            DispatchKind::GuildRoleUpdate => self.on_role_update(shard, data),
            DispatchKind::GuildRoleDelete => self.on_role_delete(shard, data),
            DispatchKind::GuildMemberAdd => self.on_member_add(shard, data),
            DispatchKind::GuildMemberUpdate => self.on_member_update(shard, data),
            DispatchKind::GuildMemberRemove => self.on_member_remove(shard, data),
            DispatchKind::ChannelCreate => self.on_channel_create(shard, data),
            DispatchKind::ChannelUpdate => self.on_channel_update(shard, data),
            DispatchKind::ChannelDelete => self.on_channel_delete(shard, data),
            DispatchKind::ChannelPinsUpdate => self.on_channel_pins_update(shard, data),
            DispatchKind::TypingStart => self.on_typing_start(shard, data),
            DispatchKind::MessageCreate => self.on_message_create(shard, data),
            DispatchKind::MessageUpdate => self.on_message_update(shard, data),
            DispatchKind::MessageDelete => self.on_message_delete(shard, data),
            DispatchKind::MessageDeleteBulk => self.on_message_delete_bulk(shard, data),
            DispatchKind::MessageReactionAdd => self.on_reaction_add(shard, data),
            DispatchKind::MessageReactionRemove => self.on_reaction_remove(shard, data),
            DispatchKind::MessageReactionRemoveAll => self.on_reaction_remove_all(shard, data),
            DispatchKind::MessageReactionRemoveEmoji => self.on_reaction_remove_emoji(shard, data),
            DispatchKind::GuildEmojisUpdate => self.on_emojis_update(shard, data),
            DispatchKind::GuildScheduledEventCreate => self.on_scheduled_event_create(shard, data),
            DispatchKind::GuildScheduledEventUpdate => self.on_scheduled_event_update(shard, data),
            DispatchKind::GuildScheduledEventDelete => self.on_scheduled_event_delete(shard, data),
            DispatchKind::StageInstanceCreate => self.on_stage_instance_create(shard, data),
            DispatchKind::StageInstanceUpdate => self.on_stage_instance_update(shard, data),
            DispatchKind::StageInstanceDelete => self.on_stage_instance_delete(shard, data),
            DispatchKind::InviteCreate => self.on_invite_create(shard, data),
            DispatchKind::InviteDelete => self.on_invite_delete(shard, data),
        }
    }

    fn guild_cache(&self, id: Id<GuildMarker>) -> Result<Arc<GuildCache>, DispatchError> {
        self.cache.guild_cache(id).ok_or_else(|| missing("guild", id))
    }

    // Gateway

    fn on_ready(&self, shard: u32, data: &Value) -> Result<(), DispatchError> {
        let ready: ReadyPayload = parse(DispatchKind::Ready, data)?;
        self.cache.set_current_user(ready.user);
        for guild in ready.guilds {
            self.pending_guilds.insert(guild.id);
        }
        self.barrier.start_shard(shard);
        Ok(())
    }

    fn on_user_update(&self, shard: u32, data: &Value) -> Result<(), DispatchError> {
        let user: User = parse(DispatchKind::UserUpdate, data)?;
        let before = self.cache.set_current_user(user.clone());
        self.bus.invoke(Event::UserUpdate {
            shard,
            before,
            after: user,
        });
        Ok(())
    }

    // Guilds

    fn on_guild_create(&self, shard: u32, data: &Value) -> Result<(), DispatchError> {
        let kind = DispatchKind::GuildCreate;
        let mut guild: Guild = parse(kind, data)?;
        let contents: GuildContents = parse(kind, data)?;
        let id = guild.id;

        let was_pending = self.pending_guilds.remove(&id).is_some();
        let was_unavailable = self.cache.guild(id).is_some_and(|cached| cached.unavailable);

        // A guild coming back from an outage is sent in full again.
        guild.unavailable = false;
        self.cache.clear_guild(id);
        let nested = self.cache.add_guild(guild.clone());

        for role in contents.roles {
            nested.roles().insert(role.id, role);
        }
        for member in contents.members {
            self.cache.add_member(id, member);
        }
        for channel in contents.channels {
            self.cache.add_guild_channel(id, channel);
        }
        for emoji in contents.emojis {
            nested.emojis().insert(emoji.id, emoji);
        }
        for event in contents.guild_scheduled_events {
            nested.scheduled_events().insert(event.id, event);
        }
        for stage in contents.stage_instances {
            nested.stage_instances().insert(stage.id, stage);
        }

        self.barrier.guild_arrived(shard);

        let event = if was_pending || was_unavailable {
            Event::GuildAvailable { shard, guild }
        } else {
            Event::GuildJoin { shard, guild }
        };
        self.bus.invoke(event);
        Ok(())
    }

    fn on_guild_update(&self, shard: u32, data: &Value) -> Result<(), DispatchError> {
        let kind = DispatchKind::GuildUpdate;
        let newer: Guild = parse(kind, data)?;
        let contents: GuildContents = parse(kind, data)?;

        let (before, after) = self
            .cache
            .update_guild(newer.id, |guild| guild.apply(&newer))
            .ok_or_else(|| missing("guild", newer.id))?;

        if !contents.roles.is_empty() {
            let nested = self.guild_cache(newer.id)?;
            for role in contents.roles {
                nested.roles().insert(role.id, role);
            }
        }

        self.bus.invoke(Event::GuildUpdate {
            shard,
            before,
            after,
        });
        Ok(())
    }

    fn on_guild_delete(&self, shard: u32, data: &Value) -> Result<(), DispatchError> {
        let deleted: UnavailableGuild = parse(DispatchKind::GuildDelete, data)?;
        let id = deleted.id;

        if deleted.unavailable {
            let (_, guild) = self
                .cache
                .update_guild(id, |guild| guild.unavailable = true)
                .ok_or_else(|| missing("guild", id))?;
            self.bus.invoke(Event::GuildUnavailable { shard, guild });
        } else {
            self.pending_guilds.remove(&id);
            let guild = self
                .cache
                .delete_guild(id)
                .ok_or_else(|| missing("guild", id))?;
            self.bus.invoke(Event::GuildLeave { shard, guild });
        }
        Ok(())
    }

    // Roles

    fn on_role_create(&self, shard: u32, data: &Value) -> Result<(), DispatchError> {
        let payload: RolePayload = parse(DispatchKind::GuildRoleCreate, data)?;
        let nested = self.guild_cache(payload.guild_id)?;
        nested.roles().insert(payload.role.id, payload.role.clone());
        self.bus.invoke(Event::RoleCreate {
            shard,
            guild_id: payload.guild_id,
            role: payload.role,
        });
        Ok(())
    }

    fn on_role_update(&self, shard: u32, data: &Value) -> Result<(), DispatchError> {
        let payload: RolePayload = parse(DispatchKind::GuildRoleUpdate, data)?;
        let nested = self.guild_cache(payload.guild_id)?;
        let role_id = payload.role.id;
        let (before, after) = nested
            .roles()
            .update(role_id, |role| role.apply(&payload.role))
            .ok_or_else(|| missing("role", role_id))?;
        self.bus.invoke(Event::RoleUpdate {
            shard,
            guild_id: payload.guild_id,
            before,
            after,
        });
        Ok(())
    }

    fn on_role_delete(&self, shard: u32, data: &Value) -> Result<(), DispatchError> {
        let payload: RoleDeletePayload = parse(DispatchKind::GuildRoleDelete, data)?;
        let nested = self.guild_cache(payload.guild_id)?;
        let role = nested
            .roles()
            .remove(payload.role_id)
            .ok_or_else(|| missing("role", payload.role_id))?;
        self.bus.invoke(Event::RoleDelete {
            shard,
            guild_id: payload.guild_id,
            role,
        });
        Ok(())
    }

    // Members

    fn on_member_add(&self, shard: u32, data: &Value) -> Result<(), DispatchError> {
        let kind = DispatchKind::GuildMemberAdd;
        let GuildScoped { guild_id } = parse(kind, data)?;
        let member: Member = parse(kind, data)?;

        if !self.cache.add_member(guild_id, member.clone()) {
            return Err(missing("guild", guild_id));
        }
        self.cache.update_guild(guild_id, |guild| {
            guild.member_count = guild.member_count.map(|count| count + 1);
        });
        self.bus.invoke(Event::GuildMemberJoin {
            shard,
            guild_id,
            member,
        });
        Ok(())
    }

    fn on_member_update(&self, shard: u32, data: &Value) -> Result<(), DispatchError> {
        let kind = DispatchKind::GuildMemberUpdate;
        let GuildScoped { guild_id } = parse(kind, data)?;
        let newer: Member = parse(kind, data)?;
        let user_id = newer.id();

        let (before, after) = self
            .cache
            .update_member(guild_id, user_id, |member| member.apply(&newer))
            .ok_or_else(|| missing("member", user_id))?;
        self.bus.invoke(Event::GuildMemberUpdate {
            shard,
            guild_id,
            before,
            after,
        });
        Ok(())
    }

    fn on_member_remove(&self, shard: u32, data: &Value) -> Result<(), DispatchError> {
        let payload: MemberRemovePayload = parse(DispatchKind::GuildMemberRemove, data)?;
        let guild_id = payload.guild_id;
        let member = self
            .cache
            .remove_member(guild_id, payload.user.id)
            .ok_or_else(|| missing("member", payload.user.id))?;
        self.cache.update_guild(guild_id, |guild| {
            guild.member_count = guild.member_count.map(|count| count.saturating_sub(1));
        });
        self.bus.invoke(Event::GuildMemberRemove {
            shard,
            guild_id,
            member,
        });
        Ok(())
    }

    // Channels

    fn on_channel_create(&self, shard: u32, data: &Value) -> Result<(), DispatchError> {
        let channel: Channel = parse(DispatchKind::ChannelCreate, data)?;

        if channel.kind.is_private() {
            self.cache.add_private_channel(channel.clone());
        } else {
            let guild_id = channel
                .guild_id
                .ok_or_else(|| missing("channel guild", channel.id))?;
            if !self.cache.add_guild_channel(guild_id, channel.clone()) {
                return Err(missing("guild", guild_id));
            }
        }
        self.bus.invoke(Event::ChannelCreate { shard, channel });
        Ok(())
    }

    fn on_channel_update(&self, shard: u32, data: &Value) -> Result<(), DispatchError> {
        let newer: Channel = parse(DispatchKind::ChannelUpdate, data)?;
        let (before, after) = self
            .cache
            .update_channel(newer.id, |channel| channel.apply(&newer))
            .ok_or_else(|| missing("channel", newer.id))?;
        self.bus.invoke(Event::ChannelUpdate {
            shard,
            before,
            after,
        });
        Ok(())
    }

    fn on_channel_delete(&self, shard: u32, data: &Value) -> Result<(), DispatchError> {
        let deleted: Channel = parse(DispatchKind::ChannelDelete, data)?;
        let id = deleted.id;

        let channel = match deleted.guild_id {
            Some(guild_id) => self.cache.remove_guild_channel(guild_id, id),
            None => self.cache.delete_private_channel(id),
        }
        .ok_or_else(|| missing("channel", id))?;

        self.bus.invoke(Event::ChannelDelete { shard, channel });
        Ok(())
    }

    fn on_channel_pins_update(&self, shard: u32, data: &Value) -> Result<(), DispatchError> {
        let payload: PinsPayload = parse(DispatchKind::ChannelPinsUpdate, data)?;
        let (_, channel) = self
            .cache
            .update_channel(payload.channel_id, |channel| {
                channel
                    .last_pin_timestamp
                    .clone_from(&payload.last_pin_timestamp);
            })
            .ok_or_else(|| missing("channel", payload.channel_id))?;
        self.bus.invoke(Event::ChannelPinsUpdate {
            shard,
            channel,
            last_pin_timestamp: payload.last_pin_timestamp,
        });
        Ok(())
    }

    fn on_typing_start(&self, shard: u32, data: &Value) -> Result<(), DispatchError> {
        let payload: TypingPayload = parse(DispatchKind::TypingStart, data)?;
        let channel = self
            .cache
            .channel(payload.channel_id)
            .ok_or_else(|| missing("channel", payload.channel_id))?;

        let member = match (payload.guild_id, payload.member) {
            (Some(guild_id), Some(member)) => {
                self.cache.add_member(guild_id, member.clone());
                Some(member)
            }
            (Some(guild_id), None) => self.cache.member(guild_id, payload.user_id),
            (None, _) => None,
        };

        self.bus.invoke(Event::TypingStart {
            shard,
            channel,
            user_id: payload.user_id,
            member,
            timestamp: payload.timestamp,
        });
        Ok(())
    }

    // Messages

    fn on_message_create(&self, shard: u32, data: &Value) -> Result<(), DispatchError> {
        let message: Message = parse(DispatchKind::MessageCreate, data)?;
        let channel_id = message.channel_id;

        if message.guild_id.is_none() && self.cache.private_channel(channel_id).is_none() {
            self.cache
                .add_private_channel(Channel::direct(channel_id, message.author.clone()));
        }
        self.cache
            .update_channel(channel_id, |channel| {
                channel.last_message_id = Some(message.id);
            })
            .ok_or_else(|| missing("channel", channel_id))?;

        self.cache.add_message(message.clone());
        self.bus.invoke(Event::MessageCreate { shard, message });
        Ok(())
    }

    fn on_message_update(&self, shard: u32, data: &Value) -> Result<(), DispatchError> {
        let MessageRef { id } = parse(DispatchKind::MessageUpdate, data)?;
        let (before, after) = self
            .cache
            .update_message(id, |message| message.apply_partial(data))
            .ok_or_else(|| missing("message", id))?;
        self.bus.invoke(Event::MessageUpdate {
            shard,
            before,
            after,
        });
        Ok(())
    }

    fn on_message_delete(&self, shard: u32, data: &Value) -> Result<(), DispatchError> {
        let MessageRef { id } = parse(DispatchKind::MessageDelete, data)?;
        let message = self
            .cache
            .delete_message(id)
            .ok_or_else(|| missing("message", id))?;
        self.bus.invoke(Event::MessageDelete { shard, message });
        Ok(())
    }

    fn on_message_delete_bulk(&self, shard: u32, data: &Value) -> Result<(), DispatchError> {
        let payload: BulkDeletePayload = parse(DispatchKind::MessageDeleteBulk, data)?;
        let messages: Vec<Message> = payload
            .ids
            .iter()
            .filter_map(|id| self.cache.delete_message(*id))
            .collect();

        if messages.is_empty() {
            return Err(missing("messages in channel", payload.channel_id));
        }
        self.bus.invoke(Event::MessageBulkDelete {
            shard,
            channel_id: payload.channel_id,
            messages,
        });
        Ok(())
    }

    // Reactions

    fn reactor(&self, payload: &ReactionPayload) -> Option<Member> {
        payload.member.clone().or_else(|| {
            payload
                .guild_id
                .and_then(|guild_id| self.cache.member(guild_id, payload.user_id))
        })
    }

    fn on_reaction_add(&self, shard: u32, data: &Value) -> Result<(), DispatchError> {
        let payload: ReactionPayload = parse(DispatchKind::MessageReactionAdd, data)?;
        let id = payload.message_id;
        let me = self
            .cache
            .current_user()
            .is_some_and(|user| user.id == payload.user_id);

        let mut added = None;
        let (_, message) = self
            .cache
            .update_message(id, |message| {
                added = Some(message.add_reaction(&payload.emoji, me));
            })
            .ok_or_else(|| missing("message", id))?;
        let reaction = added.ok_or_else(|| missing("message", id))?;

        self.bus.invoke(Event::ReactionAdd {
            shard,
            message,
            reaction,
            user_id: payload.user_id,
            member: self.reactor(&payload),
        });
        Ok(())
    }

    fn on_reaction_remove(&self, shard: u32, data: &Value) -> Result<(), DispatchError> {
        let payload: ReactionPayload = parse(DispatchKind::MessageReactionRemove, data)?;
        let id = payload.message_id;
        let me = self
            .cache
            .current_user()
            .is_some_and(|user| user.id == payload.user_id);

        let mut removed = None;
        let (_, message) = self
            .cache
            .update_message(id, |message| {
                removed = message.remove_reaction(&payload.emoji, me);
            })
            .ok_or_else(|| missing("message", id))?;
        let reaction = removed.ok_or_else(|| missing("reaction on message", id))?;

        self.bus.invoke(Event::ReactionRemove {
            shard,
            message,
            reaction,
            user_id: payload.user_id,
            member: self.reactor(&payload),
        });
        Ok(())
    }

    fn on_reaction_remove_all(&self, shard: u32, data: &Value) -> Result<(), DispatchError> {
        let ReactionClearPayload { message_id } =
            parse(DispatchKind::MessageReactionRemoveAll, data)?;
        let mut reactions = Vec::new();
        let (_, message) = self
            .cache
            .update_message(message_id, |message| {
                reactions = message.clear_reactions();
            })
            .ok_or_else(|| missing("message", message_id))?;
        self.bus.invoke(Event::ReactionClear {
            shard,
            message,
            reactions,
        });
        Ok(())
    }

    fn on_reaction_remove_emoji(&self, shard: u32, data: &Value) -> Result<(), DispatchError> {
        let payload: ReactionEmojiPayload = parse(DispatchKind::MessageReactionRemoveEmoji, data)?;
        let id = payload.message_id;
        let mut cleared = None;
        let (_, message) = self
            .cache
            .update_message(id, |message| {
                cleared = message.clear_reaction(&payload.emoji);
            })
            .ok_or_else(|| missing("message", id))?;
        let reaction = cleared.ok_or_else(|| missing("reaction on message", id))?;

        self.bus.invoke(Event::ReactionClearEmoji {
            shard,
            message,
            reaction,
        });
        Ok(())
    }

    // Emojis

    fn on_emojis_update(&self, shard: u32, data: &Value) -> Result<(), DispatchError> {
        let payload: EmojisPayload = parse(DispatchKind::GuildEmojisUpdate, data)?;
        let nested = self.guild_cache(payload.guild_id)?;

        let before = nested.emojis().drain();
        for emoji in &payload.emojis {
            nested.emojis().insert(emoji.id, emoji.clone());
        }
        self.bus.invoke(Event::EmojisUpdate {
            shard,
            guild_id: payload.guild_id,
            before,
            after: payload.emojis,
        });
        Ok(())
    }

    // Scheduled events

    fn on_scheduled_event_create(&self, shard: u32, data: &Value) -> Result<(), DispatchError> {
        let event: ScheduledEvent = parse(DispatchKind::GuildScheduledEventCreate, data)?;
        let nested = self.guild_cache(event.guild_id)?;
        nested.scheduled_events().insert(event.id, event.clone());
        self.bus.invoke(Event::ScheduledEventCreate { shard, event });
        Ok(())
    }

    fn on_scheduled_event_update(&self, shard: u32, data: &Value) -> Result<(), DispatchError> {
        let newer: ScheduledEvent = parse(DispatchKind::GuildScheduledEventUpdate, data)?;
        let nested = self.guild_cache(newer.guild_id)?;
        let (before, after) = nested
            .scheduled_events()
            .update(newer.id, |event| event.apply(&newer))
            .ok_or_else(|| missing("scheduled event", newer.id))?;
        self.bus.invoke(Event::ScheduledEventUpdate {
            shard,
            before,
            after,
        });
        Ok(())
    }

    fn on_scheduled_event_delete(&self, shard: u32, data: &Value) -> Result<(), DispatchError> {
        let target: ScheduledEventRef = parse(DispatchKind::GuildScheduledEventDelete, data)?;
        let nested = self.guild_cache(target.guild_id)?;
        let event = nested
            .scheduled_events()
            .remove(target.id)
            .ok_or_else(|| missing("scheduled event", target.id))?;
        self.bus.invoke(Event::ScheduledEventDelete { shard, event });
        Ok(())
    }

    // Stage instances

    fn on_stage_instance_create(&self, shard: u32, data: &Value) -> Result<(), DispatchError> {
        let stage: StageInstance = parse(DispatchKind::StageInstanceCreate, data)?;
        let nested = self.guild_cache(stage.guild_id)?;
        nested.stage_instances().insert(stage.id, stage.clone());
        self.bus.invoke(Event::StageInstanceCreate { shard, stage });
        Ok(())
    }

    fn on_stage_instance_update(&self, shard: u32, data: &Value) -> Result<(), DispatchError> {
        let newer: StageInstance = parse(DispatchKind::StageInstanceUpdate, data)?;
        let nested = self.guild_cache(newer.guild_id)?;
        let (before, after) = nested
            .stage_instances()
            .update(newer.id, |stage| stage.apply(&newer))
            .ok_or_else(|| missing("stage instance", newer.id))?;
        self.bus.invoke(Event::StageInstanceUpdate {
            shard,
            before,
            after,
        });
        Ok(())
    }

    fn on_stage_instance_delete(&self, shard: u32, data: &Value) -> Result<(), DispatchError> {
        let target: StageInstanceRef = parse(DispatchKind::StageInstanceDelete, data)?;
        let nested = self.guild_cache(target.guild_id)?;
        let stage = nested
            .stage_instances()
            .remove(target.id)
            .ok_or_else(|| missing("stage instance", target.id))?;
        self.bus.invoke(Event::StageInstanceDelete { shard, stage });
        Ok(())
    }

    // Invites

    fn invite_target(
        &self,
        guild_id: Option<Id<GuildMarker>>,
        channel_id: Id<ChannelMarker>,
    ) -> Result<Option<(Guild, Channel)>, DispatchError> {
        // Group DM invites carry no guild.
        let Some(guild_id) = guild_id else {
            trace!(channel = channel_id.get(), "Ignoring invite outside a guild");
            return Ok(None);
        };
        let guild = self
            .cache
            .guild(guild_id)
            .ok_or_else(|| missing("guild", guild_id))?;
        let channel = self
            .cache
            .channel(channel_id)
            .ok_or_else(|| missing("channel", channel_id))?;
        Ok(Some((guild, channel)))
    }

    fn on_invite_create(&self, shard: u32, data: &Value) -> Result<(), DispatchError> {
        let invite: Invite = parse(DispatchKind::InviteCreate, data)?;
        let Some((guild, channel)) = self.invite_target(invite.guild_id, invite.channel_id)? else {
            return Ok(());
        };
        self.bus.invoke(Event::InviteCreate {
            shard,
            guild,
            channel,
            invite,
        });
        Ok(())
    }

    fn on_invite_delete(&self, shard: u32, data: &Value) -> Result<(), DispatchError> {
        let payload: InviteDeletePayload = parse(DispatchKind::InviteDelete, data)?;
        let Some((guild, channel)) = self.invite_target(payload.guild_id, payload.channel_id)?
        else {
            return Ok(());
        };
        self.bus.invoke(Event::InviteDelete {
            shard,
            guild,
            channel,
            code: payload.code,
        });
        Ok(())
    }
}

impl std::fmt::Debug for DispatchRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchRouter")
            .field("pending_guilds", &self.pending_guilds.len())
            .field("config", &self.config)
            .finish()
    }
}

fn parse<T: DeserializeOwned>(kind: DispatchKind, data: &Value) -> Result<T, DispatchError> {
    T::deserialize(data).map_err(|source| DispatchError::Payload {
        event: kind.name(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use serde_json::json;
    use tokio::sync::broadcast::{self, error::TryRecvError};
    use tokio::time::{sleep, Instant};

    fn router() -> (DispatchRouter, broadcast::Receiver<Arc<Event>>) {
        router_with(RouterConfig::default())
    }

    fn router_with(config: RouterConfig) -> (DispatchRouter, broadcast::Receiver<Arc<Event>>) {
        let bus = Arc::new(EventBus::new());
        let events = bus.subscribe();
        (
            DispatchRouter::new(Arc::new(Cache::new()), bus, config),
            events,
        )
    }

    fn user(id: u64) -> Value {
        json!({"id": id.to_string(), "username": format!("user{id}")})
    }

    fn ready(guilds: &[u64]) -> Value {
        json!({
            "v": 10,
            "user": user(1),
            "session_id": "session",
            "guilds": guilds
                .iter()
                .map(|id| json!({"id": id.to_string(), "unavailable": true}))
                .collect::<Vec<_>>(),
        })
    }

    fn guild_create(id: u64) -> Value {
        json!({
            "id": id.to_string(),
            "name": format!("guild {id}"),
            "member_count": 1,
            "roles": [{"id": id.to_string(), "name": "@everyone", "permissions": "1024"}],
            "members": [{"user": user(100 + id), "roles": []}],
            "channels": [{"id": (1000 + id).to_string(), "type": 0, "name": "general"}],
            "emojis": [],
        })
    }

    fn message(id: u64, channel: u64, guild: Option<u64>) -> Value {
        json!({
            "id": id.to_string(),
            "channel_id": channel.to_string(),
            "guild_id": guild.map(|g| g.to_string()),
            "author": user(7),
            "content": "hi",
        })
    }

    fn kinds(events: &mut broadcast::Receiver<Arc<Event>>) -> Vec<EventKind> {
        let mut kinds = Vec::new();
        while let Ok(event) = events.try_recv() {
            kinds.push(event.kind());
        }
        kinds
    }

    #[test]
    fn test_dispatch_names() {
        assert_eq!(
            DispatchKind::from_name("GUILD_CREATE"),
            Some(DispatchKind::GuildCreate)
        );
        assert_eq!(DispatchKind::from_name("SOME_FUTURE_EVENT"), None);
        let kind = DispatchKind::StageInstanceDelete;
        assert_eq!(DispatchKind::from_name(kind.name()), Some(kind));
    }

    #[tokio::test]
    async fn test_unknown_event_ignored() {
        let (router, mut events) = router();
        router.handle(0, "SOME_FUTURE_EVENT", json!({"x": 1}));
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_debug_events() {
        let (router, mut events) = router_with(RouterConfig {
            debug_events: true,
            ..RouterConfig::default()
        });
        router.handle(3, "SOME_FUTURE_EVENT", json!({}));
        let event = events.try_recv().unwrap();
        assert!(matches!(
            &*event,
            Event::GatewayDispatch { shard: 3, name, .. } if name == "SOME_FUTURE_EVENT"
        ));
    }

    #[tokio::test]
    async fn test_guild_create_available_vs_join() {
        let (router, mut events) = router();
        router.handle(0, "READY", ready(&[1]));
        router.handle(0, "GUILD_CREATE", guild_create(1));
        router.handle(0, "GUILD_CREATE", guild_create(2));

        assert_eq!(
            kinds(&mut events),
            vec![EventKind::GuildAvailable, EventKind::GuildJoin]
        );

        let cache = router.cache();
        assert_eq!(cache.current_user().unwrap().id.get(), 1);
        assert_eq!(cache.guild(Id::new(1)).unwrap().name, "guild 1");
        let nested = cache.guild_cache(Id::new(1)).unwrap();
        assert_eq!(nested.roles().len(), 1);
        assert!(cache.member(Id::new(1), Id::new(101)).is_some());
        assert!(cache.user(Id::new(101)).is_some());
        assert_eq!(cache.channel_guild(Id::new(1001)), Some(Id::new(1)));
    }

    #[tokio::test]
    async fn test_guild_outage_and_leave() {
        let (router, mut events) = router();
        router.handle(0, "GUILD_CREATE", guild_create(1));
        router.handle(0, "GUILD_DELETE", json!({"id": "1", "unavailable": true}));
        assert!(router.cache().guild(Id::new(1)).unwrap().unavailable);

        router.handle(0, "GUILD_CREATE", guild_create(1));
        assert!(!router.cache().guild(Id::new(1)).unwrap().unavailable);

        router.handle(0, "GUILD_DELETE", json!({"id": "1"}));
        assert!(router.cache().guild(Id::new(1)).is_none());
        assert!(router.cache().channel(Id::new(1001)).is_none());

        assert_eq!(
            kinds(&mut events),
            vec![
                EventKind::GuildJoin,
                EventKind::GuildUnavailable,
                EventKind::GuildAvailable,
                EventKind::GuildLeave,
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_references_dropped() {
        let (router, mut events) = router();
        router.handle(0, "GUILD_DELETE", json!({"id": "9"}));
        router.handle(0, "MESSAGE_UPDATE", json!({"id": "5", "channel_id": "6"}));
        router.handle(
            0,
            "GUILD_ROLE_CREATE",
            json!({"guild_id": "9", "role": {"id": "1", "name": "r"}}),
        );
        router.handle(0, "MESSAGE_CREATE", message(1, 555, Some(9)));
        // Malformed payloads are dropped too.
        router.handle(0, "GUILD_UPDATE", json!({"name": "no id"}));

        assert!(kinds(&mut events).is_empty());
        assert!(router.cache().message(Id::new(1)).is_none());
    }

    #[tokio::test]
    async fn test_member_lifecycle() {
        let (router, mut events) = router();
        router.handle(0, "GUILD_CREATE", guild_create(1));
        router.handle(
            0,
            "GUILD_MEMBER_ADD",
            json!({"guild_id": "1", "user": user(50), "roles": []}),
        );
        assert_eq!(
            router.cache().guild(Id::new(1)).unwrap().member_count,
            Some(2)
        );

        router.handle(
            0,
            "GUILD_MEMBER_UPDATE",
            json!({"guild_id": "1", "user": user(50), "roles": ["1"], "nick": "fifty"}),
        );
        router.handle(
            0,
            "GUILD_MEMBER_REMOVE",
            json!({"guild_id": "1", "user": user(50)}),
        );

        let events: Vec<Arc<Event>> = std::iter::from_fn(|| events.try_recv().ok()).collect();
        assert_eq!(events.len(), 4);
        match &*events[2] {
            Event::GuildMemberUpdate { before, after, .. } => {
                assert_eq!(before.nick, None);
                assert_eq!(after.nick.as_deref(), Some("fifty"));
                assert_eq!(after.id(), before.id());
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(router.cache().member(Id::new(1), Id::new(50)).is_none());
        assert_eq!(
            router.cache().guild(Id::new(1)).unwrap().member_count,
            Some(1)
        );
    }

    #[tokio::test]
    async fn test_message_lifecycle() {
        let (router, mut events) = router();
        router.handle(0, "GUILD_CREATE", guild_create(1));
        router.handle(0, "MESSAGE_CREATE", message(10, 1001, Some(1)));
        router.handle(
            0,
            "MESSAGE_UPDATE",
            json!({"id": "10", "channel_id": "1001", "content": "edited"}),
        );
        router.handle(0, "MESSAGE_CREATE", message(11, 1001, Some(1)));
        router.handle(
            0,
            "MESSAGE_DELETE_BULK",
            json!({"ids": ["10", "11", "12"], "channel_id": "1001"}),
        );

        let events: Vec<Arc<Event>> = std::iter::from_fn(|| events.try_recv().ok()).collect();
        match &*events[2] {
            Event::MessageUpdate { before, after, .. } => {
                assert_eq!(before.content, "hi");
                assert_eq!(after.content, "edited");
            }
            other => panic!("unexpected event {other:?}"),
        }
        match &*events[4] {
            Event::MessageBulkDelete { messages, .. } => assert_eq!(messages.len(), 2),
            other => panic!("unexpected event {other:?}"),
        }
        assert!(router.cache().messages().is_empty());
        assert_eq!(
            router
                .cache()
                .channel(Id::new(1001))
                .unwrap()
                .last_message_id,
            Some(Id::new(11))
        );
    }

    #[tokio::test]
    async fn test_direct_message_creates_private_channel() {
        let (router, mut events) = router();
        router.handle(0, "MESSAGE_CREATE", message(10, 77, None));

        let channel = router.cache().private_channel(Id::new(77)).unwrap();
        assert!(channel.kind.is_private());
        assert_eq!(channel.recipients[0].id.get(), 7);
        assert_eq!(kinds(&mut events), vec![EventKind::MessageCreate]);
    }

    #[tokio::test]
    async fn test_emojis_update_replaces_set() {
        let (router, mut events) = router();
        router.handle(0, "GUILD_CREATE", guild_create(1));
        router.handle(
            0,
            "GUILD_EMOJIS_UPDATE",
            json!({"guild_id": "1", "emojis": [{"id": "5", "name": "a"}, {"id": "6", "name": "b"}]}),
        );
        router.handle(
            0,
            "GUILD_EMOJIS_UPDATE",
            json!({"guild_id": "1", "emojis": [{"id": "6", "name": "b"}]}),
        );

        let nested = router.cache().guild_cache(Id::new(1)).unwrap();
        assert_eq!(nested.emojis().ids(), vec![Id::new(6)]);
        let last = std::iter::from_fn(|| events.try_recv().ok()).last().unwrap();
        match &*last {
            Event::EmojisUpdate { before, after, .. } => {
                assert_eq!(before.len(), 2);
                assert_eq!(after.len(), 1);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    fn reaction(user: u64, emoji: Value) -> Value {
        json!({
            "user_id": user.to_string(),
            "channel_id": "1001",
            "message_id": "10",
            "guild_id": "1",
            "emoji": emoji,
        })
    }

    #[tokio::test]
    async fn test_reaction_lifecycle() {
        let (router, mut events) = router();
        let thumbs = json!({"id": null, "name": "\u{1f44d}"});
        router.handle(0, "READY", ready(&[1]));
        router.handle(0, "GUILD_CREATE", guild_create(1));
        router.handle(0, "MESSAGE_CREATE", message(10, 1001, Some(1)));

        router.handle(0, "MESSAGE_REACTION_ADD", reaction(1, thumbs.clone()));
        router.handle(0, "MESSAGE_REACTION_ADD", reaction(101, thumbs.clone()));
        router.handle(0, "MESSAGE_REACTION_REMOVE", reaction(1, thumbs));
        router.handle(
            0,
            "MESSAGE_REACTION_ADD",
            reaction(101, json!({"id": "5", "name": "party"})),
        );
        router.handle(
            0,
            "MESSAGE_REACTION_REMOVE_EMOJI",
            json!({"channel_id": "1001", "message_id": "10", "emoji": {"id": "5", "name": "renamed"}}),
        );
        router.handle(
            0,
            "MESSAGE_REACTION_REMOVE_ALL",
            json!({"channel_id": "1001", "message_id": "10"}),
        );

        let events: Vec<Arc<Event>> = std::iter::from_fn(|| events.try_recv().ok()).collect();
        assert_eq!(
            events.iter().map(|event| event.kind()).collect::<Vec<_>>(),
            vec![
                EventKind::GuildAvailable,
                EventKind::MessageCreate,
                EventKind::ReactionAdd,
                EventKind::ReactionAdd,
                EventKind::ReactionRemove,
                EventKind::ReactionAdd,
                EventKind::ReactionClearEmoji,
                EventKind::ReactionClear,
            ]
        );
        match &*events[3] {
            Event::ReactionAdd {
                reaction,
                member,
                message,
                ..
            } => {
                assert_eq!(reaction.count, 2);
                assert!(reaction.me);
                assert_eq!(member.as_ref().unwrap().user.id.get(), 101);
                assert_eq!(message.reactions.len(), 1);
            }
            other => panic!("unexpected event {other:?}"),
        }
        match &*events[4] {
            Event::ReactionRemove {
                reaction, user_id, ..
            } => {
                assert_eq!(reaction.count, 1);
                assert!(!reaction.me);
                assert_eq!(user_id.get(), 1);
            }
            other => panic!("unexpected event {other:?}"),
        }
        match &*events[6] {
            Event::ReactionClearEmoji {
                reaction, message, ..
            } => {
                assert_eq!(reaction.emoji.id, Some(Id::new(5)));
                assert_eq!(message.reactions.len(), 1);
            }
            other => panic!("unexpected event {other:?}"),
        }
        match &*events[7] {
            Event::ReactionClear {
                reactions, message, ..
            } => {
                assert_eq!(reactions.len(), 1);
                assert_eq!(reactions[0].count, 1);
                assert!(message.reactions.is_empty());
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(router
            .cache()
            .message(Id::new(10))
            .unwrap()
            .reactions
            .is_empty());
    }

    #[tokio::test]
    async fn test_reactions_on_unknown_messages_dropped() {
        let (router, mut events) = router();
        let thumbs = json!({"name": "\u{1f44d}"});
        router.handle(0, "GUILD_CREATE", guild_create(1));
        router.handle(0, "MESSAGE_REACTION_ADD", reaction(1, thumbs.clone()));

        router.handle(0, "MESSAGE_CREATE", message(10, 1001, Some(1)));
        router.handle(0, "MESSAGE_REACTION_REMOVE", reaction(1, thumbs));

        assert_eq!(
            kinds(&mut events),
            vec![EventKind::GuildJoin, EventKind::MessageCreate]
        );
    }

    #[tokio::test]
    async fn test_invite_events() {
        let (router, mut events) = router();
        router.handle(0, "GUILD_CREATE", guild_create(1));
        router.handle(
            0,
            "INVITE_CREATE",
            json!({"code": "abc", "channel_id": "1001", "guild_id": "1", "max_uses": 5}),
        );
        router.handle(
            0,
            "INVITE_DELETE",
            json!({"code": "abc", "channel_id": "1001", "guild_id": "1"}),
        );
        // Unknown guild, unknown channel, group DM.
        router.handle(
            0,
            "INVITE_CREATE",
            json!({"code": "x", "channel_id": "1001", "guild_id": "9"}),
        );
        router.handle(
            0,
            "INVITE_DELETE",
            json!({"code": "x", "channel_id": "555", "guild_id": "1"}),
        );
        router.handle(0, "INVITE_CREATE", json!({"code": "x", "channel_id": "77"}));

        let events: Vec<Arc<Event>> = std::iter::from_fn(|| events.try_recv().ok()).collect();
        assert_eq!(events.len(), 3);
        match &*events[1] {
            Event::InviteCreate {
                guild,
                channel,
                invite,
                ..
            } => {
                assert_eq!(guild.id.get(), 1);
                assert_eq!(channel.id.get(), 1001);
                assert_eq!(invite.max_uses, 5);
            }
            other => panic!("unexpected event {other:?}"),
        }
        match &*events[2] {
            Event::InviteDelete { code, guild, .. } => {
                assert_eq!(code, "abc");
                assert_eq!(guild.id.get(), 1);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_shard_ready_after_guild_backfill() {
        let (router, mut events) = router();
        router.handle(0, "READY", ready(&[1, 2, 3]));

        for id in 1..=3 {
            sleep(Duration::from_millis(1500)).await;
            router.handle(0, "GUILD_CREATE", guild_create(id));
        }
        let last_guild = Instant::now();

        loop {
            let event = events.recv().await.unwrap();
            if event.kind() == EventKind::ShardReady {
                break;
            }
            assert_eq!(event.kind(), EventKind::GuildAvailable);
        }
        assert!(last_guild.elapsed() >= DEFAULT_READY_TIMEOUT);
        assert!(router.barrier().is_shard_ready(0));
        assert_eq!(router.cache().guilds().len(), 3);
    }
}
