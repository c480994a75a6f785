//! In-memory entity cache.
//!
//! Guilds and everything nested in a [`GuildCache`] are kept until the
//! guild is removed. Users and private channels are held by a
//! [`RetainedStore`]: strong while a cached member or message refers to
//! them, otherwise bounded and evicted oldest-idle-first. Messages live in a
//! bounded FIFO.
//!
//! Lookups return clones and report a miss as `None`.

mod entity;
mod guild;
mod messages;
mod retained;

pub use entity::EntityMap;
pub use guild::GuildCache;
pub use messages::MessageStore;
pub use retained::RetainedStore;

use crate::id::marker::{ChannelMarker, GuildMarker, MessageMarker, UserMarker};
use crate::id::Id;
use crate::model::{Channel, Guild, Member, Message, User};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Deserialize;
use std::sync::Arc;

/// Cache sizing.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Messages kept before the oldest is evicted. Zero disables.
    pub max_messages: usize,
    /// Unreferenced users kept before eviction.
    pub max_users: usize,
    /// Unreferenced private channels kept before eviction.
    pub max_private_channels: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_messages: 1000,
            max_users: 1000,
            max_private_channels: 256,
        }
    }
}

/// Client-wide cache.
pub struct Cache {
    config: CacheConfig,
    current_user: RwLock<Option<User>>,
    users: RetainedStore<UserMarker, User>,
    guilds: EntityMap<GuildMarker, Guild>,
    guild_caches: DashMap<Id<GuildMarker>, Arc<GuildCache>>,
    channel_guilds: DashMap<Id<ChannelMarker>, Id<GuildMarker>>,
    private_channels: RetainedStore<ChannelMarker, Channel>,
    messages: MessageStore,
}

impl Cache {
    /// An empty cache with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(CacheConfig::default())
    }

    /// An empty cache with the given message and user limits.
    #[must_use]
    pub fn with_config(config: CacheConfig) -> Self {
        Self {
            users: RetainedStore::new(config.max_users),
            private_channels: RetainedStore::new(config.max_private_channels),
            messages: MessageStore::new(config.max_messages),
            current_user: RwLock::new(None),
            guilds: EntityMap::new(),
            guild_caches: DashMap::new(),
            channel_guilds: DashMap::new(),
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    // Current user

    /// The logged-in user, once READY arrived.
    #[must_use]
    pub fn current_user(&self) -> Option<User> {
        self.current_user.read().clone()
    }

    /// Returns the previous value.
    pub fn set_current_user(&self, user: User) -> Option<User> {
        self.current_user.write().replace(user)
    }

    // Users

    /// Look up a user, whether retained or only queued.
    #[must_use]
    pub fn user(&self, id: Id<UserMarker>) -> Option<User> {
        self.users.get(id)
    }

    /// Snapshot of every cached user.
    #[must_use]
    pub fn users(&self) -> Vec<User> {
        self.users.values()
    }

    /// Cache a user nothing refers to yet. It may be evicted at any time.
    pub fn add_user(&self, user: User) {
        self.users.insert(user.id, user);
    }

    /// Apply `f` to a cached user. Returns the user before and after.
    pub fn update_user<F>(&self, id: Id<UserMarker>, f: F) -> Option<(User, User)>
    where
        F: FnOnce(&mut User),
    {
        self.users.update(id, f)
    }

    /// Forget a user regardless of who still refers to it.
    pub fn delete_user(&self, id: Id<UserMarker>) -> Option<User> {
        self.users.remove(id)
    }

    // Guilds

    /// Guild-level data only; see [`Cache::guild_cache`] for its contents.
    #[must_use]
    pub fn guild(&self, id: Id<GuildMarker>) -> Option<Guild> {
        self.guilds.get(id)
    }

    /// Snapshot of every cached guild.
    #[must_use]
    pub fn guilds(&self) -> Vec<Guild> {
        self.guilds.values()
    }

    /// Roles, members, channels and the rest of a guild's nested stores.
    #[must_use]
    pub fn guild_cache(&self, id: Id<GuildMarker>) -> Option<Arc<GuildCache>> {
        self.guild_caches.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    /// Insert or replace guild-level data, returning the guild's nested
    /// cache. An existing nested cache is kept.
    pub fn add_guild(&self, guild: Guild) -> Arc<GuildCache> {
        let id = guild.id;
        self.guilds.insert(id, guild);
        Arc::clone(self.guild_caches.entry(id).or_default().value())
    }

    /// Apply `f` to a cached guild. Returns it before and after.
    pub fn update_guild<F>(&self, id: Id<GuildMarker>, f: F) -> Option<(Guild, Guild)>
    where
        F: FnOnce(&mut Guild),
    {
        self.guilds.update(id, f)
    }

    /// Remove a guild with its nested cache and release its members' users.
    pub fn delete_guild(&self, id: Id<GuildMarker>) -> Option<Guild> {
        if let Some((_, nested)) = self.guild_caches.remove(&id) {
            for channel in nested.channels().ids() {
                self.channel_guilds.remove(&channel);
            }
            for member in nested.clear() {
                self.users.release(member.id());
            }
        }
        self.guilds.remove(id)
    }

    /// Drop everything nested in a guild but keep the guild itself.
    pub fn clear_guild(&self, id: Id<GuildMarker>) {
        if let Some(nested) = self.guild_cache(id) {
            for channel in nested.channels().ids() {
                self.channel_guilds.remove(&channel);
            }
            for member in nested.clear() {
                self.users.release(member.id());
            }
        }
    }

    // Members

    /// Look up a guild member.
    #[must_use]
    pub fn member(&self, guild_id: Id<GuildMarker>, user_id: Id<UserMarker>) -> Option<Member> {
        self.guild_cache(guild_id)?.members().get(user_id)
    }

    /// Cache a member and retain its user. Returns `false` if the guild is
    /// not cached.
    pub fn add_member(&self, guild_id: Id<GuildMarker>, member: Member) -> bool {
        let Some(nested) = self.guild_cache(guild_id) else {
            return false;
        };
        let user = member.user.clone();
        if nested.members().insert(user.id, member).is_some() {
            self.users.insert(user.id, user);
        } else {
            self.users.insert_retained(user.id, user);
        }
        true
    }

    /// Apply `f` to a cached member and refresh its user.
    pub fn update_member<F>(
        &self,
        guild_id: Id<GuildMarker>,
        user_id: Id<UserMarker>,
        f: F,
    ) -> Option<(Member, Member)>
    where
        F: FnOnce(&mut Member),
    {
        let (before, after) = self.guild_cache(guild_id)?.members().update(user_id, f)?;
        self.users.insert(user_id, after.user.clone());
        Some((before, after))
    }

    /// Drop a member and release its user.
    pub fn remove_member(
        &self,
        guild_id: Id<GuildMarker>,
        user_id: Id<UserMarker>,
    ) -> Option<Member> {
        let member = self.guild_cache(guild_id)?.members().remove(user_id)?;
        self.users.release(user_id);
        Some(member)
    }

    // Channels

    /// Look up a guild or private channel.
    #[must_use]
    pub fn channel(&self, id: Id<ChannelMarker>) -> Option<Channel> {
        if let Some(channel) = self.private_channels.get(id) {
            return Some(channel);
        }
        let guild_id = self.channel_guild(id)?;
        self.guild_cache(guild_id)?.channels().get(id)
    }

    /// The guild owning a cached guild channel.
    #[must_use]
    pub fn channel_guild(&self, id: Id<ChannelMarker>) -> Option<Id<GuildMarker>> {
        self.channel_guilds.get(&id).map(|entry| *entry.value())
    }

    /// Cache a channel under its guild and index it for [`Cache::channel`].
    ///
    /// Returns `false` if the guild is not cached.
    pub fn add_guild_channel(&self, guild_id: Id<GuildMarker>, mut channel: Channel) -> bool {
        let Some(nested) = self.guild_cache(guild_id) else {
            return false;
        };
        channel.guild_id = Some(guild_id);
        self.channel_guilds.insert(channel.id, guild_id);
        nested.channels().insert(channel.id, channel);
        true
    }

    /// Apply `f` to a guild or private channel.
    pub fn update_channel<F>(&self, id: Id<ChannelMarker>, f: F) -> Option<(Channel, Channel)>
    where
        F: FnOnce(&mut Channel),
    {
        if self.private_channels.contains(id) {
            return self.private_channels.update(id, f);
        }
        let guild_id = self.channel_guild(id)?;
        self.guild_cache(guild_id)?.channels().update(id, f)
    }

    /// Drop a guild channel and its index entry.
    pub fn remove_guild_channel(
        &self,
        guild_id: Id<GuildMarker>,
        id: Id<ChannelMarker>,
    ) -> Option<Channel> {
        self.channel_guilds.remove(&id);
        self.guild_cache(guild_id)?.channels().remove(id)
    }

    /// Look up a DM or group channel.
    #[must_use]
    pub fn private_channel(&self, id: Id<ChannelMarker>) -> Option<Channel> {
        self.private_channels.get(id)
    }

    #[must_use]
    pub fn private_channels(&self) -> Vec<Channel> {
        self.private_channels.values()
    }

    /// Cache a private channel. Cached messages in it retain it.
    pub fn add_private_channel(&self, channel: Channel) {
        let id = channel.id;
        let is_new = !self.private_channels.contains(id);
        for recipient in &channel.recipients {
            self.users.insert(recipient.id, recipient.clone());
        }
        self.private_channels.insert(id, channel);
        if is_new {
            for message in self.messages.values() {
                if message.channel_id == id {
                    self.private_channels.retain(id);
                }
            }
        }
    }

    /// Forget a private channel even if messages still refer to it.
    pub fn delete_private_channel(&self, id: Id<ChannelMarker>) -> Option<Channel> {
        self.private_channels.remove(id)
    }

    // Messages

    /// Look up a cached message.
    #[must_use]
    pub fn message(&self, id: Id<MessageMarker>) -> Option<Message> {
        self.messages.get(id)
    }

    /// Messages from oldest to newest.
    #[must_use]
    pub fn messages(&self) -> Vec<Message> {
        self.messages.values()
    }

    /// Cache a message, retaining its author and private channel. The oldest
    /// message is evicted when the store is full.
    pub fn add_message(&self, message: Message) {
        if self.config.max_messages == 0 {
            return;
        }
        if self.messages.get(message.id).is_some() {
            self.messages.insert(message);
            return;
        }

        self.users
            .insert_retained(message.author.id, message.author.clone());
        self.private_channels.retain(message.channel_id);
        for evicted in self.messages.insert(message) {
            self.release_message(&evicted);
        }
    }

    /// Apply `f` to a cached message. Returns it before and after.
    pub fn update_message<F>(&self, id: Id<MessageMarker>, f: F) -> Option<(Message, Message)>
    where
        F: FnOnce(&mut Message),
    {
        self.messages.update(id, f)
    }

    /// Drop a message and release its author and channel.
    pub fn delete_message(&self, id: Id<MessageMarker>) -> Option<Message> {
        let message = self.messages.remove(id)?;
        self.release_message(&message);
        Some(message)
    }

    fn release_message(&self, message: &Message) {
        self.users.release(message.author.id);
        self.private_channels.release(message.channel_id);
    }

    /// Drop all cached state.
    pub fn clear(&self) {
        self.current_user.write().take();
        self.messages.drain();
        self.guild_caches.clear();
        self.channel_guilds.clear();
        self.guilds.clear();
        self.users.clear();
        self.private_channels.clear();
    }
}

impl Default for Cache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("guilds", &self.guilds.len())
            .field("users", &self.users.len())
            .field("private_channels", &self.private_channels.len())
            .field("messages", &self.messages.len())
            .finish()
    }
}
