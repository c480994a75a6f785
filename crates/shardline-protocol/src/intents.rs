//! Gateway intents.
//!
//! Intents select which groups of events the gateway sends to a shard.
//! `MEMBERS`, `PRESENCES` and `MESSAGE_CONTENT` are privileged: they must
//! be enabled for the application, otherwise the gateway closes the
//! socket with [`CloseCode::DisallowedIntents`](crate::CloseCode::DisallowedIntents).

use bitflags::bitflags;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Intents: u64 {
        const GUILDS = 1 << 0;
        const MEMBERS = 1 << 1;
        const BANS = 1 << 2;
        const EMOJIS_AND_STICKERS = 1 << 3;
        const INTEGRATIONS = 1 << 4;
        const WEBHOOKS = 1 << 5;
        const INVITES = 1 << 6;
        const VOICE_STATES = 1 << 7;
        const PRESENCES = 1 << 8;
        const GUILD_MESSAGES = 1 << 9;
        const GUILD_MESSAGE_REACTIONS = 1 << 10;
        const GUILD_MESSAGE_TYPING = 1 << 11;
        const DIRECT_MESSAGES = 1 << 12;
        const DIRECT_MESSAGE_REACTIONS = 1 << 13;
        const DIRECT_MESSAGE_TYPING = 1 << 14;
        const MESSAGE_CONTENT = 1 << 15;
        const SCHEDULED_EVENTS = 1 << 16;
    }
}

impl Intents {
    /// Intents that must be enabled for the application.
    #[must_use]
    pub const fn privileged() -> Self {
        Self::MEMBERS
            .union(Self::PRESENCES)
            .union(Self::MESSAGE_CONTENT)
    }

    /// Every intent except the privileged ones.
    #[must_use]
    pub const fn unprivileged() -> Self {
        Self::all().difference(Self::privileged())
    }

    /// Whether any privileged intent is requested.
    #[must_use]
    pub const fn has_privileged(self) -> bool {
        self.intersects(Self::privileged())
    }
}

impl Default for Intents {
    fn default() -> Self {
        Self::unprivileged()
    }
}

impl Serialize for Intents {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(self.bits())
    }
}

impl<'de> Deserialize<'de> for Intents {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Self::from_bits_truncate)
    }
}
