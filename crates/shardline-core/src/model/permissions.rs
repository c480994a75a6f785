//! Permission flags and channel overwrites.

use crate::id::{marker::GenericMarker, Id};
use bitflags::bitflags;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Permissions: u64 {
        const CREATE_INSTANT_INVITE = 1 << 0;
        const KICK_MEMBERS = 1 << 1;
        const BAN_MEMBERS = 1 << 2;
        const ADMINISTRATOR = 1 << 3;
        const MANAGE_CHANNELS = 1 << 4;
        const MANAGE_GUILD = 1 << 5;
        const ADD_REACTIONS = 1 << 6;
        const VIEW_AUDIT_LOG = 1 << 7;
        const PRIORITY_SPEAKER = 1 << 8;
        const STREAM = 1 << 9;
        const VIEW_CHANNEL = 1 << 10;
        const SEND_MESSAGES = 1 << 11;
        const SEND_TTS_MESSAGES = 1 << 12;
        const MANAGE_MESSAGES = 1 << 13;
        const EMBED_LINKS = 1 << 14;
        const ATTACH_FILES = 1 << 15;
        const READ_MESSAGE_HISTORY = 1 << 16;
        const MENTION_EVERYONE = 1 << 17;
        const USE_EXTERNAL_EMOJIS = 1 << 18;
        const VIEW_GUILD_INSIGHTS = 1 << 19;
        const CONNECT = 1 << 20;
        const SPEAK = 1 << 21;
        const MUTE_MEMBERS = 1 << 22;
        const DEAFEN_MEMBERS = 1 << 23;
        const MOVE_MEMBERS = 1 << 24;
        const USE_VAD = 1 << 25;
        const CHANGE_NICKNAME = 1 << 26;
        const MANAGE_NICKNAMES = 1 << 27;
        const MANAGE_ROLES = 1 << 28;
        const MANAGE_WEBHOOKS = 1 << 29;
        const MANAGE_EMOJIS_AND_STICKERS = 1 << 30;
        const USE_APPLICATION_COMMANDS = 1 << 31;
        const REQUEST_TO_SPEAK = 1 << 32;
        const MANAGE_EVENTS = 1 << 33;
        const MANAGE_THREADS = 1 << 34;
        const CREATE_PUBLIC_THREADS = 1 << 35;
        const CREATE_PRIVATE_THREADS = 1 << 36;
        const USE_EXTERNAL_STICKERS = 1 << 37;
        const SEND_MESSAGES_IN_THREADS = 1 << 38;
        const START_EMBEDDED_ACTIVITIES = 1 << 39;
        const MODERATE_MEMBERS = 1 << 40;
    }
}

impl Default for Permissions {
    fn default() -> Self {
        Self::empty()
    }
}

// Permission sets exceed 2^53, so the API sends them as strings.
impl Serialize for Permissions {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.bits())
    }
}

impl<'de> Deserialize<'de> for Permissions {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Str(String),
            Int(u64),
        }

        let bits = match Raw::deserialize(deserializer)? {
            Raw::Str(s) => s.parse().map_err(D::Error::custom)?,
            Raw::Int(n) => n,
        };
        Ok(Self::from_bits_truncate(bits))
    }
}

/// Explicit allow/deny overrides for a set of permissions.
///
/// Each permission is allowed, denied or left unset. The allow and deny
/// sets never overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PermissionOverwrite {
    allow: Permissions,
    deny: Permissions,
}

impl PermissionOverwrite {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            allow: Permissions::empty(),
            deny: Permissions::empty(),
        }
    }

    /// Build an overwrite from allow and deny sets.
    ///
    /// A permission present in both sets is treated as allowed.
    #[must_use]
    pub fn from_permissions(allow: Permissions, deny: Permissions) -> Self {
        Self {
            allow,
            deny: deny.difference(allow),
        }
    }

    /// The `(allow, deny)` pair.
    #[must_use]
    pub const fn permissions(&self) -> (Permissions, Permissions) {
        (self.allow, self.deny)
    }

    /// `Some(true)` if allowed, `Some(false)` if denied, `None` if unset.
    ///
    /// For a multi-flag argument every flag must agree.
    #[must_use]
    pub fn get(&self, permission: Permissions) -> Option<bool> {
        if self.allow.contains(permission) {
            Some(true)
        } else if self.deny.contains(permission) {
            Some(false)
        } else {
            None
        }
    }

    pub fn set(&mut self, permission: Permissions, value: Option<bool>) {
        self.allow.remove(permission);
        self.deny.remove(permission);
        match value {
            Some(true) => self.allow.insert(permission),
            Some(false) => self.deny.insert(permission),
            None => {}
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.allow.is_empty() && self.deny.is_empty()
    }
}

/// Target of a channel overwrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum OverwriteTarget {
    Role,
    Member,
    Unknown(u8),
}

impl From<u8> for OverwriteTarget {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Role,
            1 => Self::Member,
            other => Self::Unknown(other),
        }
    }
}

impl From<OverwriteTarget> for u8 {
    fn from(value: OverwriteTarget) -> Self {
        match value {
            OverwriteTarget::Role => 0,
            OverwriteTarget::Member => 1,
            OverwriteTarget::Unknown(other) => other,
        }
    }
}

/// A channel overwrite as sent by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelOverwrite {
    /// Role or user id, depending on `kind`.
    pub id: Id<GenericMarker>,
    #[serde(rename = "type")]
    pub kind: OverwriteTarget,
    #[serde(default)]
    pub allow: Permissions,
    #[serde(default)]
    pub deny: Permissions,
}

impl ChannelOverwrite {
    #[must_use]
    pub fn overwrite(&self) -> PermissionOverwrite {
        PermissionOverwrite::from_permissions(self.allow, self.deny)
    }
}
