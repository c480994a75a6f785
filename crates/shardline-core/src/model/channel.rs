use super::permissions::ChannelOverwrite;
use super::user::User;
use crate::id::marker::{ChannelMarker, GuildMarker, MessageMarker};
use crate::id::Id;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum ChannelType {
    GuildText,
    Dm,
    GuildVoice,
    GroupDm,
    GuildCategory,
    GuildAnnouncement,
    GuildStageVoice,
    GuildForum,
    Unknown(u8),
}

impl ChannelType {
    /// Direct and group DMs, which live outside any guild.
    #[must_use]
    pub const fn is_private(self) -> bool {
        matches!(self, Self::Dm | Self::GroupDm)
    }
}

impl From<u8> for ChannelType {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::GuildText,
            1 => Self::Dm,
            2 => Self::GuildVoice,
            3 => Self::GroupDm,
            4 => Self::GuildCategory,
            5 => Self::GuildAnnouncement,
            13 => Self::GuildStageVoice,
            15 => Self::GuildForum,
            other => Self::Unknown(other),
        }
    }
}

impl From<ChannelType> for u8 {
    fn from(value: ChannelType) -> Self {
        match value {
            ChannelType::GuildText => 0,
            ChannelType::Dm => 1,
            ChannelType::GuildVoice => 2,
            ChannelType::GroupDm => 3,
            ChannelType::GuildCategory => 4,
            ChannelType::GuildAnnouncement => 5,
            ChannelType::GuildStageVoice => 13,
            ChannelType::GuildForum => 15,
            ChannelType::Unknown(other) => other,
        }
    }
}

/// A guild channel or a private channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: Id<ChannelMarker>,
    #[serde(rename = "type")]
    pub kind: ChannelType,
    #[serde(default)]
    pub guild_id: Option<Id<GuildMarker>>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub position: Option<i64>,
    #[serde(default)]
    pub parent_id: Option<Id<ChannelMarker>>,
    #[serde(default)]
    pub nsfw: bool,
    #[serde(default)]
    pub rate_limit_per_user: Option<u32>,
    #[serde(default)]
    pub bitrate: Option<u32>,
    #[serde(default)]
    pub user_limit: Option<u32>,
    #[serde(default)]
    pub last_message_id: Option<Id<MessageMarker>>,
    #[serde(default)]
    pub last_pin_timestamp: Option<String>,
    #[serde(default)]
    pub permission_overwrites: Vec<ChannelOverwrite>,
    #[serde(default)]
    pub recipients: Vec<User>,
}

impl Channel {
    /// A direct message channel known only from a message sent in it.
    #[must_use]
    pub fn direct(id: Id<ChannelMarker>, recipient: User) -> Self {
        Self {
            id,
            kind: ChannelType::Dm,
            guild_id: None,
            name: None,
            topic: None,
            position: None,
            parent_id: None,
            nsfw: false,
            rate_limit_per_user: None,
            bitrate: None,
            user_limit: None,
            last_message_id: None,
            last_pin_timestamp: None,
            permission_overwrites: Vec::new(),
            recipients: vec![recipient],
        }
    }

    /// Copy every field but the id and owning guild from a newer snapshot.
    pub fn apply(&mut self, newer: &Channel) {
        self.kind = newer.kind;
        self.name.clone_from(&newer.name);
        self.topic.clone_from(&newer.topic);
        self.position = newer.position;
        self.parent_id = newer.parent_id;
        self.nsfw = newer.nsfw;
        self.rate_limit_per_user = newer.rate_limit_per_user;
        self.bitrate = newer.bitrate;
        self.user_limit = newer.user_limit;
        self.last_message_id = newer.last_message_id;
        self.last_pin_timestamp.clone_from(&newer.last_pin_timestamp);
        self.permission_overwrites
            .clone_from(&newer.permission_overwrites);
        if !newer.recipients.is_empty() {
            self.recipients.clone_from(&newer.recipients);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_type_round_trip() {
        for raw in [0u8, 1, 2, 3, 4, 5, 13, 15, 99] {
            assert_eq!(u8::from(ChannelType::from(raw)), raw);
        }
        assert!(ChannelType::Dm.is_private());
        assert!(!ChannelType::GuildText.is_private());
    }

    #[test]
    fn test_parse_dm_channel() {
        let channel: Channel = serde_json::from_str(
            r#"{"id":"319674150115610528","type":1,"last_message_id":"3343820033257021450",
                "recipients":[{"id":"82198898841029460","username":"test","discriminator":"9999"}]}"#,
        )
        .unwrap();
        assert!(channel.kind.is_private());
        assert_eq!(channel.recipients.len(), 1);
        assert!(channel.guild_id.is_none());
    }
}
