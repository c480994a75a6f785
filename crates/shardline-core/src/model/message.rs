use super::user::User;
use crate::id::marker::{ChannelMarker, EmojiMarker, GuildMarker, MessageMarker};
use crate::id::Id;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Id<MessageMarker>,
    pub channel_id: Id<ChannelMarker>,
    #[serde(default)]
    pub guild_id: Option<Id<GuildMarker>>,
    pub author: User,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub edited_timestamp: Option<String>,
    #[serde(default)]
    pub tts: bool,
    #[serde(default)]
    pub mention_everyone: bool,
    #[serde(default)]
    pub mentions: Vec<User>,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub embeds: Vec<Value>,
    #[serde(default)]
    pub attachments: Vec<Value>,
    #[serde(rename = "type", default)]
    pub kind: u8,
    #[serde(default)]
    pub flags: u64,
    #[serde(default)]
    pub reactions: Vec<Reaction>,
}

/// Emoji as referenced by a reaction: custom emojis carry an id, unicode
/// emojis only a name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialEmoji {
    #[serde(default)]
    pub id: Option<Id<EmojiMarker>>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub animated: bool,
}

impl PartialEmoji {
    /// Whether both refer to the same emoji. Custom emojis compare by id
    /// since their names can change.
    #[must_use]
    pub fn same_as(&self, other: &PartialEmoji) -> bool {
        match (self.id, other.id) {
            (Some(a), Some(b)) => a == b,
            (None, None) => self.name == other.name,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub count: u32,
    /// The current user is one of the reactors.
    #[serde(default)]
    pub me: bool,
    pub emoji: PartialEmoji,
}

impl Message {
    /// Apply a MESSAGE_UPDATE payload.
    ///
    /// Updates are partial: only fields present in `data` change.
    pub fn apply_partial(&mut self, data: &Value) {
        fn field<T: serde::de::DeserializeOwned>(data: &Value, key: &str) -> Option<T> {
            data.get(key)
                .and_then(|v| serde_json::from_value(v.clone()).ok())
        }

        if let Some(content) = field(data, "content") {
            self.content = content;
        }
        if let Some(edited) = field::<Option<String>>(data, "edited_timestamp") {
            self.edited_timestamp = edited;
        }
        if let Some(pinned) = field(data, "pinned") {
            self.pinned = pinned;
        }
        if let Some(everyone) = field(data, "mention_everyone") {
            self.mention_everyone = everyone;
        }
        if let Some(mentions) = field(data, "mentions") {
            self.mentions = mentions;
        }
        if let Some(embeds) = field(data, "embeds") {
            self.embeds = embeds;
        }
        if let Some(attachments) = field(data, "attachments") {
            self.attachments = attachments;
        }
        if let Some(flags) = field(data, "flags") {
            self.flags = flags;
        }
    }

    fn reaction_index(&self, emoji: &PartialEmoji) -> Option<usize> {
        self.reactions.iter().position(|r| r.emoji.same_as(emoji))
    }

    /// Count one more reactor for `emoji` and return the updated reaction.
    pub fn add_reaction(&mut self, emoji: &PartialEmoji, me: bool) -> Reaction {
        match self.reaction_index(emoji) {
            Some(index) => {
                let reaction = &mut self.reactions[index];
                reaction.count = reaction.count.saturating_add(1);
                reaction.me |= me;
                reaction.clone()
            }
            None => {
                let reaction = Reaction {
                    count: 1,
                    me,
                    emoji: emoji.clone(),
                };
                self.reactions.push(reaction.clone());
                reaction
            }
        }
    }

    /// Count one reactor less for `emoji`. The reaction is dropped from the
    /// message once its count reaches zero; the returned copy keeps it.
    pub fn remove_reaction(&mut self, emoji: &PartialEmoji, me: bool) -> Option<Reaction> {
        let index = self.reaction_index(emoji)?;
        let reaction = &mut self.reactions[index];
        reaction.count = reaction.count.saturating_sub(1);
        if me {
            reaction.me = false;
        }
        let removed = reaction.clone();
        if removed.count == 0 {
            self.reactions.remove(index);
        }
        Some(removed)
    }

    /// Drop every reaction for one emoji.
    pub fn clear_reaction(&mut self, emoji: &PartialEmoji) -> Option<Reaction> {
        let index = self.reaction_index(emoji)?;
        Some(self.reactions.remove(index))
    }

    /// Drop all reactions.
    pub fn clear_reactions(&mut self) -> Vec<Reaction> {
        std::mem::take(&mut self.reactions)
    }
}
