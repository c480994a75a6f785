//! Plain data types parsed from gateway and REST payloads.

pub mod channel;
pub mod guild;
pub mod invite;
pub mod message;
pub mod permissions;
pub mod user;

pub use channel::{Channel, ChannelType};
pub use guild::{Emoji, Guild, Member, Role, ScheduledEvent, StageInstance, UnavailableGuild};
pub use invite::Invite;
pub use message::{Message, PartialEmoji, Reaction};
pub use permissions::{ChannelOverwrite, OverwriteTarget, PermissionOverwrite, Permissions};
pub use user::{CurrentUser, User};
