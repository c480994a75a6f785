//! Typed snowflake ids.
//!
//! Every entity kind gets its own marker so a guild id can never be used to
//! look up a user. On the wire ids are decimal strings; numbers are accepted
//! too.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Markers for [`Id`].
pub mod marker {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct UserMarker;
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct GuildMarker;
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ChannelMarker;
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MessageMarker;
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RoleMarker;
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EmojiMarker;
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ScheduledEventMarker;
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StageInstanceMarker;
    /// Ids whose kind depends on context, such as overwrite targets.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct GenericMarker;
}

/// A snowflake id for entities of kind `M`.
pub struct Id<M> {
    value: u64,
    phantom: PhantomData<fn(M) -> M>,
}

impl<M> Id<M> {
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self {
            value,
            phantom: PhantomData,
        }
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.value
    }

    /// Reinterpret the id for another entity kind.
    ///
    /// The `@everyone` role shares its id with the guild, for example.
    #[must_use]
    pub const fn cast<N>(self) -> Id<N> {
        Id::new(self.value)
    }
}

impl<M> Clone for Id<M> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M> Copy for Id<M> {}

impl<M> PartialEq for Id<M> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<M> Eq for Id<M> {}

impl<M> Hash for Id<M> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl<M> PartialOrd for Id<M> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<M> Ord for Id<M> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.value.cmp(&other.value)
    }
}

impl<M> fmt::Debug for Id<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({})", self.value)
    }
}

impl<M> fmt::Display for Id<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.value, f)
    }
}

impl<M> From<u64> for Id<M> {
    fn from(value: u64) -> Self {
        Self::new(value)
    }
}

impl<M> Serialize for Id<M> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.value)
    }
}

struct IdVisitor<M>(PhantomData<fn(M) -> M>);

impl<'de, M> Visitor<'de> for IdVisitor<M> {
    type Value = Id<M>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a snowflake as a string or integer")
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<Self::Value, E> {
        Ok(Id::new(value))
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<Self::Value, E> {
        u64::try_from(value)
            .map(Id::new)
            .map_err(|_| E::invalid_value(de::Unexpected::Signed(value), &self))
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
        value
            .parse()
            .map(Id::new)
            .map_err(|_| E::invalid_value(de::Unexpected::Str(value), &self))
    }
}

impl<'de, M> Deserialize<'de> for Id<M> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(IdVisitor(PhantomData))
    }
}

#[cfg(test)]
mod tests {
    use super::marker::{GuildMarker, RoleMarker};
    use super::*;

    #[test]
    fn test_id_from_string_and_number() {
        let from_str: Id<GuildMarker> = serde_json::from_str(r#""81384788765712384""#).unwrap();
        let from_num: Id<GuildMarker> = serde_json::from_str("81384788765712384").unwrap();
        assert_eq!(from_str, from_num);
        assert_eq!(from_str.get(), 81_384_788_765_712_384);
    }

    #[test]
    fn test_id_serializes_as_string() {
        let id: Id<GuildMarker> = Id::new(42);
        assert_eq!(serde_json::to_string(&id).unwrap(), r#""42""#);
    }

    #[test]
    fn test_id_rejects_garbage() {
        assert!(serde_json::from_str::<Id<GuildMarker>>(r#""abc""#).is_err());
        assert!(serde_json::from_str::<Id<GuildMarker>>("-1").is_err());
    }

    #[test]
    fn test_cast() {
        let guild: Id<GuildMarker> = Id::new(7);
        let everyone: Id<RoleMarker> = guild.cast();
        assert_eq!(everyone.get(), 7);
    }
}
