use crate::id::{marker::UserMarker, Id};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Id<UserMarker>,
    pub username: String,
    #[serde(default)]
    pub discriminator: Option<String>,
    #[serde(default)]
    pub global_name: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub bot: bool,
    #[serde(default)]
    pub system: bool,
    #[serde(default)]
    pub public_flags: Option<u64>,
}

impl User {
    /// `username#discriminator`, or the bare username for migrated accounts.
    #[must_use]
    pub fn tag(&self) -> String {
        match self.discriminator.as_deref() {
            Some(d) if d != "0" => format!("{}#{}", self.username, d),
            _ => self.username.clone(),
        }
    }

    /// Copy every field but the id from a newer snapshot.
    pub fn apply(&mut self, newer: &User) {
        self.username.clone_from(&newer.username);
        self.discriminator.clone_from(&newer.discriminator);
        self.global_name.clone_from(&newer.global_name);
        self.avatar.clone_from(&newer.avatar);
        self.bot = newer.bot;
        self.system = newer.system;
        self.public_flags = newer.public_flags;
    }
}

/// The user the client is logged in as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    #[serde(flatten)]
    pub user: User,
    #[serde(default)]
    pub verified: Option<bool>,
    #[serde(default)]
    pub mfa_enabled: bool,
    #[serde(default)]
    pub locale: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_tag() {
        let mut user: User =
            serde_json::from_str(r#"{"id":"1","username":"nelly","discriminator":"1337"}"#)
                .unwrap();
        assert_eq!(user.tag(), "nelly#1337");
        user.discriminator = Some("0".into());
        assert_eq!(user.tag(), "nelly");
    }

    #[test]
    fn test_apply_keeps_id() {
        let mut user: User = serde_json::from_str(r#"{"id":"1","username":"old"}"#).unwrap();
        let newer: User = serde_json::from_str(r#"{"id":"2","username":"new"}"#).unwrap();
        user.apply(&newer);
        assert_eq!(user.id.get(), 1);
        assert_eq!(user.username, "new");
    }

    #[test]
    fn test_current_user_flatten() {
        let me: CurrentUser = serde_json::from_str(
            r#"{"id":"9","username":"bot","bot":true,"verified":true,"mfa_enabled":false}"#,
        )
        .unwrap();
        assert!(me.user.bot);
        assert_eq!(me.verified, Some(true));
    }
}
