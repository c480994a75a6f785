//! Gateway and REST API versioning.

use serde::{Deserialize, Serialize};

/// API version spoken by this crate.
pub const API_VERSION: ApiVersion = ApiVersion(10);

/// An API version number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ApiVersion(pub u8);

impl ApiVersion {
    /// Base URL of the REST API for this version.
    #[must_use]
    pub fn rest_base(self) -> String {
        format!("https://discord.com/api/v{}", self.0)
    }

    /// Append the connection query to a gateway URL.
    ///
    /// Requests JSON encoding with zlib-stream transport compression.
    #[must_use]
    pub fn gateway_url(self, base: &str) -> String {
        let base = base.trim_end_matches('/');
        format!("{base}/?v={}&encoding=json&compress=zlib-stream", self.0)
    }
}

impl std::fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl Default for ApiVersion {
    fn default() -> Self {
        API_VERSION
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_url() {
        assert_eq!(
            API_VERSION.gateway_url("wss://gateway.discord.gg"),
            "wss://gateway.discord.gg/?v=10&encoding=json&compress=zlib-stream"
        );
        assert_eq!(
            API_VERSION.gateway_url("wss://gateway.discord.gg/"),
            "wss://gateway.discord.gg/?v=10&encoding=json&compress=zlib-stream"
        );
    }

    #[test]
    fn test_version_display() {
        assert_eq!(API_VERSION.to_string(), "v10");
        assert_eq!(API_VERSION.rest_base(), "https://discord.com/api/v10");
    }
}
