pub mod messages;
pub use messages::*;

pub mod model;
pub use model::*;

pub mod codec;

pub mod error;

use serde::{Deserialize, Serialize};

use std::fmt::Debug;
use std::fmt::Display;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Serialize, Deserialize, Hash, PartialEq, Eq, PartialOrd, Ord, Clone, Debug)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Identifier of an authenticated user; also the session id used by the
    /// REST endpoints and for self-message detection.
    UserId
);
string_id!(
    /// Identifier of one entry inside a collection. Assigned by the server.
    ItemId
);
string_id!(
    /// Identifier of the catalogue product an item refers to.
    ProductId
);
string_id!(
    /// A chat/conversation, the unit of unread-count tracking.
    ChannelId
);

impl ItemId {
    /// Prefix of ids handed out locally before the server has assigned one.
    pub const PROVISIONAL_PREFIX: &'static str = "local:";

    /// Id used for an optimistically added item until the next server
    /// snapshot replaces it.
    pub fn provisional(product: &ProductId) -> Self {
        Self(format!("{}{}", Self::PROVISIONAL_PREFIX, product.0))
    }

    pub fn is_provisional(&self) -> bool {
        self.0.starts_with(Self::PROVISIONAL_PREFIX)
    }
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(transparent)]
/// Opaque bearer credential supplied by the login collaborator.
pub struct AuthToken(String);

impl AuthToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Value for an `Authorization` header.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl Debug for AuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AuthToken(<redacted>)")
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
/// Identity of the logged-in user.
///
/// Owned by the login collaborator; the sync core only reads it. A session is
/// handed to the dispatcher and realtime channel at construction so several
/// simulated sessions can coexist.
pub struct Session {
    pub user_id: UserId,
    pub token: AuthToken,
    pub display_name: String,
}

impl Session {
    pub fn new(user_id: impl Into<UserId>, token: AuthToken, display_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            token,
            display_name: display_name.into(),
        }
    }

    /// True when `sender` is the user this session belongs to.
    pub fn is_self(&self, sender: &UserId) -> bool {
        &self.user_id == sender
    }
}

impl Display for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("Session for {} ({})", self.display_name, self.user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_debug_is_redacted() {
        let token = AuthToken::new("secret-value");
        assert_eq!(format!("{:?}", token), "AuthToken(<redacted>)");
        assert_eq!(token.bearer(), "Bearer secret-value");
    }

    #[test]
    fn provisional_item_ids() {
        let id = ItemId::provisional(&ProductId::new("p1"));
        assert!(id.is_provisional());
        assert_eq!(id.as_str(), "local:p1");
        assert!(!ItemId::new("srv-1").is_provisional());
    }

    #[test]
    fn ids_serialize_as_plain_strings() {
        let json = serde_json::to_string(&ChannelId::new("c1")).unwrap();
        assert_eq!(json, "\"c1\"");
    }
}
