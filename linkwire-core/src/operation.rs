//! Operation names multiplexed over the realtime connection
//!
//! Every envelope carries an `op` field naming the remote procedure. The
//! known names are enumerated here so callers get typo-checking; anything
//! else round-trips through `Operation::Other` so a newer server never
//! breaks an older client.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! operations {
    ($($variant:ident),+ $(,)?) => {
        /// A named remote procedure
        ///
        /// Serialized as its bare name (`"Login"`, `"GetPosts"`, ...).
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(from = "String", into = "String")]
        pub enum Operation {
            $(
                #[allow(missing_docs)]
                $variant,
            )+
            /// An operation name this build does not know about
            Other(String),
        }

        impl Operation {
            /// Every known operation, in declaration order
            pub const KNOWN: &'static [Operation] = &[$(Operation::$variant),+];

            /// The wire name of this operation
            pub fn as_str(&self) -> &str {
                match self {
                    $(Operation::$variant => stringify!($variant),)+
                    Operation::Other(name) => name.as_str(),
                }
            }

            fn from_name(name: &str) -> Option<Self> {
                match name {
                    $(stringify!($variant) => Some(Operation::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

operations! {
    // user
    Login,
    Register,
    GetCaptcha,
    GetPersonDetails,
    GetReplies,
    GetPersonMentions,
    MarkAllAsRead,
    SaveUserSettings,
    DeleteAccount,
    PasswordReset,
    GetPrivateMessages,
    CreatePrivateMessage,
    // site
    GetSite,
    Search,
    // community
    GetCommunity,
    ListCommunities,
    CreateCommunity,
    FollowCommunity,
    GetFollowedCommunities,
    // post
    GetPosts,
    GetPost,
    CreatePost,
    EditPost,
    DeletePost,
    CreatePostLike,
    SavePost,
    CreatePostReport,
    // comment
    GetComments,
    CreateComment,
    EditComment,
    DeleteComment,
    CreateCommentLike,
    SaveComment,
    CreateCommentReport,
    // websocket joins
    UserJoin,
    PostJoin,
    CommunityJoin,
    ModJoin,
}

impl Operation {
    /// True if this name is not one of the enumerated operations
    pub fn is_other(&self) -> bool {
        matches!(self, Operation::Other(_))
    }
}

impl From<String> for Operation {
    fn from(name: String) -> Self {
        Operation::from_name(&name).unwrap_or(Operation::Other(name))
    }
}

impl From<&str> for Operation {
    fn from(name: &str) -> Self {
        Operation::from_name(name).unwrap_or_else(|| Operation::Other(name.to_string()))
    }
}

impl From<Operation> for String {
    fn from(op: Operation) -> Self {
        match op {
            Operation::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

impl FromStr for Operation {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Operation::from(s))
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_names_resolve_to_variants() {
        for op in Operation::KNOWN {
            assert_eq!(&Operation::from(op.as_str()), op);
            assert!(!op.is_other());
        }
    }

    #[test]
    fn test_unknown_name_is_preserved() {
        let op = Operation::from("GetUnreadRegistrationApplicationCount");
        assert!(op.is_other());
        assert_eq!(op.as_str(), "GetUnreadRegistrationApplicationCount");
    }

    #[test]
    fn test_serializes_as_bare_name() {
        assert_eq!(serde_json::to_string(&Operation::GetPosts).unwrap(), "\"GetPosts\"");
        assert_eq!(
            serde_json::to_string(&Operation::Other("Custom".into())).unwrap(),
            "\"Custom\""
        );
    }

    #[test]
    fn test_deserializes_from_name() {
        let op: Operation = serde_json::from_str("\"CreateComment\"").unwrap();
        assert_eq!(op, Operation::CreateComment);

        let other: Operation = serde_json::from_str("\"BlockPerson\"").unwrap();
        assert_eq!(other, Operation::Other("BlockPerson".into()));
    }

    #[test]
    fn test_display_matches_wire_name() {
        assert_eq!(Operation::Login.to_string(), "Login");
        assert_eq!("UserJoin".parse::<Operation>().unwrap(), Operation::UserJoin);
    }
}
