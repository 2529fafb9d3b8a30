//! NewType wrappers for strong typing throughout the service.
//!
//! These types prevent accidental mixing of semantically different strings
//! (e.g., passing a post id where a user id is expected).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Macro to generate a NewType wrapper with standard trait implementations.
macro_rules! newtype_string {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new instance.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Get the inner value as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume and return the inner String.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

newtype_string!(
    /// Surrogate key of a `user` record.
    ///
    /// This is the bare key (a UUID string), not the `user:⟨...⟩` record id.
    /// It is what travels in the `sub` claim and in cache keys.
    UserId
);

newtype_string!(
    /// Surrogate key of a `post` record.
    PostId
);

newtype_string!(
    /// Surrogate key of a `comment` record.
    CommentId
);

newtype_string!(
    /// Lowercase SHA-256 hex digest of a one-time invitation token.
    ///
    /// Only this digest is ever persisted; the plaintext token leaves the
    /// process exactly once, inside the confirmation message.
    TokenHash
);

impl UserId {
    /// Generate a fresh random identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl PostId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl CommentId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl TokenHash {
    /// Hash a plaintext token into its stored form.
    pub fn of(plaintext: &str) -> Self {
        use sha2::{Digest, Sha256};
        let digest = Sha256::digest(plaintext.as_bytes());
        Self(format!("{:x}", digest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_user_id_roundtrip() {
        let id = UserId::new("5d2c6f1e-0000-4000-8000-000000000001");
        assert_eq!(id.as_str(), "5d2c6f1e-0000-4000-8000-000000000001");
        assert_eq!(id.to_string(), "5d2c6f1e-0000-4000-8000-000000000001");
        assert_eq!(id.clone().into_inner(), "5d2c6f1e-0000-4000-8000-000000000001");
    }

    #[test]
    fn test_generated_ids_are_distinct() {
        let ids: HashSet<UserId> = (0..32).map(|_| UserId::generate()).collect();
        assert_eq!(ids.len(), 32);
    }

    #[test]
    fn test_serde_transparent() {
        let id = PostId::new("abc");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"abc\"");

        let parsed: PostId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_token_hash_is_sha256_hex() {
        let hash = TokenHash::of("abc");
        assert_eq!(
            hash.as_str(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(hash.as_str().len(), 64);
    }

    #[test]
    fn test_token_hash_differs_per_token() {
        assert_ne!(TokenHash::of("first"), TokenHash::of("second"));
        assert_eq!(TokenHash::of("same"), TokenHash::of("same"));
    }
}
