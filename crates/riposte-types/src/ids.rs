//! Type-safe identifier wrappers for the response engine.
//!
//! Every entity handled by the engine has a strongly-typed ID to prevent
//! accidental mixing of identifiers at compile time. Numeric handles are
//! monotonic `u64` values assigned by their owning subsystem (the dispatcher
//! for signals and instances, listener stores for listener tokens); actor
//! handles are assigned by the embedding game. Line identifiers are the
//! authored names of dialogue line sets.

use serde::{Deserialize, Serialize};

/// Generates a newtype wrapper around `u64` with standard derives.
macro_rules! define_handle {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(pub u64);

        impl $name {
            /// Wrap a raw handle value.
            pub const fn new(raw: u64) -> Self {
                Self(raw)
            }

            /// Return the inner raw value.
            pub const fn into_inner(self) -> u64 {
                self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                Self(raw)
            }
        }

        impl From<$name> for u64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_handle! {
    /// Handle to a game actor owned by the embedding engine.
    ///
    /// The response engine never creates or destroys actors; it only refers
    /// to them as senders of signals and speakers of dialogue lines.
    ActorId
}

define_handle! {
    /// Unique monotonic identifier of a raised signal.
    ///
    /// Assigned by the dispatcher when the signal is raised and valid for
    /// the lifetime of the signal's processing, so listeners can follow a
    /// specific signal from raise to completion.
    SignalId
}

define_handle! {
    /// Unique monotonic identifier of a running response instance.
    InstanceId
}

define_handle! {
    /// Registration token for a listener, used to remove it again.
    ListenerId
}

/// Identifier of a dialogue line set, as authored in the line database.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LineId(pub String);

impl LineId {
    /// Create a line identifier from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Return the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for LineId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for LineId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for LineId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_are_distinct_types() {
        let actor = ActorId::new(7);
        let signal = SignalId::new(7);
        // Different types -- the compiler enforces no mixing; the raw
        // values may still coincide.
        assert_eq!(actor.into_inner(), signal.into_inner());
    }

    #[test]
    fn handle_display_matches_raw() {
        let id = InstanceId::new(42);
        assert_eq!(id.to_string(), "42");
    }

    #[test]
    fn handle_roundtrip_serde() {
        let original = SignalId::new(99);
        let json = serde_json::to_string(&original).ok();
        assert_eq!(json.as_deref(), Some("99"));
        let restored: Result<SignalId, _> = serde_json::from_str("99");
        assert_eq!(restored.ok(), Some(original));
    }

    #[test]
    fn line_id_from_str() {
        let line: LineId = "greeting_hello".into();
        assert_eq!(line.as_str(), "greeting_hello");
        assert_eq!(line.to_string(), "greeting_hello");
    }
}
