//! Common type definitions used throughout the apothecary library
//!
//! Reference-data identifiers are string-backed newtypes (the catalog owns
//! id allocation, e.g. `med_001`, `branch_002`, `user_009`, `RX-1042`).
//! Turn identifiers are UUID-backed and exist for log correlation only.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(
    /// Identifier of a medication record in the catalog
    MedicationId
);
string_id!(
    /// Identifier of a branch record in the catalog
    BranchId
);
string_id!(
    /// Canonical prescription identifier (dash-separated uppercase, e.g. `RX-1042`)
    PrescriptionId
);
string_id!(
    /// Canonical user identifier (lowercase, zero-padded, e.g. `user_009`)
    UserId
);

/// Unique identifier for a single turn, used for audit/log correlation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TurnId(Uuid);

impl TurnId {
    /// Create a new random TurnId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TurnId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TurnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for TurnId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Language of a user message
///
/// The assistant is bilingual: Hebrew when the message carries any Hebrew
/// codepoint, English otherwise. English doubles as the fallback for any
/// other script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    He,
    En,
}

impl Language {
    /// Detect the language of a message from its codepoints.
    pub fn detect(text: &str) -> Self {
        if text.chars().any(|ch| ('\u{0590}'..='\u{05FF}').contains(&ch)) {
            Language::He
        } else {
            Language::En
        }
    }

    /// English name of the language, as handed to the generation service.
    pub fn english_name(&self) -> &'static str {
        match self {
            Language::He => "Hebrew",
            Language::En => "English",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Language::He => write!(f, "he"),
            Language::En => write!(f, "en"),
        }
    }
}
