// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 convpipe contributors

//! Builtin transforms
//!
//! Targets that run in-process instead of being handed to a plugin:
//! `tee`, `collect`, `passthrough` (and its aliases) and `clipboard`.

mod clipboard;
mod collect;
mod passthrough;
mod tee;

pub use clipboard::{
    Clipboard, ClipboardBackend, ClipboardContent, ClipboardOutcome, ClipboardRead,
    ContentKind, SystemClipboard,
};
pub use collect::{Collect, CollectOutput};
pub(crate) use collect::copy_tree;
pub use passthrough::Passthrough;
pub use tee::Tee;

use serde::{Deserialize, Serialize};

/// Classification of a stage element target
///
/// Computed once when an element is created so the scheduler never has
/// to repeat case-insensitive name matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Builtin {
    Tee,
    Collect,
    Passthrough,
    Clipboard,
    /// Ordinary plugin target
    #[default]
    None,
}

impl Builtin {
    /// Classify a target name (case-insensitive, alias-aware)
    pub fn classify(target: &str) -> Self {
        if Tee::is_tee(target) {
            Self::Tee
        } else if Collect::is_collect(target) {
            Self::Collect
        } else if Passthrough::is_passthrough(target) {
            Self::Passthrough
        } else if Clipboard::is_clipboard(target) {
            Self::Clipboard
        } else {
            Self::None
        }
    }

    /// Whether this is an in-process builtin
    pub fn is_builtin(self) -> bool {
        self != Self::None
    }
}

impl std::fmt::Display for Builtin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tee => write!(f, "tee"),
            Self::Collect => write!(f, "collect"),
            Self::Passthrough => write!(f, "passthrough"),
            Self::Clipboard => write!(f, "clipboard"),
            Self::None => write!(f, "plugin"),
        }
    }
}
