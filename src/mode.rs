//! Machine operating mode.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Top-level operating selection. Exactly one is active at any time.
///
/// The discriminants travel in the `controller:mode:change` payload and are
/// shared with the settings blob, so they must not be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Mode {
    #[default]
    Standby,
    Brew,
    Steam,
    Water,
    Grind,
}

impl Mode {
    pub const ALL: [Self; 5] = [
        Self::Standby,
        Self::Brew,
        Self::Steam,
        Self::Water,
        Self::Grind,
    ];

    pub const fn value(self) -> i64 {
        match self {
            Self::Standby => 0,
            Self::Brew => 1,
            Self::Steam => 2,
            Self::Water => 3,
            Self::Grind => 4,
        }
    }

    pub const fn from_value(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::Standby),
            1 => Some(Self::Brew),
            2 => Some(Self::Steam),
            3 => Some(Self::Water),
            4 => Some(Self::Grind),
            _ => None,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Standby => "standby",
            Self::Brew => "brew",
            Self::Steam => "steam",
            Self::Water => "water",
            Self::Grind => "grind",
        };
        f.write_str(name)
    }
}
