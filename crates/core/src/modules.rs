//! The module catalogue and the exactly-one-active selector.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ModuleId {
    #[default]
    Relaxation,
    Meditation,
    Binaural,
    Lofi,
    Healing,
}

impl ModuleId {
    pub const ALL: [ModuleId; 5] = [
        ModuleId::Relaxation,
        ModuleId::Meditation,
        ModuleId::Binaural,
        ModuleId::Lofi,
        ModuleId::Healing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleId::Relaxation => "relaxation",
            ModuleId::Meditation => "meditation",
            ModuleId::Binaural => "binaural",
            ModuleId::Lofi => "lofi",
            ModuleId::Healing => "healing",
        }
    }

    pub fn descriptor(&self) -> ModuleDescriptor {
        let (display_name, description) = match self {
            ModuleId::Relaxation => ("Relaxation Timer", "Ambient pads with customizable timer"),
            ModuleId::Meditation => ("Guided Meditation", "Voice-led sessions with ambient sounds"),
            ModuleId::Binaural => ("Binaural Beats", "Frequency-based brain entrainment"),
            ModuleId::Lofi => ("Lo-Fi Mixer", "Create custom lo-fi hip hop beats"),
            ModuleId::Healing => ("Healing Scripts", "AI-generated affirmations and stories"),
        };
        ModuleDescriptor {
            id: *self,
            display_name,
            description,
        }
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown module '{0}'")]
pub struct UnknownModule(pub String);

impl FromStr for ModuleId {
    type Err = UnknownModule;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModuleId::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| UnknownModule(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleDescriptor {
    pub id: ModuleId,
    pub display_name: &'static str,
    pub description: &'static str,
}

/// Ordered module list with exactly one active entry.
///
/// The active entry is stored as an index, so there is no representable
/// state with zero or several active modules.
#[derive(Debug, Clone)]
pub struct ModuleSelector {
    modules: Vec<ModuleDescriptor>,
    active: usize,
}

impl ModuleSelector {
    pub fn new(default: ModuleId) -> Self {
        let modules: Vec<_> = ModuleId::ALL.iter().map(ModuleId::descriptor).collect();
        let active = modules.iter().position(|m| m.id == default).unwrap_or(0);
        Self { modules, active }
    }

    pub fn active(&self) -> ModuleId {
        self.modules[self.active].id
    }

    pub fn is_active(&self, id: ModuleId) -> bool {
        self.active() == id
    }

    /// Make `id` the active module. Returns the previously active module if
    /// the selection changed.
    pub fn select(&mut self, id: ModuleId) -> Option<ModuleId> {
        let idx = self.modules.iter().position(|m| m.id == id)?;
        if idx == self.active {
            return None;
        }
        let previous = self.active();
        self.active = idx;
        Some(previous)
    }

    /// Descriptors in catalogue order, each paired with its active flag.
    pub fn entries(&self) -> impl Iterator<Item = (&ModuleDescriptor, bool)> + '_ {
        self.modules
            .iter()
            .enumerate()
            .map(move |(idx, m)| (m, idx == self.active))
    }
}

impl Default for ModuleSelector {
    fn default() -> Self {
        Self::new(ModuleId::default())
    }
}

/// A named binaural setting offered to presentation collaborators.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BinauralPreset {
    pub name: &'static str,
    pub base_hz: f32,
    pub beat_hz: f32,
    pub description: &'static str,
}

pub const BINAURAL_PRESETS: [BinauralPreset; 5] = [
    BinauralPreset {
        name: "Delta",
        base_hz: 100.0,
        beat_hz: 2.0,
        description: "Deep sleep, healing (0.5-4Hz)",
    },
    BinauralPreset {
        name: "Theta",
        base_hz: 200.0,
        beat_hz: 6.0,
        description: "Meditation, creativity (4-8Hz)",
    },
    BinauralPreset {
        name: "Alpha",
        base_hz: 300.0,
        beat_hz: 10.0,
        description: "Relaxation, calmness (8-13Hz)",
    },
    BinauralPreset {
        name: "Beta",
        base_hz: 400.0,
        beat_hz: 20.0,
        description: "Focus, alertness (13-30Hz)",
    },
    BinauralPreset {
        name: "Gamma",
        base_hz: 500.0,
        beat_hz: 40.0,
        description: "Insight, peak focus (30-50Hz)",
    },
];
