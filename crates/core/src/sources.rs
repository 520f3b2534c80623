//! Live sources, grouped by the module that owns them.

use std::collections::{BTreeMap, HashMap};

use looma_transport::NodeId;

use crate::modules::ModuleId;
use crate::sample::SampleSource;
use crate::tone::ToneSource;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SourceKey {
    Tone,
    Sample(String),
}

impl std::fmt::Display for SourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKey::Tone => f.write_str("tone"),
            SourceKey::Sample(asset_id) => write!(f, "sample:{asset_id}"),
        }
    }
}

#[derive(Debug)]
pub enum Source {
    Tone(ToneSource),
    Sample(SampleSource),
}

impl Source {
    pub fn key(&self) -> SourceKey {
        match self {
            Source::Tone(_) => SourceKey::Tone,
            Source::Sample(sample) => SourceKey::Sample(sample.asset_id().to_string()),
        }
    }

    pub fn is_running(&self) -> bool {
        match self {
            Source::Tone(tone) => tone.is_running(),
            Source::Sample(sample) => sample.is_playing(),
        }
    }
}

/// Module id → key → source. A module holds at most one tone and one sample
/// per asset id.
#[derive(Debug, Default)]
pub struct SourceIndex {
    modules: HashMap<ModuleId, BTreeMap<SourceKey, Source>>,
}

impl SourceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `source` under its own key, handing back whatever it displaced.
    pub fn insert(&mut self, module: ModuleId, source: Source) -> Option<Source> {
        self.modules
            .entry(module)
            .or_default()
            .insert(source.key(), source)
    }

    pub fn get(&self, module: ModuleId, key: &SourceKey) -> Option<&Source> {
        self.modules.get(&module)?.get(key)
    }

    pub fn get_mut(&mut self, module: ModuleId, key: &SourceKey) -> Option<&mut Source> {
        self.modules.get_mut(&module)?.get_mut(key)
    }

    pub fn contains(&self, module: ModuleId, key: &SourceKey) -> bool {
        self.get(module, key).is_some()
    }

    pub fn remove(&mut self, module: ModuleId, key: &SourceKey) -> Option<Source> {
        let sources = self.modules.get_mut(&module)?;
        let removed = sources.remove(key);
        if sources.is_empty() {
            self.modules.remove(&module);
        }
        removed
    }

    /// Take every source owned by `module`.
    pub fn drain(&mut self, module: ModuleId) -> Vec<(SourceKey, Source)> {
        self.modules
            .remove(&module)
            .map(|sources| sources.into_iter().collect())
            .unwrap_or_default()
    }

    /// Take every source in the index, in module catalogue order.
    pub fn drain_all(&mut self) -> Vec<(ModuleId, SourceKey, Source)> {
        let mut out = Vec::new();
        for module in ModuleId::ALL {
            for (key, source) in self.drain(module) {
                out.push((module, key, source));
            }
        }
        out
    }

    pub fn tone(&self, module: ModuleId) -> Option<&ToneSource> {
        match self.get(module, &SourceKey::Tone)? {
            Source::Tone(tone) => Some(tone),
            Source::Sample(_) => None,
        }
    }

    pub fn tone_mut(&mut self, module: ModuleId) -> Option<&mut ToneSource> {
        match self.get_mut(module, &SourceKey::Tone)? {
            Source::Tone(tone) => Some(tone),
            Source::Sample(_) => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (ModuleId, &SourceKey, &Source)> {
        self.modules
            .iter()
            .flat_map(|(module, sources)| sources.iter().map(move |(k, s)| (*module, k, s)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (ModuleId, &SourceKey, &mut Source)> {
        self.modules
            .iter_mut()
            .flat_map(|(module, sources)| sources.iter_mut().map(move |(k, s)| (*module, k, s)))
    }

    pub fn len(&self) -> usize {
        self.modules.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn running_count(&self) -> usize {
        self.iter().filter(|(_, _, s)| s.is_running()).count()
    }

    pub fn running_tone_count(&self) -> usize {
        self.iter()
            .filter(|(_, _, s)| matches!(s, Source::Tone(t) if t.is_running()))
            .count()
    }

    /// Modules that currently have at least one running source.
    pub fn running_modules(&self) -> Vec<ModuleId> {
        let mut modules: Vec<_> = self
            .modules
            .iter()
            .filter(|(_, sources)| sources.values().any(Source::is_running))
            .map(|(module, _)| *module)
            .collect();
        modules.sort();
        modules
    }

    /// Find the sample source whose live instance is `id`.
    pub fn find_sample_by_node(&self, id: NodeId) -> Option<(ModuleId, SourceKey)> {
        self.iter().find_map(|(module, key, source)| match source {
            Source::Sample(sample) if sample.playing_node() == Some(id) => {
                Some((module, key.clone()))
            }
            _ => None,
        })
    }
}
