//! The engine context: one object owning the bus, the module selector, the
//! transport and every live source.
//!
//! All mutation goes through `&mut self` on the thread that owns the engine.
//! Sample loads run as tokio tasks and are applied back in [`Engine::poll`] or
//! [`Engine::wait_for_loads`], each behind an activation guard.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use looma_decode::{
    AssetFetcher, DecodeError, FsFetcher, SampleError, load_asset, resolve_asset,
};
use looma_transport::{AudioArc, Status};
use tokio::runtime::Handle;
use tokio::task::{Id, JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use crate::bus::{MixingBus, SessionState};
use crate::config::{BinauralSettings, EngineConfig};
use crate::error::{EngineError, Result};
use crate::events::EngineEvent;
use crate::modules::{ModuleId, ModuleSelector};
use crate::sample::SampleSource;
use crate::sources::{Source, SourceIndex, SourceKey};
use crate::tone::{ToneSource, ToneState, validate_frequencies};
use crate::transport::TransportState;

/// Identifies which activation a load belongs to. The epoch advances on
/// every module switch and every pause.
#[derive(Debug, Clone, PartialEq, Eq)]
struct LoadTicket {
    module: ModuleId,
    asset_id: String,
    epoch: u64,
}

pub struct Engine {
    config: EngineConfig,
    bus: MixingBus,
    fetcher: Arc<dyn AssetFetcher>,
    selector: ModuleSelector,
    transport: TransportState,
    sources: SourceIndex,
    binaural: BinauralSettings,
    pads: BTreeMap<ModuleId, BTreeSet<String>>,
    cache: HashMap<String, AudioArc>,
    loads: JoinSet<std::result::Result<AudioArc, SampleError>>,
    loading: HashMap<Id, LoadTicket>,
    epoch: u64,
    session: SessionState,
    events: Vec<EngineEvent>,
}

impl Engine {
    /// Engine on the default output device, reading assets from disk.
    pub fn new(config: EngineConfig) -> Self {
        let bus = MixingBus::with_default_output(config.command_capacity);
        Self::with_parts(config, bus, Arc::new(FsFetcher))
    }

    pub fn with_parts(config: EngineConfig, bus: MixingBus, fetcher: Arc<dyn AssetFetcher>) -> Self {
        let pads = config
            .pads
            .iter()
            .map(|(module, ids)| (*module, ids.iter().cloned().collect()))
            .collect();

        Self {
            selector: ModuleSelector::new(config.default_module),
            transport: TransportState::new(config.master_volume),
            binaural: config.binaural,
            pads,
            config,
            bus,
            fetcher,
            sources: SourceIndex::new(),
            cache: HashMap::new(),
            loads: JoinSet::new(),
            loading: HashMap::new(),
            epoch: 0,
            session: SessionState::Uninitialized,
            events: Vec::new(),
        }
    }

    /// Create the output session if needed. Call this from a user gesture.
    pub fn ensure_session(&mut self) -> Result<SessionState> {
        let state = self.bus.ensure_session();
        self.note_session();
        state
    }

    /// Replace the binaural voice with a new tone source at `volume`.
    ///
    /// The settings are always recorded. A tone is only built while the
    /// binaural module is active; it starts right away if the transport is
    /// playing, otherwise on the next play.
    pub fn create_tone_source(&mut self, base: f32, beat: f32, volume: f32) -> Result<()> {
        validate_frequencies(base, beat)?;
        self.binaural = BinauralSettings {
            base_hz: base,
            beat_hz: beat,
        };
        if !self.selector.is_active(ModuleId::Binaural) {
            debug!(base, beat, "binaural inactive, tone settings recorded");
            return Ok(());
        }

        self.ensure_session()?;
        if let Some(old) = self.sources.remove(ModuleId::Binaural, &SourceKey::Tone) {
            self.destroy(ModuleId::Binaural, SourceKey::Tone, old)?;
        }
        let tone = ToneSource::create(&mut self.bus, base, beat, volume)?;
        self.sources.insert(ModuleId::Binaural, Source::Tone(tone));

        let result = if self.transport.is_playing {
            self.start_tone()
        } else {
            Ok(())
        };
        self.note_session();
        result
    }

    /// Fetch and decode `asset_id` at the session's sample rate.
    ///
    /// The returned source is detached: it is not part of any module and the
    /// caller drives it through [`bus_mut`](Self::bus_mut). Decoded audio is
    /// cached, so pads toggled later reuse it.
    pub async fn load_sample(&mut self, asset_id: &str) -> Result<SampleSource> {
        let sample_rate = self.require_sample_rate()?;
        let audio = match self.cache.get(asset_id) {
            Some(audio) => audio.clone(),
            None => {
                let location = resolve_asset(
                    &self.config.samples_root,
                    asset_id,
                    &self.config.sample_extension,
                );
                let audio = load_asset(self.fetcher.as_ref(), &location, sample_rate)
                    .await
                    .map_err(|source| EngineError::Sample {
                        asset_id: asset_id.to_string(),
                        source,
                    })?;
                self.cache.insert(asset_id.to_string(), audio.clone());
                audio
            }
        };

        Ok(SampleSource::new(
            asset_id,
            audio,
            self.config.loop_samples,
            self.transport.normalized_volume(),
        ))
    }

    /// Set the master volume (0 to 100) and push it to every live source.
    pub fn set_master_volume(&mut self, volume: f32) -> Result<()> {
        self.transport.set_master_volume(volume);
        let normalized = self.transport.normalized_volume();
        debug!(
            master = self.transport.master_volume,
            sources = self.sources.len(),
            "fanning out master volume"
        );

        let mut failure = None;
        for (module, key, source) in self.sources.iter_mut() {
            let result = match source {
                Source::Tone(tone) => tone.set_volume(&mut self.bus, normalized),
                Source::Sample(sample) => sample.set_volume(&mut self.bus, normalized),
            };
            if let Err(e) = result {
                warn!(%module, source = %key, "failed to set volume: {e}");
                failure.get_or_insert(e);
            }
        }
        failure.map_or(Ok(()), Err)
    }

    /// Move the transport to playing or paused.
    ///
    /// Playing creates the session if needed (the press counts as a user
    /// gesture) and starts the active module. Pausing destroys every source
    /// but leaves the session running.
    pub fn play_pause(&mut self, play: bool) -> Result<()> {
        if play == self.transport.is_playing {
            return Ok(());
        }

        if play {
            self.ensure_session()?;
            self.bus.resume()?;
            self.note_session();
            self.transport.is_playing = true;
            info!(module = %self.selector.active(), "playback started");

            let result = self.start_module(self.selector.active());
            self.note_session();
            result
        } else {
            self.transport.is_playing = false;
            self.epoch += 1;
            info!("playback paused");
            self.stop_all()
        }
    }

    /// Switch the active module. Sources of the outgoing module are stopped
    /// before any source of the incoming one starts.
    pub fn select_module(&mut self, id: ModuleId) -> Result<()> {
        let from = self.selector.active();
        if from == id {
            return Ok(());
        }

        let stopped = self.stop_module(from);
        self.selector.select(id);
        self.epoch += 1;
        info!(%from, to = %id, "module changed");
        self.events.push(EngineEvent::ModuleChanged { from, to: id });
        stopped?;

        if self.transport.is_playing {
            let result = self.start_module(id);
            self.note_session();
            result?;
        }
        Ok(())
    }

    /// Turn a sample pad of the active module on or off.
    pub fn toggle_sample(&mut self, asset_id: &str, on: bool) -> Result<()> {
        let module = self.selector.active();
        if on {
            self.pads
                .entry(module)
                .or_default()
                .insert(asset_id.to_string());
            if self.transport.is_playing {
                let result = self.start_pad(module, asset_id);
                self.note_session();
                result?;
            }
        } else {
            if let Some(pads) = self.pads.get_mut(&module) {
                pads.remove(asset_id);
            }
            let key = SourceKey::Sample(asset_id.to_string());
            if let Some(source) = self.sources.remove(module, &key) {
                self.destroy(module, key, source)?;
            }
        }
        Ok(())
    }

    /// Retune the live binaural tone, or record the settings for the next one.
    pub fn set_binaural_frequency(&mut self, base: f32, beat: f32) -> Result<()> {
        validate_frequencies(base, beat)?;
        self.binaural = BinauralSettings {
            base_hz: base,
            beat_hz: beat,
        };

        if let Some(tone) = self.sources.tone_mut(ModuleId::Binaural) {
            tone.update_frequency(&mut self.bus, base, beat)?;
        } else if self.transport.is_playing && self.selector.is_active(ModuleId::Binaural) {
            self.start_tone()?;
            self.note_session();
        }
        Ok(())
    }

    /// Apply finished loads and drain notifications from the audio thread.
    pub fn poll(&mut self) -> Result<()> {
        while let Some(joined) = self.loads.try_join_next_with_id() {
            self.finish_load(joined)?;
        }
        self.drain_status()
    }

    /// Wait for every in-flight load, applying each as it finishes.
    pub async fn wait_for_loads(&mut self) -> Result<()> {
        while let Some(joined) = self.loads.join_next_with_id().await {
            self.finish_load(joined)?;
        }
        self.drain_status()
    }

    pub fn take_events(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn session_state(&self) -> SessionState {
        self.bus.state()
    }

    pub fn bus_mut(&mut self) -> &mut MixingBus {
        &mut self.bus
    }

    pub fn active_module(&self) -> ModuleId {
        self.selector.active()
    }

    pub fn modules(&self) -> &ModuleSelector {
        &self.selector
    }

    pub fn transport(&self) -> TransportState {
        self.transport
    }

    pub fn binaural_settings(&self) -> BinauralSettings {
        self.binaural
    }

    /// The binaural voice, if one exists.
    pub fn tone(&self) -> Option<&ToneSource> {
        self.sources.tone(ModuleId::Binaural)
    }

    pub fn sources(&self) -> &SourceIndex {
        &self.sources
    }

    pub fn enabled_pads(&self, module: ModuleId) -> Vec<&str> {
        self.pads
            .get(&module)
            .map(|pads| pads.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn is_loading(&self, asset_id: &str) -> bool {
        self.loading.values().any(|t| t.asset_id == asset_id)
    }

    pub fn is_cached(&self, asset_id: &str) -> bool {
        self.cache.contains_key(asset_id)
    }

    fn note_session(&mut self) {
        let state = self.bus.state();
        if state != self.session {
            self.session = state;
            self.events.push(EngineEvent::SessionChanged(state));
        }
    }

    fn require_sample_rate(&self) -> Result<u32> {
        self.bus
            .sample_rate()
            .ok_or_else(|| EngineError::SessionUnavailable("session not created yet".to_string()))
    }

    fn start_module(&mut self, module: ModuleId) -> Result<()> {
        if module == ModuleId::Binaural {
            self.start_tone()?;
        }
        let pads: Vec<String> = self
            .pads
            .get(&module)
            .map(|pads| pads.iter().cloned().collect())
            .unwrap_or_default();
        for asset_id in pads {
            self.start_pad(module, &asset_id)?;
        }
        Ok(())
    }

    fn start_tone(&mut self) -> Result<()> {
        let module = ModuleId::Binaural;
        if self.sources.tone(module).is_none() {
            let BinauralSettings { base_hz, beat_hz } = self.binaural;
            let volume = self.transport.normalized_volume();
            let tone = ToneSource::create(&mut self.bus, base_hz, beat_hz, volume)?;
            self.sources.insert(module, Source::Tone(tone));
        }

        if let Some(tone) = self.sources.tone_mut(module)
            && tone.state() == ToneState::Created
        {
            tone.start(&mut self.bus)?;
            self.events.push(EngineEvent::SourceRunning {
                module,
                source: SourceKey::Tone,
                running: true,
            });
        }
        Ok(())
    }

    fn start_pad(&mut self, module: ModuleId, asset_id: &str) -> Result<()> {
        let key = SourceKey::Sample(asset_id.to_string());
        if let Some(Source::Sample(sample)) = self.sources.get_mut(module, &key) {
            if !sample.is_playing() {
                sample.play(&mut self.bus)?;
                self.events.push(EngineEvent::SourceRunning {
                    module,
                    source: key,
                    running: true,
                });
            }
            return Ok(());
        }

        match self.cache.get(asset_id).cloned() {
            Some(audio) => self.play_new_sample(module, asset_id, audio),
            None => self.spawn_load(module, asset_id),
        }
    }

    fn play_new_sample(&mut self, module: ModuleId, asset_id: &str, audio: AudioArc) -> Result<()> {
        let mut sample = SampleSource::new(
            asset_id,
            audio,
            self.config.loop_samples,
            self.transport.normalized_volume(),
        );
        sample.play(&mut self.bus)?;
        self.sources.insert(module, Source::Sample(sample));
        self.events.push(EngineEvent::SourceRunning {
            module,
            source: SourceKey::Sample(asset_id.to_string()),
            running: true,
        });
        Ok(())
    }

    fn spawn_load(&mut self, module: ModuleId, asset_id: &str) -> Result<()> {
        let ticket = LoadTicket {
            module,
            asset_id: asset_id.to_string(),
            epoch: self.epoch,
        };
        if self.loading.values().any(|t| *t == ticket) {
            return Ok(());
        }
        let sample_rate = self.require_sample_rate()?;

        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                error!(asset = asset_id, "cannot load sample outside a tokio runtime: {e}");
                self.fail_load(ticket, &SampleError::Decode(DecodeError::Aborted(e.to_string())));
                return Ok(());
            }
        };

        let location = resolve_asset(
            &self.config.samples_root,
            asset_id,
            &self.config.sample_extension,
        );
        let fetcher = self.fetcher.clone();
        let abort = self.loads.spawn_on(
            async move { load_asset(fetcher.as_ref(), &location, sample_rate).await },
            &handle,
        );
        debug!(%module, asset = asset_id, epoch = self.epoch, "sample load spawned");
        self.loading.insert(abort.id(), ticket);
        Ok(())
    }

    fn finish_load(
        &mut self,
        joined: std::result::Result<(Id, std::result::Result<AudioArc, SampleError>), JoinError>,
    ) -> Result<()> {
        let (id, result) = match joined {
            Ok((id, result)) => (id, result),
            Err(e) => {
                let id = e.id();
                (id, Err(SampleError::Decode(DecodeError::Aborted(e.to_string()))))
            }
        };
        let Some(ticket) = self.loading.remove(&id) else {
            return Ok(());
        };

        match result {
            Ok(audio) => self.complete_load(ticket, audio),
            // An earlier load for the same asset may have filled the cache
            Err(e) => match self.cache.get(&ticket.asset_id).cloned() {
                Some(audio) => {
                    debug!(module = %ticket.module, asset = %ticket.asset_id, "load failed, using cached audio: {e}");
                    self.complete_load(ticket, audio)
                }
                None => {
                    self.fail_load(ticket, &e);
                    Ok(())
                }
            },
        }
    }

    fn complete_load(&mut self, ticket: LoadTicket, audio: AudioArc) -> Result<()> {
        let LoadTicket {
            module,
            asset_id,
            epoch,
        } = ticket;
        self.cache.insert(asset_id.clone(), audio.clone());

        let key = SourceKey::Sample(asset_id.clone());
        let still_wanted = self.selector.is_active(module)
            && epoch == self.epoch
            && self.transport.is_playing
            && self
                .pads
                .get(&module)
                .is_some_and(|pads| pads.contains(&asset_id))
            && !self.sources.contains(module, &key);
        if !still_wanted {
            debug!(%module, asset = %asset_id, epoch, current = self.epoch, "discarding stale sample load");
            return Ok(());
        }

        let result = self.play_new_sample(module, &asset_id, audio);
        self.note_session();
        result
    }

    fn fail_load(&mut self, ticket: LoadTicket, error: &SampleError) {
        warn!(module = %ticket.module, asset = %ticket.asset_id, "sample load failed: {error}");
        if let Some(pads) = self.pads.get_mut(&ticket.module) {
            pads.remove(&ticket.asset_id);
        }
        self.events.push(EngineEvent::LoadFailed {
            asset_id: ticket.asset_id,
            kind: error.kind(),
        });
    }

    fn drain_status(&mut self) -> Result<()> {
        for status in self.bus.drain_status() {
            match status {
                Status::Ended { id } => {
                    let Some((module, key)) = self.sources.find_sample_by_node(id) else {
                        continue;
                    };
                    if let Some(Source::Sample(sample)) = self.sources.get_mut(module, &key)
                        && sample.mark_ended(&mut self.bus, id)?
                    {
                        debug!(%module, source = %key, "sample finished");
                        self.events.push(EngineEvent::SourceRunning {
                            module,
                            source: key,
                            running: false,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    fn stop_module(&mut self, module: ModuleId) -> Result<()> {
        let mut failure = None;
        for (key, source) in self.sources.drain(module) {
            if let Err(e) = self.destroy(module, key, source) {
                failure.get_or_insert(e);
            }
        }
        failure.map_or(Ok(()), Err)
    }

    fn stop_all(&mut self) -> Result<()> {
        let mut failure = None;
        for (module, key, source) in self.sources.drain_all() {
            if let Err(e) = self.destroy(module, key, source) {
                failure.get_or_insert(e);
            }
        }
        failure.map_or(Ok(()), Err)
    }

    /// Stop a source that has already been taken out of the index.
    fn destroy(&mut self, module: ModuleId, key: SourceKey, mut source: Source) -> Result<()> {
        let was_running = source.is_running();
        let result = match &mut source {
            Source::Tone(tone) if tone.state() != ToneState::Stopped => tone.stop(&mut self.bus),
            Source::Tone(_) => Ok(()),
            Source::Sample(sample) => sample.stop(&mut self.bus),
        };
        if let Err(e) = &result {
            warn!(%module, source = %key, "failed to stop source: {e}");
        }
        if was_running {
            self.events.push(EngineEvent::SourceRunning {
                module,
                source: key,
                running: false,
            });
        }
        result
    }
}
