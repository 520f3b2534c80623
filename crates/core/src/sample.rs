use looma_transport::{AudioArc, Command, NodeId, PlayerSpec};
use tracing::debug;

use crate::bus::{MixingBus, SessionState};
use crate::error::Result;
use crate::transport::clamp_gain;

/// A decoded asset plus at most one live playback instance.
///
/// Every `play` spawns a fresh player node from the start of the buffer; the
/// previous instance is stopped and released first.
#[derive(Debug)]
pub struct SampleSource {
    asset_id: String,
    audio: AudioArc,
    looped: bool,
    volume: f32,
    playing: Option<NodeId>,
}

impl SampleSource {
    pub fn new(asset_id: impl Into<String>, audio: AudioArc, looped: bool, volume: f32) -> Self {
        Self {
            asset_id: asset_id.into(),
            audio,
            looped,
            volume: clamp_gain(volume),
            playing: None,
        }
    }

    pub fn play(&mut self, bus: &mut MixingBus) -> Result<()> {
        self.stop(bus)?;
        if bus.state() == SessionState::Suspended {
            bus.resume()?;
        }

        let id = bus.allocate();
        bus.add_player(PlayerSpec {
            id,
            audio: self.audio.clone(),
            gain: self.volume,
            looped: self.looped,
        })?;
        bus.send(Command::Start { id })?;
        self.playing = Some(id);
        debug!(asset = %self.asset_id, %id, looped = self.looped, "sample playing");
        Ok(())
    }

    /// Halt the active instance. Does nothing when idle.
    pub fn stop(&mut self, bus: &mut MixingBus) -> Result<()> {
        let Some(id) = self.playing.take() else {
            return Ok(());
        };
        bus.send(Command::Stop { id })?;
        bus.send(Command::Release { id })?;
        Ok(())
    }

    pub fn set_volume(&mut self, bus: &mut MixingBus, volume: f32) -> Result<()> {
        self.volume = clamp_gain(volume);
        if let Some(id) = self.playing {
            bus.send(Command::SetGain {
                id,
                gain: self.volume,
            })?;
        }
        Ok(())
    }

    /// Called when the graph reports that `id` played to its end. Returns
    /// whether it was this source's live instance.
    pub(crate) fn mark_ended(&mut self, bus: &mut MixingBus, id: NodeId) -> Result<bool> {
        if self.playing != Some(id) {
            return Ok(false);
        }
        self.playing = None;
        bus.send(Command::Release { id })?;
        Ok(true)
    }

    pub fn asset_id(&self) -> &str {
        &self.asset_id
    }

    pub fn audio(&self) -> &AudioArc {
        &self.audio
    }

    pub fn is_playing(&self) -> bool {
        self.playing.is_some()
    }

    pub fn playing_node(&self) -> Option<NodeId> {
        self.playing
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn is_looped(&self) -> bool {
        self.looped
    }
}
