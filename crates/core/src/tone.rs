//! Binaural tone source: two sine oscillators split hard left and hard right.

use looma_transport::{Command, NodeId, PAN_LEFT, PAN_RIGHT};
use tracing::debug;

use crate::bus::{MixingBus, SessionState};
use crate::error::{EngineError, Result};
use crate::transport::clamp_gain;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToneState {
    Created,
    Running,
    Stopped,
}

/// A pair of oscillators whose frequencies differ by the beat frequency.
///
/// Oscillators are single-use: once stopped, the source is spent and a new
/// one must be created.
#[derive(Debug)]
pub struct ToneSource {
    left: NodeId,
    right: NodeId,
    base: f32,
    beat: f32,
    volume: f32,
    state: ToneState,
}

pub(crate) fn validate_frequencies(base: f32, beat: f32) -> Result<()> {
    let right = base + beat;
    if !base.is_finite() || !right.is_finite() || base <= 0.0 || right <= 0.0 {
        return Err(EngineError::InvalidFrequency { base, beat });
    }
    Ok(())
}

impl ToneSource {
    /// Build both oscillator chains on the bus. They stay silent until
    /// [`start`](Self::start).
    pub fn create(bus: &mut MixingBus, base: f32, beat: f32, volume: f32) -> Result<Self> {
        validate_frequencies(base, beat)?;
        let volume = clamp_gain(volume);
        let left = bus.allocate();
        let right = bus.allocate();

        bus.send(Command::AddOscillator {
            id: left,
            frequency: base,
            gain: volume,
            pan: PAN_LEFT,
        })?;
        bus.send(Command::AddOscillator {
            id: right,
            frequency: base + beat,
            gain: volume,
            pan: PAN_RIGHT,
        })?;
        debug!(%left, %right, base, beat, volume, "tone source created");

        Ok(Self {
            left,
            right,
            base,
            beat,
            volume,
            state: ToneState::Created,
        })
    }

    pub fn start(&mut self, bus: &mut MixingBus) -> Result<()> {
        match self.state {
            ToneState::Running => return Err(EngineError::AlreadyStarted),
            ToneState::Stopped => return Err(EngineError::AlreadyStopped),
            ToneState::Created => {}
        }
        if bus.state() == SessionState::Suspended {
            bus.resume()?;
        }
        bus.send(Command::Start { id: self.left })?;
        bus.send(Command::Start { id: self.right })?;
        self.state = ToneState::Running;
        Ok(())
    }

    /// Halt both oscillators for good and release their nodes.
    pub fn stop(&mut self, bus: &mut MixingBus) -> Result<()> {
        if self.state == ToneState::Stopped {
            return Err(EngineError::AlreadyStopped);
        }
        // Spent even if a send below fails.
        self.state = ToneState::Stopped;
        for id in [self.left, self.right] {
            bus.send(Command::Stop { id })?;
            bus.send(Command::Release { id })?;
        }
        debug!(left = %self.left, right = %self.right, "tone source stopped");
        Ok(())
    }

    pub fn update_frequency(&mut self, bus: &mut MixingBus, base: f32, beat: f32) -> Result<()> {
        validate_frequencies(base, beat)?;
        if self.state == ToneState::Stopped {
            return Err(EngineError::AlreadyStopped);
        }
        bus.send(Command::SetFrequency {
            id: self.left,
            frequency: base,
        })?;
        bus.send(Command::SetFrequency {
            id: self.right,
            frequency: base + beat,
        })?;
        self.base = base;
        self.beat = beat;
        Ok(())
    }

    pub fn set_volume(&mut self, bus: &mut MixingBus, volume: f32) -> Result<()> {
        let volume = clamp_gain(volume);
        if self.state != ToneState::Stopped {
            bus.send(Command::SetGain {
                id: self.left,
                gain: volume,
            })?;
            bus.send(Command::SetGain {
                id: self.right,
                gain: volume,
            })?;
        }
        self.volume = volume;
        Ok(())
    }

    pub fn state(&self) -> ToneState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == ToneState::Running
    }

    pub fn left_frequency(&self) -> f32 {
        self.base
    }

    pub fn right_frequency(&self) -> f32 {
        self.base + self.beat
    }

    pub fn beat_frequency(&self) -> f32 {
        self.beat
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn node_ids(&self) -> (NodeId, NodeId) {
        (self.left, self.right)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use looma_engine::{AudioDevice, Lifecycle, OfflineDevice};

    fn bus_with(device: &OfflineDevice) -> MixingBus {
        let device = device.clone();
        let mut bus = MixingBus::new(move || Ok(Box::new(device.clone()) as Box<dyn AudioDevice>));
        bus.ensure_session().unwrap();
        bus
    }

    #[test]
    fn test_create_tunes_and_pans_both_channels() {
        let device = OfflineDevice::new(48000);
        let mut bus = bus_with(&device);

        let tone = ToneSource::create(&mut bus, 200.0, 10.0, 0.5).unwrap();
        assert_eq!(tone.left_frequency(), 200.0);
        assert_eq!(tone.right_frequency(), 210.0);

        let (left, right) = tone.node_ids();
        let left = device.node(left).unwrap();
        let right = device.node(right).unwrap();
        assert_eq!(left.frequency, Some(200.0));
        assert_eq!(left.pan, Some(PAN_LEFT));
        assert_eq!(right.frequency, Some(210.0));
        assert_eq!(right.pan, Some(PAN_RIGHT));
        assert_eq!(left.gain, 0.5);
        assert_eq!(left.lifecycle, Lifecycle::Idle);
    }

    #[test]
    fn test_right_tracks_base_plus_beat() {
        let device = OfflineDevice::new(48000);
        let mut bus = bus_with(&device);
        let mut tone = ToneSource::create(&mut bus, 200.0, 10.0, 0.5).unwrap();

        for (base, beat) in [(300.0, 6.0), (100.0, 2.0), (440.0, 40.0)] {
            tone.update_frequency(&mut bus, base, beat).unwrap();
            assert_eq!(tone.right_frequency(), tone.left_frequency() + beat);
            let (_, right) = tone.node_ids();
            assert_eq!(device.node(right).unwrap().frequency, Some(base + beat));
        }
    }

    #[test]
    fn test_invalid_frequencies_are_rejected() {
        let device = OfflineDevice::new(48000);
        let mut bus = bus_with(&device);

        assert!(matches!(
            ToneSource::create(&mut bus, 0.0, 10.0, 0.5),
            Err(EngineError::InvalidFrequency { .. })
        ));
        assert!(matches!(
            ToneSource::create(&mut bus, 100.0, -150.0, 0.5),
            Err(EngineError::InvalidFrequency { .. })
        ));
        assert!(matches!(
            ToneSource::create(&mut bus, f32::NAN, 10.0, 0.5),
            Err(EngineError::InvalidFrequency { .. })
        ));
        assert!(device.nodes().is_empty());

        let mut tone = ToneSource::create(&mut bus, 200.0, 10.0, 0.5).unwrap();
        assert!(tone.update_frequency(&mut bus, -1.0, 10.0).is_err());
        assert_eq!(tone.left_frequency(), 200.0);
    }

    #[test]
    fn test_start_resumes_suspended_session() {
        let device = OfflineDevice::new(48000);
        let mut bus = bus_with(&device);
        assert_eq!(bus.state(), SessionState::Suspended);

        let mut tone = ToneSource::create(&mut bus, 200.0, 10.0, 1.0).unwrap();
        tone.start(&mut bus).unwrap();
        assert_eq!(bus.state(), SessionState::Running);

        let frames = device.render(256);
        let left_energy: f32 = frames.chunks(2).map(|f| f[0].abs()).sum();
        let right_energy: f32 = frames.chunks(2).map(|f| f[1].abs()).sum();
        assert!(left_energy > 0.0);
        assert!(right_energy > 0.0);
    }

    #[test]
    fn test_lifecycle_misuse() {
        let device = OfflineDevice::new(48000);
        let mut bus = bus_with(&device);
        let mut tone = ToneSource::create(&mut bus, 200.0, 10.0, 0.5).unwrap();

        tone.start(&mut bus).unwrap();
        assert!(matches!(tone.start(&mut bus), Err(EngineError::AlreadyStarted)));

        tone.stop(&mut bus).unwrap();
        assert!(matches!(tone.stop(&mut bus), Err(EngineError::AlreadyStopped)));
        assert!(matches!(tone.start(&mut bus), Err(EngineError::AlreadyStopped)));
        assert!(device.nodes().is_empty());
    }

    #[test]
    fn test_stop_without_start_releases_nodes() {
        let device = OfflineDevice::new(48000);
        let mut bus = bus_with(&device);
        let mut tone = ToneSource::create(&mut bus, 200.0, 10.0, 0.5).unwrap();
        assert_eq!(device.nodes().len(), 2);

        tone.stop(&mut bus).unwrap();
        assert!(device.nodes().is_empty());
        assert!(!tone.is_running());
    }

    #[test]
    fn test_set_volume_clamps() {
        let device = OfflineDevice::new(48000);
        let mut bus = bus_with(&device);
        let mut tone = ToneSource::create(&mut bus, 200.0, 10.0, 3.0).unwrap();
        assert_eq!(tone.volume(), 1.0);

        tone.set_volume(&mut bus, -0.5).unwrap();
        assert_eq!(tone.volume(), 0.0);
        let (left, right) = tone.node_ids();
        assert_eq!(device.node(left).unwrap().gain, 0.0);
        assert_eq!(device.node(right).unwrap().gain, 0.0);
    }

    #[test]
    fn test_nan_volume_is_silent() {
        let device = OfflineDevice::new(48000);
        let mut bus = bus_with(&device);
        let mut tone = ToneSource::create(&mut bus, 200.0, 10.0, f32::NAN).unwrap();
        assert_eq!(tone.volume(), 0.0);

        tone.set_volume(&mut bus, 0.4).unwrap();
        tone.set_volume(&mut bus, f32::NAN).unwrap();
        let (left, _) = tone.node_ids();
        assert_eq!(device.node(left).unwrap().gain, 0.0);
    }
}
