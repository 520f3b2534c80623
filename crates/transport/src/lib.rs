use std::sync::Arc;

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

/// Pan position of a node feeding only the left output channel.
pub const PAN_LEFT: f32 = -1.0;
/// Pan position of a node feeding only the right output channel.
pub const PAN_RIGHT: f32 = 1.0;

/// Shared, immutable decoded audio.
///
/// Samples live in an `Arc<[f32]>` so a decoded asset can be cached by the
/// control side and handed to any number of playback instances without
/// copying. Cloning only bumps the reference count.
///
/// ```
/// use looma_transport::AudioArc;
///
/// let audio = AudioArc::new(vec![0.0, 0.5, 1.0, 0.5], 44100, 2);
/// let shared = audio.clone();
/// assert_eq!(shared.frames(), 2);
/// ```
#[derive(Clone)]
pub struct AudioArc {
    /// Interleaved samples, e.g. [L, R, L, R, ...] for stereo.
    samples: Arc<[f32]>,
    sample_rate: u32,
    channels: u16,
}

impl AudioArc {
    /// Create a new `AudioArc` from owned interleaved samples.
    ///
    /// # Panics
    ///
    /// Panics if `channels` is 0 or if `samples.len()` is not divisible by `channels`.
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        assert!(channels > 0, "channels must be greater than 0");
        assert_eq!(
            samples.len() % channels as usize,
            0,
            "samples.len() must be divisible by channels"
        );
        Self {
            samples: Arc::from(samples),
            sample_rate,
            channels,
        }
    }

    #[inline]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// The inner `Arc`, mostly useful to check sharing in tests.
    pub fn samples_arc(&self) -> &Arc<[f32]> {
        &self.samples
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[inline]
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Number of frames (samples per channel).
    #[inline]
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Sample at `frame` for output channel `channel`.
    ///
    /// Mono assets are spread to every output channel; for multichannel assets
    /// the channel index wraps.
    #[inline]
    pub fn sample_at(&self, frame: usize, channel: usize) -> f32 {
        let channels = self.channels as usize;
        let idx = frame * channels + channel % channels;
        self.samples.get(idx).copied().unwrap_or(0.0)
    }

    /// Resample to `target_sample_rate`, returning a cheap clone when the
    /// rate already matches.
    pub fn resample(&self, target_sample_rate: u32) -> anyhow::Result<Self> {
        if self.sample_rate == target_sample_rate {
            return Ok(self.clone());
        }
        resample_audio_arc(self, target_sample_rate)
    }
}

impl std::fmt::Debug for AudioArc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioArc")
            .field("frames", &self.frames())
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.channels)
            .field("duration_secs", &self.duration_secs())
            .finish()
    }
}

/// Identifies one node in the render graph. Ids are allocated by the control
/// side and never reused within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Control messages sent from the engine to the render graph.
///
/// Every node owns its own gain and pan stage; there is no separate routing
/// message because every node terminates at the session output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// Add a sine oscillator. It stays silent until `Start`.
    AddOscillator {
        id: NodeId,
        frequency: f32,
        gain: f32,
        pan: f32,
    },
    Start { id: NodeId },
    /// Halt a node. Oscillators never run again after this.
    Stop { id: NodeId },
    SetFrequency { id: NodeId, frequency: f32 },
    SetGain { id: NodeId, gain: f32 },
    /// Remove a node from the graph.
    Release { id: NodeId },
}

/// Notifications sent from the render graph back to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// A non-looping player reached the end of its buffer.
    Ended { id: NodeId },
}

/// A buffer player to be added to the graph alongside the command stream.
///
/// The audio travels separately from [`Command`] so that commands stay
/// small and `Copy`. Players are not panned; the asset's own channel layout
/// reaches the output.
#[derive(Debug, Clone)]
pub struct PlayerSpec {
    pub id: NodeId,
    pub audio: AudioArc,
    pub gain: f32,
    pub looped: bool,
}

/// Resample an `AudioArc` to a target sample rate with sinc interpolation.
///
/// ```
/// use looma_transport::{AudioArc, resample_audio_arc};
///
/// let audio = AudioArc::new(vec![0.0; 44100], 44100, 1);
/// let resampled = resample_audio_arc(&audio, 48000).unwrap();
/// assert_eq!(resampled.sample_rate(), 48000);
/// ```
pub fn resample_audio_arc(audio: &AudioArc, target_sample_rate: u32) -> anyhow::Result<AudioArc> {
    if audio.sample_rate == target_sample_rate {
        return Ok(audio.clone());
    }
    if audio.is_empty() {
        return Ok(AudioArc::new(Vec::new(), target_sample_rate, audio.channels));
    }

    let channels = audio.channels as usize;
    let input_frames = audio.frames();
    let ratio = target_sample_rate as f64 / audio.sample_rate as f64;

    // rubato works on planar buffers
    let mut planar = vec![Vec::with_capacity(input_frames); channels];
    for frame in audio.samples().chunks_exact(channels) {
        for (ch, sample) in frame.iter().enumerate() {
            planar[ch].push(*sample);
        }
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, input_frames, channels)?;
    let output = resampler.process(&planar, None)?;

    let output_frames = output.first().map_or(0, Vec::len);
    let mut interleaved = Vec::with_capacity(output_frames * channels);
    for frame_idx in 0..output_frames {
        for channel in &output {
            interleaved.push(channel[frame_idx]);
        }
    }

    Ok(AudioArc::new(interleaved, target_sample_rate, audio.channels))
}
