/// Clamp a source gain to 0.0..=1.0. NaN is treated as silence.
pub(crate) fn clamp_gain(volume: f32) -> f32 {
    if volume.is_nan() {
        0.0
    } else {
        volume.clamp(0.0, 1.0)
    }
}

fn clamp_master(volume: f32) -> f32 {
    if volume.is_nan() {
        0.0
    } else {
        volume.clamp(0.0, 100.0)
    }
}

/// Global play state and master volume.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransportState {
    pub is_playing: bool,
    /// 0 to 100.
    pub master_volume: f32,
}

impl TransportState {
    pub fn new(master_volume: f32) -> Self {
        Self {
            is_playing: false,
            master_volume: clamp_master(master_volume),
        }
    }

    /// Volume handed to sources, 0.0 to 1.0.
    pub fn normalized_volume(&self) -> f32 {
        self.master_volume / 100.0
    }

    pub(crate) fn set_master_volume(&mut self, volume: f32) {
        self.master_volume = clamp_master(volume);
    }
}

impl Default for TransportState {
    fn default() -> Self {
        Self::new(80.0)
    }
}
