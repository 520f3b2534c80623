//! The render graph that runs on the audio thread.
//!
//! Each node is a generator (sine oscillator or buffer player) followed by its
//! own gain stage and, for oscillators, a stereo pan stage. All nodes sum into
//! a stereo bus. Nothing here allocates while rendering as long as the node
//! count stays under the capacity given at construction.

use std::f32::consts::{FRAC_PI_2, TAU};

use basedrop::Shared;
use looma_transport::{AudioArc, Command, NodeId, Status};

/// Equal-power gains for a mono signal at `pan` in [-1, 1].
fn pan_gains(pan: f32) -> (f32, f32) {
    let x = (pan.clamp(-1.0, 1.0) + 1.0) * 0.5;
    let left = (x * FRAC_PI_2).cos();
    let right = (x * FRAC_PI_2).sin();
    // cos(pi/2) is not exactly zero in f32
    (
        if left.abs() < 1e-6 { 0.0 } else { left },
        if right.abs() < 1e-6 { 0.0 } else { right },
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Idle,
    Running,
    Stopped,
}

enum Generator {
    Oscillator { frequency: f32, phase: f32 },
    Player {
        audio: Shared<AudioArc>,
        position: usize,
        looped: bool,
    },
}

struct Node {
    id: NodeId,
    generator: Generator,
    gain: f32,
    pan: Option<f32>,
    pan_gains: (f32, f32),
    lifecycle: Lifecycle,
    /// A player ended but the status sink had no room yet.
    unreported_end: bool,
}

impl Node {
    /// Produce one stereo frame, or `None` once a non-looping player runs out.
    fn next_frame(&mut self, sample_rate: f32) -> Option<(f32, f32)> {
        match &mut self.generator {
            Generator::Oscillator { frequency, phase } => {
                let value = (*phase * TAU).sin();
                *phase = (*phase + *frequency / sample_rate).fract();
                let (l, r) = self.pan_gains;
                Some((value * self.gain * l, value * self.gain * r))
            }
            Generator::Player {
                audio,
                position,
                looped,
            } => {
                let frames = audio.frames();
                if *position >= frames {
                    if *looped && frames > 0 {
                        *position = 0;
                    } else {
                        return None;
                    }
                }
                let frame = (audio.sample_at(*position, 0), audio.sample_at(*position, 1));
                *position += 1;
                Some((frame.0 * self.gain, frame.1 * self.gain))
            }
        }
    }
}

/// Read-only view of one node, used for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub kind: NodeKind,
    pub frequency: Option<f32>,
    pub gain: f32,
    pub pan: Option<f32>,
    pub lifecycle: Lifecycle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Oscillator,
    Player,
}

pub struct Graph {
    nodes: Vec<Node>,
    sample_rate: f32,
}

impl Graph {
    pub fn new(sample_rate: u32, capacity: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(capacity),
            sample_rate: sample_rate as f32,
        }
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    pub fn apply(&mut self, command: Command) {
        match command {
            Command::AddOscillator {
                id,
                frequency,
                gain,
                pan,
            } => self.nodes.push(Node {
                id,
                generator: Generator::Oscillator {
                    frequency,
                    phase: 0.0,
                },
                gain,
                pan: Some(pan),
                pan_gains: pan_gains(pan),
                lifecycle: Lifecycle::Idle,
                unreported_end: false,
            }),
            Command::Start { id } => {
                if let Some(node) = self.node_mut(id) {
                    if node.lifecycle == Lifecycle::Idle {
                        node.lifecycle = Lifecycle::Running;
                    }
                }
            }
            Command::Stop { id } => {
                if let Some(node) = self.node_mut(id) {
                    node.lifecycle = Lifecycle::Stopped;
                }
            }
            Command::SetFrequency { id, frequency } => {
                if let Some(Node {
                    generator: Generator::Oscillator { frequency: f, .. },
                    ..
                }) = self.node_mut(id)
                {
                    *f = frequency;
                }
            }
            Command::SetGain { id, gain } => {
                if let Some(node) = self.node_mut(id) {
                    node.gain = gain;
                }
            }
            Command::Release { id } => {
                if let Some(idx) = self.nodes.iter().position(|n| n.id == id) {
                    // Dropping the node's Shared buffer defers the free to the collector
                    self.nodes.swap_remove(idx);
                }
            }
        }
    }

    pub fn add_player(&mut self, id: NodeId, audio: Shared<AudioArc>, gain: f32, looped: bool) {
        self.nodes.push(Node {
            id,
            generator: Generator::Player {
                audio,
                position: 0,
                looped,
            },
            gain,
            pan: None,
            pan_gains: (1.0, 1.0),
            lifecycle: Lifecycle::Idle,
            unreported_end: false,
        });
    }

    /// Mix one stereo frame from every running node.
    ///
    /// `on_status` returns whether the status was accepted. A rejected
    /// `Ended` is offered again on every later tick until it is taken.
    pub fn tick(&mut self, mut on_status: impl FnMut(Status) -> bool) -> (f32, f32) {
        let mut left = 0.0;
        let mut right = 0.0;
        for node in self.nodes.iter_mut() {
            if node.unreported_end {
                node.unreported_end = !on_status(Status::Ended { id: node.id });
            }
            if node.lifecycle != Lifecycle::Running {
                continue;
            }
            match node.next_frame(self.sample_rate) {
                Some((l, r)) => {
                    left += l;
                    right += r;
                }
                None => {
                    node.lifecycle = Lifecycle::Stopped;
                    node.unreported_end = !on_status(Status::Ended { id: node.id });
                }
            }
        }
        (left, right)
    }

    /// Render interleaved frames for a device with `channels` outputs.
    ///
    /// Channel 0 is left and channel 1 right; a mono device gets the sum.
    pub fn render(
        &mut self,
        data: &mut [f32],
        channels: usize,
        mut on_status: impl FnMut(Status) -> bool,
    ) {
        for frame in data.chunks_mut(channels) {
            let (left, right) = self.tick(&mut on_status);
            write_frame(frame, left, right, |v| v);
        }
    }

    pub fn snapshot(&self) -> Vec<NodeSnapshot> {
        self.nodes
            .iter()
            .map(|node| NodeSnapshot {
                id: node.id,
                kind: match node.generator {
                    Generator::Oscillator { .. } => NodeKind::Oscillator,
                    Generator::Player { .. } => NodeKind::Player,
                },
                frequency: match node.generator {
                    Generator::Oscillator { frequency, .. } => Some(frequency),
                    Generator::Player { .. } => None,
                },
                gain: node.gain,
                pan: node.pan,
                lifecycle: node.lifecycle,
            })
            .collect()
    }
}

/// Spread a stereo frame over a device frame of any width.
pub(crate) fn write_frame<T>(frame: &mut [T], left: f32, right: f32, convert: impl Fn(f32) -> T) {
    match frame.len() {
        0 => {}
        1 => frame[0] = convert(left + right),
        _ => {
            for (ch, sample) in frame.iter_mut().enumerate() {
                *sample = convert(match ch {
                    0 => left,
                    1 => right,
                    _ => 0.0,
                });
            }
        }
    }
}
