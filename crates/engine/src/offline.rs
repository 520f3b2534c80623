use std::sync::{Arc, Mutex, MutexGuard};

use basedrop::{Collector, Shared};
use looma_transport::{Command, NodeId, PlayerSpec, Status};

use crate::AudioDevice;
use crate::graph::{Graph, NodeSnapshot};

struct OfflineState {
    graph: Graph,
    collector: Collector,
    running: bool,
    status: Vec<Status>,
    sent: Vec<Command>,
}

/// A device that renders on demand instead of on a hardware clock.
///
/// Commands are applied to the graph immediately. Clones share the same graph,
/// so a caller can hand one clone to the engine and keep another to render
/// frames and inspect nodes. Like a browser audio context created without a
/// gesture, it starts suspended.
#[derive(Clone)]
pub struct OfflineDevice {
    state: Arc<Mutex<OfflineState>>,
    sample_rate: u32,
}

impl OfflineDevice {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(OfflineState {
                graph: Graph::new(sample_rate, 64),
                collector: Collector::new(),
                running: false,
                status: Vec::new(),
                sent: Vec::new(),
            })),
            sample_rate,
        }
    }

    /// Same as [`new`](Self::new) but already running.
    pub fn running(sample_rate: u32) -> Self {
        let device = Self::new(sample_rate);
        device.lock().running = true;
        device
    }

    fn lock(&self) -> MutexGuard<'_, OfflineState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Render `frames` stereo frames. A suspended device yields silence and
    /// does not advance any node.
    pub fn render(&self, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0; frames * 2];
        let mut state = self.lock();
        if state.running {
            let OfflineState { graph, status, .. } = &mut *state;
            graph.render(&mut out, 2, |s| {
                status.push(s);
                true
            });
        }
        state.collector.collect();
        out
    }

    pub fn nodes(&self) -> Vec<NodeSnapshot> {
        self.lock().graph.snapshot()
    }

    pub fn node(&self, id: NodeId) -> Option<NodeSnapshot> {
        self.nodes().into_iter().find(|n| n.id == id)
    }

    /// Every command received so far, in order.
    pub fn sent(&self) -> Vec<Command> {
        self.lock().sent.clone()
    }
}

impl AudioDevice for OfflineDevice {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        2
    }

    fn is_running(&self) -> bool {
        self.lock().running
    }

    fn resume(&mut self) -> anyhow::Result<()> {
        self.lock().running = true;
        Ok(())
    }

    fn suspend(&mut self) -> anyhow::Result<()> {
        self.lock().running = false;
        Ok(())
    }

    fn send(&mut self, command: Command) -> anyhow::Result<()> {
        let mut state = self.lock();
        state.sent.push(command);
        state.graph.apply(command);
        Ok(())
    }

    fn add_player(&mut self, spec: PlayerSpec) -> anyhow::Result<()> {
        let mut state = self.lock();
        let audio = Shared::new(&state.collector.handle(), spec.audio);
        state.graph.add_player(spec.id, audio, spec.gain, spec.looped);
        Ok(())
    }

    fn drain_status(&mut self, out: &mut Vec<Status>) {
        out.append(&mut self.lock().status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Lifecycle;
    use looma_transport::AudioArc;

    #[test]
    fn test_starts_suspended_and_renders_silence() {
        let mut device = OfflineDevice::new(48000);
        assert!(!device.is_running());

        device
            .send(Command::AddOscillator {
                id: NodeId(1),
                frequency: 220.0,
                gain: 1.0,
                pan: -1.0,
            })
            .unwrap();
        device.send(Command::Start { id: NodeId(1) }).unwrap();

        assert!(device.render(128).iter().all(|s| *s == 0.0));
        device.resume().unwrap();
        assert!(device.render(128).iter().any(|s| *s != 0.0));
    }

    #[test]
    fn test_clones_share_graph() {
        let mut device = OfflineDevice::running(48000);
        let observer = device.clone();

        device
            .add_player(PlayerSpec {
                id: NodeId(9),
                audio: AudioArc::new(vec![0.1; 8], 48000, 2),
                gain: 0.5,
                looped: false,
            })
            .unwrap();
        device.send(Command::Start { id: NodeId(9) }).unwrap();

        let node = observer.node(NodeId(9)).expect("player node");
        assert_eq!(node.lifecycle, Lifecycle::Running);
        assert_eq!(observer.sent(), vec![Command::Start { id: NodeId(9) }]);

        observer.render(16);
        let mut status = Vec::new();
        device.drain_status(&mut status);
        assert_eq!(status, vec![Status::Ended { id: NodeId(9) }]);
    }
}
