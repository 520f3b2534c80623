use basedrop::{Collector, Handle, Shared};
use cpal::{
    FromSample, SizedSample,
    traits::{DeviceTrait, HostTrait, StreamTrait},
};
use looma_transport::{AudioArc, Command, NodeId, PlayerSpec, Status};
use tracing::{debug, error, info};

use crate::AudioDevice;
use crate::graph::{Graph, write_frame};

struct PlayerSlot {
    id: NodeId,
    audio: Shared<AudioArc>,
    gain: f32,
    looped: bool,
}

/// Everything the control side sends to the audio thread. Players share the
/// ring with commands so a `Start` can never overtake the player it targets.
enum Message {
    Command(Command),
    AddPlayer(PlayerSlot),
}

/// Apply every pending message to the graph, in send order.
fn apply_pending(graph: &mut Graph, rx: &mut rtrb::Consumer<Message>) {
    while let Ok(message) = rx.pop() {
        match message {
            Message::Command(command) => graph.apply(command),
            Message::AddPlayer(slot) => {
                graph.add_player(slot.id, slot.audio, slot.gain, slot.looped)
            }
        }
    }
}

/// The hardware output session backed by a cpal stream.
///
/// Commands and decoded buffers cross to the audio thread through one
/// lock-free ring; buffers are wrapped in `basedrop::Shared` so the audio thread never
/// frees memory. Released buffers are reclaimed whenever the control side
/// touches the device.
pub struct CpalDevice {
    messages: rtrb::Producer<Message>,
    status: rtrb::Consumer<Status>,
    collector: Collector,
    handle: Handle,
    sample_rate: u32,
    channels: u16,
    running: bool,
    stream: cpal::Stream,
}

/// Open the default output device.
///
/// The stream is paused right after creation so audio only flows after an
/// explicit resume. Hosts that cannot pause report the session as running.
pub fn open(command_capacity: usize) -> anyhow::Result<CpalDevice> {
    let collector = Collector::new();
    let handle = collector.handle();

    let (message_tx, message_rx) = rtrb::RingBuffer::<Message>::new(command_capacity);
    let (status_tx, status_rx) = rtrb::RingBuffer::<Status>::new(command_capacity);

    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| anyhow::anyhow!("no output device found"))?;

    let config = device.default_output_config()?;
    let sample_rate = config.sample_rate().0;
    let channels = config.channels();

    let graph = Graph::new(sample_rate, command_capacity);

    let stream = match config.sample_format() {
        cpal::SampleFormat::F32 => build_stream::<f32>(
            &device,
            &config.into(),
            graph,
            message_rx,
            status_tx,
        )?,
        cpal::SampleFormat::I16 => build_stream::<i16>(
            &device,
            &config.into(),
            graph,
            message_rx,
            status_tx,
        )?,
        sample_format => anyhow::bail!("unsupported sample format '{sample_format}'"),
    };

    let running = match stream.pause() {
        Ok(()) => false,
        Err(e) => {
            debug!("host cannot pause a fresh stream, session starts running: {e}");
            stream.play()?;
            true
        }
    };

    info!(sample_rate, channels, running, "opened output device");

    Ok(CpalDevice {
        messages: message_tx,
        status: status_rx,
        collector,
        handle,
        sample_rate,
        channels,
        running,
        stream,
    })
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut graph: Graph,
    mut message_rx: rtrb::Consumer<Message>,
    mut status_tx: rtrb::Producer<Status>,
) -> anyhow::Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let output_channels = config.channels as usize;

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            apply_pending(&mut graph, &mut message_rx);

            for frame in data.chunks_mut(output_channels) {
                // A full status ring leaves the end unreported; the graph retries it
                let (left, right) = graph.tick(|status| status_tx.push(status).is_ok());
                write_frame(frame, left, right, |v| T::from_sample(v));
            }
        },
        |err| error!("output stream error: {err}"),
        None,
    )?;

    Ok(stream)
}

impl AudioDevice for CpalDevice {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn resume(&mut self) -> anyhow::Result<()> {
        if !self.running {
            self.stream.play()?;
            self.running = true;
        }
        Ok(())
    }

    fn suspend(&mut self) -> anyhow::Result<()> {
        if self.running {
            self.stream.pause()?;
            self.running = false;
        }
        Ok(())
    }

    fn send(&mut self, command: Command) -> anyhow::Result<()> {
        self.collector.collect();
        self.messages
            .push(Message::Command(command))
            .map_err(|_| anyhow::anyhow!("command ring full, dropped {command:?}"))
    }

    fn add_player(&mut self, spec: PlayerSpec) -> anyhow::Result<()> {
        self.collector.collect();
        let slot = PlayerSlot {
            id: spec.id,
            audio: Shared::new(&self.handle, spec.audio),
            gain: spec.gain,
            looped: spec.looped,
        };
        self.messages
            .push(Message::AddPlayer(slot))
            .map_err(|_| anyhow::anyhow!("player ring full, dropped {}", spec.id))
    }

    fn drain_status(&mut self, out: &mut Vec<Status>) {
        while let Ok(status) = self.status.pop() {
            out.push(status);
        }
        self.collector.collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Lifecycle;
    use basedrop::Collector;

    fn slot(handle: &Handle, id: u64) -> Message {
        Message::AddPlayer(PlayerSlot {
            id: NodeId(id),
            audio: Shared::new(handle, AudioArc::new(vec![0.5; 64], 48000, 2)),
            gain: 0.8,
            looped: true,
        })
    }

    #[test]
    fn test_start_never_overtakes_its_player() {
        let collector = Collector::new();
        let (mut tx, mut rx) = rtrb::RingBuffer::<Message>::new(8);
        let mut graph = Graph::new(48000, 8);

        // The callback may drain between the player and its commands
        assert!(tx.push(slot(&collector.handle(), 1)).is_ok());
        apply_pending(&mut graph, &mut rx);
        assert!(tx.push(Message::Command(Command::Start { id: NodeId(1) })).is_ok());
        assert!(
            tx.push(Message::Command(Command::SetGain {
                id: NodeId(1),
                gain: 0.3,
            }))
            .is_ok()
        );
        apply_pending(&mut graph, &mut rx);

        let node = graph.snapshot()[0];
        assert_eq!(node.lifecycle, Lifecycle::Running);
        assert_eq!(node.gain, 0.3);
    }

    #[test]
    fn test_messages_apply_in_send_order() {
        let collector = Collector::new();
        let (mut tx, mut rx) = rtrb::RingBuffer::<Message>::new(8);
        let mut graph = Graph::new(48000, 8);

        assert!(tx.push(slot(&collector.handle(), 2)).is_ok());
        assert!(tx.push(Message::Command(Command::Start { id: NodeId(2) })).is_ok());
        apply_pending(&mut graph, &mut rx);

        let mut out = vec![0.0f32; 2 * 16];
        graph.render(&mut out, 2, |_| true);
        assert!(out.iter().all(|s| (*s - 0.4).abs() < 1e-6));
    }
}
