mod graph;
mod offline;
mod output;

use looma_transport::{Command, PlayerSpec, Status};

pub use graph::{Graph, Lifecycle, NodeKind, NodeSnapshot};
pub use offline::OfflineDevice;
pub use output::{CpalDevice, open};

/// Default size of the control → audio command ring.
pub const DEFAULT_COMMAND_CAPACITY: usize = 256;

/// An output device session: the one place audio leaves the process.
///
/// Implementations own the render graph (directly or across a thread
/// boundary) and accept commands for it. Run state only changes through
/// [`resume`](AudioDevice::resume) and [`suspend`](AudioDevice::suspend).
pub trait AudioDevice {
    fn sample_rate(&self) -> u32;

    fn channels(&self) -> u16;

    fn is_running(&self) -> bool;

    fn resume(&mut self) -> anyhow::Result<()>;

    fn suspend(&mut self) -> anyhow::Result<()>;

    fn send(&mut self, command: Command) -> anyhow::Result<()>;

    /// Hand a decoded buffer to the graph as a new, idle player node.
    fn add_player(&mut self, spec: PlayerSpec) -> anyhow::Result<()>;

    /// Move any pending notifications from the graph into `out`.
    fn drain_status(&mut self, out: &mut Vec<Status>);
}
