//! The mixing bus: sole owner of the output device session.
//!
//! Sources never talk to the device directly. They allocate node ids and push
//! commands through the bus, and only the bus changes the session's run state.

use looma_engine::AudioDevice;
use looma_transport::{Command, NodeId, PlayerSpec, Status};
use tracing::{error, info};

use crate::error::{EngineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Suspended,
    Running,
}

pub type DeviceFactory = Box<dyn FnMut() -> anyhow::Result<Box<dyn AudioDevice>>>;

pub struct MixingBus {
    factory: DeviceFactory,
    device: Option<Box<dyn AudioDevice>>,
    /// Set once if the factory fails; the session is never retried.
    failure: Option<String>,
    next_node: u64,
}

impl MixingBus {
    pub fn new(factory: impl FnMut() -> anyhow::Result<Box<dyn AudioDevice>> + 'static) -> Self {
        Self {
            factory: Box::new(factory),
            device: None,
            failure: None,
            next_node: 1,
        }
    }

    /// A bus that opens the default hardware output on first use.
    pub fn with_default_output(command_capacity: usize) -> Self {
        Self::new(move || {
            let device = looma_engine::open(command_capacity)?;
            Ok(Box::new(device) as Box<dyn AudioDevice>)
        })
    }

    pub fn state(&self) -> SessionState {
        match &self.device {
            None => SessionState::Uninitialized,
            Some(device) if device.is_running() => SessionState::Running,
            Some(_) => SessionState::Suspended,
        }
    }

    /// Create the session on first call; later calls return the current
    /// state. Must only be triggered by a user gesture.
    pub fn ensure_session(&mut self) -> Result<SessionState> {
        if let Some(reason) = &self.failure {
            return Err(EngineError::SessionUnavailable(reason.clone()));
        }
        if self.device.is_none() {
            match (self.factory)() {
                Ok(device) => {
                    info!(
                        sample_rate = device.sample_rate(),
                        channels = device.channels(),
                        running = device.is_running(),
                        "audio session created"
                    );
                    self.device = Some(device);
                }
                Err(e) => {
                    error!("failed to create audio session: {e:#}");
                    let reason = format!("{e:#}");
                    self.failure = Some(reason.clone());
                    return Err(EngineError::SessionUnavailable(reason));
                }
            }
        }
        Ok(self.state())
    }

    fn device_mut(&mut self) -> Result<&mut Box<dyn AudioDevice>> {
        match &mut self.device {
            Some(device) => Ok(device),
            None => Err(EngineError::SessionUnavailable(
                self.failure
                    .clone()
                    .unwrap_or_else(|| "session not created yet".to_string()),
            )),
        }
    }

    pub fn resume(&mut self) -> Result<()> {
        let device = self.device_mut()?;
        if !device.is_running() {
            device.resume()?;
            info!("audio session resumed");
        }
        Ok(())
    }

    pub fn suspend(&mut self) -> Result<()> {
        let device = self.device_mut()?;
        if device.is_running() {
            device.suspend()?;
            info!("audio session suspended");
        }
        Ok(())
    }

    pub fn sample_rate(&self) -> Option<u32> {
        self.device.as_ref().map(|d| d.sample_rate())
    }

    pub(crate) fn allocate(&mut self) -> NodeId {
        let id = NodeId(self.next_node);
        self.next_node += 1;
        id
    }

    pub(crate) fn send(&mut self, command: Command) -> Result<()> {
        self.device_mut()?.send(command)?;
        Ok(())
    }

    pub(crate) fn add_player(&mut self, spec: PlayerSpec) -> Result<()> {
        self.device_mut()?.add_player(spec)?;
        Ok(())
    }

    pub(crate) fn drain_status(&mut self) -> Vec<Status> {
        let mut out = Vec::new();
        if let Some(device) = &mut self.device {
            device.drain_status(&mut out);
        }
        out
    }
}
