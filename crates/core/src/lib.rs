pub mod bus;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod modules;
pub mod sample;
pub mod sources;
pub mod tone;
pub mod transport;

pub use bus::{MixingBus, SessionState};
pub use config::{BinauralSettings, EngineConfig};
pub use engine::Engine;
pub use error::{EngineError, Result};
pub use events::EngineEvent;
pub use modules::{BINAURAL_PRESETS, BinauralPreset, ModuleDescriptor, ModuleId, ModuleSelector, UnknownModule};
pub use sample::SampleSource;
pub use sources::{Source, SourceIndex, SourceKey};
pub use tone::{ToneSource, ToneState};
pub use transport::TransportState;

pub use looma_decode::{AssetFetcher, AssetLocation, FetchError, FsFetcher, LoadFailureKind, SampleError};
pub use looma_engine::{AudioDevice, OfflineDevice};
pub use looma_transport::{AudioArc, NodeId};
