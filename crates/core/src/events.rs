use looma_decode::LoadFailureKind;

use crate::bus::SessionState;
use crate::modules::ModuleId;
use crate::sources::SourceKey;

/// Notifications for presentation collaborators, drained with
/// [`Engine::take_events`](crate::Engine::take_events).
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    SessionChanged(SessionState),
    SourceRunning {
        module: ModuleId,
        source: SourceKey,
        running: bool,
    },
    LoadFailed {
        asset_id: String,
        kind: LoadFailureKind,
    },
    ModuleChanged {
        from: ModuleId,
        to: ModuleId,
    },
}
