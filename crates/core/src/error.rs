use looma_decode::SampleError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The output device could not be opened. Every audio feature is
    /// unavailable for the rest of the process.
    #[error("audio session unavailable: {0}")]
    SessionUnavailable(String),

    #[error("invalid frequency: base {base} Hz, beat {beat} Hz")]
    InvalidFrequency { base: f32, beat: f32 },

    #[error("tone source already started")]
    AlreadyStarted,

    #[error("tone source already stopped")]
    AlreadyStopped,

    #[error("sample '{asset_id}' unavailable: {source}")]
    Sample {
        asset_id: String,
        #[source]
        source: SampleError,
    },

    #[error("device error: {0}")]
    Device(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
