//! Sample asset addressing, fetching and decoding.
//!
//! Assets are addressed by a stable id that resolves to
//! `<root>/<asset_id>.<ext>`. Fetching goes through the [`AssetFetcher`] seam
//! so the engine never cares where bytes come from; decoding is done by
//! symphonia from memory.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use looma_transport::AudioArc;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::debug;

pub const DEFAULT_SAMPLES_ROOT: &str = "samples";
pub const DEFAULT_EXTENSION: &str = "mp3";

/// Where an asset lives once its id has been resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetLocation {
    pub asset_id: String,
    pub path: PathBuf,
}

impl AssetLocation {
    pub fn extension(&self) -> Option<&str> {
        self.path.extension().and_then(|e| e.to_str())
    }
}

/// Resolve an asset id to `<root>/<asset_id>.<extension>`.
/// Existence is not checked; a missing file surfaces as a [`FetchError`].
pub fn resolve_asset(root: &Path, asset_id: &str, extension: &str) -> AssetLocation {
    AssetLocation {
        asset_id: asset_id.to_string(),
        path: root.join(format!("{asset_id}.{extension}")),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("asset '{asset_id}' not found at {}", path.display())]
    NotFound { asset_id: String, path: PathBuf },

    #[error("failed to read asset '{asset_id}': {source}")]
    Io {
        asset_id: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed or unsupported audio: {0}")]
    Format(#[from] SymphoniaError),

    #[error("no decodable audio track")]
    NoTrack,

    #[error("failed to resample decoded audio: {0}")]
    Resample(#[source] anyhow::Error),

    #[error("decode task aborted: {0}")]
    Aborted(String),
}

/// Why a sample could not become playable.
#[derive(Debug, thiserror::Error)]
pub enum SampleError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Coarse failure category reported to presentation collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadFailureKind {
    Fetch,
    Decode,
}

impl SampleError {
    pub fn kind(&self) -> LoadFailureKind {
        match self {
            SampleError::Fetch(_) => LoadFailureKind::Fetch,
            SampleError::Decode(_) => LoadFailureKind::Decode,
        }
    }
}

/// Retrieves the encoded bytes of an asset.
#[async_trait::async_trait]
pub trait AssetFetcher: Send + Sync {
    async fn fetch(&self, location: &AssetLocation) -> Result<Vec<u8>, FetchError>;
}

/// Reads assets from the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsFetcher;

#[async_trait::async_trait]
impl AssetFetcher for FsFetcher {
    async fn fetch(&self, location: &AssetLocation) -> Result<Vec<u8>, FetchError> {
        tokio::fs::read(&location.path).await.map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                FetchError::NotFound {
                    asset_id: location.asset_id.clone(),
                    path: location.path.clone(),
                }
            } else {
                FetchError::Io {
                    asset_id: location.asset_id.clone(),
                    source,
                }
            }
        })
    }
}

/// Decode an in-memory encoded asset into interleaved `f32` samples.
pub fn decode_bytes(bytes: Vec<u8>, extension: Option<&str>) -> Result<AudioArc, DecodeError> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;

    let mut format = probed.format;
    let track = format.default_track().ok_or(DecodeError::NoTrack)?;

    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(44100);
    let mut channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(2) as u16;

    let mut decoder =
        symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut samples = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => return Err(e.into()),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = decoder.decode(&packet)?;
        let spec = *decoded.spec();
        sample_rate = spec.rate;
        channels = spec.channels.count() as u16;

        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buffer.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buffer.samples());
    }

    if channels == 0 {
        return Err(DecodeError::NoTrack);
    }

    debug!(
        frames = samples.len() / channels as usize,
        sample_rate, channels, "decoded asset"
    );

    Ok(AudioArc::new(samples, sample_rate, channels))
}

/// Fetch, decode and resample an asset to the session's output rate.
///
/// Decoding and resampling run on the blocking pool so the caller's task
/// only suspends.
pub async fn load_asset(
    fetcher: &dyn AssetFetcher,
    location: &AssetLocation,
    target_sample_rate: u32,
) -> Result<AudioArc, SampleError> {
    let bytes = fetcher.fetch(location).await?;
    let extension = location.extension().map(str::to_string);

    let audio = tokio::task::spawn_blocking(move || {
        let audio = decode_bytes(bytes, extension.as_deref())?;
        audio
            .resample(target_sample_rate)
            .map_err(DecodeError::Resample)
    })
    .await
    .map_err(|e| DecodeError::Aborted(e.to_string()))??;

    Ok(audio)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_tone(path: &Path, sample_rate: u32, channels: u16, frames: usize) {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).expect("create wav");
        for i in 0..frames {
            let t = i as f32 / sample_rate as f32;
            let value = ((2.0 * std::f32::consts::PI * 220.0 * t).sin() * 0.5 * i16::MAX as f32) as i16;
            for _ in 0..channels {
                writer.write_sample(value).expect("write sample");
            }
        }
        writer.finalize().expect("finalize wav");
    }

    #[test]
    fn test_resolve_asset_by_convention() {
        let location = resolve_asset(Path::new("samples"), "vinyl", "mp3");
        assert_eq!(location.path, PathBuf::from("samples/vinyl.mp3"));
        assert_eq!(location.asset_id, "vinyl");
        assert_eq!(location.extension(), Some("mp3"));
    }

    #[test]
    fn test_decode_wav_bytes() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("pad.wav");
        write_tone(&path, 44100, 2, 4410);

        let bytes = std::fs::read(&path).expect("read wav");
        let audio = decode_bytes(bytes, Some("wav")).expect("decode");

        assert_eq!(audio.sample_rate(), 44100);
        assert_eq!(audio.channels(), 2);
        assert_eq!(audio.frames(), 4410);
    }

    #[test]
    fn test_decode_garbage_is_decode_error() {
        let result = decode_bytes(b"definitely not audio".to_vec(), Some("mp3"));
        assert!(matches!(result, Err(DecodeError::Format(_))));
    }

    #[tokio::test]
    async fn test_fs_fetcher_missing_file() {
        let dir = tempdir().expect("tempdir");
        let location = resolve_asset(dir.path(), "rain", "wav");

        let err = FsFetcher.fetch(&location).await.unwrap_err();
        assert!(matches!(err, FetchError::NotFound { ref asset_id, .. } if asset_id == "rain"));
    }

    #[tokio::test]
    async fn test_load_asset_resamples_to_session_rate() {
        let dir = tempdir().expect("tempdir");
        write_tone(&dir.path().join("drums1.wav"), 44100, 1, 4410);
        let location = resolve_asset(dir.path(), "drums1", "wav");

        let audio = load_asset(&FsFetcher, &location, 48000).await.expect("load");

        assert_eq!(audio.sample_rate(), 48000);
        assert_eq!(audio.channels(), 1);
        let expected = 4800i64;
        assert!((audio.frames() as i64 - expected).abs() <= expected * 3 / 100);
    }

    #[tokio::test]
    async fn test_load_asset_reports_failure_kind() {
        let dir = tempdir().expect("tempdir");
        std::fs::write(dir.path().join("broken.wav"), b"RIFF garbage").expect("write");

        let missing = load_asset(&FsFetcher, &resolve_asset(dir.path(), "gone", "wav"), 48000)
            .await
            .unwrap_err();
        assert_eq!(missing.kind(), LoadFailureKind::Fetch);

        let broken = load_asset(&FsFetcher, &resolve_asset(dir.path(), "broken", "wav"), 48000)
            .await
            .unwrap_err();
        assert_eq!(broken.kind(), LoadFailureKind::Decode);
    }
}
