//! Plays each binaural preset on the default output device, then switches to
//! the lo-fi module and plays whatever pads are configured for it.
//!
//! `RUST_LOG=looma_core=trace cargo run -p looma_core --example binaural`

use std::time::Duration;

use looma_core::{BINAURAL_PRESETS, Engine, EngineConfig, EngineEvent, ModuleId};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("looma_core=debug,looma_engine=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = EngineConfig::load();
    let mut engine = Engine::new(config);

    engine.ensure_session()?;
    engine.select_module(ModuleId::Binaural)?;
    engine.set_master_volume(30.0)?;
    engine.play_pause(true)?;

    for preset in BINAURAL_PRESETS {
        info!(
            preset = preset.name,
            base = preset.base_hz,
            beat = preset.beat_hz,
            "{}",
            preset.description
        );
        engine.set_binaural_frequency(preset.base_hz, preset.beat_hz)?;
        tokio::time::sleep(Duration::from_secs(3)).await;
        engine.poll()?;
    }

    engine.select_module(ModuleId::Lofi)?;
    engine.wait_for_loads().await?;
    if engine.enabled_pads(ModuleId::Lofi).is_empty() {
        info!("no lo-fi pads configured");
    } else {
        tokio::time::sleep(Duration::from_secs(5)).await;
        engine.poll()?;
    }

    engine.play_pause(false)?;
    for event in engine.take_events() {
        if let EngineEvent::LoadFailed { asset_id, kind } = event {
            info!(asset = %asset_id, ?kind, "pad could not be loaded");
        }
    }
    Ok(())
}
