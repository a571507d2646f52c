//! Application entry point.

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::EngineConfig;
use crate::renderer::Renderer;
use crate::VulkanEngine;

/// Install the fmt subscriber, filtered by `RUST_LOG` (default `info`).
///
/// Does nothing if a subscriber is already installed.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init();
}

/// Run `renderer` in a new window until it is closed.
///
/// Initializes logging, brings the engine up, runs the loop, and always
/// cleans up, even when init or a frame fails.
pub fn run_engine<R: Renderer + 'static>(config: EngineConfig, renderer: R) -> anyhow::Result<()> {
    init_logging();
    info!("{} starting...", config.title);

    let mut engine = VulkanEngine::new(config);
    engine.set_renderer(renderer)?;

    let result = engine.init().and_then(|()| engine.run());
    engine.cleanup();

    Ok(result?)
}
