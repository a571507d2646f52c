//! Engine error types.

use thiserror::Error;
use vkviz_gpu::GpuError;
use vkviz_platform::PlatformError;

/// Engine errors.
#[derive(Error, Debug)]
pub enum EngineError {
    /// A setup entry point was called after `init`.
    #[error("Engine is already initialized")]
    AlreadyInitialized,

    /// A frame-loop entry point was called before `init`.
    #[error("Engine is not initialized")]
    NotInitialized,

    /// `run` was entered while the loop is already active.
    #[error("Run loop is already active")]
    RunLoopActive,

    /// `init` was called without a renderer.
    #[error("No renderer set")]
    RendererNotSet,

    /// The negotiated renderer capabilities cannot be satisfied.
    #[error("Invalid renderer capabilities: {0}")]
    Capabilities(String),

    #[error("GPU error: {0}")]
    Gpu(#[from] GpuError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("UI overlay initialization failed: {0}")]
    UiInit(anyhow::Error),

    /// A renderer or UI callback failed.
    #[error("Renderer error: {0}")]
    Renderer(anyhow::Error),
}

/// Result type alias.
pub type EngineResult<T> = std::result::Result<T, EngineError>;
