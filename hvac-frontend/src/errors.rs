use hvac_config::ConfigError;
use hvac_core::errors::CoreError;
use hvac_engine::errors::EngineError;
use hvac_io::IoError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrontendError {
    #[error("视口配置无效: {0}")]
    Viewport(#[from] CoreError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Io(#[from] IoError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
