use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// 指定配置文件路径的环境变量。
pub const CONFIG_ENV: &str = "HVAC_CONFIG";

/// 应用配置的根结构。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub viewport: ViewportConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl AppConfig {
    /// 从显式路径加载配置并校验取值。
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// 自动发现配置文件：优先读取环境变量 `HVAC_CONFIG`，否则寻找 `./config/default.toml`。
    /// 若文件缺失，则返回默认配置。
    pub fn discover() -> Result<Self, ConfigError> {
        if let Some(path) = env::var_os(CONFIG_ENV) {
            return Self::from_file(PathBuf::from(path));
        }

        let default_path = env::current_dir()
            .map(|dir| dir.join("config").join("default.toml"))
            .map_err(|source| ConfigError::Context {
                message: "获取当前工作目录失败".to_string(),
                source,
            })?;

        if default_path.exists() {
            Self::from_file(default_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.viewport.validate()?;
        self.storage.validate()
    }
}

/// 日志配置，支持设置默认等级。
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

/// 视口与文档度量：缩放范围、DPI、显示区与文档尺寸。
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct ViewportConfig {
    pub min_zoom: f64,
    pub max_zoom: f64,
    pub zoom_step: f64,
    pub display_dpi: f64,
    pub document_dpi: f64,
    pub display_width: f64,
    pub display_height: f64,
    pub document_width: f64,
    pub document_height: f64,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            min_zoom: 0.25,
            max_zoom: 4.0,
            zoom_step: 0.25,
            display_dpi: 96.0,
            document_dpi: 96.0,
            display_width: 1280.0,
            display_height: 720.0,
            document_width: 2400.0,
            document_height: 1600.0,
        }
    }
}

impl ViewportConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("viewport.min_zoom", self.min_zoom),
            ("viewport.zoom_step", self.zoom_step),
            ("viewport.display_dpi", self.display_dpi),
            ("viewport.document_dpi", self.document_dpi),
        ];
        for (field, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::invalid(field, format!("必须为正数，实际为 {value}")));
            }
        }
        let sizes = [
            ("viewport.display_width", self.display_width),
            ("viewport.display_height", self.display_height),
            ("viewport.document_width", self.document_width),
            ("viewport.document_height", self.document_height),
        ];
        for (field, value) in sizes {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::invalid(field, format!("必须为非负数，实际为 {value}")));
            }
        }
        if !self.max_zoom.is_finite() || self.max_zoom < self.min_zoom {
            return Err(ConfigError::invalid(
                "viewport.max_zoom",
                format!("不能小于 min_zoom ({})", self.min_zoom),
            ));
        }
        Ok(())
    }
}

/// 本地键值存储配置。
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub root: Option<PathBuf>,
    #[serde(default = "StorageConfig::default_drawing_key")]
    pub drawing_key: String,
}

impl StorageConfig {
    fn default_drawing_key() -> String {
        "drawing".to_string()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid = !self.drawing_key.is_empty()
            && self
                .drawing_key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if valid {
            Ok(())
        } else {
            Err(ConfigError::invalid(
                "storage.drawing_key",
                format!("`{}` 只能包含字母、数字、`_` 与 `-`", self.drawing_key),
            ))
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: None,
            drawing_key: Self::default_drawing_key(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件 {path:?} 失败: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("解析配置文件 {path:?} 失败: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("{message}")]
    Context {
        message: String,
        #[source]
        source: std::io::Error,
    },
    #[error("配置项 {field} 非法: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: String) -> Self {
        Self::Invalid { field, reason }
    }
}
