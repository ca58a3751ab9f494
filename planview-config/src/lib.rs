use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// 指定配置文件路径的环境变量。
pub const CONFIG_ENV: &str = "PLANVIEW_CONFIG";

/// 应用配置的根结构。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub converter: ConverterConfig,
}

impl AppConfig {
    /// 从显式路径加载配置。
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

    /// 自动发现配置文件：优先读取环境变量 `PLANVIEW_CONFIG`，否则寻找 `./config/default.toml`。
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

    fn validate(&self) -> Result<(), ConfigError> {
        let render = &self.render;
        if !(render.box_below <= render.detailed_from && render.detailed_from <= render.text_from)
        {
            return Err(ConfigError::Invalid(format!(
                "render 阈值需满足 box_below <= detailed_from <= text_from（当前 {} / {} / {}）",
                render.box_below, render.detailed_from, render.text_from
            )));
        }
        if render.decimate_step == 0 {
            return Err(ConfigError::Invalid("render.decimate_step 不能为 0".to_string()));
        }
        if self.extraction.max_depth == 0 && self.extraction.expand_blocks {
            return Err(ConfigError::Invalid(
                "extraction.max_depth 为 0 时应关闭 expand_blocks".to_string(),
            ));
        }
        Ok(())
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

/// 图元展开的上限与开关。
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub limit: Option<usize>,
    pub expand_blocks: bool,
    pub max_block_repeats: usize,
    pub max_total_after_blocks: usize,
    pub max_depth: usize,
    pub include_text: bool,
    pub include_hatch: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            limit: None,
            expand_blocks: true,
            max_block_repeats: 8_000,
            max_total_after_blocks: 250_000,
            max_depth: 8,
            include_text: true,
            include_hatch: true,
        }
    }
}

/// 细节层级阈值（以视图比例计）与简化开关。
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub box_below: f64,
    pub detailed_from: f64,
    pub text_from: f64,
    pub width_boost_above: f64,
    pub decimate_below: f64,
    pub decimate_min_vertices: usize,
    pub decimate_step: usize,
    pub simplify: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            box_below: 0.03,
            detailed_from: 0.12,
            text_from: 0.35,
            width_boost_above: 0.6,
            decimate_below: 0.5,
            decimate_min_vertices: 400,
            decimate_step: 3,
            simplify: false,
        }
    }
}

/// DWG 转换程序设置。
#[derive(Debug, Clone, Deserialize)]
pub struct ConverterConfig {
    #[serde(default)]
    pub executable: Option<PathBuf>,
    /// 为空时使用内建的常见安装目录。
    #[serde(default)]
    pub search_roots: Vec<PathBuf>,
    #[serde(default)]
    pub versions: Vec<String>,
    #[serde(default = "ConverterConfig::default_timeout")]
    pub timeout_secs: u64,
}

impl ConverterConfig {
    fn default_timeout() -> u64 {
        120
    }
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            executable: None,
            search_roots: Vec::new(),
            versions: Vec::new(),
            timeout_secs: Self::default_timeout(),
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
    #[error("配置无效: {0}")]
    Invalid(String),
    #[error("{message}")]
    Context {
        message: String,
        #[source]
        source: std::io::Error,
    },
}
