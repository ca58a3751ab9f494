use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use planview_config::{AppConfig, ConfigError};
use planview_frontend::RenderRequest;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

/// DXF/DWG 平面图图元提取与预览。
#[derive(Debug, Parser)]
#[command(name = "planview", version)]
struct Cli {
    /// 配置文件路径，缺省时读取 PLANVIEW_CONFIG 或 ./config/default.toml。
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// 输出图层、实体类型与范围概要。
    Info { file: PathBuf },
    /// 展开图元并输出统计。
    Extract {
        file: PathBuf,
        /// 把完整图元列表写为 JSON。
        #[arg(long)]
        json: Option<PathBuf>,
    },
    /// 按细节层级策略输出 SVG。
    Render {
        file: PathBuf,
        #[arg(long)]
        svg: PathBuf,
        /// 每模型单位像素数，缺省时缩放到全图。
        #[arg(long)]
        scale: Option<f64>,
        #[arg(long, default_value_t = 1280.0)]
        width: f64,
        #[arg(long, default_value_t = 800.0)]
        height: f64,
        /// 启用折线抽稀。
        #[arg(long)]
        simplify: bool,
        /// 隐藏的图层，可重复。
        #[arg(long = "hide-layer")]
        hide_layers: Vec<String>,
    },
    /// 列出各比例下的细节层级。
    Lod {
        file: PathBuf,
        #[arg(long = "scale", num_args = 1..)]
        scales: Vec<f64>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_configuration(cli.config.as_deref())?;
    init_logging(&config);
    info!("启动 planview");

    let output = match &cli.command {
        Command::Info { file } => planview_frontend::run_info(file, &config)
            .with_context(|| format!("读取 {} 失败", file.display()))?,
        Command::Extract { file, json } => {
            planview_frontend::run_extract(file, &config, json.as_deref())
                .with_context(|| format!("展开 {} 失败", file.display()))?
        }
        Command::Render {
            file,
            svg,
            scale,
            width,
            height,
            simplify,
            hide_layers,
        } => {
            let request = RenderRequest {
                output: svg.clone(),
                scale: *scale,
                width: *width,
                height: *height,
                simplify: *simplify || config.render.simplify,
                hidden_layers: hide_layers.clone(),
            };
            planview_frontend::run_render(file, &config, &request)
                .with_context(|| format!("渲染 {} 失败", file.display()))?
        }
        Command::Lod { file, scales } => planview_frontend::run_lod(file, &config, scales)
            .with_context(|| format!("分析 {} 失败", file.display()))?,
    };
    print!("{output}");
    Ok(())
}

/// 显式指定的配置加载失败即退出；自动发现失败时退回默认配置。
fn load_configuration(explicit: Option<&std::path::Path>) -> anyhow::Result<AppConfig> {
    if let Some(path) = explicit {
        return AppConfig::from_file(path)
            .with_context(|| format!("加载配置 {} 失败", path.display()));
    }
    match AppConfig::discover() {
        Ok(cfg) => Ok(cfg),
        Err(err) => {
            match &err {
                ConfigError::Io { path, .. } | ConfigError::Parse { path, .. } => {
                    eprintln!("加载默认配置 {} 失败，使用内建默认值: {err}", path.display());
                }
                ConfigError::Invalid(_) | ConfigError::Context { .. } => {
                    eprintln!("加载默认配置失败，使用内建默认值: {err}");
                }
            }
            Ok(AppConfig::default())
        }
    }
}

fn init_logging(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if subscriber.try_init().is_err() {
        warn!("日志订阅器已初始化，忽略重复设置");
    }
}
