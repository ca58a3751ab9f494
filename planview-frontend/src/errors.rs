use std::path::PathBuf;

use planview_engine::EngineError;
use planview_io::IoError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrontendError {
    #[error("加载图纸失败: {0}")]
    Load(#[from] IoError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("写入 {path:?} 失败: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("序列化输出失败: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("命令 `{name}` 执行失败: {message}")]
    Command { name: String, message: String },
    #[error("参数无效: {0}")]
    InvalidArgument(String),
}
