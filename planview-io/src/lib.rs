use std::fs;
use std::path::{Path, PathBuf};

use planview_core::document::Document;
use thiserror::Error;
use tracing::{debug, info, warn};

mod dxf;

pub mod convert;
pub mod summary;

pub use convert::{ConversionError, LegacyConverter, OdaConverter};
pub use summary::{DocumentSummary, ExtentsSource, LayerSummary, summarize};

use dxf::{DxfError, DxfParser};

#[derive(Debug, Error)]
pub enum IoError {
    #[error("不支持的文件格式: {0}")]
    UnsupportedFormat(String),
    #[error("文件不存在: {0:?}")]
    NotFound(PathBuf),
    #[error("failed to read file {path:?}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid document structure: {0}")]
    InvalidDocument(String),
    #[error("不是有效的 DXF 文件: {0}")]
    NotDxf(String),
    #[error("DWG 转换失败: {detail}")]
    Conversion { detail: String },
}

fn dxf_error(err: DxfError) -> IoError {
    match err {
        DxfError::NotDxf { message } => IoError::NotDxf(message),
        DxfError::Invalid { message } => IoError::InvalidDocument(message),
    }
}

pub trait DocumentLoader {
    fn load(&self, path: &Path) -> Result<Document, IoError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DxfFacade;

impl DxfFacade {
    pub fn new() -> Self {
        Self
    }

    /// 直接从内存文本解析。
    pub fn parse_str(&self, source: &str) -> Result<Document, IoError> {
        DxfParser::new(source).parse().map_err(dxf_error)
    }
}

impl DocumentLoader for DxfFacade {
    fn load(&self, path: &Path) -> Result<Document, IoError> {
        let bytes = fs::read(path).map_err(|source| IoError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        // 旧版 DXF 常以本地代码页保存，非 UTF-8 字节按替换字符处理
        let text = String::from_utf8_lossy(&bytes);
        let document = self.parse_str(&text)?;
        debug!(
            path = %path.display(),
            entities = document.entity_count(),
            layers = document.layers().count(),
            "DXF 解析完成"
        );
        Ok(document)
    }
}

/// 已加载的图纸及其来源信息。
#[derive(Debug)]
pub struct LoadedDrawing {
    pub document: Document,
    pub path: PathBuf,
    /// DWG 经转换后得到的 DXF 路径。
    pub converted_path: Option<PathBuf>,
}

impl LoadedDrawing {
    #[inline]
    pub fn was_converted(&self) -> bool {
        self.converted_path.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceFormat {
    Dxf,
    Dwg,
}

fn source_format(path: &Path) -> Result<SourceFormat, IoError> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match extension.as_str() {
        "dxf" => Ok(SourceFormat::Dxf),
        "dwg" => Ok(SourceFormat::Dwg),
        other => Err(IoError::UnsupportedFormat(if other.is_empty() {
            "（无扩展名）".to_string()
        } else {
            other.to_string()
        })),
    }
}

/// 加载 DXF/DWG 图纸。DWG 先尝试直接解析，失败时交给转换器生成 DXF 再解析。
pub fn load_drawing(
    path: &Path,
    converter: Option<&dyn LegacyConverter>,
) -> Result<LoadedDrawing, IoError> {
    let format = source_format(path)?;
    if !path.is_file() {
        return Err(IoError::NotFound(path.to_path_buf()));
    }

    let loader = DxfFacade::new();
    let direct = loader.load(path);
    let err = match (direct, format) {
        (Ok(document), _) => {
            info!(path = %path.display(), "图纸已加载");
            return Ok(LoadedDrawing {
                document,
                path: path.to_path_buf(),
                converted_path: None,
            });
        }
        (Err(err), SourceFormat::Dxf) => return Err(err),
        (Err(err), SourceFormat::Dwg) => err,
    };

    debug!(path = %path.display(), error = %err, "DWG 无法直接解析，尝试转换");
    let Some(converter) = converter else {
        return Err(IoError::Conversion {
            detail: "未配置 DWG 转换器".to_string(),
        });
    };
    let converted = converter.convert(path).map_err(|err| {
        warn!(path = %path.display(), error = %err, "DWG 转换失败");
        IoError::Conversion {
            detail: err.to_string(),
        }
    })?;
    let document = loader.load(&converted)?;
    info!(
        path = %path.display(),
        converted = %converted.display(),
        "DWG 已转换并加载"
    );
    Ok(LoadedDrawing {
        document,
        path: path.to_path_buf(),
        converted_path: Some(converted),
    })
}
