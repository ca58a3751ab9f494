//! 通过外部转换程序把旧版二进制图纸（DWG）转为 DXF。

use std::env;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{ChildStderr, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// 指定转换程序路径的环境变量。
pub const CONVERTER_ENV: &str = "ODA_CONVERTER";
pub const DEFAULT_VERSIONS: [&str; 4] = ["R2013", "ACAD2013", "R2010", "R2007"];
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
const EXECUTABLE_NAMES: [&str; 2] = ["ODAFileConverter.exe", "ODAFileConverter"];
const POLL_INTERVAL: Duration = Duration::from_millis(25);
const SEARCH_DEPTH: usize = 4;

#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("未找到转换程序，请安装 ODA File Converter 或设置 ODA_CONVERTER")]
    ConverterNotFound,
    #[error("源文件不存在: {0:?}")]
    SourceMissing(PathBuf),
    #[error("准备转换目录失败: {0}")]
    Workspace(#[source] std::io::Error),
    #[error("所有输出版本均转换失败，最后错误: {detail}")]
    Failed { detail: String },
}

/// 旧格式转换器接口：输入原始文件，返回生成的 DXF 路径。
pub trait LegacyConverter {
    fn convert(&self, input: &Path) -> Result<PathBuf, ConversionError>;
}

/// 调用 ODA File Converter 的实现。依次尝试各输出版本，直到生成 DXF。
#[derive(Debug, Clone)]
pub struct OdaConverter {
    executable: Option<PathBuf>,
    search_roots: Vec<PathBuf>,
    versions: Vec<String>,
    timeout: Duration,
}

impl Default for OdaConverter {
    fn default() -> Self {
        Self {
            executable: None,
            search_roots: default_search_roots(),
            versions: DEFAULT_VERSIONS.iter().map(|v| v.to_string()).collect(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

pub fn default_search_roots() -> Vec<PathBuf> {
    [
        r"C:\Program Files\ODA",
        r"C:\Program Files (x86)\ODA",
        r"C:\Program Files\ODA File Converter",
        r"C:\Program Files (x86)\ODA File Converter",
        "/usr/bin",
        "/opt/ODAFileConverter",
    ]
    .iter()
    .map(PathBuf::from)
    .collect()
}

impl OdaConverter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_executable(mut self, executable: impl Into<PathBuf>) -> Self {
        self.executable = Some(executable.into());
        self
    }

    pub fn with_search_roots(mut self, roots: Vec<PathBuf>) -> Self {
        self.search_roots = roots;
        self
    }

    pub fn with_versions(mut self, versions: Vec<String>) -> Self {
        if !versions.is_empty() {
            self.versions = versions;
        }
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// 查找转换程序：显式配置 > 环境变量 > 搜索目录。
    pub fn locate(&self) -> Option<PathBuf> {
        if let Some(path) = self.executable.as_ref().filter(|path| path.is_file()) {
            return Some(path.clone());
        }
        if let Some(path) = env::var_os(CONVERTER_ENV)
            .map(PathBuf::from)
            .filter(|path| path.is_file())
        {
            return Some(path);
        }
        self.search_roots
            .iter()
            .filter(|root| root.is_dir())
            .find_map(|root| find_in_root(root))
    }

    fn run_once(
        &self,
        executable: &Path,
        in_dir: &Path,
        out_dir: &Path,
        version: &str,
    ) -> Result<(), String> {
        let mut child = Command::new(executable)
            .arg(in_dir)
            .arg(out_dir)
            .arg(version)
            .arg("DXF")
            .arg("0")
            .arg("0")
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| format!("无法启动转换程序: {err}"))?;

        // 轮询期间持续读取 stderr，避免管道写满后子进程阻塞
        let stderr = child.stderr.take().map(drain_stderr);
        let deadline = Instant::now() + self.timeout;
        loop {
            match child.try_wait() {
                Ok(Some(status)) if status.success() => return Ok(()),
                Ok(Some(status)) => {
                    let output = stderr
                        .and_then(|handle| handle.join().ok())
                        .unwrap_or_default();
                    return Err(format!("退出码 {status}: {}", output.trim()));
                }
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(format!("超时（{} 秒）", self.timeout.as_secs_f64()));
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(err) => return Err(format!("等待转换程序失败: {err}")),
            }
        }
    }
}

impl LegacyConverter for OdaConverter {
    fn convert(&self, input: &Path) -> Result<PathBuf, ConversionError> {
        let executable = self.locate().ok_or(ConversionError::ConverterNotFound)?;
        if !input.is_file() {
            return Err(ConversionError::SourceMissing(input.to_path_buf()));
        }
        let file_name = input
            .file_name()
            .ok_or_else(|| ConversionError::SourceMissing(input.to_path_buf()))?;

        let work = tempfile::Builder::new()
            .prefix("planview_dwg2dxf_")
            .tempdir()
            .map_err(ConversionError::Workspace)?;
        let in_dir = work.path().join("in");
        let out_dir = work.path().join("out");
        fs::create_dir_all(&in_dir).map_err(ConversionError::Workspace)?;
        fs::create_dir_all(&out_dir).map_err(ConversionError::Workspace)?;
        fs::copy(input, in_dir.join(file_name)).map_err(ConversionError::Workspace)?;

        let mut last_error = String::from("未尝试任何版本");
        for version in &self.versions {
            debug!(executable = %executable.display(), version = %version, "调用转换程序");
            match self.run_once(&executable, &in_dir, &out_dir, version) {
                Ok(()) => match find_converted_dxf(&out_dir, Path::new(file_name)) {
                    Some(found) => {
                        // 转换结果需要在解析后继续可用，保留工作目录
                        let kept = work.keep();
                        let path = kept.join("out").join(found);
                        info!(output = %path.display(), version = %version, "DWG 转换完成");
                        return Ok(path);
                    }
                    None => last_error = "转换后未找到 DXF 文件".to_string(),
                },
                Err(detail) => {
                    warn!(version = %version, detail = %detail, "转换尝试失败");
                    last_error = detail;
                }
            }
        }
        Err(ConversionError::Failed { detail: last_error })
    }
}

fn find_in_root(root: &Path) -> Option<PathBuf> {
    WalkDir::new(root)
        .max_depth(SEARCH_DEPTH)
        .into_iter()
        .filter_map(Result::ok)
        .find(|entry| {
            entry.file_type().is_file()
                && entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| EXECUTABLE_NAMES.contains(&name))
        })
        .map(|entry| entry.into_path())
}

fn drain_stderr(mut stderr: ChildStderr) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        let _ = stderr.read_to_end(&mut buffer);
        String::from_utf8_lossy(&buffer).into_owned()
    })
}

/// 在输出目录中找到与源文件同名（不区分大小写）的 DXF；只有一个 DXF 时直接使用它。
/// 返回相对 `out_dir` 的文件名。
fn find_converted_dxf(out_dir: &Path, original: &Path) -> Option<PathBuf> {
    let stem = original
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or_default()
        .to_lowercase();
    let dxfs: Vec<String> = fs::read_dir(out_dir)
        .ok()?
        .filter_map(Result::ok)
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| name.to_lowercase().ends_with(".dxf"))
        .collect();
    if let Some(name) = dxfs.iter().find(|name| name.to_lowercase().contains(&stem)) {
        return Some(PathBuf::from(name));
    }
    match dxfs.as_slice() {
        [only] => Some(PathBuf::from(only)),
        _ => None,
    }
}
