use std::fs;
use std::path::{Path, PathBuf};

use planview_config::AppConfig;
use planview_core::geometry::Bounds2D;
use planview_engine::command::{CommandBus, CommandContext, CommandRequest};
use planview_engine::lod::Canvas;
use planview_engine::scene::Scene;
use planview_engine::{ExtractionStats, Primitive};
use planview_io::{load_drawing, summarize};
use serde::Serialize;
use tracing::{debug, info};

use crate::errors::FrontendError;
use crate::loader::{converter, load_scene, render_policy};
use crate::report;
use crate::svg::SvgCanvas;

/// `render` 子命令的参数。
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub output: PathBuf,
    /// 未指定时缩放到全图。
    pub scale: Option<f64>,
    pub width: f64,
    pub height: f64,
    pub simplify: bool,
    pub hidden_layers: Vec<String>,
}

#[derive(Serialize)]
struct ExtractionDump<'a> {
    source: &'a Path,
    stats: &'a ExtractionStats,
    extents: Option<Bounds2D>,
    primitives: Vec<&'a Primitive>,
}

fn write_file(path: &Path, content: &str) -> Result<(), FrontendError> {
    fs::write(path, content).map_err(|source| FrontendError::Write {
        path: path.to_path_buf(),
        source,
    })
}

fn dispatch(
    bus: &CommandBus,
    scene: &mut Scene,
    name: &str,
    args: &[&str],
) -> Result<(), FrontendError> {
    let request = CommandRequest::new(name, args.iter().copied());
    let mut context = CommandContext { scene };
    let response = bus.dispatch(&request, &mut context);
    if response.success {
        debug!(command = name, message = ?response.message, "命令执行完成");
        Ok(())
    } else {
        Err(FrontendError::Command {
            name: name.to_string(),
            message: response.message.unwrap_or_default(),
        })
    }
}

/// 图纸概要：只解析文档，不展开图元。
pub fn run_info(path: &Path, config: &AppConfig) -> Result<String, FrontendError> {
    let converter = converter(&config.converter);
    let drawing = load_drawing(path, Some(&converter))?;
    let summary = summarize(&drawing.document);
    let mut text = format!("文件: {}\n", path.display());
    if let Some(converted) = &drawing.converted_path {
        text.push_str(&format!("已转换为: {}\n", converted.display()));
    }
    text.push_str(&report::summary_report(&summary));
    Ok(text)
}

/// 展开图元并输出统计；给出 `json_out` 时同时写出完整图元列表。
pub fn run_extract(
    path: &Path,
    config: &AppConfig,
    json_out: Option<&Path>,
) -> Result<String, FrontendError> {
    let loaded = load_scene(path, config)?;
    let scene = &loaded.scene;
    if let Some(out) = json_out {
        let dump = ExtractionDump {
            source: &loaded.path,
            stats: scene.stats(),
            extents: scene.extents(),
            primitives: scene.primitives().collect(),
        };
        write_file(out, &serde_json::to_string_pretty(&dump)?)?;
        info!(output = %out.display(), primitives = dump.primitives.len(), "图元已导出");
    }
    let mut text = format!("文件: {}\n", loaded.path.display());
    if let Some(converted) = &loaded.converted_path {
        text.push_str(&format!("已转换为: {}\n", converted.display()));
    }
    text.push_str(&report::extraction_report(scene));
    Ok(text)
}

/// 按细节层级策略生成 SVG。
pub fn run_render(
    path: &Path,
    config: &AppConfig,
    request: &RenderRequest,
) -> Result<String, FrontendError> {
    if let Some(scale) = request.scale {
        if !(scale.is_finite() && scale > 0.0) {
            return Err(FrontendError::InvalidArgument(format!(
                "比例必须为正数: {scale}"
            )));
        }
    }
    let mut loaded = load_scene(path, config)?;
    let scene = &mut loaded.scene;
    let bus = CommandBus::new();

    scene.set_viewport_size(request.width, request.height);
    dispatch(&bus, scene, "zoom_extents", &[])?;
    if let Some(scale) = request.scale {
        scene.set_viewport_scale(scale);
    }
    if request.simplify != scene.simplify() {
        dispatch(&bus, scene, "toggle_simplify", &[])?;
    }
    for layer in &request.hidden_layers {
        dispatch(&bus, scene, "layer_visibility", &[layer.as_str(), "off"])?;
    }

    let policy = render_policy(&config.render);
    let commands = scene.plan(&policy);
    let viewport = scene.viewport();
    let (width, height) = scene.viewport_size();
    let mut canvas = SvgCanvas::new(viewport, width, height);
    canvas.replay(&commands);
    let elements = canvas.element_count();
    write_file(&request.output, &canvas.finish())?;
    info!(
        output = %request.output.display(),
        scale = viewport.scale,
        elements,
        "SVG 已写出"
    );

    Ok(format!(
        "已写出 {}：比例 {:.4}，层级 {:?}，元素 {}\n",
        request.output.display(),
        viewport.scale,
        policy.tier(viewport.scale),
        elements
    ))
}

/// 列出给定比例下的细节层级；未给比例时使用缩放到全图后的比例。
pub fn run_lod(path: &Path, config: &AppConfig, scales: &[f64]) -> Result<String, FrontendError> {
    if let Some(bad) = scales.iter().find(|s| !(s.is_finite() && **s > 0.0)) {
        return Err(FrontendError::InvalidArgument(format!("比例必须为正数: {bad}")));
    }
    let loaded = load_scene(path, config)?;
    let policy = render_policy(&config.render);
    let fitted = [loaded.scene.viewport().scale];
    let scales = if scales.is_empty() { &fitted[..] } else { scales };
    Ok(report::lod_report(&loaded.scene, &policy, scales))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "  0\nSECTION\n  2\nTABLES\n  0\nTABLE\n  2\nLAYER\n  0\nLAYER\n  2\nWALLS\n 62\n1\n370\n50\n  0\nENDTAB\n  0\nENDSEC\n  0\nSECTION\n  2\nENTITIES\n  0\nLINE\n  8\nWALLS\n 10\n0.0\n 20\n0.0\n 11\n100.0\n 21\n0.0\n  0\nCIRCLE\n  8\n0\n 10\n50.0\n 20\n20.0\n 40\n10.0\n  0\nTEXT\n  8\n0\n 10\n5.0\n 20\n5.0\n 40\n3.0\n  1\nA&B\n  0\nENDSEC\n  0\nEOF\n";

    fn sample() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.dxf");
        fs::write(&path, SAMPLE).unwrap();
        (dir, path)
    }

    #[test]
    fn info_reports_layers() {
        let (_dir, path) = sample();
        let text = run_info(&path, &AppConfig::default()).unwrap();
        assert!(text.contains("实体总数: 3"));
        assert!(text.contains("WALLS"));
    }

    #[test]
    fn extract_writes_json_dump() {
        let (dir, path) = sample();
        let out = dir.path().join("out.json");
        let text = run_extract(&path, &AppConfig::default(), Some(&out)).unwrap();
        assert!(text.contains("图元总数: 3"));

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
        let primitives = json["primitives"].as_array().unwrap();
        assert_eq!(primitives.len(), 3);
        assert_eq!(primitives[0]["layer"], "WALLS");
        assert_eq!(primitives[0]["lineweight"], 50);
        assert_eq!(primitives[0]["geometry"]["type"], "line");
        assert_eq!(json["stats"]["truncated"], false);
    }

    #[test]
    fn json_dump_lists_primitives_in_extraction_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mixed.dxf");
        let mut text = String::from("  0\nSECTION\n  2\nENTITIES\n");
        for (layer, y) in [("A", 0), ("B", 1), ("A", 2), ("C", 3), ("B", 4)] {
            text.push_str(&format!(
                "  0\nLINE\n  8\n{layer}\n 10\n0\n 20\n{y}\n 11\n1\n 21\n{y}\n"
            ));
        }
        text.push_str("  0\nENDSEC\n  0\nEOF\n");
        fs::write(&path, text).unwrap();

        let out = dir.path().join("mixed.json");
        run_extract(&path, &AppConfig::default(), Some(&out)).unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
        let layers: Vec<&str> = json["primitives"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["layer"].as_str().unwrap())
            .collect();
        assert_eq!(layers, ["A", "B", "A", "C", "B"]);
    }

    #[test]
    fn render_writes_svg_with_text_at_fitted_scale() {
        let (dir, path) = sample();
        let out = dir.path().join("plan.svg");
        let request = RenderRequest {
            output: out.clone(),
            scale: None,
            width: 800.0,
            height: 600.0,
            simplify: true,
            hidden_layers: vec!["walls".to_string()],
        };
        run_render(&path, &AppConfig::default(), &request).unwrap();
        let svg = fs::read_to_string(&out).unwrap();
        assert!(svg.contains("<circle"));
        assert!(svg.contains("A&amp;B"));
        assert!(!svg.contains("<line"));
    }

    #[test]
    fn render_rejects_unknown_layer_and_bad_scale() {
        let (dir, path) = sample();
        let mut request = RenderRequest {
            output: dir.path().join("plan.svg"),
            scale: Some(-1.0),
            width: 800.0,
            height: 600.0,
            simplify: false,
            hidden_layers: Vec::new(),
        };
        assert!(matches!(
            run_render(&path, &AppConfig::default(), &request),
            Err(FrontendError::InvalidArgument(_))
        ));

        request.scale = Some(0.5);
        request.hidden_layers = vec!["NOPE".to_string()];
        assert!(matches!(
            run_render(&path, &AppConfig::default(), &request),
            Err(FrontendError::Command { .. })
        ));
    }

    #[test]
    fn lod_uses_fitted_scale_by_default() {
        let (_dir, path) = sample();
        let text = run_lod(&path, &AppConfig::default(), &[]).unwrap();
        assert_eq!(text.lines().count(), 2);
        let text = run_lod(&path, &AppConfig::default(), &[0.01, 0.1, 1.0]).unwrap();
        assert_eq!(text.lines().count(), 4);
    }
}
