use std::path::{Path, PathBuf};
use std::time::Duration;

use planview_config::{AppConfig, ConverterConfig, ExtractionConfig, RenderConfig};
use planview_engine::ExtractOptions;
use planview_engine::lod::{RenderPolicy, RenderThresholds};
use planview_engine::scene::Scene;
use planview_io::{OdaConverter, load_drawing};
use tracing::info;

use crate::errors::FrontendError;

/// 统一封装加载后的场景与来源信息。
#[derive(Debug)]
pub struct LoadedScene {
    pub scene: Scene,
    pub path: PathBuf,
    /// DWG 经转换得到的 DXF。
    pub converted_path: Option<PathBuf>,
}

pub fn extract_options(config: &ExtractionConfig) -> ExtractOptions {
    ExtractOptions {
        limit: config.limit,
        expand_blocks: config.expand_blocks,
        max_block_repeats: config.max_block_repeats,
        max_total_after_blocks: config.max_total_after_blocks,
        max_depth: config.max_depth,
        include_text: config.include_text,
        include_hatch: config.include_hatch,
    }
}

pub fn render_policy(config: &RenderConfig) -> RenderPolicy {
    RenderPolicy::new(RenderThresholds {
        box_below: config.box_below,
        detailed_from: config.detailed_from,
        text_from: config.text_from,
        width_boost_above: config.width_boost_above,
        decimate_below: config.decimate_below,
        decimate_min_vertices: config.decimate_min_vertices,
        decimate_step: config.decimate_step,
    })
}

pub fn converter(config: &ConverterConfig) -> OdaConverter {
    let mut converter = OdaConverter::new()
        .with_versions(config.versions.clone())
        .with_timeout(Duration::from_secs(config.timeout_secs.max(1)));
    if let Some(executable) = &config.executable {
        converter = converter.with_executable(executable);
    }
    if !config.search_roots.is_empty() {
        converter = converter.with_search_roots(config.search_roots.clone());
    }
    converter
}

/// 加载图纸并构建场景：展开图元、按图层分组、缩放到全图。
pub fn load_scene(path: &Path, config: &AppConfig) -> Result<LoadedScene, FrontendError> {
    let converter = converter(&config.converter);
    let drawing = load_drawing(path, Some(&converter))?;

    let mut scene = Scene::new();
    scene.set_simplify(config.render.simplify);
    let stats = scene.load(drawing.document, &extract_options(&config.extraction));
    info!(
        path = %path.display(),
        converted = drawing.converted_path.is_some(),
        skipped = stats.skipped_by_caps,
        errors = stats.entity_errors,
        "场景构建完成"
    );

    Ok(LoadedScene {
        scene,
        path: drawing.path,
        converted_path: drawing.converted_path,
    })
}
