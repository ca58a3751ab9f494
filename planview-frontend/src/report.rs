//! 命令行输出使用的文本报告。

use std::collections::BTreeMap;
use std::fmt::Write;

use planview_core::geometry::Bounds2D;
use planview_engine::lod::{LodTier, RenderPolicy};
use planview_engine::scene::Scene;
use planview_io::{DocumentSummary, ExtentsSource};

fn bounds_line(bounds: Option<&Bounds2D>) -> String {
    match bounds {
        Some(bounds) => format!(
            "({:.3}, {:.3}) - ({:.3}, {:.3})  {:.3} x {:.3}",
            bounds.min().x(),
            bounds.min().y(),
            bounds.max().x(),
            bounds.max().y(),
            bounds.width(),
            bounds.height()
        ),
        None => "无".to_string(),
    }
}

fn flag(value: bool, mark: &str) -> &str {
    if value { mark } else { "-" }
}

pub fn summary_report(summary: &DocumentSummary) -> String {
    let mut out = String::new();
    let source = match summary.extents_source {
        Some(ExtentsSource::Header) => "文件头",
        Some(ExtentsSource::Geometry) => "几何估算",
        None => "无",
    };
    let _ = writeln!(out, "实体总数: {}", summary.total_entities);
    if summary.skipped_entities > 0 {
        let _ = writeln!(out, "无效实体(已跳过): {}", summary.skipped_entities);
    }
    let _ = writeln!(
        out,
        "范围({source}): {}",
        bounds_line(summary.extents.as_ref())
    );

    let _ = writeln!(out, "图层 ({}):", summary.layers.len());
    for layer in &summary.layers {
        let _ = writeln!(
            out,
            "  {:<24} 颜色={:<5} 线型={:<12} 线宽={:<5} [{}{}{}] 实体={}",
            layer.name,
            layer
                .color
                .map(|c| c.to_string())
                .unwrap_or_else(|| "-".to_string()),
            layer.linetype,
            layer
                .lineweight
                .map(|w| w.to_string())
                .unwrap_or_else(|| "-".to_string()),
            flag(layer.is_off, "关"),
            flag(layer.is_frozen, "冻"),
            flag(layer.is_locked, "锁"),
            layer.entity_count
        );
    }

    let _ = writeln!(out, "实体类型:");
    for (kind, count) in &summary.entity_types {
        let _ = writeln!(out, "  {kind:<12} {count}");
    }
    out
}

pub fn extraction_report(scene: &Scene) -> String {
    let mut out = String::new();
    let stats = scene.stats();
    let _ = writeln!(out, "图元总数: {}", scene.primitive_count());
    let _ = writeln!(
        out,
        "块展开: {}  上限跳过: {}  错误实体: {}{}",
        stats.inserts_expanded,
        stats.skipped_by_caps,
        stats.entity_errors,
        if stats.truncated { "  (已截断)" } else { "" }
    );
    let _ = writeln!(out, "范围: {}", bounds_line(scene.extents().as_ref()));

    let mut kinds: BTreeMap<&'static str, usize> = BTreeMap::new();
    for primitive in scene.primitives() {
        *kinds.entry(primitive.kind().as_str()).or_insert(0) += 1;
    }
    let _ = writeln!(out, "图元类型:");
    for (kind, count) in kinds {
        let _ = writeln!(out, "  {kind:<10} {count}");
    }

    let _ = writeln!(out, "图层 ({}):", scene.layers().len());
    for group in scene.layers() {
        let from_blocks = group
            .primitives
            .iter()
            .filter(|p| p.is_from_block())
            .count();
        let _ = writeln!(
            out,
            "  {:<24} 图元={:<6} 来自块={:<6} 颜色={}",
            group.name,
            group.len(),
            from_blocks,
            group.color.to_hex()
        );
    }
    out
}

fn tier_name(tier: LodTier) -> &'static str {
    match tier {
        LodTier::Box => "包围盒",
        LodTier::Simple => "简化",
        LodTier::Detailed => "详细",
    }
}

/// 各比例下的层级与绘制指令数。
pub fn lod_report(scene: &Scene, policy: &RenderPolicy, scales: &[f64]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:>10}  {:<6}  {:<4}  {:>8}",
        "比例", "层级", "文字", "指令数"
    );
    for &scale in scales {
        let commands: usize = scene
            .layers()
            .iter()
            .map(|group| policy.plan_layer(group, scale, scene.simplify()).len())
            .sum();
        let _ = writeln!(
            out,
            "{:>10.4}  {:<6}  {:<4}  {:>8}",
            scale,
            tier_name(policy.tier(scale)),
            if policy.shows_text(scale) { "是" } else { "否" },
            commands
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use planview_core::document::{Document, Layer};
    use planview_core::geometry::Point2;
    use planview_engine::ExtractOptions;

    use super::*;

    fn scene() -> Scene {
        let mut document = Document::new();
        document.add_layer(Layer::new("WALLS").with_color(1));
        document.add_line(Point2::new(0.0, 0.0), Point2::new(10.0, 0.0), "WALLS");
        document.add_circle(Point2::new(5.0, 5.0), 2.0, "0");
        let mut scene = Scene::new();
        scene.load(document, &ExtractOptions::default());
        scene
    }

    #[test]
    fn extraction_report_lists_layers_and_kinds() {
        let report = extraction_report(&scene());
        assert!(report.contains("图元总数: 2"));
        assert!(report.contains("WALLS"));
        assert!(report.contains("#ff0000"));
        assert!(report.contains("CIRCLE"));
    }

    #[test]
    fn lod_report_has_one_row_per_scale() {
        let scene = scene();
        let report = lod_report(&scene, &RenderPolicy::default(), &[0.01, 0.2, 1.0]);
        assert_eq!(report.lines().count(), 4);
        assert!(report.contains("包围盒"));
        assert!(report.contains("详细"));
    }
}
