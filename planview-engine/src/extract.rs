//! 模型空间实体到图元的展开。
//!
//! 块参照按累积变换递归展开，并受三道上限约束：嵌套深度、同名块重复次数、
//! 总图元数。单个实体的数据错误只丢弃该实体。

use std::collections::HashMap;
use std::f64::consts::TAU;

use planview_core::color::Rgb;
use planview_core::document::{
    BoundaryPath, Document, Entity, Hatch, HatchEdge, Insert,
};
use planview_core::geometry::{Point2, Point3};
use serde::Serialize;
use tracing::{debug, info};

use crate::errors::EntityError;
use crate::primitive::{Primitive, PrimitiveGeometry};
use crate::resolver::{resolve_color, resolve_linetype, resolve_lineweight};
use crate::transform::Transform;

pub const DEFAULT_TEXT_HEIGHT: f64 = 2.5;
pub const DEFAULT_ARC_SEGMENTS: usize = 32;
const HATCH_ARC_SEGMENTS: usize = 28;
const HATCH_ELLIPSE_SEGMENTS: usize = 48;
const LOOP_CLOSE_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractOptions {
    /// 可选的图元数量上限，达到后本次展开立即停止。
    pub limit: Option<usize>,
    pub expand_blocks: bool,
    pub max_block_repeats: usize,
    pub max_total_after_blocks: usize,
    pub max_depth: usize,
    pub include_text: bool,
    pub include_hatch: bool,
}

impl Default for ExtractOptions {
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

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtractionStats {
    /// 因任一上限被拒绝或未被访问的实体数。
    pub skipped_by_caps: usize,
    pub entity_errors: usize,
    pub inserts_expanded: usize,
    pub truncated: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub primitives: Vec<Primitive>,
    pub stats: ExtractionStats,
}

/// 对整个文档执行一次展开。
pub fn extract(document: &Document, options: &ExtractOptions) -> Extraction {
    let mut pass = ExtractionPass::new(document, options);
    let top_level: Vec<&Entity> = document.entities().map(|(_, entity)| entity).collect();
    pass.walk(top_level.into_iter(), &Frame::root());
    let extraction = pass.finish();
    info!(
        primitives = extraction.primitives.len(),
        skipped_by_caps = extraction.stats.skipped_by_caps,
        entity_errors = extraction.stats.entity_errors,
        inserts_expanded = extraction.stats.inserts_expanded,
        truncated = extraction.stats.truncated,
        "图元展开完成"
    );
    extraction
}

/// 递归过程中向下传递的上下文。
#[derive(Debug, Clone)]
struct Frame<'d> {
    transform: Option<Transform>,
    byblock: Option<Rgb>,
    block_name: Option<&'d str>,
    depth: usize,
}

impl Frame<'_> {
    fn root() -> Self {
        Self {
            transform: None,
            byblock: None,
            block_name: None,
            depth: 0,
        }
    }

    fn point(&self, point: Point3) -> Point2 {
        match &self.transform {
            Some(transform) => transform.apply(point).xy(),
            None => point.xy(),
        }
    }

    fn planar(&self, point: Point2) -> Point2 {
        match &self.transform {
            Some(transform) => transform.apply_2d(point),
            None => point,
        }
    }
}

/// 单次展开的可变状态。计数器只属于本次展开。
pub struct ExtractionPass<'d> {
    document: &'d Document,
    options: &'d ExtractOptions,
    primitives: Vec<Primitive>,
    block_repeats: HashMap<String, usize>,
    stats: ExtractionStats,
}

impl<'d> ExtractionPass<'d> {
    pub fn new(document: &'d Document, options: &'d ExtractOptions) -> Self {
        Self {
            document,
            options,
            primitives: Vec::new(),
            block_repeats: HashMap::new(),
            stats: ExtractionStats::default(),
        }
    }

    pub fn finish(self) -> Extraction {
        Extraction {
            primitives: self.primitives,
            stats: self.stats,
        }
    }

    fn exhausted(&self) -> bool {
        let emitted = self.primitives.len();
        if self.options.limit.is_some_and(|limit| emitted >= limit) {
            return true;
        }
        emitted >= self.options.max_total_after_blocks
    }

    fn walk<I>(&mut self, entities: I, frame: &Frame<'d>)
    where
        I: ExactSizeIterator<Item = &'d Entity>,
    {
        let mut entities = entities;
        while entities.len() > 0 {
            if self.exhausted() {
                self.stats.skipped_by_caps += entities.len();
                self.stats.truncated = true;
                return;
            }
            if let Some(entity) = entities.next() {
                self.visit(entity, frame);
            }
        }
    }

    fn visit(&mut self, entity: &'d Entity, frame: &Frame<'d>) {
        let properties = entity.properties();
        if properties.invisible {
            return;
        }
        if let Some(layer) = self.document.layer(&properties.layer) {
            if !layer.is_visible() {
                return;
            }
        }

        let geometry = match entity {
            Entity::Insert(insert) => return self.expand_insert(insert, frame),
            Entity::Other(_) => return,
            Entity::Text(_) | Entity::MText(_) if !self.options.include_text => return,
            Entity::Hatch(_) if !self.options.include_hatch => return,
            _ => entity_geometry(entity, frame),
        };

        let geometry = match geometry {
            Ok(Some(geometry)) => geometry,
            Ok(None) => return,
            Err(err) => {
                self.stats.entity_errors += 1;
                debug!(
                    kind = entity.type_name(),
                    layer = %properties.layer,
                    error = %err,
                    "丢弃无效实体"
                );
                return;
            }
        };

        let lineweight = resolve_lineweight(self.document, properties);
        let linetype = resolve_linetype(self.document, properties);
        self.primitives.push(Primitive {
            layer: properties.layer.clone(),
            color: resolve_color(self.document, properties, frame.byblock),
            geometry,
            lineweight: lineweight.value,
            lineweight_raw: properties.lineweight,
            lineweight_source: lineweight.source,
            linetype: linetype.value,
            linetype_raw: properties.linetype.clone(),
            linetype_source: linetype.source,
            source_block: frame.block_name.map(str::to_string),
        });
    }

    fn expand_insert(&mut self, insert: &'d Insert, frame: &Frame<'d>) {
        if !self.options.expand_blocks {
            return;
        }
        if frame.depth > self.options.max_depth {
            self.stats.skipped_by_caps += 1;
            debug!(block = %insert.block_name, depth = frame.depth, "块嵌套过深，跳过");
            return;
        }
        let Some(block) = self.document.block(&insert.block_name) else {
            debug!(block = %insert.block_name, "块定义不存在");
            return;
        };

        let repeats = self
            .block_repeats
            .entry(insert.block_name.to_ascii_uppercase())
            .or_insert(0);
        *repeats += 1;
        if *repeats > self.options.max_block_repeats {
            self.stats.skipped_by_caps += 1;
            debug!(block = %insert.block_name, repeats = *repeats, "块重复次数超限，跳过");
            return;
        }

        let local = Transform::for_insert(insert, block.base_point);
        let transform = match &frame.transform {
            Some(parent) => parent.then(&local),
            None => local,
        };
        if !transform.is_finite() {
            self.stats.entity_errors += 1;
            debug!(block = %insert.block_name, "块参照变换无效");
            return;
        }

        self.stats.inserts_expanded += 1;
        let child = Frame {
            transform: Some(transform),
            byblock: Some(resolve_color(self.document, &insert.properties, frame.byblock)),
            block_name: Some(insert.block_name.as_str()),
            depth: frame.depth + 1,
        };
        self.walk(block.entities.iter(), &child);
    }
}

fn finite_point(point: Point2, kind: &'static str) -> Result<Point2, EntityError> {
    if point.is_finite() {
        Ok(point)
    } else {
        Err(EntityError::NonFiniteCoordinate { kind })
    }
}

fn finite_value(value: f64, kind: &'static str, field: &'static str) -> Result<f64, EntityError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(EntityError::NonFiniteValue { kind, field })
    }
}

fn entity_geometry(entity: &Entity, frame: &Frame<'_>) -> Result<Option<PrimitiveGeometry>, EntityError> {
    let geometry = match entity {
        Entity::Line(line) => PrimitiveGeometry::Line {
            start: finite_point(frame.point(line.start), "LINE")?,
            end: finite_point(frame.point(line.end), "LINE")?,
        },
        Entity::LwPolyline(polyline) => {
            if polyline.vertices.is_empty() {
                return Ok(None);
            }
            let points = polyline
                .vertices
                .iter()
                .map(|vertex| finite_point(frame.planar(*vertex), "LWPOLYLINE"))
                .collect::<Result<Vec<_>, _>>()?;
            PrimitiveGeometry::Polyline {
                points,
                closed: polyline.is_closed,
            }
        }
        Entity::Polyline(polyline) => {
            if polyline.vertices.is_empty() {
                return Ok(None);
            }
            let points = polyline
                .vertices
                .iter()
                .map(|vertex| finite_point(frame.point(*vertex), "POLYLINE"))
                .collect::<Result<Vec<_>, _>>()?;
            PrimitiveGeometry::Polyline {
                points,
                closed: polyline.is_closed,
            }
        }
        Entity::Circle(circle) => PrimitiveGeometry::Circle {
            center: finite_point(frame.point(circle.center), "CIRCLE")?,
            radius: finite_value(circle.radius, "CIRCLE", "radius")?,
        },
        Entity::Arc(arc) => PrimitiveGeometry::Arc {
            center: finite_point(frame.point(arc.center), "ARC")?,
            radius: finite_value(arc.radius, "ARC", "radius")?,
            start_angle: finite_value(arc.start_angle, "ARC", "start_angle")?,
            end_angle: finite_value(arc.end_angle, "ARC", "end_angle")?,
        },
        Entity::Text(text) => {
            if text.value.trim().is_empty() {
                return Ok(None);
            }
            PrimitiveGeometry::Text {
                insert: finite_point(frame.point(text.insert), "TEXT")?,
                height: finite_value(text.height.unwrap_or(DEFAULT_TEXT_HEIGHT), "TEXT", "height")?,
                rotation: finite_value(text.rotation, "TEXT", "rotation")?,
                value: text.value.clone(),
            }
        }
        Entity::MText(mtext) => {
            let value = match mtext.plain_text() {
                Ok(plain) => plain,
                Err(err) => {
                    debug!(error = %err, "多行文字格式解析失败，保留原文");
                    mtext.content.clone()
                }
            };
            if value.trim().is_empty() {
                return Ok(None);
            }
            PrimitiveGeometry::MText {
                insert: finite_point(frame.point(mtext.insert), "MTEXT")?,
                height: finite_value(
                    mtext.char_height.unwrap_or(DEFAULT_TEXT_HEIGHT),
                    "MTEXT",
                    "height",
                )?,
                rotation: finite_value(mtext.rotation, "MTEXT", "rotation")?,
                value,
            }
        }
        Entity::Hatch(hatch) => {
            let loops = hatch_loops(hatch)?
                .into_iter()
                .map(|points| {
                    points
                        .into_iter()
                        .map(|point| finite_point(frame.planar(point), "HATCH"))
                        .collect::<Result<Vec<_>, _>>()
                })
                .collect::<Result<Vec<_>, _>>()?;
            if loops.is_empty() {
                return Ok(None);
            }
            PrimitiveGeometry::Hatch {
                loops,
                solid: hatch.is_solid,
            }
        }
        Entity::Insert(_) | Entity::Other(_) => return Ok(None),
    };
    Ok(Some(geometry))
}

/// 将圆弧离散为折线点，包含首尾两点，共 `max(4, segments) + 1` 个点。
///
/// 逆时针时终止角不大于起始角则补整圈；顺时针时对起始角做同样处理。
/// 扫掠角按整圈取余，起止角重合时为整圆。
pub fn discretize_arc(
    center: Point2,
    radius: f64,
    start_deg: f64,
    end_deg: f64,
    counter_clockwise: bool,
    segments: usize,
) -> Vec<Point2> {
    let start = start_deg.to_radians();
    let end = end_deg.to_radians();
    let (start, end) = if counter_clockwise {
        (start, start + sweep_of(end - start))
    } else {
        (end + sweep_of(start - end), end)
    };
    let steps = segments.max(4);
    (0..=steps)
        .map(|i| {
            let t = start + (end - start) * (i as f64 / steps as f64);
            Point2::new(center.x() + radius * t.cos(), center.y() + radius * t.sin())
        })
        .collect()
}

/// 取值落在 (0, TAU]。
fn sweep_of(delta: f64) -> f64 {
    let sweep = delta.rem_euclid(TAU);
    if sweep == 0.0 { TAU } else { sweep }
}

/// 计算填充边界的闭合环（块局部坐标）。空环会被丢弃，边界数据非有限值时整个填充无效。
pub fn hatch_loops(hatch: &Hatch) -> Result<Vec<Vec<Point2>>, EntityError> {
    let mut loops = Vec::with_capacity(hatch.paths.len());
    for path in &hatch.paths {
        let mut points = match path {
            BoundaryPath::Polyline { vertices, .. } => vertices
                .iter()
                .map(|vertex| finite_point(*vertex, "HATCH"))
                .collect::<Result<Vec<_>, _>>()?,
            BoundaryPath::Edges(edges) => edge_points(edges)?,
        };
        if points.is_empty() {
            continue;
        }
        let first = points[0];
        if let Some(&last) = points.last() {
            if !first.coincides_with(last, LOOP_CLOSE_TOLERANCE) {
                points.push(first);
            }
        }
        loops.push(points);
    }
    Ok(loops)
}

fn edge_points(edges: &[HatchEdge]) -> Result<Vec<Point2>, EntityError> {
    let mut points = Vec::new();
    for edge in edges {
        match edge {
            HatchEdge::Line { start, end } => {
                let start = finite_point(*start, "HATCH")?;
                let end = finite_point(*end, "HATCH")?;
                if points.is_empty() {
                    points.push(start);
                }
                points.push(end);
            }
            HatchEdge::Arc {
                center,
                radius,
                start_angle,
                end_angle,
                is_counter_clockwise,
            } => {
                let arc = discretize_arc(
                    finite_point(*center, "HATCH")?,
                    finite_value(*radius, "HATCH", "radius")?,
                    finite_value(*start_angle, "HATCH", "start_angle")?,
                    finite_value(*end_angle, "HATCH", "end_angle")?,
                    !*is_counter_clockwise,
                    HATCH_ARC_SEGMENTS,
                );
                if points.is_empty() {
                    points.push(arc[0]);
                }
                points.extend_from_slice(&arc[1..]);
            }
            HatchEdge::Ellipse {
                center,
                major_axis,
                ratio,
                start_parameter,
                end_parameter,
                ..
            } => {
                let center = finite_point(*center, "HATCH")?;
                if !major_axis.0.is_finite() {
                    return Err(EntityError::NonFiniteValue {
                        kind: "HATCH",
                        field: "major_axis",
                    });
                }
                let ratio = finite_value(*ratio, "HATCH", "ratio")?;
                let start_parameter = finite_value(*start_parameter, "HATCH", "start_parameter")?;
                let end_parameter = finite_value(*end_parameter, "HATCH", "end_parameter")?;
                let major = major_axis.length();
                let minor = major * ratio;
                let (sin, cos) = major_axis.angle().sin_cos();
                for i in 0..=HATCH_ELLIPSE_SEGMENTS {
                    let t = start_parameter
                        + (end_parameter - start_parameter) * (i as f64 / HATCH_ELLIPSE_SEGMENTS as f64);
                    let (x, y) = (major * t.cos(), minor * t.sin());
                    points.push(Point2::new(
                        center.x() + x * cos - y * sin,
                        center.y() + x * sin + y * cos,
                    ));
                }
            }
            HatchEdge::Spline { .. } => {}
        }
    }
    Ok(points)
}

#[cfg(test)]
mod tests {
    use std::f64::consts::FRAC_1_SQRT_2;

    use planview_core::document::{EntityProperties, Text};
    use planview_core::geometry::Vector2;

    use super::*;

    fn close(a: Point2, x: f64, y: f64) -> bool {
        (a.x() - x).abs() < 1e-9 && (a.y() - y).abs() < 1e-9
    }

    #[test]
    fn quarter_turn_arc_discretization() {
        let points = discretize_arc(Point2::new(0.0, 0.0), 1.0, 0.0, 90.0, true, 4);
        assert_eq!(points.len(), 5);
        assert!(close(points[0], 1.0, 0.0));
        assert!(close(points[2], FRAC_1_SQRT_2, FRAC_1_SQRT_2));
        assert!(close(points[4], 0.0, 1.0));
    }

    #[test]
    fn segment_count_has_a_floor_of_four() {
        let points = discretize_arc(Point2::new(0.0, 0.0), 2.0, 0.0, 180.0, true, 1);
        assert_eq!(points.len(), 5);
    }

    #[test]
    fn clockwise_arc_walks_the_long_way_round() {
        let points = discretize_arc(Point2::new(0.0, 0.0), 1.0, 0.0, 90.0, false, 4);
        // 起点绕到 360°，向 90° 递减，经过 180° 附近的 225°
        assert!(close(points[0], 1.0, 0.0));
        assert!(close(points[2], -FRAC_1_SQRT_2, -FRAC_1_SQRT_2));
        assert!(close(points[4], 0.0, 1.0));
    }

    #[test]
    fn equal_angles_produce_full_circle() {
        let points = discretize_arc(Point2::new(0.0, 0.0), 1.0, 30.0, 30.0, true, 8);
        let first = points[0];
        let last = points[points.len() - 1];
        assert!(first.coincides_with(last, 1e-9));
        assert!(close(points[4], -(30f64.to_radians().cos()), -(30f64.to_radians().sin())));
    }

    #[test]
    fn angles_beyond_many_turns_reduce_to_one_sweep() {
        let points = discretize_arc(Point2::new(0.0, 0.0), 1.0, 720.0 + 90.0, 0.0, true, 4);
        assert_eq!(points.len(), 5);
        assert!(close(points[0], 0.0, 1.0));
        assert!(close(points[4], 1.0, 0.0));

        let points = discretize_arc(Point2::new(0.0, 0.0), 1.0, 1e20, 0.0, false, 8);
        assert_eq!(points.len(), 9);
        assert!(points.iter().all(|point| point.is_finite()));
    }

    #[test]
    fn non_finite_edge_values_invalidate_the_hatch() {
        let edges = vec![HatchEdge::Arc {
            center: Point2::new(0.0, 0.0),
            radius: 1.0,
            start_angle: f64::INFINITY,
            end_angle: 0.0,
            is_counter_clockwise: false,
        }];
        assert!(matches!(
            hatch_loops(&hatch(vec![BoundaryPath::Edges(edges)])),
            Err(EntityError::NonFiniteValue {
                field: "start_angle",
                ..
            })
        ));
    }

    fn hatch(paths: Vec<BoundaryPath>) -> Hatch {
        Hatch {
            pattern_name: "SOLID".to_string(),
            is_solid: true,
            paths,
            properties: EntityProperties::default(),
        }
    }

    #[test]
    fn open_line_loop_is_closed() {
        let edges = vec![
            HatchEdge::Line {
                start: Point2::new(0.0, 0.0),
                end: Point2::new(10.0, 0.0),
            },
            HatchEdge::Line {
                start: Point2::new(10.0, 0.0),
                end: Point2::new(10.0, 10.0),
            },
        ];
        let loops = hatch_loops(&hatch(vec![BoundaryPath::Edges(edges)])).unwrap();
        assert_eq!(loops.len(), 1);
        let ring = &loops[0];
        assert_eq!(ring.len(), 4);
        assert!(close(ring[3], 0.0, 0.0));
    }

    #[test]
    fn already_closed_loop_is_not_duplicated() {
        let vertices = vec![
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(1.0, 1.0),
            Point2::new(0.0, 0.0),
        ];
        let loops = hatch_loops(&hatch(vec![BoundaryPath::Polyline {
            vertices,
            is_closed: true,
        }]))
        .unwrap();
        assert_eq!(loops[0].len(), 4);
    }

    #[test]
    fn gap_below_tolerance_counts_as_closed() {
        let vertices = vec![
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(1.0, 1.0),
            Point2::new(5e-7, 0.0),
        ];
        let loops = hatch_loops(&hatch(vec![BoundaryPath::Polyline {
            vertices,
            is_closed: false,
        }]))
        .unwrap();
        assert_eq!(loops[0].len(), 4);
        assert!(close(loops[0][3], 5e-7, 0.0));
    }

    #[test]
    fn arc_edge_reverses_direction_and_skips_duplicate_joints() {
        let edges = vec![
            HatchEdge::Line {
                start: Point2::new(-1.0, 0.0),
                end: Point2::new(1.0, 0.0),
            },
            HatchEdge::Arc {
                center: Point2::new(0.0, 0.0),
                radius: 1.0,
                start_angle: 0.0,
                end_angle: 180.0,
                is_counter_clockwise: false,
            },
        ];
        let loops = hatch_loops(&hatch(vec![BoundaryPath::Edges(edges)])).unwrap();
        let ring = &loops[0];
        // 2 个直线点 + 28 个圆弧点（首点与直线终点重合被跳过），首尾已闭合
        assert_eq!(ring.len(), 2 + HATCH_ARC_SEGMENTS);
        assert!(close(ring[2 + HATCH_ARC_SEGMENTS / 2 - 1], 0.0, 1.0));
        assert!(close(*ring.last().unwrap(), -1.0, 0.0));
    }

    #[test]
    fn ellipse_edge_samples_every_step() {
        let edges = vec![HatchEdge::Ellipse {
            center: Point2::new(5.0, 5.0),
            major_axis: Vector2::new(0.0, 2.0),
            ratio: 0.5,
            start_parameter: 0.0,
            end_parameter: TAU,
            is_counter_clockwise: true,
        }];
        let loops = hatch_loops(&hatch(vec![BoundaryPath::Edges(edges)])).unwrap();
        let ring = &loops[0];
        assert_eq!(ring.len(), HATCH_ELLIPSE_SEGMENTS + 1);
        assert!(close(ring[0], 5.0, 7.0));
        assert!(close(ring[12], 4.0, 5.0));
    }

    #[test]
    fn spline_only_paths_are_dropped() {
        let edges = vec![HatchEdge::Spline {
            control_points: vec![Point2::new(0.0, 0.0), Point2::new(1.0, 1.0)],
        }];
        assert!(
            hatch_loops(&hatch(vec![BoundaryPath::Edges(edges)]))
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn blank_text_and_excluded_text_are_not_emitted() {
        let mut doc = Document::new();
        let text = |value: &str| {
            Entity::Text(Text {
                insert: Point3::new(0.0, 0.0, 0.0),
                value: value.to_string(),
                height: None,
                rotation: 0.0,
                properties: EntityProperties::default(),
            })
        };
        doc.add_entity(text("   "));
        doc.add_entity(text("Label"));

        let extraction = extract(&doc, &ExtractOptions::default());
        assert_eq!(extraction.primitives.len(), 1);
        match &extraction.primitives[0].geometry {
            PrimitiveGeometry::Text { height, .. } => {
                assert!((height - DEFAULT_TEXT_HEIGHT).abs() < 1e-12)
            }
            other => panic!("unexpected geometry {other:?}"),
        }

        let options = ExtractOptions {
            include_text: false,
            ..ExtractOptions::default()
        };
        assert!(extract(&doc, &options).primitives.is_empty());
    }

    #[test]
    fn limit_stops_the_pass_and_counts_the_rest() {
        let mut doc = Document::new();
        for i in 0..5 {
            doc.add_line(Point2::new(0.0, i as f64), Point2::new(1.0, i as f64), "0");
        }
        let options = ExtractOptions {
            limit: Some(2),
            ..ExtractOptions::default()
        };
        let extraction = extract(&doc, &options);
        assert_eq!(extraction.primitives.len(), 2);
        assert_eq!(extraction.stats.skipped_by_caps, 3);
        assert!(extraction.stats.truncated);
    }
}
