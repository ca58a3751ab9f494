//! 随缩放比例变化的细节层级策略。
//!
//! 比例为“每模型单位的像素数”。层级只由当前比例决定，没有滞回。

use planview_core::color::Rgb;
use planview_core::geometry::{Bounds2D, Point2};
use serde::{Deserialize, Serialize};

use crate::layers::LayerGroup;
use crate::primitive::{Primitive, PrimitiveGeometry};

/// 各层级切换阈值，默认值见 `Default`。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RenderThresholds {
    /// 低于此比例只绘制图层包围盒。
    pub box_below: f64,
    /// 不低于此比例启用线宽与线型。
    pub detailed_from: f64,
    /// 不低于此比例显示文字。
    pub text_from: f64,
    /// 线宽加粗的比例下限（不含）。
    pub width_boost_above: f64,
    /// 折线抽稀仅在低于此比例时生效。
    pub decimate_below: f64,
    pub decimate_min_vertices: usize,
    pub decimate_step: usize,
}

impl Default for RenderThresholds {
    fn default() -> Self {
        Self {
            box_below: 0.03,
            detailed_from: 0.12,
            text_from: 0.35,
            width_boost_above: 0.6,
            decimate_below: 0.5,
            decimate_min_vertices: 400,
            decimate_step: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LodTier {
    Box,
    Simple,
    Detailed,
}

const PEN_SCALE: f64 = 2.2;
const PEN_BOOST: f64 = 1.15;
const MIN_PEN_WIDTH: f64 = 0.4;
const FONT_SCALE: f64 = 1.4;
/// 包围盒层级统一使用的中性灰画笔，与图层颜色无关。
pub const BOX_PEN: Rgb = Rgb::new(80, 90, 100);

const DASHED: &[f64] = &[6.0, 4.0];
const HIDDEN: &[f64] = &[3.0, 3.0];
const CENTER: &[f64] = &[10.0, 4.0, 2.0, 4.0];
const PHANTOM: &[f64] = &[12.0, 4.0, 2.0, 4.0, 2.0, 4.0];

/// 线型名对应的虚线模式（像素）。未知线型按实线处理，返回 `None`。
pub fn dash_pattern(linetype: &str) -> Option<&'static [f64]> {
    match linetype.trim().to_ascii_uppercase().as_str() {
        "DASHED" => Some(DASHED),
        "HIDDEN" => Some(HIDDEN),
        "CENTER" => Some(CENTER),
        "PHANTOM" => Some(PHANTOM),
        _ => None,
    }
}

/// 画笔。宽度为 0 表示与缩放无关的细线。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stroke {
    pub color: Rgb,
    pub width: f64,
    pub dashes: Option<&'static [f64]>,
}

impl Stroke {
    pub fn cosmetic(color: Rgb) -> Self {
        Self {
            color,
            width: 0.0,
            dashes: None,
        }
    }

    #[inline]
    pub fn is_cosmetic(&self) -> bool {
        self.width == 0.0
    }
}

/// 与渲染后端无关的绘制指令，坐标均为模型空间。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DrawCommand {
    Rect {
        bounds: Bounds2D,
        stroke: Stroke,
    },
    Line {
        from: Point2,
        to: Point2,
        stroke: Stroke,
    },
    Segments {
        segments: Vec<(Point2, Point2)>,
        stroke: Stroke,
    },
    Circle {
        center: Point2,
        radius: f64,
        stroke: Stroke,
    },
    /// 起始角与扫掠角均为度，扫掠角非负。
    Arc {
        center: Point2,
        radius: f64,
        start_angle: f64,
        sweep: f64,
        stroke: Stroke,
    },
    Polygon {
        points: Vec<Point2>,
        stroke: Stroke,
    },
    Text {
        position: Point2,
        value: String,
        font_size: f64,
        rotation: f64,
        color: Rgb,
    },
}

/// 绘制后端。`replay` 按顺序分发指令。
pub trait Canvas {
    fn rect(&mut self, bounds: &Bounds2D, stroke: &Stroke);
    fn line(&mut self, from: Point2, to: Point2, stroke: &Stroke);
    fn circle(&mut self, center: Point2, radius: f64, stroke: &Stroke);
    fn arc(&mut self, center: Point2, radius: f64, start_angle: f64, sweep: f64, stroke: &Stroke);
    fn polygon(&mut self, points: &[Point2], stroke: &Stroke);
    fn text(&mut self, position: Point2, value: &str, font_size: f64, rotation: f64, color: Rgb);

    fn replay(&mut self, commands: &[DrawCommand]) {
        for command in commands {
            match command {
                DrawCommand::Rect { bounds, stroke } => self.rect(bounds, stroke),
                DrawCommand::Line { from, to, stroke } => self.line(*from, *to, stroke),
                DrawCommand::Segments { segments, stroke } => {
                    for (from, to) in segments {
                        self.line(*from, *to, stroke);
                    }
                }
                DrawCommand::Circle {
                    center,
                    radius,
                    stroke,
                } => self.circle(*center, *radius, stroke),
                DrawCommand::Arc {
                    center,
                    radius,
                    start_angle,
                    sweep,
                    stroke,
                } => self.arc(*center, *radius, *start_angle, *sweep, stroke),
                DrawCommand::Polygon { points, stroke } => self.polygon(points, stroke),
                DrawCommand::Text {
                    position,
                    value,
                    font_size,
                    rotation,
                    color,
                } => self.text(*position, value, *font_size, *rotation, *color),
            }
        }
    }
}

/// 以 `step` 为步长取折线线段 `(i, i+1)`；闭合且顶点数大于 2 时补上首尾连线。
pub fn decimated_segments(points: &[Point2], closed: bool, step: usize) -> Vec<(Point2, Point2)> {
    let step = step.max(1);
    let mut segments: Vec<(Point2, Point2)> = (0..points.len().saturating_sub(1))
        .step_by(step)
        .map(|i| (points[i], points[i + 1]))
        .collect();
    if closed && points.len() > 2 {
        segments.push((points[points.len() - 1], points[0]));
    }
    segments
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RenderPolicy {
    pub thresholds: RenderThresholds,
}

impl RenderPolicy {
    pub fn new(thresholds: RenderThresholds) -> Self {
        Self { thresholds }
    }

    pub fn tier(&self, scale: f64) -> LodTier {
        if scale < self.thresholds.box_below {
            LodTier::Box
        } else if scale < self.thresholds.detailed_from {
            LodTier::Simple
        } else {
            LodTier::Detailed
        }
    }

    #[inline]
    pub fn shows_text(&self, scale: f64) -> bool {
        scale >= self.thresholds.text_from
    }

    /// 详细层级下的画笔宽度（像素）。线宽不大于 0 时返回 0。
    pub fn pen_width(&self, lineweight: u32, scale: f64) -> f64 {
        if lineweight == 0 {
            return 0.0;
        }
        let mut width = f64::from(lineweight) / 100.0 * PEN_SCALE;
        if scale > self.thresholds.width_boost_above {
            width *= PEN_BOOST;
        }
        width.max(MIN_PEN_WIDTH)
    }

    #[inline]
    pub fn decimates(&self, simplify: bool, vertices: usize, scale: f64) -> bool {
        simplify
            && vertices > self.thresholds.decimate_min_vertices
            && scale < self.thresholds.decimate_below
    }

    fn stroke(&self, primitive: &Primitive, tier: LodTier, scale: f64) -> Stroke {
        match tier {
            LodTier::Detailed => Stroke {
                color: primitive.color,
                width: self.pen_width(primitive.lineweight, scale),
                dashes: dash_pattern(&primitive.linetype),
            },
            _ => Stroke::cosmetic(primitive.color),
        }
    }

    /// 生成一个图层在给定比例下的绘制指令。隐藏图层不产生指令。
    pub fn plan_layer(&self, group: &LayerGroup, scale: f64, simplify: bool) -> Vec<DrawCommand> {
        if !group.visible || group.is_empty() {
            return Vec::new();
        }
        let tier = self.tier(scale);
        if tier == LodTier::Box {
            return vec![DrawCommand::Rect {
                bounds: group.bounds,
                stroke: Stroke::cosmetic(BOX_PEN),
            }];
        }

        let show_text = self.shows_text(scale);
        let mut commands = Vec::with_capacity(group.len());
        for primitive in &group.primitives {
            let stroke = self.stroke(primitive, tier, scale);
            match &primitive.geometry {
                PrimitiveGeometry::Line { start, end } => commands.push(DrawCommand::Line {
                    from: *start,
                    to: *end,
                    stroke,
                }),
                PrimitiveGeometry::Polyline { points, closed } => {
                    let step = if self.decimates(simplify, points.len(), scale) {
                        self.thresholds.decimate_step
                    } else {
                        1
                    };
                    let segments = decimated_segments(points, *closed, step);
                    if !segments.is_empty() {
                        commands.push(DrawCommand::Segments { segments, stroke });
                    }
                }
                PrimitiveGeometry::Circle { center, radius } => {
                    commands.push(DrawCommand::Circle {
                        center: *center,
                        radius: *radius,
                        stroke,
                    })
                }
                PrimitiveGeometry::Arc {
                    center,
                    radius,
                    start_angle,
                    end_angle,
                } => {
                    let mut sweep = end_angle - start_angle;
                    if sweep < 0.0 {
                        sweep += 360.0;
                    }
                    commands.push(DrawCommand::Arc {
                        center: *center,
                        radius: *radius,
                        start_angle: *start_angle,
                        sweep,
                        stroke,
                    });
                }
                PrimitiveGeometry::Hatch { loops, .. } => {
                    for ring in loops {
                        commands.push(DrawCommand::Polygon {
                            points: ring.clone(),
                            stroke: stroke.clone(),
                        });
                    }
                }
                PrimitiveGeometry::Text {
                    insert,
                    height,
                    rotation,
                    value,
                }
                | PrimitiveGeometry::MText {
                    insert,
                    height,
                    rotation,
                    value,
                } => {
                    if show_text {
                        commands.push(DrawCommand::Text {
                            position: *insert,
                            value: value.clone(),
                            font_size: height * scale * FONT_SCALE,
                            rotation: *rotation,
                            color: primitive.color,
                        });
                    }
                }
            }
        }
        commands
    }
}
