use planview_core::color::Rgb;
use planview_core::geometry::Point2;
use serde::Serialize;

use crate::resolver::AttributeSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PrimitiveKind {
    Line,
    Polyline,
    Circle,
    Arc,
    Text,
    MText,
    Hatch,
}

impl PrimitiveKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PrimitiveKind::Line => "LINE",
            PrimitiveKind::Polyline => "POLYLINE",
            PrimitiveKind::Circle => "CIRCLE",
            PrimitiveKind::Arc => "ARC",
            PrimitiveKind::Text => "TEXT",
            PrimitiveKind::MText => "MTEXT",
            PrimitiveKind::Hatch => "HATCH",
        }
    }
}

/// 模型空间下的图元几何。角度一律为度。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PrimitiveGeometry {
    Line {
        start: Point2,
        end: Point2,
    },
    Polyline {
        points: Vec<Point2>,
        closed: bool,
    },
    Circle {
        center: Point2,
        radius: f64,
    },
    Arc {
        center: Point2,
        radius: f64,
        start_angle: f64,
        end_angle: f64,
    },
    Text {
        insert: Point2,
        height: f64,
        rotation: f64,
        value: String,
    },
    MText {
        insert: Point2,
        height: f64,
        rotation: f64,
        value: String,
    },
    Hatch {
        loops: Vec<Vec<Point2>>,
        solid: bool,
    },
}

impl PrimitiveGeometry {
    pub fn kind(&self) -> PrimitiveKind {
        match self {
            PrimitiveGeometry::Line { .. } => PrimitiveKind::Line,
            PrimitiveGeometry::Polyline { .. } => PrimitiveKind::Polyline,
            PrimitiveGeometry::Circle { .. } => PrimitiveKind::Circle,
            PrimitiveGeometry::Arc { .. } => PrimitiveKind::Arc,
            PrimitiveGeometry::Text { .. } => PrimitiveKind::Text,
            PrimitiveGeometry::MText { .. } => PrimitiveKind::MText,
            PrimitiveGeometry::Hatch { .. } => PrimitiveKind::Hatch,
        }
    }
}

/// 属性已完全解析的可绘制图元。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Primitive {
    pub layer: String,
    pub color: Rgb,
    pub geometry: PrimitiveGeometry,
    pub lineweight: u32,
    pub lineweight_raw: Option<i16>,
    pub lineweight_source: AttributeSource,
    pub linetype: String,
    pub linetype_raw: Option<String>,
    pub linetype_source: AttributeSource,
    pub source_block: Option<String>,
}

impl Primitive {
    #[inline]
    pub fn kind(&self) -> PrimitiveKind {
        self.geometry.kind()
    }

    #[inline]
    pub fn is_from_block(&self) -> bool {
        self.source_block.is_some()
    }
}
