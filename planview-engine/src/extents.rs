use planview_core::geometry::{Bounds2D, Point2};

use crate::primitive::{Primitive, PrimitiveGeometry};

/// 场景布局包围盒的留白。
pub const LAYOUT_PADDING: f64 = 1.5;
/// 估算文字宽度时使用的字宽系数。
const TEXT_WIDTH_FACTOR: f64 = 0.6;

fn include_square(bounds: &mut Bounds2D, center: Point2, radius: f64) {
    let r = radius.abs();
    bounds.include_point(Point2::new(center.x() - r, center.y() - r));
    bounds.include_point(Point2::new(center.x() + r, center.y() + r));
}

fn include_shape(bounds: &mut Bounds2D, geometry: &PrimitiveGeometry) -> bool {
    match geometry {
        PrimitiveGeometry::Line { start, end } => {
            bounds.include_point(*start);
            bounds.include_point(*end);
        }
        PrimitiveGeometry::Polyline { points, .. } => {
            points.iter().for_each(|p| bounds.include_point(*p));
        }
        PrimitiveGeometry::Hatch { loops, .. } => {
            loops.iter().flatten().for_each(|p| bounds.include_point(*p));
        }
        // 圆弧按整圆估算
        PrimitiveGeometry::Circle { center, radius }
        | PrimitiveGeometry::Arc { center, radius, .. } => include_square(bounds, *center, *radius),
        PrimitiveGeometry::Text { .. } | PrimitiveGeometry::MText { .. } => return false,
    }
    true
}

/// 图元集合的包围矩形；没有任何坐标点时返回 `None`。文字只计插入点。
pub fn compute_extents<'a, I>(primitives: I) -> Option<Bounds2D>
where
    I: IntoIterator<Item = &'a Primitive>,
{
    let mut bounds = Bounds2D::empty();
    for primitive in primitives {
        if !include_shape(&mut bounds, &primitive.geometry) {
            if let PrimitiveGeometry::Text { insert, .. } | PrimitiveGeometry::MText { insert, .. } =
                &primitive.geometry
            {
                bounds.include_point(*insert);
            }
        }
    }
    if bounds.is_empty() { None } else { Some(bounds) }
}

/// 场景布局用的包围盒：文字按 `0.6h × h` 估算占位，结果四周留白 1.5 个单位。
/// 输入为空时得到原点处的留白矩形。
pub fn layout_bounds<'a, I>(primitives: I) -> Bounds2D
where
    I: IntoIterator<Item = &'a Primitive>,
{
    let mut bounds = Bounds2D::empty();
    for primitive in primitives {
        match &primitive.geometry {
            PrimitiveGeometry::Text { insert, height, .. }
            | PrimitiveGeometry::MText { insert, height, .. } => {
                bounds.include_point(*insert);
                bounds.include_point(Point2::new(
                    insert.x() + TEXT_WIDTH_FACTOR * height,
                    insert.y() + height,
                ));
            }
            geometry => {
                include_shape(&mut bounds, geometry);
            }
        }
    }
    if bounds.is_empty() {
        bounds = Bounds2D::new(Point2::new(0.0, 0.0), Point2::new(0.0, 0.0));
    }
    bounds.padded(LAYOUT_PADDING)
}
