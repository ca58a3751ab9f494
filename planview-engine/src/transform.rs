use glam::{DAffine3, DVec3};
use planview_core::document::Insert;
use planview_core::geometry::{Point2, Point3};

/// 块参照累积出的仿射变换。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform(DAffine3);

impl Transform {
    pub const IDENTITY: Transform = Transform(DAffine3::IDENTITY);

    /// 单个块参照的局部变换：先减去块基点，再非均匀缩放、绕 Z 旋转，最后平移到插入点。
    pub fn for_insert(insert: &Insert, base_point: Point3) -> Self {
        let affine = DAffine3::from_translation(insert.insert.as_vec3())
            * DAffine3::from_rotation_z(insert.rotation.to_radians())
            * DAffine3::from_scale(insert.scale.as_vec3())
            * DAffine3::from_translation(-base_point.as_vec3());
        Self(affine)
    }

    /// `self` 作为父级，返回 `self * local`。
    #[inline]
    pub fn then(&self, local: &Transform) -> Transform {
        Transform(self.0 * local.0)
    }

    #[inline]
    pub fn apply(&self, point: Point3) -> Point3 {
        Point3::from(self.0.transform_point3(point.as_vec3()))
    }

    #[inline]
    pub fn apply_2d(&self, point: Point2) -> Point2 {
        self.0
            .transform_point3(DVec3::new(point.x(), point.y(), 0.0))
            .truncate()
            .into()
    }

    pub fn is_finite(&self) -> bool {
        self.0.is_finite()
    }

    #[inline]
    pub fn as_affine(&self) -> DAffine3 {
        self.0
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// 在父变换下嵌套一个块参照。父变换缺省时视为单位变换。
pub fn compose(parent: Option<&Transform>, insert: &Insert, base_point: Point3) -> Transform {
    let local = Transform::for_insert(insert, base_point);
    match parent {
        Some(parent) => parent.then(&local),
        None => local,
    }
}

pub fn apply(transform: Option<&Transform>, point: Point3) -> Point3 {
    match transform {
        Some(transform) => transform.apply(point),
        None => point,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn insert(at: (f64, f64), scale: (f64, f64), rotation: f64) -> Insert {
        let mut insert = Insert::new("B", Point3::new(at.0, at.1, 0.0), "0");
        insert.scale = Point3::new(scale.0, scale.1, 1.0);
        insert.rotation = rotation;
        insert
    }

    fn assert_close(actual: Point3, x: f64, y: f64) {
        assert!((actual.x() - x).abs() < 1e-9, "x: {} != {}", actual.x(), x);
        assert!((actual.y() - y).abs() < 1e-9, "y: {} != {}", actual.y(), y);
    }

    #[test]
    fn absent_transform_is_identity() {
        let point = Point3::new(3.0, -4.0, 1.0);
        assert_eq!(apply(None, point), point);
        assert_eq!(Transform::IDENTITY.apply(point), point);
    }

    #[test]
    fn insert_applies_base_point_scale_rotation_translation() {
        let insert = insert((10.0, 5.0), (2.0, 3.0), 90.0);
        let transform = compose(None, &insert, Point3::new(1.0, 1.0, 0.0));
        // (2,2) - base = (1,1) -> scale (2,3) -> rotate 90 -> (-3,2) -> + (10,5)
        assert_close(transform.apply(Point3::new(2.0, 2.0, 0.0)), 7.0, 7.0);
        assert_close(transform.apply(Point3::new(1.0, 1.0, 0.0)), 10.0, 5.0);
    }

    #[test]
    fn nested_inserts_compose_parent_first() {
        let outer = insert((100.0, 0.0), (1.0, 1.0), 90.0);
        let inner = insert((10.0, 0.0), (2.0, 2.0), 0.0);
        let origin = Point3::new(0.0, 0.0, 0.0);

        let parent = compose(None, &outer, origin);
        let total = compose(Some(&parent), &inner, origin);

        // inner: (1,0) -> (12,0); outer: rotate 90 -> (0,12) -> (100,12)
        assert_close(total.apply(Point3::new(1.0, 0.0, 0.0)), 100.0, 12.0);
    }

    #[test]
    fn planar_application_matches_spatial() {
        let transform = compose(None, &insert((4.0, 2.0), (1.5, 0.5), 30.0), Point3::new(0.0, 0.0, 0.0));
        let planar = transform.apply_2d(Point2::new(3.0, 7.0));
        let spatial = transform.apply(Point3::new(3.0, 7.0, 0.0));
        assert!((planar.x() - spatial.x()).abs() < 1e-12);
        assert!((planar.y() - spatial.y()).abs() < 1e-12);
    }
}
