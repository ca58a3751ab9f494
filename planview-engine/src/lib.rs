pub mod command;
pub mod extents;
pub mod extract;
pub mod layers;
pub mod lod;
pub mod primitive;
pub mod resolver;
pub mod transform;

pub use extract::{ExtractOptions, Extraction, ExtractionStats, extract};
pub use primitive::{Primitive, PrimitiveGeometry, PrimitiveKind};

pub mod errors {
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum EngineError {
        #[error("场景中没有可用的图形范围")]
        NoExtents,
        #[error("图层 {0} 不存在")]
        LayerNotFound(String),
        #[error("参数无效: {0}")]
        InvalidArgument(String),
    }

    /// 单个实体的数据错误，只导致该实体被丢弃。
    #[derive(Debug, Error, PartialEq, Eq)]
    pub enum EntityError {
        #[error("{kind} 含有非有限坐标")]
        NonFiniteCoordinate { kind: &'static str },
        #[error("{kind} 的 {field} 不是有限数值")]
        NonFiniteValue {
            kind: &'static str,
            field: &'static str,
        },
    }
}

pub use errors::{EngineError, EntityError};

pub mod scene {
    use planview_core::document::Document;
    use planview_core::geometry::{Bounds2D, Point2};
    use tracing::{debug, info};

    use crate::errors::EngineError;
    use crate::extents::compute_extents;
    use crate::extract::{ExtractOptions, ExtractionStats, extract};
    use crate::layers::{LayerGroup, group_with_order};
    use crate::lod::{DrawCommand, RenderPolicy};
    use crate::primitive::Primitive;

    const DEFAULT_SCALE: f64 = 1.0;
    const MIN_SCALE: f64 = 1e-6;
    const MAX_SCALE: f64 = 1e6;
    /// 缩放到全图时四周保留的比例。
    pub const ZOOM_EXTENTS_MARGIN: f64 = 0.08;

    /// 视口状态：中心点与比例（每模型单位对应的像素数）。
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub struct ViewportState {
        pub center: Point2,
        pub scale: f64,
    }

    impl ViewportState {
        #[inline]
        fn clamp_scale(value: f64) -> f64 {
            value.clamp(MIN_SCALE, MAX_SCALE)
        }
    }

    impl Default for ViewportState {
        fn default() -> Self {
            Self {
                center: Point2::new(0.0, 0.0),
                scale: DEFAULT_SCALE,
            }
        }
    }

    /// 让 `extents` 外扩 `margin` 后完整落入 `width × height` 像素的视口。
    pub fn fit_extents(extents: &Bounds2D, width: f64, height: f64, margin: f64) -> ViewportState {
        let span_x = extents.width().max(f64::EPSILON) * (1.0 + 2.0 * margin);
        let span_y = extents.height().max(f64::EPSILON) * (1.0 + 2.0 * margin);
        let scale = (width.max(1.0) / span_x).min(height.max(1.0) / span_y);
        ViewportState {
            center: extents.center(),
            scale: ViewportState::clamp_scale(scale),
        }
    }

    /// 引擎层负责维护已加载文档、按图层分组的图元与视图状态。
    #[derive(Debug)]
    pub struct Scene {
        document: Document,
        layers: Vec<LayerGroup>,
        /// 展开顺序中每个图元的（组序号, 组内序号）。
        order: Vec<(usize, usize)>,
        stats: ExtractionStats,
        extents: Option<Bounds2D>,
        viewport: ViewportState,
        viewport_size: (f64, f64),
        simplify: bool,
    }

    impl Scene {
        pub fn new() -> Self {
            Self {
                document: Document::new(),
                layers: Vec::new(),
                order: Vec::new(),
                stats: ExtractionStats::default(),
                extents: None,
                viewport: ViewportState::default(),
                viewport_size: (1280.0, 800.0),
                simplify: false,
            }
        }

        /// 替换当前文档：重新展开图元、分组并缩放到全图。旧图元整体丢弃。
        pub fn load(&mut self, document: Document, options: &ExtractOptions) -> &ExtractionStats {
            let extraction = extract(&document, options);
            let computed = compute_extents(&extraction.primitives);
            self.extents = document
                .header_extents()
                .and_then(|header| header.to_bounds())
                .or(computed);
            self.document = document;
            self.stats = extraction.stats;
            (self.layers, self.order) = group_with_order(extraction.primitives);
            self.viewport = ViewportState::default();
            if self.zoom_extents().is_err() {
                debug!("文档没有可用范围，保持默认视口");
            }
            info!(
                layers = self.layers.len(),
                primitives = self.primitive_count(),
                "场景已加载"
            );
            &self.stats
        }

        #[inline]
        pub fn document(&self) -> &Document {
            &self.document
        }

        #[inline]
        pub fn stats(&self) -> &ExtractionStats {
            &self.stats
        }

        #[inline]
        pub fn extents(&self) -> Option<Bounds2D> {
            self.extents
        }

        #[inline]
        pub fn layers(&self) -> &[LayerGroup] {
            &self.layers
        }

        pub fn layer(&self, name: &str) -> Option<&LayerGroup> {
            self.layers
                .iter()
                .find(|group| group.name.eq_ignore_ascii_case(name))
        }

        /// 按展开顺序遍历全部图元。
        pub fn primitives(&self) -> impl Iterator<Item = &Primitive> + '_ {
            self.order
                .iter()
                .map(|&(group, slot)| &self.layers[group].primitives[slot])
        }

        pub fn primitive_count(&self) -> usize {
            self.layers.iter().map(LayerGroup::len).sum()
        }

        /// 设置图层显隐。图层不存在时返回错误。
        pub fn set_layer_visible(&mut self, name: &str, visible: bool) -> Result<(), EngineError> {
            let group = self
                .layers
                .iter_mut()
                .find(|group| group.name.eq_ignore_ascii_case(name))
                .ok_or_else(|| EngineError::LayerNotFound(name.to_string()))?;
            group.visible = visible;
            Ok(())
        }

        #[inline]
        pub fn viewport(&self) -> ViewportState {
            self.viewport
        }

        /// 设置视口像素尺寸，不改变当前中心与比例。
        pub fn set_viewport_size(&mut self, width: f64, height: f64) {
            self.viewport_size = (width.max(1.0), height.max(1.0));
        }

        #[inline]
        pub fn viewport_size(&self) -> (f64, f64) {
            self.viewport_size
        }

        pub fn set_viewport_scale(&mut self, scale: f64) {
            self.viewport.scale = ViewportState::clamp_scale(scale);
        }

        /// 按乘法因子调整比例。
        pub fn scale_viewport(&mut self, factor: f64) {
            let current = self.viewport.scale;
            let target = if factor.is_finite() && factor > 0.0 {
                current * factor
            } else {
                current
            };
            self.set_viewport_scale(target);
        }

        /// 缩放到全图范围（外扩 8%）。
        pub fn zoom_extents(&mut self) -> Result<(), EngineError> {
            let extents = self.extents.ok_or(EngineError::NoExtents)?;
            let (width, height) = self.viewport_size;
            self.viewport = fit_extents(&extents, width, height, ZOOM_EXTENTS_MARGIN);
            Ok(())
        }

        #[inline]
        pub fn simplify(&self) -> bool {
            self.simplify
        }

        pub fn set_simplify(&mut self, simplify: bool) {
            self.simplify = simplify;
        }

        /// 切换折线抽稀，返回切换后的状态。
        pub fn toggle_simplify(&mut self) -> bool {
            self.simplify = !self.simplify;
            self.simplify
        }

        /// 以当前视口比例为所有可见图层生成绘制指令。
        pub fn plan(&self, policy: &RenderPolicy) -> Vec<DrawCommand> {
            let scale = self.viewport.scale;
            self.layers
                .iter()
                .flat_map(|group| policy.plan_layer(group, scale, self.simplify))
                .collect()
        }
    }

    impl Default for Scene {
        fn default() -> Self {
            Self::new()
        }
    }

    #[cfg(test)]
    mod tests {
        use planview_core::document::{HeaderExtents, Layer};
        use planview_core::geometry::Point3;

        use super::*;

        fn sample_document() -> Document {
            let mut document = Document::new();
            document.add_layer(Layer::new("GEOM").with_color(1));
            document.add_line(Point2::new(-10.0, -10.0), Point2::new(0.0, 10.0), "GEOM");
            document.add_circle(Point2::new(10.0, 0.0), 5.0, "ANNOT");
            document
        }

        #[test]
        fn load_groups_primitives_and_frames_extents() {
            let mut scene = Scene::new();
            scene.set_viewport_size(1000.0, 1000.0);
            let stats = scene.load(sample_document(), &ExtractOptions::default()).clone();

            assert_eq!(stats.entity_errors, 0);
            assert_eq!(scene.primitive_count(), 2);
            assert_eq!(scene.layers().len(), 2);
            assert_eq!(scene.extents().unwrap().to_tuple(), (-10.0, -10.0, 15.0, 10.0));

            let viewport = scene.viewport();
            assert!((viewport.center.x() - 2.5).abs() < 1e-9);
            assert!(viewport.center.y().abs() < 1e-9);
            assert!((viewport.scale - 1000.0 / (25.0 * 1.16)).abs() < 1e-9);
        }

        #[test]
        fn primitives_keep_extraction_order_across_layers() {
            let mut document = Document::new();
            document.add_line(Point2::new(0.0, 0.0), Point2::new(1.0, 0.0), "A");
            document.add_circle(Point2::new(0.0, 0.0), 1.0, "B");
            document.add_line(Point2::new(0.0, 1.0), Point2::new(1.0, 1.0), "A");
            document.add_circle(Point2::new(0.0, 0.0), 2.0, "C");
            let mut scene = Scene::new();
            scene.load(document, &ExtractOptions::default());

            let layers: Vec<&str> = scene.primitives().map(|p| p.layer.as_str()).collect();
            assert_eq!(layers, ["A", "B", "A", "C"]);
            assert_eq!(scene.layers().len(), 3);
        }

        #[test]
        fn header_extents_take_precedence() {
            let mut document = sample_document();
            document.set_header_extents(HeaderExtents {
                min: Point3::new(0.0, 0.0, 0.0),
                max: Point3::new(100.0, 50.0, 0.0),
            });
            let mut scene = Scene::new();
            scene.load(document, &ExtractOptions::default());
            assert_eq!(scene.extents().unwrap().to_tuple(), (0.0, 0.0, 100.0, 50.0));
        }

        #[test]
        fn empty_scene_cannot_zoom_extents() {
            let mut scene = Scene::new();
            scene.load(Document::new(), &ExtractOptions::default());
            assert!(matches!(scene.zoom_extents(), Err(EngineError::NoExtents)));
            assert_eq!(scene.viewport(), ViewportState::default());
        }

        #[test]
        fn layer_visibility_and_plans() {
            let mut scene = Scene::new();
            scene.load(sample_document(), &ExtractOptions::default());
            scene.set_viewport_scale(1.0);
            let policy = RenderPolicy::default();
            assert_eq!(scene.plan(&policy).len(), 2);

            scene.set_layer_visible("geom", false).unwrap();
            assert_eq!(scene.plan(&policy).len(), 1);

            let err = scene.set_layer_visible("NOPE", true).unwrap_err();
            assert!(matches!(err, EngineError::LayerNotFound(_)));
        }

        #[test]
        fn viewport_scale_is_clamped() {
            let mut scene = Scene::new();
            scene.set_viewport_scale(1e9);
            assert!((scene.viewport().scale - MAX_SCALE).abs() < f64::EPSILON);
            scene.set_viewport_scale(2.0);
            scene.scale_viewport(0.5);
            assert!((scene.viewport().scale - 1.0).abs() < f64::EPSILON);
            scene.scale_viewport(f64::NAN);
            assert!((scene.viewport().scale - 1.0).abs() < f64::EPSILON);
        }

        #[test]
        fn fit_extents_handles_degenerate_boxes() {
            let point = Bounds2D::new(Point2::new(3.0, 4.0), Point2::new(3.0, 4.0));
            let viewport = fit_extents(&point, 800.0, 600.0, ZOOM_EXTENTS_MARGIN);
            assert!(viewport.scale.is_finite());
            assert!((viewport.scale - MAX_SCALE).abs() < f64::EPSILON);
            assert_eq!(viewport.center, Point2::new(3.0, 4.0));
        }
    }
}
