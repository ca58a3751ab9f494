pub mod geometry {
    use glam::{DVec2, DVec3};
    use serde::{Deserialize, Serialize};

    /// 二维点，内部以 `glam::DVec2` 表示。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Point2(pub DVec2);

    impl Point2 {
        #[inline]
        pub fn new(x: f64, y: f64) -> Self {
            Self(DVec2::new(x, y))
        }

        #[inline]
        pub fn from_vec(vec: DVec2) -> Self {
            Self(vec)
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }

        #[inline]
        pub fn translate(self, offset: Vector2) -> Self {
            Self(self.0 + offset.0)
        }

        #[inline]
        pub fn as_vec2(self) -> DVec2 {
            self.0
        }

        #[inline]
        pub fn is_finite(self) -> bool {
            self.0.is_finite()
        }

        /// 两点在各轴上的差值都不超过 `tolerance` 时视为重合。
        #[inline]
        pub fn coincides_with(self, other: Point2, tolerance: f64) -> bool {
            (self.x() - other.x()).abs() <= tolerance && (self.y() - other.y()).abs() <= tolerance
        }
    }

    impl From<DVec2> for Point2 {
        fn from(value: DVec2) -> Self {
            Self::from_vec(value)
        }
    }

    /// 二维向量。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Vector2(pub DVec2);

    impl Vector2 {
        #[inline]
        pub fn new(x: f64, y: f64) -> Self {
            Self(DVec2::new(x, y))
        }

        #[inline]
        pub fn length(self) -> f64 {
            self.0.length()
        }

        /// 相对 X 轴的方向角（弧度）。
        #[inline]
        pub fn angle(self) -> f64 {
            self.0.y.atan2(self.0.x)
        }

        #[inline]
        pub fn as_vec2(self) -> DVec2 {
            self.0
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }
    }

    impl From<DVec2> for Vector2 {
        fn from(value: DVec2) -> Self {
            Self(value)
        }
    }

    /// 三维点。DXF 中的大部分坐标都带 Z 值，块变换在三维空间中进行。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Point3(pub DVec3);

    impl Point3 {
        #[inline]
        pub fn new(x: f64, y: f64, z: f64) -> Self {
            Self(DVec3::new(x, y, z))
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }

        #[inline]
        pub fn z(self) -> f64 {
            self.0.z
        }

        #[inline]
        pub fn as_vec3(self) -> DVec3 {
            self.0
        }

        /// 投影到 XY 平面。
        #[inline]
        pub fn xy(self) -> Point2 {
            Point2::new(self.0.x, self.0.y)
        }

        #[inline]
        pub fn is_finite(self) -> bool {
            self.0.is_finite()
        }
    }

    impl From<DVec3> for Point3 {
        fn from(value: DVec3) -> Self {
            Self(value)
        }
    }

    impl From<Point2> for Point3 {
        fn from(value: Point2) -> Self {
            Self::new(value.x(), value.y(), 0.0)
        }
    }

    /// 轴对齐边界框，用于估算文档/图元范围。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Bounds2D {
        min: Point2,
        max: Point2,
    }

    impl Bounds2D {
        #[inline]
        pub fn new(min: Point2, max: Point2) -> Self {
            Self { min, max }
        }

        #[inline]
        pub fn empty() -> Self {
            Self {
                min: Point2::new(f64::INFINITY, f64::INFINITY),
                max: Point2::new(f64::NEG_INFINITY, f64::NEG_INFINITY),
            }
        }

        #[inline]
        pub fn is_empty(&self) -> bool {
            self.min.x() > self.max.x() || self.min.y() > self.max.y()
        }

        #[inline]
        pub fn min(&self) -> Point2 {
            self.min
        }

        #[inline]
        pub fn max(&self) -> Point2 {
            self.max
        }

        #[inline]
        pub fn width(&self) -> f64 {
            self.max.x() - self.min.x()
        }

        #[inline]
        pub fn height(&self) -> f64 {
            self.max.y() - self.min.y()
        }

        pub fn include_point(&mut self, point: Point2) {
            if self.is_empty() {
                self.min = point;
                self.max = point;
                return;
            }
            let min_vec = self.min.as_vec2().min(point.as_vec2());
            let max_vec = self.max.as_vec2().max(point.as_vec2());
            self.min = Point2::from_vec(min_vec);
            self.max = Point2::from_vec(max_vec);
        }

        pub fn include_bounds(&mut self, other: &Bounds2D) {
            if other.is_empty() {
                return;
            }
            self.include_point(other.min);
            self.include_point(other.max);
        }

        /// 四周各扩展 `margin`，空框保持为空。
        pub fn padded(&self, margin: f64) -> Bounds2D {
            if self.is_empty() {
                return *self;
            }
            let pad = glam::DVec2::splat(margin);
            Bounds2D::new(
                Point2::from_vec(self.min.as_vec2() - pad),
                Point2::from_vec(self.max.as_vec2() + pad),
            )
        }

        #[inline]
        pub fn center(&self) -> Point2 {
            debug_assert!(!self.is_empty());
            let center = (self.min.as_vec2() + self.max.as_vec2()) * 0.5;
            Point2::from_vec(center)
        }

        /// 以 `(xmin, ymin, xmax, ymax)` 形式返回。
        #[inline]
        pub fn to_tuple(&self) -> (f64, f64, f64, f64) {
            (self.min.x(), self.min.y(), self.max.x(), self.max.y())
        }
    }
}

/// AutoCAD 颜色索引（ACI）与 RGB 的换算。
pub mod color {
    use serde::{Deserialize, Serialize};

    /// 组码 62 中表示“随块”的颜色号。
    pub const BYBLOCK: i16 = 0;
    /// 组码 62 中表示“随层”的颜色号。
    pub const BYLAYER: i16 = 256;
    /// 图层缺失或未定义颜色时使用的颜色号（白/黑，取决于背景）。
    pub const DEFAULT_INDEX: i16 = 7;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct Rgb {
        pub r: u8,
        pub g: u8,
        pub b: u8,
    }

    impl Rgb {
        #[inline]
        pub const fn new(r: u8, g: u8, b: u8) -> Self {
            Self { r, g, b }
        }

        /// 形如 `#rrggbb` 的十六进制表示。
        pub fn to_hex(self) -> String {
            format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        }
    }

    /// 颜色表查不到时的中性灰。
    pub const FALLBACK: Rgb = Rgb::new(200, 200, 210);

    const GRAYS: [Rgb; 6] = [
        Rgb::new(51, 51, 51),
        Rgb::new(91, 91, 91),
        Rgb::new(132, 132, 132),
        Rgb::new(173, 173, 173),
        Rgb::new(214, 214, 214),
        Rgb::new(255, 255, 255),
    ];

    const LEVELS: [f64; 5] = [1.0, 0.8, 0.6, 0.5, 0.3];

    const fn channel(value: f64) -> u8 {
        (value * 255.0 + 1e-9) as u8
    }

    // 10..=249：每 10 个索引一个色相（步长 15°），偶数为全饱和、奇数为半饱和，
    // 个位数每两档降低一次明度。
    const fn hue_entry(index: usize) -> Rgb {
        let step = index / 10 - 1;
        let value = LEVELS[(index % 10) / 2];
        let saturation = if index % 2 == 0 { 1.0 } else { 0.5 };
        let fraction = (step % 4) as f64 / 4.0;
        let p = value * (1.0 - saturation);
        let q = value * (1.0 - saturation * fraction);
        let t = value * (1.0 - saturation * (1.0 - fraction));
        let (r, g, b) = match step / 4 {
            0 => (value, t, p),
            1 => (q, value, p),
            2 => (p, value, t),
            3 => (p, q, value),
            4 => (t, p, value),
            _ => (value, p, q),
        };
        Rgb::new(channel(r), channel(g), channel(b))
    }

    const fn palette_entry(index: usize) -> Rgb {
        match index {
            0 => Rgb::new(0, 0, 0),
            1 => Rgb::new(255, 0, 0),
            2 => Rgb::new(255, 255, 0),
            3 => Rgb::new(0, 255, 0),
            4 => Rgb::new(0, 255, 255),
            5 => Rgb::new(0, 0, 255),
            6 => Rgb::new(255, 0, 255),
            7 => Rgb::new(255, 255, 255),
            8 => Rgb::new(128, 128, 128),
            9 => Rgb::new(192, 192, 192),
            250..=255 => GRAYS[index - 250],
            _ => hue_entry(index),
        }
    }

    const fn build_palette() -> [Rgb; 256] {
        let mut table = [Rgb::new(0, 0, 0); 256];
        let mut index = 0;
        while index < 256 {
            table[index] = palette_entry(index);
            index += 1;
        }
        table
    }

    /// 标准 256 色 ACI 调色板。
    pub const ACI_PALETTE: [Rgb; 256] = build_palette();

    /// 颜色号转 RGB；超出 0..=255 时返回 `None`。
    pub fn aci_to_rgb(index: i32) -> Option<Rgb> {
        usize::try_from(index)
            .ok()
            .and_then(|idx| ACI_PALETTE.get(idx).copied())
    }

}

/// MTEXT 富文本格式码的剥离。
pub mod mtext {
    use thiserror::Error;

    #[derive(Debug, Error, PartialEq, Eq)]
    pub enum MTextError {
        #[error("格式码 \\{code} 缺少结束分号")]
        UnterminatedCode { code: char },
    }

    /// 将 MTEXT 内容转换为纯文本：段落符变为换行，字体/颜色/高度等格式码与分组花括号被移除，
    /// 堆叠分数以 `上/下` 形式输出。
    pub fn plain_text(raw: &str) -> Result<String, MTextError> {
        let mut result = String::with_capacity(raw.len());
        let mut chars = raw.chars().peekable();
        while let Some(ch) = chars.next() {
            match ch {
                '\\' => match chars.next() {
                    Some('P') => result.push('\n'),
                    Some('~') => result.push(' '),
                    Some(literal @ ('\\' | '{' | '}')) => result.push(literal),
                    Some(code @ ('A' | 'C' | 'c' | 'F' | 'f' | 'H' | 'Q' | 'T' | 'W' | 'p')) => {
                        skip_to_terminator(&mut chars, code)?;
                    }
                    Some('L' | 'l' | 'O' | 'o' | 'K' | 'k' | 'N' | 'X') => {}
                    Some('S') => {
                        let mut stacked = String::new();
                        let mut terminated = false;
                        for next in chars.by_ref() {
                            if next == ';' {
                                terminated = true;
                                break;
                            }
                            stacked.push(next);
                        }
                        if !terminated {
                            return Err(MTextError::UnterminatedCode { code: 'S' });
                        }
                        result.push_str(&stacked.replace(['^', '#'], "/"));
                    }
                    Some(other) => {
                        result.push('\\');
                        result.push(other);
                    }
                    None => result.push('\\'),
                },
                '{' | '}' => {}
                '%' if chars.peek() == Some(&'%') => {
                    chars.next();
                    match chars.next() {
                        Some('c') | Some('C') => result.push('\u{2300}'),
                        Some('d') | Some('D') => result.push('\u{00B0}'),
                        Some('p') | Some('P') => result.push('\u{00B1}'),
                        Some('%') => result.push('%'),
                        Some(other) => {
                            result.push_str("%%");
                            result.push(other);
                        }
                        None => result.push_str("%%"),
                    }
                }
                other => result.push(other),
            }
        }
        Ok(result)
    }

    fn skip_to_terminator(
        chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
        code: char,
    ) -> Result<(), MTextError> {
        for next in chars.by_ref() {
            if next == ';' {
                return Ok(());
            }
        }
        Err(MTextError::UnterminatedCode { code })
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn paragraphs_and_groups_are_flattened() {
            let text = plain_text(r"{\fArial|b1;Line1}\PLine2").unwrap();
            assert_eq!(text, "Line1\nLine2");
        }

        #[test]
        fn stacked_fractions_and_special_chars() {
            let text = plain_text(r"\S1^2; %%d\~x").unwrap();
            assert_eq!(text, "1/2 \u{00B0} x");
        }

        #[test]
        fn escaped_braces_survive() {
            assert_eq!(plain_text(r"a\{b\}").unwrap(), "a{b}");
        }

        #[test]
        fn unterminated_height_code_is_an_error() {
            let err = plain_text(r"\H2.5xTitle").unwrap_err();
            assert_eq!(err, MTextError::UnterminatedCode { code: 'H' });
        }
    }
}

pub mod document {
    use std::collections::HashMap;

    use serde::{Deserialize, Serialize};

    use crate::geometry::{Bounds2D, Point2, Point3, Vector2};
    use crate::mtext::{self, MTextError};

    /// 组码 370 中的保留线宽值。
    pub const LINEWEIGHT_BYLAYER: i16 = -1;
    pub const LINEWEIGHT_BYBLOCK: i16 = -2;
    pub const LINEWEIGHT_DEFAULT: i16 = -3;

    #[inline]
    pub fn is_lineweight_sentinel(value: i16) -> bool {
        matches!(
            value,
            LINEWEIGHT_BYLAYER | LINEWEIGHT_BYBLOCK | LINEWEIGHT_DEFAULT
        )
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct EntityId(u64);

    impl EntityId {
        #[inline]
        pub fn new(raw: u64) -> Self {
            Self(raw)
        }

        #[inline]
        pub fn get(self) -> u64 {
            self.0
        }
    }

    /// 图层表记录。颜色号为负表示图层关闭（DXF 约定），`is_off` 同时反映这一点。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Layer {
        pub name: String,
        pub color: Option<i16>,
        pub lineweight: Option<i16>,
        pub linetype: String,
        pub is_off: bool,
        pub is_frozen: bool,
        pub is_locked: bool,
    }

    impl Layer {
        #[inline]
        pub fn new(name: impl Into<String>) -> Self {
            Self {
                name: name.into(),
                color: Some(crate::color::DEFAULT_INDEX),
                lineweight: Some(LINEWEIGHT_DEFAULT),
                linetype: "CONTINUOUS".to_string(),
                is_off: false,
                is_frozen: false,
                is_locked: false,
            }
        }

        pub fn with_color(mut self, color: i16) -> Self {
            self.color = Some(color);
            self.is_off = color < 0;
            self
        }

        pub fn with_lineweight(mut self, lineweight: i16) -> Self {
            self.lineweight = Some(lineweight);
            self
        }

        pub fn with_linetype(mut self, linetype: impl Into<String>) -> Self {
            self.linetype = linetype.into();
            self
        }

        pub fn frozen(mut self) -> Self {
            self.is_frozen = true;
            self
        }

        pub fn off(mut self) -> Self {
            self.is_off = true;
            self
        }

        /// 图层既未关闭也未冻结。
        #[inline]
        pub fn is_visible(&self) -> bool {
            !self.is_off && !self.is_frozen
        }
    }

    /// 所有实体共享的通用属性（组码 8/62/370/6/60）。未写出的属性保持 `None`。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct EntityProperties {
        pub layer: String,
        pub color: Option<i16>,
        pub lineweight: Option<i16>,
        pub linetype: Option<String>,
        pub invisible: bool,
    }

    impl EntityProperties {
        pub fn on_layer(layer: impl Into<String>) -> Self {
            Self {
                layer: layer.into(),
                color: None,
                lineweight: None,
                linetype: None,
                invisible: false,
            }
        }

        pub fn with_color(mut self, color: i16) -> Self {
            self.color = Some(color);
            self
        }

        pub fn with_lineweight(mut self, lineweight: i16) -> Self {
            self.lineweight = Some(lineweight);
            self
        }

        pub fn with_linetype(mut self, linetype: impl Into<String>) -> Self {
            self.linetype = Some(linetype.into());
            self
        }
    }

    impl Default for EntityProperties {
        fn default() -> Self {
            Self::on_layer("0")
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub enum Entity {
        Line(Line),
        LwPolyline(LwPolyline),
        Polyline(Polyline),
        Circle(Circle),
        Arc(Arc),
        Text(Text),
        MText(MText),
        Hatch(Hatch),
        Insert(Insert),
        /// 未识别的实体类型，仅保留类型名与通用属性。
        Other(OtherEntity),
    }

    impl Entity {
        pub fn properties(&self) -> &EntityProperties {
            match self {
                Entity::Line(line) => &line.properties,
                Entity::LwPolyline(polyline) => &polyline.properties,
                Entity::Polyline(polyline) => &polyline.properties,
                Entity::Circle(circle) => &circle.properties,
                Entity::Arc(arc) => &arc.properties,
                Entity::Text(text) => &text.properties,
                Entity::MText(mtext) => &mtext.properties,
                Entity::Hatch(hatch) => &hatch.properties,
                Entity::Insert(insert) => &insert.properties,
                Entity::Other(other) => &other.properties,
            }
        }

        #[inline]
        pub fn layer_name(&self) -> &str {
            &self.properties().layer
        }

        /// DXF 类型名，用于统计与日志。
        pub fn type_name(&self) -> &str {
            match self {
                Entity::Line(_) => "LINE",
                Entity::LwPolyline(_) => "LWPOLYLINE",
                Entity::Polyline(_) => "POLYLINE",
                Entity::Circle(_) => "CIRCLE",
                Entity::Arc(_) => "ARC",
                Entity::Text(_) => "TEXT",
                Entity::MText(_) => "MTEXT",
                Entity::Hatch(_) => "HATCH",
                Entity::Insert(_) => "INSERT",
                Entity::Other(other) => &other.kind,
            }
        }

        /// 实体自身坐标下的 2D 范围；块参照与文字退化为插入点，圆弧按整圆估算。
        pub fn bounds(&self) -> Option<Bounds2D> {
            let mut bounds = Bounds2D::empty();
            match self {
                Entity::Line(line) => {
                    bounds.include_point(line.start.xy());
                    bounds.include_point(line.end.xy());
                }
                Entity::LwPolyline(polyline) => {
                    for vertex in &polyline.vertices {
                        bounds.include_point(*vertex);
                    }
                }
                Entity::Polyline(polyline) => {
                    for vertex in &polyline.vertices {
                        bounds.include_point(vertex.xy());
                    }
                }
                Entity::Circle(Circle { center, radius, .. })
                | Entity::Arc(Arc { center, radius, .. }) => {
                    let radius = radius.abs();
                    bounds.include_point(Point2::new(center.x() - radius, center.y() - radius));
                    bounds.include_point(Point2::new(center.x() + radius, center.y() + radius));
                }
                Entity::Text(text) => bounds.include_point(text.insert.xy()),
                Entity::MText(mtext) => bounds.include_point(mtext.insert.xy()),
                Entity::Insert(insert) => bounds.include_point(insert.insert.xy()),
                Entity::Hatch(hatch) => {
                    for path in &hatch.paths {
                        include_boundary_bounds(path, &mut bounds);
                    }
                }
                Entity::Other(_) => {}
            }
            if bounds.is_empty() { None } else { Some(bounds) }
        }
    }

    fn include_boundary_bounds(path: &BoundaryPath, bounds: &mut Bounds2D) {
        match path {
            BoundaryPath::Polyline { vertices, .. } => {
                for vertex in vertices {
                    bounds.include_point(*vertex);
                }
            }
            BoundaryPath::Edges(edges) => {
                for edge in edges {
                    match edge {
                        HatchEdge::Line { start, end } => {
                            bounds.include_point(*start);
                            bounds.include_point(*end);
                        }
                        HatchEdge::Arc { center, radius, .. } => {
                            let r = radius.abs();
                            bounds.include_point(Point2::new(center.x() - r, center.y() - r));
                            bounds.include_point(Point2::new(center.x() + r, center.y() + r));
                        }
                        HatchEdge::Ellipse {
                            center, major_axis, ..
                        } => {
                            let r = major_axis.length();
                            bounds.include_point(Point2::new(center.x() - r, center.y() - r));
                            bounds.include_point(Point2::new(center.x() + r, center.y() + r));
                        }
                        HatchEdge::Spline { control_points } => {
                            for point in control_points {
                                bounds.include_point(*point);
                            }
                        }
                    }
                }
            }
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Line {
        pub start: Point3,
        pub end: Point3,
        pub properties: EntityProperties,
    }

    /// 轻量多段线（LWPOLYLINE），顶点直接存储为二维坐标。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct LwPolyline {
        pub vertices: Vec<Point2>,
        pub is_closed: bool,
        pub properties: EntityProperties,
    }

    /// 重型多段线（POLYLINE + VERTEX 子实体），顶点保留完整的三维位置。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Polyline {
        pub vertices: Vec<Point3>,
        pub is_closed: bool,
        pub properties: EntityProperties,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Circle {
        pub center: Point3,
        pub radius: f64,
        pub properties: EntityProperties,
    }

    /// 圆弧，角度以度为单位，逆时针为正。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Arc {
        pub center: Point3,
        pub radius: f64,
        pub start_angle: f64,
        pub end_angle: f64,
        pub properties: EntityProperties,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Text {
        pub insert: Point3,
        pub value: String,
        pub height: Option<f64>,
        pub rotation: f64,
        pub properties: EntityProperties,
    }

    /// 多行文字。`content` 保留原始富文本，`plain_text` 负责剥离格式码。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct MText {
        pub insert: Point3,
        pub content: String,
        pub char_height: Option<f64>,
        pub rotation: f64,
        pub properties: EntityProperties,
    }

    impl MText {
        pub fn plain_text(&self) -> Result<String, MTextError> {
            mtext::plain_text(&self.content)
        }
    }

    /// 填充边界的单条边，角度以度、椭圆参数以弧度存储。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub enum HatchEdge {
        Line {
            start: Point2,
            end: Point2,
        },
        Arc {
            center: Point2,
            radius: f64,
            start_angle: f64,
            end_angle: f64,
            is_counter_clockwise: bool,
        },
        Ellipse {
            center: Point2,
            major_axis: Vector2,
            ratio: f64,
            start_parameter: f64,
            end_parameter: f64,
            is_counter_clockwise: bool,
        },
        Spline {
            control_points: Vec<Point2>,
        },
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub enum BoundaryPath {
        Edges(Vec<HatchEdge>),
        Polyline { vertices: Vec<Point2>, is_closed: bool },
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Hatch {
        pub pattern_name: String,
        pub is_solid: bool,
        pub paths: Vec<BoundaryPath>,
        pub properties: EntityProperties,
    }

    /// 块参照（INSERT）。旋转以度为单位。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Insert {
        pub block_name: String,
        pub insert: Point3,
        pub scale: Point3,
        pub rotation: f64,
        pub properties: EntityProperties,
    }

    impl Insert {
        pub fn new(block_name: impl Into<String>, insert: Point3, layer: impl Into<String>) -> Self {
            Self {
                block_name: block_name.into(),
                insert,
                scale: Point3::new(1.0, 1.0, 1.0),
                rotation: 0.0,
                properties: EntityProperties::on_layer(layer),
            }
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct OtherEntity {
        pub kind: String,
        pub properties: EntityProperties,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct BlockDefinition {
        pub name: String,
        pub base_point: Point3,
        pub entities: Vec<Entity>,
    }

    impl BlockDefinition {
        pub fn new(name: impl Into<String>) -> Self {
            Self {
                name: name.into(),
                base_point: Point3::new(0.0, 0.0, 0.0),
                entities: Vec::new(),
            }
        }
    }

    /// 文件头中声明的范围（`$EXTMIN` / `$EXTMAX`）。
    #[derive(Debug, Clone, Copy, Serialize, Deserialize)]
    pub struct HeaderExtents {
        pub min: Point3,
        pub max: Point3,
    }

    impl HeaderExtents {
        /// 头部范围常以 ±1e20 作为“未设置”，此时视为无效。
        pub fn to_bounds(&self) -> Option<Bounds2D> {
            let valid = [self.min, self.max]
                .iter()
                .all(|p| p.is_finite() && p.x().abs() < 1e19 && p.y().abs() < 1e19);
            if !valid || self.min.x() > self.max.x() || self.min.y() > self.max.y() {
                return None;
            }
            Some(Bounds2D::new(self.min.xy(), self.max.xy()))
        }
    }

    fn table_key(name: &str) -> String {
        name.to_ascii_uppercase()
    }

    /// 已解析的文档对象图。图层与块名按 DXF 约定不区分大小写。
    #[derive(Debug, Default, Clone, Serialize, Deserialize)]
    pub struct Document {
        layers: Vec<Layer>,
        layer_index: HashMap<String, usize>,
        entities: Vec<(EntityId, Entity)>,
        next_entity_id: u64,
        blocks: HashMap<String, BlockDefinition>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        header_extents: Option<HeaderExtents>,
        #[serde(default)]
        skipped_entities: usize,
    }

    impl Document {
        pub fn new() -> Self {
            let mut doc = Self::default();
            doc.ensure_layer("0");
            doc
        }

        pub fn ensure_layer(&mut self, name: impl AsRef<str>) {
            let key = table_key(name.as_ref());
            if !self.layer_index.contains_key(&key) {
                self.layer_index.insert(key, self.layers.len());
                self.layers.push(Layer::new(name.as_ref()));
            }
        }

        /// 插入或替换同名图层。
        pub fn add_layer(&mut self, layer: Layer) {
            let key = table_key(&layer.name);
            match self.layer_index.get(&key) {
                Some(&slot) => self.layers[slot] = layer,
                None => {
                    self.layer_index.insert(key, self.layers.len());
                    self.layers.push(layer);
                }
            }
        }

        pub fn layer(&self, name: &str) -> Option<&Layer> {
            self.layer_index
                .get(&table_key(name))
                .map(|&slot| &self.layers[slot])
        }

        pub fn layers(&self) -> impl Iterator<Item = &Layer> {
            self.layers.iter()
        }

        /// 添加模型空间实体。实体引用的图层不会被自动创建，
        /// 以保留“图层缺失”这一输入状态。
        pub fn add_entity(&mut self, entity: Entity) -> EntityId {
            let id = self.next_id();
            self.entities.push((id, entity));
            id
        }

        pub fn add_line(&mut self, start: Point2, end: Point2, layer: impl Into<String>) -> EntityId {
            let layer = layer.into();
            self.ensure_layer(&layer);
            self.add_entity(Entity::Line(Line {
                start: start.into(),
                end: end.into(),
                properties: EntityProperties::on_layer(layer),
            }))
        }

        pub fn add_circle(
            &mut self,
            center: Point2,
            radius: f64,
            layer: impl Into<String>,
        ) -> EntityId {
            let layer = layer.into();
            self.ensure_layer(&layer);
            self.add_entity(Entity::Circle(Circle {
                center: center.into(),
                radius,
                properties: EntityProperties::on_layer(layer),
            }))
        }

        pub fn add_polyline<I>(&mut self, vertices: I, is_closed: bool, layer: impl Into<String>) -> EntityId
        where
            I: IntoIterator<Item = Point2>,
        {
            let layer = layer.into();
            self.ensure_layer(&layer);
            self.add_entity(Entity::LwPolyline(LwPolyline {
                vertices: vertices.into_iter().collect(),
                is_closed,
                properties: EntityProperties::on_layer(layer),
            }))
        }

        pub fn entities(&self) -> impl Iterator<Item = &(EntityId, Entity)> {
            self.entities.iter()
        }

        pub fn entity_count(&self) -> usize {
            self.entities.len()
        }

        pub fn entity(&self, id: EntityId) -> Option<&Entity> {
            self.entities
                .iter()
                .find(|(entity_id, _)| *entity_id == id)
                .map(|(_, entity)| entity)
        }

        pub fn add_block_definition(&mut self, definition: BlockDefinition) {
            self.blocks.insert(table_key(&definition.name), definition);
        }

        pub fn block(&self, name: &str) -> Option<&BlockDefinition> {
            self.blocks.get(&table_key(name))
        }

        pub fn blocks(&self) -> impl Iterator<Item = &BlockDefinition> {
            self.blocks.values()
        }

        pub fn set_header_extents(&mut self, extents: HeaderExtents) {
            self.header_extents = Some(extents);
        }

        pub fn header_extents(&self) -> Option<HeaderExtents> {
            self.header_extents
        }

        /// 记录一个读取时因数据无效而丢弃的实体。
        pub fn record_skipped_entity(&mut self) {
            self.skipped_entities += 1;
        }

        pub fn skipped_entities(&self) -> usize {
            self.skipped_entities
        }

        /// 模型空间实体自身坐标的合并范围（不展开块）。
        pub fn bounds(&self) -> Option<Bounds2D> {
            let mut bounds = Bounds2D::empty();
            for (_, entity) in &self.entities {
                if let Some(entity_bounds) = entity.bounds() {
                    bounds.include_bounds(&entity_bounds);
                }
            }
            if bounds.is_empty() { None } else { Some(bounds) }
        }

        fn next_id(&mut self) -> EntityId {
            let id = EntityId::new(self.next_entity_id);
            self.next_entity_id += 1;
            id
        }
    }

}
