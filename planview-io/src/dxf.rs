//! 最小化的 ASCII DXF 读取器，只覆盖提取管线所需的对象图。

use planview_core::document::{
    Arc, BlockDefinition, BoundaryPath, Circle, Document, Entity, EntityProperties, Hatch,
    HatchEdge, HeaderExtents, Insert, Layer, Line, LwPolyline, MText, OtherEntity, Polyline, Text,
};
use planview_core::geometry::{Point2, Point3, Vector2};
use tracing::debug;

#[derive(Debug)]
pub(crate) enum DxfError {
    NotDxf { message: String },
    Invalid { message: String },
}

impl DxfError {
    fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    fn message(&self) -> &str {
        match self {
            DxfError::NotDxf { message } | DxfError::Invalid { message } => message,
        }
    }
}

type Pair = (i32, String);

/// 已完整读出的实体组码；POLYLINE 附带其 VERTEX 主体。
struct RawEntity {
    kind: String,
    body: Vec<Pair>,
    vertices: Vec<Vec<Pair>>,
}

pub(crate) struct DxfParser<'a> {
    reader: DxfReader<'a>,
}

impl<'a> DxfParser<'a> {
    pub(crate) fn new(source: &'a str) -> Self {
        Self {
            reader: DxfReader::new(source.trim_start_matches('\u{feff}')),
        }
    }

    pub(crate) fn parse(mut self) -> Result<Document, DxfError> {
        let mut document = Document::new();

        let first = match self.reader.next_pair() {
            Ok(Some(pair)) => pair,
            Ok(None) => {
                return Err(DxfError::NotDxf {
                    message: "文件为空".to_string(),
                });
            }
            Err(DxfError::Invalid { message }) | Err(DxfError::NotDxf { message }) => {
                return Err(DxfError::NotDxf { message });
            }
        };
        self.reader.put_back(first);

        while let Some((code, value)) = self.reader.next_pair()? {
            if code == 999 {
                continue;
            }
            if code != 0 {
                return Err(DxfError::invalid(format!(
                    "意外的组码 {code}（期望 0 表示 SECTION/EOF）"
                )));
            }
            match value.trim() {
                "SECTION" => {
                    let (name_code, name) = self
                        .reader
                        .next_pair()?
                        .ok_or_else(|| DxfError::invalid("SECTION 缺少名称（组码 2）"))?;
                    if name_code != 2 {
                        return Err(DxfError::invalid(format!(
                            "SECTION 名称使用了组码 {name_code}（期望 2）"
                        )));
                    }
                    match name.trim() {
                        "HEADER" => self.parse_header(&mut document)?,
                        "TABLES" => self.parse_tables(&mut document)?,
                        "BLOCKS" => self.parse_blocks(&mut document)?,
                        "ENTITIES" => self.parse_entities(&mut document)?,
                        _ => self.skip_section()?,
                    }
                }
                "EOF" => break,
                unexpected => {
                    return Err(DxfError::invalid(format!(
                        "意外的标记 {unexpected}，期望 SECTION 或 EOF"
                    )));
                }
            }
        }
        Ok(document)
    }

    fn skip_section(&mut self) -> Result<(), DxfError> {
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) if value.trim() == "ENDSEC" => break,
                Some(_) => continue,
                None => return Err(DxfError::invalid("SECTION 未找到 ENDSEC 终止标记")),
            }
        }
        Ok(())
    }

    fn parse_header(&mut self, document: &mut Document) -> Result<(), DxfError> {
        let mut current: Option<String> = None;
        let mut min = [0.0_f64; 3];
        let mut max = [0.0_f64; 3];
        let mut seen_min = false;
        let mut seen_max = false;
        loop {
            let (code, value) = self
                .reader
                .next_pair()?
                .ok_or_else(|| DxfError::invalid("HEADER 段提前结束"))?;
            match code {
                0 if value.trim() == "ENDSEC" => break,
                9 => current = Some(value.trim().to_string()),
                10 | 20 | 30 => {
                    let axis = (code / 10 - 1) as usize;
                    match current.as_deref() {
                        Some("$EXTMIN") => {
                            min[axis] = parse_f64(&value, "$EXTMIN")?;
                            seen_min = true;
                        }
                        Some("$EXTMAX") => {
                            max[axis] = parse_f64(&value, "$EXTMAX")?;
                            seen_max = true;
                        }
                        _ => {}
                    }
                }
                _ => {}
            }
        }
        if seen_min && seen_max {
            document.set_header_extents(HeaderExtents {
                min: Point3::new(min[0], min[1], min[2]),
                max: Point3::new(max[0], max[1], max[2]),
            });
        }
        Ok(())
    }

    fn parse_tables(&mut self, document: &mut Document) -> Result<(), DxfError> {
        loop {
            let (code, value) = self
                .reader
                .next_pair()?
                .ok_or_else(|| DxfError::invalid("TABLES 段提前结束"))?;
            if code != 0 {
                continue;
            }
            match value.trim() {
                "ENDSEC" => break,
                "LAYER" => {
                    let body = self.read_body()?;
                    if let Some(layer) = layer_from_body(&body)? {
                        document.add_layer(layer);
                    }
                }
                _ => {
                    self.read_body()?;
                }
            }
        }
        Ok(())
    }

    fn parse_blocks(&mut self, document: &mut Document) -> Result<(), DxfError> {
        loop {
            let (code, value) = self
                .reader
                .next_pair()?
                .ok_or_else(|| DxfError::invalid("BLOCKS 段提前结束"))?;
            if code != 0 {
                return Err(DxfError::invalid(format!(
                    "BLOCKS 段遇到组码 {code}（期望 0 表示实体起始）"
                )));
            }
            match value.trim() {
                "ENDSEC" => break,
                "BLOCK" => {
                    let definition = self.parse_block_definition(document)?;
                    document.add_block_definition(definition);
                }
                _ => {
                    // 未预期的条目，直接跳过
                    self.read_body()?;
                }
            }
        }
        Ok(())
    }

    fn parse_block_definition(
        &mut self,
        document: &mut Document,
    ) -> Result<BlockDefinition, DxfError> {
        let header = self.read_body()?;
        let fields = Fields(&header);
        let name = fields
            .text(2)
            .or_else(|| fields.text(3))
            .ok_or_else(|| DxfError::invalid("BLOCK 缺少名称（组码 2）"))?;
        let mut definition = BlockDefinition::new(name.trim());
        definition.base_point = fields.point(10, "BLOCK 基点")?;

        loop {
            let (code, value) = self
                .reader
                .next_pair()?
                .ok_or_else(|| DxfError::invalid("BLOCK 定义未找到 ENDBLK 终止标记"))?;
            if code != 0 {
                return Err(DxfError::invalid(format!(
                    "BLOCK {} 内遇到组码 {code}（期望 0）",
                    definition.name
                )));
            }
            match value.trim() {
                "ENDBLK" => {
                    self.read_body()?;
                    break;
                }
                kind => {
                    if let Some(entity) = self.parse_entity(kind, document)? {
                        definition.entities.push(entity);
                    }
                }
            }
        }
        Ok(definition)
    }

    fn parse_entities(&mut self, document: &mut Document) -> Result<(), DxfError> {
        loop {
            let (code, value) = self
                .reader
                .next_pair()?
                .ok_or_else(|| DxfError::invalid("ENTITIES 段提前结束"))?;
            if code != 0 {
                return Err(DxfError::invalid(format!(
                    "ENTITIES 段遇到组码 {code}（期望 0 表示实体起始）"
                )));
            }
            match value.trim() {
                "ENDSEC" => break,
                kind => {
                    if let Some(entity) = self.parse_entity(kind, document)? {
                        document.add_entity(entity);
                    }
                }
            }
        }
        Ok(())
    }

    /// 读取并解码一个实体。组码流本身的错误是致命的；
    /// 实体数据无效时只丢弃该实体并计数。
    fn parse_entity(
        &mut self,
        kind: &str,
        document: &mut Document,
    ) -> Result<Option<Entity>, DxfError> {
        let raw = self.read_entity(kind)?;
        match decode_entity(&raw) {
            Ok(entity) => Ok(entity),
            Err(err) => {
                document.record_skipped_entity();
                debug!(kind = %raw.kind, error = err.message(), "实体数据无效，已跳过");
                Ok(None)
            }
        }
    }

    fn read_entity(&mut self, kind: &str) -> Result<RawEntity, DxfError> {
        let body = self.read_body()?;
        let vertices = if kind == "POLYLINE" {
            self.read_vertex_sequence()?
        } else {
            Vec::new()
        };
        Ok(RawEntity {
            kind: kind.to_string(),
            body,
            vertices,
        })
    }

    /// 读取 POLYLINE 之后的 VERTEX 主体，直到 SEQEND 或下一个实体。
    fn read_vertex_sequence(&mut self) -> Result<Vec<Vec<Pair>>, DxfError> {
        let mut vertices = Vec::new();
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => match value.trim() {
                    "VERTEX" => vertices.push(self.read_body()?),
                    "SEQEND" => {
                        self.read_body()?;
                        break;
                    }
                    _ => {
                        self.reader.put_back((0, value));
                        break;
                    }
                },
                Some(_) => continue,
                None => return Err(DxfError::invalid("POLYLINE 缺少 SEQEND")),
            }
        }
        Ok(vertices)
    }

    /// 读取当前实体的全部组码对，直到下一个组码 0。
    fn read_body(&mut self) -> Result<Vec<Pair>, DxfError> {
        let mut body = Vec::new();
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some(pair) => body.push(pair),
                None => break,
            }
        }
        Ok(body)
    }
}

/// 把实体组码解码为文档实体。块属性与序列结束标记不作为实体返回。
fn decode_entity(raw: &RawEntity) -> Result<Option<Entity>, DxfError> {
    let body = raw.body.as_slice();
    let fields = Fields(body);
    let entity = match raw.kind.as_str() {
        "LINE" => Entity::Line(Line {
            start: fields.point(10, "LINE 起点")?,
            end: fields.point(11, "LINE 终点")?,
            properties: fields.properties()?,
        }),
        "CIRCLE" => Entity::Circle(Circle {
            center: fields.point(10, "CIRCLE 圆心")?,
            radius: fields.required_f64(40, "CIRCLE 半径")?,
            properties: fields.properties()?,
        }),
        "ARC" => Entity::Arc(Arc {
            center: fields.point(10, "ARC 圆心")?,
            radius: fields.required_f64(40, "ARC 半径")?,
            start_angle: fields.f64_or(50, 0.0, "ARC 起始角")?,
            end_angle: fields.f64_or(51, 360.0, "ARC 终止角")?,
            properties: fields.properties()?,
        }),
        "LWPOLYLINE" => Entity::LwPolyline(LwPolyline {
            vertices: lwpolyline_vertices(body)?,
            is_closed: fields.i16_or(70, 0, "LWPOLYLINE 标志")? & 1 != 0,
            properties: fields.properties()?,
        }),
        "POLYLINE" => Entity::Polyline(polyline_from_raw(&fields, &raw.vertices)?),
        "TEXT" => Entity::Text(Text {
            insert: fields.point(10, "TEXT 插入点")?,
            value: fields.text(1).unwrap_or_default(),
            height: fields.f64(40, "TEXT 高度")?,
            rotation: fields.f64_or(50, 0.0, "TEXT 旋转角")?,
            properties: fields.properties()?,
        }),
        "MTEXT" => Entity::MText(mtext_from_fields(body, &fields)?),
        "HATCH" => Entity::Hatch(hatch_from_body(body, &fields)?),
        "INSERT" => Entity::Insert(Insert {
            block_name: fields
                .text(2)
                .ok_or_else(|| DxfError::invalid("INSERT 缺少块名（组码 2）"))?
                .trim()
                .to_string(),
            insert: fields.point(10, "INSERT 插入点")?,
            scale: Point3::new(
                fields.f64_or(41, 1.0, "INSERT X 比例")?,
                fields.f64_or(42, 1.0, "INSERT Y 比例")?,
                fields.f64_or(43, 1.0, "INSERT Z 比例")?,
            ),
            rotation: fields.f64_or(50, 0.0, "INSERT 旋转角")?,
            properties: fields.properties()?,
        }),
        "ATTRIB" | "ATTDEF" | "SEQEND" | "VERTEX" => return Ok(None),
        other => {
            debug!(kind = other, "未识别的实体类型，按占位实体保留");
            Entity::Other(OtherEntity {
                kind: other.to_string(),
                properties: fields.properties()?,
            })
        }
    };
    Ok(Some(entity))
}

fn polyline_from_raw(header: &Fields<'_>, vertex_bodies: &[Vec<Pair>]) -> Result<Polyline, DxfError> {
    let flags = header.i16_or(70, 0, "POLYLINE 标志")?;
    let mut vertices = Vec::with_capacity(vertex_bodies.len());
    for body in vertex_bodies {
        let fields = Fields(body);
        let vertex_flags = fields.i16_or(70, 0, "VERTEX 标志")?;
        // 样条控制点不属于可见轮廓
        if vertex_flags & 16 == 0 {
            vertices.push(fields.point(10, "VERTEX 位置")?);
        }
    }
    Ok(Polyline {
        vertices,
        is_closed: flags & 1 != 0,
        properties: header.properties()?,
    })
}

/// 实体主体的组码视图。同一组码出现多次时取第一次。
struct Fields<'a>(&'a [Pair]);

impl Fields<'_> {
    fn raw(&self, code: i32) -> Option<&str> {
        self.0
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, value)| value.as_str())
    }

    fn text(&self, code: i32) -> Option<String> {
        self.raw(code).map(str::to_string)
    }

    fn f64(&self, code: i32, context: &str) -> Result<Option<f64>, DxfError> {
        self.raw(code).map(|raw| parse_f64(raw, context)).transpose()
    }

    fn f64_or(&self, code: i32, default: f64, context: &str) -> Result<f64, DxfError> {
        Ok(self.f64(code, context)?.unwrap_or(default))
    }

    fn required_f64(&self, code: i32, context: &str) -> Result<f64, DxfError> {
        self.f64(code, context)?
            .ok_or_else(|| DxfError::invalid(format!("{context} 缺失（组码 {code}）")))
    }

    fn i16(&self, code: i32, context: &str) -> Result<Option<i16>, DxfError> {
        self.raw(code).map(|raw| parse_i16(raw, context)).transpose()
    }

    fn i16_or(&self, code: i32, default: i16, context: &str) -> Result<i16, DxfError> {
        Ok(self.i16(code, context)?.unwrap_or(default))
    }

    /// 读取 `code`/`code+10`/`code+20` 三个坐标分量，缺失分量为 0。
    fn point(&self, code: i32, context: &str) -> Result<Point3, DxfError> {
        Ok(Point3::new(
            self.f64_or(code, 0.0, context)?,
            self.f64_or(code + 10, 0.0, context)?,
            self.f64_or(code + 20, 0.0, context)?,
        ))
    }

    fn properties(&self) -> Result<EntityProperties, DxfError> {
        let layer = self
            .raw(8)
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or("0");
        Ok(EntityProperties {
            layer: layer.to_string(),
            color: self.i16(62, "颜色号")?,
            lineweight: self.i16(370, "线宽")?,
            linetype: self.raw(6).map(|name| name.trim().to_string()),
            invisible: self.i16_or(60, 0, "可见性")? != 0,
        })
    }
}

fn layer_from_body(body: &[Pair]) -> Result<Option<Layer>, DxfError> {
    let fields = Fields(body);
    let Some(name) = fields.raw(2).map(str::trim).filter(|name| !name.is_empty()) else {
        return Ok(None);
    };
    let mut layer = Layer::new(name);
    if let Some(color) = fields.i16(62, "图层颜色")? {
        layer.color = Some(color);
        layer.is_off = color < 0;
    }
    let flags = fields.i16_or(70, 0, "图层标志")?;
    layer.is_frozen = flags & 1 != 0;
    layer.is_locked = flags & 4 != 0;
    if let Some(linetype) = fields.raw(6) {
        layer.linetype = linetype.trim().to_string();
    }
    if let Some(lineweight) = fields.i16(370, "图层线宽")? {
        layer.lineweight = Some(lineweight);
    }
    Ok(Some(layer))
}

fn lwpolyline_vertices(body: &[Pair]) -> Result<Vec<Point2>, DxfError> {
    let mut vertices: Vec<Point2> = Vec::new();
    for (code, value) in body {
        match code {
            10 => vertices.push(Point2::new(parse_f64(value, "LWPOLYLINE 顶点 X")?, 0.0)),
            20 => {
                let y = parse_f64(value, "LWPOLYLINE 顶点 Y")?;
                let last = vertices
                    .last_mut()
                    .ok_or_else(|| DxfError::invalid("LWPOLYLINE 顶点 Y 缺少对应的 X"))?;
                *last = Point2::new(last.x(), y);
            }
            _ => {}
        }
    }
    Ok(vertices)
}

fn mtext_from_fields(body: &[Pair], fields: &Fields<'_>) -> Result<MText, DxfError> {
    // 长文本以组码 3 分块，组码 1 为最后一块
    let mut content = String::new();
    for (code, value) in body {
        if *code == 3 {
            content.push_str(value);
        }
    }
    if let Some(tail) = fields.raw(1) {
        content.push_str(tail);
    }

    let rotation = match fields.f64(50, "MTEXT 旋转角")? {
        Some(rotation) => rotation,
        None => {
            let dx = fields.f64_or(11, 1.0, "MTEXT 方向 X")?;
            let dy = fields.f64_or(21, 0.0, "MTEXT 方向 Y")?;
            dy.atan2(dx).to_degrees()
        }
    };

    Ok(MText {
        insert: fields.point(10, "MTEXT 插入点")?,
        content,
        char_height: fields.f64(40, "MTEXT 字高")?,
        rotation,
        properties: fields.properties()?,
    })
}

#[derive(Default)]
struct EdgeFields {
    kind: i16,
    values: Vec<(i32, f64)>,
    spline_fit_seen: bool,
}

impl EdgeFields {
    fn get(&self, code: i32) -> Option<f64> {
        self.values
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, value)| *value)
    }

    fn point(&self, code: i32) -> Point2 {
        Point2::new(
            self.get(code).unwrap_or(0.0),
            self.get(code + 10).unwrap_or(0.0),
        )
    }

    fn finish(self) -> Option<HatchEdge> {
        let ccw = self.get(73).is_none_or(|flag| flag != 0.0);
        match self.kind {
            1 => Some(HatchEdge::Line {
                start: self.point(10),
                end: self.point(11),
            }),
            2 => Some(HatchEdge::Arc {
                center: self.point(10),
                radius: self.get(40).unwrap_or(0.0),
                start_angle: self.get(50).unwrap_or(0.0),
                end_angle: self.get(51).unwrap_or(360.0),
                is_counter_clockwise: ccw,
            }),
            3 => {
                let axis = self.point(11);
                Some(HatchEdge::Ellipse {
                    center: self.point(10),
                    major_axis: Vector2::new(axis.x(), axis.y()),
                    ratio: self.get(40).unwrap_or(1.0),
                    start_parameter: self.get(50).unwrap_or(0.0).to_radians(),
                    end_parameter: self.get(51).unwrap_or(360.0).to_radians(),
                    is_counter_clockwise: ccw,
                })
            }
            4 => {
                let xs = self.values.iter().filter(|(c, _)| *c == 10).map(|(_, v)| *v);
                let ys = self.values.iter().filter(|(c, _)| *c == 20).map(|(_, v)| *v);
                Some(HatchEdge::Spline {
                    control_points: xs.zip(ys).map(|(x, y)| Point2::new(x, y)).collect(),
                })
            }
            _ => None,
        }
    }
}

enum PathBuilder {
    Polyline {
        vertices: Vec<Point2>,
        pending_x: Option<f64>,
        is_closed: bool,
    },
    Edges {
        edges: Vec<HatchEdge>,
        current: Option<EdgeFields>,
    },
}

impl PathBuilder {
    fn new(flags: i32) -> Self {
        if flags & 0x02 != 0 {
            Self::Polyline {
                vertices: Vec::new(),
                pending_x: None,
                is_closed: false,
            }
        } else {
            Self::Edges {
                edges: Vec::new(),
                current: None,
            }
        }
    }

    /// 处理一对组码；返回 `false` 表示该组码结束了当前边界。
    fn accept(&mut self, code: i32, value: &str) -> Result<bool, DxfError> {
        match self {
            PathBuilder::Polyline {
                vertices,
                pending_x,
                is_closed,
            } => match code {
                73 => *is_closed = parse_i16(value, "HATCH 边界闭合标志")? != 0,
                10 => *pending_x = Some(parse_f64(value, "HATCH 顶点 X")?),
                20 => {
                    let y = parse_f64(value, "HATCH 顶点 Y")?;
                    let x = pending_x
                        .take()
                        .ok_or_else(|| DxfError::invalid("HATCH 顶点 Y 缺少对应的 X"))?;
                    vertices.push(Point2::new(x, y));
                }
                97 => return Ok(false),
                _ => {}
            },
            PathBuilder::Edges { edges, current } => match code {
                72 => {
                    if let Some(edge) = current.take().and_then(EdgeFields::finish) {
                        edges.push(edge);
                    }
                    *current = Some(EdgeFields {
                        kind: parse_i16(value, "HATCH 边类型")?,
                        ..EdgeFields::default()
                    });
                }
                93 => {}
                97 => match current {
                    Some(edge) if edge.kind == 4 && !edge.spline_fit_seen => {
                        edge.spline_fit_seen = true;
                    }
                    _ => return Ok(false),
                },
                _ => {
                    if let Some(edge) = current.as_mut() {
                        if let Ok(number) = value.trim().parse::<f64>() {
                            edge.values.push((code, number));
                        }
                    }
                }
            },
        }
        Ok(true)
    }

    fn finish(self) -> BoundaryPath {
        match self {
            PathBuilder::Polyline {
                vertices,
                is_closed,
                ..
            } => BoundaryPath::Polyline {
                vertices,
                is_closed,
            },
            PathBuilder::Edges { mut edges, current } => {
                if let Some(edge) = current.and_then(EdgeFields::finish) {
                    edges.push(edge);
                }
                BoundaryPath::Edges(edges)
            }
        }
    }
}

fn hatch_from_body(body: &[Pair], fields: &Fields<'_>) -> Result<Hatch, DxfError> {
    let mut pattern_name = String::new();
    let mut is_solid = false;
    let mut expected_paths = 0usize;
    let mut in_boundary = false;
    let mut paths: Vec<BoundaryPath> = Vec::new();
    let mut current: Option<PathBuilder> = None;

    for (code, value) in body {
        let code = *code;
        if !in_boundary {
            if paths.len() >= expected_paths && expected_paths > 0 {
                // 边界数据之后的图案定义与种子点
                continue;
            }
            match code {
                2 => pattern_name = value.trim().to_string(),
                70 => is_solid = parse_i16(value, "HATCH 实体填充标志")? != 0,
                91 => {
                    expected_paths = usize::try_from(parse_i16(value, "HATCH 边界数")?).unwrap_or(0);
                    in_boundary = expected_paths > 0;
                }
                _ => {}
            }
            continue;
        }

        match code {
            92 => {
                if let Some(path) = current.take() {
                    paths.push(path.finish());
                }
                let flags = i32::from(parse_i16(value, "HATCH 边界类型")?);
                current = Some(PathBuilder::new(flags));
            }
            75 | 76 => {
                if let Some(path) = current.take() {
                    paths.push(path.finish());
                }
                in_boundary = false;
            }
            _ => {
                if let Some(path) = current.as_mut() {
                    if !path.accept(code, value)? {
                        if let Some(path) = current.take() {
                            paths.push(path.finish());
                        }
                        if paths.len() >= expected_paths {
                            in_boundary = false;
                        }
                    }
                }
            }
        }
    }
    if let Some(path) = current.take() {
        paths.push(path.finish());
    }

    Ok(Hatch {
        pattern_name,
        is_solid,
        paths,
        properties: fields.properties()?,
    })
}

struct DxfReader<'a> {
    lines: std::str::Lines<'a>,
    buffer: Option<Pair>,
    line_number: usize,
}

impl<'a> DxfReader<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            lines: source.lines(),
            buffer: None,
            line_number: 0,
        }
    }

    fn next_pair(&mut self) -> Result<Option<Pair>, DxfError> {
        if let Some(pair) = self.buffer.take() {
            return Ok(Some(pair));
        }

        let code_line = loop {
            match self.lines.next() {
                Some(line) => {
                    self.line_number += 1;
                    // 文件末尾的空行不视为组码
                    if line.trim().is_empty() {
                        if self.lines.clone().all(|rest| rest.trim().is_empty()) {
                            return Ok(None);
                        }
                    }
                    break line;
                }
                None => return Ok(None),
            }
        };

        let value_line = match self.lines.next() {
            Some(line) => {
                self.line_number += 1;
                line
            }
            None => {
                return Err(DxfError::invalid(format!(
                    "文件在第 {} 行结束，缺少与组码对应的值行",
                    self.line_number
                )));
            }
        };

        let code = code_line.trim().parse::<i32>().map_err(|_| {
            DxfError::invalid(format!(
                "第 {} 行的组码 \"{}\" 无法解析为整数",
                self.line_number - 1,
                code_line.trim()
            ))
        })?;
        let value = value_line.trim_end_matches('\r').to_string();
        Ok(Some((code, value)))
    }

    /// 回退一个组码对，缓冲区只容纳一个。
    fn put_back(&mut self, pair: Pair) {
        debug_assert!(self.buffer.is_none(), "DXF 组码对只能回退一次");
        self.buffer = Some(pair);
    }
}

fn parse_f64(raw: &str, context: &str) -> Result<f64, DxfError> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| DxfError::invalid(format!("{context} 解析失败（值：\"{raw}\"）")))
}

fn parse_i16(raw: &str, context: &str) -> Result<i16, DxfError> {
    let value = raw
        .trim()
        .parse::<i32>()
        .map_err(|_| DxfError::invalid(format!("{context} 解析失败（值：\"{raw}\"）")))?;
    i16::try_from(value)
        .map_err(|_| DxfError::invalid(format!("{context} 超出 i16 范围（值：{value}）")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dxf(pairs: &[(i32, &str)]) -> String {
        let mut out = String::new();
        for (code, value) in pairs {
            out.push_str(&format!("{code}\n{value}\n"));
        }
        out
    }

    #[test]
    fn reader_puts_back_a_pair() {
        let mut reader = DxfReader::new("0\nSECTION\n2\nENTITIES\n");
        let pair = reader.next_pair().unwrap().unwrap();
        assert_eq!(pair, (0, "SECTION".to_string()));
        reader.put_back(pair);
        assert_eq!(reader.next_pair().unwrap().unwrap().1, "SECTION");
        assert_eq!(reader.next_pair().unwrap().unwrap(), (2, "ENTITIES".to_string()));
        assert!(reader.next_pair().unwrap().is_none());
    }

    #[test]
    fn non_numeric_first_line_is_not_dxf() {
        let err = DxfParser::new("AC1027\u{0}binary").parse().unwrap_err();
        assert!(matches!(err, DxfError::NotDxf { .. }));
    }

    #[test]
    fn lwpolyline_vertices_pair_up() {
        let body = vec![
            (90, "2".to_string()),
            (10, "1.5".to_string()),
            (20, "2.5".to_string()),
            (10, "3".to_string()),
            (20, "4".to_string()),
        ];
        let vertices = lwpolyline_vertices(&body).unwrap();
        assert_eq!(vertices, vec![Point2::new(1.5, 2.5), Point2::new(3.0, 4.0)]);
    }

    #[test]
    fn hatch_edge_paths_and_trailing_seed_points() {
        let text = dxf(&[
            (0, "SECTION"),
            (2, "ENTITIES"),
            (0, "HATCH"),
            (8, "FILL"),
            (10, "0"),
            (20, "0"),
            (30, "0"),
            (2, "SOLID"),
            (70, "1"),
            (91, "1"),
            (92, "1"),
            (93, "2"),
            (72, "1"),
            (10, "0"),
            (20, "0"),
            (11, "4"),
            (21, "0"),
            (72, "2"),
            (10, "2"),
            (20, "0"),
            (40, "2"),
            (50, "0"),
            (51, "180"),
            (73, "1"),
            (97, "0"),
            (75, "0"),
            (76, "1"),
            (98, "1"),
            (10, "99"),
            (20, "99"),
            (0, "ENDSEC"),
            (0, "EOF"),
        ]);
        let document = DxfParser::new(&text).parse().unwrap();
        let (_, entity) = document.entities().next().unwrap();
        let Entity::Hatch(hatch) = entity else {
            panic!("expected hatch, got {entity:?}");
        };
        assert!(hatch.is_solid);
        assert_eq!(hatch.pattern_name, "SOLID");
        assert_eq!(hatch.paths.len(), 1);
        let BoundaryPath::Edges(edges) = &hatch.paths[0] else {
            panic!("expected edge path");
        };
        assert_eq!(edges.len(), 2);
        assert!(matches!(
            edges[1],
            HatchEdge::Arc { radius, end_angle, is_counter_clockwise: true, .. }
                if radius == 2.0 && end_angle == 180.0
        ));
    }

    #[test]
    fn hatch_polyline_path() {
        let text = dxf(&[
            (0, "SECTION"),
            (2, "ENTITIES"),
            (0, "HATCH"),
            (2, "ANSI31"),
            (70, "0"),
            (91, "1"),
            (92, "2"),
            (72, "0"),
            (73, "1"),
            (93, "3"),
            (10, "0"),
            (20, "0"),
            (10, "5"),
            (20, "0"),
            (10, "5"),
            (20, "5"),
            (97, "0"),
            (75, "1"),
            (0, "ENDSEC"),
            (0, "EOF"),
        ]);
        let document = DxfParser::new(&text).parse().unwrap();
        let (_, Entity::Hatch(hatch)) = document.entities().next().unwrap() else {
            panic!("expected hatch");
        };
        assert!(!hatch.is_solid);
        match &hatch.paths[0] {
            BoundaryPath::Polyline { vertices, is_closed } => {
                assert!(*is_closed);
                assert_eq!(vertices.len(), 3);
                assert_eq!(vertices[2], Point2::new(5.0, 5.0));
            }
            other => panic!("unexpected path {other:?}"),
        }
    }

    #[test]
    fn invalid_entity_data_drops_only_that_entity() {
        let text = dxf(&[
            (0, "SECTION"),
            (2, "ENTITIES"),
            (0, "CIRCLE"),
            (10, "abc"),
            (40, "1"),
            (0, "POLYLINE"),
            (70, "1"),
            (0, "VERTEX"),
            (10, "1e999x"),
            (0, "SEQEND"),
            (0, "INSERT"),
            (10, "0"),
            (0, "LINE"),
            (62, "70000"),
            (0, "ARC"),
            (10, "1"),
            (40, "2"),
            (0, "ENDSEC"),
            (0, "EOF"),
        ]);
        let document = DxfParser::new(&text).parse().unwrap();
        assert_eq!(document.entity_count(), 1);
        assert_eq!(document.skipped_entities(), 4);
        let (_, entity) = document.entities().next().unwrap();
        assert_eq!(entity.type_name(), "ARC");
    }

    #[test]
    fn broken_group_code_is_still_fatal() {
        let text = dxf(&[
            (0, "SECTION"),
            (2, "ENTITIES"),
            (0, "LINE"),
        ]) + "x1\n0\n  0\nENDSEC\n  0\nEOF\n";
        let err = DxfParser::new(&text).parse().unwrap_err();
        assert!(matches!(err, DxfError::Invalid { message } if message.contains("组码")));
    }
}
