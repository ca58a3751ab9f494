//! 把绘制指令输出为 SVG 文本。

use std::fmt::Write;

use planview_core::color::Rgb;
use planview_core::geometry::{Bounds2D, Point2};
use planview_engine::lod::{Canvas, Stroke};
use planview_engine::scene::ViewportState;

const BACKGROUND: &str = "#1e1f24";

/// 以视口中心与比例把模型坐标映射到像素坐标（Y 轴向下）。
pub struct SvgCanvas {
    viewport: ViewportState,
    width: f64,
    height: f64,
    body: String,
    elements: usize,
}

impl SvgCanvas {
    pub fn new(viewport: ViewportState, width: f64, height: f64) -> Self {
        Self {
            viewport,
            width: width.max(1.0),
            height: height.max(1.0),
            body: String::new(),
            elements: 0,
        }
    }

    #[inline]
    pub fn element_count(&self) -> usize {
        self.elements
    }

    fn to_screen(&self, point: Point2) -> (f64, f64) {
        let scale = self.viewport.scale;
        let center = self.viewport.center;
        (
            (point.x() - center.x()) * scale + self.width / 2.0,
            self.height / 2.0 - (point.y() - center.y()) * scale,
        )
    }

    fn push(&mut self, element: String) {
        self.body.push_str("  ");
        self.body.push_str(&element);
        self.body.push('\n');
        self.elements += 1;
    }

    pub fn finish(self) -> String {
        let mut out = String::with_capacity(self.body.len() + 256);
        let _ = writeln!(
            out,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
            w = fmt_num(self.width),
            h = fmt_num(self.height)
        );
        let _ = writeln!(
            out,
            r#"  <rect width="100%" height="100%" fill="{BACKGROUND}"/>"#
        );
        out.push_str(&self.body);
        out.push_str("</svg>\n");
        out
    }
}

fn fmt_num(value: f64) -> String {
    let text = format!("{value:.3}");
    let text = text.trim_end_matches('0').trim_end_matches('.');
    if text == "-0" {
        "0".to_string()
    } else {
        text.to_string()
    }
}

fn stroke_attrs(stroke: &Stroke) -> String {
    let width = if stroke.is_cosmetic() { 1.0 } else { stroke.width };
    let mut attrs = format!(
        r#"fill="none" stroke="{}" stroke-width="{}""#,
        stroke.color.to_hex(),
        fmt_num(width)
    );
    if let Some(dashes) = stroke.dashes {
        let pattern: Vec<String> = dashes.iter().map(|d| fmt_num(*d)).collect();
        let _ = write!(attrs, r#" stroke-dasharray="{}""#, pattern.join(" "));
    }
    attrs
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            other => out.push(other),
        }
    }
    out
}

impl Canvas for SvgCanvas {
    fn rect(&mut self, bounds: &Bounds2D, stroke: &Stroke) {
        if bounds.is_empty() {
            return;
        }
        let (x0, y0) = self.to_screen(Point2::new(bounds.min().x(), bounds.max().y()));
        let (x1, y1) = self.to_screen(Point2::new(bounds.max().x(), bounds.min().y()));
        self.push(format!(
            r#"<rect x="{}" y="{}" width="{}" height="{}" {}/>"#,
            fmt_num(x0),
            fmt_num(y0),
            fmt_num(x1 - x0),
            fmt_num(y1 - y0),
            stroke_attrs(stroke)
        ));
    }

    fn line(&mut self, from: Point2, to: Point2, stroke: &Stroke) {
        let (x1, y1) = self.to_screen(from);
        let (x2, y2) = self.to_screen(to);
        self.push(format!(
            r#"<line x1="{}" y1="{}" x2="{}" y2="{}" {}/>"#,
            fmt_num(x1),
            fmt_num(y1),
            fmt_num(x2),
            fmt_num(y2),
            stroke_attrs(stroke)
        ));
    }

    fn circle(&mut self, center: Point2, radius: f64, stroke: &Stroke) {
        let (cx, cy) = self.to_screen(center);
        self.push(format!(
            r#"<circle cx="{}" cy="{}" r="{}" {}/>"#,
            fmt_num(cx),
            fmt_num(cy),
            fmt_num(radius * self.viewport.scale),
            stroke_attrs(stroke)
        ));
    }

    fn arc(&mut self, center: Point2, radius: f64, start_angle: f64, sweep: f64, stroke: &Stroke) {
        if sweep >= 360.0 {
            self.circle(center, radius, stroke);
            return;
        }
        let point_at = |degrees: f64| {
            let (sin, cos) = degrees.to_radians().sin_cos();
            Point2::new(center.x() + radius * cos, center.y() + radius * sin)
        };
        let (x1, y1) = self.to_screen(point_at(start_angle));
        let (x2, y2) = self.to_screen(point_at(start_angle + sweep));
        let r = radius * self.viewport.scale;
        let large_arc = u8::from(sweep > 180.0);
        // 模型逆时针在 Y 轴翻转后对应 SVG 的负向扫掠
        self.push(format!(
            r#"<path d="M {} {} A {} {} 0 {} 0 {} {}" {}/>"#,
            fmt_num(x1),
            fmt_num(y1),
            fmt_num(r),
            fmt_num(r),
            large_arc,
            fmt_num(x2),
            fmt_num(y2),
            stroke_attrs(stroke)
        ));
    }

    fn polygon(&mut self, points: &[Point2], stroke: &Stroke) {
        if points.len() < 2 {
            return;
        }
        let coords: Vec<String> = points
            .iter()
            .map(|point| {
                let (x, y) = self.to_screen(*point);
                format!("{},{}", fmt_num(x), fmt_num(y))
            })
            .collect();
        self.push(format!(
            r#"<polygon points="{}" {}/>"#,
            coords.join(" "),
            stroke_attrs(stroke)
        ));
    }

    fn text(&mut self, position: Point2, value: &str, font_size: f64, rotation: f64, color: Rgb) {
        let (x, y) = self.to_screen(position);
        let mut lines = value.lines();
        let Some(first) = lines.next() else {
            return;
        };
        let mut element = format!(
            r#"<text x="{x}" y="{y}" font-size="{size}" fill="{color}""#,
            x = fmt_num(x),
            y = fmt_num(y),
            size = fmt_num(font_size),
            color = color.to_hex()
        );
        if rotation != 0.0 {
            let _ = write!(
                element,
                r#" transform="rotate({} {} {})""#,
                fmt_num(-rotation),
                fmt_num(x),
                fmt_num(y)
            );
        }
        element.push('>');
        element.push_str(&escape(first));
        for line in lines {
            let _ = write!(
                element,
                r#"<tspan x="{}" dy="{}">{}</tspan>"#,
                fmt_num(x),
                fmt_num(font_size * 1.2),
                escape(line)
            );
        }
        element.push_str("</text>");
        self.push(element);
    }
}
