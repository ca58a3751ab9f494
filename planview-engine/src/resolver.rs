//! 颜色、线宽、线型的 BYLAYER / BYBLOCK 继承解析。
//!
//! 查询失败不会向调用方报错，一律回落到约定的默认值。

use planview_core::color::{self, BYBLOCK, BYLAYER, DEFAULT_INDEX, Rgb};
use planview_core::document::{Document, EntityProperties, is_lineweight_sentinel};
use serde::Serialize;

pub const CONTINUOUS: &str = "CONTINUOUS";

/// 解析结果的来源。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AttributeSource {
    Entity,
    Layer,
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolved<T> {
    pub value: T,
    pub source: AttributeSource,
}

impl<T> Resolved<T> {
    #[inline]
    fn new(value: T, source: AttributeSource) -> Self {
        Self { value, source }
    }
}

/// 解析实体的有效颜色。`inherited_byblock` 为外层块参照已解析的颜色，
/// 顶层实体传 `None`，此时 BYBLOCK 按 BYLAYER 处理。
pub fn resolve_color(
    document: &Document,
    properties: &EntityProperties,
    inherited_byblock: Option<Rgb>,
) -> Rgb {
    let code = match properties.color {
        Some(BYBLOCK) => match inherited_byblock {
            Some(rgb) => return rgb,
            None => layer_color_code(document, &properties.layer),
        },
        Some(BYLAYER) | None => layer_color_code(document, &properties.layer),
        Some(code) => code,
    };
    color::aci_to_rgb(i32::from(code)).unwrap_or(color::FALLBACK)
}

fn layer_color_code(document: &Document, layer: &str) -> i16 {
    match document.layer(layer).and_then(|layer| layer.color) {
        Some(code) => {
            let code = code.saturating_abs();
            if code == BYBLOCK || code == BYLAYER {
                DEFAULT_INDEX
            } else {
                code
            }
        }
        None => DEFAULT_INDEX,
    }
}

/// 解析有效线宽（1/100 mm），保证结果是非负整数。
pub fn resolve_lineweight(document: &Document, properties: &EntityProperties) -> Resolved<u32> {
    match properties.lineweight {
        Some(raw) if !is_lineweight_sentinel(raw) => {
            Resolved::new(clamp_lineweight(raw), AttributeSource::Entity)
        }
        _ => match document
            .layer(&properties.layer)
            .and_then(|layer| layer.lineweight)
            .filter(|lw| !is_lineweight_sentinel(*lw))
        {
            Some(layer_value) => {
                Resolved::new(clamp_lineweight(layer_value), AttributeSource::Layer)
            }
            None => Resolved::new(0, AttributeSource::Default),
        },
    }
}

#[inline]
fn clamp_lineweight(raw: i16) -> u32 {
    u32::try_from(raw).unwrap_or(0)
}

/// 解析有效线型名。
pub fn resolve_linetype(document: &Document, properties: &EntityProperties) -> Resolved<String> {
    let raw = properties.linetype.as_deref().map(str::trim).unwrap_or("");
    let inherits = raw.is_empty()
        || raw.eq_ignore_ascii_case("BYLAYER")
        || raw.eq_ignore_ascii_case("BYBLOCK");
    if !inherits {
        return Resolved::new(raw.to_string(), AttributeSource::Entity);
    }
    match document
        .layer(&properties.layer)
        .map(|layer| layer.linetype.trim())
        .filter(|name| !name.is_empty())
    {
        Some(name) => Resolved::new(name.to_string(), AttributeSource::Layer),
        None => Resolved::new(CONTINUOUS.to_string(), AttributeSource::Default),
    }
}

#[cfg(test)]
mod tests {
    use planview_core::document::{Layer, LINEWEIGHT_BYLAYER};

    use super::*;

    fn document() -> Document {
        let mut doc = Document::new();
        doc.add_layer(
            Layer::new("WALLS")
                .with_color(3)
                .with_lineweight(50)
                .with_linetype("DASHED"),
        );
        doc.add_layer(Layer::new("OFF").with_color(-5));
        doc
    }

    #[test]
    fn explicit_color_ignores_layer() {
        let doc = document();
        let props = EntityProperties::on_layer("WALLS").with_color(1);
        assert_eq!(resolve_color(&doc, &props, None), Rgb::new(255, 0, 0));
    }

    #[test]
    fn bylayer_and_missing_color_use_layer_code() {
        let doc = document();
        let green = Rgb::new(0, 255, 0);
        let explicit = EntityProperties::on_layer("walls").with_color(BYLAYER);
        assert_eq!(resolve_color(&doc, &explicit, None), green);
        assert_eq!(
            resolve_color(&doc, &EntityProperties::on_layer("WALLS"), None),
            green
        );
    }

    #[test]
    fn off_layer_contributes_absolute_code() {
        let doc = document();
        let props = EntityProperties::on_layer("OFF");
        assert_eq!(resolve_color(&doc, &props, None), Rgb::new(0, 0, 255));
    }

    #[test]
    fn byblock_uses_inherited_color_or_falls_back_to_layer() {
        let doc = document();
        let props = EntityProperties::on_layer("WALLS").with_color(BYBLOCK);
        let magenta = Rgb::new(255, 0, 255);
        assert_eq!(resolve_color(&doc, &props, Some(magenta)), magenta);
        assert_eq!(resolve_color(&doc, &props, None), Rgb::new(0, 255, 0));
    }

    #[test]
    fn unknown_layer_resolves_to_default_index() {
        let doc = document();
        let props = EntityProperties::on_layer("MISSING");
        assert_eq!(resolve_color(&doc, &props, None), Rgb::new(255, 255, 255));
    }

    #[test]
    fn out_of_palette_code_yields_fallback_gray() {
        let doc = document();
        let props = EntityProperties::on_layer("WALLS").with_color(300);
        assert_eq!(resolve_color(&doc, &props, None), color::FALLBACK);
    }

    #[test]
    fn lineweight_inherits_through_sentinels() {
        let doc = document();
        let bylayer = EntityProperties::on_layer("WALLS").with_lineweight(LINEWEIGHT_BYLAYER);
        assert_eq!(
            resolve_lineweight(&doc, &bylayer),
            Resolved::new(50, AttributeSource::Layer)
        );

        let explicit = EntityProperties::on_layer("WALLS").with_lineweight(13);
        assert_eq!(
            resolve_lineweight(&doc, &explicit),
            Resolved::new(13, AttributeSource::Entity)
        );

        // 图层自身为 DEFAULT
        let plain = EntityProperties::on_layer("0");
        assert_eq!(
            resolve_lineweight(&doc, &plain),
            Resolved::new(0, AttributeSource::Default)
        );

        let missing = EntityProperties::on_layer("MISSING");
        assert_eq!(
            resolve_lineweight(&doc, &missing),
            Resolved::new(0, AttributeSource::Default)
        );
    }

    #[test]
    fn negative_lineweight_is_clamped() {
        let doc = document();
        let props = EntityProperties::on_layer("WALLS").with_lineweight(-40);
        assert_eq!(resolve_lineweight(&doc, &props).value, 0);
    }

    #[test]
    fn linetype_resolution_sources() {
        let doc = document();
        let byblock = EntityProperties::on_layer("WALLS").with_linetype("ByBlock");
        assert_eq!(
            resolve_linetype(&doc, &byblock),
            Resolved::new("DASHED".to_string(), AttributeSource::Layer)
        );

        let own = EntityProperties::on_layer("WALLS").with_linetype("CENTER");
        assert_eq!(resolve_linetype(&doc, &own).source, AttributeSource::Entity);

        let missing = EntityProperties::on_layer("MISSING");
        assert_eq!(
            resolve_linetype(&doc, &missing),
            Resolved::new(CONTINUOUS.to_string(), AttributeSource::Default)
        );
    }

    #[test]
    fn layer_without_usable_attributes_reports_default_source() {
        let mut doc = Document::new();
        doc.add_layer(
            Layer::new("BARE")
                .with_linetype("  ")
                .with_lineweight(LINEWEIGHT_BYLAYER),
        );
        let props = EntityProperties::on_layer("bare");
        assert_eq!(
            resolve_linetype(&doc, &props),
            Resolved::new(CONTINUOUS.to_string(), AttributeSource::Default)
        );
        assert_eq!(
            resolve_lineweight(&doc, &props),
            Resolved::new(0, AttributeSource::Default)
        );

        let mut unset = Layer::new("UNSET");
        unset.lineweight = None;
        doc.add_layer(unset);
        let props = EntityProperties::on_layer("UNSET").with_linetype("BYLAYER");
        assert_eq!(
            resolve_lineweight(&doc, &props).source,
            AttributeSource::Default
        );
        assert_eq!(
            resolve_linetype(&doc, &props),
            Resolved::new(CONTINUOUS.to_string(), AttributeSource::Layer)
        );
    }
}
