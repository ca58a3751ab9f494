use std::collections::{BTreeMap, HashMap};

use planview_core::document::Document;
use planview_core::geometry::Bounds2D;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct LayerSummary {
    pub name: String,
    pub color: Option<i16>,
    pub linetype: String,
    pub lineweight: Option<i16>,
    pub is_off: bool,
    pub is_frozen: bool,
    pub is_locked: bool,
    /// 模型空间中位于该图层的实体数。
    pub entity_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtentsSource {
    Header,
    Geometry,
}

/// 文档概要：图层、实体类型分布与范围。
#[derive(Debug, Clone, Serialize)]
pub struct DocumentSummary {
    pub layers: Vec<LayerSummary>,
    pub entity_types: BTreeMap<String, usize>,
    pub total_entities: usize,
    /// 读取时因数据无效而丢弃的实体数。
    pub skipped_entities: usize,
    pub extents: Option<Bounds2D>,
    pub extents_source: Option<ExtentsSource>,
}

/// 汇总模型空间信息。范围优先取文件头声明，否则由实体几何估算。
pub fn summarize(document: &Document) -> DocumentSummary {
    let mut per_layer: HashMap<String, usize> = HashMap::new();
    let mut entity_types: BTreeMap<String, usize> = BTreeMap::new();
    for (_, entity) in document.entities() {
        *per_layer
            .entry(entity.layer_name().to_ascii_uppercase())
            .or_insert(0) += 1;
        *entity_types.entry(entity.type_name().to_string()).or_insert(0) += 1;
    }

    let layers = document
        .layers()
        .map(|layer| LayerSummary {
            name: layer.name.clone(),
            color: layer.color,
            linetype: layer.linetype.clone(),
            lineweight: layer.lineweight,
            is_off: layer.is_off,
            is_frozen: layer.is_frozen,
            is_locked: layer.is_locked,
            entity_count: per_layer
                .get(&layer.name.to_ascii_uppercase())
                .copied()
                .unwrap_or(0),
        })
        .collect();

    let (extents, extents_source) = match document.header_extents().and_then(|h| h.to_bounds()) {
        Some(bounds) => (Some(bounds), Some(ExtentsSource::Header)),
        None => match document.bounds() {
            Some(bounds) => (Some(bounds), Some(ExtentsSource::Geometry)),
            None => (None, None),
        },
    };

    DocumentSummary {
        layers,
        entity_types,
        total_entities: document.entity_count(),
        skipped_entities: document.skipped_entities(),
        extents,
        extents_source,
    }
}
