use std::collections::HashMap;

use planview_core::color::Rgb;
use planview_core::geometry::Bounds2D;

use crate::extents::layout_bounds;
use crate::primitive::Primitive;

/// 同一图层的图元集合，按图层首次出现的顺序排列。
#[derive(Debug, Clone)]
pub struct LayerGroup {
    pub name: String,
    pub primitives: Vec<Primitive>,
    /// 布局包围盒，低细节层级直接绘制它。
    pub bounds: Bounds2D,
    /// 图层首个图元的颜色。
    pub color: Rgb,
    pub visible: bool,
}

impl LayerGroup {
    #[inline]
    pub fn len(&self) -> usize {
        self.primitives.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.primitives.is_empty()
    }
}

/// 按图层分组；图层名比较不区分大小写，组名取首次出现时的写法。
pub fn group_by_layer(primitives: Vec<Primitive>) -> Vec<LayerGroup> {
    group_with_order(primitives).0
}

/// 分组的同时记录每个图元在输入序列中的位置：第 k 项为第 k 个图元的（组序号, 组内序号）。
pub fn group_with_order(primitives: Vec<Primitive>) -> (Vec<LayerGroup>, Vec<(usize, usize)>) {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut buckets: Vec<(String, Vec<Primitive>)> = Vec::new();
    let mut order = Vec::with_capacity(primitives.len());
    for primitive in primitives {
        let key = primitive.layer.to_ascii_uppercase();
        let slot = *index.entry(key).or_insert_with(|| {
            buckets.push((primitive.layer.clone(), Vec::new()));
            buckets.len() - 1
        });
        order.push((slot, buckets[slot].1.len()));
        buckets[slot].1.push(primitive);
    }

    // 每个桶创建时即放入一个图元，组序号与桶序号一致
    let groups = buckets
        .into_iter()
        .map(|(name, primitives)| LayerGroup {
            bounds: layout_bounds(&primitives),
            color: primitives.first().map_or(Rgb::new(255, 255, 255), |p| p.color),
            name,
            primitives,
            visible: true,
        })
        .collect();
    (groups, order)
}
