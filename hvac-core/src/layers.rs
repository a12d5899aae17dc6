//! 图层栈：下标 0 为最底层，活动图层指针始终有效或为显式的空哨兵。

use serde::{Deserialize, Serialize};

use crate::errors::CoreError;

/// 图层标志位。
pub struct LayerFlags;

impl LayerFlags {
    pub const VISIBLE: u32 = 1;
    pub const ACTIVE: u32 = 2;
    pub const NO_ADD: u32 = 4;
    pub const ALLOW_CELL_EDIT: u32 = 8;
    pub const USE_EDGES: u32 = 16;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub name: String,
    pub flags: u32,
    pub layer_type: i32,
    /// 该层上的图元 id，自底向上。
    pub z_list: Vec<u64>,
}

impl Layer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            flags: LayerFlags::VISIBLE,
            layer_type: 0,
            z_list: Vec::new(),
        }
    }

    #[inline]
    pub fn is_visible(&self) -> bool {
        self.flags & LayerFlags::VISIBLE != 0
    }

    #[inline]
    pub fn accepts_new_shapes(&self) -> bool {
        self.flags & LayerFlags::NO_ADD == 0
    }

    pub fn set_visible(&mut self, visible: bool) {
        if visible {
            self.flags |= LayerFlags::VISIBLE;
        } else {
            self.flags &= !LayerFlags::VISIBLE;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "LayersData", into = "LayersData")]
pub struct LayersManager {
    layers: Vec<Layer>,
    active_layer: Option<usize>,
    pub swimlane_list: Vec<u64>,
}

#[derive(Serialize, Deserialize)]
struct LayersData {
    layers: Vec<Layer>,
    active_layer: i64,
    #[serde(default)]
    swimlane_list: Vec<u64>,
}

impl TryFrom<LayersData> for LayersManager {
    type Error = CoreError;

    fn try_from(data: LayersData) -> Result<Self, Self::Error> {
        if data.layers.len() > LayersManager::MAX_LAYERS {
            return Err(CoreError::LayerLimit(LayersManager::MAX_LAYERS));
        }
        let active_layer = if data.layers.is_empty() && data.active_layer == LayersManager::NO_ACTIVE_LAYER {
            None
        } else {
            match usize::try_from(data.active_layer) {
                Ok(index) if index < data.layers.len() => Some(index),
                _ => {
                    return Err(CoreError::CorruptSnapshot(format!(
                        "active layer {} on a stack of {} layers",
                        data.active_layer,
                        data.layers.len()
                    )));
                }
            }
        };
        let mut manager = Self {
            layers: data.layers,
            active_layer,
            swimlane_list: data.swimlane_list,
        };
        manager.sync_active_flag();
        Ok(manager)
    }
}

impl From<LayersManager> for LayersData {
    fn from(manager: LayersManager) -> Self {
        Self {
            active_layer: manager.active_layer_index(),
            layers: manager.layers,
            swimlane_list: manager.swimlane_list,
        }
    }
}

impl Default for LayersManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LayersManager {
    pub const MAX_LAYERS: usize = 32;
    pub const NO_ACTIVE_LAYER: i64 = -1;

    /// 空图层栈，活动图层为哨兵 `-1`。
    pub fn new() -> Self {
        Self {
            layers: Vec::new(),
            active_layer: None,
            swimlane_list: Vec::new(),
        }
    }

    pub fn with_default_layer() -> Self {
        let mut manager = Self::new();
        manager.layers.push(Layer::new("Layer-1"));
        manager.active_layer = Some(0);
        manager.sync_active_flag();
        manager
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    #[inline]
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    #[inline]
    pub fn layer(&self, index: usize) -> Option<&Layer> {
        self.layers.get(index)
    }

    /// 活动图层下标；空栈时为 `-1`。
    #[inline]
    pub fn active_layer_index(&self) -> i64 {
        self.active_layer
            .map_or(Self::NO_ACTIVE_LAYER, |index| index as i64)
    }

    #[inline]
    pub fn active(&self) -> Option<usize> {
        self.active_layer
    }

    pub fn active_layer(&self) -> Option<&Layer> {
        self.active_layer.and_then(|index| self.layers.get(index))
    }

    /// 追加到栈顶；空栈时新层成为活动层。
    pub fn add_layer(&mut self, layer: Layer) -> Result<usize, CoreError> {
        if self.layers.len() >= Self::MAX_LAYERS {
            return Err(CoreError::LayerLimit(Self::MAX_LAYERS));
        }
        self.layers.push(layer);
        let index = self.layers.len() - 1;
        if self.active_layer.is_none() {
            self.active_layer = Some(index);
        }
        self.sync_active_flag();
        Ok(index)
    }

    pub fn insert_layer(&mut self, index: usize, layer: Layer) -> Result<(), CoreError> {
        if index > self.layers.len() {
            return Err(CoreError::out_of_range("layer", index, self.layers.len()));
        }
        if self.layers.len() >= Self::MAX_LAYERS {
            return Err(CoreError::LayerLimit(Self::MAX_LAYERS));
        }
        self.layers.insert(index, layer);
        self.active_layer = match self.active_layer {
            Some(active) if index <= active => Some(active + 1),
            Some(active) => Some(active),
            None => Some(index),
        };
        self.sync_active_flag();
        Ok(())
    }

    /// 删除图层。删除活动层时指针移到下方最近的层（已是底层则为 0）；栈空后为哨兵。
    pub fn remove_layer(&mut self, index: usize) -> Result<Layer, CoreError> {
        if index >= self.layers.len() {
            return Err(CoreError::out_of_range("layer", index, self.layers.len()));
        }
        let removed = self.layers.remove(index);
        self.active_layer = match self.active_layer {
            _ if self.layers.is_empty() => None,
            Some(active) if active == index => Some(active.saturating_sub(1)),
            Some(active) if active > index => Some(active - 1),
            other => other,
        };
        self.sync_active_flag();
        Ok(removed)
    }

    /// 越界下标直接拒绝，不做夹紧。
    pub fn set_active_layer(&mut self, index: usize) -> Result<(), CoreError> {
        if index >= self.layers.len() {
            return Err(CoreError::out_of_range("layer", index, self.layers.len()));
        }
        self.active_layer = Some(index);
        self.sync_active_flag();
        Ok(())
    }

    pub fn set_layer_visible(&mut self, index: usize, visible: bool) -> Result<(), CoreError> {
        let len = self.layers.len();
        self.layers
            .get_mut(index)
            .ok_or(CoreError::out_of_range("layer", index, len))?
            .set_visible(visible);
        Ok(())
    }

    pub fn set_layer_flags(&mut self, index: usize, flags: u32) -> Result<(), CoreError> {
        let len = self.layers.len();
        let layer = self
            .layers
            .get_mut(index)
            .ok_or(CoreError::out_of_range("layer", index, len))?;
        layer.flags = (flags & !LayerFlags::ACTIVE) | (layer.flags & LayerFlags::ACTIVE);
        Ok(())
    }

    /// 栈顶图层移到最底层，活动指针跟随其图层。
    pub fn rotate_stack(&mut self) {
        let len = self.layers.len();
        if len < 2 {
            return;
        }
        self.layers.rotate_right(1);
        self.active_layer = self.active_layer.map(|active| (active + 1) % len);
    }

    /// 将图元放到活动图层的最上方。
    pub fn add_shape_to_active(&mut self, shape: u64) -> Result<usize, CoreError> {
        let index = self.active_layer.ok_or(CoreError::NoActiveLayer)?;
        let layer = self
            .layers
            .get_mut(index)
            .ok_or(CoreError::NoActiveLayer)?;
        if !layer.accepts_new_shapes() {
            return Err(CoreError::LayerLocked(index));
        }
        layer.z_list.push(shape);
        Ok(index)
    }

    pub fn find_layer_for_shape(&self, shape: u64) -> Option<usize> {
        self.layers
            .iter()
            .position(|layer| layer.z_list.contains(&shape))
    }

    pub fn remove_shape_from_all(&mut self, shape: u64) -> bool {
        let mut removed = false;
        for layer in &mut self.layers {
            let before = layer.z_list.len();
            layer.z_list.retain(|&id| id != shape);
            removed |= layer.z_list.len() != before;
        }
        removed
    }

    /// 在所在图层内移到最上方。
    pub fn bring_to_front(&mut self, shape: u64) -> bool {
        let Some(index) = self.find_layer_for_shape(shape) else {
            return false;
        };
        let z_list = &mut self.layers[index].z_list;
        z_list.retain(|&id| id != shape);
        z_list.push(shape);
        true
    }

    /// 可见图层上的全部图元，自底向上。
    pub fn visible_z_list(&self) -> Vec<u64> {
        self.layers
            .iter()
            .filter(|layer| layer.is_visible())
            .flat_map(|layer| layer.z_list.iter().copied())
            .collect()
    }

    pub fn active_visible_z_list(&self) -> Vec<u64> {
        self.active_layer()
            .filter(|layer| layer.is_visible())
            .map(|layer| layer.z_list.clone())
            .unwrap_or_default()
    }

    fn sync_active_flag(&mut self) {
        for (index, layer) in self.layers.iter_mut().enumerate() {
            if Some(index) == self.active_layer {
                layer.flags |= LayerFlags::ACTIVE;
            } else {
                layer.flags &= !LayerFlags::ACTIVE;
            }
        }
    }
}
