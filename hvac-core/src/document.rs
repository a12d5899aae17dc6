//! 图元文档：拥有全部图元、图层栈与链接表，负责删除时的级联清理。

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::array::ShapeArray;
use crate::errors::CoreError;
use crate::geometry::{BoundingBox, PathPoint, Point2, Vector2};
use crate::hooks::{Hook, Link, LinkFlags, LinkList};
use crate::interaction::ArrowheadRecord;
use crate::layers::{Layer, LayersManager};
use crate::segments::{Polygon, SegLine, distance_to_segment};

/// 图元唯一标识。其他结构只通过 id 弱引用图元。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShapeId(u64);

impl ShapeId {
    /// hook 以 `i64` 保存目标 id，可分配的 id 不能超过 `i64::MAX`。
    pub const MAX: u64 = i64::MAX as u64;

    #[inline]
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ShapeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ShapeKind {
    /// 房间、墙体等闭合或开放轮廓。
    Polygon(Polygon),
    /// 风管、导线：正交走线加挂接信息。
    Connector { array: ShapeArray, route: SegLine },
    /// 箭头、引线。
    Line { start: Point2, end: Point2 },
    /// 传感器、设备等符号。
    Symbol { frame: BoundingBox, label: String },
}

impl ShapeKind {
    pub fn label(&self) -> &'static str {
        match self {
            ShapeKind::Polygon(_) => "polygon",
            ShapeKind::Connector { .. } => "connector",
            ShapeKind::Line { .. } => "line",
            ShapeKind::Symbol { .. } => "symbol",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shape {
    pub name: String,
    pub kind: ShapeKind,
    #[serde(default)]
    pub start_arrow: u32,
    #[serde(default)]
    pub end_arrow: u32,
}

impl Shape {
    fn with_kind(name: impl Into<String>, kind: ShapeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            start_arrow: ArrowheadRecord::NONE,
            end_arrow: ArrowheadRecord::NONE,
        }
    }

    pub fn polygon(name: impl Into<String>, polygon: Polygon) -> Self {
        Self::with_kind(name, ShapeKind::Polygon(polygon))
    }

    pub fn connector(name: impl Into<String>, route: SegLine) -> Self {
        Self::with_kind(
            name,
            ShapeKind::Connector {
                array: ShapeArray::new(),
                route,
            },
        )
    }

    pub fn line(name: impl Into<String>, start: Point2, end: Point2) -> Self {
        Self::with_kind(name, ShapeKind::Line { start, end })
    }

    pub fn symbol(name: impl Into<String>, frame: BoundingBox, label: impl Into<String>) -> Self {
        Self::with_kind(
            name,
            ShapeKind::Symbol {
                frame,
                label: label.into(),
            },
        )
    }

    pub fn with_arrows(mut self, start: u32, end: u32) -> Self {
        self.start_arrow = start;
        self.end_arrow = end;
        self
    }

    #[inline]
    pub fn is_connector(&self) -> bool {
        matches!(self.kind, ShapeKind::Connector { .. })
    }

    pub fn array(&self) -> Option<&ShapeArray> {
        match &self.kind {
            ShapeKind::Connector { array, .. } => Some(array),
            _ => None,
        }
    }

    fn array_mut(&mut self) -> Option<&mut ShapeArray> {
        match &mut self.kind {
            ShapeKind::Connector { array, .. } => Some(array),
            _ => None,
        }
    }

    pub fn bounds(&self) -> BoundingBox {
        match &self.kind {
            ShapeKind::Polygon(polygon) => polygon.bounds(),
            ShapeKind::Connector { route, .. } => route.bounds(),
            ShapeKind::Line { start, end } => BoundingBox::from_corners(*start, *end),
            ShapeKind::Symbol { frame, .. } => *frame,
        }
    }

    fn validate(&self) -> Result<(), CoreError> {
        match &self.kind {
            ShapeKind::Polygon(_) => Ok(()),
            ShapeKind::Connector { route, .. } => {
                route.start.checked("connector start")?;
                route.end.checked("connector end")?;
                Ok(())
            }
            ShapeKind::Line { start, end } => {
                start.checked("line start")?;
                end.checked("line end")?;
                Ok(())
            }
            ShapeKind::Symbol { frame, .. } => frame.validate("symbol frame"),
        }
    }

    pub fn translate(&mut self, offset: Vector2) -> Result<(), CoreError> {
        if !offset.is_finite() {
            return Err(CoreError::NonFinite("offset"));
        }
        match &mut self.kind {
            ShapeKind::Polygon(polygon) => polygon.translate(offset)?,
            ShapeKind::Connector { array, route } => {
                route.translate(offset);
                for index in 0..array.hooks().len() {
                    array.translate_hook_start(index, offset);
                }
            }
            ShapeKind::Line { start, end } => {
                *start = start.translate(offset);
                *end = end.translate(offset);
            }
            ShapeKind::Symbol { frame, .. } => *frame = frame.translate(offset),
        }
        Ok(())
    }

    /// 目标平移后连接器随之调整：挂在目标上的端点平移并重新走线。
    /// `moved_ends` 记录本轮已移动的起点与终点，返回走线是否变化。
    fn follow_target(
        &mut self,
        target: u64,
        offset: Vector2,
        moved_ends: &mut [bool; 2],
    ) -> bool {
        let ShapeKind::Connector { array, route } = &mut self.kind else {
            return false;
        };
        array.translate_hook_ends(target, offset);
        let anchors: Vec<(usize, Point2)> = array
            .hooks_for(target)
            .into_iter()
            .map(|(index, hook)| (index, hook.start_point))
            .collect();
        let mut changed = false;
        for (index, anchor) in anchors {
            let nearest = [(0usize, route.start), (1, route.end)]
                .into_iter()
                .filter(|(end, _)| !moved_ends[*end])
                .min_by(|a, b| a.1.distance(anchor).total_cmp(&b.1.distance(anchor)));
            if let Some((end, _)) = nearest {
                moved_ends[end] = true;
                if end == 0 {
                    route.start = route.start.translate(offset);
                } else {
                    route.end = route.end.translate(offset);
                }
                changed = true;
            }
            array.translate_hook_start(index, offset);
        }
        if changed {
            route.reroute();
        }
        changed
    }

    /// 命中测试。返回 `Some(segment)`，其中 `segment` 为命中的边下标（面内命中为 `None`）。
    pub fn hit(&self, point: Point2, tolerance: f64) -> Option<Option<usize>> {
        match &self.kind {
            ShapeKind::Polygon(polygon) => polygon
                .hit_edge(point, tolerance)
                .map(Some)
                .or_else(|| polygon.contains_point(point).then_some(None)),
            ShapeKind::Connector { route, .. } => route.hit(point, tolerance).map(Some),
            ShapeKind::Line { start, end } => {
                (distance_to_segment(point, *start, *end) <= tolerance).then_some(Some(0))
            }
            ShapeKind::Symbol { frame, .. } => {
                frame.inflate(tolerance).contains(point).then_some(None)
            }
        }
    }

    /// 渲染快照；首末点按箭头设置标记。
    pub fn path_points(&self) -> Vec<PathPoint> {
        let mut path = match &self.kind {
            ShapeKind::Polygon(polygon) => polygon.path_points(),
            ShapeKind::Connector { route, .. } => route.path_points(),
            ShapeKind::Line { start, end } => {
                vec![PathPoint::move_to(*start), PathPoint::line_to(*end)]
            }
            ShapeKind::Symbol { frame, .. } => {
                let corners = [
                    Point2::new(frame.right(), frame.y),
                    frame.max(),
                    Point2::new(frame.x, frame.bottom()),
                    frame.min(),
                ];
                std::iter::once(PathPoint::move_to(frame.min()))
                    .chain(corners.into_iter().map(PathPoint::line_to))
                    .collect()
            }
        };
        if self.start_arrow != ArrowheadRecord::NONE {
            if let Some(first) = path.first_mut() {
                *first = first.with_arrowhead();
            }
        }
        if self.end_arrow != ArrowheadRecord::NONE && path.len() > 1 {
            if let Some(last) = path.last_mut() {
                *last = last.with_arrowhead();
            }
        }
        path
    }
}

/// 加载修复结果：被丢弃的悬空引用数量，以及补回的链接数量。
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoadReport {
    /// 不在任何图层 z 序中、被放到活动图层顶部的图元。
    pub adopted_shapes: usize,
    /// 不在任何图层中且无法放回（无活动图层或已锁定）而被删除的图元。
    pub dropped_shapes: usize,
    pub dropped_hooks: usize,
    pub dropped_links: usize,
    pub dropped_z_entries: usize,
    pub restored_links: usize,
}

impl LoadReport {
    #[inline]
    pub fn is_clean(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "DocumentData", into = "DocumentData")]
pub struct Document {
    shapes: BTreeMap<ShapeId, Shape>,
    layers: LayersManager,
    links: LinkList,
    next_shape_id: u64,
}

#[derive(Serialize, Deserialize)]
struct ShapeEntry {
    id: ShapeId,
    shape: Shape,
}

#[derive(Serialize, Deserialize)]
struct DocumentData {
    shapes: Vec<ShapeEntry>,
    layers: LayersManager,
    #[serde(default)]
    links: LinkList,
    #[serde(default)]
    next_shape_id: u64,
}

impl TryFrom<DocumentData> for Document {
    type Error = CoreError;

    fn try_from(data: DocumentData) -> Result<Self, Self::Error> {
        let mut shapes = BTreeMap::new();
        for ShapeEntry { id, mut shape } in data.shapes {
            if id.get() > ShapeId::MAX {
                return Err(CoreError::CorruptSnapshot(format!(
                    "shape id {id} exceeds {}",
                    ShapeId::MAX
                )));
            }
            shape.validate()?;
            if let Some(array) = shape.array_mut() {
                array.validate_loaded()?;
            }
            if shapes.insert(id, shape).is_some() {
                return Err(CoreError::CorruptSnapshot(format!("duplicate shape id {id}")));
            }
        }
        let after_last = match shapes.keys().next_back() {
            Some(last) => last.get().checked_add(1).ok_or_else(|| {
                CoreError::CorruptSnapshot(format!("shape id {last} has no successor"))
            })?,
            None => 0,
        };
        let next_shape_id = after_last.max(data.next_shape_id);
        let mut links = data.links;
        links.normalize();
        Ok(Self {
            shapes,
            layers: data.layers,
            links,
            next_shape_id,
        })
    }
}

impl From<Document> for DocumentData {
    fn from(document: Document) -> Self {
        Self {
            shapes: document
                .shapes
                .into_iter()
                .map(|(id, shape)| ShapeEntry { id, shape })
                .collect(),
            layers: document.layers,
            links: document.links,
            next_shape_id: document.next_shape_id,
        }
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// 新文档带一个默认图层。
    pub fn new() -> Self {
        Self {
            shapes: BTreeMap::new(),
            layers: LayersManager::with_default_layer(),
            links: LinkList::new(),
            next_shape_id: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    #[inline]
    pub fn contains(&self, id: ShapeId) -> bool {
        self.shapes.contains_key(&id)
    }

    #[inline]
    pub fn shape(&self, id: ShapeId) -> Option<&Shape> {
        self.shapes.get(&id)
    }

    pub fn shapes(&self) -> impl Iterator<Item = (ShapeId, &Shape)> {
        self.shapes.iter().map(|(id, shape)| (*id, shape))
    }

    #[inline]
    pub fn layers(&self) -> &LayersManager {
        &self.layers
    }

    #[inline]
    pub fn links(&self) -> &LinkList {
        &self.links
    }

    fn require(&self, id: ShapeId) -> Result<&Shape, CoreError> {
        self.shapes.get(&id).ok_or(CoreError::ShapeNotFound(id.get()))
    }

    /// 添加图元到活动图层顶部。连接器上已有的 hook 必须指向已存在的图元。
    pub fn add_shape(&mut self, shape: Shape) -> Result<ShapeId, CoreError> {
        shape.validate()?;
        let raw = self.next_shape_id;
        if raw > ShapeId::MAX {
            return Err(CoreError::ShapeIdOutOfRange(raw));
        }
        let id = ShapeId::new(raw);
        if self.shapes.contains_key(&id) {
            return Err(CoreError::DuplicateShape(raw));
        }
        let targets: Vec<u64> = shape
            .array()
            .map(|array| array.targets().into_iter().collect())
            .unwrap_or_default();
        for &target in &targets {
            self.require(ShapeId::new(target))?;
        }
        self.layers.add_shape_to_active(id.get())?;
        for target in targets {
            self.links.insert(Link::new(target, id.get()));
        }
        self.shapes.insert(id, shape);
        self.next_shape_id = raw + 1;
        Ok(id)
    }

    /// 把连接器挂接到目标，返回分配的序号。
    pub fn bind_hook(
        &mut self,
        connector: ShapeId,
        target: ShapeId,
        hook: Hook,
    ) -> Result<u32, CoreError> {
        if connector == target {
            return Err(CoreError::SelfHook(connector.get()));
        }
        self.require(target)?;
        let encoded = Hook::encode_target(target.get())?;
        let shape = self
            .shapes
            .get_mut(&connector)
            .ok_or(CoreError::ShapeNotFound(connector.get()))?;
        let array = shape.array_mut().ok_or(CoreError::WrongShapeKind {
            id: connector.get(),
            expected: "connector",
        })?;
        let sequence = array.add_hook(Hook {
            id: encoded,
            ..hook
        })?;
        self.links.insert(Link::new(target.get(), connector.get()));
        Ok(sequence)
    }

    /// 解除挂接；该连接器不再有指向同一目标的 hook 时一并删除链接。
    pub fn unbind_hook(&mut self, connector: ShapeId, index: usize) -> Result<Hook, CoreError> {
        let shape = self
            .shapes
            .get_mut(&connector)
            .ok_or(CoreError::ShapeNotFound(connector.get()))?;
        let array = shape.array_mut().ok_or(CoreError::WrongShapeKind {
            id: connector.get(),
            expected: "connector",
        })?;
        let removed = array.remove_hook(index)?;
        if let Some(target) = removed.target() {
            if array.hooks_for(target).is_empty() {
                self.links.remove(target, connector.get());
            }
        }
        Ok(removed)
    }

    /// 删除图元并级联清理图层 z 序、链接以及其他连接器上指向它的 hook。
    pub fn remove_shape(&mut self, id: ShapeId) -> Result<Shape, CoreError> {
        let removed = self
            .shapes
            .remove(&id)
            .ok_or(CoreError::ShapeNotFound(id.get()))?;
        self.layers.remove_shape_from_all(id.get());
        self.links.remove_target(id.get());
        self.links.remove_hook_owner(id.get());
        for shape in self.shapes.values_mut() {
            if let Some(array) = shape.array_mut() {
                array.remove_hooks_to(id.get());
            }
        }
        Ok(removed)
    }

    /// 平移单个图元，见 [`Document::translate_shapes`]。
    pub fn translate_shape(&mut self, id: ShapeId, offset: Vector2) -> Result<(), CoreError> {
        self.translate_shapes(&[id], offset).map(|_| ())
    }

    /// 平移一组图元。指向它们的链接标记为 `MOVE`；挂在它们上面的 hook 终点随之移动，
    /// 不在这组里的连接器把对应端点跟过去并重新走线。返回重新走线的连接器数量。
    pub fn translate_shapes(
        &mut self,
        ids: &[ShapeId],
        offset: Vector2,
    ) -> Result<usize, CoreError> {
        if !offset.is_finite() {
            return Err(CoreError::NonFinite("offset"));
        }
        let moving: BTreeSet<ShapeId> = ids.iter().copied().collect();
        let mut moved = Vec::with_capacity(moving.len());
        for &id in &moving {
            let mut shape = self.require(id)?.clone();
            shape.translate(offset)?;
            moved.push((id, shape));
        }
        for (id, shape) in moved {
            self.shapes.insert(id, shape);
        }

        let mut followers: BTreeMap<u64, Vec<u64>> = BTreeMap::new();
        for id in &moving {
            self.links.set_flag(id.get(), LinkFlags::MOVE);
            for link in self.links.links_to(id.get()) {
                followers.entry(link.hook_id).or_default().push(id.get());
            }
        }
        let mut rerouted = 0;
        for (owner, targets) in followers {
            let owner_moved = moving.contains(&ShapeId::new(owner));
            let Some(shape) = self.shapes.get_mut(&ShapeId::new(owner)) else {
                continue;
            };
            if owner_moved {
                if let Some(array) = shape.array_mut() {
                    for target in targets {
                        array.translate_hook_ends(target, offset);
                    }
                }
                continue;
            }
            let mut moved_ends = [false; 2];
            let mut changed = false;
            for target in targets {
                changed |= shape.follow_target(target, offset, &mut moved_ends);
            }
            if changed {
                rerouted += 1;
            }
        }
        Ok(rerouted)
    }

    /// 当前带 `MOVE` 标志的链接数量。
    pub fn moved_link_count(&self) -> usize {
        self.links
            .iter()
            .filter(|link| link.has_flag(LinkFlags::MOVE))
            .count()
    }

    pub fn clear_link_flags(&mut self) {
        self.links.clear_flags();
    }

    pub fn connectors_targeting(&self, target: ShapeId) -> Vec<ShapeId> {
        self.links
            .links_to(target.get())
            .iter()
            .map(|link| ShapeId::new(link.hook_id))
            .collect()
    }

    pub fn add_layer(&mut self, layer: Layer) -> Result<usize, CoreError> {
        self.layers.add_layer(layer)
    }

    pub fn insert_layer(&mut self, index: usize, layer: Layer) -> Result<(), CoreError> {
        self.layers.insert_layer(index, layer)
    }

    /// 删除图层及其上的全部图元（逐个级联）。
    pub fn remove_layer(&mut self, index: usize) -> Result<Layer, CoreError> {
        let shapes = self
            .layers
            .layer(index)
            .map(|layer| layer.z_list.clone())
            .ok_or(CoreError::out_of_range("layer", index, self.layers.len()))?;
        for id in shapes {
            if self.contains(ShapeId::new(id)) {
                self.remove_shape(ShapeId::new(id))?;
            }
        }
        self.layers.remove_layer(index)
    }

    pub fn set_active_layer(&mut self, index: usize) -> Result<(), CoreError> {
        self.layers.set_active_layer(index)
    }

    pub fn set_layer_visible(&mut self, index: usize, visible: bool) -> Result<(), CoreError> {
        self.layers.set_layer_visible(index, visible)
    }

    pub fn set_layer_flags(&mut self, index: usize, flags: u32) -> Result<(), CoreError> {
        self.layers.set_layer_flags(index, flags)
    }

    pub fn rotate_layers(&mut self) {
        self.layers.rotate_stack();
    }

    pub fn bring_to_front(&mut self, id: ShapeId) -> bool {
        self.layers.bring_to_front(id.get())
    }

    /// 不在任何图层里的图元放到活动图层（放不进去则删除）；丢弃悬空引用：不存在的 z 序条目、指向缺失图元的 hook 与链接；为缺失链接的 hook 补链。
    pub fn repair_references(&mut self) -> LoadReport {
        let mut report = LoadReport::default();

        let orphans: Vec<ShapeId> = self
            .shapes
            .keys()
            .copied()
            .filter(|id| self.layers.find_layer_for_shape(id.get()).is_none())
            .collect();
        for id in orphans {
            if self.layers.add_shape_to_active(id.get()).is_ok() {
                report.adopted_shapes += 1;
            } else {
                self.shapes.remove(&id);
                report.dropped_shapes += 1;
            }
        }

        let existing: Vec<u64> = self.shapes.keys().map(|id| id.get()).collect();
        let exists = |id: u64| existing.binary_search(&id).is_ok();

        for index in 0..self.layers.len() {
            let stale: Vec<u64> = self
                .layers
                .layer(index)
                .map(|layer| layer.z_list.iter().copied().filter(|id| !exists(*id)).collect())
                .unwrap_or_default();
            for id in stale {
                self.layers.remove_shape_from_all(id);
                report.dropped_z_entries += 1;
            }
        }

        for (owner, shape) in self.shapes.iter_mut() {
            if let Some(array) = shape.array_mut() {
                let removed = array.remove_hooks_where(|hook| match hook.target() {
                    Some(target) => target == owner.get() || !exists(target),
                    None => true,
                });
                report.dropped_hooks += removed.len();
            }
        }

        let shapes = &self.shapes;
        report.dropped_links = self.links.retain(|link| {
            shapes
                .get(&ShapeId::new(link.hook_id))
                .and_then(Shape::array)
                .is_some_and(|array| {
                    exists(link.target_id) && !array.hooks_for(link.target_id).is_empty()
                })
        });

        let mut missing = Vec::new();
        for (owner, shape) in &self.shapes {
            if let Some(array) = shape.array() {
                for target in array.targets() {
                    if !self.links.contains(target, owner.get()) {
                        missing.push(Link::new(target, owner.get()));
                    }
                }
            }
        }
        report.restored_links = missing.len();
        for link in missing {
            self.links.insert(link);
        }
        report
    }

    /// 后置检查：返回仍然指向缺失图元的 (持有者, 目标) 对。
    pub fn dangling_references(&self) -> Vec<(ShapeId, u64)> {
        let mut dangling = Vec::new();
        for (owner, shape) in &self.shapes {
            if let Some(array) = shape.array() {
                for target in array.targets() {
                    if !self.contains(ShapeId::new(target)) {
                        dangling.push((*owner, target));
                    }
                }
            }
        }
        for link in self.links.iter() {
            if !self.contains(ShapeId::new(link.target_id)) {
                dangling.push((ShapeId::new(link.hook_id), link.target_id));
            }
        }
        dangling
    }

    pub fn shape_bounds(&self, id: ShapeId) -> Option<BoundingBox> {
        self.shapes.get(&id).map(Shape::bounds)
    }

    /// 全部图元的包围盒；空文档返回未初始化的盒。
    pub fn bounds(&self) -> BoundingBox {
        let mut bounds = BoundingBox::uninitialized();
        for shape in self.shapes.values() {
            bounds.include_box(&shape.bounds());
        }
        bounds
    }

    /// 自顶层可见图层、z 序最上方开始命中测试。
    pub fn hit_test(&self, point: Point2, tolerance: f64) -> Option<(ShapeId, Option<usize>)> {
        self.layers
            .layers()
            .iter()
            .rev()
            .filter(|layer| layer.is_visible())
            .flat_map(|layer| layer.z_list.iter().rev())
            .find_map(|&raw| {
                let id = ShapeId::new(raw);
                self.shapes
                    .get(&id)
                    .and_then(|shape| shape.hit(point, tolerance))
                    .map(|segment| (id, segment))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::LayerFlags;
    use crate::segments::SegDirection;

    fn room() -> Shape {
        let polygon = Polygon::from_points(
            [
                Point2::new(0.0, 0.0),
                Point2::new(100.0, 0.0),
                Point2::new(100.0, 80.0),
                Point2::new(0.0, 80.0),
            ],
            true,
        )
        .expect("room outline");
        Shape::polygon("room", polygon)
    }

    fn duct(start: Point2, end: Point2) -> Shape {
        let route = SegLine::new(start, end, SegDirection::Horizontal, SegDirection::Horizontal)
            .expect("route");
        Shape::connector("duct", route)
    }

    fn sensor(x: f64, y: f64) -> Shape {
        Shape::symbol("sensor", BoundingBox::new(x, y, 10.0, 10.0), "T1")
    }

    fn route_of(document: &Document, id: ShapeId) -> &SegLine {
        match &document.shape(id).expect("connector").kind {
            ShapeKind::Connector { route, .. } => route,
            other => panic!("expected connector, got {}", other.label()),
        }
    }

    /// 风管终点 (50,0) 挂在设备上。
    fn duct_hooked_to_unit() -> (Document, ShapeId, ShapeId) {
        let mut document = Document::new();
        let duct = document
            .add_shape(duct(Point2::new(0.0, 0.0), Point2::new(50.0, 0.0)))
            .expect("duct");
        let unit = document.add_shape(sensor(50.0, -5.0)).expect("unit");
        let end = Point2::new(50.0, 0.0);
        document
            .bind_hook(duct, unit, Hook::unbound().with_endpoints(end, end))
            .expect("bind");
        (document, duct, unit)
    }

    #[test]
    fn add_shape_goes_to_active_layer() {
        let mut document = Document::new();
        let id = document.add_shape(room()).expect("add room");
        assert_eq!(document.layers().find_layer_for_shape(id.get()), Some(0));
        assert_eq!(document.len(), 1);

        let mut empty = Document::new();
        empty.remove_layer(0).expect("remove layer");
        assert_eq!(empty.add_shape(room()), Err(CoreError::NoActiveLayer));
        assert!(empty.is_empty());
    }

    #[test]
    fn bind_hook_validates_both_ends() {
        let mut document = Document::new();
        let duct = document
            .add_shape(duct(Point2::new(0.0, 0.0), Point2::new(50.0, 0.0)))
            .expect("duct");
        let room = document.add_shape(room()).expect("room");

        assert_eq!(
            document.bind_hook(duct, ShapeId::new(99), Hook::unbound()),
            Err(CoreError::ShapeNotFound(99))
        );
        assert_eq!(
            document.bind_hook(duct, duct, Hook::unbound()),
            Err(CoreError::SelfHook(duct.get()))
        );
        assert_eq!(
            document.bind_hook(room, duct, Hook::unbound()),
            Err(CoreError::WrongShapeKind {
                id: room.get(),
                expected: "connector"
            })
        );
        assert_eq!(document.bind_hook(duct, room, Hook::unbound()), Ok(0));
        assert!(document.links().contains(room.get(), duct.get()));
    }

    #[test]
    fn removing_first_hook_keeps_sequence_of_second() {
        let mut document = Document::new();
        let duct = document
            .add_shape(duct(Point2::new(0.0, 0.0), Point2::new(50.0, 0.0)))
            .expect("duct");
        let target = document.add_shape(sensor(60.0, 0.0)).expect("sensor");
        assert_eq!(document.bind_hook(duct, target, Hook::unbound()), Ok(0));
        assert_eq!(document.bind_hook(duct, target, Hook::unbound()), Ok(1));

        document.unbind_hook(duct, 0).expect("unbind a");
        let array = document.shape(duct).and_then(Shape::array).expect("array");
        assert_eq!(array.hooks().len(), 1);
        assert_eq!(array.hooks()[0].sequence, 1);
        assert!(document.links().contains(target.get(), duct.get()));

        document.unbind_hook(duct, 0).expect("unbind b");
        assert!(!document.links().contains(target.get(), duct.get()));
    }

    #[test]
    fn removing_target_cascades_hooks_and_links() {
        let mut document = Document::new();
        let supply = document
            .add_shape(duct(Point2::new(0.0, 0.0), Point2::new(50.0, 0.0)))
            .expect("supply");
        let ret = document
            .add_shape(duct(Point2::new(0.0, 20.0), Point2::new(50.0, 20.0)))
            .expect("return");
        let unit = document.add_shape(sensor(60.0, 0.0)).expect("unit");
        let other = document.add_shape(sensor(90.0, 0.0)).expect("other");
        document.bind_hook(supply, unit, Hook::unbound()).expect("bind");
        document.bind_hook(ret, unit, Hook::unbound()).expect("bind");
        document.bind_hook(ret, other, Hook::unbound()).expect("bind");

        document.remove_shape(unit).expect("remove unit");
        assert!(document.dangling_references().is_empty());
        assert!(document.links().links_to(unit.get()).is_empty());
        let ret_hooks = document.shape(ret).and_then(Shape::array).expect("array");
        assert_eq!(ret_hooks.hooks().len(), 1);
        assert_eq!(ret_hooks.hooks()[0].target(), Some(other.get()));
        assert_eq!(document.layers().find_layer_for_shape(unit.get()), None);

        document.remove_shape(ret).expect("remove connector");
        assert!(document.links().is_empty());
        assert_eq!(document.remove_shape(ret).err(), Some(CoreError::ShapeNotFound(ret.get())));
    }

    #[test]
    fn repair_drops_dangling_references() {
        let mut document = Document::new();
        let duct = document
            .add_shape(duct(Point2::new(0.0, 0.0), Point2::new(50.0, 0.0)))
            .expect("duct");
        let unit = document.add_shape(sensor(60.0, 0.0)).expect("unit");
        document.bind_hook(duct, unit, Hook::unbound()).expect("bind");

        // 绕过级联直接删除图元，模拟损坏的存档
        document.shapes.remove(&unit);
        let report = document.repair_references();
        assert_eq!(report.dropped_hooks, 1);
        assert_eq!(report.dropped_links, 1);
        assert_eq!(report.dropped_z_entries, 1);
        assert!(document.dangling_references().is_empty());
        assert!(document.repair_references().is_clean());
    }

    #[test]
    fn repair_restores_missing_links() {
        let mut document = Document::new();
        let duct = document
            .add_shape(duct(Point2::new(0.0, 0.0), Point2::new(50.0, 0.0)))
            .expect("duct");
        let unit = document.add_shape(sensor(60.0, 0.0)).expect("unit");
        document.bind_hook(duct, unit, Hook::unbound()).expect("bind");
        document.links.remove_target(unit.get());

        let report = document.repair_references();
        assert_eq!(report.restored_links, 1);
        assert!(document.links().contains(unit.get(), duct.get()));
    }

    #[test]
    fn hit_test_prefers_top_most_shape() {
        let mut document = Document::new();
        let room = document.add_shape(room()).expect("room");
        let sensor = document.add_shape(sensor(40.0, 40.0)).expect("sensor");

        assert_eq!(document.hit_test(Point2::new(45.0, 45.0), 1.0), Some((sensor, None)));
        assert_eq!(document.hit_test(Point2::new(20.0, 20.0), 1.0), Some((room, None)));
        assert_eq!(
            document.hit_test(Point2::new(100.5, 40.0), 1.0),
            Some((room, Some(1)))
        );
        assert_eq!(document.hit_test(Point2::new(500.0, 500.0), 1.0), None);

        document.set_layer_visible(0, false).expect("hide");
        assert_eq!(document.hit_test(Point2::new(45.0, 45.0), 1.0), None);
    }

    #[test]
    fn translate_moves_hook_ends_and_flags_links() {
        let mut document = Document::new();
        let duct = document
            .add_shape(duct(Point2::new(0.0, 0.0), Point2::new(50.0, 0.0)))
            .expect("duct");
        let unit = document.add_shape(sensor(60.0, 0.0)).expect("unit");
        let hook = Hook::unbound().with_endpoints(Point2::new(50.0, 0.0), Point2::new(60.0, 5.0));
        document.bind_hook(duct, unit, hook).expect("bind");

        document
            .translate_shape(unit, Vector2::new(10.0, 0.0))
            .expect("translate");
        let bounds = document.shape_bounds(unit).expect("bounds");
        assert_eq!(bounds.x, 70.0);
        let array = document.shape(duct).and_then(Shape::array).expect("array");
        assert_eq!(array.hooks()[0].end_point, Point2::new(70.0, 5.0));
        assert_eq!(array.hooks()[0].start_point, Point2::new(60.0, 0.0));
        assert_eq!(route_of(&document, duct).end, Point2::new(60.0, 0.0));
        assert!(document.links().links_to(unit.get())[0].has_flag(LinkFlags::MOVE));
        assert_eq!(document.moved_link_count(), 1);

        document.clear_link_flags();
        assert_eq!(document.links().links_to(unit.get())[0].flags, 0);
    }

    #[test]
    fn remove_layer_cascades_its_shapes() {
        let mut document = Document::new();
        let duct = document
            .add_shape(duct(Point2::new(0.0, 0.0), Point2::new(50.0, 0.0)))
            .expect("duct");
        document.add_layer(Layer::new("equipment")).expect("layer");
        document.set_active_layer(1).expect("activate");
        let unit = document.add_shape(sensor(60.0, 0.0)).expect("unit");
        document.bind_hook(duct, unit, Hook::unbound()).expect("bind");

        document.remove_layer(1).expect("remove layer");
        assert!(!document.contains(unit));
        assert!(document.dangling_references().is_empty());
        assert_eq!(document.layers().active_layer_index(), 0);
    }

    #[test]
    fn arrows_mark_path_ends() {
        let shape = Shape::line("arrow", Point2::new(0.0, 0.0), Point2::new(10.0, 0.0))
            .with_arrows(ArrowheadRecord::NONE, 1);
        let path = shape.path_points();
        assert!(!path[0].has_arrowhead);
        assert!(path[1].has_arrowhead);
    }

    #[test]
    fn snapshot_round_trips_and_keeps_ids_fresh() {
        let mut document = Document::new();
        let duct = document
            .add_shape(duct(Point2::new(0.0, 0.0), Point2::new(50.0, 0.0)))
            .expect("duct");
        let unit = document.add_shape(sensor(60.0, 0.0)).expect("unit");
        document.bind_hook(duct, unit, Hook::unbound()).expect("bind");

        let mut json = serde_json::to_value(&document).expect("serialize");
        let restored: Document = serde_json::from_value(json.clone()).expect("deserialize");
        assert_eq!(restored, document);

        json["next_shape_id"] = serde_json::json!(0);
        let mut restored: Document = serde_json::from_value(json).expect("deserialize");
        let fresh = restored.add_shape(sensor(0.0, 0.0)).expect("add");
        assert_eq!(fresh.get(), 2);
    }

    #[test]
    fn hooked_duct_end_follows_moved_unit() {
        let (mut document, duct, unit) = duct_hooked_to_unit();
        let rerouted = document
            .translate_shapes(&[unit], Vector2::new(100.0, 40.0))
            .expect("translate");
        assert_eq!(rerouted, 1);

        let route = route_of(&document, duct);
        assert_eq!(route.start, Point2::new(0.0, 0.0));
        assert_eq!(route.end, Point2::new(150.0, 40.0));
        assert_eq!(
            route.points(),
            &[
                Point2::new(0.0, 0.0),
                Point2::new(75.0, 0.0),
                Point2::new(75.0, 40.0),
                Point2::new(150.0, 40.0),
            ]
        );
        let hook = &document.shape(duct).and_then(Shape::array).expect("array").hooks()[0];
        assert_eq!(hook.start_point, Point2::new(150.0, 40.0));
        assert_eq!(hook.end_point, Point2::new(150.0, 40.0));
    }

    #[test]
    fn moving_duct_with_its_unit_translates_once() {
        let (mut document, duct, unit) = duct_hooked_to_unit();
        let rerouted = document
            .translate_shapes(&[duct, unit, duct], Vector2::new(10.0, 10.0))
            .expect("translate");
        assert_eq!(rerouted, 0);

        let route = route_of(&document, duct);
        assert_eq!(route.start, Point2::new(10.0, 10.0));
        assert_eq!(route.end, Point2::new(60.0, 10.0));
        let hook = &document.shape(duct).and_then(Shape::array).expect("array").hooks()[0];
        assert_eq!(hook.start_point, Point2::new(60.0, 10.0));
        assert_eq!(hook.end_point, Point2::new(60.0, 10.0));
        assert_eq!(document.shape_bounds(unit).expect("bounds").x, 60.0);
    }

    #[test]
    fn translate_group_is_all_or_nothing() {
        let (mut document, duct, unit) = duct_hooked_to_unit();
        let before = document.clone();
        assert_eq!(
            document.translate_shapes(&[unit, ShapeId::new(42)], Vector2::new(5.0, 0.0)),
            Err(CoreError::ShapeNotFound(42))
        );
        assert_eq!(
            document.translate_shapes(&[duct], Vector2::new(f64::NAN, 0.0)),
            Err(CoreError::NonFinite("offset"))
        );
        assert_eq!(document, before);
    }

    #[test]
    fn snapshot_with_id_beyond_range_is_rejected() {
        let (document, _, _) = duct_hooked_to_unit();
        let mut json = serde_json::to_value(&document).expect("serialize");
        json["shapes"][1]["id"] = serde_json::json!(u64::MAX);
        let err = serde_json::from_value::<Document>(json).expect_err("id out of range");
        assert!(err.to_string().contains("exceeds"), "{err}");
    }

    #[test]
    fn snapshot_with_exhausted_hook_sequence_is_rejected() {
        let (document, _, _) = duct_hooked_to_unit();
        let mut json = serde_json::to_value(&document).expect("serialize");
        json["shapes"][0]["shape"]["kind"]["Connector"]["array"]["hooks"][0]["sequence"] =
            serde_json::json!(u32::MAX);
        assert!(serde_json::from_value::<Document>(json).is_err());
    }

    #[test]
    fn exhausted_id_space_refuses_new_shapes() {
        let (document, _, _) = duct_hooked_to_unit();
        let mut json = serde_json::to_value(&document).expect("serialize");
        json["next_shape_id"] = serde_json::json!(ShapeId::MAX + 1);
        let mut loaded: Document = serde_json::from_value(json).expect("deserialize");
        let before = loaded.clone();
        assert_eq!(
            loaded.add_shape(sensor(0.0, 0.0)),
            Err(CoreError::ShapeIdOutOfRange(ShapeId::MAX + 1))
        );
        assert_eq!(loaded, before);
    }

    #[test]
    fn add_shape_never_overwrites_existing_id() {
        let (mut document, duct, _) = duct_hooked_to_unit();
        document.next_shape_id = duct.get();
        let before = document.clone();
        assert_eq!(
            document.add_shape(sensor(0.0, 0.0)),
            Err(CoreError::DuplicateShape(duct.get()))
        );
        assert_eq!(document, before);
    }

    #[test]
    fn repair_adopts_shape_missing_from_every_layer() {
        let (mut document, duct, unit) = duct_hooked_to_unit();
        document.add_layer(Layer::new("equipment")).expect("layer");
        document.set_active_layer(1).expect("activate");
        document.layers.remove_shape_from_all(unit.get());

        let report = document.repair_references();
        assert_eq!(report.adopted_shapes, 1);
        assert_eq!(report.dropped_shapes, 0);
        assert_eq!(document.layers().find_layer_for_shape(unit.get()), Some(1));
        assert!(document.links().contains(unit.get(), duct.get()));
        assert!(document.repair_references().is_clean());
    }

    #[test]
    fn repair_drops_orphan_when_active_layer_is_locked() {
        let (mut document, duct, unit) = duct_hooked_to_unit();
        document
            .set_layer_flags(0, LayerFlags::VISIBLE | LayerFlags::NO_ADD)
            .expect("lock");
        document.layers.remove_shape_from_all(unit.get());

        let report = document.repair_references();
        assert_eq!(report.dropped_shapes, 1);
        assert_eq!(report.dropped_hooks, 1);
        assert_eq!(report.dropped_links, 1);
        assert!(!document.contains(unit));
        let array = document.shape(duct).and_then(Shape::array).expect("array");
        assert!(array.hooks().is_empty());
        assert!(document.dangling_references().is_empty());
    }
}
