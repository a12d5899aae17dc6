pub mod command;
pub mod ui_state;

pub mod errors {
    use hvac_core::errors::CoreError;
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum EngineError {
        #[error("shape with id {0} not found")]
        ShapeNotFound(u64),
        #[error("an edit is already in progress")]
        EditInProgress,
        #[error("no edit in progress")]
        NoEditInProgress,
        #[error(transparent)]
        Core(#[from] CoreError),
    }
}

pub mod scene {
    use std::collections::HashSet;

    use hvac_core::document::{Document, Shape, ShapeId};
    use hvac_core::geometry::{BoundingBox, Point2, Size2, Vector2};
    use hvac_core::hooks::Hook;
    use hvac_core::interaction::{DynamicGuides, RightClickData};
    use hvac_core::layers::Layer;
    use hvac_core::segments::{Polygon, PolygonTemplate, SegDirection, SegLine};
    use hvac_core::transform::DocInfo;
    use tracing::{debug, info};

    use crate::errors::EngineError;
    use crate::ui_state::{UiEvent, UiStateBus};

    /// 编辑开始时的已提交快照（文档、选中集与视图），取消编辑时整体恢复。
    #[derive(Debug, Clone)]
    struct EditSnapshot {
        document: Document,
        selected: HashSet<ShapeId>,
        doc_info: DocInfo,
    }

    /// 引擎层负责维护 `Document`、坐标变换与运行时状态（选中集、进行中的编辑）。
    #[derive(Debug)]
    pub struct Scene {
        document: Document,
        doc_info: DocInfo,
        selected: HashSet<ShapeId>,
        pending_edit: Option<EditSnapshot>,
        bus: UiStateBus,
    }

    #[derive(Debug, Clone, Copy)]
    pub struct DemoShapes {
        pub room: ShapeId,
        pub air_handler: ShapeId,
        pub sensor: ShapeId,
        pub supply_duct: ShapeId,
        pub return_duct: ShapeId,
        pub airflow_arrow: ShapeId,
    }

    impl Scene {
        pub fn new() -> Self {
            Self::with_view(DocInfo::default())
        }

        pub fn with_view(doc_info: DocInfo) -> Self {
            Self {
                document: Document::new(),
                doc_info,
                selected: HashSet::new(),
                pending_edit: None,
                bus: UiStateBus::new(),
            }
        }

        /// 使用现有文档初始化场景。
        pub fn with_document(document: Document, doc_info: DocInfo) -> Self {
            let mut scene = Self::with_view(doc_info);
            scene.load_document(document);
            scene
        }

        /// 替换当前文档并重置选中集与进行中的编辑。
        pub fn load_document(&mut self, document: Document) {
            self.document = document;
            self.selected.clear();
            self.pending_edit = None;
            debug!(shapes = self.document.len(), "已载入文档");
            self.bus.notify(&UiEvent::DocumentReplaced);
        }

        #[inline]
        pub fn document(&self) -> &Document {
            &self.document
        }

        #[inline]
        pub fn doc_info(&self) -> &DocInfo {
            &self.doc_info
        }

        #[inline]
        pub fn bus(&self) -> &UiStateBus {
            &self.bus
        }

        #[inline]
        pub fn bus_mut(&mut self) -> &mut UiStateBus {
            &mut self.bus
        }

        pub fn shape(&self, id: ShapeId) -> Option<&Shape> {
            self.document.shape(id)
        }

        pub fn add_shape(&mut self, shape: Shape) -> Result<ShapeId, EngineError> {
            Ok(self.document.add_shape(shape)?)
        }

        pub fn bind_connector(
            &mut self,
            connector: ShapeId,
            target: ShapeId,
            hook: Hook,
        ) -> Result<u32, EngineError> {
            let sequence = self.document.bind_hook(connector, target, hook)?;
            debug!(
                connector = connector.get(),
                target = target.get(),
                sequence,
                "连接器已挂接"
            );
            Ok(sequence)
        }

        pub fn add_layer(&mut self, layer: Layer) -> Result<usize, EngineError> {
            Ok(self.document.add_layer(layer)?)
        }

        pub fn set_active_layer(&mut self, index: usize) -> Result<(), EngineError> {
            self.document.set_active_layer(index)?;
            let index = self.document.layers().active_layer_index();
            self.bus.notify(&UiEvent::ActiveLayerChanged { index });
            Ok(())
        }

        /// 返回当前选中图元数量。
        #[inline]
        pub fn selection_len(&self) -> usize {
            self.selected.len()
        }

        #[inline]
        pub fn is_selected(&self, id: ShapeId) -> bool {
            self.selected.contains(&id)
        }

        /// 选中指定图元。若图元不存在则返回错误。
        pub fn select(&mut self, id: ShapeId) -> Result<(), EngineError> {
            if !self.document.contains(id) {
                return Err(EngineError::ShapeNotFound(id.get()));
            }
            if self.selected.insert(id) {
                self.notify_selection();
            }
            Ok(())
        }

        /// 取消选中，返回之前是否处于选中状态。
        pub fn deselect(&mut self, id: ShapeId) -> bool {
            let removed = self.selected.remove(&id);
            if removed {
                self.notify_selection();
            }
            removed
        }

        /// 切换选中状态，返回切换后的状态。
        pub fn toggle_selection(&mut self, id: ShapeId) -> Result<bool, EngineError> {
            if !self.document.contains(id) {
                return Err(EngineError::ShapeNotFound(id.get()));
            }
            let selected = if self.selected.insert(id) {
                true
            } else {
                self.selected.remove(&id);
                false
            };
            self.notify_selection();
            Ok(selected)
        }

        pub fn clear_selection(&mut self) {
            if !self.selected.is_empty() {
                self.selected.clear();
                self.notify_selection();
            }
        }

        /// 以 id 升序返回选中图元。
        pub fn selection(&self) -> Vec<ShapeId> {
            let mut ids: Vec<ShapeId> = self.selected.iter().copied().collect();
            ids.sort();
            ids
        }

        pub fn selection_bounds(&self) -> Option<BoundingBox> {
            let mut bounds = BoundingBox::uninitialized();
            for id in &self.selected {
                if let Some(shape_bounds) = self.document.shape_bounds(*id) {
                    bounds.include_box(&shape_bounds);
                }
            }
            bounds.is_initialized().then_some(bounds)
        }

        fn notify_selection(&mut self) {
            let count = self.selected.len();
            self.bus.notify(&UiEvent::SelectionChanged { count });
        }

        fn notify_scroll(&mut self) {
            let scroll = self.doc_info.scroll();
            self.bus.notify(&UiEvent::ScrollChanged {
                x: scroll.x(),
                y: scroll.y(),
            });
        }

        fn notify_zoom(&mut self) {
            let scale = self.doc_info.document_scale();
            self.bus.notify(&UiEvent::ZoomChanged { scale });
            self.notify_scroll();
        }

        /// 设置缩放（夹紧），返回实际缩放。
        pub fn set_zoom(&mut self, scale: f64) -> Result<f64, EngineError> {
            let applied = self.doc_info.set_zoom(scale)?;
            debug!(requested = scale, applied, "缩放已更新");
            self.notify_zoom();
            Ok(applied)
        }

        pub fn zoom_in(&mut self) -> Result<f64, EngineError> {
            let applied = self.doc_info.zoom_in()?;
            self.notify_zoom();
            Ok(applied)
        }

        pub fn zoom_out(&mut self) -> Result<f64, EngineError> {
            let applied = self.doc_info.zoom_out()?;
            self.notify_zoom();
            Ok(applied)
        }

        pub fn set_scroll(&mut self, x: f64, y: f64) -> Result<(), EngineError> {
            self.doc_info.set_scroll(x, y)?;
            self.notify_scroll();
            Ok(())
        }

        pub fn scroll_by(&mut self, delta: Vector2) -> Result<(), EngineError> {
            self.doc_info.scroll_by(delta)?;
            self.notify_scroll();
            Ok(())
        }

        pub fn set_display(&mut self, origin: Point2, size: Size2) -> Result<(), EngineError> {
            self.doc_info.set_display(origin, size)?;
            self.notify_scroll();
            Ok(())
        }

        /// 把选中图元（为空时退化到整个文档）滚动到显示区中心。无图元时不做任何事。
        pub fn focus_on_selection(&mut self) -> Result<(), EngineError> {
            let target = self.selection_bounds().or_else(|| {
                let bounds = self.document.bounds();
                bounds.is_initialized().then_some(bounds)
            });
            if let Some(bounds) = target {
                self.doc_info.center_on(bounds)?;
                self.notify_scroll();
            }
            Ok(())
        }

        /// 滚动使文档点可见，返回是否发生了滚动。
        pub fn reveal(&mut self, point: Point2) -> Result<bool, EngineError> {
            match self.doc_info.scroll_to_visible(point) {
                Some(scroll) => {
                    self.set_scroll(scroll.x(), scroll.y())?;
                    Ok(true)
                }
                None => Ok(false),
            }
        }

        #[inline]
        pub fn is_editing(&self) -> bool {
            self.pending_edit.is_some()
        }

        /// 开始一次交互编辑，记录已提交快照。
        pub fn begin_edit(&mut self) -> Result<(), EngineError> {
            if self.pending_edit.is_some() {
                return Err(EngineError::EditInProgress);
            }
            self.pending_edit = Some(EditSnapshot {
                document: self.document.clone(),
                selected: self.selected.clone(),
                doc_info: self.doc_info,
            });
            Ok(())
        }

        pub fn commit_edit(&mut self) -> Result<(), EngineError> {
            self.pending_edit
                .take()
                .ok_or(EngineError::NoEditInProgress)?;
            let moved_links = self.document.moved_link_count();
            if moved_links > 0 {
                debug!(moved_links, "提交编辑，清除链接移动标记");
            }
            self.document.clear_link_flags();
            self.bus.notify(&UiEvent::EditCommitted);
            Ok(())
        }

        /// 取消编辑并回滚到已提交快照。
        pub fn cancel_edit(&mut self) -> Result<(), EngineError> {
            let snapshot = self
                .pending_edit
                .take()
                .ok_or(EngineError::NoEditInProgress)?;
            self.document = snapshot.document;
            self.selected = snapshot.selected;
            let view_changed = self.doc_info != snapshot.doc_info;
            self.doc_info = snapshot.doc_info;
            debug!(view_changed, "编辑已取消，文档已回滚");
            if view_changed {
                self.notify_zoom();
            }
            self.bus.notify(&UiEvent::EditCancelled);
            Ok(())
        }

        /// 平移选中图元，挂接在其上的连接器重新走线。偏移非法时整体拒绝。
        pub fn move_selection(&mut self, offset: Vector2) -> Result<(), EngineError> {
            let ids = self.selection();
            let rerouted = self.document.translate_shapes(&ids, offset)?;
            debug!(count = ids.len(), rerouted, "已平移选中图元");
            Ok(())
        }

        /// 删除选中图元（级联清理引用），返回删除数量。
        pub fn delete_selection(&mut self) -> Result<usize, EngineError> {
            let ids = self.selection();
            for id in &ids {
                self.document.remove_shape(*id)?;
            }
            self.selected.clear();
            if !ids.is_empty() {
                info!(count = ids.len(), "已删除选中图元");
                self.notify_selection();
            }
            Ok(ids.len())
        }

        /// 右键命中测试，`tolerance_px` 为屏幕像素容差。
        pub fn right_click(&self, screen_point: Point2, tolerance_px: f64) -> RightClickData {
            let document_point = self.doc_info.screen_to_document(screen_point);
            let tolerance = self.doc_info.length_to_document(tolerance_px);
            let hit = self.document.hit_test(document_point, tolerance);
            RightClickData {
                document_point,
                screen_point,
                shape: hit.map(|(id, _)| id.get()),
                segment_index: hit.and_then(|(_, segment)| segment),
                layer_index: hit
                    .and_then(|(id, _)| self.document.layers().find_layer_for_shape(id.get())),
            }
        }

        /// 选中图元相对其余图元的动态对齐，`snap_px` 为屏幕像素吸附距离。
        pub fn snap_guides(&self, snap_px: f64) -> DynamicGuides {
            let Some(moving) = self.selection_bounds() else {
                return DynamicGuides::default();
            };
            let others = self
                .document
                .shapes()
                .filter(|(id, _)| !self.selected.contains(id))
                .map(|(id, shape)| (id.get(), shape.bounds()));
            DynamicGuides::compute(moving, others, self.doc_info.length_to_document(snap_px))
        }

        /// 为 CLI / 快速验证填充一组示例图元：房间、空调机组、传感器、送回风管与气流箭头。
        pub fn populate_demo(&mut self) -> Result<DemoShapes, EngineError> {
            self.clear_selection();

            let outline = Polygon::from_points(
                [
                    Point2::new(100.0, 100.0),
                    Point2::new(700.0, 100.0),
                    Point2::new(700.0, 500.0),
                    Point2::new(100.0, 500.0),
                ],
                true,
            )?;
            let room = self.document.add_shape(Shape::polygon("office", outline))?;

            let equipment = self.document.add_layer(Layer::new("equipment"))?;
            self.set_active_layer(equipment)?;

            let unit_frame = PolygonTemplate::Hexagon { offset: 20.0 }
                .build(BoundingBox::new(800.0, 240.0, 120.0, 80.0))?;
            let air_handler = self.document.add_shape(Shape::polygon("ahu-1", unit_frame))?;
            let sensor = self.document.add_shape(Shape::symbol(
                "sensor-t1",
                BoundingBox::new(380.0, 280.0, 40.0, 40.0),
                "T1",
            ))?;

            let supply_route = SegLine::new(
                Point2::new(800.0, 260.0),
                Point2::new(400.0, 100.0),
                SegDirection::Horizontal,
                SegDirection::Vertical,
            )?
            .with_curve(15.0);
            let supply_duct = self
                .document
                .add_shape(Shape::connector("supply", supply_route).with_arrows(0, 1))?;
            let return_route = SegLine::new(
                Point2::new(700.0, 400.0),
                Point2::new(800.0, 300.0),
                SegDirection::Horizontal,
                SegDirection::Horizontal,
            )?;
            let return_duct = self
                .document
                .add_shape(Shape::connector("return", return_route))?;

            self.bind_connector(
                supply_duct,
                air_handler,
                Hook::unbound()
                    .with_endpoints(Point2::new(800.0, 260.0), Point2::new(800.0, 260.0))
                    .with_gaps(4.0, 10.0),
            )?;
            self.bind_connector(
                supply_duct,
                room,
                Hook::unbound()
                    .with_endpoints(Point2::new(400.0, 100.0), Point2::new(400.0, 100.0)),
            )?;
            self.bind_connector(
                return_duct,
                room,
                Hook::unbound()
                    .with_endpoints(Point2::new(700.0, 400.0), Point2::new(700.0, 400.0)),
            )?;
            self.bind_connector(
                return_duct,
                air_handler,
                Hook::unbound()
                    .with_endpoints(Point2::new(800.0, 300.0), Point2::new(800.0, 300.0)),
            )?;

            let airflow_arrow = self.document.add_shape(
                Shape::line(
                    "airflow",
                    Point2::new(400.0, 180.0),
                    Point2::new(400.0, 260.0),
                )
                .with_arrows(0, 1),
            )?;

            let ids = DemoShapes {
                room,
                air_handler,
                sensor,
                supply_duct,
                return_duct,
                airflow_arrow,
            };

            debug!(
                room = ids.room.get(),
                air_handler = ids.air_handler.get(),
                sensor = ids.sensor.get(),
                supply_duct = ids.supply_duct.get(),
                return_duct = ids.return_duct.get(),
                airflow_arrow = ids.airflow_arrow.get(),
                "已创建演示图元"
            );

            Ok(ids)
        }
    }

    impl Default for Scene {
        fn default() -> Self {
            Self::new()
        }
    }

}
