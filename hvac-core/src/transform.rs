//! 文档坐标与屏幕坐标之间的唯一换算来源。
//!
//! 输入量（显示区、DPI、滚动、缩放、文档尺寸）每次变更后都会整体重新推导
//! 派生量；校验失败时原状态保持不变。

use serde::{Deserialize, Serialize};

use crate::errors::CoreError;
use crate::geometry::{BoundingBox, Point2, Size2, Vector2};

pub const DEFAULT_DPI: f64 = 96.0;

/// 缩放范围与步长。连续输入（缩放、滚动）在该范围内夹紧。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoomLimits {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl Default for ZoomLimits {
    fn default() -> Self {
        Self {
            min: 0.25,
            max: 4.0,
            step: 0.25,
        }
    }
}

impl ZoomLimits {
    pub fn new(min: f64, max: f64, step: f64) -> Result<Self, CoreError> {
        let limits = Self { min, max, step };
        limits.validate()?;
        Ok(limits)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if !(self.min.is_finite() && self.max.is_finite() && self.step.is_finite()) {
            return Err(CoreError::NonFinite("zoom limits"));
        }
        ensure_positive("minimum zoom", self.min)?;
        ensure_positive("zoom step", self.step)?;
        if self.max < self.min {
            return Err(CoreError::NotPositive {
                what: "zoom range",
                value: self.max - self.min,
            });
        }
        Ok(())
    }

    #[inline]
    pub fn clamp(&self, scale: f64) -> f64 {
        scale.clamp(self.min, self.max)
    }
}

/// `set_document_metrics` 的部分更新参数，`None` 字段保持原值。
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct DocumentMetrics {
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub dpi: Option<f64>,
    pub scale: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct DocInputs {
    display_origin: Point2,
    display_size: Size2,
    display_dpi: f64,
    scroll: Vector2,
    document_dpi: f64,
    document_scale: f64,
    document_size: Size2,
    #[serde(default)]
    limits: ZoomLimits,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "DocInputs", into = "DocInputs")]
pub struct DocInfo {
    inputs: DocInputs,
    doc_to_screen_scale: f64,
    dpi_scale: f64,
    visible_doc_region: BoundingBox,
    screen_region: BoundingBox,
    max_scroll: Vector2,
}

impl Default for DocInfo {
    /// 1280×720 显示区、2400×1600 文档、96/96 DPI、缩放 1。
    fn default() -> Self {
        Self::compute(DocInputs {
            display_origin: Point2::ORIGIN,
            display_size: Size2::new(1280.0, 720.0),
            display_dpi: DEFAULT_DPI,
            scroll: Vector2::ZERO,
            document_dpi: DEFAULT_DPI,
            document_scale: 1.0,
            document_size: Size2::new(2400.0, 1600.0),
            limits: ZoomLimits::default(),
        })
    }
}

impl TryFrom<DocInputs> for DocInfo {
    type Error = CoreError;

    fn try_from(inputs: DocInputs) -> Result<Self, Self::Error> {
        Self::derive(inputs)
    }
}

impl From<DocInfo> for DocInputs {
    fn from(info: DocInfo) -> Self {
        info.inputs
    }
}

fn ensure_positive(what: &'static str, value: f64) -> Result<f64, CoreError> {
    if !value.is_finite() {
        return Err(CoreError::NonFinite(what));
    }
    if value <= 0.0 {
        return Err(CoreError::NotPositive { what, value });
    }
    Ok(value)
}

impl DocInfo {
    /// 以默认 DPI（96/96）、缩放 1、原点显示区创建。
    pub fn new(display_size: Size2, document_size: Size2) -> Result<Self, CoreError> {
        Self::derive(DocInputs {
            display_origin: Point2::ORIGIN,
            display_size,
            display_dpi: DEFAULT_DPI,
            scroll: Vector2::ZERO,
            document_dpi: DEFAULT_DPI,
            document_scale: 1.0,
            document_size,
            limits: ZoomLimits::default(),
        })
    }

    pub fn with_limits(self, limits: ZoomLimits) -> Result<Self, CoreError> {
        Self::derive(DocInputs {
            limits,
            ..self.inputs
        })
    }

    pub fn with_dpi(self, display_dpi: f64, document_dpi: f64) -> Result<Self, CoreError> {
        Self::derive(DocInputs {
            display_dpi,
            document_dpi,
            ..self.inputs
        })
    }

    /// 校验输入并推导全部派生量；缩放与滚动在此处夹紧。
    fn derive(mut inputs: DocInputs) -> Result<Self, CoreError> {
        inputs.limits.validate()?;
        inputs.display_origin.checked("display origin")?;
        inputs.display_size.checked("display size")?;
        inputs.document_size.checked("document size")?;
        ensure_positive("display dpi", inputs.display_dpi)?;
        ensure_positive("document dpi", inputs.document_dpi)?;
        if !inputs.document_scale.is_finite() {
            return Err(CoreError::NonFinite("document scale"));
        }
        if !inputs.scroll.is_finite() {
            return Err(CoreError::NonFinite("scroll"));
        }
        inputs.document_scale = inputs.limits.clamp(inputs.document_scale);
        Ok(Self::compute(inputs))
    }

    /// 由已校验的输入计算派生量，并把滚动夹紧到合法范围。
    fn compute(mut inputs: DocInputs) -> Self {
        let dpi_scale = inputs.display_dpi / inputs.document_dpi;
        let scale = inputs.document_scale * dpi_scale;
        let screen_size = Size2::new(
            inputs.document_size.width * scale,
            inputs.document_size.height * scale,
        );
        let max_scroll = Vector2::new(
            (screen_size.width - inputs.display_size.width).max(0.0),
            (screen_size.height - inputs.display_size.height).max(0.0),
        );
        inputs.scroll = Vector2::new(
            inputs.scroll.x().clamp(0.0, max_scroll.x()),
            inputs.scroll.y().clamp(0.0, max_scroll.y()),
        );

        let screen_region = BoundingBox::new(
            inputs.display_origin.x() - inputs.scroll.x(),
            inputs.display_origin.y() - inputs.scroll.y(),
            screen_size.width,
            screen_size.height,
        );
        let vis_width = (inputs.display_size.width / scale).min(inputs.document_size.width);
        let vis_height = (inputs.display_size.height / scale).min(inputs.document_size.height);
        let visible_doc_region = BoundingBox::new(
            (inputs.scroll.x() / scale).min(inputs.document_size.width - vis_width),
            (inputs.scroll.y() / scale).min(inputs.document_size.height - vis_height),
            vis_width,
            vis_height,
        );

        Self {
            inputs,
            doc_to_screen_scale: scale,
            dpi_scale,
            visible_doc_region,
            screen_region,
            max_scroll,
        }
    }

    fn apply(&mut self, inputs: DocInputs) -> Result<(), CoreError> {
        *self = Self::derive(inputs)?;
        Ok(())
    }

    #[inline]
    pub fn display_origin(&self) -> Point2 {
        self.inputs.display_origin
    }

    #[inline]
    pub fn display_size(&self) -> Size2 {
        self.inputs.display_size
    }

    #[inline]
    pub fn display_dpi(&self) -> f64 {
        self.inputs.display_dpi
    }

    #[inline]
    pub fn document_dpi(&self) -> f64 {
        self.inputs.document_dpi
    }

    #[inline]
    pub fn document_size(&self) -> Size2 {
        self.inputs.document_size
    }

    #[inline]
    pub fn document_scale(&self) -> f64 {
        self.inputs.document_scale
    }

    #[inline]
    pub fn scroll(&self) -> Vector2 {
        self.inputs.scroll
    }

    #[inline]
    pub fn limits(&self) -> ZoomLimits {
        self.inputs.limits
    }

    #[inline]
    pub fn doc_to_screen_scale(&self) -> f64 {
        self.doc_to_screen_scale
    }

    #[inline]
    pub fn dpi_scale(&self) -> f64 {
        self.dpi_scale
    }

    #[inline]
    pub fn visible_doc_region(&self) -> BoundingBox {
        self.visible_doc_region
    }

    #[inline]
    pub fn screen_region(&self) -> BoundingBox {
        self.screen_region
    }

    #[inline]
    pub fn max_scroll(&self) -> Vector2 {
        self.max_scroll
    }

    pub fn document_to_screen(&self, point: Point2) -> Point2 {
        let s = self.doc_to_screen_scale;
        Point2::new(
            point.x() * s + self.screen_region.x,
            point.y() * s + self.screen_region.y,
        )
    }

    pub fn screen_to_document(&self, point: Point2) -> Point2 {
        let s = self.doc_to_screen_scale;
        Point2::new(
            (point.x() - self.screen_region.x) / s,
            (point.y() - self.screen_region.y) / s,
        )
    }

    #[inline]
    pub fn length_to_screen(&self, length: f64) -> f64 {
        length * self.doc_to_screen_scale
    }

    #[inline]
    pub fn length_to_document(&self, length: f64) -> f64 {
        length / self.doc_to_screen_scale
    }

    /// 指针位移（屏幕像素）折算为文档位移。
    #[inline]
    pub fn offset_to_document(&self, offset: Vector2) -> Vector2 {
        offset.scale(1.0 / self.doc_to_screen_scale)
    }

    /// 设置滚动位置，两轴分别夹紧到 `[0, max_scroll]`。非有限值被拒绝。
    pub fn set_scroll(&mut self, x: f64, y: f64) -> Result<(), CoreError> {
        self.apply(DocInputs {
            scroll: Vector2::new(x, y),
            ..self.inputs
        })
    }

    pub fn scroll_by(&mut self, delta: Vector2) -> Result<(), CoreError> {
        let target = self.inputs.scroll.as_vec2() + delta.as_vec2();
        self.set_scroll(target.x, target.y)
    }

    /// 设置缩放（夹紧到 `ZoomLimits`），保持显示区中心对应的文档点不动。返回实际缩放。
    pub fn set_zoom(&mut self, scale: f64) -> Result<f64, CoreError> {
        if !scale.is_finite() {
            return Err(CoreError::NonFinite("zoom"));
        }
        let size = self.inputs.display_size;
        let center_screen = Point2::new(
            self.inputs.display_origin.x() + size.width * 0.5,
            self.inputs.display_origin.y() + size.height * 0.5,
        );
        let anchor = self.screen_to_document(center_screen);
        let document_scale = self.inputs.limits.clamp(scale);
        let s = document_scale * self.dpi_scale;
        self.apply(DocInputs {
            document_scale,
            scroll: Vector2::new(
                anchor.x() * s - size.width * 0.5,
                anchor.y() * s - size.height * 0.5,
            ),
            ..self.inputs
        })?;
        Ok(self.inputs.document_scale)
    }

    /// 放大到下一个步长网格值。
    pub fn zoom_in(&mut self) -> Result<f64, CoreError> {
        let step = self.inputs.limits.step;
        let current = self.inputs.document_scale;
        let mut next = (current / step).ceil() * step;
        if (next - current).abs() < 1e-9 {
            next += step;
        }
        self.set_zoom(next)
    }

    /// 缩小到上一个步长网格值。
    pub fn zoom_out(&mut self) -> Result<f64, CoreError> {
        let step = self.inputs.limits.step;
        let current = self.inputs.document_scale;
        let mut next = (current / step).floor() * step;
        if (next - current).abs() < 1e-9 {
            next -= step;
        }
        self.set_zoom(next)
    }

    pub fn set_display(&mut self, origin: Point2, size: Size2) -> Result<(), CoreError> {
        self.apply(DocInputs {
            display_origin: origin,
            display_size: size,
            ..self.inputs
        })
    }

    pub fn set_display_dpi(&mut self, dpi: f64) -> Result<(), CoreError> {
        self.apply(DocInputs {
            display_dpi: dpi,
            ..self.inputs
        })
    }

    /// 部分更新文档尺寸、DPI 与缩放。
    pub fn set_document_metrics(&mut self, metrics: DocumentMetrics) -> Result<(), CoreError> {
        let current = self.inputs;
        self.apply(DocInputs {
            document_size: Size2::new(
                metrics.width.unwrap_or(current.document_size.width),
                metrics.height.unwrap_or(current.document_size.height),
            ),
            document_dpi: metrics.dpi.unwrap_or(current.document_dpi),
            document_scale: metrics.scale.unwrap_or(current.document_scale),
            ..current
        })
    }

    /// 使文档点可见所需的滚动位置；已经可见时返回 `None`。
    pub fn scroll_to_visible(&self, point: Point2) -> Option<Vector2> {
        let doc = self.inputs.document_size;
        let point = Point2::new(point.x().clamp(0.0, doc.width), point.y().clamp(0.0, doc.height));
        let visible = self.visible_doc_region;
        let outside = |value: f64, low: f64, high: f64| {
            if value < low {
                value - low
            } else if value > high {
                value - high
            } else {
                0.0
            }
        };
        let dx = outside(point.x(), visible.x, visible.right());
        let dy = outside(point.y(), visible.y, visible.bottom());
        if dx == 0.0 && dy == 0.0 {
            return None;
        }
        let s = self.doc_to_screen_scale;
        Some(Vector2::new(
            (self.inputs.scroll.x() + dx * s).clamp(0.0, self.max_scroll.x()),
            (self.inputs.scroll.y() + dy * s).clamp(0.0, self.max_scroll.y()),
        ))
    }

    /// 滚动使文档矩形的中心位于显示区中心（受滚动范围限制）。
    pub fn center_on(&mut self, rect: BoundingBox) -> Result<(), CoreError> {
        rect.validate("center target")?;
        if !rect.is_initialized() {
            return Err(CoreError::NegativeSize("center target"));
        }
        let center = rect.center();
        let s = self.doc_to_screen_scale;
        let size = self.inputs.display_size;
        self.set_scroll(
            center.x() * s - size.width * 0.5,
            center.y() * s - size.height * 0.5,
        )
    }

    /// 把文档点夹紧到当前可见区域内。
    pub fn clamp_to_visible(&self, point: Point2) -> Point2 {
        let visible = self.visible_doc_region;
        Point2::new(
            point.x().clamp(visible.x, visible.right()),
            point.y().clamp(visible.y, visible.bottom()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DocInfo {
        DocInfo::new(Size2::new(800.0, 600.0), Size2::new(2000.0, 1500.0))
            .expect("doc info")
            .with_dpi(96.0, 72.0)
            .expect("dpi")
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn scale_combines_zoom_and_dpi() {
        let mut info = sample();
        assert!(close(info.dpi_scale(), 96.0 / 72.0));
        info.set_zoom(2.0).expect("zoom");
        assert!(close(info.doc_to_screen_scale(), 2.0 * 96.0 / 72.0));
        let screen = info.screen_region();
        assert!(close(screen.width, 2000.0 * info.doc_to_screen_scale()));
    }

    #[test]
    fn round_trip_is_identity_across_states() {
        let mut info = sample();
        info.set_display(Point2::new(35.0, 12.5), Size2::new(640.0, 480.0))
            .expect("display");
        let points = [
            Point2::new(0.0, 0.0),
            Point2::new(123.456, 789.01),
            Point2::new(-50.0, 3000.0),
            Point2::new(1999.9, 0.001),
        ];
        for zoom in [0.25, 0.6, 1.0, 2.75, 4.0] {
            info.set_zoom(zoom).expect("zoom");
            info.set_scroll(317.0, 211.0).expect("scroll");
            for point in points {
                let back = info.screen_to_document(info.document_to_screen(point));
                assert!(close(back.x(), point.x()) && close(back.y(), point.y()));
            }
        }
    }

    #[test]
    fn scroll_is_clamped_into_range() {
        let mut info = sample();
        let max = info.max_scroll();
        assert!(max.x() > 0.0 && max.y() > 0.0);
        for (x, y) in [(-10.0, -10.0), (1e9, 5.0), (max.x(), max.y()), (12.0, 1e12)] {
            info.set_scroll(x, y).expect("scroll");
            let scroll = info.scroll();
            assert!(scroll.x() >= 0.0 && scroll.x() <= max.x());
            assert!(scroll.y() >= 0.0 && scroll.y() <= max.y());
        }
    }

    #[test]
    fn small_document_cannot_scroll() {
        let mut info =
            DocInfo::new(Size2::new(800.0, 600.0), Size2::new(100.0, 100.0)).expect("doc info");
        info.set_scroll(50.0, 50.0).expect("scroll");
        assert_eq!(info.max_scroll(), Vector2::ZERO);
        assert_eq!(info.scroll(), Vector2::ZERO);
        let visible = info.visible_doc_region();
        assert_eq!(visible, BoundingBox::new(0.0, 0.0, 100.0, 100.0));
    }

    #[test]
    fn visible_region_tracks_scroll() {
        let mut info =
            DocInfo::new(Size2::new(400.0, 300.0), Size2::new(1000.0, 1000.0)).expect("doc info");
        info.set_zoom(2.0).expect("zoom");
        info.set_scroll(200.0, 100.0).expect("scroll");
        let visible = info.visible_doc_region();
        assert!(close(visible.x, 100.0));
        assert!(close(visible.y, 50.0));
        assert!(close(visible.width, 200.0));
        assert!(close(visible.height, 150.0));
    }

    #[test]
    fn zoom_clamps_at_minimum() {
        let mut info = sample();
        assert!(close(info.set_zoom(0.25).expect("zoom"), 0.25));
        assert!(close(info.zoom_out().expect("zoom out"), 0.25));
        assert!(close(info.set_zoom(0.01).expect("zoom"), 0.25));
        assert!(close(info.set_zoom(100.0).expect("zoom"), 4.0));
        assert!(info.set_zoom(f64::NAN).is_err());
        assert!(close(info.document_scale(), 4.0));
    }

    #[test]
    fn zoom_steps_snap_to_grid() {
        let mut info = sample();
        info.set_zoom(1.1).expect("zoom");
        assert!(close(info.zoom_in().expect("in"), 1.25));
        assert!(close(info.zoom_in().expect("in"), 1.5));
        info.set_zoom(1.1).expect("zoom");
        assert!(close(info.zoom_out().expect("out"), 1.0));
        assert!(close(info.zoom_out().expect("out"), 0.75));
        info.set_zoom(4.0).expect("zoom");
        assert!(close(info.zoom_in().expect("in"), 4.0));
    }

    #[test]
    fn invalid_input_leaves_state_unchanged() {
        let mut info = sample();
        info.set_scroll(100.0, 100.0).expect("scroll");
        let before = info;
        assert_eq!(
            info.set_display(Point2::ORIGIN, Size2::new(-1.0, 100.0)),
            Err(CoreError::NegativeSize("display size"))
        );
        assert!(info.set_scroll(f64::INFINITY, 0.0).is_err());
        assert!(info.set_display_dpi(0.0).is_err());
        assert!(info
            .set_document_metrics(DocumentMetrics {
                width: Some(500.0),
                height: Some(f64::NAN),
                ..DocumentMetrics::default()
            })
            .is_err());
        assert_eq!(info, before);
    }

    #[test]
    fn document_metrics_update_partially() {
        let mut info = sample();
        info.set_document_metrics(DocumentMetrics {
            width: Some(4000.0),
            ..DocumentMetrics::default()
        })
        .expect("metrics");
        assert!(close(info.document_size().width, 4000.0));
        assert!(close(info.document_size().height, 1500.0));
        assert!(close(info.document_dpi(), 72.0));
    }

    #[test]
    fn scroll_to_visible_reveals_point() {
        let mut info =
            DocInfo::new(Size2::new(400.0, 300.0), Size2::new(1000.0, 1000.0)).expect("doc info");
        assert_eq!(info.scroll_to_visible(Point2::new(100.0, 100.0)), None);
        let scroll = info
            .scroll_to_visible(Point2::new(600.0, 100.0))
            .expect("needs scroll");
        assert!(close(scroll.x(), 200.0));
        assert!(close(scroll.y(), 0.0));
        info.set_scroll(scroll.x(), scroll.y()).expect("scroll");
        assert_eq!(info.scroll_to_visible(Point2::new(600.0, 100.0)), None);
    }

    #[test]
    fn center_on_rectangle() {
        let mut info =
            DocInfo::new(Size2::new(400.0, 300.0), Size2::new(1000.0, 1000.0)).expect("doc info");
        info.center_on(BoundingBox::new(400.0, 400.0, 200.0, 200.0))
            .expect("center");
        assert!(close(info.scroll().x(), 300.0));
        assert!(close(info.scroll().y(), 350.0));
        assert!(info.center_on(BoundingBox::uninitialized()).is_err());

        let clamped = info.clamp_to_visible(Point2::new(0.0, 900.0));
        assert!(close(clamped.x(), 300.0));
        assert!(close(clamped.y(), 650.0));
    }

    #[test]
    fn serialized_form_recomputes_derived_fields() {
        let mut info = sample();
        info.set_zoom(1.5).expect("zoom");
        info.set_scroll(40.0, 30.0).expect("scroll");
        let json = serde_json::to_value(info).expect("serialize");
        assert!(json.get("visible_doc_region").is_none());
        let restored: DocInfo = serde_json::from_value(json.clone()).expect("deserialize");
        assert_eq!(restored, info);

        let mut corrupt = json;
        corrupt["display_dpi"] = serde_json::json!(-3.0);
        assert!(serde_json::from_value::<DocInfo>(corrupt).is_err());
    }
}
