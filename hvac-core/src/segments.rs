//! 多边形轮廓模型：有序的分段序列，每段携带线型、分类与用户数据。

use serde::{Deserialize, Serialize};

use crate::errors::CoreError;
use crate::geometry::{BoundingBox, PathPoint, Point2, Size2, Vector2};

/// 曲线段展平时使用的默认采样数。
pub const DEFAULT_CURVE_STEPS: usize = 16;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineType {
    #[default]
    Line,
    /// 二次曲线，`param` 为弦中点到曲线顶点的垂直偏移。
    Arc,
}

impl LineType {
    #[inline]
    pub fn is_curved(self) -> bool {
        matches!(self, LineType::Arc)
    }
}

/// 轮廓中的一个顶点及其后续边的描述。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolygonSegment {
    pub line_type: LineType,
    pub data_class: i32,
    /// 对相关分段的弱引用（按下标查找），`-1` 表示无。
    pub short_ref: i32,
    pub param: f64,
    pub weight: f64,
    pub dim_deflection: f64,
    pub flags: u32,
    pub point: Point2,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dim_text_alt_positioning: Option<Point2>,
}

impl PolygonSegment {
    pub const NO_REF: i32 = -1;
    /// 从该顶点出发的边不绘制（抬笔）。
    pub const FLAG_HIDDEN_EDGE: u32 = 0x1;
    /// 尺寸标注固定，不随几何变化。
    pub const FLAG_DIM_LOCKED: u32 = 0x2;

    pub fn line(point: Point2) -> Self {
        Self {
            line_type: LineType::Line,
            data_class: 0,
            short_ref: Self::NO_REF,
            param: 0.0,
            weight: 0.0,
            dim_deflection: 0.0,
            flags: 0,
            point,
            user_data: None,
            dim_text_alt_positioning: None,
        }
    }

    pub fn arc(point: Point2, param: f64) -> Self {
        Self {
            line_type: LineType::Arc,
            param,
            ..Self::line(point)
        }
    }

    #[inline]
    pub fn is_edge_hidden(&self) -> bool {
        self.flags & Self::FLAG_HIDDEN_EDGE != 0
    }

    fn validate(&self) -> Result<(), CoreError> {
        self.point.checked("segment point")?;
        if !(self.param.is_finite() && self.weight.is_finite() && self.dim_deflection.is_finite())
        {
            return Err(CoreError::NonFinite("segment parameter"));
        }
        if let Some(alt) = self.dim_text_alt_positioning {
            alt.checked("dimension text position")?;
        }
        Ok(())
    }
}

/// 轮廓中的一条边（包括闭合多边形隐含的末边）。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    pub index: usize,
    pub start: Point2,
    pub end: Point2,
    pub line_type: LineType,
    pub param: f64,
    pub hidden: bool,
}

impl Edge {
    /// 曲线边的二次控制点；直线或退化边返回 `None`。
    pub fn control_point(&self) -> Option<Point2> {
        if !self.line_type.is_curved() {
            return None;
        }
        let normal = Vector2::from_points(self.start, self.end).normalize()?.perp();
        Some(
            self.start
                .midpoint(self.end)
                .translate(normal.scale(2.0 * self.param)),
        )
    }

    pub fn point_at(&self, t: f64) -> Point2 {
        let a = self.start.as_vec2();
        let b = self.end.as_vec2();
        match self.control_point() {
            Some(control) => {
                let c = control.as_vec2();
                let u = 1.0 - t;
                Point2::from_vec(a * (u * u) + c * (2.0 * u * t) + b * (t * t))
            }
            None => Point2::from_vec(a.lerp(b, t)),
        }
    }

    /// 将边展平为折线（含起点与终点）。
    pub fn flatten(&self, steps: usize) -> Vec<Point2> {
        if self.control_point().is_none() {
            return vec![self.start, self.end];
        }
        let steps = steps.max(1);
        (0..=steps)
            .map(|i| self.point_at(i as f64 / steps as f64))
            .collect()
    }

    pub fn distance_to(&self, point: Point2) -> f64 {
        self.flatten(DEFAULT_CURVE_STEPS)
            .windows(2)
            .map(|pair| distance_to_segment(point, pair[0], pair[1]))
            .fold(f64::INFINITY, f64::min)
    }
}

/// 多边形轮廓。`n_points` 始终与分段数同步，所有变更操作原子地维护它。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PolygonData", into = "PolygonData")]
pub struct Polygon {
    segments: Vec<PolygonSegment>,
    closed: bool,
    n_points: usize,
}

#[derive(Serialize, Deserialize)]
struct PolygonData {
    segments: Vec<PolygonSegment>,
    closed: bool,
    n_points: usize,
}

impl TryFrom<PolygonData> for Polygon {
    type Error = CoreError;

    fn try_from(data: PolygonData) -> Result<Self, Self::Error> {
        if data.n_points != data.segments.len() {
            return Err(CoreError::CorruptSnapshot(format!(
                "polygon declares {} points but has {} segments",
                data.n_points,
                data.segments.len()
            )));
        }
        for segment in &data.segments {
            segment.validate()?;
        }
        Ok(Self {
            segments: data.segments,
            closed: data.closed,
            n_points: data.n_points,
        })
    }
}

impl From<Polygon> for PolygonData {
    fn from(polygon: Polygon) -> Self {
        Self {
            segments: polygon.segments,
            closed: polygon.closed,
            n_points: polygon.n_points,
        }
    }
}

impl Polygon {
    pub fn new(closed: bool) -> Self {
        Self {
            segments: Vec::new(),
            closed,
            n_points: 0,
        }
    }

    pub fn from_points<I>(points: I, closed: bool) -> Result<Self, CoreError>
    where
        I: IntoIterator<Item = Point2>,
    {
        Self::from_segments(points.into_iter().map(PolygonSegment::line), closed)
    }

    pub fn from_segments<I>(segments: I, closed: bool) -> Result<Self, CoreError>
    where
        I: IntoIterator<Item = PolygonSegment>,
    {
        let mut polygon = Self::new(closed);
        polygon.set_segments(segments.into_iter().collect())?;
        Ok(polygon)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    #[inline]
    pub fn point_count(&self) -> usize {
        self.n_points
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    #[inline]
    pub fn set_closed(&mut self, closed: bool) {
        self.closed = closed;
    }

    #[inline]
    pub fn segments(&self) -> &[PolygonSegment] {
        &self.segments
    }

    #[inline]
    pub fn segment(&self, index: usize) -> Option<&PolygonSegment> {
        self.segments.get(index)
    }

    /// 整体替换分段序列；任何一段非法则保持原状。
    pub fn set_segments(&mut self, segments: Vec<PolygonSegment>) -> Result<(), CoreError> {
        for segment in &segments {
            segment.validate()?;
        }
        self.n_points = segments.len();
        self.segments = segments;
        Ok(())
    }

    pub fn push(&mut self, segment: PolygonSegment) -> Result<usize, CoreError> {
        segment.validate()?;
        self.segments.push(segment);
        self.n_points = self.segments.len();
        Ok(self.n_points - 1)
    }

    pub fn insert(&mut self, index: usize, segment: PolygonSegment) -> Result<(), CoreError> {
        if index > self.segments.len() {
            return Err(CoreError::out_of_range("segment", index, self.segments.len()));
        }
        segment.validate()?;
        self.segments.insert(index, segment);
        self.n_points = self.segments.len();
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> Result<PolygonSegment, CoreError> {
        if index >= self.segments.len() {
            return Err(CoreError::out_of_range("segment", index, self.segments.len()));
        }
        let removed = self.segments.remove(index);
        self.n_points = self.segments.len();
        Ok(removed)
    }

    pub fn move_vertex(&mut self, index: usize, point: Point2) -> Result<(), CoreError> {
        let len = self.segments.len();
        let point = point.checked("vertex")?;
        let segment = self
            .segments
            .get_mut(index)
            .ok_or(CoreError::out_of_range("segment", index, len))?;
        segment.point = point;
        Ok(())
    }

    pub fn translate(&mut self, offset: Vector2) -> Result<(), CoreError> {
        if !offset.is_finite() {
            return Err(CoreError::NonFinite("offset"));
        }
        for segment in &mut self.segments {
            segment.point = segment.point.translate(offset);
        }
        Ok(())
    }

    /// 按 `short_ref` 在同一轮廓内查找被引用的分段。
    pub fn resolve_short_ref(&self, index: usize) -> Option<&PolygonSegment> {
        let reference = self.segments.get(index)?.short_ref;
        usize::try_from(reference)
            .ok()
            .and_then(|target| self.segments.get(target))
    }

    /// 所有边；闭合轮廓包含从末点回到首点的隐含边。
    pub fn edges(&self) -> Vec<Edge> {
        let count = self.segments.len();
        if count < 2 {
            return Vec::new();
        }
        let edge_count = if self.closed { count } else { count - 1 };
        (0..edge_count)
            .map(|index| {
                let from = &self.segments[index];
                let to = &self.segments[(index + 1) % count];
                Edge {
                    index,
                    start: from.point,
                    end: to.point,
                    line_type: from.line_type,
                    param: from.param,
                    hidden: from.is_edge_hidden(),
                }
            })
            .collect()
    }

    /// 渲染快照：首点抬笔，隐藏边之后重新抬笔，闭合轮廓回到首点。
    pub fn path_points(&self) -> Vec<PathPoint> {
        let Some(first) = self.segments.first() else {
            return Vec::new();
        };
        let mut path = vec![PathPoint::move_to(first.point)];
        for edge in self.edges() {
            if edge.hidden {
                path.push(PathPoint::move_to(edge.end));
                continue;
            }
            match edge.control_point() {
                Some(control) => path.push(PathPoint::curve_to(control, edge.end)),
                None => path.push(PathPoint::line_to(edge.end)),
            }
        }
        path
    }

    /// 展平后的轮廓点。闭合轮廓不重复首点。
    pub fn flatten(&self, steps: usize) -> Vec<Point2> {
        let Some(first) = self.segments.first() else {
            return Vec::new();
        };
        let mut points = vec![first.point];
        for edge in self.edges() {
            let sampled = edge.flatten(steps);
            points.extend(sampled.into_iter().skip(1));
        }
        if self.closed && points.len() > 1 {
            points.pop();
        }
        points
    }

    pub fn bounds(&self) -> BoundingBox {
        BoundingBox::from_points(self.flatten(DEFAULT_CURVE_STEPS))
    }

    /// 奇偶规则判断点是否在闭合轮廓内；开放轮廓总是返回 `false`。
    pub fn contains_point(&self, point: Point2) -> bool {
        if !self.closed || self.segments.len() < 3 {
            return false;
        }
        let outline = self.flatten(DEFAULT_CURVE_STEPS);
        let mut inside = false;
        let mut j = outline.len() - 1;
        for i in 0..outline.len() {
            let (a, b) = (outline[i], outline[j]);
            if (a.y() > point.y()) != (b.y() > point.y()) {
                let cross_x = (b.x() - a.x()) * (point.y() - a.y()) / (b.y() - a.y()) + a.x();
                if point.x() < cross_x {
                    inside = !inside;
                }
            }
            j = i;
        }
        inside
    }

    /// 返回容差内距离最近的边下标。
    pub fn hit_edge(&self, point: Point2, tolerance: f64) -> Option<usize> {
        self.edges()
            .iter()
            .map(|edge| (edge.index, edge.distance_to(point)))
            .filter(|(_, distance)| *distance <= tolerance)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(index, _)| index)
    }
}

pub(crate) fn distance_to_segment(point: Point2, a: Point2, b: Point2) -> f64 {
    let ab = b.as_vec2() - a.as_vec2();
    let ap = point.as_vec2() - a.as_vec2();
    let len_sq = ab.length_squared();
    if len_sq <= f64::EPSILON {
        return ap.length();
    }
    let t = (ap.dot(ab) / len_sq).clamp(0.0, 1.0);
    (ap - ab * t).length()
}

/// 预置外形，按帧尺寸生成闭合轮廓。偏移量按帧宽折算为比例并夹紧。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PolygonTemplate {
    Diamond,
    Triangle,
    Parallelogram { offset: f64 },
    Trapezoid { offset: f64 },
    Hexagon { offset: f64 },
    /// 两个偏移量直接以比例给出。
    Octagon { horizontal: f64, vertical: f64 },
    RightArrow { head: f64 },
}

impl PolygonTemplate {
    /// 单位坐标（0..1）下的顶点序列，不含重复的闭合点。
    pub fn unit_points(&self, size: Size2) -> Vec<(f64, f64)> {
        let ratio = |value: f64, limit: f64| {
            if size.width <= f64::EPSILON {
                0.0
            } else {
                (value / size.width).clamp(0.0, limit)
            }
        };
        match *self {
            PolygonTemplate::Diamond => vec![(0.5, 0.0), (1.0, 0.5), (0.5, 1.0), (0.0, 0.5)],
            PolygonTemplate::Triangle => vec![(0.5, 0.0), (1.0, 1.0), (0.0, 1.0)],
            PolygonTemplate::Parallelogram { offset } => {
                let o = ratio(offset, 1.0);
                vec![(o, 0.0), (1.0, 0.0), (1.0 - o, 1.0), (0.0, 1.0)]
            }
            PolygonTemplate::Trapezoid { offset } => {
                let o = ratio(offset, 0.5);
                vec![(o, 0.0), (1.0 - o, 0.0), (1.0, 1.0), (0.0, 1.0)]
            }
            PolygonTemplate::Hexagon { offset } => {
                let o = ratio(offset, 0.5);
                vec![
                    (o, 0.0),
                    (1.0 - o, 0.0),
                    (1.0, 0.5),
                    (1.0 - o, 1.0),
                    (o, 1.0),
                    (0.0, 0.5),
                ]
            }
            PolygonTemplate::Octagon {
                horizontal,
                vertical,
            } => {
                let h = horizontal.clamp(0.0, 0.5);
                let v = vertical.clamp(0.0, 0.5);
                vec![
                    (h, 0.0),
                    (1.0 - h, 0.0),
                    (1.0, v),
                    (1.0, 1.0 - v),
                    (1.0 - h, 1.0),
                    (h, 1.0),
                    (0.0, 1.0 - v),
                    (0.0, v),
                ]
            }
            PolygonTemplate::RightArrow { head } => {
                let a = ratio(head, 1.0);
                vec![
                    (0.0, 0.15),
                    (1.0 - a, 0.15),
                    (1.0 - a, 0.0),
                    (1.0, 0.5),
                    (1.0 - a, 1.0),
                    (1.0 - a, 0.85),
                    (0.0, 0.85),
                ]
            }
        }
    }

    pub fn build(&self, frame: BoundingBox) -> Result<Polygon, CoreError> {
        frame.validate("template frame")?;
        if !frame.is_initialized() {
            return Err(CoreError::NegativeSize("template frame"));
        }
        let points = self
            .unit_points(frame.size())
            .into_iter()
            .map(|(u, v)| Point2::new(frame.x + u * frame.width, frame.y + v * frame.height));
        Polygon::from_points(points, true)
    }
}

/// 正交连接线的走向。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SegDirection {
    Horizontal,
    Vertical,
}

/// 分段连接线（风管、导线）：两端点之间的正交折线，拐角可按 `curve_param` 圆角化。
///
/// 折线顶点总是由端点与走向推导；快照里的 `points` 只供外部读取，加载时重新计算。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SegLineData", into = "SegLineData")]
pub struct SegLine {
    pub start: Point2,
    pub end: Point2,
    pub first_dir: SegDirection,
    pub last_dir: SegDirection,
    pub curve_param: f64,
    points: Vec<Point2>,
}

#[derive(Serialize, Deserialize)]
struct SegLineData {
    start: Point2,
    end: Point2,
    first_dir: SegDirection,
    last_dir: SegDirection,
    curve_param: f64,
    #[serde(default)]
    points: Vec<Point2>,
}

impl TryFrom<SegLineData> for SegLine {
    type Error = CoreError;

    fn try_from(data: SegLineData) -> Result<Self, Self::Error> {
        if !data.curve_param.is_finite() {
            return Err(CoreError::NonFinite("connector curve"));
        }
        if data.curve_param < 0.0 {
            return Err(CoreError::CorruptSnapshot(format!(
                "connector curve radius {} is negative",
                data.curve_param
            )));
        }
        let mut line = Self::new(data.start, data.end, data.first_dir, data.last_dir)?;
        line.curve_param = data.curve_param;
        Ok(line)
    }
}

impl From<SegLine> for SegLineData {
    fn from(line: SegLine) -> Self {
        Self {
            start: line.start,
            end: line.end,
            first_dir: line.first_dir,
            last_dir: line.last_dir,
            curve_param: line.curve_param,
            points: line.points,
        }
    }
}

impl SegLine {
    pub fn new(
        start: Point2,
        end: Point2,
        first_dir: SegDirection,
        last_dir: SegDirection,
    ) -> Result<Self, CoreError> {
        let mut line = Self {
            start: start.checked("connector start")?,
            end: end.checked("connector end")?,
            first_dir,
            last_dir,
            curve_param: 0.0,
            points: Vec::new(),
        };
        line.reroute();
        Ok(line)
    }

    pub fn with_curve(mut self, radius: f64) -> Self {
        if radius.is_finite() {
            self.curve_param = radius.max(0.0);
        }
        self
    }

    #[inline]
    pub fn points(&self) -> &[Point2] {
        &self.points
    }

    pub fn set_endpoints(&mut self, start: Point2, end: Point2) -> Result<(), CoreError> {
        let start = start.checked("connector start")?;
        let end = end.checked("connector end")?;
        self.start = start;
        self.end = end;
        self.reroute();
        Ok(())
    }

    /// 按两端走向重新计算折线顶点并去掉共线点。
    pub fn reroute(&mut self) {
        let (s, e) = (self.start, self.end);
        let mut route = vec![s];
        match (self.first_dir, self.last_dir) {
            (SegDirection::Horizontal, SegDirection::Horizontal) => {
                let mid_x = (s.x() + e.x()) * 0.5;
                route.push(Point2::new(mid_x, s.y()));
                route.push(Point2::new(mid_x, e.y()));
            }
            (SegDirection::Vertical, SegDirection::Vertical) => {
                let mid_y = (s.y() + e.y()) * 0.5;
                route.push(Point2::new(s.x(), mid_y));
                route.push(Point2::new(e.x(), mid_y));
            }
            (SegDirection::Horizontal, SegDirection::Vertical) => {
                route.push(Point2::new(e.x(), s.y()));
            }
            (SegDirection::Vertical, SegDirection::Horizontal) => {
                route.push(Point2::new(s.x(), e.y()));
            }
        }
        route.push(e);
        self.points = simplify_route(route);
    }

    pub fn length(&self) -> f64 {
        self.points
            .windows(2)
            .map(|pair| pair[0].distance(pair[1]))
            .sum()
    }

    pub fn bounds(&self) -> BoundingBox {
        BoundingBox::from_points(self.points.iter().copied())
    }

    pub fn translate(&mut self, offset: Vector2) {
        self.start = self.start.translate(offset);
        self.end = self.end.translate(offset);
        for point in &mut self.points {
            *point = point.translate(offset);
        }
    }

    pub fn hit(&self, point: Point2, tolerance: f64) -> Option<usize> {
        self.points
            .windows(2)
            .enumerate()
            .map(|(index, pair)| (index, distance_to_segment(point, pair[0], pair[1])))
            .filter(|(_, distance)| *distance <= tolerance)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(index, _)| index)
    }

    /// 渲染快照；`curve_param > 0` 时拐角以二次曲线圆角化，半径不超过相邻边长的一半。
    pub fn path_points(&self) -> Vec<PathPoint> {
        let Some(first) = self.points.first() else {
            return Vec::new();
        };
        let mut path = vec![PathPoint::move_to(*first)];
        let count = self.points.len();
        for index in 1..count {
            let corner = self.points[index];
            let is_corner = index + 1 < count;
            if !is_corner || self.curve_param <= 0.0 {
                path.push(PathPoint::line_to(corner));
                continue;
            }
            let prev = self.points[index - 1];
            let next = self.points[index + 1];
            let radius = self
                .curve_param
                .min(prev.distance(corner) * 0.5)
                .min(corner.distance(next) * 0.5);
            let (Some(back), Some(ahead)) = (
                Vector2::from_points(corner, prev).normalize(),
                Vector2::from_points(corner, next).normalize(),
            ) else {
                path.push(PathPoint::line_to(corner));
                continue;
            };
            path.push(PathPoint::line_to(corner.translate(back.scale(radius))));
            path.push(PathPoint::curve_to(
                corner,
                corner.translate(ahead.scale(radius)),
            ));
        }
        path
    }
}

fn simplify_route(route: Vec<Point2>) -> Vec<Point2> {
    let mut simplified: Vec<Point2> = Vec::with_capacity(route.len());
    for point in route {
        if let Some(last) = simplified.last() {
            if last.distance(point) <= f64::EPSILON {
                continue;
            }
        }
        if simplified.len() >= 2 {
            let a = simplified[simplified.len() - 2];
            let b = simplified[simplified.len() - 1];
            let cross = Vector2::from_points(a, b)
                .as_vec2()
                .perp_dot(Vector2::from_points(b, point).as_vec2());
            if cross.abs() <= f64::EPSILON {
                simplified.pop();
            }
        }
        simplified.push(point);
    }
    simplified
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Polygon {
        Polygon::from_points(
            [
                Point2::new(0.0, 0.0),
                Point2::new(10.0, 0.0),
                Point2::new(10.0, 10.0),
                Point2::new(0.0, 10.0),
            ],
            true,
        )
        .expect("square")
    }

    #[test]
    fn closed_square_has_implicit_closing_edge() {
        let polygon = square();
        let edges = polygon.edges();
        assert_eq!(edges.len(), 4);
        let closing = edges[3];
        assert_eq!(closing.start, Point2::new(0.0, 10.0));
        assert_eq!(closing.end, Point2::new(0.0, 0.0));

        let path = polygon.path_points();
        assert_eq!(path.len(), 5);
        assert!(path[0].move_to);
        assert!(path[1..].iter().all(|p| !p.move_to));
        assert_eq!(path[4].position, Point2::new(0.0, 0.0));
    }

    #[test]
    fn open_polyline_has_no_closing_edge() {
        let mut polygon = square();
        polygon.set_closed(false);
        assert_eq!(polygon.edges().len(), 3);
        assert_eq!(polygon.path_points().len(), 4);
        assert!(!polygon.contains_point(Point2::new(5.0, 5.0)));
    }

    #[test]
    fn mutators_keep_point_count_in_sync() {
        let mut polygon = square();
        assert_eq!(polygon.point_count(), 4);

        polygon
            .insert(1, PolygonSegment::line(Point2::new(5.0, -5.0)))
            .expect("insert");
        assert_eq!(polygon.point_count(), 5);
        assert_eq!(polygon.segments()[1].point, Point2::new(5.0, -5.0));

        let removed = polygon.remove(1).expect("remove");
        assert_eq!(removed.point, Point2::new(5.0, -5.0));
        assert_eq!(polygon.point_count(), polygon.len());

        let err = polygon.insert(9, PolygonSegment::line(Point2::ORIGIN));
        assert!(matches!(err, Err(CoreError::IndexOutOfRange { .. })));
        assert_eq!(polygon.point_count(), 4);

        let err = polygon.push(PolygonSegment::line(Point2::new(f64::NAN, 0.0)));
        assert_eq!(err, Err(CoreError::NonFinite("segment point")));
        assert_eq!(polygon.point_count(), 4);
    }

    #[test]
    fn move_vertex_rejects_non_finite_and_keeps_shape() {
        let mut polygon = square();
        polygon
            .move_vertex(2, Point2::new(12.0, 12.0))
            .expect("move vertex");
        assert_eq!(polygon.segments()[2].point, Point2::new(12.0, 12.0));

        let before = polygon.clone();
        assert!(polygon.move_vertex(0, Point2::new(f64::INFINITY, 0.0)).is_err());
        assert!(polygon.move_vertex(7, Point2::ORIGIN).is_err());
        assert_eq!(polygon, before);
    }

    #[test]
    fn contains_and_hit_edge() {
        let polygon = square();
        assert!(polygon.contains_point(Point2::new(5.0, 5.0)));
        assert!(!polygon.contains_point(Point2::new(15.0, 5.0)));

        assert_eq!(polygon.hit_edge(Point2::new(5.0, 0.5), 1.0), Some(0));
        assert_eq!(polygon.hit_edge(Point2::new(-0.5, 5.0), 1.0), Some(3));
        assert_eq!(polygon.hit_edge(Point2::new(5.0, 5.0), 1.0), None);
    }

    #[test]
    fn arc_edge_bulges_by_param() {
        let polygon = Polygon::from_segments(
            [
                PolygonSegment::arc(Point2::new(0.0, 0.0), 5.0),
                PolygonSegment::line(Point2::new(10.0, 0.0)),
            ],
            false,
        )
        .expect("arc polygon");
        let edge = polygon.edges()[0];
        let control = edge.control_point().expect("control point");
        assert!((control.x() - 5.0).abs() < 1e-9);
        assert!((control.y() - 10.0).abs() < 1e-9);

        let apex = edge.point_at(0.5);
        assert!((apex.y() - 5.0).abs() < 1e-9);

        let path = polygon.path_points();
        assert_eq!(path[1].control, Some(control));
        let bounds = polygon.bounds();
        assert!((bounds.height - 5.0).abs() < 1e-9);
    }

    #[test]
    fn hidden_edge_lifts_the_pen() {
        let mut segments: Vec<PolygonSegment> = square().segments().to_vec();
        segments[1].flags |= PolygonSegment::FLAG_HIDDEN_EDGE;
        let polygon = Polygon::from_segments(segments, true).expect("polygon");
        let path = polygon.path_points();
        assert!(path[2].move_to);
        assert!(!path[3].move_to);
    }

    #[test]
    fn short_ref_resolves_by_lookup() {
        let mut segments: Vec<PolygonSegment> = square().segments().to_vec();
        segments[3].short_ref = 1;
        segments[2].short_ref = 42;
        let polygon = Polygon::from_segments(segments, true).expect("polygon");
        assert_eq!(
            polygon.resolve_short_ref(3).map(|s| s.point),
            Some(Point2::new(10.0, 0.0))
        );
        assert!(polygon.resolve_short_ref(2).is_none());
        assert!(polygon.resolve_short_ref(0).is_none());
    }

    #[test]
    fn snapshot_with_mismatched_count_is_rejected() {
        let json = serde_json::to_value(square()).expect("serialize");
        let mut corrupt = json.clone();
        corrupt["n_points"] = serde_json::json!(7);
        let result: Result<Polygon, _> = serde_json::from_value(corrupt);
        assert!(result.is_err());

        let restored: Polygon = serde_json::from_value(json).expect("deserialize");
        assert_eq!(restored, square());
    }

    #[test]
    fn templates_scale_into_frame() {
        let frame = BoundingBox::new(10.0, 20.0, 100.0, 50.0);
        let diamond = PolygonTemplate::Diamond.build(frame).expect("diamond");
        assert_eq!(diamond.point_count(), 4);
        assert!(diamond.is_closed());
        assert_eq!(diamond.segments()[0].point, Point2::new(60.0, 20.0));
        assert_eq!(diamond.bounds(), frame);

        let trapezoid = PolygonTemplate::Trapezoid { offset: 400.0 }
            .build(frame)
            .expect("trapezoid");
        // 偏移超过半宽时夹紧到 0.5
        assert_eq!(trapezoid.segments()[0].point, Point2::new(60.0, 20.0));

        assert!(PolygonTemplate::Triangle
            .build(BoundingBox::uninitialized())
            .is_err());
    }

    #[test]
    fn seg_line_routes_orthogonally() {
        let line = SegLine::new(
            Point2::new(0.0, 0.0),
            Point2::new(100.0, 50.0),
            SegDirection::Horizontal,
            SegDirection::Horizontal,
        )
        .expect("seg line");
        assert_eq!(
            line.points(),
            &[
                Point2::new(0.0, 0.0),
                Point2::new(50.0, 0.0),
                Point2::new(50.0, 50.0),
                Point2::new(100.0, 50.0),
            ]
        );
        assert!((line.length() - 150.0).abs() < 1e-9);
        assert_eq!(line.hit(Point2::new(50.0, 25.0), 1.0), Some(1));

        let straight = SegLine::new(
            Point2::new(0.0, 10.0),
            Point2::new(80.0, 10.0),
            SegDirection::Horizontal,
            SegDirection::Horizontal,
        )
        .expect("straight");
        assert_eq!(straight.points().len(), 2);

        let elbow = SegLine::new(
            Point2::new(0.0, 0.0),
            Point2::new(40.0, 40.0),
            SegDirection::Horizontal,
            SegDirection::Vertical,
        )
        .expect("elbow");
        assert_eq!(elbow.points()[1], Point2::new(40.0, 0.0));
    }

    #[test]
    fn seg_line_rounds_corners() {
        let line = SegLine::new(
            Point2::new(0.0, 0.0),
            Point2::new(40.0, 40.0),
            SegDirection::Horizontal,
            SegDirection::Vertical,
        )
        .expect("elbow")
        .with_curve(10.0);
        let path = line.path_points();
        assert_eq!(path.len(), 4);
        assert_eq!(path[1].position, Point2::new(30.0, 0.0));
        assert_eq!(path[2].control, Some(Point2::new(40.0, 0.0)));
        assert_eq!(path[2].position, Point2::new(40.0, 10.0));
    }

    #[test]
    fn seg_line_snapshot_rederives_points() {
        let line = SegLine::new(
            Point2::new(0.0, 0.0),
            Point2::new(40.0, 20.0),
            SegDirection::Horizontal,
            SegDirection::Horizontal,
        )
        .expect("route")
        .with_curve(4.0);
        let mut json = serde_json::to_value(&line).expect("serialize");
        json["points"] = serde_json::json!([[500.0, 500.0], [-3.0, 7.0]]);
        let loaded: SegLine = serde_json::from_value(json.clone()).expect("deserialize");
        assert_eq!(loaded, line);

        json.as_object_mut().expect("object").remove("points");
        let loaded: SegLine = serde_json::from_value(json).expect("without points");
        assert_eq!(loaded.points(), line.points());
    }

    #[test]
    fn seg_line_snapshot_rejects_bad_curve() {
        let line = SegLine::new(
            Point2::new(0.0, 0.0),
            Point2::new(40.0, 20.0),
            SegDirection::Horizontal,
            SegDirection::Vertical,
        )
        .expect("route");
        let mut json = serde_json::to_value(&line).expect("serialize");
        json["curve_param"] = serde_json::json!(-2.5);
        assert!(serde_json::from_value::<SegLine>(json.clone()).is_err());

        // JSON 无法表示 NaN，直接走转换入口。
        let data = SegLineData {
            curve_param: f64::NAN,
            ..SegLineData::from(line)
        };
        assert_eq!(
            SegLine::try_from(data).expect_err("nan curve"),
            CoreError::NonFinite("connector curve")
        );
    }
}
