pub mod array;
pub mod document;
pub mod hooks;
pub mod interaction;
pub mod layers;
pub mod segments;
pub mod transform;

pub mod errors {
    use thiserror::Error;

    /// 几何核心的统一错误类型。所有变更操作在返回错误时保证模型未被修改。
    #[derive(Debug, Clone, PartialEq, Error)]
    pub enum CoreError {
        #[error("non-finite value for {0}")]
        NonFinite(&'static str),
        #[error("negative size for {0}")]
        NegativeSize(&'static str),
        #[error("{what} must be positive, got {value}")]
        NotPositive { what: &'static str, value: f64 },
        #[error("{what} index {index} out of range (len {len})")]
        IndexOutOfRange {
            what: &'static str,
            index: usize,
            len: usize,
        },
        #[error("hook target is unbound")]
        UnboundTarget,
        #[error("shape {0} not found")]
        ShapeNotFound(u64),
        #[error("shape {id} is not a {expected}")]
        WrongShapeKind { id: u64, expected: &'static str },
        #[error("shape {0} cannot hook to itself")]
        SelfHook(u64),
        #[error("shape id {0} exceeds the supported range")]
        ShapeIdOutOfRange(u64),
        #[error("shape id {0} is already taken")]
        DuplicateShape(u64),
        #[error("hook sequence for target {0} is exhausted")]
        SequenceExhausted(u64),
        #[error("no active layer")]
        NoActiveLayer,
        #[error("layer {0} does not accept new shapes")]
        LayerLocked(usize),
        #[error("layer limit of {0} reached")]
        LayerLimit(usize),
        #[error("corrupt snapshot: {0}")]
        CorruptSnapshot(String),
    }

    impl CoreError {
        #[inline]
        pub(crate) fn out_of_range(what: &'static str, index: usize, len: usize) -> Self {
            Self::IndexOutOfRange { what, index, len }
        }
    }
}

pub mod geometry {
    use glam::DVec2;
    use serde::{Deserialize, Serialize};

    use crate::errors::CoreError;

    /// 二维点，内部以 `glam::DVec2` 表示。文档坐标与屏幕坐标共用该类型。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Point2(pub DVec2);

    impl Point2 {
        pub const ORIGIN: Self = Self(DVec2::ZERO);

        #[inline]
        pub fn new(x: f64, y: f64) -> Self {
            Self(DVec2::new(x, y))
        }

        #[inline]
        pub fn from_vec(vec: DVec2) -> Self {
            Self(vec)
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }

        #[inline]
        pub fn translate(self, offset: Vector2) -> Self {
            Self(self.0 + offset.0)
        }

        #[inline]
        pub fn vector_to(self, other: Point2) -> Vector2 {
            Vector2(other.0 - self.0)
        }

        #[inline]
        pub fn distance(self, other: Point2) -> f64 {
            self.0.distance(other.0)
        }

        #[inline]
        pub fn midpoint(self, other: Point2) -> Point2 {
            Self((self.0 + other.0) * 0.5)
        }

        #[inline]
        pub fn is_finite(self) -> bool {
            self.0.is_finite()
        }

        /// 校验坐标有限，供变更入口统一调用。
        #[inline]
        pub fn checked(self, what: &'static str) -> Result<Self, CoreError> {
            if self.is_finite() {
                Ok(self)
            } else {
                Err(CoreError::NonFinite(what))
            }
        }

        #[inline]
        pub fn as_vec2(self) -> DVec2 {
            self.0
        }
    }

    impl From<DVec2> for Point2 {
        fn from(value: DVec2) -> Self {
            Self::from_vec(value)
        }
    }

    /// 二维向量，用于平移、滚动偏移与方向。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Vector2(pub DVec2);

    impl Vector2 {
        pub const ZERO: Self = Self(DVec2::ZERO);

        #[inline]
        pub fn new(x: f64, y: f64) -> Self {
            Self(DVec2::new(x, y))
        }

        #[inline]
        pub fn from_points(start: Point2, end: Point2) -> Self {
            Self(end.0 - start.0)
        }

        #[inline]
        pub fn length(self) -> f64 {
            self.0.length()
        }

        #[inline]
        pub fn length_squared(self) -> f64 {
            self.0.length_squared()
        }

        #[inline]
        pub fn normalize(self) -> Option<Self> {
            let len = self.0.length();
            if len <= f64::EPSILON {
                None
            } else {
                Some(Self(self.0 / len))
            }
        }

        #[inline]
        pub fn scale(self, factor: f64) -> Self {
            Self(self.0 * factor)
        }

        /// 逆时针旋转 90°。
        #[inline]
        pub fn perp(self) -> Self {
            Self(self.0.perp())
        }

        #[inline]
        pub fn is_finite(self) -> bool {
            self.0.is_finite()
        }

        #[inline]
        pub fn as_vec2(self) -> DVec2 {
            self.0
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }
    }

    impl From<DVec2> for Vector2 {
        fn from(value: DVec2) -> Self {
            Self(value)
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Size2 {
        pub width: f64,
        pub height: f64,
    }

    impl Size2 {
        #[inline]
        pub fn new(width: f64, height: f64) -> Self {
            Self { width, height }
        }

        #[inline]
        pub fn is_valid(&self) -> bool {
            self.width.is_finite()
                && self.height.is_finite()
                && self.width >= 0.0
                && self.height >= 0.0
        }

        pub fn checked(self, what: &'static str) -> Result<Self, CoreError> {
            if !self.width.is_finite() || !self.height.is_finite() {
                return Err(CoreError::NonFinite(what));
            }
            if self.width < 0.0 || self.height < 0.0 {
                return Err(CoreError::NegativeSize(what));
            }
            Ok(self)
        }
    }

    /// 轴对齐包围盒。`width`/`height` 为 `-1` 表示尚未计算，与零尺寸（合法）区分。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct BoundingBox {
        pub x: f64,
        pub y: f64,
        pub width: f64,
        pub height: f64,
    }

    impl BoundingBox {
        pub const UNSET: f64 = -1.0;

        #[inline]
        pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
            Self {
                x,
                y,
                width,
                height,
            }
        }

        #[inline]
        pub fn uninitialized() -> Self {
            Self {
                x: 0.0,
                y: 0.0,
                width: Self::UNSET,
                height: Self::UNSET,
            }
        }

        #[inline]
        pub fn is_initialized(&self) -> bool {
            self.width >= 0.0 && self.height >= 0.0
        }

        /// 由任意两个角点构造，自动归一化。
        pub fn from_corners(a: Point2, b: Point2) -> Self {
            let min = a.as_vec2().min(b.as_vec2());
            let max = a.as_vec2().max(b.as_vec2());
            Self::new(min.x, min.y, max.x - min.x, max.y - min.y)
        }

        pub fn from_points<I>(points: I) -> Self
        where
            I: IntoIterator<Item = Point2>,
        {
            let mut bounds = Self::uninitialized();
            for point in points {
                bounds.include_point(point);
            }
            bounds
        }

        pub fn include_point(&mut self, point: Point2) {
            if !self.is_initialized() {
                *self = Self::new(point.x(), point.y(), 0.0, 0.0);
                return;
            }
            let min_vec = self.min().as_vec2().min(point.as_vec2());
            let max_vec = self.max().as_vec2().max(point.as_vec2());
            *self = Self::from_corners(Point2::from_vec(min_vec), Point2::from_vec(max_vec));
        }

        pub fn include_box(&mut self, other: &BoundingBox) {
            if !other.is_initialized() {
                return;
            }
            self.include_point(other.min());
            self.include_point(other.max());
        }

        #[inline]
        pub fn min(&self) -> Point2 {
            Point2::new(self.x, self.y)
        }

        #[inline]
        pub fn max(&self) -> Point2 {
            Point2::new(self.right(), self.bottom())
        }

        #[inline]
        pub fn right(&self) -> f64 {
            self.x + self.width
        }

        #[inline]
        pub fn bottom(&self) -> f64 {
            self.y + self.height
        }

        #[inline]
        pub fn size(&self) -> Size2 {
            Size2::new(self.width, self.height)
        }

        #[inline]
        pub fn center(&self) -> Point2 {
            debug_assert!(self.is_initialized());
            Point2::new(self.x + self.width * 0.5, self.y + self.height * 0.5)
        }

        /// 点是否落在盒内（含边界）。未初始化的盒不包含任何点。
        pub fn contains(&self, point: Point2) -> bool {
            self.is_initialized()
                && point.x() >= self.x
                && point.x() <= self.right()
                && point.y() >= self.y
                && point.y() <= self.bottom()
        }

        pub fn intersects(&self, other: &BoundingBox) -> bool {
            self.is_initialized()
                && other.is_initialized()
                && self.x <= other.right()
                && other.x <= self.right()
                && self.y <= other.bottom()
                && other.y <= self.bottom()
        }

        pub fn inflate(&self, amount: f64) -> Self {
            if !self.is_initialized() {
                return *self;
            }
            Self::new(
                self.x - amount,
                self.y - amount,
                (self.width + 2.0 * amount).max(0.0),
                (self.height + 2.0 * amount).max(0.0),
            )
        }

        pub fn translate(&self, offset: Vector2) -> Self {
            Self::new(self.x + offset.x(), self.y + offset.y(), self.width, self.height)
        }

        /// 加载时校验：坐标有限，尺寸为非负或恰为未初始化哨兵。
        pub fn validate(&self, what: &'static str) -> Result<(), CoreError> {
            if !(self.x.is_finite()
                && self.y.is_finite()
                && self.width.is_finite()
                && self.height.is_finite())
            {
                return Err(CoreError::NonFinite(what));
            }
            let sentinel = self.width == Self::UNSET && self.height == Self::UNSET;
            if !sentinel && (self.width < 0.0 || self.height < 0.0) {
                return Err(CoreError::NegativeSize(what));
            }
            Ok(())
        }
    }

    impl Default for BoundingBox {
        fn default() -> Self {
            Self::uninitialized()
        }
    }

    /// 可渲染路径中的一个节点。`move_to` 表示抬笔开始新子路径；
    /// `control` 为二次曲线控制点，仅在曲线段上存在。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct PathPoint {
        pub position: Point2,
        pub move_to: bool,
        pub has_arrowhead: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub control: Option<Point2>,
    }

    impl PathPoint {
        #[inline]
        pub fn move_to(position: Point2) -> Self {
            Self {
                position,
                move_to: true,
                has_arrowhead: false,
                control: None,
            }
        }

        #[inline]
        pub fn line_to(position: Point2) -> Self {
            Self {
                position,
                move_to: false,
                has_arrowhead: false,
                control: None,
            }
        }

        #[inline]
        pub fn curve_to(control: Point2, position: Point2) -> Self {
            Self {
                position,
                move_to: false,
                has_arrowhead: false,
                control: Some(control),
            }
        }

        #[inline]
        pub fn with_arrowhead(mut self) -> Self {
            self.has_arrowhead = true;
            self
        }
    }

    /// 以左上右下表示的矩形，阵列形状的轮廓与步进都使用它。
    #[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct StepRect {
        pub left: f64,
        pub top: f64,
        pub right: f64,
        pub bottom: f64,
    }

    impl StepRect {
        #[inline]
        pub fn new(left: f64, top: f64, right: f64, bottom: f64) -> Self {
            Self {
                left,
                top,
                right,
                bottom,
            }
        }

        #[inline]
        pub fn width(&self) -> f64 {
            self.right - self.left
        }

        #[inline]
        pub fn height(&self) -> f64 {
            self.bottom - self.top
        }

        pub fn to_box(&self) -> BoundingBox {
            BoundingBox::from_corners(
                Point2::new(self.left, self.top),
                Point2::new(self.right, self.bottom),
            )
        }

        pub fn is_finite(&self) -> bool {
            self.left.is_finite()
                && self.top.is_finite()
                && self.right.is_finite()
                && self.bottom.is_finite()
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn uninitialized_box_is_distinct_from_zero_size() {
            let unset = BoundingBox::uninitialized();
            assert!(!unset.is_initialized());
            assert!(!unset.contains(Point2::new(0.0, 0.0)));

            let zero = BoundingBox::new(0.0, 0.0, 0.0, 0.0);
            assert!(zero.is_initialized());
            assert!(zero.contains(Point2::new(0.0, 0.0)));
            assert_eq!(BoundingBox::default(), unset);
        }

        #[test]
        fn include_point_grows_box() {
            let mut bounds = BoundingBox::uninitialized();
            bounds.include_point(Point2::new(5.0, 5.0));
            assert!(bounds.is_initialized());
            assert_eq!(bounds.width, 0.0);

            bounds.include_point(Point2::new(-5.0, 10.0));
            assert!((bounds.x + 5.0).abs() < 1e-9);
            assert!((bounds.y - 5.0).abs() < 1e-9);
            assert!((bounds.width - 10.0).abs() < 1e-9);
            assert!((bounds.height - 5.0).abs() < 1e-9);

            let mut other = BoundingBox::uninitialized();
            other.include_box(&BoundingBox::uninitialized());
            assert!(!other.is_initialized());
            other.include_box(&bounds);
            assert_eq!(other, bounds);
        }

        #[test]
        fn validate_accepts_sentinel_and_rejects_negative_size() {
            assert!(BoundingBox::uninitialized().validate("frame").is_ok());
            let bad = BoundingBox::new(0.0, 0.0, -2.0, 4.0);
            assert_eq!(
                bad.validate("frame"),
                Err(CoreError::NegativeSize("frame"))
            );
            let nan = BoundingBox::new(f64::NAN, 0.0, 1.0, 1.0);
            assert_eq!(nan.validate("frame"), Err(CoreError::NonFinite("frame")));
        }

        #[test]
        fn step_rect_converts_to_normalized_box() {
            let rect = StepRect::new(10.0, 20.0, 0.0, 0.0);
            let bounds = rect.to_box();
            assert_eq!(bounds, BoundingBox::new(0.0, 0.0, 10.0, 20.0));
            assert!((rect.width() + 10.0).abs() < 1e-9);
        }
    }
}
