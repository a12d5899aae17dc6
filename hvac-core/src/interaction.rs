//! 交互辅助模型：动态对齐参考线、右键上下文、箭头目录与选择框控制点。

use serde::{Deserialize, Serialize};

use crate::geometry::{BoundingBox, Point2, Size2, Vector2};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GuideAnchor {
    Start,
    Center,
    End,
}

/// 一条命中的对齐参考线。`delta` 为移动框需要施加的修正量（带符号）。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GuideHit {
    pub target: u64,
    pub anchor: GuideAnchor,
    pub target_anchor: GuideAnchor,
    pub position: f64,
    pub delta: f64,
}

/// 拖动过程中与其他图元的最近对齐：竖线比较 x（左/中/右），横线比较 y（上/中/下）。
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct DynamicGuides {
    pub vertical: Option<GuideHit>,
    pub horizontal: Option<GuideHit>,
}

fn anchors_x(bounds: &BoundingBox) -> [(GuideAnchor, f64); 3] {
    [
        (GuideAnchor::Start, bounds.x),
        (GuideAnchor::Center, bounds.x + bounds.width * 0.5),
        (GuideAnchor::End, bounds.right()),
    ]
}

fn anchors_y(bounds: &BoundingBox) -> [(GuideAnchor, f64); 3] {
    [
        (GuideAnchor::Start, bounds.y),
        (GuideAnchor::Center, bounds.y + bounds.height * 0.5),
        (GuideAnchor::End, bounds.bottom()),
    ]
}

fn nearest(
    current: Option<GuideHit>,
    target: u64,
    moving: [(GuideAnchor, f64); 3],
    fixed: [(GuideAnchor, f64); 3],
    snap_distance: f64,
) -> Option<GuideHit> {
    let mut best = current;
    for (anchor, from) in moving {
        for (target_anchor, to) in fixed {
            let delta = to - from;
            if delta.abs() > snap_distance {
                continue;
            }
            if best.is_some_and(|hit| hit.delta.abs() <= delta.abs()) {
                continue;
            }
            best = Some(GuideHit {
                target,
                anchor,
                target_anchor,
                position: to,
                delta,
            });
        }
    }
    best
}

impl DynamicGuides {
    /// 计算移动框相对其他图元的最近对齐。距离相等时保留先出现的候选。
    pub fn compute<I>(moving: BoundingBox, others: I, snap_distance: f64) -> Self
    where
        I: IntoIterator<Item = (u64, BoundingBox)>,
    {
        let mut guides = Self::default();
        if !moving.is_initialized() || !snap_distance.is_finite() || snap_distance < 0.0 {
            return guides;
        }
        for (id, bounds) in others {
            if !bounds.is_initialized() {
                continue;
            }
            guides.vertical = nearest(
                guides.vertical,
                id,
                anchors_x(&moving),
                anchors_x(&bounds),
                snap_distance,
            );
            guides.horizontal = nearest(
                guides.horizontal,
                id,
                anchors_y(&moving),
                anchors_y(&bounds),
                snap_distance,
            );
        }
        guides
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.vertical.is_none() && self.horizontal.is_none()
    }

    /// 吸附修正向量。
    pub fn snap_delta(&self) -> Vector2 {
        Vector2::new(
            self.vertical.map_or(0.0, |hit| hit.delta),
            self.horizontal.map_or(0.0, |hit| hit.delta),
        )
    }
}

/// 右键时的上下文：命中的图元、边与所在图层。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RightClickData {
    pub document_point: Point2,
    pub screen_point: Point2,
    pub shape: Option<u64>,
    pub segment_index: Option<usize>,
    pub layer_index: Option<usize>,
}

/// 箭头定义。几何尺寸以 `def_area` 为参考系，按实际箭头尺寸缩放。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArrowheadRecord {
    pub id: u32,
    pub description: &'static str,
    pub def_area: Size2,
    pub end_point: Point2,
    pub attach_point: Point2,
    pub centered: bool,
}

const fn arrow(
    id: u32,
    description: &'static str,
    area: (f64, f64),
    end: (f64, f64),
    attach: (f64, f64),
    centered: bool,
) -> ArrowheadRecord {
    ArrowheadRecord {
        id,
        description,
        def_area: Size2 {
            width: area.0,
            height: area.1,
        },
        end_point: Point2(glam::DVec2::new(end.0, end.1)),
        attach_point: Point2(glam::DVec2::new(attach.0, attach.1)),
        centered,
    }
}

pub const ARROWHEADS: [ArrowheadRecord; 11] = [
    arrow(0, "No arrow", (1.0, 1.0), (0.0, 0.0), (0.0, 0.0), false),
    arrow(1, "Filled arrow", (10.0, 10.0), (10.0, 5.0), (0.0, 5.0), false),
    arrow(2, "Line arrow", (10.0, 10.0), (10.0, 5.0), (10.0, 5.0), false),
    arrow(3, "Fancy arrow", (10.0, 10.0), (10.0, 5.0), (5.0, 5.0), false),
    arrow(4, "Filled circle", (10.0, 10.0), (5.0, 5.0), (0.0, 5.0), false),
    arrow(5, "Unfilled circle", (10.0, 10.0), (5.0, 5.0), (0.0, 5.0), false),
    arrow(6, "Filled square", (10.0, 10.0), (5.0, 5.0), (0.0, 5.0), false),
    arrow(7, "Unfilled square", (10.0, 10.0), (5.0, 5.0), (0.0, 5.0), false),
    arrow(11, "Filled diamond", (20.0, 10.0), (20.0, 5.0), (5.0, 5.0), false),
    arrow(17, "Center filled arrow", (10.0, 10.0), (5.0, 5.0), (5.0, 5.0), true),
    arrow(18, "Center line arrow", (10.0, 10.0), (5.0, 5.0), (5.0, 5.0), true),
];

impl ArrowheadRecord {
    pub const NONE: u32 = 0;

    pub fn lookup(id: u32) -> Option<&'static ArrowheadRecord> {
        ARROWHEADS.iter().find(|record| record.id == id)
    }

    /// 线端需要回缩的距离：端点到挂接点的水平距离按箭头尺寸缩放。居中箭头不回缩。
    pub fn line_trim(&self, size: f64) -> f64 {
        if self.centered || self.def_area.width <= 0.0 {
            return 0.0;
        }
        (self.end_point.x() - self.attach_point.x()) * size / self.def_area.width
    }
}

/// 选择框的八个缩放控制点。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Knob {
    TopLeft,
    Top,
    TopRight,
    Right,
    BottomRight,
    Bottom,
    BottomLeft,
    Left,
}

impl Knob {
    pub const ALL: [Knob; 8] = [
        Knob::TopLeft,
        Knob::Top,
        Knob::TopRight,
        Knob::Right,
        Knob::BottomRight,
        Knob::Bottom,
        Knob::BottomLeft,
        Knob::Left,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectionFrame {
    pub frame: BoundingBox,
}

impl SelectionFrame {
    pub fn new(frame: BoundingBox) -> Self {
        Self { frame }
    }

    pub fn knob_position(&self, knob: Knob) -> Point2 {
        let f = &self.frame;
        let cx = f.x + f.width * 0.5;
        let cy = f.y + f.height * 0.5;
        match knob {
            Knob::TopLeft => Point2::new(f.x, f.y),
            Knob::Top => Point2::new(cx, f.y),
            Knob::TopRight => Point2::new(f.right(), f.y),
            Knob::Right => Point2::new(f.right(), cy),
            Knob::BottomRight => Point2::new(f.right(), f.bottom()),
            Knob::Bottom => Point2::new(cx, f.bottom()),
            Knob::BottomLeft => Point2::new(f.x, f.bottom()),
            Knob::Left => Point2::new(f.x, cy),
        }
    }

    /// 命中测试：点落在以控制点为中心、边长 `knob_size` 的方块内。
    pub fn knob_at(&self, point: Point2, knob_size: f64) -> Option<Knob> {
        if !self.frame.is_initialized() {
            return None;
        }
        let half = knob_size * 0.5;
        Knob::ALL.into_iter().find(|&knob| {
            let center = self.knob_position(knob);
            (point.x() - center.x()).abs() <= half && (point.y() - center.y()).abs() <= half
        })
    }

    /// 拖动控制点到 `point` 后的新框；越过对边时自动翻转归一化。
    pub fn resize(&self, knob: Knob, point: Point2) -> BoundingBox {
        let f = &self.frame;
        let (mut left, mut top, mut right, mut bottom) = (f.x, f.y, f.right(), f.bottom());
        match knob {
            Knob::TopLeft => (left, top) = (point.x(), point.y()),
            Knob::Top => top = point.y(),
            Knob::TopRight => (right, top) = (point.x(), point.y()),
            Knob::Right => right = point.x(),
            Knob::BottomRight => (right, bottom) = (point.x(), point.y()),
            Knob::Bottom => bottom = point.y(),
            Knob::BottomLeft => (left, bottom) = (point.x(), point.y()),
            Knob::Left => left = point.x(),
        }
        BoundingBox::from_corners(Point2::new(left, top), Point2::new(right, bottom))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guides_pick_nearest_alignment_within_snap() {
        let moving = BoundingBox::new(97.0, 52.0, 20.0, 20.0);
        let others = [
            (1, BoundingBox::new(100.0, 300.0, 40.0, 40.0)),
            (2, BoundingBox::new(400.0, 50.0, 10.0, 10.0)),
            (3, BoundingBox::new(600.0, 600.0, 10.0, 10.0)),
        ];
        let guides = DynamicGuides::compute(moving, others, 5.0);
        let vertical = guides.vertical.expect("vertical guide");
        assert_eq!(vertical.target, 1);
        assert_eq!(vertical.anchor, GuideAnchor::Start);
        assert!((vertical.delta - 3.0).abs() < 1e-9);

        let horizontal = guides.horizontal.expect("horizontal guide");
        assert_eq!(horizontal.target, 2);
        assert!((horizontal.delta + 2.0).abs() < 1e-9);

        let delta = guides.snap_delta();
        assert!((delta.x() - 3.0).abs() < 1e-9 && (delta.y() + 2.0).abs() < 1e-9);
    }

    #[test]
    fn guides_ignore_far_shapes() {
        let guides = DynamicGuides::compute(
            BoundingBox::new(0.0, 0.0, 10.0, 10.0),
            [(1, BoundingBox::new(500.0, 500.0, 10.0, 10.0))],
            4.0,
        );
        assert!(guides.is_empty());
        assert_eq!(guides.snap_delta(), Vector2::ZERO);
    }

    #[test]
    fn arrowhead_catalogue_lookup_and_trim() {
        let filled = ArrowheadRecord::lookup(1).expect("filled arrow");
        assert_eq!(filled.description, "Filled arrow");
        assert!((filled.line_trim(12.0) - 12.0).abs() < 1e-9);

        let line = ArrowheadRecord::lookup(2).expect("line arrow");
        assert_eq!(line.line_trim(12.0), 0.0);

        let diamond = ArrowheadRecord::lookup(11).expect("diamond");
        assert!((diamond.line_trim(20.0) - 15.0).abs() < 1e-9);

        assert!(ArrowheadRecord::lookup(17).expect("centered").centered);
        assert!(ArrowheadRecord::lookup(99).is_none());
    }

    #[test]
    fn knob_hit_test_and_resize() {
        let selection = SelectionFrame::new(BoundingBox::new(10.0, 10.0, 100.0, 50.0));
        assert_eq!(
            selection.knob_at(Point2::new(111.0, 59.0), 6.0),
            Some(Knob::BottomRight)
        );
        assert_eq!(selection.knob_at(Point2::new(60.0, 10.0), 6.0), Some(Knob::Top));
        assert_eq!(selection.knob_at(Point2::new(60.0, 35.0), 6.0), None);

        let resized = selection.resize(Knob::Right, Point2::new(150.0, 0.0));
        assert_eq!(resized, BoundingBox::new(10.0, 10.0, 140.0, 50.0));

        let flipped = selection.resize(Knob::Left, Point2::new(200.0, 0.0));
        assert_eq!(flipped, BoundingBox::new(110.0, 10.0, 90.0, 50.0));
    }
}
