//! 连接器挂接（hook）与弱引用链接（link）。

use serde::{Deserialize, Serialize};

use crate::errors::CoreError;
use crate::geometry::{BoundingBox, Point2, StepRect};

/// 连接器端点与目标图元之间的绑定描述，由连接器拥有，目标仅通过 `id` 被引用。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hook {
    pub start_point: Point2,
    pub end_point: Point2,
    /// 目标图元 id，`-1` 表示未绑定。
    pub id: i64,
    pub text_id: i64,
    pub unique_text_id: i64,
    pub gap: f64,
    pub outer_gap: f64,
    pub extra: f64,
    pub manager_height: f64,
    pub is_assistant: bool,
    pub bounding_rect: BoundingBox,
    pub sequence: u32,
    pub steps: Vec<StepRect>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cell_id: Option<i64>,
    /// 目标上的连接点（目标局部坐标）。
    pub connect: Point2,
}

impl Hook {
    pub const UNBOUND: i64 = -1;
    pub const NO_TEXT: i64 = -1;

    pub fn unbound() -> Self {
        Self {
            start_point: Point2::ORIGIN,
            end_point: Point2::ORIGIN,
            id: Self::UNBOUND,
            text_id: Self::NO_TEXT,
            unique_text_id: Self::NO_TEXT,
            gap: 0.0,
            outer_gap: 0.0,
            extra: 0.0,
            manager_height: 0.0,
            is_assistant: false,
            bounding_rect: BoundingBox::uninitialized(),
            sequence: 0,
            steps: Vec::new(),
            cell_id: None,
            connect: Point2::ORIGIN,
        }
    }

    /// 超出 `i64` 范围的 id 无法与哨兵区分，直接拒绝。
    pub fn bound_to(target: u64) -> Result<Self, CoreError> {
        Ok(Self {
            id: Self::encode_target(target)?,
            ..Self::unbound()
        })
    }

    pub(crate) fn encode_target(target: u64) -> Result<i64, CoreError> {
        i64::try_from(target).map_err(|_| CoreError::ShapeIdOutOfRange(target))
    }

    pub fn with_endpoints(mut self, start: Point2, end: Point2) -> Self {
        self.start_point = start;
        self.end_point = end;
        self
    }

    pub fn with_gaps(mut self, gap: f64, outer_gap: f64) -> Self {
        self.gap = gap;
        self.outer_gap = outer_gap;
        self
    }

    #[inline]
    pub fn is_bound(&self) -> bool {
        self.id >= 0
    }

    /// 目标 id；未绑定时为 `None`。
    #[inline]
    pub fn target(&self) -> Option<u64> {
        u64::try_from(self.id).ok()
    }

    pub(crate) fn is_finite(&self) -> bool {
        self.start_point.is_finite()
            && self.end_point.is_finite()
            && self.connect.is_finite()
            && self.gap.is_finite()
            && self.outer_gap.is_finite()
            && self.extra.is_finite()
            && self.manager_height.is_finite()
            && self.steps.iter().all(StepRect::is_finite)
    }
}

impl Default for Hook {
    fn default() -> Self {
        Self::unbound()
    }
}

/// 链接标志位。
pub struct LinkFlags;

impl LinkFlags {
    pub const MOVE: u32 = 0x1;
    pub const DELETE_TARGET: u32 = 0x2;
    pub const DELETE_LINK: u32 = 0x4;
    pub const BREAK: u32 = 0x8;
}

/// 从挂接方（`hook_id`）到目标（`target_id`）的非拥有关系，仅用于查找。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub target_id: u64,
    pub hook_id: u64,
    pub flags: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cell_id: Option<i64>,
}

impl Link {
    pub fn new(target_id: u64, hook_id: u64) -> Self {
        Self {
            target_id,
            hook_id,
            flags: 0,
            cell_id: None,
        }
    }

    #[inline]
    pub fn has_flag(&self, flag: u32) -> bool {
        self.flags & flag != 0
    }

    #[inline]
    fn same_relation(&self, other: &Link) -> bool {
        self.target_id == other.target_id
            && self.hook_id == other.hook_id
            && self.cell_id == other.cell_id
    }
}

/// 按 `target_id` 有序的链接表；同一目标的链接保持插入顺序。
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinkList {
    links: Vec<Link>,
}

impl LinkList {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.links.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Link> {
        self.links.iter()
    }

    /// 插入链接；同一 (target, hook, cell) 已存在时返回 `false`。
    pub fn insert(&mut self, link: Link) -> bool {
        if self.links_to(link.target_id).iter().any(|l| l.same_relation(&link)) {
            return false;
        }
        let at = self
            .links
            .partition_point(|existing| existing.target_id <= link.target_id);
        self.links.insert(at, link);
        true
    }

    pub fn links_to(&self, target: u64) -> &[Link] {
        let start = self.links.partition_point(|l| l.target_id < target);
        let end = self.links.partition_point(|l| l.target_id <= target);
        &self.links[start..end]
    }

    pub fn contains(&self, target: u64, hook: u64) -> bool {
        self.links_to(target).iter().any(|l| l.hook_id == hook)
    }

    /// 删除 (target, hook) 的全部链接，返回删除数量。
    pub fn remove(&mut self, target: u64, hook: u64) -> usize {
        self.retain(|l| !(l.target_id == target && l.hook_id == hook))
    }

    pub fn remove_target(&mut self, target: u64) -> usize {
        self.retain(|l| l.target_id != target)
    }

    pub fn remove_hook_owner(&mut self, hook: u64) -> usize {
        self.retain(|l| l.hook_id != hook)
    }

    pub fn set_flag(&mut self, target: u64, flag: u32) {
        let start = self.links.partition_point(|l| l.target_id < target);
        for link in self.links[start..]
            .iter_mut()
            .take_while(|l| l.target_id == target)
        {
            link.flags |= flag;
        }
    }

    pub fn clear_flags(&mut self) {
        for link in &mut self.links {
            link.flags = 0;
        }
    }

    /// 保留满足条件的链接，返回被移除的数量。
    pub fn retain<F>(&mut self, mut keep: F) -> usize
    where
        F: FnMut(&Link) -> bool,
    {
        let before = self.links.len();
        self.links.retain(|link| keep(link));
        before - self.links.len()
    }

    /// 反序列化后恢复按目标排序的约束（稳定排序保留同目标的原有顺序）。
    pub(crate) fn normalize(&mut self) {
        self.links.sort_by_key(|l| l.target_id);
        let mut seen: Vec<Link> = Vec::with_capacity(self.links.len());
        self.links.retain(|link| {
            if seen.iter().any(|s| s.same_relation(link)) {
                false
            } else {
                seen.push(*link);
                true
            }
        });
    }
}
