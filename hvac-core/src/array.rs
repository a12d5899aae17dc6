//! 阵列/复合形状（如一段风管）：有序的步进矩形与把它挂接到相邻图元的 hook 列表。

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::errors::CoreError;
use crate::geometry::{StepRect, Vector2};
use crate::hooks::Hook;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeArray {
    pub style_flags: u32,
    pub tilt: f64,
    pub angle: f64,
    pub height: f64,
    pub width: f64,
    pub flags: u32,
    pub match_size_length: f64,
    last_text_hook_index: i32,
    pub curve_param: f64,
    pub profile: StepRect,
    pub co_profile: StepRect,
    steps: Vec<StepRect>,
    hooks: Vec<Hook>,
    /// 每个目标下一个可分配的序号；只增不减，删除 hook 不回收。
    #[serde(default)]
    sequence_counters: BTreeMap<u64, u32>,
}

impl Default for ShapeArray {
    fn default() -> Self {
        Self::new()
    }
}

impl ShapeArray {
    pub const NO_TEXT_HOOK: i32 = -1;

    pub fn new() -> Self {
        Self {
            style_flags: 0,
            tilt: 0.0,
            angle: 0.0,
            height: 0.0,
            width: 0.0,
            flags: 0,
            match_size_length: 0.0,
            last_text_hook_index: Self::NO_TEXT_HOOK,
            curve_param: 0.0,
            profile: StepRect::default(),
            co_profile: StepRect::default(),
            steps: Vec::new(),
            hooks: Vec::new(),
            sequence_counters: BTreeMap::new(),
        }
    }

    #[inline]
    pub fn hooks(&self) -> &[Hook] {
        &self.hooks
    }

    #[inline]
    pub fn hook(&self, index: usize) -> Option<&Hook> {
        self.hooks.get(index)
    }

    #[inline]
    pub fn steps(&self) -> &[StepRect] {
        &self.steps
    }

    /// 追加 hook 并分配该目标的下一个序号。未绑定的 hook 被拒绝。
    pub fn add_hook(&mut self, mut hook: Hook) -> Result<u32, CoreError> {
        let target = hook.target().ok_or(CoreError::UnboundTarget)?;
        if !hook.is_finite() {
            return Err(CoreError::NonFinite("hook"));
        }
        let current = self.sequence_counters.get(&target).copied().unwrap_or(0);
        let next = current
            .checked_add(1)
            .ok_or(CoreError::SequenceExhausted(target))?;
        hook.sequence = current;
        self.sequence_counters.insert(target, next);
        self.hooks.push(hook);
        Ok(self.hooks[self.hooks.len() - 1].sequence)
    }

    pub fn remove_hook(&mut self, index: usize) -> Result<Hook, CoreError> {
        if index >= self.hooks.len() {
            return Err(CoreError::out_of_range("hook", index, self.hooks.len()));
        }
        let removed = self.hooks.remove(index);
        self.shift_text_hook_after_removal(index);
        Ok(removed)
    }

    /// 删除指向某目标的全部 hook，返回被删除的 hook。
    pub fn remove_hooks_to(&mut self, target: u64) -> Vec<Hook> {
        self.remove_hooks_where(|hook| hook.target() == Some(target))
    }

    /// 删除满足条件的 hook（保持其余 hook 的顺序与序号），返回被删除的 hook。
    pub fn remove_hooks_where<F>(&mut self, mut remove: F) -> Vec<Hook>
    where
        F: FnMut(&Hook) -> bool,
    {
        let mut removed = Vec::new();
        let mut index = self.hooks.len();
        while index > 0 {
            index -= 1;
            if remove(&self.hooks[index]) {
                removed.push(self.hooks.remove(index));
                self.shift_text_hook_after_removal(index);
            }
        }
        removed.reverse();
        removed
    }

    fn shift_text_hook_after_removal(&mut self, removed: usize) {
        let removed = removed as i32;
        if self.last_text_hook_index == removed {
            self.last_text_hook_index = Self::NO_TEXT_HOOK;
        } else if self.last_text_hook_index > removed {
            self.last_text_hook_index -= 1;
        }
    }

    /// 指向 `target` 的 hook（下标与引用），按序号升序，同序号按追加顺序。
    pub fn hooks_for(&self, target: u64) -> Vec<(usize, &Hook)> {
        let mut matching: Vec<(usize, &Hook)> = self
            .hooks
            .iter()
            .enumerate()
            .filter(|(_, hook)| hook.target() == Some(target))
            .collect();
        matching.sort_by_key(|(_, hook)| hook.sequence);
        matching
    }

    /// 沿连接器路径的展示偏移：首个 hook 从 `outer_gap` 开始，其后逐个累加 `gap`。
    pub fn hook_offsets(&self, target: u64) -> Vec<f64> {
        let mut offset = 0.0;
        self.hooks_for(target)
            .into_iter()
            .enumerate()
            .map(|(position, (_, hook))| {
                offset += if position == 0 { hook.outer_gap } else { hook.gap };
                offset
            })
            .collect()
    }

    /// 连接器自身移动时平移 hook 的起点（连接器一侧）。
    pub(crate) fn translate_hook_start(&mut self, index: usize, offset: Vector2) {
        if let Some(hook) = self.hooks.get_mut(index) {
            hook.start_point = hook.start_point.translate(offset);
        }
    }

    /// 目标移动时平移指向它的 hook 的终点（目标一侧）。
    pub(crate) fn translate_hook_ends(&mut self, target: u64, offset: Vector2) {
        for hook in self
            .hooks
            .iter_mut()
            .filter(|hook| hook.target() == Some(target))
        {
            hook.end_point = hook.end_point.translate(offset);
        }
    }

    pub fn targets(&self) -> BTreeSet<u64> {
        self.hooks.iter().filter_map(Hook::target).collect()
    }

    #[inline]
    pub fn text_hook(&self) -> Option<usize> {
        usize::try_from(self.last_text_hook_index).ok()
    }

    #[inline]
    pub fn last_text_hook_index(&self) -> i32 {
        self.last_text_hook_index
    }

    pub fn set_text_hook(&mut self, index: Option<usize>) -> Result<(), CoreError> {
        match index {
            None => self.last_text_hook_index = Self::NO_TEXT_HOOK,
            Some(index) if index < self.hooks.len() => self.last_text_hook_index = index as i32,
            Some(index) => return Err(CoreError::out_of_range("hook", index, self.hooks.len())),
        }
        Ok(())
    }

    pub fn push_step(&mut self, step: StepRect) -> Result<(), CoreError> {
        if !step.is_finite() {
            return Err(CoreError::NonFinite("step"));
        }
        self.steps.push(step);
        Ok(())
    }

    pub fn insert_step(&mut self, index: usize, step: StepRect) -> Result<(), CoreError> {
        if index > self.steps.len() {
            return Err(CoreError::out_of_range("step", index, self.steps.len()));
        }
        if !step.is_finite() {
            return Err(CoreError::NonFinite("step"));
        }
        self.steps.insert(index, step);
        Ok(())
    }

    pub fn set_step(&mut self, index: usize, step: StepRect) -> Result<(), CoreError> {
        let len = self.steps.len();
        if !step.is_finite() {
            return Err(CoreError::NonFinite("step"));
        }
        let slot = self
            .steps
            .get_mut(index)
            .ok_or(CoreError::out_of_range("step", index, len))?;
        *slot = step;
        Ok(())
    }

    pub fn remove_step(&mut self, index: usize) -> Result<StepRect, CoreError> {
        if index >= self.steps.len() {
            return Err(CoreError::out_of_range("step", index, self.steps.len()));
        }
        Ok(self.steps.remove(index))
    }

    /// 加载后的结构校验；同时把序号计数器补齐到已有序号之后。
    pub(crate) fn validate_loaded(&mut self) -> Result<(), CoreError> {
        if self.last_text_hook_index < Self::NO_TEXT_HOOK
            || self.last_text_hook_index >= self.hooks.len() as i32
        {
            return Err(CoreError::CorruptSnapshot(format!(
                "text hook index {} with {} hooks",
                self.last_text_hook_index,
                self.hooks.len()
            )));
        }
        if !self.hooks.iter().all(Hook::is_finite) || !self.steps.iter().all(StepRect::is_finite)
        {
            return Err(CoreError::NonFinite("shape array"));
        }
        for hook in &self.hooks {
            if let Some(target) = hook.target() {
                let after = hook.sequence.checked_add(1).ok_or_else(|| {
                    CoreError::CorruptSnapshot(format!(
                        "hook sequence {} for target {target} has no successor",
                        hook.sequence
                    ))
                })?;
                let counter = self.sequence_counters.entry(target).or_insert(0);
                *counter = (*counter).max(after);
            }
        }
        Ok(())
    }
}
