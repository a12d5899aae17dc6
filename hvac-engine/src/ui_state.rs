use std::fmt;

/// 场景状态变化通知。
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    ZoomChanged { scale: f64 },
    ScrollChanged { x: f64, y: f64 },
    SelectionChanged { count: usize },
    ActiveLayerChanged { index: i64 },
    DocumentReplaced,
    EditCommitted,
    EditCancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    #[inline]
    pub fn get(self) -> u64 {
        self.0
    }
}

type Listener = Box<dyn FnMut(&UiEvent) + Send>;

/// 显式生命周期的事件总线，由场景持有并随场景销毁。
#[derive(Default)]
pub struct UiStateBus {
    listeners: Vec<(SubscriptionId, Listener)>,
    next_id: u64,
}

impl fmt::Debug for UiStateBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UiStateBus")
            .field("listeners", &self.listeners.len())
            .field("next_id", &self.next_id)
            .finish()
    }
}

impl UiStateBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: FnMut(&UiEvent) + Send + 'static,
    {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// 取消订阅，返回订阅是否存在。
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(existing, _)| *existing != id);
        self.listeners.len() != before
    }

    /// 按订阅顺序依次通知。
    pub fn notify(&mut self, event: &UiEvent) {
        for (_, listener) in &mut self.listeners {
            listener(event);
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// 关闭总线，移除全部订阅。
    pub fn shutdown(&mut self) {
        self.listeners.clear();
    }
}
