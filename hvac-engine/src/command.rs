use std::collections::HashMap;

use hvac_core::geometry::Vector2;

use crate::scene::Scene;

#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub name: String,
    pub args: Vec<String>,
}

impl CommandRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(name: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// 把第 `index` 个参数解析为数值。
    fn number(&self, index: usize) -> Result<f64, CommandResponse> {
        let raw = self
            .args
            .get(index)
            .ok_or_else(|| CommandResponse::err(format!("{}: 缺少第 {} 个参数", self.name, index + 1)))?;
        raw.parse::<f64>()
            .map_err(|_| CommandResponse::err(format!("{}: 无法解析数值 `{raw}`", self.name)))
    }
}

#[derive(Debug, Clone)]
pub struct CommandResponse {
    pub success: bool,
    pub message: Option<String>,
}

impl CommandResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }
}

pub trait CommandHandler: Send + Sync {
    fn name(&self) -> &'static str;
    fn execute(
        &self,
        request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse;
}

pub struct CommandContext<'a> {
    pub scene: &'a mut Scene,
}

pub struct CommandBus {
    handlers: HashMap<&'static str, Box<dyn CommandHandler>>,
}

impl Default for CommandBus {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandBus {
    pub fn new() -> Self {
        let mut bus = Self {
            handlers: HashMap::new(),
        };
        bus.register(FocusSelectionCommand);
        bus.register(ClearSelectionCommand);
        bus.register(ZoomInCommand);
        bus.register(ZoomOutCommand);
        bus.register(ZoomCommand);
        bus.register(ScrollCommand);
        bus.register(DeleteSelectionCommand);
        bus.register(CancelEditCommand);
        bus
    }

    pub fn register<H: CommandHandler + 'static>(&mut self, handler: H) {
        self.handlers.insert(handler.name(), Box::new(handler));
    }

    pub fn dispatch(
        &self,
        request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        if let Some(handler) = self.handlers.get(request.name.as_str()) {
            handler.execute(request, context)
        } else {
            CommandResponse::err(format!("未知命令: {}", request.name))
        }
    }

    /// 已注册命令名，按字母序。
    pub fn available_commands(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.handlers.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

struct FocusSelectionCommand;

impl CommandHandler for FocusSelectionCommand {
    fn name(&self) -> &'static str {
        "focus_selection"
    }

    fn execute(
        &self,
        _request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        match context.scene.focus_on_selection() {
            Ok(()) => CommandResponse::ok("视口已聚焦当前选中图元"),
            Err(err) => CommandResponse::err(err.to_string()),
        }
    }
}

struct ClearSelectionCommand;

impl CommandHandler for ClearSelectionCommand {
    fn name(&self) -> &'static str {
        "clear_selection"
    }

    fn execute(
        &self,
        _request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        context.scene.clear_selection();
        CommandResponse::ok("选中集已清空")
    }
}

struct ZoomInCommand;

impl CommandHandler for ZoomInCommand {
    fn name(&self) -> &'static str {
        "zoom_in"
    }

    fn execute(
        &self,
        _request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        match context.scene.zoom_in() {
            Ok(scale) => CommandResponse::ok(format!("缩放: {scale:.2}")),
            Err(err) => CommandResponse::err(err.to_string()),
        }
    }
}

struct ZoomOutCommand;

impl CommandHandler for ZoomOutCommand {
    fn name(&self) -> &'static str {
        "zoom_out"
    }

    fn execute(
        &self,
        _request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        match context.scene.zoom_out() {
            Ok(scale) => CommandResponse::ok(format!("缩放: {scale:.2}")),
            Err(err) => CommandResponse::err(err.to_string()),
        }
    }
}

struct ZoomCommand;

impl CommandHandler for ZoomCommand {
    fn name(&self) -> &'static str {
        "zoom"
    }

    fn execute(
        &self,
        request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        let scale = match request.number(0) {
            Ok(value) => value,
            Err(response) => return response,
        };
        match context.scene.set_zoom(scale) {
            Ok(applied) => CommandResponse::ok(format!("缩放: {applied:.2}")),
            Err(err) => CommandResponse::err(err.to_string()),
        }
    }
}

struct ScrollCommand;

impl CommandHandler for ScrollCommand {
    fn name(&self) -> &'static str {
        "scroll"
    }

    fn execute(
        &self,
        request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        let (x, y) = match (request.number(0), request.number(1)) {
            (Ok(x), Ok(y)) => (x, y),
            (Err(response), _) | (_, Err(response)) => return response,
        };
        match context.scene.set_scroll(x, y) {
            Ok(()) => {
                let scroll: Vector2 = context.scene.doc_info().scroll();
                CommandResponse::ok(format!("滚动: ({:.1}, {:.1})", scroll.x(), scroll.y()))
            }
            Err(err) => CommandResponse::err(err.to_string()),
        }
    }
}

struct DeleteSelectionCommand;

impl CommandHandler for DeleteSelectionCommand {
    fn name(&self) -> &'static str {
        "delete_selection"
    }

    fn execute(
        &self,
        _request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        match context.scene.delete_selection() {
            Ok(count) => CommandResponse::ok(format!("已删除 {count} 个图元")),
            Err(err) => CommandResponse::err(err.to_string()),
        }
    }
}

struct CancelEditCommand;

impl CommandHandler for CancelEditCommand {
    fn name(&self) -> &'static str {
        "cancel_edit"
    }

    fn execute(
        &self,
        _request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        match context.scene.cancel_edit() {
            Ok(()) => CommandResponse::ok("编辑已取消"),
            Err(err) => CommandResponse::err(err.to_string()),
        }
    }
}
