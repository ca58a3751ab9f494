use std::collections::HashMap;

use crate::scene::Scene;

#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub name: String,
    pub args: Vec<String>,
}

impl CommandRequest {
    pub fn new<I, S>(name: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
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

impl CommandBus {
    pub fn new() -> Self {
        let mut bus = Self {
            handlers: HashMap::new(),
        };
        bus.register(ZoomExtentsCommand);
        bus.register(ZoomCommand);
        bus.register(ToggleSimplifyCommand);
        bus.register(LayerVisibilityCommand);
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

    pub fn available_commands(&self) -> impl Iterator<Item = &&'static str> {
        self.handlers.keys()
    }
}

impl Default for CommandBus {
    fn default() -> Self {
        Self::new()
    }
}

struct ZoomExtentsCommand;

impl CommandHandler for ZoomExtentsCommand {
    fn name(&self) -> &'static str {
        "zoom_extents"
    }

    fn execute(
        &self,
        _request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        match context.scene.zoom_extents() {
            Ok(()) => CommandResponse::ok(format!(
                "视口已缩放到全图，比例 {:.4}",
                context.scene.viewport().scale
            )),
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
        let factor = match request.args.first().map(|arg| arg.parse::<f64>()) {
            Some(Ok(factor)) if factor.is_finite() && factor > 0.0 => factor,
            _ => return CommandResponse::err("zoom 需要一个正数倍率"),
        };
        context.scene.scale_viewport(factor);
        CommandResponse::ok(format!("当前比例 {:.4}", context.scene.viewport().scale))
    }
}

struct ToggleSimplifyCommand;

impl CommandHandler for ToggleSimplifyCommand {
    fn name(&self) -> &'static str {
        "toggle_simplify"
    }

    fn execute(
        &self,
        _request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        let enabled = context.scene.toggle_simplify();
        CommandResponse::ok(if enabled {
            "折线抽稀已开启"
        } else {
            "折线抽稀已关闭"
        })
    }
}

struct LayerVisibilityCommand;

impl CommandHandler for LayerVisibilityCommand {
    fn name(&self) -> &'static str {
        "layer_visibility"
    }

    fn execute(
        &self,
        request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        let (Some(name), Some(state)) = (request.args.first(), request.args.get(1)) else {
            return CommandResponse::err("用法: layer_visibility <图层> <on|off>");
        };
        let visible = match state.to_ascii_lowercase().as_str() {
            "on" => true,
            "off" => false,
            other => return CommandResponse::err(format!("无效的显隐状态: {other}")),
        };
        match context.scene.set_layer_visible(name, visible) {
            Ok(()) => CommandResponse::ok(format!("图层 {name} 已{}", if visible { "显示" } else { "隐藏" })),
            Err(err) => CommandResponse::err(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use planview_core::document::Document;
    use planview_core::geometry::Point2;

    use super::*;
    use crate::extract::ExtractOptions;

    fn loaded_scene() -> Scene {
        let mut document = Document::new();
        document.add_line(Point2::new(0.0, 0.0), Point2::new(100.0, 50.0), "WALLS");
        let mut scene = Scene::new();
        scene.load(document, &ExtractOptions::default());
        scene
    }

    #[test]
    fn zoom_and_zoom_extents_commands_work() {
        let mut scene = loaded_scene();
        let fitted = scene.viewport().scale;
        let bus = CommandBus::new();
        let mut context = CommandContext { scene: &mut scene };

        let response = bus.dispatch(&CommandRequest::new("zoom", ["2"]), &mut context);
        assert!(response.success);
        assert!((context.scene.viewport().scale - fitted * 2.0).abs() < 1e-9);

        let response = bus.dispatch(&CommandRequest::new("zoom", ["-1"]), &mut context);
        assert!(!response.success);

        let response = bus.dispatch(
            &CommandRequest::new("zoom_extents", Vec::<String>::new()),
            &mut context,
        );
        assert!(response.success);
        assert!((context.scene.viewport().scale - fitted).abs() < 1e-9);
    }

    #[test]
    fn toggle_and_layer_commands_update_scene() {
        let mut scene = loaded_scene();
        let bus = CommandBus::new();
        let mut context = CommandContext { scene: &mut scene };

        let response = bus.dispatch(
            &CommandRequest::new("toggle_simplify", Vec::<String>::new()),
            &mut context,
        );
        assert!(response.success);
        assert!(context.scene.simplify());

        let response = bus.dispatch(
            &CommandRequest::new("layer_visibility", ["walls", "off"]),
            &mut context,
        );
        assert!(response.success);
        assert!(!context.scene.layer("WALLS").unwrap().visible);

        let response = bus.dispatch(
            &CommandRequest::new("layer_visibility", ["missing", "on"]),
            &mut context,
        );
        assert!(!response.success);

        let response = bus.dispatch(&CommandRequest::new("explode", ["x"]), &mut context);
        assert!(!response.success);
    }
}
