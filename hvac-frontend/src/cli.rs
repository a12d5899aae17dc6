use hvac_config::AppConfig;
use hvac_core::document::{Document, ShapeKind};
use hvac_core::geometry::{BoundingBox, Point2};
use hvac_core::hooks::LinkFlags;
use hvac_core::transform::DocInfo;
use hvac_engine::command::{CommandBus, CommandContext, CommandRequest};
use hvac_engine::scene::Scene;
use tracing::{debug, info, warn};

use crate::errors::FrontendError;
use crate::loader::{DocumentSource, load_scene_from_env_or_demo};

/// 简易 CLI 演示：尝试加载图纸，若失败则回退到内置示例，打印场景概览并返回场景。
pub fn run_demo(config: &AppConfig) -> Result<Scene, FrontendError> {
    let loaded = load_scene_from_env_or_demo(config)?;
    let mut scene = loaded.scene;
    let subscription = scene
        .bus_mut()
        .subscribe(|event| debug!(?event, "界面状态变化"));

    let command_bus = CommandBus::new();
    {
        let mut context = CommandContext { scene: &mut scene };
        for (name, args) in [("focus_selection", Vec::new()), ("zoom_in", Vec::new())] {
            if let Err(err) = dispatch_cli_command(&command_bus, name, args, &mut context) {
                warn!("CLI 命令执行失败: {err}");
            }
        }
    }
    println!("支持的命令: {}", command_bus.available_commands().join(", "));

    let document = scene.document();
    info!(
        layer_count = document.layers().len(),
        shape_count = document.len(),
        link_count = document.links().len(),
        "CLI 演示文档统计"
    );

    println!("Rust 版 HVAC 绘图 CLI 演示");
    match &loaded.source {
        DocumentSource::File(path) => println!("已从 JSON 加载图纸：{}", path.display()),
        DocumentSource::Store { root, key } => {
            println!("已从本地存储加载图纸：{} / {key}", root.display())
        }
        DocumentSource::Demo => {
            if let Some(ids) = &loaded.demo_shapes {
                println!("已构建内置示例图元：");
                println!("  - 房间 ID = {}", ids.room.get());
                println!("  - 空调机组 ID = {}", ids.air_handler.get());
                println!("  - 温度传感器 ID = {}", ids.sensor.get());
                println!("  - 送风管 ID = {}", ids.supply_duct.get());
                println!("  - 回风管 ID = {}", ids.return_duct.get());
                println!("  - 气流箭头 ID = {}", ids.airflow_arrow.get());
            }
        }
    }

    let selection: Vec<String> = scene.selection().iter().map(|id| id.get().to_string()).collect();
    if selection.is_empty() {
        println!("当前尚未选中任何图元。");
    } else {
        println!("选中集包含图元 ID：{}", selection.join(", "));
    }

    print_view(scene.doc_info());
    print_layers(document);
    print_shapes(document);
    print_links(document);

    let center = scene.doc_info().screen_region().center();
    let hit = scene.right_click(center, 4.0);
    match hit.shape {
        Some(id) => println!(
            "右键 {} 命中图元 #{id}（图层 {:?}，线段 {:?}），文档坐标 {}",
            format_point(hit.screen_point),
            hit.layer_index,
            hit.segment_index,
            format_point(hit.document_point)
        ),
        None => println!(
            "右键 {} 未命中图元，文档坐标 {}",
            format_point(hit.screen_point),
            format_point(hit.document_point)
        ),
    }

    scene.bus_mut().unsubscribe(subscription);
    Ok(scene)
}

fn print_view(info: &DocInfo) {
    let scroll = info.scroll();
    let max_scroll = info.max_scroll();
    println!(
        "视口：缩放={:.3}, 文档到屏幕比例={:.3}, 滚动=({:.1}, {:.1}) / 最大=({:.1}, {:.1})",
        info.document_scale(),
        info.doc_to_screen_scale(),
        scroll.x(),
        scroll.y(),
        max_scroll.x(),
        max_scroll.y()
    );
    println!("  可见文档区域 {}", format_box(info.visible_doc_region()));
}

fn print_layers(document: &Document) {
    let layers = document.layers();
    println!("当前图层（活动图层索引 {}）：", layers.active_layer_index());
    for (index, layer) in layers.layers().iter().enumerate() {
        println!(
            "  - [{index}] {} (可见: {}, 可添加: {}, 图元数: {})",
            layer.name,
            if layer.is_visible() { "是" } else { "否" },
            if layer.accepts_new_shapes() { "是" } else { "否" },
            layer.z_list.len()
        );
    }
}

fn print_shapes(document: &Document) {
    println!("当前图元：");
    for (id, shape) in document.shapes() {
        let detail = match &shape.kind {
            ShapeKind::Polygon(polygon) => format!(
                "顶点数={}, 闭合={}",
                polygon.point_count(),
                if polygon.is_closed() { "是" } else { "否" }
            ),
            ShapeKind::Connector { route, .. } => {
                let coords: Vec<String> = route.points().iter().copied().map(format_point).collect();
                format!("走线={}", coords.join(" -> "))
            }
            ShapeKind::Line { start, end } => {
                format!("{} -> {}", format_point(*start), format_point(*end))
            }
            ShapeKind::Symbol { frame, label } => format!("\"{label}\" {}", format_box(*frame)),
        };
        println!(
            "  - {} {id} \"{}\" 外框={} {detail}",
            shape.kind.label(),
            shape.name,
            format_box(shape.bounds())
        );
        if let Some(array) = shape.array() {
            for (index, hook) in array.hooks().iter().enumerate() {
                match hook.target() {
                    Some(target) => println!(
                        "      hook[{index}] -> #{target}, 序号={}, 间隙={:.1}/{:.1}, 起点={}",
                        hook.sequence,
                        hook.gap,
                        hook.outer_gap,
                        format_point(hook.start_point)
                    ),
                    None => println!("      hook[{index}] 未绑定"),
                }
            }
        }
    }
}

fn print_links(document: &Document) {
    if document.links().is_empty() {
        return;
    }
    println!("链接表：");
    for link in document.links().iter() {
        let moved = if link.has_flag(LinkFlags::MOVE) { " (已移动)" } else { "" };
        println!("  - 目标 #{} <- 挂接方 #{}{moved}", link.target_id, link.hook_id);
    }
}

fn dispatch_cli_command(
    bus: &CommandBus,
    name: &str,
    args: Vec<String>,
    context: &mut CommandContext<'_>,
) -> Result<(), String> {
    let request = CommandRequest {
        name: name.to_string(),
        args,
    };
    let response = bus.dispatch(&request, context);
    if response.success {
        if let Some(message) = response.message {
            println!("[命令] {message}");
        }
        Ok(())
    } else {
        Err(response.message.unwrap_or_else(|| "未知错误".to_string()))
    }
}

fn format_point(point: Point2) -> String {
    format!("({:.2}, {:.2})", point.x(), point.y())
}

fn format_box(rect: BoundingBox) -> String {
    if rect.is_initialized() {
        format!(
            "[{:.1}, {:.1}, {:.1}×{:.1}]",
            rect.x, rect.y, rect.width, rect.height
        )
    } else {
        "<未初始化>".to_string()
    }
}
