use std::env;
use std::path::{Path, PathBuf};

use hvac_config::{AppConfig, ViewportConfig};
use hvac_core::geometry::Size2;
use hvac_core::transform::{DocInfo, ZoomLimits};
use hvac_engine::scene::{DemoShapes, Scene};
use hvac_io::{DocumentLoader, FileStore, IoError, JsonFacade, KeyValueStore, LoadedDrawing};
use tracing::{info, warn};

use crate::errors::FrontendError;

/// 指定示例图纸路径的环境变量。
pub const SAMPLE_DRAWING_ENV: &str = "HVAC_CLI_SAMPLE_DRAWING";

/// 文档来源，便于前端呈现加载信息。
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentSource {
    File(PathBuf),
    Store { root: PathBuf, key: String },
    Demo,
}

/// 统一封装加载后的场景与元信息。
#[derive(Debug)]
pub struct LoadedScene {
    pub scene: Scene,
    pub source: DocumentSource,
    pub demo_shapes: Option<DemoShapes>,
}

/// 把视口配置转换为缩放范围与文档变换。
pub fn view_from_config(viewport: &ViewportConfig) -> Result<DocInfo, FrontendError> {
    let limits = ZoomLimits::new(viewport.min_zoom, viewport.max_zoom, viewport.zoom_step)?;
    let info = DocInfo::new(
        Size2::new(viewport.display_width, viewport.display_height),
        Size2::new(viewport.document_width, viewport.document_height),
    )?
    .with_limits(limits)?
    .with_dpi(viewport.display_dpi, viewport.document_dpi)?;
    Ok(info)
}

/// 从环境变量 `HVAC_CLI_SAMPLE_DRAWING` 指定的路径加载图纸，
/// 其次尝试本地存储，最后回退到内置示例。
pub fn load_scene_from_env_or_demo(config: &AppConfig) -> Result<LoadedScene, FrontendError> {
    load_scene(config, env::var_os(SAMPLE_DRAWING_ENV).map(PathBuf::from))
}

pub fn load_scene(
    config: &AppConfig,
    sample: Option<PathBuf>,
) -> Result<LoadedScene, FrontendError> {
    if let Some(path) = sample {
        match JsonFacade::new().load(&path) {
            Ok(loaded) => {
                info!(path = %path.display(), "从 JSON 加载图纸成功");
                return Ok(into_scene(loaded, DocumentSource::File(path)));
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "加载图纸失败，回退到内置示例");
            }
        }
    }

    if let Some(root) = &config.storage.root {
        match load_from_store(root, &config.storage.drawing_key) {
            Ok(Some(loaded)) => {
                info!(root = %root.display(), key = %config.storage.drawing_key, "从本地存储加载图纸");
                let source = DocumentSource::Store {
                    root: root.clone(),
                    key: config.storage.drawing_key.clone(),
                };
                return Ok(into_scene(loaded, source));
            }
            Ok(None) => {}
            Err(err) => {
                warn!(root = %root.display(), error = %err, "读取本地存储失败，回退到内置示例");
            }
        }
    }

    let mut scene = Scene::with_view(view_from_config(&config.viewport)?);
    let demo_shapes = scene.populate_demo()?;
    scene.select(demo_shapes.air_handler)?;
    scene.select(demo_shapes.sensor)?;
    scene.focus_on_selection()?;

    Ok(LoadedScene {
        scene,
        source: DocumentSource::Demo,
        demo_shapes: Some(demo_shapes),
    })
}

fn load_from_store(root: &Path, key: &str) -> Result<Option<LoadedDrawing>, IoError> {
    let store = FileStore::open(root)?;
    if store.get(key)?.is_none() {
        return Ok(None);
    }
    JsonFacade::compact().load_from_store(&store, key).map(Some)
}

fn into_scene(loaded: LoadedDrawing, source: DocumentSource) -> LoadedScene {
    let report = loaded.report;
    if !report.is_clean() {
        warn!(
            adopted_shapes = report.adopted_shapes,
            dropped_shapes = report.dropped_shapes,
            dropped_hooks = report.dropped_hooks,
            dropped_links = report.dropped_links,
            dropped_z_entries = report.dropped_z_entries,
            restored_links = report.restored_links,
            "图纸含悬空引用，已修复"
        );
    }
    LoadedScene {
        scene: Scene::with_document(loaded.drawing.document, loaded.drawing.view),
        source,
        demo_shapes: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{save_scene, save_scene_to_store};

    #[test]
    fn viewport_config_maps_to_doc_info() {
        let viewport = ViewportConfig {
            max_zoom: 8.0,
            display_dpi: 192.0,
            ..ViewportConfig::default()
        };
        let info = view_from_config(&viewport).expect("view");
        assert!((info.limits().max - 8.0).abs() < 1e-9);
        assert!((info.display_dpi() - 192.0).abs() < 1e-9);
        assert_eq!(info.document_size(), Size2::new(2400.0, 1600.0));

        let broken = ViewportConfig {
            min_zoom: 0.0,
            ..ViewportConfig::default()
        };
        assert!(view_from_config(&broken).is_err());
    }

    #[test]
    fn missing_sample_falls_back_to_demo() {
        let config = AppConfig::default();
        let loaded = load_scene(&config, Some(PathBuf::from("/nonexistent/drawing.json")))
            .expect("demo fallback");
        assert_eq!(loaded.source, DocumentSource::Demo);
        let ids = loaded.demo_shapes.expect("demo ids");
        assert_eq!(loaded.scene.selection(), vec![ids.air_handler, ids.sensor]);
    }

    #[test]
    fn saved_drawing_is_loaded_from_file_and_store() {
        let config = AppConfig::default();
        let demo = load_scene(&config, None).expect("demo");
        let dir = tempfile::tempdir().expect("temp dir");

        let path = dir.path().join("demo.json");
        save_scene(&demo.scene, &path).expect("save");
        let loaded = load_scene(&config, Some(path.clone())).expect("load file");
        assert_eq!(loaded.source, DocumentSource::File(path));
        assert_eq!(loaded.scene.document(), demo.scene.document());
        assert!(loaded.demo_shapes.is_none());

        let mut config = AppConfig::default();
        config.storage.root = Some(dir.path().join("store"));
        assert!(save_scene_to_store(&demo.scene, &config.storage).expect("store"));
        let loaded = load_scene(&config, None).expect("load store");
        assert!(matches!(loaded.source, DocumentSource::Store { .. }));
        assert_eq!(loaded.scene.doc_info(), demo.scene.doc_info());
    }
}
