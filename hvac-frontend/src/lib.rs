pub mod cli;
pub mod errors;
pub mod loader;

use std::path::Path;

use errors::FrontendError;
use hvac_config::{AppConfig, StorageConfig};
use hvac_engine::scene::Scene;
use hvac_io::{DocumentSaver, DrawingFile, FileStore, JsonFacade};
use tracing::info;

/// 启动 CLI 演示，返回演示结束时的场景。
pub fn run_cli_demo(config: &AppConfig) -> Result<Scene, FrontendError> {
    info!("启动 CLI 演示前端");
    cli::run_demo(config)
}

fn drawing_of(scene: &Scene) -> DrawingFile {
    DrawingFile::new(scene.document().clone(), *scene.doc_info())
}

/// 把场景写成 JSON 图纸文件。
pub fn save_scene(scene: &Scene, path: &Path) -> Result<(), FrontendError> {
    JsonFacade::new().save(&drawing_of(scene), path)?;
    info!(path = %path.display(), shapes = scene.document().len(), "图纸已保存");
    Ok(())
}

/// 写入本地键值存储；未配置存储根目录时返回 `false`。
pub fn save_scene_to_store(scene: &Scene, storage: &StorageConfig) -> Result<bool, FrontendError> {
    let Some(root) = &storage.root else {
        return Ok(false);
    };
    let mut store = FileStore::open(root)?;
    JsonFacade::compact().save_to_store(&mut store, &storage.drawing_key, &drawing_of(scene))?;
    info!(root = %root.display(), key = %storage.drawing_key, "图纸已写入本地存储");
    Ok(true)
}
