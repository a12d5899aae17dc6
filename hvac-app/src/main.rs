use std::path::PathBuf;

use hvac_config::{AppConfig, ConfigError};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

fn main() {
    let mut args = std::env::args().skip(1);
    let mut config_override: Option<PathBuf> = None;
    let mut save_path: Option<PathBuf> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let Some(path) = args.next() else {
                    eprintln!("`--config` 需要提供配置文件路径");
                    std::process::exit(1);
                };
                config_override = Some(PathBuf::from(path));
            }
            "--save" => {
                let Some(path) = args.next() else {
                    eprintln!("`--save` 需要提供输出文件路径");
                    std::process::exit(1);
                };
                save_path = Some(PathBuf::from(path));
            }
            other => {
                eprintln!("未知参数：{other}");
                std::process::exit(1);
            }
        }
    }

    let config = load_configuration(config_override);
    init_logging(&config);
    info!("启动 HVAC 绘图应用");

    let scene = match hvac_frontend::run_cli_demo(&config) {
        Ok(scene) => scene,
        Err(err) => {
            error!(error = %err, "执行 CLI 演示失败");
            std::process::exit(1);
        }
    };

    if let Some(path) = save_path {
        if let Err(err) = hvac_frontend::save_scene(&scene, &path) {
            error!(path = %path.display(), error = %err, "保存图纸失败");
            std::process::exit(1);
        }
    } else {
        match hvac_frontend::save_scene_to_store(&scene, &config.storage) {
            Ok(_) => {}
            Err(err) => warn!(error = %err, "写入本地存储失败"),
        }
    }
}

fn load_configuration(override_path: Option<PathBuf>) -> AppConfig {
    match override_path {
        Some(path) => AppConfig::from_file(&path).unwrap_or_else(|err| {
            warn!(path = %path.display(), error = %err, "加载指定配置失败，使用默认配置");
            AppConfig::default()
        }),
        None => match AppConfig::discover() {
            Ok(cfg) => cfg,
            Err(err) => {
                match &err {
                    ConfigError::Io { path, .. } | ConfigError::Parse { path, .. } => {
                        warn!(path = %path.display(), error = %err, "加载默认配置失败，使用内建默认值");
                    }
                    ConfigError::Context { .. } | ConfigError::Invalid { .. } => {
                        warn!(error = %err, "加载默认配置失败，使用内建默认值");
                    }
                }
                AppConfig::default()
            }
        },
    }
}

fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_new(config.logging.level.clone()).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(filter);
    if subscriber.try_init().is_err() {
        // 已初始化，忽略
    }
}
