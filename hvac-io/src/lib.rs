use std::fs;
use std::path::{Path, PathBuf};

use hvac_core::{
    document::{Document, LoadReport},
    transform::DocInfo,
};
use serde::{Deserialize, Serialize};
use serde_json::error::Category;
use thiserror::Error;

pub use store::{FileStore, KeyValueStore, MemoryStore};

/// 当前写出的图纸格式版本。
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum IoError {
    #[error("failed to read file {path:?}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write file {path:?}: {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed JSON in {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid document structure: {0}")]
    InvalidDocument(String),
    #[error("unsupported drawing version {found} (supported up to {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },
    #[error("invalid store key `{0}`")]
    InvalidKey(String),
    #[error("store key `{key}` not found")]
    MissingKey { key: String },
}

/// 磁盘上的图纸：文档加视口状态。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawingFile {
    pub version: u32,
    pub document: Document,
    pub view: DocInfo,
}

impl DrawingFile {
    pub fn new(document: Document, view: DocInfo) -> Self {
        Self {
            version: FORMAT_VERSION,
            document,
            view,
        }
    }
}

/// 加载结果；`report` 记录被丢弃与补回的引用。
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedDrawing {
    pub drawing: DrawingFile,
    pub report: LoadReport,
}

pub trait DocumentLoader {
    fn load(&self, path: &Path) -> Result<LoadedDrawing, IoError>;
}

pub trait DocumentSaver {
    fn save(&self, drawing: &DrawingFile, path: &Path) -> Result<(), IoError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct JsonFacade {
    pretty: bool,
}

impl JsonFacade {
    pub fn new() -> Self {
        Self { pretty: true }
    }

    /// 紧凑输出，供键值存储使用。
    pub fn compact() -> Self {
        Self { pretty: false }
    }

    /// 解析图纸字节并修复悬空引用。结构性损坏（段数不符、活动图层越界、
    /// 非有限数值）直接拒绝。
    pub fn decode(&self, bytes: &[u8], context: &str) -> Result<LoadedDrawing, IoError> {
        let mut drawing: DrawingFile =
            serde_json::from_slice(bytes).map_err(|source| match source.classify() {
                Category::Data => IoError::InvalidDocument(source.to_string()),
                _ => IoError::Json {
                    context: context.to_string(),
                    source,
                },
            })?;
        if drawing.version > FORMAT_VERSION {
            return Err(IoError::UnsupportedVersion {
                found: drawing.version,
                supported: FORMAT_VERSION,
            });
        }
        let report = drawing.document.repair_references();
        Ok(LoadedDrawing { drawing, report })
    }

    pub fn encode(&self, drawing: &DrawingFile, context: &str) -> Result<Vec<u8>, IoError> {
        let result = if self.pretty {
            serde_json::to_vec_pretty(drawing)
        } else {
            serde_json::to_vec(drawing)
        };
        result.map_err(|source| IoError::Json {
            context: context.to_string(),
            source,
        })
    }

    pub fn load_from_store(
        &self,
        store: &dyn KeyValueStore,
        key: &str,
    ) -> Result<LoadedDrawing, IoError> {
        let bytes = store.get(key)?.ok_or_else(|| IoError::MissingKey {
            key: key.to_string(),
        })?;
        self.decode(&bytes, key)
    }

    pub fn save_to_store(
        &self,
        store: &mut dyn KeyValueStore,
        key: &str,
        drawing: &DrawingFile,
    ) -> Result<(), IoError> {
        let bytes = self.encode(drawing, key)?;
        store.set(key, &bytes)
    }
}

impl DocumentLoader for JsonFacade {
    fn load(&self, path: &Path) -> Result<LoadedDrawing, IoError> {
        let data = fs::read(path).map_err(|source| IoError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        self.decode(&data, &path.display().to_string())
    }
}

impl DocumentSaver for JsonFacade {
    fn save(&self, drawing: &DrawingFile, path: &Path) -> Result<(), IoError> {
        let bytes = self.encode(drawing, &path.display().to_string())?;
        fs::write(path, bytes).map_err(|source| IoError::WriteError {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// 本地键值存储；值是不透明字节。
pub mod store {
    use std::collections::BTreeMap;
    use std::fs;
    use std::io::ErrorKind;
    use std::path::{Path, PathBuf};

    use crate::IoError;

    const BLOB_EXTENSION: &str = "blob";

    pub trait KeyValueStore {
        fn get(&self, key: &str) -> Result<Option<Vec<u8>>, IoError>;
        fn set(&mut self, key: &str, value: &[u8]) -> Result<(), IoError>;
        /// 返回键是否存在。
        fn remove(&mut self, key: &str) -> Result<bool, IoError>;
        /// 全部键，按字典序。
        fn keys(&self) -> Result<Vec<String>, IoError>;
    }

    /// 键只允许 `[A-Za-z0-9_-]`，避免路径穿越。
    pub fn validate_key(key: &str) -> Result<(), IoError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if valid {
            Ok(())
        } else {
            Err(IoError::InvalidKey(key.to_string()))
        }
    }

    /// 每个键一个文件：`<root>/<key>.blob`。
    #[derive(Debug, Clone)]
    pub struct FileStore {
        root: PathBuf,
    }

    impl FileStore {
        pub fn open(root: impl Into<PathBuf>) -> Result<Self, IoError> {
            let root = root.into();
            fs::create_dir_all(&root).map_err(|source| IoError::WriteError {
                path: root.clone(),
                source,
            })?;
            Ok(Self { root })
        }

        #[inline]
        pub fn root(&self) -> &Path {
            &self.root
        }

        fn path_for(&self, key: &str) -> Result<PathBuf, IoError> {
            validate_key(key)?;
            Ok(self.root.join(format!("{key}.{BLOB_EXTENSION}")))
        }
    }

    impl KeyValueStore for FileStore {
        fn get(&self, key: &str) -> Result<Option<Vec<u8>>, IoError> {
            let path = self.path_for(key)?;
            match fs::read(&path) {
                Ok(bytes) => Ok(Some(bytes)),
                Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
                Err(source) => Err(IoError::ReadError { path, source }),
            }
        }

        fn set(&mut self, key: &str, value: &[u8]) -> Result<(), IoError> {
            let path = self.path_for(key)?;
            // 先写临时文件再改名，读者不会看到半截数据
            let staging = self.root.join(format!(".{key}.tmp"));
            fs::write(&staging, value).map_err(|source| IoError::WriteError {
                path: staging.clone(),
                source,
            })?;
            fs::rename(&staging, &path).map_err(|source| IoError::WriteError { path, source })
        }

        fn remove(&mut self, key: &str) -> Result<bool, IoError> {
            let path = self.path_for(key)?;
            match fs::remove_file(&path) {
                Ok(()) => Ok(true),
                Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
                Err(source) => Err(IoError::WriteError { path, source }),
            }
        }

        fn keys(&self) -> Result<Vec<String>, IoError> {
            let entries = fs::read_dir(&self.root).map_err(|source| IoError::ReadError {
                path: self.root.clone(),
                source,
            })?;
            let mut keys = Vec::new();
            for entry in entries {
                let entry = entry.map_err(|source| IoError::ReadError {
                    path: self.root.clone(),
                    source,
                })?;
                let path = entry.path();
                if path.extension().and_then(|ext| ext.to_str()) != Some(BLOB_EXTENSION) {
                    continue;
                }
                if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                    if validate_key(stem).is_ok() {
                        keys.push(stem.to_string());
                    }
                }
            }
            keys.sort();
            Ok(keys)
        }
    }

    #[derive(Debug, Default, Clone)]
    pub struct MemoryStore {
        entries: BTreeMap<String, Vec<u8>>,
    }

    impl MemoryStore {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl KeyValueStore for MemoryStore {
        fn get(&self, key: &str) -> Result<Option<Vec<u8>>, IoError> {
            validate_key(key)?;
            Ok(self.entries.get(key).cloned())
        }

        fn set(&mut self, key: &str, value: &[u8]) -> Result<(), IoError> {
            validate_key(key)?;
            self.entries.insert(key.to_string(), value.to_vec());
            Ok(())
        }

        fn remove(&mut self, key: &str) -> Result<bool, IoError> {
            validate_key(key)?;
            Ok(self.entries.remove(key).is_some())
        }

        fn keys(&self) -> Result<Vec<String>, IoError> {
            Ok(self.entries.keys().cloned().collect())
        }
    }

}
