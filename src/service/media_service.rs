//! 媒体上传：对象存储的 put-object 封装
//!
//! local 使用 opendal Fs，s3 使用 opendal S3（兼容 MinIO）。

use async_trait::async_trait;
use dashmap::DashMap;
use opendal::Operator;
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::config::MediaConfig;
use crate::error::{Result, ServerError};
use crate::model::user::AuthenticatedUser;

/// 单个媒体文件上限
pub const MAX_MEDIA_BYTES: usize = 20 * 1024 * 1024;

/// 对象存储接口
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// 写入对象，返回对外可访问的 URL
    async fn put_object(&self, key: &str, data: Vec<u8>, content_type: Option<&str>) -> Result<String>;

    fn backend(&self) -> &'static str;
}

fn join_url(base_url: &str, key: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), key.trim_start_matches('/'))
}

fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ServerError::Configuration(format!("S3 媒体存储缺少 {}", name)))
}

/// opendal 对象存储
pub struct OpendalMediaStore {
    op: Operator,
    base_url: String,
    backend: &'static str,
}

impl OpendalMediaStore {
    pub fn new(op: Operator, base_url: impl Into<String>, backend: &'static str) -> Self {
        Self {
            op,
            base_url: base_url.into(),
            backend,
        }
    }

    /// 按配置构建 Operator
    pub async fn from_config(config: &MediaConfig) -> Result<Self> {
        match config.storage_type.as_str() {
            "local" => {
                let root = config.root.trim();
                if root.is_empty() {
                    return Err(ServerError::Configuration("local 媒体存储缺少 root".to_string()));
                }
                let root_path = Path::new(root);
                if !root_path.exists() {
                    tokio::fs::create_dir_all(root_path).await.map_err(|e| {
                        ServerError::Configuration(format!("创建媒体目录失败 \"{}\": {}", root, e))
                    })?;
                }
                let abs_root = tokio::fs::canonicalize(root_path)
                    .await
                    .map_err(|e| ServerError::Configuration(format!("无法解析媒体目录 \"{}\": {}", root, e)))?
                    .to_string_lossy()
                    .to_string();

                let builder = opendal::services::Fs::default().root(&abs_root);
                let op = Operator::new(builder)?.finish();
                info!("✅ 媒体存储: local ({})", abs_root);
                Ok(Self::new(op, config.base_url.clone(), "local"))
            }
            "s3" => {
                let endpoint = required(&config.endpoint, "endpoint")?;
                let bucket = required(&config.bucket, "bucket")?;
                let access_key_id = required(&config.access_key_id, "access_key_id")?;
                let secret_access_key = required(&config.secret_access_key, "secret_access_key")?;
                let region = config.region.as_deref().unwrap_or("auto");

                let builder = opendal::services::S3::default()
                    .bucket(bucket)
                    .endpoint(endpoint)
                    .region(region)
                    .access_key_id(access_key_id)
                    .secret_access_key(secret_access_key);
                let op = Operator::new(builder)?.finish();
                info!("✅ 媒体存储: s3 (endpoint={}, bucket={})", endpoint, bucket);
                Ok(Self::new(op, config.base_url.clone(), "s3"))
            }
            other => Err(ServerError::Configuration(format!(
                "不支持的媒体存储类型: {}（可选 local / s3）",
                other
            ))),
        }
    }
}

#[async_trait]
impl MediaStore for OpendalMediaStore {
    async fn put_object(&self, key: &str, data: Vec<u8>, content_type: Option<&str>) -> Result<String> {
        match content_type {
            Some(ct) if self.backend == "s3" => {
                self.op.write_with(key, data).content_type(ct).await?;
            }
            _ => {
                self.op.write(key, data).await?;
            }
        }
        Ok(join_url(&self.base_url, key))
    }

    fn backend(&self) -> &'static str {
        self.backend
    }
}

/// 内存对象存储（开发模式与测试）
pub struct MemoryMediaStore {
    objects: DashMap<String, (Vec<u8>, Option<String>)>,
    base_url: String,
}

impl MemoryMediaStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            objects: DashMap::new(),
            base_url: base_url.into(),
        }
    }

    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.get(key).map(|o| o.0.clone())
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[async_trait]
impl MediaStore for MemoryMediaStore {
    async fn put_object(&self, key: &str, data: Vec<u8>, content_type: Option<&str>) -> Result<String> {
        self.objects
            .insert(key.to_string(), (data, content_type.map(str::to_string)));
        Ok(join_url(&self.base_url, key))
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

/// 上传结果
#[derive(Debug, Clone, serde::Serialize)]
pub struct UploadedMedia {
    pub key: String,
    pub media_url: String,
    pub size: usize,
}

/// 媒体上传服务
pub struct MediaService {
    store: Arc<dyn MediaStore>,
    max_bytes: usize,
}

impl MediaService {
    pub fn new(store: Arc<dyn MediaStore>) -> Self {
        Self {
            store,
            max_bytes: MAX_MEDIA_BYTES,
        }
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// 对象 key：`media/{uuid}{ext}`，扩展名取自原文件名
    pub fn object_key(filename: Option<&str>) -> String {
        let ext = filename
            .and_then(|name| Path::new(name).extension())
            .and_then(|e| e.to_str())
            .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
            .map(|e| format!(".{}", e.to_ascii_lowercase()))
            .unwrap_or_default();
        format!("media/{}{}", Uuid::new_v4(), ext)
    }

    pub async fn upload(
        &self,
        user: &AuthenticatedUser,
        filename: Option<&str>,
        content_type: Option<&str>,
        data: Vec<u8>,
    ) -> Result<UploadedMedia> {
        if data.is_empty() {
            return Err(ServerError::Validation("File is empty".to_string()));
        }
        if data.len() > self.max_bytes {
            return Err(ServerError::Validation(format!(
                "File too large (max {} bytes)",
                self.max_bytes
            )));
        }

        let key = Self::object_key(filename);
        let size = data.len();
        let media_url = self.store.put_object(&key, data, content_type).await?;
        info!(
            "📤 媒体已上传: user={}, key={}, size={}, backend={}",
            user.username,
            key,
            size,
            self.store.backend()
        );

        Ok(UploadedMedia { key, media_url, size })
    }
}
