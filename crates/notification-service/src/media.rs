//! 媒体引用解析
//!
//! 把调用方给出的媒体引用转换为网关可以直接访问的 URL：
//!
//! - `data:` 与 `http(s)` 地址原样使用
//! - 不带协议且包含 `pocketbase` 的引用拼接到 `{store}/api/files/`
//! - `record/file` 使用默认集合，`collection/record/file` 直接拼接
//! - 以 `/` 开头的路径相对店铺前台地址解析
//! - 本地图片（`/…` 或 `localhost`）在不超过大小上限时内联为 base64 `data:` URL，
//!   内联失败时退回解析后的地址

use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use crm_shared::config::{NotificationConfig, PocketBaseConfig};
use tracing::{debug, warn};

use crate::error::NotificationError;

const INLINE_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
    Document,
}

impl MediaKind {
    fn label(&self) -> &'static str {
        match self {
            Self::Image => "Image",
            Self::Video => "Video",
            Self::Document => "Document",
        }
    }

    fn noun(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Document => "document",
        }
    }
}

impl std::str::FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "image" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            "document" => Ok(Self::Document),
            other => Err(format!("未知的媒体类型: {other}")),
        }
    }
}

pub struct MediaResolver {
    http: reqwest::Client,
    store_url: String,
    default_collection: Option<String>,
    storefront_url: String,
    inline_max_bytes: usize,
}

impl MediaResolver {
    pub fn new(
        http: reqwest::Client,
        pocketbase: &PocketBaseConfig,
        notification: &NotificationConfig,
    ) -> Self {
        Self {
            http,
            store_url: pocketbase.url.trim_end_matches('/').to_string(),
            default_collection: pocketbase.default_file_collection.clone(),
            storefront_url: notification.storefront_url.trim_end_matches('/').to_string(),
            inline_max_bytes: notification.media_inline_max_bytes,
        }
    }

    /// 解析媒体引用，结果一定以 `http` 或 `data:` 开头
    pub async fn resolve(&self, kind: MediaKind, reference: &str) -> Result<String, NotificationError> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(NotificationError::validation(format!(
                "{} URL is required",
                kind.label()
            )));
        }

        let resolved = if reference.starts_with("data:") {
            reference.to_string()
        } else if kind == MediaKind::Image && is_local(reference) {
            let absolute = self.absolutize(kind, reference);
            match self.inline(&absolute).await {
                Ok(data_url) => {
                    debug!(reference, "本地图片已内联为 data URL");
                    data_url
                }
                Err(e) => {
                    warn!(reference, error = %e, "本地图片内联失败，改用原地址");
                    absolute
                }
            }
        } else {
            self.absolutize(kind, reference)
        };

        if resolved.starts_with("http") || resolved.starts_with("data:") {
            Ok(resolved)
        } else {
            warn!(reference, "媒体地址无法解析为完整 URL");
            Err(NotificationError::validation(format!(
                "Invalid {} URL format. URL must be a complete URL starting with http:// or https://",
                kind.noun()
            )))
        }
    }

    fn absolutize(&self, kind: MediaKind, reference: &str) -> String {
        if reference.starts_with("http") {
            return reference.to_string();
        }
        // 视频与文档：提到 pocketbase 的引用即使以 `/` 开头也指向存储
        if kind != MediaKind::Image && reference.contains("pocketbase") {
            return self.store_file(reference);
        }
        if reference.starts_with('/') {
            return format!("{}{}", self.storefront_url, reference);
        }
        if reference.contains("pocketbase") {
            return self.store_file(reference);
        }

        match reference.split('/').count() {
            2 => match &self.default_collection {
                Some(collection) => format!("{}/api/files/{}/{}", self.store_url, collection, reference),
                None => reference.to_string(),
            },
            n if n >= 3 => format!("{}/api/files/{}", self.store_url, reference),
            _ => reference.to_string(),
        }
    }

    fn store_file(&self, reference: &str) -> String {
        format!("{}/api/files/{}", self.store_url, reference.trim_start_matches('/'))
    }

    async fn inline(&self, url: &str) -> Result<String, NotificationError> {
        let mut response = self
            .http
            .get(url)
            .timeout(INLINE_FETCH_TIMEOUT)
            .send()
            .await
            .map_err(|e| NotificationError::Media(format!("获取图片失败: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotificationError::Media(format!("获取图片失败: status={status}")));
        }
        if response
            .content_length()
            .is_some_and(|len| len as usize > self.inline_max_bytes)
        {
            return Err(NotificationError::Media("图片超过内联大小上限".to_string()));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/jpeg")
            .to_string();

        // 分块读取，没有 Content-Length 时也不会缓冲超过上限的内容
        let mut bytes = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| NotificationError::Media(format!("读取图片失败: {e}")))?
        {
            if bytes.len() + chunk.len() > self.inline_max_bytes {
                return Err(NotificationError::Media("图片超过内联大小上限".to_string()));
            }
            bytes.extend_from_slice(&chunk);
        }

        Ok(format!("data:{};base64,{}", content_type, STANDARD.encode(&bytes)))
    }
}

fn is_local(reference: &str) -> bool {
    reference.starts_with('/') || reference.contains("localhost")
}
