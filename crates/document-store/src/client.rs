//! 文档存储 REST 客户端
//!
//! 所有请求都携带管理员会话的 Bearer token。收到 401 时使会话失效并重试一次，
//! 其余错误响应映射到 `CrmError`。

use std::sync::Arc;

use crm_shared::config::PocketBaseConfig;
use crm_shared::error::{CrmError, Result};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::session::AdminSession;

const SERVICE: &str = "pocketbase";

/// 全量拉取时每页的记录数
pub const FULL_LIST_PAGE_SIZE: u32 = 200;

/// 列表查询参数
#[derive(Debug, Clone)]
pub struct ListQuery {
    pub page: u32,
    pub per_page: u32,
    pub sort: Option<String>,
    pub filter: Option<String>,
    pub expand: Option<String>,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 30,
            sort: None,
            filter: None,
            expand: None,
        }
    }
}

impl ListQuery {
    pub fn sort(mut self, sort: impl Into<String>) -> Self {
        self.sort = Some(sort.into());
        self
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn expand(mut self, expand: impl Into<String>) -> Self {
        self.expand = Some(expand.into());
        self
    }

    pub fn per_page(mut self, per_page: u32) -> Self {
        self.per_page = per_page;
        self
    }

    fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("page", self.page.to_string()),
            ("perPage", self.per_page.to_string()),
        ];
        if let Some(sort) = &self.sort {
            params.push(("sort", sort.clone()));
        }
        if let Some(filter) = &self.filter {
            params.push(("filter", filter.clone()));
        }
        if let Some(expand) = &self.expand {
            params.push(("expand", expand.clone()));
        }
        params
    }
}

/// 分页结果
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResult<T> {
    pub page: u32,
    pub per_page: u32,
    pub total_items: i64,
    pub total_pages: i64,
    pub items: Vec<T>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ErrorBody {
    message: String,
}

/// 把值转义为过滤表达式中的字符串字面量
pub fn quote_filter_value(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// 文档存储客户端
pub struct PocketBaseClient {
    http: reqwest::Client,
    base_url: String,
    session: Arc<AdminSession>,
}

impl PocketBaseClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, session: Arc<AdminSession>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session,
        }
    }

    /// 按配置构建客户端与其管理员会话
    pub fn from_config(config: &PocketBaseConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| CrmError::Internal(format!("HTTP 客户端构建失败: {e}")))?;
        let session = Arc::new(AdminSession::from_config(http.clone(), config));
        Ok(Self::new(http, config.url.clone(), session))
    }

    /// 文件的公开访问地址
    pub fn file_url(&self, collection: &str, record_id: &str, filename: &str) -> String {
        format!(
            "{}/api/files/{}/{}/{}",
            self.base_url, collection, record_id, filename
        )
    }

    pub async fn list<T: DeserializeOwned>(
        &self,
        collection: &str,
        query: &ListQuery,
    ) -> Result<ListResult<T>> {
        let path = format!("/api/collections/{collection}/records");
        self.request(Method::GET, &path, &query.to_params(), None, collection, None)
            .await
    }

    /// 逐页拉取全部记录，直到最后一页
    pub async fn full_list<T: DeserializeOwned>(
        &self,
        collection: &str,
        sort: Option<&str>,
        filter: Option<&str>,
    ) -> Result<Vec<T>> {
        let mut query = ListQuery::default().per_page(FULL_LIST_PAGE_SIZE);
        query.sort = sort.map(str::to_string);
        query.filter = filter.map(str::to_string);

        let mut items = Vec::new();
        loop {
            let page: ListResult<T> = self.list(collection, &query).await?;
            let fetched = page.items.len();
            items.extend(page.items);
            if fetched == 0 || i64::from(query.page) >= page.total_pages {
                break;
            }
            query.page += 1;
        }

        debug!(collection, count = items.len(), "全量拉取完成");
        Ok(items)
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        collection: &str,
        id: &str,
        expand: Option<&str>,
    ) -> Result<T> {
        let path = format!("/api/collections/{collection}/records/{id}");
        let params: Vec<(&str, String)> = expand
            .map(|e| vec![("expand", e.to_string())])
            .unwrap_or_default();
        self.request(Method::GET, &path, &params, None, collection, Some(id))
            .await
    }

    pub async fn create<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        collection: &str,
        body: &B,
    ) -> Result<T> {
        let path = format!("/api/collections/{collection}/records");
        let body = serde_json::to_value(body)?;
        self.request(Method::POST, &path, &[], Some(&body), collection, None)
            .await
    }

    pub async fn update<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        collection: &str,
        id: &str,
        body: &B,
    ) -> Result<T> {
        let path = format!("/api/collections/{collection}/records/{id}");
        let body = serde_json::to_value(body)?;
        self.request(Method::PATCH, &path, &[], Some(&body), collection, Some(id))
            .await
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
        body: Option<&serde_json::Value>,
        collection: &str,
        id: Option<&str>,
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let mut reauthenticated = false;

        loop {
            let session = self.session.ensure_session().await?;

            let mut request = self
                .http
                .request(method.clone(), &url)
                .bearer_auth(session.token())
                .query(params);
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = request.send().await.map_err(|e| {
                if e.is_timeout() {
                    CrmError::ExternalServiceTimeout {
                        service: SERVICE.to_string(),
                    }
                } else {
                    CrmError::Transport {
                        service: SERVICE.to_string(),
                        message: e.to_string(),
                    }
                }
            })?;

            let status = response.status();
            if status == StatusCode::UNAUTHORIZED && !reauthenticated {
                warn!(%method, path, "文档存储返回 401，重新认证后重试");
                self.session.invalidate();
                reauthenticated = true;
                continue;
            }

            let bytes = response.bytes().await.map_err(|e| CrmError::Transport {
                service: SERVICE.to_string(),
                message: e.to_string(),
            })?;

            if status.is_success() {
                return Ok(serde_json::from_slice(&bytes)?);
            }

            let message = serde_json::from_slice::<ErrorBody>(&bytes)
                .map(|b| b.message)
                .unwrap_or_default();
            return Err(map_error_status(status, message, collection, id));
        }
    }
}

fn map_error_status(
    status: StatusCode,
    message: String,
    collection: &str,
    id: Option<&str>,
) -> CrmError {
    let message = if message.is_empty() {
        status.canonical_reason().unwrap_or("unknown error").to_string()
    } else {
        message
    };

    match status {
        StatusCode::NOT_FOUND => CrmError::NotFound {
            collection: collection.to_string(),
            id: id.unwrap_or_default().to_string(),
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => CrmError::Unauthorized(message),
        StatusCode::BAD_REQUEST => CrmError::Validation(message),
        _ => CrmError::DocumentStore {
            status: status.as_u16(),
            message,
        },
    }
}
