//! WhatsApp 网关客户端
//!
//! 文本、图片、视频、文档四种消息分别对应网关的四个端点。号码在发送前规范化，
//! 媒体引用先经 `MediaResolver` 解析。所有失败都转换为 `SendResult`。

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tracing::{info, warn};

use crate::error::NotificationError;
use crate::media::{MediaKind, MediaResolver};
use crate::phone::PhoneFormatter;
use crate::sender::{GatewayHttp, MessageKind, SendResult};
use crate::status::ConnectionStatus;
use crate::templates::TemplateVariables;

/// WhatsApp 渠道发送接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WhatsAppGateway: Send + Sync {
    async fn send_text(
        &self,
        to: &str,
        message: &str,
        variables: Option<TemplateVariables>,
    ) -> SendResult;

    async fn send_image(
        &self,
        to: &str,
        image_url: &str,
        caption: Option<String>,
        variables: Option<TemplateVariables>,
    ) -> SendResult;

    async fn send_video(
        &self,
        to: &str,
        video_url: &str,
        caption: Option<String>,
        variables: Option<TemplateVariables>,
    ) -> SendResult;

    async fn send_document(
        &self,
        to: &str,
        document_url: &str,
        filename: &str,
        caption: Option<String>,
        variables: Option<TemplateVariables>,
    ) -> SendResult;

    async fn check_status(&self) -> ConnectionStatus;
}

pub struct WhatsAppClient {
    http: GatewayHttp,
    phone: PhoneFormatter,
    media: MediaResolver,
}

impl WhatsAppClient {
    pub fn new(http: GatewayHttp, phone: PhoneFormatter, media: MediaResolver) -> Self {
        Self { http, phone, media }
    }

    /// 规范化号码、补齐公共字段后发送
    async fn dispatch(&self, kind: MessageKind, to: &str, mut body: Map<String, Value>) -> SendResult {
        let number = self.phone.format(to);
        if number.is_empty() {
            warn!(kind = ?kind, "收件号码为空，拒绝发送");
            return SendResult::failed("Recipient phone number is required");
        }
        body.insert("number".to_string(), Value::String(number.clone()));

        match self.http.post(kind.endpoint(), &Value::Object(body)).await {
            Ok(response) => {
                info!(kind = ?kind, recipient = %number, "WhatsApp 消息已发送");
                SendResult::delivered(kind.success_message(), &response)
            }
            Err(err) => {
                warn!(kind = ?kind, recipient = %number, error = %err, "WhatsApp 消息发送失败");
                SendResult::failed(kind.failure_message(&err))
            }
        }
    }

    async fn dispatch_media(
        &self,
        kind: MessageKind,
        media_kind: MediaKind,
        field: &str,
        to: &str,
        reference: &str,
        mut body: Map<String, Value>,
    ) -> SendResult {
        let url = match self.media.resolve(media_kind, reference).await {
            Ok(url) => url,
            Err(err) => return SendResult::failed(kind.failure_message(&err)),
        };
        body.insert(field.to_string(), Value::String(url));
        self.dispatch(kind, to, body).await
    }
}

fn optional_fields(caption: Option<String>, variables: Option<TemplateVariables>) -> Map<String, Value> {
    let mut body = Map::new();
    if let Some(caption) = caption.filter(|c| !c.is_empty()) {
        body.insert("caption".to_string(), Value::String(caption));
    }
    if let Some(variables) = variables {
        body.insert("variables".to_string(), json!(variables));
    }
    body
}

#[async_trait]
impl WhatsAppGateway for WhatsAppClient {
    async fn send_text(
        &self,
        to: &str,
        message: &str,
        variables: Option<TemplateVariables>,
    ) -> SendResult {
        if message.trim().is_empty() {
            return SendResult::failed("Message content is required");
        }
        let mut body = optional_fields(None, variables);
        body.insert("message".to_string(), Value::String(message.to_string()));
        self.dispatch(MessageKind::Text, to, body).await
    }

    async fn send_image(
        &self,
        to: &str,
        image_url: &str,
        caption: Option<String>,
        variables: Option<TemplateVariables>,
    ) -> SendResult {
        let body = optional_fields(caption, variables);
        self.dispatch_media(MessageKind::Image, MediaKind::Image, "imageUrl", to, image_url, body)
            .await
    }

    async fn send_video(
        &self,
        to: &str,
        video_url: &str,
        caption: Option<String>,
        variables: Option<TemplateVariables>,
    ) -> SendResult {
        let body = optional_fields(caption, variables);
        self.dispatch_media(MessageKind::Video, MediaKind::Video, "videoUrl", to, video_url, body)
            .await
    }

    async fn send_document(
        &self,
        to: &str,
        document_url: &str,
        filename: &str,
        caption: Option<String>,
        variables: Option<TemplateVariables>,
    ) -> SendResult {
        if filename.trim().is_empty() {
            let err = NotificationError::validation("Filename is required");
            return SendResult::failed(MessageKind::Document.failure_message(&err));
        }
        let mut body = optional_fields(caption, variables);
        body.insert("filename".to_string(), Value::String(filename.to_string()));
        self.dispatch_media(
            MessageKind::Document,
            MediaKind::Document,
            "documentUrl",
            to,
            document_url,
            body,
        )
        .await
    }

    async fn check_status(&self) -> ConnectionStatus {
        self.http.check_status().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crm_shared::config::{GatewayConfig, NotificationConfig, PocketBaseConfig};
    use crm_shared::test_utils::MockGateway;
    use crate::sender::IMAGE_FETCH_HINT;
    use crate::templates::numbered;

    fn client(base_url: &str) -> WhatsAppClient {
        let config = GatewayConfig {
            base_url: base_url.to_string(),
            request_timeout_seconds: 2,
            status_timeout_seconds: 1,
        };
        let http = GatewayHttp::new("whatsapp", "WhatsApp API", &config).unwrap();
        let pocketbase = PocketBaseConfig {
            url: "https://pb.example".to_string(),
            ..Default::default()
        };
        let media = MediaResolver::new(
            reqwest::Client::new(),
            &pocketbase,
            &NotificationConfig::default(),
        );
        WhatsAppClient::new(http, PhoneFormatter::default(), media)
    }

    #[tokio::test]
    async fn test_send_text_normalizes_number_and_sends_variables() {
        let gateway = MockGateway::start().await;
        gateway.respond("POST", "/send-message", 200, json!({"messageId": "m1"}));
        let client = client(&gateway.base_url());

        let result = client
            .send_text("98765 43210", "Hi Asha", Some(numbered(["Asha"])))
            .await;

        assert!(result.success);
        assert_eq!(result.message, "Message sent");
        assert_eq!(result.message_id.as_deref(), Some("m1"));
        let body = &gateway.requests_to("/send-message")[0].body;
        assert_eq!(
            body,
            &json!({"number": "919876543210", "message": "Hi Asha", "variables": {"1": "Asha"}})
        );
    }

    #[tokio::test]
    async fn test_gateway_error_becomes_failure_result() {
        let gateway = MockGateway::start().await;
        gateway.respond("POST", "/send-message", 400, json!({"message": "Number not registered"}));
        let client = client(&gateway.base_url());

        let result = client.send_text("9876543210", "hello", None).await;

        assert!(!result.success);
        assert_eq!(result.message, "Number not registered");
    }

    #[tokio::test]
    async fn test_image_server_error_hint() {
        let gateway = MockGateway::start().await;
        gateway.respond("POST", "/send-image-url", 500, json!({}));
        let client = client(&gateway.base_url());

        let result = client
            .send_image("9876543210", "https://cdn.example/a.jpg", Some("New arrival".into()), None)
            .await;

        assert!(!result.success);
        assert_eq!(result.message, IMAGE_FETCH_HINT);
        let body = &gateway.requests_to("/send-image-url")[0].body;
        assert_eq!(body["imageUrl"], "https://cdn.example/a.jpg");
        assert_eq!(body["caption"], "New arrival");
    }

    #[tokio::test]
    async fn test_video_resolves_store_reference() {
        let gateway = MockGateway::start().await;
        gateway.respond("POST", "/send-video-url", 200, json!({"id": "v1", "status": "queued"}));
        let client = client(&gateway.base_url());

        let result = client.send_video("9876543210", "media/rec1/clip.mp4", None, None).await;

        assert!(result.success);
        assert_eq!(result.message, "Video message sent");
        assert_eq!(result.status.as_deref(), Some("queued"));
        let body = &gateway.requests_to("/send-video-url")[0].body;
        assert_eq!(body["videoUrl"], "https://pb.example/api/files/media/rec1/clip.mp4");
        assert!(body.get("caption").is_none());
    }

    #[tokio::test]
    async fn test_document_requires_filename() {
        let gateway = MockGateway::start().await;
        let client = client(&gateway.base_url());

        let result = client
            .send_document("9876543210", "https://cdn.example/a.pdf", "", None, None)
            .await;

        assert!(!result.success);
        assert_eq!(result.message, "Filename is required");
        assert!(gateway.requests().is_empty());
    }

    #[tokio::test]
    async fn test_document_sends_filename() {
        let gateway = MockGateway::start().await;
        gateway.respond("POST", "/send-document-url", 200, json!({}));
        let client = client(&gateway.base_url());

        let result = client
            .send_document("9876543210", "https://cdn.example/a.pdf", "invoice.pdf", None, None)
            .await;

        assert!(result.success);
        assert_eq!(result.message, "Document message sent");
        assert_eq!(gateway.requests_to("/send-document-url")[0].body["filename"], "invoice.pdf");
    }

    #[tokio::test]
    async fn test_empty_recipient_rejected() {
        let gateway = MockGateway::start().await;
        let client = client(&gateway.base_url());

        let result = client.send_text("  ", "hello", None).await;

        assert!(!result.success);
        assert!(gateway.requests().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_gateway_is_failure_result() {
        let url = crm_shared::test_utils::unreachable_base_url().await;
        let client = client(&url);

        let result = client.send_text("9876543210", "hello", None).await;

        assert!(!result.success);
        assert!(result.message.starts_with("Failed to send WhatsApp message: "));
        assert!(result.message.is_ascii());
    }
}
