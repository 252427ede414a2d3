//! 邮件网关客户端
//!
//! 必填字段（收件人、主题、正文）在本地校验，缺失时直接返回失败结果，不发请求。

use async_trait::async_trait;
use crm_shared::models::NotificationActivity;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::sender::{GatewayHttp, MessageKind, SendResult};
use crate::status::ConnectionStatus;
use crate::templates::TemplateVariables;

/// 邮件附件：内容以 base64 给出，或给出网关可访问的路径/URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailAttachment {
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

/// 邮件渠道发送接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmailGateway: Send + Sync {
    async fn send_email(
        &self,
        to: &str,
        subject: &str,
        message: &str,
        variables: Option<TemplateVariables>,
    ) -> SendResult;

    async fn send_email_with_attachment(
        &self,
        to: &str,
        subject: &str,
        message: &str,
        attachments: Vec<EmailAttachment>,
        variables: Option<TemplateVariables>,
    ) -> SendResult;

    /// 网关侧的审计钩子
    async fn log_activity(&self, activity: &NotificationActivity) -> SendResult;

    async fn check_status(&self) -> ConnectionStatus;
}

pub struct EmailClient {
    http: GatewayHttp,
}

impl EmailClient {
    pub fn new(http: GatewayHttp) -> Self {
        Self { http }
    }

    async fn dispatch(&self, kind: MessageKind, to: &str, body: Value) -> SendResult {
        match self.http.post(kind.endpoint(), &body).await {
            Ok(response) => {
                info!(recipient = to, "邮件已发送");
                SendResult::delivered(kind.success_message(), &response)
            }
            Err(err) => {
                warn!(recipient = to, error = %err, "邮件发送失败");
                SendResult::failed(kind.failure_message(&err))
            }
        }
    }
}

fn missing_required(to: &str, subject: &str, message: &str) -> bool {
    [to, subject, message].iter().any(|v| v.trim().is_empty())
}

#[async_trait]
impl EmailGateway for EmailClient {
    async fn send_email(
        &self,
        to: &str,
        subject: &str,
        message: &str,
        variables: Option<TemplateVariables>,
    ) -> SendResult {
        if missing_required(to, subject, message) {
            return SendResult::failed("Recipient email, subject, and message are required");
        }

        let mut body = json!({ "to": to, "subject": subject, "message": message });
        if let Some(variables) = variables {
            body["variables"] = json!(variables);
        }
        self.dispatch(MessageKind::Email, to, body).await
    }

    async fn send_email_with_attachment(
        &self,
        to: &str,
        subject: &str,
        message: &str,
        attachments: Vec<EmailAttachment>,
        variables: Option<TemplateVariables>,
    ) -> SendResult {
        if missing_required(to, subject, message) || attachments.is_empty() {
            return SendResult::failed(
                "Recipient email, subject, message, and attachments are required",
            );
        }

        let mut body = json!({
            "to": to,
            "subject": subject,
            "message": message,
            "attachments": attachments,
        });
        if let Some(variables) = variables {
            body["variables"] = json!(variables);
        }
        self.dispatch(MessageKind::EmailWithAttachment, to, body).await
    }

    async fn log_activity(&self, activity: &NotificationActivity) -> SendResult {
        let body = match serde_json::to_value(activity) {
            Ok(body) => body,
            Err(e) => return SendResult::failed(format!("Failed to log email activity: {e}")),
        };

        match self.http.post("/log-activity", &body).await {
            Ok(response) => {
                let message = response
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("Email activity logged successfully")
                    .to_string();
                SendResult::delivered(message, &response)
            }
            Err(err) => {
                warn!(error = %err, "邮件活动上报失败");
                SendResult::failed(format!("Failed to log email activity: {err}"))
            }
        }
    }

    async fn check_status(&self) -> ConnectionStatus {
        self.http.check_status().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crm_shared::config::GatewayConfig;
    use crm_shared::models::{ActivityStatus, NotificationChannel};
    use crm_shared::test_utils::MockGateway;

    fn client(base_url: &str) -> EmailClient {
        let config = GatewayConfig {
            base_url: base_url.to_string(),
            request_timeout_seconds: 2,
            status_timeout_seconds: 1,
        };
        EmailClient::new(GatewayHttp::new("email", "Email API", &config).unwrap())
    }

    #[tokio::test]
    async fn test_send_email_posts_fields() {
        let gateway = MockGateway::start().await;
        gateway.respond("POST", "/send-email", 200, json!({"success": true, "messageId": "<abc@mail>"}));
        let client = client(&gateway.base_url());

        let mut vars = TemplateVariables::new();
        vars.insert("orderId".into(), "o1".into());
        let result = client
            .send_email("asha@example.com", "Order shipped", "On its way", Some(vars))
            .await;

        assert!(result.success);
        assert_eq!(result.message_id.as_deref(), Some("<abc@mail>"));
        let body = &gateway.requests_to("/send-email")[0].body;
        assert_eq!(body["to"], "asha@example.com");
        assert_eq!(body["variables"]["orderId"], "o1");
    }

    #[tokio::test]
    async fn test_missing_fields_rejected_locally() {
        let gateway = MockGateway::start().await;
        let client = client(&gateway.base_url());

        let result = client.send_email("asha@example.com", "", "body", None).await;
        assert!(!result.success);
        assert_eq!(result.message, "Recipient email, subject, and message are required");

        let result = client
            .send_email_with_attachment("asha@example.com", "Invoice", "Attached", vec![], None)
            .await;
        assert!(!result.success);
        assert!(gateway.requests().is_empty());
    }

    #[tokio::test]
    async fn test_attachment_send_and_server_error() {
        let gateway = MockGateway::start().await;
        gateway.respond(
            "POST",
            "/send-email-with-attachment",
            500,
            json!({"success": false, "message": "SMTP connection refused"}),
        );
        let client = client(&gateway.base_url());

        let attachment = EmailAttachment {
            filename: "invoice.pdf".into(),
            content: Some("JVBERi0=".into()),
            path: None,
            content_type: Some("application/pdf".into()),
        };
        let result = client
            .send_email_with_attachment("asha@example.com", "Invoice", "Attached", vec![attachment], None)
            .await;

        assert!(!result.success);
        assert_eq!(result.message, "SMTP connection refused");
        let body = &gateway.requests_to("/send-email-with-attachment")[0].body;
        assert_eq!(body["attachments"][0]["contentType"], "application/pdf");
    }

    #[tokio::test]
    async fn test_log_activity_posts_record() {
        let gateway = MockGateway::start().await;
        gateway.respond("POST", "/log-activity", 200, json!({"success": true, "message": "Email activity logged successfully"}));
        let client = client(&gateway.base_url());

        let activity = NotificationActivity::new(
            NotificationChannel::Email,
            "o1",
            "order_shipped",
            "asha@example.com",
            ActivityStatus::Sent,
            "On its way",
        )
        .with_subject("Order shipped");
        let result = client.log_activity(&activity).await;

        assert!(result.success);
        let body = &gateway.requests_to("/log-activity")[0].body;
        assert_eq!(body["template_name"], "order_shipped");
        assert_eq!(body["subject"], "Order shipped");
    }
}
