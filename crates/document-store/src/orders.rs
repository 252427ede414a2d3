//! 订单仓储
//!
//! 对 `orders` 集合的常用查询、创建与更新。

use std::sync::Arc;

use crm_shared::error::Result;
use chrono::Utc;
use crm_shared::models::{NewOrder, Order, OrderStatus, PaymentStatus};
use serde_json::json;
use tracing::info;

use crate::client::{ListQuery, PocketBaseClient};

pub const ORDERS_COLLECTION: &str = "orders";

/// 订单列表默认条数
pub const DEFAULT_ORDER_LIMIT: u32 = 50;

const ORDER_EXPAND: &str = "user_id,shipping_address";

pub struct OrderRepository {
    client: Arc<PocketBaseClient>,
}

impl OrderRepository {
    pub fn new(client: Arc<PocketBaseClient>) -> Self {
        Self { client }
    }

    /// 最近创建的订单，按创建时间倒序
    pub async fn list_recent(&self, limit: u32) -> Result<Vec<Order>> {
        let query = ListQuery::default()
            .per_page(limit)
            .sort("-created")
            .expand(ORDER_EXPAND);
        let page = self
            .client
            .list::<Order>(ORDERS_COLLECTION, &query)
            .await?;
        Ok(page.items)
    }

    pub async fn get(&self, id: &str) -> Result<Order> {
        self.client
            .get(ORDERS_COLLECTION, id, Some(ORDER_EXPAND))
            .await
    }

    pub async fn full_list(&self) -> Result<Vec<Order>> {
        self.client
            .full_list(ORDERS_COLLECTION, Some("-created"), None)
            .await
    }

    /// 校验并创建订单，金额由行项目与运费计算
    pub async fn create(&self, new_order: &NewOrder) -> Result<Order> {
        new_order.validate()?;
        let record = new_order.to_record(Utc::now())?;
        let order: Order = self.client.create(ORDERS_COLLECTION, &record).await?;
        info!(order_id = %order.id, total = new_order.total(), "订单已创建");
        Ok(order)
    }

    pub async fn update_status(&self, id: &str, status: OrderStatus) -> Result<Order> {
        let order: Order = self
            .client
            .update(ORDERS_COLLECTION, id, &json!({ "status": status }))
            .await?;
        info!(order_id = id, status = %status, "订单状态已更新");
        Ok(order)
    }

    pub async fn update_payment_status(&self, id: &str, status: PaymentStatus) -> Result<Order> {
        let order: Order = self
            .client
            .update(ORDERS_COLLECTION, id, &json!({ "payment_status": status }))
            .await?;
        info!(order_id = id, payment_status = status.as_str(), "订单支付状态已更新");
        Ok(order)
    }

    /// 写入物流单号并把订单标记为已发货
    pub async fn mark_shipped(
        &self,
        id: &str,
        tracking_code: &str,
        tracking_url: &str,
    ) -> Result<Order> {
        let order: Order = self
            .client
            .update(
                ORDERS_COLLECTION,
                id,
                &json!({
                    "tracking_code": tracking_code,
                    "tracking_url": tracking_url,
                    "status": OrderStatus::Shipped,
                }),
            )
            .await?;
        info!(order_id = id, tracking_code, "订单已发货");
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::mock_store;
    use crm_shared::models::OrderItem;
    use serde_json::json;

    const RECORDS: &str = "/api/collections/orders/records";

    #[tokio::test]
    async fn test_list_recent_uses_created_desc() {
        let (gateway, client) = mock_store().await;
        gateway.respond(
            "GET",
            RECORDS,
            200,
            json!({
                "page": 1, "perPage": 50, "totalItems": 1, "totalPages": 1,
                "items": [{"id": "o1", "customer_name": "Asha", "status": "pending"}]
            }),
        );
        let repo = OrderRepository::new(Arc::new(client));

        let orders = repo.list_recent(DEFAULT_ORDER_LIMIT).await.unwrap();

        assert_eq!(orders[0].customer_name, "Asha");
        let query = gateway.requests_to(RECORDS)[0].query.clone().unwrap();
        assert!(query.contains("sort=-created"));
        assert!(query.contains("perPage=50"));
    }

    #[tokio::test]
    async fn test_mark_shipped_patches_tracking_and_status() {
        let (gateway, client) = mock_store().await;
        gateway.respond(
            "PATCH",
            "/api/collections/orders/records/o1",
            200,
            json!({"id": "o1", "status": "shipped", "tracking_code": "TRK1"}),
        );
        let repo = OrderRepository::new(Arc::new(client));

        let order = repo
            .mark_shipped("o1", "TRK1", "https://track.example/TRK1")
            .await
            .unwrap();

        assert_eq!(order.status, OrderStatus::Shipped);
        let body = &gateway.requests_to("/api/collections/orders/records/o1")[0].body;
        assert_eq!(
            body,
            &json!({
                "tracking_code": "TRK1",
                "tracking_url": "https://track.example/TRK1",
                "status": "shipped"
            })
        );
    }

    #[tokio::test]
    async fn test_create_posts_computed_totals() {
        let (gateway, client) = mock_store().await;
        gateway.respond("POST", RECORDS, 200, json!({"id": "o9", "customer_name": "Asha", "total": 1060.0}));
        let repo = OrderRepository::new(Arc::new(client));
        let new_order = NewOrder {
            customer_name: "Asha".to_string(),
            customer_email: "asha@example.com".to_string(),
            items: vec![OrderItem {
                product_id: Some("p1".to_string()),
                name: "Cotton Tote".to_string(),
                price: 500.0,
                quantity: 2,
                total: None,
            }],
            shipping_cost: 60.0,
            ..Default::default()
        };

        let order = repo.create(&new_order).await.unwrap();

        assert_eq!(order.id, "o9");
        let body = &gateway.requests_to(RECORDS)[0].body;
        assert_eq!(body["subtotal"], 1000.0);
        assert_eq!(body["total"], 1060.0);
        assert_eq!(body["status"], "pending");
        assert!(body["products"].as_str().unwrap().contains(r#""total":1000.0"#));
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_order_locally() {
        let (gateway, client) = mock_store().await;
        let repo = OrderRepository::new(Arc::new(client));
        let new_order = NewOrder {
            customer_name: "Asha".to_string(),
            customer_email: "not-an-email".to_string(),
            ..Default::default()
        };

        let err = repo.create(&new_order).await.unwrap_err();

        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert_eq!(gateway.count(RECORDS), 0);
    }

    #[tokio::test]
    async fn test_update_status_serializes_snake_case() {
        let (gateway, client) = mock_store().await;
        gateway.respond(
            "PATCH",
            "/api/collections/orders/records/o1",
            200,
            json!({"id": "o1", "status": "out_for_delivery"}),
        );
        let repo = OrderRepository::new(Arc::new(client));

        repo.update_status("o1", OrderStatus::OutForDelivery).await.unwrap();

        let body = &gateway.requests_to("/api/collections/orders/records/o1")[0].body;
        assert_eq!(body["status"], "out_for_delivery");
    }
}
