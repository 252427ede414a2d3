//! 看板指标
//!
//! 指标由全量订单在内存中计算。营收类指标只统计已支付订单；
//! 月度营收统计当年全部订单，不区分支付状态。

use chrono::{DateTime, Datelike, Local, Utc};
use crm_shared::error::Result;
use crm_shared::models::{Order, OrderStatus};
use serde::Serialize;

use crate::orders::OrderRepository;

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardMetrics {
    /// 已支付订单数
    pub total_orders: usize,
    /// 未支付订单数
    pub pending_orders: usize,
    pub completed_orders: usize,
    pub total_revenue: f64,
    pub average_order_value: f64,
    pub revenue_today: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyRevenue {
    pub month: &'static str,
    pub revenue: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub metrics: DashboardMetrics,
    pub monthly_revenue: Vec<MonthlyRevenue>,
}

pub fn compute_metrics(orders: &[Order], today_start: DateTime<Utc>) -> DashboardMetrics {
    let paid: Vec<&Order> = orders.iter().filter(|o| o.is_paid()).collect();
    let total_revenue: f64 = paid.iter().map(|o| o.total).sum();
    let revenue_today = paid
        .iter()
        .filter(|o| o.created.is_some_and(|created| created >= today_start))
        .map(|o| o.total)
        .sum();

    DashboardMetrics {
        total_orders: paid.len(),
        pending_orders: orders.len() - paid.len(),
        completed_orders: orders
            .iter()
            .filter(|o| o.status == OrderStatus::Delivered)
            .count(),
        total_revenue,
        average_order_value: if paid.is_empty() {
            0.0
        } else {
            total_revenue / paid.len() as f64
        },
        revenue_today,
    }
}

/// 指定年份每月营收（按本地时区归月），固定返回 12 项
pub fn monthly_revenue(orders: &[Order], year: i32) -> Vec<MonthlyRevenue> {
    let mut totals = [0.0_f64; 12];
    for order in orders {
        let Some(created) = order.created.map(|c| c.with_timezone(&Local)) else {
            continue;
        };
        if created.year() == year {
            totals[created.month0() as usize] += order.total;
        }
    }

    MONTHS
        .into_iter()
        .zip(totals)
        .map(|(month, revenue)| MonthlyRevenue { month, revenue })
        .collect()
}

fn local_midnight() -> DateTime<Utc> {
    let now = Local::now();
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .and_then(|midnight| midnight.and_local_timezone(Local).earliest())
        .map(|midnight| midnight.with_timezone(&Utc))
        .unwrap_or_else(|| now.with_timezone(&Utc))
}

/// 拉取全量订单并计算看板
pub async fn load_dashboard(orders: &OrderRepository) -> Result<Dashboard> {
    let all = orders.full_list().await?;
    Ok(Dashboard {
        metrics: compute_metrics(&all, local_midnight()),
        monthly_revenue: monthly_revenue(&all, Local::now().year()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use crm_shared::models::PaymentStatus;

    fn order(total: f64, payment: PaymentStatus, status: OrderStatus, created: DateTime<Utc>) -> Order {
        Order {
            total,
            payment_status: payment,
            status,
            created: Some(created),
            ..Default::default()
        }
    }

    #[test]
    fn test_metrics_count_only_paid_revenue() {
        let today = Utc.with_ymd_and_hms(2024, 6, 15, 0, 0, 0).unwrap();
        let orders = vec![
            order(1000.0, PaymentStatus::Paid, OrderStatus::Delivered, today + chrono::Duration::hours(2)),
            order(500.0, PaymentStatus::Paid, OrderStatus::Shipped, today - chrono::Duration::days(3)),
            order(700.0, PaymentStatus::Pending, OrderStatus::Pending, today + chrono::Duration::hours(1)),
            order(300.0, PaymentStatus::Failed, OrderStatus::Delivered, today - chrono::Duration::days(1)),
        ];

        let metrics = compute_metrics(&orders, today);

        assert_eq!(metrics.total_orders, 2);
        assert_eq!(metrics.pending_orders, 2);
        assert_eq!(metrics.completed_orders, 2);
        assert_eq!(metrics.total_revenue, 1500.0);
        assert_eq!(metrics.average_order_value, 750.0);
        assert_eq!(metrics.revenue_today, 1000.0);
    }

    #[test]
    fn test_no_paid_orders_gives_zero_average() {
        let now = Utc::now();
        let orders = vec![order(200.0, PaymentStatus::Pending, OrderStatus::Pending, now)];

        let metrics = compute_metrics(&orders, now);

        assert_eq!(metrics.total_orders, 0);
        assert_eq!(metrics.average_order_value, 0.0);
        assert_eq!(compute_metrics(&[], now).pending_orders, 0);
    }

    #[test]
    fn test_monthly_revenue_includes_unpaid_orders_of_year() {
        let orders = vec![
            order(100.0, PaymentStatus::Paid, OrderStatus::Delivered, Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap()),
            order(50.0, PaymentStatus::Pending, OrderStatus::Pending, Utc.with_ymd_and_hms(2024, 3, 16, 12, 0, 0).unwrap()),
            order(900.0, PaymentStatus::Paid, OrderStatus::Delivered, Utc.with_ymd_and_hms(2023, 3, 15, 12, 0, 0).unwrap()),
        ];

        let months = monthly_revenue(&orders, 2024);

        assert_eq!(months.len(), 12);
        assert_eq!(months[2], MonthlyRevenue { month: "Mar", revenue: 150.0 });
        assert_eq!(months[0].revenue, 0.0);
    }
}
