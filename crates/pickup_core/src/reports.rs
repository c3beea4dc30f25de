//! crates/pickup_core/src/reports.rs
//!
//! Sales figures over a pickup-date range. Rendering (CSV, PDF) is left to callers.

use crate::domain::{Caller, Order, OrderStatus};
use crate::ports::{OrderStore, PortError};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("admin access required")]
    Forbidden,
    #[error("report range starts after it ends ({from} > {to})")]
    InvertedRange { from: NaiveDate, to: NaiveDate },
    #[error(transparent)]
    Port(#[from] PortError),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DaySales {
    pub date: NaiveDate,
    pub orders: u32,
    pub revenue: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SalesReport {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub total_orders: u32,
    pub total_revenue: Decimal,
    pub days: Vec<DaySales>,
    pub by_status: BTreeMap<String, u32>,
}

/// Aggregates `orders` that fall in `[from, to]`; orders outside the range are ignored.
pub fn summarize(from: NaiveDate, to: NaiveDate, orders: &[Order]) -> SalesReport {
    let mut days: BTreeMap<NaiveDate, DaySales> = BTreeMap::new();
    let mut by_status: BTreeMap<String, u32> = OrderStatus::ALL
        .iter()
        .map(|s| (s.as_str().to_string(), 0))
        .collect();
    let mut total_orders = 0;
    let mut total_revenue = Decimal::ZERO;

    for order in orders
        .iter()
        .filter(|o| o.pickup_date >= from && o.pickup_date <= to)
    {
        let day = days.entry(order.pickup_date).or_insert_with(|| DaySales {
            date: order.pickup_date,
            orders: 0,
            revenue: Decimal::ZERO,
        });
        day.orders += 1;
        day.revenue += order.total;
        *by_status.entry(order.status.as_str().to_string()).or_default() += 1;
        total_orders += 1;
        total_revenue += order.total;
    }

    SalesReport {
        from,
        to,
        total_orders,
        total_revenue,
        days: days.into_values().collect(),
        by_status,
    }
}

#[derive(Clone)]
pub struct ReportService {
    store: Arc<dyn OrderStore>,
}

impl ReportService {
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self { store }
    }

    pub async fn sales(
        &self,
        caller: &Caller,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<SalesReport, ReportError> {
        if !caller.is_admin() {
            return Err(ReportError::Forbidden);
        }
        if from > to {
            return Err(ReportError::InvertedRange { from, to });
        }
        let orders = self.store.orders_between(from, to).await?;
        let report = summarize(from, to, &orders);
        info!(%from, %to, orders = report.total_orders, "Sales report generated");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn order(day: u32, cents: i64, status: OrderStatus) -> Order {
        Order {
            id: Uuid::new_v4(),
            code: "ABC234".to_string(),
            pickup_date: NaiveDate::from_ymd_opt(2024, 5, day).unwrap(),
            pickup_start_minute: 630,
            pickup_time_label: "10:30 - 10:45".to_string(),
            items: Vec::new(),
            total: Decimal::new(cents, 2),
            status,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn groups_by_day_and_status() {
        let from = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let to = NaiveDate::from_ymd_opt(2024, 5, 2).unwrap();
        let orders = vec![
            order(1, 850, OrderStatus::Ready),
            order(1, 1220, OrderStatus::New),
            order(2, 500, OrderStatus::Ready),
            order(3, 9900, OrderStatus::Ready),
        ];

        let report = summarize(from, to, &orders);
        assert_eq!(report.total_orders, 3);
        assert_eq!(report.total_revenue, Decimal::new(2570, 2));
        assert_eq!(report.days.len(), 2);
        assert_eq!(report.days[0].revenue, Decimal::new(2070, 2));
        assert_eq!(report.by_status["Ready"], 2);
        assert_eq!(report.by_status["InProgress"], 0);
    }
}
