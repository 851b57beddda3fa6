//! Read-only reporting shapes for the admin dashboard.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::OrderStatus;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct StatusCount {
    pub status: OrderStatus,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct AnalyticsSummary {
    pub total_users: i64,
    pub active_products: i64,
    pub total_orders: i64,
    pub orders_by_status: Vec<StatusCount>,
    /// Sum of totals of paid, shipped and delivered orders
    pub revenue_cents: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct TopProduct {
    pub product_id: Uuid,
    pub name: String,
    pub quantity_sold: i64,
    pub revenue_cents: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct DailySales {
    pub day: NaiveDate,
    pub order_count: i64,
    pub revenue_cents: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct TopProductsQuery {
    /// 1-50, default 5
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct SalesQuery {
    /// 1-90, default 30
    pub days: Option<u32>,
}
