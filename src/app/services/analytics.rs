//! Admin dashboard reporting.

use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::instrument;

use crate::domain::{
    AnalyticsRepository, AnalyticsSummary, AppError, DailySales, SalesQuery, TopProduct,
    TopProductsQuery,
};

const DEFAULT_TOP_PRODUCTS: u32 = 5;
const MAX_TOP_PRODUCTS: u32 = 50;
const DEFAULT_SALES_DAYS: u32 = 30;
const MAX_SALES_DAYS: u32 = 90;

pub struct AnalyticsService {
    analytics: Arc<dyn AnalyticsRepository>,
}

impl AnalyticsService {
    #[must_use]
    pub fn new(analytics: Arc<dyn AnalyticsRepository>) -> Self {
        Self { analytics }
    }

    #[instrument(skip(self))]
    pub async fn summary(&self) -> Result<AnalyticsSummary, AppError> {
        self.analytics.summary().await
    }

    #[instrument(skip(self, query))]
    pub async fn top_products(&self, query: &TopProductsQuery) -> Result<Vec<TopProduct>, AppError> {
        let limit = query.limit.unwrap_or(DEFAULT_TOP_PRODUCTS);
        if !(1..=MAX_TOP_PRODUCTS).contains(&limit) {
            return Err(AppError::invalid(
                "limit",
                format!("must be between 1 and {MAX_TOP_PRODUCTS}"),
            ));
        }
        self.analytics.top_products(i64::from(limit)).await
    }

    /// Daily totals for the last `days` UTC days, today included.
    #[instrument(skip(self, query))]
    pub async fn sales_by_day(&self, query: &SalesQuery) -> Result<Vec<DailySales>, AppError> {
        let days = query.days.unwrap_or(DEFAULT_SALES_DAYS);
        if !(1..=MAX_SALES_DAYS).contains(&days) {
            return Err(AppError::invalid(
                "days",
                format!("must be between 1 and {MAX_SALES_DAYS}"),
            ));
        }
        let today = Utc::now().date_naive();
        let first_day = today - Duration::days(i64::from(days - 1));
        let since = first_day.and_time(chrono::NaiveTime::MIN).and_utc();
        self.analytics.sales_by_day(since).await
    }
}
