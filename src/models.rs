use chrono::NaiveDate;
use serde::Serialize;

use crate::segment::Segment;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderRecord {
    pub order_id: String,
    pub customer_name: String,
    pub order_date: NaiveDate,
    pub ship_date: NaiveDate,
    pub sales: f64,
}

/// The single line kept for an order id after deduplication.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeduplicatedOrder {
    #[serde(flatten)]
    pub record: OrderRecord,
}

impl DeduplicatedOrder {
    pub fn customer_name(&self) -> &str {
        &self.record.customer_name
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerAggregate {
    pub customer_name: String,
    pub last_order_date: NaiveDate,
    pub recency: i64,
    pub frequency: usize,
    pub monetary: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredAggregate {
    #[serde(flatten)]
    pub aggregate: CustomerAggregate,
    pub r_score: u8,
    pub f_score: u8,
    pub m_score: u8,
}

impl ScoredAggregate {
    pub fn customer_name(&self) -> &str {
        &self.aggregate.customer_name
    }

    pub fn total_score(&self) -> u8 {
        self.r_score + self.f_score + self.m_score
    }

    /// Scores concatenated as R, F, M digits, e.g. 423.
    pub fn combination(&self) -> u16 {
        u16::from(self.r_score) * 100 + u16::from(self.f_score) * 10 + u16::from(self.m_score)
    }

    pub fn combination_code(&self) -> String {
        format!("{}{}{}", self.r_score, self.f_score, self.m_score)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassifiedCustomer {
    #[serde(flatten)]
    pub scored: ScoredAggregate,
    pub segment: Segment,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentSummary {
    pub segment: Segment,
    pub customer_count: usize,
    pub average_monetary: f64,
}
