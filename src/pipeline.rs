use chrono::NaiveDate;
use serde::Serialize;

use crate::dedup::dedupe_orders;
use crate::models::{ClassifiedCustomer, DeduplicatedOrder, OrderRecord, ScoredAggregate};
use crate::rfm::{aggregate_customers, reference_date, score_customers};
use crate::segment::{classify_customers, SegmentRules};

/// Result sets of one segmentation run.
///
/// `reference_date` is `None` when the input held no orders; every result
/// set is empty in that case.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RfmAnalysis {
    pub reference_date: Option<NaiveDate>,
    pub unique_orders: Vec<DeduplicatedOrder>,
    pub rfm_scores: Vec<ScoredAggregate>,
    pub rfm_analysis: Vec<ClassifiedCustomer>,
}

impl RfmAnalysis {
    pub fn is_empty(&self) -> bool {
        self.reference_date.is_none()
    }

    /// Scores for one customer; result sets are ordered by customer name.
    pub fn score_for(&self, customer_name: &str) -> Option<&ScoredAggregate> {
        self.rfm_scores
            .binary_search_by(|scored| scored.customer_name().cmp(customer_name))
            .ok()
            .map(|index| &self.rfm_scores[index])
    }
}

pub fn run(records: &[OrderRecord]) -> RfmAnalysis {
    run_with_rules(records, &SegmentRules::new())
}

pub fn run_with_rules(records: &[OrderRecord], rules: &SegmentRules) -> RfmAnalysis {
    let unique_orders = dedupe_orders(records);
    let reference_date = reference_date(&unique_orders);

    if reference_date.is_none() {
        tracing::info!("no orders supplied, segmentation is empty");
    }

    let aggregates = aggregate_customers(&unique_orders);
    let rfm_scores = score_customers(&aggregates);
    let rfm_analysis = classify_customers(rules, &rfm_scores);

    tracing::info!(
        lines = records.len(),
        orders = unique_orders.len(),
        customers = rfm_analysis.len(),
        "segmentation complete"
    );

    RfmAnalysis {
        reference_date,
        unique_orders,
        rfm_scores,
        rfm_analysis,
    }
}
