use std::collections::HashMap;
use std::fmt::Write;

use crate::models::{ClassifiedCustomer, SegmentSummary};
use crate::pipeline::RfmAnalysis;
use crate::segment::{Segment, SegmentRules};

pub fn summarize_by_segment(customers: &[ClassifiedCustomer]) -> Vec<SegmentSummary> {
    let mut map: HashMap<Segment, (usize, f64)> = HashMap::new();

    for customer in customers {
        let entry = map.entry(customer.segment).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += customer.scored.aggregate.monetary;
    }

    let mut summaries: Vec<SegmentSummary> = map
        .into_iter()
        .map(|(segment, (customer_count, total_monetary))| SegmentSummary {
            segment,
            customer_count,
            average_monetary: if customer_count == 0 {
                0.0
            } else {
                total_monetary / customer_count as f64
            },
        })
        .collect();

    summaries.sort_by(|a, b| {
        b.customer_count
            .cmp(&a.customer_count)
            .then_with(|| a.segment.as_str().cmp(b.segment.as_str()))
    });
    summaries
}

pub fn build_report(analysis: &RfmAnalysis, rules: &SegmentRules) -> String {
    let summaries = summarize_by_segment(&analysis.rfm_analysis);

    let mut output = String::new();
    let _ = writeln!(output, "# RFM Segmentation Report");

    let Some(reference_date) = analysis.reference_date else {
        let _ = writeln!(output);
        let _ = writeln!(output, "No orders recorded.");
        return output;
    };

    let _ = writeln!(
        output,
        "Recency measured against {} ({} orders, {} customers)",
        reference_date,
        analysis.unique_orders.len(),
        analysis.rfm_analysis.len()
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Segment Mix");

    for summary in summaries.iter() {
        let _ = writeln!(
            output,
            "- {}: {} customers (avg monetary {:.2})",
            summary.segment, summary.customer_count, summary.average_monetary
        );
    }

    let undefined = analysis
        .rfm_analysis
        .iter()
        .filter(|c| c.segment == Segment::CannotBeDefined)
        .count();
    let share = undefined as f64 / analysis.rfm_analysis.len() as f64 * 100.0;
    let _ = writeln!(output);
    let _ = writeln!(
        output,
        "{undefined} customers ({share:.1}%) hold score combinations no segment rule covers \
         ({} of 64 combinations are classified).",
        rules.covered_codes()
    );

    let mut ranked: Vec<&ClassifiedCustomer> = analysis.rfm_analysis.iter().collect();
    ranked.sort_by(|a, b| {
        b.scored
            .total_score()
            .cmp(&a.scored.total_score())
            .then_with(|| b.scored.aggregate.monetary.total_cmp(&a.scored.aggregate.monetary))
            .then_with(|| a.scored.customer_name().cmp(b.scored.customer_name()))
    });

    let _ = writeln!(output);
    let _ = writeln!(output, "## Highest Scoring Customers");
    for customer in ranked.iter().take(10) {
        let scored = &customer.scored;
        let _ = writeln!(
            output,
            "- {} [{}] code {} total {}: {} orders, {:.0} spent, last order {} days ago",
            scored.customer_name(),
            customer.segment,
            scored.combination_code(),
            scored.total_score(),
            scored.aggregate.frequency,
            scored.aggregate.monetary,
            scored.aggregate.recency
        );
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CustomerAggregate, ScoredAggregate};
    use chrono::NaiveDate;

    fn classified(
        name: &str,
        scores: (u8, u8, u8),
        monetary: f64,
        segment: Segment,
    ) -> ClassifiedCustomer {
        ClassifiedCustomer {
            scored: ScoredAggregate {
                aggregate: CustomerAggregate {
                    customer_name: name.to_string(),
                    last_order_date: NaiveDate::from_ymd_opt(2014, 12, 30).unwrap(),
                    recency: 1,
                    frequency: 3,
                    monetary,
                },
                r_score: scores.0,
                f_score: scores.1,
                m_score: scores.2,
            },
            segment,
        }
    }

    #[test]
    fn summary_counts_and_averages_per_segment() {
        let customers = vec![
            classified("A", (4, 4, 4), 900.0, Segment::Loyal),
            classified("B", (1, 1, 1), 10.0, Segment::ChurnedCustomer),
            classified("C", (4, 3, 4), 500.0, Segment::Loyal),
            classified("D", (1, 1, 3), 40.0, Segment::CannotBeDefined),
        ];

        let summaries = summarize_by_segment(&customers);
        assert_eq!(summaries.len(), 3);
        assert_eq!(summaries[0].segment, Segment::Loyal);
        assert_eq!(summaries[0].customer_count, 2);
        assert_eq!(summaries[0].average_monetary, 700.0);
        // equal counts fall back to label order
        assert_eq!(summaries[1].segment, Segment::CannotBeDefined);
        assert_eq!(summaries[2].segment, Segment::ChurnedCustomer);

        let total: usize = summaries.iter().map(|s| s.customer_count).sum();
        assert_eq!(total, customers.len());
    }

    #[test]
    fn report_lists_segments_and_top_customers() {
        let analysis = RfmAnalysis {
            reference_date: NaiveDate::from_ymd_opt(2014, 12, 31),
            unique_orders: Vec::new(),
            rfm_scores: Vec::new(),
            rfm_analysis: vec![
                classified("Claire Gute", (4, 4, 4), 900.0, Segment::Loyal),
                classified("Sean Miller", (1, 1, 3), 40.0, Segment::CannotBeDefined),
            ],
        };

        let report = build_report(&analysis, &SegmentRules::new());
        assert!(report.contains("## Segment Mix"));
        assert!(report.contains("- LOYAL: 1 customers (avg monetary 900.00)"));
        assert!(report.contains("1 customers (50.0%) hold score combinations"));
        assert!(report.contains("(36 of 64 combinations are classified)"));
        let claire = report.find("Claire Gute [LOYAL] code 444").unwrap();
        let sean = report.find("Sean Miller").unwrap();
        assert!(claire < sean);
    }

    #[test]
    fn empty_analysis_reports_no_orders() {
        let report = build_report(&crate::pipeline::run(&[]), &SegmentRules::new());
        assert!(report.contains("No orders recorded."));
    }
}
