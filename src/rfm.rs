use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::models::{CustomerAggregate, DeduplicatedOrder, ScoredAggregate};

pub const SCORE_BUCKETS: usize = 4;

/// Latest order date across the whole set, `None` when there are no orders.
pub fn reference_date(orders: &[DeduplicatedOrder]) -> Option<NaiveDate> {
    orders.iter().map(|order| order.record.order_date).max()
}

/// Rounds to a whole amount, halves away from zero.
pub fn round_monetary(amount: f64) -> f64 {
    amount.round()
}

/// Per-customer recency, frequency and monetary value, ordered by name.
pub fn aggregate_customers(orders: &[DeduplicatedOrder]) -> Vec<CustomerAggregate> {
    let Some(reference) = reference_date(orders) else {
        return Vec::new();
    };

    // name -> (last order, order count, sales total)
    let mut groups: BTreeMap<&str, (NaiveDate, usize, f64)> = BTreeMap::new();

    for order in orders {
        let entry = groups
            .entry(order.customer_name())
            .or_insert((order.record.order_date, 0, 0.0));
        entry.0 = entry.0.max(order.record.order_date);
        entry.1 += 1;
        entry.2 += order.record.sales;
    }

    let aggregates: Vec<CustomerAggregate> = groups
        .into_iter()
        .map(|(name, (last_order_date, frequency, total))| CustomerAggregate {
            customer_name: name.to_string(),
            last_order_date,
            recency: (reference - last_order_date).num_days(),
            frequency,
            monetary: round_monetary(total),
        })
        .collect();

    tracing::debug!(
        customers = aggregates.len(),
        %reference,
        "aggregated customer metrics"
    );
    aggregates
}

/// NTILE bucket (1-based) for a 0-based position among `count` ranked items.
///
/// Buckets hold `count / buckets` items and the first `count % buckets`
/// buckets take one extra each.
pub fn ntile(position: usize, count: usize, buckets: usize) -> usize {
    let base = count / buckets;
    let remainder = count % buckets;
    let boundary = remainder * (base + 1);

    if position < boundary {
        position / (base + 1) + 1
    } else {
        remainder + (position - boundary) / base + 1
    }
}

fn bucket_by<F>(aggregates: &[CustomerAggregate], compare: F) -> Vec<u8>
where
    F: Fn(&CustomerAggregate, &CustomerAggregate) -> Ordering,
{
    let mut ranked: Vec<usize> = (0..aggregates.len()).collect();
    ranked.sort_by(|&a, &b| {
        compare(&aggregates[a], &aggregates[b])
            .then_with(|| aggregates[a].customer_name.cmp(&aggregates[b].customer_name))
    });

    let mut scores = vec![0u8; aggregates.len()];
    for (position, index) in ranked.into_iter().enumerate() {
        scores[index] = ntile(position, aggregates.len(), SCORE_BUCKETS) as u8;
    }
    scores
}

/// Quartile scores on each metric; higher is better for all three.
///
/// Recency ranks descending so the most recent customers land in bucket 4,
/// frequency and monetary rank ascending. Ties fall back to customer name.
pub fn score_customers(aggregates: &[CustomerAggregate]) -> Vec<ScoredAggregate> {
    let r_scores = bucket_by(aggregates, |a, b| b.recency.cmp(&a.recency));
    let f_scores = bucket_by(aggregates, |a, b| a.frequency.cmp(&b.frequency));
    let m_scores = bucket_by(aggregates, |a, b| a.monetary.total_cmp(&b.monetary));

    aggregates
        .iter()
        .enumerate()
        .map(|(i, aggregate)| ScoredAggregate {
            aggregate: aggregate.clone(),
            r_score: r_scores[i],
            f_score: f_scores[i],
            m_score: m_scores[i],
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrderRecord;

    fn order(
        order_id: &str,
        customer: &str,
        date: (i32, u32, u32),
        sales: f64,
    ) -> DeduplicatedOrder {
        let order_date = NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap();
        DeduplicatedOrder {
            record: OrderRecord {
                order_id: order_id.to_string(),
                customer_name: customer.to_string(),
                order_date,
                ship_date: order_date,
                sales,
            },
        }
    }

    fn aggregate(name: &str, recency: i64, frequency: usize, monetary: f64) -> CustomerAggregate {
        CustomerAggregate {
            customer_name: name.to_string(),
            last_order_date: NaiveDate::from_ymd_opt(2014, 12, 31).unwrap(),
            recency,
            frequency,
            monetary,
        }
    }

    #[test]
    fn recency_is_relative_to_latest_order_in_dataset() {
        let orders = vec![
            order("1", "A", (2013, 1, 1), 100.0),
            order("2", "A", (2013, 6, 1), 50.0),
            order("3", "B", (2013, 12, 31), 10.0),
        ];

        let aggregates = aggregate_customers(&orders);
        assert_eq!(aggregates.len(), 2);

        let a = &aggregates[0];
        assert_eq!(a.customer_name, "A");
        assert_eq!(a.frequency, 2);
        assert_eq!(a.monetary, 150.0);
        assert_eq!(a.recency, 213);

        let b = &aggregates[1];
        assert_eq!(b.recency, 0);
        assert_eq!(b.frequency, 1);
    }

    #[test]
    fn customer_names_are_case_sensitive() {
        let orders = vec![
            order("1", "Zuschuss Carroll", (2014, 1, 1), 1.0),
            order("2", "zuschuss carroll", (2014, 1, 2), 1.0),
        ];
        assert_eq!(aggregate_customers(&orders).len(), 2);
    }

    #[test]
    fn monetary_rounds_to_whole_amount() {
        let orders = vec![
            order("1", "A", (2014, 1, 1), 10.2),
            order("2", "A", (2014, 1, 2), 5.6),
        ];
        assert_eq!(aggregate_customers(&orders)[0].monetary, 16.0);
        assert_eq!(round_monetary(2.5), 3.0);
    }

    #[test]
    fn frequency_totals_match_order_count() {
        let orders = vec![
            order("1", "A", (2014, 1, 1), 1.0),
            order("2", "B", (2014, 1, 2), 1.0),
            order("3", "A", (2014, 1, 3), 1.0),
            order("4", "C", (2014, 1, 4), 1.0),
        ];
        let total: usize = aggregate_customers(&orders).iter().map(|a| a.frequency).sum();
        assert_eq!(total, orders.len());
    }

    #[test]
    fn no_orders_means_no_reference_date() {
        assert_eq!(reference_date(&[]), None);
        assert!(aggregate_customers(&[]).is_empty());
    }

    #[test]
    fn earliest_buckets_absorb_remainder() {
        let buckets = |count: usize| -> Vec<usize> {
            let mut sizes = vec![0; SCORE_BUCKETS];
            for position in 0..count {
                sizes[ntile(position, count, SCORE_BUCKETS) - 1] += 1;
            }
            sizes
        };

        assert_eq!(buckets(8), vec![2, 2, 2, 2]);
        assert_eq!(buckets(9), vec![3, 2, 2, 2]);
        assert_eq!(buckets(10), vec![3, 3, 2, 2]);
        assert_eq!(buckets(11), vec![3, 3, 3, 2]);
        assert_eq!(buckets(2), vec![1, 1, 0, 0]);

        for count in 1..50 {
            let sizes = buckets(count);
            let max = *sizes.iter().max().unwrap();
            let min = *sizes.iter().min().unwrap();
            assert!(max - min <= 1);
            assert!(sizes.windows(2).all(|w| w[0] >= w[1]));
        }
    }

    #[test]
    fn most_recent_customers_score_highest_recency() {
        let aggregates = vec![
            aggregate("A", 300, 1, 10.0),
            aggregate("B", 0, 1, 10.0),
            aggregate("C", 30, 1, 10.0),
            aggregate("D", 120, 1, 10.0),
        ];

        let scored = score_customers(&aggregates);
        let r: Vec<u8> = scored.iter().map(|s| s.r_score).collect();
        assert_eq!(r, vec![1, 4, 3, 2]);
    }

    #[test]
    fn frequency_and_monetary_rank_ascending() {
        let aggregates = vec![
            aggregate("A", 5, 9, 50.0),
            aggregate("B", 5, 1, 900.0),
            aggregate("C", 5, 4, 10.0),
            aggregate("D", 5, 2, 300.0),
        ];

        let scored = score_customers(&aggregates);
        let f: Vec<u8> = scored.iter().map(|s| s.f_score).collect();
        let m: Vec<u8> = scored.iter().map(|s| s.m_score).collect();
        assert_eq!(f, vec![4, 1, 3, 2]);
        assert_eq!(m, vec![2, 4, 1, 3]);
    }

    #[test]
    fn ties_split_by_customer_name() {
        let aggregates = vec![
            aggregate("Dana", 10, 3, 100.0),
            aggregate("Avery", 10, 3, 100.0),
            aggregate("Casey", 10, 3, 100.0),
            aggregate("Blake", 10, 3, 100.0),
        ];

        let scored = score_customers(&aggregates);
        let by_name = |name: &str| scored.iter().find(|s| s.customer_name() == name).unwrap();

        assert_eq!(by_name("Avery").f_score, 1);
        assert_eq!(by_name("Blake").f_score, 2);
        assert_eq!(by_name("Casey").f_score, 3);
        assert_eq!(by_name("Dana").f_score, 4);
        assert_eq!(by_name("Avery").r_score, 1);
        assert_eq!(by_name("Dana").r_score, 4);
    }

    #[test]
    fn combination_concatenates_scores() {
        let scored = ScoredAggregate {
            aggregate: aggregate("A", 1, 1, 1.0),
            r_score: 4,
            f_score: 2,
            m_score: 3,
        };
        assert_eq!(scored.combination(), 423);
        assert_eq!(scored.combination_code(), "423");
        assert_eq!(scored.total_score(), 9);
    }
}
