use std::collections::BTreeMap;

use crate::models::{DeduplicatedOrder, OrderRecord};

/// Keeps one line per order id, ordered by ascending order id.
///
/// Lines sharing an id are ranked by id alone with a stable order, so the
/// first occurrence in the input survives. No other field is consulted.
pub fn dedupe_orders(records: &[OrderRecord]) -> Vec<DeduplicatedOrder> {
    let mut kept: BTreeMap<&str, &OrderRecord> = BTreeMap::new();

    for record in records {
        kept.entry(record.order_id.as_str()).or_insert(record);
    }

    let orders: Vec<DeduplicatedOrder> = kept
        .into_values()
        .map(|record| DeduplicatedOrder {
            record: record.clone(),
        })
        .collect();

    tracing::debug!(
        lines = records.len(),
        orders = orders.len(),
        "deduplicated order lines"
    );
    orders
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::collections::HashSet;

    fn line(order_id: &str, customer: &str, sales: f64) -> OrderRecord {
        let date = NaiveDate::from_ymd_opt(2013, 3, 14).unwrap();
        OrderRecord {
            order_id: order_id.to_string(),
            customer_name: customer.to_string(),
            order_date: date,
            ship_date: date,
            sales,
        }
    }

    #[test]
    fn keeps_one_line_per_order_id() {
        let records = vec![
            line("CA-3", "Claire Gute", 10.0),
            line("CA-1", "Darrin Van Huff", 20.0),
            line("CA-3", "Claire Gute", 30.0),
            line("CA-2", "Claire Gute", 40.0),
            line("CA-1", "Darrin Van Huff", 50.0),
        ];

        let orders = dedupe_orders(&records);
        let distinct: HashSet<&str> = records.iter().map(|r| r.order_id.as_str()).collect();
        assert_eq!(orders.len(), distinct.len());

        let ids: Vec<&str> = orders.iter().map(|o| o.record.order_id.as_str()).collect();
        assert_eq!(ids, vec!["CA-1", "CA-2", "CA-3"]);
    }

    #[test]
    fn first_line_in_input_order_wins() {
        let records = vec![
            line("CA-9", "Sean Miller", 999.0),
            line("CA-9", "Sean Miller", 1.0),
        ];

        let orders = dedupe_orders(&records);
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].record.sales, 999.0);
    }

    #[test]
    fn empty_input_yields_no_orders() {
        assert!(dedupe_orders(&[]).is_empty());
    }
}
