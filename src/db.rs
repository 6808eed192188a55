use anyhow::Context;
use chrono::{NaiveDate, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::ingest::ImportedOrder;
use crate::models::OrderRecord;
use crate::pipeline::RfmAnalysis;

/// Advisory lock key serializing snapshot writes.
const ANALYSIS_LOCK_KEY: i64 = 0x52_46_4d;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<usize> {
    let lines = vec![
        ("seed-001", "CA-2013-100006", "Dennis Kane", (2013, 9, 7), 377.97),
        ("seed-002", "CA-2013-100090", "Ed Braxton", (2013, 7, 8), 502.49),
        ("seed-003", "CA-2013-100090", "Ed Braxton", (2013, 7, 8), 196.70),
        ("seed-004", "CA-2013-100293", "Neil Franzosisch", (2013, 3, 14), 91.06),
        ("seed-005", "CA-2013-100328", "Jasper Cacioppo", (2013, 1, 28), 3.93),
        ("seed-006", "CA-2013-100363", "Jim Mitchum", (2013, 4, 8), 21.38),
        ("seed-007", "CA-2013-100391", "Barry Weirich", (2013, 5, 25), 14.62),
        ("seed-008", "CA-2013-100419", "Dennis Kane", (2013, 12, 16), 48.86),
        ("seed-009", "CA-2013-100426", "Ed Braxton", (2013, 12, 30), 7.78),
        ("seed-010", "CA-2013-100454", "Jim Mitchum", (2013, 12, 31), 1264.20),
    ];

    let mut orders = Vec::with_capacity(lines.len());
    for (source_key, order_id, customer_name, (year, month, day), sales) in lines {
        let order_date = NaiveDate::from_ymd_opt(year, month, day).context("invalid date")?;
        orders.push(ImportedOrder {
            source_key: source_key.to_string(),
            record: OrderRecord {
                order_id: order_id.to_string(),
                customer_name: customer_name.to_string(),
                order_date,
                ship_date: order_date + chrono::Duration::days(4),
                sales,
            },
        });
    }

    import_orders(pool, &orders).await
}

pub async fn import_orders(pool: &PgPool, orders: &[ImportedOrder]) -> anyhow::Result<usize> {
    let mut tx = pool.begin().await?;
    let mut inserted = 0usize;

    for order in orders {
        let record = &order.record;

        let result = sqlx::query(
            r#"
            INSERT INTO rfm_segmentation.order_lines
            (id, source_key, order_id, customer_name, order_date, ship_date, sales)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&order.source_key)
        .bind(&record.order_id)
        .bind(&record.customer_name)
        .bind(record.order_date)
        .bind(record.ship_date)
        .bind(record.sales)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() > 0 {
            inserted += 1;
        }
    }

    tx.commit().await?;
    tracing::info!(inserted, offered = orders.len(), "stored order lines");
    Ok(inserted)
}

/// All stored order lines in import order.
pub async fn fetch_orders(pool: &PgPool) -> anyhow::Result<Vec<OrderRecord>> {
    let rows = sqlx::query(
        "SELECT order_id, customer_name, order_date, ship_date, sales \
         FROM rfm_segmentation.order_lines \
         ORDER BY line_no",
    )
    .fetch_all(pool)
    .await?;

    let mut orders = Vec::with_capacity(rows.len());
    for row in rows {
        orders.push(OrderRecord {
            order_id: row.get("order_id"),
            customer_name: row.get("customer_name"),
            order_date: row.get("order_date"),
            ship_date: row.get("ship_date"),
            sales: row.get("sales"),
        });
    }

    tracing::debug!(lines = orders.len(), "fetched order lines");
    Ok(orders)
}

/// Stores a full snapshot of `rfm_analysis`. Concurrent writers queue on an
/// advisory lock held for the life of the transaction.
pub async fn save_analysis(pool: &PgPool, analysis: &RfmAnalysis) -> anyhow::Result<Uuid> {
    let run_id = Uuid::new_v4();
    let mut tx = pool.begin().await?;

    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(ANALYSIS_LOCK_KEY)
        .execute(&mut *tx)
        .await
        .context("failed to acquire analysis lock")?;

    sqlx::query(
        r#"
        INSERT INTO rfm_segmentation.analysis_runs
        (id, computed_at, reference_date, order_count, customer_count)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(run_id)
    .bind(Utc::now())
    .bind(analysis.reference_date)
    .bind(analysis.unique_orders.len() as i64)
    .bind(analysis.rfm_analysis.len() as i64)
    .execute(&mut *tx)
    .await?;

    for customer in &analysis.rfm_analysis {
        let scored = &customer.scored;
        let aggregate = &scored.aggregate;

        sqlx::query(
            r#"
            INSERT INTO rfm_segmentation.customer_segments
            (run_id, customer_name, last_order_date, recency, frequency, monetary,
             r_score, f_score, m_score, total_score, combination, segment)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(run_id)
        .bind(&aggregate.customer_name)
        .bind(aggregate.last_order_date)
        .bind(aggregate.recency)
        .bind(aggregate.frequency as i64)
        .bind(aggregate.monetary)
        .bind(i16::from(scored.r_score))
        .bind(i16::from(scored.f_score))
        .bind(i16::from(scored.m_score))
        .bind(i16::from(scored.total_score()))
        .bind(i32::from(scored.combination()))
        .bind(customer.segment.as_str())
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    tracing::info!(%run_id, customers = analysis.rfm_analysis.len(), "saved analysis snapshot");
    Ok(run_id)
}
