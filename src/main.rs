use std::path::PathBuf;

use anyhow::Context;
use clap::{ArgGroup, Parser, Subcommand};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod db;
mod dedup;
mod ingest;
mod models;
mod pipeline;
mod report;
mod rfm;
mod segment;

use pipeline::RfmAnalysis;
use segment::SegmentRules;

#[derive(Parser)]
#[command(name = "rfm-segmentation")]
#[command(about = "Recency, frequency and monetary segmentation of customer orders", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load sample order lines
    Seed,
    /// Import order lines from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Show customer scores, highest total first
    #[command(group(
        ArgGroup::new("scope")
            .args(["customer", "limit"])
            .multiple(false)
    ))]
    Score {
        #[arg(long)]
        customer: Option<String>,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Summarize customers per segment
    Segments {
        #[arg(long)]
        json: bool,
        /// Store the analysis as a snapshot
        #[arg(long)]
        persist: bool,
    },
    /// Generate a markdown report
    Report {
        #[arg(long, default_value = "rfm-report.md")]
        out: PathBuf,
    },
    /// Segment a CSV file directly, without a database
    Analyze {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env("RFM_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn connect() -> anyhow::Result<PgPool> {
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a Postgres instance")?;

    PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")
}

async fn analyze_stored(pool: &PgPool, rules: &SegmentRules) -> anyhow::Result<RfmAnalysis> {
    let orders = db::fetch_orders(pool).await?;
    Ok(pipeline::run_with_rules(&orders, rules))
}

fn print_segments(analysis: &RfmAnalysis, json: bool) -> anyhow::Result<()> {
    let summaries = report::summarize_by_segment(&analysis.rfm_analysis);

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }

    let Some(reference_date) = analysis.reference_date else {
        println!("No orders found.");
        return Ok(());
    };

    println!(
        "Segments for {} customers (recency as of {}):",
        analysis.rfm_analysis.len(),
        reference_date
    );
    for summary in &summaries {
        println!(
            "- {}: {} customers, avg monetary {:.2}",
            summary.segment, summary.customer_count, summary.average_monetary
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let rules = SegmentRules::new();

    match cli.command {
        Commands::InitDb => {
            let pool = connect().await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let pool = connect().await?;
            let inserted = db::seed(&pool).await?;
            println!("Seeded {inserted} order lines.");
        }
        Commands::Import { csv } => {
            let batch = ingest::read_orders_from_path(&csv)
                .with_context(|| format!("failed to read {}", csv.display()))?;
            let pool = connect().await?;
            let inserted = db::import_orders(&pool, &batch.orders).await?;
            println!(
                "Inserted {inserted} order lines from {} ({} rejected).",
                csv.display(),
                batch.rejected.len()
            );
        }
        Commands::Score { customer, limit } => {
            let pool = connect().await?;
            let analysis = analyze_stored(&pool, &rules).await?;

            if analysis.is_empty() {
                println!("No orders found.");
                return Ok(());
            }

            if let Some(name) = customer {
                let scored = analysis
                    .score_for(&name)
                    .with_context(|| format!("no orders for customer '{name}'"))?;
                let label = rules.classify(scored.combination());
                println!(
                    "{}: R{} F{} M{} (code {}, total {}) -> {}",
                    name,
                    scored.r_score,
                    scored.f_score,
                    scored.m_score,
                    scored.combination_code(),
                    scored.total_score(),
                    label
                );
                return Ok(());
            }

            let mut ranked: Vec<_> = analysis.rfm_analysis.iter().collect();
            ranked.sort_by(|a, b| {
                b.scored
                    .total_score()
                    .cmp(&a.scored.total_score())
                    .then_with(|| a.scored.customer_name().cmp(b.scored.customer_name()))
            });

            println!("Top customers by RFM score:");
            for classified in ranked.into_iter().take(limit) {
                let scored = &classified.scored;
                println!(
                    "- {} code {} total {} ({}) recency {} days, {} orders, {:.0} spent",
                    scored.customer_name(),
                    scored.combination_code(),
                    scored.total_score(),
                    classified.segment,
                    scored.aggregate.recency,
                    scored.aggregate.frequency,
                    scored.aggregate.monetary
                );
            }
        }
        Commands::Segments { json, persist } => {
            let pool = connect().await?;
            let analysis = analyze_stored(&pool, &rules).await?;

            if persist {
                let run_id = db::save_analysis(&pool, &analysis).await?;
                tracing::info!(%run_id, "analysis persisted");
            }
            print_segments(&analysis, json)?;
        }
        Commands::Report { out } => {
            let pool = connect().await?;
            let analysis = analyze_stored(&pool, &rules).await?;
            let report = report::build_report(&analysis, &rules);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
        Commands::Analyze { csv, json } => {
            let batch = ingest::read_orders_from_path(&csv)
                .with_context(|| format!("failed to read {}", csv.display()))?;
            let records: Vec<_> = batch.orders.into_iter().map(|order| order.record).collect();
            let analysis = pipeline::run(&records);
            print_segments(&analysis, json)?;
        }
    }

    Ok(())
}
