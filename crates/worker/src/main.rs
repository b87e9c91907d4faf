use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use council_core::pipeline::{
    OpportunityPipeline, DEFAULT_MAX_OPPORTUNITIES, DEFAULT_MIN_SCORE,
};
use council_core::storage::{lock, opportunities};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "council_worker")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Trigger scan over the watchlist, then council analysis of every triggered asset.
    DailyScan {
        /// Comma-separated symbols. Defaults to the built-in watchlist.
        #[arg(long, value_delimiter = ',')]
        symbols: Vec<String>,
        #[arg(long, default_value_t = DEFAULT_MIN_SCORE)]
        min_score: f64,
        #[arg(long, default_value_t = DEFAULT_MAX_OPPORTUNITIES)]
        max_opportunities: usize,
        /// Scan date (YYYY-MM-DD) used for the run lock. Defaults to today (UTC).
        #[arg(long)]
        scan_date: Option<String>,
        #[command(flatten)]
        common: Common,
    },
    /// Council analysis of an explicit list of symbols, no trigger scan.
    WatchlistScan {
        #[arg(long, value_delimiter = ',', required = true)]
        symbols: Vec<String>,
        /// Skip fetching market data for the council's context.
        #[arg(long)]
        no_context: bool,
        #[command(flatten)]
        common: Common,
    },
    /// Refresh current prices of recently stored opportunities.
    UpdatePrices {
        #[arg(long, default_value_t = 30)]
        days: i64,
        #[command(flatten)]
        common: Common,
    },
    /// Delete stored opportunities older than the retention window.
    Cleanup {
        #[arg(long, default_value_t = 90)]
        days: i64,
        #[command(flatten)]
        common: Common,
    },
}

#[derive(Debug, Args)]
struct Common {
    /// Do everything except writing to the database.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = council_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let cli = Cli::parse();
    let result = run(&settings, cli.command).await;
    if let Err(err) = &result {
        sentry_anyhow::capture_anyhow(err);
        tracing::error!(error = %err, "worker run failed");
    }
    result
}

async fn run(settings: &council_core::config::Settings, command: Command) -> anyhow::Result<()> {
    match command {
        Command::DailyScan {
            symbols,
            min_score,
            max_opportunities,
            scan_date,
            common,
        } => {
            let scan_date = resolve_scan_date(scan_date.as_deref())?;
            let pipeline = OpportunityPipeline::from_settings(settings)?;
            let watchlist = Some(symbols.as_slice()).filter(|s| !s.is_empty());

            if common.dry_run {
                let report = pipeline
                    .run_daily_scan(watchlist, None, min_score, max_opportunities)
                    .await?;
                tracing::info!(
                    %scan_date,
                    dry_run = true,
                    scan_id = %report.scan_id,
                    opportunities = report.opportunities.len(),
                    top_score = ?report.top_score,
                    "daily scan finished"
                );
                return Ok(());
            }

            let pool = connect(settings).await?;
            let mut conn = pool.acquire().await.context("acquire connection failed")?;
            if !lock::try_acquire_daily_scan_lock(&mut conn, scan_date).await? {
                tracing::warn!(%scan_date, "daily scan lock not acquired; another run in progress");
                return Ok(());
            }

            let outcome = async {
                let report = pipeline
                    .run_daily_scan(watchlist, None, min_score, max_opportunities)
                    .await?;
                let ids =
                    opportunities::persist_batch(&pool, report.scan_id, &report.opportunities)
                        .await?;
                tracing::info!(
                    %scan_date,
                    scan_id = %report.scan_id,
                    triggered = report.triggered_count,
                    persisted = ids.len(),
                    "daily scan persisted"
                );
                anyhow::Ok(())
            }
            .await;

            let _ = lock::release_daily_scan_lock(&mut conn, scan_date).await;
            outcome
        }
        Command::WatchlistScan {
            symbols,
            no_context,
            common,
        } => {
            let pipeline = OpportunityPipeline::from_settings(settings)?;
            let scan = pipeline.run_watchlist_scan(&symbols, !no_context).await?;

            for opp in &scan.opportunities {
                tracing::info!(
                    symbol = %opp.symbol,
                    score = opp.score,
                    consensus = opp.consensus_position.map(|p| p.as_str()).unwrap_or("none"),
                    "opportunity"
                );
            }

            if common.dry_run {
                tracing::info!(dry_run = true, scan_id = %scan.scan_id, "watchlist scan finished");
                return Ok(());
            }

            let pool = connect(settings).await?;
            let ids = opportunities::persist_batch(&pool, scan.scan_id, &scan.opportunities).await?;
            tracing::info!(scan_id = %scan.scan_id, persisted = ids.len(), "watchlist scan persisted");
            Ok(())
        }
        Command::UpdatePrices { days, common } => {
            let pool = connect(settings).await?;
            if common.dry_run {
                let stats = opportunities::stats(&pool, days).await?;
                tracing::info!(dry_run = true, days, candidates = stats.total, "price refresh skipped");
                return Ok(());
            }

            let market = council_core::ingest::provider::FinnhubProvider::from_settings(settings)?;
            let updated = opportunities::refresh_prices(&pool, &market, days).await?;
            tracing::info!(days, updated, "price refresh finished");
            Ok(())
        }
        Command::Cleanup { days, common } => {
            let pool = connect(settings).await?;
            if common.dry_run {
                let stale = opportunities::count_older_than(&pool, days).await?;
                tracing::info!(dry_run = true, days, stale, "cleanup skipped");
                return Ok(());
            }

            let deleted = opportunities::delete_older_than(&pool, days).await?;
            tracing::info!(days, deleted, "cleanup finished");
            Ok(())
        }
    }
}

async fn connect(settings: &council_core::config::Settings) -> anyhow::Result<sqlx::PgPool> {
    let db_url = settings.require_database_url()?;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await
        .context("connect DATABASE_URL failed")?;
    council_core::storage::migrate(&pool).await?;
    Ok(pool)
}

fn init_sentry(settings: &council_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

fn resolve_scan_date(arg: Option<&str>) -> anyhow::Result<chrono::NaiveDate> {
    match arg {
        Some(s) => chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .with_context(|| format!("invalid --scan-date {s}")),
        None => Ok(chrono::Utc::now().date_naive()),
    }
}
