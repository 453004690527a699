//! Merge MySQL tables by event time and print the merged rows as JSON lines.
//!
//! Each output line is `{"source": .., "continues": .., "row": {..}}`. Logs go
//! to stderr; set `RUST_LOG=timeweave=debug` for per-source detail.

use std::{
    io::{self, Write},
    time::Duration,
};

use clap::Parser;
use timeweave::{
    source::{
        mysql::{MySqlSourceFactory, MySqlSourceOptions},
        SourceDescriptor,
    },
    Merge, MergeError, MergeOption, MergeRegistry,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Merge MySQL tables into one event-time ordered stream"
)]
struct Args {
    #[arg(long, env = "TIMEWEAVE_MYSQL_HOST", default_value = "localhost")]
    host: String,
    #[arg(long, env = "TIMEWEAVE_MYSQL_PORT", default_value_t = 3306)]
    port: u16,
    #[arg(long, env = "TIMEWEAVE_MYSQL_USER", default_value = "root")]
    user: String,
    #[arg(long, env = "TIMEWEAVE_MYSQL_PASSWORD", hide_env_values = true)]
    password: Option<String>,
    #[arg(long, env = "TIMEWEAVE_MYSQL_DATABASE")]
    database: Option<String>,
    /// Source to merge, as `name=table,field,format`. Repeat per table.
    #[arg(long = "source", required = true)]
    sources: Vec<SourceDescriptor>,
    /// Give up on a source whose fetch takes longer than this.
    #[arg(long)]
    fetch_timeout_ms: Option<u64>,
    /// Scan each table ordered by its timestamp field.
    #[arg(long)]
    order_by_timestamp: bool,
    /// Stop after emitting this many rows.
    #[arg(long)]
    limit: Option<usize>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    let mut options = MySqlSourceOptions::default()
        .host(args.host)
        .port(args.port)
        .user(args.user)
        .order_by_timestamp(args.order_by_timestamp);
    if let Some(password) = args.password {
        options = options.password(password);
    }
    if let Some(database) = args.database {
        options = options.database(database);
    }

    let mut option = MergeOption::default();
    if let Some(ms) = args.fetch_timeout_ms {
        option = option.fetch_timeout(Duration::from_millis(ms));
    }

    let mut registry = MergeRegistry::with_option(MySqlSourceFactory::new(options), option);
    let outcome = drive(&mut registry, args.sources, args.limit).await;
    registry.close().await;
    outcome
}

async fn drive(
    registry: &mut MergeRegistry<MySqlSourceFactory>,
    sources: Vec<SourceDescriptor>,
    limit: Option<usize>,
) -> anyhow::Result<()> {
    for descriptor in sources {
        registry.register(descriptor).await?;
    }

    let mut out = io::stdout().lock();
    let mut emitted = 0usize;
    while limit.map_or(true, |limit| emitted < limit) {
        let popped = match registry.pop_next().await {
            Ok(popped) => popped,
            Err(MergeError::EmptySelection) => break,
            Err(err) => return Err(err.into()),
        };
        let continues = popped.has_more();
        serde_json::to_writer(
            &mut out,
            &serde_json::json!({
                "source": popped.source,
                "continues": continues,
                "row": popped.row,
            }),
        )?;
        out.write_all(b"\n")?;
        emitted += 1;
    }
    out.flush()?;

    tracing::info!(
        target: "timeweave",
        event = "merge_finished",
        rows = emitted,
        sources = registry.len(),
        exhausted = registry.exhausted_count(),
    );
    for name in registry.source_names() {
        if let Some(err) = registry.failure(name) {
            tracing::warn!(target: "timeweave", event = "source_failed", source = %name, error = %err);
        }
    }
    Ok(())
}
