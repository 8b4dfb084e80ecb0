//! # partbatch - batch planner and submission demo
//!
//! Records a synthetic workload into a bucketed transaction store and submits
//! it to an in-process table or document backend, then reports the outcome
//! of every bucket.

use clap::Parser;
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::filter::EnvFilter;

use partbatch::{
    submit_document_batches, submit_table_transactions, ActionKind, ActionMode,
    BucketedTransactionStore, CancellationToken, DocumentActionAdapter, GroupOutcome,
    InMemoryDocumentService, InMemoryTableService, StoreConfig, SubmissionSummary,
    TableActionAdapter,
};

/// Groups a synthetic stream of entity operations into partition-homogeneous
/// atomic batches and submits them to an in-process backend.
#[derive(Parser, Debug)]
#[command(
    name = "partbatch",
    version,
    about = "Partition-aware atomic batching for table and document stores"
)]
struct Args {
    /// Backend to submit to - 'table' or 'document'.
    #[arg(long, default_value = "table")]
    backend: String,

    /// Number of distinct partition keys in the workload.
    #[arg(long, default_value_t = 3)]
    partitions: usize,

    /// Number of operations recorded per partition.
    #[arg(long, default_value_t = 250)]
    ops_per_partition: usize,

    /// Operation kind - 'add', 'get', 'update', 'upsert' or 'delete'.
    /// Everything except 'add' and 'upsert' runs against pre-seeded entities.
    #[arg(long, default_value = "add")]
    kind: String,

    /// Merge or replace semantics for 'update' and 'upsert'.
    /// The document backend has no merge/replace primitives and rejects this.
    #[arg(long)]
    mode: Option<String>,

    /// Partition keys whose batches the backend should reject.
    /// May be given more than once.
    #[arg(long)]
    fail_partition: Vec<String>,

    /// Actions per bucket before it is sealed (1-100).
    #[arg(long, default_value_t = 100)]
    max_actions_per_group: usize,

    /// Log level - 'trace', 'debug', 'info', 'warn', or 'error'.
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Print the report as JSON.
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct DemoEntity {
    partition: String,
    id: String,
    value: u64,
}

fn entity_partition(e: &DemoEntity) -> String {
    e.partition.clone()
}

fn entity_id(e: &DemoEntity) -> String {
    e.id.clone()
}

#[derive(Serialize)]
struct Report {
    backend: String,
    kind: ActionKind,
    summary: SubmissionSummary,
    groups: Vec<GroupReport>,
}

#[derive(Serialize)]
struct GroupReport {
    key: String,
    partition_key: String,
    actions: usize,
    status: &'static str,
    error: Option<String>,
}

impl GroupReport {
    fn from_outcome<R>(outcome: &GroupOutcome<R>) -> Self {
        let status = if outcome.is_success() {
            "committed"
        } else if outcome.is_cancelled() {
            "cancelled"
        } else {
            "failed"
        };

        Self {
            key: outcome.key.clone(),
            partition_key: outcome.partition_key.clone(),
            actions: outcome.action_count,
            status,
            error: outcome.error().map(|e| e.source.to_string()),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    initialize_tracing(&args.log_level)?;

    let mode = args
        .mode
        .as_deref()
        .map(str::parse::<ActionMode>)
        .transpose()?;
    let kind = parse_kind(&args.kind, mode)?;
    let config = StoreConfig::new(args.max_actions_per_group);
    config.validate()?;

    let cancel = CancellationToken::new();
    setup_signal_handler(cancel.clone());

    let entities = workload(args.partitions, args.ops_per_partition);
    info!(
        "Recording {} {} operations across {} partitions",
        entities.len(),
        kind,
        args.partitions
    );

    let report = match args.backend.to_lowercase().as_str() {
        "table" => run_table(&args, kind, config, entities, &cancel).await?,
        "document" => run_document(&args, kind, config, entities, &cancel).await?,
        other => anyhow::bail!("Invalid backend: {}. Must be 'table' or 'document'", other),
    };

    print_report(&report, args.json)?;

    if !report.summary.all_succeeded() {
        error!(
            "{} of {} groups were not committed",
            report.summary.groups - report.summary.succeeded,
            report.summary.groups
        );
        anyhow::bail!("submission incomplete");
    }

    Ok(())
}

/// Initialize the tracing/logging system with the specified log level.
fn initialize_tracing(log_level: &str) -> anyhow::Result<()> {
    let env_filter = match log_level {
        "trace" | "debug" | "info" | "warn" | "error" => EnvFilter::new(log_level),
        _ => {
            eprintln!("Invalid log level: {}. Using 'info'", log_level);
            EnvFilter::new("info")
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}

/// Cancel outstanding submissions on Ctrl-C.
fn setup_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received interrupt, cancelling remaining groups");
            cancel.cancel();
        }
    });
}

fn parse_kind(kind: &str, mode: Option<ActionMode>) -> anyhow::Result<ActionKind> {
    let kind = match (kind.to_lowercase().as_str(), mode) {
        ("add", None) => ActionKind::Add,
        ("get", None) => ActionKind::Get,
        ("delete", None) => ActionKind::Delete,
        ("update", None) => ActionKind::Update,
        ("update", Some(mode)) => ActionKind::update(mode),
        ("upsert", None) => ActionKind::Upsert,
        ("upsert", Some(mode)) => ActionKind::upsert(mode),
        ("add" | "get" | "delete", Some(_)) => {
            anyhow::bail!("--mode only applies to 'update' and 'upsert'")
        }
        (other, _) => anyhow::bail!(
            "Invalid kind: {}. Must be 'add', 'get', 'update', 'upsert' or 'delete'",
            other
        ),
    };
    Ok(kind)
}

/// Whether the kind needs the entities to exist before it runs.
fn needs_seed(kind: ActionKind) -> bool {
    !matches!(
        kind,
        ActionKind::Add | ActionKind::Upsert | ActionKind::UpsertMerge | ActionKind::UpsertReplace
    )
}

fn workload(partitions: usize, ops_per_partition: usize) -> Vec<DemoEntity> {
    // Interleave partitions so grouping has to do real work.
    (0..ops_per_partition)
        .flat_map(|i| {
            (0..partitions).map(move |p| DemoEntity {
                partition: format!("tenant-{}", p),
                id: format!("item-{}", i),
                value: i as u64,
            })
        })
        .collect()
}

async fn run_table(
    args: &Args,
    kind: ActionKind,
    config: StoreConfig,
    entities: Vec<DemoEntity>,
    cancel: &CancellationToken,
) -> anyhow::Result<Report> {
    let service = InMemoryTableService::new(|e: &DemoEntity| (e.partition.clone(), e.id.clone()))
        .with_merge(|stored: &DemoEntity, incoming: &DemoEntity| DemoEntity {
            value: stored.value + incoming.value,
            ..incoming.clone()
        });
    let adapter = TableActionAdapter::new(entity_partition as fn(&DemoEntity) -> String);

    if needs_seed(kind) {
        let mut seed = BucketedTransactionStore::with_config(adapter.clone(), config.clone())?;
        seed.add_all(entities.iter().cloned())?;
        let seeded = submit_table_transactions(&seed, &service, cancel).await;
        info!("Seeded {} groups", seeded.len());
    }

    for partition in &args.fail_partition {
        service.fail_partition(partition);
    }

    let mut store = BucketedTransactionStore::with_config(adapter, config)?;
    store.record_all(entities, kind)?;
    info!("Planned {} groups", store.len());

    let outcomes = submit_table_transactions(&store, &service, cancel).await;
    info!("Table now holds {} rows", service.len());

    Ok(Report {
        backend: "table".to_string(),
        kind,
        summary: SubmissionSummary::from_outcomes(&outcomes),
        groups: outcomes.iter().map(GroupReport::from_outcome).collect(),
    })
}

async fn run_document(
    args: &Args,
    kind: ActionKind,
    config: StoreConfig,
    entities: Vec<DemoEntity>,
    cancel: &CancellationToken,
) -> anyhow::Result<Report> {
    let service = InMemoryDocumentService::new(entity_partition, entity_id);

    if needs_seed(kind) {
        for entity in &entities {
            service.insert(entity.clone());
        }
    }

    for partition in &args.fail_partition {
        service.fail_partition(partition);
    }

    let adapter = DocumentActionAdapter::new(entity_partition as fn(&DemoEntity) -> String);
    let mut store = BucketedTransactionStore::with_config(adapter, config)?;
    store.record_all(entities, kind)?;
    info!("Planned {} groups", store.len());

    let outcomes = submit_document_batches(&store, &service, entity_id, cancel).await?;
    info!("Container now holds {} items", service.len());

    Ok(Report {
        backend: "document".to_string(),
        kind,
        summary: SubmissionSummary::from_outcomes(&outcomes),
        groups: outcomes.iter().map(GroupReport::from_outcome).collect(),
    })
}

fn print_report(report: &Report, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!("Backend:   {}", report.backend);
    println!("Kind:      {}", report.kind);
    println!(
        "Groups:    {} ({} committed, {} failed, {} cancelled)",
        report.summary.groups,
        report.summary.succeeded,
        report.summary.failed,
        report.summary.cancelled
    );
    println!(
        "Actions:   {} committed, {} not committed",
        report.summary.actions_committed, report.summary.actions_not_committed
    );
    println!();
    for group in &report.groups {
        match &group.error {
            Some(err) => println!(
                "  {:<24} {:>3} actions  {}: {}",
                group.key, group.actions, group.status, err
            ),
            None => println!("  {:<24} {:>3} actions  {}", group.key, group.actions, group.status),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_kind_with_mode() {
        assert_eq!(
            parse_kind("update", Some(ActionMode::Replace)).unwrap(),
            ActionKind::UpdateReplace
        );
        assert_eq!(parse_kind("UPSERT", None).unwrap(), ActionKind::Upsert);
    }

    #[test]
    fn test_parse_kind_rejects_mode_on_add() {
        assert!(parse_kind("add", Some(ActionMode::Merge)).is_err());
    }

    #[test]
    fn test_parse_kind_unknown() {
        assert!(parse_kind("truncate", None).is_err());
    }

    #[test]
    fn test_workload_interleaves_partitions() {
        let entities = workload(2, 3);
        assert_eq!(entities.len(), 6);
        assert_eq!(entities[0].partition, "tenant-0");
        assert_eq!(entities[1].partition, "tenant-1");
        assert_eq!(entities[2].id, "item-1");
    }

    #[test]
    fn test_needs_seed() {
        assert!(!needs_seed(ActionKind::Add));
        assert!(!needs_seed(ActionKind::UpsertMerge));
        assert!(needs_seed(ActionKind::Delete));
        assert!(needs_seed(ActionKind::UpdateReplace));
    }
}
