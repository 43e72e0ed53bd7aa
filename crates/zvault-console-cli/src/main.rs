//! `zvault-console` — terminal front end for the `ZVault` console data layer.
//!
//! Every command goes through `zvault-console`: paths are built from the
//! resource registry, payloads are normalized into records, and long-running
//! work runs under the operation monitor.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use zvault_console::route::Paginated;
use zvault_console::{
    Attributes, ConsoleClient, ConsoleConfig, ListRoute, OperationState, PollHandle, Record,
    ResourceKind, UploadOperation, resource,
};

// ── ANSI color helpers ───────────────────────────────────────────────

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const WHITE: &str = "\x1b[37m";

// ── CLI structure ────────────────────────────────────────────────────

/// ZVault console — browse resources the way the web console sees them.
#[derive(Parser)]
#[command(
    name = "zvault-console",
    version,
    about = "ZVault console CLI — list and read resources, switch namespaces, restore snapshots",
    long_about = None,
    after_help = format!(
        "{DIM}Environment variables:{RESET}\n  \
         VAULT_ADDR                Server address (default: http://127.0.0.1:8200)\n  \
         VAULT_TOKEN               Authentication token\n  \
         VAULT_NAMESPACE           Namespace (default: root)\n  \
         ZVAULT_POLL_INTERVAL_MS   Status poll delay (default: 2000)\n  \
         ZVAULT_TEST_MODE          Disable background polling\n  \
         ZVAULT_LOG_LEVEL          Log filter (default: info)\n\n\
         {DIM}Examples:{RESET}\n  \
         zvault-console kinds\n  \
         zvault-console list secret-engine\n  \
         zvault-console list pki-role --backend pki --filter web\n  \
         zvault-console read policy default\n  \
         zvault-console snapshot-restore backup.snap\n  \
         zvault-console tidy-status pki --count 3"
    ),
)]
struct Cli {
    /// ZVault server address.
    #[arg(long, env = "VAULT_ADDR")]
    addr: Option<String>,

    /// Authentication token.
    #[arg(long, env = "VAULT_TOKEN")]
    token: Option<String>,

    /// Namespace to operate in.
    #[arg(long, short = 'n', env = "VAULT_NAMESPACE")]
    namespace: Option<String>,

    /// Print records as JSON.
    #[arg(long, default_value = "false")]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the built-in resource kinds.
    Kinds,
    /// List records of a resource kind.
    List {
        /// Resource kind (see `kinds`).
        kind: String,
        /// Mount path for backend-scoped kinds (e.g. `pki`).
        #[arg(long)]
        backend: Option<String>,
        /// Page to show, starting at 1.
        #[arg(long, default_value = "1")]
        page: usize,
        /// Only show records whose id contains this text.
        #[arg(long)]
        filter: Option<String>,
    },
    /// Read one record.
    Read {
        /// Resource kind (see `kinds`).
        kind: String,
        /// Record id; omit for singleton kinds.
        id: Option<String>,
        /// Mount path for backend-scoped kinds.
        #[arg(long)]
        backend: Option<String>,
    },
    /// List namespaces accessible from the current (or given) namespace.
    Namespaces {
        /// Switch to this namespace first.
        path: Option<String>,
    },
    /// Upload a raft snapshot. Ctrl-C aborts the upload.
    SnapshotRestore {
        /// Snapshot file.
        file: String,
        /// Restore even if the snapshot's keys don't match.
        #[arg(long, default_value = "false")]
        force: bool,
    },
    /// Watch a PKI mount's tidy status.
    TidyStatus {
        /// PKI mount path.
        backend: String,
        /// Number of updates to show before exiting.
        #[arg(long, default_value = "1")]
        count: u64,
    },
    /// Watch replication status.
    ReplicationStatus {
        /// Number of updates to show before exiting.
        #[arg(long, default_value = "1")]
        count: u64,
    },
}

// ── Output helpers ───────────────────────────────────────────────────

fn header(icon: &str, title: &str) {
    println!("{BOLD}{CYAN}{icon} {title}{RESET}");
    println!("{DIM}─────────────────────────────────────────{RESET}");
}

fn kv_line(key: &str, value: &str) {
    println!("  {DIM}{key:<24}{RESET} {WHITE}{value}{RESET}");
}

fn success(msg: &str) {
    println!("{GREEN}{BOLD}✓{RESET} {msg}");
}

fn warning(msg: &str) {
    println!("{YELLOW}{BOLD}⚠{RESET} {YELLOW}{msg}{RESET}");
}

fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(e) => eprintln!("failed to format JSON: {e}"),
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "—".to_owned(),
        other => other.to_string(),
    }
}

fn print_record(record: &Record, json: bool) {
    if json {
        print_json(&record.to_json());
        return;
    }
    header("◆", &format!("{} {}", record.kind, record.id));
    for (field, value) in &record.attributes {
        kv_line(field, &display_value(value));
    }
    println!();
}

// ── Helpers ──────────────────────────────────────────────────────────

fn resolve_kind(name: &str) -> Result<ResourceKind> {
    match resource::lookup(name) {
        Some(kind) => Ok(kind),
        None => bail!("unknown resource kind '{name}' (run `zvault-console kinds`)"),
    }
}

fn backend_params(backend: Option<&str>) -> Attributes {
    let mut params = Attributes::new();
    if let Some(backend) = backend {
        params.insert("backend".to_owned(), Value::String(backend.trim_matches('/').to_owned()));
    }
    params
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

// ── Command dispatch ─────────────────────────────────────────────────

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = ConsoleConfig::from_env();
    if let Some(addr) = cli.addr {
        config.addr = addr.trim_end_matches('/').to_owned();
    }
    if cli.token.is_some() {
        config.token = cli.token;
    }
    if let Some(namespace) = cli.namespace {
        config.namespace = namespace.trim_matches('/').to_owned();
    }
    init_logging(&config.log_level);

    match run(&config, cli.command, cli.json).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!();
            eprintln!("  {RED}{BOLD}✗ Error:{RESET} {e:#}");
            eprintln!();
            ExitCode::FAILURE
        }
    }
}

async fn run(config: &ConsoleConfig, cmd: Commands, json: bool) -> Result<()> {
    if matches!(cmd, Commands::Kinds) {
        cmd_kinds(json);
        return Ok(());
    }

    let client = ConsoleClient::from_config(config).context("failed to create client")?;
    debug!(addr = %config.addr, namespace = %config.namespace, "client ready");
    match cmd {
        Commands::Kinds => Ok(()),
        Commands::List {
            kind,
            backend,
            page,
            filter,
        } => cmd_list(&client, config, &kind, backend.as_deref(), page, filter.as_deref(), json).await,
        Commands::Read { kind, id, backend } => {
            cmd_read(&client, &kind, id.as_deref(), backend.as_deref(), json).await
        }
        Commands::Namespaces { path } => cmd_namespaces(&client, path.as_deref(), json).await,
        Commands::SnapshotRestore { file, force } => cmd_snapshot_restore(&client, &file, force).await,
        Commands::TidyStatus { backend, count } => {
            let kind = resource::pki_tidy_status();
            let params = backend_params(Some(&backend));
            let handle = client.tidy_status_poller(&backend);
            watch_status(&client, &kind, &params, handle, count, json).await
        }
        Commands::ReplicationStatus { count } => {
            let kind = resource::replication_status();
            let handle = client.replication_status_poller();
            watch_status(&client, &kind, &Attributes::new(), handle, count, json).await
        }
    }
}

// ── Commands ─────────────────────────────────────────────────────────

fn cmd_kinds(json: bool) {
    let kinds = resource::builtin();
    if json {
        let listing: Vec<Value> = kinds
            .iter()
            .map(|k| {
                serde_json::json!({
                    "name": k.name,
                    "path": k.path,
                    "id_attribute": k.id_attribute,
                    "namespaced": k.namespaced,
                    "singleton": k.singleton,
                })
            })
            .collect();
        print_json(&Value::Array(listing));
        return;
    }

    println!();
    header("📚", "Resource Kinds");
    for kind in &kinds {
        let mut flags = Vec::new();
        if kind.singleton {
            flags.push("singleton");
        }
        if !kind.namespaced {
            flags.push("root only");
        }
        let flags = if flags.is_empty() {
            String::new()
        } else {
            format!(" {DIM}({}){RESET}", flags.join(", "))
        };
        println!(
            "  {BOLD}{:<20}{RESET} {WHITE}{}{RESET} {DIM}id: {}{RESET}{flags}",
            kind.name, kind.path, kind.id_attribute
        );
    }
    println!();
}

async fn cmd_list(
    client: &ConsoleClient,
    config: &ConsoleConfig,
    kind: &str,
    backend: Option<&str>,
    page: usize,
    filter: Option<&str>,
    json: bool,
) -> Result<()> {
    let kind = resolve_kind(kind)?;
    let params = backend_params(backend);

    let mut route = ListRoute::new(kind.name.as_str()).with_page_size(config.page_size);
    route.set_query(page, filter);
    let page = client.query_page(&kind, &params, &route).await?;

    if json {
        let records: Vec<Value> = page.records.iter().map(Record::to_json).collect();
        print_json(&serde_json::json!({ "records": records, "meta": page.meta }));
        return Ok(());
    }

    println!();
    header("📋", &format!("{} ({})", kind.name, page.meta.filtered_total));
    if page.records.is_empty() {
        println!("  {DIM}(none){RESET}");
    }
    for record in &page.records {
        let summary = record
            .get_str("type")
            .or_else(|| record.get_str("description"))
            .unwrap_or_default();
        println!("  {WHITE}{:<32}{RESET} {DIM}{summary}{RESET}", record.id);
    }
    println!();
    println!(
        "  {DIM}page {}/{} · {} total{RESET}",
        page.meta.current_page, page.meta.last_page, page.meta.total
    );
    Ok(())
}

async fn cmd_read(
    client: &ConsoleClient,
    kind: &str,
    id: Option<&str>,
    backend: Option<&str>,
    json: bool,
) -> Result<()> {
    let kind = resolve_kind(kind)?;
    let params = backend_params(backend);

    let record = match id {
        Some(id) => client.find_record(&kind, id, &params).await?,
        None if kind.singleton => client.find_singleton(&kind, &params).await?,
        None => bail!("resource kind '{}' requires an id", kind.name),
    };

    if !json {
        println!();
    }
    print_record(&record, json);
    Ok(())
}

async fn cmd_namespaces(client: &ConsoleClient, path: Option<&str>, json: bool) -> Result<()> {
    let namespaces = client.namespaces();
    let applied = match path {
        Some(path) => namespaces.set_namespace(path).await,
        None => namespaces.find_namespaces_for_user().await,
    };

    let snapshot = namespaces.snapshot();
    if !applied {
        let current = if snapshot.is_root() { "root" } else { snapshot.path.as_str() };
        bail!("could not fetch accessible namespaces for '{current}'");
    }

    if json {
        print_json(&serde_json::json!({
            "namespace": snapshot.path,
            "accessible": snapshot.accessible,
        }));
        return Ok(());
    }

    println!();
    let current = if snapshot.is_root() { "root" } else { snapshot.path.as_str() };
    header("🗂", &format!("Namespaces under {current}"));
    if snapshot.accessible.is_empty() {
        println!("  {DIM}(none){RESET}");
    }
    for ns in &snapshot.accessible {
        println!("  {WHITE}{ns}{RESET}");
    }
    println!();
    Ok(())
}

async fn cmd_snapshot_restore(client: &ConsoleClient, file: &str, force: bool) -> Result<()> {
    let snapshot = std::fs::read(file).with_context(|| format!("failed to read snapshot file: {file}"))?;

    println!();
    header("💾", "Snapshot Restore");
    kv_line("File", file);
    kv_line("Size", &format!("{} bytes", snapshot.len()));
    if force {
        println!("  {YELLOW}⚠  Forced restore: key mismatch checks are skipped.{RESET}");
    }
    println!("  {DIM}Press Ctrl-C to abort the upload.{RESET}");
    println!();

    let operation = UploadOperation::new();
    let abort = {
        let token = operation.cancel_token();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                token.cancel();
            }
        })
    };

    let state = client.restore_snapshot(&operation, snapshot, force).await;
    abort.abort();

    match state {
        OperationState::Succeeded => {
            success("Snapshot restored");
            Ok(())
        }
        OperationState::Cancelled => {
            warning("Upload aborted");
            Ok(())
        }
        OperationState::Failed(errors) => bail!("snapshot restore failed: {}", errors.join(", ")),
        other => bail!("snapshot restore ended in state {other:?}"),
    }
}

/// Print `count` poll results, or fetch once when polling is disabled.
async fn watch_status(
    client: &ConsoleClient,
    kind: &ResourceKind,
    params: &Attributes,
    handle: PollHandle<Record>,
    count: u64,
    json: bool,
) -> Result<()> {
    if !handle.is_running() {
        let record = client.find_singleton(kind, params).await?;
        print_record(&record, json);
        return Ok(());
    }

    let mut status = handle.status();
    let mut shown = 0;
    while shown < count {
        tokio::select! {
            changed = status.changed() => changed.context("poller exited")?,
            _ = tokio::signal::ctrl_c() => {
                warning("Stopped");
                break;
            }
        }
        let current = status.borrow_and_update().clone();
        if let Some(record) = current.latest {
            shown = current.fetches;
            print_record(&record, json);
        }
    }

    handle.shutdown().await;
    Ok(())
}
