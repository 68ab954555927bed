use std::fs::File;
use std::path::PathBuf;
use std::time::Duration;

use port_probe_rs::ports::{self, Mode};
use port_probe_rs::scanner::{self, NetProber, ScanOptions, SharedProgress};
use port_probe_rs::server;
use port_probe_rs::types::ScanResults;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// port-probe-rs — ping, TCP connect and banner checks for a host's service ports.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "port-probe-rs",
    version,
    about = "Ping, TCP connect and banner checks for the service ports of one host.",
    long_about = None
)]
struct Cli {
    /// Target host name or IP address.
    #[arg(long, default_value = "localhost")]
    host: String,

    /// Built-in endpoint table to use when no endpoints file is given.
    #[arg(long, value_enum, default_value_t = Mode::Client)]
    mode: Mode,

    /// Path to an endpoints file (`port[/tcp|udp] [name]` per line).
    #[arg(long)]
    ports: Option<PathBuf>,

    /// Extra endpoint as `port[:name]`. May be repeated.
    #[arg(long = "custom")]
    custom: Vec<String>,

    /// Ping+connect attempts per endpoint.
    #[arg(long, default_value_t = 3)]
    attempts: usize,

    /// Per-attempt timeout in milliseconds.
    #[arg(long = "timeout-ms", default_value_t = 1000)]
    timeout_ms: u64,

    /// Capture service banners on open TCP ports.
    #[arg(long, default_value_t = false)]
    banner: bool,

    /// Maximum banner size in bytes.
    #[arg(long = "banner-max-bytes", default_value_t = 256)]
    banner_max_bytes: usize,

    /// Write results as pretty JSON to this path (optional).
    #[arg(long)]
    output: Option<PathBuf>,

    /// Start the embedded HTTP UI/API server instead of a one-shot scan.
    #[arg(long = "serve-ui", default_value_t = false)]
    serve_ui: bool,

    /// Bind address for the HTTP server.
    #[arg(long, default_value = "127.0.0.1:8080")]
    bind: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    if cli.attempts == 0 {
        bail!("--attempts must be at least 1");
    }

    let opts = ScanOptions {
        attempts: cli.attempts,
        attempt_timeout: Duration::from_millis(cli.timeout_ms),
        read_banner: cli.banner,
        banner_max_bytes: cli.banner_max_bytes.max(1),
    };

    if cli.serve_ui {
        info!(bind = %cli.bind, "starting HTTP server (Ctrl+C to stop)");
        tokio::select! {
            res = server::spawn_server(&cli.bind, opts) => res?,
            _ = tokio::signal::ctrl_c() => info!("shutting down"),
        }
        return Ok(());
    }

    let mut endpoints = match cli.ports.as_deref() {
        Some(path) => ports::load_endpoints_or_default(path, cli.mode),
        None => ports::default_endpoints(cli.mode),
    };
    for arg in &cli.custom {
        let (port, name) = ports::split_custom_arg(arg);
        ports::add_custom_endpoint(&mut endpoints, port, name)
            .with_context(|| format!("invalid --custom value: {arg}"))?;
    }
    let host = cli.host.trim();
    if host.is_empty() {
        bail!("Target host is required.");
    }

    println!("port-probe-rs configuration:");
    println!("  host         : {}", host);
    println!("  mode         : {}", cli.mode.label());
    println!("  endpoints    : {}", endpoints.len());
    println!("  attempts     : {}", opts.attempts);
    println!("  timeout_ms   : {}", cli.timeout_ms);
    println!("  banner       : {}", opts.read_banner);
    println!(
        "  output       : {}",
        cli.output
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<none>".to_string())
    );

    // Ctrl-C cancels the scan between attempts.
    let cancel = CancellationToken::new();
    let cancel_ctrlc = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        cancel_ctrlc.cancel();
    });

    let results = scanner::scan_with(
        &NetProber,
        host,
        &endpoints,
        &opts,
        cancel,
        SharedProgress::new(),
    )
    .await;
    print_results_table(&results);

    if let Some(path) = cli.output.as_deref() {
        match write_results_json(path, &results) {
            Ok(()) => println!("Wrote JSON results to {}", path.display()),
            Err(e) => warn!("failed to write JSON to {}: {e:#}", path.display()),
        }
    }

    Ok(())
}

fn print_results_table(results: &ScanResults) {
    let mut name_w = "name".len();
    let mut details_w = "details".len();
    for r in &results.rows {
        name_w = name_w.max(r.endpoint.name.len());
        details_w = details_w.max(r.details().len().min(60));
    }
    let port_w = "port/proto".len();
    let group_w = 12usize;
    let ping_w = "ping_ms".len();
    let status_w = "unreachable".len();

    println!(
        "\nHost {}: open ports: {} (checked: {} of {})",
        results.host,
        results.open_count,
        results.checked_count,
        results.rows.len()
    );
    println!(
        "{:<name_w$}  {:<port_w$}  {:<group_w$}  {:>ping_w$}  {:<status_w$}  {:<details_w$}",
        "name", "port/proto", "group", "ping_ms", "status", "details",
    );
    println!(
        "{:-<name_w$}  {:-<port_w$}  {:-<group_w$}  {:-<ping_w$}  {:-<status_w$}  {:-<details_w$}",
        "", "", "", "", "", "",
    );
    for r in &results.rows {
        let ping = match &r.ping {
            Some(p) if p.ok => p.roundtrip_ms.map(|ms| ms.to_string()).unwrap_or_default(),
            Some(_) => "fail".to_string(),
            None => "-".to_string(),
        };
        let status = r
            .probe
            .as_ref()
            .map(|p| p.status.to_string())
            .unwrap_or_else(|| "-".to_string());
        let mut details = r.details();
        if details.len() > 60 {
            details = details.chars().take(60).collect();
        }
        let mut group = r.endpoint.group.clone();
        if group.len() > group_w {
            group = group.chars().take(group_w).collect();
        }
        println!(
            "{:<name_w$}  {:<port_w$}  {:<group_w$}  {:>ping_w$}  {:<status_w$}  {:<details_w$}",
            r.endpoint.name,
            format!("{}/{}", r.endpoint.port, r.endpoint.transport),
            group,
            ping,
            status,
            details,
        );
    }

    let banners: Vec<_> = results
        .rows
        .iter()
        .filter_map(|r| Some((r, r.probe.as_ref()?.banner.as_ref()?)))
        .collect();
    if !banners.is_empty() {
        println!("\nBanners:");
        for (r, b) in banners {
            let b = b.replace('\n', "\\n").replace('\r', "\\r");
            println!("  {} {}: {}", r.endpoint.name, r.endpoint.port, b);
        }
    }
}

fn write_results_json(path: &std::path::Path, results: &ScanResults) -> anyhow::Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, results)?;
    Ok(())
}
