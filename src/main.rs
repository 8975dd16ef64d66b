use std::path::PathBuf;

use clap::Parser;
use serde_json::json;
use tracing::{debug, info, warn};

use pixelbot::engine::Runner;
use pixelbot::script;

/// Pixelbot CLI
#[derive(Debug, Parser)]
#[command(
    name = pixelbot::PKG_NAME,
    version = pixelbot::PKG_VERSION,
    about = "A script-driven screen automation engine (template matching + input injection)"
)]
struct Args {
    /// Path to the JSON script file
    #[arg(value_name = "SCRIPT", required_unless_present = "print_schema")]
    script: Option<PathBuf>,

    /// Enable dry-run mode (log input actions instead of injecting them)
    #[arg(long = "dry-run")]
    dry_run: bool,

    /// Set log level (e.g., trace, debug, info, warn, error). Overrides RUST_LOG.
    #[arg(long = "log-level")]
    log_level: Option<String>,

    /// Print the JSON Schema for the script format and exit
    #[arg(long = "print-schema")]
    print_schema: bool,

    /// Lint the script (unknown kinds, out-of-range jumps) and exit
    #[arg(long = "lint")]
    lint: bool,

    /// Execute a single action by index and exit (authoring aid)
    #[arg(long = "test-action", value_name = "INDEX")]
    test_action: Option<usize>,

    /// Display index to capture from (0 is the first monitor)
    #[arg(long = "display", default_value_t = 0)]
    display: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Honor --log-level by initializing tracing directly at that level.
    if let Some(level) = &args.log_level {
        let level = match level.to_lowercase().as_str() {
            "trace" => tracing::Level::TRACE,
            "debug" => tracing::Level::DEBUG,
            "info" => tracing::Level::INFO,
            "warn" | "warning" => tracing::Level::WARN,
            "error" => tracing::Level::ERROR,
            _ => tracing::Level::INFO,
        };
        let _ = tracing_subscriber::fmt().with_max_level(level).try_init();
    }

    if args.log_level.is_none() {
        pixelbot::init_tracing();
    }
    info!(
        version = pixelbot::PKG_VERSION,
        dry_run = args.dry_run,
        "Starting Pixelbot"
    );

    if args.print_schema {
        let schema = script::generate_schema();
        let json = serde_json::to_string_pretty(&schema)?;
        println!("{json}");
        return Ok(());
    }

    let Some(path) = args.script else {
        anyhow::bail!("SCRIPT path is required");
    };
    let loaded = script::load_from_path_async(&path).await?;
    debug!(
        path = %path.display(),
        actions = loaded.len(),
        "Script loaded successfully"
    );

    if args.lint {
        let warnings = script::lint_script(&loaded);
        if warnings.is_empty() {
            info!("Lint: no warnings");
        } else {
            for w in &warnings {
                warn!("Lint: {w}");
            }
        }
        return Ok(());
    }

    let mut runner = Runner::with_default_providers(args.dry_run, args.display);

    // Forward status text to the log as the run progresses.
    let mut status = runner.status();
    let status_task = tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let text = status.borrow_and_update().clone();
            info!(target: "pixelbot", "{text}");
        }
    });

    if let Some(index) = args.test_action {
        runner.test_action(&loaded, index)?;
        println!("{}", state_summary(&runner)?);
        return Ok(());
    }

    runner.start(loaded);

    let (report, interrupted) = tokio::select! {
        report = runner.wait() => (report, false),
        _ = tokio::signal::ctrl_c() => (None, true),
    };
    let report = if interrupted {
        info!("Received Ctrl+C, stopping run");
        runner.stop();
        runner.wait().await
    } else {
        report
    };

    if let Some(report) = report {
        info!(
            outcome = ?report.outcome,
            steps = report.steps,
            "Run finished"
        );
    }
    println!("{}", state_summary(&runner)?);

    status_task.abort();
    Ok(())
}

/// Final variables and last match, rendered the way an inspection pane would
/// show them.
fn state_summary(runner: &Runner) -> anyhow::Result<String> {
    let summary = json!({
        "vars": runner.vars_snapshot(),
        "last_match": runner.last_match(),
    });
    Ok(serde_json::to_string_pretty(&summary)?)
}
