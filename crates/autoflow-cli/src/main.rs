// crates/autoflow-cli/src/main.rs

use anyhow::{Context, Result};
use autoflow_core::{
    BootConfig, Command, EventKind, EventMessage, ExperimentDefinition, FlowGraph, FlowNode,
    RoutingPolicy, Value,
};
use autoflow_runtime::transport::{connect_supervisor, serve_runner};
use autoflow_runtime::{
    analyze, CommandSender, FlowRuntime, RunReport, RuntimeConfig, SupervisorHandle,
};
use clap::{Parser, Subcommand};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::BufReader;

#[derive(Parser)]
#[command(name = "autoflow")]
#[command(about = "Automation Flow Engine CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a flow graph file, reading commands from stdin
    Run {
        /// Path to flow graph JSON file
        #[arg(short, long)]
        file: PathBuf,

        /// Runtime config JSON file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Boot settings as a JSON object
        #[arg(short, long)]
        boot: Option<String>,

        /// Pause after every node
        #[arg(long)]
        step: bool,

        /// Run the flow in a separate worker process
        #[arg(long)]
        isolated: bool,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Validate a flow graph file
    Validate {
        /// Path to flow graph JSON file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// List available executor kinds
    Executors,

    /// Create an example flow graph
    Init {
        /// Output file path
        #[arg(short, long, default_value = "flow.json")]
        output: PathBuf,
    },

    /// Run a flow speaking JSON lines on stdio (used by `run --isolated`)
    Worker {
        #[arg(short, long)]
        file: PathBuf,

        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(short, long)]
        boot: Option<String>,

        #[arg(long)]
        step: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            file,
            config,
            boot,
            step,
            isolated,
            verbose,
        } => {
            // Initialize logging
            if verbose {
                tracing_subscriber::fmt()
                    .with_max_level(tracing::Level::DEBUG)
                    .init();
            } else {
                tracing_subscriber::fmt()
                    .with_max_level(tracing::Level::INFO)
                    .init();
            }

            let options = RunOptions {
                file,
                config,
                boot,
                step,
                verbose,
            };
            if isolated {
                run_isolated(options).await?;
            } else {
                run_in_process(options).await?;
            }
        }

        Commands::Validate { file } => {
            validate_flow(&file)?;
        }

        Commands::Executors => {
            list_executors();
        }

        Commands::Init { output } => {
            create_example_flow(output)?;
        }

        Commands::Worker {
            file,
            config,
            boot,
            step,
        } => {
            // stdout carries the protocol, so logs go to stderr
            tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_max_level(tracing::Level::INFO)
                .init();

            let code = run_worker(RunOptions {
                file,
                config,
                boot,
                step,
                verbose: false,
            })
            .await?;
            // The stdin reader may still be parked on a blocking read.
            std::process::exit(code);
        }
    }

    Ok(())
}

struct RunOptions {
    file: PathBuf,
    config: Option<PathBuf>,
    boot: Option<String>,
    step: bool,
    verbose: bool,
}

impl RunOptions {
    fn load(&self) -> Result<(Arc<FlowGraph>, RuntimeConfig, BootConfig)> {
        let graph = load_graph(&self.file)?;

        let mut config = match &self.config {
            Some(path) => RuntimeConfig::from_json_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => RuntimeConfig::default(),
        };
        if self.step {
            config.step_mode = true;
        }

        let boot = match &self.boot {
            Some(json) => {
                serde_json::from_str(json).context("boot settings must be a JSON object")?
            }
            None => BootConfig::default(),
        };

        Ok((Arc::new(graph), config, boot))
    }

    /// Arguments that make a worker process load the same run.
    fn worker_args(&self) -> Vec<String> {
        let mut args = vec![
            "worker".to_string(),
            "--file".to_string(),
            self.file.display().to_string(),
        ];
        if let Some(config) = &self.config {
            args.push("--config".to_string());
            args.push(config.display().to_string());
        }
        if let Some(boot) = &self.boot {
            args.push("--boot".to_string());
            args.push(boot.clone());
        }
        if self.step {
            args.push("--step".to_string());
        }
        args
    }
}

fn load_graph(file: &Path) -> Result<FlowGraph> {
    let json = std::fs::read_to_string(file)
        .with_context(|| format!("reading flow graph {}", file.display()))?;
    let graph: FlowGraph = serde_json::from_str(&json)
        .with_context(|| format!("parsing flow graph {}", file.display()))?;
    Ok(graph)
}

fn runtime(config: RuntimeConfig, boot: BootConfig) -> FlowRuntime {
    FlowRuntime::with_config(Arc::new(autoflow_executors::default_registry()), config)
        .with_boot_config(boot)
}

async fn run_in_process(options: RunOptions) -> Result<()> {
    println!("🚀 Loading flow from: {}", options.file.display());
    let (graph, config, boot) = options.load()?;

    let handle = runtime(config, boot).start(graph)?;
    let (supervisor, join) = handle.into_parts();

    let done = supervise(supervisor, options.verbose).await;
    let report = join.await.context("runner task failed")?;

    print_report(&report);
    finish(done.as_ref())
}

async fn run_isolated(options: RunOptions) -> Result<()> {
    println!("🚀 Loading flow from: {} (worker process)", options.file.display());
    let (_, config, _) = options.load()?;

    let exe = std::env::current_exe().context("locating autoflow binary")?;
    let mut child = tokio::process::Command::new(exe)
        .args(options.worker_args())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .context("spawning worker")?;

    let stdout = child.stdout.take().context("worker stdout not captured")?;
    let stdin = child.stdin.take().context("worker stdin not captured")?;
    let (supervisor, tasks) = connect_supervisor(
        BufReader::new(stdout),
        stdin,
        config.channel_capacity,
        config.put_timeout(),
    );

    let done = supervise(supervisor, options.verbose).await;
    tasks.abort();

    let status = child.wait().await.context("waiting for worker")?;
    if !status.success() {
        tracing::warn!("Worker exited with {}", status);
    }
    finish(done.as_ref())
}

async fn run_worker(options: RunOptions) -> Result<i32> {
    let (graph, config, boot) = options.load()?;
    let runner = runtime(config.clone(), boot).runner(graph)?;

    let (endpoint, tasks) = serve_runner(
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        config.channel_capacity,
        config.put_timeout(),
    );
    let report = runner.run(endpoint).await;
    let written = tasks.finish_outbound().await?;

    tracing::info!(
        "Worker finished run {} as {} ({} events written, {} dropped)",
        report.run_id,
        report.phase,
        written,
        report.events_dropped
    );
    Ok(if report.error.is_some() { 1 } else { 0 })
}

/// Print events until the run ends, forwarding stdin lines as commands.
/// Returns the PROCESS_COMPLETE event if it arrived.
async fn supervise(mut supervisor: SupervisorHandle, verbose: bool) -> Option<EventMessage> {
    spawn_stdin_commands(supervisor.commands().clone());

    let mut done = None;
    while let Some(event) = supervisor.next_event().await {
        print_event(&event, verbose);
        if event.kind == EventKind::ProcessComplete {
            done = Some(event);
            break;
        }
    }
    done
}

const COMMAND_WORDS: &str = "pause, resume, step, cancel, end, step-on, step-off";

/// Reads stdin on a plain thread so a pending read never holds up shutdown.
fn spawn_stdin_commands(commands: CommandSender) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match parse_command(line) {
                Some(command) => {
                    if let Err(e) = commands.send(command) {
                        tracing::warn!("Could not send {}: {}", command, e);
                        break;
                    }
                }
                None => println!("   ❓ Unknown command '{}' ({})", line, COMMAND_WORDS),
            }
        }
    });
}

fn parse_command(line: &str) -> Option<Command> {
    match line.to_ascii_lowercase().as_str() {
        "pause" | "p" => Some(Command::Pause),
        "resume" | "r" => Some(Command::Resume),
        "step" | "s" => Some(Command::StepContinue),
        "cancel" | "c" => Some(Command::Cancel),
        "end" | "e" => Some(Command::End),
        "step-on" => Some(Command::EnableStepMode),
        "step-off" => Some(Command::DisableStepMode),
        _ => None,
    }
}

fn print_event(event: &EventMessage, verbose: bool) {
    let node = event.node_id().unwrap_or("-");
    match event.kind {
        EventKind::ProcessReady => {
            println!(
                "📋 Flow: {} ({} nodes, start '{}')",
                event.get_str("graph").unwrap_or("?"),
                event.get_u64("totalCount").unwrap_or(0),
                event.get_str("startNode").unwrap_or("?")
            );
        }
        EventKind::StatusUpdate => match event.get_str("phase") {
            Some("PAUSED") => {
                println!("⏸️  Paused before '{}' (resume, step, cancel, end)", node);
            }
            Some("RUNNING") => println!("▶️  Running"),
            Some(phase) if verbose => {
                println!("   🔧 {} ({})", phase, event.get_str("reason").unwrap_or(""))
            }
            _ => {}
        },
        EventKind::ExperimentStart => {
            println!(
                "  ⚡ [{}] {} (visit {})",
                node,
                event.get_str("experimentName").unwrap_or("?"),
                event.get_u64("visit").unwrap_or(0)
            );
        }
        EventKind::ExperimentComplete => {
            let status = event.get_str("status").unwrap_or("?");
            let icon = match status {
                "PASS" => "✅",
                "FAIL" => "❌",
                _ => "⚠️ ",
            };
            println!(
                "  {} [{}] {} ({})",
                icon,
                node,
                status,
                event.get_str("classification").unwrap_or("?")
            );
        }
        EventKind::IterationComplete => {
            let port = event.get_u64("port").unwrap_or(0);
            match event.get_str("nextNodeId") {
                Some(next) => println!("     ↪ port {} -> {}", port, next),
                None => println!("     ⏹  port {} is unwired", port),
            }
        }
        EventKind::ProgressUpdate if verbose => {
            println!(
                "     📊 {} executions ({} nodes in flow)",
                event.get_u64("completedCount").unwrap_or(0),
                event.get_u64("totalCount").unwrap_or(0)
            );
        }
        EventKind::ProcessError => {
            println!("  💥 [{}] {}", node, event.get_str("error").unwrap_or("unknown error"));
        }
        EventKind::Heartbeat if verbose => {
            println!(
                "     💓 {} at '{}'",
                event.get_str("phase").unwrap_or("?"),
                node
            );
        }
        EventKind::ProcessComplete => {
            if event.get_bool("completed") == Some(true) {
                println!("✨ Flow completed: {}", event.get_str("reason").unwrap_or("done"));
            } else if event.get_bool("errored") == Some(true) {
                let error = event.get_str("error").unwrap_or("unknown error");
                println!("💥 Flow aborted: {}", error);
            } else if event.get_bool("graceful") == Some(true) {
                println!("🛑 Flow ended on request");
            } else {
                println!("🛑 Flow cancelled");
            }
        }
        _ => {}
    }
}

fn print_report(report: &RunReport) {
    println!();
    println!("📊 Run Summary:");
    println!("   Run ID: {}", report.run_id);
    println!("   Phase: {}", report.phase);
    println!("   Executions: {}", report.executions());
    println!("   Path: {}", report.path.join(" -> "));
    if let Some(termination) = &report.termination {
        println!("   Ended: {}", termination.reason);
    }
    if report.events_dropped > 0 {
        println!("   Dropped events: {}", report.events_dropped);
    }

    if !report.histories.is_empty() {
        println!();
        println!("📤 Results:");
        for (node, history) in &report.histories {
            let statuses: Vec<&str> = history.iter().map(|s| s.as_str()).collect();
            let class = report
                .classifications
                .get(node)
                .map(|c| c.as_str())
                .unwrap_or("?");
            println!("   {}: {} [{}]", node, class, statuses.join(", "));
        }
    }
}

fn finish(done: Option<&EventMessage>) -> Result<()> {
    match done {
        Some(event) if event.get_bool("errored") == Some(true) => Err(anyhow::anyhow!(
            "flow aborted: {}",
            event.get_str("error").unwrap_or("unknown error")
        )),
        Some(_) => Ok(()),
        None => Err(anyhow::anyhow!("run ended without a completion event")),
    }
}

fn validate_flow(file: &Path) -> Result<()> {
    println!("🔍 Validating flow: {}", file.display());

    let graph = load_graph(file)?;
    if let Err(e) = graph.validate() {
        println!("❌ Flow is invalid:");
        for issue in &e.issues {
            println!("   • {}", issue);
        }
        return Err(e.into());
    }

    let analysis = analyze(&graph);
    println!("✅ Flow is valid:");
    println!("   Name: {}", graph.name());
    println!("   Nodes: {}", graph.len());
    println!("   Start: {}", graph.start());
    if analysis.has_cycles {
        println!("   Contains retry loops");
    }
    for node in &analysis.unreachable {
        println!("   ⚠️  '{}' is unreachable from the start node", node);
    }
    if !analysis.terminal_reachable {
        println!("   ⚠️  No reachable node can end the run; it will only stop when cancelled");
    }

    Ok(())
}

fn list_executors() {
    println!("📦 Available Executors:");
    println!();

    let registry = autoflow_executors::default_registry();
    let default_kind = registry.default_kind().unwrap_or_default().to_string();
    for entry in registry.entries() {
        let marker = if entry.kind == default_kind { " (default)" } else { "" };
        println!("  • {}{}", entry.kind, marker);
        println!("    {}", entry.description);
    }
}

fn create_example_flow(output: PathBuf) -> Result<()> {
    let outcomes = Value::Array(vec!["FAIL".into(), "PASS".into(), "FAIL".into()]);

    let reproduce = FlowNode::new(
        "reproduce",
        ExperimentDefinition::new("Boot loop reproduction")
            .with_kind("simulated")
            .with_parameter("outcomes", outcomes)
            .with_parameter("delay_ms", 200u64),
    )
    .with_name("Reproduce")
    .with_policy(RoutingPolicy::Adaptive {
        threshold: 1,
        window: 3,
    })
    .with_output(0, "collect")
    .with_output(1, "reproduce");

    let collect = FlowNode::new(
        "collect",
        ExperimentDefinition::new("Collect logs")
            .with_kind("command")
            .with_parameter("program", "echo")
            .with_parameter("args", Value::Array(vec!["collecting logs".into()])),
    )
    .with_name("Collect Logs");

    let graph = FlowGraph::from_nodes("Example Triage Flow", "reproduce", vec![reproduce, collect])?
        .with_description(
            "Retries a flaky experiment until it fails twice in three tries, then collects logs",
        );

    // Save to file
    let json = serde_json::to_string_pretty(&graph)?;
    std::fs::write(&output, json)?;

    println!("✨ Created example flow: {}", output.display());
    println!();
    println!("Run it with:");
    println!("  autoflow run --file {} --step", output.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command_words() {
        assert_eq!(parse_command("pause"), Some(Command::Pause));
        assert_eq!(parse_command("RESUME"), Some(Command::Resume));
        assert_eq!(parse_command("s"), Some(Command::StepContinue));
        assert_eq!(parse_command("step-on"), Some(Command::EnableStepMode));
        assert_eq!(parse_command("step-off"), Some(Command::DisableStepMode));
        assert_eq!(parse_command("end"), Some(Command::End));
        assert_eq!(parse_command("reboot"), None);
    }

    #[test]
    fn test_worker_args_carry_run_options() {
        let options = RunOptions {
            file: PathBuf::from("flow.json"),
            config: None,
            boot: Some(r#"{"board":"rev-b"}"#.to_string()),
            step: true,
            verbose: true,
        };
        assert_eq!(
            options.worker_args(),
            vec!["worker", "--file", "flow.json", "--boot", r#"{"board":"rev-b"}"#, "--step"]
        );
    }
}
