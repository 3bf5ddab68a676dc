use clap::{Parser, Subcommand};
use gauntlet::context::RunContext;
use gauntlet::lua::{self, async_bridge, builtins};
use gauntlet::{config, discovery, runner};
use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Gauntlet — Lua-scripted integration test runner for CLI-driven
/// JSON:API services.
///
/// Runs suite scripts against the CLI under test, prints a structured
/// JSON report on stdout, and exits 0 (all pass) or 1 (any fail).
#[derive(Parser, Debug)]
#[command(name = "gauntlet", version, about)]
struct Cli {
    /// Suite script (.lua) or run config (.yaml) to run directly.
    file: Option<PathBuf>,

    /// Enable verbose logging (sets RUST_LOG=debug).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run test suites and print a JSON report.
    Run {
        /// Suite script files (.lua).
        files: Vec<PathBuf>,

        /// Path to a YAML run config (instead of listing files).
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// CLI binary under test (overrides the config and GAUNTLET_BIN).
        #[arg(short, long)]
        bin: Option<String>,
    },
    /// Execute a script or inline snippet without the full report.
    Exec {
        /// Script file to execute.
        file: Option<PathBuf>,

        /// Inline Lua source.
        #[arg(short, long)]
        eval: Option<String>,

        /// CLI binary under test (overrides GAUNTLET_BIN).
        #[arg(short, long)]
        bin: Option<String>,
    },
    /// List available helper modules and builtins.
    Modules,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Some(Command::Run { files, config, bin }) => run_cmd(files, config, bin).await,
        Some(Command::Exec { file, eval, bin }) => exec_cmd(file, eval, bin).await,
        Some(Command::Modules) => modules_cmd(),
        None => match cli.file {
            Some(file) => dispatch_by_extension(file).await,
            None => {
                eprintln!("error: no input given (pass a .lua suite, a .yaml config, or a subcommand)");
                ExitCode::from(2)
            }
        },
    }
}

/// `gauntlet foo.lua` and `gauntlet run.yaml` work without a subcommand.
async fn dispatch_by_extension(file: PathBuf) -> ExitCode {
    match file.extension().and_then(|e| e.to_str()) {
        Some("lua") => run_cmd(vec![file], None, None).await,
        Some("yaml") | Some("yml") => run_cmd(Vec::new(), Some(file), None).await,
        _ => {
            eprintln!(
                "error: unsupported file extension: {} (expected .lua, .yaml, or .yml)",
                file.display()
            );
            ExitCode::from(2)
        }
    }
}

fn build_config(
    files: Vec<PathBuf>,
    config_path: Option<PathBuf>,
    bin: Option<String>,
) -> anyhow::Result<config::Config> {
    let mut cfg = match (config_path, files.is_empty()) {
        (Some(path), true) => config::load(&path)?,
        (Some(_), false) => anyhow::bail!("pass suite files or --config, not both"),
        (None, false) => config::from_files(&files, None),
        (None, true) => anyhow::bail!("no suite files given"),
    };
    if let Some(bin) = bin {
        cfg.bin = bin;
    }
    Ok(cfg)
}

async fn run_cmd(
    files: Vec<PathBuf>,
    config_path: Option<PathBuf>,
    bin: Option<String>,
) -> ExitCode {
    let cfg = match build_config(files, config_path, bin) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("error: loading run configuration: {e:#}");
            return ExitCode::from(2);
        }
    };

    info!(
        suites = cfg.suites.len(),
        bin = %cfg.bin,
        timeout_secs = cfg.timeout.as_secs(),
        "starting gauntlet"
    );

    let result = runner::run(&cfg).await;
    result.print()
}

/// Ad-hoc execution: one VM, no per-suite report. Prints the summary
/// as JSON when the snippet recorded any tests.
async fn exec_cmd(file: Option<PathBuf>, eval: Option<String>, bin: Option<String>) -> ExitCode {
    let source = match (&eval, &file) {
        (Some(source), None) => source.clone(),
        (None, Some(path)) => match std::fs::read_to_string(path) {
            Ok(source) => source,
            Err(e) => {
                eprintln!("error: reading {}: {e}", path.display());
                return ExitCode::from(2);
            }
        },
        _ => {
            eprintln!("error: pass exactly one of --eval or a script file");
            return ExitCode::from(2);
        }
    };

    let cfg = config::defaults(bin);
    let target = Rc::new(config::Target::resolve(&cfg));
    let ctx = RunContext::shared();
    let client = gauntlet::build_http_client();

    let vm = match lua::create_vm(Rc::clone(&target), ctx.clone(), client) {
        Ok(vm) => vm,
        Err(e) => {
            eprintln!("error: creating Lua VM: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    let mut script_failed = false;
    match async_bridge::exec_async(&vm, &source).await {
        Ok(()) => {}
        Err(ref e) if builtins::halt_requested(e) => {}
        Err(e) => {
            eprintln!("error: {e}");
            script_failed = true;
        }
    }

    if let Some(dangling) = ctx.borrow_mut().finish() {
        warn!(test = %dangling, "no result recorded before end of script");
    }
    builtins::drain_cleanups(&vm, &ctx, &target).await;

    let summary = ctx.borrow().summary();
    if summary.total > 0 {
        let json = serde_json::to_string_pretty(&summary).expect("failed to serialize summary");
        println!("{json}");
    }

    if script_failed || summary.failed > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn modules_cmd() -> ExitCode {
    let modules = discovery::discover_modules();
    print!("{}", render_modules(&modules));
    ExitCode::SUCCESS
}

/// Markdown listing of helper modules and builtin globals, deduplicated
/// by name with the highest-priority occurrence kept.
fn render_modules(modules: &[discovery::DiscoveredModule]) -> String {
    use std::fmt::Write;

    let mut seen = std::collections::HashSet::new();
    let mut out = String::new();

    out.push_str("# Available modules\n\n## Helper modules\n\n");
    for module in modules.iter().filter(|m| !m.lua_source.is_empty()) {
        if !seen.insert(module.module_name.clone()) {
            continue;
        }
        let origin = match module.source {
            discovery::ModuleSource::Project => "project",
            discovery::ModuleSource::Global => "global",
            discovery::ModuleSource::BuiltIn => "embedded",
        };
        let _ = writeln!(out, "### {} ({origin})", module.module_name);
        if !module.metadata.description.is_empty() {
            let _ = writeln!(out, "\n{}", module.metadata.description);
        }
        if !module.metadata.auto_functions.is_empty() {
            let _ = writeln!(
                out,
                "\nFunctions: {}",
                module.metadata.auto_functions.join(", ")
            );
        }
        out.push('\n');
    }

    out.push_str("## Built-in globals\n\n");
    for module in modules.iter().filter(|m| m.lua_source.is_empty()) {
        if !seen.insert(module.module_name.clone()) {
            continue;
        }
        let _ = writeln!(
            out,
            "- `{}`: {}",
            module.module_name, module.metadata.description
        );
    }
    out
}
