//! Scholar CLI
//!
//! Serves the module generator over HTTP, or runs a single generation or
//! image request from the command line.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use scholar_gateway::{GeminiConfig, GeminiGateway, ModelGateway};
use scholar_orchestrator::{
    create_router, AppState, Config, EventBroadcaster, GenerationMode, ImageTool,
    ImageToolRequest, Pipeline, PipelineEvent, PipelineState, ProgressReporter, RunRegistry,
    RunStatus, Topic,
};
use scholar_report::{extension_for, RunExport};
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

/// Default port for the HTTP API server.
const DEFAULT_PORT: u16 = 3000;

/// Scholar - Academic Module Generator
///
/// Breaks a topic into learning modules and generates an illustration, an
/// interactive document and a narrated script for each one.
#[derive(Parser, Debug)]
#[command(name = "scholar")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (default: scholar.json in current directory)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP and WebSocket API
    Serve {
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port for the HTTP API server
        #[arg(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,
    },

    /// Generate modules for a topic and export them
    Generate {
        /// The subject to generate modules for
        #[arg(value_name = "TOPIC")]
        topic: String,

        /// Generation mode: single or multi (default from config)
        #[arg(short, long, value_name = "MODE")]
        mode: Option<GenerationMode>,

        /// Output directory (default: outputDir from config)
        #[arg(short, long, value_name = "DIR")]
        output: Option<String>,
    },

    /// Generate a standalone image
    Image {
        /// Description of the image
        #[arg(value_name = "PROMPT")]
        prompt: String,

        /// Also produce a transparent-background copy
        #[arg(long)]
        remove_background: bool,

        /// Output directory (default: outputDir from config)
        #[arg(short, long, value_name = "DIR")]
        output: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if args.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::debug!(config = ?args.config, "Config file");

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}

async fn run(args: Args) -> anyhow::Result<ExitCode> {
    let mut config = load_config(args.config.as_deref())?;

    match args.command {
        Command::Serve { host, port } => {
            serve(config, &host, port).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Generate {
            topic,
            mode,
            output,
        } => {
            apply_output_override(&mut config, output)?;
            let mode = mode.unwrap_or(config.default_mode);
            let output_dir = PathBuf::from(&config.output_dir);
            generate(&config, &topic, mode, &output_dir).await
        }
        Command::Image {
            prompt,
            remove_background,
            output,
        } => {
            apply_output_override(&mut config, output)?;
            let output_dir = PathBuf::from(&config.output_dir);
            image(&config, prompt, remove_background, &output_dir).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Applies `--output` and re-validates the config.
fn apply_output_override(config: &mut Config, output: Option<String>) -> anyhow::Result<()> {
    if let Some(output) = output {
        config.output_dir = output;
    }
    config.validate().map_err(|e| anyhow::anyhow!("{e}"))
}

/// Loads configuration from the specified path or default location.
fn load_config(config_path: Option<&str>) -> anyhow::Result<Config> {
    match config_path {
        Some(path_str) => {
            let path = Path::new(path_str);
            if !path.exists() {
                anyhow::bail!(
                    "Config file not found: '{}'\n\nSuggestion: Check the path or remove the --config flag to use defaults",
                    path.display()
                );
            }
            Config::load_from_file(path).map_err(|e| anyhow::anyhow!("{e}"))
        }
        None => Config::load().map_err(|e| anyhow::anyhow!("{e}")),
    }
}

/// Builds the Gemini gateway described by the config.
fn build_gateway(config: &Config) -> anyhow::Result<Arc<dyn ModelGateway>> {
    let gemini = GeminiConfig::from_env(
        &config.gateway.api_key_env,
        config.gateway.endpoint.clone(),
        config.gateway.timeout_secs,
    )
    .map_err(|e| {
        anyhow::anyhow!(
            "{e}\n\nSuggestion: Export {} with your API key",
            config.gateway.api_key_env
        )
    })?;
    let gateway = GeminiGateway::new(gemini)?;
    Ok(Arc::new(gateway))
}

async fn serve(config: Config, host: &str, port: u16) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid address '{host}:{port}': {e}"))?;

    let gateway = build_gateway(&config)?;
    print_config(&config);

    let router = create_router(AppState::new(config, gateway));
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to bind to {addr}: {e}\n\nSuggestion: Try a different port with --port"
        )
    })?;

    println!("HTTP API server running on http://{addr}");
    println!("Press Ctrl+C to stop");
    tracing::info!(%addr, "Server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Received Ctrl+C, shutting down");
        })
        .await?;
    Ok(())
}

async fn generate(
    config: &Config,
    topic: &str,
    mode: GenerationMode,
    output_dir: &Path,
) -> anyhow::Result<ExitCode> {
    let topic = Topic::new(topic).map_err(|e| anyhow::anyhow!("{e}"))?;
    let gateway = build_gateway(config)?;
    print_config(config);

    let run_id = RunRegistry::new().next_run_id();
    let state = PipelineState::new(&run_id, topic, mode);
    let broadcaster = EventBroadcaster::default();
    let mut events = broadcaster.subscribe();
    let (reporter, _snapshots) = ProgressReporter::new(&state, broadcaster);

    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let done = matches!(event, PipelineEvent::RunComplete(_));
                    print_event(&event);
                    if done {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Progress output fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let pipeline = Pipeline::new(gateway, config);
    let final_state = pipeline.run(state, &reporter).await;
    drop(reporter);
    let _ = printer.await;

    println!();
    print_summary(&final_state);

    let run_dir = output_dir.join(&final_state.run_id);
    let export = RunExport::from_state(&final_state);
    let written = export.write_to_dir(&run_dir)?;
    println!();
    println!("Exported {} files to {}", written.len(), run_dir.display());

    if final_state.status == RunStatus::Completed {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(2))
    }
}

async fn image(
    config: &Config,
    prompt: String,
    remove_background: bool,
    output_dir: &Path,
) -> anyhow::Result<()> {
    let gateway = build_gateway(config)?;
    let tool = ImageTool::new(gateway, config);

    println!("Generating image...");
    let outcome = tool
        .generate(ImageToolRequest {
            prompt,
            remove_background,
        })
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    if let Some(reason) = &outcome.background_error {
        println!("  Background removal failed, keeping the original: {reason}");
    }

    std::fs::create_dir_all(output_dir)?;
    let preferred = outcome.preferred_image();
    let mut path: PathBuf = output_dir.join(&outcome.download_file_name);
    let essence = preferred.image_data_uri.essence();
    if essence != "image/png" {
        path.set_extension(extension_for(&essence));
    }
    std::fs::write(&path, preferred.image_data_uri.data())?;
    println!("  Image saved: {}", path.display());

    Ok(())
}

/// Prints the loaded configuration.
fn print_config(config: &Config) {
    println!("Configuration loaded:");
    println!("  Text model: {}", config.models.text);
    println!("  Image model: {}", config.models.image);
    println!("  Speech model: {} ({})", config.models.speech, config.models.voice);
    println!("  Max modules: {}", config.max_modules);
    println!("  Output directory: {}", config.output_dir);
    println!();
}

/// Prints a progress line for a pipeline event.
fn print_event(event: &PipelineEvent) {
    match event {
        PipelineEvent::RunStarted(p) => {
            println!("Run {} started ({} mode): {}", p.run_id, p.mode, p.topic);
        }
        PipelineEvent::PlanReady(p) => {
            println!("Plan ready: {} module(s)", p.plan.len());
            for (i, planned) in p.plan.planned_modules.iter().enumerate() {
                println!("  {}. {}", i + 1, planned.title);
            }
        }
        PipelineEvent::StageStarted(p) => {
            println!("  {}", p.label);
        }
        PipelineEvent::ModuleCompleted(p) => {
            println!("Module {} done: {}", p.module_index + 1, p.module_title);
        }
        PipelineEvent::Error(p) => {
            println!("  Error: {}", p.message);
        }
        PipelineEvent::RunComplete(_) | PipelineEvent::Connected(_) => {}
    }
}

/// Prints a summary of the run.
fn print_summary(state: &PipelineState) {
    println!("=== Scholar Run Summary ===");
    println!("Status: {}", state.status);
    println!("Modules: {}", state.modules.len());
    println!("{}", state.stage_label());

    let elapsed = state.elapsed();
    println!(
        "Duration: {}m {}s",
        elapsed.num_minutes(),
        elapsed.num_seconds() % 60
    );
}
