pub mod ai;
pub mod config;
pub mod prompt;
pub mod session;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use ai::research_log::parse_steps;
use ai::{AiError, HttpTransport, StreamDelta};
use config::{AIConfig, ServiceProvider};
use prompt::StrategyForm;
use session::{export, AnalysisSession, SessionError};

#[derive(Debug, Parser)]
#[command(name = "wukan-ai", version, about = "Strategy analysis with streaming LLM answers")]
pub struct Cli {
    /// Settings directory (defaults to the platform config dir)
    #[arg(long, global = true)]
    pub config_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Render the prompt for a form and stream the analysis
    Analyze(AnalyzeArgs),
    /// Show or change the saved provider settings
    Settings(SettingsArgs),
    /// List supported providers
    Providers,
}

#[derive(Debug, Args)]
pub struct AnalyzeArgs {
    /// JSON file with the product/competitor form fields
    #[arg(long)]
    pub form: PathBuf,
    /// Print the generated prompt and stop
    #[arg(long)]
    pub preview: bool,
    /// Where the Markdown report is written
    #[arg(long, default_value = ".")]
    pub export_dir: PathBuf,
    /// Exit after the first answer instead of reading follow-up questions
    #[arg(long)]
    pub no_follow_up: bool,
}

#[derive(Debug, Args)]
pub struct SettingsArgs {
    #[arg(long, value_enum)]
    pub provider: Option<ProviderArg>,
    #[arg(long)]
    pub api_key: Option<String>,
    #[arg(long)]
    pub model: Option<String>,
    #[arg(long)]
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ProviderArg {
    Gemini,
    Bailian,
    Custom,
}

impl From<ProviderArg> for ServiceProvider {
    fn from(arg: ProviderArg) -> Self {
        match arg {
            ProviderArg::Gemini => ServiceProvider::Gemini,
            ProviderArg::Bailian => ServiceProvider::Bailian,
            ProviderArg::Custom => ServiceProvider::Custom,
        }
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_dir = cli.config_dir.unwrap_or_else(config::default_config_dir);
    let app_config = AIConfig::load(&config_dir);
    log::info!(
        "wukan-ai initialized. Provider: {}",
        app_config.provider.display_name()
    );

    match cli.command {
        Command::Providers => {
            for info in ai::llm::available_providers() {
                println!(
                    "{:<16} reasoning: {:<5} models: {}",
                    info.name,
                    info.reasoning_channel,
                    info.models.join(", ")
                );
            }
            Ok(())
        }
        Command::Settings(args) => update_settings(&config_dir, args),
        Command::Analyze(args) => analyze(app_config, args).await,
    }
}

/// Edits go to the stored settings only, so a key supplied through
/// `WUKAN_API_KEY` is never written to disk.
fn update_settings(config_dir: &std::path::Path, args: SettingsArgs) -> anyhow::Result<()> {
    let changed = args.provider.is_some()
        || args.api_key.is_some()
        || args.model.is_some()
        || args.base_url.is_some();

    let cfg = if changed {
        AIConfig::update_stored(config_dir, |cfg| {
            if let Some(provider) = args.provider {
                cfg.select_provider(provider.into());
            }
            if let Some(key) = args.api_key {
                cfg.api_key = key;
            }
            if let Some(model) = args.model {
                cfg.model_name = model;
            }
            if let Some(url) = args.base_url {
                cfg.base_url = Some(url).filter(|u| !u.trim().is_empty());
            }
        })?
    } else {
        AIConfig::load_stored(config_dir)
    };

    println!("provider: {}", cfg.provider.display_name());
    println!("model:    {}", cfg.effective_model());
    println!("base url: {}", cfg.base_url().unwrap_or("-"));
    let key_status = if config::env_api_key().is_some() {
        "(from WUKAN_API_KEY)"
    } else if cfg.api_key.is_empty() {
        "(not set)"
    } else {
        "(set)"
    };
    println!("api key:  {}", key_status);
    Ok(())
}

async fn analyze(cfg: AIConfig, args: AnalyzeArgs) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(&args.form)
        .with_context(|| format!("Failed to read form {}", args.form.display()))?;
    let form = StrategyForm::from_json(&raw).context("Form file is not valid JSON")?;
    let missing = form.missing_core_fields();
    if !missing.is_empty() {
        log::warn!("Form fields left blank: {}", missing.join(", "));
    }

    let session = Arc::new(AnalysisSession::new(cfg));
    let prompt = session.preview(form.clone());
    if args.preview {
        println!("{}", prompt);
        return Ok(());
    }

    {
        let session = Arc::clone(&session);
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                if session.stop_handle().is_none() {
                    std::process::exit(130);
                }
                session.stop();
            }
        });
    }

    let transport = HttpTransport::new();
    let result = session.submit_analysis(&transport, render_delta).await;
    finish_turn(&session, result)?;

    if let Some(report) = session.report_markdown() {
        export::write_report(&args.export_dir, &form.product_name, &report)?;
    }

    if args.no_follow_up {
        return Ok(());
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\n追问 > ");
        std::io::stdout().flush().ok();
        let Some(question) = lines.next_line().await? else {
            break;
        };
        if matches!(question.trim(), "/quit" | "/exit") {
            break;
        }
        let result = session
            .ask_follow_up(&transport, &question, render_delta)
            .await;
        finish_turn(&session, result)?;
    }
    Ok(())
}

fn render_delta(delta: &StreamDelta) {
    if let Some(reasoning) = &delta.reasoning {
        eprint!("{}", reasoning);
    }
    if let Some(content) = &delta.content {
        print!("{}", content);
        std::io::stdout().flush().ok();
    }
}

fn finish_turn<T>(
    session: &AnalysisSession,
    result: Result<T, SessionError>,
) -> anyhow::Result<()> {
    println!();
    if let Some(last) = session.messages().last() {
        let steps = parse_steps(last.reasoning.as_deref().unwrap_or_default());
        if !steps.is_empty() {
            eprintln!("\n── research log ({} steps) ──", steps.len());
            for step in steps {
                eprintln!("{} {}", step.kind.marker(), step.text);
            }
        }
    }

    match result {
        Ok(_) => Ok(()),
        Err(e) if e.is_cancelled() => {
            eprintln!("(stopped)");
            Ok(())
        }
        Err(SessionError::Ai(e @ AiError::Configuration(_))) => {
            bail!("{} Run `wukan-ai settings --help`.", e)
        }
        Err(e @ SessionError::WrongStep { .. }) => bail!(e),
        Err(e) => {
            eprintln!("error: {}", e);
            session.dismiss_error();
            Ok(())
        }
    }
}
