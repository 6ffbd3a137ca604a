use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use miette::{Context, IntoDiagnostic, Result};
use tracing::{debug, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use hermes_core::HermesConfig;
use hermes_review::github::{parse_pr_reference, GitHubApp, GitHubClient, PullRequestApi};
use hermes_review::llm::LlmClient;
use hermes_review::pipeline::ReviewPipeline;
use hermes_webhook::{build_router, AppState, Dispatcher, PullRequestOpened, PULL_REQUEST_OPENED};

const DEFAULT_CONFIG_PATH: &str = ".hermes.toml";

#[derive(Parser)]
#[command(
    name = "hermes",
    version,
    about = "GitHub App that reviews newly opened pull requests with an LLM",
    long_about = "Hermes listens for GitHub pull_request webhooks, asks an OpenAI-compatible\n\
                   model to review the changed files and posts the result as a PR comment.\n\n\
                   Secrets are read from the environment (or a .env file):\n  \
                     APP_ID, PRIVATE_KEY_PATH, WEBHOOK_SECRET, OPENAI_KEY\n\n\
                   Examples:\n  \
                     hermes                              Start the webhook server\n  \
                     hermes serve --port 8080            Start on a different port\n  \
                     hermes review --pr owner/repo#1     Print a review for a PR\n  \
                     hermes init                         Write a starter .hermes.toml"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file (default: .hermes.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Run the webhook server (default)
    Serve {
        /// Port to listen on (overrides PORT and [server].port)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Review a single pull request from the command line
    #[command(long_about = "Review a single pull request from the command line.\n\n\
        Authenticates with a personal token instead of the GitHub App.\n\
        The review is printed to stdout unless --post is given.\n\n\
        Examples:\n  hermes review --pr acme/widgets#42\n  hermes review --pr acme/widgets#42 --post")]
    Review {
        /// Pull request as owner/repo#number
        #[arg(long)]
        pr: String,

        /// Post the review as a comment instead of printing it
        #[arg(long)]
        post: bool,

        /// GitHub token (default: GITHUB_TOKEN or GH_TOKEN)
        #[arg(long)]
        github_token: Option<String>,
    },
    /// Write a starter .hermes.toml in the current directory
    Init,
}

const DEFAULT_CONFIG: &str = r#"# Hermes Configuration
# Secrets belong in the environment or .env, not in this file.

[app]
# app_id = 123456                       # APP_ID
# private_key_path = "private-key.pem"  # PRIVATE_KEY_PATH
# enterprise_hostname = "github.example.com"

[llm]
# model = "gpt-4o-mini"                 # HERMES_MODEL
# base_url = "https://api.openai.com"
# store = true

[server]
# host = "0.0.0.0"
# port = 3000                           # PORT
# path = "/api/webhook"

[review]
# message_path = "message.md"           # posted when no review can be generated
# dedupe_ttl_secs = 3600
"#;

#[tokio::main]
async fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .build(),
        )
    }))
    .expect("miette handler");
    human_panic::setup_panic!();

    let dotenv = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = dotenv {
        if !e.not_found() {
            warn!(error = %e, "failed to load .env");
        }
    }

    let config_path = cli.config.as_deref();

    match cli.command {
        None => run_serve(load_config(config_path)?).await?,
        Some(Command::Serve { port }) => {
            let mut config = load_config(config_path)?;
            if let Some(port) = port {
                config.server.port = port;
            }
            run_serve(config).await?;
        }
        Some(Command::Review {
            pr,
            post,
            github_token,
        }) => {
            let config = load_config(config_path)?;
            run_review(&config, &pr, post, github_token.as_deref()).await?;
        }
        Some(Command::Init) => {
            let path = Path::new(DEFAULT_CONFIG_PATH);
            if path.exists() {
                miette::bail!("{DEFAULT_CONFIG_PATH} already exists");
            }
            std::fs::write(path, DEFAULT_CONFIG).into_diagnostic()?;
            println!("Created {DEFAULT_CONFIG_PATH} with default configuration");
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "hermes=debug,hermes_webhook=debug,hermes_review=debug"
    } else {
        "hermes=info,hermes_webhook=info,hermes_review=info"
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// File config (explicit path, then `.hermes.toml`, then defaults) with the
/// environment layered on top.
fn load_config(path: Option<&Path>) -> Result<HermesConfig> {
    let mut config = match path {
        Some(path) => HermesConfig::from_file(path)
            .into_diagnostic()
            .wrap_err_with(|| format!("failed to load {}", path.display()))?,
        None => {
            let default_path = Path::new(DEFAULT_CONFIG_PATH);
            if default_path.exists() {
                HermesConfig::from_file(default_path)
                    .into_diagnostic()
                    .wrap_err_with(|| format!("failed to load {DEFAULT_CONFIG_PATH}"))?
            } else {
                HermesConfig::default()
            }
        }
    };
    config
        .apply_env(|key| std::env::var(key).ok())
        .into_diagnostic()?;
    Ok(config)
}

fn build_pipeline(config: &HermesConfig) -> Result<ReviewPipeline> {
    let fallback_body = config
        .review
        .load_fallback_body()
        .into_diagnostic()
        .wrap_err_with(|| format!("failed to read {}", config.review.message_path.display()))?;
    let llm = LlmClient::new(&config.llm).into_diagnostic()?;
    debug!(model = %llm.model(), "LLM client ready");
    Ok(ReviewPipeline::new(Arc::new(llm), fallback_body))
}

async fn run_serve(config: HermesConfig) -> Result<()> {
    config.validate_for_server().into_diagnostic()?;

    let app = GitHubApp::new(&config.app).into_diagnostic()?;
    let name = app
        .app_name()
        .await
        .into_diagnostic()
        .wrap_err("GitHub rejected the App credentials")?;
    debug!("Authenticated as '{name}'");

    let pipeline = Arc::new(build_pipeline(&config)?);
    let secret = config.app.webhook_secret().into_diagnostic()?;

    let mut dispatcher = Dispatcher::new(
        secret.as_bytes(),
        Duration::from_secs(config.review.dedupe_ttl_secs),
    );
    dispatcher.on(
        PULL_REQUEST_OPENED,
        Arc::new(PullRequestOpened::new(Arc::new(app), pipeline)),
    );

    let router = build_router(AppState::new(dispatcher), &config.server.path);
    let address = config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .into_diagnostic()
        .wrap_err_with(|| format!("failed to bind {address}"))?;

    info!(
        "Server is listening for events at: {}",
        config.server.local_url()
    );
    info!("Press Ctrl + C to quit.");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .into_diagnostic()?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for Ctrl + C");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

async fn run_review(
    config: &HermesConfig,
    pr_ref: &str,
    post: bool,
    github_token: Option<&str>,
) -> Result<()> {
    let pr = parse_pr_reference(pr_ref).into_diagnostic()?;
    let base_url = config.app.api_base_url();
    let github = GitHubClient::from_token(github_token, base_url.as_deref()).into_diagnostic()?;
    let pipeline = build_pipeline(config)?;

    if post {
        let report = pipeline.run(&github, &pr).await;
        eprintln!("{pr}: {report}");
        if !report.posted {
            miette::bail!("failed to post review comment on {pr}");
        }
        return Ok(());
    }

    let files = github
        .list_changed_files(&pr)
        .await
        .into_diagnostic()
        .wrap_err_with(|| format!("failed to list files for {pr}"))?;
    eprintln!("{pr}: {} changed file(s)", files.len());

    if files.is_empty() {
        println!("{}", pipeline.fallback_body());
        return Ok(());
    }
    let body = pipeline.generate(&files).await.into_diagnostic()?;
    println!("{body}");
    Ok(())
}
