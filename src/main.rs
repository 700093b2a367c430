//! pkce-tasks: task API server and PKCE login client.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use pkce_tasks::client::{
    CallbackListener, ClientError, FileSessionStore, FlowState, PkceFlow, ProviderSettings,
    SystemBrowser, TasksClient, TokenCache,
};
use pkce_tasks::config::{AppConfig, StoreKind};
use pkce_tasks::server::{self, AppState};
use pkce_tasks::store::TaskStore;
use pkce_tasks::types::{NewTask, TaskPatch};
use pkce_tasks::InMemoryTaskStore;

/// Owner-scoped task API with an OAuth2 PKCE login client
#[derive(Parser)]
#[command(name = "pkce-tasks")]
#[command(about = "Serve the task API or log in and call it", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to ./pkce-tasks.toml if present)
    #[arg(long, global = true, env = "PKCE_TASKS_CONFIG")]
    config: Option<PathBuf>,

    /// Session file holding tokens and flow state
    #[arg(long, global = true)]
    session: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the task API server
    Serve {
        /// Address to bind (overrides configuration)
        #[arg(long)]
        bind: Option<std::net::SocketAddr>,
    },

    /// Log in through the hosted UI with PKCE
    Login {
        /// Log in again even if a valid token is cached
        #[arg(long)]
        force: bool,

        /// Seconds to wait for the browser redirect
        #[arg(long, default_value = "300")]
        timeout: u64,
    },

    /// Clear cached credentials and open the provider's logout page
    Logout,

    /// Show the flow state and cached token
    Status,

    /// Call the task API with the cached token
    Tasks {
        #[command(subcommand)]
        command: TaskCommands,
    },
}

#[derive(Subcommand)]
enum TaskCommands {
    /// List your tasks
    List,

    /// Create a task
    Add {
        /// Title
        title: Option<String>,

        /// Description
        #[arg(long)]
        description: Option<String>,

        /// Status (todo, in-progress, done)
        #[arg(long)]
        status: Option<String>,
    },

    /// Update fields of a task
    Update {
        /// Task id
        task_id: String,

        /// New title
        #[arg(long)]
        title: Option<String>,

        /// New description
        #[arg(long)]
        description: Option<String>,

        /// New status (todo, in-progress, done)
        #[arg(long)]
        status: Option<String>,
    },

    /// Delete a task
    Delete {
        /// Task id
        task_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    init_tracing(&config)?;

    match cli.command {
        Commands::Serve { bind } => serve(config, bind).await,
        Commands::Login { force, timeout } => {
            login(&config, cli.session, force, Duration::from_secs(timeout)).await
        },
        Commands::Logout => logout(&config, cli.session),
        Commands::Status => status(cli.session),
        Commands::Tasks { command } => tasks(&config, cli.session, command).await,
    }
}

fn init_tracing(config: &AppConfig) -> Result<()> {
    let default = config.log_level.as_deref().unwrap_or("info");
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default)
            .with_context(|| format!("invalid log level {default:?}"))?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

async fn build_store(config: &AppConfig) -> Result<Arc<dyn TaskStore>> {
    match config.store.backend {
        StoreKind::Memory => Ok(Arc::new(InMemoryTaskStore::default())),
        #[cfg(feature = "dynamodb")]
        StoreKind::Dynamodb => {
            use pkce_tasks::store::dynamodb::DynamoDbBackend;
            use pkce_tasks::GenericTaskStore;

            let backend = DynamoDbBackend::from_env_with_table(&config.store.table).await;
            tracing::info!(table = backend.table_name(), "using DynamoDB store");
            Ok(Arc::new(GenericTaskStore::new(backend)))
        },
        #[cfg(not(feature = "dynamodb"))]
        StoreKind::Dynamodb => {
            anyhow::bail!("the dynamodb store requires building with `--features dynamodb`")
        },
    }
}

async fn serve(config: AppConfig, bind: Option<std::net::SocketAddr>) -> Result<()> {
    let store = build_store(&config).await?;
    let state = AppState::new(store)
        .with_allowed_origin(&config.server.allowed_origin)
        .with_context(|| format!("invalid allowed origin {:?}", config.server.allowed_origin))?;

    let addr = bind.unwrap_or(config.server.bind_addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    server::serve(listener, state, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for shutdown signal");
        }
        tracing::info!("shutting down");
    })
    .await
    .context("server error")
}

fn token_cache(session: Option<PathBuf>) -> Result<TokenCache> {
    let store = match session {
        Some(path) => FileSessionStore::new(path),
        None => FileSessionStore::default_location()?,
    };
    tracing::debug!(path = %store.path().display(), "session file");
    Ok(TokenCache::new(Arc::new(store)))
}

async fn login(
    config: &AppConfig,
    session: Option<PathBuf>,
    force: bool,
    timeout: Duration,
) -> Result<()> {
    let settings = ProviderSettings::from_config(&config.auth)?;
    let cache = token_cache(session)?;

    if !force && cache.has_valid_access_token()? {
        println!("Already logged in.");
        return Ok(());
    }

    let listener = CallbackListener::bind(&settings.redirect_uri).await?;
    let browser = Arc::new(SystemBrowser::new());
    let flow = PkceFlow::new(settings, cache, browser.clone());

    let url = flow.start_login()?;
    println!("If the browser did not open, visit:\n\n  {url}\n");

    let redirect = listener.wait(timeout).await?;
    browser.set_current_url(redirect);
    flow.handle_redirect()
        .await
        .context("login failed")?;

    match flow.state()? {
        FlowState::Authenticated => {
            println!("Logged in.");
            Ok(())
        },
        other => anyhow::bail!("login did not complete ({other})"),
    }
}

fn logout(config: &AppConfig, session: Option<PathBuf>) -> Result<()> {
    let settings = ProviderSettings::from_config(&config.auth)?;
    let flow = PkceFlow::new(settings, token_cache(session)?, Arc::new(SystemBrowser::new()));
    let url = flow.logout()?;
    println!("Logged out. Provider logout page: {url}");
    Ok(())
}

fn status(session: Option<PathBuf>) -> Result<()> {
    let cache = token_cache(session)?;
    println!("Flow state: {}", cache.flow_state()?);
    match cache.tokens()? {
        Some(tokens) => {
            let valid = tokens.is_valid_at(chrono::Utc::now());
            match tokens.expires_at() {
                Some(at) => println!("Token: {} (expires {at})", if valid { "valid" } else { "expired" }),
                None => println!("Token: {}", if valid { "valid" } else { "invalid" }),
            }
        },
        None => println!("Token: none"),
    }
    Ok(())
}

/// Adds a hint when the API rejects the cached token.
fn api_error(err: ClientError) -> anyhow::Error {
    match err.status() {
        Some(reqwest::StatusCode::UNAUTHORIZED) => anyhow::Error::new(err)
            .context("the API rejected the cached token; run `pkce-tasks login --force`"),
        _ => err.into(),
    }
}

async fn tasks(config: &AppConfig, session: Option<PathBuf>, command: TaskCommands) -> Result<()> {
    let client = TasksClient::new(config.api_base_url(), token_cache(session)?);

    match command {
        TaskCommands::List => {
            let tasks = client.list_tasks().await.map_err(api_error)?;
            println!("{}", serde_json::to_string_pretty(&tasks)?);
        },
        TaskCommands::Add {
            title,
            description,
            status,
        } => {
            let task = client
                .create_task(&NewTask {
                    title,
                    description,
                    status,
                })
                .await
                .map_err(api_error)?;
            println!("{}", serde_json::to_string_pretty(&task)?);
        },
        TaskCommands::Update {
            task_id,
            title,
            description,
            status,
        } => {
            let task = client
                .update_task(
                    &task_id,
                    &TaskPatch {
                        title,
                        description,
                        status,
                    },
                )
                .await
                .map_err(api_error)?;
            println!("{}", serde_json::to_string_pretty(&task)?);
        },
        TaskCommands::Delete { task_id } => {
            client.delete_task(&task_id).await.map_err(api_error)?;
            println!("Deleted {task_id}");
        },
    }
    Ok(())
}
