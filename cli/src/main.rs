//! CLI entrypoint for toolgate
//!
//! This is the main binary that wires together all layers using
//! dependency injection.

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use toolgate_application::{
    AuditLogger, AuthOrchestrator, HandlerRegistry, InvocationRouter, NoAuditLogger,
    PendingOperations, SessionStore,
};
use toolgate_domain::{GrantKind, InvocationRequest, SessionState};
use toolgate_infrastructure::{
    AppState, BrowserRuntime, ConfigLoader, FileConfig, FileSessionStore, JsonlAuditLogger,
    MemorySessionStore, OAuth2Handler, PageStore, SharedChromium, StaticTokenHandler,
    StaticToolCatalog, serve,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "toolgate")]
#[command(about = "Credential-brokered tool invocation for LLM agents")]
#[command(version)]
struct Cli {
    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Explicit config file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Skip config file discovery and use built-in defaults
    #[arg(long, global = true)]
    no_config: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the callback surface and keep runtimes available
    Serve,
    /// Invoke a tool once
    Invoke {
        /// Tool name
        tool: String,
        /// JSON body for the tool
        #[arg(long)]
        body: Option<String>,
        /// Thread routing key
        #[arg(long, default_value = "default")]
        thread: String,
        /// Profile (named identity) within the thread
        #[arg(long, default_value = "default")]
        profile: String,
        /// After an interrupt, wait for the callback and retry once
        #[arg(long)]
        wait: bool,
    },
    /// Inspect and revoke credential sessions
    Sessions {
        #[command(subcommand)]
        command: SessionCommands,
    },
}

#[derive(Subcommand)]
enum SessionCommands {
    /// List sessions for a thread (never prints tokens)
    List {
        #[arg(default_value = "default")]
        thread: String,
    },
    /// Delete the session for a provider/thread/profile
    Delete {
        provider: String,
        #[arg(default_value = "default")]
        thread: String,
        #[arg(default_value = "default")]
        profile: String,
    },
}

/// Everything `main` wires together.
struct Gate {
    router: Arc<InvocationRouter>,
    orchestrator: Arc<AuthOrchestrator>,
    state: AppState,
    listen_addr: SocketAddr,
}

fn build_gate(config: &FileConfig) -> Result<Gate> {
    let listen_addr: SocketAddr = config
        .server
        .listen_addr
        .parse()
        .with_context(|| format!("invalid listen_addr '{}'", config.server.listen_addr))?;
    let base_url = config.server.public_base_url();

    // === Dependency Injection ===
    let pending = Arc::new(PendingOperations::new());
    let pages = Arc::new(PageStore::new());

    let store: Arc<dyn SessionStore> = match config.session_store.backend.as_str() {
        "memory" => Arc::new(MemorySessionStore::new()),
        "file" => {
            let path = match &config.session_store.path {
                Some(path) => PathBuf::from(path),
                None => dirs::data_dir()
                    .unwrap_or_else(std::env::temp_dir)
                    .join("toolgate")
                    .join("sessions.json"),
            };
            Arc::new(FileSessionStore::new(path)?)
        }
        other => bail!("unknown session_store backend '{}'", other),
    };

    let audit: Arc<dyn AuditLogger> = match &config.audit.path {
        Some(path) => match JsonlAuditLogger::new(path) {
            Some(logger) => Arc::new(logger),
            None => Arc::new(NoAuditLogger),
        },
        None => Arc::new(NoAuditLogger),
    };

    let mut registry = HandlerRegistry::new();
    for (name, provider_config) in config.providers.clone() {
        let descriptor = provider_config.into_descriptor(&name)?;
        registry = match descriptor.grant {
            GrantKind::AuthorizationCode => registry.register(Arc::new(OAuth2Handler::new(
                descriptor,
                Arc::clone(&pending),
                &base_url,
            ))),
            GrantKind::BearerToken => registry.register(Arc::new(StaticTokenHandler::new(
                descriptor,
                Arc::clone(&pending),
                &base_url,
            ))),
        };
    }

    let orchestrator = Arc::new(
        AuthOrchestrator::new(registry, store, Arc::clone(&pending)).with_audit(Arc::clone(&audit)),
    );

    let mut descriptors = Vec::with_capacity(config.tools.len());
    for (name, tool_config) in config.tools.clone() {
        descriptors.push(tool_config.into_descriptor(&name)?);
    }
    let catalog = Arc::new(StaticToolCatalog::from_descriptors(descriptors));

    let process_runtime = Arc::new(toolgate_infrastructure::SubprocessRuntime::new());
    let browser_runtime = Arc::new(BrowserRuntime::new(
        Arc::new(SharedChromium::new(&config.browser.binary)),
        Arc::clone(&pending),
        Arc::clone(&pages),
        &base_url,
        &config.browser.interpreter_url,
    ));

    let router = Arc::new(
        InvocationRouter::new(
            catalog,
            Arc::clone(&orchestrator),
            process_runtime,
            browser_runtime,
        )
        .with_tool_timeout(Duration::from_secs(config.invocation.tool_timeout_secs))
        .with_audit(audit),
    );

    Ok(Gate {
        router,
        orchestrator,
        state: AppState { pending, pages },
        listen_addr,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity level
    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"), // -vvv or more
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config = if cli.no_config {
        ConfigLoader::load_defaults()
    } else {
        ConfigLoader::load(cli.config.as_ref()).map_err(|e| anyhow::anyhow!(e))?
    };

    let gate = build_gate(&config)?;

    match cli.command {
        Commands::Serve => {
            info!("Starting toolgate callback surface");
            serve(gate.listen_addr, gate.state).await?;
        }
        Commands::Invoke {
            tool,
            body,
            thread,
            profile,
            wait,
        } => {
            // Callbacks need the surface up even for one-shot invocations
            let state = gate.state.clone();
            let listen_addr = gate.listen_addr;
            tokio::spawn(async move {
                if let Err(e) = serve(listen_addr, state).await {
                    eprintln!("callback surface stopped: {}", e);
                }
            });

            let body = match body {
                Some(raw) => serde_json::from_str(&raw).context("body is not valid JSON")?,
                None => serde_json::Value::Null,
            };
            let request = InvocationRequest::new(&tool)
                .with_body(body)
                .with_thread(&thread)
                .with_profile(&profile);

            let (text, interrupted) = gate.router.invoke(&request).await?.into_envelope();
            println!("{}", text);

            if interrupted && wait {
                println!();
                println!("Waiting for authorization callbacks...");
                let summaries = gate.orchestrator.list_for_thread(&thread).await?;
                for summary in summaries {
                    if summary.state == SessionState::AwaitingExternal
                        && summary.profile == profile
                    {
                        gate.orchestrator
                            .finish(&summary.provider, &thread, &profile)
                            .await?;
                        println!("Authorized: {}", summary.provider);
                    }
                }

                let (text, interrupted) = gate.router.invoke(&request).await?.into_envelope();
                if interrupted {
                    bail!("invocation still interrupted after authorization");
                }
                println!("{}", text);
            }
        }
        Commands::Sessions { command } => match command {
            SessionCommands::List { thread } => {
                let summaries = gate.orchestrator.list_for_thread(&thread).await?;
                println!("{}", serde_json::to_string_pretty(&summaries)?);
            }
            SessionCommands::Delete {
                provider,
                thread,
                profile,
            } => {
                let deleted = gate.orchestrator.delete(&provider, &thread, &profile).await?;
                println!("{}", deleted);
            }
        },
    }

    Ok(())
}
