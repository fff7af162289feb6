//! cterasdk-mcp - CTERA session tools over HTTP and the command line.
//!
//! `serve` starts the agent. The other commands run one tool, either
//! in-process or against a running agent (`--remote`), and print the result
//! envelope as JSON on stdout.

mod config;
mod remote;

use std::{path::PathBuf, process::ExitCode, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ctera_mcp_client::HttpClientFactory;
use ctera_mcp_session::{SessionManager, storage::MemoryStore};
use ctera_mcp_transport::{
    RunToolRequest, ToolDispatcher, ToolName,
    http::{AppState, router},
};
use serde_json::{Map, Value, json};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::{config::AgentConfig, remote::RemoteAgent};

#[derive(Parser)]
#[command(name = "cterasdk-mcp")]
#[command(version)]
#[command(about = "CTERA SDK MCP agent")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "CTERASDK_MCP_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Run tool commands against a running agent at this URL
    #[arg(long, global = true)]
    remote: Option<String>,

    /// Bearer token for the HTTP API
    #[arg(long, env = "MCP_API_TOKEN", global = true, hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP agent
    Serve {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(long)]
        port: Option<u16>,

        /// Serve the tool registration document at /mcp-tools-schema
        #[arg(long, env = "MCP_TOOLS_REGISTRATION", num_args = 0..=1, default_missing_value = "true")]
        tools_registration: Option<bool>,
    },

    /// List available tools
    Tools,

    /// Login to a CTERA server
    Login {
        /// Hostname or IP of the CTERA server
        #[arg(long)]
        host: String,

        #[arg(long)]
        username: String,

        #[arg(long, env = "CTERA_PASSWORD", hide_env_values = true)]
        password: String,

        /// admin, tenant_portal or edge
        #[arg(long)]
        client_type: Option<String>,

        /// Verify TLS certificates
        #[arg(long, num_args = 0..=1, default_missing_value = "true")]
        tls_verify: Option<bool>,
    },

    /// Logout a stored session
    Logout {
        #[arg(long)]
        session_key: String,
    },

    /// List stored sessions
    ListSessions,

    /// List all tenants in the Global Admin portal
    ListTenants {
        #[arg(long)]
        session_key: String,
    },
}

impl Commands {
    /// The tool invocation this command stands for, if any.
    fn tool_request(&self) -> Option<RunToolRequest> {
        let mut parameters = Map::new();
        let tool = match self {
            Self::Serve { .. } | Self::Tools => return None,
            Self::Login {
                host,
                username,
                password,
                client_type,
                tls_verify,
            } => {
                parameters.insert("host".to_string(), json!(host));
                parameters.insert("username".to_string(), json!(username));
                parameters.insert("password".to_string(), json!(password));
                if let Some(client_type) = client_type {
                    parameters.insert("client_type".to_string(), json!(client_type));
                }
                if let Some(tls_verify) = tls_verify {
                    parameters.insert("tls_verify".to_string(), json!(tls_verify));
                }
                ToolName::Login
            }
            Self::Logout { session_key } => {
                parameters.insert("session_key".to_string(), json!(session_key));
                ToolName::Logout
            }
            Self::ListSessions => ToolName::ListSessions,
            Self::ListTenants { session_key } => {
                parameters.insert("session_key".to_string(), json!(session_key));
                ToolName::ListTenants
            }
        };
        Some(RunToolRequest::new(tool.as_str(), parameters))
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays pure JSON
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("cterasdk_mcp={log_level},ctera_mcp={log_level},tower_http={log_level}")
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = AgentConfig::load(cli.config.as_deref())?;
    let (token, default_token) = config.resolve_token(cli.token.as_deref());

    if let Commands::Serve {
        host,
        port,
        tools_registration,
    } = &cli.command
    {
        if default_token {
            tracing::warn!("No API token configured, accepting the default token");
        }
        let host = host.clone().unwrap_or_else(|| config.server.host.clone());
        let port = port.unwrap_or(config.server.port);
        let tools_registration = tools_registration.unwrap_or(config.server.mcp_tools_registration);
        serve(&config, token, &host, port, tools_registration).await?;
        return Ok(ExitCode::SUCCESS);
    }

    let output = match &cli.remote {
        Some(url) => run_remote(&cli.command, url, token).await?,
        None => run_local(&cli.command, &config).await,
    };

    println!("{}", serde_json::to_string_pretty(&output.body)?);
    Ok(if output.ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// What a tool command prints, and whether it counts as success.
struct Output {
    body: Value,
    ok: bool,
}

impl Output {
    fn from_envelope(body: Value) -> Self {
        let ok = body.get("success").and_then(Value::as_bool) != Some(false);
        Self { body, ok }
    }

    const fn rejected(body: Value) -> Self {
        Self { body, ok: false }
    }
}

fn dispatcher(config: &AgentConfig) -> ToolDispatcher<MemoryStore, HttpClientFactory> {
    let mut factory = HttpClientFactory::new(config.timeout());
    if let Some(user_agent) = &config.backend.user_agent {
        factory = factory.with_user_agent(user_agent.clone());
    }
    let manager = SessionManager::new(MemoryStore::new(), factory)
        .with_logout_policy(config.logout_policy());
    ToolDispatcher::new(Arc::new(manager)).with_default_tls_verify(config.backend.tls_verify)
}

async fn serve(
    config: &AgentConfig,
    token: String,
    host: &str,
    port: u16,
    tools_registration: bool,
) -> Result<()> {
    let app = router(
        AppState::new(dispatcher(config), token).with_tools_registration(tools_registration),
    );

    let listener = tokio::net::TcpListener::bind((host, port))
        .await
        .with_context(|| format!("Failed to bind {host}:{port}"))?;
    tracing::info!("Starting CTERA SDK MCP agent on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Agent stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
    }
    tracing::info!("Shutting down...");
}

/// Run a command against an in-process session manager.
///
/// The store starts empty on every invocation.
async fn run_local(command: &Commands, config: &AgentConfig) -> Output {
    let dispatcher = dispatcher(config);
    let Some(request) = command.tool_request() else {
        return Output::from_envelope(json!(dispatcher.descriptors()));
    };

    match dispatcher.run(&request.name, &request.parameters).await {
        Ok(envelope) => Output::from_envelope(envelope),
        Err(error) => Output::rejected(json!({ "error": error.to_string(), "kind": error.kind() })),
    }
}

async fn run_remote(command: &Commands, url: &str, token: String) -> Result<Output> {
    let agent = RemoteAgent::new(url, token)?;
    let reply = match command.tool_request() {
        Some(request) => agent.run(&request).await?,
        None => agent.list_tools().await?,
    };

    Ok(if reply.status.is_success() {
        Output::from_envelope(reply.body)
    } else {
        Output::rejected(reply.body)
    })
}
