use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use agentwire_core::args::CommonArgs;
use agentwire_core::error::METHOD_NOT_FOUND;
use agentwire_core::logging::{self, LogConfig};
use agentwire_core::protocol::{
    Dialect, OutboundCall, ResponseAction, ResponseContext, SessionEvent, SessionUpdate,
};
use agentwire_core::{AgentService, CallError, ClientConfig, ConnectionState, RpcError, ServiceEvent};
use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

// ── CLI ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Parser)]
#[command(
    name = "agentwire",
    version,
    about = "Talk to coding agents over WebSocket"
)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Initialize, open a session, and optionally send one prompt
    Probe {
        /// Working directory for the new session (default: current dir)
        #[arg(long, value_name = "DIR")]
        cwd: Option<PathBuf>,
        /// Prompt to send once the session is open
        #[arg(long, short)]
        prompt: Option<String>,
        /// Seconds to wait for each setup call
        #[arg(long, value_name = "SECS", default_value_t = 15)]
        timeout: u64,
        /// Seconds to wait for the prompt to finish
        #[arg(long, value_name = "SECS", default_value_t = 300)]
        prompt_timeout: u64,
    },
    /// Connect, send a WebSocket ping, and disconnect
    Ping,
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(LogConfig::from_env().with_verbosity(cli.common.verbose));
    let config = cli.common.load_config()?;

    match cli.command {
        Commands::Probe {
            cwd,
            prompt,
            timeout,
            prompt_timeout,
        } => {
            let cwd = match cwd {
                Some(dir) => dir,
                None => std::env::current_dir().context("Failed to read current directory")?,
            };
            probe(
                &config,
                &cwd.to_string_lossy(),
                prompt.as_deref(),
                Duration::from_secs(timeout),
                Duration::from_secs(prompt_timeout),
            )
            .await
        }
        Commands::Ping => ping(&config).await,
        Commands::Config => {
            let rendered = config_summary(&config)?;
            println!("{rendered}");
            Ok(())
        }
    }
}

fn config_summary(config: &ClientConfig) -> Result<String> {
    serde_json::to_string_pretty(&serde_json::json!({
        "url": config.url,
        "dialect": config.dialect.to_string(),
        "provider": config.provider.to_string(),
        "json_encoding": config.json_encoding.to_string(),
        "event_buffer": config.event_buffer,
        "headers": config.headers.iter().map(|h| &h.name).collect::<Vec<_>>(),
        "client_info": {"name": config.client_info.name, "version": config.client_info.version},
    }))
    .context("Failed to render config")
}

// ── Commands ────────────────────────────────────────────────────────────────

async fn connect(config: &ClientConfig) -> Result<(Arc<AgentService>, mpsc::Receiver<ServiceEvent>)> {
    let (service, events) = AgentService::from_config(config);
    service
        .connect(&config.url, &config.header_pairs())
        .await
        .with_context(|| format!("Failed to connect to {}", config.url))?;
    Ok((Arc::new(service), events))
}

async fn ping(config: &ClientConfig) -> Result<()> {
    let (service, _events) = connect(config).await?;
    service.ping().await.context("Ping failed")?;
    tokio::time::sleep(Duration::from_millis(250)).await;
    let state = service.state();
    service.close().await;
    if state != ConnectionState::Connected {
        bail!("Connection dropped after ping ({state})");
    }
    println!("{}: ping ok", config.url);
    Ok(())
}

async fn probe(
    config: &ClientConfig,
    cwd: &str,
    prompt: Option<&str>,
    wait: Duration,
    prompt_wait: Duration,
) -> Result<()> {
    let dialect = config.dialect.build();
    let (service, events) = connect(config).await?;
    let printer = spawn_event_printer(service.clone(), dialect.clone(), events);

    let result = run_probe(&service, dialect.as_ref(), config, cwd, prompt, wait, prompt_wait).await;

    printer.abort();
    service.close().await;
    result
}

async fn run_probe(
    service: &AgentService,
    dialect: &dyn Dialect,
    config: &ClientConfig,
    cwd: &str,
    prompt: Option<&str>,
    wait: Duration,
    prompt_wait: Duration,
) -> Result<()> {
    let init = dialect.initialize_request(&config.client_info);
    let ctx = init.context();
    send(service, dialect, init, ctx, wait).await?;

    let open = dialect.new_session_request(cwd);
    let ctx = open.context().with_cwd(cwd);
    let actions = send(service, dialect, open, ctx, wait).await?;
    let session_id = actions.iter().find_map(|action| match action {
        ResponseAction::SessionActivated(activation) => Some(activation.session_id.clone()),
        _ => None,
    });
    let Some(session_id) = session_id else {
        bail!("Agent did not return a session id");
    };

    if let Some(text) = prompt {
        let call = dialect.prompt_request(&session_id, text);
        let ctx = call.context().with_session(session_id.as_str());
        send(service, dialect, call, ctx, prompt_wait).await?;
    }
    Ok(())
}

/// Send one call and print what its response means.
async fn send(
    service: &AgentService,
    dialect: &dyn Dialect,
    call: OutboundCall,
    ctx: ResponseContext,
    wait: Duration,
) -> Result<Vec<ResponseAction>> {
    let method = call.method;
    if call.notification {
        service.notify(method, call.params).await?;
        return Ok(Vec::new());
    }

    let outcome = match tokio::time::timeout(wait, service.call(method, call.params)).await {
        Err(_) => bail!("{method} timed out after {}s", wait.as_secs()),
        Ok(Ok(result)) => Ok(result),
        Ok(Err(CallError::Rpc(error))) => Err(error),
        Ok(Err(other)) => return Err(other).with_context(|| format!("{method} failed")),
    };

    let actions = dialect.interpret_response(&ctx, &outcome);
    for action in &actions {
        print_action(action);
    }
    Ok(actions)
}

// ── Output ──────────────────────────────────────────────────────────────────

fn spawn_event_printer(
    service: Arc<AgentService>,
    dialect: Arc<dyn Dialect>,
    mut events: mpsc::Receiver<ServiceEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                ServiceEvent::Notification { method, params } => {
                    if let Some(event) = dialect.interpret_notification(&method, &params) {
                        print_update(&event);
                    }
                }
                ServiceEvent::ServerRequest { id, method, params } => {
                    let reply = match dialect.interpret_request(&method, &params) {
                        Some(request) => {
                            let title = request
                                .tool_call
                                .as_ref()
                                .map(|t| t.title.as_str())
                                .unwrap_or("tool call");
                            println!("[permission] {title}: declined");
                            service
                                .respond(id, dialect.permission_response(None))
                                .await
                        }
                        None => {
                            service
                                .respond_error(
                                    id,
                                    RpcError::new(
                                        METHOD_NOT_FOUND,
                                        format!("Method not found: {method}"),
                                    ),
                                )
                                .await
                        }
                    };
                    if let Err(err) = reply {
                        tracing::warn!(error = %err, "Failed to answer server request");
                    }
                }
                ServiceEvent::StateChanged(state) => tracing::info!(%state, "State changed"),
                ServiceEvent::Malformed { reason, .. } => eprintln!("[malformed] {reason}"),
                ServiceEvent::WillSend { .. } => {}
            }
        }
    })
}

fn print_action(action: &ResponseAction) {
    match action {
        ResponseAction::SessionMigrated { from, to } => println!("[session] {from} -> {to}"),
        ResponseAction::SessionActivated(activation) => {
            println!(
                "[session] active {} (cwd: {})",
                activation.session_id,
                activation.cwd.as_deref().unwrap_or("-")
            );
            if let Some(modes) = &activation.modes {
                let names: Vec<_> = modes.available.iter().map(|m| m.id.as_str()).collect();
                println!(
                    "[modes] current {} of [{}]",
                    modes.current_mode_id.as_deref().unwrap_or("-"),
                    names.join(", ")
                );
            }
        }
        ResponseAction::CapabilitiesConfirmed(caps) => println!(
            "[agent] {} {} load={} list={} resume={}",
            caps.agent_name.as_deref().unwrap_or("unknown"),
            caps.agent_version.as_deref().unwrap_or(""),
            caps.load_session,
            caps.list_sessions,
            caps.resume_session
        ),
        ResponseAction::CapabilityDisabled(capability) => {
            println!("[agent] {capability} not supported")
        }
        ResponseAction::RpcError { method, error } => eprintln!("[error] {method}: {error}"),
        ResponseAction::PromptCompleted { stop_reason } => {
            println!("\n[done] {}", stop_reason.as_deref().unwrap_or("completed"))
        }
        other => println!("[{other}]"),
    }
}

fn print_update(event: &SessionEvent) {
    use std::io::Write;

    match &event.update {
        SessionUpdate::AgentMessageChunk { text } => {
            print!("{text}");
            let _ = std::io::stdout().flush();
        }
        SessionUpdate::AgentThoughtChunk { text } => eprint!("{text}"),
        SessionUpdate::ToolCallStarted(info) => println!("\n[tool] {} ({})", info.title, info.id),
        SessionUpdate::ToolCallUpdated(update) => {
            if let Some(status) = &update.status {
                println!("[tool] {} {status}", update.id);
            }
        }
        SessionUpdate::PlanUpdated { entries } => {
            for entry in entries {
                println!(
                    "[plan] {} {}",
                    entry.status.as_deref().unwrap_or("-"),
                    entry.content
                );
            }
        }
        other => tracing::debug!(update = %other, "Session update"),
    }
}
