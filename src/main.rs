use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use sreagent::agent::Agent;
use sreagent::config::AgentConfig;
use sreagent::demo_backend::{self, ServiceState};
use sreagent::probes::HttpProber;
use sreagent::remediation::backend::SelfHealer;
use sreagent::remediation::{self, Outcome, RemediationAttempt};

#[derive(Parser)]
#[command(
    name = "sreagent",
    about = "Policy-gated host incident detection, remediation and reporting",
    version,
    long_about = None
)]
struct Cli {
    /// TOML configuration file (defaults to $SRE_AGENT_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the detect/remediate/verify/classify pipeline once
    Run {
        /// Do not deliver the report
        #[arg(long)]
        no_notify: bool,

        /// Print the run result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Start the agent API server
    Serve {
        /// Bind address
        #[arg(long, default_value = "127.0.0.1:8080")]
        bind: String,
    },

    /// Run the demo backend used as a remediation target
    DemoBackend {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        #[arg(long, default_value = "8000")]
        port: u16,

        /// Reject the /simulate endpoints
        #[arg(long)]
        no_simulation: bool,
    },

    /// Knowledge base maintenance
    Kb {
        #[command(subcommand)]
        action: KbAction,
    },

    /// Run a single remediation action (still subject to policy flags)
    Action {
        #[command(subcommand)]
        action: ActionKind,
    },
}

#[derive(Subcommand)]
enum KbAction {
    /// Re-download and parse the configured knowledge base
    Refresh,

    /// Show the classification for an incident type
    Lookup {
        /// Incident type label, e.g. "Disk Usage High"
        incident_type: String,
    },
}

#[derive(Subcommand)]
enum ActionKind {
    /// Sweep the configured temp directory
    ClearTemp,

    /// Restart a service through the host service manager
    RestartService {
        #[arg(long)]
        name: String,
    },

    /// Heal the configured backend
    SelfHeal {
        /// Backend base URL (defaults to the configured one)
        #[arg(long)]
        url: Option<String>,
    },
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config = AgentConfig::resolve(cli.config.as_deref())?;

    match cli.command {
        Commands::Run { no_notify, json } => run(config, !no_notify, json).await?,
        Commands::Serve { bind } => {
            tracing::info!(%bind, "starting sre agent");
            sreagent::serve(&bind, config).await?;
        }
        Commands::DemoBackend {
            host,
            port,
            no_simulation,
        } => {
            let bind = format!("{host}:{port}");
            let state = ServiceState::new(!no_simulation);
            demo_backend::serve(&bind, state, async {
                let _ = tokio::signal::ctrl_c().await;
            })
            .await?;
        }
        Commands::Kb { action } => kb(config, action).await?,
        Commands::Action { action } => act(config, action).await?,
    }

    Ok(())
}

async fn run(config: AgentConfig, notify: bool, json: bool) -> Result<()> {
    let agent = Agent::from_config(config).await?;
    tokio::spawn(sreagent::shutdown_signal(agent.cancel_token()));

    let outcome = agent.run_once(notify).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&outcome.result)?);
        return Ok(());
    }

    let result = &outcome.result;
    println!("\n{}", outcome.report.subject);
    println!("{:<16} | {}", "Incident", result.incident.kind());
    println!("{:<16} | {}", "Severity", result.incident.severity());
    println!("{:<16} | {}", "Status", result.status);
    println!("{:<16} | {}", "Details", result.incident.details());
    println!(
        "{:<16} | {} {}",
        "Classification", result.classification.code, result.classification.title
    );
    for attempt in &result.attempts {
        println!("{:<16} | {}", "Attempt", attempt.summary());
    }
    for (name, value) in result.evidence.iter() {
        println!("{:<16} | {name} = {value}", "Evidence");
    }
    println!("\nNext steps:");
    for step in &result.next_steps {
        println!("  - {step}");
    }
    if let Some(diagnosis) = &outcome.report.diagnosis {
        println!("\nDiagnosis: {diagnosis}");
    }
    Ok(())
}

async fn kb(config: AgentConfig, action: KbAction) -> Result<()> {
    match action {
        KbAction::Refresh => {
            if config.kb.url.is_none() {
                bail!("no knowledge base URL configured (set KB_URL)");
            }
            let agent = Agent::new(config, Arc::new(sreagent::system::SysinfoHost::new()))?;
            let status = agent
                .refresh_kb()
                .await
                .context("knowledge base refresh failed")?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        KbAction::Lookup { incident_type } => {
            let agent = Agent::from_config(config).await?;
            let classification = agent.classifier().await.classify(&incident_type);
            println!("{}", serde_json::to_string_pretty(&classification)?);
        }
    }
    Ok(())
}

async fn act(config: AgentConfig, action: ActionKind) -> Result<()> {
    let policy = &config.policy;
    let attempt = match action {
        ActionKind::ClearTemp => {
            if !policy.allow_clear_temp {
                bail!("clear-temp is disabled by policy (set ALLOW_CLEAR_TEMP=true)");
            }
            let report = remediation::clear_temporary_storage(&config.host.temp_dir).await;
            RemediationAttempt::clear_temp(report)
        }
        ActionKind::RestartService { name } => {
            if !policy.allow_restart_service {
                bail!("restart-service is disabled by policy (set ALLOW_RESTART_SERVICE=true)");
            }
            RemediationAttempt::restart_service(remediation::restart_service(&name).await)
        }
        ActionKind::SelfHeal { url } => {
            if !policy.allow_backend_self_heal {
                bail!("self-heal is disabled by policy (set ALLOW_BACKEND_SELF_HEAL=true)");
            }
            let Some(url) = url.or_else(|| config.backend.url.clone()) else {
                bail!("no backend URL given (use --url or set BACKEND_URL)");
            };
            let healer = SelfHealer::from_config(HttpProber::default(), &config.backend);
            let cancel = tokio_util::sync::CancellationToken::new();
            tokio::spawn(sreagent::shutdown_signal(cancel.clone()));
            let report = healer.attempt(&url, &cancel).await;
            RemediationAttempt::backend_self_heal(url, report)
        }
    };

    println!("{}", serde_json::to_string_pretty(&attempt)?);
    if attempt.outcome == Outcome::Failed {
        bail!("{}", attempt.summary());
    }
    Ok(())
}
