use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use esc_auth::{
    AccessTokenClaims, DEFAULT_CLIENT_ID, DEFAULT_IDP_URL, LocalTokenStore, RefreshMode,
};
use esc_client::{Client, Config, DEFAULT_API_URL};
use esc_core::waiter::DEFAULT_POLL_INTERVAL_SECS;
use esc_core::{StateWaiter, WaitOptions, WaitRequest, status};

/// Environment variable holding the log filter
const LOG_ENV: &str = "ESC_LOG";

#[derive(Parser)]
#[command(name = "esc")]
#[command(about = "Event Store Cloud access tokens and resource status", long_about = None)]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,

    /// Log output format (on stderr)
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ConnectionArgs {
    /// Event Store Cloud API URL
    #[arg(long, env = "ESC_URL", default_value = DEFAULT_API_URL, global = true)]
    url: String,

    /// Identity provider URL
    #[arg(long, env = "ESC_IDP_URL", default_value = DEFAULT_IDP_URL, global = true)]
    idp_url: String,

    /// OAuth client id
    #[arg(long, env = "ESC_CLIENT_ID", default_value = DEFAULT_CLIENT_ID, global = true)]
    client_id: String,

    /// Refresh token used to obtain access tokens
    #[arg(long, env = "ESC_TOKEN", hide_env_values = true, default_value = "", global = true)]
    refresh_token: String,

    /// Directory for cached access tokens [default: $HOME/.esctf/tokens]
    #[arg(long, env = "ESC_TOKEN_STORE", global = true)]
    token_store: Option<PathBuf>,

    /// Organization id
    #[arg(long, env = "ESC_ORG_ID", global = true)]
    organization_id: Option<String>,

    /// How concurrent token refreshes are coordinated
    #[arg(long, value_enum, default_value_t = RefreshModeArg::Serialized, global = true)]
    refresh_mode: RefreshModeArg,

    /// PEM certificate used to verify access tokens
    #[arg(long, global = true)]
    certificate: Option<PathBuf>,
}

impl ConnectionArgs {
    fn config(&self) -> Config {
        Config {
            url: self.url.clone(),
            identity_provider_url: self.idp_url.clone(),
            client_id: self.client_id.clone(),
            refresh_token: self.refresh_token.clone(),
            token_store: self
                .token_store
                .clone()
                .unwrap_or_else(LocalTokenStore::default_dir),
            organization_id: self.organization_id.clone(),
            refresh_mode: self.refresh_mode.into(),
            certificate_path: self.certificate.clone(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum RefreshModeArg {
    Serialized,
    Unsynchronized,
}

impl From<RefreshModeArg> for RefreshMode {
    fn from(mode: RefreshModeArg) -> Self {
        match mode {
            RefreshModeArg::Serialized => RefreshMode::Serialized,
            RefreshModeArg::Unsynchronized => RefreshMode::Unsynchronized,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Access token commands
    Token {
        #[command(subcommand)]
        command: TokenCommands,
    },
    /// Block until a resource reaches a status
    Wait {
        #[command(subcommand)]
        resource: WaitCommands,
    },
}

#[derive(Subcommand)]
enum TokenCommands {
    /// Show the cached access token's metadata and validity
    Inspect,
    /// Make sure a valid access token is cached
    Refresh {
        /// Refresh even if the cached token is still valid
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
enum WaitCommands {
    /// Wait for a network
    Network(WaitArgs),
    /// Wait for a managed cluster
    Cluster(WaitArgs),
    /// Wait for a peering
    Peering(WaitArgs),
}

#[derive(Args)]
struct WaitArgs {
    /// Project the resource belongs to
    #[arg(long)]
    project: String,

    /// Resource id
    #[arg(long)]
    id: String,

    /// Status to wait for
    #[arg(long, default_value = status::AVAILABLE)]
    state: String,

    /// Seconds between two polls
    #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL_SECS)]
    interval_secs: u64,

    /// Give up after this many seconds
    #[arg(long)]
    timeout_secs: Option<u64>,
}

impl WaitArgs {
    fn options(&self) -> WaitOptions {
        let options =
            WaitOptions::default().with_interval(Duration::from_secs(self.interval_secs.max(1)));
        match self.timeout_secs {
            Some(secs) => options.with_max_duration(Duration::from_secs(secs)),
            None => options,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    if let Err(e) = run(cli).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
    }
}

async fn run(cli: Cli) -> Result<()> {
    let client = Client::new(&cli.connection.config())?;

    match cli.command {
        Commands::Token { command } => match command {
            TokenCommands::Inspect => run_token_inspect(&client).await,
            TokenCommands::Refresh { force } => run_token_refresh(&client, force).await,
        },
        Commands::Wait { resource } => run_wait(client, resource).await,
    }
}

async fn run_token_inspect(client: &Client) -> Result<()> {
    let tokens = client.tokens();
    let audience = tokens.audience();
    let record = tokens
        .inspect(audience)
        .await
        .with_context(|| format!("no usable token cached for {}", audience))?;

    println!("{} {}", "Audience:".bold(), audience);
    println!("{} {}", "Token type:".bold(), record.token_type);
    println!("{} {}", "Scope:".bold(), record.scope);
    println!("{} {}s", "Expires in:".bold(), record.expires_in);
    println!(
        "{} {}",
        "Refresh token:".bold(),
        if record.refresh_token.is_some() {
            "present"
        } else {
            "absent"
        }
    );

    match tokens.validator().validate(&record.access_token) {
        Ok(validated) => {
            println!("{} {}", "✓".green(), "Access token is valid".green());
            for line in describe_claims(&validated.claims) {
                println!("  {}", line);
            }
            if !validated.audience_accepted {
                println!(
                    "  {} token audience is not one of the accepted audiences",
                    "!".yellow()
                );
            }
        }
        Err(e) => {
            println!("{} {} {}", "✗".red(), "Access token is invalid:".red(), e);
            if let Some(claims) = e.claims() {
                for line in describe_claims(claims) {
                    println!("  {}", line);
                }
            }
        }
    }

    Ok(())
}

fn describe_claims(claims: &AccessTokenClaims) -> Vec<String> {
    let mut lines = Vec::new();
    if let Some(sub) = &claims.sub {
        lines.push(format!("subject: {}", sub));
    }
    if let Some(aud) = &claims.aud {
        let audiences: Vec<&str> = aud.iter().collect();
        lines.push(format!("audience: {}", audiences.join(", ")));
    }
    if let Some(nbf) = claims.nbf {
        lines.push(format!("not before: {}", format_timestamp(nbf)));
    }
    if let Some(exp) = claims.exp {
        lines.push(format!("expires at: {}", format_timestamp(exp)));
    }
    lines
}

fn format_timestamp(secs: u64) -> String {
    i64::try_from(secs)
        .ok()
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .map(|at| at.to_rfc3339())
        .unwrap_or_else(|| secs.to_string())
}

async fn run_token_refresh(client: &Client, force: bool) -> Result<()> {
    client.tokens().refresh(force).await?;
    println!(
        "{} Access token for {} is cached",
        "✓".green(),
        client.tokens().audience()
    );
    Ok(())
}

async fn run_wait(client: Client, command: WaitCommands) -> Result<()> {
    let Some(organization_id) = client.organization_id().map(str::to_string) else {
        bail!("an organization id is required (--organization-id or ESC_ORG_ID)");
    };

    let (kind, args) = match &command {
        WaitCommands::Network(args) => ("network", args),
        WaitCommands::Cluster(args) => ("cluster", args),
        WaitCommands::Peering(args) => ("peering", args),
    };
    let client = client.with_waiter(StateWaiter::default().with_options(args.options()));
    let request = WaitRequest::new(organization_id, &args.project, &args.id, &args.state);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    info!(kind, id = %args.id, state = %args.state, "Waiting for resource");
    let reached = match &command {
        WaitCommands::Network(_) => {
            client
                .network_wait_for_state(&request, &cancel)
                .await?
                .status
        }
        WaitCommands::Cluster(_) => {
            client
                .managed_cluster_wait_for_state(&request, &cancel)
                .await?
                .status
        }
        WaitCommands::Peering(_) => {
            client
                .peering_wait_for_state(&request, &cancel)
                .await?
                .status
        }
    };

    println!("{} {} {} is {}", "✓".green(), kind, args.id, reached.green());
    Ok(())
}
