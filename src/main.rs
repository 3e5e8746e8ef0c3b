use async_trait::async_trait;
use clap::{Parser, Subcommand};
use eduvpn_session::connection::{AssignedIps, ByteCount};
use eduvpn_session::credential::{ProvisionedSession, StoreError};
use eduvpn_session::discovery::{
    AuthorizationService, DiscoveryError, HttpOrganizationService, OrganizationService,
};
use eduvpn_session::expiry::TokioAlarm;
use eduvpn_session::renewal::{RenewEligibility, can_renew_with};
use eduvpn_session::time::{Clock, SystemClock};
use eduvpn_session::{
    Config, ConnectionStatus, CredentialStore, JsonFileBackend, ServerIdentity, SessionEngine,
    SessionError, SessionEvent, SessionParts, StoredCredential, Tunnel, classify_expiry, notify,
};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast::error::RecvError;
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "eduvpn-session")]
#[command(about = "Inspect and watch eduVPN session certificates")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to the platform config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show certificate validity for saved servers
    Status {
        /// Only this server
        server: Option<String>,
    },
    /// Show when the expiry alarm would fire
    Plan {
        server: String,
        /// Connection status to plan for
        #[arg(long, default_value = "connected")]
        status: ConnectionStatus,
    },
    /// Delete the saved credential for a server
    Forget { server: String },
    /// Live validity countdown with desktop notifications
    Watch {
        server: String,
        /// Treat the tunnel as connected so the expiry alarm is armed
        #[arg(long)]
        connected: bool,
    },
    /// List servers from the discovery service
    Servers {
        /// List organizations instead
        #[arg(long)]
        organizations: bool,
    },
    /// Generate default config file
    Init,
}

/// Tunnel stand-in with a fixed status; this binary never opens a tunnel
struct StaticTunnel {
    status: Mutex<ConnectionStatus>,
}

impl Tunnel for StaticTunnel {
    fn status(&self) -> ConnectionStatus {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn byte_count(&self) -> ByteCount {
        ByteCount::default()
    }

    fn assigned_ips(&self) -> AssignedIps {
        AssignedIps::default()
    }

    fn error_string(&self) -> Option<String> {
        None
    }

    fn disconnect(&self) {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner) = ConnectionStatus::Disconnected;
    }

    fn protocol_name(&self) -> &str {
        "none"
    }
}

/// Authorization needs a browser-based client; renewals fail here
struct NoAuthorization;

#[async_trait]
impl AuthorizationService for NoAuthorization {
    async fn discover_api(
        &self,
        server: &ServerIdentity,
        _force_reauth: bool,
    ) -> Result<ProvisionedSession, DiscoveryError> {
        Err(DiscoveryError::AuthorizationFailed(format!(
            "{} requires an interactive client to authorize",
            server
        )))
    }
}

fn config_path(cli_path: Option<PathBuf>) -> Option<PathBuf> {
    cli_path.or_else(Config::default_path)
}

fn open_store(config: &Config) -> Result<Arc<CredentialStore>, SessionError> {
    let path = match &config.storage.credentials_path {
        Some(path) => path.clone(),
        None => JsonFileBackend::default_path().ok_or_else(|| {
            StoreError::IoError(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no platform data directory",
            ))
        })?,
    };
    let backend = JsonFileBackend::new(path);
    info!("Credential store: {}", backend.path().display());
    let store = CredentialStore::open(Box::new(backend))?;
    Ok(Arc::new(store))
}

fn print_status(credential: &StoredCredential, config: &Config, now: i64) {
    let status = classify_expiry(now, credential.expiry_time_millis());
    let renew = can_renew_with(
        credential.authorized_at_millis(),
        now,
        config.session.renew_cooldown_millis(),
    );

    println!("{}", credential.server());
    println!("  Certificate: {}", status.bucket);
    if let Some(seconds) = status.remaining_seconds {
        println!("  Remaining: {}s", seconds);
    }
    match renew {
        RenewEligibility::Allowed => println!("  Renewal: allowed"),
        RenewEligibility::NotBefore { delay, .. } => {
            println!("  Renewal: allowed in {}s", delay.as_secs())
        }
    }
}

async fn watch(
    server: ServerIdentity,
    connected: bool,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let status = if connected {
        ConnectionStatus::Connected
    } else {
        ConnectionStatus::Disconnected
    };

    let engine = SessionEngine::new(
        server,
        SessionParts {
            store: open_store(config)?,
            tunnel: Arc::new(StaticTunnel {
                status: Mutex::new(status),
            }),
            auth: Arc::new(NoAuthorization),
            alarm: Arc::new(TokioAlarm::new(Arc::clone(&clock))),
            clock,
        },
        &config.session,
    );

    let mut validity = engine.subscribe_validity();
    let mut events = engine.subscribe();
    println!("{}: {}", engine.server(), engine.validity().bucket);

    engine.start_ticker().map_err(SessionError::from)?;
    if let Some(window) = engine.on_pause() {
        info!("Expiry alarm planned at {} ms", window.start_millis);
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            changed = validity.changed() => {
                if changed.is_err() {
                    break;
                }
                let status = *validity.borrow_and_update();
                println!("{}: {}", engine.server(), status.bucket);
            }
            event = events.recv() => match event {
                Ok(event) => {
                    if let SessionEvent::SchedulingFailed { message } = &event {
                        warn!("Background alarm unavailable: {}", message);
                    }
                    if let Err(e) = notify::notify_event(&event) {
                        warn!("{}", e);
                    }
                }
                Err(RecvError::Lagged(missed)) => warn!("Missed {} session events", missed),
                Err(RecvError::Closed) => break,
            },
            _ = &mut ctrl_c => {
                info!("Interrupted, stopping");
                break;
            }
        }
    }

    engine.stop_ticker();
    engine.on_resume();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let path = config_path(cli.config);
    let config = match &path {
        Some(path) => Config::load_or_default(path).map_err(SessionError::from)?,
        None => Config::default(),
    };

    match cli.command {
        Commands::Status { server } => {
            let store = open_store(&config)?;
            let now = SystemClock.now_millis();
            let credentials = match server {
                Some(server) => {
                    let server = ServerIdentity::from(server);
                    let credential = store
                        .get(&server)
                        .ok_or(SessionError::NoCredential(server))?;
                    vec![credential]
                }
                None => store.all(),
            };
            if credentials.is_empty() {
                println!("No saved credentials");
            }
            for credential in &credentials {
                print_status(credential, &config, now);
            }
        }
        Commands::Plan { server, status } => {
            let store = open_store(&config)?;
            let server = ServerIdentity::from(server);
            let credential = store
                .get(&server)
                .ok_or_else(|| SessionError::NoCredential(server.clone()))?;
            let now = SystemClock.now_millis();
            match config
                .session
                .notification_policy()
                .plan(credential.expiry_time_millis(), now, status)
            {
                Some(window) => {
                    println!("Alarm for {}", server);
                    println!(
                        "  Start: {} ms (in {}s)",
                        window.start_millis,
                        window.start_millis.saturating_sub(now) / 1000
                    );
                    println!("  Window length: {} ms", window.window_length_millis);
                }
                None => println!("No alarm needed for {} while {}", server, status),
            }
        }
        Commands::Forget { server } => {
            let store = open_store(&config)?;
            let server = ServerIdentity::from(server);
            match store.remove(&server)? {
                Some(_) => println!("Forgot credential for {}", server),
                None => println!("No credential saved for {}", server),
            }
        }
        Commands::Watch { server, connected } => {
            watch(ServerIdentity::from(server), connected, &config).await?;
        }
        Commands::Servers { organizations } => {
            let service = HttpOrganizationService::new(
                config.discovery.organization_list_url.as_str(),
                config.discovery.server_list_url.as_str(),
            )
            .map_err(SessionError::from)?;
            if organizations {
                for org in service.fetch_organizations().await.map_err(SessionError::from)? {
                    println!("{}  {}", org.org_id, org.display_name);
                }
            } else {
                for server in service.fetch_server_list().await.map_err(SessionError::from)? {
                    let name = server.display_name.clone().unwrap_or_default();
                    println!("{}  {}", server.base_url, name);
                    for contact in server.support_contacts() {
                        println!("    {}", contact);
                    }
                }
            }
        }
        Commands::Init => {
            let Some(path) = path else {
                return Err("No config directory found, pass --config".into());
            };
            info!("Generating default config...");
            Config::default().save(&path).map_err(SessionError::from)?;
            println!("Created default config: {}", path.display());
        }
    }

    Ok(())
}
