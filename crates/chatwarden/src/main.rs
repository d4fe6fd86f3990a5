//! chatwarden - usage quota and liveness host
//!
//! This is the command-line host for the chatwarden core.
//! It wires together:
//! - Configuration loading
//! - Per-profile stores (usage record, purchase ledger, audit log)
//! - Usage tracker and purchase flow
//! - Entitlement backend (mock or storefront)
//! - Liveness watchdog with escalation

use anyhow::{Context, Result, bail};
use chatwarden_config::{Settings, load_config_or_default};
use chatwarden_core::{
    EscalationAction, EscalationPolicy, PurchaseFlow, UsageTracker, Watchdog, WatchdogConfig,
};
use chatwarden_entitlement::{EntitlementBackend, Product, build_backend};
use chatwarden_store::{AuditEvent, AuditEventType, AuditLog, JsonUsageStore, SqliteAuditLog};
use chatwarden_util::{
    AUDIT_DB_FILE, PURCHASES_FILE, ProfileId, USAGE_FILE, default_config_path,
    format_datetime_full, profile_dir,
};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Exit code for `check` and `record` when the daily quota is used up
const EXIT_QUOTA_DENIED: u8 = 3;

/// chatwarden - Daily chat quota, purchases and liveness watchdog
#[derive(Parser, Debug)]
#[command(name = "chatwarden", version)]
#[command(about = "Daily chat quota, purchases and liveness watchdog", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/chatwarden/config.toml)
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Data directory override (or set CHATWARDEN_DATA_DIR env var)
    #[arg(short, long, env = "CHATWARDEN_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Profile override
    #[arg(short, long)]
    profile: Option<String>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Write JSON logs to <log_dir>/chatwarden.log instead of stderr
    #[arg(long)]
    log_to_file: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show tier and remaining chats
    Status {
        /// Print the full status as JSON
        #[arg(long)]
        json: bool,
    },

    /// Exit 0 if a chat may be sent now, 3 if the quota is used up
    Check,

    /// Count one chat send
    Record,

    /// Buy an add-on
    Purchase {
        #[arg(value_enum)]
        product: ProductArg,
    },

    /// Restore previous purchases from the backend
    Restore,

    /// Show recent audit events
    Audit {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Run the host loop: heartbeats, watchdog and escalation
    Run {
        /// Stop sending heartbeats after this many seconds (simulates a hang)
        #[arg(long)]
        stall_after: Option<u64>,

        /// Exit after this many seconds instead of waiting for Ctrl-C
        #[arg(long)]
        duration: Option<u64>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ProductArg {
    Unlimited,
    Premium,
}

impl From<ProductArg> for Product {
    fn from(arg: ProductArg) -> Self {
        match arg {
            ProductArg::Unlimited => Product::UnlimitedUnlock,
            ProductArg::Premium => Product::PremiumSubscription,
        }
    }
}

/// One profile's wired-up components
struct App {
    settings: Settings,
    profile: ProfileId,
    tracker: Arc<UsageTracker>,
    audit: Arc<SqliteAuditLog>,
    backend: Arc<dyn EntitlementBackend>,
    watchdog: Arc<Watchdog>,
}

impl App {
    fn new(settings: Settings) -> Result<Self> {
        let profile = settings.app.profile.clone();
        let dir = profile_dir(&settings.app.data_dir, &profile);

        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create profile directory {:?}", dir))?;

        let audit_path = dir.join(AUDIT_DB_FILE);
        let audit = Arc::new(
            SqliteAuditLog::open(&audit_path)
                .with_context(|| format!("Failed to open audit log {:?}", audit_path))?,
        );

        let now = chatwarden_util::now();
        let tracker = Arc::new(UsageTracker::new(
            Arc::new(JsonUsageStore::new(dir.join(USAGE_FILE))),
            Some(audit.clone()),
            now,
        ));

        let backend = build_backend(&settings.entitlement, &dir.join(PURCHASES_FILE))
            .context("Failed to set up entitlement backend")?;

        if !audit.is_healthy() {
            warn!(path = %audit_path.display(), "Audit log is not responding");
        }
        if !backend.is_healthy() {
            warn!(backend = ?backend.capabilities().kind, "Entitlement backend is not healthy");
        }

        let watchdog = Arc::new(
            Watchdog::new(WatchdogConfig::from(&settings.watchdog)).with_audit(audit.clone()),
        );

        info!(
            profile = %profile,
            profile_dir = %dir.display(),
            backend = ?backend.capabilities().kind,
            "Profile loaded"
        );

        Ok(Self {
            settings,
            profile,
            tracker,
            audit,
            backend,
            watchdog,
        })
    }

    /// Run a storefront call with the watchdog suspended, timing it as an operation
    async fn network_call<T>(&self, name: &str, call: impl Future<Output = T>) -> Result<T> {
        let threshold = self.settings.entitlement.request_timeout;
        self.watchdog
            .disable_temporarily(threshold + self.settings.watchdog.timeout)?;

        let result = {
            let _op = self.watchdog.operation(name, threshold);
            call.await
        };

        self.watchdog.resume();
        Ok(result)
    }

    fn purchase_flow(&self) -> PurchaseFlow {
        PurchaseFlow::new(
            self.tracker.clone(),
            self.backend.clone(),
            self.settings.premium.duration_days,
        )
        .with_audit(self.audit.clone())
    }

    async fn execute(&self, command: Command) -> Result<ExitCode> {
        let now = chatwarden_util::now();

        match command {
            Command::Status { json } => {
                let status = self.tracker.status(now);
                if json {
                    println!("{}", serde_json::to_string_pretty(&status)?);
                } else {
                    println!("{}", status.status_text);
                    println!("Chats today: {}", status.daily_count);
                    println!("Chats total: {}", status.total_count);
                    if let Some(expiry) = status.premium_expiry {
                        println!("Premium until: {}", format_datetime_full(&expiry));
                    }
                    println!("Audit log: {}", health(self.audit.is_healthy()));
                    println!(
                        "Purchases: {:?} backend, {}",
                        self.backend.capabilities().kind,
                        health(self.backend.is_healthy())
                    );
                }
                Ok(ExitCode::SUCCESS)
            }

            Command::Check => {
                if self.tracker.can_send(now) {
                    println!("allowed ({})", self.tracker.status_text(now));
                    Ok(ExitCode::SUCCESS)
                } else {
                    println!("denied: daily free chats used up ({})", self.tracker.status_text(now));
                    Ok(ExitCode::from(EXIT_QUOTA_DENIED))
                }
            }

            Command::Record => {
                if !self.tracker.can_send(now) {
                    println!("denied: daily free chats used up");
                    return Ok(ExitCode::from(EXIT_QUOTA_DENIED));
                }
                self.tracker.record_send(now);
                println!("recorded ({})", self.tracker.status_text(now));
                Ok(ExitCode::SUCCESS)
            }

            Command::Purchase { product } => {
                let product = Product::from(product);
                let flow = self.purchase_flow();

                let name = format!("purchase:{}", product.id());
                let outcome = self
                    .network_call(&name, async {
                        match product {
                            Product::UnlimitedUnlock => flow.purchase_unlimited(now).await,
                            Product::PremiumSubscription => flow.purchase_premium(now).await,
                        }
                    })
                    .await?;

                println!("{}", outcome.message);
                if outcome.success() {
                    println!("{}", self.tracker.status_text(chatwarden_util::now()));
                    Ok(ExitCode::SUCCESS)
                } else {
                    Ok(ExitCode::FAILURE)
                }
            }

            Command::Restore => {
                let flow = self.purchase_flow();
                let summary = self
                    .network_call("restore_purchases", flow.restore(now))
                    .await?
                    .context("Failed to restore purchases")?;

                println!("{}", summary.message());
                println!("{}", self.tracker.status_text(chatwarden_util::now()));
                Ok(ExitCode::SUCCESS)
            }

            Command::Audit { limit } => {
                for event in self.audit.get_recent_audits(limit)? {
                    println!(
                        "{:>6}  {}  {:<20} {}",
                        event.id,
                        format_datetime_full(&event.timestamp),
                        event.kind(),
                        serde_json::to_string(&event.event)?
                    );
                }
                Ok(ExitCode::SUCCESS)
            }

            Command::Run {
                stall_after,
                duration,
            } => {
                self.run(stall_after.map(Duration::from_secs), duration.map(Duration::from_secs))
                    .await?;
                Ok(ExitCode::SUCCESS)
            }
        }
    }

    /// Host loop: heartbeat on a fixed period and react to watchdog timeouts
    async fn run(&self, stall_after: Option<Duration>, duration: Option<Duration>) -> Result<()> {
        self.log_audit(AuditEventType::AppStarted {
            profile: self.profile.to_string(),
        });

        let watchdog = &self.watchdog;
        let policy = EscalationPolicy::from_settings(&self.settings.watchdog);

        // The callback runs on the watchdog task; hand counts back to this loop.
        let (timeout_tx, mut timeouts) = mpsc::unbounded_channel::<u32>();
        watchdog.start(move |count| {
            let _ = timeout_tx.send(count);
        })?;

        let started = Instant::now();
        let mut heartbeat = tokio::time::interval(self.settings.watchdog.heartbeat_interval);
        let deadline = async {
            match duration {
                Some(d) => tokio::time::sleep(d).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(deadline);

        info!(
            status = %self.tracker.status_text(chatwarden_util::now()),
            "Host running, press Ctrl-C to exit"
        );

        let mut stall_logged = false;
        loop {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        error!(error = %e, "Failed to listen for Ctrl-C");
                    }
                    info!("Received Ctrl-C, shutting down");
                    break;
                }

                _ = &mut deadline => {
                    info!("Run duration reached, shutting down");
                    break;
                }

                _ = heartbeat.tick() => {
                    let stalled = stall_after.is_some_and(|s| started.elapsed() >= s);
                    if stalled {
                        if !stall_logged {
                            warn!("Simulating a hang: heartbeats stopped");
                            stall_logged = true;
                        }
                    } else {
                        watchdog.heartbeat();
                        debug!("Heartbeat");
                    }
                }

                Some(count) = timeouts.recv() => {
                    self.escalate(&policy, count);
                }
            }
        }

        watchdog.stop().await;

        self.log_audit(AuditEventType::AppStopped);
        info!("Shutdown complete");
        Ok(())
    }

    fn escalate(&self, policy: &EscalationPolicy, count: u32) {
        let action = policy.action(count);

        match action {
            EscalationAction::None => {
                info!(count, "Watchdog timeout below warning threshold");
            }
            EscalationAction::SoftWarning => {
                warn!(count, "Application appears unresponsive");
                println!("The application is not responding. Please wait...");
            }
            EscalationAction::OfferRestart => {
                error!(count, "Application unresponsive, offering restart");
                println!("The application has stopped responding. Restart it to recover.");
            }
        }

        self.log_audit(AuditEventType::WatchdogTimeout {
            consecutive: count,
            action: action.as_str().to_string(),
        });
    }

    fn log_audit(&self, event: AuditEventType) {
        if let Err(e) = self.audit.append_audit(AuditEvent::new(event)) {
            warn!(error = %e, "Failed to append audit event");
        }
    }
}

fn health(ok: bool) -> &'static str {
    if ok { "ok" } else { "unavailable" }
}

fn init_logging(args: &Args, settings: &Settings) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    if args.log_to_file {
        let log_dir = &settings.app.log_dir;
        std::fs::create_dir_all(log_dir)
            .with_context(|| format!("Failed to create log directory {:?}", log_dir))?;
        let log_path = log_dir.join("chatwarden.log");
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .with_context(|| format!("Failed to open log file {:?}", log_path))?;

        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(Mutex::new(file))
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    }

    Ok(())
}

fn load_settings(args: &Args) -> Result<Settings> {
    let mut settings = load_config_or_default(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;

    if let Some(data_dir) = &args.data_dir {
        settings.app.data_dir = data_dir.clone();
    }
    if let Some(profile) = &args.profile {
        settings.app.profile =
            ProfileId::new(profile.as_str()).with_context(|| format!("Invalid profile {:?}", profile))?;
    }

    if settings.app.data_dir.as_os_str().is_empty() {
        bail!("Data directory must not be empty");
    }

    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    let settings = load_settings(&args)?;

    init_logging(&args, &settings)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        profile = %settings.app.profile,
        mock_time = chatwarden_util::is_mock_time_active(),
        "chatwarden starting"
    );

    let app = App::new(settings)?;
    app.execute(args.command).await
}
