use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    time::Duration,
};

use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "remedi-core",
    version,
    about = "Remedi Core (medication reminder scheduling and reporting engine)"
)]
pub struct Args {
    #[arg(long, env = "REMEDI_HOST", default_value = "127.0.0.1")]
    pub host: IpAddr,

    #[arg(long, env = "REMEDI_PORT", default_value_t = 18790)]
    pub port: u16,

    #[arg(long, env = "REMEDI_DB_PATH", default_value = "./.remedi-core/remedi.db")]
    pub db_path: PathBuf,

    #[arg(
        long,
        env = "REMEDI_EXPORT_DIR",
        default_value = "./.remedi-core/exports"
    )]
    pub export_dir: PathBuf,

    #[arg(long, env = "REMEDI_SCHEDULER_POLL_MS", default_value_t = 1_000)]
    pub scheduler_poll_ms: u64,

    #[arg(long, env = "REMEDI_DELIVERY_DRAIN_MS", default_value_t = 15_000)]
    pub delivery_drain_ms: u64,

    #[arg(long, env = "REMEDI_RECONCILE_ENABLED", default_value_t = true)]
    pub reconcile_enabled: bool,

    #[arg(long, env = "REMEDI_RECONCILE_INTERVAL_MS", default_value_t = 300_000)]
    pub reconcile_interval_ms: u64,

    /// Outbound mail webhook; deliveries are logged without sending when unset.
    #[arg(long, env = "REMEDI_MAIL_WEBHOOK_URL")]
    pub mail_webhook_url: Option<String>,

    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_filter: String,

    #[arg(long, env = "REMEDI_JSON_LOGS", default_value_t = false)]
    pub json_logs: bool,
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub host: IpAddr,
    pub port: u16,
    pub db_path: PathBuf,
    pub export_dir: PathBuf,
    pub scheduler_poll_interval: Duration,
    pub delivery_drain_interval: Duration,
    pub reconcile_enabled: bool,
    pub reconcile_interval: Duration,
    pub mail_webhook_url: Option<String>,
    pub log_filter: String,
    pub json_logs: bool,
}

impl RuntimeConfig {
    pub fn from_args(args: Args) -> Result<Self, String> {
        if args.port == 0 {
            return Err("port must be greater than 0".to_owned());
        }
        if args.scheduler_poll_ms == 0 {
            return Err("scheduler_poll_ms must be greater than 0".to_owned());
        }
        if args.delivery_drain_ms == 0 {
            return Err("delivery_drain_ms must be greater than 0".to_owned());
        }
        if args.reconcile_interval_ms == 0 {
            return Err("reconcile_interval_ms must be greater than 0".to_owned());
        }

        let mail_webhook_url = normalize_url(args.mail_webhook_url)?;

        Ok(Self {
            host: args.host,
            port: args.port,
            db_path: args.db_path,
            export_dir: args.export_dir,
            scheduler_poll_interval: Duration::from_millis(args.scheduler_poll_ms),
            delivery_drain_interval: Duration::from_millis(args.delivery_drain_ms),
            reconcile_enabled: args.reconcile_enabled,
            reconcile_interval: Duration::from_millis(args.reconcile_interval_ms),
            mail_webhook_url,
            log_filter: args.log_filter,
            json_logs: args.json_logs,
        })
    }

    #[must_use]
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    #[must_use]
    pub fn for_test(host: IpAddr, port: u16, db_path: PathBuf, export_dir: PathBuf) -> Self {
        Self {
            host,
            port,
            db_path,
            export_dir,
            scheduler_poll_interval: Duration::from_millis(100),
            delivery_drain_interval: Duration::from_millis(200),
            reconcile_enabled: false,
            reconcile_interval: Duration::from_millis(60_000),
            mail_webhook_url: None,
            log_filter: "warn".to_owned(),
            json_logs: false,
        }
    }
}

fn normalize_url(input: Option<String>) -> Result<Option<String>, String> {
    let Some(value) = input else {
        return Ok(None);
    };
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if !trimmed.starts_with("http://") && !trimmed.starts_with("https://") {
        return Err(format!("mail webhook URL must be http(s): {trimmed}"));
    }
    Ok(Some(trimmed.to_owned()))
}
