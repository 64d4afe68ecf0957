//! `apiseal`: sign and verify request packages, maintain the session store.

use apiseal_core::{ApiSealConfig, Clock, ManualClock, SystemClock};
use apiseal_session::{SessionFacade, SessionHandler, SessionStore};
use apiseal_signature::{CheckerRegistry, PackageSigner, SignatureProtocol, StaticRequest};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "apiseal", about = "apiseal — signed API requests and sessions")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "apiseal.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a signed package and print the header value
    Sign {
        /// Request origin, e.g. http://127.0.0.1:7001
        #[arg(long)]
        origin: String,
        /// Request method
        #[arg(short, long, default_value = "get")]
        method: String,
        /// Session id to claim (empty for a new client)
        #[arg(short, long, default_value = "")]
        session_id: String,
        /// Query parameter as key=value (repeatable)
        #[arg(short, long = "query", value_parser = parse_pair)]
        queries: Vec<(String, String)>,
        /// Client time in unix seconds (defaults to now)
        #[arg(long)]
        time: Option<i64>,
        /// Print the decoded package as JSON as well
        #[arg(long)]
        json: bool,
    },
    /// Verify a header value against a described request
    Verify {
        /// The signed header value
        #[arg(long)]
        header: String,
        /// Request origin, e.g. http://127.0.0.1:7001
        #[arg(long)]
        origin: String,
        /// Request method
        #[arg(short, long, default_value = "get")]
        method: String,
        /// Query parameter as key=value (repeatable)
        #[arg(short, long = "query", value_parser = parse_pair)]
        queries: Vec<(String, String)>,
        /// Server time in unix seconds (defaults to now)
        #[arg(long)]
        at: Option<i64>,
    },
    /// Remove sessions idle for longer than the given lifetime
    Gc {
        /// Maximum lifetime in seconds (defaults to session.min_ttl_secs)
        #[arg(long)]
        max_lifetime: Option<i64>,
    },
    /// Print a fresh session id
    NewId,
}

fn parse_pair(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))
}

fn load_config(path: &Path) -> anyhow::Result<ApiSealConfig> {
    if path.exists() {
        Ok(ApiSealConfig::load(path)?)
    } else {
        info!(path = %path.display(), "Config file not found, using defaults");
        Ok(ApiSealConfig::default())
    }
}

fn clock_at(at: Option<i64>) -> Arc<dyn Clock> {
    match at {
        Some(now) => Arc::new(ManualClock::new(now)),
        None => Arc::new(SystemClock),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Sign {
            origin,
            method,
            session_id,
            queries,
            time,
            json,
        } => {
            let client_time = time.unwrap_or_else(|| SystemClock.now());
            let query: BTreeMap<String, String> = queries.into_iter().collect();
            let package = PackageSigner::new(&config.protocol.version).sign(
                &session_id,
                &origin,
                &method,
                &query,
                client_time,
            );
            println!("{}", package.pack());
            if json {
                println!("{}", serde_json::to_string_pretty(&package)?);
            }
        }
        Commands::Verify {
            header,
            origin,
            method,
            queries,
            at,
        } => {
            let protocol = SignatureProtocol::from_config(
                &config.protocol,
                CheckerRegistry::with_defaults(),
                clock_at(at),
            )?;
            let mut request = StaticRequest::new(method)
                .with_header("origin", origin)
                .with_header(protocol.signature_header(), header);
            for (key, value) in queries {
                request = request.with_query(key, value);
            }

            match protocol.verify(&request) {
                Ok(package) => println!("{}", serde_json::to_string_pretty(&package)?),
                Err(e) => anyhow::bail!("verification failed: {e}"),
            }
        }
        Commands::Gc { max_lifetime } => {
            let store = SessionStore::from_config(&config.session, Arc::new(SystemClock)).await?;
            let max_lifetime = max_lifetime.unwrap_or(config.session.min_ttl_secs);
            let removed = store.gc(max_lifetime).await?;
            info!(removed, backend = %store.backend_kind(), "Garbage collection finished");
            println!("{removed}");
        }
        Commands::NewId => {
            println!("{}", SessionFacade::create_id()?);
        }
    }

    Ok(())
}
