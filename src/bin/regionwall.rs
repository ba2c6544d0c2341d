//! regionwall: operator tool for region rules, GeoIP databases, cookies and request log sweeps.

use clap::{Parser, Subcommand};
use regionwall::config::GateConfig;
use regionwall::geo::{GeoDatabaseManager, GeoLocator, MaxMindLocator, NullLocator};
use regionwall::store::FileStore;
use regionwall::telemetry::{QueueLogger, RequestLogger, RetentionSweeper};
use regionwall::{ContentVisibility, CookieCodec, RegionMode, RegionPolicy};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "regionwall")]
#[command(author = "Kaitu.io")]
#[command(version = "0.1.0")]
#[command(about = "Region-aware content gating toolkit", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a region rule against a fingerprint
    Check {
        /// Region mode (e.g. allow_region, ForbidRegion, 3)
        #[arg(short, long)]
        mode: String,

        /// Allow pattern
        #[arg(short, long, default_value = "")]
        allow: String,

        /// Forbid pattern
        #[arg(short, long, default_value = "")]
        forbid: String,

        /// Fingerprint text to test
        #[arg(long)]
        fingerprint: String,
    },

    /// Resolve an IP with a MaxMind database
    Locate {
        /// City database (.mmdb)
        #[arg(short, long)]
        db: PathBuf,

        /// Optional ASN database (.mmdb)
        #[arg(long)]
        asn: Option<PathBuf>,

        /// IP address to resolve
        ip: String,
    },

    /// Encode (or decode) a raw-IP cookie value
    EncodeIp {
        /// Gate config providing the secret
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Secret (overrides config and environment)
        #[arg(short, long)]
        secret: Option<String>,

        /// Decode the value instead of encoding an IP
        #[arg(short, long)]
        decode: bool,

        /// IP address, or cookie value with --decode
        value: String,
    },

    /// Mint a trusted-visitor token for an identity
    Token {
        /// Gate config providing the secret
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Secret (overrides config and environment)
        #[arg(short, long)]
        secret: Option<String>,

        /// Identity cookie value (e.g. e-mail)
        identity: String,
    },

    /// Download or refresh the GeoIP City database
    GeoipUpdate {
        /// Directory holding the database
        #[arg(short = 'd', long, default_value = "geoip")]
        cache_dir: PathBuf,

        /// Download URL
        #[arg(short, long)]
        url: Option<String>,

        /// Download even if the installed copy is fresh
        #[arg(short, long)]
        force: bool,
    },

    /// Flush queued request logs and prune expired rows
    Sweep {
        /// Gate config
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// JSON store file
        #[arg(short, long)]
        store: PathBuf,

        /// Run one sweep and exit
        #[arg(long)]
        once: bool,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Check {
            mode,
            allow,
            forbid,
            fingerprint,
        } => check(&mode, allow, forbid, &fingerprint),
        Commands::Locate { db, asn, ip } => locate(&db, asn.as_deref(), &ip),
        Commands::EncodeIp {
            config,
            secret,
            decode,
            value,
        } => encode_ip(config.as_deref(), secret, decode, &value),
        Commands::Token {
            config,
            secret,
            identity,
        } => token(config.as_deref(), secret, &identity),
        Commands::GeoipUpdate {
            cache_dir,
            url,
            force,
        } => geoip_update(&cache_dir, url.as_deref(), force),
        Commands::Sweep {
            config,
            store,
            once,
        } => sweep(config.as_deref(), &store, once),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

type CliResult = Result<(), Box<dyn std::error::Error>>;

fn load_config(path: Option<&Path>) -> regionwall::Result<GateConfig> {
    match path {
        Some(path) => GateConfig::from_path(path),
        None => GateConfig::from_yaml_str(""),
    }
}

fn load_codec(config: Option<&Path>, secret: Option<String>) -> Result<CookieCodec, Box<dyn std::error::Error>> {
    let mut config = load_config(config)?;
    if let Some(secret) = secret {
        config.secret = secret;
    }
    if config.secret.trim().is_empty() {
        return Err("no secret given (use --secret, --config or REGIONWALL_SECRET)".into());
    }
    Ok(CookieCodec::new(&config.secret)?)
}

fn check(mode: &str, allow: String, forbid: String, fingerprint: &str) -> CliResult {
    let mode: RegionMode = mode.parse()?;
    for pattern in GateConfig::invalid_patterns([allow.as_str(), forbid.as_str()]) {
        eprintln!("Warning: pattern {:?} does not compile and never matches", pattern);
    }
    let visibility = ContentVisibility::new(mode, allow, forbid);
    let decision = RegionPolicy::new().evaluate(fingerprint, &visibility);
    println!("{}", decision);
    Ok(())
}

fn locate(db: &Path, asn: Option<&Path>, ip: &str) -> CliResult {
    let ip: IpAddr = ip
        .trim()
        .parse()
        .map_err(|_| regionwall::Error::InvalidIpAddress(ip.to_string()))?;
    let mut locator = MaxMindLocator::open(db)?;
    if let Some(asn) = asn {
        locator = locator.with_asn_database(asn)?;
    }
    let location = locator.resolve(&ip.to_string());
    println!("{}", serde_json::to_string_pretty(&location)?);
    Ok(())
}

fn encode_ip(config: Option<&Path>, secret: Option<String>, decode: bool, value: &str) -> CliResult {
    let codec = load_codec(config, secret)?;
    if decode {
        let ip = codec.try_decode_ip(value)?;
        println!("{}", ip);
    } else {
        let ip: IpAddr = value
            .trim()
            .parse()
            .map_err(|_| regionwall::Error::InvalidIpAddress(value.to_string()))?;
        println!("{}", codec.encode_ip(&ip));
    }
    Ok(())
}

fn token(config: Option<&Path>, secret: Option<String>, identity: &str) -> CliResult {
    let codec = load_codec(config, secret)?;
    println!("{}", codec.visitor_token(identity));
    Ok(())
}

fn geoip_update(cache_dir: &Path, url: Option<&str>, force: bool) -> CliResult {
    let manager = match url {
        Some(url) => GeoDatabaseManager::with_url(cache_dir, url),
        None => GeoDatabaseManager::new(cache_dir),
    };

    if !force && !manager.needs_update() {
        println!("GeoIP database is up to date: {:?}", manager.db_path());
        return Ok(());
    }

    let bytes = manager.download()?;
    println!("Installed {:?} ({} bytes)", manager.db_path(), bytes);
    Ok(())
}

fn sweep(config: Option<&Path>, store: &Path, once: bool) -> CliResult {
    let config = load_config(config)?;

    let locator: Arc<dyn GeoLocator> = match &config.geoip.database {
        Some(db) => {
            let mut locator = MaxMindLocator::open(db)?;
            if let Some(asn) = &config.geoip.asn_database {
                locator = locator.with_asn_database(asn)?;
            }
            Arc::new(locator)
        }
        None => {
            log::warn!("No GeoIP database configured; request logs will not be enriched");
            Arc::new(NullLocator)
        }
    };
    let store = Arc::new(FileStore::open(store)?);
    let logger: Arc<dyn RequestLogger> = Arc::new(
        QueueLogger::new(locator, store)
            .with_retention_months(config.telemetry.retention_months)
            .with_trace_mode(config.telemetry.trace_mode),
    );

    if once {
        let report = logger.process();
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async move {
        let sweeper = RetentionSweeper::spawn(logger, config.telemetry.sweep_interval());
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for shutdown signal: {}", e);
        }
        if let Some(report) = sweeper.shutdown().await {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Ok::<(), Box<dyn std::error::Error>>(())
    })?;
    Ok(())
}
