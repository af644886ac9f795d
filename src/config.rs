use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use std::{env, path::PathBuf, str::FromStr, time::Duration};

/// Where uploaded images are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ObjectStoreKind {
    /// Local disk, served back under `/objects/{*key}`.
    Local,
    /// A Supabase Storage bucket.
    Supabase,
}

/// Where inspection records are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RecordStoreKind {
    /// A local SQLite database.
    Sqlite,
    /// A Supabase (PostgREST) table.
    Supabase,
}

#[derive(Clone)]
pub struct SupabaseConfig {
    pub url: String,
    pub key: String,
}

impl std::fmt::Debug for SupabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseConfig")
            .field("url", &self.url)
            .field("key", &"<redacted>")
            .finish()
    }
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub staging_dir: PathBuf,
    pub object_store: ObjectStoreKind,
    pub record_store: RecordStoreKind,
    pub storage_dir: PathBuf,
    pub database_url: String,
    pub public_base_url: String,
    pub supabase: Option<SupabaseConfig>,
    pub bucket: String,
    pub table: String,
    /// `None` selects the mock classifier.
    pub inference_url: Option<String>,
    pub call_timeout: Duration,
    pub max_upload_bytes: usize,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Scan upload, classification and inspection relay")]
pub struct Args {
    /// Host to bind to (overrides SCAN_RELAY_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory for in-flight uploads (overrides SCAN_RELAY_STAGING_DIR)
    #[arg(long)]
    pub staging_dir: Option<PathBuf>,

    /// Object store backend (overrides SCAN_RELAY_OBJECT_STORE)
    #[arg(long, value_enum)]
    pub object_store: Option<ObjectStoreKind>,

    /// Record store backend (overrides SCAN_RELAY_RECORD_STORE)
    #[arg(long, value_enum)]
    pub record_store: Option<RecordStoreKind>,

    /// Directory for the local object store (overrides SCAN_RELAY_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<PathBuf>,

    /// SQLite database URL (overrides SCAN_RELAY_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Public origin used in local object URLs (overrides SCAN_RELAY_PUBLIC_BASE_URL)
    #[arg(long)]
    pub public_base_url: Option<String>,

    /// Supabase project URL (overrides SUPABASE_URL)
    #[arg(long)]
    pub supabase_url: Option<String>,

    /// Supabase API key (overrides SUPABASE_KEY)
    #[arg(long)]
    pub supabase_key: Option<String>,

    /// Storage bucket name (overrides SCAN_RELAY_BUCKET)
    #[arg(long)]
    pub bucket: Option<String>,

    /// Inspection table name (overrides SCAN_RELAY_TABLE)
    #[arg(long)]
    pub table: Option<String>,

    /// Inference service origin; mock classification when unset (overrides INFERENCE_SERVICE_URL)
    #[arg(long)]
    pub inference_url: Option<String>,

    /// Timeout for each external call in seconds (overrides SCAN_RELAY_CALL_TIMEOUT_SECS)
    #[arg(long)]
    pub call_timeout_secs: Option<u64>,

    /// Maximum accepted request body in bytes (overrides SCAN_RELAY_MAX_UPLOAD_BYTES)
    #[arg(long)]
    pub max_upload_bytes: Option<usize>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        // Parse CLI once
        let args = Args::parse();
        Self::resolve(args, |name| match env::var(name) {
            Ok(value) => Ok(Some(value)),
            Err(env::VarError::NotPresent) => Ok(None),
            Err(err) => Err(err).with_context(|| format!("reading {}", name)),
        })
    }

    /// Merge `args` over the variables produced by `lookup`.
    pub fn resolve<F>(args: Args, lookup: F) -> Result<(Self, bool)>
    where
        F: Fn(&str) -> Result<Option<String>>,
    {
        // --- Environment fallback ---
        let parsed = |name: &str| -> Result<Option<String>> {
            Ok(lookup(name)?.filter(|v| !v.trim().is_empty()))
        };
        // blank values fall back to the default
        let text = |name: &str, default: &str| -> Result<String> {
            Ok(parsed(name)?.unwrap_or_else(|| default.to_string()))
        };

        let env_host = text("SCAN_RELAY_HOST", "0.0.0.0")?;
        let env_port = parse_var(&lookup, "PORT", 5000u16)?;
        let env_staging = text("SCAN_RELAY_STAGING_DIR", "./data/uploads")?;
        let env_object_store = match parsed("SCAN_RELAY_OBJECT_STORE")? {
            Some(value) => {
                <ObjectStoreKind as ValueEnum>::from_str(&value, true).map_err(anyhow::Error::msg)?
            }
            None => ObjectStoreKind::Local,
        };
        let env_record_store = match parsed("SCAN_RELAY_RECORD_STORE")? {
            Some(value) => {
                <RecordStoreKind as ValueEnum>::from_str(&value, true).map_err(anyhow::Error::msg)?
            }
            None => RecordStoreKind::Sqlite,
        };
        let env_storage = text("SCAN_RELAY_STORAGE_DIR", "./data/objects")?;
        let env_db = text(
            "SCAN_RELAY_DATABASE_URL",
            "sqlite://./data/meta/scan_relay.db",
        )?;
        let env_timeout = parse_var(&lookup, "SCAN_RELAY_CALL_TIMEOUT_SECS", 30u64)?;
        let env_max_upload =
            parse_var(&lookup, "SCAN_RELAY_MAX_UPLOAD_BYTES", 10 * 1024 * 1024usize)?;

        // --- Merge ---
        let port = args.port.unwrap_or(env_port);
        let public_base_url = match args.public_base_url {
            Some(url) => url,
            None => parsed("SCAN_RELAY_PUBLIC_BASE_URL")?
                .unwrap_or_else(|| format!("http://localhost:{}", port)),
        };
        let supabase_url = args.supabase_url.or(parsed("SUPABASE_URL")?);
        let supabase_key = args.supabase_key.or(parsed("SUPABASE_KEY")?);
        let supabase = match (supabase_url, supabase_key) {
            (Some(url), Some(key)) => Some(SupabaseConfig { url, key }),
            _ => None,
        };
        let call_timeout_secs = args.call_timeout_secs.unwrap_or(env_timeout);
        if call_timeout_secs == 0 {
            bail!("call timeout must be at least one second");
        }

        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port,
            staging_dir: args.staging_dir.unwrap_or_else(|| env_staging.into()),
            object_store: args.object_store.unwrap_or(env_object_store),
            record_store: args.record_store.unwrap_or(env_record_store),
            storage_dir: args.storage_dir.unwrap_or_else(|| env_storage.into()),
            database_url: args.database_url.unwrap_or(env_db),
            public_base_url,
            supabase,
            bucket: args
                .bucket
                .unwrap_or(text("SCAN_RELAY_BUCKET", "scans")?),
            table: args
                .table
                .unwrap_or(text("SCAN_RELAY_TABLE", "inspections")?),
            inference_url: args.inference_url.or(parsed("INFERENCE_SERVICE_URL")?),
            call_timeout: Duration::from_secs(call_timeout_secs),
            max_upload_bytes: args.max_upload_bytes.unwrap_or(env_max_upload),
        };
        cfg.validate()?;

        Ok((cfg, args.migrate))
    }

    fn validate(&self) -> Result<()> {
        let wants_supabase = self.object_store == ObjectStoreKind::Supabase
            || self.record_store == RecordStoreKind::Supabase;
        if wants_supabase && self.supabase.is_none() {
            bail!("SUPABASE_URL and SUPABASE_KEY are required for the supabase backend");
        }
        Ok(())
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<F, T>(lookup: &F, name: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Result<Option<String>>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(name)? {
        Some(value) => value
            .trim()
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        None => Ok(default),
    }
}
