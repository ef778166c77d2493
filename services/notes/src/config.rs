use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

/// Password used when neither `DB_PASSWORD` nor `DB_PASS` is set.
///
/// Shipping a literal credential is a known weakness of this service; startup
/// logs a warning whenever it ends up being used.
pub const DEFAULT_DB_PASSWORD: &str = "apppass";

/// Main configuration for the notes service
///
/// Built once at startup and shared read-only with every handler.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Listen port, parsed when the listener is bound
    pub port: String,
    /// Database configuration
    pub database: DatabaseSettings,
    /// Upload storage configuration
    pub storage: StorageSettings,
    /// Service-level configuration
    pub service: ServiceSettings,
}

/// Database connection settings
#[derive(Clone)]
pub struct DatabaseSettings {
    pub host: String,
    /// Port, parsed when the pool is built
    pub port: String,
    pub name: String,
    pub user: String,
    pub password: String,
    /// Which variable the password came from
    pub password_source: PasswordSource,
    /// True whenever the host is not a loopback name
    pub requires_encrypted_transport: bool,
}

/// Where the database password was resolved from, in lookup order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordSource {
    /// `DB_PASSWORD`
    Primary,
    /// `DB_PASS`
    Legacy,
    /// [`DEFAULT_DB_PASSWORD`]
    Default,
}

/// Which upload backend the process runs with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Local,
    ObjectStore,
}

impl StorageKind {
    /// Map the `STORAGE` value to a backend. Anything unrecognised is local.
    pub fn from_mode(mode: &str) -> Self {
        match mode {
            "s3" | "object-store" => StorageKind::ObjectStore,
            _ => StorageKind::Local,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StorageKind::Local => "local",
            StorageKind::ObjectStore => "s3",
        }
    }
}

/// Upload storage settings
#[derive(Debug, Clone)]
pub struct StorageSettings {
    /// The `STORAGE` value exactly as configured
    pub mode: String,
    /// Backend selected from `mode`
    pub kind: StorageKind,
    /// S3 bucket name, only used by the object-store backend
    pub bucket: String,
    /// Prepended to every object key
    pub prefix: String,
    /// Directory for the local backend
    pub upload_dir: PathBuf,
    /// Custom endpoint URL (for MinIO, LocalStack, etc.)
    pub endpoint_url: Option<String>,
    /// Force path-style access (required for MinIO)
    pub force_path_style: bool,
}

/// Service-level settings
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// Log level used when `RUST_LOG` is unset
    pub log_level: String,
    /// Include database host/name/user in the health response
    pub health_expose_db: bool,
    /// Apply the bundled migrations on startup
    pub run_migrations: bool,
    /// Prometheus exporter port, disabled when unset
    pub metrics_port: Option<String>,
}

/// Values as read from the environment. Everything is a string so that
/// loading never fails on a malformed value.
#[derive(Debug, Deserialize)]
struct RawSettings {
    #[serde(default = "default_port")]
    port: String,
    #[serde(default = "default_db_host")]
    db_host: String,
    #[serde(default = "default_db_port")]
    db_port: String,
    #[serde(default = "default_db_name")]
    db_name: String,
    #[serde(default = "default_db_user")]
    db_user: String,
    db_password: Option<String>,
    db_pass: Option<String>,
    #[serde(default = "default_storage")]
    storage: String,
    #[serde(default)]
    s3_bucket: String,
    #[serde(default = "default_s3_prefix")]
    s3_prefix: String,
    s3_endpoint_url: Option<String>,
    s3_force_path_style: Option<String>,
    #[serde(default = "default_upload_dir")]
    upload_dir: String,
    #[serde(default = "default_log_level")]
    log_level: String,
    health_expose_db: Option<String>,
    run_migrations: Option<String>,
    metrics_port: Option<String>,
}

// Default value functions
fn default_port() -> String {
    "3000".to_string()
}

fn default_db_host() -> String {
    "localhost".to_string()
}

fn default_db_port() -> String {
    "5432".to_string()
}

fn default_db_name() -> String {
    "appdb".to_string()
}

fn default_db_user() -> String {
    "appuser".to_string()
}

fn default_storage() -> String {
    "local".to_string()
}

fn default_s3_prefix() -> String {
    "uploads/".to_string()
}

fn default_upload_dir() -> String {
    "uploads".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Settings {
    /// Load settings from the optional `config/notes` file and the process environment
    pub fn load() -> anyhow::Result<Self> {
        let raw: RawSettings = config::Config::builder()
            .add_source(config::File::with_name("config/notes").required(false))
            // DB_HOST -> db_host
            .add_source(config::Environment::default())
            .build()?
            .try_deserialize()?;

        Ok(Self::from_raw(raw))
    }

    /// Resolve settings from an explicit variable map instead of the process environment
    pub fn from_env_map(vars: HashMap<String, String>) -> anyhow::Result<Self> {
        let raw: RawSettings = config::Config::builder()
            .add_source(config::Environment::default().source(Some(vars)))
            .build()?
            .try_deserialize()?;

        Ok(Self::from_raw(raw))
    }

    fn from_raw(raw: RawSettings) -> Self {
        let (password, password_source) = resolve_password(raw.db_password, raw.db_pass);
        let requires_encrypted_transport = !is_loopback_host(&raw.db_host);
        let kind = StorageKind::from_mode(&raw.storage);

        Self {
            port: raw.port,
            database: DatabaseSettings {
                host: raw.db_host,
                port: raw.db_port,
                name: raw.db_name,
                user: raw.db_user,
                password,
                password_source,
                requires_encrypted_transport,
            },
            storage: StorageSettings {
                mode: raw.storage,
                kind,
                bucket: raw.s3_bucket,
                prefix: raw.s3_prefix,
                upload_dir: PathBuf::from(raw.upload_dir),
                endpoint_url: raw.s3_endpoint_url.filter(|url| !url.is_empty()),
                force_path_style: parse_flag(raw.s3_force_path_style.as_deref(), false),
            },
            service: ServiceSettings {
                log_level: raw.log_level,
                health_expose_db: parse_flag(raw.health_expose_db.as_deref(), true),
                run_migrations: parse_flag(raw.run_migrations.as_deref(), false),
                metrics_port: raw.metrics_port.filter(|port| !port.is_empty()),
            },
        }
    }
}

impl fmt::Debug for DatabaseSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("name", &self.name)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("password_source", &self.password_source)
            .field("requires_encrypted_transport", &self.requires_encrypted_transport)
            .finish()
    }
}

/// Ordered password lookup: `DB_PASSWORD`, then `DB_PASS`, then the built-in default.
///
/// An empty `DB_PASSWORD` counts as unset. A set `DB_PASS` is taken as-is.
pub fn resolve_password(
    primary: Option<String>,
    legacy: Option<String>,
) -> (String, PasswordSource) {
    match (primary.filter(|p| !p.is_empty()), legacy) {
        (Some(password), _) => (password, PasswordSource::Primary),
        (None, Some(password)) => (password, PasswordSource::Legacy),
        (None, None) => (DEFAULT_DB_PASSWORD.to_string(), PasswordSource::Default),
    }
}

/// Only these two exact names count as loopback.
pub fn is_loopback_host(host: &str) -> bool {
    host == "localhost" || host == "127.0.0.1"
}

fn parse_flag(value: Option<&str>, default: bool) -> bool {
    match value {
        Some(v) => matches!(
            v.trim().to_ascii_lowercase().as_str(),
            "true" | "1" | "yes" | "on"
        ),
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(vars: &[(&str, &str)]) -> Settings {
        let map = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_env_map(map).unwrap()
    }

    #[test]
    fn test_default_values() {
        let settings = settings(&[]);

        assert_eq!(settings.port, "3000");
        assert_eq!(settings.database.host, "localhost");
        assert_eq!(settings.database.port, "5432");
        assert_eq!(settings.database.name, "appdb");
        assert_eq!(settings.database.user, "appuser");
        assert_eq!(settings.database.password, "apppass");
        assert_eq!(settings.database.password_source, PasswordSource::Default);
        assert!(!settings.database.requires_encrypted_transport);
        assert_eq!(settings.storage.mode, "local");
        assert_eq!(settings.storage.kind, StorageKind::Local);
        assert_eq!(settings.storage.bucket, "");
        assert_eq!(settings.storage.prefix, "uploads/");
        assert_eq!(settings.storage.upload_dir, PathBuf::from("uploads"));
        assert!(settings.service.health_expose_db);
        assert!(!settings.service.run_migrations);
        assert!(settings.service.metrics_port.is_none());
    }

    #[test]
    fn test_env_overrides() {
        let settings = settings(&[
            ("PORT", "8080"),
            ("DB_HOST", "db.internal"),
            ("DB_NAME", "notes"),
            ("STORAGE", "s3"),
            ("S3_BUCKET", "my-bucket"),
            ("S3_PREFIX", "files/"),
        ]);

        assert_eq!(settings.port, "8080");
        assert_eq!(settings.database.host, "db.internal");
        assert_eq!(settings.database.name, "notes");
        assert_eq!(settings.storage.kind, StorageKind::ObjectStore);
        assert_eq!(settings.storage.bucket, "my-bucket");
        assert_eq!(settings.storage.prefix, "files/");
    }

    #[test]
    fn test_malformed_values_are_kept() {
        let settings = settings(&[("PORT", "not-a-port"), ("DB_PORT", "abc")]);

        assert_eq!(settings.port, "not-a-port");
        assert_eq!(settings.database.port, "abc");
    }

    #[test]
    fn test_password_precedence() {
        let both = settings(&[("DB_PASSWORD", "primary"), ("DB_PASS", "legacy")]);
        assert_eq!(both.database.password, "primary");
        assert_eq!(both.database.password_source, PasswordSource::Primary);

        let legacy = settings(&[("DB_PASS", "legacy")]);
        assert_eq!(legacy.database.password, "legacy");
        assert_eq!(legacy.database.password_source, PasswordSource::Legacy);

        let neither = settings(&[]);
        assert_eq!(neither.database.password, DEFAULT_DB_PASSWORD);
    }

    #[test]
    fn test_empty_primary_password_falls_through() {
        let (password, source) =
            resolve_password(Some(String::new()), Some("legacy".to_string()));
        assert_eq!(password, "legacy");
        assert_eq!(source, PasswordSource::Legacy);
    }

    #[test]
    fn test_encrypted_transport_follows_host() {
        assert!(!settings(&[("DB_HOST", "localhost")]).database.requires_encrypted_transport);
        assert!(!settings(&[("DB_HOST", "127.0.0.1")]).database.requires_encrypted_transport);
        assert!(settings(&[("DB_HOST", "mydb.rds.amazonaws.com")]).database.requires_encrypted_transport);
        assert!(settings(&[("DB_HOST", "::1")]).database.requires_encrypted_transport);
    }

    #[test]
    fn test_storage_kind_from_mode() {
        assert_eq!(StorageKind::from_mode("s3"), StorageKind::ObjectStore);
        assert_eq!(StorageKind::from_mode("object-store"), StorageKind::ObjectStore);
        assert_eq!(StorageKind::from_mode("local"), StorageKind::Local);
        assert_eq!(StorageKind::from_mode("S3"), StorageKind::Local);
        assert_eq!(StorageKind::from_mode(""), StorageKind::Local);
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag(Some("true"), false));
        assert!(parse_flag(Some("ON"), false));
        assert!(parse_flag(Some("1"), false));
        assert!(!parse_flag(Some("nope"), true));
        assert!(parse_flag(None, true));
    }

    #[test]
    fn test_debug_redacts_password() {
        let settings = settings(&[("DB_PASSWORD", "hunter2")]);
        let rendered = format!("{:?}", settings);
        assert!(!rendered.contains("hunter2"));
    }
}
