use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

const DEFAULT_POSTMARK_API_URL: &str = "https://api.postmarkapp.com";

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
///
/// Loaded once at startup and shared read-only afterwards.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub delivery: DeliveryConfig,
    pub site: SiteConfig,
    pub pdf: PdfConfig,
}

impl AppConfig {
    /// Read configuration from `.env` (when present) and the process environment.
    ///
    /// Mandatory delivery settings are not enforced here; call [`AppConfig::validate`]
    /// before serving traffic.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .trim()
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let log_format = LogFormat::from_str(
            &env::var("APP_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string()),
        );

        let delivery = DeliveryConfig {
            from_address: non_empty_var("POSTMARK_FROM_ADDRESS"),
            server_token: non_empty_var("POSTMARK_SERVER_TOKEN"),
            api_url: non_empty_var("POSTMARK_API_URL")
                .unwrap_or_else(|| DEFAULT_POSTMARK_API_URL.to_string()),
            internal_recipients: env::var("INTERNAL_EMAIL_RECIPIENTS")
                .map(|raw| parse_recipients(&raw))
                .unwrap_or_default(),
            signee_subject: env::var("SIGNEE_EMAIL_SUBJECT").unwrap_or_default(),
            internal_subject: env::var("INTERNAL_EMAIL_SUBJECT").unwrap_or_default(),
        };

        let site = SiteConfig {
            title: env::var("TITLE").unwrap_or_default(),
            template_dir: non_empty_var("APP_TEMPLATE_DIR").map(PathBuf::from),
            public_dir: PathBuf::from(
                non_empty_var("APP_PUBLIC_DIR").unwrap_or_else(|| "public".to_string()),
            ),
        };

        let pdf = PdfConfig {
            binary: PathBuf::from(
                non_empty_var("APP_PDF_BINARY").unwrap_or_else(|| "wkhtmltopdf".to_string()),
            ),
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig {
                log_level,
                format: log_format,
            },
            delivery,
            site,
            pdf,
        })
    }

    /// Refuse to start when the sender address or the provider token is missing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.delivery.validate()
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Split a comma separated recipient list, dropping blank entries.
pub fn parse_recipients(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Output shape of the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Compact,
        }
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub format: LogFormat,
}

/// Outbound email settings.
#[derive(Debug, Clone, Default)]
pub struct DeliveryConfig {
    pub from_address: Option<String>,
    pub server_token: Option<String>,
    pub api_url: String,
    pub internal_recipients: Vec<String>,
    pub signee_subject: String,
    pub internal_subject: String,
}

impl DeliveryConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if is_blank(self.from_address.as_deref()) {
            return Err(ConfigError::MissingFromAddress);
        }
        if is_blank(self.server_token.as_deref()) {
            return Err(ConfigError::MissingServerToken);
        }
        Ok(())
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |value| value.trim().is_empty())
}

/// Page-level presentation settings.
#[derive(Debug, Clone)]
pub struct SiteConfig {
    pub title: String,
    /// Directory whose files replace the built-in templates, schema and example data.
    pub template_dir: Option<PathBuf>,
    pub public_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct PdfConfig {
    pub binary: PathBuf,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    MissingFromAddress,
    MissingServerToken,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::MissingFromAddress => {
                write!(f, "no From address specified in config (POSTMARK_FROM_ADDRESS)")
            }
            ConfigError::MissingServerToken => {
                write!(
                    f,
                    "no Postmark server token specified in config (POSTMARK_SERVER_TOKEN)"
                )
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::MissingFromAddress
            | ConfigError::MissingServerToken => None,
        }
    }
}
