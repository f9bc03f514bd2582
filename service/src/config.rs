use clap::builder::TypedValueParser as _;
use clap::Parser;
use dotenvy::dotenv;
use log::LevelFilter;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq)]
pub enum RustEnv {
    Development,
    Production,
    Staging,
}

#[derive(Debug, PartialEq, Eq)]
pub struct RustEnvParseError;

impl FromStr for RustEnv {
    type Err = RustEnvParseError;
    fn from_str(level: &str) -> Result<RustEnv, Self::Err> {
        match level.to_lowercase().as_str() {
            "development" => Ok(RustEnv::Development),
            "production" => Ok(RustEnv::Production),
            "staging" => Ok(RustEnv::Staging),
            _ => Err(RustEnvParseError),
        }
    }
}

impl fmt::Display for RustEnv {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RustEnv::Development => write!(f, "development"),
            RustEnv::Production => write!(f, "production"),
            RustEnv::Staging => write!(f, "staging"),
        }
    }
}

#[derive(Clone, Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// The host interface to listen for incoming connections
    #[arg(short, long, env, default_value = "127.0.0.1")]
    pub interface: Option<String>,

    /// The host TCP port to listen for incoming connections
    #[arg(short, long, env = "SERVER_PORT", default_value_t = 5000)]
    pub port: u16,

    /// Redirect plain HTTP requests to HTTPS.
    #[arg(long, env, default_value_t = false, action = clap::ArgAction::Set)]
    pub force_ssl: bool,

    /// Maximum size in bytes of a single WebSocket message.
    #[arg(long, env, default_value_t = 65535)]
    pub ws_max_message_size: usize,

    /// Minutes an inactive page stays alive.
    #[arg(long, env, default_value_t = 1440)]
    pub page_lifetime_minutes: u64,

    /// Minutes an inactive app session stays alive.
    #[arg(long, env, default_value_t = 60)]
    pub app_lifetime_minutes: u64,

    /// Bind page sessions to the client IP address.
    #[arg(long, env, default_value_t = false, action = clap::ArgAction::Set)]
    pub check_page_ip: bool,

    /// Maximum pages created per hour per client. 0 disables the limit.
    #[arg(long, env, default_value_t = 0)]
    pub limit_pages_per_hour: u32,

    /// Maximum sessions created per hour per client. 0 disables the limit.
    #[arg(long, env, default_value_t = 0)]
    pub limit_sessions_per_hour: u32,

    /// Maximum size of a session in bytes. 0 disables the limit.
    #[arg(long, env, default_value_t = 0)]
    pub limit_session_size_bytes: u64,

    /// Account names that cannot be claimed.
    #[arg(long, env, value_delimiter = ',')]
    pub reserved_account_names: Vec<String>,

    /// Page names that cannot be claimed.
    #[arg(long, env, value_delimiter = ',')]
    pub reserved_page_names: Vec<String>,

    /// Accept host clients connecting from other machines.
    #[arg(long, env, default_value_t = false, action = clap::ArgAction::Set)]
    pub allow_remote_host_clients: bool,

    /// Token remote host clients must present.
    #[arg(long, env)]
    host_clients_auth_token: Option<String>,

    /// Name of the session cookie.
    #[arg(long, env, default_value = "identity")]
    pub cookie_name: String,

    /// Comma separated keys used to sign cookies, newest first.
    #[arg(long, env, value_delimiter = ',')]
    cookie_secrets: Vec<String>,

    /// Seconds a login session lasts (default: 24 hours = 86400 seconds)
    #[arg(long, env, default_value_t = 86400)]
    pub session_expiry_seconds: u64,

    /// Google OAuth client ID.
    #[arg(long, env)]
    google_client_id: Option<String>,
    /// Google OAuth client secret.
    #[arg(long, env)]
    google_client_secret: Option<String>,

    /// GitHub OAuth client ID.
    #[arg(long, env)]
    github_client_id: Option<String>,
    /// GitHub OAuth client secret.
    #[arg(long, env)]
    github_client_secret: Option<String>,

    /// Azure AD application (client) ID.
    #[arg(long, env)]
    azure_client_id: Option<String>,
    /// Azure AD client secret.
    #[arg(long, env)]
    azure_client_secret: Option<String>,
    /// Azure AD tenant: a tenant ID, a domain, `common` or `organizations`.
    #[arg(long, env, default_value = "common")]
    azure_tenant: String,

    /// Secret used to sign OAuth state. The server refuses to start without it.
    #[arg(long, env)]
    master_secret_key: Option<String>,

    /// Public base URL of this server, used to build the OAuth callback URLs.
    #[arg(long, env, default_value = "http://localhost:5000")]
    oauth_redirect_base_url: String,

    /// Origins, besides this server, that a login may redirect back to.
    #[arg(long, env, value_delimiter = ',')]
    pub allowed_redirect_origins: Vec<String>,

    /// Seconds an OAuth state stays valid.
    #[arg(long, env, default_value_t = 600)]
    pub oauth_state_ttl_secs: u64,

    /// Timeout in seconds for token retrieval and each provider request.
    #[arg(long, env, default_value_t = 10)]
    pub provider_timeout_secs: u64,

    /// Set the log level verbosity threshold (level) to control what gets displayed on console output
    #[arg(
        short,
        long,
        env,
        default_value_t = LevelFilter::Info,
        value_parser = clap::builder::PossibleValuesParser::new(["OFF", "ERROR", "WARN", "INFO", "DEBUG", "TRACE"])
            .map(|s| s.parse::<LevelFilter>().unwrap_or(LevelFilter::Info)),
        )]
    pub log_level_filter: LevelFilter,

    /// Set the Rust runtime environment to use.
    #[arg(
    short,
    long,
    env,
    default_value_t = RustEnv::Development,
    value_parser = clap::builder::PossibleValuesParser::new([
        "DEVELOPMENT", "PRODUCTION", "STAGING",
        "development", "production", "staging"
    ])
        .map(|s| s.parse::<RustEnv>().unwrap_or(RustEnv::Development)),
    )]
    pub runtime_env: RustEnv,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        // Load .env file first
        dotenv().ok();
        // Then parse the command line parameters and flags
        Config::parse()
    }

    pub fn host_clients_auth_token(&self) -> Option<String> {
        self.host_clients_auth_token.clone()
    }

    pub fn cookie_secrets(&self) -> &[String] {
        &self.cookie_secrets
    }

    pub fn google_client_id(&self) -> Option<String> {
        self.google_client_id.clone()
    }

    pub fn google_client_secret(&self) -> Option<String> {
        self.google_client_secret.clone()
    }

    pub fn github_client_id(&self) -> Option<String> {
        self.github_client_id.clone()
    }

    pub fn github_client_secret(&self) -> Option<String> {
        self.github_client_secret.clone()
    }

    pub fn azure_client_id(&self) -> Option<String> {
        self.azure_client_id.clone()
    }

    pub fn azure_client_secret(&self) -> Option<String> {
        self.azure_client_secret.clone()
    }

    pub fn azure_tenant(&self) -> &str {
        &self.azure_tenant
    }

    /// Returns the OAuth state signing secret, `None` when unset or empty.
    pub fn state_signing_secret(&self) -> Option<&str> {
        self.master_secret_key
            .as_deref()
            .filter(|secret| !secret.is_empty())
    }

    pub fn oauth_redirect_base_url(&self) -> &str {
        &self.oauth_redirect_base_url
    }

    pub fn oauth_state_ttl(&self) -> Duration {
        Duration::from_secs(self.oauth_state_ttl_secs)
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }

    pub fn session_expiry(&self) -> Duration {
        Duration::from_secs(self.session_expiry_seconds)
    }

    /// Returns true if `name` is reserved as an account name (case-insensitive).
    pub fn is_reserved_account_name(&self, name: &str) -> bool {
        self.reserved_account_names
            .iter()
            .any(|reserved| reserved.trim().eq_ignore_ascii_case(name))
    }

    /// Returns true if `name` is reserved as a page name (case-insensitive).
    pub fn is_reserved_page_name(&self, name: &str) -> bool {
        self.reserved_page_names
            .iter()
            .any(|reserved| reserved.trim().eq_ignore_ascii_case(name))
    }

    pub fn runtime_env(&self) -> RustEnv {
        self.runtime_env.clone()
    }

    pub fn is_production(&self) -> bool {
        self.runtime_env() == RustEnv::Production
    }
}
