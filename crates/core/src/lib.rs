pub mod domain;
pub mod market;
pub mod service;
pub mod time;

pub mod config {
    use anyhow::Context;
    use std::net::{IpAddr, Ipv4Addr};

    pub const DEFAULT_BIND_HOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);
    pub const DEFAULT_PORT: u16 = 5001;
    pub const DEFAULT_ALLOWED_ORIGIN: &str = "http://localhost:3000";
    pub const DEFAULT_YAHOO_BASE_URL: &str = "https://query1.finance.yahoo.com";
    pub const DEFAULT_YAHOO_COOKIE_URL: &str = "https://fc.yahoo.com";
    pub const DEFAULT_LOGO_BASE_URL: &str = "https://logo.clearbit.com";
    pub const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 30;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub bind_host: IpAddr,
        pub port: u16,
        pub allowed_origin: String,
        pub sentry_dsn: Option<String>,
        pub yahoo_base_url: String,
        pub yahoo_cookie_url: String,
        pub upstream_timeout_secs: u64,
        pub logo_base_url: String,
    }

    impl Default for Settings {
        fn default() -> Self {
            Self {
                bind_host: DEFAULT_BIND_HOST,
                port: DEFAULT_PORT,
                allowed_origin: DEFAULT_ALLOWED_ORIGIN.to_string(),
                sentry_dsn: None,
                yahoo_base_url: DEFAULT_YAHOO_BASE_URL.to_string(),
                yahoo_cookie_url: DEFAULT_YAHOO_COOKIE_URL.to_string(),
                upstream_timeout_secs: DEFAULT_UPSTREAM_TIMEOUT_SECS,
                logo_base_url: DEFAULT_LOGO_BASE_URL.to_string(),
            }
        }
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            let defaults = Self::default();

            let bind_host = match non_empty_var("BIND_HOST") {
                Some(v) => v
                    .parse::<IpAddr>()
                    .with_context(|| format!("BIND_HOST must be an IP address (got {v})"))?,
                None => defaults.bind_host,
            };

            let port = match non_empty_var("PORT") {
                Some(v) => v
                    .parse::<u16>()
                    .with_context(|| format!("PORT must be a valid port number (got {v})"))?,
                None => defaults.port,
            };

            let upstream_timeout_secs = match non_empty_var("UPSTREAM_TIMEOUT_SECS") {
                Some(v) => v.parse::<u64>().with_context(|| {
                    format!("UPSTREAM_TIMEOUT_SECS must be a whole number of seconds (got {v})")
                })?,
                None => defaults.upstream_timeout_secs,
            };

            Ok(Self {
                bind_host,
                port,
                allowed_origin: non_empty_var("ALLOWED_ORIGIN").unwrap_or(defaults.allowed_origin),
                sentry_dsn: non_empty_var("SENTRY_DSN"),
                yahoo_base_url: non_empty_var("YAHOO_BASE_URL").unwrap_or(defaults.yahoo_base_url),
                yahoo_cookie_url: non_empty_var("YAHOO_COOKIE_URL")
                    .unwrap_or(defaults.yahoo_cookie_url),
                upstream_timeout_secs,
                logo_base_url: non_empty_var("LOGO_BASE_URL").unwrap_or(defaults.logo_base_url),
            })
        }
    }

    fn non_empty_var(key: &str) -> Option<String> {
        std::env::var(key)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }
}
