use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Wayfarer
///
/// Every section is optional; missing keys fall back to the defaults below.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub fetcher: FetcherConfig,
    #[serde(default)]
    pub parser: ParserConfig,
    #[serde(default, rename = "user-agent")]
    pub user_agent: UserAgentConfig,
}

/// HTTP fetcher configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetcherConfig {
    /// Maximum time a single exchange may take (milliseconds)
    #[serde(rename = "socket-timeout")]
    pub socket_timeout: u64,

    /// Maximum time to establish a connection (milliseconds)
    #[serde(rename = "connect-timeout")]
    pub connect_timeout: u64,

    /// Maximum number of connections checked out at once
    #[serde(rename = "max-total-connections")]
    pub max_total_connections: u32,

    /// Maximum number of connections checked out per destination host
    #[serde(rename = "max-connections-per-host")]
    pub max_connections_per_host: u32,

    /// Minimum time between the start of two consecutive fetches (milliseconds)
    #[serde(rename = "politeness-delay")]
    pub politeness_delay: u64,

    /// Maximum size of a downloaded payload (bytes)
    #[serde(rename = "max-download-size")]
    pub max_download_size: u64,

    /// How long a pooled connection may stay idle before eviction (milliseconds)
    #[serde(rename = "idle-connection-timeout")]
    pub idle_connection_timeout: u64,

    /// How often the idle-connection reaper runs (milliseconds)
    #[serde(rename = "reaper-interval")]
    pub reaper_interval: u64,

    /// Optional outbound proxy
    pub proxy: Option<ProxyConfig>,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            socket_timeout: 20_000,
            connect_timeout: 30_000,
            max_total_connections: 100,
            max_connections_per_host: 100,
            politeness_delay: 200,
            max_download_size: 1_048_576,
            idle_connection_timeout: 30_000,
            reaper_interval: 5_000,
            proxy: None,
        }
    }
}

impl FetcherConfig {
    pub fn socket_timeout(&self) -> Duration {
        Duration::from_millis(self.socket_timeout)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout)
    }

    pub fn politeness_delay(&self) -> Duration {
        Duration::from_millis(self.politeness_delay)
    }

    pub fn idle_connection_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_connection_timeout)
    }

    pub fn reaper_interval(&self) -> Duration {
        Duration::from_millis(self.reaper_interval)
    }
}

/// Outbound proxy settings
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ProxyConfig {
    /// Returns the proxy address in `http://host:port` form
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// Payload classification and link extraction configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Whether binary payloads are handed back as `ParseOutcome::Binary`
    #[serde(rename = "include-binary-content")]
    pub include_binary_content: bool,

    /// Maximum number of outgoing links extracted from one document
    #[serde(rename = "max-outgoing-links")]
    pub max_outgoing_links: usize,

    /// Content type fragments that mark a payload as binary
    #[serde(rename = "binary-content-types")]
    pub binary_content_types: Vec<String>,

    /// Content type fragments that are never binary, even if matched above
    #[serde(rename = "binary-content-exceptions")]
    pub binary_content_exceptions: Vec<String>,

    /// Content type fragments that mark a payload as plain text
    #[serde(rename = "plain-text-content-types")]
    pub plain_text_content_types: Vec<String>,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            include_binary_content: false,
            max_outgoing_links: 5000,
            binary_content_types: vec![
                "image".to_string(),
                "audio".to_string(),
                "video".to_string(),
                "application".to_string(),
            ],
            binary_content_exceptions: vec!["application/xhtml+xml".to_string()],
            plain_text_content_types: vec!["text".to_string()],
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: Option<String>,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: Option<String>,

    /// Literal header value; replaces the composed string when set
    pub custom: Option<String>,
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: "Wayfarer".to_string(),
            crawler_version: env!("CARGO_PKG_VERSION").to_string(),
            contact_url: None,
            contact_email: None,
            custom: None,
        }
    }
}

impl UserAgentConfig {
    /// Builds the `User-Agent` header value
    ///
    /// Format: `CrawlerName/Version (+ContactURL; ContactEmail)`, with the
    /// parenthesised part reduced to whatever contact details are present.
    pub fn header_value(&self) -> String {
        if let Some(custom) = &self.custom {
            return custom.clone();
        }

        let base = format!("{}/{}", self.crawler_name, self.crawler_version);
        match (&self.contact_url, &self.contact_email) {
            (Some(url), Some(email)) => format!("{} (+{}; {})", base, url, email),
            (Some(url), None) => format!("{} (+{})", base, url),
            (None, Some(email)) => format!("{} ({})", base, email),
            (None, None) => base,
        }
    }
}
