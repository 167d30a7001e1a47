//! HTTP fetcher implementation
//!
//! This module performs one politely paced GET per call, including:
//! - Building the HTTP client (timeouts, proxy, cookies, pooling, user agent)
//! - Waiting on the shared politeness clock before each request
//! - Classifying the response status without following redirects
//! - Bounding payload size by declared and observed length
//! - Classifying transport failures
//!
//! Every exit path drops the in-flight response and the connection slot, so
//! an aborted exchange never leaks a connection.

use crate::config::{validate_fetcher_config, Config, FetcherConfig, UserAgentConfig};
use crate::crawler::decode::charset_from_content_type;
use crate::crawler::outcome::{FetchOutcome, FetchRequest, TransportErrorKind};
use crate::crawler::politeness::PoliteClock;
use crate::crawler::pool::{ConnectionPool, IdleReaper};
use crate::url::{canonicalize, host_key};
use reqwest::header::{ACCEPT_ENCODING, CONTENT_TYPE, LOCATION};
use reqwest::{redirect::Policy, Client, Proxy, Response, StatusCode};
use std::error::Error as _;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

/// Builds an HTTP client with proper configuration
///
/// Redirects are never followed by the client; they come back to the caller
/// as [`FetchOutcome::Redirect`].
///
/// # Arguments
///
/// * `config` - The fetcher configuration
/// * `user_agent` - The user agent configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client (e.g. invalid proxy)
pub fn build_http_client(
    config: &FetcherConfig,
    user_agent: &UserAgentConfig,
) -> Result<Client, reqwest::Error> {
    let mut builder = Client::builder()
        .user_agent(user_agent.header_value())
        .timeout(config.socket_timeout())
        .connect_timeout(config.connect_timeout())
        .redirect(Policy::none()) // Handle redirects manually
        .cookie_store(true)
        .pool_max_idle_per_host(config.max_connections_per_host as usize)
        .pool_idle_timeout(config.idle_connection_timeout())
        .gzip(true);

    if let Some(proxy_config) = &config.proxy {
        let mut proxy = Proxy::all(proxy_config.url())?;
        if let Some(username) = &proxy_config.username {
            proxy = proxy.basic_auth(username, proxy_config.password.as_deref().unwrap_or(""));
        }
        builder = builder.proxy(proxy);
    }

    builder.build()
}

/// Politely paced HTTP fetcher
///
/// One instance is meant to be shared (behind an `Arc`) by every task that
/// fetches; the politeness delay applies across all of them. Separate
/// instances keep separate clocks.
///
/// Must be created inside a tokio runtime, which runs its idle-connection
/// reaper.
pub struct Fetcher {
    client: Client,
    clock: PoliteClock,
    pool: Arc<ConnectionPool>,
    reaper: Mutex<Option<IdleReaper>>,
    max_download_size: u64,
}

impl Fetcher {
    /// Creates a fetcher from the fetcher and user agent sections of a config
    ///
    /// Limits are checked here as well as in `load_config`; a zero connection
    /// limit or reaper interval is rejected with [`WayfarerError::Config`].
    ///
    /// [`WayfarerError::Config`]: crate::WayfarerError::Config
    pub fn new(config: &FetcherConfig, user_agent: &UserAgentConfig) -> crate::Result<Self> {
        validate_fetcher_config(config)?;

        let client = build_http_client(config, user_agent)?;

        let pool = Arc::new(ConnectionPool::new(
            config.max_total_connections as usize,
            config.max_connections_per_host as usize,
            config.idle_connection_timeout(),
        ));
        let reaper = IdleReaper::spawn(Arc::clone(&pool), config.reaper_interval());

        tracing::debug!(
            "Fetcher ready: politeness {:?}, max download {} bytes, {} connections ({} per host)",
            config.politeness_delay(),
            config.max_download_size,
            config.max_total_connections,
            config.max_connections_per_host
        );

        Ok(Self {
            client,
            clock: PoliteClock::new(config.politeness_delay()),
            pool,
            reaper: Mutex::new(Some(reaper)),
            max_download_size: config.max_download_size,
        })
    }

    pub fn from_config(config: &Config) -> crate::Result<Self> {
        Self::new(&config.fetcher, &config.user_agent)
    }

    /// Fetches one URL
    ///
    /// # Request Flow
    ///
    /// 1. Reserve a connection slot (per host, then global)
    /// 2. Wait for the politeness clock
    /// 3. Send `GET` with `Accept-Encoding: gzip`
    /// 4. Classify the status:
    ///
    /// | Condition | Outcome |
    /// |-----------|---------|
    /// | HTTP 200 | Read payload → Success / TooLarge |
    /// | HTTP 404 | NotFound |
    /// | HTTP 3xx | Redirect (not followed) |
    /// | Other status | HttpError |
    /// | Connect / timeout / body failure | TransportError |
    /// | Fetcher shut down | TransportError (Closed) |
    /// | Anything else | UnknownError |
    pub async fn fetch(&self, request: &FetchRequest) -> FetchOutcome {
        let url = match Url::parse(&request.url) {
            Ok(url) => url,
            Err(e) => {
                tracing::error!("{} while fetching {}", e, request.url);
                return FetchOutcome::UnknownError {
                    message: format!("invalid URL: {}", e),
                };
            }
        };

        let Some(host) = host_key(&url) else {
            tracing::error!("URL has no host while fetching {}", request.url);
            return FetchOutcome::UnknownError {
                message: "URL has no host".to_string(),
            };
        };

        let Some(_slot) = self.pool.checkout(&host).await else {
            tracing::debug!("Rejecting fetch of {}: fetcher is shut down", request.url);
            return FetchOutcome::TransportError {
                kind: TransportErrorKind::Closed,
                message: "fetcher has been shut down".to_string(),
            };
        };

        self.clock.wait_turn().await;
        tracing::debug!("Fetching {} (parent {})", request.url, request.parent_label());

        self.exchange(url, request).await
    }

    async fn exchange(&self, url: Url, request: &FetchRequest) -> FetchOutcome {
        let response = match self
            .client
            .get(url)
            .header(ACCEPT_ENCODING, "gzip")
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return classify_error(&e, request),
        };

        let status = response.status();
        match status {
            StatusCode::OK => self.read_payload(response, request).await,
            StatusCode::NOT_FOUND => FetchOutcome::NotFound,
            _ if status.is_redirection() => {
                let target_url = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|value| value.to_str().ok())
                    .and_then(|location| canonicalize(location, Some(&request.url)));
                tracing::debug!(
                    "{} redirects ({}) to {:?}",
                    request.url,
                    status.as_u16(),
                    target_url
                );
                FetchOutcome::Redirect {
                    status_code: status.as_u16(),
                    target_url,
                }
            }
            _ => {
                tracing::info!("Failed: {}, while fetching {}", status, request.url);
                FetchOutcome::HttpError {
                    status_code: status.as_u16(),
                }
            }
        }
    }

    /// Reads the body of a 200 response, aborting once it exceeds the limit
    async fn read_payload(&self, mut response: Response, request: &FetchRequest) -> FetchOutcome {
        let final_url = response.url().to_string();
        let fetched_url = resolve_fetched_url(&request.url, &final_url);
        let headers = response.headers().clone();

        // reqwest drops Content-Length when it inflates a gzip body, leaving
        // the observed size as the only bound
        let declared = response.content_length();

        if let Some(size) = declared {
            if size > self.max_download_size {
                tracing::info!(
                    "Aborting {}: declared size {} exceeds {} bytes",
                    request.url,
                    size,
                    self.max_download_size
                );
                return FetchOutcome::TooLarge { size };
            }
        }

        let capacity = declared.unwrap_or(0).min(self.max_download_size);
        let mut payload = Vec::with_capacity(usize::try_from(capacity).unwrap_or(0));

        loop {
            match response.chunk().await {
                Ok(Some(chunk)) => {
                    let observed = payload.len() as u64 + chunk.len() as u64;
                    if observed > self.max_download_size {
                        tracing::info!(
                            "Aborting {}: body passed {} bytes",
                            request.url,
                            self.max_download_size
                        );
                        return FetchOutcome::TooLarge { size: observed };
                    }
                    payload.extend_from_slice(&chunk);
                }
                Ok(None) => break,
                Err(e) => return classify_error(&e, request),
            }
        }

        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let charset_hint = content_type.as_deref().and_then(charset_from_content_type);

        tracing::debug!("Fetched {} ({} bytes)", fetched_url, payload.len());

        FetchOutcome::Success {
            fetched_url,
            final_url,
            content_type,
            charset_hint,
            payload,
            response_headers: headers,
        }
    }

    /// Stops the idle-connection reaper and closes the connection pool
    ///
    /// Fetches already holding a slot finish normally; later calls return
    /// `TransportError` with [`TransportErrorKind::Closed`].
    pub async fn shutdown(&self) {
        self.pool.close();

        let reaper = self.reaper.lock().ok().and_then(|mut reaper| reaper.take());
        if let Some(reaper) = reaper {
            reaper.stop().await;
            tracing::info!("Fetcher shut down");
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.pool.is_closed()
    }

    /// Number of exchanges currently holding a connection slot
    pub fn active_connections(&self) -> usize {
        self.pool.active()
    }

    pub fn politeness_delay(&self) -> Duration {
        self.clock.delay()
    }

    pub fn max_download_size(&self) -> u64 {
        self.max_download_size
    }
}

/// Chooses the URL reported as fetched
///
/// The transport may rewrite the request URI (e.g. adding a root slash). The
/// rewritten form is only surfaced when it does not canonicalize back to the
/// requested URL.
fn resolve_fetched_url(requested: &str, request_uri: &str) -> String {
    if request_uri == requested
        || canonicalize(request_uri, None).as_deref() == Some(requested)
    {
        requested.to_string()
    } else {
        request_uri.to_string()
    }
}

/// Maps a reqwest failure onto a transport kind, or None if it is not I/O related
fn transport_error_kind(error: &reqwest::Error) -> Option<TransportErrorKind> {
    if error.is_timeout() {
        Some(TransportErrorKind::Timeout)
    } else if error.is_connect() {
        Some(TransportErrorKind::Connect)
    } else if error.is_body() || error.is_decode() {
        Some(TransportErrorKind::Body)
    } else if error.is_request() {
        Some(TransportErrorKind::Request)
    } else {
        None
    }
}

fn classify_error(error: &reqwest::Error, request: &FetchRequest) -> FetchOutcome {
    let message = error_chain(error);

    match transport_error_kind(error) {
        Some(kind) => {
            tracing::error!(
                "Fatal transport error ({}): {} while fetching {} (link found in doc #{})",
                kind,
                message,
                request.url,
                request.parent_label()
            );
            FetchOutcome::TransportError { kind, message }
        }
        None => {
            tracing::error!("{} while fetching {}", message, request.url);
            FetchOutcome::UnknownError { message }
        }
    }
}

/// Joins an error with its sources; reqwest hides the root cause otherwise
fn error_chain(error: &reqwest::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
