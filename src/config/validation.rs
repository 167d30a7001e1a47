use crate::config::types::{Config, FetcherConfig, ParserConfig, ProxyConfig, UserAgentConfig};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_fetcher_config(&config.fetcher)?;
    validate_parser_config(&config.parser)?;
    validate_user_agent_config(&config.user_agent)?;
    Ok(())
}

/// Validates fetcher configuration
pub(crate) fn validate_fetcher_config(config: &FetcherConfig) -> Result<(), ConfigError> {
    if config.max_total_connections < 1 {
        return Err(ConfigError::Validation(format!(
            "max_total_connections must be >= 1, got {}",
            config.max_total_connections
        )));
    }

    if config.max_connections_per_host < 1
        || config.max_connections_per_host > config.max_total_connections
    {
        return Err(ConfigError::Validation(format!(
            "max_connections_per_host must be between 1 and max_total_connections ({}), got {}",
            config.max_total_connections, config.max_connections_per_host
        )));
    }

    if config.socket_timeout == 0 || config.connect_timeout == 0 {
        return Err(ConfigError::Validation(
            "socket_timeout and connect_timeout must be > 0".to_string(),
        ));
    }

    if config.max_download_size == 0 {
        return Err(ConfigError::Validation(
            "max_download_size must be > 0".to_string(),
        ));
    }

    if config.reaper_interval == 0 {
        return Err(ConfigError::Validation(
            "reaper_interval must be > 0".to_string(),
        ));
    }

    if let Some(proxy) = &config.proxy {
        validate_proxy_config(proxy)?;
    }

    Ok(())
}

/// Validates proxy settings
fn validate_proxy_config(proxy: &ProxyConfig) -> Result<(), ConfigError> {
    if proxy.host.trim().is_empty() {
        return Err(ConfigError::Validation(
            "proxy host cannot be empty".to_string(),
        ));
    }

    if proxy.port == 0 {
        return Err(ConfigError::Validation("proxy port cannot be 0".to_string()));
    }

    if proxy.password.is_some() && proxy.username.is_none() {
        return Err(ConfigError::Validation(
            "proxy password given without a username".to_string(),
        ));
    }

    Url::parse(&proxy.url())
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid proxy address: {}", e)))?;

    Ok(())
}

/// Validates parser configuration
fn validate_parser_config(config: &ParserConfig) -> Result<(), ConfigError> {
    if config.max_outgoing_links == 0 {
        return Err(ConfigError::Validation(
            "max_outgoing_links must be >= 1".to_string(),
        ));
    }

    let all_patterns = config
        .binary_content_types
        .iter()
        .chain(&config.binary_content_exceptions)
        .chain(&config.plain_text_content_types);

    for pattern in all_patterns {
        if pattern.trim().is_empty() {
            return Err(ConfigError::Validation(
                "content type patterns cannot be empty".to_string(),
            ));
        }
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if let Some(custom) = &config.custom {
        if custom.trim().is_empty() {
            return Err(ConfigError::Validation(
                "custom user agent cannot be blank".to_string(),
            ));
        }
        return Ok(());
    }

    // Crawler name: non-empty, alphanumeric + hyphens only
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    if let Some(contact_url) = &config.contact_url {
        Url::parse(contact_url)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;
    }

    if let Some(email) = &config.contact_email {
        validate_email(email)?;
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !parts[1].contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
