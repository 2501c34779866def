//! Configuration validation logic

use super::Config;
use crate::constants::MAX_CLIENTS_LIMIT;
use crate::errors::{Result, SwarmError};

/// Validate the configuration
pub fn validate(config: &Config) -> Result<()> {
    validate_target(config)?;
    validate_client_config(config)?;
    validate_test_config(config)?;
    validate_inbound_pool(config)?;
    Ok(())
}

/// Validate server endpoint configuration
fn validate_target(config: &Config) -> Result<()> {
    if config.target.host.trim().is_empty() {
        return Err(SwarmError::config("Server host cannot be empty"));
    }

    let ports = [
        ("net", config.target.net_port),
        ("ssl", config.target.ssl_port),
        ("http", config.target.http_port),
    ];
    for (name, port) in ports {
        if port == 0 {
            return Err(SwarmError::config(format!(
                "The {} port must be greater than 0",
                name
            )));
        }
    }

    if let Some(ca_file) = &config.target.tls_ca_file
        && !ca_file.is_file()
    {
        return Err(SwarmError::config(format!(
            "TLS CA file '{}' does not exist",
            ca_file.display()
        )));
    }

    Ok(())
}

/// Validate session pool configuration
fn validate_client_config(config: &Config) -> Result<()> {
    if config.client.count > MAX_CLIENTS_LIMIT {
        return Err(SwarmError::config(format!(
            "Number of clients cannot exceed {}",
            MAX_CLIENTS_LIMIT
        )));
    }

    if config.client.connect_timeout.is_zero() {
        return Err(SwarmError::config("Connect timeout must be greater than 0"));
    }

    Ok(())
}

/// Validate per-session test parameters
fn validate_test_config(config: &Config) -> Result<()> {
    if config.test.topic.trim().is_empty() {
        return Err(SwarmError::config("Topic cannot be empty"));
    }
    Ok(())
}

/// Validate inbound dispatch sizing hints
fn validate_inbound_pool(config: &Config) -> Result<()> {
    let pool = &config.inbound_pool;
    if pool.core_threads != 0 && pool.max_threads != 0 && pool.max_threads < pool.core_threads {
        return Err(SwarmError::config(format!(
            "Inbound pool max threads ({}) cannot be lower than core threads ({})",
            pool.max_threads, pool.core_threads
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransportMode;
    use std::path::PathBuf;
    use std::time::Duration;

    fn create_test_config() -> Config {
        Config::local(TransportMode::Net, 3, 5)
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(validate(&create_test_config()).is_ok());
    }

    #[test]
    fn test_validate_zero_clients_allowed() {
        let mut config = create_test_config();
        config.client.count = 0;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_validate_too_many_clients() {
        let mut config = create_test_config();
        config.client.count = MAX_CLIENTS_LIMIT + 1;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_validate_empty_host() {
        let mut config = create_test_config();
        config.target.host = "  ".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_validate_zero_port() {
        let mut config = create_test_config();
        config.target.ssl_port = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_validate_empty_topic() {
        let mut config = create_test_config();
        config.test.topic = String::new();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_validate_zero_timeout() {
        let mut config = create_test_config();
        config.client.connect_timeout = Duration::ZERO;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_validate_missing_ca_file() {
        let mut config = create_test_config();
        config.target.tls_ca_file = Some(PathBuf::from("/definitely/not/here.pem"));
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_validate_inverted_pool_bounds() {
        let mut config = create_test_config();
        config.inbound_pool.core_threads = 8;
        config.inbound_pool.max_threads = 4;
        assert!(validate(&config).is_err());
    }
}
