use crate::config::types::{Config, OutputConfig, SpiderConfig};
use crate::recorder::RecorderError;
use crate::spiders::{canonical_spider_name, SPIDER_NAMES};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_spider_config(&config.spider)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates spider configuration
fn validate_spider_config(config: &SpiderConfig) -> Result<(), ConfigError> {
    if canonical_spider_name(&config.name).is_none() {
        return Err(ConfigError::Validation(format!(
            "Unknown spider '{}', expected one of: {}",
            config.name,
            SPIDER_NAMES.join(", ")
        )));
    }

    if let Some(start_url) = &config.start_url {
        let url = Url::parse(start_url).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid start-url '{}': {}", start_url, e))
        })?;

        if url.scheme() != "https" && url.scheme() != "http" {
            return Err(ConfigError::InvalidUrl(format!(
                "start-url '{}' must use http or https",
                start_url
            )));
        }
    }

    if config.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "timeout-secs must be >= 1".to_string(),
        ));
    }

    if config.max_pages == Some(0) {
        return Err(ConfigError::Validation(
            "max-pages must be >= 1".to_string(),
        ));
    }

    if let Some(agent) = &config.user_agent {
        if agent.trim().is_empty() {
            return Err(ConfigError::Validation(
                "user-agent cannot be empty when set".to_string(),
            ));
        }
    }

    for name in config.headers.keys() {
        validate_header_name(name)?;
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.output_file.trim().is_empty() {
        return Err(ConfigError::Validation(
            "output-file cannot be empty".to_string(),
        ));
    }

    if config.db_table.trim().is_empty() {
        return Err(ConfigError::Validation(
            "db-table cannot be empty".to_string(),
        ));
    }

    if config.remove_columns.iter().any(|c| c.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "remove-columns cannot contain empty names".to_string(),
        ));
    }

    // Resolves formats and targets, and checks the key requirement
    let options = config.save_options()?;
    options.validate().map_err(|e| match e {
        RecorderError::MissingPrimaryKey(target) => ConfigError::Validation(format!(
            "incremental output to '{}' requires a primary-key",
            target
        )),
        other => ConfigError::Validation(other.to_string()),
    })?;

    Ok(())
}

/// Validates an HTTP header name (RFC 7230 token characters)
fn validate_header_name(name: &str) -> Result<(), ConfigError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "!#$%&'*+-.^_`|~".contains(c));

    if !valid {
        return Err(ConfigError::Validation(format!(
            "Invalid header name '{}'",
            name
        )));
    }

    Ok(())
}
