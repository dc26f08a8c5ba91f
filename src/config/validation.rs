use crate::config::types::{
    ArtifactConfig, Config, CrawlerConfig, DownloadConfig, FetchConfig, OutputConfig,
};
use crate::ConfigError;
use url::Url;

/// Upper bound on retries after the first download attempt
const MAX_RETRIES: u32 = 10;

/// Upper bound on the retry backoff, in milliseconds
const MAX_RETRY_BACKOFF_MS: u64 = 300_000;

/// Upper bound on the per-origin politeness delay, in milliseconds
const MAX_POLITENESS_DELAY_MS: u64 = 600_000;

/// Upper bound on any fetch or download timeout, in seconds
const MAX_TIMEOUT_SECS: u64 = 3600;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_fetch_config(&config.fetch)?;
    validate_download_config(&config.download)?;
    validate_artifact_config(&config.artifacts)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates traversal configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    validate_seed_url(&config.seed_url)?;

    if config.max_workers < 1 || config.max_workers > 64 {
        return Err(ConfigError::Validation(format!(
            "max_workers must be between 1 and 64, got {}",
            config.max_workers
        )));
    }

    if config.politeness_delay > MAX_POLITENESS_DELAY_MS {
        return Err(ConfigError::Validation(format!(
            "politeness_delay must be at most {}ms, got {}",
            MAX_POLITENESS_DELAY_MS, config.politeness_delay
        )));
    }

    if config.seed_category.trim().is_empty() {
        return Err(ConfigError::Validation(
            "seed_category cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates the seed URL: it must parse and use http or https
pub fn validate_seed_url(seed: &str) -> Result<(), ConfigError> {
    let url = Url::parse(seed)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid seed URL '{}': {}", seed, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "Seed URL '{}' must use http or https",
            seed
        )));
    }

    if url.host_str().is_none() {
        return Err(ConfigError::InvalidUrl(format!(
            "Seed URL '{}' has no host",
            seed
        )));
    }

    Ok(())
}

fn validate_fetch_config(config: &FetchConfig) -> Result<(), ConfigError> {
    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    if config.static_timeout == 0 || config.render_timeout == 0 {
        return Err(ConfigError::Validation(
            "fetch timeouts must be at least 1 second".to_string(),
        ));
    }

    if config.static_timeout > MAX_TIMEOUT_SECS || config.render_timeout > MAX_TIMEOUT_SECS {
        return Err(ConfigError::Validation(format!(
            "fetch timeouts must be at most {} seconds",
            MAX_TIMEOUT_SECS
        )));
    }

    Ok(())
}

fn validate_download_config(config: &DownloadConfig) -> Result<(), ConfigError> {
    if config.root.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "download root cannot be empty".to_string(),
        ));
    }

    if config.timeout == 0 || config.timeout > MAX_TIMEOUT_SECS {
        return Err(ConfigError::Validation(format!(
            "download timeout must be between 1 and {} seconds, got {}",
            MAX_TIMEOUT_SECS, config.timeout
        )));
    }

    if config.max_retries > MAX_RETRIES {
        return Err(ConfigError::Validation(format!(
            "max_retries must be at most {}, got {}",
            MAX_RETRIES, config.max_retries
        )));
    }

    if config.retry_backoff > MAX_RETRY_BACKOFF_MS {
        return Err(ConfigError::Validation(format!(
            "retry_backoff must be at most {}ms, got {}",
            MAX_RETRY_BACKOFF_MS, config.retry_backoff
        )));
    }

    // Room for a stem plus a typical extension
    if config.max_filename_length < 16 || config.max_filename_length > 255 {
        return Err(ConfigError::Validation(format!(
            "max_filename_length must be between 16 and 255, got {}",
            config.max_filename_length
        )));
    }

    Ok(())
}

fn validate_artifact_config(config: &ArtifactConfig) -> Result<(), ConfigError> {
    if config.extensions.is_empty() {
        return Err(ConfigError::Validation(
            "artifact extension list cannot be empty".to_string(),
        ));
    }

    for ext in &config.extensions {
        let bare = ext.trim_start_matches('.');
        if bare.is_empty() || !bare.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ConfigError::Validation(format!(
                "Invalid artifact extension '{}'",
                ext
            )));
        }
    }

    Ok(())
}

fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    let name = config.manifest_name.trim();
    if name.is_empty() || name.contains('/') || name.contains('\\') {
        return Err(ConfigError::Validation(format!(
            "manifest_name must be a plain file name, got '{}'",
            config.manifest_name
        )));
    }

    Ok(())
}
