use super::{AppConfig, ConfigError};

/// Validate the full application config, returning an error if any rule is violated.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] when any configuration invariant is violated.
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    validate_endpoint(config)?;
    validate_reply(config)?;
    validate_log_level(config)?;
    Ok(())
}

fn validation_err(msg: impl Into<String>) -> ConfigError {
    ConfigError::Validation(msg.into())
}

fn validate_endpoint(config: &AppConfig) -> Result<(), ConfigError> {
    let endpoint = &config.endpoint;
    if !endpoint.base_url.starts_with("http://") && !endpoint.base_url.starts_with("https://") {
        return Err(validation_err(
            "endpoint.base_url must start with http:// or https://",
        ));
    }
    url::Url::parse(&endpoint.base_url).map_err(|err| {
        validation_err(format!("endpoint.base_url is not a valid URL: {err}"))
    })?;
    if endpoint.api_key.trim().is_empty() {
        return Err(validation_err("endpoint.api_key cannot be empty"));
    }
    if endpoint.timeout == 0 {
        return Err(validation_err("endpoint.timeout must be greater than 0"));
    }
    if endpoint.connect_timeout == 0 {
        return Err(validation_err(
            "endpoint.connect_timeout must be greater than 0",
        ));
    }
    if endpoint.http_pool_max_idle_per_host == 0 {
        return Err(validation_err(
            "endpoint.http_pool_max_idle_per_host must be greater than 0",
        ));
    }
    validate_proxy_url(endpoint.proxy.as_deref())
}

fn validate_proxy_url(proxy: Option<&str>) -> Result<(), ConfigError> {
    let Some(proxy) = proxy.map(str::trim) else {
        return Ok(());
    };
    if proxy.is_empty() {
        return Err(validation_err("endpoint.proxy cannot be empty when set"));
    }
    let parsed = url::Url::parse(proxy)
        .map_err(|err| validation_err(format!("endpoint.proxy is not a valid URL: {err}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(validation_err(
            "endpoint.proxy must use http:// or https://",
        ));
    }
    Ok(())
}

fn validate_reply(config: &AppConfig) -> Result<(), ConfigError> {
    if config.reply.model.trim().is_empty() {
        return Err(validation_err("reply.model cannot be empty"));
    }
    if config.reply.empty_reply_text.trim().is_empty() {
        return Err(validation_err(
            "reply.empty_reply_text cannot be blank",
        ));
    }
    Ok(())
}

fn validate_log_level(config: &AppConfig) -> Result<(), ConfigError> {
    let valid_levels = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL", "DISABLED"];
    if !valid_levels.contains(&config.features.log_level.to_uppercase().as_str()) {
        return Err(validation_err(format!(
            "log_level must be one of {valid_levels:?}"
        )));
    }
    Ok(())
}
