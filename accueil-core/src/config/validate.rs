//! Configuration validation rules.

use super::schema::Config;

/// Validate configuration and return aggregated validation errors.
pub fn validate_config(config: &Config) -> crate::Result<()> {
    let mut errors = Vec::new();

    let endpoint = config.backend.endpoint().trim();
    if endpoint.is_empty() {
        errors.push("backend.endpoint must not be empty".to_string());
    } else if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
        errors.push(format!(
            "backend.endpoint must be an http(s) URL, got '{}'",
            endpoint
        ));
    }
    if config.backend.timeout_ms() == 0 {
        errors.push("backend.timeout_ms must be > 0".to_string());
    }
    for name in config.backend.headers().keys() {
        if name.trim().is_empty() {
            errors.push("backend.headers must not contain an empty header name".to_string());
        }
    }

    if config.sessions.max_history == 0 {
        errors.push("sessions.max_history must be > 0".to_string());
    }
    if config.sessions.ttl_secs == 0 {
        errors.push("sessions.ttl_secs must be > 0".to_string());
    }
    if config.sessions.sweep_interval_secs == 0 {
        errors.push("sessions.sweep_interval_secs must be > 0".to_string());
    }

    if config.dialog.generic_apology.trim().is_empty() {
        errors.push("dialog.generic_apology must not be empty".to_string());
    }
    for (intent, variants) in &config.dialog.fallback {
        if variants.is_empty() {
            errors.push(format!(
                "dialog.fallback.{} must have at least one template",
                intent
            ));
        }
        if variants.iter().any(|v| v.trim().is_empty()) {
            errors.push(format!(
                "dialog.fallback.{} must not contain empty templates",
                intent
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(crate::Error::Validation(errors.join("; ")))
    }
}
