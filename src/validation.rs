//! Request body rules shared by handlers.
//!
//! Each request type implements [`Validate`]; the `ValidJson` extractor runs it
//! after deserialization so handlers only ever see checked input.

use std::collections::HashMap;

use serde::{Deserialize, Deserializer};
use url::Url;

use crate::error::ApiError;

pub trait Validate {
    fn validate(&self) -> Result<(), ApiError>;
}

/// Accumulates per-field failures and turns them into one validation error
#[derive(Debug, Default)]
pub struct FieldErrors {
    errors: HashMap<String, String>,
}

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, reason: impl Into<String>) {
        self.errors.entry(field.to_string()).or_insert_with(|| reason.into());
    }

    pub fn check(&mut self, field: &str, result: Result<(), String>) {
        if let Err(reason) = result {
            self.add(field, reason);
        }
    }

    pub fn into_result(self) -> Result<(), ApiError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::validation_fields("Validation failed", self.errors))
        }
    }
}

pub fn required(value: &str, max_len: usize) -> Result<(), String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("This field is required".to_string());
    }
    optional(Some(trimmed), max_len)
}

pub fn optional(value: Option<&str>, max_len: usize) -> Result<(), String> {
    match value {
        Some(v) if v.chars().count() > max_len => Err(format!("Must be at most {} characters", max_len)),
        _ => Ok(()),
    }
}

pub fn email(value: &str) -> Result<(), String> {
    let value = value.trim();
    if value.is_empty() {
        return Err("Email is required".to_string());
    }
    if value.len() > 254 || value.chars().any(char::is_whitespace) {
        return Err("Invalid email format".to_string());
    }

    match value.split_once('@') {
        Some((local, domain))
            if !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.') =>
        {
            Ok(())
        }
        _ => Err("Invalid email format".to_string()),
    }
}

pub fn password(value: &str) -> Result<(), String> {
    if value.len() < 8 {
        return Err("Password must be at least 8 characters".to_string());
    }
    if value.len() > 72 {
        return Err("Password must be at most 72 bytes".to_string());
    }
    Ok(())
}

/// Absolute http(s) URL. With `allow_private == false`, loopback and
/// private-network hosts are refused.
pub fn http_url(value: &str, allow_private: bool) -> Result<(), String> {
    let url = Url::parse(value).map_err(|_| "Invalid URL".to_string())?;
    if url.scheme() != "https" && url.scheme() != "http" {
        return Err("URL must use http or https".to_string());
    }
    let host = url.host_str().ok_or_else(|| "URL must have a host".to_string())?;
    if !allow_private && is_private_host(host) {
        return Err("URL must not target a private address".to_string());
    }
    Ok(())
}

fn is_private_host(host: &str) -> bool {
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.eq_ignore_ascii_case("localhost") || host.ends_with(".localhost") || host.ends_with(".internal") {
        return true;
    }
    match host.parse::<std::net::IpAddr>() {
        Ok(std::net::IpAddr::V4(ip)) => {
            ip.is_loopback() || ip.is_private() || ip.is_link_local() || ip.is_unspecified()
        }
        Ok(std::net::IpAddr::V6(ip)) => ip.is_loopback() || ip.is_unspecified(),
        Err(_) => false,
    }
}

/// `deserialize_with` for PATCH fields that may be cleared: a missing key
/// stays `None` (with `#[serde(default)]`), an explicit `null` becomes `Some(None)`.
pub fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// ISO 4217 style: three uppercase letters
pub fn currency_code(value: &str) -> Result<(), String> {
    if value.len() == 3 && value.chars().all(|c| c.is_ascii_uppercase()) {
        Ok(())
    } else {
        Err("Currency must be a 3-letter ISO code".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_rules() {
        assert!(email("marie@example.fr").is_ok());
        assert!(email("").is_err());
        assert!(email("no-at-sign").is_err());
        assert!(email("a@b").is_err());
        assert!(email("a@@b.fr").is_err());
        assert!(email("a b@c.fr").is_err());
        assert!(email("@c.fr").is_err());
    }

    #[test]
    fn url_rules() {
        assert!(http_url("https://hooks.example.com/tender", false).is_ok());
        assert!(http_url("ftp://example.com", false).is_err());
        assert!(http_url("not a url", false).is_err());
        assert!(http_url("http://localhost:8080/hook", false).is_err());
        assert!(http_url("http://192.168.1.10/hook", false).is_err());
        assert!(http_url("http://[::1]/hook", false).is_err());
        assert!(http_url("http://localhost:8080/hook", true).is_ok());
    }

    #[test]
    fn required_and_length() {
        assert!(required("  ", 10).is_err());
        assert!(required("Lot 1", 10).is_ok());
        assert!(required("x".repeat(11).as_str(), 10).is_err());
        assert!(optional(None, 3).is_ok());
        assert!(optional(Some("abcd"), 3).is_err());
    }

    #[test]
    fn field_errors_collect_first_reason_per_field() {
        let mut errors = FieldErrors::new();
        errors.check("email", email("bad"));
        errors.check("email", Err("second".to_string()));
        errors.check("title", required("ok", 10));

        let err = errors.into_result().unwrap_err();
        let body = err.to_json();
        assert_eq!(body["field_errors"]["email"], "Invalid email format");
        assert!(body["field_errors"].get("title").is_none());
    }

    #[test]
    fn currency_codes() {
        assert!(currency_code("EUR").is_ok());
        assert!(currency_code("eur").is_err());
        assert!(currency_code("EURO").is_err());
    }
}
