use crate::utils::error::{IntegrationError, Result};
use url::Url;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

fn invalid(field_name: &str, value: impl ToString, reason: impl Into<String>) -> IntegrationError {
    IntegrationError::InvalidConfigValueError {
        field: field_name.to_string(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

pub fn validate_url(field_name: &str, url_str: &str) -> Result<()> {
    if url_str.is_empty() {
        return Err(invalid(field_name, url_str, "URL cannot be empty"));
    }

    match Url::parse(url_str) {
        Ok(url) => match url.scheme() {
            "http" | "https" => Ok(()),
            scheme => Err(invalid(
                field_name,
                url_str,
                format!("Unsupported URL scheme: {}", scheme),
            )),
        },
        Err(e) => Err(invalid(
            field_name,
            url_str,
            format!("Invalid URL format: {}", e),
        )),
    }
}

/// NewStore hosts are configured either bare (`tenant.x.newstore.net`) or as
/// a full base URL.
pub fn validate_host(field_name: &str, host: &str) -> Result<()> {
    validate_non_empty_string(field_name, host)?;
    if host.starts_with("http://") || host.starts_with("https://") {
        return validate_url(field_name, host);
    }
    validate_url(field_name, &format!("https://{}", host))
}

pub fn validate_positive_number(field_name: &str, value: usize, min_value: usize) -> Result<()> {
    if value < min_value {
        return Err(invalid(
            field_name,
            value,
            format!("Value must be at least {}", min_value),
        ));
    }
    Ok(())
}

pub fn validate_file_extension(field_name: &str, file: &str, allowed_extensions: &[&str]) -> Result<()> {
    match std::path::Path::new(file)
        .extension()
        .and_then(|ext| ext.to_str())
    {
        Some(extension) if allowed_extensions.contains(&extension) => Ok(()),
        Some(extension) => Err(invalid(
            field_name,
            file,
            format!(
                "Unsupported file extension: {}. Allowed extensions: {}",
                extension,
                allowed_extensions.join(", ")
            ),
        )),
        None => Err(invalid(field_name, file, "File has no extension or invalid filename")),
    }
}

pub fn validate_required_field<'a, T>(field_name: &str, value: &'a Option<T>) -> Result<&'a T> {
    value
        .as_ref()
        .ok_or_else(|| IntegrationError::MissingConfigError {
            field: field_name.to_string(),
        })
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(invalid(
            field_name,
            value,
            "Value cannot be empty or whitespace-only",
        ));
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(invalid(
            field_name,
            value,
            format!("Value must be between {} and {}", min, max),
        ));
    }
    Ok(())
}

pub fn validate_s3_bucket_name(field_name: &str, bucket_name: &str) -> Result<()> {
    if bucket_name.is_empty() {
        return Err(invalid(field_name, bucket_name, "S3 bucket name cannot be empty"));
    }

    if bucket_name.len() < 3 || bucket_name.len() > 63 {
        return Err(invalid(
            field_name,
            bucket_name,
            "S3 bucket name must be between 3 and 63 characters",
        ));
    }

    if !bucket_name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.')
    {
        return Err(invalid(
            field_name,
            bucket_name,
            "S3 bucket name can only contain lowercase letters, numbers, hyphens, and dots",
        ));
    }

    if bucket_name.starts_with('-') || bucket_name.ends_with('-') {
        return Err(invalid(
            field_name,
            bucket_name,
            "S3 bucket name cannot start or end with a hyphen",
        ));
    }

    Ok(())
}

/// S3 prefixes are concatenated directly with generated names, so a
/// non-empty prefix has to end in `/`.
pub fn validate_s3_prefix(field_name: &str, prefix: &str) -> Result<()> {
    if !prefix.is_empty() && !prefix.ends_with('/') {
        return Err(invalid(field_name, prefix, "S3 prefix must end with '/'"));
    }
    if prefix.starts_with('/') {
        return Err(invalid(field_name, prefix, "S3 prefix cannot start with '/'"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url() {
        assert!(validate_url("newstore_host", "https://example.com").is_ok());
        assert!(validate_url("newstore_host", "http://example.com").is_ok());
        assert!(validate_url("newstore_host", "").is_err());
        assert!(validate_url("newstore_host", "invalid-url").is_err());
        assert!(validate_url("newstore_host", "ftp://example.com").is_err());
    }

    #[test]
    fn test_validate_host() {
        assert!(validate_host("host", "acme.x.newstore.net").is_ok());
        assert!(validate_host("host", "http://127.0.0.1:8080").is_ok());
        assert!(validate_host("host", "  ").is_err());
    }

    #[test]
    fn test_validate_positive_number() {
        assert!(validate_positive_number("chunk_size", 5, 1).is_ok());
        assert!(validate_positive_number("chunk_size", 0, 1).is_err());
    }

    #[test]
    fn test_validate_file_extension() {
        assert!(validate_file_extension("file", "prices.csv", &["csv"]).is_ok());
        assert!(validate_file_extension("file", "prices.txt", &["csv"]).is_err());
        assert!(validate_file_extension("file", "prices", &["csv"]).is_err());
    }

    #[test]
    fn test_validate_s3_bucket_name() {
        assert!(validate_s3_bucket_name("bucket", "acme-x-0-newstore-dmz").is_ok());
        assert!(validate_s3_bucket_name("bucket", "ab").is_err());
        assert!(validate_s3_bucket_name("bucket", "Upper").is_err());
        assert!(validate_s3_bucket_name("bucket", "-leading").is_err());
    }

    #[test]
    fn test_validate_s3_prefix() {
        assert!(validate_s3_prefix("prefix", "").is_ok());
        assert!(validate_s3_prefix("prefix", "queued_for_import/").is_ok());
        assert!(validate_s3_prefix("prefix", "queued_for_import").is_err());
        assert!(validate_s3_prefix("prefix", "/queued/").is_err());
    }
}
