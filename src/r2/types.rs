//! R2 types and client creation

use aws_config::Region;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::Client;

use crate::account::AccountCredentials;
use crate::error::StorageError;

pub type R2Result<T> = Result<T, StorageError>;

#[derive(Debug, Clone)]
pub struct R2Config {
    pub account_id: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    /// Replaces the account's R2 endpoint when set
    pub endpoint_url: Option<String>,
}

impl R2Config {
    pub fn from_credentials(credentials: &AccountCredentials, endpoint_url: Option<&str>) -> Self {
        Self {
            account_id: credentials.account_id.clone(),
            access_key_id: credentials.access_key_id.clone(),
            secret_access_key: credentials.secret_access_key.clone(),
            endpoint_url: endpoint_url.map(|s| s.to_string()),
        }
    }

    pub fn endpoint(&self) -> String {
        match &self.endpoint_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("https://{}.r2.cloudflarestorage.com", self.account_id),
        }
    }
}

/// Create an S3 client configured for Cloudflare R2
pub fn create_r2_client(config: &R2Config) -> Client {
    let credentials = Credentials::new(
        &config.access_key_id,
        &config.secret_access_key,
        None,
        None,
        "r2-provider",
    );

    let s3_config = S3ConfigBuilder::new()
        .credentials_provider(credentials)
        .region(Region::new("auto"))
        .endpoint_url(config.endpoint())
        .force_path_style(true)
        .build();

    Client::from_conf(s3_config)
}

/// Flatten an SDK error (including its source chain) into a `StorageError`
pub(crate) fn sdk_error<E: std::error::Error>(err: E) -> StorageError {
    StorageError::Sdk(DisplayErrorContext(err).to_string())
}

/// Display name of a key: the last non-empty path segment
pub(crate) fn display_name(key: &str) -> String {
    let trimmed = key.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(endpoint_url: Option<&str>) -> R2Config {
        R2Config {
            account_id: "abc123".to_string(),
            access_key_id: "AK".to_string(),
            secret_access_key: "SK".to_string(),
            endpoint_url: endpoint_url.map(|s| s.to_string()),
        }
    }

    #[test]
    fn endpoint_defaults_to_account_host() {
        assert_eq!(
            config(None).endpoint(),
            "https://abc123.r2.cloudflarestorage.com"
        );
        assert_eq!(
            config(Some("http://127.0.0.1:9000/")).endpoint(),
            "http://127.0.0.1:9000"
        );
    }

    #[test]
    fn display_name_uses_last_segment() {
        assert_eq!(display_name("docs/2024/report.pdf"), "report.pdf");
        assert_eq!(display_name("docs/2024/"), "2024");
        assert_eq!(display_name("top"), "top");
    }
}
