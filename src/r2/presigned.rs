//! R2 presigned URL generation

use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::Client;
use std::time::Duration;

use super::types::{sdk_error, R2Result};

/// Generate a presigned GET URL for object access
pub async fn generate_presigned_url(
    client: &Client,
    bucket: &str,
    key: &str,
    expires_in_secs: u64,
) -> R2Result<String> {
    let presigning_config = PresigningConfig::builder()
        .expires_in(Duration::from_secs(expires_in_secs))
        .build()
        .map_err(sdk_error)?;

    let presigned_request = client
        .get_object()
        .bucket(bucket)
        .key(key)
        .presigned(presigning_config)
        .await
        .map_err(sdk_error)?;

    Ok(presigned_request.uri().to_string())
}
