//! R2 list operations (buckets, objects)

use aws_sdk_s3::Client;

use super::types::{display_name, sdk_error, R2Result};
use crate::error::StorageError;
use crate::storage::{BucketInfo, ObjectInfo};

/// List all buckets visible to the key pair
pub async fn list_buckets(client: &Client) -> R2Result<Vec<BucketInfo>> {
    let response = client.list_buckets().send().await.map_err(sdk_error)?;

    let buckets = response
        .buckets()
        .iter()
        .filter_map(|bucket| {
            let name = bucket.name()?.to_string();
            Some(BucketInfo {
                name,
                creation_date: bucket.creation_date().map(|dt| dt.to_string()),
            })
        })
        .collect();

    Ok(buckets)
}

/// Check a bucket exists and is reachable with the key pair
pub async fn get_bucket_info(client: &Client, bucket: &str) -> R2Result<BucketInfo> {
    client
        .head_bucket()
        .bucket(bucket)
        .send()
        .await
        .map_err(|e| {
            let missing = e.as_service_error().is_some_and(|s| s.is_not_found())
                || e.raw_response().is_some_and(|r| r.status().as_u16() == 404);
            if missing {
                StorageError::BucketNotFound(bucket.to_string())
            } else {
                sdk_error(e)
            }
        })?;

    // HeadBucket carries no creation date
    Ok(BucketInfo {
        name: bucket.to_string(),
        creation_date: None,
    })
}

/// Normalize a folder prefix so it always ends with `/`; empty means bucket root
pub(crate) fn folder_prefix(prefix: Option<&str>) -> Option<String> {
    match prefix.map(|p| p.trim_start_matches('/')) {
        None | Some("") => None,
        Some(p) if p.ends_with('/') => Some(p.to_string()),
        Some(p) => Some(format!("{}/", p)),
    }
}

/// List one folder level: sub-folders first, then files.
/// Follows continuation tokens until the listing is complete.
pub async fn list_objects(
    client: &Client,
    bucket: &str,
    prefix: Option<&str>,
) -> R2Result<Vec<ObjectInfo>> {
    let prefix = folder_prefix(prefix);
    let mut folders: Vec<ObjectInfo> = Vec::new();
    let mut files: Vec<ObjectInfo> = Vec::new();
    let mut continuation_token: Option<String> = None;

    loop {
        let mut request = client
            .list_objects_v2()
            .bucket(bucket)
            .delimiter("/")
            .max_keys(1000);

        if let Some(p) = &prefix {
            request = request.prefix(p);
        }
        if let Some(token) = &continuation_token {
            request = request.continuation_token(token);
        }

        let response = request.send().await.map_err(sdk_error)?;

        for common in response.common_prefixes() {
            let Some(p) = common.prefix() else { continue };
            if folders.iter().any(|f| f.key == p) {
                continue;
            }
            folders.push(ObjectInfo {
                key: p.to_string(),
                name: display_name(p),
                size: 0,
                last_modified: String::new(),
                is_folder: true,
                etag: None,
            });
        }

        for obj in response.contents() {
            let Some(key) = obj.key() else { continue };
            // Skip directory markers
            if key.ends_with('/') {
                continue;
            }
            files.push(ObjectInfo {
                key: key.to_string(),
                name: display_name(key),
                size: obj.size().unwrap_or(0),
                last_modified: obj
                    .last_modified()
                    .map(|dt| dt.to_string())
                    .unwrap_or_default(),
                is_folder: false,
                etag: obj.e_tag().map(|s| s.to_string()),
            });
        }

        if !response.is_truncated().unwrap_or(false) {
            break;
        }
        continuation_token = response.next_continuation_token().map(|s| s.to_string());
        if continuation_token.is_none() {
            break;
        }
    }

    folders.extend(files);
    Ok(folders)
}

#[cfg(test)]
mod tests {
    use super::folder_prefix;

    #[test]
    fn folder_prefix_is_normalized() {
        assert_eq!(folder_prefix(None), None);
        assert_eq!(folder_prefix(Some("")), None);
        assert_eq!(folder_prefix(Some("docs")), Some("docs/".to_string()));
        assert_eq!(folder_prefix(Some("docs/")), Some("docs/".to_string()));
        assert_eq!(folder_prefix(Some("/docs/2024")), Some("docs/2024/".to_string()));
    }
}
