//! R2 object and bucket operations (delete, folders, buckets)

use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{Delete, ObjectIdentifier};
use aws_sdk_s3::Client;

use super::types::{sdk_error, R2Result};

/// Delete a single object
pub async fn delete_object(client: &Client, bucket: &str, key: &str) -> R2Result<()> {
    client
        .delete_object()
        .bucket(bucket)
        .key(key)
        .send()
        .await
        .map_err(sdk_error)?;
    Ok(())
}

/// Delete multiple objects, 1000 keys per request
pub async fn delete_objects(client: &Client, bucket: &str, keys: &[String]) -> R2Result<()> {
    for chunk in keys.chunks(1000) {
        let objects: Vec<ObjectIdentifier> = chunk
            .iter()
            .filter_map(|key| ObjectIdentifier::builder().key(key).build().ok())
            .collect();
        if objects.is_empty() {
            continue;
        }

        let delete = Delete::builder()
            .set_objects(Some(objects))
            .build()
            .map_err(sdk_error)?;

        client
            .delete_objects()
            .bucket(bucket)
            .delete(delete)
            .send()
            .await
            .map_err(sdk_error)?;
    }
    Ok(())
}

/// Folder marker key for `path`
pub(crate) fn folder_key(path: &str) -> String {
    let path = path.trim_start_matches('/');
    if path.ends_with('/') {
        path.to_string()
    } else {
        format!("{}/", path)
    }
}

/// Create a folder by writing an empty marker object at `path/`
pub async fn create_folder(client: &Client, bucket: &str, path: &str) -> R2Result<()> {
    client
        .put_object()
        .bucket(bucket)
        .key(folder_key(path))
        .body(ByteStream::from(Vec::new()))
        .send()
        .await
        .map_err(sdk_error)?;
    Ok(())
}

pub async fn create_bucket(client: &Client, bucket: &str) -> R2Result<()> {
    client
        .create_bucket()
        .bucket(bucket)
        .send()
        .await
        .map_err(sdk_error)?;
    Ok(())
}

pub async fn delete_bucket(client: &Client, bucket: &str) -> R2Result<()> {
    client
        .delete_bucket()
        .bucket(bucket)
        .send()
        .await
        .map_err(sdk_error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::folder_key;

    #[test]
    fn folder_key_always_ends_with_slash() {
        assert_eq!(folder_key("photos"), "photos/");
        assert_eq!(folder_key("photos/"), "photos/");
        assert_eq!(folder_key("/a/b"), "a/b/");
    }
}
