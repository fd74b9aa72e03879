//! [`StorageBackend`] implementation on top of Cloudflare R2

use async_trait::async_trait;
use aws_sdk_s3::Client;
use log::{debug, info};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::download::download_url_to_file;
use super::types::{create_r2_client, R2Config};
use super::upload::UploadPlan;
use super::{list, objects, presigned, upload};
use crate::account::{AccountCredentials, AccountStore};
use crate::config::TransferConfig;
use crate::error::StorageError;
use crate::storage::{
    BucketInfo, ObjectInfo, ObjectTarget, ProgressCallback, StorageBackend, StorageResult,
};

pub struct R2Backend {
    accounts: Arc<AccountStore>,
    http: reqwest::Client,
    config: TransferConfig,
}

impl R2Backend {
    pub fn new(accounts: Arc<AccountStore>, config: TransferConfig) -> StorageResult<Self> {
        let config = config.normalized();
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .read_timeout(Duration::from_secs(config.read_timeout_secs))
            .build()
            .map_err(|e| StorageError::Network(e.to_string()))?;
        Ok(Self {
            accounts,
            http,
            config,
        })
    }

    fn r2_config(&self, credentials: &AccountCredentials) -> R2Config {
        R2Config::from_credentials(credentials, self.config.endpoint_url.as_deref())
    }

    async fn client_for(&self, account_id: &str) -> StorageResult<Client> {
        let credentials = self
            .accounts
            .credentials(account_id)
            .await?
            .ok_or_else(|| StorageError::AccountNotFound(account_id.to_string()))?;
        Ok(create_r2_client(&self.r2_config(&credentials)))
    }

    fn upload_plan(&self) -> UploadPlan {
        UploadPlan {
            multipart_threshold: self.config.multipart_threshold,
            part_size: self.config.part_size,
            concurrency: self.config.part_concurrency,
        }
    }
}

#[async_trait]
impl StorageBackend for R2Backend {
    async fn list_buckets(&self, account_id: &str) -> StorageResult<Vec<BucketInfo>> {
        let client = self.client_for(account_id).await?;
        list::list_buckets(&client).await
    }

    async fn get_bucket_info(&self, account_id: &str, bucket: &str) -> StorageResult<BucketInfo> {
        let client = self.client_for(account_id).await?;
        list::get_bucket_info(&client, bucket).await
    }

    async fn create_bucket(&self, account_id: &str, bucket: &str) -> StorageResult<()> {
        let client = self.client_for(account_id).await?;
        objects::create_bucket(&client, bucket).await
    }

    async fn delete_bucket(&self, account_id: &str, bucket: &str) -> StorageResult<()> {
        let client = self.client_for(account_id).await?;
        objects::delete_bucket(&client, bucket).await
    }

    async fn list_objects(
        &self,
        account_id: &str,
        bucket: &str,
        prefix: Option<&str>,
    ) -> StorageResult<Vec<ObjectInfo>> {
        let client = self.client_for(account_id).await?;
        list::list_objects(&client, bucket, prefix).await
    }

    async fn create_folder(&self, account_id: &str, bucket: &str, path: &str) -> StorageResult<()> {
        let client = self.client_for(account_id).await?;
        objects::create_folder(&client, bucket, path).await
    }

    async fn delete_object(&self, account_id: &str, bucket: &str, key: &str) -> StorageResult<()> {
        let client = self.client_for(account_id).await?;
        objects::delete_object(&client, bucket, key).await
    }

    async fn delete_objects(
        &self,
        account_id: &str,
        bucket: &str,
        keys: &[String],
    ) -> StorageResult<()> {
        let client = self.client_for(account_id).await?;
        objects::delete_objects(&client, bucket, keys).await
    }

    async fn get_presigned_url(
        &self,
        account_id: &str,
        bucket: &str,
        key: &str,
        expires_in_secs: u64,
    ) -> StorageResult<String> {
        let client = self.client_for(account_id).await?;
        presigned::generate_presigned_url(&client, bucket, key, expires_in_secs).await
    }

    async fn upload_file(
        &self,
        target: &ObjectTarget,
        local_path: &Path,
        progress: ProgressCallback,
        cancel: CancellationToken,
    ) -> StorageResult<()> {
        let client = self.client_for(&target.account_id).await?;
        let etag = upload::upload_file(
            &client,
            &target.bucket,
            &target.key,
            local_path,
            self.upload_plan(),
            progress,
            &cancel,
        )
        .await?;
        debug!("upload_finished: {} etag={}", target.key, etag);
        Ok(())
    }

    async fn download_file(
        &self,
        target: &ObjectTarget,
        dest_path: &Path,
        progress: ProgressCallback,
        cancel: CancellationToken,
    ) -> StorageResult<()> {
        // Fresh URL every time, so a retried download never reuses an expired one
        let url = self
            .get_presigned_url(
                &target.account_id,
                &target.bucket,
                &target.key,
                self.config.presign_expiry_secs,
            )
            .await?;
        let bytes = download_url_to_file(&self.http, &url, dest_path, &progress, &cancel).await?;
        debug!("download_finished: {} bytes={}", target.key, bytes);
        Ok(())
    }

    async fn validate_credentials(&self, credentials: &AccountCredentials) -> StorageResult<()> {
        let client = create_r2_client(&self.r2_config(credentials));
        list::list_buckets(&client)
            .await
            .map_err(|e| StorageError::Credentials(e.to_string()))?;
        info!("credentials_validated: {}", credentials.account_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::Account;
    use std::sync::Mutex;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn backend(dir: &tempfile::TempDir, endpoint: &str) -> R2Backend {
        let accounts = AccountStore::open(&dir.path().join("accounts.db"))
            .await
            .unwrap();
        accounts
            .save_account(&Account {
                id: "acc".to_string(),
                name: "Main".to_string(),
                account_id: "cf".to_string(),
                access_key_id: "AK".to_string(),
                secret_access_key: "SK".to_string(),
            })
            .await
            .unwrap();

        let config = TransferConfig {
            endpoint_url: Some(endpoint.to_string()),
            ..TransferConfig::default()
        };
        R2Backend::new(Arc::new(accounts), config).unwrap()
    }

    fn target(key: &str) -> ObjectTarget {
        ObjectTarget {
            account_id: "acc".to_string(),
            bucket: "my-bucket".to_string(),
            key: key.to_string(),
        }
    }

    #[tokio::test]
    async fn download_streams_object_to_disk() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/my-bucket/docs/a.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"hello r2".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let backend = backend(&dir, &server.uri()).await;
        let dest = dir.path().join("out").join("a.txt");

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        backend
            .download_file(
                &target("docs/a.txt"),
                &dest,
                Box::new(move |done, total| sink.lock().unwrap().push((done, total))),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(tokio::fs::read(&dest).await.unwrap(), b"hello r2");
        let seen = seen.lock().unwrap();
        assert_eq!(seen.first(), Some(&(0, 8)));
        assert_eq!(seen.last(), Some(&(8, 8)));
    }

    #[tokio::test]
    async fn download_error_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/my-bucket/missing.txt"))
            .respond_with(ResponseTemplate::new(404).set_body_string("NoSuchKey"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let backend = backend(&dir, &server.uri()).await;

        let err = backend
            .download_file(
                &target("missing.txt"),
                &dir.path().join("missing.txt"),
                Box::new(|_, _| {}),
                CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::Network(_)));
        assert!(err.to_string().contains("404"));
    }

    #[tokio::test]
    async fn cancelled_download_leaves_no_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/my-bucket/big.bin"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(vec![0u8; 1024])
                    .set_delay(std::time::Duration::from_millis(200)),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let backend = backend(&dir, &server.uri()).await;
        let dest = dir.path().join("big.bin");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = backend
            .download_file(&target("big.bin"), &dest, Box::new(|_, _| {}), cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::Cancelled));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn cancel_while_waiting_for_response_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/my-bucket/slow.bin"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(vec![0u8; 16])
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let backend = backend(&dir, &server.uri()).await;
        let dest = dir.path().join("slow.bin");
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let err = tokio::time::timeout(
            Duration::from_secs(1),
            backend.download_file(&target("slow.bin"), &dest, Box::new(|_, _| {}), cancel),
        )
        .await
        .expect("cancel should not wait for the delayed response")
        .unwrap_err();

        assert!(matches!(err, StorageError::Cancelled));
        assert!(!dest.exists());
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn zero_part_size_is_raised_to_the_minimum() {
        let dir = tempfile::tempdir().unwrap();
        let accounts = AccountStore::open(&dir.path().join("accounts.db"))
            .await
            .unwrap();
        let config = TransferConfig {
            part_size: 0,
            part_concurrency: 0,
            ..TransferConfig::default()
        };
        let backend = R2Backend::new(Arc::new(accounts), config).unwrap();

        let plan = backend.upload_plan();
        assert_eq!(plan.part_size, 5 * 1024 * 1024);
        assert_eq!(plan.concurrency, 1);
        assert_eq!(plan.part_count(12 * 1024 * 1024), 3);
    }

    #[tokio::test]
    async fn bucket_info_distinguishes_missing_buckets() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/my-bucket"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let backend = backend(&dir, &server.uri()).await;

        let info = backend.get_bucket_info("acc", "my-bucket").await.unwrap();
        assert_eq!(info.name, "my-bucket");
        assert_eq!(info.creation_date, None);

        let err = backend.get_bucket_info("acc", "gone").await.unwrap_err();
        assert!(matches!(err, StorageError::BucketNotFound(name) if name == "gone"));
    }

    #[tokio::test]
    async fn unknown_account_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend(&dir, "http://127.0.0.1:9").await;

        let err = backend.list_buckets("nobody").await.unwrap_err();
        assert!(matches!(err, StorageError::AccountNotFound(id) if id == "nobody"));
    }
}
