//! R2 module - Cloudflare R2 storage operations
//!
//! This module is organized into submodules:
//! - `types`: Config, client creation and error mapping
//! - `list`: List operations (buckets, objects)
//! - `objects`: Object and bucket operations (delete, folders)
//! - `upload`: Upload operations (simple, multipart)
//! - `download`: Streaming download to disk
//! - `presigned`: Presigned URL generation
//! - `backend`: The `StorageBackend` used by the transfer queue

mod backend;
mod download;
mod list;
mod objects;
mod presigned;
mod types;
mod upload;

pub use backend::R2Backend;
pub use types::{create_r2_client, R2Config, R2Result};

pub use download::download_url_to_file;
pub use list::{get_bucket_info, list_buckets, list_objects};
pub use objects::{create_bucket, create_folder, delete_bucket, delete_object, delete_objects};
pub use presigned::generate_presigned_url;
pub use upload::{
    abort_multipart_upload, complete_multipart_upload, initiate_multipart_upload, upload_file,
    upload_file_multipart, upload_file_simple, upload_part, UploadPlan,
};
