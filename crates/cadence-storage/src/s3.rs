use crate::keys::validate_key;
use crate::traits::{
    ByteReader, ByteStream, CompletedPart, ObjectMetadata, SignedUrl, SignedUrlKind,
    StorageError, StorageProvider, StorageResult, StoredObject, UploadOptions,
};
use crate::StorageBackend;
use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::retry::{RetryConfig, RetryMode};
use aws_config::BehaviorVersion;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::operation::abort_multipart_upload::AbortMultipartUploadError;
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::operation::head_object::HeadObjectError;
use aws_sdk_s3::primitives::ByteStream as S3Body;
use aws_sdk_s3::types::{
    CompletedMultipartUpload, CompletedPart as S3CompletedPart, MetadataDirective,
};
use aws_sdk_s3::Client;
use bytes::Bytes;
use cadence_core::config::S3_MIN_PART_SIZE;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::collections::HashMap;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio_util::io::ReaderStream;

const PART_SIZE: usize = S3_MIN_PART_SIZE as usize;

/// S3 storage implementation
///
/// Works against AWS and S3-compatible providers (MinIO, Spaces, R2). Multipart
/// sessions are native provider sessions; the provider assembles the object.
#[derive(Clone)]
pub struct S3Storage {
    client: Client,
    bucket: String,
    region: String,
    endpoint_url: Option<String>, // Custom endpoint for S3-compatible providers
}

impl S3Storage {
    /// Create a new S3Storage instance
    ///
    /// # Arguments
    /// * `bucket` - S3 bucket name
    /// * `region` - AWS region (or region identifier for S3-compatible providers)
    /// * `endpoint_url` - Optional custom endpoint URL for S3-compatible providers
    ///   (e.g., "http://localhost:9000" for MinIO)
    pub async fn new(
        bucket: String,
        region: String,
        endpoint_url: Option<String>,
    ) -> StorageResult<Self> {
        if bucket.is_empty() {
            return Err(StorageError::ConfigError(
                "S3 bucket name is required".to_string(),
            ));
        }

        let region_provider =
            RegionProviderChain::first_try(aws_config::Region::new(region.clone()));

        let retry_config = RetryConfig::standard()
            .with_max_attempts(5)
            .with_retry_mode(RetryMode::Adaptive);

        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(region_provider)
            .retry_config(retry_config.clone())
            .load()
            .await;

        let client = if let Some(ref endpoint) = endpoint_url {
            let mut s3_config_builder = aws_sdk_s3::Config::builder()
                .endpoint_url(endpoint)
                .region(config.region().cloned())
                .retry_config(retry_config);
            if let Some(provider) = config.credentials_provider() {
                s3_config_builder = s3_config_builder.credentials_provider(provider);
            }
            // MinIO and friends need path-style addressing.
            s3_config_builder = s3_config_builder.force_path_style(true);

            Client::from_conf(s3_config_builder.build())
        } else {
            Client::new(&config)
        };

        tracing::info!(
            bucket = %bucket,
            region = %region,
            endpoint = ?endpoint_url,
            "S3 storage client configured"
        );

        Ok(S3Storage {
            client,
            bucket,
            region,
            endpoint_url,
        })
    }

    fn generate_url(&self, key: &str) -> String {
        object_url_for(self.endpoint_url.as_deref(), &self.bucket, &self.region, key)
    }

    fn copy_source(&self, key: &str) -> String {
        format!("{}/{}", self.bucket, urlencoding::encode(key))
    }

    async fn put(&self, key: &str, data: Bytes, options: &UploadOptions) -> StorageResult<u64> {
        let size = data.len() as u64;
        let start = std::time::Instant::now();

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(S3Body::from(data))
            .set_content_type(options.content_type.clone())
            .set_metadata(non_empty_map(&options.metadata))
            .send()
            .await
            .map_err(|e| {
                tracing::error!(
                    error = %e,
                    bucket = %self.bucket,
                    key = %key,
                    size_bytes = size,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 upload failed"
                );
                StorageError::UploadFailed(e.to_string())
            })?;

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 upload successful"
        );

        Ok(size)
    }

    /// Push parts read from `reader` into an already-open session.
    async fn stream_parts(
        &self,
        key: &str,
        upload_id: &str,
        first: Bytes,
        reader: &mut ByteReader,
    ) -> StorageResult<Vec<CompletedPart>> {
        let mut parts = vec![self.upload_part(key, upload_id, 1, first).await?];
        let mut buffer = vec![0u8; PART_SIZE];
        loop {
            let read = read_part(reader, &mut buffer).await?;
            if read == 0 {
                break;
            }
            let part_number = parts.len() as i32 + 1;
            let data = Bytes::copy_from_slice(&buffer[..read]);
            parts.push(self.upload_part(key, upload_id, part_number, data).await?);
            if read < buffer.len() {
                break;
            }
        }
        Ok(parts)
    }
}

/// `{endpoint}/{bucket}/{key}` for custom endpoints, virtual-hosted AWS URL otherwise.
fn object_url_for(endpoint: Option<&str>, bucket: &str, region: &str, key: &str) -> String {
    match endpoint {
        Some(endpoint) => format!("{}/{}/{}", endpoint.trim_end_matches('/'), bucket, key),
        None => format!("https://{}.s3.{}.amazonaws.com/{}", bucket, region, key),
    }
}

fn non_empty_map(map: &HashMap<String, String>) -> Option<HashMap<String, String>> {
    if map.is_empty() {
        None
    } else {
        Some(map.clone())
    }
}

fn to_chrono(value: &aws_sdk_s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(value.secs(), value.subsec_nanos())
}

/// Fill `buffer` from `reader`, stopping early only at EOF.
async fn read_part(reader: &mut ByteReader, buffer: &mut [u8]) -> StorageResult<usize> {
    let mut filled = 0usize;
    while filled < buffer.len() {
        let read = reader.read(&mut buffer[filled..]).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to read from stream: {}", e))
        })?;
        if read == 0 {
            break;
        }
        filled += read;
    }
    Ok(filled)
}

#[async_trait]
impl StorageProvider for S3Storage {
    async fn upload(
        &self,
        key: &str,
        data: Bytes,
        options: &UploadOptions,
    ) -> StorageResult<StoredObject> {
        validate_key(key)?;
        let size = self.put(key, data, options).await?;
        Ok(StoredObject {
            key: key.to_string(),
            url: self.generate_url(key),
            size,
        })
    }

    async fn upload_stream(
        &self,
        key: &str,
        mut reader: ByteReader,
        options: &UploadOptions,
    ) -> StorageResult<StoredObject> {
        validate_key(key)?;
        let start = std::time::Instant::now();

        let mut first = vec![0u8; PART_SIZE];
        let read = read_part(&mut reader, &mut first).await?;
        first.truncate(read);

        // Fits in one part: a plain PUT is cheaper than a session.
        if read < PART_SIZE {
            let size = self.put(key, Bytes::from(first), options).await?;
            return Ok(StoredObject {
                key: key.to_string(),
                url: self.generate_url(key),
                size,
            });
        }

        let upload_id = self.initiate_multipart_upload(key, options).await?;
        let parts = match self
            .stream_parts(key, &upload_id, Bytes::from(first), &mut reader)
            .await
        {
            Ok(parts) => parts,
            Err(e) => {
                if let Err(abort_err) = self.abort_multipart_upload(key, &upload_id).await {
                    tracing::warn!(
                        error = %abort_err,
                        key = %key,
                        upload_id = %upload_id,
                        "Failed to abort multipart upload after stream error"
                    );
                }
                return Err(e);
            }
        };

        let stored = self
            .complete_multipart_upload(key, &upload_id, &parts)
            .await?;

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            size_bytes = stored.size,
            parts = parts.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 multipart stream upload successful"
        );

        Ok(stored)
    }

    async fn download(&self, key: &str) -> StorageResult<Bytes> {
        let start = std::time::Instant::now();

        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| match &e {
                SdkError::ServiceError(service_err)
                    if matches!(service_err.err(), GetObjectError::NoSuchKey(_)) =>
                {
                    StorageError::NotFound(key.to_string())
                }
                _ => {
                    tracing::error!(
                        error = %e,
                        bucket = %self.bucket,
                        key = %key,
                        duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                        "S3 download failed"
                    );
                    StorageError::DownloadFailed(e.to_string())
                }
            })?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::DownloadFailed(e.to_string()))?
            .into_bytes();

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            size_bytes = data.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 download successful"
        );

        Ok(data)
    }

    async fn download_stream(&self, key: &str) -> StorageResult<ByteStream> {
        let start = std::time::Instant::now();

        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| match &e {
                SdkError::ServiceError(service_err)
                    if matches!(service_err.err(), GetObjectError::NoSuchKey(_)) =>
                {
                    StorageError::NotFound(key.to_string())
                }
                _ => StorageError::DownloadFailed(e.to_string()),
            })?;

        let bucket = self.bucket.clone();
        let key = key.to_string();
        let stream = ReaderStream::new(response.body.into_async_read()).map(move |result| {
            result.map_err(|e| {
                tracing::error!(
                    bucket = %bucket,
                    key = %key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 stream download error"
                );
                StorageError::DownloadFailed(e.to_string())
            })
        });

        Ok(Box::pin(stream))
    }

    async fn get_signed_url(&self, key: &str, ttl: Duration) -> StorageResult<SignedUrl> {
        let presigning_config = aws_sdk_s3::presigning::PresigningConfig::builder()
            .expires_in(ttl)
            .build()
            .map_err(|e| StorageError::BackendError(e.to_string()))?;
        let lifetime = chrono::Duration::from_std(ttl)
            .map_err(|e| StorageError::BackendError(e.to_string()))?;

        let presigned_request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning_config)
            .await
            .map_err(|e| StorageError::BackendError(e.to_string()))?;

        Ok(SignedUrl {
            url: presigned_request.uri().to_string(),
            expires_at: Some(Utc::now() + lifetime),
            kind: SignedUrlKind::Presigned,
        })
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let start = std::time::Instant::now();

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(
                    error = %e,
                    bucket = %self.bucket,
                    key = %key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 delete failed"
                );
                StorageError::DeleteFailed(e.to_string())
            })?;

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 delete successful"
        );

        Ok(())
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(SdkError::ServiceError(service_err))
                if matches!(service_err.err(), HeadObjectError::NotFound(_)) =>
            {
                Ok(false)
            }
            Err(e) => Err(StorageError::BackendError(e.to_string())),
        }
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .into_paginator()
            .send();

        let mut keys = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| StorageError::BackendError(e.to_string()))?;
            keys.extend(
                page.contents()
                    .iter()
                    .filter_map(|object| object.key().map(str::to_string)),
            );
        }

        keys.sort();
        Ok(keys)
    }

    async fn get_metadata(&self, key: &str) -> StorageResult<ObjectMetadata> {
        let head = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| match &e {
                SdkError::ServiceError(service_err)
                    if matches!(service_err.err(), HeadObjectError::NotFound(_)) =>
                {
                    StorageError::NotFound(key.to_string())
                }
                _ => StorageError::BackendError(e.to_string()),
            })?;

        Ok(ObjectMetadata {
            key: key.to_string(),
            size: head.content_length().unwrap_or(0).max(0) as u64,
            content_type: head.content_type().map(str::to_string),
            etag: head.e_tag().map(str::to_string),
            last_modified: head.last_modified().and_then(to_chrono),
            custom: head.metadata().cloned().unwrap_or_default(),
        })
    }

    async fn update_metadata(
        &self,
        key: &str,
        metadata: HashMap<String, String>,
    ) -> StorageResult<ObjectMetadata> {
        // S3 metadata is immutable; rewrite the object onto itself.
        let current = self.get_metadata(key).await?;

        self.client
            .copy_object()
            .bucket(&self.bucket)
            .copy_source(self.copy_source(key))
            .key(key)
            .metadata_directive(MetadataDirective::Replace)
            .set_content_type(current.content_type)
            .set_metadata(Some(metadata))
            .send()
            .await
            .map_err(|e| StorageError::BackendError(e.to_string()))?;

        tracing::info!(bucket = %self.bucket, key = %key, "S3 metadata updated");

        self.get_metadata(key).await
    }

    async fn move_object(&self, from_key: &str, to_key: &str) -> StorageResult<StoredObject> {
        let stored = self.copy(from_key, to_key).await?;
        self.delete(from_key).await?;
        Ok(stored)
    }

    async fn copy(&self, from_key: &str, to_key: &str) -> StorageResult<StoredObject> {
        validate_key(to_key)?;
        let start = std::time::Instant::now();

        self.client
            .copy_object()
            .bucket(&self.bucket)
            .copy_source(self.copy_source(from_key))
            .key(to_key)
            .send()
            .await
            .map_err(|e| match &e {
                SdkError::ServiceError(service_err)
                    if service_err.raw().status().as_u16() == 404 =>
                {
                    StorageError::NotFound(from_key.to_string())
                }
                _ => StorageError::BackendError(e.to_string()),
            })?;

        let size = self.get_metadata(to_key).await?.size;

        tracing::info!(
            from_key = %from_key,
            to_key = %to_key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 copy successful"
        );

        Ok(StoredObject {
            key: to_key.to_string(),
            url: self.generate_url(to_key),
            size,
        })
    }

    async fn initiate_multipart_upload(
        &self,
        key: &str,
        options: &UploadOptions,
    ) -> StorageResult<String> {
        validate_key(key)?;

        let created = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .set_content_type(options.content_type.clone())
            .set_metadata(non_empty_map(&options.metadata))
            .send()
            .await
            .map_err(|e| {
                tracing::error!(
                    error = %e,
                    bucket = %self.bucket,
                    key = %key,
                    "Failed to create multipart upload"
                );
                StorageError::MultipartFailed(e.to_string())
            })?;

        let upload_id = created
            .upload_id()
            .ok_or_else(|| {
                StorageError::MultipartFailed("No upload ID returned from S3".to_string())
            })?
            .to_string();

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            upload_id = %upload_id,
            "S3 multipart upload initiated"
        );

        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
    ) -> StorageResult<CompletedPart> {
        let size = data.len();
        let start = std::time::Instant::now();

        let result = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(S3Body::from(data))
            .send()
            .await
            .map_err(|e| {
                tracing::error!(
                    error = %e,
                    bucket = %self.bucket,
                    key = %key,
                    part_number,
                    "Failed to upload part"
                );
                StorageError::MultipartFailed(e.to_string())
            })?;

        let etag = result
            .e_tag()
            .ok_or_else(|| {
                StorageError::MultipartFailed(format!("No ETag returned for part {}", part_number))
            })?
            .to_string();

        tracing::debug!(
            bucket = %self.bucket,
            key = %key,
            part_number,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 part uploaded"
        );

        Ok(CompletedPart { part_number, etag })
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> StorageResult<StoredObject> {
        if parts.is_empty() {
            return Err(StorageError::MultipartFailed(
                "No parts to assemble".to_string(),
            ));
        }
        let start = std::time::Instant::now();

        let mut ordered = parts.to_vec();
        ordered.sort_by_key(|p| p.part_number);
        let s3_parts = ordered
            .iter()
            .map(|p| {
                S3CompletedPart::builder()
                    .part_number(p.part_number)
                    .e_tag(&p.etag)
                    .build()
            })
            .collect::<Vec<_>>();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(s3_parts))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| {
                tracing::error!(
                    error = %e,
                    bucket = %self.bucket,
                    key = %key,
                    upload_id = %upload_id,
                    "Failed to complete multipart upload"
                );
                StorageError::MultipartFailed(e.to_string())
            })?;

        let size = self.get_metadata(key).await?.size;

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            upload_id = %upload_id,
            parts = ordered.len(),
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 multipart upload completed"
        );

        Ok(StoredObject {
            key: key.to_string(),
            url: self.generate_url(key),
            size,
        })
    }

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> StorageResult<()> {
        match self
            .client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
        {
            Ok(_) => {}
            Err(SdkError::ServiceError(service_err))
                if matches!(
                    service_err.err(),
                    AbortMultipartUploadError::NoSuchUpload(_)
                ) => {}
            Err(e) => return Err(StorageError::MultipartFailed(e.to_string())),
        }

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            upload_id = %upload_id,
            "S3 multipart upload aborted"
        );

        Ok(())
    }

    fn object_url(&self, key: &str) -> String {
        self.generate_url(key)
    }

    fn base_path(&self) -> String {
        format!("s3://{}", self.bucket)
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::S3
    }
}
