// Copyright (C) 2024 Quickwit, Inc.
//
// Quickwit is offered under the AGPL v3.0 and as commercial software.
// For commercial licensing, contact us at hello@quickwit.io.
//
// AGPL:
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as
// published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <http://www.gnu.org/licenses/>.

use std::fmt;
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use aws_config::retry::RetryConfig;
use aws_config::timeout::TimeoutConfig;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{BehaviorVersion, Region};
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::operation::head_object::HeadObjectError;
use aws_sdk_s3::primitives::{ByteStream, DateTime};
use aws_sdk_s3::types::{
    BucketVersioningStatus, CompletedMultipartUpload, CompletedPart, ObjectLockLegalHoldStatus,
    ObjectLockMode,
};
use aws_sdk_s3::Client;
use backint_common::io::CountingReader;
use backint_config::{BackintConfig, LegalHoldStatus, RetentionMode};
use bytes::Bytes;
use chrono::Utc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::download::planner::PartSpec;
use crate::storage::{ObjectStats, ObjectSummary, Storage, UploadReport};
use crate::{StorageError, StorageErrorKind, StorageResult};

/// Metadata entry recording whether the payload was compressed on upload.
const COMPRESSION_METADATA_LABEL: &str = "compression";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(60);
const READ_TIMEOUT: Duration = Duration::from_secs(50);
const MAX_RETRY_ATTEMPTS: u32 = 5;

/// S3 compatible object storage implementation.
///
/// Credentials are resolved once, when the client is built; every request
/// inherits the client's retry policy and timeouts.
pub struct S3CompatibleObjectStorage {
    s3_client: Client,
    bucket: String,
    config: BackintConfig,
}

impl fmt::Debug for S3CompatibleObjectStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S3CompatibleObjectStorage(bucket={})", &self.bucket)
    }
}

fn create_s3_client(config: &BackintConfig) -> Client {
    let credentials = Credentials::new(
        config.apikey.clone(),
        config.apikey.clone(),
        None,
        None,
        "backint-parameter-file",
    );
    let timeout_config = TimeoutConfig::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .read_timeout(READ_TIMEOUT)
        .build();
    let s3_config = aws_sdk_s3::Config::builder()
        .behavior_version(BehaviorVersion::latest())
        .region(Region::new(config.region.clone()))
        .endpoint_url(config.endpoint_url.clone())
        .credentials_provider(credentials)
        .retry_config(RetryConfig::standard().with_max_attempts(MAX_RETRY_ATTEMPTS))
        .timeout_config(timeout_config)
        .force_path_style(true)
        .build();
    Client::from_conf(s3_config)
}

impl S3CompatibleObjectStorage {
    /// Creates an object storage for the bucket named in the configuration.
    pub fn new(config: &BackintConfig) -> S3CompatibleObjectStorage {
        let s3_client = create_s3_client(config);
        S3CompatibleObjectStorage {
            s3_client,
            bucket: config.bucket.clone(),
            config: config.clone(),
        }
    }

    fn object_lock_attributes(
        &self,
    ) -> (ObjectLockLegalHoldStatus, Option<ObjectLockMode>, Option<DateTime>) {
        let legal_hold = match self.config.object_lock_legal_hold_status {
            LegalHoldStatus::On => ObjectLockLegalHoldStatus::On,
            LegalHoldStatus::Off => ObjectLockLegalHoldStatus::Off,
        };
        if self.config.object_lock_retention_mode != RetentionMode::Compliance {
            return (legal_hold, None, None);
        }
        let retain_until = self
            .config
            .lock_retain_until(Utc::now())
            .map(|date| DateTime::from_secs(date.timestamp()));
        (legal_hold, Some(ObjectLockMode::Compliance), retain_until)
    }

    async fn put_single_part(&self, key: &str, payload: Vec<u8>) -> StorageResult<String> {
        debug!(key, num_bytes = payload.len(), "uploading object in a single part");
        let (legal_hold, lock_mode, retain_until) = self.object_lock_attributes();
        let put_object_output = self
            .s3_client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(payload))
            .object_lock_legal_hold_status(legal_hold)
            .set_object_lock_mode(lock_mode)
            .set_object_lock_retain_until_date(retain_until)
            .set_tagging(self.config.tagging())
            .metadata(COMPRESSION_METADATA_LABEL, "false")
            .send()
            .await
            .map_err(|sdk_err| StorageErrorKind::Transport.with_error(sdk_err))?;
        Ok(trim_etag(put_object_output.e_tag()))
    }

    async fn create_multipart_upload(&self, key: &str) -> StorageResult<String> {
        let (legal_hold, lock_mode, retain_until) = self.object_lock_attributes();
        let create_upload_output = self
            .s3_client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .object_lock_legal_hold_status(legal_hold)
            .set_object_lock_mode(lock_mode)
            .set_object_lock_retain_until_date(retain_until)
            .set_tagging(self.config.tagging())
            .metadata(COMPRESSION_METADATA_LABEL, "false")
            .send()
            .await
            .map_err(|sdk_err| StorageErrorKind::Transport.with_error(sdk_err))?;
        let upload_id = create_upload_output.upload_id().ok_or_else(|| {
            StorageErrorKind::Transport
                .with_error(anyhow::anyhow!("the returned multipart upload id was null"))
        })?;
        Ok(upload_id.to_string())
    }

    async fn put_multi_part(
        &self,
        key: &str,
        reader: &mut (dyn AsyncRead + Send + Unpin),
        first_part: Vec<u8>,
    ) -> StorageResult<String> {
        let upload_id = self.create_multipart_upload(key).await?;
        match self.upload_parts(key, &upload_id, reader, first_part).await {
            Ok(e_tag) => Ok(e_tag),
            Err(upload_error) => {
                if let Err(abort_error) = self.abort_multipart_upload(key, &upload_id).await {
                    warn!(
                        key = %key,
                        error = %abort_error,
                        "failed to abort multipart upload"
                    );
                }
                Err(upload_error)
            }
        }
    }

    async fn upload_parts(
        &self,
        key: &str,
        upload_id: &str,
        reader: &mut (dyn AsyncRead + Send + Unpin),
        first_part: Vec<u8>,
    ) -> StorageResult<String> {
        let part_num_bytes = (self.config.multipart_chunksize as usize).max(1);
        let upload_permits = Arc::new(Semaphore::new(self.config.max_concurrency));
        let mut upload_handles: Vec<JoinHandle<StorageResult<CompletedPart>>> = Vec::new();
        let mut current_part = first_part;
        let mut part_number: i32 = 0;
        let mut read_error: Option<StorageError> = None;

        loop {
            part_number += 1;
            // Waiting for a permit before spawning keeps at most
            // `max_concurrency` part buffers alive at any time.
            let permit = upload_permits
                .clone()
                .acquire_owned()
                .await
                .map_err(|acquire_err| StorageErrorKind::Internal.with_error(acquire_err))?;
            let payload = std::mem::take(&mut current_part);
            let s3_client = self.s3_client.clone();
            let bucket = self.bucket.clone();
            let key = key.to_string();
            let upload_id = upload_id.to_string();
            upload_handles.push(tokio::spawn(async move {
                let _permit = permit;
                debug!(
                    key = %key,
                    part_number,
                    num_bytes = payload.len(),
                    "uploading part"
                );
                let upload_part_output = s3_client
                    .upload_part()
                    .bucket(&bucket)
                    .key(&key)
                    .upload_id(&upload_id)
                    .part_number(part_number)
                    .body(ByteStream::from(payload))
                    .send()
                    .await
                    .map_err(|sdk_err| {
                        StorageErrorKind::Transport
                            .with_error(sdk_err)
                            .add_context(format!("failed to upload part {part_number}"))
                    })?;
                Ok(CompletedPart::builder()
                    .set_e_tag(upload_part_output.e_tag().map(str::to_string))
                    .part_number(part_number)
                    .build())
            }));

            match read_part(reader, part_num_bytes).await {
                Ok(next_part) if next_part.is_empty() => break,
                Ok(next_part) => current_part = next_part,
                Err(io_err) => {
                    read_error = Some(
                        StorageErrorKind::Io
                            .with_error(io_err)
                            .add_context("failed to read from the source pipe"),
                    );
                    break;
                }
            }
        }

        let mut completed_parts = Vec::with_capacity(upload_handles.len());
        let mut first_upload_error: Option<StorageError> = None;
        for upload_handle in upload_handles {
            match upload_handle.await {
                Ok(Ok(completed_part)) => completed_parts.push(completed_part),
                Ok(Err(part_error)) => {
                    if first_upload_error.is_none() {
                        first_upload_error = Some(part_error);
                    }
                }
                Err(join_error) => {
                    if first_upload_error.is_none() {
                        first_upload_error =
                            Some(StorageErrorKind::Internal.with_error(join_error));
                    }
                }
            }
        }
        if let Some(upload_error) = read_error.or(first_upload_error) {
            return Err(upload_error);
        }

        completed_parts.sort_by_key(|completed_part| completed_part.part_number());
        let completed_upload = CompletedMultipartUpload::builder()
            .set_parts(Some(completed_parts))
            .build();
        let complete_upload_output = self
            .s3_client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(completed_upload)
            .send()
            .await
            .map_err(|sdk_err| StorageErrorKind::Transport.with_error(sdk_err))?;
        Ok(trim_etag(complete_upload_output.e_tag()))
    }

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> StorageResult<()> {
        self.s3_client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|sdk_err| StorageErrorKind::Transport.with_error(sdk_err))?;
        Ok(())
    }
}

#[async_trait]
impl Storage for S3CompatibleObjectStorage {
    async fn head_object(&self, key: &str) -> StorageResult<ObjectStats> {
        debug!(key, "requesting object head");
        let head_res = self
            .s3_client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;
        let head = match head_res {
            Ok(head) => head,
            Err(sdk_err) => {
                if let SdkError::ServiceError(ref service_err) = sdk_err {
                    if matches!(service_err.err(), HeadObjectError::NotFound(_)) {
                        return Err(StorageErrorKind::NotFound
                            .with_error(anyhow::anyhow!("object `{key}` does not exist")));
                    }
                }
                return Err(StorageErrorKind::Transport.with_error(sdk_err));
            }
        };
        let num_bytes = head.content_length().unwrap_or(0).max(0) as u64;
        let parts_count = match head.parts_count() {
            Some(parts_count) if parts_count > 0 => parts_count as u64,
            _ => 1,
        };
        debug!(key, num_bytes, parts_count, "received object head");
        Ok(ObjectStats {
            num_bytes,
            parts_count,
        })
    }

    async fn get_part(&self, key: &str, part: &PartSpec) -> StorageResult<Bytes> {
        let get_object_output = self
            .s3_client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .part_number(part.part_number as i32)
            .range(part.byte_range())
            .send()
            .await
            .map_err(|sdk_err| StorageErrorKind::Transport.with_error(sdk_err))?;
        let aggregated_body = get_object_output
            .body
            .collect()
            .await
            .map_err(|byte_stream_err| {
                StorageErrorKind::Transport
                    .with_error(byte_stream_err)
                    .add_context(format!(
                        "failed to drain the body of part {}",
                        part.part_number
                    ))
            })?;
        Ok(aggregated_body.into_bytes())
    }

    async fn upload_pipe(&self, source: &Path, key: &str) -> StorageResult<UploadReport> {
        info!(source = %source.display(), key, "uploading data from pipe");
        let pipe = tokio::fs::File::open(source).await.map_err(|io_err| {
            StorageErrorKind::PipeOpen.with_error(io_err).add_context(format!(
                "failed to open pipe `{}` for reading",
                source.display()
            ))
        })?;
        let mut reader = CountingReader::new(pipe);
        let counter = reader.counter();

        let part_num_bytes = (self.config.multipart_chunksize as usize).max(1);
        let first_part = read_part(&mut reader, part_num_bytes).await.map_err(|io_err| {
            StorageErrorKind::Io
                .with_error(io_err)
                .add_context("failed to read from the source pipe")
        })?;
        let e_tag = if first_part.len() < part_num_bytes {
            self.put_single_part(key, first_part).await?
        } else {
            self.put_multi_part(key, &mut reader, first_part).await?
        };

        let source_num_bytes = counter.load(Ordering::Relaxed);
        let stats = self.head_object(key).await?;
        info!(
            source = %source.display(),
            key,
            source_num_bytes,
            target_num_bytes = stats.num_bytes,
            "successfully uploaded object"
        );
        Ok(UploadReport {
            e_tag,
            source_num_bytes,
            target_num_bytes: stats.num_bytes,
        })
    }

    async fn latest_version_etag(&self, key: &str) -> StorageResult<Option<String>> {
        info!(key, "resolving the latest object version");
        let list_versions_output = self
            .s3_client
            .list_object_versions()
            .bucket(&self.bucket)
            .prefix(key)
            .send()
            .await
            .map_err(|sdk_err| StorageErrorKind::Transport.with_error(sdk_err))?;
        for version in list_versions_output.versions() {
            if version.key() == Some(key) && version.is_latest() == Some(true) {
                let e_tag = version.e_tag().unwrap_or_default().replace('"', "");
                info!(key, e_tag = %e_tag, "resolved the latest version");
                return Ok(Some(e_tag));
            }
        }
        info!(key, "no version found");
        Ok(None)
    }

    async fn list_objects(&self) -> StorageResult<Vec<ObjectSummary>> {
        let mut object_summaries = Vec::new();
        let mut continuation_token: Option<String> = None;
        loop {
            let list_output = self
                .s3_client
                .list_objects_v2()
                .bucket(&self.bucket)
                .set_continuation_token(continuation_token.take())
                .send()
                .await
                .map_err(|sdk_err| StorageErrorKind::Transport.with_error(sdk_err))?;
            for object in list_output.contents() {
                object_summaries.push(ObjectSummary {
                    key: object.key().unwrap_or_default().to_string(),
                    e_tag: object.e_tag().unwrap_or_default().replace('"', ""),
                });
            }
            if list_output.is_truncated() == Some(true) {
                continuation_token = list_output.next_continuation_token().map(str::to_string);
            } else {
                break;
            }
        }
        Ok(object_summaries)
    }

    async fn delete_object(&self, key: &str) -> StorageResult<()> {
        self.s3_client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|sdk_err| StorageErrorKind::Transport.with_error(sdk_err))?;
        Ok(())
    }

    async fn bucket_exists(&self) -> StorageResult<bool> {
        debug!(bucket = %self.bucket, "checking bucket existence");
        match self.s3_client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => Ok(true),
            Err(sdk_err) => {
                if let SdkError::ServiceError(ref service_err) = sdk_err {
                    if service_err.err().is_not_found() {
                        return Ok(false);
                    }
                }
                Err(StorageErrorKind::Transport.with_error(sdk_err))
            }
        }
    }

    async fn bucket_versioning_enabled(&self) -> StorageResult<bool> {
        let versioning_output = self
            .s3_client
            .get_bucket_versioning()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|sdk_err| StorageErrorKind::Transport.with_error(sdk_err))?;
        Ok(matches!(
            versioning_output.status(),
            Some(BucketVersioningStatus::Enabled)
        ))
    }
}

/// Reads up to `part_num_bytes` from `reader`, stopping early only at EOF.
async fn read_part(
    reader: &mut (dyn AsyncRead + Send + Unpin),
    part_num_bytes: usize,
) -> std::io::Result<Vec<u8>> {
    let mut part_buffer = vec![0u8; part_num_bytes];
    let mut num_filled = 0;
    while num_filled < part_num_bytes {
        let num_read = reader.read(&mut part_buffer[num_filled..]).await?;
        if num_read == 0 {
            break;
        }
        num_filled += num_read;
    }
    part_buffer.truncate(num_filled);
    Ok(part_buffer)
}

fn trim_etag(e_tag: Option<&str>) -> String {
    e_tag.unwrap_or_default().replace('"', "")
}

#[cfg(test)]
mod tests {
    use super::{read_part, trim_etag};

    #[tokio::test]
    async fn test_read_part_fills_whole_parts() {
        let mut reader = std::io::Cursor::new(b"abcdefghij".to_vec());
        assert_eq!(read_part(&mut reader, 4).await.unwrap(), b"abcd");
        assert_eq!(read_part(&mut reader, 4).await.unwrap(), b"efgh");
        assert_eq!(read_part(&mut reader, 4).await.unwrap(), b"ij");
        assert!(read_part(&mut reader, 4).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_read_part_empty_source() {
        let mut reader = std::io::Cursor::new(Vec::new());
        assert!(read_part(&mut reader, 8).await.unwrap().is_empty());
    }

    #[test]
    fn test_trim_etag() {
        assert_eq!(trim_etag(Some("\"0cc175b9c0f1b6a8\"")), "0cc175b9c0f1b6a8");
        assert_eq!(trim_etag(Some("0cc175b9c0f1b6a8")), "0cc175b9c0f1b6a8");
        assert_eq!(trim_etag(None), "");
    }
}
