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

use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;

use crate::download::planner::PartSpec;
use crate::StorageResult;

/// Size and layout facts the store reports for one object.
#[derive(Debug, Clone, Copy)]
pub struct ObjectStats {
    pub num_bytes: u64,
    /// Number of segments used when the object was uploaded.
    pub parts_count: u64,
}

/// One object of the bucket listing. The entity tag is stored unquoted.
#[derive(Debug, Clone)]
pub struct ObjectSummary {
    pub key: String,
    pub e_tag: String,
}

/// Outcome of a completed upload.
#[derive(Debug, Clone)]
pub struct UploadReport {
    pub e_tag: String,
    /// Bytes pulled from the source pipe.
    pub source_num_bytes: u64,
    /// Server-side size of the created object.
    pub target_num_bytes: u64,
}

/// The object store operations the backint functions need.
#[cfg_attr(any(test, feature = "testsuite"), mockall::automock)]
#[async_trait]
pub trait Storage: Send + Sync + 'static {
    /// Size and part count of the object `key`.
    async fn head_object(&self, key: &str) -> StorageResult<ObjectStats>;

    /// Fetches one planned part with a ranged GET and drains its body.
    async fn get_part(&self, key: &str, part: &PartSpec) -> StorageResult<Bytes>;

    /// Streams the content of the named pipe at `source` into the object
    /// `key`, uploading parts concurrently.
    async fn upload_pipe(&self, source: &Path, key: &str) -> StorageResult<UploadReport>;

    /// Entity tag of the latest version of `key`, `None` when no version
    /// exists.
    async fn latest_version_etag(&self, key: &str) -> StorageResult<Option<String>>;

    /// Every object of the bucket.
    async fn list_objects(&self) -> StorageResult<Vec<ObjectSummary>>;

    async fn delete_object(&self, key: &str) -> StorageResult<()>;

    async fn bucket_exists(&self) -> StorageResult<bool>;

    async fn bucket_versioning_enabled(&self) -> StorageResult<bool>;
}
