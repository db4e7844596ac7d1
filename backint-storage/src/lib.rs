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

//! `backint-storage` interfaces the backint tool with the S3 compatible
//! object store and implements both streaming data paths:
//!
//! - restore: ranged part downloads under bounded concurrency, reordered
//!   into a strictly sequential named-pipe write;
//! - backup: sequential reads from a named pipe feeding a concurrent
//!   multipart upload.

pub mod download;
mod error;
mod object_storage;
mod storage;

pub use self::download::{download_object, DownloadReport, DownloadSettings};
pub use self::error::{StorageError, StorageErrorKind, StorageResult};
pub use self::object_storage::S3CompatibleObjectStorage;
#[cfg(any(test, feature = "testsuite"))]
pub use self::storage::MockStorage;
pub use self::storage::{ObjectStats, ObjectSummary, Storage, UploadReport};
