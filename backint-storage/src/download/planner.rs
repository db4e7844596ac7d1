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

use crate::storage::ObjectStats;
use crate::{StorageErrorKind, StorageResult};

/// One planned slice of an object download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartSpec {
    /// 1-based part number, strictly increasing within a plan.
    pub part_number: u64,
    /// Total number of parts of the plan this part belongs to.
    pub num_parts: u64,
    /// First byte of the part.
    pub start: i64,
    /// Last byte of the part, inclusive.
    pub end: i64,
}

impl PartSpec {
    /// Range selector for the ranged GET, in the store's observed wire
    /// convention (`bytes <start>-<end>`, inclusive).
    pub fn byte_range(&self) -> String {
        format!("bytes {}-{}", self.start, self.end)
    }

    pub fn num_bytes(&self) -> u64 {
        (self.end - self.start + 1).max(0) as u64
    }
}

/// Ordered sequence of parts covering the whole object.
///
/// The part count is the one the server reported at upload time; the part
/// size is the object size divided by that count, rounded up, with the last
/// part truncated at the end of the object.
#[derive(Debug, Clone)]
pub struct DownloadPlan {
    pub num_bytes: u64,
    pub parts: Vec<PartSpec>,
}

impl DownloadPlan {
    pub fn for_object(stats: ObjectStats) -> StorageResult<DownloadPlan> {
        if stats.parts_count == 0 {
            return Err(StorageErrorKind::Planning.with_error(anyhow::anyhow!(
                "the server reported a part count of 0"
            )));
        }
        let num_parts = stats.parts_count;
        let part_num_bytes = stats.num_bytes.div_ceil(num_parts);
        let mut parts = Vec::with_capacity(num_parts as usize);
        for part_idx in 0..num_parts {
            let start = (part_idx * part_num_bytes) as i64;
            let end = (start + part_num_bytes as i64 - 1).min(stats.num_bytes as i64 - 1);
            if stats.num_bytes > 0 && start as u64 > stats.num_bytes - 1 {
                return Err(StorageErrorKind::Planning.with_error(anyhow::anyhow!(
                    "part count {} is inconsistent with object size {}",
                    num_parts,
                    stats.num_bytes
                )));
            }
            parts.push(PartSpec {
                part_number: part_idx + 1,
                num_parts,
                start,
                end,
            });
        }
        Ok(DownloadPlan {
            num_bytes: stats.num_bytes,
            parts,
        })
    }

    pub fn num_parts(&self) -> u64 {
        self.parts.len() as u64
    }
}
