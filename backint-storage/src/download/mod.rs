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

pub mod ordered_pipe;
pub mod planner;

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use backint_common::pipe::PipeWriter;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, error, info};

use self::ordered_pipe::OrderedPipeWriter;
use self::planner::{DownloadPlan, PartSpec};
use crate::storage::Storage;
use crate::{StorageError, StorageErrorKind, StorageResult};

/// Tuning knobs of the restore data path.
#[derive(Debug, Clone, Copy)]
pub struct DownloadSettings {
    /// Pause between successive pipe portion writes, pacing a slow reader.
    pub portion_delay: Duration,
}

/// Outcome of restoring one object into its FIFO.
#[derive(Debug)]
pub struct DownloadReport {
    /// Server-side size of the object.
    pub source_num_bytes: u64,
    /// Bytes fetched by the part workers.
    pub downloaded_num_bytes: u64,
    /// Wall time from planning until the worker pool drained.
    pub elapsed: Duration,
}

struct PartResult {
    part_number: u64,
    outcome: StorageResult<u64>,
}

/// Downloads the object `key` into the FIFO at `destination`.
///
/// The planned parts are fetched concurrently, every fetch gated by
/// `part_permits`, and written to the FIFO in strict part order. The result
/// channel is drained until every worker has reported, so the pool is fully
/// joined on both the success and the failure path; the first part error is
/// surfaced as the object's error.
pub async fn download_object(
    storage: Arc<dyn Storage>,
    key: &str,
    destination: &Path,
    part_permits: Arc<Semaphore>,
    settings: DownloadSettings,
) -> StorageResult<DownloadReport> {
    let stats = storage.head_object(key).await?;
    let plan = DownloadPlan::for_object(stats)?;
    let num_parts = plan.num_parts();
    info!(
        key,
        num_parts,
        num_bytes = stats.num_bytes,
        "starting download"
    );
    let start = Instant::now();

    let pipe = PipeWriter::open(destination, settings.portion_delay)
        .await
        .map_err(|io_err| {
            StorageErrorKind::PipeOpen.with_error(io_err).add_context(format!(
                "failed to open pipe `{}` for writing",
                destination.display()
            ))
        })?;
    let writer = Arc::new(OrderedPipeWriter::new(pipe, num_parts));

    let (part_result_tx, mut part_result_rx) =
        mpsc::channel::<PartResult>(num_parts.max(1) as usize);
    let mut worker_handles = Vec::with_capacity(plan.parts.len());
    for part in plan.parts {
        let storage = storage.clone();
        let writer = writer.clone();
        let part_permits = part_permits.clone();
        let part_result_tx = part_result_tx.clone();
        let key = key.to_string();
        worker_handles.push(tokio::spawn(async move {
            let part_number = part.part_number;
            let outcome =
                download_single_part(&*storage, &key, part, &writer, &part_permits).await;
            let _ = part_result_tx
                .send(PartResult {
                    part_number,
                    outcome,
                })
                .await;
        }));
    }
    // The closer owns the last sender: once it has joined every worker the
    // channel closes and the drain loop below terminates.
    tokio::spawn(async move {
        for worker_handle in worker_handles {
            let _ = worker_handle.await;
        }
        drop(part_result_tx);
    });

    let mut downloaded_num_bytes = 0u64;
    let mut first_error: Option<StorageError> = None;
    while let Some(part_result) = part_result_rx.recv().await {
        match part_result.outcome {
            Ok(part_num_bytes) => downloaded_num_bytes += part_num_bytes,
            Err(part_error) => {
                error!(
                    key,
                    part_number = part_result.part_number,
                    error = %part_error,
                    "part download failed"
                );
                if first_error.is_none() {
                    first_error = Some(part_error);
                }
            }
        }
    }
    let elapsed = start.elapsed();

    if let Some(restore_error) = first_error {
        return Err(restore_error);
    }
    info!(
        key,
        downloaded_num_bytes,
        elapsed_secs = elapsed.as_secs_f64(),
        "finished download"
    );
    Ok(DownloadReport {
        source_num_bytes: stats.num_bytes,
        downloaded_num_bytes,
        elapsed,
    })
}

async fn download_single_part(
    storage: &dyn Storage,
    key: &str,
    part: PartSpec,
    writer: &OrderedPipeWriter,
    part_permits: &Semaphore,
) -> StorageResult<u64> {
    let payload = {
        let _permit = part_permits
            .acquire()
            .await
            .map_err(|acquire_err| StorageErrorKind::Internal.with_error(acquire_err))?;
        debug!(
            key,
            part_number = part.part_number,
            num_parts = part.num_parts,
            "downloading part"
        );
        storage.get_part(key, &part).await.map_err(|get_err| {
            get_err.add_context(format!("failed to download part {}", part.part_number))
        })?
    };
    let part_num_bytes = payload.len() as u64;
    writer.submit(part.part_number, payload).await?;
    Ok(part_num_bytes)
}
