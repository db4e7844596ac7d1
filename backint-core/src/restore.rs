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

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use backint_storage::{download_object, DownloadSettings, Storage, StorageErrorKind};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::results::ResultLog;
use crate::{object_key_for_path, AppContext};

struct RestoreItem {
    /// Entity tag from the work list; resolved to the latest version when
    /// absent.
    e_tag: Option<String>,
    key: String,
    destination: PathBuf,
}

enum RestoreOutcome {
    Restored {
        e_tag: String,
        destination: String,
    },
    NotFound {
        destination: String,
    },
    Failed {
        destination: String,
        message: String,
    },
}

/// Restores every object of the work list into its destination FIFO.
///
/// Requests fan out concurrently, one task per request, each with its own
/// reorder buffer and pipe; the ranged part fetches of all requests share a
/// single semaphore of `max_concurrency` permits. No ordering is preserved
/// across requests.
pub async fn restore(
    ctx: &AppContext,
    storage: Arc<dyn Storage>,
    result_log: &mut ResultLog,
) -> bool {
    let Some(restore_items) = restore_items_from_input(ctx) else {
        error!("wrong keyword(s) in input file");
        return false;
    };
    let part_permits = Arc::new(Semaphore::new(ctx.config.max_concurrency));
    let settings = DownloadSettings {
        portion_delay: Duration::from_micros(ctx.config.timeout_microsecond),
    };

    let mut restore_tasks = JoinSet::new();
    for (request_idx, restore_item) in restore_items.into_iter().enumerate() {
        info!(
            key = %restore_item.key,
            request_idx,
            "restoring backup"
        );
        let storage = storage.clone();
        let part_permits = part_permits.clone();
        restore_tasks.spawn(async move {
            restore_single_object(storage, restore_item, part_permits, settings).await
        });
    }

    let mut success = true;
    while let Some(join_res) = restore_tasks.join_next().await {
        let outcome = match join_res {
            Ok(outcome) => outcome,
            Err(join_error) => {
                error!(error = %join_error, "restore task aborted");
                success = false;
                continue;
            }
        };
        match outcome {
            RestoreOutcome::Restored { e_tag, destination } => {
                result_log.add_restore_success(&e_tag, &destination);
            }
            RestoreOutcome::NotFound { destination } => {
                result_log.add_not_found(&[&destination]);
                success = false;
            }
            RestoreOutcome::Failed {
                destination,
                message,
            } => {
                result_log.add_error(&destination, &message);
                success = false;
            }
        }
    }
    info!("restore: all processes finished");
    success
}

fn restore_items_from_input(ctx: &AppContext) -> Option<Vec<RestoreItem>> {
    let mut restore_items = Vec::new();
    for entry in &ctx.input {
        let fields: Vec<&str> = entry.parameter.split_whitespace().collect();
        let (e_tag, source_path, destination) = match entry.keyword.as_str() {
            "EBID" => {
                if fields.len() < 2 {
                    return None;
                }
                let source_path = fields[1];
                let destination = fields.get(2).copied().unwrap_or(source_path);
                (Some(fields[0].to_string()), source_path, destination)
            }
            "NULL" => {
                let source_path = *fields.first()?;
                let destination = fields.get(1).copied().unwrap_or(source_path);
                (None, source_path, destination)
            }
            _ => return None,
        };
        let key = object_key_for_path(&ctx.config, source_path);
        info!(key = %key, destination, "mapped restore source to object key");
        restore_items.push(RestoreItem {
            e_tag,
            key,
            destination: PathBuf::from(destination),
        });
    }
    Some(restore_items)
}

async fn restore_single_object(
    storage: Arc<dyn Storage>,
    restore_item: RestoreItem,
    part_permits: Arc<Semaphore>,
    settings: DownloadSettings,
) -> RestoreOutcome {
    let destination = restore_item.destination.display().to_string();

    // Resolve the entity tag to the latest version when the work list left
    // it open. Without any version, the FIFO is never opened.
    let e_tag = match restore_item.e_tag {
        Some(e_tag) => e_tag,
        None => match storage.latest_version_etag(&restore_item.key).await {
            Ok(Some(e_tag)) => e_tag,
            Ok(None) => return RestoreOutcome::NotFound { destination },
            Err(resolve_error) if resolve_error.kind() == StorageErrorKind::NotFound => {
                return RestoreOutcome::NotFound { destination };
            }
            Err(resolve_error) => {
                return RestoreOutcome::Failed {
                    destination,
                    message: resolve_error.to_string(),
                };
            }
        },
    };

    match download_object(
        storage,
        &restore_item.key,
        &restore_item.destination,
        part_permits,
        settings,
    )
    .await
    {
        Ok(download_report) => {
            info!(
                key = %restore_item.key,
                num_bytes = download_report.downloaded_num_bytes,
                elapsed_secs = download_report.elapsed.as_secs_f64(),
                "finished restoring object"
            );
            RestoreOutcome::Restored {
                e_tag,
                destination,
            }
        }
        Err(restore_error) if restore_error.kind() == StorageErrorKind::NotFound => {
            RestoreOutcome::NotFound { destination }
        }
        Err(restore_error) => RestoreOutcome::Failed {
            destination,
            message: restore_error.to_string(),
        },
    }
}
