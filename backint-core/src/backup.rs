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
use std::sync::Arc;
use std::time::Instant;

use backint_storage::Storage;
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::results::ResultLog;
use crate::{object_key_for_path, AppContext};

/// Uploads the content of every `#PIPE` source of the work list, one
/// concurrent upload task per pipe.
pub async fn backup(
    ctx: &AppContext,
    storage: Arc<dyn Storage>,
    result_log: &mut ResultLog,
) -> bool {
    let source_paths: Vec<String> = ctx
        .input
        .iter()
        .filter(|entry| entry.keyword == "PIPE")
        .map(|entry| entry.parameter.clone())
        .collect();
    if source_paths.is_empty() {
        info!("no source paths specified in the input file");
        return true;
    }

    let mut upload_tasks = JoinSet::new();
    for (request_idx, source_path) in source_paths.into_iter().enumerate() {
        let key = object_key_for_path(&ctx.config, &source_path);
        info!(
            source_path = %source_path,
            key = %key,
            request_idx,
            "storing pipe content"
        );
        let storage = storage.clone();
        upload_tasks.spawn(async move {
            let start = Instant::now();
            let upload_res = storage.upload_pipe(Path::new(&source_path), &key).await;
            (source_path, upload_res, start.elapsed())
        });
    }

    let mut success = true;
    while let Some(join_res) = upload_tasks.join_next().await {
        match join_res {
            Ok((source_path, Ok(upload_report), elapsed)) => {
                result_log.add_backup_success(
                    &upload_report.e_tag,
                    &source_path,
                    upload_report.source_num_bytes,
                );
                result_log.add_backup_metrics(
                    upload_report.source_num_bytes,
                    upload_report.target_num_bytes,
                    elapsed.as_secs_f64(),
                );
                if upload_report.target_num_bytes != upload_report.source_num_bytes {
                    result_log.add_backup_compressed_info(
                        upload_report.source_num_bytes,
                        upload_report.target_num_bytes,
                    );
                }
            }
            Ok((source_path, Err(upload_error), _elapsed)) => {
                error!(
                    source_path = %source_path,
                    error = %upload_error,
                    "error uploading from pipe"
                );
                result_log.add_error(&source_path, &upload_error.to_string());
                success = false;
            }
            Err(join_error) => {
                error!(error = %join_error, "upload task aborted");
                success = false;
            }
        }
    }
    info!("backup: all processes finished");
    success
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use backint_storage::{MockStorage, StorageErrorKind, UploadReport};

    use super::backup;
    use crate::results::ResultLog;
    use crate::test_helpers::test_ctx;

    #[tokio::test]
    async fn test_backup_reports_saved_objects_with_metrics() {
        let ctx = test_ctx(vec![("PIPE", "/hana/backup/data_pipe")]);
        let mut mock_storage = MockStorage::new();
        mock_storage
            .expect_upload_pipe()
            .times(1)
            .returning(|_source, _key| {
                Ok(UploadReport {
                    e_tag: "0cc175b9".to_string(),
                    source_num_bytes: 2048,
                    target_num_bytes: 2048,
                })
            });

        let mut result_log = ResultLog::new();
        let success = backup(&ctx, Arc::new(mock_storage), &mut result_log).await;

        assert!(success);
        assert_eq!(
            result_log.lines()[1],
            "#SAVED \"0cc175b9\" \"/hana/backup/data_pipe\" \"2048\""
        );
        assert!(result_log.lines()[2].starts_with("metrics: source: 2048, destination: 2048,"));
        // Sizes match: no compression comment.
        assert_eq!(result_log.lines().len(), 3);
    }

    #[tokio::test]
    async fn test_backup_reports_compression_when_sizes_differ() {
        let ctx = test_ctx(vec![("PIPE", "/hana/backup/data_pipe")]);
        let mut mock_storage = MockStorage::new();
        mock_storage
            .expect_upload_pipe()
            .times(1)
            .returning(|_source, _key| {
                Ok(UploadReport {
                    e_tag: "0cc175b9".to_string(),
                    source_num_bytes: 3072,
                    target_num_bytes: 2048,
                })
            });

        let mut result_log = ResultLog::new();
        backup(&ctx, Arc::new(mock_storage), &mut result_log).await;

        assert_eq!(
            result_log.lines()[3],
            "compressed backup: original size: 3 KB, compressed size: 2 KB, factor: 1.50"
        );
    }

    #[tokio::test]
    async fn test_backup_reports_upload_errors() {
        let ctx = test_ctx(vec![
            ("PIPE", "/hana/backup/data_pipe_0"),
            ("PIPE", "/hana/backup/data_pipe_1"),
        ]);
        let mut mock_storage = MockStorage::new();
        mock_storage
            .expect_upload_pipe()
            .times(2)
            .returning(|source, _key| {
                if source.to_string_lossy().ends_with("data_pipe_0") {
                    Err(StorageErrorKind::PipeOpen
                        .with_error(anyhow::anyhow!("failed to open pipe")))
                } else {
                    Ok(UploadReport {
                        e_tag: "0cc175b9".to_string(),
                        source_num_bytes: 10,
                        target_num_bytes: 10,
                    })
                }
            });

        let mut result_log = ResultLog::new();
        let success = backup(&ctx, Arc::new(mock_storage), &mut result_log).await;

        assert!(!success);
        let error_lines: Vec<&String> = result_log
            .lines()
            .iter()
            .filter(|line| line.starts_with("#ERROR \"/hana/backup/data_pipe_0\""))
            .collect();
        assert_eq!(error_lines.len(), 1);
    }

    #[tokio::test]
    async fn test_backup_without_pipe_entries_succeeds() {
        let ctx = test_ctx(vec![]);
        let mock_storage = MockStorage::new();
        let mut result_log = ResultLog::new();
        assert!(backup(&ctx, Arc::new(mock_storage), &mut result_log).await);
        assert_eq!(result_log.lines().len(), 1);
    }
}
