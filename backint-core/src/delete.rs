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

use std::sync::Arc;

use backint_storage::Storage;
use tracing::{debug, error, warn};

use crate::results::ResultLog;
use crate::AppContext;

/// Deletes the objects named by the `#EBID <etag> <key>` entries of the work
/// list.
///
/// An entry whose (entity tag, key) pair is not in the bucket listing is
/// reported as `NOTFOUND`; deleting an already deleted object is therefore
/// not an error, and repeating a DELETE keeps succeeding. Entity tags
/// compare byte-wise.
pub async fn delete(
    ctx: &AppContext,
    storage: Arc<dyn Storage>,
    result_log: &mut ResultLog,
) -> bool {
    debug!("function: delete");
    let mut success = true;
    for entry in &ctx.input {
        if entry.keyword != "EBID" {
            warn!(keyword = %entry.keyword, "ignoring entry with unexpected keyword");
            continue;
        }
        let fields: Vec<&str> = entry.parameter.split_whitespace().collect();
        if fields.len() != 2 {
            warn!(parameter = %entry.parameter, "malformed EBID entry");
            continue;
        }
        let (e_tag, key) = (fields[0], fields[1]);

        let object_summaries = match storage.list_objects().await {
            Ok(object_summaries) => object_summaries,
            Err(list_error) => {
                error!(error = %list_error, "could not discover objects from bucket");
                return false;
            }
        };
        let object_found = object_summaries
            .iter()
            .any(|object_summary| object_summary.e_tag == e_tag && object_summary.key == key);
        if !object_found {
            result_log.add_not_found(&[e_tag, key]);
            continue;
        }

        match storage.delete_object(key).await {
            Ok(()) => {
                result_log.add_keyword("DELETED", &[e_tag, key]);
            }
            Err(delete_error) => {
                error!(
                    key,
                    e_tag,
                    error = %delete_error,
                    "failed to delete object"
                );
                result_log.add_error(key, &delete_error.to_string());
                success = false;
            }
        }
    }
    success
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use backint_storage::{MockStorage, ObjectSummary, StorageErrorKind};

    use super::delete;
    use crate::results::ResultLog;
    use crate::test_helpers::test_ctx;

    fn listing() -> Vec<ObjectSummary> {
        vec![ObjectSummary {
            key: "data.bak".to_string(),
            e_tag: "etag-data".to_string(),
        }]
    }

    #[tokio::test]
    async fn test_delete_existing_object() {
        let ctx = test_ctx(vec![("EBID", "etag-data data.bak")]);
        let mut mock_storage = MockStorage::new();
        mock_storage
            .expect_list_objects()
            .times(1)
            .returning(|| Ok(listing()));
        mock_storage
            .expect_delete_object()
            .times(1)
            .withf(|key| key == "data.bak")
            .returning(|_key| Ok(()));

        let mut result_log = ResultLog::new();
        assert!(delete(&ctx, Arc::new(mock_storage), &mut result_log).await);
        assert_eq!(result_log.lines()[1], "#DELETED \"etag-data\" \"data.bak\"");
    }

    #[tokio::test]
    async fn test_delete_missing_object_reports_not_found() {
        // A second DELETE of the same entity tag: the object is gone from
        // the listing, so the entry resolves to NOTFOUND, never ERROR.
        let ctx = test_ctx(vec![("EBID", "etag-data data.bak")]);
        let mut mock_storage = MockStorage::new();
        mock_storage
            .expect_list_objects()
            .times(1)
            .returning(|| Ok(Vec::new()));

        let mut result_log = ResultLog::new();
        assert!(delete(&ctx, Arc::new(mock_storage), &mut result_log).await);
        assert_eq!(
            result_log.lines()[1],
            "#NOTFOUND \"etag-data\" \"data.bak\""
        );
    }

    #[tokio::test]
    async fn test_delete_mismatched_entity_tag_reports_not_found() {
        let ctx = test_ctx(vec![("EBID", "other-etag data.bak")]);
        let mut mock_storage = MockStorage::new();
        mock_storage
            .expect_list_objects()
            .times(1)
            .returning(|| Ok(listing()));

        let mut result_log = ResultLog::new();
        assert!(delete(&ctx, Arc::new(mock_storage), &mut result_log).await);
        assert_eq!(
            result_log.lines()[1],
            "#NOTFOUND \"other-etag\" \"data.bak\""
        );
    }

    #[tokio::test]
    async fn test_delete_failure_reports_error() {
        let ctx = test_ctx(vec![("EBID", "etag-data data.bak")]);
        let mut mock_storage = MockStorage::new();
        mock_storage
            .expect_list_objects()
            .times(1)
            .returning(|| Ok(listing()));
        mock_storage
            .expect_delete_object()
            .times(1)
            .returning(|_key| {
                Err(StorageErrorKind::Transport.with_error(anyhow::anyhow!("delete failed")))
            });

        let mut result_log = ResultLog::new();
        assert!(!delete(&ctx, Arc::new(mock_storage), &mut result_log).await);
        assert!(result_log.lines()[1].starts_with("#ERROR \"data.bak\""));
    }
}
