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

/// Answers the agent's inquiry about existing backups.
///
/// `#NULL` with an empty parameter lists every object, `#NULL <key>` matches
/// one key exactly, `#EBID <etag> <key>` checks for a backup with the given
/// entity tag. Entity tags compare byte-wise.
pub async fn inquire(
    ctx: &AppContext,
    storage: Arc<dyn Storage>,
    result_log: &mut ResultLog,
) -> bool {
    debug!("function: inquire");
    for entry in &ctx.input {
        let fields: Vec<&str> = entry.parameter.split_whitespace().collect();
        match entry.keyword.as_str() {
            "NULL" => {
                let key = entry.parameter.as_str();
                let mut object_summaries = match storage.list_objects().await {
                    Ok(object_summaries) => object_summaries,
                    Err(list_error) => {
                        error!(error = %list_error, "could not discover objects from bucket");
                        return false;
                    }
                };
                object_summaries.sort_by(|left, right| left.key.cmp(&right.key));

                let mut found = false;
                for object_summary in &object_summaries {
                    if key.is_empty() {
                        found = true;
                        result_log.add_keyword("BACKUP", &[&object_summary.e_tag]);
                    } else if object_summary.key == key {
                        found = true;
                        result_log
                            .add_keyword("BACKUP", &[&object_summary.e_tag, &object_summary.key]);
                    }
                }
                if !found {
                    if key.is_empty() {
                        result_log.add_not_found(&[]);
                    } else {
                        result_log.add_not_found(&[key]);
                    }
                }
            }
            "EBID" if fields.len() == 2 => {
                let (e_tag, key) = (fields[0], fields[1]);
                let object_summaries = match storage.list_objects().await {
                    Ok(object_summaries) => object_summaries,
                    Err(list_error) => {
                        error!(error = %list_error, "could not discover objects from bucket");
                        return false;
                    }
                };
                let backup_exists = object_summaries
                    .iter()
                    .any(|object_summary| object_summary.e_tag == e_tag);
                if backup_exists {
                    result_log.add_keyword("BACKUP", &[e_tag, key]);
                } else {
                    result_log.add_not_found(&[e_tag, key]);
                }
            }
            unexpected_keyword => {
                warn!(keyword = %unexpected_keyword, "ignoring entry with unexpected keyword");
            }
        }
    }
    true
}
