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

//! `backint-core` implements the Backint protocol spoken with the backup
//! agent: the input work list, the result lines reported back, and the four
//! functions BACKUP, RESTORE, INQUIRE, and DELETE.

pub mod backup;
pub mod delete;
pub mod input;
pub mod inquire;
pub mod restore;
pub mod results;

use std::path::PathBuf;

use backint_config::BackintConfig;

use crate::input::InputEntry;

/// Version of the Backint protocol this tool implements.
pub const BACKINT_PROTOCOL_VERSION: &str = "backint 1.04";

/// Tool identification reported in the `SOFTWAREID` line.
pub const TOOL_VERSION: &str = concat!(
    "Backint for S3 compatible object storage version: '",
    env!("CARGO_PKG_VERSION"),
    "'"
);

/// Everything one invocation needs, built during startup and passed
/// explicitly into the functions.
#[derive(Debug, Clone)]
pub struct AppContext {
    pub config: BackintConfig,
    pub input: Vec<InputEntry>,
    pub output_path: PathBuf,
}

/// Derives the object key for a source path: the configured
/// `remove_key_prefix` is stripped when it is a prefix of the path, and
/// `additional_key_prefix` is prepended.
pub fn object_key_for_path(config: &BackintConfig, source_path: &str) -> String {
    let stripped_path = source_path
        .strip_prefix(&config.remove_key_prefix)
        .unwrap_or(source_path);
    format!("{}{}", config.additional_key_prefix, stripped_path)
}

#[cfg(test)]
pub(crate) mod test_helpers {
    use std::path::PathBuf;

    use backint_config::{
        AgentLogLevel, BackintConfig, LegalHoldStatus, RetentionMode, RetentionPeriod,
    };

    use crate::input::InputEntry;
    use crate::AppContext;

    pub fn test_config() -> BackintConfig {
        BackintConfig {
            auth_keypath: PathBuf::from("/tmp/apikey"),
            auth_mode: "apikey".to_string(),
            apikey: "test-api-key".to_string(),
            bucket: "hana-backups".to_string(),
            endpoint_url: "https://s3.eu-de.cloud-object-storage.appdomain.cloud".to_string(),
            ibm_auth_endpoint: "https://private.iam.cloud.ibm.com/identity/token".to_string(),
            region: "eu-de".to_string(),
            max_concurrency: 10,
            multipart_chunksize: 134_000_000,
            timeout_microsecond: 1,
            additional_key_prefix: String::new(),
            remove_key_prefix: String::new(),
            object_lock_legal_hold_status: LegalHoldStatus::Off,
            object_lock_retention_mode: RetentionMode::None,
            object_lock_retention_period: RetentionPeriod::default(),
            object_tags: Vec::new(),
            agent_log_level: AgentLogLevel::Info,
        }
    }

    pub fn test_ctx(entries: Vec<(&str, &str)>) -> AppContext {
        AppContext {
            config: test_config(),
            input: entries
                .into_iter()
                .map(|(keyword, parameter)| InputEntry {
                    keyword: keyword.to_string(),
                    parameter: parameter.to_string(),
                })
                .collect(),
            output_path: PathBuf::from("/tmp/backint.out"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::object_key_for_path;
    use crate::test_helpers::test_config;

    #[test]
    fn test_object_key_for_path() {
        let mut config = test_config();
        assert_eq!(
            object_key_for_path(&config, "/hana/backups/data.bak"),
            "/hana/backups/data.bak"
        );

        config.remove_key_prefix = "/hana/backups/".to_string();
        config.additional_key_prefix = "prod/".to_string();
        assert_eq!(
            object_key_for_path(&config, "/hana/backups/data.bak"),
            "prod/data.bak"
        );

        // A non-matching prefix leaves the path untouched.
        assert_eq!(
            object_key_for_path(&config, "/other/data.bak"),
            "prod//other/data.bak"
        );
    }
}
