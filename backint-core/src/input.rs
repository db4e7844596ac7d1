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

use tracing::debug;

/// One directive of the work list handed over by the backup agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputEntry {
    /// Upper-cased keyword, without the leading `#`.
    pub keyword: String,
    /// Remainder of the line after the first space, double quotes stripped.
    pub parameter: String,
}

/// Parses the content of the agent's input file.
///
/// Only lines starting with `#` carry directives. `#SOFTWAREID` lines are
/// informational and skipped; `TOOLOPTION` is reserved and ignored.
pub fn parse_input(content: &str) -> Vec<InputEntry> {
    let mut entries = Vec::new();
    for line in content.lines() {
        if !line.starts_with('#') {
            continue;
        }
        if line.to_uppercase().starts_with("#SOFTWAREID") {
            continue;
        }
        let (raw_keyword, parameter) = match line.split_once(' ') {
            Some((raw_keyword, parameter)) => (raw_keyword, parameter.replace('"', "")),
            None => (line, String::new()),
        };
        let keyword = raw_keyword.replace('#', "").to_uppercase();
        if keyword == "TOOLOPTION" {
            debug!(parameter = %parameter, "ignoring reserved TOOLOPTION directive");
            continue;
        }
        entries.push(InputEntry { keyword, parameter });
    }
    entries
}

/// Reads and parses the input file. `None` when the file cannot be read or
/// contains no directive.
pub fn read_input_file(input_path: &Path) -> Option<Vec<InputEntry>> {
    let content = std::fs::read_to_string(input_path).ok()?;
    let entries = parse_input(&content);
    if entries.is_empty() {
        return None;
    }
    Some(entries)
}

#[cfg(test)]
mod tests {
    use super::parse_input;

    #[test]
    fn test_parse_input_backup_work_list() {
        let entries = parse_input(
            "#SOFTWAREID \"backint 1.04\" \"some agent\"\n\
             #PIPE \"/hana/backup/data_pipe_0\"\n\
             #PIPE /hana/backup/data_pipe_1\n",
        );
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].keyword, "PIPE");
        assert_eq!(entries[0].parameter, "/hana/backup/data_pipe_0");
        assert_eq!(entries[1].parameter, "/hana/backup/data_pipe_1");
    }

    #[test]
    fn test_parse_input_restore_work_list() {
        let entries = parse_input(
            "#EBID \"0cc175b9\" \"/hana/backup/data.bak\" \"/hana/restore/data_pipe\"\n\
             #NULL \"/hana/backup/log.bak\"\n",
        );
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].keyword, "EBID");
        assert_eq!(
            entries[0].parameter,
            "0cc175b9 /hana/backup/data.bak /hana/restore/data_pipe"
        );
        assert_eq!(entries[1].keyword, "NULL");
        assert_eq!(entries[1].parameter, "/hana/backup/log.bak");
    }

    #[test]
    fn test_parse_input_keyword_is_upper_cased() {
        let entries = parse_input("#pipe /hana/backup/data_pipe\n");
        assert_eq!(entries[0].keyword, "PIPE");
    }

    #[test]
    fn test_parse_input_skips_non_directives_and_tooloption() {
        let entries = parse_input(
            "some free text\n\
             #TOOLOPTION ignore_me\n\
             #NULL\n",
        );
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].keyword, "NULL");
        assert_eq!(entries[0].parameter, "");
    }
}
