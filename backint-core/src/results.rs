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

//! The keyword lines reported back to the backup agent. The agent parses
//! them to learn the outcome of each requested object, so their format is
//! part of the protocol.

use std::io::Write;
use std::path::Path;

use crate::{BACKINT_PROTOCOL_VERSION, TOOL_VERSION};

/// Ordered in-memory log of the protocol lines of one invocation.
///
/// Lines accumulate while the functions run and are appended to the output
/// file once, at the end of the run; their order is insertion order.
pub struct ResultLog {
    lines: Vec<String>,
}

impl Default for ResultLog {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultLog {
    pub fn new() -> ResultLog {
        ResultLog {
            lines: vec![format!(
                "#SOFTWAREID \"{BACKINT_PROTOCOL_VERSION}\" \"{TOOL_VERSION}\""
            )],
        }
    }

    /// Appends `#KEYWORD "arg1" "arg2" ...`.
    pub fn add_keyword(&mut self, keyword: &str, args: &[&str]) {
        let mut line = format!("#{keyword}");
        for arg in args {
            line.push_str(&format!(" \"{arg}\""));
        }
        self.lines.push(line);
    }

    fn add_comment(&mut self, comment: String) {
        self.lines.push(comment);
    }

    pub fn add_backup_success(&mut self, e_tag: &str, source_path: &str, source_num_bytes: u64) {
        self.add_keyword(
            "SAVED",
            &[e_tag, source_path, &source_num_bytes.to_string()],
        );
    }

    pub fn add_backup_metrics(
        &mut self,
        source_num_bytes: u64,
        target_num_bytes: u64,
        seconds: f64,
    ) {
        self.add_comment(format!(
            "metrics: source: {source_num_bytes}, destination: {target_num_bytes}, seconds: \
             {seconds:.6}"
        ));
    }

    pub fn add_backup_compressed_info(&mut self, source_num_bytes: u64, target_num_bytes: u64) {
        let factor = source_num_bytes as f64 / target_num_bytes as f64;
        self.add_comment(format!(
            "compressed backup: original size: {}, compressed size: {}, factor: {factor:.2}",
            printable_size(source_num_bytes),
            printable_size(target_num_bytes),
        ));
    }

    pub fn add_restore_success(&mut self, e_tag: &str, destination_path: &str) {
        self.add_keyword("RESTORED", &[e_tag, destination_path]);
    }

    pub fn add_not_found(&mut self, args: &[&str]) {
        self.add_keyword("NOTFOUND", args);
    }

    pub fn add_error(&mut self, source_path: &str, message: &str) {
        self.add_keyword("ERROR", &[source_path, message]);
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Appends every line to the output file.
    pub fn dump(&self, output_path: &Path) -> std::io::Result<()> {
        let mut output_file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(output_path)?;
        for line in &self.lines {
            writeln!(output_file, "{line}")?;
        }
        Ok(())
    }
}

/// Human readable size with 1024-based units, shortest representation
/// rounded to two decimal places.
fn printable_size(num_bytes: u64) -> String {
    const UNITS: [&str; 9] = ["B", "KB", "MB", "GB", "TB", "PB", "EB", "ZB", "YB"];
    if num_bytes == 0 {
        return "0B".to_string();
    }
    let exponent = ((num_bytes as f64).log2() / 10.0).floor() as usize;
    let exponent = exponent.min(UNITS.len() - 1);
    let size = num_bytes as f64 / 1024f64.powi(exponent as i32);

    let mut formatted = format!("{:.2}", (size * 100.0).round() / 100.0);
    while formatted.ends_with('0') {
        formatted.pop();
    }
    if formatted.ends_with('.') {
        formatted.pop();
    }
    format!("{} {}", formatted, UNITS[exponent])
}
