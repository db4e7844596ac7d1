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

use backint_cli::{build_cli, run, SUCCESS, WRONG_PARAMETER};
use clap::error::ErrorKind;

#[tokio::main]
async fn main() {
    let matches = match build_cli().try_get_matches() {
        Ok(matches) => matches,
        Err(clap_error) => {
            let _ = clap_error.print();
            let exit_code = match clap_error.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => SUCCESS,
                _ => WRONG_PARAMETER,
            };
            std::process::exit(exit_code);
        }
    };
    let exit_code = run(matches).await;
    std::process::exit(exit_code);
}
