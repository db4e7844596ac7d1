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

//! `backint-config` loads and validates the INI parameter file handed to the
//! tool by the backup agent, and exposes it as a typed [`BackintConfig`].

mod config;
mod params;
mod validation;

pub use config::{
    check_parameter_file, load_config, AgentLogLevel, BackintConfig, ConfigReport,
    LegalHoldStatus, RetentionMode, RetentionPeriod,
};
pub use params::AUTH_MODE_APIKEY;
