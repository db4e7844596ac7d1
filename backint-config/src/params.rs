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

//! Declarative table of the parameters recognised in the parameter file,
//! one entry per key with its section, default, and validation rule.

pub const SECTION_CLOUD_STORAGE: &str = "cloud_storage";
pub const SECTION_BACKINT: &str = "backint";
pub const SECTION_OBJECTS: &str = "objects";
pub const SECTION_TRACE: &str = "trace";

pub const VALID_SECTIONS: &[&str] = &[
    SECTION_CLOUD_STORAGE,
    SECTION_BACKINT,
    SECTION_OBJECTS,
    SECTION_TRACE,
];

pub const AUTH_MODE_APIKEY: &str = "apikey";

pub const DEFAULT_IBM_AUTH_ENDPOINT: &str = "https://private.iam.cloud.ibm.com/identity/token";

/// Object keys may carry at most this many tags.
pub const MAX_NUM_OBJECT_TAGS: usize = 10;

pub const VALID_REGIONS: &[&str] = &[
    "au-syd", "br-sao", "ca-tor", "eu-de", "eu-es", "eu-gb", "jp-osa", "jp-tok", "us-east",
    "us-south",
];

pub const VALID_LOG_LEVELS: &[&str] =
    &["debug", "info", "warning", "error", "critical", "http"];

/// Validation rule attached to a parameter.
#[derive(Debug, Clone, Copy)]
pub enum ValueKind {
    Str,
    /// Path to an existing, readable file.
    File,
    Int,
    Range {
        min: i64,
        max: i64,
    },
    List(&'static [&'static str]),
    /// Integer number of bytes, or `<n><KB|MB|GB>` with a non-zero size.
    ChunkSize,
    /// `years,months,days` integer triple.
    Period,
    /// Comma-separated `k=v` pairs, at most [`MAX_NUM_OBJECT_TAGS`].
    Tags,
    /// Object storage endpoint, must start with `https://s3.`.
    EndpointUrl,
    /// Plain https URL.
    HttpsUrl,
}

#[derive(Debug, Clone, Copy)]
pub struct ParamSpec {
    pub key: &'static str,
    pub section: &'static str,
    pub mandatory: bool,
    pub default: Option<&'static str>,
    pub kind: ValueKind,
}

pub const PARAMS: &[ParamSpec] = &[
    ParamSpec {
        key: "auth_keypath",
        section: SECTION_CLOUD_STORAGE,
        mandatory: true,
        default: None,
        kind: ValueKind::File,
    },
    ParamSpec {
        key: "auth_mode",
        section: SECTION_CLOUD_STORAGE,
        mandatory: false,
        default: Some(AUTH_MODE_APIKEY),
        kind: ValueKind::List(&[AUTH_MODE_APIKEY]),
    },
    ParamSpec {
        key: "bucket",
        section: SECTION_CLOUD_STORAGE,
        mandatory: true,
        default: None,
        kind: ValueKind::Str,
    },
    ParamSpec {
        key: "endpoint_url",
        section: SECTION_CLOUD_STORAGE,
        mandatory: true,
        default: None,
        kind: ValueKind::EndpointUrl,
    },
    ParamSpec {
        key: "ibm_auth_endpoint",
        section: SECTION_CLOUD_STORAGE,
        mandatory: false,
        default: Some(DEFAULT_IBM_AUTH_ENDPOINT),
        kind: ValueKind::HttpsUrl,
    },
    ParamSpec {
        key: "region",
        section: SECTION_CLOUD_STORAGE,
        mandatory: true,
        default: None,
        kind: ValueKind::List(VALID_REGIONS),
    },
    ParamSpec {
        key: "max_concurrency",
        section: SECTION_BACKINT,
        mandatory: false,
        default: Some("10"),
        kind: ValueKind::Range { min: 1, max: 20 },
    },
    ParamSpec {
        key: "multipart_chunksize",
        section: SECTION_BACKINT,
        mandatory: false,
        default: Some("134000000"),
        kind: ValueKind::ChunkSize,
    },
    ParamSpec {
        key: "timeout_microsecond",
        section: SECTION_BACKINT,
        mandatory: false,
        default: Some("1"),
        kind: ValueKind::Int,
    },
    ParamSpec {
        key: "additional_key_prefix",
        section: SECTION_OBJECTS,
        mandatory: false,
        default: Some(""),
        kind: ValueKind::Str,
    },
    ParamSpec {
        key: "remove_key_prefix",
        section: SECTION_OBJECTS,
        mandatory: false,
        default: Some(""),
        kind: ValueKind::Str,
    },
    ParamSpec {
        key: "object_lock_legal_hold_status",
        section: SECTION_OBJECTS,
        mandatory: false,
        default: Some("OFF"),
        kind: ValueKind::List(&["OFF", "ON"]),
    },
    ParamSpec {
        key: "object_lock_retention_mode",
        section: SECTION_OBJECTS,
        mandatory: false,
        default: Some("None"),
        kind: ValueKind::List(&["None", "cmp"]),
    },
    ParamSpec {
        key: "object_lock_retention_period",
        section: SECTION_OBJECTS,
        mandatory: false,
        default: Some("0,0,0"),
        kind: ValueKind::Period,
    },
    ParamSpec {
        key: "object_tags",
        section: SECTION_OBJECTS,
        mandatory: false,
        default: Some(""),
        kind: ValueKind::Tags,
    },
    ParamSpec {
        key: "agent_log_level",
        section: SECTION_TRACE,
        mandatory: false,
        default: Some("info"),
        kind: ValueKind::List(VALID_LOG_LEVELS),
    },
];

pub fn param_spec(key: &str) -> Option<&'static ParamSpec> {
    PARAMS.iter().find(|spec| spec.key == key)
}
