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

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Days, Months, Utc};
use configparser::ini::Ini;

use crate::params::{param_spec, ParamSpec, PARAMS, VALID_SECTIONS};
use crate::validation::{parse_chunksize, parse_period, parse_tags, validate_value};

/// Validated configuration built from the parameter file.
///
/// All values are typed and normalised (chunk sizes in bytes, tags split into
/// pairs); the API key is read from `auth_keypath` exactly once, while the
/// configuration is built.
#[derive(Debug, Clone)]
pub struct BackintConfig {
    pub auth_keypath: PathBuf,
    pub auth_mode: String,
    pub apikey: String,
    pub bucket: String,
    pub endpoint_url: String,
    pub ibm_auth_endpoint: String,
    pub region: String,
    pub max_concurrency: usize,
    pub multipart_chunksize: u64,
    pub timeout_microsecond: u64,
    pub additional_key_prefix: String,
    pub remove_key_prefix: String,
    pub object_lock_legal_hold_status: LegalHoldStatus,
    pub object_lock_retention_mode: RetentionMode,
    pub object_lock_retention_period: RetentionPeriod,
    pub object_tags: Vec<(String, String)>,
    pub agent_log_level: AgentLogLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegalHoldStatus {
    Off,
    On,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionMode {
    None,
    Compliance,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionPeriod {
    pub years: u32,
    pub months: u32,
    pub days: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentLogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
    Http,
}

impl AgentLogLevel {
    fn from_value(value: &str) -> AgentLogLevel {
        match value {
            "debug" => AgentLogLevel::Debug,
            "warning" => AgentLogLevel::Warning,
            "error" => AgentLogLevel::Error,
            "critical" => AgentLogLevel::Critical,
            "http" => AgentLogLevel::Http,
            _ => AgentLogLevel::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentLogLevel::Debug => "debug",
            AgentLogLevel::Info => "info",
            AgentLogLevel::Warning => "warning",
            AgentLogLevel::Error => "error",
            AgentLogLevel::Critical => "critical",
            AgentLogLevel::Http => "http",
        }
    }
}

impl BackintConfig {
    /// Object tags serialised the way the upload request expects them:
    /// `k1=v1&k2=v2`. `None` when no tags are configured.
    pub fn tagging(&self) -> Option<String> {
        if self.object_tags.is_empty() {
            return None;
        }
        let tagging = self
            .object_tags
            .iter()
            .map(|(tag_key, tag_value)| format!("{tag_key}={tag_value}"))
            .collect::<Vec<_>>()
            .join("&");
        Some(tagging)
    }

    /// Date until which uploaded objects stay locked, derived from the
    /// configured retention period. `None` unless compliance mode is set.
    pub fn lock_retain_until(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if self.object_lock_retention_mode != RetentionMode::Compliance {
            return None;
        }
        let period = self.object_lock_retention_period;
        now.checked_add_months(Months::new(period.years * 12 + period.months))
            .and_then(|date| date.checked_add_days(Days::new(u64::from(period.days))))
    }

    /// Configuration entries for the startup log. The API key is masked and
    /// the pipe pacing timeout is left out.
    pub fn loggable_entries(&self) -> Vec<(&'static str, String)> {
        vec![
            ("auth_keypath", self.auth_keypath.display().to_string()),
            ("auth_mode", self.auth_mode.clone()),
            ("apikey", "****".to_string()),
            ("bucket", self.bucket.clone()),
            ("endpoint_url", self.endpoint_url.clone()),
            ("ibm_auth_endpoint", self.ibm_auth_endpoint.clone()),
            ("region", self.region.clone()),
            ("max_concurrency", self.max_concurrency.to_string()),
            ("multipart_chunksize", self.multipart_chunksize.to_string()),
            (
                "additional_key_prefix",
                self.additional_key_prefix.clone(),
            ),
            ("remove_key_prefix", self.remove_key_prefix.clone()),
            (
                "object_lock_legal_hold_status",
                match self.object_lock_legal_hold_status {
                    LegalHoldStatus::Off => "OFF".to_string(),
                    LegalHoldStatus::On => "ON".to_string(),
                },
            ),
            (
                "object_lock_retention_mode",
                match self.object_lock_retention_mode {
                    RetentionMode::None => "None".to_string(),
                    RetentionMode::Compliance => "cmp".to_string(),
                },
            ),
            (
                "object_lock_retention_period",
                format!(
                    "{},{},{}",
                    self.object_lock_retention_period.years,
                    self.object_lock_retention_period.months,
                    self.object_lock_retention_period.days
                ),
            ),
            (
                "object_tags",
                self.tagging().unwrap_or_default(),
            ),
            ("agent_log_level", self.agent_log_level.as_str().to_string()),
        ]
    }
}

/// Outcome of evaluating a parameter file: the per-parameter report lines
/// shown by `--check`, and the error subset.
#[derive(Debug, Default)]
pub struct ConfigReport {
    pub messages: Vec<String>,
    pub errors: Vec<String>,
}

impl ConfigReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Validates the parameter file and reports every finding, for `--check`.
pub fn check_parameter_file(parameter_file: &Path) -> anyhow::Result<ConfigReport> {
    let (_config_opt, report) = evaluate_parameter_file(parameter_file)?;
    Ok(report)
}

/// Loads, validates, and types the configuration from the parameter file.
pub fn load_config(parameter_file: &Path) -> anyhow::Result<BackintConfig> {
    let (config_opt, report) = evaluate_parameter_file(parameter_file)?;
    match config_opt {
        Some(config) => Ok(config),
        None => anyhow::bail!(
            "invalid parameter configuration file `{}`:\n{}",
            parameter_file.display(),
            report.errors.join("\n")
        ),
    }
}

fn evaluate_parameter_file(
    parameter_file: &Path,
) -> anyhow::Result<(Option<BackintConfig>, ConfigReport)> {
    let mut ini = Ini::new_cs();
    let file_map = ini.load(parameter_file).map_err(|error| {
        anyhow::anyhow!(
            "failed to read parameter file `{}`: {error}",
            parameter_file.display()
        )
    })?;

    let mut report = ConfigReport::default();
    let mut raw_values: HashMap<&'static str, String> = HashMap::new();
    let mut explicitly_set: HashSet<&'static str> = HashSet::new();

    let mut sections: Vec<&String> = file_map.keys().collect();
    sections.sort();
    for section in sections {
        if !VALID_SECTIONS.contains(&section.as_str()) {
            report.messages.push(format!(
                "ERROR: You specified the section '{section}', but it is not part of the backint \
                 configuration. All parameters specified in this section are ignored."
            ));
            continue;
        }
        report
            .messages
            .push(format!("OK: Section '{section}' is valid."));

        let mut keys: Vec<&String> = file_map[section.as_str()].keys().collect();
        keys.sort();
        for key in keys {
            let value = file_map[section.as_str()][key.as_str()]
                .clone()
                .unwrap_or_default();
            match param_spec(key) {
                Some(spec) if spec.section == section.as_str() => {
                    report
                        .messages
                        .push(format!("OK: '{key}' specified in correct section."));
                    // A bare key without a value counts as not set.
                    if !value.is_empty() {
                        raw_values.insert(spec.key, value);
                        explicitly_set.insert(spec.key);
                    }
                }
                Some(spec) => {
                    report.messages.push(format!(
                        "ERROR: You specified '{key}' in section '{section}', but the key belongs \
                         to section '{}'. The value of '{key}' will be ignored.",
                        spec.section
                    ));
                }
                None => {
                    let message = format!(
                        "ERROR: You specified '{key}' in section '{section}', but the key is \
                         unknown. The value of '{key}' will be ignored."
                    );
                    report.messages.push(message.clone());
                    report.errors.push(message);
                }
            }
        }
    }

    for spec in PARAMS {
        validate_param(spec, &raw_values, &mut report);
    }
    validate_lock_retention(&raw_values, &explicitly_set, &mut report);

    if !report.errors.is_empty() {
        return Ok((None, report));
    }

    let config = match build_typed_config(&raw_values) {
        Ok(config) => config,
        Err(error) => {
            let message = format!("ERROR: {error:#}");
            report.messages.push(message.clone());
            report.errors.push(message);
            return Ok((None, report));
        }
    };
    Ok((Some(config), report))
}

fn validate_param(
    spec: &ParamSpec,
    raw_values: &HashMap<&'static str, String>,
    report: &mut ConfigReport,
) {
    let value_opt = raw_values.get(spec.key).filter(|value| !value.is_empty());
    if spec.mandatory {
        match value_opt {
            Some(_) => report.messages.push(format!(
                "OK: Mandatory parameter '{}' exists.",
                spec.key
            )),
            None => {
                let message = format!(
                    "ERROR: You did not specify a value for the mandatory parameter '{}'.",
                    spec.key
                );
                report.messages.push(message.clone());
                report.errors.push(message);
                return;
            }
        }
    }
    if let Some(value) = value_opt {
        match validate_value(spec.kind, value) {
            Ok(()) => report.messages.push(format!(
                "OK: Parameter '{}' exists and its value is valid.",
                spec.key
            )),
            Err(detail) => {
                let message = format!(
                    "ERROR: '{}': the value '{value}' you specified is invalid. {detail}",
                    spec.key
                );
                report.messages.push(message.clone());
                report.errors.push(message);
            }
        }
    }
}

/// Compliance retention requires an explicit period, and a period makes no
/// sense without compliance retention.
fn validate_lock_retention(
    raw_values: &HashMap<&'static str, String>,
    explicitly_set: &HashSet<&'static str>,
    report: &mut ConfigReport,
) {
    let retention_mode_is_cmp = raw_values
        .get("object_lock_retention_mode")
        .map(|value| value == "cmp")
        .unwrap_or(false);
    let retention_period_set = explicitly_set.contains("object_lock_retention_period");

    if retention_mode_is_cmp && !retention_period_set {
        let message = "ERROR: You specified 'object_lock_retention_mode = cmp', but no \
                       'object_lock_retention_period' is specified."
            .to_string();
        report.messages.push(message.clone());
        report.errors.push(message);
    }
    if !retention_mode_is_cmp && retention_period_set {
        let message = "ERROR: You did not specify 'object_lock_retention_mode' or \
                       'object_lock_retention_mode' is set to 'None', but \
                       'object_lock_retention_period' is specified."
            .to_string();
        report.messages.push(message.clone());
        report.errors.push(message);
    }
}

fn build_typed_config(
    raw_values: &HashMap<&'static str, String>,
) -> anyhow::Result<BackintConfig> {
    let get = |key: &'static str| -> String {
        raw_values
            .get(key)
            .filter(|value| !value.is_empty())
            .cloned()
            .unwrap_or_else(|| {
                param_spec(key)
                    .and_then(|spec| spec.default)
                    .unwrap_or("")
                    .to_string()
            })
    };

    let auth_keypath = PathBuf::from(get("auth_keypath"));
    let apikey = read_apikey(&auth_keypath).with_context(|| {
        format!(
            "could not discover the apikey, check that file `{}` contains it",
            auth_keypath.display()
        )
    })?;

    let (years, months, days) =
        parse_period(&get("object_lock_retention_period")).map_err(anyhow::Error::msg)?;

    Ok(BackintConfig {
        auth_keypath,
        auth_mode: get("auth_mode"),
        apikey,
        bucket: get("bucket"),
        endpoint_url: get("endpoint_url"),
        ibm_auth_endpoint: get("ibm_auth_endpoint"),
        region: get("region"),
        max_concurrency: get("max_concurrency")
            .parse()
            .context("max_concurrency")?,
        multipart_chunksize: parse_chunksize(&get("multipart_chunksize"))
            .map_err(anyhow::Error::msg)?,
        timeout_microsecond: get("timeout_microsecond")
            .parse()
            .context("timeout_microsecond")?,
        additional_key_prefix: get("additional_key_prefix"),
        remove_key_prefix: get("remove_key_prefix"),
        object_lock_legal_hold_status: match get("object_lock_legal_hold_status").as_str() {
            "ON" => LegalHoldStatus::On,
            _ => LegalHoldStatus::Off,
        },
        object_lock_retention_mode: match get("object_lock_retention_mode").as_str() {
            "cmp" => RetentionMode::Compliance,
            _ => RetentionMode::None,
        },
        object_lock_retention_period: RetentionPeriod {
            years,
            months,
            days,
        },
        object_tags: parse_tags(&get("object_tags")).map_err(anyhow::Error::msg)?,
        agent_log_level: AgentLogLevel::from_value(&get("agent_log_level")),
    })
}

/// Reads the API key from the key file: a single non-empty line.
fn read_apikey(auth_keypath: &Path) -> anyhow::Result<String> {
    let content = std::fs::read_to_string(auth_keypath)?;
    let apikey = content.trim();
    if apikey.is_empty() || apikey.lines().count() != 1 {
        anyhow::bail!("the key file must contain the apikey on a single line");
    }
    Ok(apikey.to_string())
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::path::PathBuf;

    use chrono::{TimeZone, Utc};

    use super::*;

    /// Writes a parameter file pointing at a valid apikey file and returns
    /// both paths. Extra lines are appended verbatim to the given sections.
    fn write_parameter_file(
        tempdir: &tempfile::TempDir,
        backint_lines: &str,
        objects_lines: &str,
    ) -> PathBuf {
        let keypath = tempdir.path().join("apikey");
        std::fs::write(&keypath, "test-api-key\n").unwrap();

        let parameter_file = tempdir.path().join("backint.cfg");
        let mut file = std::fs::File::create(&parameter_file).unwrap();
        writeln!(file, "[cloud_storage]").unwrap();
        writeln!(file, "auth_keypath = {}", keypath.display()).unwrap();
        writeln!(file, "bucket = hana-backups").unwrap();
        writeln!(file, "endpoint_url = https://s3.eu-de.cloud-object-storage.appdomain.cloud")
            .unwrap();
        writeln!(file, "region = eu-de").unwrap();
        writeln!(file, "[backint]").unwrap();
        writeln!(file, "{backint_lines}").unwrap();
        writeln!(file, "[objects]").unwrap();
        writeln!(file, "{objects_lines}").unwrap();
        parameter_file
    }

    #[test]
    fn test_load_config_applies_defaults() {
        let tempdir = tempfile::tempdir().unwrap();
        let parameter_file = write_parameter_file(&tempdir, "", "");
        let config = load_config(&parameter_file).unwrap();

        assert_eq!(config.apikey, "test-api-key");
        assert_eq!(config.bucket, "hana-backups");
        assert_eq!(config.region, "eu-de");
        assert_eq!(config.auth_mode, "apikey");
        assert_eq!(config.max_concurrency, 10);
        assert_eq!(config.multipart_chunksize, 134_000_000);
        assert_eq!(config.timeout_microsecond, 1);
        assert_eq!(config.object_lock_legal_hold_status, LegalHoldStatus::Off);
        assert_eq!(config.object_lock_retention_mode, RetentionMode::None);
        assert_eq!(config.agent_log_level, AgentLogLevel::Info);
        assert!(config.tagging().is_none());
        assert!(config.lock_retain_until(Utc::now()).is_none());
    }

    #[test]
    fn test_load_config_normalizes_chunksize_with_unit() {
        let tempdir = tempfile::tempdir().unwrap();
        let parameter_file = write_parameter_file(&tempdir, "multipart_chunksize = 128MB", "");
        let config = load_config(&parameter_file).unwrap();
        assert_eq!(config.multipart_chunksize, 134_217_728);
    }

    #[test]
    fn test_load_config_rejects_zero_chunksize_unit() {
        let tempdir = tempfile::tempdir().unwrap();
        let parameter_file = write_parameter_file(&tempdir, "multipart_chunksize = 0KB", "");
        assert!(load_config(&parameter_file).is_err());
    }

    #[test]
    fn test_load_config_rejects_out_of_range_concurrency() {
        let tempdir = tempfile::tempdir().unwrap();
        let parameter_file = write_parameter_file(&tempdir, "max_concurrency = 21", "");
        assert!(load_config(&parameter_file).is_err());
    }

    #[test]
    fn test_load_config_rejects_retention_mode_without_period() {
        let tempdir = tempfile::tempdir().unwrap();
        let parameter_file =
            write_parameter_file(&tempdir, "", "object_lock_retention_mode = cmp");
        assert!(load_config(&parameter_file).is_err());
    }

    #[test]
    fn test_load_config_rejects_period_without_retention_mode() {
        let tempdir = tempfile::tempdir().unwrap();
        let parameter_file =
            write_parameter_file(&tempdir, "", "object_lock_retention_period = 1,0,0");
        assert!(load_config(&parameter_file).is_err());
    }

    #[test]
    fn test_load_config_compliance_retention() {
        let tempdir = tempfile::tempdir().unwrap();
        let parameter_file = write_parameter_file(
            &tempdir,
            "",
            "object_lock_retention_mode = cmp\nobject_lock_retention_period = 1,2,10",
        );
        let config = load_config(&parameter_file).unwrap();
        assert_eq!(
            config.object_lock_retention_mode,
            RetentionMode::Compliance
        );

        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let retain_until = config.lock_retain_until(now).unwrap();
        assert_eq!(
            retain_until,
            Utc.with_ymd_and_hms(2027, 3, 11, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_load_config_object_tags() {
        let tempdir = tempfile::tempdir().unwrap();
        let parameter_file =
            write_parameter_file(&tempdir, "", "object_tags = app=hana,env=prod");
        let config = load_config(&parameter_file).unwrap();
        assert_eq!(config.tagging().unwrap(), "app=hana&env=prod");
    }

    #[test]
    fn test_load_config_rejects_too_many_tags() {
        let tempdir = tempfile::tempdir().unwrap();
        let tags = (0..11)
            .map(|tag_idx| format!("k{tag_idx}=v"))
            .collect::<Vec<_>>()
            .join(",");
        let parameter_file =
            write_parameter_file(&tempdir, "", &format!("object_tags = {tags}"));
        assert!(load_config(&parameter_file).is_err());
    }

    #[test]
    fn test_load_config_rejects_invalid_region_and_endpoint() {
        let tempdir = tempfile::tempdir().unwrap();
        let keypath = tempdir.path().join("apikey");
        std::fs::write(&keypath, "test-api-key\n").unwrap();
        let parameter_file = tempdir.path().join("backint.cfg");
        std::fs::write(
            &parameter_file,
            format!(
                "[cloud_storage]\nauth_keypath = {}\nbucket = b\nendpoint_url = \
                 http://x\nregion = foo\n",
                keypath.display()
            ),
        )
        .unwrap();

        let report = check_parameter_file(&parameter_file).unwrap();
        assert!(!report.is_ok());
        assert!(report
            .errors
            .iter()
            .any(|error| error.contains("endpoint_url")));
        assert!(report.errors.iter().any(|error| error.contains("region")));
    }

    #[test]
    fn test_load_config_rejects_unknown_key() {
        let tempdir = tempfile::tempdir().unwrap();
        let parameter_file = write_parameter_file(&tempdir, "frobnicate = yes", "");
        assert!(load_config(&parameter_file).is_err());
    }

    #[test]
    fn test_load_config_ignores_key_in_wrong_section() {
        let tempdir = tempfile::tempdir().unwrap();
        // `object_tags` belongs to [objects]; in [backint] it is reported and
        // ignored, but does not fail the configuration.
        let parameter_file = write_parameter_file(&tempdir, "object_tags = a=b", "");
        let config = load_config(&parameter_file).unwrap();
        assert!(config.object_tags.is_empty());
    }

    #[test]
    fn test_load_config_rejects_missing_mandatory_parameter() {
        let tempdir = tempfile::tempdir().unwrap();
        let parameter_file = tempdir.path().join("backint.cfg");
        std::fs::write(&parameter_file, "[cloud_storage]\nbucket = b\n").unwrap();
        let report = check_parameter_file(&parameter_file).unwrap();
        assert!(report
            .errors
            .iter()
            .any(|error| error.contains("auth_keypath")));
        assert!(report
            .errors
            .iter()
            .any(|error| error.contains("endpoint_url")));
    }

    #[test]
    fn test_load_config_rejects_multiline_apikey_file() {
        let tempdir = tempfile::tempdir().unwrap();
        let parameter_file = write_parameter_file(&tempdir, "", "");
        let keypath = tempdir.path().join("apikey");
        std::fs::write(&keypath, "line1\nline2\n").unwrap();
        assert!(load_config(&parameter_file).is_err());
    }
}
