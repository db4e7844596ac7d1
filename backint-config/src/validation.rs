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

use crate::params::{ValueKind, MAX_NUM_OBJECT_TAGS};

/// Validates one parameter value against its declared kind.
///
/// Returns a human readable explanation when the value is rejected.
pub(crate) fn validate_value(kind: ValueKind, value: &str) -> Result<(), String> {
    match kind {
        ValueKind::Str => Ok(()),
        ValueKind::File => validate_file(value),
        ValueKind::Int => validate_int(value).map(|_| ()),
        ValueKind::Range { min, max } => validate_range(value, min, max),
        ValueKind::List(possible_values) => validate_list(value, possible_values),
        ValueKind::ChunkSize => parse_chunksize(value).map(|_| ()),
        ValueKind::Period => parse_period(value).map(|_| ()),
        ValueKind::Tags => parse_tags(value).map(|_| ()),
        ValueKind::EndpointUrl => validate_url_prefix(value, "https://s3."),
        ValueKind::HttpsUrl => validate_url_prefix(value, "https://"),
    }
}

fn validate_file(value: &str) -> Result<(), String> {
    let path = Path::new(value);
    if !path.exists() {
        return Err("The file you specified does not exist.".to_string());
    }
    if std::fs::File::open(path).is_err() {
        return Err("The file you specified does not have read permissions.".to_string());
    }
    Ok(())
}

fn validate_int(value: &str) -> Result<i64, String> {
    value
        .parse::<i64>()
        .map_err(|_| "You did not specify an integer value.".to_string())
}

fn validate_range(value: &str, min: i64, max: i64) -> Result<(), String> {
    let value = validate_int(value)?;
    if value < min || value > max {
        return Err(format!("It must be between '{min}' and '{max}'."));
    }
    Ok(())
}

fn validate_list(value: &str, possible_values: &[&str]) -> Result<(), String> {
    if possible_values.contains(&value) {
        return Ok(());
    }
    let mut message = "It must be one of the following:".to_string();
    for possible_value in possible_values {
        message.push_str(&format!("\n\t{possible_value}"));
    }
    Err(message)
}

fn validate_url_prefix(value: &str, prefix: &str) -> Result<(), String> {
    if !value.starts_with(prefix) {
        return Err(format!(
            "You did not specify a valid url. The value must start with {prefix}"
        ));
    }
    Ok(())
}

/// Parses a chunk size: either a plain integer number of bytes, or
/// `<size><unit>` where unit is `KB`, `MB`, or `GB` (case-insensitive, powers
/// of 1024) and size is a non-zero integer.
pub(crate) fn parse_chunksize(value: &str) -> Result<u64, String> {
    const FORMAT_ERROR: &str = "The value you specified does not have the correct format. It must \
                                be either an integer value or must have the format <size><unit> \
                                while <unit> must be either 'KB', 'MB', or 'GB' and <size> must \
                                not be 0 or undefined.";
    if let Ok(num_bytes) = value.parse::<u64>() {
        return Ok(num_bytes);
    }
    if value.len() < 3 {
        return Err(FORMAT_ERROR.to_string());
    }
    let (size_str, unit) = value.split_at(value.len() - 2);
    let size: u64 = size_str.parse().map_err(|_| FORMAT_ERROR.to_string())?;
    if size == 0 {
        return Err(FORMAT_ERROR.to_string());
    }
    let multiplier: u64 = match unit.to_ascii_uppercase().as_str() {
        "KB" => 1024,
        "MB" => 1024 * 1024,
        "GB" => 1024 * 1024 * 1024,
        _ => return Err(FORMAT_ERROR.to_string()),
    };
    Ok(size * multiplier)
}

/// Parses an object lock retention period of the form `years,months,days`.
pub(crate) fn parse_period(value: &str) -> Result<(u32, u32, u32), String> {
    const FORMAT_ERROR: &str = "The value you specified for 'object_lock_retention_period' does \
                                not have the correct format. It must be a comma separated value \
                                string while the first position represents the years, the second \
                                position the months and the third position the days. All values \
                                must be integers.";
    let fields: Vec<&str> = value.split(',').collect();
    if fields.len() != 3 {
        return Err(FORMAT_ERROR.to_string());
    }
    let mut period = [0u32; 3];
    for (field, slot) in fields.iter().zip(period.iter_mut()) {
        *slot = field.trim().parse().map_err(|_| FORMAT_ERROR.to_string())?;
    }
    Ok((period[0], period[1], period[2]))
}

/// Parses the `object_tags` value, a comma separated list of `k=v` pairs.
pub(crate) fn parse_tags(value: &str) -> Result<Vec<(String, String)>, String> {
    if value.is_empty() {
        return Ok(Vec::new());
    }
    let tags: Vec<&str> = value.split(',').collect();
    if tags.len() > MAX_NUM_OBJECT_TAGS {
        return Err(format!(
            "You specified '{}' number of different tags, it must not exceed '{}'.",
            tags.len(),
            MAX_NUM_OBJECT_TAGS
        ));
    }
    let mut parsed_tags = Vec::with_capacity(tags.len());
    for tag in tags {
        match tag.split_once('=') {
            Some((tag_key, tag_value)) => {
                parsed_tags.push((tag_key.to_string(), tag_value.to_string()))
            }
            None => {
                return Err(format!(
                    "You specified '{tag}' as a tag. The format of the tag is wrong. It must be: \
                     'tag=val'"
                ));
            }
        }
    }
    Ok(parsed_tags)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chunksize() {
        assert_eq!(parse_chunksize("134000000").unwrap(), 134_000_000);
        assert_eq!(parse_chunksize("128MB").unwrap(), 134_217_728);
        assert_eq!(parse_chunksize("128mb").unwrap(), 134_217_728);
        assert_eq!(parse_chunksize("4KB").unwrap(), 4_096);
        assert_eq!(parse_chunksize("1GB").unwrap(), 1_073_741_824);

        assert!(parse_chunksize("0KB").is_err());
        assert!(parse_chunksize("KB").is_err());
        assert!(parse_chunksize("12TB").is_err());
        assert!(parse_chunksize("twelve").is_err());
    }

    #[test]
    fn test_parse_period() {
        assert_eq!(parse_period("0,0,0").unwrap(), (0, 0, 0));
        assert_eq!(parse_period("1,6,15").unwrap(), (1, 6, 15));

        assert!(parse_period("1,2").is_err());
        assert!(parse_period("1,2,3,4").is_err());
        assert!(parse_period("one,2,3").is_err());
    }

    #[test]
    fn test_parse_tags() {
        assert!(parse_tags("").unwrap().is_empty());
        assert_eq!(
            parse_tags("app=hana,env=prod").unwrap(),
            vec![
                ("app".to_string(), "hana".to_string()),
                ("env".to_string(), "prod".to_string())
            ]
        );

        assert!(parse_tags("notatag").is_err());
        let too_many_tags = (0..11)
            .map(|tag_idx| format!("k{tag_idx}=v"))
            .collect::<Vec<_>>()
            .join(",");
        assert!(parse_tags(&too_many_tags).is_err());
    }

    #[test]
    fn test_validate_range() {
        assert!(validate_range("1", 1, 20).is_ok());
        assert!(validate_range("20", 1, 20).is_ok());
        assert!(validate_range("0", 1, 20).is_err());
        assert!(validate_range("21", 1, 20).is_err());
        assert!(validate_range("ten", 1, 20).is_err());
    }

    #[test]
    fn test_validate_url_prefix() {
        assert!(validate_url_prefix("https://s3.eu-de.cloud", "https://s3.").is_ok());
        assert!(validate_url_prefix("http://x", "https://s3.").is_err());
        assert!(validate_url_prefix("https://iam.cloud", "https://s3.").is_err());
    }
}
