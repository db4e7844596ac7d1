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

//! Command line surface of the `backint` binary: argument parsing and
//! validation, logging setup, the pre-flight bucket checks, and the dispatch
//! into the four backint functions.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use backint_config::{check_parameter_file, load_config, AgentLogLevel, BackintConfig};
use backint_core::backup::backup;
use backint_core::delete::delete;
use backint_core::input::read_input_file;
use backint_core::inquire::inquire;
use backint_core::restore::restore;
use backint_core::results::ResultLog;
use backint_core::{AppContext, BACKINT_PROTOCOL_VERSION, TOOL_VERSION};
use backint_storage::{S3CompatibleObjectStorage, Storage};
use clap::{Arg, ArgAction, ArgMatches, Command};
use tracing::{debug, error, info, Level};

/// Process exit codes of the Backint interface.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const WRONG_PARAMETER: i32 = 2;

pub fn build_cli() -> Command {
    Command::new("backint")
        .about("Backint connector streaming database backups to S3 compatible object storage")
        .disable_version_flag(true)
        .arg(
            Arg::new("parameter-file")
                .short('p')
                .value_name("PARAMETER_FILE")
                .help("Path to the parameter file"),
        )
        .arg(Arg::new("user-id").short('u').value_name("USER_ID").help("User id"))
        .arg(
            Arg::new("function")
                .short('f')
                .value_name("FUNCTION")
                .help("Function to execute: backup, restore, inquire, or delete"),
        )
        .arg(
            Arg::new("input-file")
                .short('i')
                .value_name("INPUT_FILE")
                .help("Work list handed over by the backup agent"),
        )
        .arg(
            Arg::new("output-file")
                .short('o')
                .value_name("OUTPUT_FILE")
                .help("File the result lines are appended to"),
        )
        .arg(
            Arg::new("backup-id")
                .short('s')
                .value_name("BACKUP_ID")
                .value_parser(clap::value_parser!(i64))
                .help("Backup id"),
        )
        .arg(
            Arg::new("number-of-objects")
                .short('c')
                .value_name("NUM_OBJECTS")
                .value_parser(clap::value_parser!(i64))
                .help("Number of objects"),
        )
        .arg(
            Arg::new("backup-level")
                .short('l')
                .value_name("BACKUP_LEVEL")
                .help("Backup level: COMPLETE, LOG, INCREMENTAL, or DIFFERENTIAL"),
        )
        .arg(
            Arg::new("version")
                .short('V')
                .short_alias('v')
                .action(ArgAction::SetTrue)
                .help("Print version and exit"),
        )
        .arg(
            Arg::new("check")
                .long("check")
                .action(ArgAction::SetTrue)
                .help("Validate the parameter file and exit"),
        )
}

/// Functions callable through the Backint interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Backup,
    Delete,
    Inquire,
    Restore,
}

impl Function {
    pub fn from_arg(function_arg: &str) -> Option<Function> {
        match function_arg.to_uppercase().as_str() {
            "BACKUP" => Some(Function::Backup),
            "DELETE" => Some(Function::Delete),
            "INQUIRE" => Some(Function::Inquire),
            "RESTORE" => Some(Function::Restore),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct Arguments {
    pub parameter_file: Option<PathBuf>,
    pub user_id: Option<String>,
    pub function: Option<String>,
    pub input_file: Option<PathBuf>,
    pub output_file: Option<PathBuf>,
    pub backup_id: Option<i64>,
    pub number_of_objects: Option<i64>,
    pub backup_level: Option<String>,
    pub print_version: bool,
    pub check_parameters: bool,
}

impl Arguments {
    pub fn parse_cli_args(matches: &ArgMatches) -> Arguments {
        Arguments {
            parameter_file: matches.get_one::<String>("parameter-file").map(PathBuf::from),
            user_id: matches.get_one::<String>("user-id").cloned(),
            function: matches.get_one::<String>("function").cloned(),
            input_file: matches.get_one::<String>("input-file").map(PathBuf::from),
            output_file: matches.get_one::<String>("output-file").map(PathBuf::from),
            backup_id: matches.get_one::<i64>("backup-id").copied(),
            number_of_objects: matches.get_one::<i64>("number-of-objects").copied(),
            backup_level: matches.get_one::<String>("backup-level").cloned(),
            print_version: matches.get_flag("version"),
            check_parameters: matches.get_flag("check"),
        }
    }
}

/// Checks that a file argument points at a usable file. With
/// `must_exist = false` a missing file is fine, an unreadable one is not.
fn file_check(path: &Path, must_exist: bool) -> Option<String> {
    if !path.exists() {
        if must_exist {
            return Some(format!("File '{}' does not exist.", path.display()));
        }
        return None;
    }
    if std::fs::File::open(path).is_err() {
        return Some(format!("File '{}' is not readable.", path.display()));
    }
    None
}

pub fn validate_arguments(args: &Arguments) -> Result<(), String> {
    if args.print_version {
        return Ok(());
    }
    if args.check_parameters {
        return match &args.parameter_file {
            Some(parameter_file) => match file_check(parameter_file, true) {
                Some(message) => Err(format!("Parameter {message}")),
                None => Ok(()),
            },
            None => {
                Err("You specified --check but the parameter file option is missing.".to_string())
            }
        };
    }

    let Some(function) = args.function.as_deref().and_then(Function::from_arg) else {
        return Err("Invalid function specified.".to_string());
    };
    if let Some(parameter_file) = &args.parameter_file {
        if let Some(message) = file_check(parameter_file, true) {
            return Err(format!("Parameter {message}"));
        }
    }
    if args.user_id.as_deref().unwrap_or("").is_empty() {
        return Err("Userid must be specified.".to_string());
    }
    match &args.input_file {
        Some(input_file) => {
            if let Some(message) = file_check(input_file, true) {
                return Err(format!("Input {message}"));
            }
        }
        None => return Err("Input file must be specified.".to_string()),
    }
    match &args.output_file {
        Some(output_file) => {
            if let Some(message) = file_check(output_file, false) {
                return Err(format!("Output {message}"));
            }
        }
        None => return Err("Output file must be specified.".to_string()),
    }
    if function == Function::Backup {
        if args.backup_id.is_none() {
            return Err("Function 'backup' requires a backup id.".to_string());
        }
        match args.backup_level.as_deref() {
            Some("COMPLETE" | "LOG" | "INCREMENTAL" | "DIFFERENTIAL") => {}
            _ => return Err("Invalid backup level specified.".to_string()),
        }
    }
    Ok(())
}

/// Runs the tool and returns its exit code.
pub async fn run(matches: ArgMatches) -> i32 {
    let args = Arguments::parse_cli_args(&matches);

    if args.print_version {
        println!("\"{BACKINT_PROTOCOL_VERSION}\" \"{TOOL_VERSION}\"");
        return SUCCESS;
    }
    if let Err(message) = validate_arguments(&args) {
        println!("{message}");
        return WRONG_PARAMETER;
    }
    if args.check_parameters {
        return check_parameters(&args);
    }

    // Validated above; missing values cannot reach this point.
    let (Some(function_arg), Some(input_file), Some(output_file)) =
        (&args.function, &args.input_file, &args.output_file)
    else {
        return WRONG_PARAMETER;
    };
    let Some(function) = Function::from_arg(function_arg) else {
        return WRONG_PARAMETER;
    };

    let Some(input) = read_input_file(input_file) else {
        println!("Error: the input file is empty or could not be read.");
        return WRONG_PARAMETER;
    };

    let parameter_file = args.parameter_file.clone().unwrap_or_default();
    let config = match load_config(&parameter_file) {
        Ok(config) => config,
        Err(config_error) => {
            println!("Error generating the configuration. {config_error:#}");
            return WRONG_PARAMETER;
        }
    };

    if let Err(logging_error) = setup_logging(&config, output_file) {
        println!(
            "Could not open logfile '{}' for writing. {logging_error:#}",
            output_file.display()
        );
        return FAILURE;
    }
    log_startup_info(&config, &input);

    let ctx = AppContext {
        config,
        input,
        output_path: output_file.clone(),
    };
    let storage: Arc<dyn Storage> = Arc::new(S3CompatibleObjectStorage::new(&ctx.config));

    match storage.bucket_exists().await {
        Ok(true) => {}
        Ok(false) => {
            error!(bucket = %ctx.config.bucket, "bucket does not exist");
            return FAILURE;
        }
        Err(check_error) => {
            error!(
                bucket = %ctx.config.bucket,
                error = %check_error,
                "error during getting bucket information"
            );
            return FAILURE;
        }
    }
    match storage.bucket_versioning_enabled().await {
        Ok(true) => {}
        Ok(false) => {
            error!(bucket = %ctx.config.bucket, "versioning must be enabled for the bucket");
            return FAILURE;
        }
        Err(check_error) => {
            error!(
                bucket = %ctx.config.bucket,
                error = %check_error,
                "error discovering the versioning of the bucket"
            );
            return FAILURE;
        }
    }

    let mut result_log = ResultLog::new();
    let success = match function {
        Function::Backup => backup(&ctx, storage, &mut result_log).await,
        Function::Delete => delete(&ctx, storage, &mut result_log).await,
        Function::Inquire => inquire(&ctx, storage, &mut result_log).await,
        Function::Restore => restore(&ctx, storage, &mut result_log).await,
    };

    if let Err(dump_error) = result_log.dump(&ctx.output_path) {
        error!(
            output_file = %ctx.output_path.display(),
            error = %dump_error,
            "failed to write the result lines"
        );
        return FAILURE;
    }
    if success {
        SUCCESS
    } else {
        FAILURE
    }
}

fn check_parameters(args: &Arguments) -> i32 {
    // validate_arguments guarantees the parameter file is present.
    let Some(parameter_file) = &args.parameter_file else {
        return WRONG_PARAMETER;
    };
    println!(
        "Validating parameter configuration file {}...\n",
        parameter_file.display()
    );
    match check_parameter_file(parameter_file) {
        Ok(report) => {
            for message in &report.messages {
                println!("\t{message}");
            }
            if report.is_ok() {
                println!("All configuration parameters are valid.");
                SUCCESS
            } else {
                println!("Error(s) during validation of parameter configuration file.");
                WRONG_PARAMETER
            }
        }
        Err(read_error) => {
            println!("{read_error:#}");
            WRONG_PARAMETER
        }
    }
}

fn setup_logging(config: &BackintConfig, output_file: &Path) -> anyhow::Result<()> {
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(output_file)?;
    let level = match config.agent_log_level {
        AgentLogLevel::Debug | AgentLogLevel::Http => Level::DEBUG,
        AgentLogLevel::Info => Level::INFO,
        AgentLogLevel::Warning => Level::WARN,
        AgentLogLevel::Error | AgentLogLevel::Critical => Level::ERROR,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(Arc::new(log_file))
        .with_ansi(false)
        .with_target(false)
        .try_init()
        .map_err(|init_error| anyhow::anyhow!("failed to set up logging: {init_error}"))?;
    Ok(())
}

fn log_startup_info(config: &BackintConfig, input: &[backint_core::input::InputEntry]) {
    info!(tool_version = TOOL_VERSION, "running backint");
    info!("using backint configuration settings:");
    for (config_key, config_value) in config.loggable_entries() {
        info!("{config_key} = {config_value}");
    }
    debug!("content of the input file:");
    for entry in input {
        debug!(keyword = %entry.keyword, parameter = %entry.parameter, "input entry");
    }
}
