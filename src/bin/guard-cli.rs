use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde_json::{json, Value};

use secure_gate::config::{load_config, ConfigError};
use secure_gate::observability::logging::init_logging;
use secure_gate::security::field::{Constraints, FieldType};
use secure_gate::security::{check_password_strength, sanitize, validate};

#[derive(Parser)]
#[command(name = "guard-cli")]
#[command(about = "Inspect sanitization, validation and gate configuration", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sanitize a value as the given field type
    Sanitize {
        #[arg(short = 't', long = "type")]
        field_type: FieldType,
        input: String,
    },
    /// Validate a value as the given field type
    Validate {
        #[arg(short = 't', long = "type")]
        field_type: FieldType,
        #[arg(long)]
        required: bool,
        #[arg(long)]
        min: Option<usize>,
        #[arg(long)]
        max: Option<usize>,
        input: String,
    },
    /// Score password strength
    Password { password: String },
    /// Load and validate a configuration file
    CheckConfig { path: PathBuf },
}

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let (output, success) = match cli.command {
        Commands::Sanitize { field_type, input } => (
            json!({
                "type": field_type.as_str(),
                "sanitized": sanitize(&input, field_type),
            }),
            true,
        ),
        Commands::Validate {
            field_type,
            required,
            min,
            max,
            input,
        } => {
            let constraints = Constraints {
                required,
                min_length: min,
                max_length: max,
            };
            let result = validate(&input, field_type, &constraints);
            let valid = result.is_valid;
            (serde_json::to_value(result)?, valid)
        }
        Commands::Password { password } => {
            let strength = check_password_strength(&password);
            let valid = strength.is_valid;
            (serde_json::to_value(strength)?, valid)
        }
        Commands::CheckConfig { path } => match load_config(&path) {
            Ok(config) => (json!({ "valid": true, "config": config }), true),
            Err(ConfigError::Validation(errors)) => {
                let errors: Vec<Value> = errors
                    .iter()
                    .map(|e| json!({ "field": e.field, "message": e.message }))
                    .collect();
                (json!({ "valid": false, "errors": errors }), false)
            }
            Err(e) => (json!({ "valid": false, "errors": [e.to_string()] }), false),
        },
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
