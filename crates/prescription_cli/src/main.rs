//! Command-line entry point for the prescription store.
//!
//! # Responsibility
//! - Load `ServiceConfig` from the environment once at startup.
//! - Run one request-surface call per invocation and print its JSON body.
//!
//! # Invariants
//! - Exit code is 0 for 2xx responses, 1 for error responses and 2 for
//!   configuration or logging bootstrap failures.

use clap::{Parser, Subcommand};
use log::info;
use prescription_api::{health, ApiResponse, ListParams, PrescriptionApi};
use prescription_core::{core_version, init_logging, ServiceConfig, SERVICE_NAME};
use serde_json::json;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(name = "prescription", version, about = "Record and query prescriptions")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Record a new prescription.
    Create {
        #[arg(long, allow_negative_numbers = true)]
        appointment_id: i64,
        #[arg(long, allow_negative_numbers = true)]
        patient_id: i64,
        #[arg(long, allow_negative_numbers = true)]
        doctor_id: i64,
        #[arg(long)]
        medication: String,
        #[arg(long)]
        dosage: String,
        #[arg(long, allow_negative_numbers = true)]
        days: i64,
    },
    /// Show one prescription by id.
    Get { prescription_id: String },
    /// List prescriptions ordered by id.
    List {
        #[arg(long)]
        patient_id: Option<String>,
        #[arg(long)]
        appointment_id: Option<String>,
        #[arg(long)]
        page: Option<String>,
        #[arg(long)]
        page_size: Option<String>,
    },
    /// Liveness probe.
    Health,
    /// Print the effective configuration.
    Config,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match ServiceConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {err}");
            return ExitCode::from(2);
        }
    };

    if let Some(log_dir) = config.log_dir.as_ref() {
        if let Err(err) = init_logging(config.log_level, &log_dir.to_string_lossy()) {
            eprintln!("logging error: {err}");
            return ExitCode::from(2);
        }
    }
    info!(
        "event=cli_start module=cli status=ok version={} port={} database={}",
        core_version(),
        config.port,
        config.database_path.display()
    );

    let response = run(cli.command, &config);
    println!(
        "{}",
        serde_json::to_string_pretty(&response.body).unwrap_or_else(|_| response.body.to_string())
    );
    if response.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn run(command: Command, config: &ServiceConfig) -> ApiResponse {
    let api = PrescriptionApi::from_config(config);
    match command {
        Command::Create {
            appointment_id,
            patient_id,
            doctor_id,
            medication,
            dosage,
            days,
        } => {
            let body = json!({
                "appointment_id": appointment_id,
                "patient_id": patient_id,
                "doctor_id": doctor_id,
                "medication": medication,
                "dosage": dosage,
                "days": days,
            });
            api.create_prescription(&body.to_string())
        }
        Command::Get { prescription_id } => api.get_prescription(&prescription_id),
        Command::List {
            patient_id,
            appointment_id,
            page,
            page_size,
        } => api.list_prescriptions_with(&ListParams {
            patient_id,
            appointment_id,
            page,
            page_size,
        }),
        Command::Health => health(),
        Command::Config => config_response(config),
    }
}

fn config_response(config: &ServiceConfig) -> ApiResponse {
    ApiResponse {
        status: 200,
        body: json!({
            "service": SERVICE_NAME,
            "version": core_version(),
            "port": config.port,
            "database_path": config.database_path.display().to_string(),
            "max_page_size": config.max_page_size,
            "log_level": config.log_level,
            "log_dir": config.log_dir.as_ref().map(|dir| dir.display().to_string()),
        }),
        total_count: None,
    }
}
