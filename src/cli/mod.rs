use std::io;
use std::process::ExitCode;

use chrono_tz::Tz;
use clap::Parser;
use tracing::{debug, error};

use crate::booking;
use crate::core::{AppConfig, logging};
use crate::ews::{BookingRequest, EwsConfig, EwsError};

/// Book a meeting room on an Exchange calendar.
///
/// Exit codes: 0 booked, 2 usage or date error, 3 authentication rejected,
/// 4 transient network failure, 5 the save itself failed.
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Organizer mailbox address, also used to log in
    #[arg(short = 'u', long)]
    pub username: String,

    /// Exchange server hostname
    #[arg(short = 's', long)]
    pub server: String,

    /// Display name of the room
    #[arg(short = 'l', long)]
    pub location: String,

    /// Resource mailbox of the room
    #[arg(short = 'm', long)]
    pub location_mail: String,

    /// Meeting subject
    #[arg(short = 'b', long)]
    pub subject: String,

    /// Local start date-time, e.g. "2018-03-21 18:00"
    #[arg(short = 'd', long)]
    pub date: String,

    /// Meeting length in minutes
    #[arg(short = 'a', long)]
    pub duration: u32,

    /// IANA timezone the date is interpreted in
    #[arg(long, default_value = "Asia/Shanghai")]
    pub timezone: Tz,
}

/// Use the password from the environment when present, otherwise ask on the
/// terminal. The prompt never echoes and the password is never logged.
pub fn resolve_password<F>(from_env: Option<String>, prompt: F) -> io::Result<String>
where
    F: FnOnce() -> io::Result<String>,
{
    match from_env {
        Some(password) => Ok(password),
        None => prompt(),
    }
}

pub async fn run() -> ExitCode {
    let args = Cli::parse();
    let config = AppConfig::default();

    let _guards = match logging::init(&config) {
        Ok(guards) => guards,
        Err(err) => {
            eprintln!("Failed to set up logging: {err}");
            return ExitCode::from(2);
        }
    };

    let password = match resolve_password(config.password.clone(), || {
        rpassword::prompt_password("EXCHANGE password: ")
    }) {
        Ok(password) => password,
        Err(err) => {
            error!("Could not read password: {}", err);
            eprintln!("Could not read password: {err}");
            return ExitCode::from(2);
        }
    };

    let request = BookingRequest {
        username: args.username.clone(),
        server: args.server.clone(),
        location: args.location,
        location_mail: args.location_mail,
        subject: args.subject,
        date: args.date,
        duration_minutes: args.duration,
    };
    let ews = EwsConfig::new(args.server, args.username, password);

    match booking::book(&ews, &request, args.timezone).await {
        Ok(item) => {
            println!(
                "Booked {} for {} ({})",
                request.location, request.subject, item.id
            );
            ExitCode::SUCCESS
        }
        Err(err) => report_failure(err),
    }
}

fn report_failure(err: EwsError) -> ExitCode {
    match &err {
        EwsError::Authentication { message, .. } => {
            error!("Login failed, message: {}", message);
            eprintln!("{err}");
        }
        // Transient failures abort quietly: debug log and exit code only
        EwsError::Transient { .. } => debug!("{}", err),
        other => {
            error!("{}", other);
            eprintln!("{err}");
        }
    }
    ExitCode::from(err.exit_code())
}
