use anyhow::Result;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use notify_rust::Notification;
use serde_json::json;
use std::time::Duration;
use tabled::{Table, Tabled};

use printcloud::{
    ClientConfig, FileTokenStore, ListParams, Printer, Printers, SessionManager, WaitOptions,
};

#[derive(Parser)]
#[command(name = "printcloud")]
#[command(about = "A CLI for a cloud 3D-printing service")]
#[command(version)]
struct Cli {
    /// App key provided when the application was registered
    #[arg(long, env = "PRINTCLOUD_CLIENT_ID")]
    client_id: String,

    /// Authentication server URL that exchanges the client secret for a guest token
    #[arg(long, env = "PRINTCLOUD_GUEST_TOKEN_URL")]
    guest_token_url: String,

    /// Authentication server URL that exchanges an authorization code for an access token
    #[arg(long, env = "PRINTCLOUD_ACCESS_TOKEN_URL")]
    access_token_url: String,

    /// Authentication server URL that extends an access token's expiry
    #[arg(long, env = "PRINTCLOUD_REFRESH_TOKEN_URL")]
    refresh_token_url: String,

    /// Base URL of the printing API
    #[arg(long, env = "PRINTCLOUD_API_URL")]
    api_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the login URL, or complete a login with the code it produced
    Login {
        /// Authorization code returned after the user signed in
        #[arg(long)]
        code: Option<String>,
    },
    /// Discard the stored user session
    Logout,
    /// Extend the current user session via the refresh endpoint
    Refresh,
    /// List printers registered to the account
    Printers,
    /// Show the live status of a printer
    Status {
        /// Printer id
        id: String,
    },
    /// Send a command to a printer
    Command {
        /// Printer id
        id: String,
        /// Command name (pause, resume, cancel, reset, calibrate, home, park, firmware_upgrade, log)
        command: String,
        /// Job id, for job-scoped commands
        #[arg(long)]
        job: Option<String>,
        /// Firmware package URL, for firmware_upgrade
        #[arg(long)]
        package_url: Option<String>,
        /// Poll the command until it finishes instead of returning the task id
        #[arg(long)]
        wait: bool,
        /// Polling deadline in seconds, with --wait
        #[arg(long, default_value_t = 60)]
        timeout: u64,
    },
}

#[derive(Tabled)]
struct PrinterRow {
    #[tabled(rename = "Id")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Firmware")]
    firmware: String,
    #[tabled(rename = "Online")]
    online: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    let config = ClientConfig::new(
        cli.client_id,
        cli.guest_token_url,
        cli.access_token_url,
        cli.refresh_token_url,
        cli.api_url,
    );
    let session = SessionManager::new(config, Box::new(FileTokenStore::new()?));

    match cli.command {
        Commands::Login { code } => match code {
            None => {
                println!("Sign in at:\n  {}", session.login_redirect_url());
                println!("then run: printcloud login --code <CODE>");
            }
            Some(code) => {
                session.complete_login(&code).await?;
                println!("Logged in successfully.");
            }
        },
        Commands::Logout => {
            session.logout()?;
            println!("Logged out successfully.");
        }
        Commands::Refresh => {
            let record = session.refresh_access_token().await?;
            println!("Session extended for {} seconds.", record.expires_in);
        }
        Commands::Printers => {
            require_login(&session)?;
            info!("Fetching printer list...");
            let printers = Printers::get(&session, &ListParams::default()).await?;

            if printers.is_empty() {
                println!("No printers registered to this account.");
                return Ok(());
            }

            let rows: Vec<PrinterRow> = printers
                .items()
                .iter()
                .map(|printer| PrinterRow {
                    id: printer.id.clone(),
                    name: printer
                        .name
                        .clone()
                        .unwrap_or_else(|| "Unnamed".to_string()),
                    firmware: printer
                        .firmware
                        .clone()
                        .unwrap_or_else(|| "Unknown".to_string()),
                    online: if printer.is_online() { "Yes" } else { "No" }.to_string(),
                })
                .collect();

            println!("{}", Table::new(&rows));
        }
        Commands::Status { id } => {
            require_login(&session)?;
            let mut printer = Printer::get_by_id(&session, &id).await?;
            printer.get_status(&session).await?;

            println!(
                "Printer {} is {}{}",
                printer.id,
                if printer.is_online() { "online" } else { "offline" },
                if printer.is_printing() { ", printing" } else { "" },
            );
        }
        Commands::Command {
            id,
            command,
            job,
            package_url,
            wait,
            timeout,
        } => {
            require_login(&session)?;
            let printer = Printer::get_by_id(&session, &id).await?;

            let params = match (&job, &package_url) {
                (Some(job_id), _) => Some(json!({ "job_id": job_id })),
                (_, Some(url)) => Some(json!({ "package_url": url })),
                _ => None,
            };

            if wait {
                let status =
                    wait_with_spinner(&session, &printer, &command, params, timeout).await?;
                println!("Command {} finished (progress {:.0}%).", command, status.progress * 100.0);
            } else {
                let handle = printer.send_command(&session, &command, params).await?;
                println!("Command {} accepted as task {}.", handle.command, handle.task_id);
            }
        }
    }

    Ok(())
}

fn require_login(session: &SessionManager) -> Result<()> {
    if !session.is_access_token_valid() {
        anyhow::bail!("Not logged in. Run 'printcloud login' first.");
    }
    Ok(())
}

/// Drive a command to completion behind an animated spinner fed by the
/// poller's progress callback, with a desktop notification at the end.
async fn wait_with_spinner(
    session: &SessionManager,
    printer: &Printer,
    command: &str,
    params: Option<serde_json::Value>,
    timeout_secs: u64,
) -> Result<printcloud::CommandStatus> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner.set_message(format!("Running {}...", command));

    let progress_spinner = spinner.clone();
    let progress_command = command.to_string();
    let options = WaitOptions {
        timeout: Duration::from_secs(timeout_secs),
        on_progress: Some(Box::new(move |status| {
            progress_spinner.set_message(format!(
                "Running {} - {:.0}%",
                progress_command,
                status.progress * 100.0
            ));
        })),
        ..Default::default()
    };

    let result = printer
        .send_command_and_wait(session, command, params, options)
        .await;

    match &result {
        Ok(_) => spinner.finish_with_message(format!("{} complete", command)),
        Err(err) => spinner.finish_with_message(format!("{} failed: {}", command, err)),
    }
    let status = result?;

    if let Err(e) = Notification::new()
        .summary("Printer command finished")
        .body(&format!("{} completed on printer {}", command, printer.id))
        .timeout(5000)
        .show()
    {
        warn!("Failed to send notification: {}", e);
    }

    Ok(status)
}
