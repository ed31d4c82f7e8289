//! noshctl - control CLI for the Nosh clarification daemon.

mod client;

use anyhow::Result;
use clap::{Parser, Subcommand};
use client::NoshClient;
use nosh_common::clarification::{CancelReport, StatusReport};
use nosh_common::ipc::{IncomingMessage, PayloadKind, Request, Response};

#[derive(Parser)]
#[command(name = "noshctl", version, about = "Control CLI for noshd")]
struct Cli {
    /// Daemon socket path (default: $NOSHD_SOCKET or /run/nosh/nosh.sock)
    #[arg(long, global = true)]
    socket: Option<String>,

    /// User id to operate on behalf of
    #[arg(long, global = true, default_value_t = 0)]
    user: i64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check daemon liveness
    Ping,
    /// Show the user's clarification status
    Status,
    /// Cancel the user's pending clarification
    Cancel,
    /// Send a food description as the user
    Send {
        /// The food description text
        text: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut client = NoshClient::connect(cli.socket.as_deref()).await?;

    let request = match &cli.command {
        Command::Ping => Request::Ping,
        Command::Status => Request::Status { user_id: cli.user },
        Command::Cancel => Request::Cancel { user_id: cli.user },
        Command::Send { text } => Request::Message {
            user_id: cli.user,
            message: IncomingMessage {
                kind: PayloadKind::Text,
                content: text.join(" "),
            },
        },
    };

    match client.call(&request).await? {
        Response::Pong => println!("noshd is up"),
        Response::Reply { text } => println!("{}", text),
        Response::Status { report } => print_status(&report),
        Response::Cancel { report } => print_cancel(&report),
        Response::Error { message } => {
            eprintln!("Error: {}", message);
            std::process::exit(1);
        }
    }

    Ok(())
}

fn print_status(report: &StatusReport) {
    match report {
        StatusReport::None => println!("No pending clarification."),
        StatusReport::Pending {
            uncertain_items,
            expires_in_secs,
        } => {
            println!("Pending clarification:");
            for item in uncertain_items {
                println!("  - {}", item);
            }
            let hours = expires_in_secs / 3600;
            let minutes = (expires_in_secs % 3600) / 60;
            println!("Expires in {}h {:02}m", hours, minutes);
        }
    }
}

fn print_cancel(report: &CancelReport) {
    match report {
        CancelReport::Cancelled => println!("Pending clarification cancelled."),
        CancelReport::NothingToCancel => println!("Nothing to cancel."),
    }
}
