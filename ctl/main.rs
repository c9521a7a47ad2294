#![forbid(unsafe_code)]

//! `procwarden-ctl`: local CLI companion for `procwarden`.
//!
//! Connects to the IPC socket and sends JSON commands to the daemon. The
//! shared-secret token is read from the file the daemon writes at startup.

use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use interprocess::local_socket::{traits::Stream as _, GenericNamespaced, Stream, ToNsName};

#[derive(Debug, Parser)]
#[command(
    name = "procwarden-ctl",
    about = "Local CLI for the procwarden daemon",
    version,
    long_about = None
)]
struct Cli {
    /// IPC socket name (must match the daemon's `[ipc] name`).
    #[arg(long, default_value = "procwarden")]
    ipc_name: String,

    /// File holding the IPC auth token (the daemon's `<data_dir>/ipc.token`).
    #[arg(long, default_value = "fileio/ipc.token")]
    token_file: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Send a phrase to the controller as a non-interactive request.
    Say {
        /// Phrase text, e.g. "restart mirror" or "restart all".
        phrase: Vec<String>,
        /// Confirm destructive actions (host restart/shutdown) up front.
        #[arg(long)]
        yes: bool,
    },

    /// List live background processes.
    List,

    /// Show restart records waiting to be picked up.
    Pending,

    /// Stop a background process by name.
    Stop {
        /// Registered process name.
        name: String,
    },

    /// Record an immediate restart for a background process.
    Restart {
        /// Registered process name.
        name: String,
    },
}

fn main() {
    let args = Cli::parse();

    let mut request_json = match &args.command {
        Command::Say { phrase, yes } => {
            serde_json::json!({ "command": "say", "phrase": phrase.join(" "), "confirm": yes })
        }
        Command::List => serde_json::json!({ "command": "list" }),
        Command::Pending => serde_json::json!({ "command": "pending" }),
        Command::Stop { name } => serde_json::json!({ "command": "stop", "name": name }),
        Command::Restart { name } => serde_json::json!({ "command": "restart", "name": name }),
    };

    match std::fs::read_to_string(&args.token_file) {
        Ok(token) => {
            request_json["auth_token"] = serde_json::Value::String(token.trim().to_owned());
        }
        Err(err) => {
            eprintln!(
                "Warning: could not read token file {}: {err}",
                args.token_file.display()
            );
        }
    }

    match send_ipc_command(&args.ipc_name, &request_json) {
        Ok(response) => {
            if let Some(obj) = response.as_object() {
                let ok = obj
                    .get("ok")
                    .and_then(serde_json::Value::as_bool)
                    .unwrap_or(false);
                if ok {
                    if let Some(data) = obj.get("data") {
                        println!("{}", serde_json::to_string_pretty(data).unwrap_or_default());
                    } else {
                        println!("OK");
                    }
                } else {
                    let err_msg = obj
                        .get("error")
                        .and_then(|v| v.as_str())
                        .unwrap_or("unknown error");
                    eprintln!("Error: {err_msg}");
                    std::process::exit(1);
                }
            } else {
                println!("{response}");
            }
        }
        Err(err) => {
            eprintln!("Failed to connect to procwarden: {err}");
            eprintln!("Is procwarden running with ipc name '{}'?", args.ipc_name);
            std::process::exit(1);
        }
    }
}

/// Connect to the IPC socket, send a JSON command, and read the response.
fn send_ipc_command(
    ipc_name: &str,
    request: &serde_json::Value,
) -> std::result::Result<serde_json::Value, Box<dyn std::error::Error>> {
    let name = ipc_name.to_ns_name::<GenericNamespaced>()?;
    let mut stream = Stream::connect(name)?;

    let mut request_line = serde_json::to_string(request)?;
    request_line.push('\n');
    stream.write_all(request_line.as_bytes())?;
    stream.flush()?;

    let mut reader = BufReader::new(&stream);
    let mut response_line = String::new();
    reader.read_line(&mut response_line)?;

    let response: serde_json::Value = serde_json::from_str(response_line.trim())?;
    Ok(response)
}
