#![forbid(unsafe_code)]

//! `livechat-ctl` — local operator CLI for the `livechat` server.
//!
//! Connects to the IPC socket and sends one JSON command per invocation.

use std::io::{BufRead, BufReader, Write};

use clap::{Parser, Subcommand};
use interprocess::local_socket::{traits::Stream as _, GenericNamespaced, Stream, ToNsName};

#[derive(Debug, Parser)]
#[command(
    name = "livechat-ctl",
    about = "Local CLI for the livechat server",
    version,
    long_about = None
)]
struct Cli {
    /// IPC socket name (must match the server's `ipc_name` config).
    #[arg(long, default_value = "livechat")]
    ipc_name: String,

    /// Shared secret matching the server's `ipc_auth_token`.
    #[arg(long)]
    auth_token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print dashboard statistics.
    Stats,

    /// List waiting conversations in arrival order.
    Waiting,

    /// List agents with their load and capacity.
    Agents,

    /// Change an agent's presence.
    Availability {
        /// Agent ID.
        id: String,
        /// `online` or `offline`.
        status: String,
        /// Mark the agent unavailable while online (on a break).
        #[arg(long)]
        on_break: bool,
    },

    /// Close a conversation.
    Close {
        /// Conversation ID.
        id: String,
        /// Optional visitor rating (1-5).
        #[arg(long)]
        rating: Option<u8>,
    },

    /// Return an assigned, unanswered conversation to the queue.
    Requeue {
        /// Conversation ID.
        id: String,
    },

    /// Run an assignment pass now.
    Sweep,
}

fn main() {
    let args = Cli::parse();

    let mut request_json = match &args.command {
        Command::Stats => serde_json::json!({ "command": "stats" }),
        Command::Waiting => serde_json::json!({ "command": "waiting" }),
        Command::Agents => serde_json::json!({ "command": "agents" }),
        Command::Availability {
            id,
            status,
            on_break,
        } => serde_json::json!({
            "command": "availability",
            "id": id,
            "status": status,
            "available": status == "online" && !on_break,
        }),
        Command::Close { id, rating } => {
            let mut req = serde_json::json!({ "command": "close", "id": id });
            if let Some(r) = rating {
                req["rating"] = serde_json::Value::from(*r);
            }
            req
        }
        Command::Requeue { id } => serde_json::json!({ "command": "requeue", "id": id }),
        Command::Sweep => serde_json::json!({ "command": "sweep" }),
    };

    if let Some(ref token) = args.auth_token {
        request_json["auth_token"] = serde_json::Value::String(token.clone());
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
            eprintln!("Failed to connect to server: {err}");
            eprintln!("Is livechat running with ipc_name '{}'?", args.ipc_name);
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
