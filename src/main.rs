use std::io::{self, BufReader};
use std::net::IpAddr;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use frame_chat::config::{DEFAULT_MAX_CLIENTS, DEFAULT_PORT};
use frame_chat::console::Console;
use frame_chat::{Server, ServerConfig};

#[derive(Parser, Debug)]
#[command(name = "frame-chat-server")]
#[command(version)]
#[command(about = "Relay chat messages between every connected client")]
struct Cli {
    /// Port to listen on
    #[arg(default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    bind: IpAddr,

    /// Maximum number of simultaneous clients
    #[arg(long, default_value_t = DEFAULT_MAX_CLIENTS)]
    max_clients: usize,

    /// Do not read operator commands from stdin
    #[arg(long)]
    no_console: bool,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if !e.use_stderr() => e.exit(),
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(1);
        }
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(1)
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = ServerConfig {
        bind: cli.bind,
        port: cli.port,
        max_clients: cli.max_clients,
    };
    let server = Server::bind(&config)?;
    let addr = server.local_addr()?;

    println!("/===============================\\");
    println!("| Welcome to the chat room!     |");
    println!("| Server started on port {:<5}. |", addr.port());
    println!("\\===============================/");
    println!("[Waiting for client connections...]");

    let shutdown = server.shutdown_handle();
    let on_signal = shutdown.clone();
    ctrlc::set_handler(move || on_signal.trigger())?;

    if !cli.no_console {
        let console = Console::new(server.roster()).with_shutdown(shutdown);
        std::thread::Builder::new()
            .name("admin-console".to_string())
            .spawn(move || {
                let stdin = BufReader::new(io::stdin());
                if let Err(e) = console.run(stdin, io::stdout()) {
                    log::warn!("Console stopped: {}", e);
                }
            })?;
    }

    server.run()?;
    println!("Server stopped");
    Ok(())
}
