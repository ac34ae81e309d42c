use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, BufReader};

use frame_chat::ClientConfig;
use frame_chat::client::{self, Transcript};
use frame_chat::config::{DEFAULT_PORT, DEFAULT_TRANSCRIPT};

const SAVE_COMMAND: &str = "-p";
const PROMPT: &str = "(Me): ";

#[derive(Parser, Debug)]
#[command(name = "frame-chat-client")]
#[command(version)]
#[command(about = "Join a frame-chat room")]
struct Cli {
    /// Server host name or address
    host: String,

    /// Server port
    #[arg(default_value_t = DEFAULT_PORT)]
    port: u16,

    /// File written by the `-p` command
    #[arg(long, default_value = DEFAULT_TRANSCRIPT)]
    transcript: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if !e.use_stderr() => e.exit(),
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(1);
        }
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let config = ClientConfig {
        host: cli.host,
        port: cli.port,
        transcript: cli.transcript,
    };
    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(1)
        }
    }
}

fn prompt() {
    print!("{}", PROMPT);
    let _ = std::io::stdout().flush();
}

async fn run(config: ClientConfig) -> Result<()> {
    let (stream, addr) = client::connect(&config.host, config.port).await?;

    println!("/====================================");
    println!("| Welcome to the chat room!");
    println!("| Connected to Server: {}", config.host);
    println!("| Server Address: {}", addr.ip());
    println!("\\====================================");

    let (mut reader, mut writer) = client::split(stream);
    let transcript = Arc::new(Mutex::new(Transcript::default()));

    let incoming = Arc::clone(&transcript);
    let mut read_task = tokio::spawn(async move {
        loop {
            match reader.next_frame().await {
                Ok(Some(frame)) if frame.is_disconnect() => {
                    println!("\n[Server closed the chat room]");
                    break;
                }
                Ok(Some(frame)) => {
                    let text = frame.payload_lossy();
                    print!("\n{}", text);
                    prompt();
                    incoming.lock().push(text);
                }
                Ok(None) => {
                    println!("\n[Connection closed by server]");
                    break;
                }
                Err(e) => {
                    log::warn!("Read from server failed: {}", e);
                    break;
                }
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    prompt();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(mut line) = line? else {
                    writer.send_disconnect().await?;
                    break;
                };
                line.push('\n');

                if line == format!("{}\n", SAVE_COMMAND) {
                    transcript.lock().save(&config.transcript)?;
                    println!("[Chat saved to {}]", config.transcript.display());
                } else {
                    transcript.lock().push(line.clone());
                    writer.send_text(&line).await?;
                }
                prompt();
            }
            _ = tokio::signal::ctrl_c() => {
                let _ = writer.send_disconnect().await;
                break;
            }
            _ = &mut read_task => {
                return Ok(());
            }
        }
    }

    read_task.abort();
    Ok(())
}
