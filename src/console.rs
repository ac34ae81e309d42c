//! Operator console running beside the server loop.
//!
//! It only ever reads the published roster, so it never contends with the
//! loop for the client table.

use std::io::{self, BufRead, Write};

use crate::shutdown::ShutdownHandle;
use crate::table::Roster;

const HINT: &str = "Unknown command. Type 'list' to show connected clients, 'help' for more.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    List,
    Json,
    Help,
    Quit,
    Unknown,
}

impl Command {
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim() {
            "" => None,
            "list" | "ls" => Some(Command::List),
            "json" => Some(Command::Json),
            "help" | "?" => Some(Command::Help),
            "quit" | "exit" => Some(Command::Quit),
            _ => Some(Command::Unknown),
        }
    }
}

pub struct Console {
    roster: Roster,
    shutdown: Option<ShutdownHandle>,
}

impl Console {
    pub fn new(roster: Roster) -> Self {
        Self {
            roster,
            shutdown: None,
        }
    }

    /// Lets `quit` stop the server.
    pub fn with_shutdown(mut self, handle: ShutdownHandle) -> Self {
        self.shutdown = Some(handle);
        self
    }

    /// Reads commands until `quit` or end of input.
    pub fn run<R: BufRead, W: Write>(&self, input: R, mut output: W) -> io::Result<()> {
        for line in input.lines() {
            let Some(command) = Command::parse(&line?) else {
                continue;
            };
            self.execute(command, &mut output)?;
            output.flush()?;
            if command == Command::Quit {
                break;
            }
        }
        Ok(())
    }

    pub fn execute<W: Write>(&self, command: Command, out: &mut W) -> io::Result<()> {
        match command {
            Command::List => self.print_roster(out),
            Command::Json => {
                let roster = self.roster.load();
                serde_json::to_writer_pretty(&mut *out, roster.as_ref())?;
                writeln!(out)
            }
            Command::Help => {
                writeln!(out, "Commands:")?;
                writeln!(out, "  list   show connected clients")?;
                writeln!(out, "  json   show connected clients as JSON")?;
                writeln!(out, "  quit   disconnect everyone and stop the server")
            }
            Command::Quit => {
                match &self.shutdown {
                    Some(handle) => {
                        writeln!(out, "Shutting down...")?;
                        handle.trigger();
                    }
                    None => writeln!(out, "Shutdown is not available here")?,
                }
                Ok(())
            }
            Command::Unknown => writeln!(out, "{}", HINT),
        }
    }

    fn print_roster<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let roster = self.roster.load();
        if roster.is_empty() {
            return writeln!(out, "No clients connected");
        }
        writeln!(out, "{} client(s) connected:", roster.len())?;
        for entry in roster.iter() {
            writeln!(out, "  [{:>4}] {}", entry.index, entry.address)?;
        }
        Ok(())
    }
}
