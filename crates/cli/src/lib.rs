pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

use commands::memory::MemoryQuery;

#[derive(Debug, Parser)]
#[command(
    name = "boardpilot",
    about = "Boardpilot operator CLI",
    long_about = "Send natural-language requests to a monday.com workspace, inspect agent memory, and check runtime readiness.",
    after_help = "Examples:\n  boardpilot ask create a board called Launch Plan\n  boardpilot ask --agent list my boards\n  boardpilot memory creations --limit 5\n  boardpilot doctor --json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Process one natural-language request and print the execution report")]
    Ask {
        #[arg(long, help = "Use the autonomous tool-calling agent")]
        agent: bool,
        #[arg(required = true, num_args = 1.., help = "Request text")]
        text: Vec<String>,
    },
    #[command(about = "Start an interactive session; `!agent <request>` uses the autonomous agent")]
    Repl,
    #[command(about = "Inspect or clear the agent memory file")]
    Memory {
        #[command(subcommand)]
        command: MemoryCommand,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, model credentials, memory file, and workspace connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

#[derive(Debug, Subcommand)]
enum MemoryCommand {
    #[command(about = "Most recent conversations, newest first")]
    Conversations {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    #[command(about = "Most recently created resources, newest first")]
    Creations {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    #[command(about = "Every stored resource of one type (board, column, group, item)")]
    Resources { resource_type: String },
    #[command(about = "Reset memory to empty state")]
    Clear,
}

impl From<MemoryCommand> for MemoryQuery {
    fn from(command: MemoryCommand) -> Self {
        match command {
            MemoryCommand::Conversations { limit } => Self::Conversations { limit },
            MemoryCommand::Creations { limit } => Self::Creations { limit },
            MemoryCommand::Resources { resource_type } => Self::Resources { resource_type },
            MemoryCommand::Clear => Self::Clear,
        }
    }
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Ask { agent, text } => commands::ask::run(&text.join(" "), agent),
        Command::Repl => commands::repl::run(),
        Command::Memory { command } => commands::memory::run(command.into()),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
