use std::process::ExitCode;

fn main() -> ExitCode {
    boardpilot_cli::run()
}
