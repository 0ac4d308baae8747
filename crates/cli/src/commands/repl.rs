use std::io::{self, BufRead, Write};
use std::time::Instant;

use boardpilot_agent::{AgentRuntime, Strategy};
use boardpilot_core::ExecutionReport;

use crate::commands::{agent_runtime, async_runtime, load_config, CommandResult, EXIT_RUNTIME};

const AGENT_PREFIX: &str = "!agent ";

#[derive(Debug, PartialEq, Eq)]
enum Line<'a> {
    Exit,
    Skip,
    Request { text: &'a str, strategy: Strategy },
}

fn parse_line(line: &str) -> Line<'_> {
    let trimmed = line.trim();
    if trimmed == "!exit" {
        return Line::Exit;
    }
    if trimmed.is_empty() {
        return Line::Skip;
    }
    match trimmed.strip_prefix(AGENT_PREFIX) {
        Some(text) if !text.trim().is_empty() => {
            Line::Request { text: text.trim(), strategy: Strategy::Autonomous }
        }
        Some(_) => Line::Skip,
        None => Line::Request { text: trimmed, strategy: Strategy::Dispatcher },
    }
}

pub fn run() -> CommandResult {
    let config = match load_config("repl") {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match async_runtime("repl") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };
    let agent = match runtime.block_on(agent_runtime("repl", &config)) {
        Ok(agent) => agent,
        Err(result) => return result,
    };

    let stdin = io::stdin();
    let stdout = io::stdout();
    match session(&runtime, &agent, stdin.lock(), stdout.lock()) {
        Ok(handled) => CommandResult::success("repl", format!("session ended after {handled} requests")),
        Err(error) => CommandResult::failure("repl", "io", error.to_string(), EXIT_RUNTIME),
    }
}

/// Reads requests from `input` until `!exit` or end of input, printing a
/// summary of each report. Returns how many requests were processed.
fn session<R: BufRead, W: Write>(
    runtime: &tokio::runtime::Runtime,
    agent: &AgentRuntime,
    input: R,
    mut output: W,
) -> io::Result<usize> {
    writeln!(output, "{}", "=".repeat(47))?;
    writeln!(output, "Boardpilot - interactive mode")?;
    writeln!(output, "{}", "=".repeat(47))?;
    writeln!(output, "Type a request, or one of:")?;
    writeln!(output, "  !exit            leave the session")?;
    writeln!(output, "  !agent <request> use the autonomous agent")?;
    writeln!(output, "{}", "=".repeat(47))?;

    let mut handled = 0;
    let mut lines = input.lines();
    loop {
        write!(output, "> ")?;
        output.flush()?;
        let Some(line) = lines.next().transpose()? else {
            break;
        };

        let (text, strategy) = match parse_line(&line) {
            Line::Exit => break,
            Line::Skip => continue,
            Line::Request { text, strategy } => (text, strategy),
        };

        let started = Instant::now();
        let report = runtime.block_on(agent.process(text, strategy));
        render_report(&mut output, &report, started.elapsed().as_secs_f64())?;
        handled += 1;
    }

    writeln!(output, "Goodbye!")?;
    Ok(handled)
}

fn render_report<W: Write>(output: &mut W, report: &ExecutionReport, seconds: f64) -> io::Result<()> {
    writeln!(output, "\nResult:")?;
    writeln!(output, "{}", "-".repeat(50))?;
    writeln!(output, "Status: {}", if report.success { "Success" } else { "Failed" })?;
    writeln!(output, "Message: {}", report.message)?;

    if !report.details.is_empty() {
        writeln!(output, "\nResources:")?;
        for detail in &report.details {
            let label = detail.label().unwrap_or("Unnamed");
            match (&detail.id, &detail.error) {
                (_, Some(error)) => writeln!(output, "- {}: {label} (failed: {error})", detail.resource_type)?,
                (Some(id), None) => writeln!(output, "- {}: {label} (ID: {id})", detail.resource_type)?,
                (None, None) => writeln!(output, "- {}: {label}", detail.resource_type)?,
            }
        }
    }
    if let Some(answer) = &report.output {
        writeln!(output, "\nAgent: {answer}")?;
    }
    for warning in &report.warnings {
        writeln!(output, "Warning: {warning}")?;
    }

    writeln!(output, "{}", "-".repeat(50))?;
    writeln!(output, "Time taken: {seconds:.2} seconds\n")
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::Arc;

    use anyhow::Result;
    use async_trait::async_trait;

    use boardpilot_agent::llm::LlmClient;
    use boardpilot_agent::{AgentRuntime, Strategy, StructuredInterpreter};
    use boardpilot_core::workspace::{InMemoryWorkspace, WorkspaceOp};
    use boardpilot_db::MemoryStore;

    use super::{parse_line, session, Line};

    struct GroupPlanner;

    #[async_trait]
    impl LlmClient for GroupPlanner {
        fn model(&self) -> &str {
            "group-planner"
        }

        async fn complete(&self, _system_prompt: Option<&str>, _prompt: &str) -> Result<String> {
            Ok(r#"{"resourceType":"board","operation":"create","attributes":{"name":"Standup","columns":[{"title":"Owner","type":"people"}]}}"#.to_string())
        }
    }

    #[test]
    fn lines_map_to_commands() {
        assert_eq!(parse_line("  !exit "), Line::Exit);
        assert_eq!(parse_line("   "), Line::Skip);
        assert_eq!(parse_line("!agent  "), Line::Skip);
        assert_eq!(
            parse_line("!agent make a board"),
            Line::Request { text: "make a board", strategy: Strategy::Autonomous }
        );
        assert_eq!(
            parse_line("make a board"),
            Line::Request { text: "make a board", strategy: Strategy::Dispatcher }
        );
    }

    #[test]
    fn session_processes_until_exit() {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().expect("runtime");
        let workspace = Arc::new(InMemoryWorkspace::new());
        let memory = Arc::new(runtime.block_on(MemoryStore::in_memory()));
        let agent = AgentRuntime::new(
            StructuredInterpreter::new(Arc::new(GroupPlanner), None),
            workspace.clone(),
            memory,
        );

        let input = Cursor::new("create a standup board\n\n!exit\nignored after exit\n");
        let mut output = Vec::new();
        let handled = session(&runtime, &agent, input, &mut output).expect("session");

        assert_eq!(handled, 1);
        assert_eq!(workspace.count(WorkspaceOp::CreateBoard), 1);
        let printed = String::from_utf8(output).expect("utf8");
        assert!(printed.contains("Status: Success"));
        assert!(printed.contains("- board: Standup (ID: 1001)"));
        assert!(printed.contains("- column: Owner (ID: owner)"));
        assert!(printed.trim_end().ends_with("Goodbye!"));
    }
}
