use boardpilot_agent::Strategy;
use boardpilot_core::ExecutionReport;
use serde_json::json;

use crate::commands::{agent_runtime, async_runtime, load_config, CommandResult, EXIT_REQUEST_FAILED, EXIT_USAGE};

pub fn run(text: &str, use_agent: bool) -> CommandResult {
    let text = text.trim();
    if text.is_empty() {
        return CommandResult::failure("ask", "invalid_argument", "User input is required", EXIT_USAGE);
    }

    let config = match load_config("ask") {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match async_runtime("ask") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    runtime.block_on(async {
        let agent = match agent_runtime("ask", &config).await {
            Ok(agent) => agent,
            Err(result) => return result,
        };
        let strategy = if use_agent { Strategy::Autonomous } else { Strategy::Dispatcher };
        report_result("ask", &agent.process(text, strategy).await)
    })
}

pub(crate) fn report_result(command: &str, report: &ExecutionReport) -> CommandResult {
    let data = Some(json!(report));
    if report.success {
        CommandResult::success_with(command, report.message.clone(), data)
    } else {
        CommandResult::failure_with(command, "request_failed", report.message.clone(), EXIT_REQUEST_FAILED, data)
    }
}
