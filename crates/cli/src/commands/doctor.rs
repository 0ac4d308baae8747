use boardpilot_core::config::{AppConfig, LoadOptions};
use boardpilot_core::workspace::ResourceApi;
use boardpilot_db::{JsonFileBackend, SnapshotBackend};
use boardpilot_monday::MondayClient;
use secrecy::ExposeSecret;
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_llm_models(&config));
            match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                Ok(runtime) => {
                    checks.push(runtime.block_on(check_memory_file(&config)));
                    checks.push(runtime.block_on(check_workspace_connectivity(&config)));
                }
                Err(error) => {
                    for name in ["memory_file", "workspace_connectivity"] {
                        checks.push(DoctorCheck {
                            name,
                            status: CheckStatus::Fail,
                            details: format!("failed to initialize async runtime: {error}"),
                        });
                    }
                }
            }
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["llm_models", "memory_file", "workspace_connectivity"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_llm_models(config: &AppConfig) -> DoctorCheck {
    if config.llm.api_key.expose_secret().trim().is_empty() {
        return DoctorCheck {
            name: "llm_models",
            status: CheckStatus::Fail,
            details: "llm.api_key is empty".to_string(),
        };
    }

    let fallback = config.llm.fallback_model.as_deref().unwrap_or("disabled");
    DoctorCheck {
        name: "llm_models",
        status: CheckStatus::Pass,
        details: format!("primary `{}`, fallback `{fallback}`", config.llm.model),
    }
}

/// Reads the memory document without creating it; a missing file is fine.
async fn check_memory_file(config: &AppConfig) -> DoctorCheck {
    let backend = JsonFileBackend::new(&config.memory.path);
    match backend.load().await {
        Ok(Some(snapshot)) => DoctorCheck {
            name: "memory_file",
            status: CheckStatus::Pass,
            details: format!(
                "`{}` holds {} conversations",
                backend.location(),
                snapshot.conversations.len()
            ),
        },
        Ok(None) => DoctorCheck {
            name: "memory_file",
            status: CheckStatus::Pass,
            details: format!("`{}` does not exist yet and will be created", backend.location()),
        },
        Err(error) => DoctorCheck {
            name: "memory_file",
            status: CheckStatus::Fail,
            details: format!("{error}; it will be replaced with fresh state on next start"),
        },
    }
}

async fn check_workspace_connectivity(config: &AppConfig) -> DoctorCheck {
    if config.monday.sandbox {
        return DoctorCheck {
            name: "workspace_connectivity",
            status: CheckStatus::Pass,
            details: "sandbox mode uses a process-local workspace".to_string(),
        };
    }

    let result = async {
        let client = MondayClient::from_config(&config.monday)?;
        client.get_me().await
    }
    .await;

    match result {
        Ok(account) => DoctorCheck {
            name: "workspace_connectivity",
            status: CheckStatus::Pass,
            details: format!("authenticated as {} against `{}`", account.name, config.monday.api_url),
        },
        Err(error) => DoctorCheck {
            name: "workspace_connectivity",
            status: CheckStatus::Fail,
            details: error.to_string(),
        },
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
