//! Ask command handler.
//!
//! Runs one research question against the indexed documents and reports
//! the cited answer.

use clap::Args;
use research_agent::{format_error, Controller, RunRequest, RunResult, Runtime};
use research_core::{config::AppConfig, AppError, AppResult};
use std::fmt::Write as _;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

const RULE: &str = "================================================================================";

/// Research a question across a set of documents
#[derive(Args, Debug)]
pub struct AskCommand {
    /// The question to research
    pub question: Option<String>,

    /// Read the question from a file
    #[arg(short, long, conflicts_with = "question")]
    pub file: Option<PathBuf>,

    /// Documents to search (repeat the flag or separate with commas)
    #[arg(long, value_delimiter = ',', num_args = 1..)]
    pub filenames: Vec<String>,

    /// Retrieval rounds allowed (default from config)
    #[arg(long)]
    pub max_iterations: Option<u32>,

    /// Include the agent's reasoning trace
    #[arg(long)]
    pub trace: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Also write the JSON result to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl AskCommand {
    /// Execute the ask command. Returns whether the run succeeded.
    pub async fn execute(&self, config: &AppConfig) -> AppResult<bool> {
        tracing::info!("Executing ask command");
        tracing::debug!("Ask command options: {:?}", self);

        let request = self.build_request()?;
        let include_trace = request.include_trace;

        let started = chrono::Utc::now();
        let result = match build_controller(config).await {
            Ok(controller) => {
                let cancel = CancellationToken::new();
                let trigger = cancel.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        tracing::warn!("Interrupted, stopping the run");
                        trigger.cancel();
                    }
                });
                controller.run_with_cancel(request, cancel).await
            }
            Err(e) => {
                tracing::error!("Could not start the research run: {}", e);
                format_error(&e, None, include_trace, Runtime::since(started))
            }
        };

        if let Some(path) = &self.output {
            std::fs::write(path, result.to_json()?)?;
            tracing::info!("Result saved to {:?}", path);
        }

        if self.json {
            println!("{}", result.to_json()?);
        } else {
            print!("{}", render_report(&result));
        }

        Ok(result.success)
    }

    /// The run request for this invocation. The trace is included only
    /// when `--trace` is given, independent of log verbosity.
    fn build_request(&self) -> AppResult<RunRequest> {
        let question = self.get_question()?;
        let mut request = RunRequest::new(question, self.filenames.iter().cloned())
            .with_trace(self.trace);
        if let Some(max_iterations) = self.max_iterations {
            request = request.with_max_iterations(max_iterations);
        }
        Ok(request)
    }

    /// Get the question text from the argument or a file.
    fn get_question(&self) -> AppResult<String> {
        if let Some(question) = &self.question {
            return Ok(question.clone());
        }
        if let Some(path) = &self.file {
            return Ok(std::fs::read_to_string(path)?);
        }
        Err(AppError::InvalidInput("No question provided".to_string()))
    }
}

async fn build_controller(config: &AppConfig) -> AppResult<Controller> {
    config.validate()?;
    Controller::from_config(config).await
}

fn format_seconds(seconds: f64) -> String {
    if seconds >= 60.0 {
        let minutes = (seconds / 60.0).floor();
        format!("{}m {:.1}s", minutes, seconds - minutes * 60.0)
    } else {
        format!("{:.2}s", seconds)
    }
}

/// Human-readable report of a run.
pub fn render_report(result: &RunResult) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "\n{}\nDOCUMENT RESEARCH RESULT\n{}", RULE, RULE);

    if result.success {
        let _ = writeln!(out, "\nSTATUS: SUCCESS");
    } else {
        let _ = writeln!(out, "\nSTATUS: FAILED");
        let _ = writeln!(
            out,
            "Error: {}",
            result.error.as_deref().unwrap_or("Unknown error")
        );
    }
    let _ = writeln!(out, "Iterations: {}", result.iterations);

    if !result.search_history.is_empty() {
        let _ = writeln!(out, "\nSEARCH QUERIES BY ITERATION:");
        for round in &result.search_history {
            let _ = writeln!(
                out,
                "\nIteration {}.{} (context items available: {}):",
                round.iteration, round.attempt, round.context_items_available
            );
            for (i, query) in round.queries.iter().enumerate() {
                let _ = writeln!(out, "  {}. \"{}\"", i + 1, query);
            }
        }
    }

    if result.success {
        let _ = writeln!(out, "\nANSWER:\n{}", result.final_answer);

        let _ = writeln!(out, "\nCITATIONS:");
        if result.citations.is_empty() {
            let _ = writeln!(out, "No citations provided.");
        }
        for (i, citation) in result.citations.iter().enumerate() {
            let _ = writeln!(
                out,
                "\n[{}] Source: {}, Page: {}\nText: {}",
                i + 1,
                citation.filename,
                citation.page,
                citation.text
            );
        }
    }

    let usage = &result.token_usage;
    let _ = writeln!(
        out,
        "\nTOKEN USAGE:\n- Prompt tokens: {}\n- Completion tokens: {}\n- Total tokens: {}",
        usage.prompt_tokens, usage.completion_tokens, usage.total_tokens
    );

    let runtime = &result.runtime;
    let _ = writeln!(
        out,
        "\nRUNTIME:\n- Start time: {}\n- End time: {}\n- Total runtime: {}",
        runtime.start_time.to_rfc3339(),
        runtime.end_time.to_rfc3339(),
        format_seconds(runtime.runtime_seconds)
    );

    if let Some(trace) = &result.scratchpad {
        let _ = writeln!(out, "\n{}\nAGENT REASONING:\n{}\n{}", RULE, RULE, trace.trim());
    }

    let _ = writeln!(out, "\n{}", RULE);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use research_agent::{Citation, QueryRound, TokenUsage, NOT_FOUND_ANSWER};

    fn result(success: bool) -> RunResult {
        let start = Utc::now();
        RunResult {
            success,
            final_answer: if success {
                "Hold the reset button for ten seconds.".into()
            } else {
                String::new()
            },
            citations: vec![Citation::new("Hold the reset button", 4, "router.pdf")],
            iterations: 2,
            scratchpad: None,
            error: (!success).then(|| "Retrieval unavailable: index offline".to_string()),
            search_history: vec![QueryRound {
                iteration: 1,
                attempt: 1,
                queries: vec!["router reset".into()],
                context_items_available: 0,
            }],
            token_usage: TokenUsage {
                prompt_tokens: 120,
                completion_tokens: 30,
                total_tokens: 150,
            },
            runtime: Runtime::new(start, start + Duration::milliseconds(2500)),
        }
    }

    #[test]
    fn test_format_seconds() {
        assert_eq!(format_seconds(2.5), "2.50s");
        assert_eq!(format_seconds(125.0), "2m 5.0s");
    }

    #[test]
    fn test_report_success() {
        let report = render_report(&result(true));
        assert!(report.contains("STATUS: SUCCESS"));
        assert!(report.contains("Iteration 1.1 (context items available: 0):\n  1. \"router reset\""));
        assert!(report.contains("[1] Source: router.pdf, Page: 4\nText: Hold the reset button"));
        assert!(report.contains("- Total tokens: 150"));
        assert!(report.contains("- Total runtime: 2.50s"));
        assert!(!report.contains("AGENT REASONING"));
    }

    #[test]
    fn test_report_not_found_and_failure() {
        let mut not_found = result(true);
        not_found.final_answer = NOT_FOUND_ANSWER.into();
        not_found.citations.clear();
        let report = render_report(&not_found);
        assert!(report.contains(NOT_FOUND_ANSWER));
        assert!(report.contains("No citations provided."));

        let failed = render_report(&result(false));
        assert!(failed.contains("STATUS: FAILED"));
        assert!(failed.contains("Error: Retrieval unavailable: index offline"));
        assert!(!failed.contains("ANSWER:"));
    }

    #[test]
    fn test_trace_follows_flag_only() {
        let mut cmd = AskCommand {
            question: Some("What does the warranty cover?".into()),
            file: None,
            filenames: vec!["warranty.pdf".into()],
            max_iterations: Some(2),
            trace: false,
            json: true,
            output: None,
        };

        let request = cmd.build_request().unwrap();
        assert!(!request.include_trace);
        assert_eq!(request.max_iterations, Some(2));

        cmd.trace = true;
        assert!(cmd.build_request().unwrap().include_trace);
    }

    #[test]
    fn test_question_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("question.txt");
        std::fs::write(&path, "What does the warranty cover?").unwrap();

        let cmd = AskCommand {
            question: None,
            file: Some(path),
            filenames: vec!["warranty.pdf".into()],
            max_iterations: None,
            trace: false,
            json: false,
            output: None,
        };
        assert_eq!(cmd.get_question().unwrap(), "What does the warranty cover?");
    }
}
