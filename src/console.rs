use std::collections::BTreeMap;
use std::path::PathBuf;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, Lines};
use tokio_stream::StreamExt;

use crate::config::EVENT_BUFFER_SIZE;
use crate::events::EngineEventKind;
use crate::report::DiagnosticReport;
use crate::suite::engine::SharedEngine;
use crate::suite::{TestCategory, TestStatus};

pub const USER_FAILURE_REASON: &str = "Reported as not working";
pub const USER_SKIP_REASON: &str = "Skipped by user";

/// Terminal front end: drives a full run and asks the user to confirm each
/// check that waits for confirmation.
pub struct ConsoleDriver<R, W> {
    lines: Lines<R>,
    output: W,
}

impl<R, W> ConsoleDriver<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(input: R, output: W) -> Self {
        Self {
            lines: input.lines(),
            output,
        }
    }

    pub fn into_output(self) -> W {
        self.output
    }

    pub async fn show_onboarding(&mut self) -> std::io::Result<()> {
        self.say(
            "Welcome to Pulse Diagnostics.\n\
             Each check opens on its own; try the hardware, then answer\n\
             p if it works, f if it does not, or s to skip it.\n\
             A report is written when all checks are done.\n\n",
        )
        .await
    }

    pub async fn show_catalogue(&mut self, engine: &SharedEngine) -> std::io::Result<()> {
        for category in TestCategory::ALL {
            let tests = engine.tests_by_category(category).await;
            if tests.is_empty() {
                continue;
            }
            self.say(&format!("{} ({})\n", category, category.slug()))
                .await?;
            for test in tests {
                let note = if test.is_supported { "" } else { " [unsupported]" };
                self.say(&format!(
                    "  {:<16} {}{}\n      {}\n",
                    test.id, test.title, note, test.description
                ))
                .await?;
            }
        }
        Ok(())
    }

    /// Run every registered test, prompting whenever one waits for the user.
    /// Returns after the run's final event has been handled.
    pub async fn run_suite(&mut self, engine: &SharedEngine) -> anyhow::Result<()> {
        let events = engine.events().stream();
        tokio::pin!(events);
        let mut runner = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.run_all_tests().await })
        };

        loop {
            tokio::select! {
                // The run's events are sent before its task finishes, so
                // draining them first never loses the tail.
                biased;
                Some(event) = events.next() => {
                    let finished = matches!(event.kind, EngineEventKind::RunCompleted { .. });
                    self.handle_event(engine, event.kind).await?;
                    if finished {
                        break;
                    }
                }
                joined = &mut runner => {
                    joined??;
                    return Ok(());
                }
            }
        }
        runner.await??;
        Ok(())
    }

    /// Print the engine's recent events, oldest first.
    pub async fn show_event_trace(&mut self, engine: &SharedEngine) -> std::io::Result<()> {
        let mut history = engine.events().history(EVENT_BUFFER_SIZE, None).await;
        history.reverse();
        self.say("\nEvent trace:\n").await?;
        for event in history {
            let detail = serde_json::to_string(&event.kind).unwrap_or_default();
            self.say(&format!(
                "  {} {}\n",
                event.timestamp.format("%H:%M:%S%.3f"),
                detail
            ))
            .await?;
        }
        Ok(())
    }

    pub async fn show_summary(
        &mut self,
        report: &DiagnosticReport,
        written: &[PathBuf],
    ) -> std::io::Result<()> {
        let summary = report.summary();
        self.say(&format!(
            "\nTotal: {}  Passed: {}  Failed: {}  Skipped: {}\n",
            summary.total, summary.passed, summary.failed, summary.skipped
        ))
        .await?;
        for path in written {
            self.say(&format!("Report written to {}\n", path.display()))
                .await?;
        }
        Ok(())
    }

    async fn handle_event(
        &mut self,
        engine: &SharedEngine,
        kind: EngineEventKind,
    ) -> anyhow::Result<()> {
        match kind {
            EngineEventKind::RunStarted { total } => {
                self.say(&format!("Running {} checks\n", total)).await?;
            }
            EngineEventKind::AwaitingConfirmation { test_id } => {
                self.confirm(engine, &test_id).await?;
            }
            EngineEventKind::TestCompleted { test_id, status } => {
                self.say(&format!("    {} => {}\n", test_id, status)).await?;
            }
            _ => {}
        }
        Ok(())
    }

    async fn confirm(&mut self, engine: &SharedEngine, test_id: &str) -> anyhow::Result<()> {
        let test = engine.test(test_id).await?;
        if test.status != TestStatus::Running {
            return Ok(());
        }

        let tests = engine.tests().await;
        let position = tests.iter().position(|t| t.id == test_id).unwrap_or(0) + 1;
        self.say(&format!(
            "\n[{}/{}] {} ({})\n    {}\n",
            position,
            tests.len(),
            test.title,
            test.category,
            test.description
        ))
        .await?;

        loop {
            self.say("    [p]ass / [f]ail / [s]kip: ").await?;
            let Some(answer) = self.lines.next_line().await? else {
                if engine.abandon_current_test().await.is_some() {
                    self.say("\n    input closed, skipping\n").await?;
                }
                return Ok(());
            };

            let choice = answer.trim().to_lowercase();
            if !matches!(choice.as_str(), "p" | "pass" | "f" | "fail" | "s" | "skip") {
                self.say("    Please answer p, f or s.\n").await?;
                continue;
            }

            // A confirmation timeout may have settled it while we waited.
            if engine.test(test_id).await?.status != TestStatus::Running {
                self.say("    (already settled)\n").await?;
                return Ok(());
            }

            match choice.as_str() {
                "p" | "pass" => {
                    let mut metadata = BTreeMap::new();
                    if let Some(key) = &test.reading_key {
                        let prompt = format!("    {} (optional): ", key);
                        if let Some(value) = self.ask_optional(&prompt).await? {
                            metadata.insert(key.clone(), value);
                        }
                    }
                    engine.mark_passed(test_id, metadata).await?
                }
                "f" | "fail" => {
                    let reason = self.ask_reason("    What went wrong? ", USER_FAILURE_REASON).await?;
                    engine.mark_failed(test_id, &reason, BTreeMap::new()).await?;
                }
                _ => {
                    let reason = self.ask_reason("    Reason (optional): ", USER_SKIP_REASON).await?;
                    engine.mark_skipped(test_id, &reason).await?;
                }
            }
            return Ok(());
        }
    }

    async fn ask_reason(&mut self, prompt: &str, default: &str) -> std::io::Result<String> {
        let reason = self.ask_optional(prompt).await?;
        Ok(reason.unwrap_or_else(|| default.to_string()))
    }

    async fn ask_optional(&mut self, prompt: &str) -> std::io::Result<Option<String>> {
        self.say(prompt).await?;
        Ok(self
            .lines
            .next_line()
            .await?
            .map(|line| line.trim().to_string())
            .filter(|line| !line.is_empty()))
    }

    async fn say(&mut self, text: &str) -> std::io::Result<()> {
        self.output.write_all(text.as_bytes()).await?;
        self.output.flush().await
    }
}
