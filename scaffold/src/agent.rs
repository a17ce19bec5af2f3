//! Agent controller: layout, scaffold, per-file generation, execution, review.
//!
//! Phases run strictly in order with local retry loops and no rollback. Only a
//! rejected layout, cancellation, or an I/O failure ends a run early.

use std::fmt;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::cancel;
use crate::core::context::GenerationContext;
use crate::core::layout::{LayoutTree, LeafSpec};
use crate::core::sanitize::{clean_code, extract_layout};
use crate::core::syntax::{self, SyntaxCheck};
use crate::core::types::{FileArtifact, RunOutcome, Task, Verdict};
use crate::core::verdict::parse_verdict;
use crate::io::config::GenerationConfig;
use crate::io::materialize::{Materializer, strip_prelude};
use crate::io::oracle::{Message, Oracle, OracleReply};
use crate::io::prompt::{FileInputs, PromptBuilder, ReviewInputs};
use crate::io::runner::ProgramRunner;
use crate::io::transcript::Transcript;

/// Phase A could not produce a usable layout. The run is aborted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutRejectedError {
    pub reason: String,
}

impl fmt::Display for LayoutRejectedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "layout rejected: {}", self.reason)
    }
}

impl std::error::Error for LayoutRejectedError {}

/// A generable leaf that never produced usable content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFile {
    pub relative_path: String,
    pub attempts: u32,
    /// Why the last attempt was rejected.
    pub last_issue: String,
}

/// Everything observable about a finished run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub project_name: String,
    pub root: PathBuf,
    /// Every leaf of the layout, in traversal order.
    pub leaves: Vec<String>,
    /// Files written with generated content, in generation order.
    pub files_written: Vec<String>,
    pub files_skipped: Vec<SkippedFile>,
    /// Entry file that was executed. `None` means no runnable entry file was found.
    pub entry: Option<String>,
    pub outcome: Option<RunOutcome>,
    pub verdict: Option<Verdict>,
}

impl RunReport {
    /// The entry file ran and exited successfully.
    pub fn succeeded(&self) -> bool {
        self.outcome.as_ref().is_some_and(|outcome| outcome.success)
    }
}

/// Drives one task from prompt to executed program.
pub struct Agent<O, R> {
    oracle: O,
    runner: R,
    prompts: PromptBuilder,
    generation: GenerationConfig,
    self_validate: bool,
    transcript: Option<Transcript>,
}

impl<O: Oracle, R: ProgramRunner> Agent<O, R> {
    pub fn new(oracle: O, runner: R, generation: GenerationConfig) -> Result<Self> {
        Ok(Self {
            prompts: PromptBuilder::new(generation.prompt_budget_bytes)?,
            oracle,
            runner,
            generation,
            self_validate: true,
            transcript: None,
        })
    }

    /// Enable or disable the review phase.
    pub fn with_self_validation(mut self, enabled: bool) -> Self {
        self.self_validate = enabled;
        self
    }

    /// Record every oracle exchange and the final report.
    pub fn with_transcript(mut self, transcript: Transcript) -> Self {
        self.transcript = Some(transcript);
        self
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    #[instrument(skip_all, fields(root = %task.root.display()))]
    pub fn run(&mut self, task: &Task) -> Result<RunReport> {
        cancel::check()?;
        info!("phase A: requesting layout");
        let layout = self.elicit_layout(task)?;

        info!(project = %layout.project_name, "phase B: scaffolding");
        let materializer = Materializer::new(&task.root);
        let leaves = materializer.materialize(&layout)?;

        info!(leaves = leaves.len(), "phase C: generating files");
        let summary = layout.summary();
        let mut context = GenerationContext::new();
        let mut files_written = Vec::new();
        let mut files_skipped = Vec::new();
        for leaf in leaves.iter().filter(|leaf| leaf.kind.is_generated()) {
            match self.generate_file(task, &summary, leaf, &materializer, &context)? {
                Ok(artifact) => {
                    files_written.push(artifact.relative_path.clone());
                    context.insert(artifact);
                }
                Err(skipped) => files_skipped.push(skipped),
            }
        }

        cancel::check()?;
        let entry = runnable_entry(&layout, &materializer)?;
        let mut report = RunReport {
            project_name: layout.project_name.clone(),
            root: task.root.clone(),
            leaves: leaves.iter().map(|leaf| leaf.relative_path.clone()).collect(),
            files_written,
            files_skipped,
            entry: entry.as_ref().map(|leaf| leaf.relative_path.clone()),
            outcome: None,
            verdict: None,
        };

        if let Some(entry) = entry {
            info!(entry = %entry.relative_path, "phase D: executing");
            let outcome = self
                .runner
                .run(&task.root, &materializer.path_of(&entry.relative_path))?;

            if self.self_validate {
                cancel::check()?;
                info!("phase E: requesting review");
                let verdict = self.review(task, &entry, &materializer, &outcome)?;
                report.verdict = Some(verdict);
            }
            report.outcome = Some(outcome);
        } else {
            warn!("no entry file found; skipping execution");
        }

        if let Some(transcript) = &self.transcript {
            transcript.write_report(&report)?;
        }
        Ok(report)
    }

    /// Phase A: one oracle call, no retry.
    fn elicit_layout(&mut self, task: &Task) -> Result<LayoutTree> {
        let messages = self.prompts.build_layout(&task.description)?.messages();
        let layout = match self.ask("layout", None, &messages)? {
            OracleReply::Text(text) => extract_layout(&text).map_err(|err| LayoutRejectedError {
                reason: format!("{err:#}"),
            })?,
            OracleReply::TransientFailure(detail) => {
                return Err(LayoutRejectedError {
                    reason: format!("oracle unavailable: {detail}"),
                }
                .into());
            }
        };
        debug!(leaves = layout.leaves().len(), "layout accepted");
        Ok(layout)
    }

    /// Phase C for one leaf. The inner `Err` is a skip, not a failure of the run.
    #[instrument(skip_all, fields(path = %leaf.relative_path))]
    fn generate_file(
        &mut self,
        task: &Task,
        layout_summary: &str,
        leaf: &LeafSpec,
        materializer: &Materializer,
        context: &GenerationContext,
    ) -> Result<Result<FileArtifact, SkippedFile>> {
        let attempts = self.generation.file_attempts;
        let mut issue: Option<String> = None;
        let mut last_issue = String::new();

        for attempt in 1..=attempts {
            if attempt > 1 {
                self.pause();
            }
            cancel::check()?;
            let rendered = context.render(self.generation.context_budget_bytes);
            if !rendered.omitted.is_empty() {
                debug!(omitted = ?rendered.omitted, "context over budget");
            }
            let messages = self
                .prompts
                .build_file(&FileInputs {
                    task: &task.description,
                    relative_path: &leaf.relative_path,
                    kind: leaf.kind,
                    layout_summary,
                    context: &rendered,
                    previous_issue: issue.as_deref(),
                })?
                .messages();

            let Some(text) = self.ask_with_retries(&leaf.relative_path, &messages)? else {
                last_issue = "oracle unavailable".to_string();
                issue = None;
                continue;
            };
            let cleaned = clean_code(&text);
            match syntax::check(&leaf.relative_path, leaf.kind, &cleaned) {
                SyntaxCheck::Valid => {
                    let artifact = materializer.write_file(&leaf.relative_path, &cleaned, leaf.kind)?;
                    debug!(attempt, bytes = artifact.content.len(), "file generated");
                    return Ok(Ok(artifact));
                }
                SyntaxCheck::NeedsRetry(reason) => {
                    debug!(attempt, reason = %reason, "generated content rejected");
                    last_issue = reason.clone();
                    issue = Some(reason);
                }
            }
        }

        warn!(path = %leaf.relative_path, attempts, issue = %last_issue, "skipping file");
        Ok(Err(SkippedFile {
            relative_path: leaf.relative_path.clone(),
            attempts,
            last_issue,
        }))
    }

    /// One attempt: the first call plus up to `transient_retries` calls after transient failures.
    fn ask_with_retries(&mut self, target: &str, messages: &[Message]) -> Result<Option<String>> {
        for call in 0..=self.generation.transient_retries {
            if call > 0 {
                self.pause();
                cancel::check()?;
            }
            match self.ask("generate", Some(target), messages)? {
                OracleReply::Text(text) => return Ok(Some(text)),
                OracleReply::TransientFailure(detail) => {
                    warn!(call, detail = %detail, "transient oracle failure");
                }
            }
        }
        Ok(None)
    }

    /// Phase E. Advisory: the verdict never changes the outcome.
    fn review(
        &mut self,
        task: &Task,
        entry: &LeafSpec,
        materializer: &Materializer,
        outcome: &RunOutcome,
    ) -> Result<Verdict> {
        let content = materializer.read_file(&entry.relative_path)?;
        let messages = self
            .prompts
            .build_review(&ReviewInputs {
                task: &task.description,
                entry_path: &entry.relative_path,
                entry_content: &content,
                outcome: Some(outcome),
            })?
            .messages();
        let verdict = match self.ask("review", None, &messages)? {
            OracleReply::Text(text) => parse_verdict(&text),
            OracleReply::TransientFailure(detail) => {
                warn!(detail = %detail, "review unavailable");
                Verdict::Unavailable
            }
        };
        debug!(verdict = ?verdict, "review finished");
        Ok(verdict)
    }

    fn ask(&mut self, phase: &str, target: Option<&str>, messages: &[Message]) -> Result<OracleReply> {
        let reply = self.oracle.complete(messages);
        if let Some(transcript) = self.transcript.as_mut() {
            transcript.record_exchange(phase, target, messages, &reply)?;
        }
        Ok(reply)
    }

    fn pause(&self) {
        if self.generation.retry_pause_ms > 0 {
            thread::sleep(Duration::from_millis(self.generation.retry_pause_ms));
        }
    }
}

/// The entry leaf, if its file holds anything besides the prelude.
fn runnable_entry(layout: &LayoutTree, materializer: &Materializer) -> Result<Option<LeafSpec>> {
    let Some(entry) = layout.entry_leaf() else {
        return Ok(None);
    };
    let path = materializer.path_of(&entry.relative_path);
    if !path.is_file() {
        return Ok(None);
    }
    let content = materializer.read_file(&entry.relative_path)?;
    if strip_prelude(&content).trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(entry))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::DiagnosedCause;
    use crate::io::materialize::PRELUDE;
    use crate::test_support::{
        ScriptedOracle, ScriptedRunner, outcome_fail, outcome_ok, text_reply, transient,
    };
    use std::fs;

    fn generation() -> GenerationConfig {
        GenerationConfig {
            retry_pause_ms: 0,
            ..GenerationConfig::default()
        }
    }

    fn agent(
        oracle: ScriptedOracle,
        runner: ScriptedRunner,
    ) -> Agent<ScriptedOracle, ScriptedRunner> {
        Agent::new(oracle, runner, generation())
            .expect("agent")
            .with_self_validation(false)
    }

    const MAIN_ONLY: &str = r#"{"project_name":"p","structure":{"main.py":""}}"#;

    #[test]
    fn transient_failures_use_inner_retries_before_attempts() {
        let temp = tempfile::tempdir().expect("tempdir");
        let oracle = ScriptedOracle::new(vec![
            text_reply(MAIN_ONLY),
            transient("http status 503"),
            text_reply("print('ok')"),
        ]);
        let mut agent = agent(oracle, ScriptedRunner::new(vec![outcome_ok("ok\n")]));

        let report = agent.run(&Task::new("say ok", temp.path())).expect("run");

        assert_eq!(report.files_written, vec!["main.py".to_string()]);
        assert!(report.files_skipped.is_empty());
        assert_eq!(agent.oracle().requests().len(), 3);
        // the retry resends the identical request
        assert_eq!(agent.oracle().prompt(1), agent.oracle().prompt(2));
    }

    #[test]
    fn invalid_code_is_retried_with_feedback_then_skipped() {
        let temp = tempfile::tempdir().expect("tempdir");
        let layout = r#"{"project_name":"p","structure":{"main.py":"","lib.py":""}}"#;
        let oracle = ScriptedOracle::texts(&[
            layout,
            "print('main')",
            "def broken(:",
            "def broken(:",
            "",
        ]);
        let mut agent = agent(oracle, ScriptedRunner::new(vec![outcome_ok("main\n")]));

        let report = agent.run(&Task::new("two files", temp.path())).expect("run");

        assert_eq!(report.files_written, vec!["main.py".to_string()]);
        assert_eq!(report.files_skipped.len(), 1);
        let skipped = &report.files_skipped[0];
        assert_eq!(skipped.relative_path, "lib.py");
        assert_eq!(skipped.attempts, 3);
        assert_eq!(skipped.last_issue, "empty reply");
        assert!(
            agent
                .oracle()
                .prompt(3)
                .expect("second lib.py prompt")
                .contains("### Previous Attempt")
        );
        assert_eq!(fs::read_to_string(temp.path().join("lib.py")).expect("lib"), "");
    }

    #[test]
    fn docs_keep_seed_and_are_not_regenerated() {
        let temp = tempfile::tempdir().expect("tempdir");
        let layout = r##"{"project_name":"p","structure":{"README.md":"# P\n","main.py":""}}"##;
        let oracle = ScriptedOracle::texts(&[layout, "print(1)"]);
        let mut agent = agent(oracle, ScriptedRunner::new(vec![outcome_ok("1\n")]));

        let report = agent.run(&Task::new("print 1", temp.path())).expect("run");

        assert_eq!(agent.oracle().requests().len(), 2);
        assert_eq!(report.leaves, vec!["README.md".to_string(), "main.py".to_string()]);
        assert_eq!(
            fs::read_to_string(temp.path().join("README.md")).expect("readme"),
            "# P\n"
        );
    }

    #[test]
    fn later_prompts_carry_earlier_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        let layout = r#"{"project_name":"p","structure":{"helpers.py":"","main.py":""}}"#;
        let oracle = ScriptedOracle::texts(&[
            layout,
            "def greet():\n    return 'hi'",
            "from helpers import greet\nprint(greet())",
        ]);
        let mut agent = agent(oracle, ScriptedRunner::new(vec![outcome_ok("hi\n")]));

        agent.run(&Task::new("greet", temp.path())).expect("run");

        let main_prompt = agent.oracle().prompt(2).expect("main prompt");
        assert!(main_prompt.contains("\"helpers.py\": \"def greet():\\n    return 'hi'\\n\""));
        assert!(main_prompt.contains("- helpers.py\n- main.py"));
    }

    #[test]
    fn review_verdict_is_advisory() {
        let temp = tempfile::tempdir().expect("tempdir");
        let oracle = ScriptedOracle::texts(&[MAIN_ONLY, "print('hi')", "NO - it greets nobody"]);
        let runner = ScriptedRunner::new(vec![outcome_ok("hi\n")]);
        let mut agent = Agent::new(oracle, runner, generation()).expect("agent");

        let report = agent.run(&Task::new("greet", temp.path())).expect("run");

        assert!(report.succeeded());
        assert_eq!(
            report.verdict,
            Some(Verdict::Rejected {
                reason: "it greets nobody".to_string()
            })
        );
        let review_prompt = agent.oracle().prompt(2).expect("review prompt");
        assert!(review_prompt.contains(PRELUDE.trim_end()));
        assert!(review_prompt.contains("exit code 0"));
    }

    #[test]
    fn review_transient_failure_is_unavailable() {
        let temp = tempfile::tempdir().expect("tempdir");
        let oracle = ScriptedOracle::new(vec![
            text_reply(MAIN_ONLY),
            text_reply("raise SystemExit(2)"),
            transient("timeout"),
        ]);
        let runner = ScriptedRunner::new(vec![outcome_fail("", DiagnosedCause::Other)]);
        let mut agent = Agent::new(oracle, runner, generation()).expect("agent");

        let report = agent.run(&Task::new("exit", temp.path())).expect("run");

        assert!(!report.succeeded());
        assert_eq!(report.verdict, Some(Verdict::Unavailable));
    }

    #[test]
    fn transient_layout_failure_aborts() {
        let temp = tempfile::tempdir().expect("tempdir");
        let oracle = ScriptedOracle::new(vec![transient("http status 500")]);
        let mut agent = agent(oracle, ScriptedRunner::default());

        let err = agent
            .run(&Task::new("anything", temp.path().join("proj")))
            .unwrap_err();

        let rejected = err.downcast_ref::<LayoutRejectedError>().expect("typed error");
        assert!(rejected.reason.contains("http status 500"));
        assert!(!temp.path().join("proj").exists());
        assert_eq!(agent.oracle().requests().len(), 1);
    }

    #[test]
    fn transcript_records_each_exchange_and_report() {
        let temp = tempfile::tempdir().expect("tempdir");
        let logs = temp.path().join("logs");
        let oracle = ScriptedOracle::texts(&[MAIN_ONLY, "print('hi')", "YES"]);
        let runner = ScriptedRunner::new(vec![outcome_ok("hi\n")]);
        let mut agent = Agent::new(oracle, runner, generation())
            .expect("agent")
            .with_transcript(Transcript::create(&logs).expect("transcript"));

        agent
            .run(&Task::new("greet", temp.path().join("proj")))
            .expect("run");

        assert!(logs.join("001-layout.json").is_file());
        assert!(logs.join("002-generate.json").is_file());
        assert!(logs.join("003-review.json").is_file());
        let report: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(logs.join("report.json")).expect("report"))
                .expect("json");
        assert_eq!(report["entry"], "main.py");
        assert_eq!(report["verdict"]["verdict"], "approved");
        assert!(!temp.path().join("proj").join("report.json").exists());
    }
}
