//! Scripted collaborators for offline tests of the agent and runner.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};

use crate::core::types::{DiagnosedCause, RunOutcome};
use crate::io::oracle::{Message, Oracle, OracleReply};
use crate::io::runner::{Host, LaunchOutput, LaunchRequest, ProgramRunner};

/// Oracle that replays queued replies and records every request.
///
/// Once the queue is empty it keeps answering with empty text.
#[derive(Debug, Default)]
pub struct ScriptedOracle {
    replies: RefCell<VecDeque<OracleReply>>,
    requests: RefCell<Vec<Vec<Message>>>,
}

impl ScriptedOracle {
    pub fn new(replies: Vec<OracleReply>) -> Self {
        Self {
            replies: RefCell::new(replies.into()),
            requests: RefCell::new(Vec::new()),
        }
    }

    /// Oracle answering each call with the given texts, in order.
    pub fn texts(texts: &[&str]) -> Self {
        Self::new(texts.iter().map(|text| text_reply(text)).collect())
    }

    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.borrow().clone()
    }

    /// User message of the `index`th request.
    pub fn prompt(&self, index: usize) -> Option<String> {
        self.requests
            .borrow()
            .get(index)
            .and_then(|messages| messages.last())
            .map(|message| message.content.clone())
    }
}

impl Oracle for ScriptedOracle {
    fn complete(&self, messages: &[Message]) -> OracleReply {
        self.requests.borrow_mut().push(messages.to_vec());
        self.replies
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| OracleReply::Text(String::new()))
    }
}

pub fn text_reply(text: &str) -> OracleReply {
    OracleReply::Text(text.to_string())
}

pub fn transient(detail: &str) -> OracleReply {
    OracleReply::TransientFailure(detail.to_string())
}

/// Host that replays queued launch results and records launches and installs.
#[derive(Debug)]
pub struct ScriptedHost {
    outputs: RefCell<VecDeque<LaunchOutput>>,
    launches: RefCell<Vec<LaunchRequest>>,
    installs: RefCell<Vec<String>>,
    install_succeeds: bool,
}

impl ScriptedHost {
    pub fn new(outputs: Vec<LaunchOutput>) -> Self {
        Self {
            outputs: RefCell::new(outputs.into()),
            launches: RefCell::new(Vec::new()),
            installs: RefCell::new(Vec::new()),
            install_succeeds: true,
        }
    }

    /// Make every install report failure.
    pub fn failing_installs(mut self) -> Self {
        self.install_succeeds = false;
        self
    }

    pub fn launches(&self) -> Vec<LaunchRequest> {
        self.launches.borrow().clone()
    }

    pub fn installs(&self) -> Vec<String> {
        self.installs.borrow().clone()
    }
}

impl Host for ScriptedHost {
    fn launch(&self, request: &LaunchRequest) -> Result<LaunchOutput> {
        self.launches.borrow_mut().push(request.clone());
        self.outputs
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("no scripted launch left for {}", request.entry.display()))
    }

    fn install(&self, package: &str) -> Result<bool> {
        self.installs.borrow_mut().push(package.to_string());
        Ok(self.install_succeeds)
    }
}

pub fn launch_ok(stdout: &str) -> LaunchOutput {
    LaunchOutput {
        exit_code: Some(0),
        success: true,
        stdout: stdout.to_string(),
        stderr: String::new(),
    }
}

pub fn launch_fail(stderr: &str) -> LaunchOutput {
    LaunchOutput {
        exit_code: Some(1),
        success: false,
        stdout: String::new(),
        stderr: stderr.to_string(),
    }
}

/// Runner that returns queued outcomes and records `(root, entry)` per call.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    outcomes: RefCell<VecDeque<RunOutcome>>,
    calls: RefCell<Vec<(PathBuf, PathBuf)>>,
}

impl ScriptedRunner {
    pub fn new(outcomes: Vec<RunOutcome>) -> Self {
        Self {
            outcomes: RefCell::new(outcomes.into()),
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(PathBuf, PathBuf)> {
        self.calls.borrow().clone()
    }
}

impl ProgramRunner for ScriptedRunner {
    fn run(&self, root: &Path, entry: &Path) -> Result<RunOutcome> {
        self.calls
            .borrow_mut()
            .push((root.to_path_buf(), entry.to_path_buf()));
        self.outcomes
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("no scripted outcome left for {}", entry.display()))
    }
}

pub fn outcome_ok(stdout: &str) -> RunOutcome {
    RunOutcome {
        exit_code: Some(0),
        success: true,
        stdout: stdout.to_string(),
        stderr: String::new(),
        diagnosed_cause: DiagnosedCause::None,
        recoveries: Vec::new(),
    }
}

pub fn outcome_fail(stderr: &str, cause: DiagnosedCause) -> RunOutcome {
    RunOutcome {
        exit_code: Some(1),
        success: false,
        stdout: String::new(),
        stderr: stderr.to_string(),
        diagnosed_cause: cause,
        recoveries: Vec::new(),
    }
}
