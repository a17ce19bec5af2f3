//! Prompt packs for the layout, per-file and review calls.
//!
//! Templates mark their sections with `<!-- section:KEY required|droppable -->`. After
//! rendering, droppable sections are removed in a fixed order until the prompt fits the
//! byte budget.

use std::sync::LazyLock;

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use regex::Regex;
use tracing::{debug, warn};

use crate::core::context::RenderedContext;
use crate::core::layout::{ENTRY_NAMES, FORBIDDEN_CHARS, MAX_DEPTH};
use crate::core::types::{FileKind, RunOutcome};
use crate::io::oracle::Message;

const LAYOUT_TEMPLATE: &str = include_str!("prompts/layout.md");
const GENERATE_FILE_TEMPLATE: &str = include_str!("prompts/generate_file.md");
const REVIEW_TEMPLATE: &str = include_str!("prompts/review.md");

const SYSTEM_PROMPT: &str =
    "You are a careful Python developer. Follow the contract in each request exactly.";

/// Sections removed first when a prompt is over budget.
const DROP_ORDER: [&str; 4] = ["layout", "context", "issue", "run"];

/// Bytes of stdout/stderr shown to the reviewer.
const RUN_TAIL_BYTES: usize = 2_000;

static SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<!--\s*section:(\w+)\s+(required|droppable)\s*-->")
        .expect("section marker regex should compile")
});

struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("layout", LAYOUT_TEMPLATE)
            .context("load layout template")?;
        env.add_template("generate_file", GENERATE_FILE_TEMPLATE)
            .context("load generate_file template")?;
        env.add_template("review", REVIEW_TEMPLATE)
            .context("load review template")?;
        Ok(Self { env })
    }

    fn render(&self, name: &str, ctx: minijinja::Value) -> Result<String> {
        let template = self.env.get_template(name)?;
        template
            .render(ctx)
            .with_context(|| format!("render {name} prompt"))
    }
}

#[derive(Debug, Clone)]
struct ParsedSection {
    key: String,
    required: bool,
    /// Section text after its marker.
    content: String,
}

fn parse_sections(rendered: &str) -> Vec<ParsedSection> {
    let markers: Vec<_> = SECTION_RE.captures_iter(rendered).collect();
    let mut sections = Vec::with_capacity(markers.len());

    for (i, caps) in markers.iter().enumerate() {
        let (Some(whole), Some(key), Some(flag)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        let end = markers
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map_or(rendered.len(), |m| m.start());
        let content = rendered[whole.end()..end].trim().to_string();
        let required = flag.as_str() == "required";
        if !content.is_empty() || required {
            sections.push(ParsedSection {
                key: key.as_str().to_string(),
                required,
                content,
            });
        }
    }

    sections
}

fn total_len(sections: &[ParsedSection]) -> usize {
    sections.iter().map(|s| s.content.len()).sum()
}

/// Drop droppable sections in [`DROP_ORDER`] until `sections` fit `budget`.
fn apply_budget_to_sections(sections: &mut Vec<ParsedSection>, budget: usize) {
    for key in DROP_ORDER {
        if total_len(sections) <= budget {
            return;
        }
        if let Some(idx) = sections.iter().position(|s| s.key == key && !s.required) {
            let dropped = sections.remove(idx);
            debug!(
                section = key,
                bytes_dropped = dropped.content.len(),
                "dropped section for budget"
            );
        }
    }
    if total_len(sections) > budget {
        warn!(
            bytes = total_len(sections),
            budget, "prompt exceeds budget with only required sections"
        );
    }
}

fn render_sections(sections: &[ParsedSection]) -> String {
    sections
        .iter()
        .map(|s| s.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Inputs of a per-file generation prompt.
#[derive(Debug, Clone)]
pub struct FileInputs<'a> {
    pub task: &'a str,
    pub relative_path: &'a str,
    pub kind: FileKind,
    /// One leaf path per line.
    pub layout_summary: &'a str,
    pub context: &'a RenderedContext,
    /// Why the previous attempt for this file was rejected.
    pub previous_issue: Option<&'a str>,
}

/// Inputs of the self-validation prompt.
#[derive(Debug, Clone)]
pub struct ReviewInputs<'a> {
    pub task: &'a str,
    pub entry_path: &'a str,
    pub entry_content: &'a str,
    pub outcome: Option<&'a RunOutcome>,
}

/// Renders prompt packs within a byte budget.
pub struct PromptBuilder {
    engine: PromptEngine,
    budget_bytes: usize,
}

impl PromptBuilder {
    pub fn new(budget_bytes: usize) -> Result<Self> {
        Ok(Self {
            engine: PromptEngine::new()?,
            budget_bytes,
        })
    }

    pub fn build_layout(&self, task: &str) -> Result<PromptPack> {
        let extensions = FileKind::ALLOWED_EXTENSIONS
            .iter()
            .map(|ext| format!("`.{ext}`"))
            .collect::<Vec<_>>()
            .join(", ");
        let entry_names = ENTRY_NAMES
            .iter()
            .map(|name| format!("`{name}`"))
            .collect::<Vec<_>>()
            .join(" or ");
        let forbidden = FORBIDDEN_CHARS
            .iter()
            .map(|c| format!("`{c}`"))
            .collect::<Vec<_>>()
            .join(" ");
        let rendered = self.engine.render(
            "layout",
            context! {
                task => task.trim(),
                extensions => extensions,
                entry_names => entry_names,
                max_depth => MAX_DEPTH,
                forbidden => forbidden,
            },
        )?;
        Ok(self.pack(&rendered))
    }

    pub fn build_file(&self, input: &FileInputs<'_>) -> Result<PromptPack> {
        let kind = match input.kind {
            FileKind::Source => "source",
            FileKind::Data => "data",
            FileKind::Doc => "doc",
        };
        let rendered = self.engine.render(
            "generate_file",
            context! {
                task => input.task.trim(),
                path => input.relative_path,
                kind => kind,
                layout => non_blank(input.layout_summary),
                context => (!input.context.omitted.is_empty() || input.context.json.trim() != "{}")
                    .then_some(input.context.json.as_str()),
                omitted => &input.context.omitted,
                issue => input.previous_issue.and_then(non_blank),
            },
        )?;
        Ok(self.pack(&rendered))
    }

    pub fn build_review(&self, input: &ReviewInputs<'_>) -> Result<PromptPack> {
        let run = input.outcome.map(summarize_outcome);
        let rendered = self.engine.render(
            "review",
            context! {
                task => input.task.trim(),
                path => input.entry_path,
                content => input.entry_content.trim_end(),
                run => run,
            },
        )?;
        Ok(self.pack(&rendered))
    }

    fn pack(&self, rendered: &str) -> PromptPack {
        let mut sections = parse_sections(rendered);
        apply_budget_to_sections(&mut sections, self.budget_bytes);
        PromptPack {
            content: render_sections(&sections),
        }
    }
}

/// A rendered prompt, sent as a system message plus one user message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptPack {
    content: String,
}

impl PromptPack {
    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn messages(&self) -> Vec<Message> {
        vec![
            Message::system(SYSTEM_PROMPT),
            Message::user(self.content.clone()),
        ]
    }
}

fn non_blank(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

fn summarize_outcome(outcome: &RunOutcome) -> String {
    let status = match outcome.exit_code {
        Some(code) => format!("exit code {code}"),
        None => "terminated without an exit code".to_string(),
    };
    let mut summary = status;
    if let Some(stdout) = non_blank(&outcome.stdout) {
        summary.push_str("\nstdout (tail):\n");
        summary.push_str(tail(stdout, RUN_TAIL_BYTES));
    }
    if let Some(stderr) = non_blank(&outcome.stderr) {
        summary.push_str("\nstderr (tail):\n");
        summary.push_str(tail(stderr, RUN_TAIL_BYTES));
    }
    summary
}

fn tail(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut start = text.len() - max;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}
