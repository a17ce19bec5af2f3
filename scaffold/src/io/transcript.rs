//! Transcript of oracle exchanges and the final report, under `--log-dir`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::io::oracle::{Message, OracleReply};

/// One request/reply pair, written as `NNN-<phase>.json`.
#[derive(Debug, Clone, Serialize)]
pub struct ExchangeRecord<'a> {
    pub seq: u32,
    pub phase: &'a str,
    /// Project-relative path of the file being generated, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<&'a str>,
    pub messages: &'a [Message],
    pub reply: &'a OracleReply,
}

/// Sequentially numbered log directory for one run.
#[derive(Debug)]
pub struct Transcript {
    dir: PathBuf,
    next_seq: u32,
}

impl Transcript {
    pub fn create(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("create log dir {}", dir.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            next_seq: 1,
        })
    }

    pub fn record_exchange(
        &mut self,
        phase: &str,
        target: Option<&str>,
        messages: &[Message],
        reply: &OracleReply,
    ) -> Result<PathBuf> {
        let seq = self.next_seq;
        self.next_seq += 1;
        let path = self.dir.join(format!("{seq:03}-{phase}.json"));
        write_json(
            &path,
            &ExchangeRecord {
                seq,
                phase,
                target,
                messages,
                reply,
            },
        )?;
        Ok(path)
    }

    pub fn write_report<T: Serialize>(&self, report: &T) -> Result<PathBuf> {
        let path = self.dir.join("report.json");
        write_json(&path, report)?;
        Ok(path)
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value)
        .with_context(|| format!("serialize {}", path.display()))?;
    buf.push('\n');
    fs::write(path, buf).with_context(|| format!("write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn exchanges_are_numbered_in_order() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut transcript = Transcript::create(&temp.path().join("logs")).expect("create");
        let messages = vec![Message::user("layout please")];

        let first = transcript
            .record_exchange("layout", None, &messages, &OracleReply::Text("{}".to_string()))
            .expect("first");
        let second = transcript
            .record_exchange(
                "generate",
                Some("main.py"),
                &messages,
                &OracleReply::TransientFailure("http status 503".to_string()),
            )
            .expect("second");

        assert!(first.ends_with("001-layout.json"));
        assert!(second.ends_with("002-generate.json"));

        let record: Value =
            serde_json::from_str(&fs::read_to_string(&second).expect("read")).expect("json");
        assert_eq!(record["seq"], 2);
        assert_eq!(record["target"], "main.py");
        assert_eq!(record["messages"][0]["role"], "user");
        assert_eq!(record["reply"]["reply"], "transient_failure");
        assert_eq!(record["reply"]["detail"], "http status 503");

        let first_record: Value =
            serde_json::from_str(&fs::read_to_string(&first).expect("read")).expect("json");
        assert!(first_record.get("target").is_none());
    }

    #[test]
    fn report_is_written_as_json() {
        let temp = tempfile::tempdir().expect("tempdir");
        let transcript = Transcript::create(temp.path()).expect("create");
        let path = transcript
            .write_report(&serde_json::json!({ "project_name": "demo" }))
            .expect("report");
        assert_eq!(path, temp.path().join("report.json"));
        let text = fs::read_to_string(path).expect("read");
        assert!(text.ends_with("}\n"));
    }
}
