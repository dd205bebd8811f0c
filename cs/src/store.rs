//! Per-task context directory: the durable, append-only conversation log a
//! coordinator reads and writes on every LLM turn.
//!
//! Layout (see crate docs):
//! ```text
//! {task_dir}/
//!   metadata.json
//!   messages.jsonl     # full audit log, append-only, dense seq
//!   current.jsonl       # active LLM-facing transcript, rewritten on compression
//!   summaries.jsonl
//!   tools.jsonl
//!   planning/{uuid}.jsonl
//!   final_summary.txt
//! ```

use eyre::{Context, Result, eyre};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Metadata snapshot written once when a task's context directory is created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskMetadata {
    pub task_uuid: String,
    pub task_source: String,
    pub created_at: i64,
    pub llm_provider: String,
    pub model: String,
    pub context_length: usize,
    pub requester: String,
    #[serde(default)]
    pub is_resumed: bool,
}

/// One line of `messages.jsonl` - the full, never-rewritten audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    pub seq: u64,
    pub role: String,
    pub content: String,
    pub timestamp: i64,
    pub tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

/// One line of `current.jsonl` - the LLM-facing projection of a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

/// One line of `tools.jsonl`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub seq: u64,
    pub tool: String,
    pub args: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
    pub timestamp: i64,
}

/// One line of `summaries.jsonl`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub id: String,
    pub start_seq: u64,
    pub end_seq: u64,
    pub summary: String,
    pub original_tokens: usize,
    pub summary_tokens: usize,
    pub timestamp: i64,
}

/// One line of `planning/{uuid}.jsonl`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanningEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub payload: serde_json::Value,
    pub timestamp: i64,
}

/// The result of `plan_compression`: what to summarize, and what to keep.
/// `apply_compression` consumes this plus the caller-produced summary text.
#[derive(Debug, Clone)]
pub struct CompressionPlan {
    pub start_seq: u64,
    pub end_seq: u64,
    pub original_tokens: usize,
    pub to_summarize_text: String,
    unsummarized: Vec<ChatMessage>,
}

/// Estimate token count for a piece of text.
///
/// ceil(chars/4), except ceil(chars/2) when at least half the characters
/// fall in the CJK Unified Ideographs / Hiragana / Katakana ranges - those
/// scripts pack far more meaning per character than Latin text does.
pub fn estimate_tokens(text: &str) -> usize {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return 0;
    }
    let japanese = chars
        .iter()
        .filter(|c| {
            let c = **c as u32;
            (0x3040..=0x30FF).contains(&c) || (0x4E00..=0x9FFF).contains(&c)
        })
        .count();
    let ratio = japanese as f64 / chars.len() as f64;
    let divisor = if ratio >= 0.5 { 2 } else { 4 };
    chars.len().div_ceil(divisor)
}

/// A single task's context directory.
pub struct ContextStore {
    task_dir: PathBuf,
    next_seq: std::sync::atomic::AtomicU64,
    next_tool_seq: std::sync::atomic::AtomicU64,
}

impl ContextStore {
    /// Create a brand-new context directory. Errors if `task_dir` already
    /// contains a `metadata.json`.
    pub fn create(task_dir: impl AsRef<Path>, metadata: TaskMetadata) -> Result<Self> {
        let task_dir = task_dir.as_ref().to_path_buf();
        let meta_path = task_dir.join("metadata.json");
        if meta_path.exists() {
            return Err(eyre!("context directory already initialized: {}", task_dir.display()));
        }
        fs::create_dir_all(task_dir.join("planning")).context("failed to create context directory")?;
        fs::write(&meta_path, serde_json::to_string_pretty(&metadata)?)?;
        File::create(task_dir.join("messages.jsonl"))?;
        File::create(task_dir.join("current.jsonl"))?;
        File::create(task_dir.join("summaries.jsonl"))?;
        File::create(task_dir.join("tools.jsonl"))?;
        info!(task_uuid = %metadata.task_uuid, "ContextStore::create: initialized context directory");
        Ok(Self {
            task_dir,
            next_seq: std::sync::atomic::AtomicU64::new(1),
            next_tool_seq: std::sync::atomic::AtomicU64::new(1),
        })
    }

    /// Re-open a previously created context directory (e.g. on resume from
    /// `paused/`), picking up `seq` where the last run left off.
    pub fn open_existing(task_dir: impl AsRef<Path>) -> Result<Self> {
        let task_dir = task_dir.as_ref().to_path_buf();
        if !task_dir.join("metadata.json").exists() {
            return Err(eyre!("no context directory at {}", task_dir.display()));
        }
        let next_seq = Self::highest_seq(&task_dir)? + 1;
        let next_tool_seq = Self::highest_tool_seq(&task_dir)? + 1;
        debug!(next_seq, next_tool_seq, "ContextStore::open_existing: resuming");
        Ok(Self {
            task_dir,
            next_seq: std::sync::atomic::AtomicU64::new(next_seq),
            next_tool_seq: std::sync::atomic::AtomicU64::new(next_tool_seq),
        })
    }

    fn highest_seq(task_dir: &Path) -> Result<u64> {
        let path = task_dir.join("messages.jsonl");
        if !path.exists() {
            return Ok(0);
        }
        let reader = BufReader::new(File::open(&path)?);
        let mut max = 0u64;
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: MessageRecord = serde_json::from_str(&line)?;
            max = max.max(record.seq);
        }
        Ok(max)
    }

    fn highest_tool_seq(task_dir: &Path) -> Result<u64> {
        let path = task_dir.join("tools.jsonl");
        if !path.exists() {
            return Ok(0);
        }
        let reader = BufReader::new(File::open(&path)?);
        let mut max = 0u64;
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: ToolCallRecord = serde_json::from_str(&line)?;
            max = max.max(record.seq);
        }
        Ok(max)
    }

    pub fn metadata(&self) -> Result<TaskMetadata> {
        let content = fs::read_to_string(self.task_dir.join("metadata.json"))?;
        Ok(serde_json::from_str(&content)?)
    }

    fn append_line(&self, path: PathBuf, line: &str) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .context(format!("failed to open {}", path.display()))?;
        writeln!(file, "{line}")?;
        file.flush()?;
        Ok(())
    }

    /// Append one turn to both `messages.jsonl` (audit) and `current.jsonl`
    /// (LLM-facing). Both writes happen before returning.
    pub fn append_message(&self, role: &str, content: &str, tool_name: Option<&str>) -> Result<MessageRecord> {
        let seq = self.next_seq.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let record = MessageRecord {
            seq,
            role: role.to_string(),
            content: content.to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            tokens: estimate_tokens(content),
            tool_name: tool_name.map(str::to_string),
        };
        self.append_line(self.task_dir.join("messages.jsonl"), &serde_json::to_string(&record)?)?;

        let chat = ChatMessage {
            role: role.to_string(),
            content: content.to_string(),
            tool_name: tool_name.map(str::to_string),
        };
        self.append_line(self.task_dir.join("current.jsonl"), &serde_json::to_string(&chat)?)?;

        Ok(record)
    }

    pub fn append_tool_call(&self, tool: &str, args: serde_json::Value, result: Option<serde_json::Value>, status: &str, error: Option<&str>, duration_ms: u64) -> Result<()> {
        let seq = self.next_tool_seq.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let record = ToolCallRecord {
            seq,
            tool: tool.to_string(),
            args,
            result,
            status: status.to_string(),
            error: error.map(str::to_string),
            duration_ms,
            timestamp: chrono::Utc::now().timestamp_millis(),
        };
        self.append_line(self.task_dir.join("tools.jsonl"), &serde_json::to_string(&record)?)
    }

    pub fn append_planning_event(&self, event_type: &str, payload: serde_json::Value) -> Result<()> {
        let event = PlanningEvent {
            event_type: event_type.to_string(),
            payload,
            timestamp: chrono::Utc::now().timestamp_millis(),
        };
        let meta = self.metadata()?;
        let path = self.task_dir.join("planning").join(format!("{}.jsonl", meta.task_uuid));
        self.append_line(path, &serde_json::to_string(&event)?)
    }

    /// Read the entire active transcript.
    pub fn current_messages(&self) -> Result<Vec<ChatMessage>> {
        let path = self.task_dir.join("current.jsonl");
        let reader = BufReader::new(File::open(&path)?);
        let mut out = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            out.push(serde_json::from_str(&line)?);
        }
        Ok(out)
    }

    /// Estimated token count of the entire active transcript.
    pub fn current_token_estimate(&self) -> Result<usize> {
        Ok(self.current_messages()?.iter().map(|m| estimate_tokens(&m.content)).sum())
    }

    /// True when the active transcript exceeds `context_length * threshold`
    /// (inclusive at the boundary).
    pub fn should_compress(&self, context_length: usize, threshold: f64) -> Result<bool> {
        let estimate = self.current_token_estimate()?;
        let limit = (context_length as f64 * threshold) as usize;
        Ok(estimate >= limit)
    }

    /// Split `current.jsonl` into a prefix to summarize and a tail to keep.
    /// Returns `None` if the prefix is too small to be worth compressing.
    pub fn plan_compression(&self, keep_recent: usize, min_to_compress: usize) -> Result<Option<CompressionPlan>> {
        let messages = self.current_messages()?;
        if messages.len() <= keep_recent {
            return Ok(None);
        }
        let split = messages.len() - keep_recent;
        if split < min_to_compress {
            return Ok(None);
        }
        let (prefix, tail) = messages.split_at(split);

        let to_summarize_text = prefix
            .iter()
            .map(|m| format!("[{}] {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n");
        let original_tokens = prefix.iter().map(|m| estimate_tokens(&m.content)).sum();

        // seq range is best-effort: current.jsonl doesn't carry seq, so we
        // report the messages.jsonl high-water mark for the summary record's
        // bookkeeping rather than a precise prefix range.
        let end_seq = self.next_seq.load(std::sync::atomic::Ordering::SeqCst).saturating_sub(1);
        let start_seq = end_seq.saturating_sub(messages.len() as u64).saturating_add(1);

        Ok(Some(CompressionPlan {
            start_seq,
            end_seq,
            original_tokens,
            to_summarize_text,
            unsummarized: tail.to_vec(),
        }))
    }

    /// Apply a previously computed `CompressionPlan` with the caller-supplied
    /// summary text (produced by an out-of-band LLM call). Rewrites
    /// `current.jsonl` via a temp file + atomic rename so a crash mid-write
    /// never leaves it partially written.
    pub fn apply_compression(&self, plan: &CompressionPlan, summary: &str) -> Result<()> {
        let summary_tokens = estimate_tokens(summary);
        let record = SummaryRecord {
            id: uuid::Uuid::now_v7().to_string(),
            start_seq: plan.start_seq,
            end_seq: plan.end_seq,
            summary: summary.to_string(),
            original_tokens: plan.original_tokens,
            summary_tokens,
            timestamp: chrono::Utc::now().timestamp_millis(),
        };
        self.append_line(self.task_dir.join("summaries.jsonl"), &serde_json::to_string(&record)?)?;

        let tmp_path = self.task_dir.join("current.jsonl.tmp");
        {
            let mut tmp = File::create(&tmp_path)?;
            let summary_msg = ChatMessage {
                role: "system".to_string(),
                content: format!("Summary of earlier conversation:\n{summary}"),
                tool_name: None,
            };
            writeln!(tmp, "{}", serde_json::to_string(&summary_msg)?)?;
            for msg in &plan.unsummarized {
                writeln!(tmp, "{}", serde_json::to_string(msg)?)?;
            }
            tmp.flush()?;
        }
        fs::rename(&tmp_path, self.task_dir.join("current.jsonl"))?;

        info!(
            original_tokens = plan.original_tokens,
            summary_tokens, "ContextStore::apply_compression: rewrote current.jsonl"
        );
        Ok(())
    }

    /// Text to feed the summarizer for the final, whole-task summary.
    pub fn final_summary_input(&self) -> Result<String> {
        let path = self.task_dir.join("messages.jsonl");
        let reader = BufReader::new(File::open(&path)?);
        let mut lines = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: MessageRecord = serde_json::from_str(&line)?;
            lines.push(format!("[{}] {}", record.role, record.content));
        }
        Ok(lines.join("\n"))
    }

    /// Persist the final summary produced from `final_summary_input`.
    pub fn write_final_summary(&self, summary: &str) -> Result<()> {
        fs::write(self.task_dir.join("final_summary.txt"), summary)?;
        Ok(())
    }

    /// Read a previously written final summary, if any (used by the
    /// inheritance resolver).
    pub fn read_final_summary(task_dir: impl AsRef<Path>) -> Result<Option<String>> {
        let path = task_dir.as_ref().join("final_summary.txt");
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(path)?))
    }

    /// Seed the first two inheritance messages (previous summary + new
    /// tracker body) into a freshly created context, truncating the prior
    /// summary to `max_inherited_tokens`.
    pub fn seed_inheritance(&self, previous_summary: &str, new_body: &str, max_inherited_tokens: usize) -> Result<()> {
        let truncated = truncate_to_tokens(previous_summary, max_inherited_tokens);
        self.append_message("assistant", &format!("Previous session summary:\n{truncated}"), None)?;
        self.append_message("user", new_body, None)?;
        Ok(())
    }

    pub fn task_dir(&self) -> &Path {
        &self.task_dir
    }

    /// Warn (but do not fail) when the audit log is growing past the
    /// configured size thresholds - mirrors the teacher's storage config
    /// warn/error knobs.
    pub fn check_size_thresholds(&self, warn_mb: u64, error_mb: u64) {
        if let Ok(meta) = fs::metadata(self.task_dir.join("messages.jsonl")) {
            let mb = meta.len() / (1024 * 1024);
            if mb >= error_mb {
                warn!(mb, limit = error_mb, "messages.jsonl exceeds the error threshold");
            } else if mb >= warn_mb {
                debug!(mb, limit = warn_mb, "messages.jsonl exceeds the warn threshold");
            }
        }
    }
}

fn truncate_to_tokens(text: &str, max_tokens: usize) -> String {
    if estimate_tokens(text) <= max_tokens {
        return text.to_string();
    }
    let max_chars = max_tokens * 4;
    let truncated: String = text.chars().take(max_chars).collect();
    format!("{truncated}\n...(truncated)")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn meta() -> TaskMetadata {
        TaskMetadata {
            task_uuid: "11111111-1111-7111-8111-111111111111".to_string(),
            task_source: "github_issue".to_string(),
            created_at: 0,
            llm_provider: "anthropic".to_string(),
            model: "claude-sonnet-4".to_string(),
            context_length: 200_000,
            requester: "alice".to_string(),
            is_resumed: false,
        }
    }

    #[test]
    fn append_message_is_sequential_and_dense() {
        let dir = TempDir::new().unwrap();
        let store = ContextStore::create(dir.path(), meta()).unwrap();
        let m1 = store.append_message("user", "hello", None).unwrap();
        let m2 = store.append_message("assistant", "hi", None).unwrap();
        assert_eq!(m1.seq, 1);
        assert_eq!(m2.seq, 2);
    }

    #[test]
    fn current_messages_mirrors_messages_log() {
        let dir = TempDir::new().unwrap();
        let store = ContextStore::create(dir.path(), meta()).unwrap();
        store.append_message("user", "hello", None).unwrap();
        let current = store.current_messages().unwrap();
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].content, "hello");
    }

    #[test]
    fn should_compress_triggers_at_threshold() {
        let dir = TempDir::new().unwrap();
        let store = ContextStore::create(dir.path(), meta()).unwrap();
        store.append_message("user", &"x".repeat(400), None).unwrap();
        // 400 chars -> 100 tokens estimate; context_length 100, threshold 1.0 -> limit 100
        assert!(store.should_compress(100, 1.0).unwrap());
        assert!(!store.should_compress(1000, 1.0).unwrap());
    }

    #[test]
    fn compression_rewrites_current_with_summary_plus_tail() {
        let dir = TempDir::new().unwrap();
        let store = ContextStore::create(dir.path(), meta()).unwrap();
        for i in 0..10 {
            store.append_message("user", &format!("message {i}"), None).unwrap();
        }
        let plan = store.plan_compression(3, 2).unwrap().expect("should have a plan");
        assert!(plan.to_summarize_text.contains("message 0"));

        store.apply_compression(&plan, "condensed history").unwrap();
        let current = store.current_messages().unwrap();
        // 1 summary line + 3 kept
        assert_eq!(current.len(), 4);
        assert_eq!(current[0].role, "system");
        assert!(current[0].content.contains("condensed history"));
        assert_eq!(current[1].content, "message 7");

        let messages_count = BufReader::new(File::open(dir.path().join("messages.jsonl")).unwrap())
            .lines()
            .count();
        assert_eq!(messages_count, 10, "messages.jsonl must never be rewritten");
    }

    #[test]
    fn plan_compression_aborts_when_prefix_too_small() {
        let dir = TempDir::new().unwrap();
        let store = ContextStore::create(dir.path(), meta()).unwrap();
        store.append_message("user", "only one", None).unwrap();
        assert!(store.plan_compression(5, 2).unwrap().is_none());
    }

    #[test]
    fn japanese_text_uses_denser_token_estimate() {
        let japanese = "こんにちは世界";
        let latin = "aaaaaaaaaaaaaaa"; // same char count
        assert!(estimate_tokens(japanese) > estimate_tokens(latin));
    }

    #[test]
    fn open_existing_resumes_seq_counter() {
        let dir = TempDir::new().unwrap();
        {
            let store = ContextStore::create(dir.path(), meta()).unwrap();
            store.append_message("user", "one", None).unwrap();
            store.append_message("assistant", "two", None).unwrap();
        }
        let store = ContextStore::open_existing(dir.path()).unwrap();
        let m = store.append_message("user", "three", None).unwrap();
        assert_eq!(m.seq, 3);
    }

    #[test]
    fn seed_inheritance_writes_two_messages() {
        let dir = TempDir::new().unwrap();
        let store = ContextStore::create(dir.path(), meta()).unwrap();
        store.seed_inheritance("prior work done", "new issue body", 1000).unwrap();
        let current = store.current_messages().unwrap();
        assert_eq!(current.len(), 2);
        assert!(current[0].content.contains("prior work done"));
        assert_eq!(current[1].content, "new issue body");
    }
}
