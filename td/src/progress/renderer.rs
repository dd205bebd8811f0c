//! Renders the single progress comment a task's coordinator edits in place
//! on the tracker item, per the fixed markdown contract.

use chrono::{DateTime, Utc};
use tracing::debug;

/// One checklist line, one per planned subtask.
#[derive(Debug, Clone)]
pub struct ChecklistItem {
    pub name: String,
    pub description: String,
    pub done: bool,
}

/// One collapsed-history entry (a phase transition, a reflection, a replan).
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub at: DateTime<Utc>,
    pub title: String,
    pub body: String,
}

/// Accumulated render state for one task's progress comment. The
/// coordinator mutates this as phases advance and calls `render` before
/// each `tracker.update_comment` call.
#[derive(Debug, Clone)]
pub struct ProgressComment {
    pub started_at: DateTime<Utc>,
    pub current_phase: String,
    pub status: String,
    pub latest_comment: Option<String>,
    pub llm_calls: u64,
    pub checklist: Vec<ChecklistItem>,
    pub history: Vec<HistoryEntry>,
}

impl ProgressComment {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            current_phase: "pre_planning".to_string(),
            status: "running".to_string(),
            latest_comment: None,
            llm_calls: 0,
            checklist: Vec::new(),
            history: Vec::new(),
        }
    }

    pub fn set_phase(&mut self, phase: &str) {
        debug!(phase, "ProgressComment::set_phase: called");
        self.current_phase = phase.to_string();
    }

    pub fn set_checklist(&mut self, items: Vec<ChecklistItem>) {
        self.checklist = items;
    }

    pub fn mark_done(&mut self, name: &str) {
        if let Some(item) = self.checklist.iter_mut().find(|i| i.name == name) {
            item.done = true;
        }
    }

    pub fn push_history(&mut self, at: DateTime<Utc>, title: impl Into<String>, body: impl Into<String>) {
        self.history.push(HistoryEntry {
            at,
            title: title.into(),
            body: body.into(),
        });
    }

    pub fn done_count(&self) -> usize {
        self.checklist.iter().filter(|i| i.done).count()
    }

    /// Render the full fixed-format markdown comment body.
    pub fn render(&self, now: DateTime<Utc>) -> String {
        let done = self.done_count();
        let total = self.checklist.len();

        let mut out = String::new();
        out.push_str("# 🤖 Task Execution Progress\n");
        out.push_str("## 📊 Status\n");
        out.push_str(&format!("- Phase: {}\n", self.current_phase));
        out.push_str(&format!("- Status: {}\n", self.status));
        out.push_str(&format!("- Latest comment: {}\n", self.latest_comment.as_deref().unwrap_or("none")));
        out.push_str(&format!("- Progress: {done}/{total} actions\n"));
        out.push_str(&format!("- LLM calls: {}\n", self.llm_calls));
        out.push_str("## 🎯 Checklist\n");
        for item in &self.checklist {
            let mark = if item.done { "x" } else { " " };
            out.push_str(&format!("- [{mark}] **{}**: {}\n", item.name, item.description));
        }
        out.push_str("## 📝 History (collapsed)\n");
        out.push_str("<details><summary>Details</summary>\n\n");
        for entry in &self.history {
            out.push_str(&format!("### [{}] {}\n{}\n\n", entry.at.format("%H:%M:%S"), entry.title, entry.body));
        }
        out.push_str("</details>\n\n");
        out.push_str("---\n");
        out.push_str(&format!(
            "*started: {} | updated: {}*\n",
            self.started_at.format("%Y-%m-%d %H:%M:%S"),
            now.format("%Y-%m-%d %H:%M:%S")
        ));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn render_shows_progress_fraction() {
        let mut comment = ProgressComment::new(fixed_time());
        comment.set_checklist(vec![
            ChecklistItem {
                name: "create_readme".to_string(),
                description: "Create README.md".to_string(),
                done: false,
            },
        ]);
        comment.mark_done("create_readme");

        let rendered = comment.render(fixed_time());
        assert!(rendered.contains("Progress: 1/1 actions"));
        assert!(rendered.contains("- [x] **create_readme**: Create README.md"));
    }

    #[test]
    fn unmarked_items_render_unchecked() {
        let mut comment = ProgressComment::new(fixed_time());
        comment.set_checklist(vec![ChecklistItem {
            name: "task_2".to_string(),
            description: "Second task".to_string(),
            done: false,
        }]);

        let rendered = comment.render(fixed_time());
        assert!(rendered.contains("- [ ] **task_2**: Second task"));
    }

    #[test]
    fn latest_comment_defaults_to_none() {
        let comment = ProgressComment::new(fixed_time());
        let rendered = comment.render(fixed_time());
        assert!(rendered.contains("Latest comment: none"));
    }
}
