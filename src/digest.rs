//! Message text for digests, agendas and scheduled notices.
//!
//! Everything here is pure: callers fetch tasks and pass them in.

use crate::model::{Priority, StatusCounts, Task, TaskStatus};

/// Fixed text of the tomorrow-planning prompt.
pub const PROMPT_TEXT: &str = "📝 What would you like to add for tomorrow? Use /tomorrow <task>.";

const YESTERDAY_HEADER: &str = "⏮️ Yesterday (still open, copied to today):";
const TODAY_HEADER: &str = "☀️ Today:";
const EMPTY_TODAY: &str = "(no tasks), use /add or /tomorrow to plan.";

fn status_marker(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Open => "⬜",
        TaskStatus::Done => "✅",
        TaskStatus::Snoozed => "😴",
    }
}

fn priority_marker(priority: Priority) -> &'static str {
    match priority {
        Priority::High => "⬆️",
        Priority::Med => "⚪",
        Priority::Low => "⬇️",
    }
}

/// One agenda line, e.g. `⬜ ⬆️ Finish module @ 18:00 #study (#12)`.
#[must_use]
pub fn format_task(task: &Task) -> String {
    let mut line = format!(
        "{} {} {}",
        status_marker(task.status),
        priority_marker(task.priority),
        task.title
    );
    if let Some(due) = task.due_time {
        line.push_str(&format!(" @ {due}"));
    }
    if !task.tags.is_empty() {
        line.push(' ');
        line.push_str(&task.tags.join(" "));
    }
    line.push_str(&format!(" (#{})", task.id));
    line
}

fn format_lines(tasks: &[Task]) -> String {
    tasks.iter().map(format_task).collect::<Vec<_>>().join("\n")
}

/// Morning digest: yesterday's still-open tasks (when any) and today's agenda.
///
/// Both slices are rendered as given: callers pass `yesterday_open` in the
/// order the tasks were added and `today` in agenda order.
#[must_use]
pub fn compose_digest(yesterday_open: &[Task], today: &[Task]) -> String {
    let mut sections = Vec::with_capacity(2);
    if !yesterday_open.is_empty() {
        sections.push(format!("{YESTERDAY_HEADER}\n{}", format_lines(yesterday_open)));
    }
    if today.is_empty() {
        sections.push(format!("{TODAY_HEADER}\n{EMPTY_TODAY}"));
    } else {
        sections.push(format!("{TODAY_HEADER}\n{}", format_lines(today)));
    }
    sections.join("\n\n")
}

/// Agenda reply for `/list`, or `None` when the day is empty.
#[must_use]
pub fn compose_agenda(today: &[Task]) -> Option<String> {
    (!today.is_empty()).then(|| format_lines(today))
}

#[must_use]
pub fn carry_notice(count: usize) -> String {
    format!("↪️ Carried over {count} unfinished task(s) from yesterday.")
}

/// Reply confirming a focus session start.
#[must_use]
pub fn focus_started(work_minutes: u64) -> String {
    format!("⏱️ Focus started: {work_minutes} minutes. I'll ping you when time's up!")
}

/// Text delivered when a focus session ends.
#[must_use]
pub fn focus_done(work_minutes: u64, break_minutes: u64) -> String {
    format!(
        "⏰ {work_minutes} minutes done! Take a {break_minutes}-min break (/focus to start again)."
    )
}

/// `/week` summary line.
#[must_use]
pub fn week_summary(counts: &StatusCounts) -> String {
    format!(
        "📊 Last 7 days: {}/{} done ({}% completion). Keep going!",
        counts.done,
        counts.total(),
        counts.completion_percent()
    )
}
