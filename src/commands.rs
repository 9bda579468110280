//! Chat command and button-token parsing.
//!
//! Everything that reaches the store goes through here first, so titles,
//! priorities, due times and task ids are validated before any mutation.

use crate::channels::InlineAction;
use crate::error::{NudgeError, Result};
use crate::model::{DueTime, Priority, TaskId};

/// Labels offered as one-tap quick-add buttons.
pub const QUICK_ADD_LABELS: [&str; 5] = ["Gym", "Study", "Groceries", "Deep Work", "Call Mom"];

pub const ADD_USAGE: &str = "Usage: /add Finish module #study !high @18:00";
pub const TOMORROW_USAGE: &str = "Usage: /tomorrow Gym @07:00";
pub const DONE_USAGE: &str = "Usage: /done <task_id>";
pub const TZ_USAGE: &str = "Usage: /tz Continent/City  (e.g., /tz America/Los_Angeles)";

/// A validated task description parsed from command arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDraft {
    pub title: String,
    pub tags: Vec<String>,
    pub priority: Priority,
    pub due_time: Option<DueTime>,
}

/// Every action a user can request, by text or by button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    /// Add for the user's local today.
    Add(TaskDraft),
    /// Add for the user's local tomorrow.
    Tomorrow(TaskDraft),
    List,
    Done(TaskId),
    Snooze(TaskId),
    Delete(TaskId),
    Timezone(String),
    Focus,
    Week,
    /// Quick-add button: add a task titled with the label for today.
    QuickAdd(String),
    /// "New task..." button: explain how to add one.
    NewTaskHint,
}

/// Parse a text message. Errors carry the user-facing usage text.
pub fn parse_command(text: &str) -> Result<Command> {
    let text = text.trim();
    let Some(rest) = text.strip_prefix('/') else {
        return Err(NudgeError::Command(
            "I only understand commands. Try /help.".to_owned(),
        ));
    };
    let (head, args) = match rest.split_once(char::is_whitespace) {
        Some((head, args)) => (head, args.trim()),
        None => (rest, ""),
    };
    // Group-style `/cmd@BotName`.
    let name = head.split('@').next().unwrap_or(head).to_ascii_lowercase();

    match name.as_str() {
        "start" => Ok(Command::Start),
        "help" => Ok(Command::Help),
        "add" => parse_draft(args, ADD_USAGE, "/add Finish module").map(Command::Add),
        "tomorrow" => parse_draft(args, TOMORROW_USAGE, "/tomorrow Gym").map(Command::Tomorrow),
        "list" => Ok(Command::List),
        "done" => parse_task_id(args)
            .map(Command::Done)
            .ok_or_else(|| NudgeError::Command(DONE_USAGE.to_owned())),
        "tz" => {
            if args.is_empty() {
                Err(NudgeError::Command(TZ_USAGE.to_owned()))
            } else {
                Ok(Command::Timezone(args.to_owned()))
            }
        }
        "focus" => Ok(Command::Focus),
        "week" => Ok(Command::Week),
        other => Err(NudgeError::Command(format!(
            "Unknown command /{other}. Try /help."
        ))),
    }
}

fn parse_draft(args: &str, usage: &str, example: &str) -> Result<TaskDraft> {
    if args.is_empty() {
        return Err(NudgeError::Command(usage.to_owned()));
    }
    let draft = parse_task_args(args)?;
    if draft.title.is_empty() {
        return Err(NudgeError::Command(format!(
            "Please include a task title. Example: {example}"
        )));
    }
    Ok(draft)
}

/// Split `<title words> [#tag ...] [!low|!med|!high] [@HH:MM]` into a draft.
///
/// Markers may appear anywhere; the remaining words form the title. The title
/// may come back empty, which callers reject.
pub fn parse_task_args(args: &str) -> Result<TaskDraft> {
    let mut title = Vec::new();
    let mut tags = Vec::new();
    let mut priority = Priority::default();
    let mut due_time = None;

    for token in args.split_whitespace() {
        if token.len() > 1 && token.starts_with('#') {
            tags.push(token.to_owned());
        } else if let Some(level) = token.strip_prefix('!') {
            priority = level.parse().map_err(|_| {
                NudgeError::Command(format!("Priority must be !low, !med or !high, not {token}."))
            })?;
        } else if let Some(time) = token.strip_prefix('@') {
            let parsed = time.parse().map_err(|_| {
                NudgeError::Command(format!("Due time must look like @18:00, not {token}."))
            })?;
            due_time = Some(parsed);
        } else {
            title.push(token);
        }
    }

    Ok(TaskDraft {
        title: title.join(" "),
        tags,
        priority,
        due_time,
    })
}

fn parse_task_id(raw: &str) -> Option<TaskId> {
    let raw = raw.trim().trim_start_matches('#');
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok().map(TaskId)
}

/// Map an inline button token to its command.
pub fn parse_callback(token: &str) -> Result<Command> {
    let invalid = || NudgeError::Command("That button has expired.".to_owned());
    if token == "newtask" {
        return Ok(Command::NewTaskHint);
    }
    let (action, arg) = token.split_once('|').ok_or_else(invalid)?;
    match action {
        "quickadd" if QUICK_ADD_LABELS.contains(&arg) => Ok(Command::QuickAdd(arg.to_owned())),
        "done" => parse_task_id(arg).map(Command::Done).ok_or_else(invalid),
        "snooze" => parse_task_id(arg).map(Command::Snooze).ok_or_else(invalid),
        "delete" => parse_task_id(arg).map(Command::Delete).ok_or_else(invalid),
        _ => Err(invalid()),
    }
}

/// Quick-add keyboard, two buttons per row, ending with "New task...".
#[must_use]
pub fn quick_add_actions() -> Vec<Vec<InlineAction>> {
    let mut buttons: Vec<InlineAction> = QUICK_ADD_LABELS
        .iter()
        .map(|label| InlineAction::new(format!("➕ {label}"), format!("quickadd|{label}")))
        .collect();
    buttons.push(InlineAction::new("New task…", "newtask"));
    buttons.chunks(2).map(<[InlineAction]>::to_vec).collect()
}

/// Done / Snooze / Delete row for one task.
#[must_use]
pub fn task_actions(id: TaskId) -> Vec<Vec<InlineAction>> {
    vec![vec![
        InlineAction::new("✅ Done", format!("done|{id}")),
        InlineAction::new("😴 Snooze", format!("snooze|{id}")),
        InlineAction::new("🗑️ Delete", format!("delete|{id}")),
    ]]
}
