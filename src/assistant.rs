//! Command handling for inbound chat messages and button taps.
//!
//! The assistant resolves the user (creating them with the default zone on
//! first contact), validates the command, applies it to the store and
//! returns the reply to send back. Failures become replies; nothing here
//! propagates one user's bad input or storage hiccup to the caller.

use crate::channels::InlineAction;
use crate::clock::{TimeSource, parse_timezone};
use crate::commands::{
    Command, TaskDraft, parse_callback, parse_command, quick_add_actions, task_actions,
};
use crate::config::FocusConfig;
use crate::digest::{compose_agenda, focus_done, focus_started, week_summary};
use crate::error::{NudgeError, Result};
use crate::model::{NewTask, TaskId, TaskStatus, User, UserId};
use crate::scheduler::{FocusTimers, SchedulePolicy};
use crate::store::{TaskStore, UserDirectory};
use chrono::{Days, NaiveDate};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const TZ_REJECTED: &str =
    "That timezone isn't recognized. Try like America/New_York or Asia/Kathmandu";
const INTERNAL_ERROR: &str = "Something went wrong on my side. Please try again.";

/// Text plus optional inline keyboard to send back to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub actions: Vec<Vec<InlineAction>>,
}

impl Reply {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            actions: Vec::new(),
        }
    }

    fn with_actions(mut self, actions: Vec<Vec<InlineAction>>) -> Self {
        self.actions = actions;
        self
    }
}

pub struct Assistant {
    time: TimeSource,
    users: Arc<dyn UserDirectory>,
    tasks: Arc<dyn TaskStore>,
    focus: FocusTimers,
    focus_config: FocusConfig,
    schedule: SchedulePolicy,
}

impl Assistant {
    pub fn new(
        time: TimeSource,
        users: Arc<dyn UserDirectory>,
        tasks: Arc<dyn TaskStore>,
        focus: FocusTimers,
    ) -> Self {
        Self {
            time,
            users,
            tasks,
            focus,
            focus_config: FocusConfig::default(),
            schedule: SchedulePolicy::default(),
        }
    }

    #[must_use]
    pub fn with_focus_config(mut self, config: FocusConfig) -> Self {
        self.focus_config = config;
        self
    }

    /// Schedule shown in `/start`.
    #[must_use]
    pub fn with_schedule(mut self, schedule: SchedulePolicy) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn focus_timers(&self) -> &FocusTimers {
        &self.focus
    }

    /// Handle a text message. `/focus` spawns a tokio task, so call this
    /// from within a runtime.
    pub fn handle_text(&self, user_id: UserId, text: &str) -> Reply {
        match parse_command(text) {
            Ok(command) => self.dispatch(user_id, command),
            Err(e) => usage_reply(e),
        }
    }

    /// Handle an inline button token.
    pub fn handle_callback(&self, user_id: UserId, token: &str) -> Reply {
        match parse_callback(token) {
            Ok(command) => self.dispatch(user_id, command),
            Err(e) => usage_reply(e),
        }
    }

    fn dispatch(&self, user_id: UserId, command: Command) -> Reply {
        debug!(%user_id, ?command, "handling command");
        match self.execute(user_id, command) {
            Ok(reply) => reply,
            Err(NudgeError::Command(message)) => Reply::text(message),
            Err(e) => {
                warn!(%user_id, "command failed: {e}");
                Reply::text(INTERNAL_ERROR)
            }
        }
    }

    fn execute(&self, user_id: UserId, command: Command) -> Result<Reply> {
        let user = self
            .users
            .get_or_create_user(user_id, self.time.default_tz().name())?;

        match command {
            Command::Start => {
                Ok(Reply::text(self.start_text(&user)).with_actions(quick_add_actions()))
            }
            Command::Help => Ok(Reply::text(help_text(&self.focus_config))),
            Command::Add(draft) => {
                let today = self.time.today(&user);
                let id = self.add_task(user_id, draft.clone(), today)?;
                Ok(Reply::text(format!("Added for today: {}", draft.title))
                    .with_actions(task_actions(id)))
            }
            Command::Tomorrow(draft) => {
                let tomorrow = self
                    .time
                    .today(&user)
                    .checked_add_days(Days::new(1))
                    .ok_or_else(|| NudgeError::Store("calendar overflow".to_owned()))?;
                let id = self.add_task(user_id, draft.clone(), tomorrow)?;
                Ok(Reply::text(format!("Queued for tomorrow: {}", draft.title))
                    .with_actions(task_actions(id)))
            }
            Command::QuickAdd(label) => {
                let today = self.time.today(&user);
                let id = self
                    .tasks
                    .insert_task(&NewTask::new(user_id, label.clone(), today))?;
                Ok(Reply::text(format!("Added for today: {label}")).with_actions(task_actions(id)))
            }
            Command::NewTaskHint => Ok(Reply::text(
                "Send /add <task> [#tag] [!low|!med|!high] [@HH:MM] for today, or /tomorrow <task>.",
            )),
            Command::List => {
                let today = self.time.today(&user);
                let tasks = self.tasks.list_tasks(user_id, today, None)?;
                Ok(match compose_agenda(&tasks) {
                    Some(text) => Reply::text(text),
                    None => Reply::text("No tasks for today. Use /add or the buttons below.")
                        .with_actions(quick_add_actions()),
                })
            }
            Command::Done(id) => self.set_status(user_id, id, TaskStatus::Done, "Nice! Marked ✅"),
            Command::Snooze(id) => self.set_status(user_id, id, TaskStatus::Snoozed, "Snoozed 😴"),
            Command::Delete(id) => {
                if self.tasks.delete_task(user_id, id)? {
                    Ok(Reply::text("Deleted 🗑️"))
                } else {
                    Ok(not_found(id))
                }
            }
            Command::Timezone(name) => match parse_timezone(&name) {
                Ok(tz) => {
                    self.users.set_timezone(user_id, tz.name())?;
                    Ok(Reply::text(format!(
                        "Timezone set to {}. I'll schedule reminders accordingly.",
                        tz.name()
                    )))
                }
                Err(_) => Ok(Reply::text(TZ_REJECTED)),
            },
            Command::Focus => {
                let work = self.focus_config.work_minutes;
                self.focus.schedule_delayed(
                    user_id,
                    self.time.local_now(&user),
                    Duration::from_secs(work.saturating_mul(60)),
                    focus_done(work, self.focus_config.break_minutes),
                )?;
                Ok(Reply::text(focus_started(work)))
            }
            Command::Week => {
                let today = self.time.today(&user);
                let from = week_start(today);
                let counts = self.tasks.status_counts(user_id, from, today)?;
                Ok(Reply::text(week_summary(&counts)))
            }
        }
    }

    fn add_task(&self, user_id: UserId, draft: TaskDraft, day: NaiveDate) -> Result<TaskId> {
        let mut task = NewTask::new(user_id, draft.title, day)
            .with_priority(draft.priority)
            .with_tags(draft.tags);
        if let Some(due) = draft.due_time {
            task = task.with_due_time(due);
        }
        self.tasks.insert_task(&task)
    }

    fn set_status(
        &self,
        user_id: UserId,
        id: TaskId,
        status: TaskStatus,
        confirmation: &str,
    ) -> Result<Reply> {
        if self.tasks.update_status(user_id, id, status)? {
            Ok(Reply::text(confirmation))
        } else {
            Ok(not_found(id))
        }
    }

    fn start_text(&self, user: &User) -> String {
        let prompt_hours = self
            .schedule
            .prompt_hours
            .iter()
            .map(u8::to_string)
            .collect::<Vec<_>>()
            .join("/");
        format!(
            "👋 I'm your productive assistant!\n\n\
             • I'll ping you at {prompt_hours} to plan tomorrow.\n\
             • At {:02}:00 I'll send your Today list and carry over unfinished items.\n\
             • Use /add, /list, /done, /tomorrow, /tz, /focus, /week, /help.\n\n\
             Your timezone is {} (change via /tz <Area/City>).",
            self.schedule.digest_hour, user.timezone
        )
    }
}

/// First day of the seven-day window ending on `today`.
fn week_start(today: NaiveDate) -> NaiveDate {
    today.checked_sub_days(Days::new(6)).unwrap_or(today)
}

fn not_found(id: TaskId) -> Reply {
    Reply::text(format!("Task #{id} not found."))
}

fn usage_reply(error: NudgeError) -> Reply {
    match error {
        NudgeError::Command(message) => Reply::text(message),
        other => Reply::text(other.to_string()),
    }
}

fn help_text(focus: &FocusConfig) -> String {
    format!(
        "/add <task> [#tag ...] [!low|!med|!high] [@HH:MM] - add for today\n\
         /tomorrow <task> - add for tomorrow\n\
         /list - show today's tasks\n\
         /done <id> - mark task done\n\
         /tz <Area/City> - set your timezone (e.g., /tz America/Los_Angeles)\n\
         /focus - start a {}/{} Pomodoro\n\
         /week - show last-7-days stats",
        focus.work_minutes, focus.break_minutes
    )
}
