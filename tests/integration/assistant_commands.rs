use crate::helpers::{date, harness, utc};
use chrono_tz::Tz;
use nudge::commands::{ADD_USAGE, DONE_USAGE};
use nudge::model::{NewTask, TaskStatus, UserId};
use nudge::store::{TaskStore, UserDirectory};

fn timezone_of(store: &dyn UserDirectory, user: UserId) -> String {
    store
        .list_users()
        .unwrap()
        .into_iter()
        .find(|u| u.user_id == user)
        .map(|u| u.timezone)
        .unwrap()
}

#[test]
fn start_registers_user_with_default_zone() {
    let h = harness(Tz::America__Los_Angeles, utc(2026, 1, 15, 17, 0));
    let assistant = h.assistant();

    let reply = assistant.handle_text(UserId(42), "/start");
    assert!(reply.text.contains("10/13/16/19/22"));
    assert!(reply.text.contains("At 08:00"));
    assert!(reply.text.contains("America/Los_Angeles"));
    assert_eq!(reply.actions.len(), 3);
    assert_eq!(reply.actions[2][1].token, "newtask");

    assert_eq!(timezone_of(h.store.as_ref(), UserId(42)), "America/Los_Angeles");
}

#[test]
fn list_orders_by_priority_then_due_time() {
    let h = harness(Tz::UTC, utc(2026, 1, 15, 9, 0));
    let assistant = h.assistant();
    let user = UserId(42);

    for text in [
        "/add Read !low",
        "/add Gym @07:00",
        "/add Finish module #study !high @18:00",
        "/add Email",
    ] {
        let reply = assistant.handle_text(user, text);
        assert!(reply.text.starts_with("Added for today: "), "{text}: {}", reply.text);
    }

    let agenda = assistant.handle_text(user, "/list").text;
    let lines: Vec<&str> = agenda.lines().collect();
    assert_eq!(
        lines,
        vec![
            "⬜ ⬆️ Finish module @ 18:00 #study (#3)",
            "⬜ ⚪ Gym @ 07:00 (#2)",
            "⬜ ⚪ Email (#4)",
            "⬜ ⬇️ Read (#1)",
        ]
    );
}

#[test]
fn add_reply_offers_task_buttons() {
    let h = harness(Tz::UTC, utc(2026, 1, 15, 9, 0));
    let reply = h.assistant().handle_text(UserId(7), "/add Laundry");

    assert_eq!(reply.text, "Added for today: Laundry");
    let tokens: Vec<&str> = reply.actions[0].iter().map(|a| a.token.as_str()).collect();
    assert_eq!(tokens, vec!["done|1", "snooze|1", "delete|1"]);
}

#[test]
fn empty_list_offers_quick_add() {
    let h = harness(Tz::UTC, utc(2026, 1, 15, 9, 0));
    let reply = h.assistant().handle_text(UserId(7), "/list");
    assert_eq!(reply.text, "No tasks for today. Use /add or the buttons below.");
    assert_eq!(reply.actions[0][0].token, "quickadd|Gym");
}

#[test]
fn today_and_tomorrow_follow_the_users_calendar() {
    // 20:00 UTC on 15 Jan is 01:45 on 16 Jan in Kathmandu.
    let h = harness(Tz::UTC, utc(2026, 1, 15, 20, 0));
    let user = h.user(42, "Asia/Kathmandu");
    let assistant = h.assistant();

    assert_eq!(
        assistant.handle_text(user, "/tomorrow Gym @07:00").text,
        "Queued for tomorrow: Gym"
    );
    assistant.handle_text(user, "/add Breakfast");

    assert_eq!(h.store.list_tasks(user, date(2026, 1, 17), None).unwrap()[0].title, "Gym");
    assert_eq!(
        h.store.list_tasks(user, date(2026, 1, 16), None).unwrap()[0].title,
        "Breakfast"
    );

    // Later the same UTC day the user's local date has not moved again.
    h.clock.set(utc(2026, 1, 15, 23, 0));
    assistant.handle_text(user, "/add Lunch");
    assert_eq!(h.store.list_tasks(user, date(2026, 1, 16), None).unwrap().len(), 2);
}

#[test]
fn timezone_command_validates_names() {
    let h = harness(Tz::UTC, utc(2026, 1, 15, 9, 0));
    let assistant = h.assistant();
    let user = UserId(42);

    assert_eq!(
        assistant.handle_text(user, "/tz Asia/Tokyo").text,
        "Timezone set to Asia/Tokyo. I'll schedule reminders accordingly."
    );
    assert_eq!(
        assistant.handle_text(user, "/tz Mars/Olympus").text,
        "That timezone isn't recognized. Try like America/New_York or Asia/Kathmandu"
    );
    assert_eq!(timezone_of(h.store.as_ref(), user), "Asia/Tokyo");

    assert!(assistant.handle_text(user, "/tz").text.starts_with("Usage: /tz"));
}

#[test]
fn status_changes_are_scoped_to_the_owner() {
    let h = harness(Tz::UTC, utc(2026, 1, 15, 9, 0));
    let assistant = h.assistant();
    let owner = UserId(1);
    let stranger = UserId(2);
    assistant.handle_text(owner, "/add Private task");

    assert_eq!(assistant.handle_text(stranger, "/done 1").text, "Task #1 not found.");
    assert_eq!(
        assistant.handle_callback(stranger, "delete|1").text,
        "Task #1 not found."
    );
    let tasks = h.store.list_tasks(owner, date(2026, 1, 15), None).unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].status, TaskStatus::Open);

    assert_eq!(assistant.handle_text(owner, "/done #1").text, "Nice! Marked ✅");
    let tasks = h.store.list_tasks(owner, date(2026, 1, 15), None).unwrap();
    assert_eq!(tasks[0].status, TaskStatus::Done);
}

#[test]
fn buttons_drive_the_same_commands() {
    let h = harness(Tz::UTC, utc(2026, 1, 15, 9, 0));
    let assistant = h.assistant();
    let user = UserId(5);

    assert_eq!(
        assistant.handle_callback(user, "quickadd|Deep Work").text,
        "Added for today: Deep Work"
    );
    assert_eq!(assistant.handle_callback(user, "snooze|1").text, "Snoozed 😴");
    assert_eq!(
        h.store.list_tasks(user, date(2026, 1, 15), None).unwrap()[0].status,
        TaskStatus::Snoozed
    );
    assert_eq!(assistant.handle_callback(user, "delete|1").text, "Deleted 🗑️");
    assert_eq!(assistant.handle_callback(user, "delete|1").text, "Task #1 not found.");

    assert!(
        assistant
            .handle_callback(user, "newtask")
            .text
            .starts_with("Send /add")
    );
    assert_eq!(
        assistant.handle_callback(user, "quickadd|Rob a bank").text,
        "That button has expired."
    );
    assert_eq!(
        assistant.handle_callback(user, "garbage").text,
        "That button has expired."
    );
}

#[test]
fn bad_input_returns_usage_without_mutating() {
    let h = harness(Tz::UTC, utc(2026, 1, 15, 9, 0));
    let assistant = h.assistant();
    let user = UserId(3);

    assert_eq!(
        assistant.handle_text(user, "buy milk").text,
        "I only understand commands. Try /help."
    );
    assert_eq!(assistant.handle_text(user, "/add").text, ADD_USAGE);
    assert_eq!(assistant.handle_text(user, "/done abc").text, DONE_USAGE);
    assert_eq!(
        assistant.handle_text(user, "/add Ship it !urgent").text,
        "Priority must be !low, !med or !high, not !urgent."
    );
    assert_eq!(
        assistant.handle_text(user, "/add Ship it @25:99").text,
        "Due time must look like @18:00, not @25:99."
    );
    assert!(
        assistant
            .handle_text(user, "/frobnicate")
            .text
            .starts_with("Unknown command /frobnicate")
    );
    assert!(h.store.list_tasks(user, date(2026, 1, 15), None).unwrap().is_empty());
}

#[test]
fn week_counts_the_last_seven_local_days() {
    let h = harness(Tz::UTC, utc(2026, 1, 15, 9, 0));
    let user = h.user(9, "UTC");
    let assistant = h.assistant();

    assert_eq!(
        assistant.handle_text(user, "/week").text,
        "📊 Last 7 days: 0/0 done (0% completion). Keep going!"
    );

    let insert = |title: &str, day: chrono::NaiveDate| {
        h.store
            .insert_task(&NewTask::new(user, title, day))
            .unwrap()
    };
    let a = insert("a", date(2026, 1, 15));
    let b = insert("b", date(2026, 1, 15));
    insert("c", date(2026, 1, 15));
    let d = insert("d", date(2026, 1, 9));
    let old = insert("old", date(2026, 1, 8));
    insert("future", date(2026, 1, 16));
    for id in [a, b, d, old] {
        h.store.update_status(user, id, TaskStatus::Done).unwrap();
    }

    assert_eq!(
        assistant.handle_text(user, "/week").text,
        "📊 Last 7 days: 3/4 done (75% completion). Keep going!"
    );
}

#[tokio::test]
async fn focus_schedules_a_reminder() {
    let h = harness(Tz::UTC, utc(2026, 1, 15, 9, 0));
    let assistant = h.assistant();

    let reply = assistant.handle_text(UserId(42), "/focus");
    assert_eq!(
        reply.text,
        "⏱️ Focus started: 25 minutes. I'll ping you when time's up!"
    );
    let pending = assistant.focus_timers().pending();
    assert_eq!(pending.len(), 1);
    assert_eq!(
        pending[0].as_str(),
        format!("focus-42-{}", utc(2026, 1, 15, 9, 25).timestamp())
    );
    assert!(h.notifier.sent().is_empty());
}

#[test]
fn help_lists_every_command() {
    let h = harness(Tz::UTC, utc(2026, 1, 15, 9, 0));
    let help = h.assistant().handle_text(UserId(1), "/help@nudge_bot").text;
    for command in ["/add", "/tomorrow", "/list", "/done", "/tz", "/focus", "/week"] {
        assert!(help.contains(command), "missing {command}");
    }
}
