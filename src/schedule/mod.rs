pub mod reminders;

use chrono::{DateTime, NaiveDateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::db::deadline;
use crate::error::Result;
use reminders::Threshold;

/// Rendered displays cap out well under Discord's message limit.
const MAX_RENDER_ROWS: usize = 25;

/// What a tracked source contains, fixed when the watch is created.
///
/// Expected column layouts:
/// - timetable: `week;day;start;end;course;room;teacher`
/// - deadlines: `title;course;due[;remaining…]`, where columns after `due`
///   are display-only (recomputed countdown text) and never fingerprinted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchKind {
    Timetable,
    Deadlines,
}

impl WatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WatchKind::Timetable => "timetable",
            WatchKind::Deadlines => "deadlines",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "timetable" => Some(WatchKind::Timetable),
            "deadlines" => Some(WatchKind::Deadlines),
            _ => None,
        }
    }
}

/// Splits fetched delimited text into trimmed cells. Blank lines are
/// dropped; short rows simply yield blank cells on access.
pub fn parse_rows(text: &str) -> Vec<Vec<String>> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.split(';').map(|c| c.trim().to_string()).collect())
        .collect()
}

fn cell(row: &[String], index: usize) -> &str {
    row.get(index).map(String::as_str).unwrap_or("")
}

/// One deadline parsed out of a deadline-kind source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadlineRow {
    pub title: String,
    pub course: String,
    pub due_at: DateTime<Utc>,
}

/// Rows without a title or a parseable due date are skipped.
pub fn parse_deadlines(rows: &[Vec<String>]) -> Vec<DeadlineRow> {
    rows.iter()
        .filter_map(|row| {
            let title = cell(row, 0);
            if title.is_empty() {
                return None;
            }
            Some(DeadlineRow {
                title: title.to_string(),
                course: cell(row, 1).to_string(),
                due_at: parse_due(cell(row, 2))?,
            })
        })
        .collect()
}

/// Due dates come as RFC 3339 or the registrar's `%d/%m/%Y %H:%M` export
/// format, both read as UTC.
fn parse_due(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%d/%m/%Y %H:%M")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Content hash over the semantic cells only. Recomputed countdown columns
/// never reach the hash, so a fetch differing only in those is a no-op.
pub fn fingerprint(kind: WatchKind, rows: &[Vec<String>]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(kind.as_str().as_bytes());
    for row in rows {
        hasher.update([0x1e]);
        for index in semantic_columns(kind, row) {
            hasher.update(cell(row, index).as_bytes());
            hasher.update([0x1f]);
        }
    }
    format!("{:x}", hasher.finalize())
}

/// Like [`fingerprint`], but blind to the scheduled "roll to next period"
/// transitions: the week label column of a timetable and rows already past
/// due in a deadline list. Broadcasts key off this hash so routine rollovers
/// update the display without pinging anyone.
pub fn broadcast_fingerprint(kind: WatchKind, rows: &[Vec<String>], now: DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(kind.as_str().as_bytes());
    for row in rows {
        if kind == WatchKind::Deadlines {
            if let Some(due) = parse_due(cell(row, 2)) {
                if due <= now {
                    continue;
                }
            }
        }
        hasher.update([0x1e]);
        for index in semantic_columns(kind, row) {
            if kind == WatchKind::Timetable && index == 0 {
                continue;
            }
            hasher.update(cell(row, index).as_bytes());
            hasher.update([0x1f]);
        }
    }
    format!("{:x}", hasher.finalize())
}

fn semantic_columns(kind: WatchKind, row: &[String]) -> std::ops::Range<usize> {
    match kind {
        WatchKind::Timetable => 0..row.len(),
        // title, course, due; anything after is display-only.
        WatchKind::Deadlines => 0..3,
    }
}

/// Renders the display message for a target. Relative times use Discord's
/// own `<t:…:R>` markers so the rendered text never goes stale on its own.
pub fn render(kind: WatchKind, rows: &[Vec<String>], now: DateTime<Utc>) -> String {
    match kind {
        WatchKind::Timetable => render_timetable(rows),
        WatchKind::Deadlines => render_deadlines(rows, now),
    }
}

fn render_timetable(rows: &[Vec<String>]) -> String {
    let week = rows.first().map(|r| cell(r, 0)).unwrap_or("");
    let mut out = if week.is_empty() {
        "📅 **Timetable**\n".to_string()
    } else {
        format!("📅 **Timetable — {}**\n", week)
    };

    for row in rows.iter().take(MAX_RENDER_ROWS) {
        out.push_str(&format!(
            "{} {}–{} · **{}** ({}) — {}\n",
            cell(row, 1),
            cell(row, 2),
            cell(row, 3),
            cell(row, 4),
            cell(row, 5),
            cell(row, 6),
        ));
    }
    if rows.len() > MAX_RENDER_ROWS {
        out.push_str(&format!("… and {} more\n", rows.len() - MAX_RENDER_ROWS));
    }
    out
}

fn render_deadlines(rows: &[Vec<String>], now: DateTime<Utc>) -> String {
    let mut items = parse_deadlines(rows);
    items.sort_by_key(|item| item.due_at);

    let mut out = "🗓️ **Deadlines**\n".to_string();
    for item in items.iter().take(MAX_RENDER_ROWS) {
        let course = if item.course.is_empty() {
            String::new()
        } else {
            format!(" ({})", item.course)
        };
        if item.due_at <= now {
            out.push_str(&format!("~~{}~~{} — past due\n", item.title, course));
        } else {
            out.push_str(&format!(
                "**{}**{} — due <t:{}:F> (<t:{}:R>)\n",
                item.title,
                course,
                item.due_at.timestamp(),
                item.due_at.timestamp(),
            ));
        }
    }
    if items.len() > MAX_RENDER_ROWS {
        out.push_str(&format!("… and {} more\n", items.len() - MAX_RENDER_ROWS));
    }
    out
}

/// Mirrors the fetched deadline list into the `deadline` table for the
/// threshold watcher. Matching is by title within the watch; a moved due
/// date re-arms the thresholds. Thresholds already crossed when an item
/// first appears are spent silently.
pub async fn sync_deadlines(
    db: &DatabaseConnection,
    watch_id: i32,
    items: &[DeadlineRow],
    now: DateTime<Utc>,
) -> Result<()> {
    let known = deadline::Entity::find()
        .filter(deadline::Column::WatchId.eq(watch_id))
        .all(db)
        .await?;

    for item in items {
        match known.iter().find(|k| k.title == item.title) {
            None => {
                let crossed = |threshold: Threshold| now >= item.due_at - threshold.lead();
                deadline::ActiveModel {
                    watch_id: Set(watch_id),
                    title: Set(item.title.clone()),
                    course: Set(Some(item.course.clone()).filter(|c| !c.is_empty())),
                    due_at: Set(item.due_at),
                    status: Set(if item.due_at <= now {
                        deadline::STATUS_PAST_DUE.to_string()
                    } else {
                        deadline::STATUS_UPCOMING.to_string()
                    }),
                    reminded_week: Set(crossed(Threshold::Week)),
                    reminded_day: Set(crossed(Threshold::Day)),
                    reminded_hour: Set(crossed(Threshold::Hour)),
                    ..Default::default()
                }
                .insert(db)
                .await?;
            }
            Some(existing) if existing.due_at != item.due_at => {
                let mut active: deadline::ActiveModel = existing.clone().into();
                active.due_at = Set(item.due_at);
                active.status = Set(if item.due_at <= now {
                    deadline::STATUS_PAST_DUE.to_string()
                } else {
                    deadline::STATUS_UPCOMING.to_string()
                });
                active.reminded_week = Set(now >= item.due_at - Threshold::Week.lead());
                active.reminded_day = Set(now >= item.due_at - Threshold::Day.lead());
                active.reminded_hour = Set(now >= item.due_at - Threshold::Hour.lead());
                active.update(db).await?;
            }
            Some(_) => {}
        }
    }

    let removed: Vec<i32> = known
        .iter()
        .filter(|k| !items.iter().any(|item| item.title == k.title))
        .map(|k| k.id)
        .collect();
    if !removed.is_empty() {
        info!(
            "Watch {}: dropping {} vanished deadline(s)",
            watch_id,
            removed.len()
        );
        deadline::Entity::delete_many()
            .filter(deadline::Column::Id.is_in(removed))
            .exec(db)
            .await?;
    }

    Ok(())
}
