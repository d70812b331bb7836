use chrono::{DateTime, Duration, Utc};

/// Fixed lead times a deadline crosses on its way down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Threshold {
    Week,
    Day,
    Hour,
}

impl Threshold {
    /// Widest first; the last crossed entry is the tightest.
    pub const ALL: [Threshold; 3] = [Threshold::Week, Threshold::Day, Threshold::Hour];

    pub fn lead(&self) -> Duration {
        match self {
            Threshold::Week => Duration::weeks(1),
            Threshold::Day => Duration::days(1),
            Threshold::Hour => Duration::hours(1),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Threshold::Week => "one week",
            Threshold::Day => "one day",
            Threshold::Hour => "one hour",
        }
    }
}

/// Which thresholds have already fired (or been spent silently) for an item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReminderState {
    pub week: bool,
    pub day: bool,
    pub hour: bool,
}

impl ReminderState {
    pub fn spent(&self, threshold: Threshold) -> bool {
        match threshold {
            Threshold::Week => self.week,
            Threshold::Day => self.day,
            Threshold::Hour => self.hour,
        }
    }
}

/// What the watcher should do for one upcoming deadline at `now`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReminderAction {
    None,
    /// Send one reminder for `fire` and mark every threshold in `spend` as
    /// used. When a tick discovers several crossings at once only the
    /// tightest one is worth a message.
    Remind {
        fire: Threshold,
        spend: Vec<Threshold>,
    },
    /// Due time has passed: flip to the terminal past-due status, no
    /// further reminders.
    Retire,
}

pub fn evaluate(due_at: DateTime<Utc>, now: DateTime<Utc>, state: ReminderState) -> ReminderAction {
    if now >= due_at {
        return ReminderAction::Retire;
    }

    let crossed: Vec<Threshold> = Threshold::ALL
        .into_iter()
        .filter(|t| !state.spent(*t) && now >= due_at - t.lead())
        .collect();

    match crossed.last() {
        None => ReminderAction::None,
        Some(&tightest) => ReminderAction::Remind {
            fire: tightest,
            spend: crossed,
        },
    }
}
