use chrono::{DateTime, Duration, NaiveDate, Utc};

/// Minutes of reading per day a new account has to reach.
pub const DEFAULT_DAILY_GOAL_MINUTES: u32 = 15;

/// A freeze is earned every time the streak reaches a multiple of this.
pub const FREEZE_MILESTONE_DAYS: u32 = 7;

/// Freezes granted when a streak record is first created.
pub const STARTING_FREEZES: u32 = 1;

pub const FREE_FREEZE_CAP: u32 = 1;
pub const PREMIUM_FREEZE_CAP: u32 = 3;

/// Largest number of freezes a user may hold at once.
pub fn freeze_cap(is_premium: bool) -> u32 {
    if is_premium {
        PREMIUM_FREEZE_CAP
    } else {
        FREE_FREEZE_CAP
    }
}

/// Calendar day of `at` as seen by a user `utc_offset_minutes` away from UTC.
pub fn local_date(at: DateTime<Utc>, utc_offset_minutes: i32) -> NaiveDate {
    (at + Duration::minutes(i64::from(utc_offset_minutes))).date_naive()
}

/// Persisted streak counters for one user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreakState {
    pub current: u32,
    pub longest: u32,
    pub last_goal_date: Option<NaiveDate>,
    pub freezes_available: u32,
}

impl StreakState {
    /// State of a user who has never met a goal.
    pub fn fresh() -> Self {
        Self {
            freezes_available: STARTING_FREEZES,
            ..Self::default()
        }
    }
}

/// What happened to the streak when a day's goal was met.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreakChange {
    /// The day was already counted (or lies before the last counted day).
    Unchanged,
    /// First goal ever.
    Started,
    /// Goal met the day after the previous one.
    Extended,
    /// Missed days were covered by freezes; one freeze per listed day.
    Bridged { frozen_days: Vec<NaiveDate> },
    /// Too many missed days, counting starts over.
    Reset,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreakUpdate {
    pub state: StreakState,
    pub change: StreakChange,
    pub freeze_earned: bool,
}

impl StreakState {
    /// Apply a met daily goal on `today`.
    ///
    /// | last goal day     | freezes ≥ missed | result   |
    /// |-------------------|------------------|----------|
    /// | today or later    | -                | unchanged|
    /// | yesterday         | -                | extend   |
    /// | older             | yes              | bridge   |
    /// | older             | no               | reset    |
    /// | never             | -                | start    |
    pub fn record_goal_met(&self, today: NaiveDate, freeze_cap: u32) -> StreakUpdate {
        let mut next = self.clone();

        let change = match self.last_goal_date {
            Some(last) if last >= today => {
                return StreakUpdate {
                    state: next,
                    change: StreakChange::Unchanged,
                    freeze_earned: false,
                };
            }
            Some(last) => {
                let missed = (today - last).num_days() - 1;
                if missed == 0 {
                    next.current += 1;
                    StreakChange::Extended
                } else if missed <= i64::from(self.freezes_available) {
                    let frozen_days: Vec<NaiveDate> = (1..=missed)
                        .map(|offset| last + Duration::days(offset))
                        .collect();
                    next.freezes_available -= frozen_days.len() as u32;
                    next.current += 1;
                    StreakChange::Bridged { frozen_days }
                } else {
                    next.current = 1;
                    StreakChange::Reset
                }
            }
            None => {
                next.current = 1;
                StreakChange::Started
            }
        };

        next.last_goal_date = Some(today);
        next.longest = next.longest.max(next.current);

        let continued = matches!(change, StreakChange::Extended | StreakChange::Bridged { .. });
        let freeze_earned = continued
            && next.current % FREEZE_MILESTONE_DAYS == 0
            && next.freezes_available < freeze_cap;
        if freeze_earned {
            next.freezes_available += 1;
        }

        StreakUpdate {
            state: next,
            change,
            freeze_earned,
        }
    }

    /// Streak as it should be displayed on `today`.
    ///
    /// A streak whose gap can still be bridged by the freezes on hand is
    /// alive; anything else reads as zero until the next goal resets it.
    pub fn effective_current(&self, today: NaiveDate) -> u32 {
        let Some(last) = self.last_goal_date else {
            return 0;
        };

        let gap = (today - last).num_days();
        if gap <= 1 {
            return self.current;
        }

        // Today itself is not missed yet.
        let missed = gap - 1;
        if missed <= i64::from(self.freezes_available) {
            self.current
        } else {
            0
        }
    }
}
