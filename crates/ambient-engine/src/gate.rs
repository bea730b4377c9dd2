//! Proactive Gate: the only authority on whether an outbound proactive
//! message may be sent right now.

use chrono::{DateTime, Duration, NaiveDate, Timelike, Utc};

use crate::config::GateConfig;

/// Inputs to one gate evaluation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GateInput {
    pub now: DateTime<Utc>,
    pub last_proactive_at: Option<DateTime<Utc>>,
    pub proactive_count_today: u32,
    /// UTC date the count belongs to. Falls back to the date of `last_proactive_at`.
    pub count_date: Option<NaiveDate>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DenyReason {
    QuietHours { hour: u32 },
    Cooldown { remaining: Duration },
    DailyLimit { count: u32, limit: u32 },
}

impl DenyReason {
    /// Gate name for structured logs.
    pub fn gate(&self) -> &'static str {
        match self {
            Self::QuietHours { .. } => "quiet_hours",
            Self::Cooldown { .. } => "cooldown",
            Self::DailyLimit { .. } => "daily_limit",
        }
    }
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::QuietHours { hour } => write!(f, "quiet hours (hour {hour:02} UTC)"),
            Self::Cooldown { remaining } => {
                write!(f, "cooldown ({}m remaining)", remaining.num_minutes().max(1))
            }
            Self::DailyLimit { count, limit } => write!(f, "daily limit reached ({count}/{limit})"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GateVerdict {
    Allow,
    Deny(DenyReason),
}

impl GateVerdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// The count that applies on `today`: a count recorded on an earlier UTC day is zero.
pub fn effective_count(count: u32, count_date: Option<NaiveDate>, today: NaiveDate) -> u32 {
    match count_date {
        Some(date) if date == today => count,
        _ => 0,
    }
}

#[derive(Clone, Debug)]
pub struct ProactiveGate {
    config: GateConfig,
}

impl ProactiveGate {
    pub fn new(config: GateConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Quiet hours wrap midnight when start > end. Equal bounds disable them.
    pub fn in_quiet_hours(&self, now: DateTime<Utc>) -> bool {
        let hour = now.hour();
        let (start, end) = (self.config.quiet_hours_start, self.config.quiet_hours_end);
        if start == end {
            false
        } else if start < end {
            start <= hour && hour < end
        } else {
            hour >= start || hour < end
        }
    }

    /// Gates run in a fixed order (quiet hours, cooldown, daily limit); the
    /// first failing gate names the denial.
    pub fn evaluate(&self, input: &GateInput) -> GateVerdict {
        let now = input.now;

        if self.in_quiet_hours(now) {
            return GateVerdict::Deny(DenyReason::QuietHours { hour: now.hour() });
        }

        if let Some(last) = input.last_proactive_at {
            let elapsed = now - last;
            if elapsed < self.config.cooldown {
                return GateVerdict::Deny(DenyReason::Cooldown {
                    remaining: self.config.cooldown - elapsed,
                });
            }
        }

        let count_date = input
            .count_date
            .or_else(|| input.last_proactive_at.map(|t| t.date_naive()));
        let count = effective_count(input.proactive_count_today, count_date, now.date_naive());
        if count >= self.config.daily_limit {
            return GateVerdict::Deny(DenyReason::DailyLimit {
                count,
                limit: self.config.daily_limit,
            });
        }

        GateVerdict::Allow
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(d: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, d, h, m, 0).unwrap()
    }

    fn gate() -> ProactiveGate {
        ProactiveGate::new(GateConfig::default())
    }

    fn input(now: DateTime<Utc>, last: Option<DateTime<Utc>>, count: u32) -> GateInput {
        GateInput {
            now,
            last_proactive_at: last,
            proactive_count_today: count,
            count_date: last.map(|t| t.date_naive()),
        }
    }

    #[test]
    fn quiet_hours_deny_regardless_of_other_inputs() {
        let g = gate();
        for (last, count) in [(None, 0), (Some(at(1, 10, 0)), 0), (Some(at(1, 23, 0)), 5)] {
            assert_eq!(
                g.evaluate(&input(at(1, 23, 30), last, count)),
                GateVerdict::Deny(DenyReason::QuietHours { hour: 23 })
            );
        }
    }

    #[test]
    fn quiet_hours_wrap_midnight() {
        let g = gate();
        assert!(g.in_quiet_hours(at(2, 0, 5)));
        assert!(g.in_quiet_hours(at(2, 7, 59)));
        assert!(!g.in_quiet_hours(at(2, 8, 0)));
        assert!(!g.in_quiet_hours(at(2, 22, 59)));
        assert!(g.in_quiet_hours(at(2, 23, 0)));
    }

    #[test]
    fn non_wrapping_and_disabled_quiet_hours() {
        let day = ProactiveGate::new(GateConfig {
            quiet_hours_start: 1,
            quiet_hours_end: 6,
            ..Default::default()
        });
        assert!(day.in_quiet_hours(at(2, 1, 0)));
        assert!(!day.in_quiet_hours(at(2, 6, 0)));
        assert!(!day.in_quiet_hours(at(2, 23, 30)));

        let off = ProactiveGate::new(GateConfig {
            quiet_hours_start: 0,
            quiet_hours_end: 0,
            ..Default::default()
        });
        assert!(!off.in_quiet_hours(at(2, 0, 0)));
    }

    #[test]
    fn cooldown_denies_one_hour_after_last_message() {
        let verdict = gate().evaluate(&input(at(1, 13, 0), Some(at(1, 12, 0)), 1));
        assert_eq!(
            verdict,
            GateVerdict::Deny(DenyReason::Cooldown {
                remaining: Duration::hours(1)
            })
        );
        assert!(gate().evaluate(&input(at(1, 14, 0), Some(at(1, 12, 0)), 1)).is_allowed());
    }

    #[test]
    fn fourth_message_of_the_day_hits_daily_limit() {
        let verdict = gate().evaluate(&input(at(1, 20, 0), Some(at(1, 16, 0)), 3));
        assert_eq!(
            verdict,
            GateVerdict::Deny(DenyReason::DailyLimit { count: 3, limit: 3 })
        );
    }

    #[test]
    fn daily_count_resets_on_new_utc_day() {
        // Three sent on Jan 1; Jan 2 after quiet hours is a fresh day.
        let verdict = gate().evaluate(&input(at(2, 9, 0), Some(at(1, 20, 0)), 3));
        assert!(verdict.is_allowed());
        assert_eq!(effective_count(3, Some(at(1, 23, 0).date_naive()), at(1, 23, 0).date_naive()), 3);
        assert_eq!(effective_count(3, Some(at(1, 23, 0).date_naive()), at(2, 0, 5).date_naive()), 0);
        assert_eq!(effective_count(3, None, at(2, 0, 5).date_naive()), 0);
    }

    #[test]
    fn evaluate_is_pure() {
        let g = gate();
        let i = input(at(1, 15, 0), Some(at(1, 14, 0)), 2);
        assert_eq!(g.evaluate(&i), g.evaluate(&i));
    }

    #[test]
    fn deny_reason_labels() {
        assert_eq!(DenyReason::QuietHours { hour: 2 }.gate(), "quiet_hours");
        assert_eq!(
            DenyReason::Cooldown { remaining: Duration::minutes(90) }.to_string(),
            "cooldown (90m remaining)"
        );
        assert_eq!(
            DenyReason::DailyLimit { count: 3, limit: 3 }.to_string(),
            "daily limit reached (3/3)"
        );
    }
}
