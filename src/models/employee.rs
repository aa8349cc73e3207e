use std::collections::HashMap;

use chrono::{Datelike, NaiveDateTime, Weekday};
use serde::{Deserialize, Serialize};

use super::service::{parse_time, parse_weekday, weekday_key};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Employee {
    pub id: String,
    pub company_id: String,
    pub name: String,
    /// Raw JSON as stored by the company admin tooling; parsed on demand.
    pub work_schedule: Option<String>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkDay {
    #[serde(default)]
    pub off: bool,
    pub start: Option<String>,
    pub end: Option<String>,
}

/// Per-weekday working hours, e.g.
/// `{"monday":{"start":"09:00","end":"17:00"},"sunday":{"off":true}}`.
#[derive(Debug, Clone, Default)]
pub struct WorkSchedule {
    days: HashMap<Weekday, WorkDay>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScheduleDecision {
    Working,
    DayOff,
    OutsideHours,
    /// Nothing usable for that day; callers decide the fallback.
    NoEntry(String),
}

impl WorkSchedule {
    pub fn from_json(s: &str) -> anyhow::Result<Self> {
        let raw: HashMap<String, WorkDay> = serde_json::from_str(s)?;
        let mut days = HashMap::with_capacity(raw.len());
        for (key, day) in raw {
            let weekday =
                parse_weekday(&key).ok_or_else(|| anyhow::anyhow!("invalid weekday: {key}"))?;
            days.insert(weekday, day);
        }
        Ok(Self { days })
    }

    /// Whether a booking of `duration_minutes` starting at `dt` falls in
    /// the employee's hours for that weekday.
    pub fn decide(&self, dt: &NaiveDateTime, duration_minutes: i64) -> ScheduleDecision {
        let weekday = dt.weekday();
        let Some(day) = self.days.get(&weekday) else {
            return ScheduleDecision::NoEntry(format!("no entry for {}", weekday_key(weekday)));
        };
        if day.off {
            return ScheduleDecision::DayOff;
        }
        let (Some(start), Some(end)) = (day.start.as_deref(), day.end.as_deref()) else {
            return ScheduleDecision::NoEntry(format!("incomplete hours for {}", weekday_key(weekday)));
        };
        let (start, end) = match (parse_time(start), parse_time(end)) {
            (Ok(s), Ok(e)) => (s, e),
            _ => {
                return ScheduleDecision::NoEntry(format!(
                    "unparseable hours for {}",
                    weekday_key(weekday)
                ))
            }
        };

        let finish = *dt + chrono::Duration::minutes(duration_minutes);
        let day_start = dt.date().and_time(start);
        let day_end = dt.date().and_time(end);
        if *dt >= day_start && finish <= day_end {
            ScheduleDecision::Working
        } else {
            ScheduleDecision::OutsideHours
        }
    }
}
