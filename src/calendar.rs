//! Date-only calendar logic shared by the teacher and public calendars.
//!
//! Nothing here reads the wall clock; every function that needs "today" takes it
//! as an argument.

use crate::error::{AppError, AppResult};
use crate::model::TaskStatus;
use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Red,
    Yellow,
    Green,
}

/// Classifies a due date against `today`.
///
/// `due - today` in whole days: `<= 1` is red (overdue, today, tomorrow),
/// `2..=3` is yellow, anything later is green.
pub fn urgency_bucket(due: NaiveDate, today: NaiveDate) -> Urgency {
    let diff_days = due.signed_duration_since(today).num_days();
    match diff_days {
        d if d <= 1 => Urgency::Red,
        2 | 3 => Urgency::Yellow,
        _ => Urgency::Green,
    }
}

/// Status as seen by readers: open tasks whose day has passed read as overdue.
pub fn effective_status(stored: TaskStatus, due: NaiveDate, today: NaiveDate) -> TaskStatus {
    match stored {
        TaskStatus::Completed | TaskStatus::Overdue => stored,
        _ if due < today => TaskStatus::Overdue,
        open => open,
    }
}

/// Pins a caller-supplied due date to its calendar day.
///
/// Accepts `YYYY-MM-DD` or any timestamp starting with it (`2025-09-12T23:00:00-05:00`);
/// the time and offset are discarded rather than converted, so the stored day is
/// always the day that was written.
pub fn parse_due_date(raw: &str) -> AppResult<NaiveDate> {
    let raw = raw.trim();
    let day_part = match raw.get(..10) {
        Some(head) if raw.len() == 10 => head,
        Some(head) if matches!(raw.as_bytes().get(10), Some(b'T') | Some(b't') | Some(b' ')) => {
            head
        }
        _ => {
            return Err(AppError::validation(format!(
                "dueDate must be YYYY-MM-DD, got {:?}",
                raw
            )))
        }
    };
    NaiveDate::parse_from_str(day_part, "%Y-%m-%d")
        .map_err(|_| AppError::validation(format!("dueDate is not a valid date: {:?}", raw)))
}

/// First and last day of a calendar month.
pub fn month_range(year: i32, month: u32) -> AppResult<(NaiveDate, NaiveDate)> {
    if !(1..=12).contains(&month) {
        return Err(AppError::validation("month must be between 1 and 12"));
    }
    let first = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| AppError::validation("year out of range"))?;
    let (ny, nm) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    let last = NaiveDate::from_ymd_opt(ny, nm, 1)
        .and_then(|d| d.pred_opt())
        .ok_or_else(|| AppError::validation("year out of range"))?;
    Ok((first, last))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayCell {
    pub date: NaiveDate,
    pub task_count: usize,
    /// `None` for days without tasks; those render neutral.
    pub urgency: Option<Urgency>,
}

pub fn day_cell(date: NaiveDate, task_count: usize, today: NaiveDate) -> DayCell {
    DayCell {
        date,
        task_count,
        urgency: (task_count > 0).then(|| urgency_bucket(date, today)),
    }
}

/// One cell per day of the month, counting the given due dates that fall in it.
pub fn project_month<I>(year: i32, month: u32, due_dates: I, today: NaiveDate) -> AppResult<Vec<DayCell>>
where
    I: IntoIterator<Item = NaiveDate>,
{
    let (first, last) = month_range(year, month)?;
    let mut counts: BTreeMap<NaiveDate, usize> = BTreeMap::new();
    for d in due_dates {
        if d >= first && d <= last {
            *counts.entry(d).or_default() += 1;
        }
    }

    let mut cells = Vec::with_capacity(last.day() as usize);
    for date in first.iter_days().take_while(|d| *d <= last) {
        let n = counts.get(&date).copied().unwrap_or(0);
        cells.push(day_cell(date, n, today));
    }
    Ok(cells)
}
