use chrono::NaiveDate;

use crate::domain::entities::snapshot::Snapshot;
use crate::domain::entities::value::Value;
use crate::domain::error::ReconcileError;

/// Inclusive calendar range: the whole `start` day through the whole `end`
/// day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, ReconcileError> {
        if start > end {
            return Err(ReconcileError::InvalidInput(format!(
                "invalid date range: {start} is after {end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// The `days` days ending on `end`, `end` included.
    pub fn last_days(end: NaiveDate, days: u32) -> Result<Self, ReconcileError> {
        let span = i64::from(days.max(1)) - 1;
        let start = end
            .checked_sub_signed(chrono::Duration::days(span))
            .ok_or_else(|| ReconcileError::InvalidInput(format!("{days} days before {end}")))?;
        Self::new(start, end)
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Number of calendar days covered, both ends counted.
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateFilter {
    pub column: String,
    pub range: DateRange,
}

impl DateFilter {
    pub fn new(column: impl Into<String>, range: DateRange) -> Self {
        Self {
            column: column.into(),
            range,
        }
    }

    /// Filters on the first column [`date_columns`] finds in `snapshot`.
    pub fn detect(snapshot: &Snapshot, range: DateRange) -> Result<Self, ReconcileError> {
        let column = date_columns(snapshot).into_iter().next().ok_or_else(|| {
            ReconcileError::InvalidInput("no date column to filter on".to_string())
        })?;
        log::debug!("filtering on detected date column '{column}'");
        Ok(Self::new(column, range))
    }

    /// Keeps rows whose `column` holds a date inside the range. Nulls and
    /// values that do not read as a date are dropped.
    pub fn apply(&self, snapshot: &Snapshot) -> Result<Snapshot, ReconcileError> {
        let col_idx = snapshot
            .column_index(&self.column)
            .ok_or_else(|| ReconcileError::UnknownColumn(self.column.clone()))?;
        Ok(snapshot.filtered(|row| {
            row[col_idx]
                .as_datetime()
                .is_some_and(|stamp| self.range.contains(stamp.date()))
        }))
    }
}

pub fn filter_by_date(
    snapshot: &Snapshot,
    column: &str,
    range: DateRange,
) -> Result<Snapshot, ReconcileError> {
    DateFilter::new(column, range).apply(snapshot)
}

/// Columns that look like dates: any non-null value is a date or timestamp,
/// or the name mentions `date` or `time`.
pub fn date_columns(snapshot: &Snapshot) -> Vec<String> {
    snapshot
        .columns()
        .iter()
        .enumerate()
        .filter(|(col_idx, name)| {
            let lowered = name.to_lowercase();
            if lowered.contains("date") || lowered.contains("time") {
                return true;
            }
            let mut values = snapshot
                .rows()
                .iter()
                .map(|row| &row[*col_idx])
                .filter(|value| !value.is_null())
                .peekable();
            values.peek().is_some()
                && values.all(|value| matches!(value, Value::Date(_) | Value::DateTime(_)))
        })
        .map(|(_, name)| name.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn orders() -> Snapshot {
        Snapshot::new(
            vec!["id".into(), "placed".into(), "due".into()],
            vec![
                vec![Value::Int(1), Value::Date(date(2025, 1, 1)), Value::from("2025-02-01")],
                vec![
                    Value::Int(2),
                    Value::DateTime(date(2025, 1, 31).and_hms_opt(23, 59, 59).expect("valid")),
                    Value::from("soon"),
                ],
                vec![Value::Int(3), Value::Date(date(2025, 2, 1)), Value::Null],
                vec![Value::Int(4), Value::Null, Value::from("2025-01-10 09:00:00")],
            ],
        )
        .expect("valid snapshot")
    }

    #[test]
    fn range_is_inclusive_on_both_ends() {
        let range = DateRange::new(date(2025, 1, 1), date(2025, 1, 31)).expect("ordered");
        let kept = DateFilter::new("placed", range)
            .apply(&orders())
            .expect("known column");

        let ids: Vec<&Value> = kept.rows().iter().map(|row| &row[0]).collect();
        assert_eq!(ids, vec![&Value::Int(1), &Value::Int(2)]);
        assert_eq!(range.days(), 31);
    }

    #[test]
    fn text_dates_are_parsed_and_garbage_dropped() {
        let range = DateRange::new(date(2025, 1, 10), date(2025, 2, 1)).expect("ordered");
        let kept = filter_by_date(&orders(), "due", range).expect("known column");

        let ids: Vec<&Value> = kept.rows().iter().map(|row| &row[0]).collect();
        assert_eq!(ids, vec![&Value::Int(1), &Value::Int(4)]);
    }

    #[test]
    fn offset_timestamps_filter_on_their_wall_clock_date() {
        let snapshot = Snapshot::new(
            vec!["id".into(), "stamp".into()],
            vec![
                vec![Value::Int(1), Value::from("2025-01-31T23:30:00-05:00")],
                vec![Value::Int(2), Value::from("2025-02-01T00:10:00Z")],
                vec![Value::Int(3), Value::from("2025-01-15 08:00:00+0100")],
            ],
        )
        .expect("valid snapshot");
        let range = DateRange::new(date(2025, 1, 1), date(2025, 1, 31)).expect("ordered");
        let kept = filter_by_date(&snapshot, "stamp", range).expect("known column");

        let ids: Vec<&Value> = kept.rows().iter().map(|row| &row[0]).collect();
        assert_eq!(ids, vec![&Value::Int(1), &Value::Int(3)]);
    }

    #[test]
    fn detect_picks_the_first_date_column() {
        let range = DateRange::new(date(2025, 1, 1), date(2025, 1, 31)).expect("ordered");
        let filter = DateFilter::detect(&orders(), range).expect("placed is a date column");
        assert_eq!(filter.column, "placed");

        let plain = Snapshot::new(
            vec!["id".into(), "note".into()],
            vec![vec![Value::Int(1), Value::from("x")]],
        )
        .expect("valid snapshot");
        assert!(matches!(
            DateFilter::detect(&plain, range),
            Err(ReconcileError::InvalidInput(_))
        ));
    }

    #[test]
    fn reversed_range_and_unknown_column_are_rejected() {
        assert!(matches!(
            DateRange::new(date(2025, 2, 1), date(2025, 1, 1)),
            Err(ReconcileError::InvalidInput(_))
        ));

        let range = DateRange::new(date(2025, 1, 1), date(2025, 1, 1)).expect("single day");
        assert_eq!(
            DateFilter::new("shipped", range).apply(&orders()),
            Err(ReconcileError::UnknownColumn("shipped".to_string()))
        );
    }

    #[test]
    fn last_days_counts_the_end_day() {
        let range = DateRange::last_days(date(2025, 3, 30), 30).expect("valid");
        assert_eq!(range.start(), date(2025, 3, 1));
        assert_eq!(range.days(), 30);
    }

    #[test]
    fn detects_date_columns_by_type_or_name() {
        let snapshot = Snapshot::new(
            vec!["id".into(), "placed".into(), "due_date".into(), "note".into()],
            vec![
                vec![Value::Int(1), Value::Date(date(2025, 1, 1)), Value::from("x"), Value::Null],
                vec![Value::Int(2), Value::Null, Value::from("y"), Value::Null],
            ],
        )
        .expect("valid snapshot");

        assert_eq!(
            date_columns(&snapshot),
            vec!["placed".to_string(), "due_date".to_string()]
        );
    }
}
