use std::fmt;

use chrono::{
  DateTime,
  Datelike,
  Duration,
  Months,
  NaiveDate,
  NaiveDateTime,
  NaiveTime,
  TimeZone,
  Timelike,
  Utc,
  Weekday
};
use chrono_tz::Tz;
use serde::{
  Deserialize,
  Serialize
};

pub const DAY_MILLIS: i64 = 86_400_000;

/// Milliseconds since the Unix epoch.
///
/// `NO_TIME` marks an absent value and is accepted by every
/// `ClockMath` operation without doing arithmetic on it.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(i64);

/// A timestamp normalized to local midnight of day 1.
pub type Month = Timestamp;

impl Timestamp {
  pub const NO_TIME: Timestamp =
    Timestamp(i64::MIN);

  #[must_use]
  pub const fn from_millis(
    millis: i64
  ) -> Self {
    Self(millis)
  }

  #[must_use]
  pub const fn millis(self) -> i64 {
    self.0
  }

  #[must_use]
  pub const fn is_no_time(
    self
  ) -> bool {
    self.0 == i64::MIN
  }

  #[must_use]
  pub fn from_utc(
    dt: DateTime<Utc>
  ) -> Self {
    Self(dt.timestamp_millis())
  }

  #[must_use]
  pub fn to_utc(
    self
  ) -> Option<DateTime<Utc>> {
    if self.is_no_time() {
      return None;
    }
    DateTime::<Utc>::from_timestamp_millis(
      self.0
    )
  }
}

impl fmt::Display for Timestamp {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    match self.to_utc() {
      | Some(dt) => {
        write!(
          f,
          "{}",
          dt.format("%Y-%m-%dT%H:%M:%SZ")
        )
      }
      | None => f.write_str("no-time")
    }
  }
}

/// Calendar arithmetic pinned to one local zone and week start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockMath {
  zone:       Tz,
  week_start: Weekday
}

impl Default for ClockMath {
  fn default() -> Self {
    Self::new(chrono_tz::UTC, Weekday::Sun)
  }
}

impl ClockMath {
  #[must_use]
  pub fn new(
    zone: Tz,
    week_start: Weekday
  ) -> Self {
    Self { zone, week_start }
  }

  #[must_use]
  pub fn zone(&self) -> Tz {
    self.zone
  }

  #[must_use]
  pub fn week_start(&self) -> Weekday {
    self.week_start
  }

  #[must_use]
  pub fn today(&self) -> Timestamp {
    self.today_at(Utc::now())
  }

  #[must_use]
  pub fn today_at(
    &self,
    now: DateTime<Utc>
  ) -> Timestamp {
    self.local_midnight(
      now
        .with_timezone(&self.zone)
        .date_naive()
    )
  }

  #[must_use]
  pub fn local_date(
    &self,
    t: Timestamp
  ) -> Option<NaiveDate> {
    t.to_utc().map(|dt| {
      dt.with_timezone(&self.zone)
        .date_naive()
    })
  }

  #[must_use]
  pub fn local_midnight(
    &self,
    date: NaiveDate
  ) -> Timestamp {
    self.at_local(
      date.and_time(NaiveTime::MIN)
    )
  }

  /// Instant for a local wall-clock reading; gaps resolve forward
  /// one hour, overlaps to the earliest instant.
  #[must_use]
  pub fn at_local(
    &self,
    naive: NaiveDateTime
  ) -> Timestamp {
    resolve_civil(&self.zone, naive)
      .unwrap_or(Timestamp::NO_TIME)
  }

  #[must_use]
  pub fn same_month(
    &self,
    first: Timestamp,
    second: Timestamp
  ) -> bool {
    match (
      self.year_month(first),
      self.year_month(second)
    ) {
      | (Some(a), Some(b)) => a == b,
      | _ => false
    }
  }

  #[must_use]
  pub fn month_before(
    &self,
    first: Timestamp,
    second: Timestamp
  ) -> bool {
    match (
      self.year_month(first),
      self.year_month(second)
    ) {
      | (Some(a), Some(b)) => a < b,
      | _ => false
    }
  }

  #[must_use]
  pub fn month_after(
    &self,
    first: Timestamp,
    second: Timestamp
  ) -> bool {
    match (
      self.year_month(first),
      self.year_month(second)
    ) {
      | (Some(a), Some(b)) => a > b,
      | _ => false
    }
  }

  /// Shifts by calendar months, clamping the day to the target
  /// month's length. The time of day is dropped; the result is
  /// local midnight of the shifted date.
  #[must_use]
  pub fn add_months(
    &self,
    t: Timestamp,
    months: i32
  ) -> Timestamp {
    let Some(date) = self.local_date(t)
    else {
      return Timestamp::NO_TIME;
    };
    let step =
      Months::new(months.unsigned_abs());
    let shifted = if months >= 0 {
      date.checked_add_months(step)
    } else {
      date.checked_sub_months(step)
    };
    shifted
      .map(|day| self.local_midnight(day))
      .unwrap_or(Timestamp::NO_TIME)
  }

  #[must_use]
  pub fn add_days(
    &self,
    t: Timestamp,
    days: i64
  ) -> Timestamp {
    self
      .local_date(t)
      .and_then(|date| {
        date.checked_add_signed(
          Duration::days(days)
        )
      })
      .map(|day| self.local_midnight(day))
      .unwrap_or(Timestamp::NO_TIME)
  }

  #[must_use]
  pub fn month_first_day(
    &self,
    t: Timestamp
  ) -> Timestamp {
    self
      .local_date(t)
      .and_then(|date| date.with_day(1))
      .map(|day| self.local_midnight(day))
      .unwrap_or(Timestamp::NO_TIME)
  }

  #[must_use]
  pub fn month_size(
    &self,
    t: Timestamp
  ) -> u32 {
    self
      .local_date(t)
      .map(|date| {
        days_in_month(
          date.year(),
          date.month()
        )
      })
      .unwrap_or(0)
  }

  /// Columns between the week start and the month's first day.
  #[must_use]
  pub fn month_first_day_offset(
    &self,
    t: Timestamp
  ) -> u32 {
    let Some(first) = self
      .local_date(t)
      .and_then(|date| date.with_day(1))
    else {
      return 0;
    };
    let weekday = first
      .weekday()
      .num_days_from_sunday();
    let start = self
      .week_start
      .num_days_from_sunday();
    (7 + weekday - start) % 7
  }

  #[must_use]
  pub fn day_of_month(
    &self,
    t: Timestamp
  ) -> i32 {
    self
      .local_date(t)
      .map(|date| date.day() as i32)
      .unwrap_or(-1)
  }

  /// Re-tags the UTC calendar fields of `t` as local wall-clock
  /// fields.
  #[must_use]
  pub fn to_local_time_zone(
    &self,
    utc: Timestamp
  ) -> Timestamp {
    let Some(fields) =
      utc.to_utc().and_then(|dt| {
        dt.naive_utc().with_nanosecond(0)
      })
    else {
      return Timestamp::NO_TIME;
    };
    self.at_local(fields)
  }

  /// Re-tags the local calendar fields of `t` as UTC fields.
  #[must_use]
  pub fn to_utc_time_zone(
    &self,
    local: Timestamp
  ) -> Timestamp {
    let Some(fields) =
      local.to_utc().and_then(|dt| {
        dt.with_timezone(&self.zone)
          .naive_local()
          .with_nanosecond(0)
      })
    else {
      return Timestamp::NO_TIME;
    };
    Timestamp::from_utc(
      Utc.from_utc_datetime(&fields)
    )
  }

  /// Local calendar days from `base` to `t`, floored.
  #[must_use]
  pub fn day_offset(
    &self,
    base: Timestamp,
    t: Timestamp
  ) -> Option<i64> {
    let base = self.local_date(base)?;
    let day = self.local_date(t)?;
    Some(
      day
        .signed_duration_since(base)
        .num_days()
    )
  }

  fn year_month(
    &self,
    t: Timestamp
  ) -> Option<(i32, u32)> {
    self
      .local_date(t)
      .map(|date| (date.year(), date.month()))
  }
}

pub fn days_in_month(
  year: i32,
  month: u32
) -> u32 {
  let (next_year, next_month) =
    if month >= 12 {
      (year.saturating_add(1), 1_u32)
    } else {
      (year, month + 1)
    };
  NaiveDate::from_ymd_opt(
    next_year, next_month, 1
  )
  .and_then(|first| first.pred_opt())
  .map(|last| last.day())
  .unwrap_or(31)
}

fn resolve_civil(
  zone: &Tz,
  naive: NaiveDateTime
) -> Option<Timestamp> {
  if let Some(dt) = zone
    .from_local_datetime(&naive)
    .earliest()
  {
    return Some(Timestamp::from_millis(
      dt.timestamp_millis()
    ));
  }

  let shifted = naive
    .checked_add_signed(Duration::hours(1))?;
  tracing::trace!(
    local = %naive,
    zone = %zone,
    "local time falls in a gap; moving forward"
  );
  zone
    .from_local_datetime(&shifted)
    .earliest()
    .map(|dt| {
      Timestamp::from_millis(
        dt.timestamp_millis()
      )
    })
}

#[cfg(test)]
mod tests {
  use chrono::{
    NaiveDate,
    TimeZone,
    Utc,
    Weekday
  };

  use super::{
    ClockMath,
    DAY_MILLIS,
    Timestamp
  };

  fn clock(tz: chrono_tz::Tz) -> ClockMath {
    ClockMath::new(tz, Weekday::Sun)
  }

  fn day(
    clock: &ClockMath,
    y: i32,
    m: u32,
    d: u32
  ) -> Timestamp {
    clock.local_midnight(
      NaiveDate::from_ymd_opt(y, m, d)
        .expect("valid date")
    )
  }

  #[test]
  fn add_months_round_trips_under_month_equality() {
    let clock =
      clock(chrono_tz::America::New_York);
    let start = day(&clock, 2024, 1, 1);
    for k in -30..=30 {
      let there =
        clock.add_months(start, k);
      let back =
        clock.add_months(there, -k);
      assert!(
        clock.same_month(back, start),
        "k = {k}"
      );
    }
  }

  #[test]
  fn add_months_clamps_day_of_month() {
    let clock = clock(chrono_tz::UTC);
    let jan31 = day(&clock, 2024, 1, 31);
    let feb = clock.add_months(jan31, 1);
    assert_eq!(clock.day_of_month(feb), 29);
    assert_eq!(
      clock.add_months(
        day(&clock, 2023, 3, 31),
        -1
      ),
      day(&clock, 2023, 2, 28)
    );
  }

  #[test]
  fn add_months_drops_time_of_day() {
    let clock = clock(chrono_tz::Europe::Paris);
    let afternoon = clock.at_local(
      NaiveDate::from_ymd_opt(2024, 1, 31)
        .expect("valid date")
        .and_hms_opt(15, 30, 0)
        .expect("valid time")
    );
    assert_eq!(
      clock.add_months(afternoon, 1),
      day(&clock, 2024, 2, 29)
    );
    assert_eq!(
      clock.add_months(afternoon, 0),
      day(&clock, 2024, 1, 31)
    );
  }

  #[test]
  fn sentinel_yields_neutral_values() {
    let clock = clock(chrono_tz::UTC);
    let none = Timestamp::NO_TIME;
    let real = day(&clock, 2024, 5, 5);
    assert!(!clock.same_month(none, real));
    assert!(!clock.month_before(real, none));
    assert!(!clock.month_after(none, none));
    assert!(clock.add_months(none, 3).is_no_time());
    assert!(clock.month_first_day(none).is_no_time());
    assert!(clock.to_local_time_zone(none).is_no_time());
    assert!(clock.to_utc_time_zone(none).is_no_time());
    assert_eq!(clock.month_size(none), 0);
    assert_eq!(
      clock.month_first_day_offset(none),
      0
    );
    assert_eq!(clock.day_of_month(none), -1);
    assert_eq!(
      clock.day_offset(real, none),
      None
    );
  }

  #[test]
  fn month_ordering_ignores_day_of_month() {
    let clock = clock(chrono_tz::UTC);
    let early = day(&clock, 2024, 3, 31);
    let late = day(&clock, 2024, 4, 1);
    assert!(clock.month_before(early, late));
    assert!(clock.month_after(late, early));
    assert!(!clock.month_before(
      late,
      day(&clock, 2024, 4, 30)
    ));
    assert!(clock.same_month(
      late,
      day(&clock, 2024, 4, 30)
    ));
  }

  #[test]
  fn first_day_offset_follows_week_start() {
    // 2024-09-01 is a Sunday.
    let sunday = clock(chrono_tz::UTC);
    let monday = ClockMath::new(
      chrono_tz::UTC,
      Weekday::Mon
    );
    let sept = day(&sunday, 2024, 9, 17);
    assert_eq!(
      sunday.month_first_day_offset(sept),
      0
    );
    assert_eq!(
      monday.month_first_day_offset(sept),
      6
    );
    assert_eq!(sunday.month_size(sept), 30);
  }

  #[test]
  fn zone_conversion_retags_fields() {
    let clock =
      clock(chrono_tz::America::New_York);
    let utc_midnight = Timestamp::from_utc(
      Utc
        .with_ymd_and_hms(2024, 7, 5, 0, 0, 0)
        .single()
        .expect("valid utc")
    );
    let local =
      clock.to_local_time_zone(utc_midnight);
    assert_eq!(
      local,
      day(&clock, 2024, 7, 5)
    );
    assert_eq!(
      local.millis() - utc_midnight.millis(),
      4 * 3_600_000
    );
    assert_eq!(
      clock.to_utc_time_zone(local),
      utc_midnight
    );
  }

  #[test]
  fn day_offset_counts_wall_clock_days_across_dst() {
    let clock =
      clock(chrono_tz::America::New_York);
    let base = day(&clock, 2024, 3, 1);
    let after_change =
      day(&clock, 2024, 3, 11);
    assert_eq!(
      clock.day_offset(base, after_change),
      Some(10)
    );
    // The raw millisecond span is an hour short of ten days.
    assert!(
      (after_change.millis() - base.millis())
        < 10 * DAY_MILLIS
    );
  }
}
