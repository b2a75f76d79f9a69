use std::collections::BTreeSet;

use tracing::trace;

use crate::clock::{
  ClockMath,
  Month
};
use crate::event::EventSnapshot;

/// Zero-based day offsets within one month that hold at least one
/// event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DayIndexSet {
  days: BTreeSet<u32>
}

static EMPTY: DayIndexSet = DayIndexSet {
  days: BTreeSet::new()
};

impl DayIndexSet {
  #[must_use]
  pub fn empty() -> &'static DayIndexSet {
    &EMPTY
  }

  #[must_use]
  pub fn contains(
    &self,
    offset: u32
  ) -> bool {
    self.days.contains(&offset)
  }

  pub fn iter(
    &self
  ) -> impl Iterator<Item = u32> + '_ {
    self.days.iter().copied()
  }

  #[must_use]
  pub fn len(&self) -> usize {
    self.days.len()
  }

  #[must_use]
  pub fn is_empty(&self) -> bool {
    self.days.is_empty()
  }
}

impl FromIterator<u32> for DayIndexSet {
  fn from_iter<I: IntoIterator<Item = u32>>(
    iter: I
  ) -> Self {
    Self {
      days: iter.into_iter().collect()
    }
  }
}

/// Maps every record of `snapshot` onto the days of `month` it
/// covers. Offsets before day 0 or past the month's last day are
/// dropped.
#[must_use]
pub fn build_day_index(
  clock: &ClockMath,
  month: Month,
  snapshot: &EventSnapshot
) -> DayIndexSet {
  let base = clock.month_first_day(month);
  let size = i64::from(clock.month_size(month));
  if base.is_no_time() || size == 0 {
    return DayIndexSet::default();
  }
  let last = size - 1;

  let mut days = BTreeSet::new();
  for record in snapshot {
    let (start, end) = if record.all_day {
      (
        clock.to_local_time_zone(record.start),
        clock.to_local_time_zone(record.end)
      )
    } else {
      (record.start, record.end)
    };

    let Some(start_index) =
      clock.day_offset(base, start)
    else {
      continue;
    };
    let Some(mut end_index) =
      clock.day_offset(base, end)
    else {
      continue;
    };
    if record.all_day {
      // Stored all-day ends are the midnight after the last day.
      end_index -= 1;
    }

    let first = start_index.max(0);
    let end_index = end_index.min(last);
    if first > end_index {
      trace!(
        id = record.id,
        start_index,
        end_index,
        "event falls outside month"
      );
      continue;
    }
    days.extend(
      (first..=end_index)
        .filter_map(|d| u32::try_from(d).ok())
    );
  }

  DayIndexSet { days }
}
