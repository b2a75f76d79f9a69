use serde::{
  Deserialize,
  Serialize
};

use crate::clock::Timestamp;

/// One concrete event occurrence.
///
/// All-day records hold UTC midnight boundaries with an exclusive
/// end; timed records hold local instants.
#[derive(
  Debug,
  Clone,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
)]
pub struct EventRecord {
  #[serde(default)]
  pub id:          i64,
  #[serde(default)]
  pub calendar_id: String,
  #[serde(default)]
  pub title:       String,
  pub start:       Timestamp,
  pub end:         Timestamp,
  #[serde(default)]
  pub all_day:     bool
}

impl EventRecord {
  #[must_use]
  pub fn timed(
    start: Timestamp,
    end: Timestamp
  ) -> Self {
    Self {
      id: 0,
      calendar_id: String::new(),
      title: String::new(),
      start,
      end,
      all_day: false
    }
  }

  #[must_use]
  pub fn all_day(
    utc_start: Timestamp,
    utc_end: Timestamp
  ) -> Self {
    Self {
      all_day: true,
      ..Self::timed(utc_start, utc_end)
    }
  }

  #[must_use]
  pub fn titled(
    mut self,
    title: impl Into<String>
  ) -> Self {
    self.title = title.into();
    self
  }

  #[must_use]
  pub fn in_calendar(
    mut self,
    calendar_id: impl Into<String>
  ) -> Self {
    self.calendar_id = calendar_id.into();
    self
  }
}

/// Identifies the source state a snapshot was read from.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
)]
pub struct ChangeToken(pub u64);

/// Events for one month, ordered by start as delivered by the
/// source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSnapshot {
  records: Vec<EventRecord>,
  token:   ChangeToken
}

impl EventSnapshot {
  #[must_use]
  pub fn new(
    records: Vec<EventRecord>,
    token: ChangeToken
  ) -> Self {
    Self { records, token }
  }

  #[must_use]
  pub fn token(&self) -> ChangeToken {
    self.token
  }

  pub fn iter(
    &self
  ) -> impl Iterator<Item = &EventRecord> {
    self.records.iter()
  }

  #[must_use]
  pub fn len(&self) -> usize {
    self.records.len()
  }

  #[must_use]
  pub fn is_empty(&self) -> bool {
    self.records.is_empty()
  }
}

impl<'a> IntoIterator for &'a EventSnapshot {
  type IntoIter =
    std::slice::Iter<'a, EventRecord>;
  type Item = &'a EventRecord;

  fn into_iter(self) -> Self::IntoIter {
    self.records.iter()
  }
}
