use std::collections::BTreeMap;
use std::sync::{
  Arc,
  Weak
};

use parking_lot::Mutex;
use tracing::{
  debug,
  instrument,
  trace
};

use crate::clock::{
  ClockMath,
  Timestamp
};
use crate::event::{
  ChangeToken,
  EventRecord,
  EventSnapshot
};
use crate::source::{
  Courier,
  EventQuery,
  EventSource,
  Subscription,
  Ticket
};

#[derive(Debug, Clone)]
struct StoredEvent {
  record:  EventRecord,
  deleted: bool
}

#[derive(Debug, Default)]
struct Inner {
  events:            Vec<StoredEvent>,
  subscribers:       BTreeMap<u64, (Ticket, Courier)>,
  next_subscription: u64,
  next_event_id:     i64,
  version:           u64
}

/// In-process event store answering month queries with the same
/// overlap rules a platform calendar provider applies.
#[derive(Debug, Clone)]
pub struct MemoryEventSource {
  clock: ClockMath,
  inner: Arc<Mutex<Inner>>
}

impl MemoryEventSource {
  #[must_use]
  pub fn new(clock: ClockMath) -> Self {
    Self {
      clock,
      inner: Arc::new(Mutex::new(
        Inner {
          next_event_id: 1,
          ..Inner::default()
        }
      ))
    }
  }

  #[must_use]
  pub fn with_events(
    clock: ClockMath,
    records: impl IntoIterator<Item = EventRecord>
  ) -> Self {
    let source = Self::new(clock);
    {
      let mut inner = source.inner.lock();
      for record in records {
        push_record(&mut inner, record);
      }
    }
    source
  }

  /// Stores `record`, assigning an id when it has none, and tells
  /// every subscriber that data changed.
  pub fn insert(
    &self,
    record: EventRecord
  ) -> i64 {
    let id = {
      let mut inner = self.inner.lock();
      let id = push_record(&mut inner, record);
      inner.version += 1;
      id
    };
    self.notify_all();
    id
  }

  pub fn remove(&self, id: i64) -> bool {
    let removed = {
      let mut inner = self.inner.lock();
      let before = inner.events.len();
      inner
        .events
        .retain(|event| event.record.id != id);
      let removed =
        inner.events.len() != before;
      if removed {
        inner.version += 1;
      }
      removed
    };
    if removed {
      self.notify_all();
    }
    removed
  }

  /// Soft delete: the row stays but no query returns it.
  pub fn mark_deleted(
    &self,
    id: i64
  ) -> bool {
    let marked = {
      let mut inner = self.inner.lock();
      let marked = inner
        .events
        .iter_mut()
        .find(|event| {
          event.record.id == id
            && !event.deleted
        })
        .map(|event| event.deleted = true)
        .is_some();
      if marked {
        inner.version += 1;
      }
      marked
    };
    if marked {
      self.notify_all();
    }
    marked
  }

  #[must_use]
  pub fn live_subscriptions(&self) -> usize {
    self.inner.lock().subscribers.len()
  }

  #[must_use]
  pub fn records(&self) -> Vec<EventRecord> {
    self
      .inner
      .lock()
      .events
      .iter()
      .filter(|event| !event.deleted)
      .map(|event| event.record.clone())
      .collect()
  }

  #[instrument(skip(self, query), fields(month = %query.ticket.month))]
  pub fn query(
    &self,
    query: &EventQuery
  ) -> EventSnapshot {
    let local_start = query.range_start;
    let local_end = query.range_end;
    let utc_start = self
      .clock
      .to_utc_time_zone(local_start);
    let utc_end =
      self.clock.to_utc_time_zone(local_end);

    let inner = self.inner.lock();
    let mut records = inner
      .events
      .iter()
      .filter(|event| !event.deleted)
      .map(|event| &event.record)
      .filter(|record| {
        !query
          .excluded_calendar_ids
          .contains(&record.calendar_id)
      })
      .filter(|record| {
        if record.all_day {
          overlaps(record, utc_start, utc_end)
        } else {
          overlaps(
            record,
            local_start,
            local_end
          )
        }
      })
      .cloned()
      .collect::<Vec<_>>();
    records.sort_by_key(|record| record.start);

    trace!(
      matched = records.len(),
      total = inner.events.len(),
      "month query evaluated"
    );
    EventSnapshot::new(
      records,
      ChangeToken(inner.version)
    )
  }

  fn notify_all(&self) {
    let targets = self
      .inner
      .lock()
      .subscribers
      .values()
      .cloned()
      .collect::<Vec<_>>();
    debug!(
      subscribers = targets.len(),
      "event data changed"
    );
    for (ticket, courier) in targets {
      courier.notify_changed(ticket);
    }
  }
}

impl EventSource for MemoryEventSource {
  fn request_events(
    &self,
    query: EventQuery,
    reply: Courier
  ) {
    let snapshot = self.query(&query);
    reply.deliver(query.ticket, snapshot);
  }

  fn subscribe(
    &self,
    ticket: Ticket,
    notify: Courier
  ) -> Subscription {
    let id = {
      let mut inner = self.inner.lock();
      inner.next_subscription += 1;
      let id = inner.next_subscription;
      inner
        .subscribers
        .insert(id, (ticket, notify));
      id
    };
    let weak: Weak<Mutex<Inner>> =
      Arc::downgrade(&self.inner);
    Subscription::new(id, move || {
      if let Some(inner) = weak.upgrade() {
        inner.lock().subscribers.remove(&id);
      }
    })
  }
}

fn push_record(
  inner: &mut Inner,
  mut record: EventRecord
) -> i64 {
  if record.id == 0 {
    record.id = inner.next_event_id;
  }
  inner.next_event_id =
    inner.next_event_id.max(record.id + 1);
  let id = record.id;
  inner.events.push(StoredEvent {
    record,
    deleted: false
  });
  id
}

/// Starts inside `[start, end)` or starts before it and is still
/// running at `start`.
fn overlaps(
  record: &EventRecord,
  start: Timestamp,
  end: Timestamp
) -> bool {
  (record.start >= start
    && record.start < end)
    || (record.start < start
      && record.end > start)
}
