//! Boundary to the event storage collaborator.
//!
//! Fetches and change notifications never touch window state
//! directly. They are queued through a [`Courier`] and applied when
//! the owning actor drains its inbox, so a result that arrives after
//! the window moved on is recognised by its [`Ticket`] and dropped.

use std::collections::BTreeSet;
use std::fmt;

use crossbeam_channel::{
  Receiver,
  Sender
};
use tracing::debug;

use crate::clock::{
  Month,
  Timestamp
};
use crate::event::EventSnapshot;

/// Names the slot state a fetch or subscription was issued for.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
)]
pub struct Ticket {
  pub month:      Month,
  pub generation: u64
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventQuery {
  pub ticket:                Ticket,
  /// Inclusive, local domain.
  pub range_start:           Timestamp,
  /// Exclusive, local domain.
  pub range_end:             Timestamp,
  pub excluded_calendar_ids: BTreeSet<String>
}

#[derive(Debug)]
pub enum Inbound {
  Fetched {
    ticket:   Ticket,
    snapshot: EventSnapshot
  },
  Changed(Ticket)
}

/// Sending half of a window's inbox.
#[derive(Debug, Clone)]
pub struct Courier {
  tx: Sender<Inbound>
}

impl Courier {
  pub fn deliver(
    &self,
    ticket: Ticket,
    snapshot: EventSnapshot
  ) {
    if self
      .tx
      .send(Inbound::Fetched {
        ticket,
        snapshot
      })
      .is_err()
    {
      debug!(
        month = %ticket.month,
        "window inbox closed; dropping fetch result"
      );
    }
  }

  pub fn notify_changed(
    &self,
    ticket: Ticket
  ) {
    if self
      .tx
      .send(Inbound::Changed(ticket))
      .is_err()
    {
      debug!(
        month = %ticket.month,
        "window inbox closed; dropping change notice"
      );
    }
  }
}

#[must_use]
pub fn mailbox() -> (Courier, Receiver<Inbound>)
{
  let (tx, rx) =
    crossbeam_channel::unbounded();
  (Courier { tx }, rx)
}

/// A live change registration. Releasing it (explicitly or by drop)
/// stops further notifications.
pub struct Subscription {
  id:      u64,
  release: Option<Box<dyn FnOnce() + Send>>
}

impl Subscription {
  pub fn new(
    id: u64,
    release: impl FnOnce() + Send + 'static
  ) -> Self {
    Self {
      id,
      release: Some(Box::new(release))
    }
  }

  /// A handle with nothing to release.
  #[must_use]
  pub fn detached(id: u64) -> Self {
    Self { id, release: None }
  }

  #[must_use]
  pub fn id(&self) -> u64 {
    self.id
  }

  pub fn unsubscribe(mut self) {
    self.release_now();
  }

  fn release_now(&mut self) {
    if let Some(release) =
      self.release.take()
    {
      release();
    }
  }
}

impl Drop for Subscription {
  fn drop(&mut self) {
    self.release_now();
  }
}

impl fmt::Debug for Subscription {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.debug_struct("Subscription")
      .field("id", &self.id)
      .field(
        "live",
        &self.release.is_some()
      )
      .finish()
  }
}

pub trait EventSource {
  /// Schedules a query and returns immediately; the snapshot
  /// arrives later through `reply`.
  fn request_events(
    &self,
    query: EventQuery,
    reply: Courier
  );

  fn subscribe(
    &self,
    ticket: Ticket,
    notify: Courier
  ) -> Subscription;
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;
  use std::sync::atomic::{
    AtomicUsize,
    Ordering
  };

  use super::Subscription;

  #[test]
  fn subscription_releases_exactly_once() {
    let released =
      Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&released);
    let sub = Subscription::new(7, move || {
      counter.fetch_add(1, Ordering::SeqCst);
    });
    sub.unsubscribe();
    assert_eq!(
      released.load(Ordering::SeqCst),
      1
    );

    let counter = Arc::clone(&released);
    {
      let _sub =
        Subscription::new(8, move || {
          counter
            .fetch_add(1, Ordering::SeqCst);
        });
    }
    assert_eq!(
      released.load(Ordering::SeqCst),
      2
    );
  }
}
