use tracing::trace;

use crate::clock::{
  ClockMath,
  Month
};
use crate::day_index::{
  DayIndexSet,
  build_day_index
};
use crate::event::EventSnapshot;
use crate::source::{
  Subscription,
  Ticket
};

/// A snapshot together with the subscription watching it. The two
/// only ever exist, and are only ever released, as a pair.
#[derive(Debug)]
struct Binding {
  snapshot:     EventSnapshot,
  subscription: Subscription,
  days:         DayIndexSet
}

/// One window position.
#[derive(Debug)]
pub struct MonthSlot {
  month:         Month,
  generation:    u64,
  binding:       Option<Binding>,
  fetch_pending: bool
}

impl MonthSlot {
  pub(crate) fn new(
    month: Month,
    generation: u64
  ) -> Self {
    Self {
      month,
      generation,
      binding: None,
      fetch_pending: false
    }
  }

  #[must_use]
  pub fn month(&self) -> Month {
    self.month
  }

  #[must_use]
  pub fn generation(&self) -> u64 {
    self.generation
  }

  #[must_use]
  pub fn ticket(&self) -> Ticket {
    Ticket {
      month:      self.month,
      generation: self.generation
    }
  }

  #[must_use]
  pub fn snapshot(
    &self
  ) -> Option<&EventSnapshot> {
    self
      .binding
      .as_ref()
      .map(|binding| &binding.snapshot)
  }

  #[must_use]
  pub fn subscription(
    &self
  ) -> Option<&Subscription> {
    self
      .binding
      .as_ref()
      .map(|binding| &binding.subscription)
  }

  #[must_use]
  pub fn day_index(&self) -> &DayIndexSet {
    self
      .binding
      .as_ref()
      .map(|binding| &binding.days)
      .unwrap_or_else(|| DayIndexSet::empty())
  }

  #[must_use]
  pub fn is_bound(&self) -> bool {
    self.binding.is_some()
  }

  #[must_use]
  pub fn fetch_pending(&self) -> bool {
    self.fetch_pending
  }

  pub(crate) fn mark_fetch_pending(
    &mut self
  ) {
    self.fetch_pending = true;
  }

  /// Replaces the binding; the previous subscription is released
  /// before the new one is stored.
  pub(crate) fn bind(
    &mut self,
    clock: &ClockMath,
    generation: u64,
    snapshot: EventSnapshot,
    subscription: Subscription
  ) {
    self.release_binding();
    self.generation = generation;
    let days = build_day_index(
      clock, self.month, &snapshot
    );
    trace!(
      month = %self.month,
      events = snapshot.len(),
      days = days.len(),
      "slot bound"
    );
    self.binding = Some(Binding {
      snapshot,
      subscription,
      days
    });
    self.fetch_pending = false;
  }

  /// Drops cached data and moves to `generation` so that
  /// outstanding tickets stop matching.
  pub(crate) fn release(
    &mut self,
    generation: u64
  ) {
    self.release_binding();
    self.generation = generation;
    self.fetch_pending = false;
  }

  pub(crate) fn relabel(
    &mut self,
    month: Month,
    generation: u64
  ) {
    self.release(generation);
    self.month = month;
  }

  fn release_binding(&mut self) {
    if let Some(binding) =
      self.binding.take()
    {
      binding.subscription.unsubscribe();
    }
  }
}
