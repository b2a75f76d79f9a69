use std::collections::BTreeSet;

use anyhow::{
  anyhow,
  bail
};
use crossbeam_channel::Receiver;
use serde::{
  Deserialize,
  Serialize
};
use tracing::{
  debug,
  info,
  instrument
};

use crate::clock::{
  ClockMath,
  Month,
  Timestamp
};
use crate::day_index::DayIndexSet;
use crate::event::EventSnapshot;
use crate::slot::MonthSlot;
use crate::source::{
  Courier,
  EventQuery,
  EventSource,
  Inbound,
  Subscription,
  Ticket,
  mailbox
};

pub const DEFAULT_WINDOW_SIZE: usize = 5;

/// Outbound notification from the window to its host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowEvent {
  /// Content of the slot at `position` changed and should be
  /// repainted.
  PlainRefresh { position: usize },
  /// The user picked a new day from inside the window.
  SelectionChanged(Timestamp)
}

/// Enough to rebuild the window after the host is recreated.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
)]
pub struct WindowState {
  pub first_month:  Timestamp,
  pub selected_day: Timestamp
}

pub type Listener = Box<dyn FnMut(WindowEvent)>;

/// A fixed, odd-sized run of consecutive months centred on one
/// month, each slot lazily bound to an event snapshot.
///
/// All mutation happens on the thread that owns the window. Event
/// sources reply through the window's inbox, which is only read by
/// [`RollingWindow::drain_inbox`].
pub struct RollingWindow<S> {
  clock:                 ClockMath,
  source:                S,
  slots:                 Vec<MonthSlot>,
  position:              usize,
  selected_day:          Timestamp,
  excluded_calendar_ids: BTreeSet<String>,
  next_generation:       u64,
  courier:               Courier,
  inbox:                 Receiver<Inbound>,
  listener:              Option<Listener>
}

impl<S: EventSource> RollingWindow<S> {
  pub fn new(
    clock: ClockMath,
    source: S,
    size: usize
  ) -> anyhow::Result<Self> {
    let today = clock.today();
    Self::anchored(clock, source, size, today)
  }

  /// Builds a window centred on the month of `today` with `today`
  /// selected.
  #[instrument(skip(clock, source, today), fields(today = %today))]
  pub fn anchored(
    clock: ClockMath,
    source: S,
    size: usize,
    today: Timestamp
  ) -> anyhow::Result<Self> {
    if size < 3 || size % 2 == 0 {
      bail!(
        "window size must be odd and at \
         least 3, got {size}"
      );
    }
    let center_month =
      checked_month(&clock, today)?;

    let (courier, inbox) = mailbox();
    let center = size / 2;
    let slots = (0..size)
      .map(|i| {
        MonthSlot::new(
          clock.add_months(
            center_month,
            offset(i, center)
          ),
          i as u64 + 1
        )
      })
      .collect::<Vec<_>>();

    info!(
      size,
      center = %center_month,
      zone = %clock.zone(),
      "month window initialized"
    );

    Ok(Self {
      clock,
      source,
      slots,
      position: center,
      selected_day: today,
      excluded_calendar_ids: BTreeSet::new(
      ),
      next_generation: size as u64,
      courier,
      inbox,
      listener: None
    })
  }

  #[must_use]
  pub fn with_excluded_calendars(
    mut self,
    ids: impl IntoIterator<Item = String>
  ) -> Self {
    self.excluded_calendar_ids =
      ids.into_iter().collect();
    self
  }

  /// Changes the calendars left out of fetches; cached data is
  /// dropped and the current page refetched.
  pub fn set_excluded_calendars(
    &mut self,
    ids: impl IntoIterator<Item = String>
  ) {
    let ids =
      ids.into_iter().collect::<BTreeSet<_>>();
    if ids == self.excluded_calendar_ids {
      return;
    }
    self.excluded_calendar_ids = ids;
    self.invalidate_data();
  }

  pub fn set_listener(
    &mut self,
    listener: impl FnMut(WindowEvent) + 'static
  ) {
    self.listener = Some(Box::new(listener));
  }

  #[must_use]
  pub fn clock(&self) -> &ClockMath {
    &self.clock
  }

  #[must_use]
  pub fn source(&self) -> &S {
    &self.source
  }

  #[must_use]
  pub fn len(&self) -> usize {
    self.slots.len()
  }

  #[must_use]
  pub fn is_empty(&self) -> bool {
    self.slots.is_empty()
  }

  #[must_use]
  pub fn center_index(&self) -> usize {
    self.slots.len() / 2
  }

  #[must_use]
  pub fn slots(&self) -> &[MonthSlot] {
    &self.slots
  }

  #[must_use]
  pub fn slot(
    &self,
    position: usize
  ) -> Option<&MonthSlot> {
    self.slots.get(position)
  }

  #[must_use]
  pub fn position(&self) -> usize {
    self.position
  }

  #[must_use]
  pub fn current_center_month(
    &self
  ) -> Month {
    self.slots[self.center_index()].month()
  }

  #[must_use]
  pub fn current_month(&self) -> Month {
    self.slots[self.position].month()
  }

  #[must_use]
  pub fn month_at(
    &self,
    position: usize
  ) -> Option<Month> {
    self.slots.get(position).map(MonthSlot::month)
  }

  #[must_use]
  pub fn selected_day(&self) -> Timestamp {
    self.selected_day
  }

  /// The selected day if it lies in the month at `position`,
  /// otherwise `NO_TIME`.
  #[must_use]
  pub fn selected_day_for(
    &self,
    position: usize
  ) -> Timestamp {
    match self.month_at(position) {
      | Some(month)
        if self.clock.same_month(
          month,
          self.selected_day
        ) =>
      {
        self.selected_day
      }
      | _ => Timestamp::NO_TIME
    }
  }

  #[must_use]
  pub fn day_index_for(
    &self,
    position: usize
  ) -> &DayIndexSet {
    self
      .slots
      .get(position)
      .map(MonthSlot::day_index)
      .unwrap_or_else(|| DayIndexSet::empty())
  }

  #[must_use]
  pub fn slot_for_month(
    &self,
    month: Month
  ) -> Option<usize> {
    self.slots.iter().position(|slot| {
      self.clock.same_month(slot.month(), month)
    })
  }

  /// Moves every month forward by `len - 2`; the month shown at
  /// the last slot ends up at slot 1.
  #[instrument(skip(self))]
  pub(crate) fn recenter_right(&mut self) {
    let shift = self.slots.len() - 2;
    let new_center = self.clock.add_months(
      self.current_center_month(),
      shift as i32
    );
    self.relabel_around(new_center);
    self.position =
      self.position.saturating_sub(shift);
    debug!(
      center = %new_center,
      position = self.position,
      "window shifted forward"
    );
    self.refresh_all();
    self.keep_selection_in_window();
  }

  /// Mirror of [`Self::recenter_right`].
  #[instrument(skip(self))]
  pub(crate) fn recenter_left(&mut self) {
    let shift = self.slots.len() - 2;
    let new_center = self.clock.add_months(
      self.current_center_month(),
      -(shift as i32)
    );
    self.relabel_around(new_center);
    self.position = (self.position + shift)
      .min(self.slots.len() - 1);
    debug!(
      center = %new_center,
      position = self.position,
      "window shifted back"
    );
    self.refresh_all();
    self.keep_selection_in_window();
  }

  /// The host switched pages. A drag moves the selection to the
  /// first day of the new page's month.
  pub fn page_selected(
    &mut self,
    position: usize,
    dragged: bool
  ) -> bool {
    let Some(month) = self.month_at(position)
    else {
      return false;
    };
    self.position = position;
    if dragged {
      let first =
        self.clock.month_first_day(month);
      self.selected_day = first;
      self.refresh_neighbours(position);
      self.emit(
        WindowEvent::SelectionChanged(first)
      );
    }
    true
  }

  /// The host finished moving to `position`. Reaching either edge
  /// re-centres the window; the current page is then fetched if
  /// it has no data yet.
  pub fn page_settled(
    &mut self,
    position: usize
  ) {
    if position >= self.slots.len() {
      return;
    }
    self.position = position;
    let last = self.slots.len() - 1;
    if position == last {
      self.recenter_right();
    } else if position == 0 {
      self.recenter_left();
    }
    self.request_fetch_if_missing(
      self.position
    );
  }

  /// Selects `day` from outside the window (e.g. an agenda list),
  /// paging at most one step toward it.
  #[instrument(skip(self, day), fields(day = %day))]
  pub fn set_selected_day(
    &mut self,
    day: Timestamp
  ) -> bool {
    if day.is_no_time() {
      return false;
    }
    let current = self.current_month();
    let target = if self
      .clock
      .month_before(day, current)
    {
      self.position.saturating_sub(1)
    } else if self
      .clock
      .month_after(day, current)
    {
      (self.position + 1)
        .min(self.slots.len() - 1)
    } else {
      self.position
    };

    self.selected_day = day;
    self.position = target;
    self.refresh_neighbours(target);
    if self.slot_for_month(day).is_none() {
      // More than one page away and past the edge: start over
      // around the day instead of leaving it outside the window.
      debug!(
        "selected day outside window; re-anchoring"
      );
      self.anchor_on(day);
    } else {
      self.page_settled(target);
    }
    true
  }

  /// A day cell of the current page was tapped.
  pub fn select_day(
    &mut self,
    day: Timestamp
  ) -> bool {
    if day.is_no_time()
      || !self
        .clock
        .same_month(day, self.current_month())
    {
      return false;
    }
    self.selected_day = day;
    self.emit(WindowEvent::PlainRefresh {
      position: self.position
    });
    self.emit(WindowEvent::SelectionChanged(
      day
    ));
    true
  }

  /// Binds a snapshot to the slot showing `month`. A month no
  /// longer in the window is ignored and its subscription dropped.
  pub fn bind_snapshot(
    &mut self,
    month: Month,
    snapshot: EventSnapshot,
    subscription: Subscription
  ) -> bool {
    let Some(position) =
      self.slot_for_month(month)
    else {
      debug!(
        month = %month,
        "discarding snapshot for month outside window"
      );
      subscription.unsubscribe();
      return false;
    };
    let generation = self.issue_generation();
    self.slots[position].bind(
      &self.clock,
      generation,
      snapshot,
      subscription
    );
    self.emit(WindowEvent::PlainRefresh {
      position
    });
    true
  }

  /// Releases every slot's snapshot and subscription.
  pub fn invalidate_all(&mut self) {
    for slot in &mut self.slots {
      self.next_generation += 1;
      slot.release(self.next_generation);
    }
    debug!("all slots invalidated");
    self.refresh_all();
  }

  /// Drops cached data and refetches the current page.
  pub fn invalidate_data(&mut self) {
    self.invalidate_all();
    self.request_fetch_if_missing(
      self.position
    );
  }

  /// Teardown: releases every binding without refetching.
  pub fn deactivate(&mut self) {
    for slot in &mut self.slots {
      self.next_generation += 1;
      slot.release(self.next_generation);
    }
    debug!("month window deactivated");
  }

  /// Rebuilds the window around `today` and fetches its month.
  pub fn reset(
    &mut self,
    today: Timestamp
  ) -> anyhow::Result<()> {
    checked_month(&self.clock, today)?;
    self.anchor_on(today);
    self.request_fetch_if_missing(
      self.position
    );
    Ok(())
  }

  /// Asks the source for the events of the slot at `position`
  /// unless it already has data or a fetch is in flight.
  pub fn request_fetch_if_missing(
    &mut self,
    position: usize
  ) -> bool {
    let Some(slot) = self.slots.get_mut(position)
    else {
      return false;
    };
    if slot.is_bound() || slot.fetch_pending() {
      return false;
    }

    let range_start =
      self.clock.month_first_day(slot.month());
    let query = EventQuery {
      ticket: slot.ticket(),
      range_start,
      range_end: self
        .clock
        .add_months(range_start, 1),
      excluded_calendar_ids: self
        .excluded_calendar_ids
        .clone()
    };
    slot.mark_fetch_pending();
    debug!(
      position,
      month = %range_start,
      generation = query.ticket.generation,
      "requesting events"
    );
    self
      .source
      .request_events(query, self.courier.clone());
    true
  }

  /// Applies every queued fetch result and change notice. Never
  /// blocks; returns how many messages were handled.
  pub fn drain_inbox(&mut self) -> usize {
    let mut handled = 0;
    while let Ok(message) = self.inbox.try_recv()
    {
      handled += 1;
      match message {
        | Inbound::Fetched {
          ticket,
          snapshot
        } => self.on_fetched(ticket, snapshot),
        | Inbound::Changed(ticket) => {
          self.on_changed(ticket)
        }
      }
    }
    handled
  }

  #[must_use]
  pub fn save_state(&self) -> WindowState {
    WindowState {
      first_month:  self.slots[0].month(),
      selected_day: self.selected_day
    }
  }

  #[instrument(skip(self))]
  pub fn restore_state(
    &mut self,
    state: WindowState
  ) -> anyhow::Result<()> {
    let first =
      checked_month(&self.clock, state.first_month)
        .map_err(|err| {
          anyhow!(
            "invalid saved window state: {err}"
          )
        })?;
    let center = self.center_index();
    let new_center = self
      .clock
      .add_months(first, center as i32);
    self.relabel_around(new_center);
    self.position = center;
    self.selected_day = state.selected_day;
    info!(
      center = %new_center,
      selected = %state.selected_day,
      "restored month window"
    );
    self.refresh_all();
    self.keep_selection_in_window();
    Ok(())
  }

  fn on_fetched(
    &mut self,
    ticket: Ticket,
    snapshot: EventSnapshot
  ) {
    let Some(position) = self.live_slot(ticket)
    else {
      debug!(
        month = %ticket.month,
        generation = ticket.generation,
        "discarding stale fetch result"
      );
      return;
    };
    let generation = self.issue_generation();
    let subscription = self.source.subscribe(
      Ticket {
        month: ticket.month,
        generation
      },
      self.courier.clone()
    );
    self.slots[position].bind(
      &self.clock,
      generation,
      snapshot,
      subscription
    );
    self.emit(WindowEvent::PlainRefresh {
      position
    });
  }

  fn on_changed(&mut self, ticket: Ticket) {
    let Some(position) = self.live_slot(ticket)
    else {
      debug!(
        month = %ticket.month,
        generation = ticket.generation,
        "discarding stale change notice"
      );
      return;
    };
    let generation = self.issue_generation();
    self.slots[position].release(generation);
    self.emit(WindowEvent::PlainRefresh {
      position
    });
    if position == self.position {
      self.request_fetch_if_missing(position);
    }
  }

  /// A selection whose month left the window moves to the first
  /// day of the current page.
  fn keep_selection_in_window(&mut self) {
    if self.selected_day.is_no_time()
      || self
        .slot_for_month(self.selected_day)
        .is_some()
    {
      return;
    }
    let first = self
      .clock
      .month_first_day(self.current_month());
    debug!(
      dropped = %self.selected_day,
      selected = %first,
      "selection left the window"
    );
    self.selected_day = first;
    self.emit(WindowEvent::SelectionChanged(
      first
    ));
  }

  fn live_slot(
    &self,
    ticket: Ticket
  ) -> Option<usize> {
    self.slots.iter().position(|slot| {
      slot.generation() == ticket.generation
        && self
          .clock
          .same_month(slot.month(), ticket.month)
    })
  }

  fn anchor_on(&mut self, day: Timestamp) {
    let center = self.center_index();
    let month = self.clock.month_first_day(day);
    self.relabel_around(month);
    self.position = center;
    self.selected_day = day;
    self.refresh_all();
  }

  fn relabel_around(&mut self, center_month: Month) {
    let clock = self.clock;
    let center = self.center_index();
    for (i, slot) in
      self.slots.iter_mut().enumerate()
    {
      self.next_generation += 1;
      slot.relabel(
        clock.add_months(
          center_month,
          offset(i, center)
        ),
        self.next_generation
      );
    }
  }

  fn issue_generation(&mut self) -> u64 {
    self.next_generation += 1;
    self.next_generation
  }

  fn refresh_neighbours(
    &mut self,
    position: usize
  ) {
    let from = position.saturating_sub(1);
    let to =
      (position + 1).min(self.slots.len() - 1);
    for position in from..=to {
      self.emit(WindowEvent::PlainRefresh {
        position
      });
    }
  }

  fn refresh_all(&mut self) {
    for position in 0..self.slots.len() {
      self.emit(WindowEvent::PlainRefresh {
        position
      });
    }
  }

  fn emit(&mut self, event: WindowEvent) {
    if let Some(listener) =
      self.listener.as_mut()
    {
      listener(event);
    }
  }
}

fn checked_month(
  clock: &ClockMath,
  day: Timestamp
) -> anyhow::Result<Month> {
  let month = clock.month_first_day(day);
  if month.is_no_time() {
    bail!(
      "a month window needs a real day, \
       got no-time"
    );
  }
  Ok(month)
}

fn offset(index: usize, center: usize) -> i32 {
  index as i32 - center as i32
}

#[cfg(test)]
mod tests {
  use std::cell::RefCell;
  use std::rc::Rc;

  use chrono::{
    NaiveDate,
    Weekday
  };

  use super::{
    RollingWindow,
    WindowEvent,
    WindowState
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
  use crate::memory::MemoryEventSource;
  use crate::source::Subscription;

  fn clock() -> ClockMath {
    ClockMath::new(
      chrono_tz::Europe::Berlin,
      Weekday::Sun
    )
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

  fn window(
    today: Timestamp
  ) -> RollingWindow<MemoryEventSource> {
    let clock = clock();
    RollingWindow::anchored(
      clock,
      MemoryEventSource::new(clock),
      5,
      today
    )
    .expect("window")
  }

  fn assert_centered(
    window: &RollingWindow<MemoryEventSource>
  ) {
    let clock = window.clock();
    let center = window.current_center_month();
    for (i, slot) in
      window.slots().iter().enumerate()
    {
      assert!(clock.same_month(
        slot.month(),
        clock.add_months(center, i as i32 - 2)
      ));
    }
  }

  #[test]
  fn initializes_around_today() {
    let clock = clock();
    let today = day(&clock, 2024, 10, 16);
    let window = window(today);
    assert_eq!(window.position(), 2);
    assert_eq!(
      window.current_center_month(),
      day(&clock, 2024, 10, 1)
    );
    assert_eq!(
      window.month_at(0),
      Some(day(&clock, 2024, 8, 1))
    );
    assert_eq!(window.selected_day(), today);
    assert_centered(&window);
  }

  #[test]
  fn rejects_sentinel_and_even_sizes() {
    let clock = clock();
    assert!(
      RollingWindow::anchored(
        clock,
        MemoryEventSource::new(clock),
        5,
        Timestamp::NO_TIME
      )
      .is_err()
    );
    assert!(
      RollingWindow::anchored(
        clock,
        MemoryEventSource::new(clock),
        4,
        day(&clock, 2024, 1, 1)
      )
      .is_err()
    );
  }

  #[test]
  fn settling_on_an_edge_recenters() {
    let clock = clock();
    let mut window =
      window(day(&clock, 2024, 10, 16));

    window.page_settled(4);
    assert_eq!(window.position(), 1);
    assert_eq!(
      window.current_month(),
      day(&clock, 2024, 12, 1)
    );
    assert_eq!(
      window.current_center_month(),
      day(&clock, 2025, 1, 1)
    );
    assert_centered(&window);

    window.page_settled(0);
    assert_eq!(window.position(), 3);
    assert_eq!(
      window.current_month(),
      day(&clock, 2024, 11, 1)
    );
    assert_centered(&window);
  }

  #[test]
  fn stale_bind_is_discarded() {
    let clock = clock();
    let mut window =
      window(day(&clock, 2024, 10, 16));
    let before = window
      .slots()
      .iter()
      .map(|slot| slot.generation())
      .collect::<Vec<_>>();

    let bound = window.bind_snapshot(
      day(&clock, 2023, 1, 1),
      EventSnapshot::new(
        Vec::new(),
        ChangeToken(0)
      ),
      Subscription::detached(1)
    );
    assert!(!bound);
    assert!(
      window
        .slots()
        .iter()
        .all(|slot| !slot.is_bound())
    );
    assert_eq!(
      window
        .slots()
        .iter()
        .map(|slot| slot.generation())
        .collect::<Vec<_>>(),
      before
    );
  }

  #[test]
  fn set_selected_day_steps_one_page() {
    let clock = clock();
    let mut window =
      window(day(&clock, 2024, 10, 16));

    assert!(window.set_selected_day(day(
      &clock, 2024, 11, 3
    )));
    assert_eq!(window.position(), 3);
    assert_eq!(
      window.selected_day_for(3),
      day(&clock, 2024, 11, 3)
    );
    assert!(
      window.selected_day_for(2).is_no_time()
    );

    assert!(window.set_selected_day(day(
      &clock, 2024, 11, 20
    )));
    assert_eq!(window.position(), 3);

    assert!(
      !window.set_selected_day(Timestamp::NO_TIME)
    );
    assert_eq!(
      window.selected_day(),
      day(&clock, 2024, 11, 20)
    );
  }

  #[test]
  fn drag_selects_first_day_and_notifies() {
    let clock = clock();
    let mut window =
      window(day(&clock, 2024, 10, 16));
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    window.set_listener(move |event| {
      sink.borrow_mut().push(event);
    });

    assert!(window.page_selected(1, true));
    let first = day(&clock, 2024, 9, 1);
    assert_eq!(window.selected_day(), first);
    assert!(seen.borrow().contains(
      &WindowEvent::SelectionChanged(first)
    ));
  }

  #[test]
  fn save_and_restore_state() {
    let clock = clock();
    let mut window =
      window(day(&clock, 2024, 10, 16));
    window.page_settled(4);
    let state = window.save_state();

    let mut other =
      self::window(day(&clock, 2020, 1, 1));
    other
      .restore_state(state)
      .expect("restore");
    assert_eq!(
      other.current_center_month(),
      window.current_center_month()
    );
    assert_eq!(
      other.selected_day(),
      window.selected_day()
    );

    assert!(
      other
        .restore_state(WindowState {
          first_month:  Timestamp::NO_TIME,
          selected_day: Timestamp::NO_TIME
        })
        .is_err()
    );
  }

  #[test]
  fn fetch_binds_and_change_refetches_current_page() {
    let clock = clock();
    let today = day(&clock, 2024, 10, 16);
    let source = MemoryEventSource::new(clock);
    let mut window = RollingWindow::anchored(
      clock,
      source.clone(),
      5,
      today
    )
    .expect("window");

    assert!(window.request_fetch_if_missing(2));
    assert!(!window.request_fetch_if_missing(2));
    assert_eq!(window.drain_inbox(), 1);
    assert!(window.day_index_for(2).is_empty());
    assert_eq!(source.live_subscriptions(), 1);

    source.insert(EventRecord::timed(
      today, today
    ));
    window.drain_inbox();
    assert_eq!(
      window
        .day_index_for(2)
        .iter()
        .collect::<Vec<_>>(),
      vec![15]
    );
    assert_eq!(source.live_subscriptions(), 1);
  }

  #[test]
  fn shifting_away_moves_selection_onto_current_page() {
    let clock = clock();
    let mut window =
      window(day(&clock, 2024, 10, 16));
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    window.set_listener(move |event| {
      sink.borrow_mut().push(event);
    });

    // Settle on the next month's page without dragging.
    window.page_settled(3);
    assert_eq!(
      window.selected_day(),
      day(&clock, 2024, 10, 16)
    );

    // Nov through Mar after the shift: October is gone.
    window.page_settled(4);
    let first = day(&clock, 2024, 12, 1);
    assert!(
      window
        .slot_for_month(window.selected_day())
        .is_some()
    );
    assert_eq!(window.selected_day(), first);
    assert_eq!(window.current_month(), first);
    assert_eq!(
      seen.borrow().last(),
      Some(&WindowEvent::SelectionChanged(first))
    );
  }

  #[test]
  fn restore_clamps_a_selection_outside_the_saved_months() {
    let clock = clock();
    let mut window =
      window(day(&clock, 2024, 10, 16));
    window
      .restore_state(WindowState {
        first_month:  day(&clock, 2024, 1, 1),
        selected_day: day(&clock, 2024, 10, 16)
      })
      .expect("restore");
    assert_eq!(
      window.selected_day(),
      day(&clock, 2024, 3, 1)
    );
    assert_eq!(
      window.selected_day_for(2),
      day(&clock, 2024, 3, 1)
    );
  }

  #[test]
  fn invalidate_all_releases_snapshot_and_subscription_together() {
    let clock = clock();
    let source = MemoryEventSource::new(clock);
    let mut window = RollingWindow::anchored(
      clock,
      source.clone(),
      5,
      day(&clock, 2024, 10, 16)
    )
    .expect("window");
    for position in 0..window.len() {
      assert!(window.request_fetch_if_missing(position));
    }
    assert_eq!(window.drain_inbox(), 5);
    assert!(
      window.slots().iter().all(|slot| {
        slot.snapshot().is_some()
          && slot.subscription().is_some()
      })
    );
    assert_eq!(source.live_subscriptions(), 5);

    window.invalidate_all();
    assert!(window.slots().iter().all(|slot| {
      slot.snapshot().is_none()
        && slot.subscription().is_none()
        && slot.day_index().is_empty()
    }));
    assert_eq!(source.live_subscriptions(), 0);
  }

  #[test]
  fn excluding_a_calendar_refetches_without_its_days() {
    let clock = clock();
    let today = day(&clock, 2024, 10, 16);
    let source = MemoryEventSource::new(clock);
    source.insert(
      EventRecord::timed(today, today)
        .in_calendar("work")
    );
    let holiday = day(&clock, 2024, 10, 3);
    source.insert(
      EventRecord::timed(holiday, holiday)
        .in_calendar("holidays")
    );
    let mut window = RollingWindow::anchored(
      clock,
      source.clone(),
      5,
      today
    )
    .expect("window");
    window.request_fetch_if_missing(2);
    window.drain_inbox();
    assert_eq!(
      window
        .day_index_for(2)
        .iter()
        .collect::<Vec<_>>(),
      vec![2, 15]
    );

    window.set_excluded_calendars([
      "holidays".to_string()
    ]);
    assert!(!window.slot(2).is_some_and(|slot| slot.is_bound()));
    assert_eq!(window.drain_inbox(), 1);
    assert_eq!(
      window
        .day_index_for(2)
        .iter()
        .collect::<Vec<_>>(),
      vec![15]
    );
    assert_eq!(source.live_subscriptions(), 1);
  }

  #[test]
  fn select_day_only_accepts_days_on_the_current_page() {
    let clock = clock();
    let mut window =
      window(day(&clock, 2024, 10, 16));
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    window.set_listener(move |event| {
      sink.borrow_mut().push(event);
    });

    let tapped = day(&clock, 2024, 10, 28);
    assert!(window.select_day(tapped));
    assert_eq!(window.selected_day(), tapped);
    assert_eq!(
      seen.borrow().last(),
      Some(&WindowEvent::SelectionChanged(tapped))
    );

    seen.borrow_mut().clear();
    assert!(
      !window.select_day(day(&clock, 2024, 11, 2))
    );
    assert!(!window.select_day(Timestamp::NO_TIME));
    assert_eq!(window.selected_day(), tapped);
    assert!(seen.borrow().is_empty());
  }
}
