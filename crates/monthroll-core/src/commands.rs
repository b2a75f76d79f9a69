use anyhow::{
  Context,
  anyhow,
  bail
};
use tracing::{
  debug,
  info,
  warn
};

use crate::cli::Command;
use crate::clock::ClockMath;
use crate::config::Config;
use crate::dates::{
  parse_day_expr,
  parse_instant_expr
};
use crate::event::EventRecord;
use crate::memory::MemoryEventSource;
use crate::render::Renderer;
use crate::store::Store;
use crate::window::RollingWindow;

type Window = RollingWindow<MemoryEventSource>;

/// Rebuilds the window from disk, applies `command`, prints the
/// resulting page and persists the new window state.
#[tracing::instrument(skip(store, cfg, renderer))]
pub fn dispatch(
  store: &Store,
  cfg: &Config,
  renderer: &mut Renderer,
  command: Command
) -> anyhow::Result<()> {
  let clock = cfg.clock()?;
  let events = store.load_events()?;
  let source = MemoryEventSource::with_events(
    clock, events
  );
  let mut window = open_window(store, cfg, clock, source)?;
  // Bind what the restore fetched so edits below arrive as change
  // notices on a live subscription.
  window.drain_inbox();

  match command {
    | Command::Show => {}
    | Command::Next => step(&mut window, 1),
    | Command::Prev => step(&mut window, -1),
    | Command::Select { day } => {
      let day =
        parse_day_expr(&clock, &day, clock.today())?;
      window.set_selected_day(day);
    }
    | Command::Today => window.reset(clock.today())?,
    | Command::Add {
      start,
      end,
      title,
      all_day,
      calendar
    } => {
      let record = build_event(
        &clock, &start, &end, all_day
      )?
      .titled(title)
      .in_calendar(calendar.unwrap_or_default());
      let id = window.source().insert(record);
      info!(id, "event added");
      store.save_events(&window.source().records())?;
    }
    | Command::Delete { id } => {
      if !window.source().remove(id) {
        bail!("no event with id {id}");
      }
      info!(id, "event deleted");
      store.save_events(&window.source().records())?;
    }
  }

  let position = window.position();
  window.request_fetch_if_missing(position);
  let handled = window.drain_inbox();
  debug!(handled, "inbox drained");

  print_page(&window, renderer)?;
  store.save_state(&window.save_state())?;
  window.deactivate();
  Ok(())
}

fn open_window(
  store: &Store,
  cfg: &Config,
  clock: ClockMath,
  source: MemoryEventSource
) -> anyhow::Result<Window> {
  let mut window =
    RollingWindow::new(clock, source, cfg.window_size()?)
      .context("failed to build month window")?
      .with_excluded_calendars(cfg.excluded_calendars());
  window.set_listener(|event| {
    debug!(?event, "window event");
  });

  match store.load_state() {
    | Ok(Some(state)) => {
      match window.restore_state(state) {
        | Ok(()) => {
          // The saved months are centred; page to the one holding
          // the selection.
          let selected = window.selected_day();
          window.set_selected_day(selected);
        }
        | Err(err) => {
          warn!(error = %err, "ignoring saved window state");
        }
      }
    }
    | Ok(None) => {}
    | Err(err) => {
      warn!(error = %format!("{err:#}"), "could not read window state");
    }
  }
  Ok(window)
}

/// One page in `direction`, the way a drag on the pager moves it.
fn step(window: &mut Window, direction: i32) {
  let target = if direction > 0 {
    (window.position() + 1).min(window.len() - 1)
  } else {
    window.position().saturating_sub(1)
  };
  window.page_selected(target, true);
  window.page_settled(target);
}

fn build_event(
  clock: &ClockMath,
  start: &str,
  end: &str,
  all_day: bool
) -> anyhow::Result<EventRecord> {
  let today = clock.today();
  if all_day {
    let first = parse_day_expr(clock, start, today)?;
    let last = parse_day_expr(clock, end, today)?;
    if last < first {
      bail!("event ends before it starts");
    }
    // Stored as UTC midnights with an exclusive end.
    let end = clock.add_days(last, 1);
    return Ok(EventRecord::all_day(
      clock.to_utc_time_zone(first),
      clock.to_utc_time_zone(end)
    ));
  }

  let start = parse_instant_expr(clock, start, today)?;
  let end = parse_instant_expr(clock, end, today)?;
  if end < start {
    return Err(anyhow!(
      "event ends before it starts: {start} > {end}"
    ));
  }
  Ok(EventRecord::timed(start, end))
}

fn print_page(
  window: &Window,
  renderer: &mut Renderer
) -> anyhow::Result<()> {
  let clock = window.clock();
  let position = window.position();
  let months = window
    .slots()
    .iter()
    .map(|slot| slot.month())
    .collect::<Vec<_>>();

  renderer.print_strip(clock, &months, position)?;
  renderer.print_month(
    clock,
    window.current_month(),
    window.day_index_for(position),
    window.selected_day_for(position)
  )?;

  let events = window
    .slot(position)
    .and_then(|slot| slot.snapshot())
    .map(|snapshot| snapshot.iter().cloned().collect::<Vec<_>>())
    .unwrap_or_default();
  renderer.print_agenda(clock, &events)?;
  Ok(())
}
