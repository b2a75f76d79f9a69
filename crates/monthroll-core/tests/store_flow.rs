use std::fs;

use chrono::{NaiveDate, Weekday};
use monthroll_core::config::{Config, resolve_data_dir};
use monthroll_core::store::Store;
use monthroll_core::{EventRecord, MemoryEventSource, RollingWindow};
use tempfile::tempdir;

#[test]
fn configured_window_persists_events_and_position() {
    let temp = tempdir().expect("tempdir");
    let rc = temp.path().join("monthrollrc");
    fs::write(
        &rc,
        "timezone = Pacific/Auckland\nweek.start = mon\nwindow.size = 3\ncalendar.exclude = private\n",
    )
    .expect("write rc");

    let mut cfg = Config::load(Some(rc.as_path())).expect("load config");
    cfg.apply_overrides([("rc.color".to_string(), "off".to_string())]);
    assert_eq!(cfg.get_bool("color"), Some(false));

    let clock = cfg.clock().expect("clock");
    assert_eq!(clock.zone(), chrono_tz::Pacific::Auckland);
    assert_eq!(clock.week_start(), Weekday::Mon);

    let data_dir =
        resolve_data_dir(&cfg, Some(temp.path().join("data").as_path())).expect("data dir");
    let store = Store::open(&data_dir).expect("open store");

    let at = |d: u32, h: u32| {
        clock.at_local(
            NaiveDate::from_ymd_opt(2024, 11, d)
                .and_then(|date| date.and_hms_opt(h, 0, 0))
                .expect("valid local time"),
        )
    };
    store
        .save_events(&[
            EventRecord::timed(at(5, 9), at(5, 10)).titled("dentist"),
            EventRecord::timed(at(8, 9), at(8, 10))
                .titled("surprise")
                .in_calendar("private"),
        ])
        .expect("save events");

    let source = MemoryEventSource::with_events(clock, store.load_events().expect("load"));
    let mut window = RollingWindow::anchored(
        clock,
        source,
        cfg.window_size().expect("size"),
        at(20, 0),
    )
    .expect("window")
    .with_excluded_calendars(cfg.excluded_calendars());
    assert_eq!(window.len(), 3);

    window.request_fetch_if_missing(window.position());
    window.drain_inbox();
    assert_eq!(
        window.day_index_for(window.position()).iter().collect::<Vec<_>>(),
        vec![4]
    );

    // Settling on the last slot shifts by one month at this size.
    window.page_settled(2);
    assert_eq!(window.position(), 1);
    store.save_state(&window.save_state()).expect("save state");

    let reopened = Store::open(&data_dir).expect("reopen");
    let state = reopened
        .load_state()
        .expect("load state")
        .expect("state present");
    let mut restored = RollingWindow::anchored(
        clock,
        MemoryEventSource::new(clock),
        3,
        at(1, 0),
    )
    .expect("window");
    restored.restore_state(state).expect("restore");
    for (a, b) in window.slots().iter().zip(restored.slots()) {
        assert!(clock.same_month(a.month(), b.month()));
    }
    assert_eq!(restored.selected_day(), at(20, 0));
}
