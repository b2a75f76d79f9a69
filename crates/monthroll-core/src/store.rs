use std::fs;
use std::io::{
  BufRead,
  BufReader,
  Write
};
use std::path::{
  Path,
  PathBuf
};

use anyhow::{
  Context,
  anyhow
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tracing::{
  debug,
  info
};

use crate::event::EventRecord;
use crate::window::WindowState;

/// On-disk home of the event list and the last window position.
#[derive(Debug)]
pub struct Store {
  pub data_dir:    PathBuf,
  pub events_path: PathBuf,
  pub state_path:  PathBuf
}

impl Store {
  #[tracing::instrument(skip(data_dir))]
  pub fn open(
    data_dir: &Path
  ) -> anyhow::Result<Self> {
    let data_dir = data_dir.to_path_buf();
    fs::create_dir_all(&data_dir)
      .with_context(|| {
        format!(
          "failed to create {}",
          data_dir.display()
        )
      })?;

    let events_path =
      data_dir.join("events.data");
    let state_path =
      data_dir.join("window.json");
    if !events_path.exists() {
      fs::write(&events_path, "")?;
    }

    info!(
      data_dir = %data_dir.display(),
      events = %events_path.display(),
      state = %state_path.display(),
      "opened store"
    );

    Ok(Self {
      data_dir,
      events_path,
      state_path
    })
  }

  #[tracing::instrument(skip(self))]
  pub fn load_events(
    &self
  ) -> anyhow::Result<Vec<EventRecord>> {
    load_jsonl(&self.events_path)
      .context("failed to load events.data")
  }

  #[tracing::instrument(skip(self, events))]
  pub fn save_events(
    &self,
    events: &[EventRecord]
  ) -> anyhow::Result<()> {
    save_jsonl_atomic(
      &self.events_path,
      events
    )
    .context("failed to save events.data")
  }

  /// `None` when no state was saved yet.
  #[tracing::instrument(skip(self))]
  pub fn load_state(
    &self
  ) -> anyhow::Result<Option<WindowState>> {
    if !self.state_path.exists() {
      return Ok(None);
    }
    let raw =
      fs::read_to_string(&self.state_path)
        .with_context(|| {
          format!(
            "failed reading {}",
            self.state_path.display()
          )
        })?;
    if raw.trim().is_empty() {
      return Ok(None);
    }
    let state = serde_json::from_str(&raw)
      .with_context(|| {
        format!(
          "failed parsing {}",
          self.state_path.display()
        )
      })?;
    Ok(Some(state))
  }

  #[tracing::instrument(skip(self, state))]
  pub fn save_state(
    &self,
    state: &WindowState
  ) -> anyhow::Result<()> {
    let dir = self
      .state_path
      .parent()
      .unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(
      &mut temp, state
    )?;
    writeln!(temp)?;
    temp.flush()?;
    temp.persist(&self.state_path).map_err(
      |err| {
        anyhow!(
          "failed to persist {}: {}",
          self.state_path.display(),
          err
        )
      }
    )?;
    debug!(
      first_month = %state.first_month,
      selected = %state.selected_day,
      "saved window state"
    );
    Ok(())
  }
}

#[tracing::instrument(skip(path))]
fn load_jsonl<T: DeserializeOwned>(
  path: &Path
) -> anyhow::Result<Vec<T>> {
  debug!(file = %path.display(), "loading jsonl");
  let file = fs::File::open(path)?;
  let reader = BufReader::new(file);

  let mut out = Vec::new();
  for (idx, line) in
    reader.lines().enumerate()
  {
    let line = line?;
    let trimmed = line.trim();
    if trimmed.is_empty() {
      continue;
    }

    let item: T = serde_json::from_str(
      trimmed
    )
    .with_context(|| {
      format!(
        "failed parsing {} line {}",
        path.display(),
        idx + 1
      )
    })?;
    out.push(item);
  }

  debug!(
    count = out.len(),
    "loaded records from jsonl"
  );
  Ok(out)
}

#[tracing::instrument(skip(path, items))]
fn save_jsonl_atomic<T: Serialize>(
  path: &Path,
  items: &[T]
) -> anyhow::Result<()> {
  debug!(file = %path.display(), count = items.len(), "saving jsonl atomically");

  let dir = path
    .parent()
    .unwrap_or_else(|| Path::new("."));
  let mut temp = NamedTempFile::new_in(dir)?;
  for item in items {
    let serialized =
      serde_json::to_string(item)?;
    writeln!(temp, "{serialized}")?;
  }
  temp.flush()?;

  temp.persist(path).map_err(|err| {
    anyhow!(
      "failed to persist {}: {}",
      path.display(),
      err
    )
  })?;

  Ok(())
}

#[cfg(test)]
mod tests {
  use std::fs;

  use tempfile::tempdir;

  use super::Store;
  use crate::clock::Timestamp;
  use crate::event::EventRecord;
  use crate::window::WindowState;

  #[test]
  fn events_and_state_survive_reopen() {
    let temp = tempdir().expect("tempdir");
    let store =
      Store::open(temp.path()).expect("open");
    assert!(
      store
        .load_events()
        .expect("load")
        .is_empty()
    );
    assert!(
      store
        .load_state()
        .expect("state")
        .is_none()
    );

    let events = vec![
      EventRecord::timed(
        Timestamp::from_millis(1_000),
        Timestamp::from_millis(2_000)
      )
      .titled("standup"),
    ];
    store.save_events(&events).expect("save");
    let state = WindowState {
      first_month:  Timestamp::from_millis(
        0
      ),
      selected_day: Timestamp::from_millis(
        86_400_000
      )
    };
    store.save_state(&state).expect("save");

    let reopened =
      Store::open(temp.path()).expect("open");
    assert_eq!(
      reopened.load_events().expect("load"),
      events
    );
    assert_eq!(
      reopened.load_state().expect("state"),
      Some(state)
    );
  }

  #[test]
  fn blank_lines_are_skipped_and_bad_lines_reported() {
    let temp = tempdir().expect("tempdir");
    let store =
      Store::open(temp.path()).expect("open");
    fs::write(
      &store.events_path,
      "\n{\"start\":5,\"end\":6}\n\n"
    )
    .expect("write");
    let loaded =
      store.load_events().expect("load");
    assert_eq!(loaded.len(), 1);
    assert!(!loaded[0].all_day);

    fs::write(&store.events_path, "{oops}\n")
      .expect("write");
    let err = store
      .load_events()
      .expect_err("bad line");
    assert!(
      format!("{err:#}").contains("line 1")
    );
  }
}
