pub mod cli;
pub mod clock;
pub mod commands;
pub mod config;
pub mod dates;
pub mod day_index;
pub mod event;
pub mod memory;
pub mod render;
pub mod slot;
pub mod source;
pub mod store;
pub mod window;

use std::ffi::OsString;

use anyhow::Context;
use clap::Parser;
use tracing::{
  debug,
  info
};

pub use clock::{
  ClockMath,
  Month,
  Timestamp
};
pub use day_index::{
  DayIndexSet,
  build_day_index
};
pub use event::{
  ChangeToken,
  EventRecord,
  EventSnapshot
};
pub use memory::MemoryEventSource;
pub use source::{
  EventQuery,
  EventSource,
  Subscription,
  Ticket
};
pub use window::{
  RollingWindow,
  WindowEvent,
  WindowState
};

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let pre =
    cli::preprocess_args(&raw_args)?;
  let cli = cli::GlobalCli::parse_from(
    pre.cleaned_args
  );

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting monthroll"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.rc.as_deref()
  )?;
  cfg.apply_overrides(
    pre.rc_overrides.into_iter().chain(
      cli
        .overrides
        .into_iter()
        .map(|kv| (kv.key, kv.value))
    )
  );

  let data_dir =
    config::resolve_data_dir(
      &cfg,
      cli.data.as_deref()
    )
    .context(
      "failed to resolve data \
       directory"
    )?;

  let store = store::Store::open(
    &data_dir
  )
  .with_context(|| {
    format!(
      "failed to open store at {}",
      data_dir.display()
    )
  })?;

  let mut renderer =
    render::Renderer::new(&cfg)?;
  let command = cli
    .command
    .unwrap_or(cli::Command::Show);

  commands::dispatch(
    &store,
    &cfg,
    &mut renderer,
    command
  )?;

  info!("done");
  Ok(())
}
