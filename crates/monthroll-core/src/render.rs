use std::io::{
  self,
  IsTerminal,
  Write
};

use anyhow::anyhow;
use chrono::Weekday;
use unicode_width::UnicodeWidthStr;

use crate::clock::{
  ClockMath,
  Month,
  Timestamp
};
use crate::config::Config;
use crate::day_index::DayIndexSet;
use crate::event::EventRecord;

const CELL_WIDTH: usize = 4;

#[derive(Debug, Clone)]
pub struct Renderer {
  color: bool
}

impl Renderer {
  pub fn new(
    cfg: &Config
  ) -> anyhow::Result<Self> {
    let color_cfg = cfg
      .get("color")
      .unwrap_or_else(|| "on".to_string());
    let color = match color_cfg
      .to_ascii_lowercase()
      .as_str()
    {
      | "on" | "yes" | "true" | "1" => true,
      | "off" | "no" | "false" | "0" => {
        false
      }
      | other => {
        return Err(anyhow!(
          "invalid color setting: {other}"
        ));
      }
    };

    Ok(Self { color })
  }

  /// Prints the grid for `month` with event days marked and the
  /// selected day bracketed.
  #[tracing::instrument(skip(self, clock, days))]
  pub fn print_month(
    &mut self,
    clock: &ClockMath,
    month: Month,
    days: &DayIndexSet,
    selected: Timestamp
  ) -> anyhow::Result<()> {
    let mut out = io::stdout().lock();
    let lines =
      month_grid(clock, month, days, selected);
    for (idx, line) in lines.iter().enumerate()
    {
      if idx == 0 {
        writeln!(out, "{}", self.paint(line, "1"))?;
      } else {
        writeln!(out, "{line}")?;
      }
    }
    Ok(())
  }

  /// Months of the window on one line, the shown one highlighted.
  pub fn print_strip(
    &mut self,
    clock: &ClockMath,
    months: &[Month],
    current: usize
  ) -> anyhow::Result<()> {
    let mut out = io::stdout().lock();
    let labels = months
      .iter()
      .enumerate()
      .map(|(idx, month)| {
        let label = short_month_label(clock, *month);
        if idx == current {
          self.paint(&format!("<{label}>"), "33")
        } else {
          format!(" {label} ")
        }
      })
      .collect::<Vec<_>>();
    writeln!(out, "{}", labels.join(" "))?;
    Ok(())
  }

  #[tracing::instrument(skip(self, clock, events))]
  pub fn print_agenda(
    &mut self,
    clock: &ClockMath,
    events: &[EventRecord]
  ) -> anyhow::Result<()> {
    let mut out = io::stdout().lock();
    if events.is_empty() {
      writeln!(out, "no events")?;
      return Ok(());
    }

    let headers = vec![
      "ID".to_string(),
      "When".to_string(),
      "Calendar".to_string(),
      "Title".to_string(),
    ];
    let rows = events
      .iter()
      .map(|event| {
        vec![
          self.paint(&event.id.to_string(), "33"),
          when_label(clock, event),
          event.calendar_id.clone(),
          event.title.clone(),
        ]
      })
      .collect::<Vec<_>>();

    write_table(&mut out, headers, rows)?;
    Ok(())
  }

  fn paint(
    &self,
    text: &str,
    code: &str
  ) -> String {
    if !self.color
      || !io::stdout().is_terminal()
    {
      return text.to_string();
    }
    format!("\x1b[{code}m{text}\x1b[0m")
  }
}

#[must_use]
pub fn month_label(
  clock: &ClockMath,
  month: Month
) -> String {
  clock
    .local_date(month)
    .map(|date| date.format("%B %Y").to_string())
    .unwrap_or_else(|| "no-time".to_string())
}

fn short_month_label(
  clock: &ClockMath,
  month: Month
) -> String {
  clock
    .local_date(month)
    .map(|date| date.format("%b %y").to_string())
    .unwrap_or_else(|| "---".to_string())
}

fn when_label(
  clock: &ClockMath,
  event: &EventRecord
) -> String {
  if event.all_day {
    let start =
      clock.to_local_time_zone(event.start);
    return clock
      .local_date(start)
      .map(|date| {
        format!("{} all day", date.format("%Y-%m-%d"))
      })
      .unwrap_or_default();
  }
  let start = event.start.to_utc().map(|dt| {
    dt.with_timezone(&clock.zone())
      .format("%Y-%m-%d %H:%M")
      .to_string()
  });
  let end = event.end.to_utc().map(|dt| {
    dt.with_timezone(&clock.zone())
      .format("%H:%M")
      .to_string()
  });
  match (start, end) {
    | (Some(start), Some(end)) => {
      format!("{start}-{end}")
    }
    | (Some(start), None) => start,
    | _ => String::new()
  }
}

/// Plain-text lines for one month: a title, the weekday header,
/// then one line per week.
#[must_use]
pub fn month_grid(
  clock: &ClockMath,
  month: Month,
  days: &DayIndexSet,
  selected: Timestamp
) -> Vec<String> {
  let size = clock.month_size(month);
  if size == 0 {
    return vec!["no-time".to_string()];
  }
  let lead = clock.month_first_day_offset(month);
  let selected_dom =
    if clock.same_month(month, selected) {
      clock.day_of_month(selected)
    } else {
      -1
    };

  let width = CELL_WIDTH * 7;
  let title = month_label(clock, month);
  let pad = width
    .saturating_sub(UnicodeWidthStr::width(
      title.as_str()
    ))
    / 2;
  let mut lines =
    vec![format!("{}{title}", " ".repeat(pad))];
  lines.push(weekday_header(clock.week_start()));

  let mut line = " ".repeat(CELL_WIDTH * lead as usize);
  let mut column = lead;
  for offset in 0..size {
    let dom = offset + 1;
    let cell = if i64::from(dom)
      == i64::from(selected_dom)
    {
      format!("[{dom:>2}]")
    } else if days.contains(offset) {
      format!(" {dom:>2}*")
    } else {
      format!(" {dom:>2} ")
    };
    line.push_str(&cell);
    column += 1;
    if column == 7 {
      lines.push(line.trim_end().to_string());
      line = String::new();
      column = 0;
    }
  }
  if !line.is_empty() {
    lines.push(line.trim_end().to_string());
  }
  lines
}

fn weekday_header(start: Weekday) -> String {
  let mut day = start;
  let mut header = String::new();
  for _ in 0..7 {
    let name = match day {
      | Weekday::Mon => "Mo",
      | Weekday::Tue => "Tu",
      | Weekday::Wed => "We",
      | Weekday::Thu => "Th",
      | Weekday::Fri => "Fr",
      | Weekday::Sat => "Sa",
      | Weekday::Sun => "Su"
    };
    header.push_str(&format!(" {name} "));
    day = day.succ();
  }
  header.trim_end().to_string()
}

fn write_table<W: Write>(
  mut writer: W,
  headers: Vec<String>,
  rows: Vec<Vec<String>>
) -> anyhow::Result<()> {
  let column_count = headers.len();
  let mut widths = vec![0usize; column_count];

  for (idx, header) in
    headers.iter().enumerate()
  {
    widths[idx] = widths[idx].max(
      UnicodeWidthStr::width(header.as_str())
    );
  }

  for row in &rows {
    for (idx, cell) in row.iter().enumerate()
    {
      widths[idx] = widths[idx].max(
        UnicodeWidthStr::width(
          strip_ansi(cell).as_str()
        )
      );
    }
  }

  for (header, &width) in
    headers.iter().zip(&widths)
  {
    write!(writer, "{header:width$} ")?;
  }
  writeln!(writer)?;

  for &width in &widths {
    write!(writer, "{:-<width$} ", "")?;
  }
  writeln!(writer)?;

  for row in rows {
    for (cell, &width) in row.iter().zip(&widths)
    {
      let visible = UnicodeWidthStr::width(
        strip_ansi(cell).as_str()
      );
      let padding =
        width.saturating_sub(visible);
      write!(
        writer,
        "{}{} ",
        cell,
        " ".repeat(padding)
      )?;
    }
    writeln!(writer)?;
  }

  Ok(())
}

fn strip_ansi(s: &str) -> String {
  let mut out = String::with_capacity(s.len());
  let mut escaped = false;

  for ch in s.chars() {
    if escaped {
      if ch == 'm' {
        escaped = false;
      }
      continue;
    }
    if ch == '\x1b' {
      escaped = true;
      continue;
    }
    out.push(ch);
  }

  out
}
