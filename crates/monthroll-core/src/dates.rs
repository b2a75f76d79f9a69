use anyhow::{
  Context,
  anyhow
};
use chrono::{
  NaiveDate,
  NaiveDateTime
};
use regex::Regex;
use tracing::trace;

use crate::clock::{
  ClockMath,
  Timestamp
};

/// Resolves a day expression to local midnight of that day.
///
/// Accepts `today`, `tomorrow`, `yesterday`, `YYYY-MM-DD`,
/// `YYYY-MM` (first of the month) and relative offsets such as
/// `+3d`, `-2w` or `+1m` counted from `today`.
#[tracing::instrument(skip(clock, today))]
pub fn parse_day_expr(
  clock: &ClockMath,
  input: &str,
  today: Timestamp
) -> anyhow::Result<Timestamp> {
  let token = input.trim();
  let lower = token.to_ascii_lowercase();

  let resolved = match lower.as_str() {
    | "today" => today,
    | "tomorrow" => clock.add_days(today, 1),
    | "yesterday" => clock.add_days(today, -1),
    | _ => parse_calendar_or_relative(
      clock, token, today
    )?
  };

  if resolved.is_no_time() {
    return Err(anyhow!(
      "day expression out of range: {token}"
    ));
  }
  trace!(input = %token, resolved = %resolved, "resolved day expression");
  Ok(resolved)
}

/// Like [`parse_day_expr`], but also takes a local wall-clock time
/// as `YYYY-MM-DDTHH:MM` or `YYYY-MM-DD HH:MM`.
pub fn parse_instant_expr(
  clock: &ClockMath,
  input: &str,
  today: Timestamp
) -> anyhow::Result<Timestamp> {
  let token = input.trim();
  for format in
    ["%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"]
  {
    if let Ok(naive) =
      NaiveDateTime::parse_from_str(
        token, format
      )
    {
      let at = clock.at_local(naive);
      if at.is_no_time() {
        return Err(anyhow!(
          "local time does not exist: \
           {token}"
        ));
      }
      return Ok(at);
    }
  }
  parse_day_expr(clock, token, today)
}

fn parse_calendar_or_relative(
  clock: &ClockMath,
  token: &str,
  today: Timestamp
) -> anyhow::Result<Timestamp> {
  if let Ok(date) =
    NaiveDate::parse_from_str(token, "%Y-%m-%d")
  {
    return Ok(clock.local_midnight(date));
  }

  if let Ok(date) = NaiveDate::parse_from_str(
    &format!("{token}-01"),
    "%Y-%m-%d"
  ) {
    return Ok(clock.local_midnight(date));
  }

  let rel_re = Regex::new(r"^(?P<sign>[+-])(?P<num>\d+)(?P<unit>[dwm])$")
        .map_err(|e| anyhow!("internal regex compile failure: {e}"))?;

  let caps =
    rel_re.captures(token).ok_or_else(|| {
      anyhow!(
        "unrecognized day expression: \
         {token}"
      )
    })?;
  let num: i64 = caps
    .name("num")
    .map(|m| m.as_str())
    .ok_or_else(|| {
      anyhow!("missing relative amount")
    })?
    .parse()
    .context("invalid relative number")?;
  let num = match caps
    .name("sign")
    .map(|m| m.as_str())
  {
    | Some("-") => -num,
    | _ => num
  };

  match caps.name("unit").map(|m| m.as_str()) {
    | Some("d") => Ok(clock.add_days(today, num)),
    | Some("w") => {
      Ok(clock.add_days(today, num * 7))
    }
    | Some("m") => {
      let months = i32::try_from(num)
        .context("month offset too large")?;
      Ok(clock.add_months(today, months))
    }
    | other => Err(anyhow!(
      "unknown relative unit: {other:?}"
    ))
  }
}
