//! Result extraction: rendered DOM → validated flight observations.
//!
//! Defensive by construction: every per-entry field goes through the locator
//! fallback chain, entries missing a mandatory field (price, departure date)
//! are skipped and counted rather than emitted as garbage, and a non-empty
//! result list that yields *nothing* is an integrity failure — that shape
//! means the markup drifted past all fallbacks, not that no flights exist.

use chrono::{DateTime, NaiveDate, Utc};
use scraper::Html;
use std::collections::HashSet;
use tracing::{debug, info};

use crate::core::{EngineConfig, ExtractError, FlightObservation, Money, SearchSpec};
use crate::session::PageDriver;
use crate::ui::elements;

/// Locale-aware price parsing: symbol or ISO currency detection, both
/// thousands/decimal separator conventions. Returns `None` rather than a
/// zero/garbage amount when the text cannot be read as a price.
pub fn parse_price(raw: &str, default_currency: &str) -> Option<Money> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let mut currency: Option<String> = None;
    for (symbol, code) in [('€', "EUR"), ('$', "USD"), ('£', "GBP"), ('¥', "JPY")] {
        if raw.contains(symbol) {
            currency = Some(code.to_string());
            break;
        }
    }
    if currency.is_none() {
        for token in raw.split(|c: char| !c.is_ascii_alphabetic()) {
            if token.len() == 3 && token.chars().all(|c| c.is_ascii_uppercase()) {
                currency = Some(token.to_string());
                break;
            }
        }
    }

    let numeric: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
        .collect();
    if !numeric.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let minor_units = parse_minor_units(&numeric)?;
    Some(Money::new(
        minor_units,
        currency.unwrap_or_else(|| default_currency.to_string()),
    ))
}

/// Normalize a digit/separator string into integer minor units (scale 2).
///
/// With both separators present the rightmost one is decimal. A lone
/// separator is decimal when it is followed by at most two digits and occurs
/// once; otherwise it groups thousands ("1,234" vs "120,50").
fn parse_minor_units(numeric: &str) -> Option<i64> {
    let last_dot = numeric.rfind('.');
    let last_comma = numeric.rfind(',');

    let decimal_sep = match (last_dot, last_comma) {
        (Some(d), Some(c)) => Some(if d > c { '.' } else { ',' }),
        (Some(d), None) => lone_separator_is_decimal(numeric, '.', d),
        (None, Some(c)) => lone_separator_is_decimal(numeric, ',', c),
        (None, None) => None,
    };

    let (int_part, frac_part): (String, String) = match decimal_sep {
        Some(sep) => {
            let pos = numeric.rfind(sep)?;
            let int: String = numeric[..pos].chars().filter(char::is_ascii_digit).collect();
            let frac: String = numeric[pos + 1..]
                .chars()
                .filter(char::is_ascii_digit)
                .collect();
            (int, frac)
        }
        None => (
            numeric.chars().filter(char::is_ascii_digit).collect(),
            String::new(),
        ),
    };

    let whole: i64 = if int_part.is_empty() {
        0
    } else {
        int_part.parse().ok()?
    };
    let cents: i64 = match frac_part.len() {
        0 => 0,
        1 => frac_part.parse::<i64>().ok()? * 10,
        _ => frac_part[..2].parse().ok()?,
    };
    // Checked: an absurdly long digit run from a drifted selector is an
    // unparsable price, not a wrapped-around one.
    whole.checked_mul(100)?.checked_add(cents)
}

fn lone_separator_is_decimal(numeric: &str, sep: char, last_pos: usize) -> Option<char> {
    let occurrences = numeric.matches(sep).count();
    let digits_after = numeric.len() - last_pos - 1;
    if occurrences == 1 && digits_after <= 2 {
        Some(sep)
    } else {
        None // thousands grouping; strip it
    }
}

/// Total minutes from a rendered duration (`"2 hr 20 min"`, `"2h 20m"`,
/// `"45 min"`). `None` when no hour/minute component can be read.
pub fn parse_duration_minutes(raw: &str) -> Option<u32> {
    let mut total: u32 = 0;
    let mut seen = false;
    let mut pending: Option<u32> = None;

    for token in raw.split_whitespace() {
        let digits: String = token.chars().take_while(|c| c.is_ascii_digit()).collect();
        let unit = token[digits.len()..].trim_start_matches(|c: char| !c.is_ascii_alphabetic());
        let unit = unit.to_ascii_lowercase();
        if !digits.is_empty() {
            let value: u32 = digits.parse().ok()?;
            if unit.starts_with('h') {
                total = total.checked_add(value.checked_mul(60)?)?;
                seen = true;
            } else if unit.starts_with('m') {
                total = total.checked_add(value)?;
                seen = true;
            } else {
                pending = Some(value);
            }
        } else if let Some(value) = pending.take() {
            if unit.starts_with('h') {
                total = total.checked_add(value.checked_mul(60)?)?;
                seen = true;
            } else if unit.starts_with('m') {
                total = total.checked_add(value)?;
                seen = true;
            }
        }
    }

    if seen {
        Some(total)
    } else {
        None
    }
}

/// `"Nonstop"`/`"Direct"` → 0, otherwise the leading integer of "N stops".
pub fn parse_stops(raw: &str) -> Option<u32> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let lower = raw.to_lowercase();
    if lower.contains("nonstop") || lower.contains("non-stop") || lower.contains("direct") {
        return Some(0);
    }
    let digits: String = raw.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// Pull ISO date tokens out of a travel-dates string
/// (`"2026-03-02/2026-03-06"`, `"2026-03-02 – 2026-03-06"`, or a single date).
pub fn parse_date_range(raw: &str) -> Option<(NaiveDate, Option<NaiveDate>)> {
    let mut dates = raw
        .split(|c: char| !(c.is_ascii_digit() || c == '-'))
        .filter_map(|token| token.parse::<NaiveDate>().ok());
    let departure = dates.next()?;
    Some((departure, dates.next()))
}

/// Dates the anchored query implies when an entry renders none of its own.
fn anchor_dates(spec: &SearchSpec) -> (NaiveDate, Option<NaiveDate>) {
    let departure = spec.earliest_departure;
    let ret = if spec.max_stay_days == 0 {
        None
    } else {
        departure.checked_add_days(chrono::Days::new(spec.min_stay_days as u64))
    };
    (departure, ret)
}

fn within_window(spec: &SearchSpec, departure: NaiveDate, ret: Option<NaiveDate>) -> bool {
    if departure < spec.earliest_departure || departure > spec.latest_return {
        return false;
    }
    if let Some(ret) = ret {
        if ret > spec.latest_return {
            return false;
        }
        let stay = (ret - departure).num_days();
        if stay < spec.min_stay_days as i64 || stay > spec.max_stay_days as i64 {
            return false;
        }
    }
    true
}

/// Parse the rendered result list into deduplicated, window-validated
/// observations.
///
/// An empty result list is a valid empty batch (no flights found); a
/// non-empty list yielding zero observations is `ExtractionIntegrity`.
pub fn parse_results(
    html: &str,
    spec: &SearchSpec,
    config: &EngineConfig,
    observed_at: DateTime<Utc>,
) -> Result<Vec<FlightObservation>, ExtractError> {
    let document = Html::parse_document(html);
    let items = elements::RESULT_ITEM.select_all(&document);
    if items.is_empty() {
        debug!(search = %spec.label(), "result list empty");
        return Ok(Vec::new());
    }

    let mut seen = HashSet::new();
    let mut observations = Vec::new();
    let mut skipped = 0usize;
    let mut out_of_window = 0usize;
    let mut duplicates = 0usize;

    for item in &items {
        let Some(price) = elements::PRICE
            .first_text(item)
            .and_then(|t| parse_price(&t, &config.default_currency))
        else {
            skipped += 1;
            continue;
        };

        let rendered_dates = elements::TRAVEL_DATES
            .first_attr(item, "data-travel-dates")
            .or_else(|| elements::TRAVEL_DATES.first_text(item))
            .and_then(|t| parse_date_range(&t));
        let (departure_date, return_date) = match rendered_dates {
            Some(pair) => pair,
            // The query is date-anchored, so an entry with no rendered dates
            // belongs to the anchor pair.
            None => anchor_dates(spec),
        };

        if !within_window(spec, departure_date, return_date) {
            out_of_window += 1;
            continue;
        }

        let carrier = elements::CARRIER
            .first_text(item)
            .unwrap_or_else(|| "unknown".to_string());
        let stops = elements::STOPS
            .first_text(item)
            .and_then(|t| parse_stops(&t))
            .unwrap_or(0);
        let duration = elements::DURATION.first_text(item);

        let raw_fingerprint =
            FlightObservation::fingerprint(&carrier, departure_date, return_date, &price);
        if !seen.insert(raw_fingerprint.clone()) {
            duplicates += 1;
            continue;
        }

        observations.push(FlightObservation {
            search_id: spec.id.clone(),
            observed_at,
            departure_date,
            return_date,
            price,
            carrier,
            stops,
            duration,
            raw_fingerprint,
        });
    }

    if observations.is_empty() {
        return Err(ExtractError::ExtractionIntegrity {
            entries: items.len(),
        });
    }

    // Per-search preference filters run after integrity is established:
    // filtering everything away is a valid empty batch, not a parse failure.
    let before_filters = observations.len();
    if let Some(max_stops) = spec.max_stops {
        observations.retain(|o| o.stops <= max_stops);
    }
    if let Some(max_minutes) = spec.max_duration_minutes {
        observations.retain(|o| {
            o.duration
                .as_deref()
                .and_then(parse_duration_minutes)
                .is_some_and(|minutes| minutes <= max_minutes)
        });
    }
    let filtered = before_filters - observations.len();
    if let Some(top_n) = spec.top_n {
        observations.truncate(top_n);
    }

    info!(
        search = %spec.label(),
        kept = observations.len(),
        skipped,
        out_of_window,
        duplicates,
        filtered,
        "extraction complete"
    );
    Ok(observations)
}

/// Snapshot the live page and parse it.
pub async fn extract<P: PageDriver + ?Sized>(
    page: &P,
    spec: &SearchSpec,
    config: &EngineConfig,
) -> Result<Vec<FlightObservation>, ExtractError> {
    let html = page.html().await?;
    parse_results(&html, spec, config, Utc::now())
}
