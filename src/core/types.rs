use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One configured route / date-window to track.
///
/// Produced by the external configuration loader (`searches.json`); immutable
/// for the lifetime of a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchSpec {
    /// Stable identifier linking observations back to this search.
    pub id: String,
    /// Airport code or city name, e.g. `VIE` or `Vienna`.
    pub origin: String,
    /// Airport code or city name, e.g. `LHR` or `London`.
    pub destination: String,
    pub earliest_departure: NaiveDate,
    pub latest_return: NaiveDate,
    #[serde(default)]
    pub min_stay_days: u32,
    #[serde(default)]
    pub max_stay_days: u32,
    /// Drop itineraries with more than this many stops.
    #[serde(default)]
    pub max_stops: Option<u32>,
    /// Drop itineraries longer than this many minutes; itineraries whose
    /// rendered duration cannot be read are dropped too when this is set.
    #[serde(default)]
    pub max_duration_minutes: Option<u32>,
    /// Keep only the first N observations after filtering (site order, i.e.
    /// cheapest-first when the sort toggle is on).
    #[serde(default)]
    pub top_n: Option<usize>,
}

impl SearchSpec {
    /// Reject windows that can never contain a valid observation.
    pub fn validate(&self) -> Result<(), String> {
        if self.earliest_departure > self.latest_return {
            return Err(format!(
                "search '{}': earliest_departure {} is after latest_return {}",
                self.id, self.earliest_departure, self.latest_return
            ));
        }
        if self.max_stay_days < self.min_stay_days {
            return Err(format!(
                "search '{}': max_stay_days {} < min_stay_days {}",
                self.id, self.max_stay_days, self.min_stay_days
            ));
        }
        Ok(())
    }

    /// Short human-readable route label for log lines, e.g. `VIE->LHR`.
    pub fn label(&self) -> String {
        format!("{}->{}", self.origin, self.destination)
    }
}

/// Price as integer minor units plus ISO currency code.
///
/// Avoids float rounding in stored amounts; `120.50 EUR` is
/// `{ minor_units: 12050, currency: "EUR" }`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Money {
    pub minor_units: i64,
    pub currency: String,
}

impl Money {
    pub fn new(minor_units: i64, currency: impl Into<String>) -> Self {
        Self {
            minor_units,
            currency: currency.into(),
        }
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{:02} {}",
            self.minor_units / 100,
            (self.minor_units % 100).abs(),
            self.currency
        )
    }
}

/// One parsed price data point for a route on a given date pair.
///
/// Immutable once emitted; ownership passes to the caller (persistence is an
/// external collaborator).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FlightObservation {
    pub search_id: String,
    pub observed_at: DateTime<Utc>,
    pub departure_date: NaiveDate,
    #[serde(default)]
    pub return_date: Option<NaiveDate>,
    pub price: Money,
    pub carrier: String,
    pub stops: u32,
    /// Flight duration as rendered by the site, when present (e.g. `2 hr 20 min`).
    #[serde(default)]
    pub duration: Option<String>,
    /// Dedup key within a single extraction batch.
    pub raw_fingerprint: String,
}

impl FlightObservation {
    /// Derive the dedup key from the identifying fields.
    pub fn fingerprint(
        carrier: &str,
        departure_date: NaiveDate,
        return_date: Option<NaiveDate>,
        price: &Money,
    ) -> String {
        let ret = return_date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string());
        format!(
            "{}|{}|{}|{}{}",
            carrier.trim().to_lowercase(),
            departure_date,
            ret,
            price.minor_units,
            price.currency
        )
    }
}

/// Failure classification surfaced to the caller, one per failed search.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Browser binary could not be launched. Fatal for the whole run.
    SessionStart,
    /// Result container never appeared within its bounded wait. Retryable.
    NavigationTimeout,
    /// A critical overlay could not be dismissed. Retryable.
    BlockingUi,
    /// Non-empty result list yielded zero parsable observations.
    ExtractionIntegrity,
    /// Run-level cancellation aborted the search mid-flight.
    Cancelled,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FailureKind::SessionStart => "session_start",
            FailureKind::NavigationTimeout => "navigation_timeout",
            FailureKind::BlockingUi => "blocking_ui",
            FailureKind::ExtractionIntegrity => "extraction_integrity",
            FailureKind::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Terminal result of one orchestrated search run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExtractionOutcome {
    Success {
        observations: Vec<FlightObservation>,
    },
    Failure {
        kind: FailureKind,
        message: String,
        search_id: String,
    },
}

impl ExtractionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ExtractionOutcome::Success { .. })
    }

    pub fn observations(&self) -> &[FlightObservation] {
        match self {
            ExtractionOutcome::Success { observations } => observations,
            ExtractionOutcome::Failure { .. } => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn money_display_renders_minor_units() {
        assert_eq!(Money::new(12050, "EUR").to_string(), "120.50 EUR");
        assert_eq!(Money::new(9, "USD").to_string(), "0.09 USD");
    }

    #[test]
    fn fingerprint_is_case_insensitive_on_carrier() {
        let price = Money::new(12050, "EUR");
        let a = FlightObservation::fingerprint("Lufthansa", d("2026-03-02"), None, &price);
        let b = FlightObservation::fingerprint("lufthansa ", d("2026-03-02"), None, &price);
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_distinguishes_return_legs() {
        let price = Money::new(12050, "EUR");
        let one_way = FlightObservation::fingerprint("BA", d("2026-03-02"), None, &price);
        let round =
            FlightObservation::fingerprint("BA", d("2026-03-02"), Some(d("2026-03-06")), &price);
        assert_ne!(one_way, round);
    }

    #[test]
    fn spec_validation_rejects_inverted_windows() {
        let mut spec = SearchSpec {
            id: "s1".into(),
            origin: "VIE".into(),
            destination: "LHR".into(),
            earliest_departure: d("2026-03-10"),
            latest_return: d("2026-03-01"),
            min_stay_days: 3,
            max_stay_days: 7,
            max_stops: None,
            max_duration_minutes: None,
            top_n: None,
        };
        assert!(spec.validate().is_err());
        spec.earliest_departure = d("2026-03-01");
        spec.latest_return = d("2026-03-10");
        assert!(spec.validate().is_ok());
        spec.max_stay_days = 2;
        assert!(spec.validate().is_err());
    }
}
