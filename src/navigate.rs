//! Search navigation: query construction, result wait, result-set expansion.

use chrono::Days;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use tracing::{debug, info};

use crate::core::{EngineConfig, ExtractError, SearchSpec};
use crate::session::PageDriver;
use crate::ui::{elements, overlays};

const QUERY_ENCODE: &AsciiSet = &CONTROLS.add(b' ').add(b'&').add(b'#').add(b'?');

/// Build the natural-language flight query URL for a search.
///
/// The date window is anchored on `earliest_departure`; for stay-window
/// searches the return leg is anchored on `earliest_departure + min_stay_days`
/// so the first rendered result page already sits inside the valid window.
/// `max_stay_days == 0` means a one-way search.
pub fn build_query_url(spec: &SearchSpec) -> String {
    let departure = spec.earliest_departure;
    let query = if spec.max_stay_days == 0 {
        format!(
            "Flights to {} from {} on {} oneway",
            spec.destination, spec.origin, departure
        )
    } else {
        let return_anchor = departure
            .checked_add_days(Days::new(spec.min_stay_days as u64))
            .unwrap_or(spec.latest_return);
        format!(
            "Flights to {} from {} on {} return {}",
            spec.destination, spec.origin, departure, return_anchor
        )
    };
    format!(
        "https://www.google.com/travel/flights?q={}",
        utf8_percent_encode(&query, QUERY_ENCODE)
    )
}

/// Drive the page to the query, clear blockers, wait for results, expand.
///
/// The overlay resolver runs after the navigation *and* after every in-page
/// interaction — overlays reappear after clicks on this site.
pub async fn navigate<P: PageDriver + ?Sized>(
    page: &P,
    spec: &SearchSpec,
    config: &EngineConfig,
) -> Result<(), ExtractError> {
    let url = build_query_url(spec);
    info!(search = %spec.label(), %url, "loading search");
    page.goto(&url).await?;

    overlays::resolve(page, config).await?;

    let present = elements::RESULT_LIST
        .wait_any(page, config.results_timeout, config.overlay_poll)
        .await?;
    if !present {
        return Err(ExtractError::NavigationTimeout {
            timeout: config.results_timeout,
        });
    }

    if config.sort_cheapest {
        if elements::SORT_CHEAPEST.click_any(page).await? {
            debug!(search = %spec.label(), "sorted by cheapest");
            tokio::time::sleep(config.interaction_settle).await;
            overlays::resolve(page, config).await?;
        }
    }

    // Expansion is capped: long-haul routes can render hundreds of
    // itineraries and worst-case run time must stay bounded.
    for round in 0..config.max_expansions {
        if !elements::EXPAND_MORE.click_any(page).await? {
            debug!(search = %spec.label(), rounds = round, "no further expansion");
            break;
        }
        tokio::time::sleep(config.interaction_settle).await;
        overlays::resolve(page, config).await?;
    }

    Ok(())
}
