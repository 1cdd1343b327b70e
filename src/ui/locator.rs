//! Locator strategy: logical UI element → ordered fallback selector chain.
//!
//! The target site's markup is third-party and churns without notice, so no
//! single CSS selector is trusted. Each logical element carries a ranked list
//! of selectors (observed stable class first, structural and data-attribute
//! fallbacks after), tried in sequence. Markup drift then degrades one rung
//! down the ladder instead of breaking the extractor outright.

use scraper::{ElementRef, Html, Selector};
use std::time::{Duration, Instant};

use crate::core::DriveError;
use crate::session::PageDriver;

#[derive(Debug, Clone, Copy)]
pub struct Locator {
    pub name: &'static str,
    pub selectors: &'static [&'static str],
}

impl Locator {
    /// Single-pass presence check against the live page.
    pub async fn check<P: PageDriver + ?Sized>(&self, page: &P) -> Result<bool, DriveError> {
        for sel in self.selectors {
            if page.wait_for(sel, Duration::ZERO).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Poll all fallbacks in order until one is present or `timeout` expires.
    pub async fn wait_any<P: PageDriver + ?Sized>(
        &self,
        page: &P,
        timeout: Duration,
        poll: Duration,
    ) -> Result<bool, DriveError> {
        let start = Instant::now();
        loop {
            if self.check(page).await? {
                return Ok(true);
            }
            if start.elapsed() >= timeout {
                return Ok(false);
            }
            tokio::time::sleep(poll).await;
        }
    }

    /// Click the first fallback that matches anything.
    pub async fn click_any<P: PageDriver + ?Sized>(&self, page: &P) -> Result<bool, DriveError> {
        for sel in self.selectors {
            if page.click(sel).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// First non-empty text under `scope`, walking the fallback chain.
    pub fn first_text(&self, scope: &ElementRef<'_>) -> Option<String> {
        for sel in self.selectors {
            let Ok(selector) = Selector::parse(sel) else {
                continue;
            };
            if let Some(el) = scope.select(&selector).next() {
                let text = el.text().collect::<String>().trim().to_string();
                if !text.is_empty() {
                    return Some(text);
                }
            }
        }
        None
    }

    /// First value of `attr` under `scope`, walking the fallback chain.
    pub fn first_attr(&self, scope: &ElementRef<'_>, attr: &str) -> Option<String> {
        for sel in self.selectors {
            let Ok(selector) = Selector::parse(sel) else {
                continue;
            };
            if let Some(el) = scope.select(&selector).next() {
                if let Some(v) = el.value().attr(attr) {
                    let v = v.trim();
                    if !v.is_empty() {
                        return Some(v.to_string());
                    }
                }
            }
        }
        None
    }

    /// All matches for the highest-ranked selector that matches anything.
    ///
    /// Fallbacks are alternatives for the same element, so results from
    /// different rungs are never mixed.
    pub fn select_all<'a>(&self, document: &'a Html) -> Vec<ElementRef<'a>> {
        for sel in self.selectors {
            let Ok(selector) = Selector::parse(sel) else {
                continue;
            };
            let matches: Vec<ElementRef<'a>> = document.select(&selector).collect();
            if !matches.is_empty() {
                return matches;
            }
        }
        Vec::new()
    }
}

/// The logical element table for the flight-search result UI.
///
/// First selector per element is the class observed in the wild; the rest are
/// structural or data-attribute fallbacks for when those classes rotate.
pub mod elements {
    use super::Locator;

    pub const RESULT_LIST: Locator = Locator {
        name: "result-list",
        selectors: &["ul.Rk10dc", "[role='main'] ul[role='list']", "ol.flight-results"],
    };

    pub const RESULT_ITEM: Locator = Locator {
        name: "result-item",
        selectors: &["li.pIav2d", "ul.Rk10dc > li", "li[data-flight]"],
    };

    pub const CARRIER: Locator = Locator {
        name: "carrier",
        selectors: &[".sSHqwe", ".Ir0Voe span", "[data-carrier]"],
    };

    pub const PRICE: Locator = Locator {
        name: "price",
        selectors: &[".FpEdX span", ".YMlIz", "[data-price]"],
    };

    pub const STOPS: Locator = Locator {
        name: "stops",
        selectors: &[".EfT7Ae", ".BbR8Ec .ogfYpf", "[data-stops]"],
    };

    pub const DURATION: Locator = Locator {
        name: "duration",
        selectors: &[".gvkrdb", "[data-duration]"],
    };

    pub const TRAVEL_DATES: Locator = Locator {
        name: "travel-dates",
        selectors: &["[data-travel-dates]", ".mv1WYe"],
    };

    pub const EXPAND_MORE: Locator = Locator {
        name: "expand-more",
        selectors: &["li.ZVk93d", "button[aria-label='View more flights']", "button.show-more"],
    };

    pub const SORT_CHEAPEST: Locator = Locator {
        name: "sort-cheapest",
        selectors: &["#M7sBEb", "button[aria-label='Cheapest']"],
    };

    pub const CONSENT_DIALOG: Locator = Locator {
        name: "consent-dialog",
        selectors: &[
            "div[role='dialog'][aria-modal='true'] form[action*='consent']",
            "div.consent-bump",
            "#consent-dialog",
        ],
    };

    pub const CONSENT_DISMISS: Locator = Locator {
        name: "consent-dismiss",
        selectors: &[
            "button[aria-label='Reject all']",
            "button[aria-label='Alle ablehnen']",
            "#consent-dialog button.reject",
        ],
    };

    pub const PROMO_INTERSTITIAL: Locator = Locator {
        name: "promo-interstitial",
        selectors: &["div.promo-overlay", "div[data-promo-dialog]"],
    };

    pub const PROMO_DISMISS: Locator = Locator {
        name: "promo-dismiss",
        selectors: &[
            "button[aria-label='Got it']",
            "button[aria-label='Verstanden']",
            "div.promo-overlay button.dismiss",
        ],
    };
}
