//! Transient overlay handling.
//!
//! The target UI throws consent dialogs and promotional interstitials at
//! unpredictable points, including after in-page interactions. Each known
//! overlay kind is a rule processed through the same protocol: detect →
//! attempt dismiss → bounded wait. Absence is the steady state and never an
//! error; only an undismissable *critical* overlay fails the step.

use std::time::Instant;
use tracing::{debug, warn};

use super::locator::{elements, Locator};
use crate::core::{EngineConfig, ExtractError};
use crate::session::PageDriver;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayKind {
    Consent,
    Promo,
}

impl OverlayKind {
    pub fn name(&self) -> &'static str {
        match self {
            OverlayKind::Consent => "consent",
            OverlayKind::Promo => "promo",
        }
    }
}

struct OverlayRule {
    kind: OverlayKind,
    detect: Locator,
    dismiss: Locator,
    /// Send Escape before clicking; some promos trap focus without exposing
    /// a stable close button.
    escape_first: bool,
    /// Critical overlays block all interaction; failing to clear one is a
    /// retryable error instead of a shrug.
    critical: bool,
}

/// Priority order matters: consent blocks everything and is handled first.
const KNOWN_OVERLAYS: &[OverlayRule] = &[
    OverlayRule {
        kind: OverlayKind::Consent,
        detect: elements::CONSENT_DIALOG,
        dismiss: elements::CONSENT_DISMISS,
        escape_first: false,
        critical: true,
    },
    OverlayRule {
        kind: OverlayKind::Promo,
        detect: elements::PROMO_INTERSTITIAL,
        dismiss: elements::PROMO_DISMISS,
        escape_first: true,
        critical: false,
    },
];

/// Detect and dismiss known overlays in priority order.
///
/// Idempotent: with no overlay present this reduces to a handful of cheap
/// presence probes. Called after every navigation *and* after every in-page
/// interaction, since overlays can reappear mid-search.
pub async fn resolve<P: PageDriver + ?Sized>(
    page: &P,
    config: &EngineConfig,
) -> Result<(), ExtractError> {
    for rule in KNOWN_OVERLAYS {
        let present = rule
            .detect
            .wait_any(page, config.overlay_detect, config.overlay_poll)
            .await?;
        if !present {
            continue;
        }

        debug!(overlay = rule.kind.name(), "overlay detected, dismissing");
        if rule.escape_first {
            page.press_escape().await?;
        }

        let deadline = Instant::now() + config.overlay_wait;
        let dismissed = loop {
            let _ = rule.dismiss.click_any(page).await?;
            if !rule.detect.check(page).await? {
                break true;
            }
            if Instant::now() >= deadline {
                break false;
            }
            tokio::time::sleep(config.overlay_poll).await;
        };

        if dismissed {
            debug!(overlay = rule.kind.name(), "overlay cleared");
        } else if rule.critical {
            return Err(ExtractError::BlockingUi {
                overlay: rule.kind.name(),
                waited: config.overlay_wait,
            });
        } else {
            warn!(
                overlay = rule.kind.name(),
                "overlay not dismissed within wait, continuing"
            );
        }
    }
    Ok(())
}
