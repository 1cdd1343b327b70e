//! End-to-end orchestration scenarios against a scripted browser session.
//!
//! The real engine sits entirely behind the `PageDriver` / `SessionProvider`
//! seams, so these tests drive the orchestrator exactly as the CLI does, with
//! page behavior (overlays, result timing, expansion) scripted per search.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use farewatch::core::DriveError;
use farewatch::{
    CancelToken, EngineConfig, ExtractError, ExtractionOutcome, FailureKind, Money, Orchestrator,
    PageDriver, SearchSpec, SessionProvider,
};

// Selectors the engine actually probes, mirrored from the locator table.
const RESULT_LIST_SEL: &str = "ul.Rk10dc";
const CONSENT_DETECT_SEL: &str = "#consent-dialog";
const CONSENT_DISMISS_SEL: &str = "button[aria-label='Reject all']";
const EXPAND_SEL: &str = "li.ZVk93d";

#[derive(Clone, Copy, PartialEq)]
enum ConsentMode {
    Absent,
    DismissableOnFirstLoad,
    AlwaysStuck,
}

#[derive(Clone)]
struct PageScript {
    consent: ConsentMode,
    /// Results container appears from this goto count onward (1 = first load).
    results_from_goto: u32,
    results_html: String,
    /// HTML appended once when the expand control is clicked.
    expand_appends: Option<String>,
}

impl PageScript {
    fn plain(results_html: String) -> Self {
        Self {
            consent: ConsentMode::Absent,
            results_from_goto: 1,
            results_html,
            expand_appends: None,
        }
    }
}

struct PageState {
    gotos: u32,
    consent_present: bool,
    expanded: bool,
    dismiss_clicks: u32,
}

struct MockPage {
    script: PageScript,
    state: Mutex<PageState>,
}

impl MockPage {
    fn new(script: PageScript) -> Self {
        Self {
            script,
            state: Mutex::new(PageState {
                gotos: 0,
                consent_present: false,
                expanded: false,
                dismiss_clicks: 0,
            }),
        }
    }
}

#[async_trait]
impl PageDriver for MockPage {
    async fn goto(&self, _url: &str) -> Result<(), DriveError> {
        let mut state = self.state.lock().unwrap();
        state.gotos += 1;
        state.consent_present = match self.script.consent {
            ConsentMode::Absent => false,
            ConsentMode::DismissableOnFirstLoad => state.gotos == 1,
            ConsentMode::AlwaysStuck => true,
        };
        Ok(())
    }

    async fn wait_for(&self, selector: &str, _t: Duration) -> Result<bool, DriveError> {
        let state = self.state.lock().unwrap();
        Ok(match selector {
            RESULT_LIST_SEL => state.gotos >= self.script.results_from_goto,
            CONSENT_DETECT_SEL | CONSENT_DISMISS_SEL => state.consent_present,
            EXPAND_SEL => self.script.expand_appends.is_some() && !state.expanded,
            _ => false,
        })
    }

    async fn click(&self, selector: &str) -> Result<bool, DriveError> {
        let mut state = self.state.lock().unwrap();
        match selector {
            CONSENT_DISMISS_SEL if state.consent_present => {
                state.dismiss_clicks += 1;
                if self.script.consent == ConsentMode::DismissableOnFirstLoad {
                    state.consent_present = false;
                }
                Ok(true)
            }
            EXPAND_SEL if self.script.expand_appends.is_some() && !state.expanded => {
                state.expanded = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn press_escape(&self) -> Result<(), DriveError> {
        Ok(())
    }

    async fn html(&self) -> Result<String, DriveError> {
        let state = self.state.lock().unwrap();
        if state.gotos < self.script.results_from_goto {
            return Ok("<html><body></body></html>".to_string());
        }
        let mut entries = self.script.results_html.clone();
        if state.expanded {
            if let Some(extra) = &self.script.expand_appends {
                entries.push_str(extra);
            }
        }
        Ok(format!(
            "<html><body><ul class='Rk10dc'>{}</ul></body></html>",
            entries
        ))
    }

    async fn clear_browsing_state(&self) -> Result<(), DriveError> {
        Ok(())
    }
}

/// Hands out one scripted page per acquire, in order.
struct MockSession {
    scripts: Mutex<VecDeque<PageScript>>,
    fail_acquire: bool,
    acquires: AtomicU32,
    resets: AtomicU32,
    releases: AtomicU32,
}

impl MockSession {
    fn new(scripts: Vec<PageScript>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            fail_acquire: false,
            acquires: AtomicU32::new(0),
            resets: AtomicU32::new(0),
            releases: AtomicU32::new(0),
        }
    }

    fn unstartable() -> Self {
        Self {
            scripts: Mutex::new(VecDeque::new()),
            fail_acquire: true,
            acquires: AtomicU32::new(0),
            resets: AtomicU32::new(0),
            releases: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl SessionProvider for MockSession {
    type Page = MockPage;

    async fn acquire(&self) -> Result<MockPage, ExtractError> {
        self.acquires.fetch_add(1, Ordering::SeqCst);
        if self.fail_acquire {
            return Err(ExtractError::SessionStart("no browser binary".into()));
        }
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .expect("test scripted fewer pages than searches");
        Ok(MockPage::new(script))
    }

    async fn reset(&self, _page: &MockPage) -> Result<(), ExtractError> {
        self.resets.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn release(&self, _page: MockPage) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

fn entry(carrier: &str, price: &str, dates: &str) -> String {
    format!(
        "<li class='pIav2d'>\
           <span class='sSHqwe'>{carrier}</span>\
           <span class='gvkrdb'>2 hr 20 min</span>\
           <div class='FpEdX'><span>{price}</span></div>\
           <span class='EfT7Ae'>Nonstop</span>\
           <span data-travel-dates='{dates}'></span>\
         </li>"
    )
}

fn vie_lhr() -> SearchSpec {
    SearchSpec {
        id: "vie-lhr".into(),
        origin: "VIE".into(),
        destination: "LHR".into(),
        earliest_departure: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
        latest_return: NaiveDate::from_ymd_opt(2026, 3, 10).unwrap(),
        min_stay_days: 3,
        max_stay_days: 7,
        max_stops: None,
        max_duration_minutes: None,
        top_n: None,
    }
}

fn fast_config() -> EngineConfig {
    EngineConfig {
        results_timeout: Duration::from_millis(50),
        overlay_wait: Duration::from_millis(40),
        overlay_poll: Duration::from_millis(5),
        overlay_detect: Duration::from_millis(5),
        interaction_settle: Duration::from_millis(5),
        max_retries: 2,
        ..EngineConfig::default()
    }
}

#[tokio::test]
async fn clean_page_yields_exact_observation() {
    let sessions = MockSession::new(vec![PageScript::plain(entry(
        "British Airways",
        "€120.50",
        "2026-03-02/2026-03-06",
    ))]);
    let orchestrator = Orchestrator::new(fast_config());

    let outcome = orchestrator
        .run_search(&sessions, &vie_lhr(), &CancelToken::new())
        .await;

    let observations = outcome.observations();
    assert_eq!(observations.len(), 1);
    let obs = &observations[0];
    assert_eq!(obs.search_id, "vie-lhr");
    assert_eq!(obs.carrier, "British Airways");
    assert_eq!(obs.departure_date, NaiveDate::from_ymd_opt(2026, 3, 2).unwrap());
    assert_eq!(obs.return_date, NaiveDate::from_ymd_opt(2026, 3, 6));
    assert_eq!(obs.price, Money::new(12050, "EUR"));
    assert_eq!(obs.stops, 0);
    assert_eq!(sessions.releases.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn dismissable_consent_succeeds_without_retry() {
    let mut script = PageScript::plain(entry("BA", "€120.50", "2026-03-02/2026-03-06"));
    script.consent = ConsentMode::DismissableOnFirstLoad;
    let sessions = MockSession::new(vec![script]);
    let orchestrator = Orchestrator::new(fast_config());

    let outcome = orchestrator
        .run_search(&sessions, &vie_lhr(), &CancelToken::new())
        .await;

    assert!(outcome.is_success());
    assert_eq!(outcome.observations().len(), 1);
    // Dismissal is not a retry: no session reset happened.
    assert_eq!(sessions.resets.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn stuck_consent_fails_search_but_not_the_batch() {
    let mut stuck = PageScript::plain(entry("BA", "€120.50", "2026-03-02/2026-03-06"));
    stuck.consent = ConsentMode::AlwaysStuck;
    let good = PageScript::plain(entry("LH", "€99.00", "2026-03-03/2026-03-07"));
    let sessions = MockSession::new(vec![stuck, good]);
    let orchestrator = Orchestrator::new(fast_config());

    let mut second = vie_lhr();
    second.id = "vie-lhr-2".into();
    let outcomes = orchestrator
        .run_batch(&sessions, &[vie_lhr(), second], &CancelToken::new())
        .await;

    assert_eq!(outcomes.len(), 2);
    match &outcomes[0] {
        ExtractionOutcome::Failure { kind, search_id, .. } => {
            assert_eq!(*kind, FailureKind::BlockingUi);
            assert_eq!(search_id, "vie-lhr");
        }
        other => panic!("expected blocking-ui failure, got {:?}", other),
    }
    // 1 initial attempt + 2 retries, each retry preceded by a session reset.
    assert_eq!(sessions.resets.load(Ordering::SeqCst), 2);
    // The independent second search still ran and succeeded.
    assert!(outcomes[1].is_success());
    assert_eq!(sessions.releases.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn slow_results_recover_on_retry() {
    let mut script = PageScript::plain(entry("BA", "€120.50", "2026-03-02/2026-03-06"));
    // Results only materialize on the second navigation.
    script.results_from_goto = 2;
    let sessions = MockSession::new(vec![script]);
    let orchestrator = Orchestrator::new(fast_config());

    let outcome = orchestrator
        .run_search(&sessions, &vie_lhr(), &CancelToken::new())
        .await;

    assert!(outcome.is_success());
    assert_eq!(sessions.resets.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn results_never_appearing_is_navigation_timeout() {
    let mut script = PageScript::plain(String::new());
    script.results_from_goto = u32::MAX;
    let sessions = MockSession::new(vec![script]);
    let orchestrator = Orchestrator::new(fast_config());

    let outcome = orchestrator
        .run_search(&sessions, &vie_lhr(), &CancelToken::new())
        .await;

    match outcome {
        ExtractionOutcome::Failure { kind, .. } => {
            assert_eq!(kind, FailureKind::NavigationTimeout)
        }
        other => panic!("expected navigation timeout, got {:?}", other),
    }
    assert_eq!(sessions.resets.load(Ordering::SeqCst), 2);
    assert_eq!(sessions.releases.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn expansion_reveals_additional_results() {
    let mut script = PageScript::plain(entry("BA", "€120.50", "2026-03-02/2026-03-06"));
    script.expand_appends = Some(entry("LH", "€135.00", "2026-03-02/2026-03-06"));
    let sessions = MockSession::new(vec![script]);
    let orchestrator = Orchestrator::new(fast_config());

    let outcome = orchestrator
        .run_search(&sessions, &vie_lhr(), &CancelToken::new())
        .await;

    assert_eq!(outcome.observations().len(), 2);
}

#[tokio::test]
async fn empty_result_list_is_valid_empty_success() {
    let sessions = MockSession::new(vec![PageScript::plain(String::new())]);
    let orchestrator = Orchestrator::new(fast_config());

    let outcome = orchestrator
        .run_search(&sessions, &vie_lhr(), &CancelToken::new())
        .await;

    assert!(outcome.is_success());
    assert!(outcome.observations().is_empty());
}

#[tokio::test]
async fn garbage_results_surface_integrity_failure() {
    let sessions = MockSession::new(vec![PageScript::plain(
        entry("BA", "n/a", "2026-03-02/2026-03-06")
            + &entry("LH", "call us", "2026-03-02/2026-03-06"),
    )]);
    let orchestrator = Orchestrator::new(fast_config());

    let outcome = orchestrator
        .run_search(&sessions, &vie_lhr(), &CancelToken::new())
        .await;

    match outcome {
        ExtractionOutcome::Failure { kind, .. } => {
            assert_eq!(kind, FailureKind::ExtractionIntegrity)
        }
        other => panic!("expected integrity failure, got {:?}", other),
    }
    // Integrity failures are not retried.
    assert_eq!(sessions.resets.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unstartable_browser_fails_whole_batch() {
    let sessions = MockSession::unstartable();
    let orchestrator = Orchestrator::new(fast_config());

    let mut second = vie_lhr();
    second.id = "vie-lhr-2".into();
    let outcomes = orchestrator
        .run_batch(&sessions, &[vie_lhr(), second], &CancelToken::new())
        .await;

    assert_eq!(outcomes.len(), 2);
    for outcome in &outcomes {
        match outcome {
            ExtractionOutcome::Failure { kind, .. } => {
                assert_eq!(*kind, FailureKind::SessionStart)
            }
            other => panic!("expected session-start failure, got {:?}", other),
        }
    }
    // Fatal on the first search: the second never tried to acquire.
    assert_eq!(sessions.acquires.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn cancellation_aborts_the_wait_and_releases_the_session() {
    let mut script = PageScript::plain(String::new());
    script.results_from_goto = u32::MAX;
    let sessions = MockSession::new(vec![script]);
    let mut config = fast_config();
    // Long enough that only cancellation can end the wait.
    config.results_timeout = Duration::from_secs(30);
    let orchestrator = Orchestrator::new(config);

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });
    }

    let outcome = orchestrator.run_search(&sessions, &vie_lhr(), &cancel).await;

    match outcome {
        ExtractionOutcome::Failure { kind, .. } => assert_eq!(kind, FailureKind::Cancelled),
        other => panic!("expected cancelled, got {:?}", other),
    }
    assert_eq!(sessions.releases.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn pre_cancelled_run_never_acquires() {
    let sessions = MockSession::new(vec![]);
    let orchestrator = Orchestrator::new(fast_config());
    let cancel = CancelToken::new();
    cancel.cancel();

    let outcome = orchestrator.run_search(&sessions, &vie_lhr(), &cancel).await;

    match outcome {
        ExtractionOutcome::Failure { kind, .. } => assert_eq!(kind, FailureKind::Cancelled),
        other => panic!("expected cancelled, got {:?}", other),
    }
    assert_eq!(sessions.acquires.load(Ordering::SeqCst), 0);
}
