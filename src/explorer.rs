use log::{error, info, warn};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use crate::cooldown::CooldownTimer;
use crate::db::{keys, Database};
use crate::models::{DisplayItem, Mode};
use crate::quotes_client::FetchError;
use crate::scheduler::{parse_delay, AutoAdvanceScheduler, SchedulerState, ValidationError, MIN_DELAY_SECS};

/// Which modes the manual-refresh cooldown covers. The source history is
/// inconsistent on this, so it is configuration rather than a hard-coded
/// rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownScope {
    AllModes,
    /// Only the rate-limited quote endpoints; the article feed refreshes
    /// freely.
    QuoteModesOnly,
}

impl CooldownScope {
    pub fn covers(&self, mode: Mode) -> bool {
        match self {
            CooldownScope::AllModes => true,
            CooldownScope::QuoteModesOnly => match mode {
                Mode::Random | Mode::DailyPick | Mode::ListAll => true,
                Mode::ArticleFeed => false,
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExplorerConfig {
    pub cooldown_secs: u32,
    pub cooldown_scope: CooldownScope,
    /// Used when no delay preference is stored.
    pub default_delay_secs: u64,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: 30,
            cooldown_scope: CooldownScope::QuoteModesOnly,
            default_delay_secs: 10,
        }
    }
}

/// A side effect for the shell to execute. The controller never touches the
/// OS browser itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    OpenUrl(String),
}

/// A user-visible, non-blocking notification (the destructive fetch-failure
/// banner).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub title: String,
    pub detail: String,
}

/// Owns every piece of mutable session state: the active mode, the current
/// item list, the visited set, the cooldown, and the auto-advance scheduler.
/// Initialization reads the persisted preferences; teardown cancels all
/// timers. The UI shell feeds it events and executes the actions it returns.
pub struct Explorer {
    config: ExplorerConfig,
    store: Arc<Database>,
    mode: Mode,
    items: Vec<DisplayItem>,
    visited: HashSet<String>,
    cooldown: CooldownTimer,
    scheduler: AutoAdvanceScheduler,
    auto_enabled: bool,
    delay_secs: u64,
    notice: Option<Notice>,
}

impl Explorer {
    pub fn new(store: Arc<Database>, config: ExplorerConfig, now: Instant) -> Self {
        let mode = store
            .load_scalar(keys::CURRENT_MODE)
            .map(|s| Mode::from_str_or_default(&s))
            .unwrap_or_default();
        let visited = store.visited_ids(mode);
        let items = store.load_items(mode).unwrap_or_default();
        let auto_enabled = store
            .load_scalar(keys::AUTO_ENABLED)
            .map(|s| s == "true")
            .unwrap_or(false);
        let delay_secs = store
            .load_scalar(keys::AUTO_DELAY)
            .and_then(|s| s.parse::<u64>().ok())
            .map(|d| d.max(MIN_DELAY_SECS))
            .unwrap_or(config.default_delay_secs);

        let mut explorer = Self {
            config,
            store,
            mode,
            items,
            visited,
            cooldown: CooldownTimer::new(),
            scheduler: AutoAdvanceScheduler::new(),
            auto_enabled,
            delay_secs,
            notice: None,
        };

        // Resume a persisted auto-advance run once there is something to
        // step through; with no cached list the first fetch re-arms instead.
        if explorer.auto_enabled && !explorer.items.is_empty() {
            explorer.rearm_auto(now);
        }
        explorer
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn items(&self) -> &[DisplayItem] {
        &self.items
    }

    pub fn is_visited(&self, id: &str) -> bool {
        self.visited.contains(id)
    }

    pub fn visited_count(&self) -> usize {
        self.visited.len()
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    pub fn dismiss_notice(&mut self) {
        self.notice = None;
    }

    pub fn cooldown_remaining(&self) -> u32 {
        self.cooldown.remaining()
    }

    pub fn auto_enabled(&self) -> bool {
        self.auto_enabled
    }

    pub fn delay_secs(&self) -> u64 {
        self.delay_secs
    }

    pub fn scheduler_state(&self) -> &SchedulerState {
        self.scheduler.state()
    }

    /// True while any countdown could change the display, so the shell keeps
    /// repainting.
    pub fn timers_active(&self) -> bool {
        self.cooldown.is_active() || self.scheduler.is_armed()
    }

    /// A manual click on a card: mark it visited (flushed to the store
    /// before returning, and idempotent on repeats) and hand back the link
    /// to open.
    pub fn handle_click(&mut self, id: &str) -> Option<Action> {
        let url = self
            .items
            .iter()
            .find(|item| item.id == id)?
            .action_url();
        self.mark_visited(id);
        Some(Action::OpenUrl(url))
    }

    fn mark_visited(&mut self, id: &str) {
        if self.visited.insert(id.to_string()) {
            if let Err(e) = self.store.mark_visited(self.mode, id) {
                error!("could not persist visited id: {}", e);
            }
        }
    }

    /// A fetch for `mode` finished successfully. Results for a mode that is
    /// no longer active are dropped (the worker outlived a mode switch).
    pub fn apply_fetch_success(&mut self, mode: Mode, items: Vec<DisplayItem>, now: Instant) {
        if mode != self.mode {
            info!("dropping stale fetch result for {}", mode.as_str());
            return;
        }

        self.items = items;
        self.notice = None;
        if let Err(e) = self.store.save_items(mode, &self.items) {
            warn!("could not cache item list: {}", e);
        }
        if let Err(e) = self.store.save_scalar(keys::CURRENT_MODE, mode.as_str()) {
            warn!("could not persist mode: {}", e);
        }

        if self.config.cooldown_scope.covers(mode) {
            self.cooldown.start(self.config.cooldown_secs, now);
        }
        if self.auto_enabled {
            self.rearm_auto(now);
        }
    }

    /// A fetch failed: show the destructive notice and clear the grid rather
    /// than leaving stale data displayed ambiguously. No cooldown is started.
    pub fn apply_fetch_failure(&mut self, mode: Mode, err: &FetchError) {
        if mode != self.mode {
            return;
        }
        self.items.clear();
        self.scheduler.cancel();
        self.notice = Some(Notice {
            title: "Could not fetch items.".to_string(),
            detail: err.to_string(),
        });
    }

    pub fn can_regenerate(&self) -> bool {
        !self.cooldown.is_active()
    }

    /// Prepare a forced refresh: clear the active mode's visited set and
    /// cached list. Returns false (a no-op) while the cooldown is active;
    /// the caller then issues the cache-bypassing fetch.
    pub fn begin_regenerate(&mut self) -> bool {
        if self.cooldown.is_active() {
            return false;
        }
        self.scheduler.cancel();
        self.visited.clear();
        if let Err(e) = self.store.clear_visited(self.mode) {
            warn!("could not clear visited set: {}", e);
        }
        if let Err(e) = self.store.clear_items(self.mode) {
            warn!("could not clear cached items: {}", e);
        }
        true
    }

    /// Switch the active mode: cancel both timers synchronously, then load
    /// exactly the new mode's persisted visited set and cached list. Visited
    /// ids never carry over between modes.
    pub fn switch_mode(&mut self, mode: Mode, now: Instant) {
        if mode == self.mode {
            return;
        }
        self.scheduler.cancel();
        self.cooldown.cancel();
        self.mode = mode;
        self.visited = self.store.visited_ids(mode);
        self.items = self.store.load_items(mode).unwrap_or_default();
        self.notice = None;
        if let Err(e) = self.store.save_scalar(keys::CURRENT_MODE, mode.as_str()) {
            warn!("could not persist mode: {}", e);
        }
        if self.auto_enabled && !self.items.is_empty() {
            self.rearm_auto(now);
        }
    }

    /// Strictly validate the raw delay input and start an auto-advance run.
    /// Invalid input arms nothing and is reported inline.
    pub fn start_auto_advance(&mut self, raw_delay: &str, now: Instant) -> Result<(), ValidationError> {
        let delay = parse_delay(raw_delay)?;
        self.commit_delay(delay);
        self.auto_enabled = true;
        self.persist_auto_enabled();
        self.rearm_auto(now);
        Ok(())
    }

    /// Stop auto-advance: the pending deadline is dropped in the same tick,
    /// so it can never fire afterwards.
    pub fn disable_auto_advance(&mut self) {
        self.auto_enabled = false;
        self.persist_auto_enabled();
        self.scheduler.cancel();
    }

    /// Commit a new delay preference. Committing clamps to the minimum; an
    /// already-armed deadline keeps the delay it was armed with.
    pub fn commit_delay(&mut self, secs: u64) -> u64 {
        self.delay_secs = secs.max(MIN_DELAY_SECS);
        if let Err(e) = self
            .store
            .save_scalar(keys::AUTO_DELAY, &self.delay_secs.to_string())
        {
            warn!("could not persist delay: {}", e);
        }
        self.delay_secs
    }

    fn persist_auto_enabled(&self) {
        let value = if self.auto_enabled { "true" } else { "false" };
        if let Err(e) = self.store.save_scalar(keys::AUTO_ENABLED, value) {
            warn!("could not persist auto-advance flag: {}", e);
        }
    }

    fn rearm_auto(&mut self, now: Instant) {
        match self
            .scheduler
            .arm(&self.items, &self.visited, self.delay_secs, now)
        {
            Ok(()) => {
                if self.scheduler.is_exhausted() {
                    self.finish_exhausted();
                }
            }
            Err(e) => {
                // Stored delays are clamped, so this only fires on a
                // corrupted preference; treat it as not running.
                warn!("could not arm auto-advance: {}", e);
                self.disable_auto_advance();
            }
        }
    }

    fn finish_exhausted(&mut self) {
        info!("auto-advance exhausted: every item is visited");
        self.auto_enabled = false;
        self.persist_auto_enabled();
    }

    /// Frame-loop tick: advance the cooldown, and when the auto-advance
    /// deadline has passed, open the target, mark it visited (persisted),
    /// and re-arm or exhaust.
    pub fn tick(&mut self, now: Instant) -> Vec<Action> {
        self.cooldown.tick(now);

        let mut actions = Vec::new();
        if let Some(target_id) = self.scheduler.poll(now) {
            let target_url = self
                .items
                .iter()
                .find(|item| item.id == target_id)
                .map(|item| item.action_url());
            match target_url {
                Some(url) => {
                    self.mark_visited(&target_id);
                    actions.push(Action::OpenUrl(url));
                }
                None => {
                    // The list was replaced under the timer; just move on.
                    warn!("auto-advance target disappeared from the list");
                }
            }
            self.scheduler.reevaluate(&self.items, &self.visited, now);
            if self.scheduler.is_exhausted() {
                self.finish_exhausted();
            }
        }
        actions
    }

    /// Cancel every pending timer. Called when the shell shuts down.
    pub fn teardown(&mut self) {
        self.scheduler.cancel();
        self.cooldown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn new_explorer() -> (Explorer, Arc<Database>, Instant) {
        let store = Arc::new(Database::open_in_memory().unwrap());
        let now = Instant::now();
        let explorer = Explorer::new(Arc::clone(&store), ExplorerConfig::default(), now);
        (explorer, store, now)
    }

    fn quotes(texts: &[&str]) -> Vec<DisplayItem> {
        texts.iter().map(|t| DisplayItem::quote(*t, "")).collect()
    }

    #[test]
    fn clicks_are_idempotent_and_flushed_to_the_store() {
        let (mut explorer, store, now) = new_explorer();
        explorer.apply_fetch_success(Mode::ListAll, quotes(&["A", "B", "C"]), now);

        assert!(matches!(
            explorer.handle_click("A"),
            Some(Action::OpenUrl(_))
        ));
        explorer.handle_click("B");
        explorer.handle_click("A");
        explorer.handle_click("A");

        assert_eq!(explorer.visited_count(), 2);
        assert_eq!(store.visited_ids(Mode::ListAll).len(), 2);
        // Unknown ids are ignored.
        assert_eq!(explorer.handle_click("nope"), None);
    }

    #[test]
    fn quote_clicks_open_a_search_link() {
        let (mut explorer, _store, now) = new_explorer();
        explorer.apply_fetch_success(Mode::ListAll, quotes(&["hello world"]), now);

        let Some(Action::OpenUrl(url)) = explorer.handle_click("hello world") else {
            panic!("expected an open action");
        };
        assert!(url.contains("bing.com/search"));
        assert!(url.contains("hello%20world"));
    }

    #[test]
    fn mode_switch_loads_exactly_the_persisted_set() {
        let (mut explorer, store, now) = new_explorer();
        explorer.apply_fetch_success(Mode::ListAll, quotes(&["A", "B"]), now);
        explorer.handle_click("A");

        // Pre-seed the other mode's persisted state.
        store.mark_visited(Mode::Random, "R1").unwrap();
        store
            .save_items(Mode::Random, &quotes(&["R1", "R2"]))
            .unwrap();

        explorer.switch_mode(Mode::Random, now);
        assert_eq!(explorer.mode(), Mode::Random);
        assert_eq!(explorer.visited_count(), 1);
        assert!(explorer.is_visited("R1"));
        assert!(!explorer.is_visited("A"));
        assert_eq!(explorer.items().len(), 2);

        // And back: the first mode's set is intact, nothing carried over.
        explorer.switch_mode(Mode::ListAll, now);
        assert!(explorer.is_visited("A"));
        assert!(!explorer.is_visited("R1"));
    }

    #[test]
    fn mode_switch_cancels_pending_timers() {
        let (mut explorer, _store, now) = new_explorer();
        explorer.apply_fetch_success(Mode::ListAll, quotes(&["A"]), now);
        explorer.start_auto_advance("5", now).unwrap();
        assert!(matches!(
            explorer.scheduler_state(),
            SchedulerState::Armed { .. }
        ));

        explorer.switch_mode(Mode::ArticleFeed, now);
        assert_eq!(*explorer.scheduler_state(), SchedulerState::Idle);
        assert!(!explorer.timers_active());
        // The old deadline never fires.
        assert!(explorer.tick(now + Duration::from_secs(60)).is_empty());
        assert_eq!(explorer.visited_count(), 0);
    }

    #[test]
    fn invalid_delay_input_arms_nothing() {
        let (mut explorer, _store, now) = new_explorer();
        explorer.apply_fetch_success(Mode::ListAll, quotes(&["A"]), now);

        assert_eq!(
            explorer.start_auto_advance("abc", now),
            Err(ValidationError::NotANumber)
        );
        assert_eq!(
            explorer.start_auto_advance("4", now),
            Err(ValidationError::BelowMinimum(5))
        );
        assert!(!explorer.auto_enabled());
        assert_eq!(*explorer.scheduler_state(), SchedulerState::Idle);
    }

    #[test]
    fn committing_a_delay_clamps_to_the_minimum() {
        let (mut explorer, store, _now) = new_explorer();
        assert_eq!(explorer.commit_delay(2), 5);
        assert_eq!(store.load_scalar(keys::AUTO_DELAY).as_deref(), Some("5"));
        assert_eq!(explorer.commit_delay(45), 45);
    }

    #[test]
    fn auto_advance_visits_every_item_then_disables_itself() {
        let (mut explorer, store, t0) = new_explorer();
        explorer.switch_mode(Mode::DailyPick, t0);
        explorer.apply_fetch_success(Mode::DailyPick, quotes(&["A", "B"]), t0);
        explorer.start_auto_advance("5", t0).unwrap();

        // Nothing before the deadline.
        assert!(explorer.tick(t0 + Duration::from_secs(4)).is_empty());

        let first = explorer.tick(t0 + Duration::from_secs(5));
        assert_eq!(first.len(), 1);
        assert!(explorer.is_visited("A"));
        assert!(!explorer.is_visited("B"));
        assert!(store.visited_ids(Mode::DailyPick).contains("A"));

        let second = explorer.tick(t0 + Duration::from_secs(10));
        assert_eq!(second.len(), 1);
        assert!(explorer.is_visited("B"));

        // Exhausted: disabled itself, persisted flag cleared, no more fires.
        assert!(explorer.scheduler_state() == &SchedulerState::Exhausted);
        assert!(!explorer.auto_enabled());
        assert_eq!(store.load_scalar(keys::AUTO_ENABLED).as_deref(), Some("false"));
        assert!(explorer.tick(t0 + Duration::from_secs(60)).is_empty());
    }

    #[test]
    fn auto_advance_skips_already_visited_items() {
        let (mut explorer, _store, t0) = new_explorer();
        explorer.apply_fetch_success(Mode::ListAll, quotes(&["A", "B"]), t0);
        explorer.handle_click("A");
        explorer.start_auto_advance("5", t0).unwrap();

        let actions = explorer.tick(t0 + Duration::from_secs(5));
        assert_eq!(actions.len(), 1);
        let Action::OpenUrl(url) = &actions[0];
        assert!(url.contains('B'));
        assert_eq!(explorer.visited_count(), 2);
    }

    #[test]
    fn starting_with_everything_visited_exhausts_immediately() {
        let (mut explorer, _store, t0) = new_explorer();
        explorer.apply_fetch_success(Mode::ListAll, quotes(&["A"]), t0);
        explorer.handle_click("A");

        explorer.start_auto_advance("5", t0).unwrap();
        assert!(explorer.scheduler_state() == &SchedulerState::Exhausted);
        assert!(!explorer.auto_enabled());
    }

    #[test]
    fn disabling_cancels_the_pending_deadline() {
        let (mut explorer, _store, t0) = new_explorer();
        explorer.apply_fetch_success(Mode::ListAll, quotes(&["A"]), t0);
        explorer.start_auto_advance("5", t0).unwrap();

        explorer.disable_auto_advance();
        assert!(explorer.tick(t0 + Duration::from_secs(30)).is_empty());
        assert_eq!(explorer.visited_count(), 0);
    }

    #[test]
    fn regenerate_is_a_noop_while_cooldown_is_active() {
        let (mut explorer, _store, t0) = new_explorer();
        // A successful fetch for a cooldown-covered mode starts the countdown.
        explorer.apply_fetch_success(Mode::ListAll, quotes(&["A"]), t0);
        assert!(!explorer.can_regenerate());
        assert!(!explorer.begin_regenerate());

        // Still blocked mid-countdown.
        explorer.tick(t0 + Duration::from_secs(10));
        assert!(!explorer.begin_regenerate());

        // Free once it reaches zero.
        explorer.tick(t0 + Duration::from_secs(30));
        assert!(explorer.can_regenerate());
        assert!(explorer.begin_regenerate());
    }

    #[test]
    fn regenerate_clears_visited_state_and_cached_list() {
        let (mut explorer, store, t0) = new_explorer();
        explorer.switch_mode(Mode::ArticleFeed, t0);
        let articles = vec![
            DisplayItem::article("1", "One", "https://example.com/1"),
            DisplayItem::article("2", "Two", "https://example.com/2"),
        ];
        explorer.apply_fetch_success(Mode::ArticleFeed, articles, t0);
        explorer.handle_click("1");
        assert_eq!(store.visited_ids(Mode::ArticleFeed).len(), 1);

        // The article feed is outside the default cooldown scope, so
        // regenerate is allowed right away.
        assert!(explorer.begin_regenerate());
        assert_eq!(explorer.visited_count(), 0);
        assert!(store.visited_ids(Mode::ArticleFeed).is_empty());
        assert!(store.load_items(Mode::ArticleFeed).is_none());
    }

    #[test]
    fn cooldown_scope_excludes_the_article_feed_by_default() {
        let (mut explorer, _store, t0) = new_explorer();
        explorer.switch_mode(Mode::ArticleFeed, t0);
        explorer.apply_fetch_success(
            Mode::ArticleFeed,
            vec![DisplayItem::article("1", "One", "https://example.com/1")],
            t0,
        );
        assert!(explorer.can_regenerate());

        let all_modes = ExplorerConfig {
            cooldown_scope: CooldownScope::AllModes,
            ..ExplorerConfig::default()
        };
        let store = Arc::new(Database::open_in_memory().unwrap());
        let mut strict = Explorer::new(Arc::clone(&store), all_modes, t0);
        strict.switch_mode(Mode::ArticleFeed, t0);
        strict.apply_fetch_success(
            Mode::ArticleFeed,
            vec![DisplayItem::article("1", "One", "https://example.com/1")],
            t0,
        );
        assert!(!strict.can_regenerate());
    }

    #[test]
    fn fetch_failure_empties_the_grid_and_raises_a_notice() {
        let (mut explorer, _store, t0) = new_explorer();
        explorer.apply_fetch_success(Mode::ListAll, quotes(&["A"]), t0);

        let err = FetchError::Status {
            status: 500,
            message: Some("upstream broke".to_string()),
        };
        explorer.apply_fetch_failure(Mode::ListAll, &err);

        assert!(explorer.items().is_empty());
        let notice = explorer.notice().expect("a destructive notice");
        assert!(notice.detail.contains("upstream broke"));

        explorer.dismiss_notice();
        assert!(explorer.notice().is_none());
    }

    #[test]
    fn stale_fetch_results_are_dropped() {
        let (mut explorer, _store, t0) = new_explorer();
        explorer.switch_mode(Mode::Random, t0);
        // A worker for the previous mode reports late.
        explorer.apply_fetch_success(Mode::ListAll, quotes(&["old"]), t0);
        assert!(explorer.items().is_empty());

        let err = FetchError::Status {
            status: 404,
            message: None,
        };
        explorer.apply_fetch_failure(Mode::ListAll, &err);
        assert!(explorer.notice().is_none());
    }

    #[test]
    fn persisted_state_survives_a_restart() {
        let store = Arc::new(Database::open_in_memory().unwrap());
        let t0 = Instant::now();
        {
            let mut explorer =
                Explorer::new(Arc::clone(&store), ExplorerConfig::default(), t0);
            explorer.switch_mode(Mode::DailyPick, t0);
            explorer.apply_fetch_success(Mode::DailyPick, quotes(&["A", "B"]), t0);
            explorer.handle_click("A");
            explorer.commit_delay(15);
            explorer.teardown();
        }

        let explorer = Explorer::new(Arc::clone(&store), ExplorerConfig::default(), t0);
        assert_eq!(explorer.mode(), Mode::DailyPick);
        assert_eq!(explorer.items().len(), 2);
        assert!(explorer.is_visited("A"));
        assert_eq!(explorer.delay_secs(), 15);
    }

    #[test]
    fn persisted_auto_advance_resumes_with_cached_items() {
        let store = Arc::new(Database::open_in_memory().unwrap());
        let t0 = Instant::now();
        store.save_scalar(keys::AUTO_ENABLED, "true").unwrap();
        store.save_scalar(keys::AUTO_DELAY, "5").unwrap();
        store.save_items(Mode::ListAll, &quotes(&["A"])).unwrap();

        let mut explorer = Explorer::new(Arc::clone(&store), ExplorerConfig::default(), t0);
        assert!(explorer.auto_enabled());
        assert!(matches!(
            explorer.scheduler_state(),
            SchedulerState::Armed { .. }
        ));

        let actions = explorer.tick(t0 + Duration::from_secs(5));
        assert_eq!(actions.len(), 1);
        assert!(explorer.is_visited("A"));
    }

    #[test]
    fn corrupt_preferences_fall_back_to_defaults() {
        let store = Arc::new(Database::open_in_memory().unwrap());
        store.save_scalar(keys::CURRENT_MODE, "???").unwrap();
        store.save_scalar(keys::AUTO_DELAY, "soon").unwrap();
        store.save_scalar(keys::AUTO_ENABLED, "maybe").unwrap();

        let explorer = Explorer::new(store, ExplorerConfig::default(), Instant::now());
        assert_eq!(explorer.mode(), Mode::ListAll);
        assert_eq!(explorer.delay_secs(), 10);
        assert!(!explorer.auto_enabled());
    }
}
