//! Render state machine over a shared browser endpoint.
//!
//! Each render is a bounded loop through three phases: `Normal` opens a fresh
//! session and tries the page, `Backoff` sleeps before the next try, and
//! `Restarting` runs the restart routine. Every failure class has its own
//! attempt budget (see [`RenderPolicy`]); when one runs out the render fails
//! with `Error::RenderExhausted`. A dial failure drops the shared endpoint so
//! the next attempt connects again.
//!
//! Shared state (`started`, `restarting`, `remote`, `last_restart`) lives in one
//! mutex that is only held for check-and-flip updates. While `restarting` is
//! set, new attempts poll a bounded number of times and then fail with
//! `Error::NotResponding`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use prerender_core::Error;
use tokio::time::{Instant, sleep, timeout};
use url::Url;

use super::{Allocator, BrowsingSession, Launcher, ManagedProcess, RenderFailure, RenderPolicy, Renderer};

#[derive(Debug, Default)]
struct RendererState {
    started: bool,
    restarting: bool,
    remote: bool,
    last_restart: Option<Instant>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Normal,
    Backoff(Duration),
    Restarting,
}

/// Failed attempts of one render, per failure class.
#[derive(Debug, Default)]
struct Attempts {
    dial: u32,
    dial_streak: u32,
    restarts: u32,
    reinit: u32,
    timeouts: u32,
    other: u32,
}

/// Browser renderer with retry, backoff and endpoint restart.
pub struct BrowserRenderer {
    policy: RenderPolicy,
    launcher: Arc<dyn Launcher>,
    process: Option<Arc<dyn ManagedProcess>>,
    state: Mutex<RendererState>,
    allocator: RwLock<Option<Arc<dyn Allocator>>>,
    init: tokio::sync::Mutex<()>,
}

impl BrowserRenderer {
    /// Create a renderer. The endpoint is resolved on the first render.
    ///
    /// `process` is only restarted while the endpoint resolved to a remote
    /// browser.
    pub fn new(policy: RenderPolicy, launcher: Arc<dyn Launcher>, process: Option<Arc<dyn ManagedProcess>>) -> Self {
        Self {
            policy,
            launcher,
            process,
            state: Mutex::new(RendererState::default()),
            allocator: RwLock::new(None),
            init: tokio::sync::Mutex::new(()),
        }
    }

    fn state(&self) -> MutexGuard<'_, RendererState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn policy(&self) -> &RenderPolicy {
        &self.policy
    }

    pub fn is_restarting(&self) -> bool {
        self.state().restarting
    }

    pub fn is_started(&self) -> bool {
        self.state().started
    }

    /// Whether the current endpoint is a remote browser.
    pub fn is_remote(&self) -> bool {
        self.state().remote
    }

    /// Drop the endpoint; the next render resolves it again.
    pub fn shutdown(&self) {
        self.mark_not_started();
    }

    fn mark_not_started(&self) {
        self.state().started = false;
        self.allocator.write().unwrap_or_else(PoisonError::into_inner).take();
    }

    /// Drop `failed` if it is still the shared endpoint, so the next attempt
    /// connects again instead of reusing a dead browser handle.
    fn discard(&self, failed: &Arc<dyn Allocator>) {
        let dropped = {
            let mut allocator = self.allocator.write().unwrap_or_else(PoisonError::into_inner);
            let same = allocator
                .as_ref()
                .is_some_and(|current| std::ptr::addr_eq(Arc::as_ptr(current), Arc::as_ptr(failed)));
            same && allocator.take().is_some()
        };
        if dropped {
            self.state().started = false;
            tracing::debug!("dropped unreachable browser endpoint");
        }
    }

    fn current_allocator(&self) -> Option<Arc<dyn Allocator>> {
        if !self.state().started {
            return None;
        }
        self.allocator.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    async fn allocator(&self) -> Result<Arc<dyn Allocator>, RenderFailure> {
        if let Some(allocator) = self.current_allocator() {
            return Ok(allocator);
        }

        let _init = self.init.lock().await;
        if let Some(allocator) = self.current_allocator() {
            return Ok(allocator);
        }
        self.initialize().await
    }

    /// Endpoint resolution. Callers hold `init`.
    async fn initialize(&self) -> Result<Arc<dyn Allocator>, RenderFailure> {
        let endpoint = self.launcher.launch().await?;

        *self.allocator.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&endpoint.allocator));
        {
            let mut state = self.state();
            state.started = true;
            state.remote = endpoint.remote;
        }

        tracing::info!(remote = endpoint.remote, "browser endpoint initialized");
        Ok(endpoint.allocator)
    }

    async fn wait_while_restarting(&self) -> Result<(), Error> {
        let mut polls = 0;
        while self.is_restarting() {
            if polls >= self.policy.restart_wait_attempts {
                tracing::error!(polls, "browser endpoint still restarting, giving up");
                return Err(Error::NotResponding);
            }
            polls += 1;
            tracing::warn!(poll = polls, "browser endpoint is restarting, waiting");
            sleep(self.policy.restart_poll_interval).await;
        }
        Ok(())
    }

    /// Restart routine: cycle the managed process unless the cooldown is
    /// active, then resolve the endpoint again.
    ///
    /// Returns immediately if another task is already restarting.
    async fn restart(&self) {
        {
            let mut state = self.state();
            if state.restarting {
                tracing::debug!("restart already in flight");
                return;
            }
            state.restarting = true;
        }
        let _restarting = RestartFlag { renderer: self };

        let (remote, cooling) = {
            let state = self.state();
            let cooling = state
                .last_restart
                .is_some_and(|at| at.elapsed() < self.policy.restart_cooldown);
            (state.remote, cooling)
        };

        match self.process.as_deref() {
            Some(process) if remote && cooling => {
                tracing::warn!(
                    container = process.name(),
                    cooldown_secs = self.policy.restart_cooldown.as_secs(),
                    "restart cooldown active, skipping restart command"
                );
                sleep(self.policy.cooldown_pause).await;
            }
            Some(process) if remote => {
                self.state().last_restart = Some(Instant::now());
                tracing::info!(container = process.name(), "restarting browser container");
                match process.restart().await {
                    Ok(()) => self.await_healthy(process).await,
                    Err(e) => tracing::error!(container = process.name(), error = %e, "browser container restart failed"),
                }
            }
            _ => tracing::info!(remote, "no managed browser process, reinitializing endpoint only"),
        }

        let _init = self.init.lock().await;
        self.mark_not_started();
        if let Err(failure) = self.initialize().await {
            tracing::warn!(error = %failure, "browser endpoint reinitialization failed");
        }
    }

    /// Boot check of the managed process. A process that is not up is
    /// restarted once, and that restart starts the cooldown like any other.
    pub async fn prepare(&self) {
        let Some(process) = self.process.as_deref() else {
            return;
        };
        if process.is_healthy().await {
            tracing::info!(container = process.name(), "browser container is up");
            return;
        }

        tracing::warn!(container = process.name(), "browser container is not running, restarting");
        self.state().last_restart = Some(Instant::now());
        match process.restart().await {
            Ok(()) => self.await_healthy(process).await,
            Err(e) => tracing::error!(container = process.name(), error = %e, "browser container restart failed"),
        }
    }

    async fn await_healthy(&self, process: &dyn ManagedProcess) {
        for check in 1..=self.policy.health_checks {
            if process.is_healthy().await {
                tracing::info!(container = process.name(), "browser container is up");
                return;
            }
            tracing::debug!(container = process.name(), check, "browser container not up yet");
            sleep(self.policy.dial_backoff).await;
        }
        tracing::warn!(container = process.name(), "browser container not reporting healthy, continuing");
    }

    /// One session: open, render, close.
    async fn attempt(&self, allocator: Arc<dyn Allocator>, url: &Url) -> Result<String, RenderFailure> {
        let mut guard = SessionGuard(Some(allocator.new_session().await?));

        let result = match guard.session() {
            Some(session) => self.drive(session, url).await,
            None => Err(RenderFailure::Other("session closed before use".into())),
        };

        guard.close().await;
        result
    }

    async fn drive(&self, session: &mut dyn BrowsingSession, url: &Url) -> Result<String, RenderFailure> {
        if !self.policy.blocked_urls.is_empty() {
            session.block_urls(&self.policy.blocked_urls).await?;
        }
        if !self.policy.headers.is_empty() {
            session.set_headers(&self.policy.headers).await?;
        }

        let mut stale = 0;
        loop {
            session.navigate(url).await?;
            sleep(self.policy.settle_delay).await;

            match session.outer_html().await {
                Ok(html) => return Ok(html),
                Err(RenderFailure::NodeNotFound(msg)) if stale < self.policy.node_retries => {
                    stale += 1;
                    tracing::debug!(url = %url, attempt = stale, error = %msg, "stale document node, extracting again");
                }
                Err(failure) => return Err(failure),
            }
        }
    }

    /// Pick the next phase after a failed attempt, or `None` once the budget
    /// of the failure's class is spent.
    fn next_phase(&self, failure: &RenderFailure, attempts: &mut Attempts) -> Option<Phase> {
        let policy = &self.policy;

        if !matches!(failure, RenderFailure::Dial(_)) {
            attempts.dial_streak = 0;
        }

        match failure {
            RenderFailure::Dial(_) => {
                attempts.dial += 1;
                attempts.dial_streak += 1;
                if attempts.dial >= policy.dial_attempts {
                    return None;
                }
                if attempts.dial_streak >= policy.dial_restart_threshold
                    && attempts.restarts < policy.max_restarts
                    && !self.is_restarting()
                {
                    Some(Phase::Restarting)
                } else {
                    Some(Phase::Backoff(policy.dial_backoff))
                }
            }
            RenderFailure::ExecutableMissing(_) => {
                attempts.reinit += 1;
                if attempts.reinit > policy.reinit_attempts {
                    return None;
                }
                self.mark_not_started();
                Some(Phase::Normal)
            }
            RenderFailure::DeadlineExceeded | RenderFailure::Canceled(_) => {
                attempts.timeouts += 1;
                if attempts.timeouts >= policy.timeout_attempts {
                    return None;
                }
                Some(Phase::Backoff(policy.timeout_backoff))
            }
            RenderFailure::NodeNotFound(_) | RenderFailure::Other(_) => {
                attempts.other += 1;
                if attempts.other >= policy.other_attempts {
                    return None;
                }
                Some(Phase::Backoff(policy.other_backoff))
            }
        }
    }
}

#[async_trait::async_trait]
impl Renderer for BrowserRenderer {
    async fn render(&self, url: &Url) -> Result<String, Error> {
        let start = Instant::now();
        let mut attempts = Attempts::default();
        let mut phase = Phase::Normal;

        loop {
            match phase {
                Phase::Normal => {}
                Phase::Backoff(delay) => sleep(delay).await,
                Phase::Restarting => {
                    attempts.restarts += 1;
                    tracing::warn!(url = %url, dial_failures = attempts.dial_streak, "restarting browser endpoint");
                    self.restart().await;
                    attempts.dial_streak = 0;
                }
            }

            self.wait_while_restarting().await?;

            let failure = match self.allocator().await {
                Ok(allocator) => match timeout(self.policy.session_timeout, self.attempt(Arc::clone(&allocator), url)).await {
                    Ok(Ok(html)) => {
                        tracing::debug!(url = %url, elapsed_ms = start.elapsed().as_millis() as u64, "render finished");
                        return Ok(html);
                    }
                    Ok(Err(failure @ RenderFailure::Dial(_))) => {
                        self.discard(&allocator);
                        failure
                    }
                    Ok(Err(failure)) => failure,
                    Err(_) => RenderFailure::DeadlineExceeded,
                },
                Err(failure) => failure,
            };

            tracing::warn!(url = %url, class = failure.class(), error = %failure, "render attempt failed");

            phase = match self.next_phase(&failure, &mut attempts) {
                Some(next) => next,
                None => {
                    tracing::error!(url = %url, class = failure.class(), "render retries exhausted");
                    return Err(Error::RenderExhausted(format!("{url}: {failure}")));
                }
            };
        }
    }
}

/// Clears `restarting` when the restart routine ends, even if it is dropped.
struct RestartFlag<'a> {
    renderer: &'a BrowserRenderer,
}

impl Drop for RestartFlag<'_> {
    fn drop(&mut self) {
        self.renderer.state().restarting = false;
    }
}

/// Closes its session when dropped, so a canceled render still releases the
/// browser tab.
struct SessionGuard(Option<Box<dyn BrowsingSession>>);

impl SessionGuard {
    fn session(&mut self) -> Option<&mut (dyn BrowsingSession + 'static)> {
        self.0.as_deref_mut()
    }

    async fn close(&mut self) {
        if let Some(session) = self.0.take() {
            session.close().await;
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if let Some(session) = self.0.take()
            && let Ok(handle) = tokio::runtime::Handle::try_current()
        {
            tracing::debug!("closing abandoned browsing session");
            handle.spawn(session.close());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{Endpoint, ProcessError};
    use std::collections::{BTreeMap, VecDeque};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Debug, Clone)]
    enum Step {
        Html(&'static str),
        Stale,
        Hang,
        Fail(RenderFailure),
    }

    type Script = Result<Vec<Step>, RenderFailure>;

    #[derive(Default)]
    struct FakeAllocator {
        script: Mutex<VecDeque<Script>>,
        opened: AtomicUsize,
        closed: Arc<AtomicUsize>,
        navigations: Arc<AtomicUsize>,
        blocked: Arc<Mutex<Vec<String>>>,
        headers: Arc<Mutex<BTreeMap<String, String>>>,
    }

    impl FakeAllocator {
        fn push(&self, scripts: Vec<Script>) {
            self.script.lock().unwrap().extend(scripts);
        }

        fn opened(&self) -> usize {
            self.opened.load(Ordering::SeqCst)
        }

        fn closed(&self) -> usize {
            self.closed.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl Allocator for FakeAllocator {
        async fn new_session(&self) -> Result<Box<dyn BrowsingSession>, RenderFailure> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(Ok(steps)) => Ok(Box::new(FakeSession {
                    steps: steps.into(),
                    closed: Arc::clone(&self.closed),
                    navigations: Arc::clone(&self.navigations),
                    blocked: Arc::clone(&self.blocked),
                    headers: Arc::clone(&self.headers),
                })),
                Some(Err(failure)) => Err(failure),
                None => Err(RenderFailure::Other("script exhausted".into())),
            }
        }
    }

    struct FakeSession {
        steps: VecDeque<Step>,
        closed: Arc<AtomicUsize>,
        navigations: Arc<AtomicUsize>,
        blocked: Arc<Mutex<Vec<String>>>,
        headers: Arc<Mutex<BTreeMap<String, String>>>,
    }

    #[async_trait::async_trait]
    impl BrowsingSession for FakeSession {
        async fn block_urls(&mut self, patterns: &[String]) -> Result<(), RenderFailure> {
            *self.blocked.lock().unwrap() = patterns.to_vec();
            Ok(())
        }

        async fn set_headers(&mut self, headers: &BTreeMap<String, String>) -> Result<(), RenderFailure> {
            *self.headers.lock().unwrap() = headers.clone();
            Ok(())
        }

        async fn navigate(&mut self, _url: &Url) -> Result<(), RenderFailure> {
            self.navigations.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn outer_html(&mut self) -> Result<String, RenderFailure> {
            match self.steps.pop_front() {
                Some(Step::Html(html)) => Ok(html.to_string()),
                Some(Step::Stale) => Err(RenderFailure::NodeNotFound("Could not find node with given id".into())),
                Some(Step::Hang) => std::future::pending().await,
                Some(Step::Fail(failure)) => Err(failure),
                None => Err(RenderFailure::Other("no more steps".into())),
            }
        }

        async fn close(self: Box<Self>) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct FakeLauncher {
        allocator: Arc<FakeAllocator>,
        remote: bool,
        launches: AtomicUsize,
        failures: Mutex<VecDeque<RenderFailure>>,
    }

    impl FakeLauncher {
        fn launches(&self) -> usize {
            self.launches.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl Launcher for FakeLauncher {
        async fn launch(&self) -> Result<Endpoint, RenderFailure> {
            self.launches.fetch_add(1, Ordering::SeqCst);
            if let Some(failure) = self.failures.lock().unwrap().pop_front() {
                return Err(failure);
            }
            let allocator: Arc<dyn Allocator> = self.allocator.clone();
            Ok(Endpoint { allocator, remote: self.remote })
        }
    }

    #[derive(Default)]
    struct FakeProcess {
        restarts: AtomicUsize,
        fail: AtomicBool,
        down: AtomicBool,
    }

    impl FakeProcess {
        fn restarts(&self) -> usize {
            self.restarts.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl ManagedProcess for FakeProcess {
        fn name(&self) -> &str {
            "headless-shell"
        }

        async fn restart(&self) -> Result<(), ProcessError> {
            self.restarts.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(ProcessError::Unconfirmed { name: "headless-shell".into(), output: String::new() });
            }
            self.down.store(false, Ordering::SeqCst);
            Ok(())
        }

        async fn is_healthy(&self) -> bool {
            !self.down.load(Ordering::SeqCst)
        }
    }

    struct Harness {
        renderer: Arc<BrowserRenderer>,
        launcher: Arc<FakeLauncher>,
        allocator: Arc<FakeAllocator>,
        process: Arc<FakeProcess>,
    }

    fn harness(scripts: Vec<Script>, remote: bool) -> Harness {
        let allocator = Arc::new(FakeAllocator::default());
        allocator.push(scripts);
        let launcher = Arc::new(FakeLauncher {
            allocator: Arc::clone(&allocator),
            remote,
            launches: AtomicUsize::new(0),
            failures: Mutex::new(VecDeque::new()),
        });
        let process = Arc::new(FakeProcess::default());
        let policy = RenderPolicy {
            blocked_urls: vec!["google-analytics.com".into()],
            headers: BTreeMap::from([("X-Prerender-Next".to_string(), "1".to_string())]),
            ..RenderPolicy::default()
        };
        let managed: Arc<dyn ManagedProcess> = process.clone();
        let renderer = Arc::new(BrowserRenderer::new(policy, launcher.clone(), Some(managed)));
        Harness { renderer, launcher, allocator, process }
    }

    fn page() -> Url {
        Url::parse("http://x.test/a").unwrap()
    }

    fn dial() -> Script {
        Err(RenderFailure::Dial("could not dial ws://127.0.0.1:9222".into()))
    }

    fn html(body: &'static str) -> Script {
        Ok(vec![Step::Html(body)])
    }

    #[tokio::test(start_paused = true)]
    async fn test_render_success_closes_session() {
        let h = harness(vec![html("<html>ok</html>")], true);

        let result = h.renderer.render(&page()).await.unwrap();

        assert_eq!(result, "<html>ok</html>");
        assert_eq!(h.allocator.opened(), 1);
        assert_eq!(h.allocator.closed(), 1);
        assert_eq!(h.launcher.launches(), 1);
        assert!(h.renderer.is_started());
        assert!(h.renderer.is_remote());
        assert_eq!(*h.allocator.blocked.lock().unwrap(), vec!["google-analytics.com".to_string()]);
        assert_eq!(h.allocator.headers.lock().unwrap().get("X-Prerender-Next").map(String::as_str), Some("1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_node_retried_in_same_session() {
        let h = harness(vec![Ok(vec![Step::Stale, Step::Stale, Step::Html("<html>fresh</html>")])], true);

        let result = h.renderer.render(&page()).await.unwrap();

        assert_eq!(result, "<html>fresh</html>");
        assert_eq!(h.allocator.opened(), 1);
        assert_eq!(h.allocator.navigations.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_node_budget_falls_back_to_new_session() {
        let h = harness(
            vec![Ok(vec![Step::Stale, Step::Stale, Step::Stale, Step::Stale]), html("<html>ok</html>")],
            true,
        );

        let result = h.renderer.render(&page()).await.unwrap();

        assert_eq!(result, "<html>ok</html>");
        assert_eq!(h.allocator.opened(), 2);
        assert_eq!(h.allocator.closed(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dial_failures_trigger_one_restart() {
        let h = harness(vec![dial(), dial(), dial(), html("<html>ok</html>")], true);

        let result = h.renderer.render(&page()).await.unwrap();

        assert_eq!(result, "<html>ok</html>");
        assert_eq!(h.process.restarts(), 1);
        // two reconnects after dial failures, one after the restart
        assert_eq!(h.launcher.launches(), 4);
        assert!(!h.renderer.is_restarting());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dead_endpoint_is_reconnected() {
        let h = harness(vec![dial(), html("<html>ok</html>")], true);

        let result = h.renderer.render(&page()).await.unwrap();

        assert_eq!(result, "<html>ok</html>");
        assert_eq!(h.launcher.launches(), 2);
        assert_eq!(h.allocator.opened(), 2);
        assert_eq!(h.process.restarts(), 0);
        assert!(h.renderer.is_started());
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_failure_breaks_dial_streak() {
        let other = || Err(RenderFailure::Other("net::ERR_ABORTED".into()));
        let h = harness(vec![dial(), dial(), other(), dial(), dial(), html("<html>ok</html>")], true);

        let result = h.renderer.render(&page()).await.unwrap();

        assert_eq!(result, "<html>ok</html>");
        assert_eq!(h.process.restarts(), 0);
        assert_eq!(h.allocator.opened(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_boot_restart_starts_cooldown() {
        let h = harness(vec![dial(), dial(), dial(), html("<html>ok</html>")], true);
        h.process.down.store(true, Ordering::SeqCst);

        h.renderer.prepare().await;
        assert_eq!(h.process.restarts(), 1);
        assert!(h.process.is_healthy().await);

        tokio::time::advance(Duration::from_secs(60)).await;
        let result = h.renderer.render(&page()).await.unwrap();

        assert_eq!(result, "<html>ok</html>");
        assert_eq!(h.process.restarts(), 1);
        assert_eq!(h.launcher.launches(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_prepare_leaves_running_process_alone() {
        let h = harness(vec![], true);

        h.renderer.prepare().await;

        assert_eq!(h.process.restarts(), 0);
        assert_eq!(h.launcher.launches(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_local_endpoint_reinitializes_without_restart_command() {
        let h = harness(vec![dial(), dial(), dial(), html("<html>ok</html>")], false);

        h.renderer.render(&page()).await.unwrap();

        assert_eq!(h.process.restarts(), 0);
        assert_eq!(h.launcher.launches(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_cooldown_limits_restart_commands() {
        let h = harness(
            vec![dial(), dial(), dial(), html("<html>1</html>"), dial(), dial(), dial(), html("<html>2</html>")],
            true,
        );

        assert_eq!(h.renderer.render(&page()).await.unwrap(), "<html>1</html>");
        assert_eq!(h.renderer.render(&page()).await.unwrap(), "<html>2</html>");

        assert_eq!(h.process.restarts(), 1);
        assert_eq!(h.launcher.launches(), 7);

        tokio::time::advance(Duration::from_secs(181)).await;
        h.allocator.push(vec![dial(), dial(), dial(), html("<html>3</html>")]);

        assert_eq!(h.renderer.render(&page()).await.unwrap(), "<html>3</html>");
        assert_eq!(h.process.restarts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_restart_command_still_reinitializes() {
        let h = harness(vec![dial(), dial(), dial(), html("<html>ok</html>")], true);
        h.process.fail.store(true, Ordering::SeqCst);

        let result = h.renderer.render(&page()).await.unwrap();

        assert_eq!(result, "<html>ok</html>");
        assert_eq!(h.process.restarts(), 1);
        assert_eq!(h.launcher.launches(), 4);
        assert!(!h.renderer.is_restarting());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dial_budget_exhausted() {
        let h = harness((0..20).map(|_| dial()).collect(), true);

        let result = h.renderer.render(&page()).await;

        assert!(matches!(result, Err(Error::RenderExhausted(_))));
        assert_eq!(h.allocator.opened(), 9);
        assert_eq!(h.process.restarts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_retries_with_fresh_session() {
        let h = harness(vec![Ok(vec![Step::Hang]), html("<html>ok</html>")], true);

        let result = h.renderer.render(&page()).await.unwrap();
        sleep(Duration::from_millis(1)).await;

        assert_eq!(result, "<html>ok</html>");
        assert_eq!(h.allocator.opened(), 2);
        assert_eq!(h.allocator.closed(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_budget_exhausted() {
        let h = harness((0..10).map(|_| Ok(vec![Step::Hang])).collect(), true);

        let result = h.renderer.render(&page()).await;

        assert!(matches!(result, Err(Error::RenderExhausted(msg)) if msg.contains("deadline")));
        assert_eq!(h.allocator.opened(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_failures_exhausted() {
        let failing = || Ok(vec![Step::Fail(RenderFailure::Other("net::ERR_NAME_NOT_RESOLVED".into()))]);
        let h = harness((0..10).map(|_| failing()).collect(), true);

        let result = h.renderer.render(&page()).await;

        assert!(matches!(result, Err(Error::RenderExhausted(msg)) if msg.contains("ERR_NAME_NOT_RESOLVED")));
        assert_eq!(h.allocator.opened(), 4);
        assert_eq!(h.allocator.closed(), 4);
        assert_eq!(h.process.restarts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_executable_reinitializes_endpoint() {
        let h = harness(
            vec![Err(RenderFailure::ExecutableMissing("google-chrome".into())), html("<html>ok</html>")],
            false,
        );

        let result = h.renderer.render(&page()).await.unwrap();

        assert_eq!(result, "<html>ok</html>");
        assert_eq!(h.launcher.launches(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_launch_failures_exhaust_reinit_budget() {
        let h = harness(vec![html("<html>never</html>")], false);
        h.launcher.failures.lock().unwrap().extend(
            (0..5).map(|_| RenderFailure::ExecutableMissing("Could not auto detect a chrome executable".into())),
        );

        let result = h.renderer.render(&page()).await;

        assert!(matches!(result, Err(Error::RenderExhausted(_))));
        assert_eq!(h.launcher.launches(), 3);
        assert_eq!(h.allocator.opened(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_responding_while_restart_stuck() {
        let h = harness(vec![html("<html>ok</html>")], true);
        h.renderer.state().restarting = true;

        let result = h.renderer.render(&page()).await;

        assert!(matches!(result, Err(Error::NotResponding)));
        assert_eq!(h.launcher.launches(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_restart_to_finish() {
        let h = harness(vec![html("<html>ok</html>")], true);
        h.renderer.state().restarting = true;

        let renderer = Arc::clone(&h.renderer);
        tokio::spawn(async move {
            sleep(Duration::from_secs(7)).await;
            renderer.state().restarting = false;
        });

        let result = h.renderer.render(&page()).await.unwrap();
        assert_eq!(result, "<html>ok</html>");
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_skipped_when_already_in_flight() {
        let h = harness(vec![], true);
        h.renderer.state().remote = true;
        h.renderer.state().restarting = true;

        h.renderer.restart().await;

        assert_eq!(h.process.restarts(), 0);
        assert_eq!(h.launcher.launches(), 0);
        assert!(h.renderer.is_restarting());
    }

    #[tokio::test(start_paused = true)]
    async fn test_caller_cancel_releases_session() {
        let h = harness(vec![Ok(vec![Step::Hang])], true);

        let renderer = Arc::clone(&h.renderer);
        let task = tokio::spawn(async move { renderer.render(&page()).await });
        sleep(Duration::from_millis(500)).await;
        assert_eq!(h.allocator.opened(), 1);

        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());
        sleep(Duration::from_millis(1)).await;

        assert_eq!(h.allocator.closed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_forces_new_resolution() {
        let h = harness(vec![html("<html>1</html>"), html("<html>2</html>")], true);

        h.renderer.render(&page()).await.unwrap();
        h.renderer.shutdown();
        assert!(!h.renderer.is_started());
        h.renderer.render(&page()).await.unwrap();

        assert_eq!(h.launcher.launches(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_renders_share_one_endpoint() {
        let h = harness((0..8).map(|_| html("<html>ok</html>")).collect(), true);

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let renderer = Arc::clone(&h.renderer);
            tasks.push(tokio::spawn(async move { renderer.render(&page()).await }));
        }
        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap(), "<html>ok</html>");
        }

        assert_eq!(h.launcher.launches(), 1);
        assert_eq!(h.allocator.opened(), 8);
        assert_eq!(h.allocator.closed(), 8);
    }
}
