//! vscope request simulator
//!
//! Replays a seeded mix of requests against one shared application scope
//! and session registry. Worker tasks each own a `ContextManager` and serve
//! requests one after another, so anything a request leaves behind would
//! surface in the next request on that worker.
//!
//! Invariants checked per request:
//! - No request-scoped data survives into the next request
//! - Conversation writes are visible in the request bag
//! - Teardown leaves only the application scope active
//! - Session counters add up once every request has been served

use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use vscope_context::conversation::CONVERSATION_KEY_PREFIX;
use vscope_context::prelude::*;
use vscope_interceptor::{
    markers, AcceptsValidator, AcceptsWithMarkers, ControllerInstance, ControllerMethod,
    WithMarkerAcceptor,
};
use vscope_validator::{ErrorList, Message};

/// Handler marker: the handler runs inside a conversation
#[derive(Debug)]
pub struct Conversational;

/// Handler marker: the handler ends the user's session
#[derive(Debug)]
pub struct EndsSession;

const REQUEST_MARKER: &str = "sim.request";
const VISITS_KEY: &str = "sim.visits";
const STEP_KEY: &str = "sim.step";
const APPLICATION_KEY: &str = "sim.seed";

/// Violation categories used in the report
pub mod category {
    /// Request-scoped data seen by a later request
    pub const RESIDUAL: &str = "residual-request-data";
    /// Application attribute not visible through lookup
    pub const APPLICATION: &str = "application-visibility";
    /// Conversation write missing from the request bag
    pub const UNION_VIEW: &str = "union-view";
    /// Live session expected but absent
    pub const SESSION: &str = "session";
    /// Start or stop reported an error
    pub const SCOPE_ERROR: &str = "scope-error";
    /// Scopes still active after teardown
    pub const LEFT_ACTIVE: &str = "scopes-left-active";
    /// Session counters lost updates
    pub const ACCOUNTING: &str = "session-accounting";
    /// Worker task died
    pub const WORKER: &str = "worker";
}

/// Simulator configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Random seed for reproducibility
    pub seed: u64,
    /// Number of user sessions
    pub sessions: usize,
    /// Total requests to serve
    pub requests: u64,
    /// Concurrent workers, each with its own context manager
    pub workers: usize,
    /// One request in `conversation_every` runs in a conversation (0: never)
    pub conversation_every: u32,
    /// One request in `invalidate_every` ends its session (0: never)
    pub invalidate_every: u32,
    /// Stop scheduling requests after the first violation
    pub stop_on_first_violation: bool,
    /// Configuration of every worker's context manager
    pub context: ContextConfig,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            sessions: 8,
            requests: 1000,
            workers: 4,
            conversation_every: 3,
            invalidate_every: 50,
            stop_on_first_violation: false,
            context: ContextConfig::default(),
        }
    }
}

/// Handler a simulated request is routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handler {
    /// Plain session request
    Browse,
    /// One step of a multi-request wizard
    WizardStep,
    /// Ends the session
    Logout,
}

impl Handler {
    fn method(self) -> ControllerMethod {
        match self {
            Self::Browse => ControllerMethod::new("browse", Vec::new()),
            Self::WizardStep => ControllerMethod::new("step", Vec::new()),
            Self::Logout => ControllerMethod::new("logout", markers![EndsSession]),
        }
    }

    fn instance(self) -> ControllerInstance {
        match self {
            Self::Browse => ControllerInstance::new("CatalogController", Vec::new()),
            Self::WizardStep => ControllerInstance::new("WizardController", markers![Conversational]),
            Self::Logout => ControllerInstance::new("AccountController", Vec::new()),
        }
    }
}

/// One scheduled request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestSpec {
    /// Position in the schedule
    pub index: u64,
    /// Index into the simulated sessions
    pub session: usize,
    /// Target handler
    pub handler: Handler,
}

/// Build the seeded request schedule
#[must_use]
pub fn plan_requests(config: &SimulatorConfig) -> Vec<RequestSpec> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let sessions = config.sessions.max(1);

    (0..config.requests)
        .map(|index| {
            let handler = if one_in(&mut rng, config.invalidate_every) {
                Handler::Logout
            } else if one_in(&mut rng, config.conversation_every) {
                Handler::WizardStep
            } else {
                Handler::Browse
            };
            RequestSpec {
                index,
                session: rng.gen_range(0..sessions),
                handler,
            }
        })
        .collect()
}

fn one_in(rng: &mut StdRng, every: u32) -> bool {
    every > 0 && rng.gen_range(0..every) == 0
}

/// Statistics for simulation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulatorStats {
    /// Requests taken from the schedule
    pub requests_attempted: u64,
    /// Requests that reached their handler
    pub requests_served: u64,
    /// Requests that rebound after their session was invalidated underneath them
    pub rebinds: u64,
    /// Requests served inside a conversation
    pub conversation_requests: u64,
    /// Sessions ended by a handler
    pub sessions_invalidated: u64,
    /// Sessions open at the end
    pub open_sessions: usize,
    /// Long-running conversations open at the end
    pub open_conversations: usize,
}

#[derive(Debug, Default)]
struct Counters {
    attempted: AtomicU64,
    served: AtomicU64,
    rebinds: AtomicU64,
    conversations: AtomicU64,
    invalidated: AtomicU64,
    retired_visits: AtomicU64,
}

/// Final report from simulator
#[derive(Debug, Clone, Serialize)]
pub struct SimulatorReport {
    /// Configuration the run used
    pub config: SimulatorConfig,
    /// Counters
    pub stats: SimulatorStats,
    /// Violations, categorised
    pub violations: ErrorList,
}

impl SimulatorReport {
    /// Check if simulation passed all criteria
    #[must_use]
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }

    /// Generate text report
    #[must_use]
    pub fn generate_text(&self) -> String {
        let mut report = String::new();
        let _ = writeln!(report, "=== vscope Simulator Report ===\n");
        let _ = writeln!(report, "Seed: {}", self.config.seed);
        let _ = writeln!(report, "Workers: {}", self.config.workers);
        let _ = writeln!(report, "Requests Attempted: {}", self.stats.requests_attempted);
        let _ = writeln!(report, "Requests Served: {}", self.stats.requests_served);
        let _ = writeln!(report, "Session Rebinds: {}", self.stats.rebinds);
        let _ = writeln!(report, "Conversation Requests: {}", self.stats.conversation_requests);
        let _ = writeln!(report, "Sessions Invalidated: {}", self.stats.sessions_invalidated);
        let _ = writeln!(report, "Open Sessions: {}", self.stats.open_sessions);
        let _ = writeln!(report, "Open Conversations: {}", self.stats.open_conversations);
        let _ = writeln!(report, "Violations: {}", self.violations.len());

        if !self.violations.is_empty() {
            report.push_str("\n=== Violations ===\n");
            for (category, messages) in self.violations.grouped() {
                let _ = writeln!(report, "{category} ({})", messages.len());
                for message in messages {
                    let _ = writeln!(report, "  - {}", message.text);
                }
            }
        }

        let _ = writeln!(
            report,
            "\n=== Result: {} ===",
            if self.passed() { "PASS" } else { "FAIL" }
        );
        report
    }

    /// JSON rendering of the whole report
    ///
    /// # Errors
    /// Serialization failure.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

struct Shared {
    config: SimulatorConfig,
    application: ApplicationScope,
    registry: SessionRegistry,
    sessions: Vec<SessionId>,
    conversation_acceptor: WithMarkerAcceptor,
    logout_acceptor: WithMarkerAcceptor,
    schedule: Vec<RequestSpec>,
    cursor: AtomicUsize,
    halt: AtomicBool,
    counters: Counters,
}

impl Shared {
    fn next_request(&self) -> Option<RequestSpec> {
        if self.halt.load(Ordering::Acquire) {
            return None;
        }
        let spec = self.schedule.get(self.cursor.fetch_add(1, Ordering::AcqRel)).copied()?;
        self.counters.attempted.fetch_add(1, Ordering::Relaxed);
        Some(spec)
    }

    fn report(&self, found: &[Message]) {
        if !found.is_empty() && self.config.stop_on_first_violation {
            self.halt.store(true, Ordering::Release);
        }
    }
}

/// Run the vscope simulator
pub async fn run_simulator(config: SimulatorConfig) -> SimulatorReport {
    let registry = SessionRegistry::new();
    let sessions = (0..config.sessions.max(1))
        .map(|_| registry.create().0)
        .collect();
    let application = ApplicationScope::new();
    application.bag().put(APPLICATION_KEY, config.seed);

    let shared = Arc::new(Shared {
        schedule: plan_requests(&config),
        config: config.clone(),
        application,
        registry,
        sessions,
        conversation_acceptor: WithMarkerAcceptor::with_config(
            AcceptsWithMarkers::new().with_marker::<Conversational>(),
        ),
        logout_acceptor: WithMarkerAcceptor::with_config(
            AcceptsWithMarkers::new().with_marker::<EndsSession>(),
        ),
        cursor: AtomicUsize::new(0),
        halt: AtomicBool::new(false),
        counters: Counters::default(),
    });

    info!(
        seed = config.seed,
        requests = config.requests,
        workers = config.workers,
        "simulation started"
    );

    let handles: Vec<_> = (0..config.workers.max(1))
        .map(|worker| {
            let shared = Arc::clone(&shared);
            tokio::task::spawn_blocking(move || run_worker(worker, &shared))
        })
        .collect();

    let mut violations = ErrorList::new();
    for handle in handles {
        match handle.await {
            Ok(found) => violations.extend(found),
            Err(err) => violations.push(Message::error(
                category::WORKER,
                format!("worker task failed: {err}"),
            )),
        }
    }

    let stats = collect_stats(&shared);
    if let Some(violation) = check_accounting(&shared, &stats) {
        violations.push(violation);
    }

    info!(
        served = stats.requests_served,
        violations = violations.len(),
        "simulation finished"
    );
    SimulatorReport {
        config,
        stats,
        violations,
    }
}

fn run_worker(worker: usize, shared: &Shared) -> Vec<Message> {
    let mut manager = ContextManager::standard(
        shared.config.context.clone(),
        Arc::new(shared.application.clone()),
    );
    let mut violations = Vec::new();

    while let Some(spec) = shared.next_request() {
        let found = serve(&mut manager, shared, spec);
        if !found.is_empty() {
            warn!(worker, request = spec.index, count = found.len(), "violations detected");
        }
        shared.report(&found);
        violations.extend(found);
    }
    debug!(worker, "worker drained");
    violations
}

fn serve(manager: &mut ContextManager, shared: &Shared, spec: RequestSpec) -> Vec<Message> {
    let session_id = shared.sessions[spec.session];
    let method = spec.handler.method();
    let instance = spec.handler.instance();
    let conversational = shared.conversation_acceptor.validate(&method, &instance);
    let ends_session = shared.logout_acceptor.validate(&method, &instance);

    let mut violations = Vec::new();
    let scope_error = |err: &ScopeError| {
        Message::error(
            category::SCOPE_ERROR,
            format!("request {}: {err}", spec.index),
        )
    };

    loop {
        let bag = shared.registry.get_or_create(session_id);
        if let Err(err) = manager.bind_session(bag.clone()) {
            violations.push(scope_error(&err));
            return violations;
        }

        let plan = if conversational {
            RequestPlan::new().with_conversation(format!("wizard-{session_id}"))
        } else {
            RequestPlan::new().with_session()
        };
        let mut guard = match manager.enter(plan) {
            Ok(guard) => guard,
            Err(err) => {
                violations.push(scope_error(&err));
                return violations;
            }
        };

        // Invalidated while this request waited for the session lease
        let current = shared.registry.get(&session_id);
        if !current.is_some_and(|current| current.same_bag(&bag)) {
            shared.counters.rebinds.fetch_add(1, Ordering::Relaxed);
            continue;
        }

        handle(&mut guard, shared, spec, session_id, ends_session, &mut violations);
        if let Err(err) = guard.finish() {
            violations.push(scope_error(&err));
        }
        break;
    }

    let active = manager.active_scopes();
    if active != [ScopeKind::Application] {
        violations.push(Message::error(
            category::LEFT_ACTIVE,
            format!("request {}: still active after teardown: {active:?}", spec.index),
        ));
    }
    violations
}

fn handle(
    guard: &mut RequestGuard<'_>,
    shared: &Shared,
    spec: RequestSpec,
    session_id: SessionId,
    ends_session: bool,
    violations: &mut Vec<Message>,
) {
    let index = spec.index;

    if let Some(previous) = guard.lookup_as::<u64>(REQUEST_MARKER) {
        violations.push(Message::error(
            category::RESIDUAL,
            format!("request {index}: saw marker of request {previous}"),
        ));
    }
    if guard.lookup_as::<u64>(APPLICATION_KEY).as_deref() != Some(&shared.config.seed) {
        violations.push(Message::error(
            category::APPLICATION,
            format!("request {index}: application attribute not visible"),
        ));
    }
    if let Some(request) = guard.request() {
        request.put(REQUEST_MARKER, index);
    }

    let Some(session) = guard.session() else {
        violations.push(Message::error(
            category::SESSION,
            format!("request {index}: no live session"),
        ));
        return;
    };
    let visits = session.get_as::<u64>(VISITS_KEY).map_or(0, |v| *v) + 1;
    session.put(VISITS_KEY, visits);
    shared.counters.served.fetch_add(1, Ordering::Relaxed);

    if let Some(conversation) = guard.conversation() {
        conversation.begin();
        let step = conversation.get_as::<u64>(STEP_KEY).map_or(0, |v| *v) + 1;
        conversation.put(STEP_KEY, step);
        let seen = guard.request().and_then(|bag| bag.get_as::<u64>(STEP_KEY));
        if seen.as_deref() != Some(&step) {
            violations.push(Message::error(
                category::UNION_VIEW,
                format!("request {index}: conversation step {step} not in request bag"),
            ));
        }
        shared.counters.conversations.fetch_add(1, Ordering::Relaxed);
    }

    if ends_session {
        shared.counters.retired_visits.fetch_add(visits, Ordering::Relaxed);
        shared.counters.invalidated.fetch_add(1, Ordering::Relaxed);
        shared.registry.invalidate(&session_id);
        guard.invalidate_session();
        debug!(request = index, %session_id, "session ended");
    }
}

fn collect_stats(shared: &Shared) -> SimulatorStats {
    let counters = &shared.counters;
    let open_conversations = shared
        .registry
        .ids()
        .iter()
        .filter_map(|id| shared.registry.get(id))
        .map(|bag| bag.keys_with_prefix(CONVERSATION_KEY_PREFIX).len())
        .sum();

    SimulatorStats {
        requests_attempted: counters.attempted.load(Ordering::Relaxed),
        requests_served: counters.served.load(Ordering::Relaxed),
        rebinds: counters.rebinds.load(Ordering::Relaxed),
        conversation_requests: counters.conversations.load(Ordering::Relaxed),
        sessions_invalidated: counters.invalidated.load(Ordering::Relaxed),
        open_sessions: shared.registry.len(),
        open_conversations,
    }
}

fn check_accounting(shared: &Shared, stats: &SimulatorStats) -> Option<Message> {
    let live: u64 = shared
        .registry
        .ids()
        .iter()
        .filter_map(|id| shared.registry.get(id))
        .filter_map(|bag| bag.get_as::<u64>(VISITS_KEY))
        .map(|visits| *visits)
        .sum();
    let counted = live + shared.counters.retired_visits.load(Ordering::Relaxed);

    (counted != stats.requests_served).then(|| {
        Message::error(
            category::ACCOUNTING,
            format!(
                "sessions recorded {counted} visits for {} served requests",
                stats.requests_served
            ),
        )
    })
}
