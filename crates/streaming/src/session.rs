use std::cell::{Cell, RefCell};
use std::rc::Rc;

use catalog::{ConfigError, ViewerConfig};
use foundation::{ResourceId, SourceLocation};
use once_cell::unsync::OnceCell;
use runtime::metrics::names;
use runtime::{Event, EventBus, EventKind, Metrics, MetricsSnapshot, Pass, Spawner};
use tracing::{debug, info, warn};

use crate::control::{LoadError, PointCloudControl};
use crate::ledger::Ledger;
use crate::progress::{ControlState, LoadingAggregator, LoadingView};
use crate::reconciler::{Completion, Reconciler};
use crate::request::LoadTicket;
use crate::residency::Residency;
use crate::selection::SelectionSet;

const EVENT_LOG_CAPACITY: usize = 512;

struct State {
    selection: SelectionSet,
    reconciler: Reconciler,
    events: EventBus,
    metrics: Metrics,
    aggregator: LoadingAggregator,
}

impl State {
    fn record_gauges(&mut self) {
        let ledger_len = self.reconciler.ledger().len() as i64;
        let in_flight = self.reconciler.in_flight_len() as i64;
        self.metrics.set_gauge(names::LEDGER_LEN, ledger_len);
        self.metrics.set_gauge(names::IN_FLIGHT, in_flight);
    }
}

struct Inner<C> {
    state: RefCell<State>,
    control: OnceCell<Rc<C>>,
    running: Cell<bool>,
    rerun: Cell<bool>,
}

/// Keeps the loaded point clouds in step with the user's selection.
///
/// Every input change (a toggle, the control becoming ready) runs a pass.
/// Loads are spawned on the single-threaded executor and report back into
/// the same session when they finish. A pass requested while another is
/// still issuing operations is folded into a follow-up run of that pass.
///
/// Cloning yields another handle to the same session.
pub struct Session<C, S> {
    inner: Rc<Inner<C>>,
    spawner: S,
}

impl<C, S: Clone> Clone for Session<C, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
            spawner: self.spawner.clone(),
        }
    }
}

impl<C, S> Session<C, S>
where
    C: PointCloudControl + 'static,
    S: Spawner,
{
    pub fn new(selection: SelectionSet, assumed_total_points: u64, spawner: S) -> Self {
        let state = State {
            selection,
            reconciler: Reconciler::new(),
            events: EventBus::with_capacity(EVENT_LOG_CAPACITY),
            metrics: Metrics::new(),
            aggregator: LoadingAggregator::new(assumed_total_points),
        };
        Self {
            inner: Rc::new(Inner {
                state: RefCell::new(state),
                control: OnceCell::new(),
                running: Cell::new(false),
                rerun: Cell::new(false),
            }),
            spawner,
        }
    }

    pub fn from_config(config: &ViewerConfig, spawner: S) -> Result<Self, ConfigError> {
        config.validate()?;
        let selection = SelectionSet::from_locations(config.default_selection()?);
        Ok(Self::new(selection, config.assumed_total_points, spawner))
    }

    /// Flips `location` in the selection and reconciles.
    ///
    /// Returns whether the location is selected afterwards.
    pub fn toggle(&self, location: &SourceLocation) -> bool {
        let selected = self.inner.state.borrow_mut().selection.toggle(location);
        debug!(%location, selected, "selection toggled");
        self.reconcile();
        selected
    }

    /// Stores the control handle and runs the first pass.
    ///
    /// The handle is written once; a second control is rejected.
    pub fn attach_control(&self, control: C) -> bool {
        if self.inner.control.set(Rc::new(control)).is_err() {
            warn!("point-cloud control attached twice, keeping the first one");
            return false;
        }
        {
            let mut st = self.inner.state.borrow_mut();
            if st.reconciler.mark_ready() {
                let pass = st.reconciler.pass();
                st.events.emit(pass, EventKind::ControlReady, None, "");
            }
        }
        info!("point-cloud control ready");
        self.reconcile();
        true
    }

    pub fn is_ready(&self) -> bool {
        self.inner.control.get().is_some()
    }

    /// Runs a reconciliation pass. A no-op until a control is attached.
    pub fn reconcile(&self) {
        let Some(control) = self.inner.control.get().cloned() else {
            debug!("control not ready, deferring reconciliation");
            return;
        };
        if self.inner.running.replace(true) {
            self.inner.rerun.set(true);
            return;
        }
        loop {
            self.run_pass(&control);
            if !self.inner.rerun.replace(false) {
                break;
            }
        }
        self.inner.running.set(false);
    }

    fn run_pass(&self, control: &Rc<C>) {
        let plan = {
            let mut guard = self.inner.state.borrow_mut();
            let st = &mut *guard;
            let plan = st.reconciler.reconcile(&st.selection);
            st.metrics.inc_counter(names::PASSES, 1);
            for load in &plan.loads {
                st.events.emit(
                    plan.pass,
                    EventKind::LoadIssued,
                    Some(&load.location),
                    load.ticket.to_string(),
                );
            }
            st.metrics
                .inc_counter(names::LOADS_ISSUED, plan.loads.len() as u64);
            st.record_gauges();
            plan
        };

        if plan.is_empty() {
            return;
        }
        let pass = plan.pass;
        debug!(
            pass = pass.index,
            unloads = plan.unloads.len(),
            loads = plan.loads.len(),
            "reconciliation pass"
        );

        for unload in &plan.unloads {
            unload_best_effort(
                &self.inner.state,
                &**control,
                pass,
                Some(&unload.location),
                &unload.resource_id,
            );
        }

        for load in plan.loads {
            debug!(location = %load.location, ticket = %load.ticket, "loading point cloud");
            let pending = control.load_point_cloud(&load.location);
            let inner = Rc::clone(&self.inner);
            let control = Rc::clone(control);
            self.spawner.spawn_local(Box::pin(async move {
                let result = pending.await.map(|info| info.id);
                finish_load(&*inner, &*control, load.ticket, result);
            }));
        }
    }

    pub fn selection(&self) -> SelectionSet {
        self.inner.state.borrow().selection.clone()
    }

    pub fn is_selected(&self, location: &SourceLocation) -> bool {
        self.inner.state.borrow().selection.contains(location)
    }

    /// Copy of the ledger, for diagnostics.
    pub fn ledger(&self) -> Ledger {
        self.inner.state.borrow().reconciler.ledger().clone()
    }

    pub fn residency(&self, location: &SourceLocation) -> Option<Residency> {
        self.inner.state.borrow().reconciler.residency(location)
    }

    pub fn in_flight_len(&self) -> usize {
        self.inner.state.borrow().reconciler.in_flight_len()
    }

    /// No load is outstanding.
    pub fn is_settled(&self) -> bool {
        self.in_flight_len() == 0
    }

    /// The ledger holds exactly the selection and nothing is outstanding.
    pub fn is_converged(&self) -> bool {
        let st = self.inner.state.borrow();
        st.reconciler.is_converged(&st.selection)
    }

    pub fn events(&self) -> Vec<Event> {
        self.inner.state.borrow().events.events().cloned().collect()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.state.borrow().metrics.snapshot()
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.inner.state.borrow().metrics.counter(name)
    }

    /// Reads the control's state and recomputes the loading view.
    ///
    /// Before a control is attached this returns the last observed view.
    pub fn loading_view(&self) -> LoadingView {
        match self.inner.control.get() {
            Some(control) => {
                let state = control.state();
                self.observe(&state)
            }
            None => self.inner.state.borrow().aggregator.latest().clone(),
        }
    }

    /// Recomputes the loading view from a state pushed by the control.
    pub fn observe(&self, state: &ControlState) -> LoadingView {
        self.inner
            .state
            .borrow_mut()
            .aggregator
            .observe(state)
            .clone()
    }
}

fn finish_load<C: PointCloudControl>(
    inner: &Inner<C>,
    control: &C,
    ticket: LoadTicket,
    result: Result<ResourceId, LoadError>,
) {
    let (pass, completion) = {
        let mut guard = inner.state.borrow_mut();
        let st = &mut *guard;
        let completion = st.reconciler.complete_load(ticket, result, &st.selection);
        let pass = st.reconciler.pass();
        match &completion {
            Completion::Inserted {
                location,
                resource_id,
            } => {
                st.events
                    .emit(pass, EventKind::Loaded, Some(location), resource_id.as_str());
                st.metrics.inc_counter(names::LOADS_SUCCEEDED, 1);
            }
            Completion::Stale {
                location,
                resource_id,
            } => {
                st.events
                    .emit(pass, EventKind::StaleLoad, Some(location), resource_id.as_str());
                st.metrics.inc_counter(names::LOADS_SUCCEEDED, 1);
                st.metrics.inc_counter(names::STALE_LOADS, 1);
            }
            Completion::Failed { location, error } => {
                st.events
                    .emit(pass, EventKind::LoadFailed, Some(location), error.message.clone());
                st.metrics.inc_counter(names::LOADS_FAILED, 1);
            }
            Completion::Unknown { ticket, .. } => {
                st.events
                    .emit(pass, EventKind::StaleLoad, None, ticket.to_string());
                st.metrics.inc_counter(names::STALE_LOADS, 1);
            }
        }
        st.record_gauges();
        (pass, completion)
    };

    match completion {
        Completion::Inserted {
            location,
            resource_id,
        } => {
            info!(%location, %resource_id, "point cloud loaded");
        }
        Completion::Stale {
            location,
            resource_id,
        } => {
            info!(%location, %resource_id, "point cloud deselected while loading, unloading");
            unload_best_effort(&inner.state, control, pass, Some(&location), &resource_id);
        }
        Completion::Failed { location, error } => {
            // Left out of the ledger; the next pass that still wants it retries.
            warn!(%location, %error, "failed to load point cloud");
        }
        Completion::Unknown {
            ticket,
            resource_id,
        } => {
            warn!(%ticket, "completion for a load that is not in flight");
            if let Some(resource_id) = resource_id {
                unload_best_effort(&inner.state, control, pass, None, &resource_id);
            }
        }
    }
}

/// Asks the control to drop a resource. Failures are logged and recorded only.
fn unload_best_effort<C: PointCloudControl + ?Sized>(
    state: &RefCell<State>,
    control: &C,
    pass: Pass,
    location: Option<&SourceLocation>,
    resource_id: &ResourceId,
) {
    {
        let mut st = state.borrow_mut();
        st.events
            .emit(pass, EventKind::UnloadIssued, location, resource_id.as_str());
        st.metrics.inc_counter(names::UNLOADS_ISSUED, 1);
    }
    debug!(%resource_id, "unloading point cloud");
    if let Err(err) = control.unload_point_cloud(resource_id) {
        warn!(%resource_id, %err, "unload failed, treating resource as released");
        let mut st = state.borrow_mut();
        st.events
            .emit(pass, EventKind::UnloadFailed, location, err.message);
        st.metrics.inc_counter(names::UNLOADS_FAILED, 1);
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use catalog::ViewerConfig;
    use foundation::{ResourceId, SourceLocation};
    use runtime::metrics::names;
    use runtime::{EventKind, LocalBoxFuture, TokioLocalSpawner};
    use tokio::sync::oneshot;
    use tokio::task::LocalSet;

    use super::Session;
    use crate::control::{LoadError, PointCloudControl, PointCloudInfo, UnloadError};
    use crate::progress::{ControlState, StreamingProgress};
    use crate::selection::SelectionSet;

    type LoadReply = oneshot::Sender<Result<PointCloudInfo, LoadError>>;

    #[derive(Default)]
    struct FakeInner {
        pending: RefCell<Vec<(SourceLocation, LoadReply)>>,
        loads: RefCell<Vec<SourceLocation>>,
        unloads: RefCell<Vec<ResourceId>>,
        calls: RefCell<Vec<String>>,
        fail_unloads: Cell<bool>,
        state: Cell<ControlState>,
        on_unload: RefCell<Option<Box<dyn Fn()>>>,
    }

    #[derive(Clone, Default)]
    struct FakeControl(Rc<FakeInner>);

    impl FakeControl {
        fn resolve(&self, location: &str, result: Result<&str, &str>) {
            let loc = SourceLocation::from(location);
            let mut pending = self.0.pending.borrow_mut();
            let idx = pending
                .iter()
                .position(|(l, _)| *l == loc)
                .expect("no pending load for location");
            let (_, reply) = pending.remove(idx);
            let result = result
                .map(PointCloudInfo::new)
                .map_err(LoadError::new);
            let _ = reply.send(result);
        }

        fn loads_of(&self, location: &str) -> usize {
            let loc = SourceLocation::from(location);
            self.0.loads.borrow().iter().filter(|l| **l == loc).count()
        }

        fn load_count(&self) -> usize {
            self.0.loads.borrow().len()
        }

        fn unloads(&self) -> Vec<ResourceId> {
            self.0.unloads.borrow().clone()
        }

        fn take_calls(&self) -> Vec<String> {
            std::mem::take(&mut *self.0.calls.borrow_mut())
        }

        fn pending_locations(&self) -> Vec<SourceLocation> {
            self.0.pending.borrow().iter().map(|(l, _)| l.clone()).collect()
        }
    }

    impl PointCloudControl for FakeControl {
        fn load_point_cloud(
            &self,
            location: &SourceLocation,
        ) -> LocalBoxFuture<'static, Result<PointCloudInfo, LoadError>> {
            let (tx, rx) = oneshot::channel();
            self.0.loads.borrow_mut().push(location.clone());
            self.0.calls.borrow_mut().push(format!("load {location}"));
            self.0.pending.borrow_mut().push((location.clone(), tx));
            Box::pin(async move {
                rx.await
                    .unwrap_or_else(|_| Err(LoadError::new("control dropped the load")))
            })
        }

        fn unload_point_cloud(&self, id: &ResourceId) -> Result<(), UnloadError> {
            self.0.unloads.borrow_mut().push(id.clone());
            self.0.calls.borrow_mut().push(format!("unload {id}"));
            if let Some(hook) = self.0.on_unload.borrow().as_ref() {
                hook();
            }
            if self.0.fail_unloads.get() {
                return Err(UnloadError::new("layer already gone"));
            }
            Ok(())
        }

        fn state(&self) -> ControlState {
            self.0.state.get()
        }
    }

    type TestSession = Session<FakeControl, TokioLocalSpawner>;

    fn loc(s: &str) -> SourceLocation {
        SourceLocation::from(s)
    }

    fn session_with(selected: &[&str]) -> TestSession {
        let selection = SelectionSet::from_locations(selected.iter().map(|s| loc(s)));
        Session::new(selection, 5_000_000, TokioLocalSpawner)
    }

    async fn settle() {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }

    fn run<F: std::future::Future<Output = ()>>(f: F) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime");
        LocalSet::new().block_on(&rt, f);
    }

    #[test]
    fn default_then_toggle_scenario() {
        run(async {
            let cfg = ViewerConfig::default();
            let d1 = cfg.catalog.datasets()[0].source_location.clone();
            let d2 = cfg.catalog.datasets()[1].source_location.clone();
            let session: TestSession =
                Session::from_config(&cfg, TokioLocalSpawner).expect("config");
            let control = FakeControl::default();

            assert!(session.attach_control(control.clone()));
            assert_eq!(control.pending_locations(), vec![d1.clone()]);
            control.resolve(d1.as_str(), Ok("pc-1"));
            settle().await;

            assert!(session.toggle(&d2));
            assert_eq!(control.loads_of(d2.as_str()), 1);
            assert_eq!(control.load_count(), 2);
            control.resolve(d2.as_str(), Ok("pc-2"));
            settle().await;

            let ledger = session.ledger();
            assert_eq!(ledger.len(), 2);
            assert_eq!(ledger.get(&d1), Some(&ResourceId::new("pc-1")));
            assert_eq!(ledger.get(&d2), Some(&ResourceId::new("pc-2")));

            assert!(!session.toggle(&d1));
            assert_eq!(control.unloads(), vec![ResourceId::new("pc-1")]);
            let ledger = session.ledger();
            assert_eq!(ledger.len(), 1);
            assert!(ledger.contains(&d2));
            assert_eq!(control.load_count(), 2);
            assert!(session.is_converged());
        });
    }

    #[test]
    fn unloads_reach_the_control_before_loads_in_one_pass() {
        run(async {
            let session = session_with(&["a", "b"]);
            let control = FakeControl::default();
            session.attach_control(control.clone());
            assert_eq!(control.take_calls(), vec!["load a", "load b"]);

            control.resolve("a", Ok("pc-a"));
            control.resolve("b", Err("fetch failed"));
            settle().await;

            // Dropping `a` is the trigger that also retries the failed `b`.
            assert!(!session.toggle(&loc("a")));
            assert_eq!(control.take_calls(), vec!["unload pc-a", "load b"]);
        });
    }

    #[test]
    fn nothing_is_loaded_before_control_is_ready() {
        run(async {
            let session = session_with(&[]);
            assert!(session.toggle(&loc("a")));
            assert!(session.toggle(&loc("b")));
            assert!(!session.toggle(&loc("b")));
            assert!(!session.is_ready());
            assert_eq!(session.counter(names::PASSES), 0);

            let control = FakeControl::default();
            session.attach_control(control.clone());
            assert_eq!(control.pending_locations(), vec![loc("a")]);
            assert_eq!(session.events()[0].kind, EventKind::ControlReady);
        });
    }

    #[test]
    fn second_control_is_rejected() {
        run(async {
            let session = session_with(&["a"]);
            let first = FakeControl::default();
            assert!(session.attach_control(first.clone()));
            assert!(!session.attach_control(FakeControl::default()));
            assert_eq!(first.load_count(), 1);
        });
    }

    #[test]
    fn stale_load_is_unloaded_and_never_ledgered() {
        run(async {
            let session = session_with(&[]);
            let control = FakeControl::default();
            session.attach_control(control.clone());

            session.toggle(&loc("a"));
            session.toggle(&loc("a"));
            assert!(control.unloads().is_empty());
            assert!(session.ledger().is_empty());

            control.resolve("a", Ok("pc-a"));
            settle().await;

            assert_eq!(control.unloads(), vec![ResourceId::new("pc-a")]);
            assert!(session.ledger().is_empty());
            assert_eq!(session.counter(names::STALE_LOADS), 1);
            assert!(session.is_converged());
        });
    }

    #[test]
    fn location_in_flight_is_loaded_once() {
        run(async {
            let session = session_with(&["a"]);
            let control = FakeControl::default();
            session.attach_control(control.clone());

            for _ in 0..3 {
                session.toggle(&loc("b"));
                session.toggle(&loc("b"));
            }
            session.reconcile();
            assert_eq!(control.loads_of("a"), 1);

            control.resolve("a", Ok("pc-a"));
            settle().await;
            session.reconcile();
            assert_eq!(control.loads_of("a"), 1);
        });
    }

    #[test]
    fn idle_reconcile_issues_nothing() {
        run(async {
            let session = session_with(&["a"]);
            let control = FakeControl::default();
            session.attach_control(control.clone());
            control.resolve("a", Ok("pc-a"));
            settle().await;

            let before = (control.load_count(), control.unloads().len());
            session.reconcile();
            session.reconcile();
            assert_eq!((control.load_count(), control.unloads().len()), before);
            assert_eq!(session.counter(names::LOADS_ISSUED), 1);
        });
    }

    #[test]
    fn failed_load_waits_for_next_trigger() {
        run(async {
            let session = session_with(&["a"]);
            let control = FakeControl::default();
            session.attach_control(control.clone());

            control.resolve("a", Err("404 Not Found"));
            settle().await;
            assert!(session.ledger().is_empty());
            assert!(session.is_settled());
            assert_eq!(session.counter(names::LOADS_FAILED), 1);
            assert_eq!(control.loads_of("a"), 1);

            // Any selection change re-runs the diff, which retries "a".
            session.toggle(&loc("b"));
            assert_eq!(control.loads_of("a"), 2);
            control.resolve("a", Ok("pc-a"));
            control.resolve("b", Ok("pc-b"));
            settle().await;
            assert!(session.is_converged());
        });
    }

    #[test]
    fn failed_unload_still_clears_the_ledger() {
        run(async {
            let session = session_with(&["a"]);
            let control = FakeControl::default();
            session.attach_control(control.clone());
            control.resolve("a", Ok("pc-a"));
            settle().await;

            control.0.fail_unloads.set(true);
            session.toggle(&loc("a"));
            assert!(session.ledger().is_empty());
            assert_eq!(session.counter(names::UNLOADS_FAILED), 1);

            session.toggle(&loc("a"));
            assert_eq!(control.loads_of("a"), 2);
        });
    }

    #[test]
    fn out_of_order_completions_converge() {
        run(async {
            let session = session_with(&["a", "b", "c"]);
            let control = FakeControl::default();
            session.attach_control(control.clone());

            control.resolve("c", Ok("pc-c"));
            settle().await;
            control.resolve("a", Ok("pc-a"));
            session.toggle(&loc("b"));
            control.resolve("b", Ok("pc-b"));
            settle().await;

            assert!(session.is_converged());
            let ledger = session.ledger();
            let keys: Vec<&str> = ledger.locations().map(|l| l.as_str()).collect();
            assert_eq!(keys, vec!["a", "c"]);
            assert_eq!(control.unloads(), vec![ResourceId::new("pc-b")]);
        });
    }

    #[test]
    fn reentrant_toggle_from_control_is_deferred() {
        run(async {
            let session = session_with(&["a"]);
            let control = FakeControl::default();
            session.attach_control(control.clone());
            control.resolve("a", Ok("pc-a"));
            settle().await;

            let handle = session.clone();
            let fired = Rc::new(Cell::new(false));
            let fired_hook = fired.clone();
            *control.0.on_unload.borrow_mut() = Some(Box::new(move || {
                if !fired_hook.replace(true) {
                    handle.toggle(&SourceLocation::from("b"));
                }
            }));

            session.toggle(&loc("a"));
            assert!(fired.get());
            assert_eq!(control.loads_of("b"), 1);
            control.resolve("b", Ok("pc-b"));
            settle().await;
            assert!(session.is_converged());
            assert_eq!(session.selection().len(), 1);
        });
    }

    #[test]
    fn random_interleavings_converge() {
        run(async {
            let names_pool = ["a", "b", "c", "d"];
            let mut seed: u64 = 0x5eed;
            let mut next = move || {
                seed = seed
                    .wrapping_mul(6364136223846793005)
                    .wrapping_add(1442695040888963407);
                (seed >> 33) as usize
            };

            let session = session_with(&[]);
            let control = FakeControl::default();
            session.attach_control(control.clone());
            let mut issued = 0usize;

            for step in 0..200 {
                match next() % 3 {
                    0 | 1 => {
                        session.toggle(&loc(names_pool[next() % names_pool.len()]));
                    }
                    _ => {
                        let pending = control.pending_locations();
                        if !pending.is_empty() {
                            let pick = &pending[next() % pending.len()];
                            let fail = next() % 5 == 0;
                            let id = format!("pc-{step}");
                            let result = if fail { Err("boom") } else { Ok(id.as_str()) };
                            control.resolve(pick.as_str(), result);
                            issued += 1;
                        }
                    }
                }
                settle().await;

                for name in names_pool {
                    let target = loc(name);
                    let pending = control
                        .pending_locations()
                        .iter()
                        .filter(|l| **l == target)
                        .count();
                    assert!(pending <= 1, "duplicate in-flight load for {name}");
                }
            }

            // Drain everything still in flight, then give failed loads one more pass.
            loop {
                let pending = control.pending_locations();
                if pending.is_empty() {
                    break;
                }
                for l in pending {
                    control.resolve(l.as_str(), Ok("pc-final"));
                }
                settle().await;
            }
            session.reconcile();
            for l in control.pending_locations() {
                control.resolve(l.as_str(), Ok("pc-retry"));
            }
            settle().await;

            assert!(issued > 0);
            assert!(session.is_converged());
        });
    }

    #[test]
    fn loading_view_reads_control_state() {
        run(async {
            let session = session_with(&[]);
            assert!(!session.loading_view().is_loading);

            let control = FakeControl::default();
            control.0.state.set(ControlState {
                loading: false,
                streaming_active: true,
                streaming_progress: Some(StreamingProgress {
                    loaded_points: 2_500_000,
                    is_loading: true,
                }),
            });
            session.attach_control(control.clone());

            let view = session.loading_view();
            assert!(view.is_loading);
            assert_eq!(view.progress_percent, 50.0);
            assert_eq!(view.points_loaded_label.as_deref(), Some("2.50M"));
        });
    }
}
