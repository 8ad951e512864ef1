use crate::dispatcher::CoreState;
use crate::types::{AreaId, MonotonicClock, PropertyEventCallback, PropertyId};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// One active periodic sampler: a client's continuous subscription to one
/// (propId, areaId) at a negotiated rate.
pub struct UpdaterSpec {
    pub id: u64,
    pub prop_id: PropertyId,
    pub area_id: AreaId,
    pub interval: Duration,
    pub stopped: Arc<AtomicBool>,
    pub callback: Arc<dyn PropertyEventCallback>,
}

enum SchedulerMsg {
    Start(UpdaterSpec),
    Stop(u64),
    Shutdown,
}

/// Drives all continuous updaters from one dedicated worker thread.
///
/// Every updater has its own re-arming deadline: the next tick is scheduled
/// `interval` after the previous delivery returns, not at a fixed rate, so
/// a slow callback stretches its own period instead of piling up ticks.
/// Ticks are never concurrent with each other.
pub struct Scheduler {
    tx: Sender<SchedulerMsg>,
    worker: Option<JoinHandle<()>>,
    next_id: AtomicU64,
}

impl Scheduler {
    /// Spawns the worker thread. `state` is the shared table/registry
    /// domain; a tick locks it only long enough to re-stamp the value.
    pub(crate) fn spawn(state: Arc<Mutex<CoreState>>, clock: MonotonicClock) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        let worker = std::thread::Builder::new()
            .name("carbus-sampler".into())
            .spawn(move || run_worker(&rx, &state, clock))
            .ok();
        Self {
            tx,
            worker,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Arms an updater. The first tick fires immediately.
    pub fn start(&self, spec: UpdaterSpec) {
        debug!(
            updater = spec.id,
            prop_id = spec.prop_id,
            area_id = spec.area_id,
            interval_ms = spec.interval.as_millis() as u64,
            "starting continuous updater"
        );
        let _ = self.tx.send(SchedulerMsg::Start(spec));
    }

    /// Retires an updater. The caller must set the updater's stop flag
    /// first; the flag, not this message, is what guarantees no delivery
    /// after the stopping call returns.
    pub fn stop(&self, id: u64) {
        debug!(updater = id, "stopping continuous updater");
        let _ = self.tx.send(SchedulerMsg::Stop(id));
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        let _ = self.tx.send(SchedulerMsg::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn run_worker(rx: &Receiver<SchedulerMsg>, state: &Mutex<CoreState>, clock: MonotonicClock) {
    let mut updaters: HashMap<u64, UpdaterSpec> = HashMap::new();
    // Min-heap of (deadline, updater id). Entries for retired updaters are
    // discarded lazily when they surface.
    let mut deadlines: BinaryHeap<Reverse<(Instant, u64)>> = BinaryHeap::new();

    loop {
        let msg = if let Some(&Reverse((deadline, _))) = deadlines.peek() {
            let timeout = deadline.saturating_duration_since(Instant::now());
            match rx.recv_timeout(timeout) {
                Ok(msg) => Some(msg),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => return,
            }
        } else {
            match rx.recv() {
                Ok(msg) => Some(msg),
                Err(_) => return,
            }
        };

        match msg {
            Some(SchedulerMsg::Start(spec)) => {
                deadlines.push(Reverse((Instant::now(), spec.id)));
                updaters.insert(spec.id, spec);
            }
            Some(SchedulerMsg::Stop(id)) => {
                updaters.remove(&id);
            }
            Some(SchedulerMsg::Shutdown) => return,
            None => fire_due_ticks(&mut updaters, &mut deadlines, state, clock),
        }
    }
}

fn fire_due_ticks(
    updaters: &mut HashMap<u64, UpdaterSpec>,
    deadlines: &mut BinaryHeap<Reverse<(Instant, u64)>>,
    state: &Mutex<CoreState>,
    clock: MonotonicClock,
) {
    while let Some(&Reverse((deadline, id))) = deadlines.peek() {
        if deadline > Instant::now() {
            break;
        }
        deadlines.pop();

        if !updaters.contains_key(&id) {
            continue;
        }
        if updaters[&id].stopped.load(Ordering::Acquire) {
            updaters.remove(&id);
            continue;
        }
        let spec = &updaters[&id];

        // Re-stamp under the lock, deliver outside it.
        let refreshed = {
            let mut core = state.lock().unwrap_or_else(PoisonError::into_inner);
            core.table
                .refresh_timestamp(spec.prop_id, spec.area_id, clock.now_nanos())
        };

        match refreshed {
            Some(value) => {
                // The owning client may have unsubscribed while the lock
                // was held; its stop flag was set before that call
                // returned.
                if !spec.stopped.load(Ordering::Acquire) {
                    spec.callback.on_property_event(value);
                }
            }
            None => trace!(
                prop_id = spec.prop_id,
                area_id = spec.area_id,
                "continuous property has no value; skipping tick"
            ),
        }

        // Re-arm relative to the moment the delivery returned.
        deadlines.push(Reverse((Instant::now() + spec.interval, id)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PropertyValue, RawPropValues};
    use std::sync::mpsc;

    struct ChannelCallback(Mutex<mpsc::Sender<PropertyValue>>);

    impl PropertyEventCallback for ChannelCallback {
        fn on_property_event(&self, value: PropertyValue) {
            let _ = self.0.lock().unwrap().send(value);
        }
    }

    fn seeded_state() -> Arc<Mutex<CoreState>> {
        let mut core = CoreState::new();
        core.table
            .put(PropertyValue::new(10, 1, 0, RawPropValues::float(vec![42.0])));
        Arc::new(Mutex::new(core))
    }

    #[test]
    fn test_ticks_rearm_and_restamp() {
        let state = seeded_state();
        let scheduler = Scheduler::spawn(state.clone(), MonotonicClock::new());
        let (tx, rx) = mpsc::channel();

        scheduler.start(UpdaterSpec {
            id: scheduler.allocate_id(),
            prop_id: 10,
            area_id: 1,
            interval: Duration::from_millis(50),
            stopped: Arc::new(AtomicBool::new(false)),
            callback: Arc::new(ChannelCallback(Mutex::new(tx))),
        });

        let first = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        let second = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(first.value.float_values, vec![42.0]);
        assert!(second.timestamp > first.timestamp);

        // The table holds the latest tick's timestamp.
        let table_ts = state.lock().unwrap().table.get(10, 1).unwrap().timestamp;
        assert!(table_ts >= first.timestamp);
    }

    #[test]
    fn test_no_delivery_after_stop_flag_set() {
        let state = seeded_state();
        let scheduler = Scheduler::spawn(state, MonotonicClock::new());
        let (tx, rx) = mpsc::channel();

        let stopped = Arc::new(AtomicBool::new(false));
        let id = scheduler.allocate_id();
        scheduler.start(UpdaterSpec {
            id,
            prop_id: 10,
            area_id: 1,
            interval: Duration::from_millis(30),
            stopped: stopped.clone(),
            callback: Arc::new(ChannelCallback(Mutex::new(tx))),
        });

        rx.recv_timeout(Duration::from_secs(1)).unwrap();
        stopped.store(true, Ordering::Release);
        scheduler.stop(id);

        // Drain anything that was already in flight, then expect silence.
        while rx.recv_timeout(Duration::from_millis(120)).is_ok() {}
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    }

    #[test]
    fn test_updater_without_value_never_delivers() {
        let state = Arc::new(Mutex::new(CoreState::new()));
        let scheduler = Scheduler::spawn(state, MonotonicClock::new());
        let (tx, rx) = mpsc::channel();

        scheduler.start(UpdaterSpec {
            id: scheduler.allocate_id(),
            prop_id: 99,
            area_id: 0,
            interval: Duration::from_millis(20),
            stopped: Arc::new(AtomicBool::new(false)),
            callback: Arc::new(ChannelCallback(Mutex::new(tx))),
        });

        assert!(rx.recv_timeout(Duration::from_millis(150)).is_err());
    }
}
