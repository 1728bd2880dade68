use std::sync::Arc;

use crossbeam_channel::Sender;
use tracing::{debug, trace};

use crate::clock::{AudioClock, AudioTime};
use crate::error::SchedulerError;

pub mod engine;
pub mod message;
pub mod runner;

use engine::{SchedulerId, SharedEngine, lock, same_engine};
use message::SchedulerMessage;

pub const DEFAULT_PERIOD: AudioTime = 0.025;
pub const DEFAULT_LOOKAHEAD: AudioTime = 0.1;

/// Look-ahead scheduler.
///
/// Every `period` the scheduler reads the device clock and advances each
/// scheduled engine as long as its next time stays within
/// `now + lookahead`. Engines therefore produce events slightly ahead of
/// time, and the device plays them at their exact timestamps.
///
/// The periodic wake-up itself is performed by a
/// [`runner::SchedulerRunner`]; without one, [`Scheduler::tick`] has to be
/// called by hand.
pub struct Scheduler {
    id: SchedulerId,
    clock: Arc<dyn AudioClock>,

    engines: Vec<SharedEngine>,
    sched_engines: Vec<SharedEngine>,
    sched_times: Vec<AudioTime>,

    current_time: Option<AudioTime>,
    period: AudioTime,
    lookahead: AudioTime,

    armed: bool,
    timer: Option<Sender<SchedulerMessage>>,
}

impl Scheduler {
    pub fn new(clock: Arc<dyn AudioClock>) -> Self {
        Scheduler {
            id: SchedulerId::next(),
            clock,
            engines: Vec::new(),
            sched_engines: Vec::new(),
            sched_times: Vec::new(),
            current_time: None,
            period: DEFAULT_PERIOD,
            lookahead: DEFAULT_LOOKAHEAD,
            armed: false,
            timer: None,
        }
    }

    pub fn id(&self) -> SchedulerId {
        self.id
    }

    pub fn period(&self) -> AudioTime {
        self.period
    }

    pub fn set_period(&mut self, period: AudioTime) {
        if period > 0.0 {
            self.period = period;
        }
    }

    pub fn lookahead(&self) -> AudioTime {
        self.lookahead
    }

    pub fn set_lookahead(&mut self, lookahead: AudioTime) {
        if lookahead >= 0.0 {
            self.lookahead = lookahead;
        }
    }

    /// Wires the scheduler to the thread that performs its periodic ticks.
    pub(crate) fn attach_timer(&mut self, timer: Sender<SchedulerMessage>) {
        self.timer = Some(timer);
        if self.armed {
            self.notify_timer();
        }
    }

    /// Time of the engine being advanced when called from within a tick,
    /// otherwise the device time plus the look-ahead.
    pub fn current_time(&self) -> AudioTime {
        self.current_time
            .unwrap_or_else(|| self.clock.current_time() + self.lookahead)
    }

    /// Whether periodic ticks are currently required.
    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }

    pub fn scheduled_len(&self) -> usize {
        self.sched_engines.len()
    }

    pub fn has(&self, engine: &SharedEngine) -> bool {
        self.engines.iter().any(|e| same_engine(e, engine))
    }

    fn owns(&self, engine: &SharedEngine) -> bool {
        lock(engine).master() == Some(self.id)
    }

    /// Takes ownership of `engine` and schedules it at `time`, or at
    /// [`Scheduler::current_time`] when no time is given.
    pub fn add(
        &mut self,
        engine: SharedEngine,
        time: Option<AudioTime>,
    ) -> Result<(), SchedulerError> {
        {
            let mut guard = lock(&engine);
            if guard.master().is_some() {
                return Err(SchedulerError::AlreadyScheduled);
            }
            guard.set_master(Some(self.id));
        }
        let time = time.unwrap_or_else(|| self.current_time());
        debug!("scheduler {:?}: adding engine at {time:.3}", self.id);

        self.engines.push(Arc::clone(&engine));
        self.reschedule(&engine, time);
        self.reset_tick();
        Ok(())
    }

    /// Detaches an owned engine, cancelling any pending call.
    pub fn remove(&mut self, engine: &SharedEngine) -> Result<(), SchedulerError> {
        if !self.owns(engine) {
            return Err(SchedulerError::NotOwned);
        }
        lock(engine).set_master(None);
        self.engines.retain(|e| !same_engine(e, engine));
        self.unschedule(engine);
        self.reset_tick();
        Ok(())
    }

    /// Moves the next call of an owned engine to `time` (or the current
    /// time). An infinite time deschedules the engine without detaching it.
    pub fn reset_engine_time(
        &mut self,
        engine: &SharedEngine,
        time: Option<AudioTime>,
    ) -> Result<(), SchedulerError> {
        if !self.owns(engine) {
            return Err(SchedulerError::NotOwned);
        }
        let time = time.unwrap_or_else(|| self.current_time());
        self.reschedule(engine, time);
        self.reset_tick();
        Ok(())
    }

    /// Detaches every engine and stops ticking.
    pub fn clear(&mut self) {
        for engine in self.engines.drain(..) {
            lock(&engine).set_master(None);
        }
        self.sched_engines.clear();
        self.sched_times.clear();
        self.armed = false;
    }

    fn position(&self, engine: &SharedEngine) -> Option<usize> {
        self.sched_engines.iter().position(|e| same_engine(e, engine))
    }

    fn reschedule(&mut self, engine: &SharedEngine, time: AudioTime) {
        match self.position(engine) {
            Some(index) if time.is_finite() => self.sched_times[index] = time,
            Some(index) => self.unschedule_at(index),
            None if time < AudioTime::INFINITY => {
                self.sched_engines.push(Arc::clone(engine));
                self.sched_times.push(time);
            }
            None => {}
        }
    }

    fn unschedule(&mut self, engine: &SharedEngine) {
        if let Some(index) = self.position(engine) {
            self.unschedule_at(index);
        }
    }

    fn unschedule_at(&mut self, index: usize) {
        self.sched_engines.swap_remove(index);
        self.sched_times.swap_remove(index);
    }

    fn reset_tick(&mut self) {
        if !self.sched_engines.is_empty() {
            if !self.armed {
                self.tick();
                if self.armed {
                    self.notify_timer();
                }
            }
        } else if self.armed {
            trace!("scheduler {:?}: idle", self.id);
            self.armed = false;
        }
    }

    fn notify_timer(&self) {
        if let Some(timer) = &self.timer {
            // A missing runner only means nobody ticks; the state stays valid.
            let _ = timer.send(SchedulerMessage::Arm);
        }
    }

    /// Advances every engine whose next time falls within the look-ahead
    /// horizon.
    pub fn tick(&mut self) {
        let now = self.clock.current_time();
        let horizon = now + self.lookahead;
        let mut index = 0;

        while index < self.sched_engines.len() {
            let engine = Arc::clone(&self.sched_engines[index]);
            let mut guard = lock(&engine);
            let mut next = Some(self.sched_times[index]);

            while let Some(time) = next {
                if time.is_nan() || time > horizon {
                    break;
                }
                let time = time.max(now);
                self.current_time = Some(time);
                next = guard.advance_time(time);
            }

            match next {
                Some(time) if time.is_finite() => {
                    self.sched_times[index] = time;
                    index += 1;
                }
                Some(_) => self.unschedule_at(index),
                None => {
                    self.unschedule_at(index);
                    guard.set_master(None);
                    drop(guard);
                    self.engines.retain(|e| !same_engine(e, &engine));
                }
            }
        }

        self.current_time = None;
        self.armed = !self.sched_engines.is_empty();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    use super::*;
    use crate::clock::NEVER;
    use crate::offline::OfflineDevice;
    use engine::TimeEngine;

    /// Engine firing every `period` seconds, `remaining` more times.
    struct Metronome {
        master: Option<SchedulerId>,
        period: AudioTime,
        remaining: Option<usize>,
        calls: Vec<AudioTime>,
        park: bool,
    }

    impl Metronome {
        fn shared(period: AudioTime) -> Arc<Mutex<Metronome>> {
            Arc::new(Mutex::new(Metronome {
                master: None,
                period,
                remaining: None,
                calls: Vec::new(),
                park: false,
            }))
        }
    }

    impl TimeEngine for Metronome {
        fn advance_time(&mut self, time: AudioTime) -> Option<AudioTime> {
            self.calls.push(time);
            if self.park {
                return Some(NEVER);
            }
            match &mut self.remaining {
                Some(0) => None,
                Some(n) => {
                    *n -= 1;
                    Some(time + self.period)
                }
                None => Some(time + self.period),
            }
        }

        fn master(&self) -> Option<SchedulerId> {
            self.master
        }

        fn set_master(&mut self, master: Option<SchedulerId>) {
            self.master = master;
        }
    }

    fn setup() -> (Arc<OfflineDevice>, Scheduler) {
        let device = Arc::new(OfflineDevice::new(48000));
        let mut scheduler = Scheduler::new(device.clone());
        scheduler.set_lookahead(0.125);
        (device, scheduler)
    }

    fn consistent(scheduler: &Scheduler) -> bool {
        if scheduler.sched_engines.len() != scheduler.sched_times.len() {
            return false;
        }
        for (i, a) in scheduler.sched_engines.iter().enumerate() {
            if scheduler.sched_engines[i + 1..]
                .iter()
                .any(|b| same_engine(a, b))
            {
                return false;
            }
            if !scheduler.has(a) {
                return false;
            }
        }
        true
    }

    #[test]
    fn advances_only_within_lookahead() {
        let (device, mut scheduler) = setup();
        let metronome = Metronome::shared(1.0 / 32.0);
        scheduler.add(metronome.clone(), Some(0.0)).unwrap();

        assert_eq!(
            lock(&metronome).calls,
            vec![0.0, 1.0 / 32.0, 2.0 / 32.0, 3.0 / 32.0, 4.0 / 32.0]
        );
        assert!(scheduler.is_armed());

        device.set_time(0.0625);
        scheduler.tick();
        assert_eq!(lock(&metronome).calls.len(), 7);
        assert_eq!(lock(&metronome).calls[6], 6.0 / 32.0);
    }

    #[test]
    fn late_times_are_pulled_up_to_now() {
        let (device, mut scheduler) = setup();
        device.set_time(10.0);
        let metronome = Metronome::shared(1.0);
        scheduler.add(metronome.clone(), Some(2.0)).unwrap();
        assert_eq!(lock(&metronome).calls, vec![10.0]);
    }

    #[test]
    fn default_start_is_now_plus_lookahead() {
        let (device, mut scheduler) = setup();
        device.set_time(1.0);
        assert_eq!(scheduler.current_time(), 1.125);
        let metronome = Metronome::shared(1.0);
        scheduler.add(metronome.clone(), None).unwrap();
        assert_eq!(lock(&metronome).calls, vec![1.125]);
    }

    #[test]
    fn engines_cannot_be_shared_between_schedulers() {
        let (device, mut first) = setup();
        let mut second = Scheduler::new(device);
        let metronome: SharedEngine = Metronome::shared(1.0);

        first.add(metronome.clone(), None).unwrap();
        assert_eq!(
            first.add(metronome.clone(), None),
            Err(SchedulerError::AlreadyScheduled)
        );
        assert_eq!(
            second.add(metronome.clone(), None),
            Err(SchedulerError::AlreadyScheduled)
        );
        assert_eq!(second.remove(&metronome), Err(SchedulerError::NotOwned));

        first.remove(&metronome).unwrap();
        assert!(!first.has(&metronome));
        assert!(!first.is_armed());
        second.add(metronome.clone(), None).unwrap();
        assert!(second.has(&metronome));
    }

    #[test]
    fn finished_engines_detach_themselves() {
        let (_device, mut scheduler) = setup();
        let metronome = Metronome::shared(1.0 / 32.0);
        lock(&metronome).remaining = Some(2);
        let shared: SharedEngine = metronome.clone();
        scheduler.add(shared.clone(), Some(0.0)).unwrap();

        assert_eq!(lock(&metronome).calls.len(), 3);
        assert!(!scheduler.has(&shared));
        assert_eq!(lock(&metronome).master, None);
        assert_eq!(scheduler.scheduled_len(), 0);
        assert!(!scheduler.is_armed());
    }

    #[test]
    fn parked_engines_stay_owned() {
        let (_device, mut scheduler) = setup();
        let metronome = Metronome::shared(1.0);
        lock(&metronome).park = true;
        let shared: SharedEngine = metronome.clone();
        scheduler.add(shared.clone(), Some(0.0)).unwrap();

        assert!(scheduler.has(&shared));
        assert_eq!(scheduler.scheduled_len(), 0);
        assert!(!scheduler.is_armed());

        lock(&metronome).park = false;
        scheduler.reset_engine_time(&shared, Some(0.0)).unwrap();
        assert_eq!(scheduler.scheduled_len(), 1);
        assert!(scheduler.is_armed());

        scheduler.reset_engine_time(&shared, Some(NEVER)).unwrap();
        assert_eq!(scheduler.scheduled_len(), 0);
        assert!(scheduler.has(&shared));
    }

    #[test]
    fn arming_notifies_the_timer() {
        let (_device, mut scheduler) = setup();
        let (tx, rx) = crossbeam_channel::unbounded();
        scheduler.attach_timer(tx);

        let metronome: SharedEngine = Metronome::shared(1.0);
        scheduler.add(metronome.clone(), Some(0.0)).unwrap();
        assert_eq!(rx.try_recv(), Ok(SchedulerMessage::Arm));

        let other: SharedEngine = Metronome::shared(1.0);
        scheduler.add(other, Some(0.0)).unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn clear_detaches_everything() {
        let (_device, mut scheduler) = setup();
        let a: SharedEngine = Metronome::shared(1.0);
        let b: SharedEngine = Metronome::shared(1.0);
        scheduler.add(a.clone(), None).unwrap();
        scheduler.add(b.clone(), None).unwrap();
        scheduler.clear();

        assert!(scheduler.is_empty());
        assert!(!scheduler.is_armed());
        assert_eq!(lock(&a).master(), None);
        scheduler.add(a, None).unwrap();
    }

    #[test]
    fn lists_stay_aligned_under_random_operations() {
        let (device, mut scheduler) = setup();
        let mut rng = SmallRng::seed_from_u64(7);
        let pool: Vec<Arc<Mutex<Metronome>>> =
            (0..6).map(|i| Metronome::shared(0.01 * (i + 1) as f64)).collect();

        for _ in 0..2000 {
            let pick = &pool[rng.random_range(0..pool.len())];
            let engine: SharedEngine = pick.clone();
            match rng.random_range(0..6) {
                0 => {
                    let _ = scheduler.add(engine, Some(device.current_time()));
                }
                1 => {
                    let _ = scheduler.remove(&engine);
                }
                2 => {
                    let time = if rng.random_bool(0.3) {
                        NEVER
                    } else {
                        device.current_time() + rng.random_range(0.0..0.5)
                    };
                    let _ = scheduler.reset_engine_time(&engine, Some(time));
                }
                3 => {
                    let mut m = lock(pick);
                    m.remaining = if rng.random_bool(0.5) {
                        Some(rng.random_range(0..4))
                    } else {
                        None
                    };
                    m.park = rng.random_bool(0.1);
                }
                _ => {
                    device.advance(rng.random_range(0.0..0.05));
                    scheduler.tick();
                }
            }
            assert!(consistent(&scheduler));
            for m in &pool {
                let engine: SharedEngine = m.clone();
                let owned = lock(m).master == Some(scheduler.id());
                assert_eq!(owned, scheduler.has(&engine));
            }
            assert_eq!(scheduler.is_armed(), scheduler.scheduled_len() > 0);
        }
    }
}
