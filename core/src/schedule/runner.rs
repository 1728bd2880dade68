use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use thread_priority::{ThreadBuilder, ThreadPriority};
use tracing::{info, warn};

use super::Scheduler;
use super::engine::lock;
use super::message::SchedulerMessage;

/// Dedicated thread ticking a [`Scheduler`] every period while it is armed.
///
/// While the scheduler is idle the thread sleeps on its command channel and
/// is woken by the scheduler itself when an engine gets scheduled.
///
/// For hosts playing in real time; offline rendering ticks the scheduler
/// directly.
pub struct SchedulerRunner {
    handle: Option<JoinHandle<()>>,
    commands: Sender<SchedulerMessage>,
}

impl SchedulerRunner {
    pub fn spawn(scheduler: Arc<Mutex<Scheduler>>) -> std::io::Result<SchedulerRunner> {
        let (tx, rx) = crossbeam_channel::unbounded();
        lock(&scheduler).attach_timer(tx.clone());

        let handle = ThreadBuilder::default()
            .name("grainfield-scheduler")
            .priority(ThreadPriority::Max)
            .spawn(move |priority| {
                if let Err(e) = priority {
                    warn!("scheduler thread running at default priority: {e:?}");
                }
                run(&scheduler, &rx);
            })?;

        Ok(SchedulerRunner {
            handle: Some(handle),
            commands: tx,
        })
    }

    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let _ = self.commands.send(SchedulerMessage::Shutdown);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("scheduler thread panicked");
            }
        }
    }
}

impl Drop for SchedulerRunner {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(scheduler: &Mutex<Scheduler>, commands: &Receiver<SchedulerMessage>) {
    info!("scheduler thread started");
    loop {
        let (armed, period) = {
            let s = lock(scheduler);
            (s.is_armed(), s.period())
        };

        let message = if armed {
            match commands.recv_timeout(Duration::from_secs_f64(period)) {
                Ok(message) => Some(message),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        } else {
            match commands.recv() {
                Ok(message) => Some(message),
                Err(_) => break,
            }
        };

        match message {
            Some(SchedulerMessage::Shutdown) => break,
            // Arming already ran the first tick synchronously.
            Some(SchedulerMessage::Arm) => continue,
            None => {
                let mut s = lock(scheduler);
                if s.is_armed() {
                    s.tick();
                }
            }
        }
    }
    info!("scheduler thread stopped");
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Instant;

    use super::*;
    use crate::clock::{AudioTime, SystemClock};
    use crate::schedule::engine::{SchedulerId, SharedEngine, TimeEngine};

    struct Counter {
        master: Option<SchedulerId>,
        calls: usize,
    }

    impl TimeEngine for Counter {
        fn advance_time(&mut self, time: AudioTime) -> Option<AudioTime> {
            self.calls += 1;
            Some(time + 0.01)
        }

        fn master(&self) -> Option<SchedulerId> {
            self.master
        }

        fn set_master(&mut self, master: Option<SchedulerId>) {
            self.master = master;
        }
    }

    #[test]
    fn ticks_in_the_background_until_shutdown() {
        let scheduler = Arc::new(Mutex::new(Scheduler::new(Arc::new(SystemClock::new()))));
        let runner = SchedulerRunner::spawn(scheduler.clone()).unwrap();

        let counter = Arc::new(Mutex::new(Counter {
            master: None,
            calls: 0,
        }));
        let engine: SharedEngine = counter.clone();
        lock(&scheduler).add(engine, None).unwrap();
        let first = lock(&counter).calls;
        assert!(first > 0);

        let deadline = Instant::now() + Duration::from_secs(5);
        while lock(&counter).calls < first + 20 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(lock(&counter).calls >= first + 20);

        runner.shutdown();
        let after = lock(&counter).calls;
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(lock(&counter).calls, after);
    }
}
