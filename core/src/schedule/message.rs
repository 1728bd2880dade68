/// Commands understood by the scheduler runner thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerMessage {
    /// The scheduler went from idle to having scheduled engines.
    Arm,
    /// Request the runner to exit.
    Shutdown,
}
