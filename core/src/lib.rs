pub mod buffer;
pub mod clock;
pub mod device;
pub mod error;
pub mod fade;
pub mod grain;
pub mod offline;
pub mod params;
pub mod player;
pub mod protocol;
pub mod schedule;
pub mod voice;

pub use buffer::AudioBuffer;
pub use clock::{AudioClock, AudioTime, NEVER, SystemClock};
pub use device::{AudioDevice, GrainPlan};
pub use error::{BufferError, ProtocolError, SchedulerError};
pub use grain::GrainEngine;
pub use offline::OfflineDevice;
pub use params::{Param, ParamValue, ParameterStore};
pub use protocol::{Envelope, Message};
pub use schedule::Scheduler;
pub use schedule::engine::{SchedulerId, SharedEngine, TimeEngine};
pub use schedule::runner::SchedulerRunner;
pub use voice::SynthVoice;
