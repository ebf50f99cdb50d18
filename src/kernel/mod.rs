// Cooperative timers over a shared deadline registry
// Single core, no preemption. Tasks poll their Timer from the main loop;
// a poll that isn't due idles the CPU until just before the soonest
// deadline of any task.
//
// ticks:    wrapping millisecond arithmetic
// clock:    platform services (Clock, Sleep) and stock adapters
// registry: fixed-capacity sorted deadline table
// timebase: clock + sleeper + registry, shared by every timer
// timer:    per-task start/repeat/stop/finish/just_finished

pub mod clock;
pub mod registry;
pub mod ticks;
pub mod timebase;
pub mod timer;

#[cfg(test)]
pub(crate) mod sim;

pub use clock::{Clock, DelaySleep, Sleep, WfiSleep};
#[cfg(feature = "embassy")]
pub use clock::EmbassyClock;
pub use registry::{DEFAULT_CAPACITY, Registry, RegistryError};
pub use ticks::{TickSpace, Ticks};
pub use timebase::{DefaultTimebase, Timebase};
pub use timer::{MIN_PERIOD_MS, Timer, TimerError};
