// Cooperative millisecond timers for single-loop firmware (no RTOS)

#![cfg_attr(not(test), no_std)]

pub mod kernel;

#[cfg(feature = "embassy")]
pub use kernel::EmbassyClock;
pub use kernel::{
    Clock, DEFAULT_CAPACITY, DefaultTimebase, DelaySleep, MIN_PERIOD_MS, Registry, RegistryError,
    Sleep, TickSpace, Ticks, Timebase, Timer, TimerError, WfiSleep,
};
