// Shared time context: platform clock + sleeper + the deadline registry
//
// One Timebase per program, created at boot and borrowed by every Timer.
// The registry sits behind a critical_section Mutex so an ISR touching a
// timer can't interleave with the main loop's insert/remove. Sleeping is
// always done after the critical section is released; interrupts stay
// enabled while the core idles.

use core::cell::RefCell;

use critical_section::Mutex;

use super::clock::{Clock, Sleep};
use super::registry::{DEFAULT_CAPACITY, Registry, RegistryError};
use super::ticks::{TickSpace, Ticks};
use super::timer::Timer;

pub type DefaultTimebase<C, S> = Timebase<C, S, DEFAULT_CAPACITY>;

pub struct Timebase<C, S, const N: usize = DEFAULT_CAPACITY> {
    clock: C,
    sleep: S,
    registry: Mutex<RefCell<Registry<N>>>,
}

impl<C: Clock, S: Sleep, const N: usize> Timebase<C, S, N> {
    pub fn new(clock: C, sleep: S) -> Self {
        let space = clock.space();
        Self {
            clock,
            sleep,
            registry: Mutex::new(RefCell::new(Registry::new(space))),
        }
    }

    /// An idle timer bound to this timebase.
    pub fn timer(&self) -> Timer<'_, C, S, N> {
        Timer::new(self)
    }

    pub fn now(&self) -> Ticks {
        self.clock.now()
    }

    pub fn space(&self) -> TickSpace {
        self.clock.space()
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn sleeper(&self) -> &S {
        &self.sleep
    }

    /// Number of running timers.
    pub fn pending(&self) -> usize {
        self.with_registry(|r| r.len())
    }

    pub fn nearest(&self) -> Option<Ticks> {
        self.with_registry(|r| r.nearest())
    }

    /// Milliseconds until the soonest deadline of any timer, `None` when
    /// nothing is running.
    pub fn time_until_nearest(&self) -> Option<i32> {
        let now = self.clock.now();
        self.with_registry(|r| r.time_until_nearest(now).ok())
    }

    /// Sleep until 1ms before the soonest deadline of any timer.
    ///
    /// The last millisecond is left to the caller's poll loop so a timer
    /// is never observed late. Nothing pending, or less than 2ms to go,
    /// returns immediately. Returns the milliseconds requested from the
    /// sleeper.
    pub fn idle(&self) -> u32 {
        let Some(until) = self.time_until_nearest() else {
            return 0;
        };
        let ms = until.saturating_sub(1);
        if ms <= 0 {
            return 0;
        }
        log::trace!("timebase: sleeping {}ms", ms);
        self.sleep.light_sleep(ms as u32);
        ms as u32
    }

    /// Inspect the registry inside a critical section.
    ///
    /// Read-only: entries are added and removed by timer transitions
    /// alone, so every entry stays owned by exactly one running timer.
    pub fn with_registry<R>(&self, f: impl FnOnce(&Registry<N>) -> R) -> R {
        critical_section::with(|cs| f(&self.registry.borrow_ref(cs)))
    }

    pub(crate) fn with_registry_mut<R>(&self, f: impl FnOnce(&mut Registry<N>) -> R) -> R {
        critical_section::with(|cs| f(&mut self.registry.borrow_ref_mut(cs)))
    }

    pub(crate) fn arm(&self, deadline: Ticks) -> Result<usize, RegistryError> {
        self.with_registry_mut(|r| r.insert(deadline))
    }

    pub(crate) fn disarm(&self, deadline: Ticks) -> Result<(), RegistryError> {
        self.with_registry_mut(|r| r.remove(deadline))
    }
}
