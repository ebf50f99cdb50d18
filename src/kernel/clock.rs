// Platform clock and sleep services
//
// The kernel never reads hardware itself. A board hands a Clock (monotonic
// wrapping ms counter) and a Sleep (best-effort low-power wait) to the
// Timebase; everything else is arithmetic on Ticks.

use core::cell::RefCell;

use embedded_hal::delay::DelayNs;

use super::ticks::{TickSpace, Ticks};

/// Monotonic millisecond counter that wraps at [`Clock::space`].
pub trait Clock {
    fn now(&self) -> Ticks;

    fn space(&self) -> TickSpace;

    /// Wraparound-correct `a - b`.
    fn diff(&self, a: Ticks, b: Ticks) -> i32 {
        self.space().diff(a, b)
    }

    /// Wraparound-correct `t + ms`.
    fn add(&self, t: Ticks, ms: u32) -> Ticks {
        self.space().add(t, ms)
    }
}

impl<T: Clock + ?Sized> Clock for &T {
    fn now(&self) -> Ticks {
        (**self).now()
    }

    fn space(&self) -> TickSpace {
        (**self).space()
    }
}

/// Best-effort low-power wait.
///
/// May return early; the caller re-checks its deadlines anyway. Takes
/// `&self` because many timers share one sleeper through the Timebase.
pub trait Sleep {
    fn light_sleep(&self, ms: u32);
}

impl<T: Sleep + ?Sized> Sleep for &T {
    fn light_sleep(&self, ms: u32) {
        (**self).light_sleep(ms)
    }
}

/// Sleep through any embedded-hal delay provider (`esp_hal::delay::Delay`,
/// `embassy_time::Delay`, ...). Busy-waits on most HALs, so the saving is
/// only in not re-polling every task.
pub struct DelaySleep<D> {
    delay: RefCell<D>,
}

impl<D: DelayNs> DelaySleep<D> {
    pub const fn new(delay: D) -> Self {
        Self {
            delay: RefCell::new(delay),
        }
    }

    pub fn into_inner(self) -> D {
        self.delay.into_inner()
    }
}

impl<D: DelayNs> Sleep for DelaySleep<D> {
    fn light_sleep(&self, ms: u32) {
        if ms == 0 {
            return;
        }
        // a sleep can't re-enter itself on a single control loop, but an
        // ISR calling in here must not panic either
        if let Ok(mut delay) = self.delay.try_borrow_mut() {
            delay.delay_ms(ms);
        }
    }
}

/// Idle on wait-for-interrupt until `ms` have passed on `clock`.
///
/// Needs a periodic tick interrupt (SysTick, a TIMG alarm, ...) to bring
/// the core back out of WFI; without one this only returns on the next
/// unrelated interrupt.
pub struct WfiSleep<C> {
    clock: C,
}

impl<C: Clock> WfiSleep<C> {
    pub const fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> Sleep for WfiSleep<C> {
    fn light_sleep(&self, ms: u32) {
        if ms == 0 {
            return;
        }
        let until = self.clock.add(self.clock.now(), ms);
        while self.clock.diff(until, self.clock.now()) > 0 {
            wait_for_interrupt();
        }
    }
}

#[inline]
pub fn wait_for_interrupt() {
    #[cfg(target_arch = "riscv32")]
    unsafe {
        core::arch::asm!("wfi", options(nomem, nostack));
    }

    #[cfg(not(target_arch = "riscv32"))]
    {
        core::hint::spin_loop();
    }
}

/// Clock backed by the embassy time driver, truncated to 32 bits.
#[cfg(feature = "embassy")]
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbassyClock;

#[cfg(feature = "embassy")]
impl Clock for EmbassyClock {
    fn now(&self) -> Ticks {
        Ticks::from_raw(embassy_time::Instant::now().as_millis() as u32)
    }

    fn space(&self) -> TickSpace {
        TickSpace::FULL
    }
}
