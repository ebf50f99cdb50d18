// Polled millisecond timer, one per task
//
// Typical task body:
//
//     if blink.just_finished()? {
//         blink.repeat()?;
//         led.toggle();
//     }
//
// A running timer owns exactly one deadline in the Timebase registry.
// Polling a timer that isn't due lets the whole loop idle until just
// before the soonest deadline of *any* timer, so one slow task polled
// often still saves power on behalf of the rest.

use core::fmt;

use super::clock::{Clock, Sleep};
use super::registry::{DEFAULT_CAPACITY, RegistryError};
use super::ticks::Ticks;
use super::timebase::Timebase;

/// Shortest accepted period; 0, 1 and 2ms are rejected.
pub const MIN_PERIOD_MS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerError {
    /// Period below MIN_PERIOD_MS
    InvalidPeriod(u32),
    /// Period not below half the clock's wrap period, expiry can't be ordered
    PeriodTooLarge(u32),
    /// `repeat`/`restart` before any `start`
    NotConfigured,
    /// `repeat` while the current deadline is still pending
    AlreadyRunning,
    Registry(RegistryError),
}

impl fmt::Display for TimerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimerError::InvalidPeriod(ms) => {
                write!(f, "period {}ms too small (minimum {}ms)", ms, MIN_PERIOD_MS)
            }
            TimerError::PeriodTooLarge(ms) => {
                write!(f, "period {}ms exceeds half the tick range", ms)
            }
            TimerError::NotConfigured => write!(f, "timer never started"),
            TimerError::AlreadyRunning => write!(f, "can't repeat a running timer"),
            TimerError::Registry(e) => write!(f, "registry: {}", e),
        }
    }
}

impl core::error::Error for TimerError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            TimerError::Registry(e) => Some(e),
            _ => None,
        }
    }
}

impl From<RegistryError> for TimerError {
    fn from(e: RegistryError) -> Self {
        TimerError::Registry(e)
    }
}

pub struct Timer<'a, C: Clock, S: Sleep, const N: usize = DEFAULT_CAPACITY> {
    base: &'a Timebase<C, S, N>,
    period: u32,
    start: Ticks,
    end: Ticks,
    running: bool,
    finish_now: bool,
}

impl<'a, C: Clock, S: Sleep, const N: usize> Timer<'a, C, S, N> {
    pub fn new(base: &'a Timebase<C, S, N>) -> Self {
        Self {
            base,
            period: 0,
            start: Ticks::ZERO,
            end: Ticks::ZERO,
            running: false,
            finish_now: false,
        }
    }

    /// Arm for `period` ms from now, replacing any pending deadline.
    pub fn start(&mut self, period: u32) -> Result<(), TimerError> {
        if period < MIN_PERIOD_MS {
            log::warn!("timer: rejected period {}ms", period);
            return Err(TimerError::InvalidPeriod(period));
        }
        if period as u64 >= self.base.space().half_period() {
            log::warn!("timer: rejected period {}ms (tick space {})", period, self.base.space());
            return Err(TimerError::PeriodTooLarge(period));
        }

        self.stop()?;

        let start = self.base.now();
        let end = self.base.space().add(start, period);
        self.base.arm(end)?;

        self.period = period;
        self.start = start;
        self.end = end;
        self.running = true;
        self.finish_now = false;
        log::debug!("timer: start {}ms, due {}", period, end);
        Ok(())
    }

    /// `start` again with the last period.
    pub fn restart(&mut self) -> Result<(), TimerError> {
        if self.period == 0 {
            return Err(TimerError::NotConfigured);
        }
        self.start(self.period)
    }

    /// Arm the next period back to back with the previous one.
    ///
    /// The new window starts where the last one ended, not at "now", so
    /// a periodic task keeps its cadence however late it was polled. A
    /// task that fell more than a period behind gets its missed expiries
    /// reported one per poll until it catches up.
    pub fn repeat(&mut self) -> Result<(), TimerError> {
        if self.period == 0 {
            return Err(TimerError::NotConfigured);
        }
        if self.running {
            return Err(TimerError::AlreadyRunning);
        }

        let space = self.base.space();
        let start = space.add(self.start, self.period);
        let end = space.add(start, self.period);
        self.base.arm(end)?;

        self.start = start;
        self.end = end;
        self.running = true;
        self.finish_now = false;
        log::debug!("timer: repeat {}ms, due {}", self.period, end);
        Ok(())
    }

    /// Cancel the pending deadline without reporting expiry. No-op when idle.
    pub fn stop(&mut self) -> Result<(), TimerError> {
        if !self.running {
            return Ok(());
        }
        self.running = false;
        self.finish_now = false;
        self.base.disarm(self.end)?;
        log::debug!("timer: stop, was due {}", self.end);
        Ok(())
    }

    /// Report expiry on the next poll regardless of the time left.
    /// No-op when idle.
    pub fn finish(&mut self) {
        if self.running {
            self.finish_now = true;
        }
    }

    /// True exactly once per armed deadline, when it has passed (or
    /// `finish` forced it); the timer is idle afterwards.
    ///
    /// When not yet due, idles the CPU until 1ms before the soonest
    /// deadline across all timers. An idle timer returns false and
    /// does not sleep.
    pub fn just_finished(&mut self) -> Result<bool, TimerError> {
        if !self.running {
            return Ok(false);
        }

        if self.finish_now || self.expired() {
            self.stop()?;
            log::debug!("timer: expired at {}", self.base.now());
            return Ok(true);
        }

        self.base.idle();
        Ok(false)
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Last configured period, 0 if never started.
    pub fn period(&self) -> u32 {
        self.period
    }

    pub fn start_time(&self) -> Ticks {
        self.start
    }

    /// Pending deadline, if running.
    pub fn deadline(&self) -> Option<Ticks> {
        self.running.then_some(self.end)
    }

    /// Milliseconds until the deadline; 0 when idle or overdue.
    pub fn remaining(&self) -> u32 {
        if !self.running {
            return 0;
        }
        self.base.space().diff(self.end, self.base.now()).max(0) as u32
    }

    /// Milliseconds since the current window started; 0 if never started.
    pub fn elapsed(&self) -> u32 {
        if self.period == 0 {
            return 0;
        }
        self.base.space().diff(self.base.now(), self.start).max(0) as u32
    }

    fn expired(&self) -> bool {
        self.base.space().diff(self.base.now(), self.end) >= 0
    }
}

impl<C: Clock, S: Sleep, const N: usize> Drop for Timer<'_, C, S, N> {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::warn!("timer: dropped with {}", e);
        }
    }
}

impl<C: Clock, S: Sleep, const N: usize> fmt::Debug for Timer<'_, C, S, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer")
            .field("period", &self.period)
            .field("start", &self.start)
            .field("end", &self.end)
            .field("running", &self.running)
            .field("finish_now", &self.finish_now)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::sim::Sim;
    use crate::kernel::ticks::TickSpace;
    use proptest::prelude::*;

    type Base<'s> = Timebase<&'s Sim, &'s Sim, 4>;

    fn base(sim: &Sim) -> Base<'_> {
        Timebase::new(sim, sim)
    }

    // poll until the timer fires, one simulated ms per loop pass
    fn run_until_fired(sim: &Sim, t: &mut Timer<'_, &Sim, &Sim, 4>) -> Ticks {
        for _ in 0..1_000_000 {
            if t.just_finished().unwrap() {
                return sim.now();
            }
            sim.advance(1);
        }
        panic!("timer never fired: {:?}", t);
    }

    #[test]
    fn fires_once_period_has_elapsed() {
        let sim = Sim::new(0);
        let base = base(&sim);
        let mut t = base.timer();
        t.start(100).unwrap();

        sim.set(50);
        assert!(!t.just_finished().unwrap());
        // slept to 1ms short of the deadline
        assert_eq!(sim.now(), Ticks::from_raw(99));
        assert!(!t.just_finished().unwrap());

        sim.advance(1);
        assert!(t.just_finished().unwrap());
        assert!(!t.is_running());
        assert_eq!(base.pending(), 0);
    }

    #[test]
    fn fires_at_most_once_per_arm() {
        let sim = Sim::new(0);
        let base = base(&sim);
        let mut t = base.timer();
        t.start(10).unwrap();
        sim.set(10);

        assert!(t.just_finished().unwrap());
        assert!(!t.just_finished().unwrap());
        sim.advance(500);
        assert!(!t.just_finished().unwrap());
    }

    #[test]
    fn rejects_degenerate_periods() {
        let sim = Sim::new(0);
        let base = base(&sim);
        let mut t = base.timer();
        for p in 0..MIN_PERIOD_MS {
            assert_eq!(t.start(p), Err(TimerError::InvalidPeriod(p)));
        }
        assert_eq!(t.start(2), Err(TimerError::InvalidPeriod(2)));
        assert!(!t.is_running());
        assert_eq!(base.pending(), 0);
        t.start(MIN_PERIOD_MS).unwrap();
        assert!(t.is_running());
    }

    #[test]
    fn rejects_periods_beyond_half_tick_range() {
        let sim = Sim::with_space(0, TickSpace::with_bits(10));
        let base = base(&sim);
        let mut t = base.timer();
        assert_eq!(t.start(512), Err(TimerError::PeriodTooLarge(512)));
        t.start(511).unwrap();
    }

    #[test]
    fn repeat_and_restart_need_a_period() {
        let sim = Sim::new(0);
        let base = base(&sim);
        let mut t = base.timer();
        assert_eq!(t.repeat(), Err(TimerError::NotConfigured));
        assert_eq!(t.restart(), Err(TimerError::NotConfigured));
        assert_eq!(base.pending(), 0);
    }

    #[test]
    fn repeat_refuses_running_timer() {
        let sim = Sim::new(0);
        let base = base(&sim);
        let mut t = base.timer();
        t.start(20).unwrap();
        assert_eq!(t.repeat(), Err(TimerError::AlreadyRunning));
        assert_eq!(base.pending(), 1);
    }

    #[test]
    fn repeat_chains_from_previous_window() {
        let sim = Sim::new(1000);
        let base = base(&sim);
        let mut t = base.timer();
        t.start(50).unwrap();

        // observed late
        sim.set(1070);
        assert!(t.just_finished().unwrap());
        t.repeat().unwrap();
        assert_eq!(t.start_time(), Ticks::from_raw(1050));
        assert_eq!(t.deadline(), Some(Ticks::from_raw(1100)));
    }

    #[test]
    fn late_task_catches_up_one_expiry_per_poll() {
        let sim = Sim::new(0);
        let base = base(&sim);
        let mut t = base.timer();
        t.start(10).unwrap();
        sim.set(35);

        assert!(t.just_finished().unwrap()); // due 10
        t.repeat().unwrap();
        assert!(t.just_finished().unwrap()); // due 20
        t.repeat().unwrap();
        assert!(t.just_finished().unwrap()); // due 30
        t.repeat().unwrap();
        assert!(!t.just_finished().unwrap()); // due 40
    }

    #[test]
    fn thousand_repeats_do_not_drift() {
        // 12-bit counter, so the run wraps several times
        let space = TickSpace::with_bits(12);
        let sim = Sim::with_space(4000, space);
        let base = base(&sim);
        let mut t = base.timer();
        let t0 = Ticks::from_raw(4000);
        let period = 13;

        t.start(period).unwrap();
        for n in 1..=1000u32 {
            let expected = space.add(t0, n * period);
            assert_eq!(t.deadline(), Some(expected));
            let fired_at = run_until_fired(&sim, &mut t);
            assert_eq!(fired_at, expected, "expiry {}", n);
            t.repeat().unwrap();
        }
    }

    #[test]
    fn restart_uses_last_period_from_now() {
        let sim = Sim::new(0);
        let base = base(&sim);
        let mut t = base.timer();
        t.start(40).unwrap();
        sim.set(25);
        t.restart().unwrap();
        assert_eq!(t.deadline(), Some(Ticks::from_raw(65)));
        assert_eq!(base.pending(), 1);
    }

    #[test]
    fn start_while_running_replaces_deadline() {
        let sim = Sim::new(0);
        let base = base(&sim);
        let mut t = base.timer();
        t.start(40).unwrap();
        sim.set(10);
        t.start(100).unwrap();

        assert_eq!(base.pending(), 1);
        assert_eq!(base.nearest(), Some(Ticks::from_raw(110)));
        assert_eq!(t.period(), 100);
    }

    #[test]
    fn finish_forces_next_poll() {
        let sim = Sim::new(0);
        let base = base(&sim);
        let mut t = base.timer();
        t.start(1000).unwrap();
        t.finish();

        assert!(t.just_finished().unwrap());
        assert!(sim.sleeps().is_empty());
        assert!(!t.just_finished().unwrap());
        assert_eq!(base.pending(), 0);
    }

    #[test]
    fn finish_on_idle_timer_is_noop() {
        let sim = Sim::new(0);
        let base = base(&sim);
        let mut t = base.timer();
        t.finish();
        assert!(!t.is_running());
        assert!(!t.just_finished().unwrap());

        // the flag must not leak into a later start
        t.start(30).unwrap();
        assert!(!t.just_finished().unwrap());
    }

    #[test]
    fn stop_removes_exactly_one_entry() {
        let sim = Sim::new(0);
        let base = base(&sim);
        let mut a = base.timer();
        let mut b = base.timer();
        a.start(30).unwrap();
        b.start(30).unwrap();
        assert_eq!(base.pending(), 2);

        a.stop().unwrap();
        assert_eq!(base.pending(), 1);
        assert!(b.is_running());

        sim.advance(10_000);
        for _ in 0..3 {
            assert!(!a.just_finished().unwrap());
        }
        a.stop().unwrap();
        assert_eq!(base.pending(), 1);
    }

    #[test]
    fn idle_timer_poll_does_not_sleep() {
        let sim = Sim::new(0);
        let base = base(&sim);
        let mut busy = base.timer();
        let mut idle = base.timer();
        busy.start(500).unwrap();

        assert!(!idle.just_finished().unwrap());
        assert!(sim.sleeps().is_empty());
    }

    #[test]
    fn poll_sleeps_toward_global_nearest_deadline() {
        let sim = Sim::new(0);
        let base = base(&sim);
        let mut slow = base.timer();
        let mut fast = base.timer();
        slow.start(1000).unwrap();
        fast.start(50).unwrap();

        assert!(!slow.just_finished().unwrap());
        assert_eq!(sim.sleeps(), [49]);
    }

    #[test]
    fn capacity_is_enforced_through_timers() {
        let sim = Sim::new(0);
        let base: Timebase<_, _, 2> = Timebase::new(&sim, &sim);
        let mut a = base.timer();
        let mut b = base.timer();
        let mut c = base.timer();
        a.start(10).unwrap();
        b.start(20).unwrap();

        assert_eq!(
            c.start(30),
            Err(TimerError::Registry(RegistryError::Full { capacity: 2 }))
        );
        assert!(!c.is_running());

        a.stop().unwrap();
        c.start(30).unwrap();
        assert_eq!(base.pending(), 2);
    }

    #[test]
    fn desync_surfaces_on_stop() {
        let sim = Sim::new(0);
        let base = base(&sim);
        let mut t = base.timer();
        t.start(30).unwrap();
        base.with_registry_mut(|r| r.remove(Ticks::from_raw(30))).unwrap();

        assert_eq!(
            t.stop(),
            Err(TimerError::Registry(RegistryError::NotFound(Ticks::from_raw(30))))
        );
        assert!(!t.is_running());
    }

    #[test]
    fn dropping_running_timer_frees_its_slot() {
        let sim = Sim::new(0);
        let base = base(&sim);
        {
            let mut t = base.timer();
            t.start(30).unwrap();
            assert_eq!(base.pending(), 1);
        }
        assert_eq!(base.pending(), 0);
    }

    #[test]
    fn remaining_and_elapsed_track_the_window() {
        let sim = Sim::new(0);
        let base = base(&sim);
        let mut t = base.timer();
        assert_eq!(t.remaining(), 0);
        assert_eq!(t.elapsed(), 0);

        t.start(100).unwrap();
        sim.set(30);
        assert_eq!(t.remaining(), 70);
        assert_eq!(t.elapsed(), 30);

        sim.set(130);
        assert_eq!(t.remaining(), 0);
        assert_eq!(t.elapsed(), 130);
    }

    proptest! {
        #[test]
        fn never_early_never_late(
            t0 in 0u32..(1 << 30),
            period in 3u32..5000,
        ) {
            let sim = Sim::new(t0);
            let base = base(&sim);
            let mut t = base.timer();
            t.start(period).unwrap();
            let start = sim.now();

            let fired_at = run_until_fired(&sim, &mut t);
            prop_assert_eq!(TickSpace::PORTABLE.diff(fired_at, start), period as i32);
        }
    }
}
