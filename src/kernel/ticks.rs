// Wrapping millisecond timestamps
//
// Hardware and runtime tick counters wrap. Every comparison between two
// timestamps goes through TickSpace::diff, which folds the raw difference
// into (-period/2, period/2], so ordering stays correct across the wrap
// as long as the two stamps are less than half a period apart.

use core::cmp::Ordering;
use core::fmt;

/// A point on a wrapping millisecond counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Ticks(u32);

impl Ticks {
    pub const ZERO: Ticks = Ticks(0);

    /// Raw counter value. The caller is responsible for it lying inside
    /// the clock's tick space; use [`TickSpace::wrap`] when unsure.
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Ticks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// The modulus a tick counter wraps at, always a power of two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickSpace {
    bits: u32,
}

impl TickSpace {
    /// 2^30, the small-int range used by interpreted embedded runtimes.
    pub const PORTABLE: TickSpace = TickSpace::with_bits(30);

    /// Full 32-bit counter, e.g. a truncated 64-bit millisecond clock.
    pub const FULL: TickSpace = TickSpace::with_bits(32);

    /// Counter wrapping at `2^bits`. Panics (at compile time when used in
    /// a const) for widths outside 2..=32.
    pub const fn with_bits(bits: u32) -> Self {
        assert!(bits >= 2 && bits <= 32, "tick width must be 2..=32 bits");
        Self { bits }
    }

    pub const fn bits(self) -> u32 {
        self.bits
    }

    pub const fn period(self) -> u64 {
        1u64 << self.bits
    }

    /// Largest distance two stamps may be apart and still order correctly.
    pub const fn half_period(self) -> u64 {
        self.period() / 2
    }

    const fn mask(self) -> u32 {
        (self.period() - 1) as u32
    }

    pub const fn wrap(self, raw: u32) -> Ticks {
        Ticks(raw & self.mask())
    }

    /// `t + ms`, wrapping.
    pub const fn add(self, t: Ticks, ms: u32) -> Ticks {
        Ticks(t.0.wrapping_add(ms) & self.mask())
    }

    /// `t - ms`, wrapping.
    pub const fn sub(self, t: Ticks, ms: u32) -> Ticks {
        Ticks(t.0.wrapping_sub(ms) & self.mask())
    }

    /// Signed `a - b`, correct across the wrap point.
    pub const fn diff(self, a: Ticks, b: Ticks) -> i32 {
        // 2^bits divides 2^32, so masking the 32-bit wrapping difference
        // gives the difference modulo the period
        let d = a.0.wrapping_sub(b.0) & self.mask();
        if d as u64 >= self.half_period() {
            (d as i64 - self.period() as i64) as i32
        } else {
            d as i32
        }
    }

    /// Orders `a` against `b` as if neither had wrapped.
    pub fn cmp(self, a: Ticks, b: Ticks) -> Ordering {
        self.diff(a, b).cmp(&0)
    }
}

impl Default for TickSpace {
    fn default() -> Self {
        Self::PORTABLE
    }
}

impl fmt::Display for TickSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "2^{}", self.bits)
    }
}
