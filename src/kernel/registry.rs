// Sorted deadline table shared by all timers
// NOTE: No dynamic allocation, fixed-size slot array plus a count
//
// Slots [0, len) hold pending deadlines sorted ascending under wrapping
// comparison; slots [len, N) are None. Insert and remove shift the tail
// in place, O(len), which is cheap for the handful of tasks a control
// loop runs.

use core::fmt;

use super::ticks::{TickSpace, Ticks};

/// Default number of concurrently running timers.
pub const DEFAULT_CAPACITY: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    /// Every slot is taken: more timers running than the table was sized for
    Full { capacity: usize },
    /// The deadline to remove is not in the table (timer/registry desync)
    NotFound(Ticks),
    /// No pending deadlines
    Empty,
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::Full { capacity } => {
                write!(f, "deadline table full ({} slots)", capacity)
            }
            RegistryError::NotFound(deadline) => {
                write!(f, "deadline {} not in table", deadline)
            }
            RegistryError::Empty => write!(f, "deadline table empty"),
        }
    }
}

impl core::error::Error for RegistryError {}

pub struct Registry<const N: usize> {
    slots: [Option<Ticks>; N],
    len: usize,
    space: TickSpace,
}

impl<const N: usize> Registry<N> {
    pub const fn new(space: TickSpace) -> Self {
        Self {
            slots: [None; N],
            len: 0,
            space,
        }
    }

    /// Insert `deadline` after any entries due at or before it.
    ///
    /// Returns the slot it landed in. The position is only meaningful
    /// until the next insert or remove shifts the table.
    pub fn insert(&mut self, deadline: Ticks) -> Result<usize, RegistryError> {
        if self.len >= N {
            log::warn!("registry: no slot for {} ({} in use)", deadline, N);
            return Err(RegistryError::Full { capacity: N });
        }

        // common case: a periodic task re-arms later than everything queued
        let at = if self.len == 0 || self.is_due_before_or_with(self.len - 1, deadline) {
            self.len
        } else {
            self.slots[..self.len]
                .iter()
                .position(|slot| {
                    slot.is_some_and(|t| self.space.diff(t, deadline) > 0)
                })
                .unwrap_or(self.len)
        };

        let mut i = self.len;
        while i > at {
            self.slots[i] = self.slots[i - 1];
            i -= 1;
        }
        self.slots[at] = Some(deadline);
        self.len += 1;

        log::trace!("registry: +{} at slot {} ({}/{})", deadline, at, self.len, N);
        Ok(at)
    }

    /// Remove the first entry equal to `deadline`, compacting the tail.
    pub fn remove(&mut self, deadline: Ticks) -> Result<(), RegistryError> {
        let Some(at) = self.slots[..self.len]
            .iter()
            .position(|slot| *slot == Some(deadline))
        else {
            log::warn!("registry: {} missing on remove", deadline);
            return Err(RegistryError::NotFound(deadline));
        };

        for i in at..self.len - 1 {
            self.slots[i] = self.slots[i + 1];
        }
        self.len -= 1;
        self.slots[self.len] = None;

        log::trace!("registry: -{} from slot {} ({}/{})", deadline, at, self.len, N);
        Ok(())
    }

    /// Milliseconds from `now` to the soonest deadline; zero or negative
    /// when it is already due.
    pub fn time_until_nearest(&self, now: Ticks) -> Result<i32, RegistryError> {
        self.nearest()
            .map(|deadline| self.space.diff(deadline, now))
            .ok_or(RegistryError::Empty)
    }

    pub fn nearest(&self) -> Option<Ticks> {
        if self.len == 0 { None } else { self.slots[0] }
    }

    pub fn contains(&self, deadline: Ticks) -> bool {
        self.iter().any(|t| t == deadline)
    }

    /// Pending deadlines, soonest first.
    pub fn iter(&self) -> impl Iterator<Item = Ticks> + '_ {
        self.slots[..self.len].iter().flatten().copied()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len >= N
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn space(&self) -> TickSpace {
        self.space
    }

    fn is_due_before_or_with(&self, slot: usize, deadline: Ticks) -> bool {
        self.slots[slot].is_some_and(|t| self.space.diff(t, deadline) <= 0)
    }
}

impl<const N: usize> fmt::Debug for Registry<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("space", &self.space)
            .field("pending", &&self.slots[..self.len])
            .finish()
    }
}
