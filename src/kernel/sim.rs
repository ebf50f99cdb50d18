// Simulated platform for host tests: a settable clock whose sleep
// advances time by exactly the requested amount.

use core::cell::{Cell, RefCell};

use super::clock::{Clock, Sleep};
use super::ticks::{TickSpace, Ticks};

pub struct Sim {
    now: Cell<u32>,
    space: TickSpace,
    sleeps: RefCell<Vec<u32>>,
}

impl Sim {
    pub fn new(now: u32) -> Self {
        Self::with_space(now, TickSpace::PORTABLE)
    }

    pub fn with_space(now: u32, space: TickSpace) -> Self {
        Self {
            now: Cell::new(space.wrap(now).raw()),
            space,
            sleeps: RefCell::new(Vec::new()),
        }
    }

    pub fn set(&self, now: u32) {
        self.now.set(self.space.wrap(now).raw());
    }

    pub fn advance(&self, ms: u32) {
        self.now.set(self.space.add(Ticks::from_raw(self.now.get()), ms).raw());
    }

    pub fn sleeps(&self) -> Vec<u32> {
        self.sleeps.borrow().clone()
    }
}

impl Clock for Sim {
    fn now(&self) -> Ticks {
        Ticks::from_raw(self.now.get())
    }

    fn space(&self) -> TickSpace {
        self.space
    }
}

impl Sleep for Sim {
    fn light_sleep(&self, ms: u32) {
        self.sleeps.borrow_mut().push(ms);
        self.advance(ms);
    }
}
