// pulp-delay demo for the ESP32-C3
//
// Boot sequence: logger -> wake tick -> timebase -> arm tasks
// Main loop: poll every task's timer; a poll that isn't due parks the
// core in WFI until 1ms before the nearest deadline of any task.
//
// TIMG0 runs a 1ms periodic interrupt whose only job is to bring the
// core back out of WFI so WfiSleep can re-check the clock.

#![no_std]
#![no_main]

use esp_backtrace as _;
use esp_hal::clock::CpuClock;
use esp_hal::time::{Duration, Instant};
use esp_hal::timer::PeriodicTimer;
use esp_hal::timer::timg::TimerGroup;
use log::info;

use core::cell::RefCell;
use critical_section::Mutex;

use pulp_delay::{Clock, DefaultTimebase, TickSpace, Ticks, Timebase, WfiSleep};

esp_bootloader_esp_idf::esp_app_desc!();

const WAKE_TICK_MS: u64 = 1;

const HEARTBEAT_MS: u32 = 1_000;
const STATUS_MS: u32 = 5_000;
const HOUSEKEEPING_MS: u32 = 30_000;

static TIMER0: Mutex<RefCell<Option<PeriodicTimer<'static, esp_hal::Blocking>>>> =
    Mutex::new(RefCell::new(None));

#[esp_hal::handler(priority = esp_hal::interrupt::Priority::Priority1)]
fn timer0_handler() {
    critical_section::with(|cs| {
        if let Some(timer) = TIMER0.borrow_ref_mut(cs).as_mut() {
            timer.clear_interrupt();
        }
    });
}

// systimer-backed uptime, truncated to 32 bits (wraps every ~49 days)
#[derive(Clone, Copy)]
struct EspClock;

impl Clock for EspClock {
    fn now(&self) -> Ticks {
        Ticks::from_raw(Instant::now().duration_since_epoch().as_millis() as u32)
    }

    fn space(&self) -> TickSpace {
        TickSpace::FULL
    }
}

#[esp_hal::main]
fn main() -> ! {
    esp_println::logger::init_logger_from_env();
    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    info!("booting...");

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    let mut timer0 = PeriodicTimer::new(timg0.timer0);
    critical_section::with(|cs| {
        timer0.set_interrupt_handler(timer0_handler);
        timer0.start(Duration::from_millis(WAKE_TICK_MS)).unwrap();
        timer0.listen();
        TIMER0.borrow_ref_mut(cs).replace(timer0);
    });
    info!("wake tick initialized.");

    let base: DefaultTimebase<EspClock, WfiSleep<EspClock>> =
        Timebase::new(EspClock, WfiSleep::new(EspClock));

    let mut heartbeat = base.timer();
    let mut status = base.timer();
    let mut housekeeping = base.timer();

    heartbeat.start(HEARTBEAT_MS).unwrap();
    status.start(STATUS_MS).unwrap();
    housekeeping.start(HOUSEKEEPING_MS).unwrap();
    // run housekeeping once right after boot, then on its period
    housekeeping.finish();
    info!("timers armed ({} pending).", base.pending());

    let mut beats: u32 = 0;
    let mut sweeps: u32 = 0;

    loop {
        if heartbeat.just_finished().unwrap() {
            heartbeat.repeat().unwrap();
            beats = beats.wrapping_add(1);
            info!("heartbeat #{}", beats);
        }

        if status.just_finished().unwrap() {
            status.repeat().unwrap();
            info!(
                "status: {} timers pending, next due in {:?}ms",
                base.pending(),
                base.time_until_nearest()
            );
        }

        if housekeeping.just_finished().unwrap() {
            // housekeeping may run long; measure from when it finished
            sweeps = sweeps.wrapping_add(1);
            info!("housekeeping #{} at {}", sweeps, base.now());
            housekeeping.restart().unwrap();
        }
    }
}
