//! Dual wall-clock / processor-time stopwatch with lap semantics
//!
//! Every operation drives both sub-clocks together and reports the pair as
//! an [`Elapsed`]. Reading, lapping or stopping a stopwatch that is not
//! running fails with [`RLError::NotRunning`].

use std::fmt;
use std::time::{Duration, Instant};

use crate::{RLError, Result};

/// Monotonic time source measured from an arbitrary origin
pub trait Clock: Send + Sync {
    /// Current reading of the clock
    fn now(&self) -> Duration;
}

/// Wall-clock time
#[derive(Debug, Clone, Copy)]
pub struct WallClock {
    origin: Instant,
}

impl WallClock {
    /// Create a wall clock anchored at the current instant
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for WallClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for WallClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Processor time consumed by the current process
///
/// Only unix targets have a processor clock. Elsewhere this reports wall time
/// since its first reading, so `cpu` durations equal `wall` durations there.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessClock;

impl Clock for ProcessClock {
    #[cfg(unix)]
    fn now(&self) -> Duration {
        let mut ts = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        // SAFETY: `ts` is a valid, exclusively borrowed timespec for the whole call.
        let rc = unsafe { libc::clock_gettime(libc::CLOCK_PROCESS_CPUTIME_ID, &mut ts) };
        if rc != 0 {
            return Duration::ZERO;
        }
        Duration::new(
            u64::try_from(ts.tv_sec).unwrap_or(0),
            u32::try_from(ts.tv_nsec).unwrap_or(0),
        )
    }

    #[cfg(not(unix))]
    fn now(&self) -> Duration {
        static ORIGIN: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();
        ORIGIN.get_or_init(Instant::now).elapsed()
    }
}

/// Wall and processor durations measured over the same interval
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Elapsed {
    /// Wall-clock duration
    pub wall: Duration,
    /// Processor-time duration
    pub cpu: Duration,
}

impl fmt::Display for Elapsed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "wall {:.3}s, cpu {:.3}s",
            self.wall.as_secs_f64(),
            self.cpu.as_secs_f64()
        )
    }
}

/// Single-clock stopwatch
#[derive(Debug, Clone)]
pub struct SubStopwatch<C> {
    clock: C,
    lap_times: Vec<Duration>,
    lap_start: Option<Duration>,
}

impl<C: Clock> SubStopwatch<C> {
    /// Create a stopped stopwatch over `clock`
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            lap_times: Vec::new(),
            lap_start: None,
        }
    }

    /// Whether the stopwatch is running
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.lap_start.is_some()
    }

    /// Completed lap durations, oldest first
    #[must_use]
    pub fn lap_times(&self) -> &[Duration] {
        &self.lap_times
    }

    /// Start or restart; lap history is always cleared
    pub fn start(&mut self) {
        if self.is_running() {
            // A running stopwatch is stopped first; the total is discarded.
            self.lap_start = None;
        }
        self.lap_times.clear();
        self.lap_start = Some(self.clock.now());
    }

    /// Time since start: completed laps plus the open lap
    pub fn peek_time(&self) -> Result<Duration> {
        let open = self.open_lap("peek the current time")?;
        Ok(self.lap_times.iter().sum::<Duration>() + open)
    }

    /// Duration of the open lap without closing it
    pub fn peek_lap_time(&self) -> Result<Duration> {
        self.open_lap("peek the current lap time")
    }

    /// Close the open lap, record it and open a new one
    pub fn lap(&mut self) -> Result<Duration> {
        let start = self.lap_start.ok_or(RLError::NotRunning("lap"))?;
        let now = self.clock.now();
        let lap = now.saturating_sub(start);
        self.lap_times.push(lap);
        self.lap_start = Some(now);
        Ok(lap)
    }

    /// Stop and return the total; with `lap` the open lap is recorded first
    pub fn stop(&mut self, lap: bool) -> Result<Duration> {
        let start = self.lap_start.ok_or(RLError::NotRunning("stop"))?;
        let total = if lap {
            self.lap()?;
            self.lap_times.iter().sum()
        } else {
            let partial = self.clock.now().saturating_sub(start);
            self.lap_times.iter().sum::<Duration>() + partial
        };
        self.lap_start = None;
        Ok(total)
    }

    fn open_lap(&self, operation: &'static str) -> Result<Duration> {
        let start = self.lap_start.ok_or(RLError::NotRunning(operation))?;
        Ok(self.clock.now().saturating_sub(start))
    }
}

/// Wall-clock and processor-time stopwatch driven as one
#[derive(Debug, Clone)]
pub struct Stopwatch<W = WallClock, P = ProcessClock> {
    wall: SubStopwatch<W>,
    cpu: SubStopwatch<P>,
}

impl Stopwatch {
    /// Create a stopwatch over the real clocks, optionally starting it
    #[must_use]
    pub fn new(start: bool) -> Self {
        Self::with_clocks(WallClock::new(), ProcessClock, start)
    }
}

impl Default for Stopwatch {
    fn default() -> Self {
        Self::new(true)
    }
}

impl<W: Clock, P: Clock> Stopwatch<W, P> {
    /// Create a stopwatch over explicit clock sources
    pub fn with_clocks(wall: W, cpu: P, start: bool) -> Self {
        let mut stopwatch = Self {
            wall: SubStopwatch::new(wall),
            cpu: SubStopwatch::new(cpu),
        };
        if start {
            stopwatch.start();
        }
        stopwatch
    }

    /// Whether the stopwatch is running
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.wall.is_running()
    }

    /// Start or restart both clocks
    pub fn start(&mut self) {
        self.wall.start();
        self.cpu.start();
    }

    /// Time since start
    pub fn peek_time(&self) -> Result<Elapsed> {
        Ok(Elapsed {
            wall: self.wall.peek_time()?,
            cpu: self.cpu.peek_time()?,
        })
    }

    /// Close the current lap on both clocks
    pub fn lap(&mut self) -> Result<Elapsed> {
        Ok(Elapsed {
            wall: self.wall.lap()?,
            cpu: self.cpu.lap()?,
        })
    }

    /// Current open lap on both clocks
    pub fn peek_lap_time(&self) -> Result<Elapsed> {
        Ok(Elapsed {
            wall: self.wall.peek_lap_time()?,
            cpu: self.cpu.peek_lap_time()?,
        })
    }

    /// Stop both clocks and return the totals
    pub fn stop(&mut self, lap: bool) -> Result<Elapsed> {
        Ok(Elapsed {
            wall: self.wall.stop(lap)?,
            cpu: self.cpu.stop(lap)?,
        })
    }

    /// Completed wall-clock laps
    #[must_use]
    pub fn wall_lap_times(&self) -> &[Duration] {
        self.wall.lap_times()
    }

    /// Completed processor-time laps
    #[must_use]
    pub fn cpu_lap_times(&self) -> &[Duration] {
        self.cpu.lap_times()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct ManualClock(Arc<AtomicU64>);

    impl ManualClock {
        fn advance(&self, millis: u64) {
            self.0.fetch_add(millis, Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Duration {
            Duration::from_millis(self.0.load(Ordering::SeqCst))
        }
    }

    fn manual() -> (Stopwatch<ManualClock, ManualClock>, ManualClock, ManualClock) {
        let wall = ManualClock::default();
        let cpu = ManualClock::default();
        let sw = Stopwatch::with_clocks(wall.clone(), cpu.clone(), false);
        (sw, wall, cpu)
    }

    #[test]
    fn test_reads_fail_when_not_running() {
        let (mut sw, _, _) = manual();
        assert!(matches!(sw.peek_time(), Err(RLError::NotRunning(_))));
        assert!(matches!(sw.peek_lap_time(), Err(RLError::NotRunning(_))));
        assert!(matches!(sw.lap(), Err(RLError::NotRunning(_))));
        assert!(matches!(sw.stop(false), Err(RLError::NotRunning(_))));

        sw.start();
        sw.stop(true).unwrap();
        assert!(sw.stop(false).is_err());
    }

    #[test]
    fn test_lap_and_stop_with_final_lap() {
        let (mut sw, wall, cpu) = manual();
        sw.start();
        wall.advance(100);
        cpu.advance(40);
        let first = sw.lap().unwrap();
        assert_eq!(first.wall, Duration::from_millis(100));
        assert_eq!(first.cpu, Duration::from_millis(40));

        wall.advance(50);
        cpu.advance(10);
        assert_eq!(sw.peek_lap_time().unwrap().wall, Duration::from_millis(50));
        assert_eq!(sw.peek_time().unwrap().wall, Duration::from_millis(150));

        let total = sw.stop(true).unwrap();
        assert_eq!(total.wall, Duration::from_millis(150));
        assert_eq!(total.cpu, Duration::from_millis(50));
        assert_eq!(sw.wall_lap_times().len(), 2);
        assert!(!sw.is_running());
    }

    #[test]
    fn test_start_resets_history() {
        let (mut sw, wall, _) = manual();
        sw.start();
        wall.advance(10);
        sw.lap().unwrap();
        sw.start();
        assert!(sw.wall_lap_times().is_empty());
        assert!(sw.cpu_lap_times().is_empty());
        assert_eq!(sw.peek_time().unwrap().wall, Duration::ZERO);
    }

    #[test]
    fn test_real_clocks_advance() {
        let mut sw = Stopwatch::new(true);
        let mut acc = 0u64;
        for i in 0..10_000u64 {
            acc = acc.wrapping_mul(31).wrapping_add(i);
        }
        assert!(acc > 0);
        let total = sw.stop(false).unwrap();
        assert!(total.wall > Duration::ZERO);
    }

    #[cfg(unix)]
    #[test]
    fn test_process_clock_counts_busy_work() {
        let clock = ProcessClock;
        let wall = WallClock::new();
        let before = clock.now();
        let mut acc = 0u64;
        while clock.now() - before < Duration::from_millis(20) {
            acc = acc.wrapping_mul(31).wrapping_add(1);
            assert!(wall.now() < Duration::from_secs(10), "processor clock is not advancing");
        }
        assert!(acc > 0);
    }

    proptest! {
        #[test]
        fn prop_total_is_laps_plus_partial(laps in proptest::collection::vec(0u64..1_000, 0..20), tail in 0u64..1_000) {
            let (mut sw, wall, cpu) = manual();
            sw.start();
            let mut reported = Duration::ZERO;
            for millis in &laps {
                wall.advance(*millis);
                cpu.advance(*millis / 2);
                reported += sw.lap().unwrap().wall;
            }
            wall.advance(tail);
            let total = sw.stop(false).unwrap();
            prop_assert_eq!(total.wall, reported + Duration::from_millis(tail));
        }
    }
}
