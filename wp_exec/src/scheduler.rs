//! # Publish scheduler
//!
//! Runs the waypoint updater at a fixed rate and hands each segment to a `SegmentSink`.
//!
//! The scheduler is `Idle` until both a pose and a route are available, and `Active` from then
//! on. Idle cycles publish nothing. If a cycle overruns its period the next one starts
//! immediately, there is no attempt to catch up on missed cycles.
//!
//! Shutdown is cooperative: the scheduler checks the shared running flag at the start of every
//! cycle and returns from `run` once it is cleared.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    fmt::Display,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use log::{debug, info, warn};

use crate::{planner::Segment, updater::WaypointUpdater};
use util::{archive::Archived, module::State};

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Destination of the published segments.
pub trait SegmentSink {
    type Error: Display;

    fn publish(&mut self, segment: &Segment) -> Result<(), Self::Error>;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct PublishScheduler<S: SegmentSink> {
    updater: WaypointUpdater,
    sink: S,

    /// Target period of one cycle
    period: Duration,

    running: Arc<AtomicBool>,
    state: SchedulerState,

    num_cycles: u128,
    num_consec_overruns: u64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SchedulerState {
    /// No pose or no route yet
    Idle,

    /// Publishing every cycle
    Active,
}

/// What happened on one cycle.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Idle,
    Published { start_index: usize, len: usize },
    PublishFailed,
    ProcFailed,
}

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("Invalid publish rate: {0} Hz")]
    InvalidRate(f64),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<S: SegmentSink> PublishScheduler<S> {
    /// Create a new scheduler running at the updater's `refresh_rate_hz`.
    ///
    /// The scheduler runs until `running` is cleared.
    pub fn new(
        updater: WaypointUpdater,
        sink: S,
        running: Arc<AtomicBool>,
    ) -> Result<Self, SchedulerError> {
        let rate_hz = updater.params().refresh_rate_hz;
        if !rate_hz.is_finite() || rate_hz <= 0.0 {
            return Err(SchedulerError::InvalidRate(rate_hz));
        }

        Ok(Self {
            updater,
            sink,
            period: Duration::from_secs_f64(1.0 / rate_hz),
            running,
            state: SchedulerState::Idle,
            num_cycles: 0,
            num_consec_overruns: 0,
        })
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn num_cycles(&self) -> u128 {
        self.num_cycles
    }

    pub fn num_consec_overruns(&self) -> u64 {
        self.num_consec_overruns
    }

    pub fn updater(&self) -> &WaypointUpdater {
        &self.updater
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Run one cycle.
    pub fn tick(&mut self) -> TickOutcome {
        let input = match self.updater.snapshot() {
            Some(i) => i,
            None => {
                self.set_state(SchedulerState::Idle);
                return TickOutcome::Idle;
            }
        };
        self.set_state(SchedulerState::Active);

        let (segment, _) = match self.updater.proc(&input) {
            Ok(o) => o,
            Err(e) => {
                warn!("Waypoint updater processing failed: {}", e);
                return TickOutcome::ProcFailed;
            }
        };

        if let Err(e) = self.updater.write() {
            warn!("Could not archive the waypoint updater status: {}", e);
        }

        match self.sink.publish(&segment) {
            Ok(()) => TickOutcome::Published {
                start_index: segment.start_index,
                len: segment.len(),
            },
            Err(e) => {
                warn!("Could not publish the segment: {}", e);
                TickOutcome::PublishFailed
            }
        }
    }

    /// Run cycles at the target rate until the running flag is cleared.
    pub fn run(&mut self) {
        info!(
            "Publish scheduler running at {:.1} Hz",
            1.0 / self.period.as_secs_f64()
        );

        while self.running.load(Ordering::SeqCst) {
            // Get cycle start time
            let cycle_start_instant = Instant::now();

            self.tick();

            // ---- CYCLE MANAGEMENT ----

            let cycle_dur = Instant::now() - cycle_start_instant;

            if let Some(d) = self.sleep_duration(cycle_dur) {
                thread::sleep(d);
            }

            // Increment cycle counter
            self.num_cycles += 1;
        }

        info!(
            "Publish scheduler stopped after {} cycles",
            self.num_cycles
        );
    }

    /// Time left to sleep before the next cycle, given how long this one took.
    ///
    /// `None` if the cycle overran, in which case the next cycle starts immediately. Missed
    /// cycles are not made up.
    fn sleep_duration(&mut self, cycle_dur: Duration) -> Option<Duration> {
        match self.period.checked_sub(cycle_dur) {
            Some(d) => {
                self.num_consec_overruns = 0;
                Some(d)
            }
            None => {
                self.num_consec_overruns += 1;
                warn!(
                    "Cycle overran by {:.06} s ({} consecutive)",
                    cycle_dur.as_secs_f64() - self.period.as_secs_f64(),
                    self.num_consec_overruns
                );
                None
            }
        }
    }

    fn set_state(&mut self, state: SchedulerState) {
        if state != self.state {
            match state {
                SchedulerState::Active => info!("Pose and route available, publishing segments"),
                SchedulerState::Idle => debug!("Waiting for a pose and a route"),
            }
            self.state = state;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        loc::Pose,
        params::WpUpdaterParams,
        route::{test::straight_route, Topology},
    };
    use nalgebra::Vector3;

    #[derive(Default)]
    struct VecSink {
        segments: Vec<Segment>,
    }

    impl SegmentSink for VecSink {
        type Error = std::convert::Infallible;

        fn publish(&mut self, segment: &Segment) -> Result<(), Self::Error> {
            self.segments.push(segment.clone());
            Ok(())
        }
    }

    struct FailingSink;

    impl SegmentSink for FailingSink {
        type Error = &'static str;

        fn publish(&mut self, _segment: &Segment) -> Result<(), Self::Error> {
            Err("link down")
        }
    }

    /// Takes longer than the cycle period on every other publish.
    struct SlowSink {
        delay: Duration,
        publish_instants: Vec<Instant>,
    }

    impl SegmentSink for SlowSink {
        type Error = std::convert::Infallible;

        fn publish(&mut self, _segment: &Segment) -> Result<(), Self::Error> {
            self.publish_instants.push(Instant::now());
            if self.publish_instants.len() % 2 == 1 {
                thread::sleep(self.delay);
            }
            Ok(())
        }
    }

    fn updater() -> WaypointUpdater {
        let mut params = WpUpdaterParams::default();
        params.lookahead_wps = 5;
        params.refresh_rate_hz = 100.0;
        WaypointUpdater::new(params).unwrap()
    }

    #[test]
    fn test_idle_until_inputs_ready() {
        let updater = updater();
        let inputs = updater.inputs();
        let mut sched =
            PublishScheduler::new(updater, VecSink::default(), Arc::new(AtomicBool::new(true)))
                .unwrap();

        assert_eq!(sched.tick(), TickOutcome::Idle);
        assert_eq!(sched.state(), SchedulerState::Idle);

        inputs.load_route(straight_route(10, 5.0, Topology::Open));
        assert_eq!(sched.tick(), TickOutcome::Idle);

        inputs
            .update_pose(Pose::from_heading(Vector3::new(3.0, 0.0, 0.0), 0.0))
            .unwrap();
        assert_eq!(
            sched.tick(),
            TickOutcome::Published {
                start_index: 3,
                len: 5
            }
        );
        assert_eq!(sched.state(), SchedulerState::Active);
        assert_eq!(sched.sink().segments.len(), 1);
    }

    #[test]
    fn test_publish_failure_keeps_running() {
        let updater = updater();
        let inputs = updater.inputs();
        inputs.load_route(straight_route(10, 5.0, Topology::Open));
        inputs
            .update_pose(Pose::from_heading(Vector3::new(3.0, 0.0, 0.0), 0.0))
            .unwrap();

        let mut sched =
            PublishScheduler::new(updater, FailingSink, Arc::new(AtomicBool::new(true))).unwrap();
        assert_eq!(sched.tick(), TickOutcome::PublishFailed);
        assert_eq!(sched.tick(), TickOutcome::PublishFailed);
        assert_eq!(sched.state(), SchedulerState::Active);
    }

    #[test]
    fn test_period_from_rate() {
        let sched = PublishScheduler::new(
            updater(),
            VecSink::default(),
            Arc::new(AtomicBool::new(true)),
        )
        .unwrap();

        assert_eq!(sched.period(), Duration::from_millis(10));
    }

    #[test]
    fn test_run_stops_on_shutdown() {
        let updater = updater();
        let inputs = updater.inputs();
        inputs.load_route(straight_route(10, 5.0, Topology::Closed));
        inputs
            .update_pose(Pose::from_heading(Vector3::new(8.0, 0.0, 0.0), 0.0))
            .unwrap();

        let running = Arc::new(AtomicBool::new(true));
        let mut sched = PublishScheduler::new(updater, VecSink::default(), running.clone()).unwrap();

        let stopper = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            running.store(false, Ordering::SeqCst);
        });

        sched.run();
        stopper.join().unwrap();

        assert!(sched.num_cycles() > 0);
        assert_eq!(sched.sink().segments.len() as u128, sched.num_cycles());

        let xs: Vec<f64> = sched.sink().segments[0]
            .waypoints
            .iter()
            .map(|wp| wp.position_m.x)
            .collect();
        assert_eq!(xs, vec![8.0, 9.0, 0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_consecutive_overruns_counted() {
        let mut sched = PublishScheduler::new(
            updater(),
            VecSink::default(),
            Arc::new(AtomicBool::new(true)),
        )
        .unwrap();
        let period = sched.period();

        assert_eq!(sched.sleep_duration(period + Duration::from_millis(1)), None);
        assert_eq!(sched.num_consec_overruns(), 1);
        assert_eq!(sched.sleep_duration(period * 3), None);
        assert_eq!(sched.num_consec_overruns(), 2);

        // A short cycle sleeps out the rest of the period, never the missed ones
        assert_eq!(
            sched.sleep_duration(Duration::from_millis(4)),
            Some(period - Duration::from_millis(4))
        );
        assert_eq!(sched.num_consec_overruns(), 0);
    }

    #[test]
    fn test_overrun_starts_next_cycle_immediately() {
        let mut params = WpUpdaterParams::default();
        params.lookahead_wps = 5;
        params.refresh_rate_hz = 50.0;
        let updater = WaypointUpdater::new(params).unwrap();

        let inputs = updater.inputs();
        inputs.load_route(straight_route(10, 5.0, Topology::Open));
        inputs
            .update_pose(Pose::from_heading(Vector3::new(3.0, 0.0, 0.0), 0.0))
            .unwrap();

        let sink = SlowSink {
            delay: Duration::from_millis(35),
            publish_instants: Vec::new(),
        };
        let running = Arc::new(AtomicBool::new(true));
        let mut sched = PublishScheduler::new(updater, sink, running.clone()).unwrap();
        assert_eq!(sched.period(), Duration::from_millis(20));

        let stopper = thread::spawn(move || {
            thread::sleep(Duration::from_millis(400));
            running.store(false, Ordering::SeqCst);
        });

        let start = Instant::now();
        sched.run();
        let elapsed = start.elapsed();
        stopper.join().unwrap();

        let instants = &sched.sink().publish_instants;
        assert!(instants.len() >= 4);

        for (i, pair) in instants.windows(2).enumerate() {
            let gap = pair[1] - pair[0];

            // After a slow publish the next cycle starts as soon as it returns, without
            // sleeping a further period
            if i % 2 == 0 {
                assert!(gap >= Duration::from_millis(35));
                assert!(gap < Duration::from_millis(35 + 15));
            }

            // No burst of cycles to catch up
            assert!(gap >= Duration::from_millis(15));
        }

        // A slow and a normal cycle together take about 55 ms. Replaying missed cycles would
        // instead give one cycle per 20 ms period.
        let max_cycles = 2 * elapsed.as_millis() / 55 + 2;
        assert!(sched.num_cycles() <= max_cycles);
        assert_eq!(sched.num_cycles(), instants.len() as u128);
    }

    #[test]
    fn test_run_returns_immediately_when_stopped() {
        let mut sched = PublishScheduler::new(
            updater(),
            VecSink::default(),
            Arc::new(AtomicBool::new(false)),
        )
        .unwrap();

        sched.run();
        assert_eq!(sched.num_cycles(), 0);
    }
}
