//! # Waypoint updater module
//!
//! The waypoint updater owns the shared route, pose and stop hint state, and once per cycle
//! locates the vehicle on the route and plans the segment to publish.
//!
//! Writers (the input client, the route file loader) get an `UpdaterInputs` handle, which is
//! cheap to clone and safe to use from any thread. The cycle takes a `TickInput` snapshot of
//! everything it needs and then processes it without holding any lock.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::trace;
use serde::Serialize;
use std::{convert::TryFrom, sync::Arc};

// Internal
use crate::{
    loc::{Pose, PoseError, PoseTracker},
    locator::ClosestWaypointLocator,
    params::WpUpdaterParams,
    planner::{LookaheadPlanner, Segment},
    route::{LoadOutcome, Route, RouteError, RouteStore},
    stop_hint::{StopHintError, StopHintSnapshot, StopHints},
};
use comms_if::msg::{PoseStamped, RouteMsg, StopSource, WpInput};
use util::{
    archive::{ArchiveThread, Archived, Archiver},
    module::State,
    session::Session,
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Number of status reports which can wait to be archived. About 4 s of cycles at 30 Hz.
const ARCHIVE_QUEUE_LEN: usize = 128;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Waypoint updater module state
pub struct WaypointUpdater {
    params: WpUpdaterParams,

    route_store: Arc<RouteStore>,
    pose_tracker: Arc<PoseTracker>,
    stop_hints: Arc<StopHints>,

    locator: ClosestWaypointLocator,
    planner: LookaheadPlanner,

    pub(crate) report: StatusReport,
    arch_report: ArchiveThread<StatusReport>,
}

/// Handle through which the asynchronous inputs are written into the updater.
#[derive(Clone)]
pub struct UpdaterInputs {
    route_store: Arc<RouteStore>,
    pose_tracker: Arc<PoseTracker>,
    stop_hints: Arc<StopHints>,
}

/// Consistent copy of the inputs taken at the start of a cycle.
#[derive(Debug, Clone)]
pub struct TickInput {
    pub pose: Pose,
    pub route: Arc<Route>,
    pub stop_hints: StopHintSnapshot,
}

/// Status report for waypoint updater processing.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StatusReport {
    /// Route index of the first waypoint in the segment
    pub start_index: usize,

    /// Number of waypoints in the segment
    pub segment_len: usize,

    /// Distance from the vehicle to the first waypoint in the segment
    pub closest_dist_m: f64,

    /// True if the locator scanned its search window this cycle
    pub relocalised: bool,

    /// Offset of the stop waypoint in the segment, if there is one
    pub stop_offset: Option<usize>,

    /// True if an index had to be clamped into the route
    pub index_clamped: bool,

    /// Distance along the route to the stop waypoint, if there is one
    pub dist_to_stop_m: Option<f64>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum UpdaterError {
    #[error("Invalid waypoint updater parameters: {0}")]
    InvalidParams(String),

    #[error("Could not open the status report archive: {0}")]
    ArchiveInitError(String),

    #[error("The pose is invalid: {0}")]
    InvalidPose(PoseError),
}

/// An error rejecting one of the asynchronous inputs. The previous state is kept.
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("Pose rejected: {0}")]
    Pose(#[from] PoseError),

    #[error("Route rejected: {0}")]
    Route(#[from] RouteError),

    #[error("Stop hint rejected: {0}")]
    StopHint(#[from] StopHintError),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl WaypointUpdater {
    /// Create a new updater with the given parameters and empty inputs.
    pub fn new(params: WpUpdaterParams) -> Result<Self, UpdaterError> {
        params.validate()?;
        Ok(Self::with_params(params))
    }

    fn with_params(params: WpUpdaterParams) -> Self {
        Self {
            locator: ClosestWaypointLocator::new(params.locator.clone()),
            planner: LookaheadPlanner::new(params.lookahead_wps, params.decel),
            params,
            route_store: Arc::new(RouteStore::new()),
            pose_tracker: Arc::new(PoseTracker::new()),
            stop_hints: Arc::new(StopHints::new()),
            report: StatusReport::default(),
            arch_report: ArchiveThread::default(),
        }
    }

    pub fn params(&self) -> &WpUpdaterParams {
        &self.params
    }

    /// Get a handle for writing inputs into this updater.
    pub fn inputs(&self) -> UpdaterInputs {
        UpdaterInputs {
            route_store: self.route_store.clone(),
            pose_tracker: self.pose_tracker.clone(),
            stop_hints: self.stop_hints.clone(),
        }
    }

    /// Take a snapshot of the inputs for this cycle.
    ///
    /// Returns `None` if there is no pose or no route yet, in which case there is nothing to
    /// publish.
    pub fn snapshot(&self) -> Option<TickInput> {
        Some(TickInput {
            pose: self.pose_tracker.snapshot()?,
            route: self.route_store.snapshot()?,
            stop_hints: self.stop_hints.snapshot(),
        })
    }
}

impl Default for WaypointUpdater {
    fn default() -> Self {
        Self::with_params(WpUpdaterParams::default())
    }
}

impl State for WaypointUpdater {
    type InitData = WpUpdaterParams;
    type InitError = UpdaterError;

    type InputData = TickInput;
    type OutputData = Segment;
    type StatusReport = StatusReport;
    type ProcError = UpdaterError;

    /// Initialise the waypoint updater.
    ///
    /// Expected init data is the loaded parameters. Any inputs already written are kept.
    fn init(&mut self, init_data: Self::InitData, session: &Session)
        -> Result<(), Self::InitError>
    {
        init_data.validate()?;

        self.locator = ClosestWaypointLocator::new(init_data.locator.clone());
        self.planner = LookaheadPlanner::new(init_data.lookahead_wps, init_data.decel);

        if init_data.archive {
            let archiver = Archiver::from_path(session, "wp_updater/status_report.csv")
                .map_err(|e| UpdaterError::ArchiveInitError(e.to_string()))?;
            self.arch_report = ArchiveThread::spawn(archiver, ARCHIVE_QUEUE_LEN, "wp_updater")
                .map_err(|e| UpdaterError::ArchiveInitError(e.to_string()))?;
        }

        self.params = init_data;

        Ok(())
    }

    /// Locate the vehicle and plan the segment for this cycle.
    fn proc(&mut self, input_data: &Self::InputData)
        -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError>
    {
        // Clear the status report
        self.report = StatusReport::default();

        if !input_data.pose.is_finite() {
            return Err(UpdaterError::InvalidPose(PoseError::NonFinitePosition));
        }

        let route = input_data.route.as_ref();

        let located = self.locator.locate(&input_data.pose, route);
        let stop_hint = input_data.stop_hints.effective(route, located.index);
        let plan = self.planner.plan(route, located.index, stop_hint);

        self.report = StatusReport {
            start_index: plan.segment.start_index,
            segment_len: plan.segment.len(),
            closest_dist_m: located.dist_m,
            relocalised: located.relocalised,
            stop_offset: plan.stop_offset,
            index_clamped: located.hint_clamped || plan.index_clamped,
            dist_to_stop_m: plan.dist_to_stop_m,
        };

        trace!("WaypointUpdater status: {:?}", self.report);

        Ok((plan.segment, self.report))
    }
}

impl Archived for WaypointUpdater {
    /// Queue the status report for archiving, the file is written by the archive thread.
    fn write(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.arch_report.push(self.report)
    }
}

impl UpdaterInputs {
    /// Replace the vehicle pose.
    pub fn update_pose(&self, pose: Pose) -> Result<(), PoseError> {
        self.pose_tracker.update(pose)
    }

    pub fn handle_pose_msg(&self, msg: &PoseStamped) -> Result<(), PoseError> {
        self.update_pose(Pose::try_from(msg)?)
    }

    /// Load the route, if no route has been loaded yet.
    pub fn load_route(&self, route: Route) -> LoadOutcome {
        self.route_store.load(route)
    }

    pub fn handle_route_msg(&self, msg: &RouteMsg) -> Result<LoadOutcome, RouteError> {
        Ok(self.load_route(Route::from_msg(msg)?))
    }

    /// Set or clear the stop hint from one source. Once a route is loaded hints outside it are
    /// rejected.
    pub fn set_stop_hint(
        &self,
        source: StopSource,
        index: Option<usize>,
    ) -> Result<(), StopHintError> {
        let route = self.route_store.snapshot();
        self.stop_hints.set(source, index, route.as_deref())
    }

    /// Dispatch any input message to the right handler.
    pub fn handle(&self, input: &WpInput) -> Result<(), InputError> {
        match input {
            WpInput::Pose(msg) => self.handle_pose_msg(msg)?,
            WpInput::Route(msg) => {
                self.handle_route_msg(msg)?;
            }
            WpInput::StopHint(msg) => self.set_stop_hint(msg.source, msg.index)?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::route::{test::straight_route, Topology};
    use comms_if::msg::{Header, StopHintMsg};
    use nalgebra::Vector3;

    fn updater(lookahead_wps: usize) -> WaypointUpdater {
        let mut params = WpUpdaterParams::default();
        params.lookahead_wps = lookahead_wps;
        WaypointUpdater::new(params).unwrap()
    }

    fn tick(updater: &mut WaypointUpdater) -> (Segment, StatusReport) {
        let input = updater.snapshot().unwrap();
        updater.proc(&input).unwrap()
    }

    fn xs(segment: &Segment) -> Vec<f64> {
        segment.waypoints.iter().map(|wp| wp.position_m.x).collect()
    }

    fn velocities(segment: &Segment) -> Vec<f64> {
        segment.waypoints.iter().map(|wp| wp.velocity_ms).collect()
    }

    #[test]
    fn test_not_ready_without_pose_or_route() {
        let updater = updater(5);
        let inputs = updater.inputs();
        assert!(updater.snapshot().is_none());

        inputs
            .update_pose(Pose::from_heading(Vector3::new(3.0, 0.0, 0.0), 0.0))
            .unwrap();
        assert!(updater.snapshot().is_none());

        inputs.load_route(straight_route(10, 5.0, Topology::Open));
        assert!(updater.snapshot().is_some());
    }

    #[test]
    fn test_segment_from_route_start() {
        let mut updater = updater(5);
        let inputs = updater.inputs();
        inputs.load_route(straight_route(10, 5.0, Topology::Open));
        inputs
            .update_pose(Pose::from_heading(Vector3::new(3.0, 0.0, 0.0), 0.0))
            .unwrap();

        let (segment, report) = tick(&mut updater);
        assert_eq!(xs(&segment), vec![3.0, 4.0, 5.0, 6.0, 7.0]);
        assert_eq!(velocities(&segment), vec![5.0; 5]);
        assert_eq!(report.start_index, 3);
        assert_eq!(report.segment_len, 5);
    }

    #[test]
    fn test_open_route_truncated_at_end() {
        let mut updater = updater(5);
        let inputs = updater.inputs();
        inputs.load_route(straight_route(10, 5.0, Topology::Open));
        inputs
            .update_pose(Pose::from_heading(Vector3::new(8.0, 0.0, 0.0), 0.0))
            .unwrap();

        let (segment, _) = tick(&mut updater);
        assert_eq!(xs(&segment), vec![8.0, 9.0]);
    }

    #[test]
    fn test_closed_route_wraps() {
        let mut updater = updater(5);
        let inputs = updater.inputs();
        inputs.load_route(straight_route(10, 5.0, Topology::Closed));
        inputs
            .update_pose(Pose::from_heading(Vector3::new(8.0, 0.0, 0.0), 0.0))
            .unwrap();

        let (segment, _) = tick(&mut updater);
        assert_eq!(xs(&segment), vec![8.0, 9.0, 0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_stop_hint_ramp() {
        let mut updater = updater(5);
        let inputs = updater.inputs();
        inputs.load_route(straight_route(10, 5.0, Topology::Open));
        inputs
            .update_pose(Pose::from_heading(Vector3::new(3.0, 0.0, 0.0), 0.0))
            .unwrap();
        inputs.set_stop_hint(StopSource::Traffic, Some(5)).unwrap();

        let (segment, report) = tick(&mut updater);
        assert_eq!(velocities(&segment), vec![5.0, 2.5, 0.0, 0.0, 0.0]);
        assert_eq!(report.stop_offset, Some(2));

        // The stored route is untouched
        let route = updater.snapshot().unwrap().route;
        assert!(route.waypoints().iter().all(|wp| wp.velocity_ms == 5.0));

        // Clearing the hint restores the route velocities
        inputs.set_stop_hint(StopSource::Traffic, None).unwrap();
        let (segment, _) = tick(&mut updater);
        assert_eq!(velocities(&segment), vec![5.0; 5]);
    }

    #[test]
    fn test_nearest_stop_source_wins() {
        let mut updater = updater(8);
        let inputs = updater.inputs();
        inputs.load_route(straight_route(20, 5.0, Topology::Open));
        inputs
            .update_pose(Pose::from_heading(Vector3::new(2.0, 0.0, 0.0), 0.0))
            .unwrap();
        inputs.set_stop_hint(StopSource::Traffic, Some(8)).unwrap();
        inputs.set_stop_hint(StopSource::Obstacle, Some(6)).unwrap();

        let (_, report) = tick(&mut updater);
        assert_eq!(report.stop_offset, Some(4));

        assert!(matches!(
            inputs.set_stop_hint(StopSource::Obstacle, Some(20)),
            Err(StopHintError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_idempotent_and_monotonic() {
        let mut updater = updater(10);
        let inputs = updater.inputs();
        inputs.load_route(straight_route(200, 5.0, Topology::Open));

        let mut prev_start = 0;
        for step in 0..400 {
            let x = step as f64 * 0.45;
            inputs
                .update_pose(Pose::from_heading(Vector3::new(x, 0.3, 0.0), 0.0))
                .unwrap();

            let (first, _) = tick(&mut updater);
            let (second, _) = tick(&mut updater);

            assert_eq!(first.start_index, second.start_index);
            assert!(first.start_index >= prev_start);
            prev_start = first.start_index;
        }
    }

    #[test]
    fn test_status_archived_off_cycle() {
        let path = std::env::temp_dir()
            .join(format!("wp_updater_status_test_{}.csv", std::process::id()));

        let mut updater = updater(5);
        updater.arch_report = ArchiveThread::spawn(
            Archiver::from_file_path(&path).unwrap(),
            ARCHIVE_QUEUE_LEN,
            "wp_updater",
        )
        .unwrap();

        let inputs = updater.inputs();
        inputs.load_route(straight_route(10, 5.0, Topology::Open));
        inputs
            .update_pose(Pose::from_heading(Vector3::new(3.0, 0.0, 0.0), 0.0))
            .unwrap();

        for _ in 0..5 {
            tick(&mut updater);
            updater.write().unwrap();
        }
        assert_eq!(updater.arch_report.num_dropped(), 0);

        // Queued reports are written out when the updater is dropped
        drop(updater);
        let contents = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).ok();

        let mut lines = contents.lines();
        assert!(lines.next().unwrap().starts_with("start_index,segment_len"));
        assert_eq!(lines.filter(|l| l.starts_with("3,5,")).count(), 5);
    }

    #[test]
    fn test_second_route_ignored() {
        let updater = updater(5);
        let inputs = updater.inputs();

        assert_eq!(
            inputs.load_route(straight_route(10, 5.0, Topology::Open)),
            LoadOutcome::Loaded
        );
        assert_eq!(
            inputs.load_route(straight_route(3, 1.0, Topology::Closed)),
            LoadOutcome::AlreadyLoaded
        );

        assert_eq!(updater.route_store.snapshot().unwrap().len(), 10);
    }

    #[test]
    fn test_handle_wire_inputs() {
        let updater = updater(5);
        let inputs = updater.inputs();

        let route = straight_route(10, 5.0, Topology::Open);
        inputs
            .handle(&WpInput::Route(RouteMsg {
                lane: route.to_lane(),
                closed_loop: false,
            }))
            .unwrap();

        inputs
            .handle(&WpInput::Pose(PoseStamped {
                header: Header::now("world"),
                position_m: [1.0, 0.0, 0.0],
                orientation_q: [0.0, 0.0, 0.0, 1.0],
            }))
            .unwrap();

        inputs
            .handle(&WpInput::StopHint(StopHintMsg {
                source: StopSource::Obstacle,
                index: Some(4),
            }))
            .unwrap();

        let input = updater.snapshot().unwrap();
        assert_eq!(input.pose.position_m, Vector3::new(1.0, 0.0, 0.0));
        assert_eq!(input.stop_hints.obstacle, Some(4));

        // Bad pose keeps the previous one
        let bad = WpInput::Pose(PoseStamped {
            header: Header::now("world"),
            position_m: [std::f64::NAN, 0.0, 0.0],
            orientation_q: [0.0, 0.0, 0.0, 1.0],
        });
        assert!(matches!(inputs.handle(&bad), Err(InputError::Pose(_))));
        assert_eq!(
            updater.snapshot().unwrap().pose.position_m,
            Vector3::new(1.0, 0.0, 0.0)
        );
    }
}
