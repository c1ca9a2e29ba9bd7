//! # Waypoint Updater library.
//!
//! Produces the lookahead segment of a pre-surveyed route for the trajectory follower. The
//! library holds everything except process bootstrap, so that the executable and the tests share
//! the same code.
//!
//! Data flows as follows:
//!
//! - Input collaborators write into the `RouteStore`, `PoseTracker` and `StopHints` through
//!   an `UpdaterInputs` handle.
//! - Each cycle the `PublishScheduler` takes a snapshot of these, the
//!   `ClosestWaypointLocator` finds the start index and the `LookaheadPlanner` builds the
//!   `Segment`.
//! - The segment is handed to a `SegmentSink` (the network publisher in the executable).

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Conversions between wire arrays and maths types
pub mod convert;

/// Input client - recieves poses, routes and stop hints from the network
pub mod input_client;

/// Localisation module - the vehicle pose and the tracker holding the latest one
pub mod loc;

/// Closest waypoint locator - finds where on the route the vehicle is
pub mod locator;

/// Parameters of the waypoint updater
pub mod params;

/// Lookahead planner - builds the segment to publish
pub mod planner;

/// Segment publisher - sends final waypoints to the trajectory follower
pub mod publisher;

/// Route definition and the write-once route store
pub mod route;

/// Publish scheduler - the fixed rate cycle
pub mod scheduler;

/// Latest-value cells shared between the input and cycle contexts
pub mod snapshot;

/// Stop hints from perception
pub mod stop_hint;

/// Waypoint updater module - locate then plan once per cycle
pub mod updater;
