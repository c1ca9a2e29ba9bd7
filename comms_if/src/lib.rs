//! # Communications interface crate.
//!
//! Provides the message definitions and network helpers shared between the
//! waypoint updater and the collaborators it talks to (localisation, route
//! loading, perception and the trajectory follower).

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Message definitions for poses, routes, stop hints and published lanes
pub mod msg;

/// Network module
pub mod net;
