//! # Segment publisher
//!
//! Publishes each cycle's segment to the trajectory follower as a JSON encoded `Lane` on the
//! `final_waypoints` topic.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::net::{open_socket, zmq, NetError, SocketOptions, FINAL_WAYPOINTS_TOPIC};

use crate::{planner::Segment, scheduler::SegmentSink};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct SegmentPublisher {
    socket: zmq::Socket,

    /// Sequence number given to the next published lane
    seq: u64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum PublisherError {
    #[error("Socket error: {0}")]
    SocketError(NetError),

    #[error("Could not serialize the segment: {0}")]
    SerializationError(serde_json::Error),

    #[error("Could not send the segment: {0}")]
    SendError(zmq::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SegmentPublisher {
    /// Bind the publisher to the given endpoint.
    pub fn new(ctx: &zmq::Context, endpoint: &str) -> Result<Self, PublisherError> {
        let socket_options = SocketOptions {
            bind: true,
            linger: 1,
            send_timeout: 10,
            // Only the latest segment is of any use to a subscriber
            send_hwm: 1,
            ..Default::default()
        };

        let socket = open_socket(ctx, zmq::PUB, &socket_options, endpoint)
            .map_err(PublisherError::SocketError)?;

        Ok(Self { socket, seq: 0 })
    }
}

impl SegmentSink for SegmentPublisher {
    type Error = PublisherError;

    fn publish(&mut self, segment: &Segment) -> Result<(), Self::Error> {
        let mut lane = segment.to_lane();
        lane.header.seq = self.seq;

        let json = serde_json::to_string(&lane).map_err(PublisherError::SerializationError)?;

        self.socket
            .send(format!("{} {}", FINAL_WAYPOINTS_TOPIC, json).as_str(), 0)
            .map_err(PublisherError::SendError)?;

        self.seq = self.seq.wrapping_add(1);

        Ok(())
    }
}
