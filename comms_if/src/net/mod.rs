//! # Network Module
//!
//! This module provides networking helpers over ZMQ, the networking library chosen for the 
//! software.
//!
//! The waypoint updater uses two sockets: a `SUB` socket on which poses, routes and stop hints
//! arrive, and a `PUB` socket on which the final waypoints are published every cycle.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::debug;
use serde::{Deserialize, Serialize};
use zmq::{Context, Socket, SocketType};

// Export zmq
pub use zmq;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Topic prefix of the published final waypoints.
pub const FINAL_WAYPOINTS_TOPIC: &str = "final_waypoints";

// ------------------------------------------------------------------------------------------------
// MACROS
// ------------------------------------------------------------------------------------------------

macro_rules! set_sockopts {
    ($socket:expr, $(($opt:ident, $val:expr)),+) => {
        $(
            $socket.$opt($val)
                .map_err(|e| NetError::SocketOptionError(stringify!($opt).into(), e))?;
        )+
    };
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Network parameters, loaded from `net.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetParams {
    /// Endpoint the input (pose, route, stop hint) subscriber connects to
    pub input_endpoint: String,

    /// Endpoint the final waypoints publisher binds to
    pub final_waypoints_endpoint: String,
}

/// Represents options which can be set on a socket.
///
/// Most options here correspond to those found in the 
/// [`zmq_setsockopt`](http://api.zeromq.org/2-1:zmq-setsockopt) documentation.
#[derive(Debug, Clone)]
pub struct SocketOptions {

    /// Indicates if the socket should bind itself to the endpoint. Publishers should have this
    /// value set as `true`, subscribers should have it set as `false`.
    ///
    /// The default value is `false`.
    pub bind: bool,

    /// Topic prefixes a `SUB` socket subscribes to. An empty prefix subscribes to everything.
    ///
    /// The default value is a single empty prefix.
    pub subscriptions: Vec<String>,

    /// `ZMQ_LINGER`: Set linger period for socket shutdown
    pub linger: i32,

    /// `ZMQ_RECONNECT_IVL`: Set reconnection interval
    pub reconnect_ivl: i32,

    /// `ZMQ_RCVTIMEO`: Maximum time before a recv operation returns with `EAGAIN`
    pub recv_timeout: i32,

    /// `ZMQ_SNDTIMEO`: Maximum time before a send operation returns with `EAGAIN`
    pub send_timeout: i32,

    /// `ZMQ_SNDHWM`: High water mark for outbound messages
    pub send_hwm: i32,

    /// `ZMQ_RCVHWM`: High water mark for inbound messages
    pub recv_hwm: i32,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(thiserror::Error, Debug)]
pub enum NetError {
    #[error("Error creating the socket: {0}")]
    CreateSocketError(zmq::Error),

    #[error("Could not connect the socket to {0}: {1}")]
    CouldNotConnect(String, zmq::Error),

    #[error("Could not set the {0} socket option: {1}")]
    SocketOptionError(String, zmq::Error)
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SocketOptions {
    /// Set these options on the given socket.
    pub fn set(&self, socket: &Socket) -> Result<(), NetError> {

        set_sockopts!(
            socket,
            (set_linger, self.linger),
            (set_reconnect_ivl, self.reconnect_ivl),
            (set_rcvtimeo, self.recv_timeout),
            (set_sndtimeo, self.send_timeout),
            (set_sndhwm, self.send_hwm),
            (set_rcvhwm, self.recv_hwm)
        );

        if let Ok(SocketType::SUB) = socket.get_socket_type() {
            for topic in self.subscriptions.iter() {
                socket.set_subscribe(topic.as_bytes())
                    .map_err(|e| NetError::SocketOptionError("set_subscribe".into(), e))?;
            }
        }

        Ok(())
    }
}

impl Default for SocketOptions {
    fn default() -> Self {
        // Defaults for sockopts taken from http://api.zeromq.org/4-2:zmq-setsockopt
        Self {
            bind: false,
            subscriptions: vec![String::new()],
            linger: 30_000,
            reconnect_ivl: 100,
            recv_timeout: -1,
            send_timeout: -1,
            send_hwm: 1000,
            recv_hwm: 1000,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Create a socket, apply the options to it and connect or bind it to the endpoint.
///
/// ## Arguments
/// - `ctx`: the zmq context which will be used to create the socket
/// - `socket_type`: the type of zmq socket to create
/// - `socket_options`: a [`SocketOptions`] struct specifying how to configure the socket
/// - `endpoint`: a zmq endpoint string, such as `"tcp://localhost:4000"`
pub fn open_socket(
    ctx: &Context,
    socket_type: SocketType,
    socket_options: &SocketOptions,
    endpoint: &str
) -> Result<Socket, NetError> {
    let socket = ctx.socket(socket_type)
        .map_err(NetError::CreateSocketError)?;

    socket_options.set(&socket)?;

    match socket_options.bind {
        false => socket.connect(endpoint),
        true => socket.bind(endpoint)
    }.map_err(|e| NetError::CouldNotConnect(endpoint.into(), e))?;

    debug!(
        "Opened {:?} socket, {} {}",
        socket_type,
        if socket_options.bind { "bound to" } else { "connected to" },
        endpoint
    );

    Ok(socket)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_inproc_pub_sub() {
        let ctx = Context::new();

        let publisher = open_socket(
            &ctx,
            zmq::PUB,
            &SocketOptions { bind: true, linger: 0, ..Default::default() },
            "inproc://test_inproc_pub_sub"
        ).unwrap();

        let subscriber = open_socket(
            &ctx,
            zmq::SUB,
            &SocketOptions {
                subscriptions: vec![FINAL_WAYPOINTS_TOPIC.into()],
                recv_timeout: 100,
                linger: 0,
                ..Default::default()
            },
            "inproc://test_inproc_pub_sub"
        ).unwrap();

        // Subscriptions propagate asynchronously, so keep publishing until one arrives
        let mut received = None;
        for _ in 0..50 {
            publisher.send("other_topic {}", 0).unwrap();
            publisher.send(format!("{} {{}}", FINAL_WAYPOINTS_TOPIC).as_str(), 0).unwrap();

            if let Ok(Ok(msg)) = subscriber.recv_string(0) {
                received = Some(msg);
                break;
            }
        }

        assert_eq!(received, Some(format!("{} {{}}", FINAL_WAYPOINTS_TOPIC)));
    }
}
