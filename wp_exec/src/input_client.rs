//! # Input Client
//!
//! The InputClient receives the waypoint updater's asynchronous inputs from the network: vehicle
//! poses from localisation, the route from the route loader and stop hints from perception.
//!
//! Data works in a publisher-subscriber model. Each message is a JSON encoded `WpInput` and is
//! written into the updater as soon as it arrives, from a background thread, so that the publish
//! cycle never waits on the network.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
};

use log::{debug, error, warn};

use crate::updater::UpdaterInputs;
use comms_if::{
    msg::WpInput,
    net::{open_socket, zmq, NetError, SocketOptions},
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct InputClient {
    bg_jh: Option<JoinHandle<()>>,
    bg_run: Arc<AtomicBool>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum InputClientError {
    #[error("Socket error: {0}")]
    SocketError(NetError),

    #[error("Could not start the background thread: {0}")]
    ThreadError(std::io::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl InputClient {
    /// Connect to the input endpoint and start receiving inputs in the background.
    pub fn start(
        ctx: &zmq::Context,
        endpoint: &str,
        inputs: UpdaterInputs,
    ) -> Result<Self, InputClientError> {
        let socket_options = SocketOptions {
            linger: 1,
            recv_timeout: 10,
            ..Default::default()
        };

        // Connect the socket
        let socket = open_socket(ctx, zmq::SUB, &socket_options, endpoint)
            .map_err(InputClientError::SocketError)?;

        let bg_run = Arc::new(AtomicBool::new(true));
        let bg_run_clone = bg_run.clone();

        // Start BG thread
        let bg_jh = thread::Builder::new()
            .name("input_client".into())
            .spawn(move || bg_thread(socket, bg_run_clone, inputs))
            .map_err(InputClientError::ThreadError)?;

        Ok(Self {
            bg_jh: Some(bg_jh),
            bg_run,
        })
    }

    /// Stop the background thread and wait for it to finish.
    pub fn stop(&mut self) {
        self.bg_run.store(false, Ordering::Relaxed);

        if let Some(jh) = self.bg_jh.take() {
            if jh.join().is_err() {
                error!("InputClient background thread panicked");
            }
        }
    }
}

impl Drop for InputClient {
    fn drop(&mut self) {
        self.stop();
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Background thread, writes each input into the updater as it arrives.
fn bg_thread(socket: zmq::Socket, run: Arc<AtomicBool>, inputs: UpdaterInputs) {
    // While instructed to run
    while run.load(Ordering::Relaxed) {
        // Read string from the socket
        let msg = match socket.recv_string(0) {
            Ok(Ok(s)) => s,
            Ok(Err(_)) => {
                warn!("Non UTF-8 message on the input socket");
                continue;
            }
            Err(zmq::Error::EAGAIN) => continue,
            Err(e) => {
                error!("Error receiving input: {:?}", e);
                break;
            }
        };

        // Deserialize the message
        let input: WpInput = match serde_json::from_str(&msg) {
            Ok(i) => i,
            Err(e) => {
                warn!("Error deserialising input: {:?}", e);
                continue;
            }
        };

        if let WpInput::StopHint(ref hint) = input {
            debug!("Stop hint from {:?}: {:?}", hint.source, hint.index);
        }

        if let Err(e) = inputs.handle(&input) {
            warn!("{}", e);
        }
    }
}
