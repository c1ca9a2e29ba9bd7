//! Main waypoint updater executable entry point.
//!
//! # Architecture
//!
//! The general execution methodology consists of:
//!
//!     - Initialise the session, logging and parameters
//!     - Initialise the waypoint updater, loading the route from file if one is configured
//!     - Start the network input client in the background
//!     - Main loop, run by the publish scheduler at the configured rate:
//!         - Snapshot of the pose, route and stop hints
//!         - Closest waypoint location
//!         - Lookahead planning
//!         - Segment publication
//!     - On Ctrl-C or SIGTERM stop the loop and the input client

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Report};
use log::info;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

// Internal
use comms_if::{
    msg::Header,
    net::{zmq, NetParams},
};
use util::{
    host,
    logger::{logger_init, LevelFilter},
    module::State,
    session::Session,
};
use wp_lib::{
    input_client::InputClient,
    params::WpUpdaterParams,
    publisher::SegmentPublisher,
    route::{LoadOutcome, Route},
    scheduler::PublishScheduler,
    updater::WaypointUpdater,
};

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    color_eyre::install()?;

    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new("wp_exec", "sessions").wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Trace, &session).wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("Waypoint Updater Executable\n");
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let net_params: NetParams =
        util::params::load("net.toml").wrap_err("Could not load net params")?;

    let wp_params: WpUpdaterParams =
        util::params::load("wp_updater.toml").wrap_err("Could not load waypoint updater params")?;

    info!("Exec parameters loaded");

    // ---- INITIALISE MODULES ----

    info!("Initialising modules...");

    let mut updater = WaypointUpdater::default();
    updater
        .init(wp_params.clone(), &session)
        .wrap_err("Failed to initialise the WaypointUpdater")?;
    info!("WaypointUpdater init complete");

    let inputs = updater.inputs();

    // Load the route from file if there is one, otherwise it is expected over the network
    if let Some(ref file) = wp_params.route.file {
        let path = host::get_sw_root()
            .wrap_err("Could not get the software root")?
            .join(file);

        info!("Loading route from {:?}", path);

        let route = Route::from_csv(
            &path,
            Header::now(&wp_params.route.frame_id),
            wp_params.route.topology(),
            wp_params.route.default_velocity_ms,
        )
        .wrap_err("Failed to load the route file")?;

        if inputs.load_route(route) == LoadOutcome::AlreadyLoaded {
            info!("Route file ignored, a route was already loaded");
        }
    } else {
        info!("No route file configured, waiting for a route from the network");
    }

    info!("Module initialisation complete\n");

    // ---- INITIALISE NETWORK ----

    info!("Initialising network");

    let zmq_ctx = zmq::Context::new();

    let mut input_client = InputClient::start(&zmq_ctx, &net_params.input_endpoint, inputs)
        .wrap_err("Failed to initialise the InputClient")?;
    info!("InputClient initialised");

    let publisher = SegmentPublisher::new(&zmq_ctx, &net_params.final_waypoints_endpoint)
        .wrap_err("Failed to initialise the SegmentPublisher")?;
    info!("SegmentPublisher initialised");

    info!("Network initialisation complete");

    // ---- SHUTDOWN HANDLING ----

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || {
            running.store(false, Ordering::SeqCst);
        })
        .wrap_err("Failed to set the shutdown signal handler")?;
    }

    // ---- MAIN LOOP ----

    info!("Begining main loop\n");

    let mut scheduler = PublishScheduler::new(updater, publisher, running)
        .wrap_err("Failed to create the PublishScheduler")?;

    scheduler.run();

    // ---- SHUTDOWN ----

    info!("Shutdown requested");

    input_client.stop();

    info!("End of execution");

    Ok(())
}
