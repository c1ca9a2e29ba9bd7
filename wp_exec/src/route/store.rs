//! The write-once route store.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::sync::Arc;

use conquer_once::OnceCell;
use log::{info, warn};

use super::Route;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Holds the route for the lifetime of the process.
///
/// The first route loaded wins: any later load is ignored so the route can't change under the
/// vehicle mid-traversal. Loading is all-or-nothing, readers either see no route or the whole
/// route.
pub struct RouteStore {
    route: OnceCell<Arc<Route>>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// The result of attempting to load a route.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The route was stored
    Loaded,

    /// A route was already loaded, the new one was discarded
    AlreadyLoaded,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl RouteStore {
    pub fn new() -> Self {
        Self {
            route: OnceCell::uninit(),
        }
    }

    /// Load a route into the store, if no route has been loaded yet.
    pub fn load(&self, route: Route) -> LoadOutcome {
        let num_wps = route.len();
        let topology = route.topology();

        match self.route.try_init_once(|| Arc::new(route)) {
            Ok(()) => {
                info!(
                    "Route loaded: {} waypoints, {:?} topology",
                    num_wps, topology
                );
                LoadOutcome::Loaded
            }
            // Either already loaded or another thread is part way through loading, in both
            // cases that route wins
            Err(_) => {
                warn!("A route is already loaded, ignoring the new one");
                LoadOutcome::AlreadyLoaded
            }
        }
    }

    /// Returns true once a route has been loaded.
    pub fn is_loaded(&self) -> bool {
        self.route.is_initialized()
    }

    /// Get the loaded route, or `None` if no route has been loaded yet.
    pub fn snapshot(&self) -> Option<Arc<Route>> {
        self.route.get().cloned()
    }
}

impl Default for RouteStore {
    fn default() -> Self {
        Self::new()
    }
}
