//! Loading routes from waypoint files.
//!
//! Route files are headerless CSVs with one waypoint per row:
//!
//! ```text
//! x, y, z, yaw[, velocity]
//! ```
//!
//! Positions are in meters, yaw in radians and velocity in meters per second. Rows without a
//! velocity take the default velocity given to the loader.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::{io::Read, path::Path};

use comms_if::msg::Header;
use csv::{ReaderBuilder, StringRecord, Trim};
use log::debug;
use nalgebra::Vector3;

use super::{Route, RouteError, Topology, Waypoint};

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Route {
    /// Load a route from a waypoint file.
    pub fn from_csv<P: AsRef<Path>>(
        path: P,
        header: Header,
        topology: Topology,
        default_velocity_ms: f64,
    ) -> Result<Self, RouteError> {
        let reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(Trim::All)
            .from_path(path.as_ref())
            .map_err(RouteError::CsvError)?;

        debug!("Loading route from {:?}", path.as_ref());

        Self::from_csv_records(reader, header, topology, default_velocity_ms)
    }

    /// Load a route from any reader producing waypoint file contents.
    pub fn from_csv_reader<R: Read>(
        reader: R,
        header: Header,
        topology: Topology,
        default_velocity_ms: f64,
    ) -> Result<Self, RouteError> {
        let reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(reader);

        Self::from_csv_records(reader, header, topology, default_velocity_ms)
    }

    fn from_csv_records<R: Read>(
        mut reader: csv::Reader<R>,
        header: Header,
        topology: Topology,
        default_velocity_ms: f64,
    ) -> Result<Self, RouteError> {
        let mut waypoints = Vec::new();

        for (row, record) in reader.records().enumerate() {
            let record = record.map_err(RouteError::CsvError)?;
            waypoints.push(parse_row(&record, row, default_velocity_ms)?);
        }

        Self::new(header, waypoints, topology)
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn parse_row(
    record: &StringRecord,
    row: usize,
    default_velocity_ms: f64,
) -> Result<Waypoint, RouteError> {
    if record.len() < 4 {
        return Err(RouteError::MalformedCsvRow(row));
    }

    let field = |i: usize| -> Result<f64, RouteError> {
        record
            .get(i)
            .and_then(|f| f.parse::<f64>().ok())
            .filter(|v| v.is_finite())
            .ok_or(RouteError::MalformedCsvRow(row))
    };

    let velocity_ms = match record.get(4) {
        Some(f) if !f.is_empty() => field(4)?,
        _ => default_velocity_ms,
    };

    Ok(Waypoint::from_yaw(
        Vector3::new(field(0)?, field(1)?, field(2)?),
        field(3)?,
        velocity_ms,
    ))
}
