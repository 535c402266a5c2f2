// SPDX-FileCopyrightText: 2026 Visible Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Great-circle distance and its human-readable rendering.

use crate::types::GeoPoint;

/// Mean Earth radius used by the haversine formula, in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Great-circle distance between two coordinates, in meters.
pub fn haversine_meters(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlat = (b.latitude - a.latitude).to_radians();
    let dlng = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    // Clamp guards against rounding pushing h marginally above 1.
    let c = 2.0 * h.sqrt().min(1.0).asin();
    EARTH_RADIUS_METERS * c
}

/// Render a distance the way both parties see it.
///
/// Below one kilometer the value is whole meters (truncated, so 999.9 m
/// stays in meters); from one kilometer up it is kilometers with one decimal.
pub fn format_distance(meters: f64) -> String {
    if meters < 1000.0 {
        format!("{} meters away", meters.max(0.0) as u64)
    } else {
        format!("{:.1} km away", meters / 1000.0)
    }
}
