// SPDX-FileCopyrightText: 2026 Visible Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Location pings and the distance broadcast throttle.

use chrono::{DateTime, Duration, Utc};
use visible_core::geo::{format_distance, haversine_meters};
use visible_core::types::{GeoPoint, PartyLocation, WorkSession};
use visible_core::Role;

/// When a recomputed distance is worth broadcasting.
#[derive(Debug, Clone, Copy)]
pub struct ThrottlePolicy {
    /// Movement by either party that forces a broadcast.
    pub threshold_meters: f64,
    /// Longest quiet period between broadcasts.
    pub interval: Duration,
}

impl ThrottlePolicy {
    pub fn new(threshold_meters: f64, interval_secs: u64) -> Self {
        Self {
            threshold_meters,
            interval: Duration::seconds(interval_secs as i64),
        }
    }
}

/// A distance that passed the throttle.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceReading {
    /// Haversine distance between the parties.
    pub meters: f64,
    /// Display text such as `850 meters away` or `1.2 km away`.
    pub formatted: String,
    /// When the reading was taken.
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
struct LastBroadcast {
    seeker: GeoPoint,
    provider: GeoPoint,
    at: DateTime<Utc>,
}

/// Positions and time of the last distance broadcast for one session.
#[derive(Debug, Default)]
pub struct DistanceThrottle {
    last: Option<LastBroadcast>,
}

impl DistanceThrottle {
    /// Decide whether the session's current positions warrant a broadcast.
    ///
    /// Fires when nothing was broadcast yet, when either party moved more
    /// than the threshold since the last broadcast, or when the interval has
    /// elapsed. Returns `None` until both parties have reported.
    pub fn evaluate(
        &mut self,
        session: &WorkSession,
        policy: &ThrottlePolicy,
        now: DateTime<Utc>,
    ) -> Option<DistanceReading> {
        let seeker = session.seeker_location?.point;
        let provider = session.provider_location?.point;

        let due = match self.last {
            None => true,
            Some(last) => {
                haversine_meters(last.seeker, seeker) > policy.threshold_meters
                    || haversine_meters(last.provider, provider) > policy.threshold_meters
                    || now - last.at >= policy.interval
            }
        };
        if !due {
            return None;
        }
        Some(self.record(seeker, provider, now))
    }

    /// Periodic re-check: only the elapsed-time condition applies.
    pub fn evaluate_tick(
        &mut self,
        session: &WorkSession,
        policy: &ThrottlePolicy,
        now: DateTime<Utc>,
    ) -> Option<DistanceReading> {
        let seeker = session.seeker_location?.point;
        let provider = session.provider_location?.point;
        if let Some(last) = self.last {
            if now - last.at < policy.interval {
                return None;
            }
        }
        Some(self.record(seeker, provider, now))
    }

    fn record(&mut self, seeker: GeoPoint, provider: GeoPoint, now: DateTime<Utc>) -> DistanceReading {
        self.last = Some(LastBroadcast {
            seeker,
            provider,
            at: now,
        });
        let meters = haversine_meters(seeker, provider);
        DistanceReading {
            meters,
            formatted: format_distance(meters),
            at: now,
        }
    }
}

/// Store the latest position of `role`. Always applied, throttled or not.
pub fn apply_ping(session: &mut WorkSession, role: Role, point: GeoPoint, at: DateTime<Utc>) {
    let location = Some(PartyLocation {
        point,
        updated_at: at,
    });
    match role {
        Role::Seeker => session.seeker_location = location,
        Role::Provider => session.provider_location = location,
    }
    session.updated_at = at;
}

/// Record a broadcast reading on the session.
pub fn apply_reading(session: &mut WorkSession, reading: &DistanceReading) {
    session.current_distance_meters = Some(reading.meters);
    session.last_distance_update = Some(reading.at);
}
