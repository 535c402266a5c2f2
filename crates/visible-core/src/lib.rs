// SPDX-FileCopyrightText: 2026 Visible Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Visible work-session engine.
//!
//! This crate provides the error taxonomy, domain types, geo-distance
//! utility, clock abstraction and the collaborator traits every other crate
//! in the workspace builds on.

pub mod clock;
pub mod error;
pub mod geo;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use clock::{Clock, SystemClock};
pub use error::VisibleError;
pub use types::{
    AdapterType, ConnectionState, DeliveryStatus, HealthStatus, Medium, MediumMap, MessageId,
    Role, SessionId, UserId, WorkId,
};

pub use traits::{
    AvailabilityFlags, IdentityResolver, PluginAdapter, ProfileLookup, PushNotifier,
    StorageAdapter,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapter_type_round_trips_through_strings() {
        use std::str::FromStr;

        let variants = [
            AdapterType::Storage,
            AdapterType::Push,
            AdapterType::Identity,
            AdapterType::Gateway,
            AdapterType::Observability,
        ];
        for variant in &variants {
            let s = variant.to_string();
            let parsed = AdapterType::from_str(&s).expect("should parse back");
            assert_eq!(*variant, parsed);
        }
    }

    #[test]
    fn health_status_variants() {
        let healthy = HealthStatus::Healthy;
        assert_ne!(HealthStatus::Degraded("slow".into()), healthy);
        assert_ne!(HealthStatus::Unhealthy("down".into()), healthy);
    }

    #[test]
    fn all_traits_are_exported() {
        fn _assert_plugin_adapter<T: PluginAdapter>() {}
        fn _assert_storage_adapter<T: StorageAdapter>() {}
        fn _assert_push_notifier<T: PushNotifier>() {}
        fn _assert_flags<T: AvailabilityFlags>() {}
        fn _assert_identity<T: IdentityResolver>() {}
        fn _assert_profiles<T: ProfileLookup>() {}
    }
}
