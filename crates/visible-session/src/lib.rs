// SPDX-FileCopyrightText: 2026 Visible Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Real-time coordination of a work session between a seeker and a provider.
//!
//! [`SessionEngine`] owns the lifecycle of every session: dispatch and
//! acceptance, the `waiting -> active -> cancelled | completed` state
//! machine, throttled distance tracking, contact-medium negotiation and the
//! anonymous chat. It talks to the outside world only through the traits in
//! `visible-core` and the [`EventBus`](visible_bus::EventBus).

pub mod chat;
pub mod dispatch;
pub mod engine;
pub mod machine;
pub mod registry;
pub mod ticker;
pub mod tracker;

pub use engine::{
    AssignWork, AssignmentResponse, EngineDeps, MediumSelection, ResumedSession, SessionEngine,
    SweepReport,
};
pub use machine::RatingRequest;
pub use tracker::DistanceReading;
