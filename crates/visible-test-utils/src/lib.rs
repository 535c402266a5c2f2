// SPDX-FileCopyrightText: 2026 Visible Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Visible integration tests.
//!
//! Provides fakes for every collaborator the engine calls and a harness
//! that wires them to a real SQLite store and an in-memory bus.
//!
//! # Components
//!
//! - [`RecordingPush`] - push notifier that records deliveries
//! - [`MemoryFlags`] - availability flags kept in a map
//! - [`StaticProfiles`] - fixed profile directory
//! - [`ManualClock`] - clock that only moves when told to
//! - [`TestHarness`] - engine plus all of the above on a temp database

pub mod clock;
pub mod fakes;
pub mod harness;

pub use clock::ManualClock;
pub use fakes::{MemoryFlags, RecordingPush, StaticProfiles};
pub use harness::{drain, TestHarness, PROVIDER_ID, SEEKER_ID};
