// SPDX-FileCopyrightText: 2026 Visible Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query modules, one per table.

pub mod assignments;
pub mod messages;
pub mod notifications;
pub mod profiles;
pub mod sessions;
