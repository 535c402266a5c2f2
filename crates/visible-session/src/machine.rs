// SPDX-FileCopyrightText: 2026 Visible Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Work-session transitions.
//!
//! Every function here is pure: it checks the actor and the current state,
//! then mutates the in-memory record. Persisting and publishing is the
//! engine's job, done while the session lock is still held.

use chrono::{DateTime, Utc};
use visible_core::types::{ConnectionState, Identity, MediumMap, Rating, Termination, WorkSession};
use visible_core::{Role, VisibleError};

/// Rating fields exactly as the client supplied them.
///
/// `stars` stays wide so that out-of-range values reach validation instead
/// of failing deserialization with a less useful message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RatingRequest {
    /// Requested star count, unchecked.
    pub stars: Option<i64>,
    pub description: Option<String>,
}

impl RatingRequest {
    pub fn is_empty(&self) -> bool {
        self.stars.is_none() && self.description.is_none()
    }
}

/// The role `actor` plays in `session`.
///
/// The actor must be a party and must be acting in that party's role.
pub fn authorize(session: &WorkSession, actor: &Identity) -> Result<Role, VisibleError> {
    match session.role_of(actor.user_id) {
        Some(role) if role == actor.role => Ok(role),
        Some(_) => Err(VisibleError::PermissionDenied(format!(
            "user {} is not the {} of session {}",
            actor.user_id, actor.role, session.id
        ))),
        None => Err(VisibleError::PermissionDenied(format!(
            "user {} is not a party to session {}",
            actor.user_id, session.id
        ))),
    }
}

/// Like [`authorize`], but also requires a specific role.
pub fn authorize_as(
    session: &WorkSession,
    actor: &Identity,
    required: Role,
) -> Result<(), VisibleError> {
    let role = authorize(session, actor)?;
    if role != required {
        return Err(VisibleError::PermissionDenied(format!(
            "only the {required} may do this"
        )));
    }
    Ok(())
}

/// Validate a rating. Only seekers may rate.
pub fn validate_rating(
    role: Role,
    request: &RatingRequest,
    at: DateTime<Utc>,
) -> Result<Option<Rating>, VisibleError> {
    if request.is_empty() {
        return Ok(None);
    }
    if role == Role::Provider {
        return Err(VisibleError::PermissionDenied(
            "providers cannot submit a rating".into(),
        ));
    }
    let Some(stars) = request.stars else {
        return Err(VisibleError::Validation(
            "rating_description requires rating_stars".into(),
        ));
    };
    if !(1..=5).contains(&stars) {
        return Err(VisibleError::Validation(format!(
            "rating_stars must be between 1 and 5, got {stars}"
        )));
    }
    Ok(Some(Rating {
        stars: stars as u8,
        description: request
            .description
            .as_deref()
            .map(str::trim)
            .unwrap_or_default()
            .to_string(),
        rated_at: at,
    }))
}

/// Record the provider's offered mediums. Latest share wins.
pub fn share_provider_mediums(
    session: &mut WorkSession,
    actor: &Identity,
    mediums: MediumMap,
    at: DateTime<Utc>,
) -> Result<(), VisibleError> {
    authorize_as(session, actor, Role::Provider)?;
    session.ensure_open()?;
    session.provider_mediums = Some(mediums);
    session.mediums_shared_at = Some(at);
    session.updated_at = at;
    Ok(())
}

/// Record the seeker's selection. Returns true when this call activated
/// the session.
pub fn select_seeker_mediums(
    session: &mut WorkSession,
    actor: &Identity,
    mediums: MediumMap,
    at: DateTime<Utc>,
) -> Result<bool, VisibleError> {
    authorize_as(session, actor, Role::Seeker)?;
    session.ensure_open()?;
    session.seeker_mediums = Some(mediums);
    session.updated_at = at;
    if session.state == ConnectionState::Waiting {
        session.state = ConnectionState::Active;
        return Ok(true);
    }
    Ok(false)
}

/// Cancel an open session.
pub fn cancel(
    session: &mut WorkSession,
    actor: &Identity,
    at: DateTime<Utc>,
) -> Result<Role, VisibleError> {
    let role = authorize(session, actor)?;
    session.ensure_open()?;
    session.termination = Some(Termination::Cancelled { by: role, at });
    session.state = ConnectionState::Cancelled;
    session.updated_at = at;
    Ok(role)
}

/// Complete an open session. The first completion wins.
pub fn finish(
    session: &mut WorkSession,
    actor: &Identity,
    rating: &RatingRequest,
    at: DateTime<Utc>,
) -> Result<Role, VisibleError> {
    let role = authorize(session, actor)?;
    session.ensure_open()?;
    let rating = validate_rating(role, rating, at)?;
    session.termination = Some(Termination::Completed { by: role, at });
    session.state = ConnectionState::Completed;
    if rating.is_some() {
        session.rating = rating;
    }
    session.updated_at = at;
    Ok(role)
}

/// Copy of the session as the given role may see it.
pub fn view_for(session: &WorkSession, role: Role) -> WorkSession {
    let mut view = session.clone();
    if role == Role::Provider {
        view.rating = None;
    }
    view
}
