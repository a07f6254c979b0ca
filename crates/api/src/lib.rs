//! Shared API types, OAuth helpers, and SQL builders for TeamDock.
//!
//! This crate is the single source of truth for all API request/response
//! types. It contains no HTTP calls and no database access — those live in
//! the server adapters.

use serde::{Deserialize, Serialize};

pub mod crypto;
pub mod db;
pub mod oauth;
pub mod service;

// ─── Shared Enums ────────────────────────────────────────────────────────────

/// Role within a team.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TeamRole {
    Leader,
    Member,
}

impl TeamRole {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Leader => "leader",
            Self::Member => "member",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "leader" => Self::Leader,
            _ => Self::Member,
        }
    }
}

impl std::fmt::Display for TeamRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Auth ────────────────────────────────────────────────────────────────────

/// Secret-code login (non-OAuth fallback path).
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginRequest {
    pub secret_code: String,
}

/// Profile returned by login and `GET /api/auth/me`.
///
/// The secret code is never included — it is shown exactly once, out of band,
/// at profile creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileResponse {
    pub id: String,
    pub username: String,
    pub email: Option<String>,
    /// Whether a Discord identity is linked to this profile.
    pub discord_linked: bool,
    pub avatar_url: Option<String>,
    pub created_at: String,
    pub last_active_at: String,
}

/// Generic success response for operations that don't return data.
#[derive(Debug, Serialize, Deserialize)]
pub struct OkResponse {
    pub ok: bool,
}

// ─── Teams ──────────────────────────────────────────────────────────────────

/// Request body for `POST /api/teams` — create a new team.
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateTeamRequest {
    pub name: String,
    pub description: Option<String>,
    /// Defaults to 4. Clamped to [1, 10].
    pub max_members: Option<u32>,
}

/// Single team record returned by list and detail endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamResponse {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub max_members: i64,
    pub created_by: String,
    pub created_at: String,
}

/// Single team member record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberResponse {
    pub profile_id: String,
    pub username: String,
    pub avatar_url: Option<String>,
    pub role: TeamRole,
    pub joined_at: String,
}

/// Team with its member roster, returned by list and detail endpoints.
#[derive(Debug, Serialize, Deserialize)]
pub struct TeamDetailResponse {
    #[serde(flatten)]
    pub team: TeamResponse,
    pub members: Vec<MemberResponse>,
    pub is_full: bool,
}

/// Returned by `GET /api/teams` — all teams, for the browse page.
#[derive(Debug, Serialize, Deserialize)]
pub struct ListTeamsResponse {
    pub teams: Vec<TeamDetailResponse>,
}

/// Returned after a successful `POST /api/teams/:id/join`.
#[derive(Debug, Serialize, Deserialize)]
pub struct JoinTeamResponse {
    pub team_id: String,
    pub team_name: String,
    pub role: TeamRole,
}

// ─── Presence ────────────────────────────────────────────────────────────────

/// A recently-active profile, returned by `GET /api/presence/active`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ActiveProfile {
    pub id: String,
    pub username: String,
    pub avatar_url: Option<String>,
    pub last_active_at: String,
}

/// Returned by `GET /api/presence/active`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ActiveProfilesResponse {
    pub profiles: Vec<ActiveProfile>,
}

// ─── Health ──────────────────────────────────────────────────────────────────

/// Returned by `GET /api/health` — server liveness check.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

// ─── Service Error ───────────────────────────────────────────────────────────

/// Framework-agnostic service error.
///
/// Each variant maps to an HTTP status code; the server converts this into
/// its response type.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum ServiceError {
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl ServiceError {
    /// HTTP status code as a `u16`.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::BadRequest(_) => 400,
            Self::Unauthorized(_) => 401,
            Self::Forbidden(_) => 403,
            Self::NotFound(_) => 404,
            Self::Conflict(_) => 409,
            Self::Internal(_) => 500,
        }
    }

    /// The error message.
    pub fn message(&self) -> &str {
        match self {
            Self::BadRequest(m)
            | Self::Unauthorized(m)
            | Self::Forbidden(m)
            | Self::NotFound(m)
            | Self::Conflict(m)
            | Self::Internal(m) => m,
        }
    }

    /// Build a closure that wraps a DB/IO error into `Internal` with context.
    pub fn from_db<E: std::fmt::Display>(context: &str) -> impl FnOnce(E) -> Self + '_ {
        move |e| Self::Internal(format!("{context}: {e}"))
    }
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ServiceError {}

/// JSON error shape `{ "error": "..." }` returned by all error responses.
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
}

impl From<&ServiceError> for ApiError {
    fn from(e: &ServiceError) -> Self {
        Self {
            error: e.message().to_string(),
        }
    }
}
