use axum::{
    extract::{FromRef, FromRequestParts, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use rusqlite::OptionalExtension;
use tower_cookies::{Cookie, Cookies};

use teamdock_api::{db as dbq, service, LoginRequest, OkResponse, ProfileResponse};

use super::discord::{session_cookie, SESSION_COOKIE};
use crate::error::ApiErr;
use crate::storage::{profile_from_row, sq_execute, sq_query_row, Db};
use crate::AppConfig;

// ---------------------------------------------------------------------------
// Auth extractor
// ---------------------------------------------------------------------------

/// Authenticated profile extracted from the `session` cookie.
pub struct AuthUser {
    pub profile_id: String,
    pub username: String,
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    Db: FromRef<S>,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let cookies = Cookies::from_request_parts(parts, state)
            .await
            .map_err(|err| err.into_response())?;

        let session = cookies
            .get(SESSION_COOKIE)
            .map(|c| c.value().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(serde_json::json!({"error": "missing session cookie"})),
                )
                    .into_response()
            })?;

        let db = Db::from_ref(state);
        let conn = db.conn();
        let result = sq_query_row(&conn, dbq::profiles::get_session_fields(&session), |row| {
            Ok(AuthUser {
                profile_id: row.get(0)?,
                username: row.get(1)?,
            })
        });

        match result {
            Ok(user) => Ok(user),
            Err(_) => Err((
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({"error": "invalid session"})),
            )
                .into_response()),
        }
    }
}

// ---------------------------------------------------------------------------
// Secret-code login (non-OAuth fallback)
// ---------------------------------------------------------------------------

/// POST /api/auth/login — log in with a profile's secret code.
pub async fn login(
    State(db): State<Db>,
    State(config): State<AppConfig>,
    cookies: Cookies,
    Json(req): Json<LoginRequest>,
) -> Result<Json<ProfileResponse>, ApiErr> {
    let code = req.secret_code.trim();
    if code.is_empty() {
        return Err(ApiErr::bad_request("secret_code required"));
    }

    let conn = db.conn();
    let profile = sq_query_row(&conn, dbq::profiles::get_by_secret_code(code), profile_from_row)
        .optional()
        .map_err(ApiErr::from_db("secret code lookup"))?
        .ok_or_else(|| ApiErr::unauthorized("invalid secret code"))?;

    sq_execute(
        &conn,
        dbq::profiles::touch(&profile.id, &service::now_sqlite()),
    )
    .map_err(ApiErr::from_db("login presence refresh"))?;

    cookies.add(session_cookie(profile.id.clone(), config.dev_mode));

    Ok(Json(profile))
}

// ---------------------------------------------------------------------------
// Current profile
// ---------------------------------------------------------------------------

/// GET /api/auth/me — the authenticated profile.
pub async fn me(State(db): State<Db>, user: AuthUser) -> Result<Json<ProfileResponse>, ApiErr> {
    let conn = db.conn();
    sq_query_row(
        &conn,
        dbq::profiles::get_by_id(&user.profile_id),
        profile_from_row,
    )
    .map(Json)
    .map_err(ApiErr::from_db("load profile"))
}

// ---------------------------------------------------------------------------
// Logout
// ---------------------------------------------------------------------------

/// POST /api/auth/logout — drop the session cookie.
pub async fn logout(cookies: Cookies) -> Json<OkResponse> {
    cookies.remove(Cookie::build((SESSION_COOKIE, "")).path("/").build());
    Json(OkResponse { ok: true })
}
