use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use rusqlite::OptionalExtension;
use tower_cookies::{
    cookie::{time, SameSite},
    Cookie, Cookies,
};
use uuid::Uuid;

use teamdock_api::{
    crypto, db as dbq,
    oauth::{self, ExternalIdentity},
    service, ServiceError,
};

use crate::storage::{sq_execute, sq_query_row};
use crate::{AppConfig, AppState};

/// Session cookie name. The value is the profile id.
pub const SESSION_COOKIE: &str = "session";

/// Session lifetime: 30 days.
const SESSION_TTL_DAYS: i64 = 30;

#[derive(serde::Deserialize)]
pub struct CallbackQuery {
    code: Option<String>,
    error: Option<String>,
}

// ---------------------------------------------------------------------------
// GET /auth/discord — redirect to the Discord authorize page
// ---------------------------------------------------------------------------

/// GET /auth/discord — redirect to Discord OAuth.
pub async fn discord_login(State(config): State<AppConfig>) -> Response {
    let Some(ref provider) = config.discord else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({"error": "Discord OAuth not configured"})),
        )
            .into_response();
    };

    let redirect_uri = format!("{}/auth/discord/callback", config.base_url);
    let url = oauth::build_authorize_url(provider, &redirect_uri);

    Redirect::temporary(&url).into_response()
}

// ---------------------------------------------------------------------------
// GET /auth/discord/callback — reconcile the identity, set the session
// ---------------------------------------------------------------------------

/// GET /auth/discord/callback?code=... — exchange the code, reconcile the
/// identity against the profile store, and redirect to the app root.
///
/// Every failure path terminates in a redirect carrying a coarse error code;
/// underlying causes go to the log only.
pub async fn discord_callback(
    State(state): State<AppState>,
    cookies: Cookies,
    Query(q): Query<CallbackQuery>,
) -> Response {
    let config = &state.config;

    // Provider-reported error or missing code: no network calls, no store calls.
    if let Some(err) = q.error {
        tracing::warn!("discord auth denied: {err}");
        return error_redirect(&config.base_url, "discord_auth_failed");
    }
    let Some(code) = q.code.filter(|c| !c.is_empty()) else {
        return error_redirect(&config.base_url, "no_code");
    };

    let Some(ref provider) = config.discord else {
        tracing::error!("discord callback hit without configured provider");
        return error_redirect(&config.base_url, "discord_callback_failed");
    };

    // Exchange code for access token
    let redirect_uri = format!("{}/auth/discord/callback", config.base_url);
    let token_res = state
        .http
        .post(&provider.token_url)
        .header("Accept", "application/json")
        .form(&oauth::build_token_request_form(provider, &code, &redirect_uri))
        .send()
        .await;

    let access_token = match token_res {
        Ok(res) => match res.text().await {
            Ok(body) => match oauth::parse_access_token_response(&body) {
                Ok(token) => token,
                Err(e) => {
                    tracing::error!("token exchange: {e}");
                    return error_redirect(&config.base_url, "discord_callback_failed");
                }
            },
            Err(e) => {
                tracing::error!("token response read: {e}");
                return error_redirect(&config.base_url, "discord_callback_failed");
            }
        },
        Err(e) => {
            tracing::error!("token exchange request: {e}");
            return error_redirect(&config.base_url, "discord_callback_failed");
        }
    };

    // Fetch the external identity
    let userinfo_res = state
        .http
        .get(&provider.userinfo_url)
        .bearer_auth(&access_token)
        .header("Accept", "application/json")
        .send()
        .await
        .and_then(|res| res.error_for_status());

    let identity = match userinfo_res {
        Ok(res) => match res.json::<serde_json::Value>().await {
            Ok(json) => match oauth::extract_identity(&json) {
                Ok(identity) => identity,
                Err(e) => {
                    tracing::error!("userinfo extract: {e}");
                    return error_redirect(&config.base_url, "discord_callback_failed");
                }
            },
            Err(e) => {
                tracing::error!("userinfo parse: {e}");
                return error_redirect(&config.base_url, "discord_callback_failed");
            }
        },
        Err(e) => {
            tracing::error!("userinfo request: {e}");
            return error_redirect(&config.base_url, "discord_callback_failed");
        }
    };

    // Reconcile against the profile store (guard scoped — no awaits below)
    let now = service::now_sqlite();
    let outcome = {
        let conn = state.db.conn();
        match reconcile(&conn, &identity, &now) {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("profile reconciliation: {e}");
                return error_redirect(&config.base_url, "discord_callback_failed");
            }
        }
    };

    cookies.add(session_cookie(outcome.profile_id.clone(), config.dev_mode));

    Redirect::temporary(&success_url(&config.base_url, &outcome)).into_response()
}

// ---------------------------------------------------------------------------
// Reconciliation
// ---------------------------------------------------------------------------

/// Result of reconciling one external identity.
pub(crate) struct Reconciliation {
    pub profile_id: String,
    /// Display name carried back to the client — the stored one for an
    /// already-linked profile, the provider's otherwise.
    pub username: String,
    pub is_new_user: bool,
}

/// Reconcile an external identity against the profile store.
///
/// Two explicit, ordered lookups: an existing `discord_id` link always wins
/// over a distinct email-only match. Performs at most one write — an update
/// on the first two branches, an insert on the last.
pub(crate) fn reconcile(
    conn: &rusqlite::Connection,
    identity: &ExternalIdentity,
    now: &str,
) -> Result<Reconciliation, ServiceError> {
    // Already linked → presence refresh only; the stored username is
    // user-owned and authoritative.
    let linked = sq_query_row(
        conn,
        dbq::profiles::get_for_login_by_discord_id(&identity.external_id),
        |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
    )
    .optional()
    .map_err(ServiceError::from_db("linked profile lookup"))?;

    if let Some((profile_id, username)) = linked {
        sq_execute(
            conn,
            dbq::profiles::refresh_presence(&profile_id, &identity.avatar_url, now),
        )
        .map_err(ServiceError::from_db("linked profile refresh"))?;

        return Ok(Reconciliation {
            profile_id,
            username,
            is_new_user: false,
        });
    }

    // Unlinked profile matched by email → one-time link, refreshing all
    // provider-derived fields.
    if let Some(email) = identity.email.as_deref() {
        let by_email = sq_query_row(conn, dbq::profiles::get_for_login_by_email(email), |row| {
            row.get::<_, String>(0)
        })
        .optional()
        .map_err(ServiceError::from_db("email profile lookup"))?;

        if let Some(profile_id) = by_email {
            let username = service::validate_username(&identity.username)?;
            let affected = sq_execute(
                conn,
                dbq::profiles::link_discord(
                    &profile_id,
                    &identity.external_id,
                    &username,
                    identity.email.as_deref(),
                    &identity.avatar_url,
                    now,
                ),
            )
            .map_err(ServiceError::from_db("profile link update"))?;

            // A vanished row here means the in-memory profile id is stale —
            // fail the whole operation rather than proceed with it.
            if affected == 0 {
                return Err(ServiceError::Internal(
                    "profile link update affected no rows".into(),
                ));
            }

            return Ok(Reconciliation {
                profile_id,
                username,
                is_new_user: false,
            });
        }
    }

    // First-ever login for this identity → create the profile, with a
    // bootstrap secret code for the non-OAuth login path. The discord_id
    // UNIQUE constraint rejects the loser of a concurrent first login.
    let username = service::validate_username(&identity.username)?;
    let profile_id = Uuid::new_v4().to_string();
    let secret_code = crypto::generate_secret_code()?;

    sq_execute(
        conn,
        dbq::profiles::insert(
            &profile_id,
            &username,
            identity.email.as_deref(),
            &identity.external_id,
            &identity.avatar_url,
            &secret_code,
        ),
    )
    .map_err(ServiceError::from_db("profile insert"))?;

    Ok(Reconciliation {
        profile_id,
        username,
        is_new_user: true,
    })
}

// ---------------------------------------------------------------------------
// Redirect + cookie helpers
// ---------------------------------------------------------------------------

fn error_redirect(base_url: &str, code: &str) -> Response {
    Redirect::temporary(&format!("{base_url}/?error={code}")).into_response()
}

fn success_url(base_url: &str, outcome: &Reconciliation) -> String {
    let mut query = url::form_urlencoded::Serializer::new(String::new());
    query.append_pair("discord_auth", "success");
    query.append_pair("profile_id", &outcome.profile_id);
    query.append_pair("username", &outcome.username);
    if outcome.is_new_user {
        query.append_pair("is_new_user", "true");
    }
    format!("{}/?{}", base_url, query.finish())
}

/// Build the session cookie: http-only, lax, 30 days, secure outside dev.
pub(crate) fn session_cookie(profile_id: String, dev_mode: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, profile_id))
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(!dev_mode)
        .path("/")
        .max_age(time::Duration::days(SESSION_TTL_DAYS))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::run_migrations;
    use rusqlite::Connection;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().expect("in-memory db");
        run_migrations(&conn).expect("migrations");
        conn
    }

    fn identity(external_id: &str, username: &str, email: Option<&str>) -> ExternalIdentity {
        ExternalIdentity {
            external_id: external_id.to_string(),
            username: username.to_string(),
            email: email.map(|s| s.to_string()),
            avatar_url: format!("https://cdn.discordapp.com/avatars/{external_id}/a.png"),
        }
    }

    const NOW: &str = "2026-08-01 12:00:00";

    fn profile_count(conn: &Connection) -> i64 {
        sq_query_row(conn, dbq::profiles::count(), |row| row.get(0)).expect("count")
    }

    #[test]
    fn first_login_creates_exactly_one_linked_profile() {
        let conn = test_conn();
        let identity = identity("999", "nova", Some("a@x.com"));

        let outcome = reconcile(&conn, &identity, NOW).expect("reconcile");
        assert!(outcome.is_new_user);
        assert_eq!(outcome.username, "nova");
        assert_eq!(profile_count(&conn), 1);

        let (discord_id, email, secret_code): (Option<String>, Option<String>, String) = conn
            .query_row(
                "SELECT discord_id, email, secret_code FROM profiles WHERE id = ?1",
                [&outcome.profile_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .expect("created row");
        assert_eq!(discord_id.as_deref(), Some("999"));
        assert_eq!(email.as_deref(), Some("a@x.com"));
        assert!(secret_code.starts_with("td_"));
    }

    #[test]
    fn replayed_identity_refreshes_instead_of_creating() {
        let conn = test_conn();
        let identity = identity("999", "nova", Some("a@x.com"));

        let first = reconcile(&conn, &identity, NOW).expect("first login");
        let second = reconcile(&conn, &identity, "2026-08-02 09:00:00").expect("second login");

        assert!(!second.is_new_user);
        assert_eq!(second.profile_id, first.profile_id);
        assert_eq!(profile_count(&conn), 1);
    }

    #[test]
    fn linked_profile_keeps_local_display_name() {
        let conn = test_conn();
        sq_execute(
            &conn,
            dbq::profiles::insert("p1", "Old Name", Some("a@x.com"), "999", "http://old", "td_1"),
        )
        .expect("seed");

        let outcome =
            reconcile(&conn, &identity("999", "nova", Some("a@x.com")), NOW).expect("reconcile");

        assert!(!outcome.is_new_user);
        assert_eq!(outcome.username, "Old Name");

        let (username, avatar, last_active): (String, String, String) = conn
            .query_row(
                "SELECT username, avatar_url, last_active_at FROM profiles WHERE id = 'p1'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .expect("row");
        assert_eq!(username, "Old Name");
        assert_eq!(avatar, "https://cdn.discordapp.com/avatars/999/a.png");
        assert_eq!(last_active, NOW);
    }

    #[test]
    fn email_match_links_once_and_refreshes_provider_fields() {
        let conn = test_conn();
        conn.execute(
            "INSERT INTO profiles (id, username, email, secret_code) VALUES ('p1', 'early bird', 'a@x.com', 'td_1')",
            [],
        )
        .expect("seed unlinked profile");

        let outcome =
            reconcile(&conn, &identity("999", "nova", Some("a@x.com")), NOW).expect("reconcile");

        assert!(!outcome.is_new_user);
        assert_eq!(outcome.profile_id, "p1");
        assert_eq!(profile_count(&conn), 1);

        let (discord_id, username): (Option<String>, String) = conn
            .query_row(
                "SELECT discord_id, username FROM profiles WHERE id = 'p1'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .expect("row");
        assert_eq!(discord_id.as_deref(), Some("999"));
        assert_eq!(username, "nova");
    }

    #[test]
    fn discord_link_wins_over_distinct_email_match() {
        let conn = test_conn();
        sq_execute(
            &conn,
            dbq::profiles::insert("linked", "keeper", Some("b@y.com"), "999", "http://k", "td_1"),
        )
        .expect("seed linked");
        conn.execute(
            "INSERT INTO profiles (id, username, email, secret_code) VALUES ('by-email', 'other', 'a@x.com', 'td_2')",
            [],
        )
        .expect("seed email-only");

        let outcome =
            reconcile(&conn, &identity("999", "nova", Some("a@x.com")), NOW).expect("reconcile");

        assert_eq!(outcome.profile_id, "linked");
        assert_eq!(outcome.username, "keeper");

        // The email-only profile must be untouched.
        let other_discord: Option<String> = conn
            .query_row(
                "SELECT discord_id FROM profiles WHERE id = 'by-email'",
                [],
                |row| row.get(0),
            )
            .expect("row");
        assert_eq!(other_discord, None);
    }

    #[test]
    fn store_rejects_second_profile_for_same_discord_id() {
        let conn = test_conn();
        sq_execute(
            &conn,
            dbq::profiles::insert("p1", "nova", None, "999", "http://a", "td_1"),
        )
        .expect("first insert");

        let err = sq_execute(
            &conn,
            dbq::profiles::insert("p2", "clone", None, "999", "http://b", "td_2"),
        )
        .expect_err("unique discord_id must reject");
        assert!(err.to_string().contains("UNIQUE"));
    }

    #[test]
    fn success_url_form_encodes_username_and_flags_new_users() {
        let refreshed = Reconciliation {
            profile_id: "p1".into(),
            username: "Old Name".into(),
            is_new_user: false,
        };
        let url = success_url("http://localhost:3000", &refreshed);
        assert_eq!(
            url,
            "http://localhost:3000/?discord_auth=success&profile_id=p1&username=Old+Name"
        );

        let created = Reconciliation {
            is_new_user: true,
            ..refreshed
        };
        assert!(success_url("http://localhost:3000", &created).ends_with("&is_new_user=true"));
    }

    #[test]
    fn session_cookie_attributes() {
        let cookie = session_cookie("p1".into(), false);
        assert_eq!(cookie.name(), SESSION_COOKIE);
        assert_eq!(cookie.value(), "p1");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.max_age(), Some(time::Duration::days(30)));

        let dev = session_cookie("p1".into(), true);
        assert_eq!(dev.secure(), Some(false));
    }
}
