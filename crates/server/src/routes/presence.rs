use axum::{extract::State, Json};

use teamdock_api::{db as dbq, service, ActiveProfile, ActiveProfilesResponse, OkResponse};

use crate::error::ApiErr;
use crate::routes::auth::AuthUser;
use crate::storage::{sq_execute, sq_query_map, Db};

/// POST /api/presence/heartbeat — refresh the caller's activity timestamp.
pub async fn heartbeat(State(db): State<Db>, user: AuthUser) -> Result<Json<OkResponse>, ApiErr> {
    let conn = db.conn();
    sq_execute(
        &conn,
        dbq::profiles::touch(&user.profile_id, &service::now_sqlite()),
    )
    .map_err(ApiErr::from_db("presence heartbeat"))?;

    Ok(Json(OkResponse { ok: true }))
}

/// GET /api/presence/active — profiles active within the presence window,
/// most recent first.
pub async fn active(State(db): State<Db>) -> Result<Json<ActiveProfilesResponse>, ApiErr> {
    let cutoff = service::presence_cutoff();

    let conn = db.conn();
    let profiles = sq_query_map(&conn, dbq::profiles::list_active_since(&cutoff), |row| {
        Ok(ActiveProfile {
            id: row.get(0)?,
            username: row.get(1)?,
            avatar_url: row.get(2)?,
            last_active_at: row.get(3)?,
        })
    })
    .map_err(ApiErr::from_db("list active profiles"))?;

    Ok(Json(ActiveProfilesResponse { profiles }))
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

    #[test]
    fn active_window_excludes_stale_profiles() {
        let conn = test_conn();
        sq_execute(
            &conn,
            dbq::profiles::insert("fresh", "fresh", None, "1", "http://a", "td_1"),
        )
        .expect("seed fresh");
        sq_execute(
            &conn,
            dbq::profiles::insert("stale", "stale", None, "2", "http://b", "td_2"),
        )
        .expect("seed stale");
        conn.execute(
            "UPDATE profiles SET last_active_at = '2020-01-01 00:00:00' WHERE id = 'stale'",
            [],
        )
        .expect("backdate");

        let active = sq_query_map(
            &conn,
            dbq::profiles::list_active_since(&service::presence_cutoff()),
            |row| row.get::<_, String>(0),
        )
        .expect("query");

        assert_eq!(active, vec!["fresh".to_string()]);
    }

    #[test]
    fn touch_moves_a_profile_back_into_the_window() {
        let conn = test_conn();
        sq_execute(
            &conn,
            dbq::profiles::insert("p1", "nova", None, "1", "http://a", "td_1"),
        )
        .expect("seed");
        conn.execute(
            "UPDATE profiles SET last_active_at = '2020-01-01 00:00:00' WHERE id = 'p1'",
            [],
        )
        .expect("backdate");

        sq_execute(&conn, dbq::profiles::touch("p1", &service::now_sqlite())).expect("touch");

        let active = sq_query_map(
            &conn,
            dbq::profiles::list_active_since(&service::presence_cutoff()),
            |row| row.get::<_, String>(0),
        )
        .expect("query");
        assert_eq!(active.len(), 1);
    }
}
