use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use teamdock_api::{
    db as dbq, service, CreateTeamRequest, JoinTeamResponse, ListTeamsResponse, MemberResponse,
    OkResponse, ServiceError, TeamDetailResponse, TeamRole,
};

use crate::error::ApiErr;
use crate::routes::auth::AuthUser;
use crate::storage::{sq_execute, sq_query_map, sq_query_row, team_from_row, Db};

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /api/teams — create a new team. The creator joins as leader.
pub async fn create_team(
    State(db): State<Db>,
    user: AuthUser,
    Json(req): Json<CreateTeamRequest>,
) -> Result<(StatusCode, Json<TeamDetailResponse>), ApiErr> {
    let name = service::validate_team_name(&req.name).map_err(ApiErr::from)?;
    let max_members = service::clamp_max_members(req.max_members);

    let conn = db.conn();
    let detail = create(
        &conn,
        &user.profile_id,
        &name,
        req.description.as_deref(),
        max_members,
    )
    .map_err(ApiErr::from)?;

    Ok((StatusCode::CREATED, Json(detail)))
}

/// GET /api/teams — all teams with rosters (browse page, no auth).
pub async fn list_teams(State(db): State<Db>) -> Result<Json<ListTeamsResponse>, ApiErr> {
    let conn = db.conn();

    let teams = sq_query_map(&conn, dbq::teams::list_all(), team_from_row)
        .map_err(ApiErr::from_db("list teams"))?
        .into_iter()
        .map(|team| load_detail(&conn, team))
        .collect::<Result<Vec<_>, _>>()
        .map_err(ApiErr::from)?;

    Ok(Json(ListTeamsResponse { teams }))
}

/// GET /api/teams/:id — team detail with roster.
pub async fn get_team(
    State(db): State<Db>,
    Path(id): Path<String>,
) -> Result<Json<TeamDetailResponse>, ApiErr> {
    let conn = db.conn();

    let team = sq_query_row(&conn, dbq::teams::get_by_id(&id), team_from_row)
        .optional()
        .map_err(ApiErr::from_db("load team"))?
        .ok_or_else(|| ApiErr::not_found("team not found"))?;

    load_detail(&conn, team).map(Json).map_err(ApiErr::from)
}

/// POST /api/teams/:id/join — join a team with free capacity.
pub async fn join_team(
    State(db): State<Db>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<JoinTeamResponse>, ApiErr> {
    let conn = db.conn();
    join(&conn, &id, &user.profile_id)
        .map(Json)
        .map_err(ApiErr::from)
}

/// POST /api/teams/:id/leave — leave a team. Leadership passes to the
/// longest-tenured remaining member; an emptied team is deleted.
pub async fn leave_team(
    State(db): State<Db>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<OkResponse>, ApiErr> {
    let conn = db.conn();
    leave(&conn, &id, &user.profile_id).map_err(ApiErr::from)?;
    Ok(Json(OkResponse { ok: true }))
}

// ---------------------------------------------------------------------------
// Team rules (connection-level, framework-free)
// ---------------------------------------------------------------------------

fn member_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MemberResponse> {
    Ok(MemberResponse {
        profile_id: row.get(0)?,
        username: row.get(1)?,
        avatar_url: row.get(2)?,
        role: TeamRole::parse(&row.get::<_, String>(3)?),
        joined_at: row.get(4)?,
    })
}

/// Attach roster and capacity flag to a team row.
fn load_detail(conn: &Connection, team: teamdock_api::TeamResponse) -> Result<TeamDetailResponse, ServiceError> {
    let members = sq_query_map(conn, dbq::teams::member_list(&team.id), member_from_row)
        .map_err(ServiceError::from_db("list team members"))?;
    let is_full = members.len() as i64 >= team.max_members;

    Ok(TeamDetailResponse {
        team,
        members,
        is_full,
    })
}

/// The team a profile currently belongs to, if any.
fn current_team(conn: &Connection, profile_id: &str) -> Result<Option<String>, ServiceError> {
    sq_query_row(conn, dbq::teams::membership_of(profile_id), |row| {
        row.get::<_, String>(0)
    })
    .optional()
    .map_err(ServiceError::from_db("membership lookup"))
}

pub(crate) fn create(
    conn: &Connection,
    profile_id: &str,
    name: &str,
    description: Option<&str>,
    max_members: i64,
) -> Result<TeamDetailResponse, ServiceError> {
    if current_team(conn, profile_id)?.is_some() {
        return Err(ServiceError::Conflict("already on a team".into()));
    }

    let taken = sq_query_row(conn, dbq::teams::name_exists(name), |row| {
        row.get::<_, i64>(0).map(|c| c > 0)
    })
    .unwrap_or(false);
    if taken {
        return Err(ServiceError::Conflict("team name already taken".into()));
    }

    let team_id = Uuid::new_v4().to_string();
    sq_execute(
        conn,
        dbq::teams::insert(&team_id, name, description, max_members, profile_id),
    )
    .map_err(ServiceError::from_db("create team"))?;

    sq_execute(
        conn,
        dbq::teams::member_insert(&team_id, profile_id, TeamRole::Leader.as_str()),
    )
    .map_err(ServiceError::from_db("add creator as leader"))?;

    let team = sq_query_row(conn, dbq::teams::get_by_id(&team_id), team_from_row)
        .map_err(ServiceError::from_db("load created team"))?;

    load_detail(conn, team)
}

pub(crate) fn join(
    conn: &Connection,
    team_id: &str,
    profile_id: &str,
) -> Result<JoinTeamResponse, ServiceError> {
    let team = sq_query_row(conn, dbq::teams::get_by_id(team_id), team_from_row)
        .optional()
        .map_err(ServiceError::from_db("load team"))?
        .ok_or_else(|| ServiceError::NotFound("team not found".into()))?;

    if current_team(conn, profile_id)?.is_some() {
        return Err(ServiceError::Conflict("already on a team".into()));
    }

    let count: i64 = sq_query_row(conn, dbq::teams::member_count(team_id), |row| row.get(0))
        .map_err(ServiceError::from_db("count team members"))?;
    if count >= team.max_members {
        return Err(ServiceError::Conflict("team is full".into()));
    }

    sq_execute(
        conn,
        dbq::teams::member_insert(team_id, profile_id, TeamRole::Member.as_str()),
    )
    .map_err(ServiceError::from_db("join team"))?;

    Ok(JoinTeamResponse {
        team_id: team.id,
        team_name: team.name,
        role: TeamRole::Member,
    })
}

pub(crate) fn leave(
    conn: &Connection,
    team_id: &str,
    profile_id: &str,
) -> Result<(), ServiceError> {
    let role = sq_query_row(conn, dbq::teams::member_role(team_id, profile_id), |row| {
        row.get::<_, String>(0)
    })
    .optional()
    .map_err(ServiceError::from_db("member role lookup"))?
    .ok_or_else(|| ServiceError::NotFound("not a member of this team".into()))?;

    sq_execute(conn, dbq::teams::member_delete(team_id, profile_id))
        .map_err(ServiceError::from_db("leave team"))?;

    let remaining: i64 = sq_query_row(conn, dbq::teams::member_count(team_id), |row| row.get(0))
        .map_err(ServiceError::from_db("count remaining members"))?;

    if remaining == 0 {
        sq_execute(conn, dbq::teams::delete(team_id))
            .map_err(ServiceError::from_db("delete emptied team"))?;
    } else if role == TeamRole::Leader.as_str() {
        let heir: String = sq_query_row(conn, dbq::teams::oldest_member(team_id), |row| row.get(0))
            .map_err(ServiceError::from_db("find leader heir"))?;
        sq_execute(
            conn,
            dbq::teams::set_role(team_id, &heir, TeamRole::Leader.as_str()),
        )
        .map_err(ServiceError::from_db("hand over leadership"))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::run_migrations;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().expect("in-memory db");
        run_migrations(&conn).expect("migrations");
        conn
    }

    fn seed_profile(conn: &Connection, id: &str) {
        sq_execute(
            conn,
            dbq::profiles::insert(
                id,
                &format!("user-{id}"),
                None,
                &format!("discord-{id}"),
                "http://a",
                &format!("td_{id}"),
            ),
        )
        .expect("seed profile");
    }

    #[test]
    fn creator_becomes_leader() {
        let conn = test_conn();
        seed_profile(&conn, "p1");

        let detail = create(&conn, "p1", "rust rovers", Some("we ship"), 4).expect("create");
        assert_eq!(detail.team.name, "rust rovers");
        assert_eq!(detail.members.len(), 1);
        assert_eq!(detail.members[0].role, TeamRole::Leader);
        assert!(!detail.is_full);
    }

    #[test]
    fn duplicate_team_name_conflicts() {
        let conn = test_conn();
        seed_profile(&conn, "p1");
        seed_profile(&conn, "p2");
        create(&conn, "p1", "rust rovers", None, 4).expect("create");

        let err = create(&conn, "p2", "rust rovers", None, 4).expect_err("must conflict");
        assert_eq!(err.status_code(), 409);
    }

    #[test]
    fn join_enforces_capacity() {
        let conn = test_conn();
        for p in ["p1", "p2", "p3"] {
            seed_profile(&conn, p);
        }
        let detail = create(&conn, "p1", "duo", None, 2).expect("create");

        join(&conn, &detail.team.id, "p2").expect("second member fits");
        let err = join(&conn, &detail.team.id, "p3").expect_err("team is full");
        assert_eq!(err.status_code(), 409);
        assert!(err.message().contains("full"));
    }

    #[test]
    fn profile_belongs_to_at_most_one_team() {
        let conn = test_conn();
        seed_profile(&conn, "p1");
        seed_profile(&conn, "p2");
        let first = create(&conn, "p1", "one", None, 4).expect("create one");
        create(&conn, "p2", "two", None, 4).expect("create two");

        let err = join(&conn, &first.team.id, "p2").expect_err("already on a team");
        assert_eq!(err.status_code(), 409);
    }

    #[test]
    fn join_unknown_team_is_not_found() {
        let conn = test_conn();
        seed_profile(&conn, "p1");
        let err = join(&conn, "missing", "p1").expect_err("unknown team");
        assert_eq!(err.status_code(), 404);
    }

    #[test]
    fn leader_leaving_hands_over_to_longest_tenured_member() {
        let conn = test_conn();
        for p in ["p1", "p2", "p3"] {
            seed_profile(&conn, p);
        }
        let detail = create(&conn, "p1", "trio", None, 4).expect("create");
        // Distinct joined_at values so tenure ordering is deterministic.
        join(&conn, &detail.team.id, "p2").expect("join p2");
        conn.execute(
            "UPDATE team_members SET joined_at = '2020-01-01 10:00:00' WHERE profile_id = 'p2'",
            [],
        )
        .expect("backdate p2");
        join(&conn, &detail.team.id, "p3").expect("join p3");

        leave(&conn, &detail.team.id, "p1").expect("leader leaves");

        let leader: String = sq_query_row(
            &conn,
            dbq::teams::member_role(&detail.team.id, "p2"),
            |row| row.get(0),
        )
        .expect("p2 role");
        assert_eq!(leader, "leader");
    }

    #[test]
    fn emptied_team_is_deleted() {
        let conn = test_conn();
        seed_profile(&conn, "p1");
        let detail = create(&conn, "p1", "solo", None, 4).expect("create");

        leave(&conn, &detail.team.id, "p1").expect("leave");

        let gone = sq_query_row(&conn, dbq::teams::get_by_id(&detail.team.id), team_from_row)
            .optional()
            .expect("query");
        assert!(gone.is_none());

        // Freed profile can form a new team again.
        create(&conn, "p1", "solo again", None, 4).expect("re-create");
    }

    #[test]
    fn leaving_a_team_you_are_not_on_is_not_found() {
        let conn = test_conn();
        seed_profile(&conn, "p1");
        seed_profile(&conn, "p2");
        let detail = create(&conn, "p1", "one", None, 4).expect("create");

        let err = leave(&conn, &detail.team.id, "p2").expect_err("not a member");
        assert_eq!(err.status_code(), 404);
    }
}
