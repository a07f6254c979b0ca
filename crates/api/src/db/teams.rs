//! Team + member query builders.

use sea_query::{Alias, Asterisk, Expr, Func, Order, Query, SqliteQueryBuilder};

use super::tables::{Profiles, TeamMembers, Teams};

pub type Built = (String, sea_query::Values);

// ── Team columns helper ───────────────────────────────────────────────────

/// Column list for team SELECT queries.
fn team_columns(q: &mut sea_query::SelectStatement) -> &mut sea_query::SelectStatement {
    q.column((Teams::Table, Teams::Id))
        .column((Teams::Table, Teams::Name))
        .column((Teams::Table, Teams::Description))
        .column((Teams::Table, Teams::MaxMembers))
        .column((Teams::Table, Teams::CreatedBy))
        .column((Teams::Table, Teams::CreatedAt))
}

// ── Team queries ──────────────────────────────────────────────────────────

/// INSERT a new team.
pub fn insert(
    id: &str,
    name: &str,
    description: Option<&str>,
    max_members: i64,
    created_by: &str,
) -> Built {
    Query::insert()
        .into_table(Teams::Table)
        .columns([
            Teams::Id,
            Teams::Name,
            Teams::Description,
            Teams::MaxMembers,
            Teams::CreatedBy,
        ])
        .values_panic([
            id.into(),
            name.into(),
            description.map(|s| s.to_string()).into(),
            max_members.into(),
            created_by.into(),
        ])
        .build(SqliteQueryBuilder)
}

/// SELECT a single team by id.
pub fn get_by_id(id: &str) -> Built {
    let mut q = Query::select().to_owned();
    team_columns(&mut q);
    q.from(Teams::Table)
        .and_where(Expr::col((Teams::Table, Teams::Id)).eq(id))
        .build(SqliteQueryBuilder)
}

/// List all teams, newest first (browse page).
pub fn list_all() -> Built {
    let mut q = Query::select().to_owned();
    team_columns(&mut q);
    q.from(Teams::Table)
        .order_by((Teams::Table, Teams::CreatedAt), Order::Desc)
        .build(SqliteQueryBuilder)
}

/// Check team name existence.
pub fn name_exists(name: &str) -> Built {
    Query::select()
        .expr(Expr::expr(Func::count(Expr::col(Asterisk))).gt(0))
        .from(Teams::Table)
        .and_where(Expr::col(Teams::Name).eq(name))
        .build(SqliteQueryBuilder)
}

/// DELETE an (emptied) team.
pub fn delete(id: &str) -> Built {
    Query::delete()
        .from_table(Teams::Table)
        .and_where(Expr::col(Teams::Id).eq(id))
        .build(SqliteQueryBuilder)
}

// ── Membership queries ────────────────────────────────────────────────────

/// INSERT a team member.
pub fn member_insert(team_id: &str, profile_id: &str, role: &str) -> Built {
    Query::insert()
        .into_table(TeamMembers::Table)
        .columns([TeamMembers::TeamId, TeamMembers::ProfileId, TeamMembers::Role])
        .values_panic([team_id.into(), profile_id.into(), role.into()])
        .build(SqliteQueryBuilder)
}

/// DELETE a team member.
pub fn member_delete(team_id: &str, profile_id: &str) -> Built {
    Query::delete()
        .from_table(TeamMembers::Table)
        .and_where(Expr::col(TeamMembers::TeamId).eq(team_id))
        .and_where(Expr::col(TeamMembers::ProfileId).eq(profile_id))
        .build(SqliteQueryBuilder)
}

/// Count members of a team.
pub fn member_count(team_id: &str) -> Built {
    Query::select()
        .expr_as(Func::count(Expr::col(Asterisk)), Alias::new("count"))
        .from(TeamMembers::Table)
        .and_where(Expr::col(TeamMembers::TeamId).eq(team_id))
        .build(SqliteQueryBuilder)
}

/// Role of a member within a team.
pub fn member_role(team_id: &str, profile_id: &str) -> Built {
    Query::select()
        .column(TeamMembers::Role)
        .from(TeamMembers::Table)
        .and_where(Expr::col(TeamMembers::TeamId).eq(team_id))
        .and_where(Expr::col(TeamMembers::ProfileId).eq(profile_id))
        .build(SqliteQueryBuilder)
}

/// The team a profile currently belongs to, if any.
pub fn membership_of(profile_id: &str) -> Built {
    Query::select()
        .column(TeamMembers::TeamId)
        .from(TeamMembers::Table)
        .and_where(Expr::col(TeamMembers::ProfileId).eq(profile_id))
        .build(SqliteQueryBuilder)
}

/// Member roster with profile fields, longest-tenured first.
pub fn member_list(team_id: &str) -> Built {
    Query::select()
        .column((TeamMembers::Table, TeamMembers::ProfileId))
        .column((Profiles::Table, Profiles::Username))
        .column((Profiles::Table, Profiles::AvatarUrl))
        .column((TeamMembers::Table, TeamMembers::Role))
        .column((TeamMembers::Table, TeamMembers::JoinedAt))
        .from(TeamMembers::Table)
        .inner_join(
            Profiles::Table,
            Expr::col((Profiles::Table, Profiles::Id))
                .equals((TeamMembers::Table, TeamMembers::ProfileId)),
        )
        .and_where(Expr::col((TeamMembers::Table, TeamMembers::TeamId)).eq(team_id))
        .order_by((TeamMembers::Table, TeamMembers::JoinedAt), Order::Asc)
        .build(SqliteQueryBuilder)
}

/// Longest-tenured member of a team (leader handover target).
pub fn oldest_member(team_id: &str) -> Built {
    Query::select()
        .column(TeamMembers::ProfileId)
        .from(TeamMembers::Table)
        .and_where(Expr::col(TeamMembers::TeamId).eq(team_id))
        .order_by(TeamMembers::JoinedAt, Order::Asc)
        .limit(1)
        .build(SqliteQueryBuilder)
}

/// Change a member's role.
pub fn set_role(team_id: &str, profile_id: &str, role: &str) -> Built {
    Query::update()
        .table(TeamMembers::Table)
        .value(TeamMembers::Role, role)
        .and_where(Expr::col(TeamMembers::TeamId).eq(team_id))
        .and_where(Expr::col(TeamMembers::ProfileId).eq(profile_id))
        .build(SqliteQueryBuilder)
}
