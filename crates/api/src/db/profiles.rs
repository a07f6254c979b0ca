//! Profile store query builders.
//!
//! Reconciliation uses two explicit, ordered lookups (`get_by_discord_id`
//! first, `get_by_email` second) — never a single `OR` query that could
//! return either of two distinct rows.

use sea_query::{Alias, Asterisk, Expr, Func, Order, Query, SqliteQueryBuilder};

use super::tables::Profiles;

pub type Built = (String, sea_query::Values);

// ── Profile columns helper ─────────────────────────────────────────────────

/// Column list shared by full-profile SELECT queries. Excludes the secret
/// code, which never leaves the auth path.
fn profile_columns(q: &mut sea_query::SelectStatement) -> &mut sea_query::SelectStatement {
    q.column(Profiles::Id)
        .column(Profiles::Username)
        .column(Profiles::Email)
        .column(Profiles::DiscordId)
        .column(Profiles::AvatarUrl)
        .column(Profiles::CreatedAt)
        .column(Profiles::LastActiveAt)
}

// ── Lookups ────────────────────────────────────────────────────────────────

/// Full profile by local id.
pub fn get_by_id(id: &str) -> Built {
    let mut q = Query::select().to_owned();
    profile_columns(&mut q);
    q.from(Profiles::Table)
        .and_where(Expr::col(Profiles::Id).eq(id))
        .build(SqliteQueryBuilder)
}

/// Reconciliation lookup #1: `(id, username)` of the profile linked to a
/// Discord identity.
pub fn get_for_login_by_discord_id(discord_id: &str) -> Built {
    Query::select()
        .columns([Profiles::Id, Profiles::Username])
        .from(Profiles::Table)
        .and_where(Expr::col(Profiles::DiscordId).eq(discord_id))
        .build(SqliteQueryBuilder)
}

/// Reconciliation lookup #2: `id` of a profile matched by email.
pub fn get_for_login_by_email(email: &str) -> Built {
    Query::select()
        .column(Profiles::Id)
        .from(Profiles::Table)
        .and_where(Expr::col(Profiles::Email).eq(email))
        .build(SqliteQueryBuilder)
}

/// Full profile by secret code (fallback login path).
pub fn get_by_secret_code(secret_code: &str) -> Built {
    let mut q = Query::select().to_owned();
    profile_columns(&mut q);
    q.from(Profiles::Table)
        .and_where(Expr::col(Profiles::SecretCode).eq(secret_code))
        .build(SqliteQueryBuilder)
}

/// `(id, username)` for the session extractor.
pub fn get_session_fields(id: &str) -> Built {
    Query::select()
        .columns([Profiles::Id, Profiles::Username])
        .from(Profiles::Table)
        .and_where(Expr::col(Profiles::Id).eq(id))
        .build(SqliteQueryBuilder)
}

/// Count all profiles.
pub fn count() -> Built {
    Query::select()
        .expr_as(Func::count(Expr::col(Asterisk)), Alias::new("count"))
        .from(Profiles::Table)
        .build(SqliteQueryBuilder)
}

// ── Inserts ────────────────────────────────────────────────────────────────

/// INSERT a new profile at first-ever Discord login.
///
/// `created_at` and `last_active_at` take their schema defaults.
pub fn insert(
    id: &str,
    username: &str,
    email: Option<&str>,
    discord_id: &str,
    avatar_url: &str,
    secret_code: &str,
) -> Built {
    Query::insert()
        .into_table(Profiles::Table)
        .columns([
            Profiles::Id,
            Profiles::Username,
            Profiles::Email,
            Profiles::DiscordId,
            Profiles::AvatarUrl,
            Profiles::SecretCode,
        ])
        .values_panic([
            id.into(),
            username.into(),
            email.map(|s| s.to_string()).into(),
            discord_id.into(),
            avatar_url.into(),
            secret_code.into(),
        ])
        .build(SqliteQueryBuilder)
}

// ── Updates ────────────────────────────────────────────────────────────────

/// Linked-login refresh: presence fields only. The stored username is
/// user-owned and must not be overwritten here.
pub fn refresh_presence(id: &str, avatar_url: &str, now: &str) -> Built {
    Query::update()
        .table(Profiles::Table)
        .value(Profiles::AvatarUrl, avatar_url)
        .value(Profiles::LastActiveAt, now)
        .and_where(Expr::col(Profiles::Id).eq(id))
        .build(SqliteQueryBuilder)
}

/// One-time link of a Discord identity to an email-matched profile,
/// refreshing all provider-derived fields.
pub fn link_discord(
    id: &str,
    discord_id: &str,
    username: &str,
    email: Option<&str>,
    avatar_url: &str,
    now: &str,
) -> Built {
    Query::update()
        .table(Profiles::Table)
        .value(Profiles::DiscordId, discord_id)
        .value(Profiles::Username, username)
        .value(Profiles::Email, email.map(|s| s.to_string()))
        .value(Profiles::AvatarUrl, avatar_url)
        .value(Profiles::LastActiveAt, now)
        .and_where(Expr::col(Profiles::Id).eq(id))
        .build(SqliteQueryBuilder)
}

/// Refresh `last_active_at` (heartbeat, secret-code login).
pub fn touch(id: &str, now: &str) -> Built {
    Query::update()
        .table(Profiles::Table)
        .value(Profiles::LastActiveAt, now)
        .and_where(Expr::col(Profiles::Id).eq(id))
        .build(SqliteQueryBuilder)
}

// ── Presence ───────────────────────────────────────────────────────────────

/// Profiles active since `cutoff`, most recent first.
pub fn list_active_since(cutoff: &str) -> Built {
    Query::select()
        .columns([
            Profiles::Id,
            Profiles::Username,
            Profiles::AvatarUrl,
            Profiles::LastActiveAt,
        ])
        .from(Profiles::Table)
        .and_where(Expr::col(Profiles::LastActiveAt).gte(cutoff))
        .order_by(Profiles::LastActiveAt, Order::Desc)
        .build(SqliteQueryBuilder)
}
