//! Compile-time–checked column identifiers for all tables.

use sea_query::Iden;

#[derive(Iden)]
pub enum Profiles {
    Table,
    Id,
    Username,
    Email,
    DiscordId,
    AvatarUrl,
    SecretCode,
    CreatedAt,
    LastActiveAt,
}

#[derive(Iden)]
pub enum Teams {
    Table,
    Id,
    Name,
    Description,
    MaxMembers,
    CreatedBy,
    CreatedAt,
}

#[derive(Iden)]
pub enum TeamMembers {
    Table,
    TeamId,
    ProfileId,
    Role,
    JoinedAt,
}
