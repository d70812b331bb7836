use sea_orm::entity::prelude::*;

/// A tracked schedule target: where the source lives, where the rendered
/// display message sits, and the fingerprints of the last accepted state.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "watch")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub guild_id: i64,

    /// Channel holding the rendered display message.
    pub channel_id: i64,

    /// Display message, created on the first successful sync.
    pub message_id: Option<i64>,

    /// `timetable` or `deadlines`; fixes the expected column layout.
    pub kind: String,

    pub source_url: String,

    /// Where semantic-change announcements go, if anywhere.
    pub broadcast_channel_id: Option<i64>,

    /// Hash of all semantic cells; drives display updates.
    pub fingerprint: Option<String>,

    /// Hash that ignores period labels and past rows; drives broadcasts.
    pub broadcast_fingerprint: Option<String>,

    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
