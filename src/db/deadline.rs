use sea_orm::entity::prelude::*;

pub const STATUS_UPCOMING: &str = "upcoming";
pub const STATUS_PAST_DUE: &str = "past_due";

/// One tracked deadline, synced from a deadline-kind watch source.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "deadline")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub watch_id: i32,

    pub title: String,
    pub course: Option<String>,
    pub due_at: DateTimeUtc,

    /// `upcoming` until the due time passes, then `past_due` for good.
    pub status: String,

    pub reminded_week: bool,
    pub reminded_day: bool,
    pub reminded_hour: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
