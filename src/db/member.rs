use sea_orm::entity::prelude::*;

/// Durable record of a completed verification.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "member")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub requester_id: i64,

    /// Unique among verified members only; an abandoned pending claim may
    /// still reference the same address.
    #[sea_orm(unique)]
    pub email: String,

    /// `student` or `staff`.
    pub kind: String,

    pub student_id: Option<String>,
    pub cohort: Option<String>,
    pub track: Option<String>,
    pub display_name: Option<String>,

    pub verified_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
