use sea_orm::entity::prelude::*;

/// In-flight authentication attempt. The signed token itself is never
/// stored; verification re-derives it from the claimed email.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "pending_claim")]
pub struct Model {
    /// Discord user id of the requester. One claim per requester at most.
    #[sea_orm(primary_key, auto_increment = false)]
    pub requester_id: i64,

    pub email: String,

    /// `student` or `staff`.
    pub kind: String,

    pub student_id: Option<String>,
    pub cohort: Option<String>,
    pub track: Option<String>,

    /// Staff-only nickname override.
    pub display_name: Option<String>,

    /// Start of the cooldown window. Re-prompts do not move it.
    pub issued_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
