use sea_orm::entity::prelude::*;

/// Catalogue entry for a security tool the server recommends.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "tool")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(unique)]
    pub name: String,

    pub category: String,
    pub url: String,
    pub notes: Option<String>,

    /// Discord user id of whoever added it.
    pub added_by: i64,

    pub added_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
