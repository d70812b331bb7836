use sea_orm::entity::prelude::*;

/// Extra channel grant held by a staff member.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "member_access")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub member_id: i64,
    pub channel_id: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
