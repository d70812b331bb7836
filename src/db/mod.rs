pub mod ctf_player;
pub mod deadline;
pub mod member;
pub mod member_access;
pub mod pending_claim;
pub mod tool;
pub mod watch;

use sea_orm::{ConnectionTrait, Database, DatabaseConnection, DbErr, EntityTrait, Schema};
use tracing::info;

/// Connects to the store and makes sure every table exists.
pub async fn connect(url: &str) -> Result<DatabaseConnection, DbErr> {
    let db = Database::connect(url).await?;
    init_schema(&db).await?;
    info!("Database ready at {}", url);
    Ok(db)
}

pub async fn init_schema(db: &DatabaseConnection) -> Result<(), DbErr> {
    create_table(db, pending_claim::Entity).await?;
    create_table(db, member::Entity).await?;
    create_table(db, member_access::Entity).await?;
    create_table(db, watch::Entity).await?;
    create_table(db, deadline::Entity).await?;
    create_table(db, ctf_player::Entity).await?;
    create_table(db, tool::Entity).await?;
    Ok(())
}

async fn create_table<E: EntityTrait>(db: &DatabaseConnection, entity: E) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);
    let mut statement = schema.create_table_from_entity(entity);
    statement.if_not_exists();
    db.execute(backend.build(&statement)).await?;
    Ok(())
}
