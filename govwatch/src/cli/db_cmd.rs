use crate::{
    config::{Config, DbConfig},
    db::postgres::PgBackend,
};
use anyhow::anyhow;

pub async fn init(config: Config) -> anyhow::Result<()> {
    match config.database {
        DbConfig::Postgres { url } => {
            let db = PgBackend::connect(&url).await?;
            db.setup().await?;
            let version = db.version().await?;
            println!("database initialized at schema version {}", version.version);
        }
        _ => return Err(anyhow!("can only run init on a postgres database")),
    }
    Ok(())
}
