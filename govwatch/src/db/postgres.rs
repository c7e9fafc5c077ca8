use crate::db::*;
use anyhow::anyhow;
use async_trait::async_trait;
use govwatch_core::TallyId;
use std::convert::TryFrom;
use tokio::sync::RwLock;
use tokio_postgres::{error::SqlState, NoTls, Row};

pub struct PgBackend {
    client: RwLock<tokio_postgres::Client>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Version {
    pub version: u32,
}

const SPACE_COLUMNS: &str = "id, name, network, symbol, created_at, watched";
const PROPOSAL_COLUMNS: &str =
    "id, space, address, start_time, end_time, name, body, created_at, watched";

impl PgBackend {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let (client, connection) = tokio_postgres::connect(database_url, NoTls).await?;

        // The connection object performs the actual communication with the database,
        // so spawn it off to run on its own.
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                eprintln!("connection error: {}", e);
            }
        });

        Ok(PgBackend {
            client: RwLock::new(client),
        })
    }

    pub async fn version(&self) -> anyhow::Result<Version> {
        let row = self
            .client
            .read()
            .await
            .query_one(r#"SELECT value FROM meta WHERE key = 'version'"#, &[])
            .await?;
        Ok(serde_json::from_value(
            row.get::<_, serde_json::Value>("value"),
        )?)
    }

    pub async fn setup(&self) -> anyhow::Result<()> {
        let sql = include_str!("postgres/init.sql");
        Ok(self.client.read().await.batch_execute(sql).await?)
    }
}

fn space_from_row(row: &Row) -> Space {
    Space {
        id: row.get("id"),
        name: row.get("name"),
        network: row.get("network"),
        symbol: row.get("symbol"),
        created_at: row.get("created_at"),
        watched: row.get("watched"),
    }
}

fn proposal_from_row(row: &Row) -> Proposal {
    Proposal {
        id: row.get("id"),
        space: row.get("space"),
        address: row.get("address"),
        start: row.get("start_time"),
        end: row.get("end_time"),
        name: row.get("name"),
        body: row.get("body"),
        created_at: row.get("created_at"),
        watched: row.get("watched"),
    }
}

fn choice_from_row(row: &Row) -> anyhow::Result<ProposalChoice> {
    Ok(ProposalChoice {
        id: row.get("id"),
        proposal: row.get("proposal"),
        name: row.get("name"),
        ordinal: u32::try_from(row.get::<_, i32>("ordinal"))?,
        created_at: row.get("created_at"),
    })
}

fn tally_from_row(row: &Row) -> anyhow::Result<VoteTally> {
    Ok(VoteTally {
        id: row.get("id"),
        choice: row.get("proposal_choice"),
        count: u64::try_from(row.get::<_, i64>("count"))?,
        created_at: row.get("created_at"),
    })
}

/// Turns a unique constraint violation into a [`DuplicateIdentity`].
fn duplicate_as(kind: &'static str, id: impl ToString) -> impl FnOnce(tokio_postgres::Error) -> Error {
    move |e| {
        if e.code() == Some(&SqlState::UNIQUE_VIOLATION) {
            DuplicateIdentity::new(kind, id).into()
        } else {
            e.into()
        }
    }
}

#[async_trait]
impl DbRead for PgBackend {
    async fn list_spaces(&self, watched: Option<bool>) -> Result<Vec<Space>, Error> {
        let rows = self
            .client
            .read()
            .await
            .query(
                format!(
                    "SELECT {} FROM spaces WHERE ($1::BOOLEAN IS NULL OR watched = $1) ORDER BY id",
                    SPACE_COLUMNS
                )
                .as_str(),
                &[&watched],
            )
            .await?;
        Ok(rows.iter().map(space_from_row).collect())
    }

    async fn get_space(&self, id: &SpaceId) -> Result<Option<Space>, Error> {
        let row = self
            .client
            .read()
            .await
            .query_opt(
                format!("SELECT {} FROM spaces WHERE id = $1", SPACE_COLUMNS).as_str(),
                &[id],
            )
            .await?;
        Ok(row.as_ref().map(space_from_row))
    }

    async fn list_proposals(&self, query: ProposalQuery<'_>) -> Result<Vec<Proposal>, Error> {
        let ProposalQuery { space, watched } = query;
        let rows = self
            .client
            .read()
            .await
            .query(
                format!(
                    r#"SELECT {} FROM proposals
                   WHERE ($1::TEXT IS NULL OR space = $1)
                     AND ($2::BOOLEAN IS NULL OR watched = $2)
                   ORDER BY id"#,
                    PROPOSAL_COLUMNS
                )
                .as_str(),
                &[&space, &watched],
            )
            .await?;
        Ok(rows.iter().map(proposal_from_row).collect())
    }

    async fn get_proposal(&self, id: &ProposalId) -> Result<Option<Proposal>, Error> {
        let row = self
            .client
            .read()
            .await
            .query_opt(
                format!("SELECT {} FROM proposals WHERE id = $1", PROPOSAL_COLUMNS).as_str(),
                &[id],
            )
            .await?;
        Ok(row.as_ref().map(proposal_from_row))
    }

    async fn list_choices(&self, proposal: &ProposalId) -> Result<Vec<ProposalChoice>, Error> {
        self.client
            .read()
            .await
            .query(
                r#"SELECT id, proposal, name, ordinal, created_at FROM proposal_choices
                   WHERE proposal = $1 ORDER BY ordinal"#,
                &[proposal],
            )
            .await?
            .iter()
            .map(choice_from_row)
            .collect()
    }

    async fn latest_tally(&self, choice: ChoiceId) -> Result<Option<VoteTally>, Error> {
        self.client
            .read()
            .await
            .query_opt(
                r#"SELECT id, proposal_choice, count, created_at FROM vote_counts
                   WHERE proposal_choice = $1
                   ORDER BY created_at DESC, id DESC LIMIT 1"#,
                &[&choice],
            )
            .await?
            .as_ref()
            .map(tally_from_row)
            .transpose()
    }

    async fn list_tallies(&self, choice: ChoiceId) -> Result<Vec<VoteTally>, Error> {
        self.client
            .read()
            .await
            .query(
                r#"SELECT id, proposal_choice, count, created_at FROM vote_counts
                   WHERE proposal_choice = $1
                   ORDER BY created_at ASC, id ASC"#,
                &[&choice],
            )
            .await?
            .iter()
            .map(tally_from_row)
            .collect()
    }

    async fn list_networks(&self) -> Result<Vec<Network>, Error> {
        let rows = self
            .client
            .read()
            .await
            .query("SELECT id, name FROM networks ORDER BY id", &[])
            .await?;
        Ok(rows
            .iter()
            .map(|row| Network {
                id: row.get("id"),
                name: row.get("name"),
            })
            .collect())
    }
}

#[async_trait]
impl DbWrite for PgBackend {
    async fn insert_space(&self, space: Space) -> Result<(), Error> {
        self.client
            .read()
            .await
            .execute(
                "INSERT INTO spaces (id, name, network, symbol, created_at, watched) VALUES ($1, $2, $3, $4, $5, $6)",
                &[
                    &space.id,
                    &space.name,
                    &space.network,
                    &space.symbol,
                    &space.created_at,
                    &space.watched,
                ],
            )
            .await
            .map_err(duplicate_as("space", &space.id))?;
        Ok(())
    }

    async fn delete_space(&self, id: &SpaceId) -> Result<bool, Error> {
        let deleted = self
            .client
            .read()
            .await
            .execute("DELETE FROM spaces WHERE id = $1", &[id])
            .await?;
        Ok(deleted > 0)
    }

    async fn insert_proposal(&self, proposal: Proposal) -> Result<(), Error> {
        self.client
            .read()
            .await
            .execute(
                r#"INSERT INTO proposals (id, space, address, start_time, end_time, name, body, created_at, watched)
                   VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"#,
                &[
                    &proposal.id,
                    &proposal.space,
                    &proposal.address,
                    &proposal.start,
                    &proposal.end,
                    &proposal.name,
                    &proposal.body,
                    &proposal.created_at,
                    &proposal.watched,
                ],
            )
            .await
            .map_err(duplicate_as("proposal", &proposal.id))?;
        Ok(())
    }

    async fn delete_proposal(&self, id: &ProposalId) -> Result<bool, Error> {
        let deleted = self
            .client
            .read()
            .await
            .execute("DELETE FROM proposals WHERE id = $1", &[id])
            .await?;
        Ok(deleted > 0)
    }

    async fn insert_choices(
        &self,
        proposal: &ProposalId,
        choices: Vec<NewChoice>,
        created_at: NaiveDateTime,
    ) -> Result<Vec<ProposalChoice>, Error> {
        let mut client = self.client.write().await;
        let tx = client.transaction().await?;

        let existing: i64 = tx
            .query_one(
                "SELECT COUNT(*) FROM proposal_choices WHERE proposal = $1",
                &[proposal],
            )
            .await?
            .get(0);
        if existing > 0 {
            return Err(DuplicateIdentity::new("choices of proposal", proposal).into());
        }

        let mut inserted = Vec::with_capacity(choices.len());
        for NewChoice { ordinal, name } in choices {
            let ordinal_sql = i32::try_from(ordinal)
                .map_err(|_| anyhow!("choice ordinal {} out of range", ordinal))?;
            let row = tx
                .query_one(
                    r#"INSERT INTO proposal_choices (proposal, name, ordinal, created_at)
                       VALUES ($1, $2, $3, $4) RETURNING id"#,
                    &[proposal, &name, &ordinal_sql, &created_at],
                )
                .await
                .map_err(duplicate_as("choice ordinal of proposal", proposal))?;
            inserted.push(ProposalChoice {
                id: row.get("id"),
                proposal: proposal.clone(),
                name,
                ordinal,
                created_at,
            });
        }

        tx.commit().await?;
        Ok(inserted)
    }

    async fn insert_tally(&self, tally: NewTally) -> Result<VoteTally, Error> {
        let count = i64::try_from(tally.count)?;
        let row = self
            .client
            .read()
            .await
            .query_one(
                r#"INSERT INTO vote_counts (proposal_choice, count, created_at)
                   VALUES ($1, $2, $3) RETURNING id"#,
                &[&tally.choice, &count, &tally.created_at],
            )
            .await?;
        Ok(VoteTally {
            id: row.get::<_, TallyId>("id"),
            choice: tally.choice,
            count: tally.count,
            created_at: tally.created_at,
        })
    }

    async fn set_space_watched(&self, id: &SpaceId, watched: bool) -> Result<bool, Error> {
        let updated = self
            .client
            .read()
            .await
            .execute("UPDATE spaces SET watched = $2 WHERE id = $1", &[id, &watched])
            .await?;
        Ok(updated > 0)
    }

    async fn set_proposal_watched(&self, id: &ProposalId, watched: bool) -> Result<bool, Error> {
        let updated = self
            .client
            .read()
            .await
            .execute(
                "UPDATE proposals SET watched = $2 WHERE id = $1",
                &[id, &watched],
            )
            .await?;
        Ok(updated > 0)
    }
}

impl Db for PgBackend {}

#[cfg(test)]
#[allow(unused_macros)]
macro_rules! new_backend {
    ($docker:expr) => {{
        let container = $docker.run(images::postgres::Postgres::default().with_version(13));
        let url = format!(
            "postgres://postgres@localhost:{}",
            container.get_host_port(5432).unwrap()
        );

        (url, container)
    }};
}

#[cfg(all(test, feature = "docker_tests"))]
crate::run_store_tests! {
    db => db,
    {
        use testcontainers::{clients, images, Docker};
        use crate::db::postgres::*;
        use std::sync::Arc;
        let docker = clients::Cli::default();
        let (url, _container) = new_backend!(docker);
        let db = PgBackend::connect(&url).await.unwrap();
        db.setup().await.unwrap();
        let db: Arc<dyn Db> = Arc::new(db);
    }
}
