use crate::config::Config;
use anyhow::anyhow;
use govwatch_core::{ProposalId, SpaceId};
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(rename_all = "kebab-case")]
pub enum Target {
    Space { id: String },
    Proposal { id: String },
}

/// Sets the watched flag that decides which spaces and proposals the
/// scheduler follows.
pub async fn set_watched(config: Config, target: Target, watched: bool) -> anyhow::Result<()> {
    let db = config.database.connect_database().await?;
    let found = match &target {
        Target::Space { id } => db.set_space_watched(&SpaceId::new(id), watched).await?,
        Target::Proposal { id } => {
            db.set_proposal_watched(&ProposalId::new(id), watched)
                .await?
        }
    };

    if !found {
        return Err(anyhow!("{:?} has not been mirrored yet", target));
    }
    Ok(())
}
