use crate::{config::Config, db::ProposalQuery};
use govwatch_core::{ProposalId, SpaceId};
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(rename_all = "kebab-case")]
pub enum Listing {
    Spaces {
        /// Only show watched spaces
        #[structopt(long)]
        watched: bool,
    },
    Proposals {
        #[structopt(long)]
        space: Option<String>,
        /// Only show watched proposals
        #[structopt(long)]
        watched: bool,
    },
    /// Vote count history of every choice of a proposal
    Tallies { proposal: String },
}

pub async fn list(config: Config, listing: Listing) -> anyhow::Result<()> {
    let db = config.database.connect_database().await?;
    match listing {
        Listing::Spaces { watched } => {
            for space in db.list_spaces(watched.then(|| true)).await? {
                println!(
                    "{}\t{}\t{}\t{}",
                    space.id,
                    space.name,
                    space.symbol,
                    if space.watched { "watched" } else { "" }
                );
            }
        }
        Listing::Proposals { space, watched } => {
            let space = space.map(SpaceId::from);
            let query = ProposalQuery {
                space: space.as_ref(),
                watched: watched.then(|| true),
            };
            for proposal in db.list_proposals(query).await? {
                println!(
                    "{}\t{}\t{}\t{} - {}\t{}",
                    proposal.id,
                    proposal.space,
                    proposal.name,
                    proposal.start,
                    proposal.end,
                    if proposal.watched { "watched" } else { "" }
                );
            }
        }
        Listing::Tallies { proposal } => {
            for choice in db.list_choices(&ProposalId::from(proposal)).await? {
                println!("{}. {}", choice.ordinal, choice.name);
                for tally in db.list_tallies(choice.id).await? {
                    println!("\t{}\t{}", tally.created_at, tally.count);
                }
            }
        }
    }
    Ok(())
}
