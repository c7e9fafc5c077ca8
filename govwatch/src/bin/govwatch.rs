use anyhow::Context;
use govwatch::{
    cli::{self, list::Listing, watch::Target},
    config::Config,
};
use std::path::PathBuf;
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(name = "govwatch")]
struct Opt {
    #[structopt(short, long, parse(from_os_str), name = "yaml config file")]
    config: PathBuf,
    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(Debug, StructOpt)]
#[structopt(rename_all = "kebab-case")]
pub enum Command {
    /// Reconcile on every poll interval until interrupted
    Run,
    /// Run a single reconciliation cycle
    Sync,
    CheckConfig,
    /// Database commands
    Db(Db),
    /// Follow the proposals of a space or the tallies of a proposal
    Watch(Target),
    Unwatch(Target),
    /// Show what has been mirrored
    List(Listing),
}

#[derive(Debug, StructOpt)]
pub enum Db {
    Init,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opt = Opt::from_args();
    let config: Config = {
        use std::{fs::File, io::Read};
        let file_name = opt.config.to_str().unwrap_or("config file").to_owned();
        let mut file = File::open(opt.config)?;
        let mut content = String::new();
        file.read_to_string(&mut content)?;
        serde_yaml::from_str(&content)
            .context(format!("{} is an invalid configuration file", file_name))?
    };

    match opt.cmd {
        Command::Run => cli::run::run(config).await,
        Command::Sync => cli::sync::sync(config).await,
        Command::Db(db) => match db {
            Db::Init => cli::db_cmd::init(config).await,
        },
        Command::Watch(target) => cli::watch::set_watched(config, target, true).await,
        Command::Unwatch(target) => cli::watch::set_watched(config, target, false).await,
        Command::List(listing) => cli::list::list(config, listing).await,
        Command::CheckConfig => Ok(()),
    }
}
