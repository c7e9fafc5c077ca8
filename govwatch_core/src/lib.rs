mod alert;
mod diff;
mod id;
mod macros;
mod network;
mod proposal;
mod space;
mod tally;

pub use alert::*;
pub use diff::*;
pub use id::*;
pub use network::*;
pub use proposal::*;
pub use space::*;
pub use tally::*;

pub use chrono;
#[cfg(feature = "postgres-types")]
pub use postgres_types;
