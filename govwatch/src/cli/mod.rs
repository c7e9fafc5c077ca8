pub mod db_cmd;
pub mod list;
pub mod run;
pub mod sync;
pub mod watch;
