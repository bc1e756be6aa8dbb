//! CLI subcommand implementations

mod check;
mod init;
mod prune;
mod run;

pub use check::check_url;
pub use init::init_config;
pub use prune::prune_store;
pub use run::{run_monitor, run_once};
