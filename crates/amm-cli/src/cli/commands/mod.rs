//! CLI command handlers, one file per command.

mod bundles;
mod checksum;
mod completions;
mod download;
mod inspect;
mod install;
mod installed;
mod uninstall;

pub use bundles::run_bundles;
pub use checksum::run_checksum;
pub use completions::{run_completions, run_manpage};
pub use download::{run_download, DownloadArgs};
pub use inspect::run_inspect;
pub use install::run_install;
pub use installed::run_installed;
pub use uninstall::run_uninstall;
