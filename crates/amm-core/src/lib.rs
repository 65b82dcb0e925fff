pub mod config;
pub mod logging;

pub mod asset;
pub mod bundle;
pub mod checksum;
pub mod credentials;
pub mod error;
pub mod inventory;
pub mod ledger;
pub mod locator;
pub mod manager;
pub mod orchestrator;
pub mod registry;
pub mod storage;
pub mod transfer;
pub mod uninstall;
pub mod url_model;

pub use error::AmmError;
