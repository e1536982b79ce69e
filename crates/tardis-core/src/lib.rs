pub mod archive;
pub mod catalog;
pub mod checksum;
pub mod commands;
pub mod config;
pub mod destination;
pub mod export;
pub mod lock;
pub mod migrate;
pub mod prune;
pub mod scorer;
pub mod session;
pub mod store;
pub mod verify;

#[cfg(test)]
mod tests;
#[cfg(test)]
mod testutil;
