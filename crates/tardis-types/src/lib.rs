pub mod archive;
pub mod datafile;
pub mod error;
pub mod experiment;

pub use archive::Archive;
pub use datafile::Datafile;
pub use error::{Result, TardisError};
pub use experiment::{Dataset, Experiment};
