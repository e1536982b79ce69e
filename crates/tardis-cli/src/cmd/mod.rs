pub(crate) mod archive;
pub(crate) mod archivelist;
pub(crate) mod destinations;
pub(crate) mod migrate;
pub(crate) mod reclaim;
pub(crate) mod score;
pub(crate) mod verify;
