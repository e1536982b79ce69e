pub mod archive;
pub mod archive_list;
pub mod migrate;
pub mod reclaim;
pub mod score;
pub mod util;
pub mod verify;
