pub mod config;
pub mod feed;
pub mod storage;
pub mod sync;
pub mod util;
