pub mod blacklist;
pub mod credential;
pub mod model;
pub mod storage;
