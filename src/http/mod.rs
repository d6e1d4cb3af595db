pub mod server;
pub mod spotify;
