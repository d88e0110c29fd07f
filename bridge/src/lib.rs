pub mod api;
pub mod config;
pub mod credential;
pub mod dispatch;
pub mod error;
pub mod line;
pub mod logging;
pub mod photos;
pub mod sniff;
pub mod state;
