pub mod clock;
pub mod config;
pub mod feed;
pub mod fetch;
pub mod gtfs;
pub mod poller;
pub mod reconcile;
pub mod schedule;
pub mod server;
pub mod stats;
pub mod store;
pub mod uptime;
