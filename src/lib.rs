pub mod alerting;
pub mod checks;
pub mod db;
pub mod notifications;
pub mod scheduler;
pub mod server;
pub mod version;
