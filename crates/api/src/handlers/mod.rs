pub mod cron;
pub mod rooms;
pub mod sessions;
