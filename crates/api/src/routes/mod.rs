pub mod cron;
pub mod health;
pub mod rooms;
pub mod sessions;
