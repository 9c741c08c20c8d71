pub mod health;
pub mod tasks;
pub mod worker_protocol;
pub mod workers;
