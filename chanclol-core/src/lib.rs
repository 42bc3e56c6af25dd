pub mod commands;
pub mod consts;
pub mod db;
pub mod gateway;
pub mod notify;
mod periodic;
pub mod rate_limiting;
pub mod riotapi;
pub mod scheduler;
mod services;
pub mod store;
mod timer;

pub use periodic::PeriodicTask;
pub use services::*;
pub use timer::{Readiness, ReadinessTimer};
