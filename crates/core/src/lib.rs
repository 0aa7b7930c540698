#![forbid(unsafe_code)]

pub mod adaptive;
pub mod engine;
pub mod evaluation;
pub mod mastery;
pub mod model;
pub mod policy;
pub mod time;

pub use time::Clock;
