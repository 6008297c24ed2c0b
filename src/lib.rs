pub mod client;
pub mod config;
pub mod controller;
pub mod data_source;
pub mod errors;
pub mod executor;
pub mod gate;
pub mod metrics;
pub mod outcome;
pub mod report;
pub mod request;
pub mod runner;
pub mod source;
pub mod stats;
pub mod template;
pub mod text_template;
pub mod utils;
