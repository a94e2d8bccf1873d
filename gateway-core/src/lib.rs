pub mod catalog;
pub mod config;
pub mod db;
pub mod endpoints;
pub mod error;
pub mod inference;
pub mod model_config;
pub mod observability;
pub mod providers;
pub mod secrets;
pub mod ui_stream;
pub mod utils;
