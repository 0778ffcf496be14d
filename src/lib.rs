pub mod app;
pub mod commands;
pub mod config;
pub mod db;
pub mod dialog;
pub mod error;
pub mod models;
pub mod settings;
pub mod store;

pub use app::{App, Collaborators, InitReport, StoreStatus};
pub use config::AppConfig;
pub use error::AppError;
