pub mod app_dirs;
pub mod config;
pub mod path_utils;
pub mod performance;
