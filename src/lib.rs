pub mod auth;
pub mod browser;
pub mod checkpoint;
pub mod collector;
pub mod config;
pub mod controller;
pub mod error;
pub mod executor;
pub mod inventory;
pub mod pacing;
pub mod pin_ref;
pub mod records;
pub mod saver;
pub mod webdriver;
