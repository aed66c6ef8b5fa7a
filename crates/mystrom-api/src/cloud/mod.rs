// Cloud API client modules
//
// Hand-written client for the myStrom cloud (`https://mystrom.ch/api`).
// Every call except login carries the session token in the `Auth-Token`
// header; the token itself is owned by the caller.

pub mod auth;
pub mod client;
pub mod devices;
pub mod models;

pub use client::{CloudClient, DEFAULT_CLOUD_URL};
pub use models::CloudDevice;
