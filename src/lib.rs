#[macro_use]
extern crate failure;

pub mod config;
pub mod db;
pub mod pipeline;
pub mod plate;
pub mod recognizer;
pub mod recorder;
pub mod registry;
pub mod sightings;
pub mod tracker;
pub mod types;
pub mod webhook;
