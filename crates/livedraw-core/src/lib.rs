// Core of the live draw client: data model, countdown clock, result store,
// session reducer, view mapping, and configuration.

pub mod clock;
pub mod config;
pub mod model;
pub mod present;
pub mod protocol;
pub mod session;
pub mod store;
