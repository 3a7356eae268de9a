//! Boundary layer for kvdesk.
//!
//! [`commands`] exposes `get_values`, `save_values` and `list_clients` as
//! request/response handlers over JSON payloads, the shape a desktop or
//! web front end calls. The `kvdesk` binary drives the same handlers from
//! a terminal.

pub mod commands;

pub use commands::{
    CommandError, CommandResponse, GetValuesRequest, SaveValuesRequest, SaveValuesResponse,
    get_values, list_clients, preview_values, save_values, save_values_cancellable,
};
