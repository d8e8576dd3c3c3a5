#![forbid(unsafe_code)]

pub mod bind;
pub mod classify;
pub mod clean;
pub mod cli;
pub mod cover;
pub mod epub;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod inline;
pub mod inspect;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod profile;
pub mod progress;
pub mod selector;
