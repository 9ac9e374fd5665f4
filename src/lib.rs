pub mod batch;
pub mod config;
pub mod datahub;
pub mod dates;
pub mod descriptor;
pub mod domain;
pub mod error;
pub mod layout;
pub mod manifest;
pub mod normalize;
pub mod output;
pub mod pipeline;
pub mod sample;
