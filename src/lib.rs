pub mod activity;
pub mod book;
pub mod config;
pub mod generation;
pub mod model;
pub mod pipeline;
pub mod prompts;
