pub mod app;
pub mod assets;
pub mod catalog;
pub mod config;
pub mod domain;
pub mod drive;
pub mod error;
pub mod export;
pub mod index;
pub mod normalize;
pub mod output;
pub mod photo;
pub mod store;
