pub mod app;
pub mod config;
pub mod debounce;
pub mod listing;
pub mod models;
pub mod rated;
pub mod rating;
pub mod search;
pub mod session;
pub mod tmdb;
pub mod view;
