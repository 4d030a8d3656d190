pub mod health;
pub mod jobs;
pub mod models;
pub mod sentiment;
pub mod stocks;
