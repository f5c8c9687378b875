pub mod aggregator;
pub mod api;
pub mod config;
pub mod engine;
pub mod entities;
pub mod error;
pub mod external;
pub mod parser;
pub mod polyline;
pub mod render;
