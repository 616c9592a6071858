pub mod db;
pub mod images;
pub mod models;
pub mod news;
pub mod tables;
pub mod works;

pub use db::{Database, DatabaseError};
