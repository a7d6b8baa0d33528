pub mod csv_io;
pub mod db;
pub mod gateway;
pub mod models;
pub mod service;
pub mod settings;
pub mod table;
