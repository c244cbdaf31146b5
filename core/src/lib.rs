pub mod clock;
pub mod csv_export;
pub mod csv_import;
pub mod db;
pub mod models;
pub mod service;
pub mod summary;
