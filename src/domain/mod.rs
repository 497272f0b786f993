pub mod csv_export;
pub mod models;
pub mod session_state;
pub mod transcript;
