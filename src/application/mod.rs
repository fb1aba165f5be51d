pub mod energy_api;
pub mod monitor;
pub mod sign_in;
pub mod token_manager;
