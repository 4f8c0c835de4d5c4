pub mod admin;
pub mod embed;
pub mod health;
pub(crate) mod utils;
