pub mod clients;
pub mod finance;
pub mod products;
pub mod public;
pub mod reports;
pub mod schedulings;
pub mod services;
pub mod users;
