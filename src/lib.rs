pub mod base;
pub mod cache;
pub mod fabric;
pub mod sim;
pub mod traffic;
