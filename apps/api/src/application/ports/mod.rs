pub mod provider;
pub mod tools;
