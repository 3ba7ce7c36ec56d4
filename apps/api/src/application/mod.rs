pub mod app_error;
pub mod jwt;
pub mod model_registry;
pub mod persona;
pub mod ports;
pub mod token_estimator;
pub mod tool_loop;
pub mod use_cases;
