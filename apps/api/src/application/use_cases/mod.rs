pub mod api_key;
pub mod chat_gateway;
pub mod model_access;
pub mod usage;
