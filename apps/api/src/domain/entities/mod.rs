pub mod api_key;
pub mod daily_usage;
pub mod request_log;
pub mod user_plan;
