pub mod failure_cache;
pub mod history_cache;
pub mod job_registry;
pub mod maintenance;
pub mod prediction_service;
pub mod process_invoker;
pub mod rate_limiter;
