pub mod bundle;
pub mod config;
pub mod errors;
pub mod git;
pub mod history;
pub mod lock;
pub mod publisher;
pub mod retention;
pub mod run_log;
pub mod run_wrapper;
pub mod scheduler;
pub mod scraper_process;
pub mod workspace;
