pub mod accounts;
pub mod days;
pub mod env;
pub mod execution_chain;
mod json_codecs;
pub mod log;
mod performance;
pub mod twab;
pub mod units;

pub use twab::run as run_twab;
