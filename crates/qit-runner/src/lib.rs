pub mod config;
pub mod env;
pub mod fifo;
pub mod process;
pub mod report;
pub mod target_json;

pub use config::QitConfig;
pub use env::CppEnv;
pub use report::{ReportEvent, ReportHandler, ReportListener, ReportMessage};
