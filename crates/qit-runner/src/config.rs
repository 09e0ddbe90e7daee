use std::ffi::{OsStr, OsString};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_COMPILER: &str = "c++";
pub const DEFAULT_CXX_FLAGS: &[&str] = &["-O3", "-std=c++11", "-march=native"];
pub const DEFAULT_REPORT_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct QitConfig {
    /// Generated sources, executables and pipes live here.
    pub build_dir: PathBuf,
    /// External function files are resolved against this directory.
    pub source_dir: PathBuf,
    /// Write every run to `<build_dir>/debug.cpp`. Single-run only.
    pub debug: bool,
    /// Stub out missing external function files instead of failing.
    pub auto_create_files: bool,
    pub compiler: String,
    pub cxx_flags: Vec<String>,
    pub report_poll_interval: Duration,
}

impl Default for QitConfig {
    fn default() -> Self {
        Self {
            build_dir: PathBuf::from("./build"),
            source_dir: PathBuf::from("./src"),
            debug: false,
            auto_create_files: false,
            compiler: DEFAULT_COMPILER.to_string(),
            cxx_flags: DEFAULT_CXX_FLAGS.iter().map(|s| s.to_string()).collect(),
            report_poll_interval: DEFAULT_REPORT_POLL_INTERVAL,
        }
    }
}

impl QitConfig {
    /// Compiler program and flags after `QIT_CXX` / `QIT_CXX_ARGS` overrides.
    pub fn compiler_command(&self) -> (OsString, Vec<String>) {
        let cxx = std::env::var_os("QIT_CXX")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| OsStr::new(&self.compiler).to_os_string());
        let extra = std::env::var("QIT_CXX_ARGS").unwrap_or_default();
        let mut flags = self.cxx_flags.clone();
        for a in extra.split_whitespace() {
            flags.push(a.to_string());
        }
        (cxx, flags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = QitConfig::default();
        assert_eq!(cfg.build_dir, PathBuf::from("./build"));
        assert_eq!(cfg.source_dir, PathBuf::from("./src"));
        assert!(!cfg.debug);
        assert!(!cfg.auto_create_files);
        assert_eq!(cfg.compiler, "c++");
        assert_eq!(cfg.cxx_flags, vec!["-O3", "-std=c++11", "-march=native"]);
        assert_eq!(cfg.report_poll_interval, Duration::from_millis(50));
    }
}
