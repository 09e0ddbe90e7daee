use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use anyhow::{anyhow, Context, Result};
use qitc::{Builder, CppBuilder, Function, FunctionInventory, RunArgs, Target, Type, Value};

use crate::config::QitConfig;
use crate::fifo;
use crate::process::{self, CAPTURE_CAP};
use crate::report::{ReportEvent, ReportHandler, ReportListener, ReportMessage};

pub type ReportCallback = Box<dyn FnMut(&ReportMessage) + Send>;

type CallbackList = Vec<(ReportEvent, ReportCallback)>;
type CallbackTable = Arc<Mutex<CallbackList>>;

/// Builds, compiles and runs C++ programs for targets.
pub struct CppEnv {
    config: QitConfig,
    callbacks: CallbackTable,
}

impl CppEnv {
    pub fn new(config: QitConfig) -> Self {
        Self {
            config,
            callbacks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn config(&self) -> &QitConfig {
        &self.config
    }

    /// Adds a callback for `event`. Every callback registered for an event
    /// runs, in registration order, on the listener thread.
    pub fn set_report_callback(
        &mut self,
        event: ReportEvent,
        callback: impl FnMut(&ReportMessage) + Send + 'static,
    ) {
        lock_callbacks(&self.callbacks).push((event, Box::new(callback)));
    }

    /// Materializes `target` in a native program and decodes one value of its
    /// element type. `Ok(None)` means the program produced no value.
    pub fn run_collect(&self, target: &Target, args: &RunArgs) -> Result<Option<Value>> {
        self.check_functions(target)?;
        let source = CppBuilder::new(&self.config.source_dir).build_collect(target, args)?;
        let source_path = self.write_source(&source)?;
        let exe = self.compile_source(&source_path)?;
        self.run_program(&exe, &target.element_type())
    }

    /// External function files that do not exist, each with the functions
    /// expected in it.
    pub fn missing_function_filenames(&self, target: &Target) -> BTreeMap<PathBuf, Vec<Function>> {
        let mut by_file: BTreeMap<PathBuf, Vec<Function>> = BTreeMap::new();
        for function in target.external_functions() {
            if let Some(path) = function.source_path(&self.config.source_dir) {
                by_file.entry(path).or_default().push(function);
            }
        }
        by_file.retain(|path, _| !path.is_file());
        by_file
    }

    pub fn check_functions(&self, target: &Target) -> Result<()> {
        let missing = self.missing_function_filenames(target);
        if missing.is_empty() {
            return Ok(());
        }
        if self.config.auto_create_files {
            return self.create_source_files(target, &missing);
        }
        let declarations = self.declare_functions(target, missing.values().flatten());
        Err(qitc::Error::MissingFiles {
            filenames: missing.into_keys().collect(),
            declarations,
        }
        .into())
    }

    /// Writes a stub per file: each expected function with a body that
    /// returns a value-initialized result.
    pub fn create_source_files(
        &self,
        target: &Target,
        missing: &BTreeMap<PathBuf, Vec<Function>>,
    ) -> Result<()> {
        let mut builder = CppBuilder::new(&self.config.source_dir);
        target.declare(&mut builder);
        for (path, functions) in missing {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("create dir: {}", parent.display()))?;
            }
            let mut stub = String::new();
            for function in functions {
                stub.push_str(&builder.function_declaration(function));
                stub.push_str(" {\n  return {};\n}\n\n");
            }
            std::fs::write(path, stub)
                .with_context(|| format!("write stub: {}", path.display()))?;
            log::warn!(
                "created stub {} for {}",
                path.display(),
                functions
                    .iter()
                    .map(Function::name)
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
        Ok(())
    }

    /// Declaration text of every external function the target calls.
    pub fn declarations(&self, target: &Target) -> Vec<String> {
        let externals = target.external_functions();
        self.declare_functions(target, externals.iter())
    }

    fn declare_functions<'a>(
        &self,
        target: &Target,
        functions: impl Iterator<Item = &'a Function>,
    ) -> Vec<String> {
        let mut builder = CppBuilder::new(&self.config.source_dir);
        target.declare(&mut builder);
        functions
            .map(|f| builder.function_declaration(f))
            .collect()
    }

    /// `debug.cpp` in debug mode, otherwise a fresh unique file.
    pub fn write_source(&self, source: &str) -> Result<PathBuf> {
        let build_dir = std::path::absolute(&self.config.build_dir)
            .with_context(|| format!("resolve build dir: {}", self.config.build_dir.display()))?;
        std::fs::create_dir_all(&build_dir)
            .with_context(|| format!("create dir: {}", build_dir.display()))?;
        let path = if self.config.debug {
            let path = build_dir.join("debug.cpp");
            std::fs::write(&path, source.as_bytes())
                .with_context(|| format!("write source: {}", path.display()))?;
            path
        } else {
            let (path, mut file) = process::create_unique_source(&build_dir)?;
            file.write_all(source.as_bytes())
                .with_context(|| format!("write source: {}", path.display()))?;
            path
        };
        log::debug!("wrote {}", path.display());
        Ok(path)
    }

    /// Compiles next to the source: `<dir>/<stem>.cpp` -> `<dir>/<stem>`.
    pub fn compile_source(&self, source_path: &Path) -> Result<PathBuf> {
        let exe = source_path.with_extension("");
        let (cxx, flags) = self.config.compiler_command();
        let mut cmd = Command::new(&cxx);
        cmd.arg("-o").arg(&exe).arg(source_path);
        for flag in &flags {
            cmd.arg(flag);
        }
        log::debug!("compiling {} with {:?} {:?}", source_path.display(), cxx, flags);

        let out = cmd
            .output()
            .with_context(|| format!("invoke compiler: {cxx:?}"))?;
        if !out.status.success() {
            return Err(qitc::Error::CompileFailed {
                compiler: cxx.to_string_lossy().into_owned(),
                exit_status: process::exit_code(out.status),
                source_path: source_path.to_path_buf(),
                stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
            }
            .into());
        }
        Ok(exe)
    }

    /// Runs `exe report-pipe output-pipe` and decodes one `element` value
    /// from the output pipe. Pipes are removed and the listener stopped on
    /// every path.
    pub fn run_program(&self, exe: &Path, element: &Type) -> Result<Option<Value>> {
        let report_path = pipe_path(exe, "report");
        let output_path = pipe_path(exe, "output");
        let mut scope = RunScope::default();

        for path in [&report_path, &output_path] {
            remove_stale(path)?;
            fifo::make_fifo(path)?;
            scope.pipes.push(path.clone());
        }

        let mut handler = ReportHandler::new(&report_path)
            .with_poll_interval(self.config.report_poll_interval);
        let callbacks = Arc::clone(&self.callbacks);
        handler.subscribe(move |message| dispatch_report(&callbacks, message));
        scope.listener = Some(handler.start()?);

        let reader = fifo::open_nonblocking_reader(&output_path)?;
        fifo::clear_nonblocking(&reader)?;
        // Holds the pipe open for writing until the child exits, so the read
        // below sees EOF even if the child never opens it.
        let keep_alive = OpenOptions::new()
            .write(true)
            .open(&output_path)
            .with_context(|| format!("open fifo for writing: {}", output_path.display()))?;

        let mut child = Command::new(exe)
            .arg(&report_path)
            .arg(&output_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("spawn program: {}", exe.display()))?;

        let stdout = child.stdout.take().context("take stdout")?;
        let stderr = child.stderr.take().context("take stderr")?;
        let stdout_thread = std::thread::spawn(move || -> std::io::Result<(Vec<u8>, bool)> {
            process::read_to_end_capped(stdout, CAPTURE_CAP)
        });
        let stderr_thread = std::thread::spawn(move || -> std::io::Result<(Vec<u8>, bool)> {
            process::read_to_end_capped(stderr, CAPTURE_CAP)
        });
        let waiter = std::thread::spawn(move || {
            let status = child.wait();
            drop(keep_alive);
            status
        });

        // The reader stays open until the child is reaped: a zero-field
        // value reads nothing, and the child's open of the pipe blocks until
        // a reader exists.
        let decoded = element.read(&mut BufReader::new(&reader));

        let status = waiter
            .join()
            .map_err(|_| anyhow!("exit waiter panicked"))?
            .context("wait for program")?;
        drop(reader);
        let (stdout_bytes, stdout_truncated) = join_capture(stdout_thread, "stdout");
        let (stderr_bytes, stderr_truncated) = join_capture(stderr_thread, "stderr");

        let exit_status = process::exit_code(status);
        if exit_status != 0 {
            return Err(qitc::Error::ProgramCrashed {
                exit_status,
                stdout: process::lossy(&stdout_bytes, stdout_truncated),
                stderr: process::lossy(&stderr_bytes, stderr_truncated),
            }
            .into());
        }
        if !stderr_bytes.is_empty() {
            log::debug!("program stderr:\n{}", String::from_utf8_lossy(&stderr_bytes));
        }
        Ok(decoded?)
    }
}

/// Removes the run's pipes and stops its listener when dropped.
#[derive(Default)]
struct RunScope {
    pipes: Vec<PathBuf>,
    listener: Option<ReportListener>,
}

impl Drop for RunScope {
    fn drop(&mut self) {
        if let Some(mut listener) = self.listener.take() {
            listener.stop();
        }
        for path in self.pipes.drain(..) {
            if let Err(err) = std::fs::remove_file(&path) {
                if err.kind() != std::io::ErrorKind::NotFound {
                    log::warn!("remove {}: {err}", path.display());
                }
            }
        }
    }
}

type CaptureThread = JoinHandle<std::io::Result<(Vec<u8>, bool)>>;

/// Captured bytes and truncation flag; empty if the capture failed.
fn join_capture(thread: CaptureThread, stream: &str) -> (Vec<u8>, bool) {
    match thread.join() {
        Ok(Ok(captured)) => captured,
        Ok(Err(err)) => {
            log::warn!("capture program {stream}: {err}");
            (Vec::new(), false)
        }
        Err(_) => {
            log::warn!("capture program {stream}: reader thread panicked");
            (Vec::new(), false)
        }
    }
}

/// A callback that panicked poisons the table; later registrations and
/// dispatches still go through.
fn lock_callbacks(table: &Mutex<CallbackList>) -> MutexGuard<'_, CallbackList> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

fn dispatch_report(table: &Mutex<CallbackList>, message: &ReportMessage) {
    for (event, callback) in lock_callbacks(table).iter_mut() {
        if *event == message.event {
            callback(message);
        }
    }
}

fn pipe_path(exe: &Path, suffix: &str) -> PathBuf {
    let mut s = exe.as_os_str().to_os_string();
    s.push("-");
    s.push(suffix);
    PathBuf::from(s)
}

/// Debug-mode runs reuse paths; a crashed host can leave a pipe behind.
fn remove_stale(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            log::debug!("removed stale {}", path.display());
            Ok(())
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("remove stale pipe: {}", path.display())),
    }
}
