use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use qit_runner::target_json::{value_to_json, RunSpec};
use qit_runner::{CppEnv, QitConfig, ReportEvent};

#[derive(Parser)]
#[command(name = "qit")]
#[command(about = "Generate, compile and run C++ programs for typed targets.", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a target and print the collected value as JSON.
    Run(RunCmd),
    /// Print the declarations of the external functions a target needs.
    Declarations(EnvArgs),
}

#[derive(Args)]
struct EnvArgs {
    /// JSON run description; `-` reads stdin.
    #[arg(long)]
    target: PathBuf,

    #[arg(long, default_value = "./src")]
    source_dir: PathBuf,
}

#[derive(Args)]
struct RunCmd {
    #[command(flatten)]
    env: EnvArgs,

    #[arg(long, default_value = "./build")]
    build_dir: PathBuf,

    /// Always write the program to `<build-dir>/debug.cpp`.
    #[arg(long)]
    debug: bool,

    /// Write stubs for missing external function files.
    #[arg(long)]
    auto_create_files: bool,

    #[arg(long)]
    compiler: Option<String>,

    /// Replaces the default compiler flags.
    #[arg(long = "cxx-flag", allow_hyphen_values = true)]
    cxx_flags: Vec<String>,

    #[arg(long, default_value_t = 50)]
    poll_interval_ms: u64,

    /// Echo report messages to stderr.
    #[arg(long)]
    show_reports: bool,
}

fn main() -> std::process::ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    match try_main() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            let code = match err.downcast_ref::<qitc::Error>() {
                Some(qitc::Error::MissingFiles { .. }) => 3,
                Some(qitc::Error::CompileFailed { .. }) => 4,
                Some(qitc::Error::ProgramCrashed { .. }) => 5,
                _ => 2,
            };
            std::process::ExitCode::from(code)
        }
    }
}

fn try_main() -> Result<std::process::ExitCode> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run(cmd) => run(cmd),
        Command::Declarations(args) => declarations(args),
    }
}

fn run(cmd: RunCmd) -> Result<std::process::ExitCode> {
    let spec = read_spec(&cmd.env.target)?;
    let mut config = QitConfig {
        build_dir: cmd.build_dir,
        source_dir: cmd.env.source_dir,
        debug: cmd.debug,
        auto_create_files: cmd.auto_create_files,
        report_poll_interval: Duration::from_millis(cmd.poll_interval_ms),
        ..QitConfig::default()
    };
    if let Some(compiler) = cmd.compiler {
        config.compiler = compiler;
    }
    if !cmd.cxx_flags.is_empty() {
        config.cxx_flags = cmd.cxx_flags;
    }

    let mut env = CppEnv::new(config);
    if cmd.show_reports {
        for event in [
            ReportEvent::ProgressPush,
            ReportEvent::ProgressPop,
            ReportEvent::ProgressUpdate,
            ReportEvent::Error,
            ReportEvent::Unknown,
        ] {
            env.set_report_callback(event, |message| {
                eprintln!("[report] {} {}", message.tag, message.args.join(" "));
            });
        }
    }

    let target = spec.target()?;
    let args = spec.run_args()?;
    let value = env.run_collect(&target, &args)?;
    let json = value
        .as_ref()
        .map(value_to_json)
        .unwrap_or(serde_json::Value::Null);
    println!("{}", serde_json::to_string(&json)?);
    Ok(std::process::ExitCode::SUCCESS)
}

fn declarations(args: EnvArgs) -> Result<std::process::ExitCode> {
    let spec = read_spec(&args.target)?;
    let env = CppEnv::new(QitConfig {
        source_dir: args.source_dir,
        ..QitConfig::default()
    });
    for declaration in env.declarations(&spec.target()?) {
        println!("{declaration};");
    }
    Ok(std::process::ExitCode::SUCCESS)
}

fn read_spec(path: &Path) -> Result<RunSpec> {
    let text = if path.as_os_str() == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("read run description from stdin")?;
        text
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("read run description: {}", path.display()))?
    };
    RunSpec::parse(&text)
}
