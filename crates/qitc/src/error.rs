use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid name {name:?}: expected an identifier ([A-Za-z_][A-Za-z0-9_]*)")]
    InvalidName { name: String },

    #[error("duplicate field `{field}` in product {product}")]
    DuplicateField { product: String, field: String },

    #[error("unknown field `{field}` in product {product}")]
    UnknownField { product: String, field: String },

    #[error("invalid type: {0}")]
    InvalidType(String),

    #[error("variable `{name}` has no run argument")]
    UnboundVariable { name: String },

    #[error("incomplete value: expected {expected} bytes, got {got}")]
    IncompleteValue { expected: usize, got: usize },

    #[error("incomplete product {product}: stream ended after {read} of {total} fields")]
    IncompleteProduct {
        product: String,
        read: usize,
        total: usize,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(
        "file(s) {} are required because of the following function(s):\n {}",
        display_paths(.filenames),
        .declarations.join(",")
    )]
    MissingFiles {
        filenames: Vec<PathBuf>,
        declarations: Vec<String>,
    },

    #[error("compiler {compiler} failed (exit={exit_status}) on {}:\n{stderr}", .source_path.display())]
    CompileFailed {
        compiler: String,
        exit_status: i32,
        source_path: PathBuf,
        stderr: String,
    },

    #[error("program crashed (exit={exit_status})\n--- stdout ---\n{stdout}\n--- stderr ---\n{stderr}")]
    ProgramCrashed {
        exit_status: i32,
        stdout: String,
        stderr: String,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(",")
}
