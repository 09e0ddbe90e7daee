use std::path::{Path, PathBuf};

use crate::builder::Builder;
use crate::error::{Error, Result};
use crate::generator::{FunctionGenerator, Generator};
use crate::product::check_identifier;
use crate::types::Type;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FunctionBody {
    /// Definition lives in a source file under the configured source dir.
    External { filename: PathBuf },
    Inline(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Function {
    name: String,
    return_type: Type,
    params: Vec<(String, Type)>,
    body: FunctionBody,
}

impl Function {
    pub fn external(
        name: impl Into<String>,
        return_type: Type,
        filename: impl Into<PathBuf>,
    ) -> Result<Self> {
        Self::new(
            name.into(),
            return_type,
            FunctionBody::External {
                filename: filename.into(),
            },
        )
    }

    pub fn inline(name: impl Into<String>, return_type: Type, body: impl Into<String>) -> Result<Self> {
        Self::new(name.into(), return_type, FunctionBody::Inline(body.into()))
    }

    fn new(name: String, return_type: Type, body: FunctionBody) -> Result<Self> {
        check_identifier(&name)?;
        Ok(Self {
            name,
            return_type,
            params: Vec::new(),
            body,
        })
    }

    pub fn param(mut self, name: impl Into<String>, ty: Type) -> Result<Self> {
        let name = name.into();
        check_identifier(&name)?;
        if self.params.iter().any(|(n, _)| *n == name) {
            return Err(Error::DuplicateField {
                product: format!("parameters of {}", self.name),
                field: name,
            });
        }
        self.params.push((name, ty));
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn return_type(&self) -> &Type {
        &self.return_type
    }

    pub fn params(&self) -> &[(String, Type)] {
        &self.params
    }

    pub fn body(&self) -> &FunctionBody {
        &self.body
    }

    pub fn is_external(&self) -> bool {
        matches!(self.body, FunctionBody::External { .. })
    }

    pub fn filename(&self) -> Option<&Path> {
        match &self.body {
            FunctionBody::External { filename } => Some(filename),
            FunctionBody::Inline(_) => None,
        }
    }

    /// Absolute path of the backing source file, for external functions.
    pub fn source_path(&self, source_dir: &Path) -> Option<PathBuf> {
        let joined = source_dir.join(self.filename()?);
        Some(std::path::absolute(&joined).unwrap_or(joined))
    }

    /// Generator calling this function with one generator per parameter.
    pub fn call(self, args: Vec<Generator>) -> Result<Generator> {
        if args.len() != self.params.len() {
            return Err(Error::InvalidType(format!(
                "{} takes {} argument(s), got {}",
                self.name,
                self.params.len(),
                args.len()
            )));
        }
        for ((param, ty), arg) in self.params.iter().zip(&args) {
            if ty.signature() != arg.output_type().signature() {
                return Err(Error::InvalidType(format!(
                    "argument `{param}` of {} expects {}, got {}",
                    self.name,
                    ty.signature(),
                    arg.output_type().signature()
                )));
            }
        }
        Ok(Generator::Function(FunctionGenerator::new(self, args)))
    }

    pub fn declare(&self, builder: &mut dyn Builder) {
        self.return_type.declare(builder);
        for (_, ty) in &self.params {
            ty.declare(builder);
        }
        builder.declare_function(self);
    }
}

/// Enumerates the functions reachable from an object graph.
pub trait FunctionInventory {
    fn collect_functions(&self, out: &mut Vec<Function>);

    /// Distinct functions in first-seen order.
    fn functions(&self) -> Vec<Function> {
        let mut out = Vec::new();
        self.collect_functions(&mut out);
        out
    }

    fn external_functions(&self) -> Vec<Function> {
        self.functions()
            .into_iter()
            .filter(Function::is_external)
            .collect()
    }
}

pub(crate) fn push_function(out: &mut Vec<Function>, function: &Function) {
    if !out.contains(function) {
        out.push(function.clone());
    }
}
