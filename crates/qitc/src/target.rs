use std::collections::BTreeMap;
use std::io::Read;

use crate::builder::Builder;
use crate::error::{Error, Result};
use crate::function::{Function, FunctionInventory};
use crate::generator::{Generator, TypeIterator, Variable};
use crate::types::Type;
use crate::value::Value;

/// Values bound to `Variable` generators for one run.
pub type RunArgs = BTreeMap<String, Value>;

/// The object a generated program materializes: one generated value, or the
/// first element of a sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    Generator(Generator),
    Iterator(TypeIterator),
}

impl Target {
    pub fn element_type(&self) -> Type {
        match self {
            Target::Generator(g) => g.output_type(),
            Target::Iterator(i) => i.output_type(),
        }
    }

    pub fn declare(&self, builder: &mut dyn Builder) {
        match self {
            Target::Generator(g) => g.declare(builder),
            Target::Iterator(i) => i.declare(builder),
        }
    }

    pub fn variables(&self) -> Vec<&Variable> {
        let mut out = Vec::new();
        match self {
            Target::Generator(g) => g.collect_variables(&mut out),
            Target::Iterator(i) => i.collect_variables(&mut out),
        }
        out
    }

    /// Every variable must be bound to a value of its type.
    pub fn check_args(&self, args: &RunArgs) -> Result<()> {
        for variable in self.variables() {
            let Some(value) = args.get(variable.name()) else {
                return Err(Error::UnboundVariable {
                    name: variable.name().to_string(),
                });
            };
            if !variable.ty().matches(value) {
                return Err(Error::InvalidType(format!(
                    "run argument `{}` = {value} does not match {}",
                    variable.name(),
                    variable.ty().signature()
                )));
            }
        }
        Ok(())
    }

    pub fn read<R: Read + ?Sized>(&self, reader: &mut R) -> Result<Option<Value>> {
        self.element_type().read(reader)
    }
}

impl FunctionInventory for Target {
    fn collect_functions(&self, out: &mut Vec<Function>) {
        match self {
            Target::Generator(g) => g.collect_functions(out),
            Target::Iterator(i) => i.collect_functions(out),
        }
    }
}

impl From<Generator> for Target {
    fn from(g: Generator) -> Self {
        Target::Generator(g)
    }
}

impl From<TypeIterator> for Target {
    fn from(i: TypeIterator) -> Self {
        Target::Iterator(i)
    }
}
