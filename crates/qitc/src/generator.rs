use crate::builder::Builder;
use crate::error::{Error, Result};
use crate::function::{push_function, Function, FunctionInventory};
use crate::product::{ProductGenerator, ProductIterator};
use crate::types::{Range, Type, Values};

/// Produces exactly one value of its output type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Generator {
    /// Uniform over `[min, max]`.
    UniformInt { min: i32, max: i32 },
    Values(Values),
    Product(ProductGenerator),
    Function(FunctionGenerator),
    Variable(Variable),
}

/// Produces a finite, possibly empty, sequence of values of its element type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeIterator {
    Range(Range),
    Values(Values),
    Product(ProductIterator),
    Generator(GeneratorIterator),
}

/// One-shot sequence over a generator: yields one generated value, then stops.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GeneratorIterator {
    generator: Box<Generator>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionGenerator {
    function: Function,
    args: Vec<Generator>,
}

/// Yields the run argument bound to `name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Variable {
    name: String,
    ty: Type,
}

impl Generator {
    pub fn uniform_int(min: i32, max: i32) -> Result<Self> {
        if min > max {
            return Err(Error::InvalidType(format!(
                "uniform int bounds out of order: {min} > {max}"
            )));
        }
        Ok(Generator::UniformInt { min, max })
    }

    pub fn output_type(&self) -> Type {
        match self {
            Generator::UniformInt { .. } => Type::Int,
            Generator::Values(v) => v.ty().clone(),
            Generator::Product(g) => Type::Product(g.output_type().clone()),
            Generator::Function(g) => g.function.return_type().clone(),
            Generator::Variable(v) => v.ty.clone(),
        }
    }

    pub fn iterate(self) -> TypeIterator {
        TypeIterator::Generator(GeneratorIterator::new(self))
    }

    pub fn declare(&self, builder: &mut dyn Builder) {
        match self {
            Generator::Product(g) => g.declare(builder),
            Generator::Function(g) => {
                for arg in &g.args {
                    arg.declare(builder);
                }
                g.function.declare(builder);
                builder.declare_generator(self);
            }
            _ => {
                self.output_type().declare(builder);
                builder.declare_generator(self);
            }
        }
    }

    pub fn collect_variables<'a>(&'a self, out: &mut Vec<&'a Variable>) {
        match self {
            Generator::UniformInt { .. } | Generator::Values(_) => {}
            Generator::Product(g) => {
                for field in g.generators() {
                    field.collect_variables(out);
                }
            }
            Generator::Function(g) => {
                for arg in &g.args {
                    arg.collect_variables(out);
                }
            }
            Generator::Variable(v) => {
                if !out.iter().any(|seen| *seen == v) {
                    out.push(v);
                }
            }
        }
    }
}

impl FunctionInventory for Generator {
    fn collect_functions(&self, out: &mut Vec<Function>) {
        match self {
            Generator::UniformInt { .. } | Generator::Values(_) | Generator::Variable(_) => {}
            Generator::Product(g) => {
                for field in g.generators() {
                    field.collect_functions(out);
                }
            }
            Generator::Function(g) => {
                for arg in &g.args {
                    arg.collect_functions(out);
                }
                push_function(out, &g.function);
            }
        }
    }
}

impl TypeIterator {
    pub fn output_type(&self) -> Type {
        match self {
            TypeIterator::Range(r) => Type::Range(*r),
            TypeIterator::Values(v) => v.ty().clone(),
            TypeIterator::Product(i) => Type::Product(i.output_type().clone()),
            TypeIterator::Generator(i) => i.output_type(),
        }
    }

    pub fn declare(&self, builder: &mut dyn Builder) {
        match self {
            TypeIterator::Product(i) => i.declare(builder),
            TypeIterator::Generator(i) => {
                i.generator.declare(builder);
                builder.declare_iterator(self);
            }
            _ => {
                self.output_type().declare(builder);
                builder.declare_iterator(self);
            }
        }
    }

    pub fn collect_variables<'a>(&'a self, out: &mut Vec<&'a Variable>) {
        match self {
            TypeIterator::Range(_) | TypeIterator::Values(_) => {}
            TypeIterator::Product(i) => {
                for field in i.iterators() {
                    field.collect_variables(out);
                }
            }
            TypeIterator::Generator(i) => i.generator.collect_variables(out),
        }
    }
}

impl FunctionInventory for TypeIterator {
    fn collect_functions(&self, out: &mut Vec<Function>) {
        match self {
            TypeIterator::Range(_) | TypeIterator::Values(_) => {}
            TypeIterator::Product(i) => {
                for field in i.iterators() {
                    field.collect_functions(out);
                }
            }
            TypeIterator::Generator(i) => i.generator.collect_functions(out),
        }
    }
}

impl GeneratorIterator {
    pub fn new(generator: Generator) -> Self {
        Self {
            generator: Box::new(generator),
        }
    }

    pub fn generator(&self) -> &Generator {
        &self.generator
    }

    pub fn output_type(&self) -> Type {
        self.generator.output_type()
    }
}

impl From<Generator> for TypeIterator {
    fn from(generator: Generator) -> Self {
        generator.iterate()
    }
}

impl FunctionGenerator {
    pub(crate) fn new(function: Function, args: Vec<Generator>) -> Self {
        Self { function, args }
    }

    pub fn function(&self) -> &Function {
        &self.function
    }

    pub fn args(&self) -> &[Generator] {
        &self.args
    }
}

impl Variable {
    pub fn new(name: impl Into<String>, ty: Type) -> Result<Self> {
        let name = name.into();
        crate::product::check_identifier(&name)?;
        Ok(Self { name, ty })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> &Type {
        &self.ty
    }

    pub fn generator(self) -> Generator {
        Generator::Variable(self)
    }
}
