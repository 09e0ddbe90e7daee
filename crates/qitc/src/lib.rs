pub mod builder;
pub mod cpp_builder;
pub mod error;
pub mod function;
pub mod generator;
pub mod product;
pub mod target;
pub mod types;
pub mod value;

pub use builder::{Builder, DeclKey, DeclarationSet};
pub use cpp_builder::CppBuilder;
pub use error::{Error, Result};
pub use function::{Function, FunctionBody, FunctionInventory};
pub use generator::{FunctionGenerator, Generator, GeneratorIterator, TypeIterator, Variable};
pub use product::{DerivedProduct, Field, Product, ProductGenerator, ProductIterator, ProductParent};
pub use target::{RunArgs, Target};
pub use types::{Range, Type, Values};
pub use value::Value;
