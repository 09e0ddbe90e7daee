//! JSON description of a run: the target to materialize and its arguments.
//!
//! ```json
//! {
//!   "target": {"generator": {"type": {"product": {"name": "Point", "fields": [
//!     {"name": "x", "type": {"range": {"start": 0, "end": 10}}},
//!     {"name": "y", "type": "int", "generator": {"variable": {"name": "y", "type": "int"}}}
//!   ]}}}},
//!   "args": {"y": 7}
//! }
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use qitc::{
    Field, Function, Generator, Product, RunArgs, Target, Type, TypeIterator, Value, Variable,
};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunSpec {
    pub target: TargetSpec,
    #[serde(default)]
    pub args: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum TargetSpec {
    Generator(GeneratorSpec),
    Iterator(IteratorSpec),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum TypeSpec {
    Int,
    Range {
        start: i32,
        end: i32,
    },
    Values {
        of: Box<TypeSpec>,
        values: Vec<serde_json::Value>,
    },
    Product {
        #[serde(default)]
        name: Option<String>,
        fields: Vec<FieldSpec>,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldSpec {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub ty: TypeSpec,
    #[serde(default)]
    pub generator: Option<GeneratorSpec>,
    #[serde(default)]
    pub iterator: Option<IteratorSpec>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum GeneratorSpec {
    /// Default generator of a type.
    Type(TypeSpec),
    Uniform {
        min: i32,
        max: i32,
    },
    Variable {
        name: String,
        #[serde(rename = "type")]
        ty: TypeSpec,
    },
    Call {
        function: FunctionSpec,
        #[serde(default)]
        args: Vec<GeneratorSpec>,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum IteratorSpec {
    /// Default iterator of a type.
    Type(TypeSpec),
    /// One value from a generator.
    Generator(GeneratorSpec),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FunctionSpec {
    pub name: String,
    pub returns: TypeSpec,
    #[serde(default)]
    pub params: Vec<ParamSpec>,
    /// External source file, relative to the source dir.
    #[serde(default)]
    pub file: Option<PathBuf>,
    /// Inline C++ body.
    #[serde(default)]
    pub body: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParamSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeSpec,
}

impl RunSpec {
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("parse run description")
    }

    pub fn target(&self) -> Result<Target> {
        Ok(match &self.target {
            TargetSpec::Generator(g) => Target::Generator(g.build()?),
            TargetSpec::Iterator(i) => Target::Iterator(i.build()?),
        })
    }

    pub fn run_args(&self) -> Result<RunArgs> {
        self.args
            .iter()
            .map(|(name, v)| {
                let value = value_from_json(v).with_context(|| format!("argument `{name}`"))?;
                Ok((name.clone(), value))
            })
            .collect()
    }
}

impl TypeSpec {
    pub fn build(&self) -> Result<Type> {
        Ok(match self {
            TypeSpec::Int => Type::Int,
            TypeSpec::Range { start, end } => Type::range(*start, *end)?,
            TypeSpec::Values { of, values } => {
                let values = values
                    .iter()
                    .map(value_from_json)
                    .collect::<Result<Vec<_>>>()?;
                Type::values(of.build()?, values)?
            }
            TypeSpec::Product { name, fields } => {
                let mut built = Vec::with_capacity(fields.len());
                for field in fields {
                    let ty = field.ty.build()?;
                    built.push(match &field.name {
                        Some(name) => Field::named(name.clone(), ty),
                        None => Field::unnamed(ty),
                    });
                }
                let mut product = Product::new(name.as_deref(), built)?;
                let names = product
                    .names()
                    .into_iter()
                    .map(str::to_string)
                    .collect::<Vec<_>>();
                for (field, name) in fields.iter().zip(&names) {
                    if let Some(g) = &field.generator {
                        product.set_generator(name, g.build()?)?;
                    }
                    if let Some(i) = &field.iterator {
                        product.set_iterator(name, i.build()?)?;
                    }
                }
                Type::from(product)
            }
        })
    }
}

impl GeneratorSpec {
    pub fn build(&self) -> Result<Generator> {
        Ok(match self {
            GeneratorSpec::Type(ty) => ty.build()?.generator(),
            GeneratorSpec::Uniform { min, max } => Generator::uniform_int(*min, *max)?,
            GeneratorSpec::Variable { name, ty } => {
                Variable::new(name.clone(), ty.build()?)?.generator()
            }
            GeneratorSpec::Call { function, args } => {
                let args = args
                    .iter()
                    .map(GeneratorSpec::build)
                    .collect::<Result<Vec<_>>>()?;
                function.build()?.call(args)?
            }
        })
    }
}

impl IteratorSpec {
    pub fn build(&self) -> Result<TypeIterator> {
        Ok(match self {
            IteratorSpec::Type(ty) => ty.build()?.iterator(),
            IteratorSpec::Generator(g) => g.build()?.iterate(),
        })
    }
}

impl FunctionSpec {
    pub fn build(&self) -> Result<Function> {
        let returns = self.returns.build()?;
        let mut function = match (&self.file, &self.body) {
            (Some(file), None) => Function::external(self.name.clone(), returns, file.clone())?,
            (None, Some(body)) => Function::inline(self.name.clone(), returns, body.clone())?,
            _ => bail!(
                "function `{}` needs exactly one of `file` or `body`",
                self.name
            ),
        };
        for param in &self.params {
            function = function.param(param.name.clone(), param.ty.build()?)?;
        }
        Ok(function)
    }
}

pub fn value_from_json(v: &serde_json::Value) -> Result<Value> {
    match v {
        serde_json::Value::Number(n) => {
            let Some(i) = n.as_i64() else {
                bail!("expected an integer, got {n}");
            };
            let i = i32::try_from(i).with_context(|| format!("{i} does not fit in a 32-bit int"))?;
            Ok(Value::Int(i))
        }
        serde_json::Value::Array(items) => Ok(Value::Tuple(
            items.iter().map(value_from_json).collect::<Result<_>>()?,
        )),
        other => bail!("expected an integer or an array, got {other}"),
    }
}

pub fn value_to_json(v: &Value) -> serde_json::Value {
    match v {
        Value::Int(i) => serde_json::Value::from(*i),
        Value::Tuple(items) => serde_json::Value::Array(items.iter().map(value_to_json).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qitc::FunctionInventory;

    #[test]
    fn product_target_with_overrides_parses() {
        let spec = RunSpec::parse(
            r#"{
              "target": {"generator": {"type": {"product": {"name": "Point", "fields": [
                {"name": "x", "type": {"range": {"start": 0, "end": 10}}},
                {"name": "y", "type": "int", "generator": {"variable": {"name": "y", "type": "int"}}}
              ]}}}},
              "args": {"y": 7}
            }"#,
        )
        .expect("parse");
        let target = spec.target().expect("target");
        let Type::Product(point) = target.element_type() else {
            panic!("expected a product element type");
        };
        assert_eq!(point.names(), vec!["x", "y"]);
        assert_eq!(target.variables().len(), 1);
        assert_eq!(
            spec.run_args().expect("args").get("y"),
            Some(&Value::Int(7))
        );
    }

    #[test]
    fn calls_need_a_file_or_a_body() {
        let spec = RunSpec::parse(
            r#"{"target": {"generator": {"call": {"function": {"name": "f", "returns": "int"}}}}}"#,
        )
        .expect("parse");
        assert!(spec.target().is_err());

        let spec = RunSpec::parse(
            r#"{"target": {"iterator": {"generator": {"call": {"function":
                {"name": "f", "returns": "int", "file": "f.cpp"}}}}}}"#,
        )
        .expect("parse");
        let target = spec.target().expect("target");
        assert_eq!(target.external_functions().len(), 1);
    }

    #[test]
    fn json_values_must_fit_i32() {
        assert!(value_from_json(&serde_json::json!(1_i64 << 40)).is_err());
        assert!(value_from_json(&serde_json::json!("x")).is_err());
        assert_eq!(
            value_from_json(&serde_json::json!([1, [2, 3]])).expect("value"),
            Value::Tuple(vec![
                Value::Int(1),
                Value::Tuple(vec![Value::Int(2), Value::Int(3)])
            ])
        );
        assert_eq!(
            value_to_json(&Value::Tuple(vec![Value::Int(4)])),
            serde_json::json!([4])
        );
    }
}
