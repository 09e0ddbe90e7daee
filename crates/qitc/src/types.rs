use std::io::Read;
use std::rc::Rc;

use crate::builder::Builder;
use crate::error::{Error, Result};
use crate::function::{Function, FunctionInventory};
use crate::generator::{Generator, GeneratorIterator, TypeIterator};
use crate::product::{DerivedProduct, Product};
use crate::value::{read_fixed, Value};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Int,
    Range(Range),
    Values(Values),
    Product(Rc<Product>),
    Derived(Rc<DerivedProduct>),
}

/// Integers in `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Range {
    start: i32,
    end: i32,
}

impl Range {
    pub fn new(start: i32, end: i32) -> Result<Self> {
        if start >= end {
            return Err(Error::InvalidType(format!(
                "empty range [{start}, {end})"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> i32 {
        self.start
    }

    pub fn end(&self) -> i32 {
        self.end
    }
}

/// A fixed, non-empty list of values of one type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Values {
    ty: Box<Type>,
    values: Vec<Value>,
}

impl Values {
    pub fn new(ty: Type, values: Vec<Value>) -> Result<Self> {
        if values.is_empty() {
            return Err(Error::InvalidType("values list is empty".to_string()));
        }
        if let Some(bad) = values.iter().find(|v| !ty.matches(v)) {
            return Err(Error::InvalidType(format!(
                "value {bad} does not match type {}",
                ty.signature()
            )));
        }
        Ok(Self {
            ty: Box::new(ty),
            values,
        })
    }

    pub fn ty(&self) -> &Type {
        &self.ty
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }
}

impl Type {
    pub fn int() -> Self {
        Type::Int
    }

    pub fn range(start: i32, end: i32) -> Result<Self> {
        Ok(Type::Range(Range::new(start, end)?))
    }

    pub fn values(ty: Type, values: impl IntoIterator<Item = Value>) -> Result<Self> {
        Ok(Type::Values(Values::new(ty, values.into_iter().collect())?))
    }

    /// The type that knows the wire layout: `Int` or a plain `Product`.
    pub fn basic_type(&self) -> Type {
        match self {
            Type::Int | Type::Range(_) => Type::Int,
            Type::Values(v) => v.ty.basic_type(),
            Type::Product(_) => self.clone(),
            Type::Derived(d) => Type::Product(d.basic_product().clone()),
        }
    }

    pub fn generator(&self) -> Generator {
        match self {
            Type::Int => Generator::UniformInt {
                min: i32::MIN,
                max: i32::MAX,
            },
            Type::Range(r) => Generator::UniformInt {
                min: r.start,
                max: r.end - 1,
            },
            Type::Values(v) => Generator::Values(v.clone()),
            Type::Product(p) => p.generator(),
            Type::Derived(d) => d.generator(),
        }
    }

    pub fn iterator(&self) -> TypeIterator {
        match self {
            Type::Int => TypeIterator::Generator(GeneratorIterator::new(self.generator())),
            Type::Range(r) => TypeIterator::Range(*r),
            Type::Values(v) => TypeIterator::Values(v.clone()),
            Type::Product(p) => p.iterator(),
            Type::Derived(d) => d.iterator(),
        }
    }

    pub fn declare(&self, builder: &mut dyn Builder) {
        match self {
            Type::Int | Type::Range(_) => {}
            Type::Values(v) => v.ty.declare(builder),
            Type::Product(p) => p.declare(builder),
            Type::Derived(d) => d.basic_product().declare(builder),
        }
    }

    /// Decodes one value. `Ok(None)` means the stream was already exhausted.
    pub fn read<R: Read + ?Sized>(&self, reader: &mut R) -> Result<Option<Value>> {
        match self.basic_type() {
            Type::Product(p) => p.read(reader),
            _ => Ok(read_fixed::<4, R>(reader)?.map(|b| Value::Int(i32::from_ne_bytes(b)))),
        }
    }

    pub fn as_product(&self) -> Option<&Rc<Product>> {
        match self {
            Type::Product(p) => Some(p),
            _ => None,
        }
    }

    /// Canonical layout key; two types with equal signatures share a wire format
    /// and a generated class.
    pub fn signature(&self) -> String {
        match self.basic_type() {
            Type::Product(p) => p.signature(),
            _ => "int".to_string(),
        }
    }

    pub fn matches(&self, value: &Value) -> bool {
        match (self.basic_type(), value) {
            (Type::Product(p), Value::Tuple(items)) => {
                p.len() == items.len()
                    && p.items().iter().zip(items).all(|((_, ty), v)| ty.matches(v))
            }
            (Type::Product(_), Value::Int(_)) => false,
            (_, Value::Int(_)) => true,
            (_, Value::Tuple(_)) => false,
        }
    }
}

impl From<Product> for Type {
    fn from(p: Product) -> Self {
        Type::Product(Rc::new(p))
    }
}

impl From<Rc<Product>> for Type {
    fn from(p: Rc<Product>) -> Self {
        Type::Product(p)
    }
}

impl From<DerivedProduct> for Type {
    fn from(d: DerivedProduct) -> Self {
        Type::Derived(Rc::new(d))
    }
}

impl From<Range> for Type {
    fn from(r: Range) -> Self {
        Type::Range(r)
    }
}

impl std::ops::Mul for Type {
    type Output = Product;

    fn mul(self, rhs: Type) -> Product {
        match self {
            Type::Product(p) => p.combine(rhs),
            other => Product::tuple([other, rhs]),
        }
    }
}

impl FunctionInventory for Type {
    fn collect_functions(&self, out: &mut Vec<Function>) {
        self.generator().collect_functions(out);
        self.iterator().collect_functions(out);
    }
}
