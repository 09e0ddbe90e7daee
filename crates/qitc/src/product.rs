use std::collections::BTreeMap;
use std::io::Read;
use std::rc::Rc;

use crate::builder::Builder;
use crate::error::{Error, Result};
use crate::generator::{Generator, TypeIterator};
use crate::types::Type;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Field {
    name: Option<String>,
    ty: Type,
}

impl Field {
    pub fn named(name: impl Into<String>, ty: impl Into<Type>) -> Self {
        Self {
            name: Some(name.into()),
            ty: ty.into(),
        }
    }

    pub fn unnamed(ty: impl Into<Type>) -> Self {
        Self {
            name: None,
            ty: ty.into(),
        }
    }
}

/// Named tuple of typed fields with per-field generator/iterator state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Product {
    name: Option<String>,
    items: Vec<(String, Type)>,
    generators: BTreeMap<String, Generator>,
    iterators: BTreeMap<String, TypeIterator>,
}

impl Product {
    pub fn new(name: Option<&str>, fields: impl IntoIterator<Item = Field>) -> Result<Self> {
        if let Some(name) = name {
            check_identifier(name)?;
        }
        let mut product = Self::empty(name.map(str::to_string));
        for field in fields {
            let name = match field.name {
                Some(name) => {
                    check_identifier(&name)?;
                    name
                }
                None => auto_name(product.items.len()),
            };
            if product.generators.contains_key(&name) {
                return Err(Error::DuplicateField {
                    product: product.label().to_string(),
                    field: name,
                });
            }
            product.insert(name, field.ty);
        }
        Ok(product)
    }

    /// Anonymous product with fields `_v0, _v1, ...`.
    pub fn tuple(types: impl IntoIterator<Item = Type>) -> Self {
        let mut product = Self::empty(None);
        for ty in types {
            product.insert(auto_name(product.items.len()), ty);
        }
        product
    }

    fn empty(name: Option<String>) -> Self {
        Self {
            name,
            items: Vec::new(),
            generators: BTreeMap::new(),
            iterators: BTreeMap::new(),
        }
    }

    fn insert(&mut self, name: String, ty: Type) {
        self.generators.insert(name.clone(), ty.generator());
        self.iterators.insert(name.clone(), ty.iterator());
        self.items.push((name, ty));
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub(crate) fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("(anonymous)")
    }

    pub fn items(&self) -> &[(String, Type)] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.items.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn types(&self) -> Vec<&Type> {
        self.items.iter().map(|(_, ty)| ty).collect()
    }

    pub fn basic_types(&self) -> Vec<Type> {
        self.items.iter().map(|(_, ty)| ty.basic_type()).collect()
    }

    /// Layout key: name plus field names and field layouts.
    pub fn signature(&self) -> String {
        let fields = self
            .items
            .iter()
            .map(|(name, ty)| format!("{name}:{}", ty.signature()))
            .collect::<Vec<_>>()
            .join(",");
        format!("{}{{{fields}}}", self.name().unwrap_or(""))
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.generators.contains_key(name)
    }

    pub fn generator(&self) -> Generator {
        let generators = self
            .items
            .iter()
            .map(|(name, _)| self.generators[name].clone())
            .collect();
        Generator::Product(ProductGenerator::new(Rc::new(self.clone()), generators))
    }

    pub fn iterator(&self) -> TypeIterator {
        let iterators = self
            .items
            .iter()
            .map(|(name, _)| self.iterators[name].clone())
            .collect();
        TypeIterator::Product(ProductIterator::new(Rc::new(self.clone()), iterators))
    }

    /// New product with this product's fields followed by `other` as one more
    /// auto-named field. `self` is left untouched.
    pub fn combine(&self, other: impl Into<Type>) -> Product {
        let mut product = Self::empty(None);
        for (name, ty) in &self.items {
            product.insert(name.clone(), ty.clone());
        }
        let mut index = product.items.len();
        while product.has_field(&auto_name(index)) {
            index += 1;
        }
        product.insert(auto_name(index), other.into());
        product
    }

    pub fn get_generator(&self, name: &str) -> Result<&Generator> {
        self.generators
            .get(name)
            .ok_or_else(|| self.unknown_field(name))
    }

    pub fn get_iterator(&self, name: &str) -> Result<&TypeIterator> {
        self.iterators
            .get(name)
            .ok_or_else(|| self.unknown_field(name))
    }

    pub fn set(&mut self, name: &str, ty: &Type) -> Result<()> {
        self.set_generator(name, ty.generator())?;
        self.set_iterator(name, ty.iterator())
    }

    pub fn set_generator(&mut self, name: &str, generator: Generator) -> Result<()> {
        self.check_override(name, &generator.output_type())?;
        match self.generators.get_mut(name) {
            Some(slot) => {
                *slot = generator;
                Ok(())
            }
            None => Err(self.unknown_field(name)),
        }
    }

    pub fn set_iterator(&mut self, name: &str, iterator: TypeIterator) -> Result<()> {
        self.check_override(name, &iterator.output_type())?;
        match self.iterators.get_mut(name) {
            Some(slot) => {
                *slot = iterator;
                Ok(())
            }
            None => Err(self.unknown_field(name)),
        }
    }

    pub fn derive(self: &Rc<Self>) -> DerivedProduct {
        DerivedProduct::new(ProductParent::Product(self.clone()))
    }

    pub fn declare(&self, builder: &mut dyn Builder) {
        for (_, ty) in &self.items {
            ty.declare(builder);
        }
        builder.declare_product_class(self);
    }

    pub fn read<R: Read + ?Sized>(&self, reader: &mut R) -> Result<Option<Value>> {
        if self.items.is_empty() {
            return Ok(Some(Value::Tuple(Vec::new())));
        }
        let mut values = Vec::with_capacity(self.items.len());
        for (_, ty) in &self.items {
            match ty.basic_type().read(reader)? {
                Some(value) => values.push(value),
                None if values.is_empty() => return Ok(None),
                None => {
                    return Err(Error::IncompleteProduct {
                        product: self.label().to_string(),
                        read: values.len(),
                        total: self.items.len(),
                    })
                }
            }
        }
        Ok(Some(Value::Tuple(values)))
    }

    /// An override must produce values with the field's layout.
    fn check_override(&self, name: &str, output: &Type) -> Result<()> {
        let Some((_, ty)) = self.items.iter().find(|(field, _)| field == name) else {
            return Err(self.unknown_field(name));
        };
        if ty.signature() != output.signature() {
            return Err(Error::InvalidType(format!(
                "field `{name}` of {} expects {}, got {}",
                self.label(),
                ty.signature(),
                output.signature()
            )));
        }
        Ok(())
    }

    fn unknown_field(&self, name: &str) -> Error {
        Error::UnknownField {
            product: self.label().to_string(),
            field: name.to_string(),
        }
    }
}

impl std::ops::Mul<Type> for &Product {
    type Output = Product;

    fn mul(self, rhs: Type) -> Product {
        self.combine(rhs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ProductParent {
    Product(Rc<Product>),
    Derived(Rc<DerivedProduct>),
}

/// Specialization of a product: overrides live here, lookups that miss fall
/// through to the parent. The parent is shared, never modified.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DerivedProduct {
    parent: ProductParent,
    generators: BTreeMap<String, Generator>,
    iterators: BTreeMap<String, TypeIterator>,
}

impl DerivedProduct {
    pub fn new(parent: ProductParent) -> Self {
        Self {
            parent,
            generators: BTreeMap::new(),
            iterators: BTreeMap::new(),
        }
    }

    pub fn parent(&self) -> &ProductParent {
        &self.parent
    }

    pub fn basic_product(&self) -> &Rc<Product> {
        match &self.parent {
            ProductParent::Product(p) => p,
            ProductParent::Derived(d) => d.basic_product(),
        }
    }

    /// This product followed by every derived ancestor, nearest first.
    pub fn chain(&self) -> Vec<&DerivedProduct> {
        let mut out = vec![self];
        let mut current = self;
        while let ProductParent::Derived(parent) = &current.parent {
            out.push(parent.as_ref());
            current = parent.as_ref();
        }
        out
    }

    pub fn overridden_generators(&self) -> impl Iterator<Item = &str> {
        self.generators.keys().map(String::as_str)
    }

    pub fn overridden_iterators(&self) -> impl Iterator<Item = &str> {
        self.iterators.keys().map(String::as_str)
    }

    pub fn get_generator(&self, name: &str) -> Result<&Generator> {
        if let Some(generator) = self.generators.get(name) {
            return Ok(generator);
        }
        match &self.parent {
            ProductParent::Product(p) => p.get_generator(name),
            ProductParent::Derived(d) => d.get_generator(name),
        }
    }

    pub fn get_iterator(&self, name: &str) -> Result<&TypeIterator> {
        if let Some(iterator) = self.iterators.get(name) {
            return Ok(iterator);
        }
        match &self.parent {
            ProductParent::Product(p) => p.get_iterator(name),
            ProductParent::Derived(d) => d.get_iterator(name),
        }
    }

    pub fn set(&mut self, name: &str, ty: &Type) -> Result<()> {
        self.set_generator(name, ty.generator())?;
        self.set_iterator(name, ty.iterator())
    }

    pub fn set_generator(&mut self, name: &str, generator: Generator) -> Result<()> {
        self.check_field(name, &generator.output_type())?;
        self.generators.insert(name.to_string(), generator);
        Ok(())
    }

    pub fn set_iterator(&mut self, name: &str, iterator: TypeIterator) -> Result<()> {
        self.check_field(name, &iterator.output_type())?;
        self.iterators.insert(name.to_string(), iterator);
        Ok(())
    }

    pub fn generator(&self) -> Generator {
        let basic = self.basic_product();
        let generators = basic
            .names()
            .into_iter()
            .filter_map(|name| self.get_generator(name).ok().cloned())
            .collect();
        Generator::Product(ProductGenerator::new(basic.clone(), generators))
    }

    pub fn iterator(&self) -> TypeIterator {
        let basic = self.basic_product();
        let iterators = basic
            .names()
            .into_iter()
            .filter_map(|name| self.get_iterator(name).ok().cloned())
            .collect();
        TypeIterator::Product(ProductIterator::new(basic.clone(), iterators))
    }

    pub fn derive(self: &Rc<Self>) -> DerivedProduct {
        DerivedProduct::new(ProductParent::Derived(self.clone()))
    }

    fn check_field(&self, name: &str, output: &Type) -> Result<()> {
        self.basic_product().check_override(name, output)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProductGenerator {
    output_type: Rc<Product>,
    generators: Vec<Generator>,
}

impl ProductGenerator {
    pub fn new(output_type: Rc<Product>, generators: Vec<Generator>) -> Self {
        Self {
            output_type,
            generators,
        }
    }

    pub fn output_type(&self) -> &Rc<Product> {
        &self.output_type
    }

    pub fn generators(&self) -> &[Generator] {
        &self.generators
    }

    pub fn declare(&self, builder: &mut dyn Builder) {
        for generator in &self.generators {
            generator.declare(builder);
        }
        self.output_type.declare(builder);
        builder.declare_product_generator(self);
    }
}

/// Cartesian product of the field iterators; the last field varies fastest.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProductIterator {
    output_type: Rc<Product>,
    iterators: Vec<TypeIterator>,
}

impl ProductIterator {
    pub fn new(output_type: Rc<Product>, iterators: Vec<TypeIterator>) -> Self {
        Self {
            output_type,
            iterators,
        }
    }

    pub fn output_type(&self) -> &Rc<Product> {
        &self.output_type
    }

    pub fn iterators(&self) -> &[TypeIterator] {
        &self.iterators
    }

    pub fn declare(&self, builder: &mut dyn Builder) {
        for iterator in &self.iterators {
            iterator.declare(builder);
        }
        self.output_type.declare(builder);
        builder.declare_product_iterator(self);
    }
}

fn auto_name(index: usize) -> String {
    format!("_v{index}")
}

pub(crate) fn check_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let ok = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if ok {
        Ok(())
    } else {
        Err(Error::InvalidName {
            name: name.to_string(),
        })
    }
}
