use std::collections::HashSet;
use std::hash::Hash;

use crate::function::Function;
use crate::generator::{Generator, TypeIterator};
use crate::product::{Product, ProductGenerator, ProductIterator};
use crate::types::Type;

/// Receiver of the declaration protocol.
///
/// Nodes call into the builder dependencies-first and may do so repeatedly for
/// shared sub-nodes; implementations skip nodes they have already declared
/// (see [`DeclarationSet`]).
pub trait Builder {
    fn declare_product_class(&mut self, product: &Product);
    fn declare_product_generator(&mut self, generator: &ProductGenerator);
    fn declare_product_iterator(&mut self, iterator: &ProductIterator);
    /// Leaf generators: uniform, values, function calls, variables.
    fn declare_generator(&mut self, generator: &Generator);
    /// Leaf iterators and generator-backed iterators.
    fn declare_iterator(&mut self, iterator: &TypeIterator);
    fn declare_function(&mut self, function: &Function);

    /// Handle of an already declared generator.
    fn make_generator(&mut self, generator: &Generator) -> String;
    /// Handle of an already declared iterator.
    fn make_iterator(&mut self, iterator: &TypeIterator) -> String;
    fn element_type(&mut self, ty: &Type) -> String;
    fn function_declaration(&mut self, function: &Function) -> String;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DeclKey {
    /// Keyed by layout signature, not by generator state.
    ProductClass(String),
    Generator(Generator),
    Iterator(TypeIterator),
    Function(Function),
}

impl DeclKey {
    pub fn product_class(product: &Product) -> Self {
        DeclKey::ProductClass(product.signature())
    }
}

/// Visited set keyed by structural identity.
#[derive(Debug)]
pub struct DeclarationSet<K> {
    seen: HashSet<K>,
}

impl<K> Default for DeclarationSet<K> {
    fn default() -> Self {
        Self {
            seen: HashSet::new(),
        }
    }
}

impl<K: Eq + Hash + Clone> DeclarationSet<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// True exactly once per distinct key.
    pub fn first_visit(&mut self, key: &K) -> bool {
        if self.seen.contains(key) {
            return false;
        }
        self.seen.insert(key.clone());
        true
    }

    pub fn contains(&self, key: &K) -> bool {
        self.seen.contains(key)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
