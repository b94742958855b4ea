//! Type table and resolver
//!
//! The table owns every named definition found in a translation unit, split
//! into C's three namespaces:
//!
//! - tags: `struct`, `union` and `enum` share one tag namespace
//! - typedef names
//! - ordinary identifiers: variables, functions and enum constants
//!
//! Types never own the definitions they name. A [`TypeExpr::Named`] is a
//! by-name reference that [`TypeTable::resolve`] looks up one step at a time,
//! so self-referential structs and cyclic typedef chains need no special
//! representation and resolution can never loop.
//!
//! Entries keep their first-registration order, which makes iteration and
//! cycle reports deterministic.

use crate::parser::ast::{SourceLocation, StorageClass, TagKind, TypeExpr, TypeRef};
use indexmap::IndexMap;
use rustc_hash::{FxBuildHasher, FxHashMap, FxHashSet};
use thiserror::Error;

type FxIndexMap<K, V> = IndexMap<K, V, FxBuildHasher>;

/// Which namespace a name is looked up in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Tag,
    Typedef,
    Ordinary,
}

/// What an ordinary identifier names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Variable,
    Function,
    EnumConstant { value: Option<i64> },
}

/// An entry in the ordinary namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub kind: SymbolKind,
    pub ty: TypeExpr,
    pub storage: StorageClass,
}

/// Something to register under a name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Definition {
    /// A `Record` or `Enum` type, complete or forward-declared
    Tag(TypeExpr),
    /// The aliased type
    Typedef(TypeExpr),
    Symbol(Symbol),
}

impl Definition {
    pub fn namespace(&self) -> Namespace {
        match self {
            Definition::Tag(_) => Namespace::Tag,
            Definition::Typedef(_) => Namespace::Typedef,
            Definition::Symbol(_) => Namespace::Ordinary,
        }
    }
}

/// A stored definition plus where it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry<T> {
    pub definition: T,
    pub offset: usize,
    pub location: SourceLocation,
}

/// Outcome of [`TypeTable::register`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// First definition of the name
    Added,
    /// A forward-declared tag received its body
    Completed,
    /// Same definition again, or a forward declaration of a known tag
    Unchanged,
    /// Replaced a differing definition; the later one wins
    Redefined { previous: SourceLocation },
}

/// Result of a single resolution step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution<'a> {
    Found(&'a TypeExpr),
    Unresolved,
}

impl<'a> Resolution<'a> {
    pub fn found(self) -> Option<&'a TypeExpr> {
        match self {
            Resolution::Found(ty) => Some(ty),
            Resolution::Unresolved => None,
        }
    }

    pub fn is_unresolved(&self) -> bool {
        matches!(self, Resolution::Unresolved)
    }
}

/// Why a typedef chain could not be fully unwound
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("cyclic typedef chain: {}", .0.join(" -> "))]
    Cycle(Vec<String>),
    #[error("unresolved type name '{0}'")]
    Unresolved(String),
}

#[derive(Debug, Clone, Default)]
pub struct TypeTable {
    tags: FxIndexMap<String, Entry<TypeExpr>>,
    typedefs: FxIndexMap<String, Entry<TypeExpr>>,
    symbols: FxIndexMap<String, Entry<Symbol>>,
}

impl TypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `definition` under `name` in the namespace it belongs to.
    ///
    /// Re-registering an identical definition changes nothing. A tag body
    /// completes an earlier forward declaration, and a forward declaration
    /// never erases a body. Anything else that differs replaces the earlier
    /// entry and reports [`Registration::Redefined`].
    pub fn register(
        &mut self,
        name: &str,
        definition: Definition,
        offset: usize,
        location: SourceLocation,
    ) -> Registration {
        match definition {
            Definition::Tag(ty) => {
                let outcome = match self.tags.get(name) {
                    None => Registration::Added,
                    Some(old) if tag_kind(&old.definition) != tag_kind(&ty) => {
                        Registration::Redefined {
                            previous: old.location,
                        }
                    }
                    Some(old) if !is_complete(&ty) || old.definition == ty => {
                        return Registration::Unchanged;
                    }
                    Some(old) if !is_complete(&old.definition) => Registration::Completed,
                    Some(old) => Registration::Redefined {
                        previous: old.location,
                    },
                };
                let entry = Entry {
                    definition: ty,
                    offset,
                    location,
                };
                self.tags.insert(name.to_string(), entry);
                outcome
            }
            Definition::Typedef(ty) => {
                let outcome = match self.typedefs.get(name) {
                    None => Registration::Added,
                    Some(old) if old.definition == ty => return Registration::Unchanged,
                    Some(old) => Registration::Redefined {
                        previous: old.location,
                    },
                };
                let entry = Entry {
                    definition: ty,
                    offset,
                    location,
                };
                self.typedefs.insert(name.to_string(), entry);
                outcome
            }
            Definition::Symbol(symbol) => {
                let outcome = match self.symbols.get(name) {
                    None => Registration::Added,
                    Some(old) if same_symbol(&old.definition, &symbol) => {
                        return Registration::Unchanged;
                    }
                    Some(old) => Registration::Redefined {
                        previous: old.location,
                    },
                };
                let entry = Entry {
                    definition: symbol,
                    offset,
                    location,
                };
                self.symbols.insert(name.to_string(), entry);
                outcome
            }
        }
    }

    /// Look `name` up in one namespace. Never follows the result further.
    pub fn resolve(&self, name: &str, namespace: Namespace) -> Resolution<'_> {
        let found = match namespace {
            Namespace::Tag => self.tags.get(name).map(|e| &e.definition),
            Namespace::Typedef => self.typedefs.get(name).map(|e| &e.definition),
            Namespace::Ordinary => self.symbols.get(name).map(|e| &e.definition.ty),
        };
        match found {
            Some(ty) => Resolution::Found(ty),
            None => Resolution::Unresolved,
        }
    }

    pub fn resolve_ref(&self, reference: &TypeRef) -> Resolution<'_> {
        match reference {
            TypeRef::Tag(_, name) => self.resolve(name, Namespace::Tag),
            TypeRef::Typedef(name) => self.resolve(name, Namespace::Typedef),
        }
    }

    /// One resolution step on a type: `Some` only when `ty` is a `Named`
    /// reference.
    pub fn step(&self, ty: &TypeExpr) -> Option<Resolution<'_>> {
        match ty {
            TypeExpr::Named(reference) => Some(self.resolve_ref(reference)),
            _ => None,
        }
    }

    /// Follow a typedef chain to the first type that is not a typedef name.
    ///
    /// Qualifiers on intermediate aliases are looked through and not carried
    /// into the result. A tag reference at the end of the chain is replaced
    /// by the tag's definition.
    pub fn resolve_fully(&self, name: &str, namespace: Namespace) -> Result<&TypeExpr, ResolveError> {
        let mut current = self
            .resolve(name, namespace)
            .found()
            .ok_or_else(|| ResolveError::Unresolved(name.to_string()))?;

        let mut path = vec![name.to_string()];
        let mut visited: FxHashSet<&str> = FxHashSet::default();
        if namespace == Namespace::Typedef {
            visited.insert(name);
        }

        loop {
            match alias_target(current) {
                Some(TypeRef::Typedef(next)) => {
                    if !visited.insert(next.as_str()) {
                        let start = path.iter().position(|n| n == next).unwrap_or(0);
                        return Err(ResolveError::Cycle(path.split_off(start)));
                    }
                    path.push(next.clone());
                    current = self
                        .resolve(next, Namespace::Typedef)
                        .found()
                        .ok_or_else(|| ResolveError::Unresolved(next.clone()))?;
                }
                Some(reference @ TypeRef::Tag(..)) => {
                    return Ok(self.resolve_ref(reference).found().unwrap_or(current));
                }
                None => return Ok(current),
            }
        }
    }

    /// Every cycle among typedef aliases, each reported once and in
    /// registration order. A cycle lists its members starting from the
    /// first one reached.
    pub fn detect_cycles(&self) -> Vec<Vec<String>> {
        let mut done: FxHashSet<&str> = FxHashSet::default();
        let mut cycles = Vec::new();

        for start in self.typedefs.keys() {
            let mut path: Vec<&str> = Vec::new();
            let mut on_path: FxHashMap<&str, usize> = FxHashMap::default();
            let mut current = Some(start.as_str());

            while let Some(name) = current {
                if done.contains(name) {
                    break;
                }
                if let Some(&index) = on_path.get(name) {
                    cycles.push(path[index..].iter().map(|n| n.to_string()).collect());
                    break;
                }
                on_path.insert(name, path.len());
                path.push(name);

                current = self
                    .typedefs
                    .get(name)
                    .and_then(|e| match alias_target(&e.definition) {
                        Some(TypeRef::Typedef(next)) => Some(next.as_str()),
                        _ => None,
                    });
            }

            done.extend(path);
        }

        cycles
    }

    pub fn tag(&self, name: &str) -> Option<&Entry<TypeExpr>> {
        self.tags.get(name)
    }

    pub fn typedef(&self, name: &str) -> Option<&Entry<TypeExpr>> {
        self.typedefs.get(name)
    }

    pub fn symbol(&self, name: &str) -> Option<&Entry<Symbol>> {
        self.symbols.get(name)
    }

    pub fn tags(&self) -> impl Iterator<Item = (&str, &Entry<TypeExpr>)> {
        self.tags.iter().map(|(name, entry)| (name.as_str(), entry))
    }

    pub fn typedefs(&self) -> impl Iterator<Item = (&str, &Entry<TypeExpr>)> {
        self.typedefs.iter().map(|(name, entry)| (name.as_str(), entry))
    }

    pub fn symbols(&self) -> impl Iterator<Item = (&str, &Entry<Symbol>)> {
        self.symbols.iter().map(|(name, entry)| (name.as_str(), entry))
    }

    pub fn is_typedef_name(&self, name: &str) -> bool {
        self.typedefs.contains_key(name)
    }

    /// Value of an enum constant, when it is known
    pub fn enum_constant(&self, name: &str) -> Option<i64> {
        match self.symbols.get(name)?.definition.kind {
            SymbolKind::EnumConstant { value } => value,
            _ => None,
        }
    }

    /// Total number of entries across all namespaces
    pub fn len(&self) -> usize {
        self.tags.len() + self.typedefs.len() + self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rewrite typedef references to unknown names as `Unresolved`
    pub(crate) fn mark_unresolved(&mut self, is_typedef: &dyn Fn(&str) -> bool) {
        for entry in self.tags.values_mut().chain(self.typedefs.values_mut()) {
            entry.definition.mark_unresolved(is_typedef);
        }
        for entry in self.symbols.values_mut() {
            entry.definition.ty.mark_unresolved(is_typedef);
        }
    }
}

/// The reference at the head of an alias, looking through qualifiers
fn alias_target(ty: &TypeExpr) -> Option<&TypeRef> {
    match ty {
        TypeExpr::Named(reference) => Some(reference),
        TypeExpr::Qualified { inner, .. } => alias_target(inner),
        _ => None,
    }
}

fn tag_kind(ty: &TypeExpr) -> Option<TagKind> {
    match ty {
        TypeExpr::Record(record) => Some(record.kind.into()),
        TypeExpr::Enum(_) => Some(TagKind::Enum),
        _ => None,
    }
}

fn is_complete(ty: &TypeExpr) -> bool {
    match ty {
        TypeExpr::Record(record) => record.fields.is_some(),
        TypeExpr::Enum(enum_type) => enum_type.enumerators.is_some(),
        _ => true,
    }
}

/// A prototype followed by the matching definition (or `extern` followed by
/// the plain declaration) is the same symbol.
fn same_symbol(old: &Symbol, new: &Symbol) -> bool {
    old.kind == new.kind && same_shape(&old.ty, &new.ty)
}

/// Type equality that ignores parameter names and an omitted array bound
fn same_shape(a: &TypeExpr, b: &TypeExpr) -> bool {
    match (a, b) {
        (
            TypeExpr::Function {
                ret: ret_a,
                params: params_a,
                variadic: variadic_a,
            },
            TypeExpr::Function {
                ret: ret_b,
                params: params_b,
                variadic: variadic_b,
            },
        ) => {
            variadic_a == variadic_b
                && params_a.len() == params_b.len()
                && same_shape(ret_a, ret_b)
                && params_a
                    .iter()
                    .zip(params_b)
                    .all(|(pa, pb)| same_shape(&pa.ty, &pb.ty))
        }
        (TypeExpr::Pointer(a), TypeExpr::Pointer(b)) => same_shape(a, b),
        (
            TypeExpr::Qualified {
                qualifiers: qa,
                inner: a,
            },
            TypeExpr::Qualified {
                qualifiers: qb,
                inner: b,
            },
        ) => qa == qb && same_shape(a, b),
        (
            TypeExpr::Array {
                element: a,
                size: size_a,
            },
            TypeExpr::Array {
                element: b,
                size: size_b,
            },
        ) => (size_a.is_none() || size_b.is_none() || size_a == size_b) && same_shape(a, b),
        _ => a == b,
    }
}
