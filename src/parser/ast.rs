// Declaration model produced by the header parser

use std::fmt;

/// Source location information for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

impl SourceLocation {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl Default for SourceLocation {
    fn default() -> Self {
        Self::new(1, 1)
    }
}

/// `const` / `volatile` / `restrict` qualifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Qualifiers {
    pub is_const: bool,
    pub is_volatile: bool,
    pub is_restrict: bool,
}

impl Qualifiers {
    pub fn is_empty(&self) -> bool {
        !(self.is_const || self.is_volatile || self.is_restrict)
    }
}

impl fmt::Display for Qualifiers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let words: Vec<&str> = [
            (self.is_const, "const"),
            (self.is_volatile, "volatile"),
            (self.is_restrict, "restrict"),
        ]
        .iter()
        .filter(|(set, _)| *set)
        .map(|(_, word)| *word)
        .collect();
        write!(f, "{}", words.join(" "))
    }
}

/// Whether a record is a struct or a union
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Struct,
    Union,
}

/// The three kinds of tagged type; they share one tag namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagKind {
    Struct,
    Union,
    Enum,
}

impl TagKind {
    pub fn keyword(self) -> &'static str {
        match self {
            TagKind::Struct => "struct",
            TagKind::Union => "union",
            TagKind::Enum => "enum",
        }
    }
}

impl From<RecordKind> for TagKind {
    fn from(kind: RecordKind) -> Self {
        match kind {
            RecordKind::Struct => TagKind::Struct,
            RecordKind::Union => TagKind::Union,
        }
    }
}

/// Non-owning, by-name reference into the type table
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeRef {
    Tag(TagKind, String),
    Typedef(String),
}

impl TypeRef {
    pub fn name(&self) -> &str {
        match self {
            TypeRef::Tag(_, name) | TypeRef::Typedef(name) => name,
        }
    }
}

/// Array bound: the raw text plus its value when it is a constant expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArraySize {
    pub text: String,
    pub value: Option<u64>,
}

/// Function parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: Option<String>,
    pub ty: TypeExpr,
}

/// Struct or union member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// `None` for anonymous struct/union members
    pub name: Option<String>,
    pub ty: TypeExpr,
    pub bit_width: Option<String>,
    /// Inline default-value text, kept opaque
    pub default: Option<String>,
}

/// Enum member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enumerator {
    pub name: String,
    /// Explicit value text, if written
    pub text: Option<String>,
    /// Explicit or implied value, when it could be computed
    pub value: Option<i64>,
}

/// Struct or union type. `fields` is `None` while only forward-declared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordType {
    pub kind: RecordKind,
    pub tag: Option<String>,
    pub fields: Option<Vec<Field>>,
}

/// Enum type. `enumerators` is `None` while only forward-declared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumType {
    pub tag: Option<String>,
    pub enumerators: Option<Vec<Enumerator>>,
}

/// Type expression tree
///
/// Pointer, array and function nodes own their inner type. `Named` nodes only
/// hold a name and are looked up in the [`TypeTable`](crate::types::TypeTable)
/// on demand, which is how self-referential structs and cyclic typedef chains
/// are represented without ownership cycles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeExpr {
    Primitive(String),
    Named(TypeRef),
    Pointer(Box<TypeExpr>),
    Array {
        element: Box<TypeExpr>,
        size: Option<ArraySize>,
    },
    Function {
        ret: Box<TypeExpr>,
        params: Vec<Param>,
        variadic: bool,
    },
    Record(RecordType),
    Enum(EnumType),
    Qualified {
        qualifiers: Qualifiers,
        inner: Box<TypeExpr>,
    },
    Unresolved(String),
}

impl TypeExpr {
    pub fn primitive(name: &str) -> Self {
        TypeExpr::Primitive(name.to_string())
    }

    pub fn typedef_ref(name: &str) -> Self {
        TypeExpr::Named(TypeRef::Typedef(name.to_string()))
    }

    pub fn tag_ref(kind: TagKind, name: &str) -> Self {
        TypeExpr::Named(TypeRef::Tag(kind, name.to_string()))
    }

    pub fn pointer_to(inner: TypeExpr) -> Self {
        TypeExpr::Pointer(Box::new(inner))
    }

    /// Wrap in qualifiers, or return unchanged when there are none
    pub fn qualified(qualifiers: Qualifiers, inner: TypeExpr) -> Self {
        if qualifiers.is_empty() {
            inner
        } else {
            TypeExpr::Qualified {
                qualifiers,
                inner: Box::new(inner),
            }
        }
    }

    pub fn is_function(&self) -> bool {
        matches!(self, TypeExpr::Function { .. })
    }

    /// Render as C declarator text around `name` (which may be empty for an
    /// abstract declarator), e.g. `int (*fnPtr)(char, float)`.
    pub fn declarator(&self, name: &str) -> String {
        let mut inner = name.to_string();
        let mut ty = self;

        loop {
            match ty {
                TypeExpr::Pointer(target) => {
                    inner = format!("*{inner}");
                    ty = &**target;
                }
                TypeExpr::Qualified { qualifiers, inner: target }
                    if matches!(**target, TypeExpr::Pointer(_)) =>
                {
                    inner = if inner.is_empty() {
                        format!("* {qualifiers}")
                    } else {
                        format!("* {qualifiers} {inner}")
                    };
                    if let TypeExpr::Pointer(pointee) = &**target {
                        ty = &**pointee;
                    }
                }
                TypeExpr::Array { element, size } => {
                    if inner.starts_with('*') {
                        inner = format!("({inner})");
                    }
                    let size = size.as_ref().map_or("", |s| s.text.as_str());
                    inner = format!("{inner}[{size}]");
                    ty = &**element;
                }
                TypeExpr::Function {
                    ret,
                    params,
                    variadic,
                } => {
                    if inner.starts_with('*') {
                        inner = format!("({inner})");
                    }
                    inner = format!("{inner}({})", render_params(params, *variadic));
                    ty = &**ret;
                }
                base => {
                    let base = base.base_text();
                    return if inner.is_empty() {
                        base
                    } else {
                        format!("{base} {inner}")
                    };
                }
            }
        }
    }

    /// Text of a type that has no declarator part
    fn base_text(&self) -> String {
        match self {
            TypeExpr::Primitive(name) | TypeExpr::Unresolved(name) => name.clone(),
            TypeExpr::Named(TypeRef::Typedef(name)) => name.clone(),
            TypeExpr::Named(TypeRef::Tag(kind, name)) => {
                format!("{} {}", kind.keyword(), name)
            }
            TypeExpr::Record(record) => {
                let keyword = TagKind::from(record.kind).keyword();
                let mut text = match &record.tag {
                    Some(tag) => format!("{keyword} {tag}"),
                    None => keyword.to_string(),
                };
                if let Some(fields) = &record.fields {
                    text.push_str(" {");
                    for field in fields {
                        text.push(' ');
                        text.push_str(&field.ty.declarator(field.name.as_deref().unwrap_or("")));
                        if let Some(width) = &field.bit_width {
                            text.push_str(&format!(" : {width}"));
                        }
                        text.push(';');
                    }
                    text.push_str(" }");
                }
                text
            }
            TypeExpr::Enum(enum_type) => {
                let mut text = match &enum_type.tag {
                    Some(tag) => format!("enum {tag}"),
                    None => "enum".to_string(),
                };
                if let Some(enumerators) = &enum_type.enumerators {
                    let members: Vec<String> = enumerators
                        .iter()
                        .map(|e| match &e.text {
                            Some(value) => format!("{} = {}", e.name, value),
                            None => e.name.clone(),
                        })
                        .collect();
                    text.push_str(&format!(" {{ {} }}", members.join(", ")));
                }
                text
            }
            TypeExpr::Qualified { qualifiers, inner } => {
                format!("{} {}", qualifiers, inner.declarator(""))
            }
            // Declarator forms are handled by `declarator`
            other => other.declarator(""),
        }
    }

    /// Replace typedef references that `is_typedef` does not know with
    /// `Unresolved` markers.
    pub(crate) fn mark_unresolved(&mut self, is_typedef: &dyn Fn(&str) -> bool) {
        match self {
            TypeExpr::Named(TypeRef::Typedef(name)) if !is_typedef(name) => {
                *self = TypeExpr::Unresolved(std::mem::take(name));
            }
            TypeExpr::Pointer(inner) | TypeExpr::Qualified { inner, .. } => {
                inner.mark_unresolved(is_typedef)
            }
            TypeExpr::Array { element, .. } => element.mark_unresolved(is_typedef),
            TypeExpr::Function { ret, params, .. } => {
                ret.mark_unresolved(is_typedef);
                for param in params {
                    param.ty.mark_unresolved(is_typedef);
                }
            }
            TypeExpr::Record(RecordType {
                fields: Some(fields),
                ..
            }) => {
                for field in fields {
                    field.ty.mark_unresolved(is_typedef);
                }
            }
            _ => {}
        }
    }
}

fn render_params(params: &[Param], variadic: bool) -> String {
    let mut parts: Vec<String> = params
        .iter()
        .map(|p| p.ty.declarator(p.name.as_deref().unwrap_or("")))
        .collect();
    if variadic {
        parts.push("...".to_string());
    }
    parts.join(", ")
}

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.declarator(""))
    }
}

/// Storage class of a declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageClass {
    #[default]
    None,
    Static,
    Extern,
    Typedef,
    Auto,
    Register,
}

impl StorageClass {
    pub fn keyword(self) -> Option<&'static str> {
        match self {
            StorageClass::None => None,
            StorageClass::Static => Some("static"),
            StorageClass::Extern => Some("extern"),
            StorageClass::Typedef => Some("typedef"),
            StorageClass::Auto => Some("auto"),
            StorageClass::Register => Some("register"),
        }
    }
}

/// A top-level declaration record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub name: String,
    pub ty: TypeExpr,
    pub storage: StorageClass,
    /// Initializer text, kept opaque
    pub initializer: Option<String>,
    /// Free-form qualifiers such as calling conventions, recorded verbatim
    pub attributes: Vec<String>,
    /// Function declaration followed by a body
    pub is_definition: bool,
    pub offset: usize,
    pub location: SourceLocation,
}

impl fmt::Display for Declaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(keyword) = self.storage.keyword() {
            write!(f, "{keyword} ")?;
        }
        for attribute in &self.attributes {
            write!(f, "{attribute} ")?;
        }
        write!(f, "{}", self.ty.declarator(&self.name))?;
        if let Some(init) = &self.initializer {
            write!(f, " = {init}")?;
        }
        Ok(())
    }
}
