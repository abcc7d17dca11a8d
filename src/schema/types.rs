//! Shape definitions
//!
//! A [`Definition`] describes one field: a primitive kind, a null marker, a
//! wildcard, an object with named properties or an array with a single
//! element definition. Any node may exclude itself from some or all personas.

use std::collections::{BTreeMap, BTreeSet};

use crate::value::Value;

/// Primitive kinds understood by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    Boolean,
    /// 32-bit signed integer
    Int32,
    Double,
    String,
    Binary,
    ObjectId,
    Date,
}

impl PrimitiveKind {
    /// The store's `bsonType` name for this kind.
    pub fn bson_type(&self) -> &'static str {
        match self {
            PrimitiveKind::Boolean => "bool",
            PrimitiveKind::Int32 => "int",
            PrimitiveKind::Double => "double",
            PrimitiveKind::String => "string",
            PrimitiveKind::Binary => "binData",
            PrimitiveKind::ObjectId => "objectId",
            PrimitiveKind::Date => "date",
        }
    }

    pub fn from_bson_type(name: &str) -> Option<Self> {
        match name {
            "bool" => Some(PrimitiveKind::Boolean),
            "int" => Some(PrimitiveKind::Int32),
            "double" => Some(PrimitiveKind::Double),
            "string" => Some(PrimitiveKind::String),
            "binData" => Some(PrimitiveKind::Binary),
            "objectId" => Some(PrimitiveKind::ObjectId),
            "date" => Some(PrimitiveKind::Date),
            _ => None,
        }
    }
}

/// Which personas may not see a field
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PersonaExclusion {
    #[default]
    NotExcluded,
    ExcludedFromAll,
    ExcludedFrom(BTreeSet<String>),
}

impl PersonaExclusion {
    pub fn excludes(&self, persona: &str) -> bool {
        match self {
            PersonaExclusion::NotExcluded => false,
            PersonaExclusion::ExcludedFromAll => true,
            PersonaExclusion::ExcludedFrom(personas) => personas.contains(persona),
        }
    }
}

/// Object node contents
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectShape {
    pub properties: BTreeMap<String, Definition>,
    /// Property names that must be present, in declaration order
    pub required: Vec<String>,
    /// `None` leaves the store default (extra properties allowed)
    pub additional_properties: Option<bool>,
}

/// The kind of a definition node
#[derive(Debug, Clone, PartialEq)]
pub enum Kind {
    Null,
    Primitive(PrimitiveKind),
    Object(ObjectShape),
    Array(Box<Definition>),
    /// No declared kind; values pass through untouched
    Any,
}

/// A recursive shape definition node
#[derive(Debug, Clone, PartialEq)]
pub struct Definition {
    pub kind: Kind,
    pub personas: PersonaExclusion,
    pub description: Option<String>,
    /// Allowed values, checked by the store validator
    pub enum_values: Option<Vec<Value>>,
    /// Inclusive lower bound for numeric kinds, checked by the store validator
    pub minimum: Option<f64>,
}

impl Definition {
    pub fn new(kind: Kind) -> Self {
        Self {
            kind,
            personas: PersonaExclusion::NotExcluded,
            description: None,
            enum_values: None,
            minimum: None,
        }
    }

    pub fn primitive(kind: PrimitiveKind) -> Self {
        Self::new(Kind::Primitive(kind))
    }

    pub fn boolean() -> Self {
        Self::primitive(PrimitiveKind::Boolean)
    }

    pub fn int32() -> Self {
        Self::primitive(PrimitiveKind::Int32)
    }

    pub fn double() -> Self {
        Self::primitive(PrimitiveKind::Double)
    }

    pub fn string() -> Self {
        Self::primitive(PrimitiveKind::String)
    }

    pub fn binary() -> Self {
        Self::primitive(PrimitiveKind::Binary)
    }

    pub fn object_id() -> Self {
        Self::primitive(PrimitiveKind::ObjectId)
    }

    pub fn date() -> Self {
        Self::primitive(PrimitiveKind::Date)
    }

    pub fn null() -> Self {
        Self::new(Kind::Null)
    }

    pub fn any() -> Self {
        Self::new(Kind::Any)
    }

    /// An object node with no properties yet.
    pub fn object() -> Self {
        Self::new(Kind::Object(ObjectShape::default()))
    }

    pub fn array(element: Definition) -> Self {
        Self::new(Kind::Array(Box::new(element)))
    }

    /// Adds a property. Has no effect on non-object nodes.
    pub fn property(mut self, name: impl Into<String>, definition: Definition) -> Self {
        if let Kind::Object(shape) = &mut self.kind {
            shape.properties.insert(name.into(), definition);
        }
        self
    }

    /// Marks properties as required. Has no effect on non-object nodes.
    pub fn required<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Kind::Object(shape) = &mut self.kind {
            for name in names {
                let name = name.into();
                if !shape.required.contains(&name) {
                    shape.required.push(name);
                }
            }
        }
        self
    }

    pub fn additional_properties(mut self, allowed: bool) -> Self {
        if let Kind::Object(shape) = &mut self.kind {
            shape.additional_properties = Some(allowed);
        }
        self
    }

    pub fn excluded_from_all(mut self) -> Self {
        self.personas = PersonaExclusion::ExcludedFromAll;
        self
    }

    pub fn excluded_from<I, S>(mut self, personas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.personas = PersonaExclusion::ExcludedFrom(personas.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_enum(mut self, values: Vec<Value>) -> Self {
        self.enum_values = Some(values);
        self
    }

    pub fn with_minimum(mut self, minimum: f64) -> Self {
        self.minimum = Some(minimum);
        self
    }

    pub fn as_object(&self) -> Option<&ObjectShape> {
        match &self.kind {
            Kind::Object(shape) => Some(shape),
            _ => None,
        }
    }

    /// Name of the node's kind, as used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            Kind::Null => "null",
            Kind::Primitive(kind) => kind.bson_type(),
            Kind::Object(_) => "object",
            Kind::Array(_) => "array",
            Kind::Any => "any",
        }
    }

    /// Resolves a dotted path against nested object and array definitions.
    ///
    /// A numeric segment indexes into an array; any other segment applied to
    /// an array descends into its element definition first.
    pub fn resolve_path(&self, path: &str) -> Option<&Definition> {
        let mut current = self;
        for segment in path.split('.') {
            current = current.child(segment)?;
        }
        Some(current)
    }

    fn child(&self, segment: &str) -> Option<&Definition> {
        match &self.kind {
            Kind::Object(shape) => shape.properties.get(segment),
            Kind::Array(element) if segment.parse::<usize>().is_ok() => Some(element.as_ref()),
            Kind::Array(element) => element.child(segment),
            _ => None,
        }
    }

    /// Returns a copy with every persona marker removed.
    pub fn without_personas(&self) -> Definition {
        let mut copy = self.clone();
        copy.strip_personas();
        copy
    }

    fn strip_personas(&mut self) {
        self.personas = PersonaExclusion::NotExcluded;
        match &mut self.kind {
            Kind::Object(shape) => shape.properties.values_mut().for_each(Definition::strip_personas),
            Kind::Array(element) => element.strip_personas(),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_builder() {
        let def = Definition::object()
            .property("name", Definition::string())
            .property("age", Definition::int32())
            .required(["name", "name"])
            .additional_properties(false);

        let shape = def.as_object().unwrap();
        assert_eq!(shape.properties.len(), 2);
        assert_eq!(shape.required, vec!["name".to_string()]);
        assert_eq!(shape.additional_properties, Some(false));
    }

    #[test]
    fn test_builder_ignores_object_methods_on_primitives() {
        let def = Definition::string().property("x", Definition::int32()).required(["x"]);
        assert_eq!(def, Definition::string());
    }

    #[test]
    fn test_persona_exclusion() {
        assert!(PersonaExclusion::ExcludedFromAll.excludes("admin"));
        assert!(!PersonaExclusion::NotExcluded.excludes("admin"));
        let some = Definition::string().excluded_from(["guest"]).personas;
        assert!(some.excludes("guest"));
        assert!(!some.excludes("admin"));
    }

    #[test]
    fn test_resolve_path() {
        let def = Definition::object()
            .property(
                "address",
                Definition::object().property("city", Definition::string()),
            )
            .property(
                "items",
                Definition::array(Definition::object().property("sku", Definition::string())),
            );

        assert_eq!(def.resolve_path("address.city"), Some(&Definition::string()));
        assert_eq!(def.resolve_path("items.0.sku"), Some(&Definition::string()));
        assert_eq!(def.resolve_path("items.sku"), Some(&Definition::string()));
        assert!(def.resolve_path("address.zip").is_none());
    }

    #[test]
    fn test_without_personas_is_deep() {
        let def = Definition::object()
            .property("secret", Definition::string().excluded_from_all())
            .property(
                "nested",
                Definition::array(Definition::int32().excluded_from(["guest"])),
            )
            .excluded_from(["guest"]);

        let stripped = def.without_personas();
        assert_eq!(stripped.personas, PersonaExclusion::NotExcluded);
        let shape = stripped.as_object().unwrap();
        assert_eq!(shape.properties["secret"].personas, PersonaExclusion::NotExcluded);
        match &shape.properties["nested"].kind {
            Kind::Array(element) => assert_eq!(element.personas, PersonaExclusion::NotExcluded),
            other => panic!("unexpected kind {:?}", other),
        }
        // the original is untouched
        assert_eq!(def.as_object().unwrap().properties["secret"].personas, PersonaExclusion::ExcludedFromAll);
    }
}
