//! Resource schema descriptors and the registry keyed by resource type.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use super::error::DomainError;

/// Widest bitmask an `i64` attribute can hold without touching the sign bit.
pub const MAX_BITMASK_FLAGS: usize = 63;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrKind {
    String,
    Integer,
    Float,
    Boolean,
    /// `YYYY-MM-DD`
    Date,
    /// `HH:MM:SS`
    Time,
    /// RFC 3339
    DateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeDecl {
    pub name: String,
    pub kind: AttrKind,
    pub required: bool,
    pub nullable: bool,
    pub spell_checked: bool,
}

impl AttributeDecl {
    pub fn new(name: impl Into<String>, kind: AttrKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            nullable: true,
            spell_checked: false,
        }
    }

    /// Must be present on create; implies non-nullable.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self.nullable = false;
        self
    }

    #[must_use]
    pub fn spell_checked(mut self) -> Self {
        self.spell_checked = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    ToOne,
    ToMany,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationDecl {
    pub name: String,
    pub related_type: String,
    pub cardinality: Cardinality,
}

/// Legal values of one state attribute and the transitions between them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateGraph {
    pub attribute: String,
    pub initial: BTreeSet<String>,
    pub transitions: BTreeMap<String, BTreeSet<String>>,
}

impl StateGraph {
    pub fn new(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn initial(mut self, state: impl Into<String>) -> Self {
        self.initial.insert(state.into());
        self
    }

    #[must_use]
    pub fn transition(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.transitions
            .entry(from.into())
            .or_default()
            .insert(to.into());
        self
    }

    /// Whether `current -> requested` is legal. `None` means the resource
    /// is being created, so only initial states are accepted.
    #[must_use]
    pub fn allows(&self, current: Option<&str>, requested: &str) -> bool {
        match current {
            None => self.initial.contains(requested),
            Some(current) if current == requested => true,
            Some(current) => self
                .transitions
                .get(current)
                .is_some_and(|next| next.contains(requested)),
        }
    }
}

/// Ordered boolean flags packed into one integer attribute; flag `i` is bit `i`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitMaskSpec {
    pub attribute: String,
    pub flags: Vec<String>,
}

impl BitMaskSpec {
    pub fn new<I, S>(attribute: impl Into<String>, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            attribute: attribute.into(),
            flags: flags.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn is_flag(&self, name: &str) -> bool {
        self.flags.iter().any(|f| f == name)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IdPolicy {
    /// Accept a client-supplied id, otherwise generate a UUID.
    #[default]
    ClientOrServer,
    /// Always generate; client-supplied ids are rejected.
    ServerGenerated,
}

#[derive(Debug, Clone)]
pub struct ResourceSchema {
    resource_type: String,
    attributes: Vec<AttributeDecl>,
    relations: Vec<RelationDecl>,
    state_graph: Option<StateGraph>,
    bit_mask: Option<BitMaskSpec>,
    id_policy: IdPolicy,
}

impl ResourceSchema {
    pub fn builder(resource_type: impl Into<String>) -> ResourceSchemaBuilder {
        ResourceSchemaBuilder {
            schema: ResourceSchema {
                resource_type: resource_type.into(),
                attributes: Vec::new(),
                relations: Vec::new(),
                state_graph: None,
                bit_mask: None,
                id_policy: IdPolicy::default(),
            },
        }
    }

    #[must_use]
    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    #[must_use]
    pub fn attributes(&self) -> &[AttributeDecl] {
        &self.attributes
    }

    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&AttributeDecl> {
        self.attributes.iter().find(|a| a.name == name)
    }

    #[must_use]
    pub fn relations(&self) -> &[RelationDecl] {
        &self.relations
    }

    #[must_use]
    pub fn relation(&self, name: &str) -> Option<&RelationDecl> {
        self.relations.iter().find(|r| r.name == name)
    }

    /// Like [`relation`](Self::relation) but undeclared names are an error.
    ///
    /// # Errors
    ///
    /// `DomainError::InvalidRelation` when `name` is not declared.
    pub fn require_relation(&self, name: &str) -> Result<&RelationDecl, DomainError> {
        self.relation(name).ok_or_else(|| {
            DomainError::invalid_relation(&self.resource_type, name, "relation is not declared")
        })
    }

    #[must_use]
    pub fn state_graph(&self) -> Option<&StateGraph> {
        self.state_graph.as_ref()
    }

    #[must_use]
    pub fn bit_mask(&self) -> Option<&BitMaskSpec> {
        self.bit_mask.as_ref()
    }

    #[must_use]
    pub fn id_policy(&self) -> IdPolicy {
        self.id_policy
    }

    /// Attribute names a request may sort or filter by.
    #[must_use]
    pub fn is_queryable(&self, field: &str) -> bool {
        field == "id" || self.attribute(field).is_some()
    }

    /// Attribute names visible on the wire (declared attributes and bitmask flags).
    #[must_use]
    pub fn is_wire_attribute(&self, field: &str) -> bool {
        self.attribute(field).is_some() || self.bit_mask.as_ref().is_some_and(|m| m.is_flag(field))
    }
}

pub struct ResourceSchemaBuilder {
    schema: ResourceSchema,
}

impl ResourceSchemaBuilder {
    #[must_use]
    pub fn attribute(mut self, decl: AttributeDecl) -> Self {
        self.schema.attributes.push(decl);
        self
    }

    #[must_use]
    pub fn to_one(self, name: impl Into<String>, related_type: impl Into<String>) -> Self {
        self.relation(name, related_type, Cardinality::ToOne)
    }

    #[must_use]
    pub fn to_many(self, name: impl Into<String>, related_type: impl Into<String>) -> Self {
        self.relation(name, related_type, Cardinality::ToMany)
    }

    fn relation(
        mut self,
        name: impl Into<String>,
        related_type: impl Into<String>,
        cardinality: Cardinality,
    ) -> Self {
        self.schema.relations.push(RelationDecl {
            name: name.into(),
            related_type: related_type.into(),
            cardinality,
        });
        self
    }

    #[must_use]
    pub fn state_graph(mut self, graph: StateGraph) -> Self {
        self.schema.state_graph = Some(graph);
        self
    }

    #[must_use]
    pub fn bit_mask(mut self, spec: BitMaskSpec) -> Self {
        self.schema.bit_mask = Some(spec);
        self
    }

    #[must_use]
    pub fn id_policy(mut self, policy: IdPolicy) -> Self {
        self.schema.id_policy = policy;
        self
    }

    /// Check internal consistency and finish the schema.
    ///
    /// # Errors
    ///
    /// `DomainError::Configuration` on duplicate names, a state graph or
    /// bitmask bound to an undeclared attribute, or more than 63 flags.
    pub fn build(self) -> Result<ResourceSchema, DomainError> {
        let schema = self.schema;
        let ty = &schema.resource_type;
        if ty.trim().is_empty() {
            return Err(DomainError::Configuration("resource type must not be empty".into()));
        }

        let mut names = BTreeSet::new();
        for name in schema
            .attributes
            .iter()
            .map(|a| a.name.as_str())
            .chain(schema.relations.iter().map(|r| r.name.as_str()))
        {
            if name == "id" || name == "type" {
                return Err(DomainError::Configuration(format!(
                    "{ty}: '{name}' is reserved and cannot be declared"
                )));
            }
            if !names.insert(name) {
                return Err(DomainError::Configuration(format!(
                    "{ty}: field '{name}' is declared twice"
                )));
            }
        }

        if let Some(graph) = &schema.state_graph {
            if schema.attribute(&graph.attribute).is_none() {
                return Err(DomainError::Configuration(format!(
                    "{ty}: state attribute '{}' is not declared",
                    graph.attribute
                )));
            }
            if graph.initial.is_empty() {
                return Err(DomainError::Configuration(format!(
                    "{ty}: state graph has no initial state"
                )));
            }
        }

        if let Some(mask) = &schema.bit_mask {
            match schema.attribute(&mask.attribute) {
                Some(decl) if decl.kind == AttrKind::Integer => {}
                _ => {
                    return Err(DomainError::Configuration(format!(
                        "{ty}: bitmask attribute '{}' must be a declared integer",
                        mask.attribute
                    )));
                }
            }
            if mask.flags.is_empty() || mask.flags.len() > MAX_BITMASK_FLAGS {
                return Err(DomainError::Configuration(format!(
                    "{ty}: bitmask needs between 1 and {MAX_BITMASK_FLAGS} flags, got {}",
                    mask.flags.len()
                )));
            }
            let mut flags = BTreeSet::new();
            for flag in &mask.flags {
                if names.contains(flag.as_str()) || !flags.insert(flag.as_str()) {
                    return Err(DomainError::Configuration(format!(
                        "{ty}: bitmask flag '{flag}' clashes with another field"
                    )));
                }
            }
        }

        Ok(schema)
    }
}

/// Schemas of every resource type the controller serves.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<String, Arc<ResourceSchema>>,
}

impl SchemaRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    ///
    /// `DomainError::Configuration` when the type is already registered.
    pub fn register(&mut self, schema: ResourceSchema) -> Result<(), DomainError> {
        let ty = schema.resource_type().to_owned();
        if self.schemas.contains_key(&ty) {
            return Err(DomainError::Configuration(format!(
                "resource type '{ty}' is registered twice"
            )));
        }
        self.schemas.insert(ty, Arc::new(schema));
        Ok(())
    }

    /// Builder-style [`register`](Self::register).
    ///
    /// # Errors
    ///
    /// Same as `register`.
    pub fn with(mut self, schema: ResourceSchema) -> Result<Self, DomainError> {
        self.register(schema)?;
        Ok(self)
    }

    #[must_use]
    pub fn get(&self, resource_type: &str) -> Option<Arc<ResourceSchema>> {
        self.schemas.get(resource_type).cloned()
    }

    /// An unknown type is a setup error, not a per-request failure.
    ///
    /// # Errors
    ///
    /// `DomainError::Configuration` when the type is not registered.
    pub fn require(&self, resource_type: &str) -> Result<Arc<ResourceSchema>, DomainError> {
        self.get(resource_type).ok_or_else(|| {
            DomainError::Configuration(format!("resource type '{resource_type}' is not registered"))
        })
    }

    /// Types declaring at least one relation to `resource_type`.
    #[must_use]
    pub fn referencing_types(&self, resource_type: &str) -> Vec<String> {
        let mut types: Vec<String> = self
            .schemas
            .values()
            .filter(|s| s.relations().iter().any(|r| r.related_type == resource_type))
            .map(|s| s.resource_type().to_owned())
            .collect();
        types.sort();
        types
    }

    /// Every relation must point at a registered type.
    ///
    /// # Errors
    ///
    /// `DomainError::Configuration` naming the first dangling relation.
    pub fn validate(&self) -> Result<(), DomainError> {
        for schema in self.schemas.values() {
            for relation in schema.relations() {
                if !self.schemas.contains_key(&relation.related_type) {
                    return Err(DomainError::Configuration(format!(
                        "{}.{} points at unregistered type '{}'",
                        schema.resource_type(),
                        relation.name,
                        relation.related_type
                    )));
                }
            }
        }
        Ok(())
    }
}
