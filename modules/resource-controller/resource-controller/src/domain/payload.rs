//! Parsing of JSON:API request bodies against a resource schema.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use resource_controller_sdk::{AttrValue, Attributes, Linkage, ResourceIdentifier};
use serde_json::{Map, Value};

use super::error::DomainError;
use super::schema::{AttrKind, AttributeDecl, Cardinality, IdPolicy, RelationDecl, ResourceSchema};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadMode<'a> {
    Create,
    /// Update of the resource with this path id.
    Update(&'a str),
}

/// A validated resource payload: coerced attributes and shape-checked linkage.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedResource {
    /// Client-supplied id (create) or the confirmed path id (update).
    pub id: Option<String>,
    pub attributes: Attributes,
    pub relationships: BTreeMap<String, Linkage>,
}

/// Parse `{ "data": { type, id, attributes, relationships } }`.
///
/// Undeclared attributes are dropped. Bitmask flag names are accepted as
/// booleans when `accept_flags` is set.
///
/// # Errors
///
/// `MalformedPayload` for shape, type or coercion problems;
/// `InvalidRelation` for undeclared relations or mismatched ref types.
pub fn parse_resource(
    schema: &ResourceSchema,
    body: &Value,
    mode: PayloadMode<'_>,
    accept_flags: bool,
) -> Result<ParsedResource, DomainError> {
    let data = body
        .get("data")
        .and_then(Value::as_object)
        .ok_or_else(|| DomainError::malformed("/data", "a resource object is required"))?;

    match data.get("type") {
        Some(Value::String(ty)) if ty == schema.resource_type() => {}
        Some(Value::String(ty)) => {
            return Err(DomainError::malformed(
                "/data/type",
                format!("expected '{}', got '{ty}'", schema.resource_type()),
            ));
        }
        _ => return Err(DomainError::malformed("/data/type", "type is required")),
    }

    let attributes = match data.get("attributes") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map.clone(),
        Some(_) => {
            return Err(DomainError::malformed("/data/attributes", "must be an object"));
        }
    };

    let id = resolve_id(schema, data, &attributes, mode)?;

    let mask = if accept_flags { schema.bit_mask() } else { None };
    let mut parsed = ParsedResource {
        id,
        ..ParsedResource::default()
    };
    for (name, value) in &attributes {
        if name == "id" {
            continue;
        }
        let pointer = format!("/data/attributes/{name}");
        if let Some(decl) = schema.attribute(name) {
            parsed
                .attributes
                .insert(name.clone(), coerce_attribute(decl, value, &pointer)?);
        } else if mask.is_some_and(|m| m.is_flag(name)) {
            parsed
                .attributes
                .insert(name.clone(), coerce(AttrKind::Boolean, value, false, &pointer)?);
        } else {
            tracing::debug!(
                resource_type = schema.resource_type(),
                attribute = %name,
                "Dropping undeclared attribute"
            );
        }
    }

    match data.get("relationships") {
        None | Some(Value::Null) => {}
        Some(Value::Object(relationships)) => {
            for (name, object) in relationships {
                let decl = schema.require_relation(name)?;
                let pointer = format!("/data/relationships/{name}/data");
                let linkage = object.get("data").ok_or_else(|| {
                    DomainError::malformed(pointer.clone(), "relationship data is required")
                })?;
                parsed.relationships.insert(
                    name.clone(),
                    parse_linkage(schema.resource_type(), decl, linkage, &pointer)?,
                );
            }
        }
        Some(_) => {
            return Err(DomainError::malformed("/data/relationships", "must be an object"));
        }
    }

    Ok(parsed)
}

fn resolve_id(
    schema: &ResourceSchema,
    data: &Map<String, Value>,
    attributes: &Map<String, Value>,
    mode: PayloadMode<'_>,
) -> Result<Option<String>, DomainError> {
    let sent = match data.get("id") {
        None | Some(Value::Null) => attributes
            .get("id")
            .map(|v| id_string(v, "/data/attributes/id"))
            .transpose()?,
        Some(v) => Some(id_string(v, "/data/id")?),
    };

    match mode {
        PayloadMode::Create => {
            if sent.is_some() && schema.id_policy() == IdPolicy::ServerGenerated {
                return Err(DomainError::malformed(
                    "/data/id",
                    format!("{} ids are generated by the server", schema.resource_type()),
                ));
            }
            Ok(sent)
        }
        PayloadMode::Update(path_id) => match sent {
            Some(id) if id != path_id => Err(DomainError::malformed(
                "/data/id",
                format!("id '{id}' does not match the addressed resource '{path_id}'"),
            )),
            _ => Ok(Some(path_id.to_owned())),
        },
    }
}

fn id_string(value: &Value, pointer: &str) -> Result<String, DomainError> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Ok(s.trim().to_owned()),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(DomainError::malformed(
            pointer,
            "id must be a non-empty string or a number",
        )),
    }
}

/// Parse relationship `data` according to the declared cardinality.
///
/// # Errors
///
/// `MalformedPayload` when the shape does not match the cardinality,
/// `InvalidRelation` when a ref names a different type.
pub fn parse_linkage(
    resource_type: &str,
    decl: &RelationDecl,
    data: &Value,
    pointer: &str,
) -> Result<Linkage, DomainError> {
    match (decl.cardinality, data) {
        (Cardinality::ToOne, Value::Null) => Ok(Linkage::ToOne(None)),
        (Cardinality::ToOne, Value::Object(_)) => Ok(Linkage::ToOne(Some(parse_ref(
            resource_type,
            decl,
            data,
            pointer,
        )?))),
        (Cardinality::ToMany, Value::Array(items)) => {
            let mut refs: Vec<ResourceIdentifier> = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                let r = parse_ref(resource_type, decl, item, &format!("{pointer}/{i}"))?;
                if !refs.contains(&r) {
                    refs.push(r);
                }
            }
            Ok(Linkage::ToMany(refs))
        }
        (Cardinality::ToOne, _) => Err(DomainError::malformed(
            pointer,
            format!("'{}' is to-one: expected an object or null", decl.name),
        )),
        (Cardinality::ToMany, _) => Err(DomainError::malformed(
            pointer,
            format!("'{}' is to-many: expected an array", decl.name),
        )),
    }
}

fn parse_ref(
    resource_type: &str,
    decl: &RelationDecl,
    value: &Value,
    pointer: &str,
) -> Result<ResourceIdentifier, DomainError> {
    let obj = value
        .as_object()
        .ok_or_else(|| DomainError::malformed(pointer, "expected a {type, id} object"))?;
    match obj.get("type") {
        None | Some(Value::Null) => {}
        Some(Value::String(ty)) if *ty == decl.related_type => {}
        Some(other) => {
            return Err(DomainError::invalid_relation(
                resource_type,
                &decl.name,
                format!("expected type '{}', got {other}", decl.related_type),
            ));
        }
    }
    let id = obj
        .get("id")
        .ok_or_else(|| DomainError::malformed(format!("{pointer}/id"), "id is required"))?;
    Ok(ResourceIdentifier::new(
        decl.related_type.clone(),
        id_string(id, &format!("{pointer}/id"))?,
    ))
}

/// Parse a relationship endpoint body.
///
/// Accepts the relationship document `{data: linkage}` as well as a resource
/// document carrying `data.relationships.<relation>.data`.
///
/// # Errors
///
/// Same as [`parse_linkage`], plus `MalformedPayload` when no linkage is found.
pub fn parse_relationship_body(
    resource_type: &str,
    decl: &RelationDecl,
    body: &Value,
) -> Result<Linkage, DomainError> {
    let data = body
        .get("data")
        .ok_or_else(|| DomainError::malformed("/data", "relationship data is required"))?;

    if let Some(nested) = data.get("relationships") {
        let pointer = format!("/data/relationships/{}/data", decl.name);
        let linkage = nested
            .get(&decl.name)
            .and_then(|r| r.get("data"))
            .ok_or_else(|| DomainError::malformed(pointer.clone(), "relationship data is required"))?;
        return parse_linkage(resource_type, decl, linkage, &pointer);
    }
    parse_linkage(resource_type, decl, data, "/data")
}

/// Refs named by a `deleteRelations` body; a single object is accepted for
/// either cardinality.
///
/// # Errors
///
/// `MalformedPayload` when `data` is missing or not refs.
pub fn parse_ref_list(
    resource_type: &str,
    decl: &RelationDecl,
    body: &Value,
) -> Result<Vec<ResourceIdentifier>, DomainError> {
    let data = body
        .get("data")
        .ok_or_else(|| DomainError::malformed("/data", "relationship data is required"))?;
    match data {
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| parse_ref(resource_type, decl, item, &format!("/data/{i}")))
            .collect(),
        Value::Object(_) => Ok(vec![parse_ref(resource_type, decl, data, "/data")?]),
        _ => Err(DomainError::malformed("/data", "expected refs to remove")),
    }
}

/// # Errors
///
/// `MalformedPayload` when any declared-required attribute is missing or null.
pub fn ensure_required(schema: &ResourceSchema, attrs: &Attributes) -> Result<(), DomainError> {
    for decl in schema.attributes().iter().filter(|d| d.required) {
        if attrs.get(&decl.name).is_none_or(AttrValue::is_null) {
            return Err(DomainError::malformed(
                format!("/data/attributes/{}", decl.name),
                "attribute is required",
            ));
        }
    }
    Ok(())
}

/// Coerce a JSON value into the declared attribute kind.
///
/// # Errors
///
/// `MalformedPayload` at `pointer` when the value cannot be coerced.
pub fn coerce_attribute(
    decl: &AttributeDecl,
    value: &Value,
    pointer: &str,
) -> Result<AttrValue, DomainError> {
    coerce(decl.kind, value, decl.nullable, pointer)
}

/// Lenient coercion: numeric and boolean strings are accepted where a
/// number or boolean is expected.
///
/// # Errors
///
/// `MalformedPayload` at `pointer` when the value cannot be coerced.
pub fn coerce(
    kind: AttrKind,
    value: &Value,
    nullable: bool,
    pointer: &str,
) -> Result<AttrValue, DomainError> {
    if value.is_null() {
        return if nullable {
            Ok(AttrValue::Null)
        } else {
            Err(DomainError::malformed(pointer, "must not be null"))
        };
    }

    let coerced = match kind {
        AttrKind::String => match value {
            Value::String(s) => Some(AttrValue::String(s.clone())),
            Value::Number(n) => Some(AttrValue::String(n.to_string())),
            Value::Bool(b) => Some(AttrValue::String(b.to_string())),
            _ => None,
        },
        AttrKind::Integer => match value {
            Value::Number(n) => n.as_i64().map(AttrValue::Integer),
            Value::String(s) => s.trim().parse().ok().map(AttrValue::Integer),
            _ => None,
        },
        AttrKind::Float => match value {
            Value::Number(n) => n.as_f64().map(AttrValue::Float),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .map(AttrValue::Float),
            _ => None,
        },
        AttrKind::Boolean => match value {
            Value::Bool(b) => Some(AttrValue::Bool(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(0) => Some(AttrValue::Bool(false)),
                Some(1) => Some(AttrValue::Bool(true)),
                _ => None,
            },
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "1" | "true" => Some(AttrValue::Bool(true)),
                "0" | "false" => Some(AttrValue::Bool(false)),
                _ => None,
            },
            _ => None,
        },
        AttrKind::Date => value
            .as_str()
            .and_then(|s| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok())
            .map(AttrValue::Date),
        AttrKind::Time => value
            .as_str()
            .and_then(|s| NaiveTime::parse_from_str(s.trim(), "%H:%M:%S").ok())
            .map(AttrValue::Time),
        AttrKind::DateTime => value
            .as_str()
            .and_then(|s| DateTime::parse_from_rfc3339(s.trim()).ok())
            .map(|dt| AttrValue::DateTime(dt.with_timezone(&Utc))),
    };

    coerced.ok_or_else(|| {
        DomainError::malformed(pointer, format!("expected {}, got {value}", kind_name(kind)))
    })
}

fn kind_name(kind: AttrKind) -> &'static str {
    match kind {
        AttrKind::String => "a string",
        AttrKind::Integer => "an integer",
        AttrKind::Float => "a number",
        AttrKind::Boolean => "a boolean",
        AttrKind::Date => "a YYYY-MM-DD date",
        AttrKind::Time => "an HH:MM:SS time",
        AttrKind::DateTime => "an RFC 3339 timestamp",
    }
}
