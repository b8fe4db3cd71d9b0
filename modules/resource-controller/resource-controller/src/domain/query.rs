//! Query parameter parsing: paging, sorting, includes, sparse fieldsets
//! and equality filters.

use std::collections::{BTreeMap, BTreeSet};

use resource_controller_sdk::{AttrValue, ConfigOptions, ListQuery, SortKey, SortOrder};
use serde_json::{Value, json};

use super::error::DomainError;
use super::payload::coerce;
use super::schema::{ResourceSchema, SchemaRegistry};
use crate::api::QueryParams;

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedQuery {
    pub limit: u64,
    pub page: u64,
    pub sort: Vec<SortKey>,
    pub include: Vec<String>,
    /// Sparse fieldsets keyed by resource type.
    pub fields: BTreeMap<String, BTreeSet<String>>,
    pub filter: BTreeMap<String, AttrValue>,
}

impl ParsedQuery {
    /// Parse `params` for `schema`, falling back to `options` defaults.
    ///
    /// # Errors
    ///
    /// `MalformedQuery` for unparsable or unknown names, `InvalidRelation`
    /// for an undeclared `include`.
    pub fn parse(
        schema: &ResourceSchema,
        registry: &SchemaRegistry,
        params: &QueryParams,
        options: &ConfigOptions,
        max_limit: u64,
    ) -> Result<Self, DomainError> {
        let limit = positive(params, &["page[limit]", "page[size]", "limit"])?
            .unwrap_or(options.query_limit())
            .min(max_limit.max(1));
        let page = positive(params, &["page[number]", "page"])?.unwrap_or(options.query_page());

        let sort = match params.get("sort") {
            Some(raw) => parse_sort(schema, raw)?,
            None => Vec::new(),
        };
        let sort = ensure_tiebreaker(sort, options.query_sort());

        let include = match params.get("include") {
            Some(raw) => parse_include(schema, raw)?,
            None => Vec::new(),
        };

        let mut fields = BTreeMap::new();
        let mut filter = BTreeMap::new();
        for (key, value) in params.iter() {
            if let Some(ty) = bracketed(key, "fields") {
                let names: BTreeSet<String> = value
                    .split(',')
                    .map(str::trim)
                    .filter(|f| !f.is_empty())
                    .map(str::to_owned)
                    .collect();
                check_fieldset(registry, key, ty, &names)?;
                fields.insert(ty.to_owned(), names);
            } else if let Some(attr) = bracketed(key, "filter") {
                let decl = schema.attribute(attr).ok_or_else(|| {
                    DomainError::malformed_query(key, format!("'{attr}' is not a filterable attribute"))
                })?;
                let coerced = coerce(decl.kind, &Value::String(value.trim().to_owned()), true, key)
                    .map_err(|_| {
                        DomainError::malformed_query(key, format!("'{value}' does not fit '{attr}'"))
                    })?;
                filter.insert(attr.to_owned(), coerced);
            }
        }

        if let Some(raw) = params.get("data") {
            let names: Vec<String> = serde_json::from_str(raw).map_err(|_| {
                DomainError::malformed_query("data", "expected a JSON array of attribute names")
            })?;
            let names: BTreeSet<String> = names.into_iter().collect();
            check_fieldset(registry, "data", schema.resource_type(), &names)?;
            fields
                .entry(schema.resource_type().to_owned())
                .or_insert(names);
        }

        Ok(Self {
            limit,
            page,
            sort,
            include,
            fields,
            filter,
        })
    }

    #[must_use]
    pub fn list_query(&self) -> ListQuery {
        ListQuery {
            limit: self.limit,
            page: self.page,
            sort: self.sort.clone(),
            filter: self.filter.clone(),
        }
    }

    /// Requested attribute names for `resource_type`; `None` means all.
    #[must_use]
    pub fn fieldset(&self, resource_type: &str) -> Option<&BTreeSet<String>> {
        self.fields.get(resource_type)
    }

    /// Canonical form of the read this query describes: identical logical
    /// reads produce identical text, and every value is JSON-escaped so no
    /// filter value can spell out another parameter.
    #[must_use]
    pub fn normalized(&self) -> String {
        let sort: Vec<String> = self
            .sort
            .iter()
            .map(|k| match k.order {
                SortOrder::Asc => k.field.clone(),
                SortOrder::Desc => format!("-{}", k.field),
            })
            .collect();
        let mut include = self.include.clone();
        include.sort();
        json!({
            "limit": self.limit,
            "page": self.page,
            "sort": sort,
            "include": include,
            "fields": self.fields,
            "filter": self.filter,
        })
        .to_string()
    }
}

fn positive(params: &QueryParams, keys: &[&str]) -> Result<Option<u64>, DomainError> {
    for key in keys {
        if let Some(raw) = params.get(key) {
            return match raw.trim().parse::<u64>() {
                Ok(n) if n > 0 => Ok(Some(n)),
                _ => Err(DomainError::malformed_query(
                    *key,
                    format!("expected a positive integer, got '{raw}'"),
                )),
            };
        }
    }
    Ok(None)
}

fn parse_sort(schema: &ResourceSchema, raw: &str) -> Result<Vec<SortKey>, DomainError> {
    let mut keys = Vec::new();
    for seg in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let (order, field) = match seg.strip_prefix('-') {
            Some(field) => (SortOrder::Desc, field),
            None => (SortOrder::Asc, seg.strip_prefix('+').unwrap_or(seg)),
        };
        if !schema.is_queryable(field) {
            return Err(DomainError::malformed_query(
                "sort",
                format!("'{field}' is not a sortable field"),
            ));
        }
        if !keys.iter().any(|k: &SortKey| k.field == field) {
            keys.push(SortKey {
                field: field.to_owned(),
                order,
            });
        }
    }
    Ok(keys)
}

/// Sorting always ends on `id` so pages are stable.
fn ensure_tiebreaker(mut sort: Vec<SortKey>, default_order: SortOrder) -> Vec<SortKey> {
    if !sort.iter().any(|k| k.field == "id") {
        sort.push(SortKey {
            field: "id".to_owned(),
            order: default_order,
        });
    }
    sort
}

fn parse_include(schema: &ResourceSchema, raw: &str) -> Result<Vec<String>, DomainError> {
    let mut include = Vec::new();
    for name in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        schema.require_relation(name)?;
        if !include.iter().any(|n| n == name) {
            include.push(name.to_owned());
        }
    }
    Ok(include)
}

fn bracketed<'a>(key: &'a str, family: &str) -> Option<&'a str> {
    key.strip_prefix(family)?
        .strip_prefix('[')?
        .strip_suffix(']')
        .filter(|inner| !inner.is_empty())
}

fn check_fieldset(
    registry: &SchemaRegistry,
    parameter: &str,
    resource_type: &str,
    names: &BTreeSet<String>,
) -> Result<(), DomainError> {
    let schema = registry.get(resource_type).ok_or_else(|| {
        DomainError::malformed_query(parameter, format!("unknown resource type '{resource_type}'"))
    })?;
    if let Some(unknown) = names.iter().find(|n| !schema.is_wire_attribute(n)) {
        return Err(DomainError::malformed_query(
            parameter,
            format!("'{unknown}' is not an attribute of {resource_type}"),
        ));
    }
    Ok(())
}
