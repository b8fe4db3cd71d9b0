use std::fmt;
use std::str::FromStr;

use serde_json::Value;

/// The nine controller operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControllerMethod {
    Index,
    View,
    Create,
    Update,
    Delete,
    Relations,
    CreateRelations,
    UpdateRelations,
    DeleteRelations,
}

impl ControllerMethod {
    /// Name recorded as `called_method` and used in cache keys.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Index => "index",
            Self::View => "view",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Relations => "relations",
            Self::CreateRelations => "createRelations",
            Self::UpdateRelations => "updateRelations",
            Self::DeleteRelations => "deleteRelations",
        }
    }

    #[must_use]
    pub fn is_read(self) -> bool {
        matches!(self, Self::Index | Self::View | Self::Relations)
    }
}

impl fmt::Display for ControllerMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ControllerMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "index" => Self::Index,
            "view" => Self::View,
            "create" => Self::Create,
            "update" => Self::Update,
            "delete" => Self::Delete,
            "relations" => Self::Relations,
            "createRelations" => Self::CreateRelations,
            "updateRelations" => Self::UpdateRelations,
            "deleteRelations" => Self::DeleteRelations,
            other => return Err(format!("unknown controller method '{other}'")),
        })
    }
}

/// Raw query parameters in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams(Vec<(String, String)>);

impl QueryParams {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.push((key.into(), value.into()));
    }

    /// Last value given for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// A parsed request as handed over by the transport.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: ControllerMethod,
    /// Path id of the primary resource.
    pub id: Option<String>,
    /// Relation name for the relationship endpoints.
    pub relation: Option<String>,
    pub query: QueryParams,
    pub body: Option<Value>,
    /// Token from the `Authorization: Bearer` header.
    pub bearer_token: Option<String>,
}

impl ApiRequest {
    #[must_use]
    pub fn new(method: ControllerMethod) -> Self {
        Self {
            method,
            id: None,
            relation: None,
            query: QueryParams::default(),
            body: None,
            bearer_token: None,
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_relation(mut self, relation: impl Into<String>) -> Self {
        self.relation = Some(relation.into());
        self
    }

    #[must_use]
    pub fn with_query(mut self, query: QueryParams) -> Self {
        self.query = query;
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    #[must_use]
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }
}
