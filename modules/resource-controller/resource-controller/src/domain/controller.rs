//! Request orchestration.
//!
//! Every operation walks `Received -> Authorized -> Validated -> Executed ->
//! Serialized -> Done`; any failure moves to the absorbing `Error` stage and
//! is rendered as an `errors` document.

use std::collections::{BTreeSet, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::StatusCode;
use resource_controller_sdk::{
    Attributes, CacheBackend, ConfigOptions, Dictionary, Document, RelationshipObject,
    ResourceIdentifier, ResourceObject, ResourceStore, StoredResource, TokenVerifier,
};
use serde_json::{Value, json};
use tokio::time::Instant;

use super::cache::{CacheCoordinator, CacheKey};
use super::codec::{self, AttributeCodec, SpellWarning};
use super::error::DomainError;
use super::payload::{PayloadMode, ensure_required, parse_ref_list, parse_relationship_body, parse_resource};
use super::query::ParsedQuery;
use super::relationships::{RelationshipManager, linkage_for};
use super::schema::{ResourceSchema, SchemaRegistry};
use super::state_machine::StateMachineValidator;
use super::store::StoreGateway;
use crate::api::{ApiRequest, ApiResponse, ControllerMethod, error_response};
use crate::config::ControllerConfig;

/// Pipeline stage of one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Authorized,
    Validated,
    Executed,
    Serialized,
    Done,
    Error,
}

impl Stage {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Received => "received",
            Stage::Authorized => "authorized",
            Stage::Validated => "validated",
            Stage::Executed => "executed",
            Stage::Serialized => "serialized",
            Stage::Done => "done",
            Stage::Error => "error",
        }
    }
}

/// Collaborators shared by every request. Holds no per-request state.
pub struct ControllerServices {
    config: ControllerConfig,
    registry: SchemaRegistry,
    store: StoreGateway,
    cache: CacheCoordinator,
    verifier: Option<Arc<dyn TokenVerifier>>,
    dictionary: Option<Arc<dyn Dictionary>>,
}

impl ControllerServices {
    /// # Errors
    ///
    /// `Configuration` when a relation points at an unregistered type.
    pub fn new(
        config: ControllerConfig,
        registry: SchemaRegistry,
        store: Arc<dyn ResourceStore>,
        cache_backend: Arc<dyn CacheBackend>,
    ) -> Result<Self, DomainError> {
        registry.validate()?;
        Ok(Self {
            store: StoreGateway::new(store, config.store_timeout),
            cache: CacheCoordinator::new(cache_backend, config.cache.claim_timeout, config.cache.timeout),
            config,
            registry,
            verifier: None,
            dictionary: None,
        })
    }

    #[must_use]
    pub fn with_token_verifier(mut self, verifier: Arc<dyn TokenVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    #[must_use]
    pub fn with_dictionary(mut self, dictionary: Arc<dyn Dictionary>) -> Self {
        self.dictionary = Some(dictionary);
        self
    }

    #[must_use]
    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }
}

/// Controller bound to one resource type and one request's options.
pub struct ResourceController {
    services: Arc<ControllerServices>,
    schema: Arc<ResourceSchema>,
    options: ConfigOptions,
}

impl ResourceController {
    /// # Errors
    ///
    /// `Configuration` when `resource_type` is not registered.
    pub fn new(
        services: Arc<ControllerServices>,
        resource_type: &str,
        options: ConfigOptions,
    ) -> Result<Self, DomainError> {
        let schema = services.registry.require(resource_type)?;
        Ok(Self {
            services,
            schema,
            options,
        })
    }

    /// Build request-scoped options from the module config and run `request`.
    pub async fn serve(
        services: &Arc<ControllerServices>,
        resource_type: &str,
        request: &ApiRequest,
    ) -> ApiResponse {
        let options = services.config.options_for(request.method, &request.query);
        match Self::new(Arc::clone(services), resource_type, options) {
            Ok(controller) => controller.handle(request).await,
            Err(e) => error_response(&e),
        }
    }

    #[must_use]
    pub fn options(&self) -> &ConfigOptions {
        &self.options
    }

    fn resource_type(&self) -> &str {
        self.schema.resource_type()
    }

    fn enter(&self, stage: Stage) {
        tracing::debug!(
            stage = stage.as_str(),
            resource_type = self.resource_type(),
            method = self.options.called_method(),
            "Pipeline stage"
        );
    }

    /// Dispatch on `request.method`; failures become `errors` documents.
    #[tracing::instrument(skip_all, fields(resource_type = %self.schema.resource_type(), method = %request.method))]
    pub async fn handle(&self, request: &ApiRequest) -> ApiResponse {
        self.enter(Stage::Received);
        let result = match request.method {
            ControllerMethod::Index => self.index(request).await,
            ControllerMethod::View => self.view(request).await,
            ControllerMethod::Create => self.create(request).await,
            ControllerMethod::Update => self.update(request).await,
            ControllerMethod::Delete => self.delete(request).await,
            ControllerMethod::Relations => self.relations(request).await,
            ControllerMethod::CreateRelations => self.create_relations(request).await,
            ControllerMethod::UpdateRelations => self.update_relations(request).await,
            ControllerMethod::DeleteRelations => self.delete_relations(request).await,
        };
        match result {
            Ok(response) => {
                self.enter(Stage::Done);
                response
            }
            Err(e) => {
                self.enter(Stage::Error);
                error_response(&e)
            }
        }
    }

    // ------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------

    /// List resources honoring paging, sort, include and sparse fieldsets.
    ///
    /// # Errors
    ///
    /// Authorization, query validation and persistence failures.
    pub async fn index(&self, request: &ApiRequest) -> Result<ApiResponse, DomainError> {
        self.authorize(request).await?;
        let query = self.parse_query(request)?;
        self.enter(Stage::Validated);

        let ty = self.resource_type();
        let body = self
            .cached_read(query.normalized(), async {
                let page = self.services.store.list(ty, &query.list_query()).await?;
                self.enter(Stage::Executed);
                let included = self.included(&page.items, &query).await?;
                let data = page
                    .items
                    .iter()
                    .map(|r| self.render(&self.schema, r, query.fieldset(ty)))
                    .collect();
                Ok::<_, DomainError>(
                    Document::collection(data)
                        .with_included(included)
                        .with_meta(
                            "page",
                            json!({ "number": query.page, "limit": query.limit, "total": page.total }),
                        ),
                )
            })
            .await?;

        self.enter(Stage::Serialized);
        Ok(ApiResponse::ok(body))
    }

    /// Fetch one resource by id.
    ///
    /// # Errors
    ///
    /// `NotFound` when absent, plus authorization, query and persistence failures.
    pub async fn view(&self, request: &ApiRequest) -> Result<ApiResponse, DomainError> {
        self.authorize(request).await?;
        let id = require_id(request)?;
        let query = self.parse_query(request)?;
        self.enter(Stage::Validated);

        let ty = self.resource_type();
        let material = json!({ "id": id, "query": query.normalized() }).to_string();
        let body = self
            .cached_read(material, async {
                let stored = self.services.store.require(ty, id).await?;
                self.enter(Stage::Executed);
                let included = self
                    .included(std::slice::from_ref(&stored), &query)
                    .await?;
                Ok::<_, DomainError>(
                    Document::resource(self.render(&self.schema, &stored, query.fieldset(ty)))
                        .with_included(included),
                )
            })
            .await?;

        self.enter(Stage::Serialized);
        Ok(ApiResponse::ok(body))
    }

    /// Persist a new resource together with its links; responds 201.
    ///
    /// # Errors
    ///
    /// Validation failures (422), `Conflict` for a taken id, authorization
    /// and persistence failures.
    pub async fn create(&self, request: &ApiRequest) -> Result<ApiResponse, DomainError> {
        self.authorize(request).await?;
        let body = require_body(request)?;
        let codec = AttributeCodec::new(&self.schema, self.options.is_bit_mask());
        let mut parsed = parse_resource(&self.schema, body, PayloadMode::Create, codec.mask().is_some())?;
        self.check_transition(None, &parsed.attributes)?;
        let warnings = self.spell_check(&parsed.attributes);
        codec.encode(&mut parsed.attributes, None);
        ensure_required(&self.schema, &parsed.attributes)?;
        self.enter(Stage::Validated);

        let ty = self.resource_type();
        let id = parsed
            .id
            .take()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let links = parsed
            .relationships
            .iter()
            .map(|(name, linkage)| (name.clone(), linkage.refs()))
            .filter(|(_, refs)| !refs.is_empty())
            .collect();
        let record = StoredResource {
            id,
            attributes: std::mem::take(&mut parsed.attributes),
            links,
        };
        let stored = self.services.store.insert(ty, record).await?;
        self.enter(Stage::Executed);
        tracing::info!(resource_type = ty, id = %stored.id, "Resource created");

        self.invalidate(parsed.relationships.keys()).await;
        let location = format!("/{ty}/{}", stored.id);
        let doc = with_warnings(
            Document::resource(self.render(&self.schema, &stored, None)),
            &warnings,
        );
        self.enter(Stage::Serialized);
        Ok(ApiResponse::created(&doc, &location))
    }

    /// Apply attribute and relationship changes to an existing resource.
    ///
    /// # Errors
    ///
    /// `NotFound` when absent, validation failures (422), authorization and
    /// persistence failures.
    pub async fn update(&self, request: &ApiRequest) -> Result<ApiResponse, DomainError> {
        self.authorize(request).await?;
        let id = require_id(request)?;
        let body = require_body(request)?;
        let codec = AttributeCodec::new(&self.schema, self.options.is_bit_mask());
        let mut parsed =
            parse_resource(&self.schema, body, PayloadMode::Update(id), codec.mask().is_some())?;

        let ty = self.resource_type();
        let existing = self.services.store.require(ty, id).await?;
        self.check_transition(Some(&existing.attributes), &parsed.attributes)?;
        let warnings = self.spell_check(&parsed.attributes);
        codec.encode(&mut parsed.attributes, Some(&existing.attributes));

        let StoredResource {
            attributes: mut merged,
            mut links,
            ..
        } = existing;
        merged.append(&mut parsed.attributes);
        ensure_required(&self.schema, &merged)?;
        for (name, linkage) in &parsed.relationships {
            let refs = linkage.refs();
            if refs.is_empty() {
                links.remove(name);
            } else {
                links.insert(name.clone(), refs);
            }
        }
        self.enter(Stage::Validated);

        let record = StoredResource {
            id: id.to_owned(),
            attributes: merged,
            links,
        };
        let stored = self.services.store.replace(ty, id, record).await?;
        self.enter(Stage::Executed);
        tracing::info!(resource_type = ty, id, "Resource updated");

        self.invalidate(parsed.relationships.keys()).await;
        let doc = with_warnings(
            Document::resource(self.render(&self.schema, &stored, None)),
            &warnings,
        );
        self.enter(Stage::Serialized);
        Ok(ApiResponse::document(StatusCode::OK, &doc))
    }

    /// Remove a resource; responds 204.
    ///
    /// # Errors
    ///
    /// `NotFound` when absent, authorization and persistence failures.
    pub async fn delete(&self, request: &ApiRequest) -> Result<ApiResponse, DomainError> {
        self.authorize(request).await?;
        let id = require_id(request)?;
        self.enter(Stage::Validated);

        let ty = self.resource_type();
        self.services.store.remove(ty, id).await?;
        self.enter(Stage::Executed);
        tracing::info!(resource_type = ty, id, "Resource deleted");

        self.invalidate(std::iter::empty()).await;
        self.enter(Stage::Serialized);
        Ok(ApiResponse::no_content())
    }

    /// Current linkage of one relation.
    ///
    /// # Errors
    ///
    /// `InvalidRelation` for undeclared relations, `NotFound` for a missing
    /// resource or unset to-one link.
    pub async fn relations(&self, request: &ApiRequest) -> Result<ApiResponse, DomainError> {
        self.authorize(request).await?;
        let id = require_id(request)?;
        let relation = require_relation(request)?;
        let manager = RelationshipManager::new(&self.services.store, &self.schema);
        manager.relation(relation)?;
        self.enter(Stage::Validated);

        let material = json!({ "id": id, "relation": relation }).to_string();
        let body = self
            .cached_read(material, async {
                let linkage = manager.read(id, relation).await?;
                self.enter(Stage::Executed);
                Ok::<_, DomainError>(Document::linkage(linkage))
            })
            .await?;

        self.enter(Stage::Serialized);
        Ok(ApiResponse::ok(body))
    }

    /// Add links (idempotent per ref); responds with the resulting linkage.
    ///
    /// # Errors
    ///
    /// Relationship validation failures, `NotFound` for a missing resource.
    pub async fn create_relations(&self, request: &ApiRequest) -> Result<ApiResponse, DomainError> {
        self.mutate_relations(request, RelationWrite::Create).await
    }

    /// Replace (to-one) or append to (to-many) a relation's linkage.
    ///
    /// # Errors
    ///
    /// Relationship validation failures, `NotFound` for a missing resource.
    pub async fn update_relations(&self, request: &ApiRequest) -> Result<ApiResponse, DomainError> {
        self.mutate_relations(request, RelationWrite::Update).await
    }

    /// Remove the given refs; responds 204.
    ///
    /// # Errors
    ///
    /// `NotFound` when a ref is not linked, relationship validation failures.
    pub async fn delete_relations(&self, request: &ApiRequest) -> Result<ApiResponse, DomainError> {
        self.authorize(request).await?;
        let id = require_id(request)?;
        let relation = require_relation(request)?;
        let body = require_body(request)?;
        let manager = RelationshipManager::new(&self.services.store, &self.schema);
        let decl = manager.relation(relation)?;
        let refs = parse_ref_list(self.resource_type(), decl, body)?;
        self.enter(Stage::Validated);

        manager.delete(id, relation, &refs).await?;
        self.enter(Stage::Executed);

        self.invalidate(std::iter::once(&decl.name)).await;
        self.enter(Stage::Serialized);
        Ok(ApiResponse::no_content())
    }

    async fn mutate_relations(
        &self,
        request: &ApiRequest,
        write: RelationWrite,
    ) -> Result<ApiResponse, DomainError> {
        self.authorize(request).await?;
        let id = require_id(request)?;
        let relation = require_relation(request)?;
        let body = require_body(request)?;
        let manager = RelationshipManager::new(&self.services.store, &self.schema);
        let decl = manager.relation(relation)?;
        let linkage = parse_relationship_body(self.resource_type(), decl, body)?;
        self.enter(Stage::Validated);

        let linkage = match write {
            RelationWrite::Create => manager.create(id, relation, &linkage).await?,
            RelationWrite::Update => manager.update(id, relation, &linkage).await?,
        };
        self.enter(Stage::Executed);

        self.invalidate(std::iter::once(&decl.name)).await;
        self.enter(Stage::Serialized);
        Ok(ApiResponse::document(StatusCode::OK, &Document::linkage(linkage)))
    }

    // ------------------------------------------------------------------
    // Pipeline steps
    // ------------------------------------------------------------------

    async fn authorize(&self, request: &ApiRequest) -> Result<(), DomainError> {
        if !self.options.jwt_is_enabled() || self.options.is_jwt_action() {
            self.enter(Stage::Authorized);
            return Ok(());
        }

        let token = request
            .bearer_token
            .as_deref()
            .or(self.options.query_access_token())
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| DomainError::Unauthorized("missing access token".to_owned()))?;
        let verifier = self.services.verifier.as_ref().ok_or_else(|| {
            DomainError::Configuration("token verification is enabled without a verifier".to_owned())
        })?;

        let principal = tokio::time::timeout(
            self.services.config.store_timeout,
            verifier.verify(token, self.options.jwt_table()),
        )
        .await
        .map_err(|_| DomainError::Internal("token verification timed out".to_owned()))??;

        tracing::debug!(subject = %principal.subject, table = %principal.table, "Token accepted");
        self.enter(Stage::Authorized);
        Ok(())
    }

    fn parse_query(&self, request: &ApiRequest) -> Result<ParsedQuery, DomainError> {
        ParsedQuery::parse(
            &self.schema,
            &self.services.registry,
            &request.query,
            &self.options,
            self.services.config.query.max_limit,
        )
    }

    fn check_transition(&self, current: Option<&Attributes>, requested: &Attributes) -> Result<(), DomainError> {
        let Some(graph) = self.schema.state_graph() else {
            return Ok(());
        };
        let Some(next) = requested.get(&graph.attribute) else {
            return Ok(());
        };
        StateMachineValidator::new(&self.services.registry, self.options.is_state_machine()).validate(
            self.resource_type(),
            current.and_then(|c| c.get(&graph.attribute)),
            next,
        )
    }

    fn spell_check(&self, attrs: &Attributes) -> Vec<SpellWarning> {
        if !self.options.is_spell_check() {
            return Vec::new();
        }
        let Some(dictionary) = &self.services.dictionary else {
            tracing::warn!("Spell checking is enabled without a dictionary");
            return Vec::new();
        };
        let warnings = codec::spell_check(&self.schema, attrs, dictionary.as_ref());
        if !warnings.is_empty() {
            tracing::debug!(count = warnings.len(), "Spell check findings");
        }
        warnings
    }

    /// Serve `produce` through the cache when this request is cached. The
    /// rendered JSON is what gets cached, so a hit returns exactly what the
    /// miss rendered.
    async fn cached_read(
        &self,
        material: String,
        produce: impl Future<Output = Result<Document, DomainError>>,
    ) -> Result<Value, DomainError> {
        if !self.options.is_cached() {
            return render_body(&produce.await?);
        }

        let cache = &self.services.cache;
        let key = CacheKey::derive(self.resource_type(), self.options.called_method(), &material);
        if let Some(bytes) = cache.get(&key, &self.options).await {
            match serde_json::from_slice::<Value>(&bytes) {
                Ok(body) => return Ok(body),
                Err(e) => tracing::warn!(key = %key, error = %e, "Discarding undecodable cache entry"),
            }
        }

        // Taken before the store is read so a write that lands during the
        // read keeps this result out of the cache.
        let observed = cache.generation(&key);
        let started = Instant::now();
        let body = match produce.await.and_then(|doc| render_body(&doc)) {
            Ok(body) => body,
            Err(e) => {
                cache.release(&key);
                return Err(e);
            }
        };
        match serde_json::to_vec(&body) {
            Ok(bytes) => {
                let ttl = Duration::from_secs(self.options.cache_ttl());
                cache
                    .put(&key, observed, Bytes::from(bytes), ttl, started.elapsed())
                    .await;
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Read result is not cacheable");
                cache.release(&key);
            }
        }
        Ok(body)
    }

    /// Drop cached reads of the primary type, the related types of the
    /// touched relations, and every type that links to the primary type.
    async fn invalidate<'n>(&self, touched: impl IntoIterator<Item = &'n String>) {
        if !self.services.config.cache.enabled {
            return;
        }
        let ty = self.resource_type();
        let mut types = BTreeSet::from([ty.to_owned()]);
        for name in touched {
            if let Some(decl) = self.schema.relation(name) {
                types.insert(decl.related_type.clone());
            }
        }
        types.extend(self.services.registry.referencing_types(ty));
        for t in &types {
            self.services.cache.invalidate_type(t).await;
        }
    }

    // ------------------------------------------------------------------
    // Serialization
    // ------------------------------------------------------------------

    fn render(
        &self,
        schema: &ResourceSchema,
        stored: &StoredResource,
        fieldset: Option<&BTreeSet<String>>,
    ) -> ResourceObject {
        let mut attributes = stored.attributes.clone();
        AttributeCodec::new(schema, self.options.is_bit_mask()).decode(&mut attributes);
        if let Some(fields) = fieldset {
            attributes.retain(|name, _| fields.contains(name));
        }
        let relationships = schema
            .relations()
            .iter()
            .map(|decl| {
                let refs = stored.links.get(&decl.name).cloned().unwrap_or_default();
                (
                    decl.name.clone(),
                    RelationshipObject {
                        data: linkage_for(decl, refs),
                    },
                )
            })
            .collect();
        ResourceObject {
            resource_type: schema.resource_type().to_owned(),
            id: stored.id.clone(),
            attributes,
            relationships,
        }
    }

    /// Related resources named by `include`, each at most once and never
    /// repeating a primary resource.
    async fn included(
        &self,
        primary: &[StoredResource],
        query: &ParsedQuery,
    ) -> Result<Vec<ResourceObject>, DomainError> {
        let mut seen: HashSet<(String, String)> = primary
            .iter()
            .map(|r| (self.resource_type().to_owned(), r.id.clone()))
            .collect();
        let mut included = Vec::new();

        for name in &query.include {
            let decl = self.schema.require_relation(name)?;
            let related = self.services.registry.require(&decl.related_type)?;
            let refs: Vec<ResourceIdentifier> = primary
                .iter()
                .filter_map(|p| p.links.get(name))
                .flatten()
                .filter(|r| seen.insert((r.resource_type.clone(), r.id.clone())))
                .cloned()
                .collect();
            for r in refs {
                match self.services.store.find(&r.resource_type, &r.id).await? {
                    Some(stored) => included.push(self.render(
                        &related,
                        &stored,
                        query.fieldset(related.resource_type()),
                    )),
                    None => tracing::debug!(
                        related_type = %r.resource_type,
                        id = %r.id,
                        "Linked resource is missing; not included"
                    ),
                }
            }
        }
        Ok(included)
    }
}

#[derive(Debug, Clone, Copy)]
enum RelationWrite {
    Create,
    Update,
}

fn require_id(request: &ApiRequest) -> Result<&str, DomainError> {
    request
        .id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| DomainError::malformed("", "a resource id is required"))
}

fn require_relation(request: &ApiRequest) -> Result<&str, DomainError> {
    request
        .relation
        .as_deref()
        .filter(|r| !r.trim().is_empty())
        .ok_or_else(|| DomainError::malformed("", "a relationship name is required"))
}

fn require_body(request: &ApiRequest) -> Result<&Value, DomainError> {
    request
        .body
        .as_ref()
        .ok_or_else(|| DomainError::malformed("", "a request document is required"))
}

fn render_body(doc: &Document) -> Result<Value, DomainError> {
    serde_json::to_value(doc)
        .map_err(|e| DomainError::Internal(format!("response serialization failed: {e}")))
}

fn with_warnings(doc: Document, warnings: &[SpellWarning]) -> Document {
    if warnings.is_empty() {
        return doc;
    }
    doc.with_meta(
        "spell_check",
        serde_json::to_value(warnings).unwrap_or_default(),
    )
}

