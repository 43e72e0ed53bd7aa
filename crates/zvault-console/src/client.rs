//! Console client: path building, execution, normalization and the record
//! store wired together.
//!
//! All shared state is injected as `Arc` handles, so several clients (or a
//! client and a test) can share one store or one namespace context.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use crate::config::ConsoleConfig;
use crate::error::ClientError;
use crate::executor::{Executor, HttpTransport, Request};
use crate::monitor::{snapshot_restore_request, spawn_poller, OperationState, PollConfig, PollHandle, UploadOperation};
use crate::namespace::NamespaceContext;
use crate::normalize::{normalize_list, normalize_single, serialize_record, serialize_record_for_write};
use crate::path::{Operation, PathBuilder};
use crate::query::QueryContext;
use crate::record::{Attributes, Record};
use crate::resource::{self, Method, ResourceKind};
use crate::route::{ListRoute, Page, Paginated};
use crate::store::RecordStore;

/// Entry point for console data operations.
#[derive(Debug, Clone)]
pub struct ConsoleClient {
    executor: Arc<Executor>,
    store: Arc<RecordStore>,
    namespaces: Arc<NamespaceContext>,
    poll: PollConfig,
}

impl ConsoleClient {
    pub fn new(
        executor: Arc<Executor>,
        store: Arc<RecordStore>,
        namespaces: Arc<NamespaceContext>,
        poll: PollConfig,
    ) -> Self {
        Self {
            executor,
            store,
            namespaces,
            poll,
        }
    }

    /// Build a client that talks HTTP to `config.addr`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] or [`ClientError::Network`] if the
    /// HTTP transport cannot be created.
    pub fn from_config(config: &ConsoleConfig) -> Result<Self, ClientError> {
        let transport = HttpTransport::new(&config.addr, config.request_timeout)?;
        let executor = Arc::new(Executor::new(Arc::new(transport), config.token.clone()));
        let namespaces = Arc::new(NamespaceContext::new(Arc::clone(&executor), &config.namespace));
        Ok(Self::new(executor, Arc::new(RecordStore::new()), namespaces, config.poll))
    }

    #[must_use]
    pub fn executor(&self) -> &Arc<Executor> {
        &self.executor
    }

    #[must_use]
    pub fn store(&self) -> &Arc<RecordStore> {
        &self.store
    }

    #[must_use]
    pub fn namespaces(&self) -> &Arc<NamespaceContext> {
        &self.namespaces
    }

    /// Fetch one record and cache it.
    ///
    /// `params` fills path placeholders such as `{backend}`. Pass an empty
    /// `id` for singleton kinds.
    ///
    /// # Errors
    ///
    /// Path, request and normalization errors propagate unchanged.
    pub async fn find_record(
        &self,
        kind: &ResourceKind,
        id: &str,
        params: &Attributes,
    ) -> Result<Record, ClientError> {
        let namespace = self.namespaces.path();
        let path = PathBuilder::new(kind, Operation::Find)
            .id(id)
            .attributes(params)
            .namespace(&namespace)
            .build()?;

        let payload = self.executor.execute_json(Request::get(path), None).await?;
        let mut record = normalize_single(kind, Some(id), payload)?;
        carry_params(kind, params, &mut record);

        self.store.push([record.clone()]).await;
        Ok(record)
    }

    /// Fetch a singleton resource such as a status endpoint.
    ///
    /// # Errors
    ///
    /// See [`find_record`](Self::find_record).
    pub async fn find_singleton(&self, kind: &ResourceKind, params: &Attributes) -> Result<Record, ClientError> {
        self.find_record(kind, "", params).await
    }

    /// Query context for the current namespace, with no pagination.
    #[must_use]
    pub fn query_context(&self) -> QueryContext {
        QueryContext::new(self.namespaces.path())
    }

    /// List records of a kind and cache them.
    ///
    /// The list goes to `ctx.namespace`, which may differ from the current
    /// namespace that [`find_record`](Self::find_record), [`save_record`](Self::save_record)
    /// and [`delete_record`](Self::delete_record) use. Build `ctx` with
    /// [`query_context`](Self::query_context) to keep them aligned.
    ///
    /// A `404` on a list means "nothing here" and yields an empty list.
    ///
    /// # Errors
    ///
    /// Path, request and normalization errors propagate unchanged.
    pub async fn query(
        &self,
        kind: &ResourceKind,
        params: &Attributes,
        ctx: &QueryContext,
    ) -> Result<Vec<Record>, ClientError> {
        let path = PathBuilder::new(kind, Operation::List)
            .attributes(params)
            .namespace(&ctx.namespace)
            .build()?;
        let request = ctx.apply(Request::list(path));

        let payload = match self.executor.execute_json(request, None).await {
            Ok(payload) => payload,
            Err(ClientError::Api { status: 404, .. }) => {
                debug!(kind = %kind.name, "empty list");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        let mut records = normalize_list(kind, payload)?;
        for record in &mut records {
            carry_params(kind, params, record);
        }
        self.store.push(records.clone()).await;
        Ok(records)
    }

    /// Query through a list route and return its current page.
    ///
    /// # Errors
    ///
    /// See [`query`](Self::query).
    pub async fn query_page(
        &self,
        kind: &ResourceKind,
        params: &Attributes,
        route: &ListRoute,
    ) -> Result<Page, ClientError> {
        let ctx = route.query_context(&self.namespaces.path());
        let records = self.query(kind, params, &ctx).await?;
        Ok(route.paginate(&records))
    }

    /// Create or update a record.
    ///
    /// New records are created at the path named by their identifying
    /// attribute; existing records are updated by id with the kind's update
    /// method. The saved record replaces the original in the store.
    ///
    /// # Errors
    ///
    /// [`ClientError::MissingAttribute`] before any request when the path
    /// cannot be built; request errors otherwise.
    pub async fn save_record(&self, kind: &ResourceKind, record: &Record) -> Result<Record, ClientError> {
        let namespace = self.namespaces.path();
        let Value::Object(wire) = serialize_record(kind, record) else {
            return Err(ClientError::shape("record did not serialize to an object"));
        };

        let (op, method) = if record.is_new {
            (Operation::Create, Method::Post)
        } else {
            (Operation::Update, kind.update_method)
        };
        let mut builder = PathBuilder::new(kind, op).attributes(&wire).namespace(&namespace);
        if !record.is_new {
            builder = builder.id(&record.id);
        }
        let path = builder.build()?;

        let id = if record.is_new {
            wire.get(&kind.id_attribute)
                .and_then(Value::as_str)
                .map(|s| s.trim_matches('/').to_owned())
                .unwrap_or_default()
        } else {
            record.id.clone()
        };

        let body = serialize_record_for_write(kind, record);
        let payload = self
            .executor
            .execute_json(Request::new(method, path).with_json(body), None)
            .await?;

        let mut saved = Record::new(kind.name.as_str(), id.as_str(), record.attributes.clone())
            .with_wire_names(record.wire_names.clone());
        if payload.get("data").is_some_and(Value::is_object) {
            let returned = normalize_single(kind, Some(&id), payload)?;
            saved.attributes.extend(returned.attributes);
            saved.wire_names.extend(returned.wire_names);
        }

        if record.is_new {
            self.store.unload(&kind.name, &record.id).await;
        }
        self.store.push([saved.clone()]).await;
        info!(kind = %kind.name, id = %saved.id, created = record.is_new, "record saved");
        Ok(saved)
    }

    /// Delete a record on the server and drop it from the store.
    ///
    /// # Errors
    ///
    /// Path and request errors propagate unchanged.
    pub async fn delete_record(&self, kind: &ResourceKind, id: &str, params: &Attributes) -> Result<(), ClientError> {
        let namespace = self.namespaces.path();
        let path = PathBuilder::new(kind, Operation::Delete)
            .id(id)
            .attributes(params)
            .namespace(&namespace)
            .build()?;
        self.executor.execute(Request::delete(path), None).await?;
        self.store.unload(&kind.name, id).await;
        info!(kind = %kind.name, id, "record deleted");
        Ok(())
    }

    /// Issue or sign a certificate under a PKI role.
    ///
    /// `sub_resource` is the endpoint (`issue`, `sign`, `sign-verbatim`);
    /// `attributes` must carry `backend` plus the request fields. The
    /// returned certificate is cached as a `pki-certificate` record.
    ///
    /// # Errors
    ///
    /// [`ClientError::MissingAttribute`] without `backend` or `role`;
    /// request and normalization errors otherwise.
    pub async fn issue(
        &self,
        sub_resource: &str,
        role: &str,
        attributes: &Attributes,
    ) -> Result<Record, ClientError> {
        let kind = resource::pki_issue();
        if role.is_empty() {
            return Err(ClientError::missing(&kind.name, "role"));
        }
        let namespace = self.namespaces.path();
        let path = PathBuilder::new(&kind, Operation::Create)
            .segment(sub_resource)
            .id(role)
            .attributes(attributes)
            .namespace(&namespace)
            .build()?;

        let params = kind.template_params();
        let body: Attributes = attributes
            .iter()
            .filter(|(field, _)| !params.contains(&field.as_str()))
            .map(|(field, value)| (field.clone(), value.clone()))
            .collect();

        let payload = self
            .executor
            .execute_json(Request::post(path).with_json(Value::Object(body)), None)
            .await?;

        let cert_kind = resource::pki_certificate();
        let mut record = normalize_single(&cert_kind, None, payload)?;
        carry_params(&cert_kind, attributes, &mut record);
        self.store.push([record.clone()]).await;
        Ok(record)
    }

    /// Upload a raft snapshot through `operation`.
    pub async fn restore_snapshot(
        &self,
        operation: &UploadOperation,
        snapshot: Vec<u8>,
        force: bool,
    ) -> OperationState {
        operation
            .run(&self.executor, snapshot_restore_request(snapshot, force))
            .await
    }

    /// Poll `<backend>/tidy-status`.
    #[must_use]
    pub fn tidy_status_poller(&self, backend: &str) -> PollHandle<Record> {
        let mut params = Attributes::new();
        params.insert("backend".to_owned(), Value::String(backend.to_owned()));
        self.singleton_poller("tidy-status", resource::pki_tidy_status(), params)
    }

    /// Poll `sys/replication/status`.
    #[must_use]
    pub fn replication_status_poller(&self) -> PollHandle<Record> {
        self.singleton_poller("replication-status", resource::replication_status(), Attributes::new())
    }

    fn singleton_poller(&self, name: &'static str, kind: ResourceKind, params: Attributes) -> PollHandle<Record> {
        let client = self.clone();
        spawn_poller(name, self.poll, move || {
            let client = client.clone();
            let kind = kind.clone();
            let params = params.clone();
            async move { client.find_singleton(&kind, &params).await }
        })
    }
}

/// Copy path template values (`backend`) onto a record so it can be saved
/// back to the same place.
fn carry_params(kind: &ResourceKind, params: &Attributes, record: &mut Record) {
    for param in kind.template_params() {
        if let Some(value) = params.get(param) {
            record
                .attributes
                .entry(param.to_owned())
                .or_insert_with(|| value.clone());
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::executor::Transport;
    use crate::memory::MemoryTransport;
    use serde_json::json;

    fn client(transport: &Arc<MemoryTransport>) -> ConsoleClient {
        let executor = Arc::new(Executor::new(
            Arc::clone(transport) as Arc<dyn Transport>,
            Some("s.root".to_owned()),
        ));
        let namespaces = Arc::new(NamespaceContext::new(Arc::clone(&executor), ""));
        ConsoleClient::new(executor, Arc::new(RecordStore::new()), namespaces, PollConfig::default())
    }

    fn attrs(value: Value) -> Attributes {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn find_record_normalizes_and_caches() {
        let transport = Arc::new(MemoryTransport::new());
        transport
            .respond(
                Method::Get,
                "/v1/pki/roles/web",
                200,
                json!({ "request_id": "r", "data": { "max_ttl": "72h" } }),
            )
            .await;
        let client = client(&transport);

        let record = client
            .find_record(&resource::pki_role(), "web", &attrs(json!({ "backend": "pki" })))
            .await
            .unwrap();
        assert_eq!(record.id, "web");
        assert_eq!(record.get_str("maxTtl"), Some("72h"));
        assert_eq!(record.get_str("backend"), Some("pki"));
        assert_eq!(client.store().peek("pki-role", "web").await, Some(record));
    }

    #[tokio::test]
    async fn query_uses_list_and_namespace() {
        let transport = Arc::new(MemoryTransport::new());
        transport
            .respond(
                Method::Get,
                "/v1/team-a/sys/policies/acl/",
                200,
                json!({ "data": { "keys": ["default", "ops"] } }),
            )
            .await;
        let client = client(&transport);

        let ctx = QueryContext::new("team-a").with_page(1);
        let records = client
            .query(&resource::policy(), &Attributes::new(), &ctx)
            .await
            .unwrap();
        assert_eq!(records.len(), 2);

        let sent = transport.requests().await;
        assert!(sent[0].is_list());
        assert_eq!(sent[0].query_value("page"), Some("1"));
    }

    #[tokio::test]
    async fn query_context_follows_current_namespace() {
        let transport = Arc::new(MemoryTransport::new());
        transport
            .respond(Method::Get, "/v1/team-a/sys/policies/acl/", 200, json!({ "data": { "keys": ["ops"] } }))
            .await;
        transport
            .respond(Method::Get, "/v1/team-a/sys/policies/acl/ops", 200, json!({ "data": { "name": "ops" } }))
            .await;
        let client = client(&transport);
        client.namespaces().set_namespace("team-a").await;

        let ctx = client.query_context();
        assert_eq!(ctx.namespace, "team-a");
        let listed = client.query(&resource::policy(), &Attributes::new(), &ctx).await.unwrap();
        let found = client
            .find_record(&resource::policy(), &listed[0].id, &Attributes::new())
            .await
            .unwrap();
        assert_eq!(found.id, "ops");

        let paths: Vec<String> = transport.requests().await.into_iter().map(|r| r.path).collect();
        assert!(paths.iter().skip(1).all(|p| p.starts_with("/v1/team-a/")), "{paths:?}");
    }

    #[tokio::test]
    async fn save_keeps_wire_names_of_untranslatable_fields() {
        let transport = Arc::new(MemoryTransport::new());
        transport
            .respond(
                Method::Get,
                "/v1/pki/roles/web",
                200,
                json!({
                    "data": { "name": "web", "max_ttl": "1h", "ou_2": "x", "key__usage": ["a"], "allowedURIs": true }
                }),
            )
            .await;
        transport
            .respond_raw(Method::Post, "/v1/pki/roles/web", crate::executor::RawResponse::text(204, ""))
            .await;
        let client = client(&transport);
        let kind = resource::pki_role();
        let params = attrs(json!({ "backend": "pki" }));

        let record = client.find_record(&kind, "web", &params).await.unwrap();
        assert_eq!(record.get_str("maxTtl"), Some("1h"));
        let saved = client.save_record(&kind, &record).await.unwrap();

        let sent = transport.requests().await;
        assert_eq!(
            sent[1].body,
            Some(crate::executor::Body::Json(
                json!({ "name": "web", "max_ttl": "1h", "ou_2": "x", "key__usage": ["a"], "allowedURIs": true })
            ))
        );
        assert!(record.wire_names.contains_key("allowedURIs"));
        assert_eq!(saved.wire_names, record.wire_names);
    }

    #[tokio::test]
    async fn query_404_is_empty_list() {
        let transport = Arc::new(MemoryTransport::new());
        transport
            .respond(Method::Get, "/v1/transit/keys/", 404, json!({ "errors": [] }))
            .await;
        let client = client(&transport);
        let records = client
            .query(&resource::transit_key(), &attrs(json!({ "backend": "transit" })), &QueryContext::default())
            .await
            .unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn query_page_paginates_results() {
        let transport = Arc::new(MemoryTransport::new());
        transport
            .respond(
                Method::Get,
                "/v1/sys/policies/acl/",
                200,
                json!({ "data": { "keys": ["a", "b", "c"] } }),
            )
            .await;
        let client = client(&transport);
        let mut route = ListRoute::new("policy").with_page_size(2);
        route.set_query(2, None);

        let page = client
            .query_page(&resource::policy(), &Attributes::new(), &route)
            .await
            .unwrap();
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.meta.current_page, 2);
    }

    #[tokio::test]
    async fn create_without_identifying_attribute_sends_nothing() {
        let transport = Arc::new(MemoryTransport::new());
        let client = client(&transport);
        let pending = client
            .store()
            .create_record(&resource::secret_engine(), attrs(json!({ "type": "kv" })))
            .await;

        let err = client.save_record(&resource::secret_engine(), &pending).await.unwrap_err();
        assert!(matches!(err, ClientError::MissingAttribute { .. }));
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn create_posts_to_identifying_path() {
        let transport = Arc::new(MemoryTransport::new());
        transport
            .respond_raw(
                Method::Post,
                "/v1/sys/mounts/team-kv",
                crate::executor::RawResponse::text(204, ""),
            )
            .await;
        let client = client(&transport);
        let kind = resource::secret_engine();
        let mut pending = client.store().create_record(&kind, attrs(json!({ "type": "kv" }))).await;
        let placeholder = pending.id.clone();
        pending.attributes.insert("path".to_owned(), json!("team-kv/"));

        let saved = client.save_record(&kind, &pending).await.unwrap();
        assert_eq!(saved.id, "team-kv");
        assert!(!saved.is_new);
        assert!(client.store().peek("secret-engine", &placeholder).await.is_none());

        let sent = transport.requests().await;
        assert_eq!(
            sent[0].body,
            Some(crate::executor::Body::Json(json!({ "type": "kv", "path": "team-kv/" })))
        );
    }

    #[tokio::test]
    async fn update_uses_kind_update_method() {
        let transport = Arc::new(MemoryTransport::new());
        transport
            .respond_raw(Method::Put, "/v1/sys/policies/acl/ops", crate::executor::RawResponse::text(204, ""))
            .await;
        let client = client(&transport);
        let record = Record::new("policy", "ops", attrs(json!({ "policy": "path \"*\" {}" })));

        client.save_record(&resource::policy(), &record).await.unwrap();
        assert_eq!(transport.requests().await[0].method, Method::Put);
    }

    #[tokio::test]
    async fn delete_unloads_record() {
        let transport = Arc::new(MemoryTransport::new());
        transport
            .respond_raw(Method::Delete, "/v1/sys/policies/acl/ops", crate::executor::RawResponse::text(204, ""))
            .await;
        let client = client(&transport);
        client
            .store()
            .push([Record::new("policy", "ops", Attributes::new())])
            .await;

        client
            .delete_record(&resource::policy(), "ops", &Attributes::new())
            .await
            .unwrap();
        assert!(client.store().peek("policy", "ops").await.is_none());
    }

    #[tokio::test]
    async fn issue_posts_under_role_and_caches_certificate() {
        let transport = Arc::new(MemoryTransport::new());
        transport
            .respond(
                Method::Post,
                "/v1/pki/issue/web",
                200,
                json!({ "data": { "serial_number": "1a:2b", "certificate": "-----BEGIN" } }),
            )
            .await;
        let client = client(&transport);

        let cert = client
            .issue("issue", "web", &attrs(json!({ "backend": "pki", "common_name": "a.example.com" })))
            .await
            .unwrap();
        assert_eq!(cert.id, "1a:2b");
        assert_eq!(cert.get_str("serialNumber"), Some("1a:2b"));
        assert!(client.store().peek("pki-certificate", "1a:2b").await.is_some());

        let sent = transport.requests().await;
        assert_eq!(
            sent[0].body,
            Some(crate::executor::Body::Json(json!({ "common_name": "a.example.com" })))
        );
    }

    #[tokio::test]
    async fn issue_requires_role() {
        let transport = Arc::new(MemoryTransport::new());
        let client = client(&transport);
        let err = client
            .issue("issue", "", &attrs(json!({ "backend": "pki" })))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::MissingAttribute { .. }));
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn tidy_status_poller_publishes_records() {
        let transport = Arc::new(MemoryTransport::new());
        transport
            .respond(
                Method::Get,
                "/v1/pki/tidy-status",
                200,
                json!({ "data": { "state": "Finished", "cert_store_deleted_count": 3 } }),
            )
            .await;
        let client = client(&transport);

        let handle = client.tidy_status_poller("pki");
        let mut status = handle.status();
        status.changed().await.unwrap();
        let latest = status.borrow().latest.clone().unwrap();
        assert_eq!(latest.get_str("state"), Some("Finished"));
        assert_eq!(latest.get("certStoreDeletedCount"), Some(&json!(3)));
    }
}
