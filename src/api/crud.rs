//! Generic CRUD service over admin resources
//!
//! Feature code talks to this layer only; it never sees tokens or refreshes.

use futures::future::join_all;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::client::AdminClient;
use super::error::ApiError;
use super::request::ApiRequest;
use super::resources::Resource;

#[derive(Clone)]
pub struct CrudService {
    client: AdminClient,
}

/// Page selection for list calls.
#[derive(Debug, Clone, Copy, Default)]
pub struct Page {
    pub page: Option<u32>,
    pub count: Option<u32>,
}

impl CrudService {
    pub fn new(client: AdminClient) -> Self {
        Self { client }
    }

    /// Send a request and parse the body into `T`.
    pub async fn fetch<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ApiError> {
        self.client.send(request).await?.json()
    }

    /// List a resource, scoped to the current store when one is selected.
    pub async fn list<T: DeserializeOwned>(
        &self,
        resource: Resource,
        page: Page,
    ) -> Result<T, ApiError> {
        let mut request = ApiRequest::get(resource.path());
        if let Some(p) = page.page {
            request = request.with_query("page", p.to_string());
        }
        if let Some(c) = page.count {
            request = request.with_query("count", c.to_string());
        }
        if resource.store_scoped() {
            if let Some(store) = self.client.store().tenant() {
                request = request.with_query("store", store);
            }
        }
        self.fetch(request).await
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        resource: Resource,
        id: &str,
    ) -> Result<T, ApiError> {
        self.fetch(ApiRequest::get(resource.item_path(id)?)).await
    }

    /// Fetch several items concurrently; results keep the order of `ids`.
    pub async fn get_many(
        &self,
        resource: Resource,
        ids: &[String],
    ) -> Vec<Result<Value, ApiError>> {
        join_all(ids.iter().map(|id| self.get::<Value>(resource, id))).await
    }

    pub async fn create(&self, resource: Resource, body: Value) -> Result<Value, ApiError> {
        self.fetch(ApiRequest::post(resource.path(), body)).await
    }

    pub async fn update(
        &self,
        resource: Resource,
        id: &str,
        body: Value,
    ) -> Result<Value, ApiError> {
        self.fetch(ApiRequest::put(resource.item_path(id)?, body)).await
    }

    pub async fn delete(&self, resource: Resource, id: &str) -> Result<(), ApiError> {
        self.client
            .send(ApiRequest::delete(resource.item_path(id)?))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::hooks::Notifier;
    use crate::auth::tokens::Credentials;
    use crate::auth::MemoryTokenStore;
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::Arc;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Quiet;

    impl Notifier for Quiet {
        fn notify_error(&self, _error: &ApiError) {}
    }

    fn service(server: &MockServer, tenant: Option<&str>) -> CrudService {
        let store = Arc::new(MemoryTokenStore::new(Credentials {
            access_token: Some("tok".into()),
            refresh_token: Some("r".into()),
            tenant: tenant.map(String::from),
            ..Default::default()
        }));
        let client = AdminClient::builder()
            .base_url(server.uri())
            .store(store)
            .notifier(Arc::new(Quiet))
            .build()
            .unwrap();
        CrudService::new(client)
    }

    #[derive(Debug, Deserialize)]
    struct Order {
        id: u64,
        total: String,
    }

    #[tokio::test]
    async fn test_get_parses_typed_item() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/private/orders/123"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"id": 123, "total": "$10.00"})),
            )
            .mount(&server)
            .await;

        let crud = service(&server, None);
        let order: Order = crud.get(Resource::Orders, "123").await.unwrap();
        assert_eq!(order.id, 123);
        assert_eq!(order.total, "$10.00");
    }

    #[tokio::test]
    async fn test_list_adds_paging_and_store() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/private/customers"))
            .and(query_param("page", "2"))
            .and(query_param("count", "25"))
            .and(query_param("store", "DEFAULT"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"customers": []})))
            .expect(1)
            .mount(&server)
            .await;

        let crud = service(&server, Some("DEFAULT"));
        let page = Page {
            page: Some(2),
            count: Some(25),
        };
        let list: Value = crud.list(Resource::Customers, page).await.unwrap();
        assert!(list["customers"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_stores_is_not_store_scoped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/private/stores"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let crud = service(&server, Some("DEFAULT"));
        let _: Value = crud.list(Resource::Stores, Page::default()).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests[0].url.query(), None);
    }

    #[tokio::test]
    async fn test_create_update_delete() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/private/tax/class"))
            .and(body_json(json!({"code": "TX1"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 7})))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/v1/private/tax/class/7"))
            .and(body_json(json!({"code": "TX2"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 7})))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/v1/private/tax/class/7"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let crud = service(&server, None);
        let created = crud
            .create(Resource::TaxClasses, json!({"code": "TX1"}))
            .await
            .unwrap();
        assert_eq!(created["id"], 7);

        let updated = crud
            .update(Resource::TaxClasses, "7", json!({"code": "TX2"}))
            .await
            .unwrap();
        assert_eq!(updated["id"], 7);

        crud.delete(Resource::TaxClasses, "7").await.unwrap();
    }

    #[tokio::test]
    async fn test_get_many_keeps_id_order() {
        let server = MockServer::start().await;
        for id in ["1", "2", "3"] {
            Mock::given(method("GET"))
                .and(path(format!("/v1/private/products/{}", id)))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": id })))
                .mount(&server)
                .await;
        }
        Mock::given(method("GET"))
            .and(path("/v1/private/products/404"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let crud = service(&server, None);
        let ids: Vec<String> = ["3", "404", "1", "2"].iter().map(|s| s.to_string()).collect();
        let results = crud.get_many(Resource::Products, &ids).await;

        assert_eq!(results.len(), 4);
        assert_eq!(results[0].as_ref().unwrap()["id"], "3");
        assert_eq!(results[1].as_ref().unwrap_err().status(), Some(404));
        assert_eq!(results[2].as_ref().unwrap()["id"], "1");
        assert_eq!(results[3].as_ref().unwrap()["id"], "2");
    }

    #[tokio::test]
    async fn test_bad_id_never_hits_network() {
        let server = MockServer::start().await;
        let crud = service(&server, None);

        let err = crud.get::<Value>(Resource::Users, "1/2").await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidUrl(_)));
        assert!(server.received_requests().await.unwrap().is_empty());
    }
}
