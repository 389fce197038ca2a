//! HTTP client for the ProductHub REST API.
//!
//! One method per endpoint, no caching here; `cached_client` layers the
//! sync core on top. Authenticated requests attach the bearer token from
//! the session and are rejected before any network dispatch when no
//! session is present.

use std::sync::Arc;

use reqwest::header::{CONTENT_TYPE, RETRY_AFTER};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;

use crate::error::ApiError;
use crate::session::Session;

use super::types::{
  Category, CreateProductInput, DeleteResponse, LoginResponse, Product, ProductListParams,
  UpdateProductInput,
};

/// Error body shape used by the API on non-2xx responses.
#[derive(Debug, Deserialize)]
struct ErrorBody {
  message: String,
}

/// Catalog API client.
#[derive(Clone)]
pub struct CatalogClient {
  http: reqwest::Client,
  base_url: Url,
  session: Arc<Session>,
}

impl CatalogClient {
  pub fn new(base_url: Url, session: Arc<Session>) -> Result<Self, ApiError> {
    let http = reqwest::Client::builder()
      .user_agent(concat!("prodhub/", env!("CARGO_PKG_VERSION")))
      .build()?;

    // A trailing slash keeps Url::join from eating the base path.
    let mut base_url = base_url;
    if !base_url.path().ends_with('/') {
      base_url.set_path(&format!("{}/", base_url.path()));
    }

    Ok(Self {
      http,
      base_url,
      session,
    })
  }

  fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
    self.base_url.join(path).map_err(|e| ApiError::Network {
      message: format!("invalid endpoint {}: {}", path, e),
    })
  }

  /// Attach the bearer token, rejecting the call before any network
  /// dispatch when no session is present.
  fn authed(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::RequestBuilder, ApiError> {
    let token = self.session.token().ok_or(ApiError::Auth)?;
    Ok(
      builder
        .bearer_auth(token)
        .header(CONTENT_TYPE, "application/json"),
    )
  }

  /// Decode a response, classifying non-2xx statuses.
  async fn handle<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T, ApiError> {
    let status = response.status();
    if status.is_success() {
      return response.json::<T>().await.map_err(ApiError::from);
    }

    if status == StatusCode::UNAUTHORIZED {
      // The token is no longer valid server-side: drop the session.
      self.session.clear();
    }

    let retry_after = response
      .headers()
      .get(RETRY_AFTER)
      .and_then(|value| value.to_str().ok())
      .and_then(|value| value.parse().ok());
    let message = response
      .json::<ErrorBody>()
      .await
      .ok()
      .map(|body| body.message);

    Err(ApiError::from_status(status.as_u16(), message, retry_after))
  }

  /// Exchange an email for a session token. Unauthenticated.
  pub async fn login(&self, email: &str) -> Result<String, ApiError> {
    let response = self
      .http
      .post(self.endpoint("auth")?)
      .json(&serde_json::json!({ "email": email }))
      .send()
      .await?;
    let body: LoginResponse = self.handle(response).await?;
    Ok(body.token)
  }

  /// Fetch one page of products, optionally filtered by category.
  pub async fn get_products(&self, params: &ProductListParams) -> Result<Vec<Product>, ApiError> {
    let mut query = vec![
      ("offset", params.offset.to_string()),
      ("limit", params.limit.to_string()),
    ];
    if let Some(category_id) = &params.category_id {
      query.push(("categoryId", category_id.clone()));
    }

    let request = self.authed(self.http.get(self.endpoint("products")?))?;
    let response = request.query(&query).send().await?;
    self.handle(response).await
  }

  /// Search products by name. The endpoint spans all categories and does
  /// not paginate.
  pub async fn search_products(&self, term: &str) -> Result<Vec<Product>, ApiError> {
    let request = self.authed(self.http.get(self.endpoint("products/search")?))?;
    let response = request.query(&[("searchedText", term)]).send().await?;
    self.handle(response).await
  }

  /// Fetch a single product by slug or id.
  pub async fn get_product(&self, slug_or_id: &str) -> Result<Product, ApiError> {
    let request = self.authed(
      self
        .http
        .get(self.endpoint(&format!("products/{}", slug_or_id))?),
    )?;
    let response = request.send().await?;
    self.handle(response).await
  }

  pub async fn create_product(&self, input: &CreateProductInput) -> Result<Product, ApiError> {
    let request = self.authed(self.http.post(self.endpoint("products")?))?;
    let response = request.json(input).send().await?;
    self.handle(response).await
  }

  pub async fn update_product(
    &self,
    id: &str,
    input: &UpdateProductInput,
  ) -> Result<Product, ApiError> {
    let request = self.authed(self.http.put(self.endpoint(&format!("products/{}", id))?))?;
    let response = request.json(input).send().await?;
    self.handle(response).await
  }

  pub async fn delete_product(&self, id: &str) -> Result<DeleteResponse, ApiError> {
    let request = self.authed(
      self
        .http
        .delete(self.endpoint(&format!("products/{}", id))?),
    )?;
    let response = request.send().await?;
    self.handle(response).await
  }

  /// Fetch categories, optionally one page of them.
  pub async fn get_categories(
    &self,
    offset: Option<u64>,
    limit: Option<u64>,
  ) -> Result<Vec<Category>, ApiError> {
    let mut query = Vec::new();
    if let Some(offset) = offset {
      query.push(("offset", offset.to_string()));
    }
    if let Some(limit) = limit {
      query.push(("limit", limit.to_string()));
    }

    let request = self.authed(self.http.get(self.endpoint("categories")?))?;
    let response = request.query(&query).send().await?;
    self.handle(response).await
  }

  /// Search categories by name.
  pub async fn search_categories(&self, term: &str) -> Result<Vec<Category>, ApiError> {
    let request = self.authed(self.http.get(self.endpoint("categories/search")?))?;
    let response = request.query(&[("searchedText", term)]).send().await?;
    self.handle(response).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::db::Database;

  fn client_without_session() -> CatalogClient {
    let session = Arc::new(Session::load(Database::open_in_memory().unwrap()).unwrap());
    CatalogClient::new(Url::parse("https://api.example.com/api/v1").unwrap(), session).unwrap()
  }

  #[test]
  fn test_endpoint_preserves_base_path() {
    let client = client_without_session();
    assert_eq!(
      client.endpoint("products").unwrap().as_str(),
      "https://api.example.com/api/v1/products"
    );
    assert_eq!(
      client.endpoint("products/search").unwrap().as_str(),
      "https://api.example.com/api/v1/products/search"
    );
  }

  #[tokio::test]
  async fn test_authed_requests_are_gated_without_session() {
    let client = client_without_session();
    let err = client
      .get_products(&ProductListParams::default())
      .await
      .unwrap_err();
    assert_eq!(err, ApiError::Auth);
  }
}
