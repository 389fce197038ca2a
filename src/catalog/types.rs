//! Catalog domain types as served by the ProductHub API.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A product category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
  pub id: String,
  pub name: String,
  #[serde(default)]
  pub description: Option<String>,
  pub image: String,
  pub created_at: DateTime<Utc>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub updated_at: Option<DateTime<Utc>>,
}

/// A catalog product.
///
/// The category is a denormalized embedded copy, not a reference; list
/// views read the category name straight off the product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
  pub id: String,
  pub name: String,
  /// Nonnegative, at most two fractional digits.
  #[serde(with = "rust_decimal::serde::float")]
  pub price: Decimal,
  pub description: String,
  #[serde(default)]
  pub images: Vec<String>,
  pub slug: String,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
  pub category: Category,
}

/// The logged-in user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
  pub id: String,
  pub email: String,
  pub name: String,
}

impl User {
  /// Build the local user record for a login email. The auth endpoint only
  /// returns a token, so the record is synthesized client-side.
  pub fn from_email(email: &str) -> Self {
    let name = email.split('@').next().unwrap_or(email).to_string();
    Self {
      id: Uuid::new_v4().to_string(),
      email: email.to_string(),
      name,
    }
  }
}

/// Body of a successful `POST /auth`.
#[derive(Debug, Deserialize)]
pub struct LoginResponse {
  pub token: String,
}

/// Body of a successful `DELETE /products/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteResponse {
  pub id: String,
}

/// Parameters for the paginated product listing.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductListParams {
  pub offset: u64,
  pub limit: u64,
  pub category_id: Option<String>,
}

impl Default for ProductListParams {
  fn default() -> Self {
    Self {
      offset: 0,
      limit: super::listing::DEFAULT_PAGE_SIZE,
      category_id: None,
    }
  }
}

/// Payload for `POST /products`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductInput {
  pub name: String,
  #[serde(with = "rust_decimal::serde::float")]
  pub price: Decimal,
  pub description: String,
  pub category_id: String,
  pub images: Vec<String>,
}

/// Partial payload for `PUT /products/{id}`. Absent fields stay unchanged.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProductInput {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none",
    with = "rust_decimal::serde::float_option"
  )]
  pub price: Option<Decimal>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub category_id: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub images: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_product_wire_format() {
    let json = r#"{
      "id": "p-1",
      "name": "Trail Shoes",
      "price": 89.5,
      "description": "Grippy",
      "images": ["https://img.example.com/1.jpg"],
      "slug": "trail-shoes",
      "createdAt": "2025-05-01T10:00:00Z",
      "updatedAt": "2025-05-02T10:00:00Z",
      "category": {
        "id": "c-1",
        "name": "Shoes",
        "description": null,
        "image": "https://img.example.com/c.jpg",
        "createdAt": "2025-01-01T00:00:00Z"
      }
    }"#;

    let product: Product = serde_json::from_str(json).unwrap();
    assert_eq!(product.slug, "trail-shoes");
    assert_eq!(product.price.to_string(), "89.5");
    assert_eq!(product.category.name, "Shoes");
  }

  #[test]
  fn test_update_input_skips_absent_fields() {
    let input = UpdateProductInput {
      name: Some("New name".to_string()),
      ..Default::default()
    };
    let json = serde_json::to_value(&input).unwrap();
    assert_eq!(json, serde_json::json!({ "name": "New name" }));
  }

  #[test]
  fn test_user_from_email() {
    let user = User::from_email("ada@example.com");
    assert_eq!(user.name, "ada");
    assert_eq!(user.email, "ada@example.com");
    assert!(!user.id.is_empty());
  }
}
