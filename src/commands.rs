//! CLI command handlers over the cached catalog client.

use color_eyre::{eyre::eyre, Result};
use rust_decimal::Decimal;

use prodhub::catalog::cache::CatalogQuery;
use prodhub::catalog::cached_client::CachedCatalogClient;
use prodhub::catalog::client::CatalogClient;
use prodhub::catalog::listing::ProductListing;
use prodhub::catalog::types::{CreateProductInput, Product, UpdateProductInput, User};
use prodhub::error::ApiError;
use prodhub::session::Session;

pub async fn login(api: &CatalogClient, session: &Session, email: &str) -> Result<()> {
  let email = email.trim().to_lowercase();
  if email.len() < 5 || !email.contains('@') {
    return Err(eyre!("'{}' does not look like an email address", email));
  }

  match api.login(&email).await {
    Ok(token) => {
      let user = User::from_email(&email);
      session.store(token, user.clone())?;
      println!("Logged in as {} <{}>", user.name, user.email);
      Ok(())
    }
    Err(ApiError::RateLimit { retry_after }) => Err(eyre!(
      "too many login attempts; retry in {} seconds",
      retry_after.unwrap_or(10)
    )),
    Err(err) => Err(err.into()),
  }
}

pub fn logout(session: &Session) -> Result<()> {
  session.clear();
  println!("Logged out.");
  Ok(())
}

pub fn whoami(session: &Session) -> Result<()> {
  match session.user() {
    Some(user) => println!("{} <{}>", user.name, user.email),
    None => println!("Not logged in. Run `prodhub login <email>` first."),
  }
  Ok(())
}

pub async fn list_products(
  client: &CachedCatalogClient,
  offset: u64,
  limit: u64,
  category_id: Option<String>,
) -> Result<()> {
  let mut listing = ProductListing::new();
  listing.set_limit(limit);
  listing.set_category(category_id);
  listing.set_offset(offset);

  let products = run_listing(client, &listing).await?;
  print_products(&products);
  if products.len() as u64 == limit {
    println!("(next page: --offset {})", offset + limit);
  }
  Ok(())
}

pub async fn search_products(client: &CachedCatalogClient, term: &str) -> Result<()> {
  let mut listing = ProductListing::new();
  listing.set_search_input(term);
  listing.flush_search();

  let products = run_listing(client, &listing).await?;
  print_products(&products);
  Ok(())
}

async fn run_listing(
  client: &CachedCatalogClient,
  listing: &ProductListing,
) -> Result<Vec<Product>> {
  let query = listing.query();
  // Pin the entry while it is on screen; invalidations refetch it.
  let _sub = client.subscribe(&CachedCatalogClient::listing_descriptor(&query));
  client.run_listing(&query).await.map_err(auth_hint)
}

pub async fn show_product(client: &CachedCatalogClient, key: &str) -> Result<()> {
  match client.product(key).await {
    Ok(product) => {
      print_product(&product);
      Ok(())
    }
    Err(err) => {
      // A transient failure keeps the last good value around; show it.
      let query = CatalogQuery::ProductDetail {
        key: key.to_string(),
      };
      if let Some(product) = client
        .snapshot::<Product>(&query)
        .and_then(|snapshot| snapshot.data)
      {
        eprintln!("warning: {}; showing the cached copy", err);
        print_product(&product);
        return Ok(());
      }
      Err(auth_hint(err))
    }
  }
}

fn print_product(product: &Product) {
  println!("{} ({})", product.name, product.slug);
  println!("  id:       {}", product.id);
  println!("  price:    {}", product.price);
  println!(
    "  category: {} ({})",
    product.category.name, product.category.id
  );
  if !product.description.is_empty() {
    println!("  about:    {}", product.description);
  }
  for image in &product.images {
    println!("  image:    {}", image);
  }
  println!("  updated:  {}", product.updated_at.to_rfc3339());
}

pub async fn create_product(
  client: &CachedCatalogClient,
  name: String,
  price: Decimal,
  description: String,
  category_id: String,
  images: Vec<String>,
) -> Result<()> {
  if price.is_sign_negative() || price.scale() > 2 {
    return Err(eyre!("price must be nonnegative with at most 2 decimals"));
  }

  let created = client
    .create_product(CreateProductInput {
      name,
      price,
      description,
      category_id,
      images,
    })
    .await
    .map_err(auth_hint)?;
  println!("Created {} ({})", created.name, created.id);
  Ok(())
}

pub async fn update_product(
  client: &CachedCatalogClient,
  id: &str,
  input: UpdateProductInput,
) -> Result<()> {
  if let Some(price) = input.price {
    if price.is_sign_negative() || price.scale() > 2 {
      return Err(eyre!("price must be nonnegative with at most 2 decimals"));
    }
  }

  let updated = client.update_product(id, input).await.map_err(auth_hint)?;
  println!("Updated {} ({})", updated.name, updated.id);
  Ok(())
}

pub async fn delete_product(client: &CachedCatalogClient, id: &str) -> Result<()> {
  let deleted = client.delete_product(id).await.map_err(auth_hint)?;
  println!("Deleted {}", deleted.id);
  Ok(())
}

pub async fn list_categories(
  client: &CachedCatalogClient,
  offset: Option<u64>,
  limit: Option<u64>,
) -> Result<()> {
  let categories = client.categories(offset, limit).await.map_err(auth_hint)?;
  if categories.is_empty() {
    println!("No categories found.");
    return Ok(());
  }
  for category in categories {
    println!("{:<36}  {}", category.id, category.name);
  }
  Ok(())
}

pub async fn search_categories(client: &CachedCatalogClient, term: &str) -> Result<()> {
  let categories = client.search_categories(term).await.map_err(auth_hint)?;
  if categories.is_empty() {
    println!("No categories matched '{}'.", term);
    return Ok(());
  }
  for category in categories {
    println!("{:<36}  {}", category.id, category.name);
  }
  Ok(())
}

fn print_products(products: &[Product]) {
  if products.is_empty() {
    println!("No products found.");
    return;
  }
  for product in products {
    println!(
      "{:<36}  {:>10}  {:<16}  {}",
      product.id,
      product.price.to_string(),
      product.category.name,
      product.name
    );
  }
}

/// Point the user at the login flow when a call failed on authentication.
fn auth_hint(err: ApiError) -> color_eyre::Report {
  if err.is_auth() {
    eyre!("{}. Run `prodhub login <email>` first.", err)
  } else {
    err.into()
  }
}
