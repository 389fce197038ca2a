mod commands;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use rust_decimal::Decimal;

use prodhub::catalog::cached_client::CachedCatalogClient;
use prodhub::catalog::client::CatalogClient;
use prodhub::catalog::listing::DEFAULT_PAGE_SIZE;
use prodhub::catalog::types::UpdateProductInput;
use prodhub::{config, db, session};

#[derive(Parser, Debug)]
#[command(name = "prodhub")]
#[command(about = "A terminal client for the ProductHub catalog API")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/prodhub/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Log in with the email you registered with
  Login { email: String },
  /// Drop the current session
  Logout,
  /// Show the logged-in user
  Whoami,
  /// Product operations
  #[command(subcommand)]
  Products(ProductsCommand),
  /// Category operations
  #[command(subcommand)]
  Categories(CategoriesCommand),
}

#[derive(Subcommand, Debug)]
enum ProductsCommand {
  /// List products page by page
  List {
    #[arg(long, default_value_t = 0)]
    offset: u64,
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    limit: u64,
    /// Only show products in this category
    #[arg(long)]
    category: Option<String>,
  },
  /// Search products by name (global, unpaginated)
  Search { term: String },
  /// Show a single product by slug or id
  Show { key: String },
  /// Create a product
  Create {
    #[arg(long)]
    name: String,
    #[arg(long)]
    price: Decimal,
    #[arg(long, default_value = "")]
    description: String,
    /// Category id the product belongs to
    #[arg(long)]
    category: String,
    /// Image URL; repeat for multiple images
    #[arg(long = "image")]
    images: Vec<String>,
  },
  /// Update fields of a product
  Update {
    id: String,
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    price: Option<Decimal>,
    #[arg(long)]
    description: Option<String>,
    /// Move the product to another category
    #[arg(long)]
    category: Option<String>,
    /// Replace the image list; repeat for multiple images
    #[arg(long = "image")]
    images: Option<Vec<String>>,
  },
  /// Delete a product
  Delete { id: String },
}

#[derive(Subcommand, Debug)]
enum CategoriesCommand {
  /// List categories
  List {
    #[arg(long)]
    offset: Option<u64>,
    #[arg(long)]
    limit: Option<u64>,
  },
  /// Search categories by name
  Search { term: String },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;
  tracing_subscriber::fmt()
    .with_env_filter(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
    )
    .with_writer(std::io::stderr)
    .init();

  let args = Args::parse();
  let config = config::Config::load(args.config.as_deref())?;

  let db = db::Database::open()?;
  let session = Arc::new(session::Session::load(db)?);
  let api = CatalogClient::new(config.api.base_url.clone(), Arc::clone(&session))?;
  let client = CachedCatalogClient::new(api.clone(), &config.cache);

  match args.command {
    Command::Login { email } => commands::login(&api, &session, &email).await,
    Command::Logout => commands::logout(&session),
    Command::Whoami => commands::whoami(&session),
    Command::Products(products) => match products {
      ProductsCommand::List {
        offset,
        limit,
        category,
      } => commands::list_products(&client, offset, limit, category).await,
      ProductsCommand::Search { term } => commands::search_products(&client, &term).await,
      ProductsCommand::Show { key } => commands::show_product(&client, &key).await,
      ProductsCommand::Create {
        name,
        price,
        description,
        category,
        images,
      } => commands::create_product(&client, name, price, description, category, images).await,
      ProductsCommand::Update {
        id,
        name,
        price,
        description,
        category,
        images,
      } => {
        let input = UpdateProductInput {
          name,
          price,
          description,
          category_id: category,
          images,
        };
        commands::update_product(&client, &id, input).await
      }
      ProductsCommand::Delete { id } => commands::delete_product(&client, &id).await,
    },
    Command::Categories(categories) => match categories {
      CategoriesCommand::List { offset, limit } => {
        commands::list_categories(&client, offset, limit).await
      }
      CategoriesCommand::Search { term } => commands::search_categories(&client, &term).await,
    },
  }
}
