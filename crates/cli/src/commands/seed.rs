//! Seed the catalog from a YAML file.
//!
//! The file is a list of products:
//!
//! ```yaml
//! - id: whey-1kg
//!   name: ホエイプロテイン 1kg
//!   description: 毎日のトレーニングに
//!   price: 3000
//!   stock: 20
//!   category: supplement
//!   images: [/images/whey.jpg]
//! ```
//!
//! Products are upserted by id, so re-running the command updates prices
//! and stock without duplicating anything.

use std::collections::HashSet;
use std::path::Path;

use chrono::Utc;
use serde::Deserialize;
use tracing::{error, info};

use muscle_shop_core::{
    Product, ProductCategory, ProductDetails, ProductId, ProductStatus, Yen,
};
use muscle_shop_storefront::db::{self, PgProductRepository};

use super::{CommandError, database_url};

/// One product entry in the seed file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSeed {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub long_description: Option<String>,
    pub price: i64,
    pub original_price: Option<i64>,
    #[serde(default)]
    pub stock: i32,
    pub category: ProductCategory,
    #[serde(default)]
    pub status: ProductStatus,
    #[serde(default)]
    pub images: Vec<String>,
    pub rating: Option<f32>,
    pub reviews: Option<i32>,
    pub details: Option<ProductDetails>,
}

impl ProductSeed {
    fn into_product(self) -> Product {
        let now = Utc::now();
        Product {
            id: ProductId::new(self.id),
            name: self.name,
            description: self.description,
            long_description: self.long_description,
            price: Yen::new(self.price),
            original_price: self.original_price.map(Yen::new),
            stock: self.stock,
            category: self.category,
            status: self.status,
            images: self.images,
            rating: self.rating,
            reviews: self.reviews,
            details: self.details,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Problems with a seed file, one message per problem.
fn validate(seeds: &[ProductSeed]) -> Vec<String> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();

    for seed in seeds {
        if seed.id.trim().is_empty() {
            errors.push(format!("product '{}' has an empty id", seed.name));
            continue;
        }
        if !seen.insert(seed.id.as_str()) {
            errors.push(format!("{}: duplicate id", seed.id));
        }
        if seed.name.trim().is_empty() {
            errors.push(format!("{}: name is empty", seed.id));
        }
        if seed.price <= 0 {
            errors.push(format!("{}: price must be positive", seed.id));
        }
        if seed.original_price.is_some_and(|original| original < seed.price) {
            errors.push(format!("{}: original price is below price", seed.id));
        }
        if seed.stock < 0 {
            errors.push(format!("{}: stock is negative", seed.id));
        }
        if seed.rating.is_some_and(|r| !(0.0..=5.0).contains(&r)) {
            errors.push(format!("{}: rating must be between 0 and 5", seed.id));
        }
    }
    errors
}

fn parse(content: &str) -> Result<Vec<ProductSeed>, CommandError> {
    let seeds: Vec<ProductSeed> = serde_yaml::from_str(content)?;
    let errors = validate(&seeds);
    if !errors.is_empty() {
        error!("Product file validation failed:");
        for err in &errors {
            error!("  - {err}");
        }
        return Err(CommandError::Invalid(errors.len()));
    }
    Ok(seeds)
}

/// Seed products from a YAML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is invalid, or if a
/// database write fails.
pub async fn products(file_path: &str, dry_run: bool) -> Result<(), CommandError> {
    let path = Path::new(file_path);
    info!(path = %file_path, "Loading products from file");

    // Read and validate before connecting to the database
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| CommandError::Read {
            path: file_path.to_owned(),
            source,
        })?;
    let seeds = parse(&content)?;
    info!(products = seeds.len(), "Product file validated");

    if dry_run {
        info!("Dry run, nothing written");
        return Ok(());
    }

    let pool = db::create_pool(&database_url()?).await?;
    let repository = PgProductRepository::new(pool);

    for seed in seeds {
        let product = seed.into_product();
        repository.upsert(&product).await?;
        info!(id = %product.id, price = %product.price, "Upserted product");
    }

    info!("Seeding complete!");
    Ok(())
}
