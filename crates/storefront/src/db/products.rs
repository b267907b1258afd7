//! Product repository backed by `storefront.product`.

use async_trait::async_trait;
use muscle_shop_core::{Product, ProductDetails, ProductId};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};

use super::{ProductRepository, RepositoryError, ensure_open};

/// `PostgreSQL` implementation of [`ProductRepository`].
#[derive(Clone)]
pub struct PgProductRepository {
    pool: PgPool,
}

impl PgProductRepository {
    /// Create a new product repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a product, or overwrite the one with the same id.
    ///
    /// Used by the seeding CLI. `created_at` is kept on update.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the write fails.
    pub async fn upsert(&self, product: &Product) -> Result<(), RepositoryError> {
        ensure_open(&self.pool)?;

        sqlx::query(
            r"
            INSERT INTO storefront.product (
                id, name, description, long_description, price, original_price, stock,
                category, status, images, rating, reviews, details, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                description = EXCLUDED.description,
                long_description = EXCLUDED.long_description,
                price = EXCLUDED.price,
                original_price = EXCLUDED.original_price,
                stock = EXCLUDED.stock,
                category = EXCLUDED.category,
                status = EXCLUDED.status,
                images = EXCLUDED.images,
                rating = EXCLUDED.rating,
                reviews = EXCLUDED.reviews,
                details = EXCLUDED.details,
                updated_at = EXCLUDED.updated_at
            ",
        )
        .bind(&product.id)
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.long_description.as_deref())
        .bind(product.price)
        .bind(product.original_price)
        .bind(product.stock)
        .bind(product.category)
        .bind(product.status)
        .bind(&product.images)
        .bind(product.rating)
        .bind(product.reviews)
        .bind(product.details.as_ref().map(Json))
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl ProductRepository for PgProductRepository {
    #[tracing::instrument(skip(self))]
    async fn list_all(&self) -> Result<Vec<Product>, RepositoryError> {
        ensure_open(&self.pool)?;

        let rows = sqlx::query(
            r"
            SELECT id, name, description, long_description, price, original_price, stock,
                   category, status, images, rating, reviews, details, created_at, updated_at
            FROM storefront.product
            ORDER BY created_at DESC, id
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(product_from_row).collect()
    }

    #[tracing::instrument(skip(self), fields(product_id = %id))]
    async fn get(&self, id: &ProductId) -> Result<Option<Product>, RepositoryError> {
        ensure_open(&self.pool)?;

        let row = sqlx::query(
            r"
            SELECT id, name, description, long_description, price, original_price, stock,
                   category, status, images, rating, reviews, details, created_at, updated_at
            FROM storefront.product
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(product_from_row).transpose()
    }
}

fn product_from_row(row: &PgRow) -> Result<Product, RepositoryError> {
    let details: Option<Json<ProductDetails>> = row.try_get("details")?;

    Ok(Product {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        long_description: row.try_get("long_description")?,
        price: row.try_get("price")?,
        original_price: row.try_get("original_price")?,
        stock: row.try_get("stock")?,
        category: row.try_get("category")?,
        status: row.try_get("status")?,
        images: row.try_get("images")?,
        rating: row.try_get("rating")?,
        reviews: row.try_get("reviews")?,
        details: details.map(|Json(d)| d),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
