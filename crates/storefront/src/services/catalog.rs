//! Catalog queries over the product repository.
//!
//! The catalog is small, so every listing loads all products once and
//! filters in memory. Loads are cached using `moka` (5-minute TTL).

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use muscle_shop_core::product::{
    Page, count_by_category, filter_products, paginate, related_products,
};
use muscle_shop_core::{Product, ProductFilter, ProductId};
use tracing::{debug, instrument};

use crate::db::{ProductRepository, RepositoryError};

/// Default number of related products shown on a product page.
pub const RELATED_PRODUCTS_LIMIT: usize = 4;

const ALL_PRODUCTS_KEY: &str = "products:all";

#[derive(Debug, Clone)]
enum CacheValue {
    Products(Arc<Vec<Product>>),
    Product(Box<Product>),
}

/// Read-only catalog service.
#[derive(Clone)]
pub struct Catalog {
    inner: Arc<CatalogInner>,
}

struct CatalogInner {
    repository: Arc<dyn ProductRepository>,
    cache: Cache<String, CacheValue>,
}

impl Catalog {
    /// Create a catalog over `repository`.
    #[must_use]
    pub fn new(repository: Arc<dyn ProductRepository>) -> Self {
        let cache = Cache::builder()
            .max_capacity(1000)
            .time_to_live(Duration::from_secs(300)) // 5 minutes
            .build();

        Self {
            inner: Arc::new(CatalogInner { repository, cache }),
        }
    }

    async fn all_products(&self) -> Result<Arc<Vec<Product>>, RepositoryError> {
        if let Some(CacheValue::Products(products)) = self.inner.cache.get(ALL_PRODUCTS_KEY).await
        {
            debug!("Cache hit for product list");
            return Ok(products);
        }

        let products = Arc::new(self.inner.repository.list_all().await?);
        self.inner
            .cache
            .insert(
                ALL_PRODUCTS_KEY.to_string(),
                CacheValue::Products(Arc::clone(&products)),
            )
            .await;
        Ok(products)
    }

    /// Active products matching `filter`, newest first.
    ///
    /// # Errors
    ///
    /// Returns error if products cannot be loaded.
    #[instrument(skip(self))]
    pub async fn list_products(
        &self,
        filter: &ProductFilter,
    ) -> Result<Vec<Product>, RepositoryError> {
        let products = self.all_products().await?;
        Ok(filter_products(&products, filter))
    }

    /// One page of [`Self::list_products`].
    ///
    /// # Errors
    ///
    /// Returns error if products cannot be loaded.
    pub async fn list_page(
        &self,
        filter: &ProductFilter,
        page: u32,
        per_page: u32,
    ) -> Result<Page<Product>, RepositoryError> {
        Ok(paginate(self.list_products(filter).await?, page, per_page))
    }

    /// An active product by id. Inactive and missing products are `None`.
    ///
    /// # Errors
    ///
    /// Returns error if the product cannot be loaded.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn get_product(&self, id: &ProductId) -> Result<Option<Product>, RepositoryError> {
        let cache_key = format!("product:{id}");

        if let Some(CacheValue::Product(product)) = self.inner.cache.get(&cache_key).await {
            debug!("Cache hit for product");
            return Ok(Some(*product));
        }

        let product = self
            .inner
            .repository
            .get(id)
            .await?
            .filter(Product::is_active);

        if let Some(ref product) = product {
            self.inner
                .cache
                .insert(cache_key, CacheValue::Product(Box::new(product.clone())))
                .await;
        }
        Ok(product)
    }

    /// Other active products in the same category as `product`.
    ///
    /// # Errors
    ///
    /// Returns error if products cannot be loaded.
    pub async fn related_products(
        &self,
        product: &Product,
        limit: usize,
    ) -> Result<Vec<Product>, RepositoryError> {
        let products = self.all_products().await?;
        Ok(related_products(
            &products,
            product.category,
            &product.id,
            limit,
        ))
    }

    /// Active product counts per category, plus `"all"`.
    ///
    /// # Errors
    ///
    /// Returns error if products cannot be loaded.
    pub async fn count_by_category(&self) -> Result<BTreeMap<String, usize>, RepositoryError> {
        let products = self.all_products().await?;
        Ok(count_by_category(&products))
    }

    /// Invalidate all cached data.
    pub async fn invalidate_all(&self) {
        self.inner.cache.invalidate_all();
        self.inner.cache.run_pending_tasks().await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{TimeZone, Utc};
    use muscle_shop_core::{ProductCategory, ProductStatus, Yen};

    use super::*;
    use crate::db::InMemoryProductRepository;

    fn product(id: &str, category: ProductCategory, day: u32) -> Product {
        let created = Utc.with_ymd_and_hms(2026, 2, day, 0, 0, 0).unwrap();
        Product {
            id: ProductId::new(id),
            name: id.to_owned(),
            description: String::new(),
            long_description: None,
            price: Yen::new(1000 * i64::from(day)),
            original_price: None,
            stock: 3,
            category,
            status: ProductStatus::Active,
            images: vec![],
            rating: None,
            reviews: None,
            details: None,
            created_at: created,
            updated_at: created,
        }
    }

    fn repository() -> Arc<InMemoryProductRepository> {
        let mut retired = product("retired", ProductCategory::Wear, 9);
        retired.status = ProductStatus::Inactive;
        Arc::new(InMemoryProductRepository::new(vec![
            product("whey", ProductCategory::Supplement, 1),
            product("creatine", ProductCategory::Supplement, 2),
            product("gloves", ProductCategory::Accessories, 3),
            retired,
        ]))
    }

    #[tokio::test]
    async fn test_list_products_filters_and_sorts() {
        let catalog = Catalog::new(repository());
        let filter = ProductFilter {
            category: Some(ProductCategory::Supplement),
            ..ProductFilter::default()
        };
        let ids: Vec<String> = catalog
            .list_products(&filter)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.id.to_string())
            .collect();
        assert_eq!(ids, ["creatine", "whey"]);
    }

    #[tokio::test]
    async fn test_get_product_hides_inactive() {
        let catalog = Catalog::new(repository());
        assert!(catalog.get_product(&ProductId::new("whey")).await.unwrap().is_some());
        assert!(catalog.get_product(&ProductId::new("retired")).await.unwrap().is_none());
        assert!(catalog.get_product(&ProductId::new("missing")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_is_cached_until_invalidated() {
        let repo = repository();
        let catalog = Catalog::new(repo.clone());
        assert_eq!(catalog.list_products(&ProductFilter::default()).await.unwrap().len(), 3);

        repo.put(product("belt", ProductCategory::Equipment, 4)).await;
        assert_eq!(catalog.list_products(&ProductFilter::default()).await.unwrap().len(), 3);

        catalog.invalidate_all().await;
        assert_eq!(catalog.list_products(&ProductFilter::default()).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_related_and_counts() {
        let catalog = Catalog::new(repository());
        let whey = catalog.get_product(&ProductId::new("whey")).await.unwrap().unwrap();

        let related = catalog.related_products(&whey, RELATED_PRODUCTS_LIMIT).await.unwrap();
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].id.as_str(), "creatine");

        let counts = catalog.count_by_category().await.unwrap();
        assert_eq!(counts["all"], 3);
        assert_eq!(counts["wear"], 0);
    }
}
