//! Cache types for catalog responses.

use myshop_core::{CollectionId, ProductId};

use super::types::{Collection, Page, Product, ProductQuery};

/// Cache key for products and collections.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub enum CacheKey {
    Product(ProductId),
    Products(ProductQuery),
    Collection(CollectionId),
    Collections,
}

/// Cached value types.
#[derive(Debug, Clone)]
pub enum CacheValue {
    Product(Box<Product>),
    Products(Page<Product>),
    Collection(Collection),
    Collections(Vec<Collection>),
}
