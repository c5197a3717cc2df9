//! Product route handlers.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::instrument;

use myshop_core::{CollectionId, Price, ProductId};

use crate::api::{ApiClient, ApiError, Collection, Product, ProductQuery};
use crate::error::AppError;
use crate::filters;
use crate::routes::PageContext;
use crate::state::AppState;

/// Products per listing page; fixed by the shop API.
pub const PAGE_SIZE: u32 = 10;

/// Ordering applied when the visitor picks none.
const DEFAULT_ORDERING: &str = "title";

/// Orderings the listing offers, as `(API value, label)`.
const ORDERINGS: &[(&str, &str)] = &[
    ("title", "Nazwa A-Z"),
    ("-title", "Nazwa Z-A"),
    ("unit_price", "Cena rosnąco"),
    ("-unit_price", "Cena malejąco"),
];

/// Product display data for templates.
#[derive(Clone)]
pub struct ProductView {
    pub id: ProductId,
    pub title: String,
    pub description: String,
    pub price: String,
    pub price_with_tax: String,
    pub collection: Option<String>,
    pub inventory: i32,
    pub available: bool,
    pub image: Option<String>,
    pub images: Vec<String>,
}

impl ProductView {
    /// Build the view, resolving image paths against the API host.
    #[must_use]
    pub fn new(product: &Product, api: &ApiClient) -> Self {
        let images: Vec<String> = product
            .images
            .iter()
            .map(|image| api.absolute_url(&image.image))
            .collect();

        Self {
            id: product.id,
            title: product.title.clone(),
            description: product.description.clone().unwrap_or_default(),
            price: Price::pln(product.unit_price).to_string(),
            price_with_tax: Price::pln(product.price_with_tax).to_string(),
            collection: product.collection.clone(),
            inventory: product.inventory,
            available: product.is_available(),
            image: images.first().cloned(),
            images,
        }
    }
}

/// Collection option for the filter dropdown.
#[derive(Clone)]
pub struct CollectionOption {
    pub id: CollectionId,
    pub title: String,
    pub selected: bool,
}

/// Ordering option for the sort dropdown.
#[derive(Clone)]
pub struct OrderingOption {
    pub value: &'static str,
    pub label: &'static str,
    pub selected: bool,
}

/// Listing query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub page: Option<u32>,
    pub search: Option<String>,
    pub collection_id: Option<String>,
    pub ordering: Option<String>,
}

impl ListQuery {
    /// Normalize into an API query; unknown values fall back to defaults.
    fn to_api_query(&self) -> ProductQuery {
        let search = self
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from);
        let collection_id = self
            .collection_id
            .as_deref()
            .and_then(|s| s.parse::<CollectionId>().ok());
        let ordering = self
            .ordering
            .as_deref()
            .filter(|o| ORDERINGS.iter().any(|(value, _)| value == o))
            .unwrap_or(DEFAULT_ORDERING);

        ProductQuery {
            page: Some(self.page.unwrap_or(1).max(1)),
            search,
            collection_id,
            ordering: Some(ordering.to_string()),
        }
    }
}

/// Link query string for a page of the current listing.
fn page_href(query: &ProductQuery, page: u32) -> String {
    let mut href = format!("/products?page={page}");
    if let Some(search) = &query.search {
        href.push_str("&search=");
        href.push_str(&urlencoding::encode(search));
    }
    if let Some(collection_id) = query.collection_id {
        href.push_str(&format!("&collection_id={collection_id}"));
    }
    if let Some(ordering) = &query.ordering {
        href.push_str("&ordering=");
        href.push_str(&urlencoding::encode(ordering));
    }
    href
}

fn total_pages(count: u32) -> u32 {
    count.div_ceil(PAGE_SIZE).max(1)
}

/// Product listing page template.
#[derive(Template, WebTemplate)]
#[template(path = "products/index.html")]
pub struct ProductsIndexTemplate {
    pub page: PageContext,
    pub products: Vec<ProductView>,
    pub collections: Vec<CollectionOption>,
    pub orderings: Vec<OrderingOption>,
    pub search: String,
    pub total_count: u32,
    pub current_page: u32,
    pub total_pages: u32,
    pub prev_href: Option<String>,
    pub next_href: Option<String>,
}

/// Product detail page template.
#[derive(Template, WebTemplate)]
#[template(path = "products/show.html")]
pub struct ProductShowTemplate {
    pub page: PageContext,
    pub product: ProductView,
}

/// Display product listing page.
#[instrument(skip(state, page))]
pub async fn index(
    State(state): State<AppState>,
    mut page: PageContext,
    Query(query): Query<ListQuery>,
) -> impl IntoResponse {
    let api_query = query.to_api_query();
    let current_page = api_query.page.unwrap_or(1);

    let (products, total_count) = match state.api().products(&api_query).await {
        Ok(result) => (
            result
                .results
                .iter()
                .map(|p| ProductView::new(p, state.api()))
                .collect(),
            result.count,
        ),
        Err(e) => {
            tracing::error!("Failed to fetch products: {e}");
            page.error("Nie udało się pobrać produktów.");
            (Vec::new(), 0)
        }
    };

    let collections = load_collections(state.api())
        .await
        .iter()
        .map(|c| CollectionOption {
            id: c.id,
            title: c.title.clone(),
            selected: api_query.collection_id == Some(c.id),
        })
        .collect();

    let orderings = ORDERINGS
        .iter()
        .map(|&(value, label)| OrderingOption {
            value,
            label,
            selected: api_query.ordering.as_deref() == Some(value),
        })
        .collect();

    let total_pages = total_pages(total_count);

    ProductsIndexTemplate {
        page,
        products,
        collections,
        orderings,
        search: api_query.search.clone().unwrap_or_default(),
        total_count,
        current_page,
        total_pages,
        prev_href: (current_page > 1).then(|| page_href(&api_query, current_page - 1)),
        next_href: (current_page < total_pages).then(|| page_href(&api_query, current_page + 1)),
    }
}

/// Collections for the filter; an empty list when they cannot be loaded.
pub(crate) async fn load_collections(api: &ApiClient) -> Vec<Collection> {
    api.collections().await.unwrap_or_else(|e| {
        tracing::warn!("Failed to fetch collections: {e}");
        Vec::new()
    })
}

/// Display product detail page.
///
/// # Errors
///
/// Returns 404 if the product does not exist.
#[instrument(skip(state, page))]
pub async fn show(
    State(state): State<AppState>,
    page: PageContext,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id: ProductId = id
        .parse()
        .map_err(|_| AppError::NotFound("Product not found".to_string()))?;

    let product = match state.api().product(id).await {
        Ok(product) => product,
        Err(ApiError::NotFound(_)) => {
            return Err(AppError::NotFound("Product not found".to_string()));
        }
        Err(e) => return Err(e.into()),
    };

    Ok(ProductShowTemplate {
        page,
        product: ProductView::new(&product, state.api()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_query_defaults() {
        let query = ListQuery::default().to_api_query();
        assert_eq!(query.page, Some(1));
        assert_eq!(query.search, None);
        assert_eq!(query.ordering.as_deref(), Some("title"));
    }

    #[test]
    fn test_list_query_drops_unknown_values() {
        let query = ListQuery {
            page: Some(0),
            search: Some("   ".to_string()),
            collection_id: Some("abc".to_string()),
            ordering: Some("inventory; drop".to_string()),
        }
        .to_api_query();
        assert_eq!(query.page, Some(1));
        assert_eq!(query.search, None);
        assert_eq!(query.collection_id, None);
        assert_eq!(query.ordering.as_deref(), Some("title"));
    }

    #[test]
    fn test_page_href_keeps_filters() {
        let query = ListQuery {
            page: Some(2),
            search: Some("kubek biały".to_string()),
            collection_id: Some("4".to_string()),
            ordering: Some("-unit_price".to_string()),
        }
        .to_api_query();
        assert_eq!(
            page_href(&query, 3),
            "/products?page=3&search=kubek%20bia%C5%82y&collection_id=4&ordering=-unit_price"
        );
    }

    #[test]
    fn test_total_pages() {
        assert_eq!(total_pages(0), 1);
        assert_eq!(total_pages(10), 1);
        assert_eq!(total_pages(11), 2);
    }
}
