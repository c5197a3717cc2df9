//! Home page route handler.

use askama::Template;
use askama_web::WebTemplate;
use axum::{extract::State, response::IntoResponse};
use tracing::instrument;

use crate::api::ProductQuery;
use crate::filters;
use crate::routes::PageContext;
use crate::routes::collections::CollectionView;
use crate::routes::products::{ProductView, load_collections};
use crate::state::AppState;

/// Number of products shown on the home page.
const FEATURED_PRODUCTS: usize = 8;

/// Home page template.
#[derive(Template, WebTemplate)]
#[template(path = "home.html")]
pub struct HomeTemplate {
    pub page: PageContext,
    pub featured_products: Vec<ProductView>,
    pub collections: Vec<CollectionView>,
}

/// Display the home page.
#[instrument(skip(state, page))]
pub async fn home(State(state): State<AppState>, page: PageContext) -> impl IntoResponse {
    let query = ProductQuery {
        ordering: Some("-unit_price".to_string()),
        ..ProductQuery::default()
    };

    let (products, collections) =
        tokio::join!(state.api().products(&query), load_collections(state.api()));

    let featured_products = products.map_or_else(
        |e| {
            tracing::error!("Failed to fetch featured products: {e}");
            Vec::new()
        },
        |page| {
            page.results
                .iter()
                .filter(|p| p.is_available())
                .take(FEATURED_PRODUCTS)
                .map(|p| ProductView::new(p, state.api()))
                .collect()
        },
    );

    HomeTemplate {
        page,
        featured_products,
        collections: collections.iter().map(CollectionView::from).collect(),
    }
}
