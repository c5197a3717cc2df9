//! Collection route handlers.
//!
//! Collections have no page of their own; a collection link opens the product
//! listing filtered to it.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Path, State},
    response::{IntoResponse, Redirect},
};
use tracing::instrument;

use myshop_core::CollectionId;

use crate::api::{ApiError, Collection};
use crate::error::AppError;
use crate::filters;
use crate::routes::PageContext;
use crate::state::AppState;

/// Collection display data for templates.
#[derive(Clone)]
pub struct CollectionView {
    pub id: CollectionId,
    pub title: String,
    pub products_count: u32,
    pub href: String,
}

impl From<&Collection> for CollectionView {
    fn from(collection: &Collection) -> Self {
        Self {
            id: collection.id,
            title: collection.title.clone(),
            products_count: collection.products_count,
            href: format!("/products?collection_id={}", collection.id),
        }
    }
}

/// Collection listing page template.
#[derive(Template, WebTemplate)]
#[template(path = "collections/index.html")]
pub struct CollectionsIndexTemplate {
    pub page: PageContext,
    pub collections: Vec<CollectionView>,
}

/// Display all collections.
#[instrument(skip(state, page))]
pub async fn index(State(state): State<AppState>, mut page: PageContext) -> impl IntoResponse {
    let collections = match state.api().collections().await {
        Ok(collections) => collections.iter().map(CollectionView::from).collect(),
        Err(e) => {
            tracing::error!("Failed to fetch collections: {e}");
            page.error("Nie udało się pobrać kolekcji.");
            Vec::new()
        }
    };

    CollectionsIndexTemplate { page, collections }
}

/// Open the product listing filtered to one collection.
///
/// # Errors
///
/// Returns 404 if the collection does not exist.
#[instrument(skip(state))]
pub async fn show(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Redirect, AppError> {
    let id: CollectionId = id
        .parse()
        .map_err(|_| AppError::NotFound("Collection not found".to_string()))?;

    match state.api().collection(id).await {
        Ok(collection) => Ok(Redirect::to(&CollectionView::from(&collection).href)),
        Err(ApiError::NotFound(_)) => Err(AppError::NotFound("Collection not found".to_string())),
        Err(e) => Err(e.into()),
    }
}
