//! Product route handlers.
//!
//! Listings are public. A signed-in customer sees their own price list;
//! guests see the default consumer list.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::{
        HeaderValue,
        header::{CACHE_CONTROL, CONTENT_TYPE},
    },
    response::{IntoResponse, Response},
};
use tsh_core::ItemId;

use crate::catalog::{ProductDetail, ProductPage, ProductQuery};
use crate::error::Result;
use crate::middleware::OptionalCustomer;
use crate::state::AppState;

/// Browser cache lifetime for product images.
const IMAGE_CACHE_CONTROL: &str = "public, max-age=3600";

/// List products.
pub async fn index(
    State(state): State<AppState>,
    OptionalCustomer(viewer): OptionalCustomer,
    Query(query): Query<ProductQuery>,
) -> Result<Json<ProductPage>> {
    let page = state
        .catalog()
        .list(&query, viewer.as_ref().map(|c| &c.id))
        .await?;
    Ok(Json(page))
}

/// Product detail.
pub async fn show(
    State(state): State<AppState>,
    OptionalCustomer(viewer): OptionalCustomer,
    Path(id): Path<ItemId>,
) -> Result<Json<ProductDetail>> {
    let product = state
        .catalog()
        .product(&id, viewer.as_ref().map(|c| &c.id))
        .await?;
    Ok(Json(product))
}

/// Product image proxied from Inventory.
pub async fn image(State(state): State<AppState>, Path(id): Path<ItemId>) -> Result<Response> {
    let image = state.catalog().image(&id).await?;

    let content_type = HeaderValue::from_str(&image.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    Ok((
        [
            (CONTENT_TYPE, content_type),
            (CACHE_CONTROL, HeaderValue::from_static(IMAGE_CACHE_CONTROL)),
        ],
        image.bytes,
    )
        .into_response())
}
