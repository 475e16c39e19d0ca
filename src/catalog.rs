use actix_web::{web, HttpResponse};
use futures::stream::StreamExt;
use mongodb::bson::doc;
use mongodb::options::FindOptions;
use mongodb::Collection;
use serde::Serialize;

use crate::error::{Result, ShopError};
use crate::models::{ListQuery, Product};

pub const ITEMS_PER_PAGE: u64 = 2;

#[derive(Debug, Serialize, PartialEq)]
pub struct PageMeta {
    pub total: u64,
    pub current_page: u64,
    pub has_next_page: bool,
    pub has_previous_page: bool,
    pub next_page: u64,
    pub previous_page: u64,
    pub last_page: u64,
}

pub fn page_meta(page: u64, per_page: u64, total: u64) -> PageMeta {
    PageMeta {
        total,
        current_page: page,
        has_next_page: per_page * page < total,
        has_previous_page: page > 1,
        next_page: page + 1,
        previous_page: page.saturating_sub(1),
        last_page: total.div_ceil(per_page),
    }
}

// Anything that does not parse to an integer >= 1 falls back to page 1.
pub fn parse_page(raw: Option<&str>) -> u64 {
    raw.and_then(|s| s.parse::<u64>().ok())
        .filter(|page| *page >= 1)
        .unwrap_or(1)
}

#[derive(Debug, Serialize)]
pub struct ProductPage {
    pub products: Vec<Product>,
    #[serde(flatten)]
    pub meta: PageMeta,
}

pub async fn list_products(
    products: web::Data<Collection<Product>>,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse> {
    let page = parse_page(query.page.as_deref());

    // The count and the page fetch are two separate store calls; the window
    // may shift in between.
    let total = products.count_documents(None, None).await?;

    let options = FindOptions::builder()
        .limit(ITEMS_PER_PAGE as i64)
        .skip((page - 1) * ITEMS_PER_PAGE)
        .build();
    let mut cursor = products.find(None, options).await?;

    let mut items = vec![];
    while let Some(product) = cursor.next().await {
        items.push(product?);
    }

    Ok(HttpResponse::Ok().json(ProductPage {
        products: items,
        meta: page_meta(page, ITEMS_PER_PAGE, total),
    }))
}

pub async fn get_product(
    products: web::Data<Collection<Product>>,
    product_id: web::Path<String>,
) -> Result<HttpResponse> {
    let product = products
        .find_one(doc! {"id": &product_id.into_inner()}, None)
        .await?
        .ok_or(ShopError::ProductNotFound)?;
    Ok(HttpResponse::Ok().json(product))
}
