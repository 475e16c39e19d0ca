use actix_web::http::header;
use actix_web::{web, HttpResponse};
use async_trait::async_trait;
use mongodb::Collection;
use serde::{Deserialize, Serialize};

use crate::cart;
use crate::config::Config;
use crate::error::{Result, ShopError};
use crate::middleware::CurrentUser;
use crate::models::{Order, Product, ResolvedCartItem, User};
use crate::orders;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CheckoutLineItem {
    pub name: String,
    pub description: String,
    pub amount: i64,
    pub currency: String,
    pub quantity: u32,
}

// Line items in the processor's shape, unit amounts in minor currency
// units. Also returns the cart total in major units.
pub fn build_line_items(
    items: &[ResolvedCartItem],
    currency: &str,
) -> (Vec<CheckoutLineItem>, f64) {
    let mut total = 0.0;
    let line_items = items
        .iter()
        .map(|item| {
            total += item.quantity as f64 * item.product.price;
            CheckoutLineItem {
                name: item.product.title.clone(),
                description: item.product.description.clone(),
                amount: (item.product.price * 100.0).round() as i64,
                currency: currency.to_string(),
                quantity: item.quantity,
            }
        })
        .collect();
    (line_items, total)
}

// One call: hand over the line items and the redirect targets, get an
// opaque session id back.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_checkout_session(
        &self,
        line_items: &[CheckoutLineItem],
        success_url: &str,
        cancel_url: &str,
    ) -> Result<String>;
}

pub struct StripeGateway {
    http: reqwest::Client,
    secret_key: String,
    api_base: String,
}

impl StripeGateway {
    pub fn new(secret_key: String, api_base: String) -> StripeGateway {
        StripeGateway {
            http: reqwest::Client::new(),
            secret_key,
            api_base,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    id: String,
}

// The checkout sessions endpoint takes form-encoded, indexed fields.
pub fn session_form(
    line_items: &[CheckoutLineItem],
    success_url: &str,
    cancel_url: &str,
) -> Vec<(String, String)> {
    let mut form = vec![
        ("payment_method_types[]".to_string(), "card".to_string()),
        ("success_url".to_string(), success_url.to_string()),
        ("cancel_url".to_string(), cancel_url.to_string()),
    ];
    for (i, item) in line_items.iter().enumerate() {
        form.push((format!("line_items[{i}][name]"), item.name.clone()));
        form.push((format!("line_items[{i}][description]"), item.description.clone()));
        form.push((format!("line_items[{i}][amount]"), item.amount.to_string()));
        form.push((format!("line_items[{i}][currency]"), item.currency.clone()));
        form.push((format!("line_items[{i}][quantity]"), item.quantity.to_string()));
    }
    form
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_checkout_session(
        &self,
        line_items: &[CheckoutLineItem],
        success_url: &str,
        cancel_url: &str,
    ) -> Result<String> {
        let url = format!("{}/v1/checkout/sessions", self.api_base);
        let form = session_form(line_items, success_url, cancel_url);

        let session: SessionResponse = self
            .http
            .post(url)
            .bearer_auth(&self.secret_key)
            .form(&form)
            .send()
            .await
            .map_err(|err| ShopError::Payment(err.to_string()))?
            .error_for_status()
            .map_err(|err| ShopError::Payment(err.to_string()))?
            .json()
            .await
            .map_err(|err| ShopError::Payment(err.to_string()))?;

        Ok(session.id)
    }
}

#[derive(Debug, Serialize)]
pub struct CheckoutPage {
    pub products: Vec<ResolvedCartItem>,
    pub total: f64,
    pub session_id: String,
}

pub async fn get_checkout(
    products: web::Data<Collection<Product>>,
    gateway: web::Data<dyn PaymentGateway>,
    config: web::Data<Config>,
    user: CurrentUser,
) -> Result<HttpResponse> {
    let items = cart::resolve_cart(products.get_ref(), &user.0.cart).await?;
    let (line_items, total) = build_line_items(&items, &config.currency);

    // An empty cart still opens a session; the processor decides what to do
    // with zero line items.
    let session_id = gateway
        .create_checkout_session(
            &line_items,
            &config.checkout_success_url,
            &config.checkout_cancel_url,
        )
        .await?;

    Ok(HttpResponse::Ok().json(CheckoutPage {
        products: items,
        total,
        session_id,
    }))
}

pub async fn checkout_success(
    users: web::Data<Collection<User>>,
    products: web::Data<Collection<Product>>,
    orders_col: web::Data<Collection<Order>>,
    user: CurrentUser,
) -> Result<HttpResponse> {
    let mut user = user.0;
    orders::place_order(
        users.get_ref(),
        products.get_ref(),
        orders_col.get_ref(),
        &mut user,
    )
    .await?;

    Ok(HttpResponse::SeeOther()
        .insert_header((header::LOCATION, "/orders"))
        .finish())
}

pub async fn checkout_cancel() -> HttpResponse {
    HttpResponse::SeeOther()
        .insert_header((header::LOCATION, "/checkout"))
        .finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Product;

    fn resolved(title: &str, price: f64, quantity: u32) -> ResolvedCartItem {
        ResolvedCartItem {
            product: Product {
                id: format!("p-{title}"),
                title: title.to_string(),
                description: format!("{title} description"),
                price,
                image_url: format!("/images/{title}.png"),
            },
            quantity,
        }
    }

    #[test]
    fn totals_sum_quantity_times_price() {
        let items = [resolved("a", 10.0, 2), resolved("b", 5.5, 1)];
        let (line_items, total) = build_line_items(&items, "usd");

        assert_eq!(total, 25.5);
        assert_eq!(line_items.len(), 2);
        assert_eq!(line_items[0].amount, 1000);
        assert_eq!(line_items[0].quantity, 2);
        assert_eq!(line_items[1].amount, 550);
        assert_eq!(line_items[1].currency, "usd");
    }

    #[test]
    fn cents_conversion_rounds_instead_of_truncating() {
        let items = [resolved("book", 19.99, 1)];
        let (line_items, _) = build_line_items(&items, "usd");
        assert_eq!(line_items[0].amount, 1999);
    }

    #[test]
    fn an_empty_cart_builds_an_empty_session_request() {
        let (line_items, total) = build_line_items(&[], "usd");
        assert!(line_items.is_empty());
        assert_eq!(total, 0.0);

        let form = session_form(&line_items, "http://s", "http://c");
        assert_eq!(
            form,
            vec![
                ("payment_method_types[]".to_string(), "card".to_string()),
                ("success_url".to_string(), "http://s".to_string()),
                ("cancel_url".to_string(), "http://c".to_string()),
            ]
        );
    }

    #[test]
    fn session_form_indexes_every_line_item() {
        let items = [resolved("a", 10.0, 2), resolved("b", 5.5, 1)];
        let (line_items, _) = build_line_items(&items, "usd");
        let form = session_form(&line_items, "http://s", "http://c");

        assert!(form.contains(&("line_items[0][name]".to_string(), "a".to_string())));
        assert!(form.contains(&("line_items[0][amount]".to_string(), "1000".to_string())));
        assert!(form.contains(&("line_items[1][quantity]".to_string(), "1".to_string())));
        // 3 fixed fields plus 5 per line item
        assert_eq!(form.len(), 3 + 2 * 5);
    }

    struct StubGateway;

    #[async_trait]
    impl PaymentGateway for StubGateway {
        async fn create_checkout_session(
            &self,
            _line_items: &[CheckoutLineItem],
            _success_url: &str,
            _cancel_url: &str,
        ) -> Result<String> {
            Ok("cs_test_123".to_string())
        }
    }

    #[actix_web::test]
    async fn the_gateway_is_swappable_behind_the_trait() {
        let gateway: std::sync::Arc<dyn PaymentGateway> = std::sync::Arc::new(StubGateway);
        let session_id = gateway
            .create_checkout_session(&[], "http://s", "http://c")
            .await
            .expect("stub session");
        assert_eq!(session_id, "cs_test_123");
    }
}
