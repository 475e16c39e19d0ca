use actix_web::http::header;
use actix_web::{web, HttpResponse};
use chrono::Utc;
use futures::stream::StreamExt;
use mongodb::bson::doc;
use mongodb::Collection;
use uuid::Uuid;

use crate::cart;
use crate::error::Result;
use crate::middleware::CurrentUser;
use crate::models::{Order, OrderItem, OrderUser, Product, ResolvedCartItem, User};

// Value-copies of the joined products; later catalog edits must not touch
// order history.
pub fn snapshot_items(items: &[ResolvedCartItem]) -> Vec<OrderItem> {
    items
        .iter()
        .map(|item| OrderItem {
            product: item.product.clone(),
            quantity: item.quantity,
        })
        .collect()
}

pub fn build_order(user: &User, items: Vec<OrderItem>) -> Order {
    Order {
        id: Uuid::new_v4().to_string(),
        user: OrderUser {
            user_id: user.id.clone(),
            email: user.email.clone(),
        },
        items,
        created_at: Utc::now(),
    }
}

// The cart is cleared only after the order write is acknowledged. A failed
// insert leaves the cart untouched; a failed clear after a successful
// insert is surfaced and leaves the known duplicate-order risk.
pub async fn place_order(
    users: &Collection<User>,
    products: &Collection<Product>,
    orders: &Collection<Order>,
    user: &mut User,
) -> Result<Order> {
    let items = cart::resolve_cart(products, &user.cart).await?;
    let order = build_order(user, snapshot_items(&items));

    orders.insert_one(&order, None).await?;

    cart::clear(&mut user.cart);
    cart::persist_cart(users, user).await?;

    Ok(order)
}

pub async fn list_orders(orders: &Collection<Order>, user: &User) -> Result<Vec<Order>> {
    let mut cursor = orders.find(doc! {"user.user_id": &user.id}, None).await?;
    let mut result = vec![];
    while let Some(order) = cursor.next().await {
        result.push(order?);
    }
    Ok(result)
}

pub async fn post_order(
    users: web::Data<Collection<User>>,
    products: web::Data<Collection<Product>>,
    orders: web::Data<Collection<Order>>,
    user: CurrentUser,
) -> Result<HttpResponse> {
    let mut user = user.0;
    place_order(users.get_ref(), products.get_ref(), orders.get_ref(), &mut user).await?;

    Ok(HttpResponse::SeeOther()
        .insert_header((header::LOCATION, "/orders"))
        .finish())
}

pub async fn get_orders(
    orders: web::Data<Collection<Order>>,
    user: CurrentUser,
) -> Result<HttpResponse> {
    let result = list_orders(orders.get_ref(), &user.0).await?;
    Ok(HttpResponse::Ok().json(result))
}
