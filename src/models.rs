use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Product {
    pub id: String,
    pub title: String,
    pub description: String,
    pub price: f64,
    pub image_url: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CartItem {
    pub product_id: String,
    pub quantity: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct Cart {
    pub items: Vec<CartItem>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct User {
    pub id: String,
    pub email: String,
    pub cart: Cart,
}

// Copy of the identifying user fields, stored on the order so later user
// changes do not alter order history.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OrderUser {
    pub user_id: String,
    pub email: String,
}

// Product copied by value at placement time, not referenced by id.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OrderItem {
    pub product: Product,
    pub quantity: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Order {
    pub id: String,
    pub user: OrderUser,
    pub items: Vec<OrderItem>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

// A cart entry with its product joined in.
#[derive(Debug, Serialize, Clone)]
pub struct ResolvedCartItem {
    pub product: Product,
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
pub struct AddToCartInput {
    pub product_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub page: Option<String>,
}
