use std::collections::HashMap;

use actix_web::http::header;
use actix_web::{web, HttpRequest, HttpResponse};
use futures::stream::StreamExt;
use mongodb::bson::{doc, to_bson};
use mongodb::Collection;

use crate::error::{Result, ShopError};
use crate::middleware::CurrentUser;
use crate::models::{AddToCartInput, Cart, CartItem, Product, ResolvedCartItem, User};

// Concurrent mutations of the same cart are last-write-wins; the store
// gives per-document atomicity and nothing more.

pub fn add_item(cart: &mut Cart, product_id: &str) {
    if let Some(item) = cart
        .items
        .iter_mut()
        .find(|item| item.product_id == product_id)
    {
        item.quantity += 1;
    } else {
        cart.items.push(CartItem {
            product_id: product_id.to_string(),
            quantity: 1,
        });
    }
}

// Removing an id that is not in the cart is a no-op.
pub fn remove_item(cart: &mut Cart, product_id: &str) {
    cart.items.retain(|item| item.product_id != product_id);
}

pub fn clear(cart: &mut Cart) {
    cart.items.clear();
}

pub async fn persist_cart(users: &Collection<User>, user: &User) -> Result<()> {
    users
        .update_one(
            doc! {"id": &user.id},
            doc! {"$set": {"cart": to_bson(&user.cart)?}},
            None,
        )
        .await?;
    Ok(())
}

// Joins the product documents into the cart entries. Entries whose product
// has vanished from the catalog are dropped.
pub async fn resolve_cart(
    products: &Collection<Product>,
    cart: &Cart,
) -> Result<Vec<ResolvedCartItem>> {
    let ids: Vec<String> = cart
        .items
        .iter()
        .map(|item| item.product_id.clone())
        .collect();

    let mut by_id = HashMap::new();
    let mut cursor = products.find(doc! {"id": {"$in": ids}}, None).await?;
    while let Some(product) = cursor.next().await {
        let product = product?;
        by_id.insert(product.id.clone(), product);
    }

    let mut resolved = Vec::with_capacity(cart.items.len());
    for item in &cart.items {
        match by_id.get(&item.product_id) {
            Some(product) => resolved.push(ResolvedCartItem {
                product: product.clone(),
                quantity: item.quantity,
            }),
            None => log::warn!("dropping cart entry for missing product {}", item.product_id),
        }
    }
    Ok(resolved)
}

pub async fn get_cart(
    products: web::Data<Collection<Product>>,
    user: CurrentUser,
) -> Result<HttpResponse> {
    let items = resolve_cart(products.get_ref(), &user.0.cart).await?;
    Ok(HttpResponse::Ok().json(items))
}

pub async fn post_cart(
    users: web::Data<Collection<User>>,
    products: web::Data<Collection<Product>>,
    user: CurrentUser,
    input: web::Json<AddToCartInput>,
) -> Result<HttpResponse> {
    let mut user = user.0;

    // The product must still exist before the cart references it.
    let product = products
        .find_one(doc! {"id": &input.product_id}, None)
        .await?
        .ok_or(ShopError::ProductNotFound)?;

    add_item(&mut user.cart, &product.id);
    persist_cart(users.get_ref(), &user).await?;

    Ok(HttpResponse::SeeOther()
        .insert_header((header::LOCATION, "/cart"))
        .finish())
}

pub async fn delete_cart_item(
    users: web::Data<Collection<User>>,
    user: CurrentUser,
    product_id: web::Path<String>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    if req.headers().get("csrf-token").is_none() {
        return Err(ShopError::MissingCsrfToken);
    }

    let mut user = user.0;
    remove_item(&mut user.cart, &product_id.into_inner());
    persist_cart(users.get_ref(), &user).await?;

    Ok(HttpResponse::SeeOther()
        .insert_header((header::LOCATION, "/cart"))
        .finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adding_the_same_product_twice_bumps_the_quantity() {
        let mut cart = Cart::default();
        add_item(&mut cart, "p-1");
        add_item(&mut cart, "p-1");

        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.items[0].product_id, "p-1");
        assert_eq!(cart.items[0].quantity, 2);
    }

    #[test]
    fn different_products_get_their_own_entries() {
        let mut cart = Cart::default();
        add_item(&mut cart, "p-1");
        add_item(&mut cart, "p-2");
        add_item(&mut cart, "p-1");

        assert_eq!(cart.items.len(), 2);
        assert_eq!(cart.items[0].quantity, 2);
        assert_eq!(cart.items[1].quantity, 1);
    }

    #[test]
    fn removing_an_absent_product_is_a_no_op() {
        let mut cart = Cart::default();
        add_item(&mut cart, "p-1");
        let before = cart.clone();

        remove_item(&mut cart, "p-404");
        assert_eq!(cart, before);
    }

    #[test]
    fn removing_a_present_product_deletes_the_whole_entry() {
        let mut cart = Cart::default();
        add_item(&mut cart, "p-1");
        add_item(&mut cart, "p-1");
        add_item(&mut cart, "p-2");

        remove_item(&mut cart, "p-1");
        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.items[0].product_id, "p-2");
    }

    #[test]
    fn clearing_empties_the_cart() {
        let mut cart = Cart::default();
        add_item(&mut cart, "p-1");
        add_item(&mut cart, "p-2");

        clear(&mut cart);
        assert!(cart.items.is_empty());
    }
}
