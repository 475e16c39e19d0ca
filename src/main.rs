use std::sync::Arc;

use actix_web::{web, App, HttpServer};

mod cart;
mod catalog;
mod checkout;
mod config;
mod db;
mod error;
mod invoice;
mod middleware;
mod models;
mod orders;

use checkout::{PaymentGateway, StripeGateway};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok(); // Load environment variables from .env file
    env_logger::init(); // Initialize the logger

    let config = config::Config::from_env();

    // Connect to the MongoDB database
    let database = db::connect(&config).await;
    let users = database.collection::<models::User>("users");
    let products = database.collection::<models::Product>("products");
    let orders_col = database.collection::<models::Order>("orders");

    // One gateway for the whole server; handlers only see the trait.
    let gateway: Arc<dyn PaymentGateway> = Arc::new(StripeGateway::new(
        config.stripe_secret_key.clone(),
        config.stripe_api_base.clone(),
    ));

    let bind_addr = config.bind_addr.clone();
    log::info!("listening on {bind_addr}");

    // Start the Actix-web HTTP server
    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(users.clone()))
            .app_data(web::Data::new(products.clone()))
            .app_data(web::Data::new(orders_col.clone()))
            .app_data(web::Data::from(gateway.clone()))
            .app_data(web::Data::new(config.clone()))
            // Public catalog routes
            .route("/", web::get().to(catalog::list_products))
            .route("/products", web::get().to(catalog::list_products))
            .route("/products/{product_id}", web::get().to(catalog::get_product))
            .service(
                web::scope("")
                    .wrap(middleware::RequireAuth::new(config.jwt_secret.clone()))
                    .route("/cart", web::get().to(cart::get_cart))
                    .route("/cart", web::post().to(cart::post_cart))
                    .route("/cart/{product_id}", web::delete().to(cart::delete_cart_item))
                    .route("/checkout", web::get().to(checkout::get_checkout))
                    .route("/checkout/success", web::get().to(checkout::checkout_success))
                    .route("/checkout/cancel", web::get().to(checkout::checkout_cancel))
                    .route("/orders", web::post().to(orders::post_order))
                    .route("/orders", web::get().to(orders::get_orders))
                    .route("/orders/{order_id}/invoice", web::get().to(invoice::get_invoice)),
            )
    })
    .bind(bind_addr)?
    .run()
    .await
}
