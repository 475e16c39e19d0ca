use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub database_url: String,
    pub database_name: String,
    pub jwt_secret: String,
    pub stripe_secret_key: String,
    pub stripe_api_base: String,
    pub checkout_success_url: String,
    pub checkout_cancel_url: String,
    pub invoice_dir: PathBuf,
    pub currency: String,
}

impl Config {
    // Resolved once at startup; everything downstream receives an explicit
    // handle instead of reading the environment itself.
    pub fn from_env() -> Config {
        Config {
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string()),
            database_url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
            database_name: env::var("DATABASE_NAME").unwrap_or_else(|_| "shop".to_string()),
            jwt_secret: env::var("JWT_SECRET").expect("JWT_SECRET must be set"),
            stripe_secret_key: env::var("STRIPE_SECRET_KEY").expect("STRIPE_SECRET_KEY must be set"),
            stripe_api_base: env::var("STRIPE_API_BASE")
                .unwrap_or_else(|_| "https://api.stripe.com".to_string()),
            checkout_success_url: env::var("CHECKOUT_SUCCESS_URL")
                .unwrap_or_else(|_| "http://localhost:8080/checkout/success".to_string()),
            checkout_cancel_url: env::var("CHECKOUT_CANCEL_URL")
                .unwrap_or_else(|_| "http://localhost:8080/checkout/cancel".to_string()),
            invoice_dir: env::var("INVOICE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data/invoices")),
            currency: env::var("CURRENCY").unwrap_or_else(|_| "usd".to_string()),
        }
    }
}
