//! Purchasable products and the texts that advertise them.

use serde::{Deserialize, Serialize};

use crate::config::LedgerConfig;

/// Currency code of every offer price.
pub const CURRENCY: &str = "XTR";

/// Payload code of the credit pack.
pub const CREDIT_PACK_CODE: &str = "pro-pack-credits";

/// Payload code of the subscription.
pub const SUBSCRIPTION_CODE: &str = "premium-30d";

/// Products the ledger knows how to fulfil.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Product {
    /// One-time answer credits
    CreditPack,
    /// Time-boxed premium subscription
    Subscription,
}

impl Product {
    pub const ALL: [Product; 2] = [Product::CreditPack, Product::Subscription];

    pub fn code(&self) -> &'static str {
        match self {
            Product::CreditPack => CREDIT_PACK_CODE,
            Product::Subscription => SUBSCRIPTION_CODE,
        }
    }

    /// Resolve a payment payload. Unknown codes yield `None`.
    pub fn from_code(code: &str) -> Option<Product> {
        Product::ALL.into_iter().find(|p| p.code() == code)
    }

    pub fn price_usd(&self, config: &LedgerConfig) -> f64 {
        match self {
            Product::CreditPack => config.credit_pack_price_usd,
            Product::Subscription => config.subscription_price_usd,
        }
    }
}

/// Price in minor units of [`CURRENCY`].
pub fn stars_from_usd(usd: f64) -> u64 {
    let stars = (usd * 100.0).round();
    if stars.is_finite() && stars > 0.0 {
        stars as u64
    } else {
        0
    }
}

/// An invoice the transport can present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub product: Product,
    pub code: String,
    pub title: String,
    pub description: String,
    pub label: String,
    pub price_usd: f64,
    /// Price in minor units
    pub amount: u64,
    pub currency: String,
}

impl Offer {
    pub fn new(product: Product, config: &LedgerConfig) -> Self {
        let price_usd = product.price_usd(config);
        let (title, description, label) = match product {
            Product::CreditPack => (
                format!("Pro Pack (+{} answers)", config.credit_pack_size),
                format!(
                    "One-time credits. Adds +{} answers to your balance.",
                    config.credit_pack_size
                ),
                "Pro Pack",
            ),
            Product::Subscription => (
                format!("Premium ({} days)", config.subscription_days),
                format!(
                    "Unlimited* answers for {} days. *Fair-use: {}/day.",
                    config.subscription_days, config.fair_use_daily_cap
                ),
                "Premium",
            ),
        };

        Self {
            product,
            code: product.code().to_string(),
            title,
            description,
            label: label.to_string(),
            price_usd,
            amount: stars_from_usd(price_usd),
            currency: CURRENCY.to_string(),
        }
    }
}

/// Every offer, credit pack first.
pub fn catalog(config: &LedgerConfig) -> Vec<Offer> {
    Product::ALL.iter().map(|p| Offer::new(*p, config)).collect()
}

/// Purchase options shown when the quota is exhausted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpsellOffer {
    pub message: String,
    pub offers: Vec<Offer>,
}

impl UpsellOffer {
    pub fn new(config: &LedgerConfig) -> Self {
        Self {
            message: format!(
                "You've reached your limit.\n\
                 • Pro Pack: +{} answers for ${:.2}\n\
                 • Premium: unlimited* for ${:.2}/month\n\
                 *Fair-use: {}/day.",
                config.credit_pack_size,
                config.credit_pack_price_usd,
                config.subscription_price_usd,
                config.fair_use_daily_cap
            ),
            offers: catalog(config),
        }
    }
}

/// Plan summary used by the welcome and help texts.
pub fn plans_summary(config: &LedgerConfig) -> String {
    format!(
        "• Free: {} answers per day\n\
         • Pro Pack: +{} answers for ${:.2}\n\
         • Premium: unlimited* for ${:.2}/month\n\
         *Fair-use: up to {}/day.",
        config.free_daily_limit,
        config.credit_pack_size,
        config.credit_pack_price_usd,
        config.subscription_price_usd,
        config.fair_use_daily_cap
    )
}
