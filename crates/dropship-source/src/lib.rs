//! Marketplace source adapters.
//!
//! [`AliExpressClient`] talks to the product-detail HTTP endpoint;
//! [`SimulatedSource`] returns a canned listing for any id and is used when
//! no marketplace credentials are configured.

pub mod client;
pub mod error;
pub mod normalize;
pub mod simulated;
pub mod types;

pub use client::AliExpressClient;
pub use error::SourceError;
pub use normalize::{first_product, normalize_product};
pub use simulated::SimulatedSource;
pub use types::{AliProduct, AliSkuInfo, ProductDetailEnvelope};
