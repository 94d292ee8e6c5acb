//! Request signing for webhook deliveries.
//!
//! Receivers recompute the HMAC over the raw body with their endpoint
//! secret and compare against the `X-Signature` header.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Value for the `X-Signature` header: `sha256=<hex>` of the HMAC-SHA256
/// over the request body, keyed with the endpoint's secret.
pub fn signature_header(secret: &str, body: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(body.as_bytes());
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}
