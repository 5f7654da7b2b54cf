//! Tasklane Web Push
//!
//! Delivers reminder notifications to browser push services:
//! - `encrypt`: RFC 8291 message encryption (`aes128gcm` content coding)
//! - `vapid`: RFC 8292 application server identification (ES256 JWT)
//! - `client`: HTTP delivery and status classification
//!
//! Background jobs depend on the `PushTransport` trait only, so tests can
//! swap in an in-process double.

pub mod client;
pub mod encrypt;
pub mod error;
pub mod vapid;

use std::future::Future;

use tasklane_types::models::{NotificationPayload, PushSubscription};

pub use client::WebPushClient;
pub use error::PushError;
pub use vapid::VapidSigner;

pub trait PushTransport: Send + Sync + 'static {
    /// Deliver one payload to one subscription.
    fn send(
        &self,
        subscription: &PushSubscription,
        payload: &NotificationPayload,
    ) -> impl Future<Output = Result<(), PushError>> + Send;
}
