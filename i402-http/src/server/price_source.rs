//! Price sources for the payment gate.
//!
//! A route is priced either with a fixed [`StaticPrice`] or per request with a
//! [`DynamicPrice`] callback. Resolution is infallible and awaited once per
//! request; a negative result is rejected by the gate.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use http::{HeaderMap, Uri};
use i402::Decimal;

/// Trait for types that can price a request.
pub trait PriceSource: Clone + Send + Sync + 'static {
    /// Resolves the price for the given request context.
    fn resolve(&self, headers: &HeaderMap, uri: &Uri) -> impl Future<Output = Decimal> + Send;
}

/// Same price for every request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StaticPrice(Decimal);

impl StaticPrice {
    /// Creates a fixed price.
    #[must_use]
    pub const fn new(price: Decimal) -> Self {
        Self(price)
    }

    /// Returns the fixed price.
    #[must_use]
    pub const fn price(&self) -> Decimal {
        self.0
    }
}

impl PriceSource for StaticPrice {
    async fn resolve(&self, _headers: &HeaderMap, _uri: &Uri) -> Decimal {
        self.0
    }
}

type BoxedPriceCallback = dyn for<'a> Fn(&'a HeaderMap, &'a Uri) -> Pin<Box<dyn Future<Output = Decimal> + Send + 'a>>
    + Send
    + Sync;

/// Price computed per request by a callback.
pub struct DynamicPrice {
    callback: Arc<BoxedPriceCallback>,
}

impl Clone for DynamicPrice {
    fn clone(&self) -> Self {
        Self {
            callback: Arc::clone(&self.callback),
        }
    }
}

impl std::fmt::Debug for DynamicPrice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicPrice")
            .field("callback", &"<callback>")
            .finish()
    }
}

impl DynamicPrice {
    /// Creates a dynamic price source from an async closure.
    pub fn new<F, Fut>(callback: F) -> Self
    where
        F: Fn(&HeaderMap, &Uri) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Decimal> + Send + 'static,
    {
        Self {
            callback: Arc::new(move |headers, uri| Box::pin(callback(headers, uri))),
        }
    }
}

impl PriceSource for DynamicPrice {
    async fn resolve(&self, headers: &HeaderMap, uri: &Uri) -> Decimal {
        (self.callback)(headers, uri).await
    }
}
