//! Tower middleware for gating routes behind Interledger payments.
//!
//! Create one [`PayMiddleware`] per application from a shared
//! [`PaymentGate`] and build a layer per route:
//!
//! - **[`PayMiddleware::announce`]** advertises the price and a fresh payment
//!   destination on every response. The route always runs.
//! - **[`PayMiddleware::enforce`]** debits the presented `Pay-Token` before the
//!   route runs and answers `402 Payment Required` when it cannot.
//! - **[`PayMiddleware::with_dynamic_price`]** prices each request with a
//!   callback; pick the mode with [`PayLayer::announce`] or
//!   [`PayLayer::enforce`].
//! - **[`PayLayer::optional`]** lets enforced requests through unpaid. The
//!   route finds `paid: false` in the [`GateDecision`](i402::GateDecision)
//!   request extension.
//!
//! Routes priced at zero bypass the gate entirely and see no decision.

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum_core::extract::Request;
use axum_core::response::Response;
use http::{HeaderMap, Uri};
use i402::{Decimal, GatePolicy, PaymentGate, Transport};
use tower::util::BoxCloneSyncService;
use tower::{Layer, Service};

use super::paygate::Paygate;
use super::price_source::{DynamicPrice, PriceSource, StaticPrice};

/// Which of the two gate behaviors a layer applies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GateMode {
    /// Advertise payment details without blocking.
    Announce,
    /// Require payment before the route runs.
    #[default]
    Enforce,
}

/// Entry point for building payment layers over one shared gate.
pub struct PayMiddleware<T> {
    gate: Arc<PaymentGate<T>>,
}

impl<T> Clone for PayMiddleware<T> {
    fn clone(&self) -> Self {
        Self {
            gate: Arc::clone(&self.gate),
        }
    }
}

impl<T> std::fmt::Debug for PayMiddleware<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayMiddleware")
            .field("gate", &self.gate)
            .finish()
    }
}

impl<T> PayMiddleware<T> {
    /// Wraps a gate.
    #[must_use]
    pub fn new(gate: PaymentGate<T>) -> Self {
        Self::from_shared(Arc::new(gate))
    }

    /// Wraps a gate that is also used elsewhere, e.g. by the RPC router.
    #[must_use]
    pub const fn from_shared(gate: Arc<PaymentGate<T>>) -> Self {
        Self { gate }
    }

    /// Returns the shared gate.
    #[must_use]
    pub const fn gate(&self) -> &Arc<PaymentGate<T>> {
        &self.gate
    }

    /// Builds an announce-mode layer with a fixed price.
    ///
    /// The layer only adds payment headers; the route picks the status, which
    /// for a pure price query is normally `204 No Content`.
    #[must_use]
    pub fn announce(&self, price: Decimal) -> PayLayer<StaticPrice, T> {
        self.layer(StaticPrice::new(price), GateMode::Announce)
    }

    /// Builds an enforce-mode layer with a fixed price.
    #[must_use]
    pub fn enforce(&self, price: Decimal) -> PayLayer<StaticPrice, T> {
        self.layer(StaticPrice::new(price), GateMode::Enforce)
    }

    /// Builds an enforce-mode layer that prices each request with `callback`.
    ///
    /// The `callback` receives request headers and URI and returns the price.
    #[must_use]
    pub fn with_dynamic_price<F, Fut>(&self, callback: F) -> PayLayer<DynamicPrice, T>
    where
        F: Fn(&HeaderMap, &Uri) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Decimal> + Send + 'static,
    {
        self.layer(DynamicPrice::new(callback), GateMode::Enforce)
    }

    fn layer<TSource>(&self, price_source: TSource, mode: GateMode) -> PayLayer<TSource, T> {
        PayLayer {
            gate: Arc::clone(&self.gate),
            price_source,
            mode,
            policy: GatePolicy::default(),
        }
    }
}

/// Layer applying the payment gate to a route.
///
/// Generic over `TSource` which implements [`PriceSource`] to support
/// both static and dynamic pricing.
#[allow(missing_debug_implementations)] // generic types may not implement Debug
pub struct PayLayer<TSource, T> {
    gate: Arc<PaymentGate<T>>,
    price_source: TSource,
    mode: GateMode,
    policy: GatePolicy,
}

impl<TSource: Clone, T> Clone for PayLayer<TSource, T> {
    fn clone(&self) -> Self {
        Self {
            gate: Arc::clone(&self.gate),
            price_source: self.price_source.clone(),
            mode: self.mode,
            policy: self.policy,
        }
    }
}

impl<TSource, T> PayLayer<TSource, T> {
    /// Switches to announce mode.
    #[must_use]
    pub const fn announce(mut self) -> Self {
        self.mode = GateMode::Announce;
        self
    }

    /// Switches to enforce mode.
    #[must_use]
    pub const fn enforce(mut self) -> Self {
        self.mode = GateMode::Enforce;
        self
    }

    /// Lets requests that cannot pay reach the route with `paid: false`.
    #[must_use]
    pub const fn optional(mut self) -> Self {
        self.policy = GatePolicy::Optional;
        self
    }

    /// Returns the configured mode.
    #[must_use]
    pub const fn mode(&self) -> GateMode {
        self.mode
    }

    /// Returns the configured policy.
    #[must_use]
    pub const fn policy(&self) -> GatePolicy {
        self.policy
    }
}

impl<S, TSource, T> Layer<S> for PayLayer<TSource, T>
where
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + Sync + 'static,
    S::Future: Send + 'static,
    TSource: PriceSource,
{
    type Service = PayService<TSource, T>;

    fn layer(&self, inner: S) -> Self::Service {
        PayService {
            gate: Arc::clone(&self.gate),
            price_source: self.price_source.clone(),
            mode: self.mode,
            policy: self.policy,
            inner: BoxCloneSyncService::new(inner),
        }
    }
}

/// Service produced by [`PayLayer`].
#[allow(missing_debug_implementations)] // BoxCloneSyncService does not implement Debug
pub struct PayService<TSource, T> {
    /// Gate shared by every route of the application
    gate: Arc<PaymentGate<T>>,
    /// Price source, static or dynamic
    price_source: TSource,
    /// Announce or enforce
    mode: GateMode,
    /// Whether unpaid requests may proceed
    policy: GatePolicy,
    /// The inner Axum service being wrapped
    inner: BoxCloneSyncService<Request, Response, Infallible>,
}

impl<TSource: Clone, T> Clone for PayService<TSource, T> {
    fn clone(&self) -> Self {
        Self {
            gate: Arc::clone(&self.gate),
            price_source: self.price_source.clone(),
            mode: self.mode,
            policy: self.policy,
            inner: self.inner.clone(),
        }
    }
}

impl<TSource, T> Service<Request> for PayService<TSource, T>
where
    TSource: PriceSource,
    T: Transport + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Response, Infallible>> + Send>>;

    /// Delegates readiness polling to the wrapped inner service.
    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let paygate = Paygate {
            gate: Arc::clone(&self.gate),
            price_source: self.price_source.clone(),
            policy: self.policy,
        };
        let inner = self.inner.clone();
        let mode = self.mode;

        Box::pin(async move {
            match mode {
                GateMode::Announce => paygate.announce(inner, req).await,
                GateMode::Enforce => paygate.enforce(inner, req).await,
            }
        })
    }
}
