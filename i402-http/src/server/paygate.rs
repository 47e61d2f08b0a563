//! Per-request payment gate logic.
//!
//! [`Paygate`] runs one request through either gate mode:
//!
//! - [`Paygate::announce`] advertises a fresh challenge (and the balance of a
//!   presented token) and always runs the wrapped handler.
//! - [`Paygate::enforce`] debits the presented token before the handler runs
//!   and answers `402 Payment Required` when it cannot.
//!
//! The decision itself is [`PaymentGate::evaluate`]; this module only maps it
//! to HTTP.

use std::convert::Infallible;
use std::sync::Arc;

use axum_core::extract::Request;
use axum_core::response::{IntoResponse, Response};
use http::{HeaderMap, HeaderValue, StatusCode};
use i402::{
    Decimal, GatePolicy, PaymentChallenge, PaymentGate, RejectReason, Rejection, Transport,
    Verdict,
};
use tower::Service;

#[cfg(feature = "telemetry")]
use tracing::Instrument;
#[cfg(feature = "telemetry")]
use tracing::instrument;

use super::error::PaygateError;
use super::price_source::PriceSource;
use crate::constants::{ACCESS_CONTROL_EXPOSE_HEADERS, EXPOSED_PAYMENT_HEADERS};
use crate::headers::{insert_payment_headers, payment_token};

/// Gate state for a single request.
#[allow(missing_debug_implementations)]
pub struct Paygate<TSource, T> {
    /// Shared gate owning the ledger, challenges and transport
    pub gate: Arc<PaymentGate<T>>,
    /// Price source for the route
    pub price_source: TSource,
    /// Whether unpaid requests may proceed
    pub policy: GatePolicy,
}

impl<TSource, T> Paygate<TSource, T> {
    /// Calls the inner service with proper telemetry instrumentation.
    async fn call_inner<S>(mut inner: S, req: Request) -> Response
    where
        S: Service<Request, Response = Response, Error = Infallible>,
        S::Future: Send,
    {
        #[cfg(feature = "telemetry")]
        let result = inner
            .call(req)
            .instrument(tracing::info_span!("inner"))
            .await;
        #[cfg(not(feature = "telemetry"))]
        let result = inner.call(req).await;
        result.unwrap_or_else(|never| match never {})
    }
}

impl<TSource, T> Paygate<TSource, T>
where
    TSource: PriceSource,
    T: Transport,
{
    /// Handles a request in announce mode.
    ///
    /// Sets `Pay` and, when the request carries a `Pay-Token`, `Pay-Balance`
    /// on the handler's response. Never touches the ledger. The response
    /// status is the handler's; routes that only announce usually answer
    /// `204 No Content`.
    ///
    /// A negative price answers `500` without running the handler, as in
    /// enforce mode.
    ///
    /// # Errors
    ///
    /// This method is infallible (`Infallible` error type).
    #[cfg_attr(feature = "telemetry", instrument(name = "i402.announce", skip_all))]
    pub async fn announce<S>(self, inner: S, req: Request) -> Result<Response, Infallible>
    where
        S: Service<Request, Response = Response, Error = Infallible>,
        S::Future: Send,
    {
        let price = self.price_source.resolve(req.headers(), req.uri()).await;
        if price < Decimal::ZERO {
            return Ok(self.error_into_response(PaygateError::InvalidPrice(price)));
        }
        let token = payment_token(req.headers());
        let announcement = self.gate.announce(token.as_ref(), price);

        let mut response = Self::call_inner(inner, req).await;
        set_payment_headers(
            response.headers_mut(),
            &announcement.challenge,
            announcement.balance,
        );
        Ok(response)
    }

    /// Handles a request in enforce mode.
    ///
    /// Returns a `402` response if the request cannot be paid for, otherwise
    /// the response from the inner service.
    ///
    /// # Errors
    ///
    /// This method is infallible (`Infallible` error type).
    #[cfg_attr(feature = "telemetry", instrument(name = "i402.enforce", skip_all))]
    pub async fn enforce<S>(self, inner: S, req: Request) -> Result<Response, Infallible>
    where
        S: Service<Request, Response = Response, Error = Infallible>,
        S::Future: Send,
    {
        match self.enforce_fallible(inner, req).await {
            Ok(response) => Ok(response),
            Err(err) => Ok(self.error_into_response(err)),
        }
    }

    /// Handles a request in enforce mode, returning errors as `PaygateError`.
    ///
    /// This is the fallible version of [`enforce`](Self::enforce) that returns
    /// the error instead of turning it into a response.
    ///
    /// # Errors
    ///
    /// Returns [`PaygateError`] if the transport cannot connect, the price is
    /// negative, or the token cannot pay under a required policy.
    pub async fn enforce_fallible<S>(
        &self,
        inner: S,
        mut req: Request,
    ) -> Result<Response, PaygateError>
    where
        S: Service<Request, Response = Response, Error = Infallible>,
        S::Future: Send,
    {
        self.gate.ensure_connected().await?;

        let price = self.price_source.resolve(req.headers(), req.uri()).await;
        let token = payment_token(req.headers());
        let verdict = self
            .gate
            .evaluate(token.as_ref(), price, self.policy)
            .map_err(rejection_into_error)?;

        let decision = match verdict {
            Verdict::Free => {
                #[cfg(feature = "telemetry")]
                tracing::trace!("Zero price, bypassing payment gate");
                return Ok(Self::call_inner(inner, req).await);
            }
            Verdict::Paid(decision) | Verdict::Unpaid(decision) => decision,
        };

        let challenge = self.gate.challenge(price);
        let mut payment_headers = HeaderMap::new();
        insert_payment_headers(
            &mut payment_headers,
            &challenge,
            Some(decision.remaining_balance),
        )?;

        req.extensions_mut().insert(decision);
        let mut response = Self::call_inner(inner, req).await;
        response.headers_mut().extend(payment_headers);
        expose_payment_headers(response.headers_mut());
        Ok(response)
    }

    /// Converts a [`PaygateError`] into the gate's own response.
    fn error_into_response(&self, err: PaygateError) -> Response {
        match err {
            PaygateError::Rejected(rejection) => {
                let challenge = self.gate.challenge(rejection.price);
                let mut response =
                    (StatusCode::PAYMENT_REQUIRED, rejection.to_string()).into_response();
                set_payment_headers(response.headers_mut(), &challenge, Some(rejection.balance));
                response
            }
            PaygateError::Transport(_) => {
                #[cfg(feature = "telemetry")]
                tracing::error!(error = %err, "Payment transport unavailable");
                (StatusCode::SERVICE_UNAVAILABLE, err.to_string()).into_response()
            }
            PaygateError::InvalidPrice(_) | PaygateError::Header(_) => {
                #[cfg(feature = "telemetry")]
                tracing::error!(error = %err, "Payment gate misconfigured");
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
            }
        }
    }
}

fn rejection_into_error(rejection: Rejection) -> PaygateError {
    match rejection.reason {
        RejectReason::InvalidPrice => PaygateError::InvalidPrice(rejection.price),
        RejectReason::MissingToken | RejectReason::NoFunds | RejectReason::InsufficientFunds => {
            PaygateError::Rejected(rejection)
        }
    }
}

#[cfg_attr(not(feature = "telemetry"), allow(unused_variables))]
fn set_payment_headers(
    headers: &mut HeaderMap,
    challenge: &PaymentChallenge,
    balance: Option<Decimal>,
) {
    match insert_payment_headers(headers, challenge, balance) {
        Ok(()) => expose_payment_headers(headers),
        Err(err) => {
            #[cfg(feature = "telemetry")]
            tracing::warn!(error = %err, "Failed to encode payment headers");
        }
    }
}

fn expose_payment_headers(headers: &mut HeaderMap) {
    headers
        .entry(ACCESS_CONTROL_EXPOSE_HEADERS)
        .or_insert(HeaderValue::from_static(EXPOSED_PAYMENT_HEADERS));
}
