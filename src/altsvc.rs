//! Alt-Svc response decoration.
//!
//! Decorators run strictly after the inner handler has produced a
//! response and strictly before the response is handed to the
//! transport. The injector advertises the QUIC endpoint on the TLS
//! companion listener; the rewriter adjusts the advertised authority
//! for NAT/port-mapping deployments.

use hyper::body::Bytes;
use hyper::header::{HeaderValue, ALT_SVC};
use hyper::Response;
use std::sync::Arc;
use tracing::warn;

/// Mutates an outgoing response after the inner handler, before flush.
pub trait ResponseDecorator: Send + Sync {
    fn decorate(&self, response: &mut Response<Bytes>);
}

/// Apply decorators in registration order.
pub fn apply_all(decorators: &[Arc<dyn ResponseDecorator>], response: &mut Response<Bytes>) {
    for decorator in decorators {
        decorator.decorate(response);
    }
}

/// Sets `Alt-Svc: h3=":<port>"` on every response.
pub struct AltSvcInjector {
    value: HeaderValue,
}

impl AltSvcInjector {
    /// `advertised_port` is the Alt-Svc override port when configured,
    /// else the bound port.
    pub fn new(advertised_port: u16) -> Self {
        let value = format!("h3=\":{}\"", advertised_port);
        Self {
            value: HeaderValue::from_str(&value).expect("port formats to a valid header value"),
        }
    }
}

impl ResponseDecorator for AltSvcInjector {
    fn decorate(&self, response: &mut Response<Bytes>) {
        response.headers_mut().insert(ALT_SVC, self.value.clone());
    }
}

/// Exact substring replacement on an existing Alt-Svc header value.
/// Responses without the header pass through untouched.
pub struct AltSvcRewriter {
    from: String,
    to: String,
}

impl AltSvcRewriter {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

impl ResponseDecorator for AltSvcRewriter {
    fn decorate(&self, response: &mut Response<Bytes>) {
        let current = match response.headers().get(ALT_SVC) {
            Some(value) => value,
            None => return,
        };
        let current = match current.to_str() {
            Ok(text) if !text.is_empty() => text,
            _ => return,
        };

        let rewritten = current.replace(&self.from, &self.to);
        if rewritten == current {
            return;
        }

        match HeaderValue::from_str(&rewritten) {
            Ok(value) => {
                response.headers_mut().insert(ALT_SVC, value);
            }
            Err(e) => {
                // Keep the original advertisement rather than dropping it.
                warn!(rewritten = %rewritten, error = %e, "Alt-Svc rewrite produced an invalid header value");
            }
        }
    }
}
