//! Server-sent event streams mirroring store subscriptions.

use std::convert::Infallible;

use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::{Stream, StreamExt};
use persistence::{Snapshot, StoreError, Subscription};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::middleware::metrics::record_event_stream_opened;

/// Name of the event carrying a store or encoding failure.
pub const ERROR_EVENT: &str = "error";

/// Turns a subscription into an SSE response. Each snapshot is decoded with
/// `decode` and sent as a JSON `event`. Dropping the response (client gone)
/// drops the subscription, which stops its feeder task. The stream ends once
/// `shutdown` is cancelled.
pub fn snapshot_events<T, F>(
    subscription: Subscription,
    shutdown: CancellationToken,
    event: &'static str,
    decode: F,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>>
where
    T: Serialize,
    F: Fn(Snapshot) -> Result<T, StoreError> + Send + 'static,
{
    record_event_stream_opened(event);
    tracing::debug!(path = %subscription.path(), event, "Event stream opened");

    let stream = subscription
        .take_until(shutdown.cancelled_owned())
        .map(move |item| {
            let event = match item.and_then(&decode) {
                Ok(payload) => Event::default().event(event).json_data(payload),
                Err(e) => {
                    tracing::warn!(error = %e, event, "Event stream failed");
                    Ok(Event::default().event(ERROR_EVENT).data(e.to_string()))
                }
            };
            Ok(event.unwrap_or_else(|e| Event::default().event(ERROR_EVENT).data(e.to_string())))
        });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
