//! Fetch handler: answer intercepted requests from cache or network.

use std::sync::Arc;

use rufingo_net::{Request, Response};
use tracing::{debug, trace, warn};

use crate::cache::CacheEntry;
use crate::config::CacheStrategy;
use crate::event::FetchEvent;
use crate::host::WorkerContext;
use crate::Result;

/// Fetch handler. The strategy comes from configuration and never changes
/// between requests.
pub async fn on_fetch(ctx: &WorkerContext, event: &mut FetchEvent) -> Result<Response> {
    trace!(url = %event.request.url, strategy = ?ctx.config.strategy, "Intercepted request");
    match ctx.config.strategy {
        CacheStrategy::CacheFirst => cache_first(ctx, &event.request).await,
        CacheStrategy::NetworkFirst => network_first(ctx, event).await,
    }
}

/// Serve the cached snapshot verbatim; on a miss, return the network result
/// without storing it.
pub async fn cache_first(ctx: &WorkerContext, request: &Request) -> Result<Response> {
    let key = request.identity();
    let cached = ctx.caches.read().await.match_request(&key).cloned();

    if let Some(entry) = cached {
        debug!(url = %key, "Cache hit");
        return entry.to_response();
    }

    debug!(url = %key, "Cache miss, fetching");
    Ok(ctx.network.fetch(request.clone()).await?)
}

/// Fetch first. A successful response is returned at once while a snapshot
/// is written to the current bucket as pending work. When the network fails
/// the cached snapshot is served; with no snapshot the network error is
/// returned.
pub async fn network_first(ctx: &WorkerContext, event: &mut FetchEvent) -> Result<Response> {
    let request = event.request.clone();

    match ctx.network.fetch(request.clone()).await {
        Ok(response) => {
            if request.is_get() {
                let snapshot = CacheEntry::from_response(&request, &response);
                let key = request.identity();
                let cache_name = ctx.cache_name();
                let caches = Arc::clone(&ctx.caches);

                event.wait_until(async move {
                    caches.write().await.open(&cache_name).put(&key, snapshot);
                    debug!(url = %key, cache = %cache_name, "Stored network response");
                    Ok(())
                });
            } else {
                trace!(url = %request.url, method = %request.method, "Not caching non-GET response");
            }
            Ok(response)
        }
        Err(err) => {
            let key = request.identity();
            warn!(url = %key, error = %err, "Network failed, trying cache");

            let cached = ctx.caches.read().await.match_request(&key).cloned();
            match cached {
                Some(entry) => {
                    debug!(url = %key, "Serving cached fallback");
                    entry.to_response()
                }
                None => Err(err.into()),
            }
        }
    }
}
