//! Install and activate handlers: create the current cache generation and
//! garbage-collect the old ones.

use std::sync::Arc;

use futures::future::try_join_all;
use rufingo_net::Request;
use tracing::{debug, info};

use crate::cache::CacheEntry;
use crate::event::ExtendableEvent;
use crate::host::WorkerContext;
use crate::{Result, ServiceWorkerError};

/// Install handler: precache the manifest into the current bucket.
pub fn on_install(ctx: &WorkerContext, event: &mut ExtendableEvent) {
    info!(cache = %ctx.cache_name(), "Service worker installing");
    let ctx = ctx.clone();
    event.wait_until(async move { precache(&ctx).await.map(|_| ()) });
}

/// Activate handler: drop every bucket except the current one, then
/// optionally take control of open windows.
pub fn on_activate(ctx: &WorkerContext, event: &mut ExtendableEvent) {
    info!(cache = %ctx.cache_name(), "Service worker activating");
    let ctx = ctx.clone();
    event.wait_until(async move {
        purge_stale_caches(&ctx).await?;
        if ctx.config.claim_clients {
            let claimed = ctx.clients.write().await.claim();
            debug!(claimed, "Claimed clients");
        }
        Ok(())
    });
}

/// Fetch every manifest path and store them all, or none of them.
///
/// The bucket is opened before fetching, so a failed install still leaves
/// an empty bucket behind; the next activation of another version removes it.
pub async fn precache(ctx: &WorkerContext) -> Result<usize> {
    let cache_name = ctx.cache_name();
    let urls = ctx.config.precache_urls()?;

    ctx.caches.write().await.open(&cache_name);

    let fetches = urls.into_iter().map(|url| {
        let network = Arc::clone(&ctx.network);
        async move {
            let request = Request::get(url);
            let response = network.fetch(request.clone()).await.map_err(|e| {
                ServiceWorkerError::InstallFailed(format!("{}: {}", request.url, e))
            })?;
            if !response.ok() {
                return Err(ServiceWorkerError::InstallFailed(format!(
                    "{} responded {}",
                    request.url, response.status
                )));
            }
            Ok((request.identity(), CacheEntry::from_response(&request, &response)))
        }
    });
    let entries = try_join_all(fetches).await?;

    let count = entries.len();
    let mut caches = ctx.caches.write().await;
    let cache = caches.open(&cache_name);
    for (key, entry) in entries {
        cache.put(&key, entry);
    }

    info!(cache = %cache_name, entries = count, "Precache complete");
    Ok(count)
}

/// Delete every bucket not named after the current version. Returns the
/// deleted names.
pub async fn purge_stale_caches(ctx: &WorkerContext) -> Result<Vec<String>> {
    let current = ctx.cache_name();
    let mut caches = ctx.caches.write().await;

    let stale: Vec<String> = caches
        .keys()
        .into_iter()
        .filter(|name| *name != current)
        .collect();

    for name in &stale {
        caches.delete(name);
        info!(cache = %name, "Deleted stale cache");
    }
    Ok(stale)
}
