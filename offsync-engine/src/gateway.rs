//! Single request facade for the rest of the application.
//!
//! Decision order for every request:
//! 1. online → live call;
//! 2. live success → refresh the cache (GET only) and return;
//! 3. live failure or offline → serve a GET from the cache;
//! 4. still unresolved → queue a mutating request, or fail a read.
//!
//! A live failure is not classified: a 500 from a reachable server lands in
//! the same fallback branch as an unreachable one, so a mutating request the
//! server rejected is queued and replayed later.
//!
//! Nothing thrown below this layer escapes it; every failure comes back as an
//! envelope with `success: false`.

use crate::action_queue::ActionQueue;
use crate::cache::{endpoint_key, CacheManager};
use crate::network::NetworkObserver;
use crate::transport::Transport;
use crate::types::{ApiResponse, RequestOptions};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct ApiGateway {
    transport: Arc<dyn Transport>,
    network: NetworkObserver,
    cache: Option<CacheManager>,
    queue: Option<ActionQueue>,
}

impl ApiGateway {
    pub fn new(
        transport: Arc<dyn Transport>,
        network: NetworkObserver,
        cache: CacheManager,
        queue: ActionQueue,
    ) -> Self {
        Self {
            transport,
            network,
            cache: Some(cache),
            queue: Some(queue),
        }
    }

    /// A gateway with no local storage: cache always misses, queueing
    /// always fails.
    pub fn online_only(transport: Arc<dyn Transport>, network: NetworkObserver) -> Self {
        Self {
            transport,
            network,
            cache: None,
            queue: None,
        }
    }

    /// Issues a request with cache and queue fallback.
    ///
    /// `enable_queue = false` makes a failed mutating request fail outright
    /// instead of being deferred.
    pub async fn request(
        &self,
        endpoint: &str,
        options: RequestOptions,
        enable_queue: bool,
    ) -> ApiResponse {
        let cache_ttl = options.cache_ttl;
        let request = options.into_request(endpoint);
        let is_read = !request.method.is_mutating();

        let last_error = if self.network.is_online() {
            match self.transport.send(&request).await {
                Ok(resp) if resp.success => {
                    if is_read {
                        self.refresh_cache(endpoint, &resp, cache_ttl);
                    }
                    return resp;
                }
                Ok(resp) => {
                    debug!("{} {endpoint} returned success=false", request.method);
                    resp.error
                        .or(resp.message)
                        .unwrap_or_else(|| "request failed".to_string())
                }
                Err(e) => {
                    debug!("{} {endpoint} failed live: {e}", request.method);
                    e.to_string()
                }
            }
        } else {
            "offline".to_string()
        };

        if is_read {
            if let Some(data) = self.cached(endpoint) {
                debug!("serving {endpoint} from cache");
                return ApiResponse::from_cache(data);
            }
            return ApiResponse::failure(last_error);
        }

        if !enable_queue {
            return ApiResponse::failure(last_error);
        }

        let Some(queue) = &self.queue else {
            return ApiResponse::failure(format!("{last_error}; offline queue unavailable"));
        };
        match queue.enqueue(request) {
            Ok(action) => ApiResponse::queued(action.id),
            Err(e) => {
                warn!("could not queue {endpoint}: {e}");
                ApiResponse::failure(format!("{last_error}; queueing failed: {e}"))
            }
        }
    }

    fn refresh_cache(&self, endpoint: &str, resp: &ApiResponse, ttl: Option<chrono::Duration>) {
        let (Some(cache), Some(data)) = (&self.cache, &resp.data) else {
            return;
        };
        if let Err(e) = cache.put(&endpoint_key(endpoint), data, ttl) {
            // Best effort: the live answer is still returned.
            debug!("cache refresh for {endpoint} skipped: {e}");
        }
    }

    fn cached(&self, endpoint: &str) -> Option<serde_json::Value> {
        let cache = self.cache.as_ref()?;
        match cache.get(&endpoint_key(endpoint)) {
            Ok(hit) => hit,
            Err(e) => {
                debug!("cache lookup for {endpoint} failed: {e}");
                None
            }
        }
    }
}
