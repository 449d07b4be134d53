//! # Position Feed
//!
//! Polls the upstream position feed and forwards snapshots. The feed request
//! (filter, origin, radius, enabled) can be changed at any time; a change
//! discards the fetch in flight and triggers an immediate refetch.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use http::Method;
use http::header::ACCEPT;
use http_body_util::Empty;
use realtime::{Error, HttpRequest, TaskHandle};
use tokio::sync::{Notify, mpsc, watch};
use tracing::{debug, info};
use urlencoding::encode;

use crate::model::{FeedRequest, FeedResponse};

/// Upstream source of vehicle snapshots.
#[async_trait]
pub trait PositionFeed: Send + Sync {
    /// Fetch the current snapshot for `request`.
    async fn fetch(&self, request: &FeedRequest) -> Result<FeedResponse>;
}

/// Poll cadence of the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedOptions {
    pub poll_interval: Duration,
}

impl Default for FeedOptions {
    fn default() -> Self {
        Self { poll_interval: Duration::from_secs(10) }
    }
}

/// Output of the poller. Each event carries the request it was fetched for.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    Snapshot { request: FeedRequest, response: FeedResponse },
    Failed { request: FeedRequest, error: Error },
}

/// Handle used to re-scope or refresh a running poller.
#[derive(Clone)]
pub struct FeedControl {
    request: Arc<watch::Sender<FeedRequest>>,
    refresh: Arc<Notify>,
}

impl FeedControl {
    /// Current feed request.
    #[must_use]
    pub fn request(&self) -> FeedRequest {
        self.request.borrow().clone()
    }

    /// Edits the request. The poller refetches only if the request changed.
    pub fn update(&self, edit: impl FnOnce(&mut FeedRequest)) {
        self.request.send_if_modified(|request| {
            let before = request.clone();
            edit(request);
            *request != before
        });
    }

    /// Fetches immediately instead of waiting for the next poll.
    pub fn refresh(&self) {
        self.refresh.notify_one();
    }
}

impl fmt::Debug for FeedControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedControl").field("request", &*self.request.borrow()).finish()
    }
}

/// A running poll loop. Dropping it stops polling.
#[derive(Debug)]
pub struct FeedPoller {
    control: FeedControl,
    _task: TaskHandle,
}

impl FeedPoller {
    /// Starts polling `feed`. Events arrive on the returned receiver.
    pub fn spawn(
        feed: Arc<dyn PositionFeed>, request: FeedRequest, options: FeedOptions,
    ) -> (Self, mpsc::UnboundedReceiver<FeedEvent>) {
        let (request_tx, request_rx) = watch::channel(request);
        let refresh = Arc::new(Notify::new());
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let control = FeedControl { request: Arc::new(request_tx), refresh: Arc::clone(&refresh) };
        let task = TaskHandle::spawn(move |token| {
            poll(feed, request_rx, refresh, events_tx, options.poll_interval, token)
        });

        (Self { control, _task: task }, events_rx)
    }

    #[must_use]
    pub fn control(&self) -> FeedControl {
        self.control.clone()
    }
}

async fn poll(
    feed: Arc<dyn PositionFeed>, mut request_rx: watch::Receiver<FeedRequest>,
    refresh: Arc<Notify>, events: mpsc::UnboundedSender<FeedEvent>, interval: Duration,
    token: tokio_util::sync::CancellationToken,
) {
    loop {
        let request = request_rx.borrow_and_update().clone();

        if request.enabled {
            debug!(filter = request.filter.as_str(), "fetching positions");
            let result = tokio::select! {
                biased;
                () = token.cancelled() => return,
                changed = request_rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    debug!("feed request changed; discarding fetch in flight");
                    continue;
                }
                result = feed.fetch(&request) => result,
            };

            let event = match result {
                Ok(response) => FeedEvent::Snapshot { request, response },
                Err(err) => FeedEvent::Failed {
                    request,
                    error: Error::FeedUnavailable(format!("{err:#}")),
                },
            };
            if events.send(event).is_err() {
                info!("feed consumer gone; stopping poller");
                return;
            }
        }

        tokio::select! {
            biased;
            () = token.cancelled() => return,
            changed = request_rx.changed() => {
                if changed.is_err() {
                    return;
                }
            }
            () = refresh.notified() => debug!("manual feed refresh"),
            () = tokio::time::sleep(interval) => {}
        }
    }
}

/// Position feed backed by the fleet HTTP API.
pub struct HttpPositionFeed<H: HttpRequest> {
    http: Arc<H>,
    base_url: String,
}

impl<H: HttpRequest> HttpPositionFeed<H> {
    #[must_use]
    pub fn new(http: Arc<H>, base_url: impl Into<String>) -> Self {
        Self { http, base_url: base_url.into() }
    }
}

/// Query string for a feed request.
#[must_use]
pub fn query(request: &FeedRequest) -> String {
    let mut query = format!("filter={}&radiusKm={}", encode(request.filter.as_str()), request.radius_km);
    if let Some(origin) = request.origin {
        query.push_str(&format!("&lat={}&lng={}", origin.lat, origin.lng));
    }
    query
}

#[async_trait]
impl<H> PositionFeed for HttpPositionFeed<H>
where
    H: HttpRequest + 'static,
{
    async fn fetch(&self, request: &FeedRequest) -> Result<FeedResponse> {
        let url = self.base_url.trim_end_matches('/');
        let request = http::Request::builder()
            .method(Method::GET)
            .uri(format!("{url}/vehicles/nearby?{}", query(request)))
            .header(ACCEPT, "application/json")
            .body(Empty::<Bytes>::new())
            .context("building position feed request")?;

        let response = self.http.fetch(request).await.context("calling position feed")?;
        if !response.status().is_success() {
            return Err(realtime::bad_gateway!("position feed returned {}", response.status()).into());
        }

        serde_json::from_slice(response.body()).context("deserializing position feed payload")
    }
}

#[cfg(test)]
mod tests {
    use realtime::LatLng;

    use super::*;
    use crate::model::FleetFilter;

    #[test]
    fn query_with_origin() {
        let request = FeedRequest {
            filter: FleetFilter::Delivery,
            origin: Some(LatLng::new(-4.32, 15.3)),
            radius_km: 3.5,
            enabled: true,
        };
        assert_eq!(query(&request), "filter=delivery&radiusKm=3.5&lat=-4.32&lng=15.3");
    }

    #[test]
    fn query_without_origin() {
        assert_eq!(query(&FeedRequest::default()), "filter=all&radiusKm=5");
    }
}
