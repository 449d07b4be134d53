//! Authoritative set of tracked vehicles.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use realtime::{Error, Result};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::feed::FeedControl;
use crate::model::{FeedEntity, FeedResponse, FleetFilter, TrackedEntity, VehicleStatus};

/// Immutable view of the tracked set, keyed by entity id.
pub type FleetSnapshot = Arc<BTreeMap<String, TrackedEntity>>;

/// Counters shown on the filter controls, over the filtered tracked set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CategoryCounts {
    pub all: usize,
    pub taxi: usize,
    pub delivery: usize,
    pub available: usize,
    pub busy: usize,
    pub offline: usize,
}

impl CategoryCounts {
    fn tally<'a>(entities: impl Iterator<Item = &'a TrackedEntity>) -> Self {
        entities.fold(Self::default(), |mut counts, entity| {
            counts.all += 1;
            if FleetFilter::Taxi.matches(entity) {
                counts.taxi += 1;
            }
            if FleetFilter::Delivery.matches(entity) {
                counts.delivery += 1;
            }
            match entity.status {
                VehicleStatus::Available => counts.available += 1,
                VehicleStatus::Busy => counts.busy += 1,
                VehicleStatus::Offline => counts.offline += 1,
            }
            counts
        })
    }
}

/// Health of the upstream feed as seen by the store.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedStatus {
    /// A fetch for the current filter has not completed yet.
    pub loading: bool,
    /// The last fetch failed; the tracked set is the last known good one.
    pub stale: bool,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
    pub last_updated: Option<DateTime<Utc>>,
}

/// What one reconciliation changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconciliation {
    pub added: Vec<TrackedEntity>,
    pub updated: Vec<TrackedEntity>,
    pub removed: Vec<String>,
    /// Snapshot entries that failed validation.
    pub dropped: usize,
}

impl Reconciliation {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}

/// Tracked vehicles plus the active filter and derived counters.
///
/// The entity map is replaced wholesale by [`FleetStore::reconcile`]; readers
/// receive shared immutable snapshots.
#[derive(Debug, Default)]
pub struct FleetStore {
    entities: FleetSnapshot,
    filter: FleetFilter,
    counts: CategoryCounts,
    status: FeedStatus,
    feed: Option<FeedControl>,
}

impl FleetStore {
    #[must_use]
    pub fn new(filter: FleetFilter) -> Self {
        Self { filter, ..Self::default() }
    }

    /// Connects the upstream feed so filter changes re-scope it.
    pub fn attach_feed(&mut self, feed: FeedControl) {
        feed.update(|request| request.filter = self.filter);
        self.feed = Some(feed);
    }

    #[must_use]
    pub const fn feed(&self) -> Option<&FeedControl> {
        self.feed.as_ref()
    }

    /// Applies a feed response fetched for `scope`, rejecting responses older
    /// than the last one applied. Only a response for the current filter ends
    /// the `loading` state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Outdated`] when `response` predates the current state.
    pub fn apply(&mut self, response: FeedResponse, scope: FleetFilter) -> Result<Reconciliation> {
        if let Some(last) = self.status.last_updated
            && response.timestamp < last
        {
            return Err(Error::Outdated(format!(
                "snapshot at {} is older than {last}",
                response.timestamp
            )));
        }

        let mut reconciliation = self.reconcile(response.entities);
        reconciliation.dropped += response.malformed;
        self.status.last_updated = Some(response.timestamp);
        if scope == self.filter {
            self.status.loading = false;
        } else {
            debug!(scope = scope.as_str(), filter = self.filter.as_str(), "snapshot for previous filter");
        }
        Ok(reconciliation)
    }

    /// Replaces the tracked set with `snapshot`. New ids are added, known ids
    /// updated, and ids absent from `snapshot` evicted. Invalid entries are
    /// dropped without affecting the rest of the batch; for duplicate ids the
    /// last entry wins.
    pub fn reconcile(&mut self, snapshot: Vec<FeedEntity>) -> Reconciliation {
        let mut next = BTreeMap::new();
        let mut dropped = 0;

        for raw in snapshot {
            match TrackedEntity::try_from(raw) {
                Ok(entity) => {
                    next.insert(entity.id.clone(), entity);
                }
                Err(err) => {
                    dropped += 1;
                    warn!(monotonic_counter.dropped_entities = 1, error = %err, "dropping snapshot entry");
                }
            }
        }

        let mut reconciliation = Reconciliation { dropped, ..Reconciliation::default() };
        for (id, entity) in &next {
            match self.entities.get(id) {
                None => reconciliation.added.push(entity.clone()),
                Some(previous) if previous != entity => reconciliation.updated.push(entity.clone()),
                Some(_) => {}
            }
        }
        reconciliation.removed =
            self.entities.keys().filter(|id| !next.contains_key(*id)).cloned().collect();

        self.entities = Arc::new(next);
        self.counts = CategoryCounts::tally(self.visible());
        self.status.stale = false;
        self.status.last_error = None;
        self.status.consecutive_failures = 0;

        debug!(
            added = reconciliation.added.len(),
            updated = reconciliation.updated.len(),
            removed = reconciliation.removed.len(),
            dropped,
            tracked = self.entities.len(),
            "reconciled snapshot"
        );

        reconciliation
    }

    /// Records a failed fetch for `scope`. The tracked set is kept as-is.
    pub fn mark_failed(&mut self, error: &Error, scope: FleetFilter) {
        if scope == self.filter {
            self.status.loading = false;
        }
        self.status.stale = true;
        self.status.last_error = Some(error.description());
        self.status.consecutive_failures = self.status.consecutive_failures.saturating_add(1);
        warn!(
            monotonic_counter.feed_failures = 1,
            error = %error,
            failures = self.status.consecutive_failures,
            retained = self.entities.len(),
            "position feed failed; keeping last known fleet"
        );
    }

    /// Changes the filter and re-scopes the feed. Returns whether the filter
    /// changed.
    pub fn set_filter(&mut self, filter: FleetFilter) -> bool {
        if self.filter == filter {
            return false;
        }
        info!(from = self.filter.as_str(), to = filter.as_str(), "fleet filter changed");

        self.filter = filter;
        self.counts = CategoryCounts::tally(self.visible());
        if let Some(feed) = &self.feed {
            self.status.loading = true;
            feed.update(|request| request.filter = filter);
        }
        true
    }

    #[must_use]
    pub const fn filter(&self) -> FleetFilter {
        self.filter
    }

    #[must_use]
    pub const fn counts(&self) -> CategoryCounts {
        self.counts
    }

    #[must_use]
    pub const fn status(&self) -> &FeedStatus {
        &self.status
    }

    /// Every tracked entity, regardless of filter.
    #[must_use]
    pub fn snapshot(&self) -> FleetSnapshot {
        Arc::clone(&self.entities)
    }

    /// Tracked entities matching the current filter.
    pub fn visible(&self) -> impl Iterator<Item = &TrackedEntity> {
        let filter = self.filter;
        self.entities.values().filter(move |entity| filter.matches(entity))
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&TrackedEntity> {
        self.entities.get(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::model::VehicleClass;

    fn raw(id: &str, lat: f64, lng: f64) -> FeedEntity {
        FeedEntity { id: id.to_string(), lat, lng, ..FeedEntity::default() }
    }

    #[test]
    fn evicts_absent_ids() {
        let mut store = FleetStore::default();
        let first = store.reconcile(vec![raw("a", -4.30, 15.30), raw("b", -4.31, 15.31)]);
        assert_eq!(first.added.len(), 2);

        let second = store.reconcile(vec![raw("b", -4.32, 15.32)]);

        assert_eq!(second.removed, vec!["a".to_string()]);
        assert_eq!(second.updated.len(), 1);
        assert!(store.get("a").is_none());
        assert_eq!(store.get("b").map(|b| b.position.lat), Some(-4.32));
        assert_eq!(store.counts().all, 1);
    }

    #[test]
    fn unchanged_entities_are_not_updates() {
        let mut store = FleetStore::default();
        store.reconcile(vec![raw("a", -4.30, 15.30)]);
        let again = store.reconcile(vec![raw("a", -4.30, 15.30)]);
        assert!(again.is_empty());
    }

    #[test]
    fn empty_snapshot_clears() {
        let mut store = FleetStore::default();
        store.reconcile(vec![raw("a", 0.0, 0.0), raw("b", 0.0, 0.1), raw("c", 0.0, 0.2)]);
        assert_eq!(store.counts().available, 3);

        let cleared = store.reconcile(vec![]);

        assert_eq!(cleared.removed.len(), 3);
        assert!(store.is_empty());
        assert_eq!(store.counts(), CategoryCounts::default());
    }

    #[test]
    fn malformed_entry_is_dropped() {
        let mut store = FleetStore::default();
        let result = store.reconcile(vec![raw("a", f64::NAN, 0.0), raw("b", 1.0, 1.0)]);

        assert_eq!(result.dropped, 1);
        assert_eq!(result.added.len(), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn failure_keeps_last_known() {
        let mut store = FleetStore::default();
        store.reconcile(vec![raw("a", 0.0, 0.0)]);

        store.mark_failed(&Error::FeedUnavailable("timeout".to_string()), FleetFilter::All);

        assert_eq!(store.len(), 1);
        assert!(store.status().stale);
        assert!(!store.status().loading);
        assert_eq!(store.status().consecutive_failures, 1);

        store.reconcile(vec![raw("a", 0.0, 0.0)]);
        assert!(!store.status().stale);
        assert_eq!(store.status().consecutive_failures, 0);
    }

    #[test]
    fn counts_follow_filter() {
        let mut store = FleetStore::default();
        let van = FeedEntity { class: Some(VehicleClass::VanFlex), ..raw("van", 0.0, 0.0) };
        let busy_taxi = FeedEntity { status: Some(VehicleStatus::Busy), ..raw("taxi", 0.0, 0.1) };
        store.reconcile(vec![van, busy_taxi]);

        assert_eq!(
            store.counts(),
            CategoryCounts { all: 2, taxi: 1, delivery: 1, available: 1, busy: 1, offline: 0 }
        );

        assert!(store.set_filter(FleetFilter::Taxi));
        assert!(!store.set_filter(FleetFilter::Taxi));
        assert_eq!(
            store.counts(),
            CategoryCounts { all: 1, taxi: 1, delivery: 0, available: 0, busy: 1, offline: 0 }
        );
        assert_eq!(store.visible().count(), 1);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn snapshot_is_isolated_from_later_reconciles() {
        let mut store = FleetStore::default();
        store.reconcile(vec![raw("a", 0.0, 0.0)]);
        let before = store.snapshot();

        store.reconcile(vec![raw("b", 0.0, 0.0)]);

        assert!(before.contains_key("a"));
        assert!(!store.snapshot().contains_key("a"));
    }

    #[test]
    fn outdated_response_is_rejected() {
        let mut store = FleetStore::default();
        let newer = Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 10).unwrap();
        let older = Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap();

        store
            .apply(FeedResponse::new(vec![raw("a", 0.0, 0.0)], newer), FleetFilter::All)
            .expect("first response applies");
        let result = store.apply(FeedResponse::new(vec![], older), FleetFilter::All);

        assert!(matches!(result, Err(Error::Outdated(_))));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn malformed_wire_entries_count_as_dropped() {
        let mut store = FleetStore::default();
        let response = FeedResponse {
            malformed: 2,
            ..FeedResponse::new(vec![raw("a", 0.0, 0.0), raw("", 0.0, 0.0)], Utc::now())
        };

        let reconciliation = store.apply(response, FleetFilter::All).expect("should apply");

        assert_eq!(reconciliation.added.len(), 1);
        assert_eq!(reconciliation.dropped, 3);
    }
}
