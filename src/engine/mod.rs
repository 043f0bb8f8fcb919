pub mod conflict;
pub mod ledger;
pub mod locks;
pub mod projector;
pub mod scheduling;
pub mod token;
pub mod tracking;

use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDate;
use tokio::sync::broadcast;
use tracing::{error, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::directory::{
    DirectoryError, DistributorDirectory, InMemoryDirectory, OrderService, StoreDirectory,
};
use crate::error::AppError;
use crate::models::booking::{DeliveryBooking, TimeWindow};
use crate::models::tracking::TrackingRecord;
use crate::observability::metrics::Metrics;
use crate::store::{ChangeSet, ScheduleStore};

use ledger::CapacityLedger;
use locks::LockTable;

/// How often a call re-reads and re-locks when the booking moves between
/// lookup and lock acquisition.
const MAX_LOCK_ATTEMPTS: usize = 3;

const TOKEN_ATTEMPTS: usize = 4;

#[derive(Clone)]
pub struct Collaborators {
    pub orders: Arc<dyn OrderService>,
    pub stores: Arc<dyn StoreDirectory>,
    pub distributors: Arc<dyn DistributorDirectory>,
}

impl Collaborators {
    pub fn from_directory(directory: Arc<InMemoryDirectory>) -> Self {
        Self {
            orders: directory.clone(),
            stores: directory.clone(),
            distributors: directory,
        }
    }
}

pub struct Scheduler {
    store: Arc<dyn ScheduleStore>,
    collaborators: Collaborators,
    ledger: CapacityLedger,
    locks: LockTable,
    config: Config,
    metrics: Metrics,
    tracking_events_tx: broadcast::Sender<TrackingRecord>,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn ScheduleStore>,
        collaborators: Collaborators,
        config: Config,
        metrics: Metrics,
    ) -> Self {
        let ledger = CapacityLedger::new(
            store.clone(),
            config.default_slot_capacity,
            metrics.clone(),
        );
        let (tracking_events_tx, _unused_rx) = broadcast::channel(config.event_buffer_size.max(1));

        Self {
            store,
            collaborators,
            ledger,
            locks: LockTable::new(),
            config,
            metrics,
            tracking_events_tx,
        }
    }

    pub fn ledger(&self) -> &CapacityLedger {
        &self.ledger
    }

    pub fn subscribe_tracking(&self) -> broadcast::Receiver<TrackingRecord> {
        self.tracking_events_tx.subscribe()
    }

    pub fn find_overlapping(
        &self,
        date: NaiveDate,
        window: &TimeWindow,
        exclude: Option<Uuid>,
    ) -> Result<Vec<DeliveryBooking>, AppError> {
        window.validate()?;
        Ok(conflict::find_overlapping(
            self.store.as_ref(),
            date,
            window,
            exclude,
        )?)
    }

    fn load(&self, id: Uuid) -> Result<DeliveryBooking, AppError> {
        self.store
            .booking(id)?
            .ok_or_else(|| AppError::NotFound(format!("booking {id} not found")))
    }

    fn observe<T>(&self, operation: &str, started: Instant, result: &Result<T, AppError>) {
        let outcome = match result {
            Ok(_) => "ok",
            Err(err) => err.code(),
        };
        self.metrics
            .observe_operation(operation, outcome, started.elapsed());
    }

    fn fresh_token(&self) -> Result<String, AppError> {
        for _ in 0..TOKEN_ATTEMPTS {
            let candidate = token::confirmation_token();
            if self.store.booking_by_token(&candidate)?.is_none() {
                return Ok(candidate);
            }
        }
        Err(AppError::Internal(
            "could not generate a unique confirmation token".to_string(),
        ))
    }

    fn ensure_active_distributor(&self, distributor_id: Uuid) -> Result<(), AppError> {
        if self
            .collaborators
            .distributors
            .is_active_distributor(distributor_id)?
        {
            Ok(())
        } else {
            Err(AppError::NotFound(format!(
                "distributor {distributor_id} not found or inactive"
            )))
        }
    }

    /// Points the order at `date` and commits `changes`. If the commit fails the
    /// order's previous delivery date is put back.
    fn commit_with_delivery_date(
        &self,
        order_id: Uuid,
        date: Option<NaiveDate>,
        changes: ChangeSet,
    ) -> Result<(), AppError> {
        let previous = match self.collaborators.orders.set_delivery_date(order_id, date) {
            Ok(previous) => Some(previous),
            Err(DirectoryError::OrderNotFound(_)) => {
                warn!(%order_id, "order vanished from directory; delivery date not updated");
                None
            }
            Err(err) => return Err(err.into()),
        };

        if let Err(err) = self.store.commit(changes) {
            if let Some(previous) = previous
                && let Err(restore_err) =
                    self.collaborators.orders.set_delivery_date(order_id, previous)
            {
                error!(
                    %order_id,
                    error = %restore_err,
                    "failed to restore order delivery date after rollback"
                );
            }
            return Err(err.into());
        }

        Ok(())
    }
}
