use std::collections::BTreeMap;
use std::time::Instant;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use super::locks::LockKey;
use super::projector::BookingSummary;
use super::Scheduler;
use crate::error::AppError;
use crate::models::booking::BookingStatus;
use crate::models::tracking::{GeoPoint, TrackingRecord, TrackingStatus};
use crate::store::ChangeSet;

/// Shortest window progress is measured against.
const MIN_EXPECTED_SECS: i64 = 60;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrackingUpdate {
    pub status: Option<TrackingStatus>,
    pub location: Option<GeoPoint>,
    pub notes: Option<String>,
}

impl TrackingUpdate {
    fn is_empty(&self) -> bool {
        self.status.is_none() && self.location.is_none() && self.notes.is_none()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LiveEntry {
    pub tracking: TrackingRecord,
    pub booking: BookingSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct LiveTracking {
    pub date: NaiveDate,
    pub entries: Vec<LiveEntry>,
    pub counts: BTreeMap<TrackingStatus, u32>,
    pub average_progress: f64,
}

impl Scheduler {
    /// Applies status, then location, then notes.
    pub async fn update_tracking(
        &self,
        tracking_id: Uuid,
        update: TrackingUpdate,
    ) -> Result<TrackingRecord, AppError> {
        let started = Instant::now();
        let result = self.update_tracking_inner(tracking_id, update).await;
        self.observe("update_tracking", started, &result);
        result
    }

    pub async fn update_tracking_status(
        &self,
        tracking_id: Uuid,
        status: TrackingStatus,
        notes: Option<String>,
    ) -> Result<TrackingRecord, AppError> {
        self.update_tracking(
            tracking_id,
            TrackingUpdate {
                status: Some(status),
                location: None,
                notes,
            },
        )
        .await
    }

    pub async fn update_tracking_location(
        &self,
        tracking_id: Uuid,
        location: GeoPoint,
    ) -> Result<TrackingRecord, AppError> {
        self.update_tracking(
            tracking_id,
            TrackingUpdate {
                location: Some(location),
                ..Default::default()
            },
        )
        .await
    }

    pub fn live_view(
        &self,
        date: NaiveDate,
        distributor_id: Option<Uuid>,
    ) -> Result<LiveTracking, AppError> {
        let mut bookings = self.store.bookings_on(date)?;
        bookings.retain(|b| b.is_active());
        bookings.sort_by_key(|b| (b.window.start, b.created_at));

        let mut entries = Vec::new();
        for booking in &bookings {
            let Some(assigned) = booking.distributor_id else {
                continue;
            };
            if distributor_id.is_some_and(|id| assigned != id) {
                continue;
            }
            let Some(tracking) = self.store.tracking_for_booking(booking.id)? else {
                continue;
            };
            if tracking.distributor_id != assigned {
                continue;
            }
            entries.push(LiveEntry {
                tracking,
                booking: BookingSummary::from(booking),
            });
        }

        let mut counts = BTreeMap::new();
        let mut progress_sum = 0u32;
        for entry in &entries {
            *counts.entry(entry.tracking.status).or_insert(0) += 1;
            progress_sum += u32::from(entry.tracking.progress_percentage);
        }
        let average_progress = if entries.is_empty() {
            0.0
        } else {
            f64::from(progress_sum) / entries.len() as f64
        };

        Ok(LiveTracking {
            date,
            entries,
            counts,
            average_progress,
        })
    }

    async fn update_tracking_inner(
        &self,
        tracking_id: Uuid,
        update: TrackingUpdate,
    ) -> Result<TrackingRecord, AppError> {
        if update.is_empty() {
            return Err(AppError::BadRequest(
                "tracking update must carry a status, location or notes".to_string(),
            ));
        }
        if let Some(point) = &update.location {
            validate_point(point)?;
        }

        let current = self.load_tracking(tracking_id)?;
        let booking = self.load(current.booking_id)?;
        let _locks = self.locks.acquire([LockKey::Order(booking.order_id)]).await;

        let mut record = self.load_tracking(tracking_id)?;
        let booking = self.load(record.booking_id)?;
        if matches!(
            booking.status,
            BookingStatus::Delivered | BookingStatus::Cancelled | BookingStatus::Rescheduled
        ) {
            return Err(AppError::Immutable {
                id: booking.id,
                status: booking.status,
            });
        }
        if booking.distributor_id != Some(record.distributor_id) {
            return Err(AppError::BadRequest(format!(
                "tracking record {tracking_id} is no longer assigned to booking {}",
                booking.id
            )));
        }

        let now = Utc::now();
        let mut kinds = Vec::new();

        if let Some(status) = update.status {
            record.status = status;
            if status == TrackingStatus::Completed {
                record.progress_percentage = 100;
            }
            kinds.push("status");
        }
        if let Some(point) = update.location {
            record.location = Some(point);
            let started_at = *record.started_at.get_or_insert(now);
            record.progress_percentage = progress_for(
                started_at,
                now,
                booking.window.duration(),
                record.progress_percentage,
            );
            kinds.push("location");
        }
        if let Some(notes) = update.notes {
            let notes = notes.trim();
            if !notes.is_empty() {
                record.notes.push(notes.to_string());
            }
            kinds.push("notes");
        }
        record.updated_at = now;

        let mut changes = ChangeSet::new();
        changes.put_tracking(record.clone());
        self.store.commit(changes)?;

        for kind in kinds {
            self.metrics
                .tracking_updates_total
                .with_label_values(&[kind])
                .inc();
        }
        if self.tracking_events_tx.send(record.clone()).is_err() {
            debug!(tracking_id = %record.id, "no live subscribers for tracking update");
        }

        info!(
            tracking_id = %record.id,
            booking_id = %record.booking_id,
            status = ?record.status,
            progress = record.progress_percentage,
            "tracking updated"
        );
        Ok(record)
    }

    fn load_tracking(&self, id: Uuid) -> Result<TrackingRecord, AppError> {
        self.store
            .tracking(id)?
            .ok_or_else(|| AppError::NotFound(format!("tracking record {id} not found")))
    }
}

fn validate_point(point: &GeoPoint) -> Result<(), AppError> {
    let valid = point.lat.is_finite()
        && point.lng.is_finite()
        && (-90.0..=90.0).contains(&point.lat)
        && (-180.0..=180.0).contains(&point.lng);
    if valid {
        Ok(())
    } else {
        Err(AppError::BadRequest(format!(
            "invalid coordinates ({}, {})",
            point.lat, point.lng
        )))
    }
}

/// Elapsed share of the delivery window since the first location fix.
/// Capped at 99 until the delivery completes, and never moves backwards.
pub fn progress_for(
    started_at: DateTime<Utc>,
    now: DateTime<Utc>,
    expected: chrono::Duration,
    previous: u8,
) -> u8 {
    let expected = expected.num_seconds().max(MIN_EXPECTED_SECS);
    let elapsed = (now - started_at).num_seconds().max(0);
    let pct = (elapsed.saturating_mul(100) / expected).min(99);
    u8::try_from(pct).unwrap_or(99).max(previous)
}
