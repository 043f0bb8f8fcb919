use std::time::Instant;

use chrono::{Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use super::conflict::overlapping_in;
use super::ledger::count_active;
use super::locks::LockKey;
use super::{Scheduler, MAX_LOCK_ATTEMPTS};
use crate::error::AppError;
use crate::models::booking::{
    BookingPatch, BookingStatus, ContactSnapshot, DeliveryBooking, DeliveryFee, DeliveryType,
    Priority, TimeSlot, TimeWindow,
};
use crate::models::capacity::{CapacityRecord, SlotKey};
use crate::models::directory::Order;
use crate::models::tracking::{TrackingRecord, TrackingStatus};
use crate::store::ChangeSet;

#[derive(Debug, Clone, Deserialize)]
pub struct NewBooking {
    pub order_id: Uuid,
    pub scheduled_date: NaiveDate,
    pub window: TimeWindow,
    pub slot: Option<TimeSlot>,
    pub distributor_id: Option<Uuid>,
    #[serde(default)]
    pub delivery_type: DeliveryType,
    #[serde(default)]
    pub priority: Priority,
    pub address: Option<String>,
    pub contact: Option<ContactSnapshot>,
    pub instructions: Option<String>,
    #[serde(default)]
    pub fee: DeliveryFee,
    #[serde(default)]
    pub confirmation_required: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RescheduleRequest {
    pub scheduled_date: NaiveDate,
    pub window: TimeWindow,
    pub slot: Option<TimeSlot>,
    /// Replaces the carried-over distributor.
    pub distributor_id: Option<Uuid>,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RescheduleOutcome {
    pub old: DeliveryBooking,
    pub new: DeliveryBooking,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookingFilter {
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub status: Option<BookingStatus>,
    pub slot: Option<TimeSlot>,
    pub distributor_id: Option<Uuid>,
    pub order_id: Option<Uuid>,
    pub delivery_type: Option<DeliveryType>,
}

impl BookingFilter {
    fn matches(&self, booking: &DeliveryBooking) -> bool {
        self.date_from.is_none_or(|from| booking.scheduled_date >= from)
            && self.date_to.is_none_or(|to| booking.scheduled_date <= to)
            && self.status.is_none_or(|status| booking.status == status)
            && self.slot.is_none_or(|slot| booking.slot == slot)
            && self
                .distributor_id
                .is_none_or(|id| booking.distributor_id == Some(id))
            && self.order_id.is_none_or(|id| booking.order_id == id)
            && self
                .delivery_type
                .is_none_or(|kind| booking.delivery_type == kind)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PageRequest {
    /// 1-based.
    pub page: usize,
    pub per_page: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub per_page: usize,
    pub total: usize,
}

impl Scheduler {
    pub async fn create(&self, request: NewBooking) -> Result<DeliveryBooking, AppError> {
        let started = Instant::now();
        let result = self.create_inner(request).await;
        self.observe("create", started, &result);
        result
    }

    pub async fn update(&self, id: Uuid, patch: BookingPatch) -> Result<DeliveryBooking, AppError> {
        let started = Instant::now();
        let result = self.update_inner(id, patch).await;
        self.observe("update", started, &result);
        result
    }

    pub async fn reschedule(
        &self,
        id: Uuid,
        request: RescheduleRequest,
    ) -> Result<RescheduleOutcome, AppError> {
        let started = Instant::now();
        let result = self.reschedule_inner(id, request).await;
        self.observe("reschedule", started, &result);
        result
    }

    pub async fn confirm(
        &self,
        token: &str,
        customer_notes: Option<String>,
    ) -> Result<DeliveryBooking, AppError> {
        let started = Instant::now();
        let result = self.confirm_inner(token, customer_notes).await;
        self.observe("confirm", started, &result);
        result
    }

    pub async fn cancel(&self, id: Uuid, reason: String) -> Result<DeliveryBooking, AppError> {
        let started = Instant::now();
        let result = self.cancel_inner(id, reason).await;
        self.observe("cancel", started, &result);
        result
    }

    pub fn get(&self, id: Uuid) -> Result<DeliveryBooking, AppError> {
        self.load(id)
    }

    pub fn history(&self, order_id: Uuid) -> Result<Vec<DeliveryBooking>, AppError> {
        let mut chain = self.store.bookings_for_order(order_id)?;
        chain.sort_by_key(|b| b.created_at);
        Ok(chain)
    }

    pub fn list(
        &self,
        filter: &BookingFilter,
        page: PageRequest,
    ) -> Result<Page<DeliveryBooking>, AppError> {
        if let (Some(from), Some(to)) = (filter.date_from, filter.date_to)
            && to < from
        {
            return Err(AppError::BadRequest("date_to is before date_from".to_string()));
        }

        let candidates = match filter.order_id {
            Some(order_id) => self.store.bookings_for_order(order_id)?,
            None => self.store.bookings_between(
                filter.date_from.unwrap_or(NaiveDate::MIN),
                filter.date_to.unwrap_or(NaiveDate::MAX),
            )?,
        };

        let mut matching: Vec<DeliveryBooking> = candidates
            .into_iter()
            .filter(|b| filter.matches(b))
            .collect();
        matching.sort_by_key(|b| (b.scheduled_date, b.window.start, b.created_at));

        let per_page = page.per_page.clamp(1, self.config.max_page_size.max(1));
        let page_number = page.page.max(1);
        let total = matching.len();
        let items = matching
            .into_iter()
            .skip((page_number - 1).saturating_mul(per_page))
            .take(per_page)
            .collect();

        Ok(Page {
            items,
            page: page_number,
            per_page,
            total,
        })
    }

    async fn create_inner(&self, request: NewBooking) -> Result<DeliveryBooking, AppError> {
        request.window.validate()?;

        let locks = self
            .locks
            .acquire([
                LockKey::Order(request.order_id),
                LockKey::Day(request.scheduled_date),
            ])
            .await;
        let result = self.create_locked(request);
        drop(locks);

        self.attach_suggestions(result)
    }

    fn create_locked(&self, request: NewBooking) -> Result<DeliveryBooking, AppError> {
        let order = self
            .collaborators
            .orders
            .deliverable_order(request.order_id)?
            .ok_or(AppError::OrderNotDeliverable(request.order_id))?;

        if let Some(existing) = self.active_booking_for_order(order.id)? {
            return Err(AppError::DuplicateActiveBooking {
                order_id: order.id,
                booking_id: existing.id,
            });
        }
        if let Some(distributor_id) = request.distributor_id {
            self.ensure_active_distributor(distributor_id)?;
        }
        let address = self.resolve_address(request.address.as_deref(), &order)?;

        let date = request.scheduled_date;
        let slot = request
            .slot
            .unwrap_or_else(|| TimeSlot::containing(request.window.start));
        let key = SlotKey::new(date, slot);

        let day = self.store.bookings_on(date)?;
        let conflicts = overlapping_in(day.iter().cloned(), date, &request.window, None);
        if !conflicts.is_empty() {
            warn!(
                order_id = %order.id,
                %date,
                conflicts = conflicts.len(),
                "create rejected: window overlaps"
            );
            return Err(AppError::SlotConflict { conflicts });
        }

        let mut changes = ChangeSet::new();
        let capacity = self
            .ledger
            .reconcile(key, count_active(&day, key), &mut changes)?;
        if capacity.available() == 0 {
            return Err(capacity_exceeded(&capacity));
        }

        let confirmation_token = if request.confirmation_required {
            Some(self.fresh_token()?)
        } else {
            None
        };
        let contact = request.contact.unwrap_or_else(|| ContactSnapshot {
            name: order.customer_name.clone(),
            phone: order.customer_phone.clone(),
        });

        let now = Utc::now();
        let booking = DeliveryBooking {
            id: Uuid::new_v4(),
            order_id: order.id,
            distributor_id: request.distributor_id,
            scheduled_date: date,
            window: request.window,
            slot,
            delivery_type: request.delivery_type,
            priority: request.priority,
            address,
            contact,
            instructions: request.instructions.filter(|text| !text.trim().is_empty()),
            fee: request.fee,
            status: BookingStatus::Scheduled,
            confirmation_token,
            rescheduled_from: None,
            cancellation_reason: None,
            reschedule_reason: None,
            notes: Vec::new(),
            created_at: now,
            updated_at: now,
            confirmed_at: None,
            delivered_at: None,
        };

        changes.put_booking(booking.clone());
        self.ledger.adjust(key, 1, &mut changes)?;
        if let Some(distributor_id) = booking.distributor_id {
            changes.put_tracking(TrackingRecord::seed(booking.id, distributor_id, now));
        }
        self.commit_with_delivery_date(order.id, Some(date), changes)?;

        info!(
            booking_id = %booking.id,
            order_id = %booking.order_id,
            %date,
            %slot,
            "delivery booked"
        );
        Ok(booking)
    }

    async fn update_inner(
        &self,
        id: Uuid,
        patch: BookingPatch,
    ) -> Result<DeliveryBooking, AppError> {
        if let Some(window) = &patch.window {
            window.validate()?;
        }
        if let Some(status @ (BookingStatus::Cancelled | BookingStatus::Rescheduled)) =
            patch.status
        {
            return Err(AppError::BadRequest(format!(
                "status {status} is only reachable through its own operation"
            )));
        }

        for _ in 0..MAX_LOCK_ATTEMPTS {
            let current = self.load(id)?;
            let target = patch.scheduled_date.unwrap_or(current.scheduled_date);
            let locks = self
                .locks
                .acquire([
                    LockKey::Order(current.order_id),
                    LockKey::Day(current.scheduled_date),
                    LockKey::Day(target),
                ])
                .await;

            let fresh = self.load(id)?;
            if !locks.covers(LockKey::Day(fresh.scheduled_date)) {
                continue;
            }
            let result = self.update_locked(fresh, patch);
            drop(locks);
            return self.attach_suggestions(result);
        }

        Err(moved_while_locking(id))
    }

    fn update_locked(
        &self,
        mut booking: DeliveryBooking,
        patch: BookingPatch,
    ) -> Result<DeliveryBooking, AppError> {
        let now = Utc::now();

        if booking.status.is_terminal() {
            if !patch.is_notes_only() {
                return Err(AppError::Immutable {
                    id: booking.id,
                    status: booking.status,
                });
            }
            if let Some(note) = patch.notes {
                booking.append_note(note, now);
            }
            booking.updated_at = now;
            let mut changes = ChangeSet::new();
            changes.put_booking(booking.clone());
            self.store.commit(changes)?;
            return Ok(booking);
        }

        let previous_date = booking.scheduled_date;
        let previous_key = booking.slot_key();
        let mut changes = ChangeSet::new();

        if patch.touches_schedule() {
            let date = patch.scheduled_date.unwrap_or(booking.scheduled_date);
            let window = patch.window.unwrap_or(booking.window);
            let slot = patch.slot.unwrap_or(booking.slot);
            let key = SlotKey::new(date, slot);

            let day = self.store.bookings_on(date)?;
            let conflicts = overlapping_in(day.iter().cloned(), date, &window, Some(booking.id));
            if !conflicts.is_empty() {
                warn!(
                    booking_id = %booking.id,
                    %date,
                    conflicts = conflicts.len(),
                    "update rejected: window overlaps"
                );
                return Err(AppError::SlotConflict { conflicts });
            }

            if key != previous_key {
                let capacity = self
                    .ledger
                    .reconcile(key, count_active(&day, key), &mut changes)?;
                if capacity.available() == 0 {
                    return Err(capacity_exceeded(&capacity));
                }

                let previous_day = if previous_date == date {
                    day
                } else {
                    self.store.bookings_on(previous_date)?
                };
                self.ledger.reconcile(
                    previous_key,
                    count_active(&previous_day, previous_key),
                    &mut changes,
                )?;
                self.ledger.adjust(previous_key, -1, &mut changes)?;
                self.ledger.adjust(key, 1, &mut changes)?;
            }

            booking.scheduled_date = date;
            booking.window = window;
            booking.slot = slot;
        }

        if let Some(distributor_id) = patch.distributor_id {
            match distributor_id {
                Some(id) => {
                    self.ensure_active_distributor(id)?;
                    self.assign_tracking(&booking, id, now, &mut changes)?;
                }
                None => self.detach_tracking(&booking, now, &mut changes)?,
            }
            booking.distributor_id = distributor_id;
        }
        if let Some(delivery_type) = patch.delivery_type {
            booking.delivery_type = delivery_type;
        }
        if let Some(priority) = patch.priority {
            booking.priority = priority;
        }
        if let Some(address) = patch.address {
            let address = address.trim();
            if address.is_empty() {
                return Err(AppError::BadRequest("address cannot be empty".to_string()));
            }
            booking.address = address.to_string();
        }
        if let Some(contact) = patch.contact {
            booking.contact = contact;
        }
        if let Some(instructions) = patch.instructions {
            booking.instructions = instructions;
        }
        if let Some(fee) = patch.fee {
            booking.fee = fee;
        }
        if let Some(status) = patch.status {
            apply_transition(&mut booking, status, now)?;
        }
        if let Some(note) = patch.notes {
            booking.append_note(note, now);
        }
        booking.updated_at = now;
        changes.put_booking(booking.clone());

        if booking.scheduled_date == previous_date {
            self.store.commit(changes)?;
        } else {
            self.commit_with_delivery_date(
                booking.order_id,
                Some(booking.scheduled_date),
                changes,
            )?;
        }

        info!(booking_id = %booking.id, status = %booking.status, "booking updated");
        Ok(booking)
    }

    async fn reschedule_inner(
        &self,
        id: Uuid,
        request: RescheduleRequest,
    ) -> Result<RescheduleOutcome, AppError> {
        request.window.validate()?;

        for _ in 0..MAX_LOCK_ATTEMPTS {
            let current = self.load(id)?;
            let locks = self
                .locks
                .acquire([
                    LockKey::Order(current.order_id),
                    LockKey::Day(current.scheduled_date),
                    LockKey::Day(request.scheduled_date),
                ])
                .await;

            let fresh = self.load(id)?;
            if !locks.covers(LockKey::Day(fresh.scheduled_date)) {
                continue;
            }
            let result = self.reschedule_locked(fresh, request);
            drop(locks);
            return self.attach_suggestions(result);
        }

        Err(moved_while_locking(id))
    }

    fn reschedule_locked(
        &self,
        old: DeliveryBooking,
        request: RescheduleRequest,
    ) -> Result<RescheduleOutcome, AppError> {
        ensure_can_transition(&old, BookingStatus::Rescheduled)?;

        let distributor_id = request.distributor_id.or(old.distributor_id);
        if let Some(distributor_id) = distributor_id {
            self.ensure_active_distributor(distributor_id)?;
        }

        let date = request.scheduled_date;
        let slot = request
            .slot
            .unwrap_or_else(|| TimeSlot::containing(request.window.start));
        let old_key = old.slot_key();
        let new_key = SlotKey::new(date, slot);

        let new_day = self.store.bookings_on(date)?;
        let conflicts =
            overlapping_in(new_day.iter().cloned(), date, &request.window, Some(old.id));
        if !conflicts.is_empty() {
            warn!(
                booking_id = %old.id,
                %date,
                conflicts = conflicts.len(),
                "reschedule rejected: window overlaps"
            );
            return Err(AppError::SlotConflict { conflicts });
        }

        let mut changes = ChangeSet::new();
        if new_key != old_key {
            let capacity = self
                .ledger
                .reconcile(new_key, count_active(&new_day, new_key), &mut changes)?;
            if capacity.available() == 0 {
                return Err(capacity_exceeded(&capacity));
            }
        }
        let old_day = if old.scheduled_date == date {
            new_day
        } else {
            self.store.bookings_on(old.scheduled_date)?
        };
        self.ledger
            .reconcile(old_key, count_active(&old_day, old_key), &mut changes)?;

        let now = Utc::now();
        let reason = request.reason.trim().to_string();
        let mut previous = old;
        previous.status = BookingStatus::Rescheduled;
        previous.reschedule_reason = (!reason.is_empty()).then(|| reason.clone());
        previous.updated_at = now;

        let replacement = DeliveryBooking {
            id: Uuid::new_v4(),
            order_id: previous.order_id,
            distributor_id,
            scheduled_date: date,
            window: request.window,
            slot,
            delivery_type: previous.delivery_type,
            priority: previous.priority,
            address: previous.address.clone(),
            contact: previous.contact.clone(),
            instructions: previous.instructions.clone(),
            fee: previous.fee,
            status: BookingStatus::Scheduled,
            confirmation_token: Some(self.fresh_token()?),
            rescheduled_from: Some(previous.id),
            cancellation_reason: None,
            reschedule_reason: None,
            notes: Vec::new(),
            created_at: now,
            updated_at: now,
            confirmed_at: None,
            delivered_at: None,
        };

        changes.put_booking(previous.clone());
        changes.put_booking(replacement.clone());
        self.ledger.adjust(old_key, -1, &mut changes)?;
        self.ledger.adjust(new_key, 1, &mut changes)?;
        if let Some(distributor_id) = replacement.distributor_id {
            changes.put_tracking(TrackingRecord::seed(replacement.id, distributor_id, now));
        }
        self.commit_with_delivery_date(previous.order_id, Some(date), changes)?;

        info!(
            old_booking_id = %previous.id,
            booking_id = %replacement.id,
            from = %previous.scheduled_date,
            to = %date,
            reason = %reason,
            "delivery rescheduled"
        );
        Ok(RescheduleOutcome {
            old: previous,
            new: replacement,
        })
    }

    async fn confirm_inner(
        &self,
        token: &str,
        customer_notes: Option<String>,
    ) -> Result<DeliveryBooking, AppError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AppError::InvalidOrExpiredToken);
        }
        let found = self
            .store
            .booking_by_token(token)?
            .ok_or(AppError::InvalidOrExpiredToken)?;

        let _locks = self.locks.acquire([LockKey::Order(found.order_id)]).await;

        let mut booking = self.load(found.id)?;
        if booking.status != BookingStatus::Scheduled
            || booking.confirmation_token.as_deref() != Some(token)
        {
            return Err(AppError::InvalidOrExpiredToken);
        }

        let now = Utc::now();
        apply_transition(&mut booking, BookingStatus::Confirmed, now)?;
        if let Some(notes) = customer_notes {
            booking.append_instructions(&notes);
        }
        booking.updated_at = now;

        let mut changes = ChangeSet::new();
        changes.put_booking(booking.clone());
        self.store.commit(changes)?;

        info!(booking_id = %booking.id, "delivery confirmed by customer");
        Ok(booking)
    }

    async fn cancel_inner(&self, id: Uuid, reason: String) -> Result<DeliveryBooking, AppError> {
        for _ in 0..MAX_LOCK_ATTEMPTS {
            let current = self.load(id)?;
            let locks = self
                .locks
                .acquire([
                    LockKey::Order(current.order_id),
                    LockKey::Day(current.scheduled_date),
                ])
                .await;

            let fresh = self.load(id)?;
            if !locks.covers(LockKey::Day(fresh.scheduled_date)) {
                continue;
            }
            return self.cancel_locked(fresh, reason);
        }

        Err(moved_while_locking(id))
    }

    fn cancel_locked(
        &self,
        mut booking: DeliveryBooking,
        reason: String,
    ) -> Result<DeliveryBooking, AppError> {
        ensure_can_transition(&booking, BookingStatus::Cancelled)?;

        let key = booking.slot_key();
        let day = self.store.bookings_on(booking.scheduled_date)?;
        let mut changes = ChangeSet::new();
        self.ledger
            .reconcile(key, count_active(&day, key), &mut changes)?;
        self.ledger.adjust(key, -1, &mut changes)?;

        let now = Utc::now();
        let reason = reason.trim().to_string();
        booking.status = BookingStatus::Cancelled;
        booking.cancellation_reason = (!reason.is_empty()).then_some(reason);
        booking.updated_at = now;
        changes.put_booking(booking.clone());

        self.commit_with_delivery_date(booking.order_id, None, changes)?;

        info!(booking_id = %booking.id, order_id = %booking.order_id, "delivery cancelled");
        Ok(booking)
    }

    fn active_booking_for_order(
        &self,
        order_id: Uuid,
    ) -> Result<Option<DeliveryBooking>, AppError> {
        Ok(self
            .store
            .bookings_for_order(order_id)?
            .into_iter()
            .find(DeliveryBooking::is_active))
    }

    fn resolve_address(&self, requested: Option<&str>, order: &Order) -> Result<String, AppError> {
        if let Some(address) = requested.map(str::trim).filter(|a| !a.is_empty()) {
            return Ok(address.to_string());
        }
        if let Some(address) = order
            .shipping_address
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
        {
            return Ok(address.to_string());
        }
        if let Some(store_id) = order.store_id
            && let Some(address) = self.collaborators.stores.default_address(store_id)?
        {
            return Ok(address);
        }

        Err(AppError::BadRequest(format!(
            "order {} has no delivery address",
            order.id
        )))
    }

    /// Seeds tracking when the booking gains a distributor. A record that belonged to
    /// someone else, or was detached by an unassign, restarts for the new distributor.
    fn assign_tracking(
        &self,
        booking: &DeliveryBooking,
        distributor_id: Uuid,
        now: chrono::DateTime<Utc>,
        changes: &mut ChangeSet,
    ) -> Result<(), AppError> {
        match self.store.tracking_for_booking(booking.id)? {
            Some(record)
                if record.distributor_id == distributor_id
                    && booking.distributor_id == Some(distributor_id) => {}
            Some(mut record) => {
                record.distributor_id = distributor_id;
                record.status = TrackingStatus::EnRoute;
                record.location = None;
                record.started_at = None;
                record.progress_percentage = 0;
                record.updated_at = now;
                changes.put_tracking(record);
            }
            None => changes.put_tracking(TrackingRecord::seed(booking.id, distributor_id, now)),
        }
        Ok(())
    }

    fn detach_tracking(
        &self,
        booking: &DeliveryBooking,
        now: chrono::DateTime<Utc>,
        changes: &mut ChangeSet,
    ) -> Result<(), AppError> {
        if booking.distributor_id.is_none() {
            return Ok(());
        }
        if let Some(mut record) = self.store.tracking_for_booking(booking.id)? {
            record.status = TrackingStatus::Failed;
            record.notes.push("distributor unassigned".to_string());
            record.updated_at = now;
            changes.put_tracking(record);
        }
        Ok(())
    }

    fn attach_suggestions<T>(&self, result: Result<T, AppError>) -> Result<T, AppError> {
        match result {
            Err(AppError::CapacityExceeded {
                date,
                slot,
                max_bookings,
                booked,
                ..
            }) => {
                let horizon_days = u64::try_from(self.config.suggestion_horizon_days).unwrap_or(0);
                let horizon = date
                    .checked_add_days(Days::new(horizon_days))
                    .unwrap_or(NaiveDate::MAX);
                let suggestions = self
                    .suggested_slots(date, horizon, self.config.suggestion_limit)
                    .unwrap_or_else(|err| {
                        warn!(error = %err, "could not compute slot suggestions");
                        Vec::new()
                    });
                Err(AppError::CapacityExceeded {
                    date,
                    slot,
                    max_bookings,
                    booked,
                    suggestions,
                })
            }
            other => other,
        }
    }
}

fn capacity_exceeded(record: &CapacityRecord) -> AppError {
    warn!(
        date = %record.date,
        slot = %record.slot,
        booked = record.booked,
        max = record.max_bookings,
        "slot is full"
    );
    AppError::CapacityExceeded {
        date: record.date,
        slot: record.slot,
        max_bookings: record.max_bookings,
        booked: record.booked,
        suggestions: Vec::new(),
    }
}

fn moved_while_locking(id: Uuid) -> AppError {
    AppError::TransientFailure(format!("booking {id} changed while acquiring locks"))
}

fn ensure_can_transition(booking: &DeliveryBooking, next: BookingStatus) -> Result<(), AppError> {
    if booking.status.is_terminal() {
        return Err(AppError::Immutable {
            id: booking.id,
            status: booking.status,
        });
    }
    if !booking.status.can_transition_to(next) {
        return Err(AppError::InvalidTransition {
            from: booking.status,
            to: next,
        });
    }
    Ok(())
}

fn apply_transition(
    booking: &mut DeliveryBooking,
    next: BookingStatus,
    now: chrono::DateTime<Utc>,
) -> Result<(), AppError> {
    if booking.status == next {
        return Ok(());
    }
    ensure_can_transition(booking, next)?;

    booking.status = next;
    match next {
        BookingStatus::Confirmed => booking.confirmed_at = Some(now),
        BookingStatus::Delivered => booking.delivered_at = Some(now),
        _ => {}
    }
    Ok(())
}
