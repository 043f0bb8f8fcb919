use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Instant;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::ledger::count_active;
use super::locks::LockKey;
use super::Scheduler;
use crate::error::AppError;
use crate::models::booking::{
    BookingStatus, DeliveryBooking, DeliveryFee, DeliveryType, Priority, TimeSlot, TimeWindow,
};
use crate::models::capacity::{CapacityRecord, SlotKey};
use crate::store::ChangeSet;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CalendarFilter {
    pub status: Option<BookingStatus>,
    pub slot: Option<TimeSlot>,
    pub distributor_id: Option<Uuid>,
    pub delivery_type: Option<DeliveryType>,
}

impl CalendarFilter {
    fn matches(&self, booking: &DeliveryBooking) -> bool {
        let status_ok = match self.status {
            Some(status) => booking.status == status,
            // Superseded bookings would double count a reschedule.
            None => booking.status != BookingStatus::Rescheduled,
        };
        status_ok
            && self.slot.is_none_or(|slot| booking.slot == slot)
            && self
                .distributor_id
                .is_none_or(|id| booking.distributor_id == Some(id))
            && self
                .delivery_type
                .is_none_or(|kind| booking.delivery_type == kind)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct StatusCounts {
    pub delivered: u32,
    /// Scheduled or confirmed.
    pub pending: u32,
    pub in_progress: u32,
    pub missed: u32,
    pub total: u32,
}

impl StatusCounts {
    fn record(&mut self, status: BookingStatus) {
        match status {
            BookingStatus::Delivered => self.delivered += 1,
            BookingStatus::Scheduled | BookingStatus::Confirmed => self.pending += 1,
            BookingStatus::InProgress => self.in_progress += 1,
            BookingStatus::Missed => self.missed += 1,
            BookingStatus::Cancelled | BookingStatus::Rescheduled => {}
        }
        self.total += 1;
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BookingSummary {
    pub id: Uuid,
    pub order_id: Uuid,
    pub distributor_id: Option<Uuid>,
    pub scheduled_date: NaiveDate,
    pub window: TimeWindow,
    pub slot: TimeSlot,
    pub status: BookingStatus,
    pub delivery_type: DeliveryType,
    pub priority: Priority,
    pub address: String,
    pub contact_name: String,
    pub fee: DeliveryFee,
}

impl From<&DeliveryBooking> for BookingSummary {
    fn from(booking: &DeliveryBooking) -> Self {
        Self {
            id: booking.id,
            order_id: booking.order_id,
            distributor_id: booking.distributor_id,
            scheduled_date: booking.scheduled_date,
            window: booking.window,
            slot: booking.slot,
            status: booking.status,
            delivery_type: booking.delivery_type,
            priority: booking.priority,
            address: booking.address.clone(),
            contact_name: booking.contact.name.clone(),
            fee: booking.fee,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CalendarDay {
    pub counts: StatusCounts,
    /// Summed over active bookings only.
    pub total_fee: DeliveryFee,
    pub bookings: Vec<BookingSummary>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SlotAvailability {
    pub date: NaiveDate,
    pub slot: TimeSlot,
    pub max_bookings: u32,
    pub booked: u32,
    pub available: u32,
    pub percentage: f64,
    pub by_status: BTreeMap<BookingStatus, u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CapacityOverview {
    pub slots: Vec<SlotAvailability>,
    pub suggestions: Vec<SlotAvailability>,
}

impl Scheduler {
    pub fn calendar(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        filter: &CalendarFilter,
    ) -> Result<BTreeMap<NaiveDate, CalendarDay>, AppError> {
        self.validate_range(from, to)?;

        let mut days: BTreeMap<NaiveDate, CalendarDay> = days_between(from, to)
            .map(|date| (date, CalendarDay::default()))
            .collect();

        let mut bookings = self.store.bookings_between(from, to)?;
        bookings.retain(|b| filter.matches(b));
        bookings.sort_by_key(|b| (b.scheduled_date, b.window.start, b.created_at));

        for booking in &bookings {
            let Some(day) = days.get_mut(&booking.scheduled_date) else {
                continue;
            };
            day.counts.record(booking.status);
            if booking.is_active() {
                day.total_fee += booking.fee;
            }
            day.bookings.push(BookingSummary::from(booking));
        }

        Ok(days)
    }

    /// Per (date, slot) occupancy. Ledger rows that disagree with live bookings
    /// are overwritten before the summary is built.
    pub async fn capacity_summary(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        slot: Option<TimeSlot>,
    ) -> Result<Vec<SlotAvailability>, AppError> {
        self.validate_range(from, to)?;
        self.heal_drift(from, to).await?;
        self.capacity_snapshot(from, to, slot)
    }

    pub fn capacity_snapshot(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        slot: Option<TimeSlot>,
    ) -> Result<Vec<SlotAvailability>, AppError> {
        let rows: HashMap<SlotKey, CapacityRecord> = self
            .ledger
            .summarize(from, to)?
            .into_iter()
            .map(|row| (row.key(), row))
            .collect();

        let mut live: HashMap<SlotKey, BTreeMap<BookingStatus, u32>> = HashMap::new();
        for booking in self.store.bookings_between(from, to)? {
            if booking.is_active() {
                *live
                    .entry(booking.slot_key())
                    .or_default()
                    .entry(booking.status)
                    .or_default() += 1;
            }
        }

        let slots: Vec<TimeSlot> = match slot {
            Some(slot) => vec![slot],
            None => TimeSlot::ALL.to_vec(),
        };

        let mut summary = Vec::new();
        for date in days_between(from, to) {
            for slot in &slots {
                let key = SlotKey::new(date, *slot);
                let by_status = live.remove(&key).unwrap_or_default();
                let booked: u32 = by_status.values().sum();
                let mut record = rows
                    .get(&key)
                    .cloned()
                    .unwrap_or_else(|| CapacityRecord::new(key, self.ledger.default_max()));
                record.booked = booked;

                summary.push(SlotAvailability {
                    date,
                    slot: *slot,
                    max_bookings: record.max_bookings,
                    booked,
                    available: record.available(),
                    percentage: record.percentage(),
                    by_status,
                });
            }
        }

        Ok(summary)
    }

    pub fn suggested_slots(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        limit: usize,
    ) -> Result<Vec<SlotAvailability>, AppError> {
        if limit == 0 || to < from {
            return Ok(Vec::new());
        }
        Ok(self
            .capacity_snapshot(from, to, None)?
            .into_iter()
            .filter(|slot| slot.available > 0)
            .take(limit)
            .collect())
    }

    pub async fn capacity_overview(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        slot: Option<TimeSlot>,
    ) -> Result<CapacityOverview, AppError> {
        let slots = self.capacity_summary(from, to, slot).await?;
        // Suggestions span every slot, not just the filtered one.
        let suggestions = self.suggested_slots(from, to, self.config.suggestion_limit)?;
        Ok(CapacityOverview { slots, suggestions })
    }

    /// Admin override of a slot's ceiling. Existing bookings are kept even when
    /// `max_bookings` drops below them.
    pub async fn set_capacity(
        &self,
        date: NaiveDate,
        slot: TimeSlot,
        max_bookings: u32,
    ) -> Result<CapacityRecord, AppError> {
        let started = Instant::now();
        let result = self.set_capacity_inner(date, slot, max_bookings).await;
        self.observe("set_capacity", started, &result);
        result
    }

    async fn set_capacity_inner(
        &self,
        date: NaiveDate,
        slot: TimeSlot,
        max_bookings: u32,
    ) -> Result<CapacityRecord, AppError> {
        let _locks = self.locks.acquire([LockKey::Day(date)]).await;

        let key = SlotKey::new(date, slot);
        let day = self.store.bookings_on(date)?;
        let mut changes = ChangeSet::new();
        self.ledger
            .reconcile(key, count_active(&day, key), &mut changes)?;
        let record = self.ledger.set_max(key, max_bookings, &mut changes)?;
        self.store.commit(changes)?;

        info!(%date, %slot, max_bookings, booked = record.booked, "slot capacity overridden");
        Ok(record)
    }

    pub(crate) fn validate_range(&self, from: NaiveDate, to: NaiveDate) -> Result<(), AppError> {
        if to < from {
            return Err(AppError::BadRequest(format!(
                "range end {to} is before start {from}"
            )));
        }
        let days = (to - from).num_days() + 1;
        if days > self.config.max_range_days {
            return Err(AppError::BadRequest(format!(
                "range spans {days} days; at most {} allowed",
                self.config.max_range_days
            )));
        }
        Ok(())
    }

    async fn heal_drift(&self, from: NaiveDate, to: NaiveDate) -> Result<(), AppError> {
        let rows = self.ledger.summarize(from, to)?;
        if rows.is_empty() {
            return Ok(());
        }
        let bookings = self.store.bookings_between(from, to)?;

        let drifted: BTreeSet<NaiveDate> = rows
            .iter()
            .filter(|row| count_active(&bookings, row.key()) != row.booked)
            .map(|row| row.date)
            .collect();

        for date in drifted {
            let _locks = self.locks.acquire([LockKey::Day(date)]).await;

            let day = self.store.bookings_on(date)?;
            let mut changes = ChangeSet::new();
            for slot in TimeSlot::ALL {
                let key = SlotKey::new(date, slot);
                if self.store.capacity(key)?.is_some() {
                    self.ledger
                        .reconcile(key, count_active(&day, key), &mut changes)?;
                }
            }
            if !changes.is_empty() {
                self.store.commit(changes)?;
            }
        }
        Ok(())
    }
}

// Inclusive of `to`, even at `NaiveDate::MAX`.
fn days_between(from: NaiveDate, to: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    std::iter::successors(Some(from), |date| date.succ_opt()).take_while(move |date| *date <= to)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::engine::scheduling::RescheduleRequest;
    use crate::store::ScheduleStore;

    #[tokio::test]
    async fn calendar_covers_every_day_and_counts_statuses() {
        let h = harness(5);
        let first = day(2024, 6, 1);
        let mut req = request(h.order(), first, window((9, 0), (10, 0)), TimeSlot::Morning);
        req.fee = DeliveryFee {
            amount: 500,
            amount_local: 18_000,
        };
        let booked = h.scheduler.create(req).await.unwrap();

        let mut req = request(h.order(), first, window((14, 0), (15, 0)), TimeSlot::Afternoon);
        req.fee = DeliveryFee {
            amount: 300,
            amount_local: 10_800,
        };
        let cancelled = h.scheduler.create(req).await.unwrap();
        h.scheduler.cancel(cancelled.id, "no stock".to_string()).await.unwrap();

        let days = h
            .scheduler
            .calendar(first, day(2024, 6, 3), &CalendarFilter::default())
            .unwrap();

        assert_eq!(days.len(), 3);
        let june_first = &days[&first];
        assert_eq!(june_first.counts.pending, 1);
        assert_eq!(june_first.counts.total, 2);
        assert_eq!(june_first.total_fee.amount, 500);
        assert_eq!(june_first.total_fee.amount_local, 18_000);
        assert_eq!(june_first.bookings[0].id, booked.id);
        assert!(days[&day(2024, 6, 2)].bookings.is_empty());
    }

    #[tokio::test]
    async fn calendar_hides_superseded_bookings_by_default() {
        let h = harness(5);
        let date = day(2024, 6, 1);
        let booking = h
            .scheduler
            .create(request(h.order(), date, window((9, 0), (10, 0)), TimeSlot::Morning))
            .await
            .unwrap();
        h.scheduler
            .reschedule(
                booking.id,
                RescheduleRequest {
                    scheduled_date: date,
                    window: window((15, 0), (16, 0)),
                    slot: None,
                    distributor_id: None,
                    reason: "later".to_string(),
                },
            )
            .await
            .unwrap();

        let days = h
            .scheduler
            .calendar(date, date, &CalendarFilter::default())
            .unwrap();
        assert_eq!(days[&date].bookings.len(), 1);
        assert_eq!(days[&date].bookings[0].slot, TimeSlot::Afternoon);

        let only_rescheduled = CalendarFilter {
            status: Some(BookingStatus::Rescheduled),
            ..Default::default()
        };
        let days = h.scheduler.calendar(date, date, &only_rescheduled).unwrap();
        assert_eq!(days[&date].bookings[0].id, booking.id);
    }

    #[test]
    fn range_is_bounded() {
        let h = harness(5);
        assert!(h.scheduler.validate_range(day(2024, 6, 2), day(2024, 6, 1)).is_err());
        assert!(h.scheduler.validate_range(day(2024, 1, 1), day(2024, 12, 31)).is_err());
        assert!(h.scheduler.validate_range(day(2024, 6, 1), day(2024, 6, 30)).is_ok());
    }

    #[tokio::test]
    async fn summary_synthesizes_missing_rows() {
        let h = harness(4);
        let date = day(2024, 6, 1);
        h.scheduler
            .create(request(h.order(), date, window((9, 0), (10, 0)), TimeSlot::Morning))
            .await
            .unwrap();

        let summary = h.scheduler.capacity_summary(date, date, None).await.unwrap();
        assert_eq!(summary.len(), 3);

        let morning = &summary[0];
        assert_eq!(morning.slot, TimeSlot::Morning);
        assert_eq!(morning.booked, 1);
        assert_eq!(morning.available, 3);
        assert_eq!(morning.percentage, 25.0);
        assert_eq!(morning.by_status.get(&BookingStatus::Scheduled), Some(&1));

        let evening = &summary[2];
        assert_eq!(evening.max_bookings, 4);
        assert_eq!(evening.booked, 0);
        assert!(h.store.capacity(SlotKey::new(date, TimeSlot::Evening)).unwrap().is_none());
    }

    #[tokio::test]
    async fn summary_heals_drifted_rows() {
        let h = harness(4);
        let date = day(2024, 6, 1);
        h.store.put_capacity_raw(CapacityRecord {
            booked: 3,
            ..CapacityRecord::new(SlotKey::new(date, TimeSlot::Evening), 4)
        });

        let summary = h
            .scheduler
            .capacity_summary(date, date, Some(TimeSlot::Evening))
            .await
            .unwrap();
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].booked, 0);
        assert_eq!(h.booked(date, TimeSlot::Evening), 0);
        assert_eq!(h.metrics.capacity_drift_total.get(), 1);
    }

    #[tokio::test]
    async fn override_below_booked_clamps_percentage() {
        let h = harness(4);
        let date = day(2024, 6, 1);
        for hour in [8u32, 10] {
            h.scheduler
                .create(request(
                    h.order(),
                    date,
                    window((hour, 0), (hour + 1, 0)),
                    TimeSlot::Morning,
                ))
                .await
                .unwrap();
        }

        let record = h
            .scheduler
            .set_capacity(date, TimeSlot::Morning, 1)
            .await
            .unwrap();
        assert_eq!(record.booked, 2);
        assert_eq!(record.available(), 0);

        let summary = h
            .scheduler
            .capacity_summary(date, date, Some(TimeSlot::Morning))
            .await
            .unwrap();
        assert_eq!(summary[0].available, 0);
        assert_eq!(summary[0].percentage, 100.0);
    }

    #[tokio::test]
    async fn suggestions_walk_slots_in_order() {
        let h = harness(1);
        let date = day(2024, 6, 1);
        h.scheduler
            .set_capacity(date, TimeSlot::Afternoon, 0)
            .await
            .unwrap();
        h.scheduler
            .create(request(h.order(), date, window((9, 0), (10, 0)), TimeSlot::Morning))
            .await
            .unwrap();

        let open = h
            .scheduler
            .suggested_slots(date, day(2024, 6, 2), 3)
            .unwrap();
        let keys: Vec<(NaiveDate, TimeSlot)> = open.iter().map(|s| (s.date, s.slot)).collect();
        assert_eq!(
            keys,
            vec![
                (date, TimeSlot::Evening),
                (day(2024, 6, 2), TimeSlot::Morning),
                (day(2024, 6, 2), TimeSlot::Afternoon),
            ]
        );
        assert!(h.scheduler.suggested_slots(date, date, 0).unwrap().is_empty());
    }

    #[tokio::test]
    async fn overview_pairs_summary_with_suggestions() {
        let h = harness(1);
        let date = day(2024, 6, 1);
        h.scheduler
            .create(request(h.order(), date, window((9, 0), (10, 0)), TimeSlot::Morning))
            .await
            .unwrap();

        let overview = h.scheduler.capacity_overview(date, date, None).await.unwrap();
        assert_eq!(overview.slots.len(), 3);
        assert_eq!(overview.suggestions.len(), 2);
        assert_eq!(overview.suggestions[0].slot, TimeSlot::Afternoon);
    }

    #[tokio::test]
    async fn slot_filtered_overview_still_suggests_other_slots() {
        let h = harness(1);
        let date = day(2024, 6, 1);
        h.scheduler
            .create(request(h.order(), date, window((9, 0), (10, 0)), TimeSlot::Morning))
            .await
            .unwrap();

        let overview = h
            .scheduler
            .capacity_overview(date, date, Some(TimeSlot::Morning))
            .await
            .unwrap();
        assert_eq!(overview.slots.len(), 1);
        assert_eq!(overview.slots[0].available, 0);
        let suggested: Vec<TimeSlot> = overview.suggestions.iter().map(|s| s.slot).collect();
        assert_eq!(suggested, vec![TimeSlot::Afternoon, TimeSlot::Evening]);
    }

    #[test]
    fn snapshot_reaches_the_last_representable_day() {
        let h = harness(2);
        let summary = h
            .scheduler
            .capacity_snapshot(NaiveDate::MAX, NaiveDate::MAX, None)
            .unwrap();
        assert_eq!(summary.len(), 3);
        assert!(summary.iter().all(|s| s.date == NaiveDate::MAX && s.available == 2));

        let days = h
            .scheduler
            .calendar(NaiveDate::MAX, NaiveDate::MAX, &CalendarFilter::default())
            .unwrap();
        assert_eq!(days.len(), 1);
    }
}
