use chrono::NaiveDate;
use uuid::Uuid;

use crate::models::booking::{DeliveryBooking, TimeWindow};
use crate::store::{ScheduleStore, StoreError};

/// Active bookings on `date` overlapping `window`. `exclude` skips the booking being moved.
pub fn find_overlapping(
    store: &dyn ScheduleStore,
    date: NaiveDate,
    window: &TimeWindow,
    exclude: Option<Uuid>,
) -> Result<Vec<DeliveryBooking>, StoreError> {
    let candidates = store.bookings_on(date)?;
    Ok(overlapping_in(candidates, date, window, exclude))
}

pub(crate) fn overlapping_in(
    candidates: impl IntoIterator<Item = DeliveryBooking>,
    date: NaiveDate,
    window: &TimeWindow,
    exclude: Option<Uuid>,
) -> Vec<DeliveryBooking> {
    let mut hits: Vec<DeliveryBooking> = candidates
        .into_iter()
        .filter(|b| b.scheduled_date == date)
        .filter(|b| b.is_active())
        .filter(|b| Some(b.id) != exclude)
        .filter(|b| b.window.overlaps(window))
        .collect();
    hits.sort_by_key(|b| (b.window.start, b.created_at));
    hits
}
