//! Open-slot computation for the booking calendar.
//!
//! Business hours are fixed shop-wide: 09:00-18:00, one-hour slots, nine
//! candidates per day. A candidate is taken only when an existing appointment
//! starts at exactly that instant; overlapping bookings with a different
//! start are not considered a collision. That matches how the booking UI has
//! always offered slots, so it stays as-is (see DESIGN.md).

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

pub const OPENING_HOUR: u32 = 9;
pub const CLOSING_HOUR: u32 = 18;

/// Candidate slots for one barber on one date, in chronological order.
/// `booked_starts` are the start times of that barber's existing
/// appointments on the date; `now` removes already-passed slots when the
/// date is today. Stateless and recomputed per call.
pub fn open_slots(
    date: NaiveDate,
    booked_starts: &[NaiveDateTime],
    now: NaiveDateTime,
) -> Vec<NaiveDateTime> {
    let mut slots = Vec::new();
    for hour in OPENING_HOUR..CLOSING_HOUR {
        let slot = date.and_time(NaiveTime::from_hms_opt(hour, 0, 0).expect("valid slot time"));

        if date == now.date() && slot < now {
            continue;
        }
        if booked_starts.iter().any(|start| *start == slot) {
            continue;
        }
        slots.push(slot);
    }
    slots
}

/// Day bounds used to query a barber's appointments: [00:00:00, 23:59:59].
pub fn day_bounds(date: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
    (
        date.and_time(NaiveTime::from_hms_opt(0, 0, 0).expect("midnight")),
        date.and_time(NaiveTime::from_hms_opt(23, 59, 59).expect("end of day")),
    )
}
