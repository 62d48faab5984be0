use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};

use crate::types::{CoreError, CoreResult, BOOKING_DURATION_MIN, MAX_PAX};

/// Occupancy window of a booking: 105 minutes starting at the requested
/// time, half-open on the right.
pub fn booking_window(date: NaiveDate, time: NaiveTime) -> (NaiveDateTime, NaiveDateTime) {
    let start = date.and_time(time);
    (start, start + Duration::minutes(BOOKING_DURATION_MIN))
}

/// Half-open interval overlap: touching boundaries do not collide.
pub fn overlaps(
    a_start: NaiveDateTime,
    a_end: NaiveDateTime,
    b_start: NaiveDateTime,
    b_end: NaiveDateTime,
) -> bool {
    a_start < b_end && a_end > b_start
}

pub fn parse_booking_date(raw: &str) -> CoreResult<NaiveDate> {
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| CoreError::Validation(format!("'{raw}' is not a valid date")))?;
    if date < chrono::Local::now().date_naive() {
        return Err(CoreError::Validation("date must be today or later".into()));
    }
    Ok(date)
}

pub fn parse_booking_time(raw: &str) -> CoreResult<NaiveTime> {
    NaiveTime::parse_from_str(raw, "%H:%M")
        .map_err(|_| CoreError::Validation(format!("'{raw}' is not a valid HH:MM time")))
}

pub fn validate_pax(pax: i32) -> CoreResult<()> {
    if pax < 1 || pax > MAX_PAX {
        return Err(CoreError::Validation(format!(
            "party size must be between 1 and {MAX_PAX}"
        )));
    }
    Ok(())
}

/// Bookable start times for a day, stepped by the configured interval.
/// Walks minutes-since-midnight so a step can never wrap past midnight.
pub fn slot_times(opens_at: NaiveTime, closes_at: NaiveTime, interval_min: i32) -> Vec<NaiveTime> {
    use chrono::Timelike;

    let mut slots = vec![];
    if interval_min <= 0 || opens_at >= closes_at {
        return slots;
    }
    let close_min = closes_at.hour() * 60 + closes_at.minute();
    let mut cursor = opens_at.hour() * 60 + opens_at.minute();
    while cursor < close_min {
        if let Some(time) = NaiveTime::from_hms_opt(cursor / 60, cursor % 60, 0) {
            slots.push(time);
        }
        cursor += interval_min as u32;
    }
    slots
}
