use actix::Message;
use chrono::{NaiveDate, NaiveTime};

use crate::services::db_models::{
    Otp, Reservation, ReservationSetting, RestaurantSetting, RestaurantTable,
};
use crate::types::CoreResult;

#[derive(Message)]
#[rtype(result = "CoreResult<RestaurantTable>")]
pub struct FetchTable(pub i64);

/// Tables that can seat the party with no overlapping active reservation
/// inside the slot's occupancy window.
#[derive(Message)]
#[rtype(result = "CoreResult<Vec<RestaurantTable>>")]
pub struct FindFreeTables {
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub pax: i32,
}

#[derive(Message, Clone)]
#[rtype(result = "CoreResult<Reservation>")]
pub struct CreateReservation {
    pub table_id: i64,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub pax: i32,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    /// Inserts the reservation already confirmed (the synchronous direct
    /// path) instead of pending.
    pub confirmed: bool,
}

#[derive(Message)]
#[rtype(result = "CoreResult<Reservation>")]
pub struct FetchReservation(pub i64);

#[derive(Message)]
#[rtype(result = "CoreResult<Reservation>")]
pub struct ConfirmReservation {
    pub reservation_id: i64,
}

#[derive(Message)]
#[rtype(result = "CoreResult<Reservation>")]
pub struct CancelReservation {
    pub reservation_id: i64,
}

#[derive(Message)]
#[rtype(result = "CoreResult<Reservation>")]
pub struct MarkArrived {
    pub reservation_id: i64,
}

/// Soft-supersedes any live OTP for the phone, then issues a fresh one.
#[derive(Message)]
#[rtype(result = "CoreResult<Otp>")]
pub struct CreateOtp {
    pub phone: String,
    pub reservation_id: Option<i64>,
}

#[derive(Message)]
#[rtype(result = "CoreResult<Otp>")]
pub struct FetchOtpBySession(pub String);

/// Runs the full verify sequence: gate checks, attempt increment, code
/// comparison, mark-verified. Returns the verified OTP row.
#[derive(Message)]
#[rtype(result = "CoreResult<Otp>")]
pub struct VerifyOtp {
    pub session_id: String,
    pub code: String,
}

#[derive(Message)]
#[rtype(result = "CoreResult<Option<ReservationSetting>>")]
pub struct FetchDaySetting(pub NaiveDate);

#[derive(Message)]
#[rtype(result = "CoreResult<Option<RestaurantSetting>>")]
pub struct FetchRestaurantSetting;
