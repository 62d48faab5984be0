use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use diesel::Insertable;

use crate::schema::otps;
use crate::schema::reservations;

#[derive(Insertable, Clone)]
#[diesel(table_name = reservations)]
pub struct NewReservation {
    pub table_id: i64,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub pax: i32,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub start_at: NaiveDateTime,
    pub end_at: NaiveDateTime,
    pub status: String,
    pub otp_verified: bool,
    pub has_arrived: bool,
    pub otp_session: Option<String>,
    pub deposit_amount: i32,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Insertable, Clone)]
#[diesel(table_name = otps)]
pub struct NewOtp {
    pub phone: String,
    pub code: String,
    pub session_id: String,
    pub reservation_id: Option<i64>,
    pub is_verified: bool,
    pub expires_at: NaiveDateTime,
    pub attempts: i32,
    pub created_at: NaiveDateTime,
}
