use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use diesel::Queryable;
use serde::Serialize;

pub const STATUS_PENDING: &str = "pending";
pub const STATUS_CONFIRMED: &str = "confirmed";
pub const STATUS_CANCELLED: &str = "cancelled";

#[derive(Queryable, Debug, Clone, Serialize)]
pub struct RestaurantTable {
    pub id: i64,
    pub name: String,
    pub capacity: i32,
    pub is_available: bool,
    #[serde(skip)]
    pub created_at: NaiveDateTime,
    #[serde(skip)]
    pub updated_at: NaiveDateTime,
}

#[derive(Queryable, Debug, Clone, Serialize)]
pub struct Reservation {
    pub id: i64,
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
    pub arrived_at: Option<NaiveDateTime>,
    pub otp_session: Option<String>,
    pub deposit_amount: i32,
    #[serde(skip)]
    pub client_ip: Option<String>,
    #[serde(skip)]
    pub user_agent: Option<String>,
    #[serde(skip)]
    pub created_at: NaiveDateTime,
    #[serde(skip)]
    pub updated_at: NaiveDateTime,
}

impl Reservation {
    pub fn is_cancelled(&self) -> bool {
        self.status == STATUS_CANCELLED
    }

    pub fn is_confirmed(&self) -> bool {
        self.status == STATUS_CONFIRMED
    }
}

#[derive(Queryable, Debug, Clone, Serialize)]
pub struct Otp {
    pub id: i64,
    pub phone: String,
    #[serde(skip)]
    pub code: String,
    pub session_id: String,
    pub reservation_id: Option<i64>,
    pub is_verified: bool,
    pub expires_at: NaiveDateTime,
    pub attempts: i32,
    #[serde(skip)]
    pub created_at: NaiveDateTime,
}

#[derive(Queryable, Debug, Clone, Serialize)]
pub struct ReservationSetting {
    pub id: i64,
    pub date: NaiveDate,
    pub is_open: bool,
    pub opens_at: Option<NaiveTime>,
    pub closes_at: Option<NaiveTime>,
    pub deposit_per_pax: Option<i32>,
}

#[derive(Queryable, Debug, Clone, Serialize)]
pub struct RestaurantSetting {
    pub id: i64,
    pub opens_at: NaiveTime,
    pub closes_at: NaiveTime,
    pub deposit_per_pax: i32,
    pub slot_interval_min: i32,
}

/// The slice of a table that availability responses expose to clients.
#[derive(Debug, Clone, Serialize, serde::Deserialize, PartialEq)]
pub struct TableSummary {
    pub id: i64,
    pub name: String,
    pub capacity: i32,
}

impl From<&RestaurantTable> for TableSummary {
    fn from(table: &RestaurantTable) -> Self {
        TableSummary {
            id: table.id,
            name: table.name.clone(),
            capacity: table.capacity,
        }
    }
}
