use actix::Handler;
use chrono::{NaiveDate, NaiveDateTime};
use diesel::{
    r2d2::{ConnectionManager, Pool, PooledConnection},
    ExpressionMethods, OptionalExtension, PgConnection, QueryDsl, RunQueryDsl,
};

use crate::services::db_models::{
    Otp, Reservation, ReservationSetting, RestaurantSetting, RestaurantTable, STATUS_CANCELLED,
    STATUS_CONFIRMED, STATUS_PENDING,
};
use crate::services::db_utils::PgActor;
use crate::services::insertable::{NewOtp, NewReservation};
use crate::services::messages::{
    CancelReservation, ConfirmReservation, CreateOtp, CreateReservation, FetchDaySetting,
    FetchOtpBySession, FetchReservation, FetchRestaurantSetting, FetchTable, FindFreeTables,
    MarkArrived, VerifyOtp,
};
use crate::services::{otp, slots};
use crate::types::{CoreError, CoreResult, DEFAULT_DEPOSIT_PER_PAX, OTP_TTL_MIN};

fn establish_connection(
    pool: &Pool<ConnectionManager<PgConnection>>,
) -> CoreResult<PooledConnection<ConnectionManager<PgConnection>>> {
    pool.get()
        .map_err(|_| CoreError::Infrastructure("failed to establish connection with postgres".into()))
}

fn now() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}

/// Active reservations whose occupancy window collides with the given one,
/// under half-open interval semantics. Backed by the
/// (table_id, start_at, end_at, status) index.
fn overlapping_count(
    conn: &mut PgConnection,
    for_table: i64,
    win_start: NaiveDateTime,
    win_end: NaiveDateTime,
) -> Result<i64, diesel::result::Error> {
    use crate::schema::reservations::{dsl::reservations, end_at, start_at, status, table_id};

    reservations
        .filter(table_id.eq(for_table))
        .filter(status.ne(STATUS_CANCELLED))
        .filter(start_at.lt(win_end))
        .filter(end_at.gt(win_start))
        .count()
        .get_result(conn)
}

fn day_setting(
    conn: &mut PgConnection,
    for_date: NaiveDate,
) -> Result<Option<ReservationSetting>, diesel::result::Error> {
    use crate::schema::reservation_settings::{date, dsl::reservation_settings};

    reservation_settings
        .filter(date.eq(for_date))
        .first::<ReservationSetting>(conn)
        .optional()
}

/// Insertable row for a booking: pending for the queued flow, already
/// confirmed (with the OTP gate waived) for the synchronous direct path.
fn reservation_row(
    msg: CreateReservation,
    win_start: NaiveDateTime,
    win_end: NaiveDateTime,
    deposit: i32,
    created: NaiveDateTime,
) -> NewReservation {
    let status = if msg.confirmed { STATUS_CONFIRMED } else { STATUS_PENDING };
    NewReservation {
        table_id: msg.table_id,
        customer_name: msg.customer_name,
        customer_email: msg.customer_email,
        customer_phone: msg.customer_phone,
        pax: msg.pax,
        date: msg.date,
        time: msg.time,
        start_at: win_start,
        end_at: win_end,
        status: status.to_owned(),
        otp_verified: msg.confirmed,
        has_arrived: false,
        otp_session: None,
        deposit_amount: deposit,
        client_ip: msg.client_ip,
        user_agent: msg.user_agent,
        created_at: created,
        updated_at: created,
    }
}

fn deposit_per_pax(conn: &mut PgConnection, for_date: NaiveDate) -> Result<i32, diesel::result::Error> {
    use crate::schema::restaurant_settings::dsl::restaurant_settings;

    if let Some(setting) = day_setting(conn, for_date)? {
        if let Some(override_amount) = setting.deposit_per_pax {
            return Ok(override_amount);
        }
    }

    let global = restaurant_settings
        .first::<RestaurantSetting>(conn)
        .optional()?;
    Ok(global.map(|s| s.deposit_per_pax).unwrap_or(DEFAULT_DEPOSIT_PER_PAX))
}

impl Handler<FetchTable> for PgActor {
    type Result = CoreResult<RestaurantTable>;

    fn handle(&mut self, msg: FetchTable, _ctx: &mut Self::Context) -> Self::Result {
        use crate::schema::restaurant_tables::dsl::restaurant_tables;

        let mut conn = establish_connection(&self.0)?;

        restaurant_tables
            .find(msg.0)
            .first(&mut conn)
            .optional()?
            .ok_or_else(|| CoreError::NotFound("table not found".into()))
    }
}

impl Handler<FindFreeTables> for PgActor {
    type Result = CoreResult<Vec<RestaurantTable>>;

    fn handle(&mut self, msg: FindFreeTables, _ctx: &mut Self::Context) -> Self::Result {
        use crate::schema::reservations::{dsl::reservations, end_at, start_at, status, table_id};
        use crate::schema::restaurant_tables::{capacity, dsl::restaurant_tables, id, is_available};

        let mut conn = establish_connection(&self.0)?;

        let (win_start, win_end) = slots::booking_window(msg.date, msg.time);

        let busy_tables: Vec<i64> = reservations
            .filter(status.ne(STATUS_CANCELLED))
            .filter(start_at.lt(win_end))
            .filter(end_at.gt(win_start))
            .select(table_id)
            .get_results(&mut conn)?;

        Ok(restaurant_tables
            .filter(is_available.eq(true))
            .filter(capacity.ge(msg.pax))
            .filter(id.ne_all(busy_tables))
            .order(capacity.asc())
            .get_results(&mut conn)?)
    }
}

impl Handler<CreateReservation> for PgActor {
    type Result = CoreResult<Reservation>;

    fn handle(&mut self, msg: CreateReservation, _ctx: &mut Self::Context) -> Self::Result {
        use crate::schema::reservations::dsl::reservations;
        use crate::schema::restaurant_tables::dsl::restaurant_tables;

        let mut conn = establish_connection(&self.0)?;

        conn.build_transaction().run(|trx_conn| {
            if let Some(setting) = day_setting(trx_conn, msg.date)? {
                if !setting.is_open {
                    return Err(CoreError::Validation(
                        "restaurant is closed on this date".into(),
                    ));
                }
            }

            let table: RestaurantTable = restaurant_tables
                .find(msg.table_id)
                .first(trx_conn)
                .optional()?
                .ok_or_else(|| CoreError::NotFound("table not found".into()))?;

            if !table.is_available {
                return Err(CoreError::Conflict("table is not available".into()));
            }
            if table.capacity < msg.pax {
                return Err(CoreError::Validation(
                    "party size exceeds table capacity".into(),
                ));
            }

            let (win_start, win_end) = slots::booking_window(msg.date, msg.time);
            if overlapping_count(trx_conn, msg.table_id, win_start, win_end)? > 0 {
                return Err(CoreError::Conflict(
                    "table is already reserved for this time".into(),
                ));
            }

            let deposit = deposit_per_pax(trx_conn, msg.date)? * msg.pax;

            Ok(diesel::insert_into(reservations)
                .values(reservation_row(msg, win_start, win_end, deposit, now()))
                .get_result::<Reservation>(trx_conn)?)
        })
    }
}

impl Handler<FetchReservation> for PgActor {
    type Result = CoreResult<Reservation>;

    fn handle(&mut self, msg: FetchReservation, _ctx: &mut Self::Context) -> Self::Result {
        use crate::schema::reservations::dsl::reservations;

        let mut conn = establish_connection(&self.0)?;

        reservations
            .find(msg.0)
            .first(&mut conn)
            .optional()?
            .ok_or_else(|| CoreError::NotFound("reservation not found".into()))
    }
}

impl Handler<ConfirmReservation> for PgActor {
    type Result = CoreResult<Reservation>;

    fn handle(&mut self, msg: ConfirmReservation, _ctx: &mut Self::Context) -> Self::Result {
        use crate::schema::reservations::{dsl::reservations, otp_verified, status, updated_at};

        let mut conn = establish_connection(&self.0)?;

        conn.build_transaction().run(|trx_conn| {
            let reservation: Reservation = reservations
                .find(msg.reservation_id)
                .first(trx_conn)
                .optional()?
                .ok_or_else(|| CoreError::NotFound("reservation not found".into()))?;

            if reservation.is_cancelled() {
                return Err(CoreError::Conflict("reservation has been cancelled".into()));
            }

            Ok(diesel::update(reservations.find(msg.reservation_id))
                .set((
                    status.eq(STATUS_CONFIRMED),
                    otp_verified.eq(true),
                    updated_at.eq(now()),
                ))
                .get_result::<Reservation>(trx_conn)?)
        })
    }
}

impl Handler<CancelReservation> for PgActor {
    type Result = CoreResult<Reservation>;

    fn handle(&mut self, msg: CancelReservation, _ctx: &mut Self::Context) -> Self::Result {
        use crate::schema::reservations::{
            dsl::reservations, end_at, id as reservation_pk, status, table_id, updated_at,
        };
        use crate::schema::restaurant_tables::{
            dsl::restaurant_tables, is_available, updated_at as table_updated_at,
        };

        let mut conn = establish_connection(&self.0)?;

        conn.build_transaction().run(|trx_conn| {
            let reservation: Reservation = reservations
                .find(msg.reservation_id)
                .first(trx_conn)
                .optional()?
                .ok_or_else(|| CoreError::NotFound("reservation not found".into()))?;

            if reservation.is_cancelled() {
                return Err(CoreError::Conflict("reservation is already cancelled".into()));
            }

            let cancelled: Reservation = diesel::update(reservations.find(msg.reservation_id))
                .set((status.eq(STATUS_CANCELLED), updated_at.eq(now())))
                .get_result(trx_conn)?;

            // Freed table goes back into rotation when nothing else active
            // and upcoming holds it.
            let remaining_active: i64 = reservations
                .filter(table_id.eq(reservation.table_id))
                .filter(reservation_pk.ne(msg.reservation_id))
                .filter(status.ne(STATUS_CANCELLED))
                .filter(end_at.gt(now()))
                .count()
                .get_result(trx_conn)?;

            if remaining_active == 0 {
                diesel::update(restaurant_tables.find(reservation.table_id))
                    .set((is_available.eq(true), table_updated_at.eq(now())))
                    .execute(trx_conn)?;
            }

            Ok(cancelled)
        })
    }
}

impl Handler<MarkArrived> for PgActor {
    type Result = CoreResult<Reservation>;

    fn handle(&mut self, msg: MarkArrived, _ctx: &mut Self::Context) -> Self::Result {
        use crate::schema::reservations::{arrived_at, dsl::reservations, has_arrived, updated_at};

        let mut conn = establish_connection(&self.0)?;

        conn.build_transaction().run(|trx_conn| {
            let reservation: Reservation = reservations
                .find(msg.reservation_id)
                .first(trx_conn)
                .optional()?
                .ok_or_else(|| CoreError::NotFound("reservation not found".into()))?;

            if !reservation.is_confirmed() {
                return Err(CoreError::Conflict("reservation is not confirmed".into()));
            }
            if reservation.has_arrived {
                return Err(CoreError::Conflict("arrival already verified".into()));
            }

            Ok(diesel::update(reservations.find(msg.reservation_id))
                .set((
                    has_arrived.eq(true),
                    arrived_at.eq(Some(now())),
                    updated_at.eq(now()),
                ))
                .get_result::<Reservation>(trx_conn)?)
        })
    }
}

impl Handler<CreateOtp> for PgActor {
    type Result = CoreResult<Otp>;

    fn handle(&mut self, msg: CreateOtp, _ctx: &mut Self::Context) -> Self::Result {
        use crate::schema::otps::{dsl::otps, id as otp_pk, is_verified, phone};
        use crate::schema::reservations::{dsl::reservations, otp_session, updated_at};

        let mut conn = establish_connection(&self.0)?;

        conn.build_transaction().run(|trx_conn| {
            // Issuing a new code retires every live one for the phone.
            let existing: Vec<Otp> = otps.filter(phone.eq(&msg.phone)).load(trx_conn)?;
            let retired = otp::superseded_ids(&existing);
            if !retired.is_empty() {
                diesel::update(otps.filter(otp_pk.eq_any(retired)))
                    .set(is_verified.eq(true))
                    .execute(trx_conn)?;
            }

            let created = now();
            let fresh: Otp = diesel::insert_into(otps)
                .values(NewOtp {
                    phone: msg.phone.clone(),
                    code: otp::generate_code(),
                    session_id: otp::new_session_id(),
                    reservation_id: msg.reservation_id,
                    is_verified: false,
                    expires_at: created + chrono::Duration::minutes(OTP_TTL_MIN),
                    attempts: 0,
                    created_at: created,
                })
                .get_result(trx_conn)?;

            if let Some(reservation_id) = msg.reservation_id {
                diesel::update(reservations.find(reservation_id))
                    .set((otp_session.eq(&fresh.session_id), updated_at.eq(created)))
                    .execute(trx_conn)?;
            }

            Ok(fresh)
        })
    }
}

impl Handler<FetchOtpBySession> for PgActor {
    type Result = CoreResult<Otp>;

    fn handle(&mut self, msg: FetchOtpBySession, _ctx: &mut Self::Context) -> Self::Result {
        use crate::schema::otps::{dsl::otps, session_id};

        let mut conn = establish_connection(&self.0)?;

        otps.filter(session_id.eq(&msg.0))
            .first(&mut conn)
            .optional()?
            .ok_or_else(|| CoreError::NotFound("unknown OTP session".into()))
    }
}

impl Handler<VerifyOtp> for PgActor {
    type Result = CoreResult<Otp>;

    fn handle(&mut self, msg: VerifyOtp, _ctx: &mut Self::Context) -> Self::Result {
        use crate::schema::otps::{attempts, dsl::otps, is_verified, session_id};

        let mut conn = establish_connection(&self.0)?;

        // Deliberately not a transaction: a failed comparison must keep its
        // attempt increment.
        let record: Otp = otps
            .filter(session_id.eq(&msg.session_id))
            .first(&mut conn)
            .optional()?
            .ok_or_else(|| CoreError::NotFound("unknown OTP session".into()))?;

        if let Some(rejection) =
            otp::precheck(record.is_verified, record.expires_at, record.attempts, now())
        {
            return Err(rejection.into());
        }

        let record: Otp = diesel::update(otps.find(record.id))
            .set(attempts.eq(attempts + 1))
            .get_result(&mut conn)?;

        if record.code != msg.code {
            return Err(CoreError::NotFound("invalid code for this session".into()));
        }

        Ok(diesel::update(otps.find(record.id))
            .set(is_verified.eq(true))
            .get_result::<Otp>(&mut conn)?)
    }
}

impl Handler<FetchDaySetting> for PgActor {
    type Result = CoreResult<Option<ReservationSetting>>;

    fn handle(&mut self, msg: FetchDaySetting, _ctx: &mut Self::Context) -> Self::Result {
        let mut conn = establish_connection(&self.0)?;

        Ok(day_setting(&mut conn, msg.0)?)
    }
}

impl Handler<FetchRestaurantSetting> for PgActor {
    type Result = CoreResult<Option<RestaurantSetting>>;

    fn handle(&mut self, _msg: FetchRestaurantSetting, _ctx: &mut Self::Context) -> Self::Result {
        use crate::schema::restaurant_settings::dsl::restaurant_settings;

        let mut conn = establish_connection(&self.0)?;

        Ok(restaurant_settings
            .first::<RestaurantSetting>(&mut conn)
            .optional()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};

    fn booking(confirmed: bool) -> CreateReservation {
        CreateReservation {
            table_id: 3,
            customer_name: "Ana".into(),
            customer_email: "ana@example.com".into(),
            customer_phone: "+35699000001".into(),
            pax: 2,
            date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            time: NaiveTime::from_hms_opt(19, 0, 0).unwrap(),
            client_ip: None,
            user_agent: None,
            confirmed,
        }
    }

    fn row(confirmed: bool) -> NewReservation {
        let msg = booking(confirmed);
        let (win_start, win_end) = slots::booking_window(msg.date, msg.time);
        reservation_row(msg, win_start, win_end, 2000, win_start)
    }

    #[test]
    fn queued_bookings_start_pending() {
        let row = row(false);
        assert_eq!(row.status, STATUS_PENDING);
        assert!(!row.otp_verified);
    }

    #[test]
    fn direct_bookings_are_created_confirmed() {
        let row = row(true);
        assert_eq!(row.status, STATUS_CONFIRMED);
        assert!(row.otp_verified);
        assert!(!row.has_arrived);
    }

    #[test]
    fn the_row_spans_the_full_occupancy_window() {
        let row = row(false);
        assert_eq!(row.end_at - row.start_at, chrono::Duration::minutes(105));
        assert_eq!(row.deposit_amount, 2000);
    }
}
