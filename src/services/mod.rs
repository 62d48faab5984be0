use actix_web::{get, HttpResponse, Responder};

use crate::types::CoreError;

pub mod availability;
pub mod cache;
pub mod counters;
pub mod db_models;
pub mod db_utils;
pub mod insertable;
pub mod jobs;
pub mod lock;
pub mod messages;
pub mod notify;
pub mod otp;
pub mod pg_handling;
pub mod queue;
pub mod redis_handling;
pub mod slots;
pub mod status;

#[get("/")]
pub async fn home_page() -> impl Responder {
    HttpResponse::Ok().body("Table reservation service")
}

pub fn error_response(err: &CoreError) -> HttpResponse {
    match err {
        CoreError::Validation(msg) => HttpResponse::BadRequest().json(msg),
        CoreError::Conflict(msg) => HttpResponse::Conflict().json(msg),
        CoreError::Busy => HttpResponse::TooManyRequests().json("busy, try again shortly"),
        CoreError::NotFound(msg) => HttpResponse::NotFound().json(msg),
        CoreError::Infrastructure(msg) => HttpResponse::InternalServerError().json(msg),
    }
}

// sub-route "/availability"
pub mod availability_route {
    use actix_web::web::{Data, Path, Query};
    use actix_web::{get, HttpResponse, Responder};
    use serde::Deserialize;
    use serde_json::json;

    use crate::services::availability::Availability;
    use crate::services::db_utils::AppState;
    use crate::services::{error_response, slots};

    #[derive(Deserialize)]
    pub struct AvailabilityQuery {
        pub date: String,
        pub time: String,
        pub pax: i32,
    }

    #[get("")]
    pub async fn check_availability(
        state: Data<AppState>,
        query: Query<AvailabilityQuery>,
    ) -> impl Responder {
        let date = match slots::parse_booking_date(&query.date) {
            Ok(val) => val,
            Err(err) => return error_response(&err),
        };
        let time = match slots::parse_booking_time(&query.time) {
            Ok(val) => val,
            Err(err) => return error_response(&err),
        };

        match state.availability.check(date, time, query.pax).await {
            Ok(Availability::Closed) => {
                HttpResponse::Ok().json(json!({ "open": false, "tables": [] }))
            }
            Ok(Availability::Open { tables }) => {
                HttpResponse::Ok().json(json!({ "open": true, "tables": tables }))
            }
            Err(err) => error_response(&err),
        }
    }

    #[get("/slots/{date}")]
    pub async fn list_slots(state: Data<AppState>, path: Path<String>) -> impl Responder {
        let date = match slots::parse_booking_date(&path.into_inner()) {
            Ok(val) => val,
            Err(err) => return error_response(&err),
        };

        match state.availability.slots_for(date).await {
            Ok(times) => HttpResponse::Ok().json(times),
            Err(err) => error_response(&err),
        }
    }
}

// sub-route "/reservation"
pub mod reservation_route {
    use actix_web::web::{Data, Json, Path};
    use actix_web::{get, post, HttpRequest, HttpResponse, Responder};
    use serde::Deserialize;
    use serde_json::json;
    use uuid::Uuid;

    use crate::services::db_utils::AppState;
    use crate::services::jobs::{ConfirmReservationTask, CreateBookingTask, ReservationTask};
    use crate::services::messages::{
        CancelReservation, CreateOtp, CreateReservation, FetchReservation, FetchTable, MarkArrived,
        VerifyOtp,
    };
    use crate::services::status::BookingStatus;
    use crate::services::{error_response, slots};
    use crate::types::{CoreError, BOOKING_RATE_CAP, OTP_RATE_CAP};

    #[derive(Deserialize)]
    pub struct BookTableBody {
        pub table_id: i64,
        pub customer_name: String,
        pub customer_email: String,
        pub customer_phone: String,
        pub pax: i32,
        pub date: String,
        pub time: String,
    }

    /// Input, rate-limit, date-open and table checks shared by the queued
    /// and the direct booking paths. Failures come back as the response.
    async fn validate_booking(
        state: &AppState,
        body: &BookTableBody,
        req: &HttpRequest,
    ) -> Result<(chrono::NaiveDate, chrono::NaiveTime, Option<String>), HttpResponse> {
        let date = slots::parse_booking_date(&body.date).map_err(|err| error_response(&err))?;
        let time = slots::parse_booking_time(&body.time).map_err(|err| error_response(&err))?;
        slots::validate_pax(body.pax).map_err(|err| error_response(&err))?;
        if body.customer_name.trim().is_empty()
            || body.customer_phone.trim().is_empty()
            || body.customer_email.trim().is_empty()
        {
            return Err(error_response(&CoreError::Validation(
                "name, email and phone are required".into(),
            )));
        }

        let client_ip = req
            .connection_info()
            .realip_remote_addr()
            .map(|ip| ip.to_owned());
        state
            .limiter
            .check("booking", &body.customer_phone, BOOKING_RATE_CAP)
            .map_err(|err| error_response(&err))?;
        if let Some(ip) = &client_ip {
            state
                .limiter
                .check("booking-ip", ip, BOOKING_RATE_CAP)
                .map_err(|err| error_response(&err))?;
        }

        match state.availability.is_date_open(date).await {
            Ok(true) => {}
            Ok(false) => {
                return Err(error_response(&CoreError::Validation(
                    "restaurant is closed on this date".into(),
                )))
            }
            Err(err) => return Err(error_response(&err)),
        }

        let table = match state.pg_db.send(FetchTable(body.table_id)).await {
            Ok(Ok(table)) => table,
            Ok(Err(err)) => return Err(error_response(&err)),
            Err(_) => {
                return Err(HttpResponse::InternalServerError().json("unable to fetch table"))
            }
        };
        if !table.is_available {
            return Err(error_response(&CoreError::Conflict(
                "table is not available".into(),
            )));
        }
        if table.capacity < body.pax {
            return Err(error_response(&CoreError::Validation(
                "party size exceeds table capacity".into(),
            )));
        }

        Ok((date, time, client_ip))
    }

    #[post("/book")]
    pub async fn book_table(
        state: Data<AppState>,
        body: Json<BookTableBody>,
        req: HttpRequest,
    ) -> impl Responder {
        let (date, time, client_ip) = match validate_booking(&state, &body, &req).await {
            Ok(checked) => checked,
            Err(response) => return response,
        };

        // Serialize the check-then-enqueue against other attempts on the
        // same slot; contenders get an immediate 429.
        let lock = match state.locks.acquire(body.table_id, date, time) {
            Ok(lock) => lock,
            Err(err) => return error_response(&err),
        };

        let free = match state
            .pg_db
            .send(crate::services::messages::FindFreeTables {
                date,
                time,
                pax: body.pax,
            })
            .await
        {
            Ok(Ok(tables)) => tables,
            Ok(Err(err)) => return error_response(&err),
            Err(_) => return HttpResponse::InternalServerError().json("unable to check the slot"),
        };
        if !free.iter().any(|t| t.id == body.table_id) {
            return error_response(&CoreError::Conflict(
                "table is already reserved for this time".into(),
            ));
        }

        let session_id = Uuid::new_v4().simple().to_string();
        // Publish the queued marker before the worker can race us to the
        // richer pending record.
        if let Err(err) = state.status.write(&session_id, &BookingStatus::queued()) {
            return error_response(&err);
        }
        let enqueued = state.queue.enqueue(ReservationTask::Create(CreateBookingTask {
            session_id: session_id.clone(),
            booking: CreateReservation {
                table_id: body.table_id,
                customer_name: body.customer_name.clone(),
                customer_email: body.customer_email.clone(),
                customer_phone: body.customer_phone.clone(),
                pax: body.pax,
                date,
                time,
                client_ip,
                user_agent: user_agent(&req),
                confirmed: false,
            },
        }));
        lock.release();

        if let Err(err) = enqueued {
            return error_response(&err);
        }

        HttpResponse::Accepted().json(json!({ "session_id": session_id }))
    }

    /// Synchronous direct path: the reservation is inserted already
    /// confirmed inside the same transactional overlap re-check, skipping
    /// the queued OTP flow. Used by staff-driven walk-in bookings.
    #[post("/book/direct")]
    pub async fn book_direct(
        state: Data<AppState>,
        body: Json<BookTableBody>,
        req: HttpRequest,
    ) -> impl Responder {
        let (date, time, client_ip) = match validate_booking(&state, &body, &req).await {
            Ok(checked) => checked,
            Err(response) => return response,
        };

        let lock = match state.locks.acquire(body.table_id, date, time) {
            Ok(lock) => lock,
            Err(err) => return error_response(&err),
        };

        let created = match state
            .pg_db
            .send(CreateReservation {
                table_id: body.table_id,
                customer_name: body.customer_name.clone(),
                customer_email: body.customer_email.clone(),
                customer_phone: body.customer_phone.clone(),
                pax: body.pax,
                date,
                time,
                client_ip,
                user_agent: user_agent(&req),
                confirmed: true,
            })
            .await
        {
            Ok(Ok(reservation)) => reservation,
            Ok(Err(err)) => return error_response(&err),
            Err(_) => {
                return HttpResponse::InternalServerError().json("unable to create reservation")
            }
        };
        lock.release();

        if let Err(err) = state.cache.invalidate_slot(created.date, created.time) {
            tracing::warn!(reservation = created.id, %err, "cache invalidation failed");
        }

        HttpResponse::Created().json(created)
    }

    fn user_agent(req: &HttpRequest) -> Option<String> {
        req.headers()
            .get("user-agent")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_owned())
    }

    #[get("/status/{session_id}")]
    pub async fn poll_status(state: Data<AppState>, path: Path<String>) -> impl Responder {
        match state.status.read(&path.into_inner()) {
            Ok(Some(status)) => HttpResponse::Ok().json(status),
            Ok(None) => HttpResponse::NotFound().json("unknown or expired session"),
            Err(err) => error_response(&err),
        }
    }

    #[post("/{reservation_id}/cancel")]
    pub async fn cancel_reservation(state: Data<AppState>, path: Path<i64>) -> impl Responder {
        let reservation_id = path.into_inner();

        match state.pg_db.send(CancelReservation { reservation_id }).await {
            Ok(Ok(reservation)) => {
                if let Err(err) = state.cache.invalidate_slot(reservation.date, reservation.time) {
                    tracing::warn!(reservation = reservation.id, %err, "cache invalidation failed");
                }
                HttpResponse::Ok().json(reservation)
            }
            Ok(Err(err)) => error_response(&err),
            Err(_) => HttpResponse::InternalServerError().json("unable to cancel reservation"),
        }
    }

    #[post("/{reservation_id}/arrival/request")]
    pub async fn request_arrival_otp(state: Data<AppState>, path: Path<i64>) -> impl Responder {
        let reservation_id = path.into_inner();

        let reservation = match state.pg_db.send(FetchReservation(reservation_id)).await {
            Ok(Ok(reservation)) => reservation,
            Ok(Err(err)) => return error_response(&err),
            Err(_) => return HttpResponse::InternalServerError().json("unable to fetch reservation"),
        };
        if !reservation.is_confirmed() {
            return error_response(&CoreError::Conflict("reservation is not confirmed".into()));
        }
        if let Err(err) = state
            .limiter
            .check("otp", &reservation.customer_phone, OTP_RATE_CAP)
        {
            return error_response(&err);
        }

        match state
            .pg_db
            .send(CreateOtp {
                phone: reservation.customer_phone.clone(),
                reservation_id: Some(reservation.id),
            })
            .await
        {
            Ok(Ok(otp)) => {
                if let Err(err) = state
                    .notifier
                    .send_arrival_otp(&otp.phone, &otp.code, &reservation)
                    .await
                {
                    tracing::warn!(reservation = reservation.id, %err, "arrival OTP delivery failed");
                }
                HttpResponse::Ok().json(json!({
                    "session_id": otp.session_id,
                    "expires_at": otp.expires_at,
                }))
            }
            Ok(Err(err)) => error_response(&err),
            Err(_) => HttpResponse::InternalServerError().json("unable to create OTP"),
        }
    }

    #[derive(Deserialize)]
    pub struct ArrivalVerifyBody {
        pub session_id: String,
        pub code: String,
    }

    #[post("/{reservation_id}/arrival/verify")]
    pub async fn verify_arrival(
        state: Data<AppState>,
        path: Path<i64>,
        body: Json<ArrivalVerifyBody>,
    ) -> impl Responder {
        let reservation_id = path.into_inner();

        let otp = match state
            .pg_db
            .send(VerifyOtp {
                session_id: body.session_id.clone(),
                code: body.code.clone(),
            })
            .await
        {
            Ok(Ok(otp)) => otp,
            Ok(Err(err)) => return error_response(&err),
            Err(_) => return HttpResponse::InternalServerError().json("unable to verify OTP"),
        };
        if otp.reservation_id != Some(reservation_id) {
            return error_response(&CoreError::NotFound(
                "OTP does not belong to this reservation".into(),
            ));
        }

        match state.pg_db.send(MarkArrived { reservation_id }).await {
            Ok(Ok(reservation)) => HttpResponse::Ok().json(reservation),
            Ok(Err(err)) => error_response(&err),
            Err(_) => HttpResponse::InternalServerError().json("unable to verify arrival"),
        }
    }

    // Queues the OTP-gated confirmation; used by the "/otp" scope too.
    pub fn enqueue_confirmation(
        state: &AppState,
        reservation_id: i64,
        session_id: String,
    ) -> Result<(), CoreError> {
        state.queue.enqueue(ReservationTask::Confirm(ConfirmReservationTask {
            session_id,
            reservation_id,
        }))
    }
}

// sub-route "/otp"
pub mod otp_route {
    use actix_web::web::{Data, Json, Path};
    use actix_web::{get, post, HttpResponse, Responder};
    use serde::Deserialize;
    use serde_json::json;

    use crate::services::db_utils::AppState;
    use crate::services::error_response;
    use crate::services::messages::{FetchOtpBySession, VerifyOtp};
    use crate::services::reservation_route::enqueue_confirmation;

    #[get("/session/{session_id}")]
    pub async fn get_otp_session(state: Data<AppState>, path: Path<String>) -> impl Responder {
        match state.pg_db.send(FetchOtpBySession(path.into_inner())).await {
            Ok(Ok(otp)) => HttpResponse::Ok().json(otp),
            Ok(Err(err)) => error_response(&err),
            Err(_) => HttpResponse::InternalServerError().json("unable to fetch OTP session"),
        }
    }

    #[derive(Deserialize)]
    pub struct VerifyBody {
        pub session_id: String,
        pub code: String,
    }

    /// Booking OTP check; success hands the reservation to the confirm
    /// pipeline and the caller keeps polling the session.
    #[post("/verify")]
    pub async fn verify_otp(state: Data<AppState>, body: Json<VerifyBody>) -> impl Responder {
        match state
            .pg_db
            .send(VerifyOtp {
                session_id: body.session_id.clone(),
                code: body.code.clone(),
            })
            .await
        {
            Ok(Ok(otp)) => match otp.reservation_id {
                Some(reservation_id) => {
                    if let Err(err) =
                        enqueue_confirmation(&state, reservation_id, otp.session_id.clone())
                    {
                        return error_response(&err);
                    }
                    HttpResponse::Accepted().json(json!({
                        "session_id": otp.session_id,
                        "reservation_id": reservation_id,
                    }))
                }
                None => HttpResponse::Ok().json(json!({ "verified": true })),
            },
            Ok(Err(err)) => error_response(&err),
            Err(_) => HttpResponse::InternalServerError().json("unable to verify OTP"),
        }
    }
}

// sub-route "/admin"
pub mod admin_route {
    use actix_web::web::{Data, Path, Query};
    use actix_web::{get, post, HttpResponse, Responder};
    use chrono::NaiveDate;
    use serde::Deserialize;
    use serde_json::json;

    use crate::services::counters::{KIND_FAILED, KIND_PROCESSED};
    use crate::services::db_utils::AppState;
    use crate::services::error_response;
    use crate::types::CoreError;

    #[derive(Deserialize)]
    pub struct ClearCacheQuery {
        pub date: Option<String>,
    }

    /// Invalidation hook for the external table/settings CRUD surface.
    #[post("/cache/clear")]
    pub async fn clear_cache(state: Data<AppState>, query: Query<ClearCacheQuery>) -> impl Responder {
        let result = match &query.date {
            Some(raw) => match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
                Ok(date) => state.cache.clear_date(date),
                Err(_) => {
                    return error_response(&CoreError::Validation(format!(
                        "'{raw}' is not a valid date"
                    )))
                }
            },
            None => state.cache.clear_all(),
        };

        match result {
            Ok(()) => HttpResponse::Ok().json("availability cache cleared"),
            Err(err) => error_response(&err),
        }
    }

    /// Day totals the confirm pipeline maintains.
    #[get("/stats/{date}")]
    pub async fn daily_stats(state: Data<AppState>, path: Path<String>) -> impl Responder {
        let raw = path.into_inner();
        let date = match NaiveDate::parse_from_str(&raw, "%Y-%m-%d") {
            Ok(date) => date,
            Err(_) => {
                return error_response(&CoreError::Validation(format!(
                    "'{raw}' is not a valid date"
                )))
            }
        };

        let processed = match state.counters.get(KIND_PROCESSED, date) {
            Ok(count) => count,
            Err(err) => return error_response(&err),
        };
        let failed = match state.counters.get(KIND_FAILED, date) {
            Ok(count) => count,
            Err(err) => return error_response(&err),
        };

        HttpResponse::Ok().json(json!({
            "date": raw,
            "processed": processed,
            "failed": failed,
        }))
    }
}

// sub-route "/test"
pub mod test_route {
    use actix_web::{get, HttpResponse, Responder};

    #[get("/healthcheck")]
    pub async fn healthcheck() -> impl Responder {
        HttpResponse::Ok().body("I'm alive!")
    }
}
