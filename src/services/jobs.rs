use std::sync::Arc;

use actix::Addr;
use async_trait::async_trait;

use crate::services::cache::AvailabilityCache;
use crate::services::counters::DailyCounters;
use crate::services::db_models::Reservation;
use crate::services::db_utils::PgActor;
use crate::services::messages::{ConfirmReservation, CreateOtp, CreateReservation};
use crate::services::notify::{EmailSender, Notifier};
use crate::services::queue::QueueTask;
use crate::services::status::{BookingStatus, BookingStatusStore};
use crate::types::{CoreError, CoreResult};

/// Everything a reservation worker needs to touch.
#[derive(Clone)]
pub struct JobContext {
    pub pg_db: Addr<PgActor>,
    pub cache: AvailabilityCache,
    pub status: BookingStatusStore,
    pub counters: DailyCounters,
    pub notifier: Arc<dyn Notifier>,
    pub email: Arc<dyn EmailSender>,
}

impl JobContext {
    async fn send<M>(&self, msg: M) -> CoreResult<<M as actix::Message>::Result>
    where
        M: actix::Message + Send + 'static,
        M::Result: Send,
        PgActor: actix::Handler<M>,
        <PgActor as actix::Actor>::Context: actix::dev::ToEnvelope<PgActor, M>,
    {
        self.pg_db
            .send(msg)
            .await
            .map_err(|_| CoreError::Infrastructure("database actor unavailable".into()))
    }
}

pub struct CreateBookingTask {
    /// Client-facing session id the caller polls.
    pub session_id: String,
    pub booking: CreateReservation,
}

pub struct ConfirmReservationTask {
    pub session_id: String,
    pub reservation_id: i64,
}

pub enum ReservationTask {
    Create(CreateBookingTask),
    Confirm(ConfirmReservationTask),
}

#[async_trait]
impl QueueTask for ReservationTask {
    type Ctx = JobContext;

    fn name(&self) -> &'static str {
        match self {
            ReservationTask::Create(_) => "create-booking",
            ReservationTask::Confirm(_) => "confirm-reservation",
        }
    }

    async fn run(&self, ctx: &JobContext) -> CoreResult<()> {
        match self {
            ReservationTask::Create(task) => task.run(ctx).await,
            ReservationTask::Confirm(task) => task.run(ctx).await,
        }
    }

    async fn on_permanent_failure(&self, ctx: &JobContext, err: &CoreError) {
        let session_id = match self {
            ReservationTask::Create(task) => &task.session_id,
            ReservationTask::Confirm(task) => &task.session_id,
        };
        if let Err(write_err) = ctx
            .status
            .write(session_id, &BookingStatus::failed(&err.to_string()))
        {
            tracing::error!(session = %session_id, %write_err, "failed to record terminal status");
        }
        if matches!(self, ReservationTask::Confirm(_)) {
            if let Err(counter_err) = ctx.counters.incr_failed() {
                tracing::error!(%counter_err, "failed to bump the failed counter");
            }
        }
    }
}

impl CreateBookingTask {
    /// Re-validates and inserts the pending reservation, issues the booking
    /// OTP and publishes a pending status under both the client session and
    /// the OTP session. Validation failures are terminal (recorded, never
    /// retried); only infrastructure errors bubble up to the retry loop.
    async fn run(&self, ctx: &JobContext) -> CoreResult<()> {
        // A retried attempt may already have done the work.
        if let Some(existing) = ctx.status.read(&self.session_id)? {
            if existing.state.is_terminal()
                || (existing.reservation_id.is_some() && existing.otp_session.is_some())
            {
                return Ok(());
            }
        }

        let reservation = match ctx.send(self.booking.clone()).await? {
            Ok(reservation) => reservation,
            Err(err) if err.is_retryable() => return Err(err),
            Err(err) => {
                ctx.status
                    .write(&self.session_id, &BookingStatus::failed(&err.to_string()))?;
                tracing::info!(session = %self.session_id, %err, "booking rejected on re-validation");
                return Ok(());
            }
        };

        let otp = ctx
            .send(CreateOtp {
                phone: reservation.customer_phone.clone(),
                reservation_id: Some(reservation.id),
            })
            .await??;

        if let Err(err) = ctx.notifier.send_otp(&otp.phone, &otp.code).await {
            tracing::warn!(reservation = reservation.id, %err, "booking OTP delivery failed");
        }

        ctx.cache
            .invalidate_slot(reservation.date, reservation.time)?;

        let pending = BookingStatus::pending(reservation.id, &otp.session_id, &self.session_id);
        ctx.status.write(&self.session_id, &pending)?;
        ctx.status.write(&otp.session_id, &pending)?;

        Ok(())
    }
}

impl ConfirmReservationTask {
    async fn run(&self, ctx: &JobContext) -> CoreResult<()> {
        match self.confirm(ctx).await {
            Ok(()) => Ok(()),
            Err(err) => {
                // Record the failure for the polling client, then re-raise
                // so the runner's retry policy applies.
                let sessions = ctx
                    .status
                    .linked_sessions(&self.session_id)
                    .unwrap_or_else(|_| vec![self.session_id.clone()]);
                let mut failed = BookingStatus::failed(&err.to_string());
                // Keep the session link so a later retry still reaches both.
                failed.client_session = sessions.get(1).cloned();
                for session in &sessions {
                    if let Err(write_err) = ctx.status.write(session, &failed) {
                        tracing::error!(session = %session, %write_err, "failed to record status");
                    }
                }
                if let Err(counter_err) = ctx.counters.incr_failed() {
                    tracing::error!(%counter_err, "failed to bump the failed counter");
                }
                Err(err)
            }
        }
    }

    async fn confirm(&self, ctx: &JobContext) -> CoreResult<()> {
        let reservation: Reservation = ctx
            .send(ConfirmReservation {
                reservation_id: self.reservation_id,
            })
            .await??;

        ctx.cache
            .invalidate_slot(reservation.date, reservation.time)?;

        if let Err(err) = ctx.notifier.send_reservation_confirmation(&reservation).await {
            tracing::warn!(reservation = reservation.id, %err, "confirmation message delivery failed");
        }
        if let Err(err) = ctx.email.send_confirmation_email(&reservation).await {
            tracing::warn!(reservation = reservation.id, %err, "confirmation email delivery failed");
        }

        // Both the submit session and the OTP session reach the terminal
        // state; the client may be polling either.
        for session in ctx.status.linked_sessions(&self.session_id)? {
            ctx.status
                .write(&session, &BookingStatus::confirmed(reservation.id))?;
        }
        ctx.counters.incr_processed()?;

        Ok(())
    }
}
