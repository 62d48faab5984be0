use async_trait::async_trait;

use crate::services::db_models::Reservation;
use crate::types::CoreResult;

/// Outbound customer messaging (WhatsApp in production). Implementations
/// live outside the core; failures are logged by callers and never fail
/// the owning job.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_otp(&self, phone: &str, code: &str) -> CoreResult<()>;
    async fn send_reservation_confirmation(&self, reservation: &Reservation) -> CoreResult<()>;
    async fn send_arrival_otp(&self, phone: &str, code: &str, reservation: &Reservation)
        -> CoreResult<()>;
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send_confirmation_email(&self, reservation: &Reservation) -> CoreResult<()>;
}

/// Stand-in sender that records deliveries in the log stream.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_otp(&self, phone: &str, _code: &str) -> CoreResult<()> {
        tracing::info!(%phone, "would deliver booking OTP");
        Ok(())
    }

    async fn send_reservation_confirmation(&self, reservation: &Reservation) -> CoreResult<()> {
        tracing::info!(
            phone = %reservation.customer_phone,
            reservation = reservation.id,
            "would deliver reservation confirmation"
        );
        Ok(())
    }

    async fn send_arrival_otp(
        &self,
        phone: &str,
        _code: &str,
        reservation: &Reservation,
    ) -> CoreResult<()> {
        tracing::info!(%phone, reservation = reservation.id, "would deliver arrival OTP");
        Ok(())
    }
}

#[async_trait]
impl EmailSender for LogNotifier {
    async fn send_confirmation_email(&self, reservation: &Reservation) -> CoreResult<()> {
        tracing::info!(
            email = %reservation.customer_email,
            reservation = reservation.id,
            "would deliver confirmation email"
        );
        Ok(())
    }
}
