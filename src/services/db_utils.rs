use std::sync::Arc;

use actix::{Actor, Addr, SyncContext};
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::PgConnection;

use crate::services::availability::AvailabilityEngine;
use crate::services::cache::AvailabilityCache;
use crate::services::counters::{DailyCounters, RateLimiter};
use crate::services::jobs::ReservationTask;
use crate::services::lock::SlotLockManager;
use crate::services::notify::Notifier;
use crate::services::queue::TaskQueue;
use crate::services::status::BookingStatusStore;
use crate::types::CoreError;

pub struct PgActor(pub Pool<ConnectionManager<PgConnection>>);

impl Actor for PgActor {
    type Context = SyncContext<Self>;
}

pub struct AppState {
    pub pg_db: Addr<PgActor>,
    pub availability: AvailabilityEngine,
    pub cache: AvailabilityCache,
    pub locks: SlotLockManager,
    pub status: BookingStatusStore,
    pub limiter: RateLimiter,
    pub counters: DailyCounters,
    pub notifier: Arc<dyn Notifier>,
    pub queue: Arc<TaskQueue<ReservationTask>>,
}

pub fn get_db_pool(
    db_url: &str,
) -> Result<Pool<ConnectionManager<PgConnection>>, CoreError> {
    let manager: ConnectionManager<PgConnection> = ConnectionManager::<PgConnection>::new(db_url);
    Pool::builder()
        .build(manager)
        .map_err(|err| CoreError::Infrastructure(err.to_string()))
}
