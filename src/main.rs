use std::env;
use std::sync::Arc;
use std::time::Duration;

use actix::{Addr, SyncArbiter};
use actix_cors::Cors;
use actix_web::web::Data;
use actix_web::{web, App, HttpServer};
use dotenv::dotenv;

use services::availability::AvailabilityEngine;
use services::cache::AvailabilityCache;
use services::counters::{DailyCounters, RateLimiter};
use services::db_utils::{get_db_pool, AppState, PgActor};
use services::jobs::JobContext;
use services::lock::SlotLockManager;
use services::notify::{EmailSender, LogNotifier, Notifier};
use services::queue::TaskQueue;
use services::redis_handling::{KvStore, RedisStore};
use services::status::BookingStatusStore;

mod schema;
mod services;
mod types;

fn init_pg_db() -> Addr<PgActor> {
    let db_url = env::var("PG_DATABASE_URL").expect("PG_DATABASE_URL must be set");
    let pool = get_db_pool(&db_url).expect("failed to build the postgres pool");

    SyncArbiter::start(5, move || PgActor(pool.clone()))
}

fn init_redis_db() -> redis::Client {
    let db_uri = env::var("REDIS_DATABASE_URI").expect("REDIS_DATABASE_URI must be set");

    redis::Client::open(db_uri).expect("failed to open the redis client")
}

/// Hourly sweep of yesterday's counter buckets.
fn spawn_counter_sweep(counters: DailyCounters) {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(3600));
        loop {
            tick.tick().await;
            if let Some(yesterday) = chrono::Local::now().date_naive().pred_opt() {
                if let Err(err) = counters.sweep(yesterday) {
                    tracing::warn!(%err, "daily counter sweep failed");
                }
            }
        }
    });
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let pg_db = init_pg_db();
    let kv: Arc<dyn KvStore> = Arc::new(RedisStore::new(init_redis_db()));

    let cache = AvailabilityCache::new(kv.clone());
    let locks = SlotLockManager::new(kv.clone());
    let status = BookingStatusStore::new(kv.clone());
    let counters = DailyCounters::new(kv.clone());
    let limiter = RateLimiter::new(kv.clone());
    let availability = AvailabilityEngine::new(pg_db.clone(), cache.clone());
    let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);
    let email: Arc<dyn EmailSender> = Arc::new(LogNotifier);

    // One worker keeps the reservations topic strictly FIFO.
    let queue = TaskQueue::start(
        JobContext {
            pg_db: pg_db.clone(),
            cache: cache.clone(),
            status: status.clone(),
            counters: counters.clone(),
            notifier: notifier.clone(),
            email,
        },
        1,
    );

    spawn_counter_sweep(counters.clone());

    let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_owned());

    HttpServer::new(move || {
        App::new()
            .wrap(Cors::permissive())
            .app_data(Data::new(AppState {
                pg_db: pg_db.clone(),
                availability: availability.clone(),
                cache: cache.clone(),
                locks: locks.clone(),
                status: status.clone(),
                limiter: limiter.clone(),
                counters: counters.clone(),
                notifier: notifier.clone(),
                queue: queue.clone(),
            }))
            .service(services::home_page)
            .service(
                web::scope("/availability")
                    .service(services::availability_route::check_availability)
                    .service(services::availability_route::list_slots),
            )
            .service(
                web::scope("/reservation")
                    .service(services::reservation_route::book_table)
                    .service(services::reservation_route::book_direct)
                    .service(services::reservation_route::poll_status)
                    .service(services::reservation_route::cancel_reservation)
                    .service(services::reservation_route::request_arrival_otp)
                    .service(services::reservation_route::verify_arrival),
            )
            .service(
                web::scope("/otp")
                    .service(services::otp_route::verify_otp)
                    .service(services::otp_route::get_otp_session),
            )
            .service(
                web::scope("/admin")
                    .service(services::admin_route::clear_cache)
                    .service(services::admin_route::daily_stats),
            )
            .service(web::scope("/test").service(services::test_route::healthcheck))
    })
    .bind(bind_addr)?
    .run()
    .await
}
