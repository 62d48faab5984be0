use actix::Addr;
use chrono::{NaiveDate, NaiveTime};

use crate::services::cache::AvailabilityCache;
use crate::services::db_models::TableSummary;
use crate::services::db_utils::PgActor;
use crate::services::messages::{FetchDaySetting, FetchRestaurantSetting, FindFreeTables};
use crate::services::slots;
use crate::types::{
    CoreError, CoreResult, DEFAULT_CLOSES_AT, DEFAULT_OPENS_AT, DEFAULT_SLOT_INTERVAL_MIN,
};

#[derive(Debug)]
pub enum Availability {
    Closed,
    Open { tables: Vec<TableSummary> },
}

/// Cache-first availability checks plus the settings-driven slot listing.
#[derive(Clone)]
pub struct AvailabilityEngine {
    pg_db: Addr<PgActor>,
    cache: AvailabilityCache,
}

impl AvailabilityEngine {
    pub fn new(pg_db: Addr<PgActor>, cache: AvailabilityCache) -> Self {
        AvailabilityEngine { pg_db, cache }
    }

    pub async fn check(
        &self,
        date: NaiveDate,
        time: NaiveTime,
        pax: i32,
    ) -> CoreResult<Availability> {
        slots::validate_pax(pax)?;

        // Closed dates short-circuit before the cache is consulted.
        if !self.is_date_open(date).await? {
            return Ok(Availability::Closed);
        }

        if let Some(tables) = self.cache.lookup(date, time, pax)? {
            return Ok(Availability::Open { tables });
        }

        let free = self
            .pg_db
            .send(FindFreeTables { date, time, pax })
            .await
            .map_err(mailbox_err)??;
        let tables: Vec<TableSummary> = free.iter().map(TableSummary::from).collect();

        self.cache.put(date, time, pax, &tables)?;

        Ok(Availability::Open { tables })
    }

    pub async fn is_date_open(&self, date: NaiveDate) -> CoreResult<bool> {
        let setting = self
            .pg_db
            .send(FetchDaySetting(date))
            .await
            .map_err(mailbox_err)??;
        // No per-date row means the restaurant is open as usual.
        Ok(setting.map(|s| s.is_open).unwrap_or(true))
    }

    /// Bookable start times for the date, from the per-date override when
    /// present, the global settings row otherwise, compiled defaults last.
    pub async fn slots_for(&self, date: NaiveDate) -> CoreResult<Vec<String>> {
        let day = self
            .pg_db
            .send(FetchDaySetting(date))
            .await
            .map_err(mailbox_err)??;

        if let Some(setting) = &day {
            if !setting.is_open {
                return Ok(vec![]);
            }
        }

        let global = self
            .pg_db
            .send(FetchRestaurantSetting)
            .await
            .map_err(mailbox_err)??;

        let default_opens = NaiveTime::parse_from_str(DEFAULT_OPENS_AT, "%H:%M").unwrap();
        let default_closes = NaiveTime::parse_from_str(DEFAULT_CLOSES_AT, "%H:%M").unwrap();

        let opens_at = day
            .as_ref()
            .and_then(|s| s.opens_at)
            .or_else(|| global.as_ref().map(|s| s.opens_at))
            .unwrap_or(default_opens);
        let closes_at = day
            .as_ref()
            .and_then(|s| s.closes_at)
            .or_else(|| global.as_ref().map(|s| s.closes_at))
            .unwrap_or(default_closes);
        let interval = global
            .as_ref()
            .map(|s| s.slot_interval_min)
            .unwrap_or(DEFAULT_SLOT_INTERVAL_MIN);

        Ok(slots::slot_times(opens_at, closes_at, interval)
            .into_iter()
            .map(|t| t.format("%H:%M").to_string())
            .collect())
    }
}

fn mailbox_err(_: actix::MailboxError) -> CoreError {
    CoreError::Infrastructure("database actor unavailable".into())
}
