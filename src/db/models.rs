//! Diesel model structs for the `homey` time-series table.
//!
//! One row per observed capability change. The composite primary key
//! (homey_id, device_id, capability_id, time) allows at most one stored value
//! per device/capability per millisecond; the insert path ignores duplicates
//! via `ON CONFLICT DO NOTHING`.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema;

#[derive(Debug, Clone, PartialEq, Insertable, Serialize, Deserialize)]
#[diesel(table_name = schema::homey)]
pub struct NewEntry {
    pub homey_id: String,
    pub device_id: String,
    pub capability_id: String,
    pub time: DateTime<Utc>,
    pub value: BigDecimal,
}

impl NewEntry {
    pub fn new(
        homey_id: impl Into<String>,
        device_id: impl Into<String>,
        capability_id: impl Into<String>,
        time: DateTime<Utc>,
        value: BigDecimal,
    ) -> Self {
        NewEntry {
            homey_id: homey_id.into(),
            device_id: device_id.into(),
            capability_id: capability_id.into(),
            time,
            value,
        }
    }
}
