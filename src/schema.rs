//! Handwritten Diesel schema declaration for the single time-series table.
//!
//! There are no migrations: the table is provisioned by the storage connector
//! at connect time, because the target database is operator-supplied at
//! runtime. This declaration only exists so we can derive Insertable in a
//! type-safe way.

diesel::table! {
    homey (homey_id, device_id, capability_id, time) {
        #[max_length = 24]
        homey_id -> Varchar,
        #[max_length = 36]
        device_id -> Varchar,
        #[max_length = 1000]
        capability_id -> Varchar,
        time -> Timestamptz,
        value -> Nullable<Numeric>,
    }
}
