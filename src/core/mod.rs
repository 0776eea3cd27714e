pub mod connection;
pub mod task;

use chrono::NaiveDateTime;

/// Local wall-clock time, the timestamp used on every stored record.
pub fn now() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}
