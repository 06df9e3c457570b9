use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::error::ModbusError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Quality {
    Good,
    Bad,
}

/// Result of a read: the value, when it was taken and whether it is usable.
///
/// A Bad item carries the zero value of its type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemData<T> {
    pub value: T,
    pub timestamp: DateTime<Utc>,
    pub quality: Quality,
}

impl<T> ItemData<T> {
    pub fn good(value: T) -> Self {
        Self {
            value,
            timestamp: Utc::now(),
            quality: Quality::Good,
        }
    }

    pub fn bad_with(value: T) -> Self {
        Self {
            value,
            timestamp: Utc::now(),
            quality: Quality::Bad,
        }
    }

    pub fn is_good(&self) -> bool {
        self.quality == Quality::Good
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ItemData<U> {
        ItemData {
            value: f(self.value),
            timestamp: self.timestamp,
            quality: self.quality,
        }
    }
}

impl<T: Default> ItemData<T> {
    pub fn bad() -> Self {
        Self::bad_with(T::default())
    }
}

impl<T: Default> From<Result<T, ModbusError>> for ItemData<T> {
    fn from(result: Result<T, ModbusError>) -> Self {
        match result {
            Ok(value) => Self::good(value),
            Err(_) => Self::bad(),
        }
    }
}
