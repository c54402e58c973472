//! Persisted engine preferences.
//!
//! Filter mode, sort order and the session-scoped precise filter are
//! serialized to JSON and stored in the catalog's `settings` table,
//! one row per key.

use crate::engine::criteria::{FilterMode, SessionFilter};
use crate::error::StoreError;
use crate::state::data::SortOrder;
use crate::state::library::Library;
use crate::store::SettingsStore;

const KEY_FILTER_MODE: &str = "filter_mode";
const KEY_SORT_ORDER: &str = "sort_order";
const KEY_SESSION_FILTER: &str = "session_filter";

fn parse<T: serde::de::DeserializeOwned>(key: &str, json: &str) -> Result<T, StoreError> {
    serde_json::from_str(json).map_err(|source| StoreError::CorruptSetting {
        key: key.to_string(),
        source,
    })
}

fn render<T: serde::Serialize>(key: &str, value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|source| StoreError::CorruptSetting {
        key: key.to_string(),
        source,
    })
}

impl Library {
    /// Save the global filter mode. The engine only reads the mode; the
    /// settings screen writes it through this.
    pub fn set_filter_mode(&self, mode: &FilterMode) -> Result<(), StoreError> {
        self.set_setting(KEY_FILTER_MODE, &render(KEY_FILTER_MODE, mode)?)
    }
}

impl SettingsStore for Library {
    fn filter_mode(&self) -> Result<FilterMode, StoreError> {
        match self.get_setting(KEY_FILTER_MODE)? {
            Some(json) => parse(KEY_FILTER_MODE, &json),
            None => Ok(FilterMode::default()),
        }
    }

    fn sort_order(&self) -> Result<Option<SortOrder>, StoreError> {
        match self.get_setting(KEY_SORT_ORDER)? {
            Some(json) => Ok(Some(parse(KEY_SORT_ORDER, &json)?)),
            None => Ok(None),
        }
    }

    fn set_sort_order(&self, order: SortOrder) -> Result<(), StoreError> {
        self.set_setting(KEY_SORT_ORDER, &render(KEY_SORT_ORDER, &order)?)
    }

    fn session_filter(&self) -> Result<Option<SessionFilter>, StoreError> {
        match self.get_setting(KEY_SESSION_FILTER)? {
            Some(json) => Ok(Some(parse(KEY_SESSION_FILTER, &json)?)),
            None => Ok(None),
        }
    }

    fn set_session_filter(&self, filter: &SessionFilter) -> Result<(), StoreError> {
        self.set_setting(KEY_SESSION_FILTER, &render(KEY_SESSION_FILTER, filter)?)
    }

    fn clear_session_filter(&self) -> Result<(), StoreError> {
        self.delete_setting(KEY_SESSION_FILTER)
    }
}
