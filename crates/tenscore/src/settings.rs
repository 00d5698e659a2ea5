//! Runtime settings.
//!
//! Settings are string key/value pairs held by the runtime. The host runtime
//! seeds them from `TENSCORE_*` environment variables when it initialises.

use crate::error::{Error, Result};
use crate::ffi;
use std::ffi::CString;

/// Access to the runtime's process-wide settings store.
#[derive(Debug, Clone, Copy)]
pub struct Settings;

fn c_string(text: &str, what: &str) -> Result<CString> {
    CString::new(text).map_err(|_| Error::invalid_argument(format!("{what} must not contain NUL bytes")))
}

impl Settings {
    /// Get the setting named `key`.
    pub fn get(key: &str) -> Result<String> {
        let key = c_string(key, "setting key")?;
        let api = ffi::runtime()?;
        let ptr = api.call(|err| unsafe { (api.settings_get)(err, key.as_ptr()) })?;
        Ok(unsafe { api.take_string(ptr) })
    }

    /// Set the setting named `key` to `value`.
    pub fn set(key: &str, value: &str) -> Result<()> {
        let key = c_string(key, "setting key")?;
        let value = c_string(value, "setting value")?;
        let api = ffi::runtime()?;
        api.call(|err| unsafe { (api.settings_set)(err, key.as_ptr(), value.as_ptr()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        crate::init().unwrap();
        Settings::set("TENSCORE_TEST_SETTINGS_UNIT", "42").unwrap();
        assert_eq!(Settings::get("TENSCORE_TEST_SETTINGS_UNIT").unwrap(), "42");
    }

    #[test]
    fn test_nul_key_rejected() {
        assert!(Settings::get("bad\0key").unwrap_err().is_invalid_argument());
        assert!(Settings::set("key", "bad\0value").unwrap_err().is_invalid_argument());
    }
}
