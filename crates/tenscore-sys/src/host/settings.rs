//! Process-wide settings store and runtime initialisation.

use super::{Failure, HostResult, guarded, new_string, read_str};
use crate::*;
use libc::c_char;
use std::collections::HashMap;
use std::ptr;
use std::sync::{Mutex, MutexGuard, OnceLock};

/// Environment variables with this prefix seed the settings store.
pub const ENV_PREFIX: &str = "TENSCORE_";

const DEFAULTS: &[(&str, &str)] = &[("TENSCORE_DEVICE", "host.0")];

static SETTINGS: OnceLock<Mutex<HashMap<String, String>>> = OnceLock::new();

fn seed_from_env() -> HashMap<String, String> {
    let mut settings: HashMap<String, String> = DEFAULTS
        .iter()
        .map(|&(key, value)| (key.to_owned(), value.to_owned()))
        .collect();
    settings.extend(std::env::vars().filter(|(key, _)| key.starts_with(ENV_PREFIX)));
    settings
}

fn settings() -> HostResult<MutexGuard<'static, HashMap<String, String>>> {
    SETTINGS
        .get_or_init(|| Mutex::new(seed_from_env()))
        .lock()
        .map_err(|_| Failure::new(TC_STATUS_INTERNAL, "settings store is poisoned"))
}

/// Initialise the runtime. Safe to call more than once.
#[unsafe(no_mangle)]
pub extern "C" fn tc_init(err: *mut tc_error) {
    guarded(err, (), || settings().map(drop))
}

/// Get the value of a setting.
#[unsafe(no_mangle)]
pub extern "C" fn tc_settings_get(err: *mut tc_error, key: *const c_char) -> *mut tc_string {
    guarded(err, ptr::null_mut(), || {
        let key = unsafe { read_str(key, "key")? };
        let store = settings()?;
        let value = store
            .get(key)
            .ok_or_else(|| Failure::new(TC_STATUS_NOT_FOUND, format!("unknown setting '{key}'")))?;
        Ok(new_string(value.as_str()))
    })
}

/// Set a setting, creating it if needed.
#[unsafe(no_mangle)]
pub extern "C" fn tc_settings_set(err: *mut tc_error, key: *const c_char, value: *const c_char) {
    guarded(err, (), || {
        let key = unsafe { read_str(key, "key")? };
        let value = unsafe { read_str(value, "value")? };
        if key.is_empty() {
            return Err(Failure::invalid("setting key must not be empty"));
        }
        settings()?.insert(key.to_owned(), value.to_owned());
        Ok(())
    })
}
