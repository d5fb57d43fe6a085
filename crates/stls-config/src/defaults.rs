//! Default value functions for serde deserialization.
//!
//! These functions forward to constants defined in `stls_core::defaults`.

use stls_core::defaults;

/// Generate default value functions that forward to stls_core::defaults constants.
macro_rules! default_fns {
    // For Copy types (integers, bool, etc.)
    ($($fn_name:ident => $const_name:ident : $ty:ty),* $(,)?) => {
        $(
            pub(crate) fn $fn_name() -> $ty {
                defaults::$const_name
            }
        )*
    };
}

/// Generate default value functions that return String from &str constants.
macro_rules! default_string_fns {
    ($($fn_name:ident => $const_name:ident),* $(,)?) => {
        $(
            pub(crate) fn $fn_name() -> String {
                defaults::$const_name.to_string()
            }
        )*
    };
}

default_fns! {
    default_relay_buffer_size      => DEFAULT_RELAY_BUFFER_SIZE: usize,
    min_relay_buffer_size          => MIN_RELAY_BUFFER_SIZE: usize,
    max_relay_buffer_size          => MAX_RELAY_BUFFER_SIZE: usize,
    default_handshake_timeout_secs => DEFAULT_HANDSHAKE_TIMEOUT_SECS: u64,
    default_close_notify           => DEFAULT_CLOSE_NOTIFY: bool,
}

default_string_fns! {
    default_min_tls_version => DEFAULT_TLS_MIN_VERSION,
    default_max_tls_version => DEFAULT_TLS_MAX_VERSION,
}
