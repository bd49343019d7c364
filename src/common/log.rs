//! Logging setup emitting one JSON object per line.
//!
//! Records go through the `log` facade; `env_logger` renders them as
//! `{"ts":..,"level":..,"mod":..,"msg":..}` on stderr. The filter comes from
//! `RUST_LOG` and defaults to `info`.

use std::io::Write;

use env_logger::{Builder, Env};
use serde_json::json;

use crate::common::time;

/// Install the JSON line logger. Calling it twice is a no-op.
pub fn init() {
    let _ = Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| {
            let line = json!({
                "ts": time::now_ms(),
                "level": record.level().as_str(),
                "mod": record.target(),
                "msg": record.args().to_string(),
            });
            writeln!(buf, "{line}")
        })
        .try_init();
}
