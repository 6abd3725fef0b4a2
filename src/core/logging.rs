//! # Diagnostic Logging
//!
//! Installs an `env_logger` backend on first use. The host may be a script
//! with no logger of its own, so the library brings one; a Rust host that
//! already installed a logger keeps it and this module stays out of the way.
//!
//! Output goes to stderr with a `CLS:` prefix so the host's stdout is never
//! touched.

use log::LevelFilter;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Once;

static INIT: Once = Once::new();

/// Set when our logger was installed and a `CLS_LOG` filter is not in charge
static OWNS_LEVEL: AtomicBool = AtomicBool::new(false);

/// Install the logger. `filter` is a `CLS_LOG` style directive that, when
/// present, fixes the level for the whole run.
pub fn init(filter: Option<&str>, debug: bool) {
    INIT.call_once(|| {
        let mut builder = env_logger::Builder::new();
        builder.format(|buf, record| {
            writeln!(buf, "CLS: [{}] {}", record.level(), record.args())
        });

        match filter {
            Some(directives) => {
                builder.parse_filters(directives);
            }
            None => {
                builder.filter_module(module_root(), LevelFilter::Trace);
            }
        }

        if builder.try_init().is_ok() && filter.is_none() {
            OWNS_LEVEL.store(true, Ordering::SeqCst);
        }
    });
    set_debug(debug);
}

/// Toggle verbose output. A no-op when a `CLS_LOG` filter or a foreign
/// logger controls the level.
pub fn set_debug(debug: bool) {
    if OWNS_LEVEL.load(Ordering::SeqCst) {
        log::set_max_level(if debug {
            LevelFilter::Debug
        } else {
            LevelFilter::Off
        });
    }
}

fn module_root() -> &'static str {
    module_path!().split("::").next().unwrap_or("cls_ffi")
}
