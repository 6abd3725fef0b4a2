//! Drives the C surface the way a host program would: configure, answer the
//! permission prompt, track one event, dispatch and wait for delivery.
//!
//! Usage: `cls-demo [event-name] [payload-json]`. `CLS_*` variables are read
//! from the environment or a `.env` file.

use anyhow::{bail, Context, Result};
use cls_ffi::ffi::exports::*;
use cls_ffi::ffi::{STATUS_OK, STATUS_PROMPT_REQUIRED, STATUS_TIMED_OUT};
use dotenvy::dotenv;
use std::ffi::{CStr, CString};
use std::io::Write;

const FLUSH_TIMEOUT_MS: u32 = 10_000;

fn c_string(value: &str) -> Result<CString> {
    CString::new(value).with_context(|| format!("argument contains a NUL byte: {value:?}"))
}

fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv().ok();

    let mut args = std::env::args().skip(1);
    let name = c_string(&args.next().unwrap_or_else(|| "command".to_string()))?;
    let payload = c_string(&args.next().unwrap_or_else(|| r#"{"version": "1.0"}"#.to_string()))?;

    let version = c_string(env!("CARGO_PKG_VERSION"))?;
    let slug = c_string("cls-demo")?;
    let instance = c_string("demo")?;

    set_debug(1);
    unsafe {
        set_version(version.as_ptr());
        set_project_slug(slug.as_ptr());
        set_instance_id(instance.as_ptr());
    }
    set_noninteractive_tracking(0, 0);
    set_ci_tracking_enabled(1);

    if consent_status() == STATUS_PROMPT_REQUIRED {
        let prompt = permission_prompt_text();
        if !prompt.is_null() {
            let text = unsafe { CStr::from_ptr(prompt) }.to_string_lossy().into_owned();
            unsafe { free_string(prompt) };
            println!("{text}\n");
        }
        print!("Allow tracking? [y/N] ");
        std::io::stdout().flush()?;
        let mut answer = String::new();
        std::io::stdin().read_line(&mut answer)?;
        let allow = matches!(answer.trim(), "y" | "Y" | "yes");
        answer_permission_prompt(u32::from(allow));
    }

    let status = unsafe { track_event(slug.as_ptr(), name.as_ptr(), payload.as_ptr(), 0) };
    println!("track_event -> {status}");

    if dispatch_events() != STATUS_OK {
        bail!("dispatch_events failed, see log output");
    }

    match flush_events(FLUSH_TIMEOUT_MS) {
        STATUS_OK => println!("All events delivered or dropped"),
        STATUS_TIMED_OUT => println!("Gave up waiting after {FLUSH_TIMEOUT_MS} ms"),
        other => bail!("flush_events returned {other}"),
    }
    Ok(())
}
