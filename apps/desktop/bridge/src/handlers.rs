//! Channels served by `ipc-bridge host`.
//!
//! | Channel     | Payload          | Response                                   |
//! |-------------|------------------|--------------------------------------------|
//! | `ping`      | `{ "n": int }`   | `{ "n": n + 1 }`                           |
//! | `echo`      | any              | the payload                                |
//! | `app:info`  | ignored          | name, version, pid, uptime, channels       |
//! | `app:fail`  | optional message | always fails with `DemoError`              |
//! | `app:sleep` | `{ "ms": int }`  | `{ "slept_ms": ms }` after sleeping        |

use ipc_core::ErrorObject;
use ipc_core::error::ResponderError;
use ipc_core::responder::ResponseResponder;

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{Value, json};

pub const PING_CHANNEL: &str = "ping";
pub const ECHO_CHANNEL: &str = "echo";
pub const INFO_CHANNEL: &str = "app:info";
pub const FAIL_CHANNEL: &str = "app:fail";
pub const SLEEP_CHANNEL: &str = "app:sleep";

/// Upper bound for `app:sleep`.
const MAX_SLEEP_MS: u64 = 60_000;

/// Register every demo handler on `responder`.
pub fn register(responder: &ResponseResponder) -> Result<(), ResponderError> {
    let started = Instant::now();

    responder.on(PING_CHANNEL, |_context, payload, respond| {
        let n = payload
            .get("n")
            .and_then(Value::as_i64)
            .ok_or_else(|| ErrorObject::named("TypeError", "ping expects { \"n\": <integer> }"))?;
        let next = n
            .checked_add(1)
            .ok_or_else(|| ErrorObject::named("RangeError", format!("ping cannot increment {n}")))?;
        respond.ok(json!({ "n": next }));
        Ok(())
    })?;

    responder.on(ECHO_CHANNEL, |_context, payload, respond| {
        respond.ok(payload);
        Ok(())
    })?;

    let channels = Arc::new(
        [PING_CHANNEL, ECHO_CHANNEL, INFO_CHANNEL, FAIL_CHANNEL, SLEEP_CHANNEL].map(String::from),
    );
    responder.on(INFO_CHANNEL, move |context, _payload, respond| {
        respond.ok(json!({
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "pid": std::process::id(),
            "uptime_ms": u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "channels": channels.as_slice(),
            "caller": context.origin().label(),
        }));
        Ok(())
    })?;

    responder.on(FAIL_CHANNEL, |_context, payload, _respond| {
        let message = payload.as_str().unwrap_or("requested failure");
        Err(ErrorObject::named("DemoError", message)
            .with_code("E_DEMO")
            .with_data(json!({ "payload": payload })))
    })?;

    responder.on_async(SLEEP_CHANNEL, |_context, payload| async move {
        let ms = payload
            .get("ms")
            .and_then(Value::as_u64)
            .ok_or_else(|| ErrorObject::named("TypeError", "app:sleep expects { \"ms\": <integer> }"))?;
        if ms > MAX_SLEEP_MS {
            return Err(ErrorObject::named(
                "RangeError",
                format!("ms must be at most {MAX_SLEEP_MS}"),
            ));
        }
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(json!({ "slept_ms": ms }))
    })?;

    Ok(())
}
