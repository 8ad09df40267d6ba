//! deno_core op definitions for the capability sandbox.
//!
//! The `#[op2]` macro generates additional public items (v8 function pointers,
//! metadata structs) that cannot carry doc comments. We suppress `missing_docs`
//! at the module level — all actual functions and types are documented below.
#![allow(missing_docs)]

use std::cell::RefCell;
use std::rc::Rc;

use deno_core::{op2, OpState};
use deno_error::JsErrorBox;
use serde_json::json;

use crate::date;
use crate::trace::AnalyticsSink;

/// Wrapper for the handler's serialized result envelope, stored in OpState.
pub struct ExecutionResult(pub String);

/// The shared HTTP client backing sandboxed `fetch`, stored in OpState.
pub struct HttpClient(pub reqwest::Client);

/// Cap on response body bytes read back into the isolate, stored in OpState.
pub struct MaxResponseSize(pub usize);

/// Record a `console.log` line in the trace.
#[op2(fast)]
pub fn op_runlet_log(state: &mut OpState, #[string] msg: &str) {
    tracing::debug!(target: "runlet::sandbox::js", "{}", msg);
    state.borrow_mut::<AnalyticsSink>().push_log(msg);
}

/// Record a `console.error` line in the trace.
#[op2(fast)]
pub fn op_runlet_error(state: &mut OpState, #[string] msg: &str) {
    tracing::debug!(target: "runlet::sandbox::js", "{}", msg);
    state.borrow_mut::<AnalyticsSink>().push_error(msg);
}

/// Store the handler's result envelope in OpState.
#[op2(fast)]
pub fn op_runlet_set_result(state: &mut OpState, #[string] json: &str) {
    state.put(ExecutionResult(json.to_string()));
}

/// Perform an HTTP request on behalf of sandbox code.
///
/// Backs both the global `fetch` and the REST client. Every call counts
/// against the invocation's `apiCallCount` metric, including failed ones.
/// Returns a JSON envelope `{status, ok, headers, body}`.
#[op2(async)]
#[string]
pub async fn op_runlet_fetch(
    op_state: Rc<RefCell<OpState>>,
    #[string] method: String,
    #[string] url: String,
    #[string] headers_json: String,
    #[string] body: String,
) -> Result<String, JsErrorBox> {
    let client = {
        let mut st = op_state.borrow_mut();
        st.borrow_mut::<AnalyticsSink>().api_call_count += 1;
        st.borrow::<HttpClient>().0.clone()
    };
    let max_response_size = {
        let st = op_state.borrow();
        st.try_borrow::<MaxResponseSize>()
            .map(|m| m.0)
            .unwrap_or(8 * 1024 * 1024)
    };

    tracing::debug!(method = %method, url = %url, "sandboxed fetch dispatched");

    let method = reqwest::Method::from_bytes(method.as_bytes())
        .map_err(|_| JsErrorBox::generic(format!("invalid HTTP method: {method}")))?;

    let mut request = client.request(method, &url);

    let headers: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&headers_json)
        .map_err(|e| JsErrorBox::generic(format!("invalid headers: {e}")))?;
    for (name, value) in &headers {
        if let Some(value) = value.as_str() {
            request = request.header(name, value);
        }
    }
    if !body.is_empty() {
        request = request.body(body);
    }

    let response = request
        .send()
        .await
        .map_err(|e| JsErrorBox::generic(format!("fetch failed: {e}")))?;

    let status = response.status().as_u16();
    let ok = response.status().is_success();
    let response_headers: serde_json::Map<String, serde_json::Value> = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.to_string(), json!(v)))
        })
        .collect();

    let mut text = response
        .text()
        .await
        .map_err(|e| JsErrorBox::generic(format!("fetch body read failed: {e}")))?;
    if text.len() > max_response_size {
        let end = text
            .char_indices()
            .take_while(|(i, _)| *i < max_response_size)
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        text.truncate(end);
    }

    let envelope = json!({
        "status": status,
        "ok": ok,
        "headers": response_headers,
        "body": text,
    });
    serde_json::to_string(&envelope)
        .map_err(|e| JsErrorBox::generic(format!("response serialization failed: {e}")))
}

/// Suspend for `ms` milliseconds. Backs the sandbox `setTimeout`/`sleep`.
///
/// Capped at ten minutes so a stray argument cannot pin the event loop
/// past any reasonable deadline.
#[op2(async)]
pub async fn op_runlet_sleep(#[smi] ms: u32) {
    let ms = ms.min(600_000);
    tokio::time::sleep(std::time::Duration::from_millis(u64::from(ms))).await;
}

/// Parse a human-entered date in the given time zone.
///
/// Returns the UTC instant as RFC 3339, or the empty string when the
/// input does not parse. The JS shim maps the empty string to `null`.
#[op2]
#[string]
pub fn op_runlet_parse_date(#[string] input: &str, #[string] tz: &str) -> String {
    date::parse_date(input, tz)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_default()
}

/// Parse a start/end pair in the given time zone.
///
/// Returns `{"start": rfc3339, "end": rfc3339}` or throws with the
/// validation message.
#[op2]
#[string]
pub fn op_runlet_parse_start_end(
    #[string] start: &str,
    #[string] end: &str,
    #[string] tz: &str,
) -> Result<String, JsErrorBox> {
    let (start, end) = date::parse_start_and_end(start, end, tz).map_err(JsErrorBox::generic)?;
    let envelope = json!({
        "start": start.to_rfc3339(),
        "end": end.to_rfc3339(),
    });
    serde_json::to_string(&envelope)
        .map_err(|e| JsErrorBox::generic(format!("result serialization failed: {e}")))
}

deno_core::extension!(
    runlet_ext,
    ops = [
        op_runlet_log,
        op_runlet_error,
        op_runlet_set_result,
        op_runlet_fetch,
        op_runlet_sleep,
        op_runlet_parse_date,
        op_runlet_parse_start_end
    ],
);
