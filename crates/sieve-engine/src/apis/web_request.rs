//! `_webRequest` API
//!
//! `_webRequest.GET(url, headers, callback)` fetches through the engine's
//! [`WebRequest`] collaborator. `headers` is a plain object of string
//! values; the callback receives
//! `{status, responseStatus, responseText, responseHeaders}`.
//!
//! [`WebRequest`]: crate::platform::WebRequest

use super::{define_function, deliver, function_arg, require_args};
use crate::engine::Engine;
use crate::error::JsResult;
use crate::platform::HeaderList;
use crate::value::JsValue;

pub(super) fn install(engine: &Engine, global: &JsValue) -> JsResult<()> {
    let web_request = engine.new_object()?;

    define_function(engine, &web_request, "GET", |info| {
        require_args(info, 3, "_webRequest.GET")?;
        let url = info.arg(0).as_string();
        let headers = header_list(&info.arg(1))?;
        let callback = function_arg(info, 2, "_webRequest.GET")?;

        info.engine().web_request().get(
            &url,
            &headers,
            Box::new(move |response| {
                deliver(callback, |engine| {
                    let response_headers = engine.new_object()?;
                    for (name, value) in &response.response_headers {
                        response_headers.set_property(name, value)?;
                    }
                    let payload = engine.new_object()?;
                    payload.set_property("status", response.status.as_str())?;
                    payload.set_property("responseStatus", u32::from(response.response_status))?;
                    payload.set_property("responseText", response.response_text)?;
                    payload.set_property("responseHeaders", response_headers)?;
                    Ok(payload)
                })
            }),
        );
        Ok(info.engine().undefined())
    })?;

    global.define_hidden("_webRequest", web_request)
}

/// Own enumerable properties of `headers` as name/value pairs. Anything
/// other than an object means no headers.
fn header_list(headers: &JsValue) -> JsResult<HeaderList> {
    if !headers.is_object() {
        return Ok(Vec::new());
    }
    headers
        .get_own_property_names()?
        .into_iter()
        .map(|name| {
            let value = headers.get_property(&name)?.as_string();
            Ok((name, value))
        })
        .collect()
}
