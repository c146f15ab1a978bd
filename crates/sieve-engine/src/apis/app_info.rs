use crate::engine::Engine;
use crate::error::JsResult;
use crate::value::JsValue;

pub(super) fn install(engine: &Engine, global: &JsValue) -> JsResult<()> {
    let json = serde_json::to_string(engine.app_info())?;
    global.define_hidden("_appInfo", engine.parse_json(&json)?)
}
