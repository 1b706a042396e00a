use js_sys::{Function, Promise};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;
use web_sys::{File, FileReader};

use crate::models::AttachmentUpload;

/// Reads a picked file as a `data:` URL. The server strips the prefix and validates the payload.
pub async fn read_upload(file: File) -> Result<AttachmentUpload, String> {
    let name = file.name();
    let reader = FileReader::new().map_err(|e| format!("Failed to read {name}: {e:?}"))?;

    let promise = Promise::new(&mut |resolve: Function, reject: Function| {
        let done = reader.clone();
        let onload = Closure::once_into_js(move || {
            let result = done.result().unwrap_or(JsValue::NULL);
            let _ = resolve.call1(&JsValue::NULL, &result);
        });
        reader.set_onload(Some(onload.unchecked_ref()));

        let onerror = Closure::once_into_js(move || {
            let _ = reject.call1(&JsValue::NULL, &JsValue::from_str("read error"));
        });
        reader.set_onerror(Some(onerror.unchecked_ref()));
    });

    reader
        .read_as_data_url(&file)
        .map_err(|e| format!("Failed to read {name}: {e:?}"))?;
    let result = JsFuture::from(promise)
        .await
        .map_err(|e| format!("Failed to read {name}: {e:?}"))?;

    let data_url = result
        .as_string()
        .ok_or_else(|| format!("Failed to read {name}: unexpected reader result"))?;
    Ok(AttachmentUpload { name, mime_type: file.type_(), data_url })
}
