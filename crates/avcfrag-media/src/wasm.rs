//! Browser exports: `createInit(bytes)` and `createSegment(bytes, ts, dur)`.
//!
//! Each returns a fresh `Uint8Array` on success or a string describing the
//! failure.

use js_sys::Uint8Array;
use wasm_bindgen::prelude::*;

use crate::binding::{self, BindingOutput};

fn to_js(output: BindingOutput) -> JsValue {
    match output {
        BindingOutput::Buffer(bytes) => Uint8Array::from(bytes.as_slice()).into(),
        BindingOutput::Message(msg) => JsValue::from_str(&msg),
    }
}

/// Build an init segment from an Annex-B buffer holding SPS and PPS.
///
/// ```javascript
/// import { createInit } from 'avcfrag-media';
///
/// const init = createInit(keyframe);
/// if (typeof init === 'string') throw new Error(init);
/// sourceBuffer.appendBuffer(init);
/// ```
#[wasm_bindgen(js_name = createInit)]
pub fn create_init(bitstream: &[u8]) -> JsValue {
    to_js(binding::create_init(bitstream))
}

/// Build a one-frame media segment; `timestamp` and `duration` in seconds.
#[wasm_bindgen(js_name = createSegment)]
pub fn create_segment(bitstream: &[u8], timestamp: i32, duration: i32) -> JsValue {
    to_js(binding::create_segment(
        bitstream,
        i64::from(timestamp),
        i64::from(duration),
    ))
}
