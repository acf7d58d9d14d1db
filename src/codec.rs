//! Name-keyed, fault-tolerant payload codecs (spec §4.3).

use crate::byte_extractor::Endian;
use crate::value::Value;
use base64::Engine;
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

#[derive(Debug, Clone, Default)]
pub struct CodecOptions {
    pub endian: Endian,
}

pub type DecodeFn = fn(&[u8], &CodecOptions) -> Option<Value>;

/// Later registration overwrites earlier, matching spec §4.3. Decoding is
/// fault-tolerant: a panic inside a codec is caught and converted to `None`
/// the same way the spec wants exceptions converted to `undefined`.
#[derive(Default)]
pub struct CodecRegistry {
    codecs: HashMap<String, DecodeFn>,
}

impl CodecRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry pre-loaded with every built-in codec from spec §4.3.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        bridge_macros::register_builtin_codecs!(
            registry,
            [
                raw, utf8, json, base64, uint8, int8, uint16, int16, uint32, int32, float32,
                float64, protobuf, msgpack
            ]
        );
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, decode: DecodeFn) {
        self.codecs.insert(name.into(), decode);
    }

    pub fn names(&self) -> Vec<&str> {
        self.codecs.keys().map(String::as_str).collect()
    }

    /// Decodes `bytes` with the named codec. Unknown codec name, or any
    /// failure/panic inside the codec, yields `None`.
    pub fn decode(&self, name: &str, bytes: &[u8], options: &CodecOptions) -> Option<Value> {
        let decode_fn = *self.codecs.get(name)?;
        catch_unwind(AssertUnwindSafe(|| decode_fn(bytes, options))).unwrap_or(None)
    }
}

fn decode_raw(bytes: &[u8], _options: &CodecOptions) -> Option<Value> {
    Some(Value::Bytes(bytes.to_vec()))
}

fn decode_utf8(bytes: &[u8], _options: &CodecOptions) -> Option<Value> {
    std::str::from_utf8(bytes).ok().map(|s| Value::String(s.to_string()))
}

fn decode_json(bytes: &[u8], _options: &CodecOptions) -> Option<Value> {
    serde_json::from_slice::<serde_json::Value>(bytes)
        .ok()
        .map(Value::from)
}

fn decode_base64(bytes: &[u8], _options: &CodecOptions) -> Option<Value> {
    let text = std::str::from_utf8(bytes).ok()?;
    base64::engine::general_purpose::STANDARD
        .decode(text.trim())
        .ok()
        .map(Value::Bytes)
}

fn decode_uint8(bytes: &[u8], _options: &CodecOptions) -> Option<Value> {
    bytes.first().map(|b| Value::Number(*b as f64))
}

fn decode_int8(bytes: &[u8], _options: &CodecOptions) -> Option<Value> {
    bytes.first().map(|b| Value::Number(*b as i8 as f64))
}

fn decode_uint16(bytes: &[u8], options: &CodecOptions) -> Option<Value> {
    if bytes.len() < 2 {
        return None;
    }
    let v = match options.endian {
        Endian::Big => BigEndian::read_u16(bytes),
        Endian::Little => LittleEndian::read_u16(bytes),
    };
    Some(Value::Number(v as f64))
}

fn decode_int16(bytes: &[u8], options: &CodecOptions) -> Option<Value> {
    if bytes.len() < 2 {
        return None;
    }
    let v = match options.endian {
        Endian::Big => BigEndian::read_i16(bytes),
        Endian::Little => LittleEndian::read_i16(bytes),
    };
    Some(Value::Number(v as f64))
}

fn decode_uint32(bytes: &[u8], options: &CodecOptions) -> Option<Value> {
    if bytes.len() < 4 {
        return None;
    }
    let v = match options.endian {
        Endian::Big => BigEndian::read_u32(bytes),
        Endian::Little => LittleEndian::read_u32(bytes),
    };
    Some(Value::Number(v as f64))
}

fn decode_int32(bytes: &[u8], options: &CodecOptions) -> Option<Value> {
    if bytes.len() < 4 {
        return None;
    }
    let v = match options.endian {
        Endian::Big => BigEndian::read_i32(bytes),
        Endian::Little => LittleEndian::read_i32(bytes),
    };
    Some(Value::Number(v as f64))
}

fn decode_float32(bytes: &[u8], options: &CodecOptions) -> Option<Value> {
    if bytes.len() < 4 {
        return None;
    }
    let v = match options.endian {
        Endian::Big => BigEndian::read_f32(bytes),
        Endian::Little => LittleEndian::read_f32(bytes),
    };
    Some(Value::Number(v as f64))
}

fn decode_float64(bytes: &[u8], options: &CodecOptions) -> Option<Value> {
    if bytes.len() < 8 {
        return None;
    }
    let v = match options.endian {
        Endian::Big => BigEndian::read_f64(bytes),
        Endian::Little => LittleEndian::read_f64(bytes),
    };
    Some(Value::Number(v))
}

/// Reserved: implementers may leave these as always-`undefined` stubs.
fn decode_protobuf(_bytes: &[u8], _options: &CodecOptions) -> Option<Value> {
    None
}

fn decode_msgpack(_bytes: &[u8], _options: &CodecOptions) -> Option<Value> {
    None
}

#[cfg(test)]
mod test {
    use super::*;

    fn opts(endian: Endian) -> CodecOptions {
        CodecOptions { endian }
    }

    #[test]
    fn float32_big_endian_decodes_known_value() {
        let registry = CodecRegistry::with_builtins();
        // 42 1C 00 00 big-endian f32 == 39.0
        let bytes = [0x42, 0x1C, 0x00, 0x00];
        let v = registry
            .decode("float32", &bytes, &opts(Endian::Big))
            .expect("decodes");
        assert_eq!(v.as_f64(), Some(39.0));
    }

    #[test]
    fn json_codec_handles_malformed_input() {
        let registry = CodecRegistry::with_builtins();
        assert!(registry
            .decode("json", b"{not json", &opts(Endian::Big))
            .is_none());
    }

    #[test]
    fn short_input_for_fixed_width_codec_is_none() {
        let registry = CodecRegistry::with_builtins();
        assert!(registry
            .decode("uint32", &[1, 2, 3], &opts(Endian::Big))
            .is_none());
    }

    #[test]
    fn unsigned_and_signed_variants_agree_on_shared_range() {
        // R3
        let registry = CodecRegistry::with_builtins();
        for b in [0u8, 1, 100, 127] {
            let u = registry.decode("uint8", &[b], &opts(Endian::Big)).unwrap();
            let s = registry.decode("int8", &[b], &opts(Endian::Big)).unwrap();
            assert_eq!(u.as_f64(), s.as_f64());
        }
    }

    #[test]
    fn base64_codec_decodes_to_bytes() {
        let registry = CodecRegistry::with_builtins();
        let v = registry
            .decode("base64", b"aGVsbG8=", &opts(Endian::Big))
            .expect("decodes");
        assert_eq!(v, Value::Bytes(b"hello".to_vec()));
    }

    #[test]
    fn later_registration_overwrites_earlier() {
        let mut registry = CodecRegistry::new();
        registry.register("raw", decode_raw);
        registry.register("raw", decode_utf8);
        let v = registry
            .decode("raw", b"hi", &opts(Endian::Big))
            .expect("decodes");
        assert_eq!(v, Value::String("hi".to_string()));
    }

    #[test]
    fn unknown_codec_name_is_none() {
        let registry = CodecRegistry::with_builtins();
        assert!(registry.decode("does-not-exist", b"x", &opts(Endian::Big)).is_none());
    }

    #[test]
    fn reserved_stubs_always_undefined() {
        let registry = CodecRegistry::with_builtins();
        assert!(registry.decode("protobuf", b"anything", &opts(Endian::Big)).is_none());
        assert!(registry.decode("msgpack", b"anything", &opts(Endian::Big)).is_none());
    }
}
