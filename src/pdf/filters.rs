//! Stream filters.
//!
//! Only `FlateDecode` (and unfiltered streams) are understood. Anything else
//! is reported as a [`RedactorError::Stream`] and the caller skips that
//! stream with a warning.

use std::io::{Read, Write};

use flate2::read::{DeflateDecoder, ZlibDecoder};
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::error::{RedactorError, RedactorResult};
use crate::pdf::object::{Dictionary, Object, ObjectId};

const MAX_DECODE_PARMS: i64 = 100_000;

/// How a stream's data is stored on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEncoding {
    Raw,
    Flate,
}

/// Determines the encoding declared by a stream dictionary.
pub fn stream_encoding(id: ObjectId, dict: &Dictionary) -> RedactorResult<StreamEncoding> {
    let filters: Vec<&[u8]> = match dict.get(b"Filter") {
        None | Some(Object::Null) => Vec::new(),
        Some(Object::Name(n)) => vec![n.as_slice()],
        Some(Object::Array(items)) => items.iter().filter_map(Object::as_name).collect(),
        Some(_) => return Err(stream_error(id, "malformed /Filter")),
    };
    match filters.as_slice() {
        [] => Ok(StreamEncoding::Raw),
        [b"FlateDecode"] | [b"Fl"] => Ok(StreamEncoding::Flate),
        [single] => Err(stream_error(
            id,
            format!("unsupported filter {}", String::from_utf8_lossy(single)),
        )),
        _ => Err(stream_error(id, "filter chains are not supported")),
    }
}

/// Decodes raw stream data, applying a PNG or TIFF predictor when the
/// dictionary declares one.
pub fn decode_stream(id: ObjectId, dict: &Dictionary, raw: &[u8]) -> RedactorResult<Vec<u8>> {
    match stream_encoding(id, dict)? {
        StreamEncoding::Raw => Ok(raw.to_vec()),
        StreamEncoding::Flate => {
            let data = inflate(raw).map_err(|e| stream_error(id, format!("inflate: {e}")))?;
            match predictor_parms(dict) {
                Some(parms) => apply_predictor(&data, parms).map_err(|r| stream_error(id, r)),
                None => Ok(data),
            }
        }
    }
}

/// Inflates zlib data, falling back to a raw deflate stream.
pub fn inflate(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::new();
    match ZlibDecoder::new(data).read_to_end(&mut out) {
        Ok(_) => Ok(out),
        Err(zlib_err) => {
            let mut raw = Vec::new();
            match DeflateDecoder::new(data).read_to_end(&mut raw) {
                Ok(_) => Ok(raw),
                // A truncated zlib stream still yields its decoded prefix.
                Err(_) if !out.is_empty() => Ok(out),
                Err(_) => Err(zlib_err),
            }
        }
    }
}

pub fn deflate(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(data.len() / 2), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

/// Builds an object body (`\n<<dict>>\nstream\n...\nendstream\n`) for
/// `decoded` data, compressing it when `encoding` is [`StreamEncoding::Flate`]
/// and updating `/Length`.
pub fn stream_body(
    id: ObjectId,
    dict: &Dictionary,
    decoded: &[u8],
    encoding: StreamEncoding,
) -> RedactorResult<Vec<u8>> {
    let mut dict = dict.clone();
    let data = match encoding {
        StreamEncoding::Raw => decoded.to_vec(),
        StreamEncoding::Flate => {
            // Re-encoded data never carries a predictor.
            dict.remove(b"DecodeParms");
            deflate(decoded).map_err(|e| stream_error(id, format!("deflate: {e}")))?
        }
    };
    dict.set(b"Length", Object::Integer(data.len() as i64));
    let mut body = Vec::with_capacity(data.len() + 64);
    body.push(b'\n');
    dict.write_to(&mut body);
    body.extend_from_slice(b"\nstream\n");
    body.extend_from_slice(&data);
    body.extend_from_slice(b"\nendstream\n");
    Ok(body)
}

/// Body for a non-stream object.
pub fn plain_body(object: &Object) -> Vec<u8> {
    let mut body = vec![b'\n'];
    object.write_to(&mut body);
    body.push(b'\n');
    body
}

fn stream_error(id: ObjectId, reason: impl Into<String>) -> RedactorError {
    RedactorError::Stream {
        object: id,
        reason: reason.into(),
    }
}

#[derive(Debug, Clone, Copy)]
struct PredictorParms {
    predictor: i64,
    colors: i64,
    bits_per_component: i64,
    columns: i64,
}

fn predictor_parms(dict: &Dictionary) -> Option<PredictorParms> {
    let parms = match dict.get(b"DecodeParms")? {
        Object::Dictionary(d) => d,
        Object::Array(items) => items.first()?.as_dict()?,
        _ => return None,
    };
    let int = |key: &[u8], default: i64| parms.get(key).and_then(Object::as_i64).unwrap_or(default);
    let p = PredictorParms {
        predictor: int(b"Predictor", 1),
        colors: int(b"Colors", 1),
        bits_per_component: int(b"BitsPerComponent", 8),
        columns: int(b"Columns", 1),
    };
    (p.predictor > 1).then_some(p)
}

fn apply_predictor(data: &[u8], parms: PredictorParms) -> Result<Vec<u8>, String> {
    if [parms.colors, parms.bits_per_component, parms.columns]
        .iter()
        .any(|v| !(1..=MAX_DECODE_PARMS).contains(v))
    {
        return Err("decode parms out of range".to_string());
    }
    if parms.bits_per_component != 8 {
        return Ok(data.to_vec());
    }
    let bpp = parms.colors as usize;
    let row_len = parms.columns as usize * bpp;
    match parms.predictor {
        2 => Ok(tiff_predictor(data, bpp, row_len)),
        10..=15 => Ok(png_predictor(data, bpp, row_len)),
        _ => Ok(data.to_vec()),
    }
}

fn tiff_predictor(data: &[u8], bpp: usize, row_len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    for chunk in data.chunks(row_len) {
        let mut row = chunk.to_vec();
        for i in bpp..row.len() {
            row[i] = row[i].wrapping_add(row[i - bpp]);
        }
        out.extend_from_slice(&row);
    }
    out
}

fn png_predictor(data: &[u8], bpp: usize, row_len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut prev = vec![0u8; row_len];
    for chunk in data.chunks(row_len + 1) {
        if chunk.len() < row_len + 1 {
            break;
        }
        let filter = chunk[0];
        let mut row = chunk[1..].to_vec();
        for j in 0..row_len {
            let left = if j >= bpp { row[j - bpp] } else { 0 };
            let up = prev[j];
            let up_left = if j >= bpp { prev[j - bpp] } else { 0 };
            let add = match filter {
                1 => left,
                2 => up,
                3 => ((u16::from(left) + u16::from(up)) / 2) as u8,
                4 => paeth(left, up, up_left),
                _ => 0,
            };
            row[j] = row[j].wrapping_add(add);
        }
        out.extend_from_slice(&row);
        prev = row;
    }
    out
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let (a, b, c) = (i16::from(a), i16::from(b), i16::from(c));
    let p = a + b - c;
    let (pa, pb, pc) = ((p - a).abs(), (p - b).abs(), (p - c).abs());
    if pa <= pb && pa <= pc {
        a as u8
    } else if pb <= pc {
        b as u8
    } else {
        c as u8
    }
}
