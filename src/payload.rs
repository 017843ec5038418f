//! Output shapes for extracted entries.
//!
//! Every endpoint decodes through [`decode_payload`], so text, JSON and
//! binary handling lives in one place.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::{RemoteZipError, Result};

/// Shape a caller wants an entry decoded into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    Text,
    Json,
    Binary,
}

/// A decoded entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Payload {
    Text {
        text: String,
    },
    Json {
        value: serde_json::Value,
    },
    Binary {
        #[serde(rename = "mimeType")]
        mime_type: &'static str,
        #[serde(skip)]
        bytes: Vec<u8>,
        size: usize,
    },
}

impl Payload {
    /// Size of the decoded payload in bytes. JSON counts its compact
    /// serialization.
    pub fn len(&self) -> usize {
        match self {
            Payload::Text { text } => text.len(),
            Payload::Json { value } => value.to_string().len(),
            Payload::Binary { bytes, .. } => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text { text } => Some(text),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Payload::Json { value } => Some(value),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Payload::Binary { bytes, .. } => Some(bytes),
            _ => None,
        }
    }
}

/// Decode extracted bytes of the entry at `path` into `shape`.
///
/// Text decoding is permissive: invalid UTF-8 sequences become U+FFFD.
/// JSON parse failures are reported as [`RemoteZipError::Decode`].
pub fn decode_payload(path: &str, data: Vec<u8>, shape: ResponseType) -> Result<Payload> {
    match shape {
        ResponseType::Text => Ok(Payload::Text {
            text: decode_text(data),
        }),
        ResponseType::Json => {
            let text = decode_text(data);
            // Some exporters prepend a byte order mark
            let body = text.strip_prefix('\u{FEFF}').unwrap_or(&text);
            serde_json::from_str(body)
                .map(|value| Payload::Json { value })
                .map_err(|e| RemoteZipError::Decode {
                    path: path.to_string(),
                    message: e.to_string(),
                })
        }
        ResponseType::Binary => Ok(Payload::Binary {
            mime_type: mime_type_for(path),
            size: data.len(),
            bytes: data,
        }),
    }
}

fn decode_text(data: Vec<u8>) -> String {
    match String::from_utf8(data) {
        Ok(text) => text,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }
}

pub const OCTET_STREAM: &str = "application/octet-stream";

const MIME_TYPES: &[(&str, &str)] = &[
    ("html", "text/html"),
    ("htm", "text/html"),
    ("json", "application/json"),
    ("txt", "text/plain"),
    ("csv", "text/csv"),
    ("xml", "application/xml"),
    ("js", "text/javascript"),
    ("css", "text/css"),
    ("md", "text/markdown"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("heic", "image/heic"),
    ("svg", "image/svg+xml"),
    ("mp4", "video/mp4"),
    ("mov", "video/quicktime"),
    ("webm", "video/webm"),
    ("mp3", "audio/mpeg"),
    ("m4a", "audio/mp4"),
    ("wav", "audio/wav"),
    ("ogg", "audio/ogg"),
    ("pdf", "application/pdf"),
    ("zip", "application/zip"),
];

/// MIME type from the extension of `path`, octet-stream when unknown.
pub fn mime_type_for(path: &str) -> &'static str {
    let name = path.rsplit('/').next().unwrap_or(path);
    let Some((stem, ext)) = name.rsplit_once('.') else {
        return OCTET_STREAM;
    };
    if stem.is_empty() {
        return OCTET_STREAM;
    }
    MIME_TYPES
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(ext))
        .map(|(_, mime)| *mime)
        .unwrap_or(OCTET_STREAM)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_lookup() {
        assert_eq!(mime_type_for("a/b/photo.JPG"), "image/jpeg");
        assert_eq!(mime_type_for("index.html"), "text/html");
        assert_eq!(mime_type_for("data.bin"), OCTET_STREAM);
        assert_eq!(mime_type_for("Makefile"), OCTET_STREAM);
        assert_eq!(mime_type_for("dir.d/.json"), OCTET_STREAM);
    }

    #[test]
    fn text_is_permissive() {
        let payload = decode_payload("a.txt", vec![b'o', b'k', 0xFF], ResponseType::Text).unwrap();
        assert_eq!(payload.as_text(), Some("ok\u{FFFD}"));
    }

    #[test]
    fn json_parses_with_bom() {
        let mut data = "\u{FEFF}".as_bytes().to_vec();
        data.extend_from_slice(br#"{"posts": [1, 2]}"#);
        let payload = decode_payload("p.json", data, ResponseType::Json).unwrap();
        assert_eq!(payload.as_json().unwrap()["posts"][1], 2);
    }

    #[test]
    fn bad_json_is_a_decode_error() {
        let err = decode_payload("p.json", b"{not json".to_vec(), ResponseType::Json).unwrap_err();
        assert!(matches!(err, RemoteZipError::Decode { ref path, .. } if path == "p.json"));
        assert_eq!(err.reason_code(), "decode_failed");
    }

    #[test]
    fn binary_keeps_bytes_and_type() {
        let payload = decode_payload("x/y.png", vec![1, 2, 3], ResponseType::Binary).unwrap();
        assert_eq!(payload.as_bytes(), Some(&[1u8, 2, 3][..]));
        assert_eq!(payload.len(), 3);
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "binary");
        assert_eq!(json["mimeType"], "image/png");
    }
}
