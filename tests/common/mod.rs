//! Shared fixtures: an in-memory ZIP writer and a minimal HTTP range server.

#![allow(dead_code)]

use flate2::Compression;
use flate2::Crc;
use flate2::write::DeflateEncoder;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

// 2024-05-17 12:30:00
const DOS_TIME: u16 = (12 << 11) | (30 << 5);
const DOS_DATE: u16 = ((2024 - 1980) << 9) | (5 << 5) | 17;

struct TestEntry {
    name: String,
    data: Vec<u8>,
    deflate: bool,
    local_extra: Vec<u8>,
    method: Option<u16>,
    flags: u16,
}

/// Writes ZIP archives byte by byte so tests control every field.
#[derive(Default)]
pub struct ZipBuilder {
    entries: Vec<TestEntry>,
    comment: Vec<u8>,
    zip64: bool,
}

impl ZipBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stored(mut self, name: &str, data: impl Into<Vec<u8>>) -> Self {
        self.entries.push(TestEntry {
            name: name.to_string(),
            data: data.into(),
            deflate: false,
            local_extra: Vec::new(),
            method: None,
            flags: 0,
        });
        self
    }

    pub fn deflated(mut self, name: &str, data: impl Into<Vec<u8>>) -> Self {
        self.entries.push(TestEntry {
            name: name.to_string(),
            data: data.into(),
            deflate: true,
            local_extra: Vec::new(),
            method: None,
            flags: 0,
        });
        self
    }

    pub fn dir(self, name: &str) -> Self {
        self.stored(name, Vec::new())
    }

    /// Give the last entry a local extra field of `len` padding bytes that
    /// the central directory does not repeat.
    pub fn local_extra(mut self, len: u16) -> Self {
        if let Some(entry) = self.entries.last_mut() {
            let mut extra = Vec::new();
            put_u16(&mut extra, 0xCAFE);
            put_u16(&mut extra, len);
            extra.extend(std::iter::repeat_n(0xAB, len as usize));
            entry.local_extra = extra;
        }
        self
    }

    /// Record `method` for the last entry in both headers, leaving its
    /// bytes as written.
    pub fn method(mut self, method: u16) -> Self {
        if let Some(entry) = self.entries.last_mut() {
            entry.method = Some(method);
        }
        self
    }

    /// Set the encryption bit of the last entry's general purpose flags.
    pub fn encrypted(mut self) -> Self {
        if let Some(entry) = self.entries.last_mut() {
            entry.flags |= 0x0001;
        }
        self
    }

    pub fn comment(mut self, comment: &[u8]) -> Self {
        self.comment = comment.to_vec();
        self
    }

    /// Write the ZIP64 trailer and 0xFFFFFFFF sentinels in every
    /// central directory record.
    pub fn zip64(mut self) -> Self {
        self.zip64 = true;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::new();
        let mut cd = Vec::new();

        for entry in &self.entries {
            let offset = out.len() as u64;
            let mut crc = Crc::new();
            crc.update(&entry.data);
            let crc = crc.sum();

            let (method, payload) = if entry.deflate {
                let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(&entry.data).unwrap();
                (8u16, encoder.finish().unwrap())
            } else {
                (0u16, entry.data.clone())
            };
            let method = entry.method.unwrap_or(method);
            let name = entry.name.as_bytes();

            put_u32(&mut out, 0x04034b50);
            put_u16(&mut out, 20);
            put_u16(&mut out, entry.flags);
            put_u16(&mut out, method);
            put_u16(&mut out, DOS_TIME);
            put_u16(&mut out, DOS_DATE);
            put_u32(&mut out, crc);
            put_u32(&mut out, payload.len() as u32);
            put_u32(&mut out, entry.data.len() as u32);
            put_u16(&mut out, name.len() as u16);
            put_u16(&mut out, entry.local_extra.len() as u16);
            out.extend_from_slice(name);
            out.extend_from_slice(&entry.local_extra);
            out.extend_from_slice(&payload);

            let mut extra = Vec::new();
            let (compressed, uncompressed, lfh_offset) = if self.zip64 {
                put_u16(&mut extra, 0x0001);
                put_u16(&mut extra, 24);
                put_u64(&mut extra, entry.data.len() as u64);
                put_u64(&mut extra, payload.len() as u64);
                put_u64(&mut extra, offset);
                (u32::MAX, u32::MAX, u32::MAX)
            } else {
                (payload.len() as u32, entry.data.len() as u32, offset as u32)
            };

            put_u32(&mut cd, 0x02014b50);
            put_u16(&mut cd, if self.zip64 { 45 } else { 20 });
            put_u16(&mut cd, if self.zip64 { 45 } else { 20 });
            put_u16(&mut cd, entry.flags);
            put_u16(&mut cd, method);
            put_u16(&mut cd, DOS_TIME);
            put_u16(&mut cd, DOS_DATE);
            put_u32(&mut cd, crc);
            put_u32(&mut cd, compressed);
            put_u32(&mut cd, uncompressed);
            put_u16(&mut cd, name.len() as u16);
            put_u16(&mut cd, extra.len() as u16);
            put_u16(&mut cd, 0);
            put_u16(&mut cd, 0);
            put_u16(&mut cd, 0);
            put_u32(&mut cd, if entry.name.ends_with('/') { 0x10 } else { 0 });
            put_u32(&mut cd, lfh_offset);
            cd.extend_from_slice(name);
            cd.extend_from_slice(&extra);
        }

        let cd_offset = out.len() as u64;
        let cd_size = cd.len() as u64;
        let count = self.entries.len() as u64;
        out.extend_from_slice(&cd);

        if self.zip64 {
            let eocd64_offset = out.len() as u64;
            put_u32(&mut out, 0x06064b50);
            put_u64(&mut out, 44);
            put_u16(&mut out, 45);
            put_u16(&mut out, 45);
            put_u32(&mut out, 0);
            put_u32(&mut out, 0);
            put_u64(&mut out, count);
            put_u64(&mut out, count);
            put_u64(&mut out, cd_size);
            put_u64(&mut out, cd_offset);

            put_u32(&mut out, 0x07064b50);
            put_u32(&mut out, 0);
            put_u64(&mut out, eocd64_offset);
            put_u32(&mut out, 1);
        }

        put_u32(&mut out, 0x06054b50);
        put_u16(&mut out, 0);
        put_u16(&mut out, 0);
        if self.zip64 {
            put_u16(&mut out, u16::MAX);
            put_u16(&mut out, u16::MAX);
            put_u32(&mut out, u32::MAX);
            put_u32(&mut out, u32::MAX);
        } else {
            put_u16(&mut out, count as u16);
            put_u16(&mut out, count as u16);
            put_u32(&mut out, cd_size as u32);
            put_u32(&mut out, cd_offset as u32);
        }
        put_u16(&mut out, self.comment.len() as u16);
        out.extend_from_slice(&self.comment);

        out
    }
}

fn put_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn put_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn put_u64(out: &mut Vec<u8>, v: u64) {
    out.extend_from_slice(&v.to_le_bytes());
}

/// The archive used by most scenarios: ten entries, one of them a
/// 200,000 byte stored HTML page at `a/b.html`.
/// Offset of the last occurrence of `needle` in `data`.
pub fn rfind(data: &[u8], needle: &[u8]) -> usize {
    data.windows(needle.len())
        .rposition(|w| w == needle)
        .unwrap()
}

pub fn takeout_archive() -> Vec<u8> {
    let page = format!("<html>{}</html>", "x".repeat(200_000 - 13));
    ZipBuilder::new()
        .dir("a/")
        .stored("a/b.html", page)
        .deflated("a/c.json", r#"{"posts": [{"id": 1}, {"id": 2}]}"#)
        .deflated("messages/inbox/alice/message_1.html", "<p>hello</p>".repeat(50))
        .stored("messages/inbox/alice/photo.jpg", vec![0xFF, 0xD8, 0xFF, 0xE0, 1, 2, 3])
        .deflated("your_activity/likes.json", r#"{"likes": []}"#)
        .stored("README.txt", "exported data")
        .deflated("notes/Index.HTML", "<h1>Index</h1>")
        .stored("media/video.mp4", vec![0u8; 64])
        .deflated("data.csv", "a,b\n1,2\n")
        .build()
}

/// How the test server answers range requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeMode {
    /// 206 with Content-Range, as a conforming server does
    Partial,
    /// Full body with 200 regardless of the Range header
    IgnoreRange,
    /// HEAD is refused with 403, ranged GETs work
    HeadForbidden,
    /// HEAD succeeds but is chunked, so it carries no Content-Length
    HeadWithoutLength,
}

struct ServerState {
    archive: Vec<u8>,
    mode: RangeMode,
    fail_gets: AtomicUsize,
    gets: AtomicUsize,
    heads: AtomicUsize,
}

/// HTTP/1.1 server on a random local port serving one archive at
/// `/archive.zip` and a redirect to it at `/old.zip`.
pub struct TestServer {
    addr: SocketAddr,
    state: Arc<ServerState>,
}

impl TestServer {
    pub async fn start(archive: Vec<u8>, mode: RangeMode) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(ServerState {
            archive,
            mode,
            fail_gets: AtomicUsize::new(0),
            gets: AtomicUsize::new(0),
            heads: AtomicUsize::new(0),
        });

        let shared = Arc::clone(&state);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let state = Arc::clone(&shared);
                tokio::spawn(async move {
                    let _ = serve(stream, state).await;
                });
            }
        });

        Self { addr, state }
    }

    pub fn url(&self) -> String {
        format!("http://{}/archive.zip", self.addr)
    }

    pub fn redirect_url(&self) -> String {
        format!("http://{}/old.zip", self.addr)
    }

    /// Answer the next `n` GET requests with 502.
    pub fn fail_next_gets(&self, n: usize) {
        self.state.fail_gets.store(n, Ordering::SeqCst);
    }

    pub fn get_count(&self) -> usize {
        self.state.gets.load(Ordering::SeqCst)
    }

    pub fn head_count(&self) -> usize {
        self.state.heads.load(Ordering::SeqCst)
    }
}

async fn serve(mut stream: TcpStream, state: Arc<ServerState>) -> std::io::Result<()> {
    let mut request = Vec::new();
    let mut chunk = [0u8; 1024];
    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        request.extend_from_slice(&chunk[..n]);
    }

    let head = String::from_utf8_lossy(&request).into_owned();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next().unwrap_or_default().split_whitespace();
    let method = request_line.next().unwrap_or_default().to_string();
    let path = request_line.next().unwrap_or_default().to_string();
    let range = lines.find_map(|line| {
        let (name, value) = line.split_once(':')?;
        name.trim()
            .eq_ignore_ascii_case("range")
            .then(|| value.trim().to_string())
    });

    let response = respond(&state, &method, &path, range.as_deref());
    stream.write_all(&response).await?;
    stream.shutdown().await
}

fn respond(state: &ServerState, method: &str, path: &str, range: Option<&str>) -> Vec<u8> {
    let len = state.archive.len();
    if path == "/old.zip" {
        return response("302 Found", &["Location: /archive.zip"], &[], 0);
    }
    if path != "/archive.zip" {
        return response("404 Not Found", &[], &[], 0);
    }

    if method == "HEAD" {
        state.heads.fetch_add(1, Ordering::SeqCst);
        return match state.mode {
            RangeMode::HeadForbidden => response("403 Forbidden", &[], &[], 0),
            RangeMode::IgnoreRange => response("200 OK", &[], &[], len),
            RangeMode::Partial => response("200 OK", &["Accept-Ranges: bytes"], &[], len),
            RangeMode::HeadWithoutLength => {
                b"HTTP/1.1 200 OK\r\nConnection: close\r\nTransfer-Encoding: chunked\r\n\r\n".to_vec()
            }
        };
    }

    state.gets.fetch_add(1, Ordering::SeqCst);
    let failing = state
        .fail_gets
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok();
    if failing {
        return response("502 Bad Gateway", &[], b"upstream unavailable", 20);
    }

    let bounds = range
        .and_then(|r| r.strip_prefix("bytes="))
        .and_then(|r| r.split_once('-'))
        .and_then(|(s, e)| Some((s.parse::<usize>().ok()?, e.parse::<usize>().ok()?)));
    match (state.mode, bounds) {
        (RangeMode::IgnoreRange, _) | (_, None) => {
            response("200 OK", &[], &state.archive, len)
        }
        (_, Some((start, _))) if start >= len => {
            let header = format!("Content-Range: bytes */{}", len);
            response("416 Range Not Satisfiable", &[&header], &[], 0)
        }
        (_, Some((start, end))) => {
            let end = end.min(len - 1);
            let header = format!("Content-Range: bytes {}-{}/{}", start, end, len);
            let body = &state.archive[start..=end];
            response("206 Partial Content", &[&header], body, body.len())
        }
    }
}

fn response(status: &str, headers: &[&str], body: &[u8], content_length: usize) -> Vec<u8> {
    let mut out = format!("HTTP/1.1 {}\r\nConnection: close\r\nContent-Length: {}\r\n", status, content_length);
    for header in headers {
        out.push_str(header);
        out.push_str("\r\n");
    }
    out.push_str("\r\n");
    let mut out = out.into_bytes();
    out.extend_from_slice(body);
    out
}
