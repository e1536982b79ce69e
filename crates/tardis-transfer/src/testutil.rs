//! Test doubles for code that talks to a [`TransferProvider`].

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::{BufRead, BufReader, Cursor, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use md5::{Digest, Md5};
use sha2::Sha512;
use tardis_types::{Result, TardisError};

use crate::metadata::RemoteMetadata;
use crate::{TransferProvider, normalize_base_url};

fn md5_hex(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

fn sha512_hex(data: &[u8]) -> String {
    hex::encode(Sha512::digest(data))
}

/// Provider operations, as recorded by [`MemoryProvider`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Alive,
    Length,
    Metadata,
    Get,
    Put,
    Remove,
    SendOffline,
}

/// Failure injected into one operation.
#[derive(Debug, Clone, Copy)]
pub enum Failure {
    Transfer,
    NotImplemented,
    Status(u16),
}

impl Failure {
    fn to_error(self, op: Op, url: &str) -> TardisError {
        match self {
            Failure::Transfer => TardisError::Transfer(format!("{op:?} {url}: injected failure")),
            Failure::NotImplemented => TardisError::NotImplemented(format!("{op:?} {url}")),
            Failure::Status(status) => TardisError::HttpStatus {
                context: format!("{op:?} {url}"),
                status,
            },
        }
    }
}

#[derive(Default)]
struct MemoryState {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    calls: Mutex<Vec<(Op, String)>>,
    failures: Mutex<HashMap<Op, Failure>>,
    corrupt_puts: AtomicBool,
    offline: Mutex<Vec<String>>,
}

/// In-memory provider that records every call. Clones share state, so a test
/// can hand one clone to the code under test and inspect another.
#[derive(Clone)]
pub struct MemoryProvider {
    name: String,
    base_url: String,
    metadata_supported: bool,
    offline_supported: bool,
    state: Arc<MemoryState>,
}

impl MemoryProvider {
    pub fn new(name: &str, base_url: &str) -> Self {
        Self {
            name: name.to_string(),
            base_url: normalize_base_url(base_url),
            metadata_supported: false,
            offline_supported: false,
            state: Arc::new(MemoryState::default()),
        }
    }

    pub fn with_metadata(mut self) -> Self {
        self.metadata_supported = true;
        self
    }

    pub fn with_offline(mut self) -> Self {
        self.offline_supported = true;
        self
    }

    pub fn fail(&self, op: Op, failure: Failure) {
        self.state.failures.lock().unwrap().insert(op, failure);
    }

    /// Store altered bytes on every subsequent upload.
    pub fn corrupt_puts(&self, corrupt: bool) {
        self.state.corrupt_puts.store(corrupt, Ordering::SeqCst);
    }

    pub fn insert(&self, url: &str, data: &[u8]) {
        self.state
            .objects
            .lock()
            .unwrap()
            .insert(url.to_string(), data.to_vec());
    }

    pub fn object(&self, url: &str) -> Option<Vec<u8>> {
        self.state.objects.lock().unwrap().get(url).cloned()
    }

    pub fn urls(&self) -> Vec<String> {
        self.state.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn calls(&self) -> Vec<(Op, String)> {
        self.state.calls.lock().unwrap().clone()
    }

    pub fn count(&self, op: Op) -> usize {
        self.calls().iter().filter(|(o, _)| *o == op).count()
    }

    pub fn offline(&self) -> Vec<String> {
        self.state.offline.lock().unwrap().clone()
    }

    fn begin(&self, op: Op, url: &str) -> Result<()> {
        self.state.calls.lock().unwrap().push((op, url.to_string()));
        if op != Op::Alive {
            self.check_url(url)?;
        }
        match self.state.failures.lock().unwrap().get(&op) {
            Some(failure) => Err(failure.to_error(op, url)),
            None => Ok(()),
        }
    }

    fn stored(&self, url: &str) -> Result<Vec<u8>> {
        self.object(url).ok_or_else(|| TardisError::HttpStatus {
            context: format!("GET {url}"),
            status: 404,
        })
    }
}

impl TransferProvider for MemoryProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn alive(&self) -> bool {
        self.begin(Op::Alive, "").is_ok()
    }

    fn get_length(&self, url: &str) -> Result<u64> {
        self.begin(Op::Length, url)?;
        Ok(self.stored(url)?.len() as u64)
    }

    fn get_metadata(&self, url: &str) -> Result<RemoteMetadata> {
        self.begin(Op::Metadata, url)?;
        if !self.metadata_supported {
            return Err(TardisError::NotImplemented(format!(
                "metadata queries on the {} destination",
                self.name
            )));
        }
        let data = self.stored(url)?;
        Ok(RemoteMetadata {
            md5sum: Some(md5_hex(&data)),
            sha512sum: Some(sha512_hex(&data)),
            length: Some(data.len() as u64),
        })
    }

    fn get_file(&self, url: &str) -> Result<Box<dyn Read + Send>> {
        self.begin(Op::Get, url)?;
        Ok(Box::new(Cursor::new(self.stored(url)?)))
    }

    fn put_file(&self, source: &Path, url: &str) -> Result<()> {
        self.begin(Op::Put, url)?;
        let mut data = std::fs::read(source)?;
        if self.state.corrupt_puts.load(Ordering::SeqCst) {
            data.push(b'!');
        }
        self.insert(url, &data);
        Ok(())
    }

    fn remove_file(&self, url: &str) -> Result<()> {
        self.begin(Op::Remove, url)?;
        self.state.objects.lock().unwrap().remove(url);
        Ok(())
    }

    fn send_offline(&self, url: &str) -> Result<()> {
        self.begin(Op::SendOffline, url)?;
        if !self.offline_supported {
            return Err(TardisError::NotImplemented(format!(
                "send offline on the {} destination",
                self.name
            )));
        }
        self.state.offline.lock().unwrap().push(url.to_string());
        Ok(())
    }
}

/// Behaviour switches for [`TestServer`].
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Answer `GET <path>?metadata`; otherwise respond 400.
    pub metadata: bool,
    /// Require parent collections to exist before PUT/MKCOL (409 otherwise),
    /// seeded with these collection paths.
    pub collections: Option<Vec<String>>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            metadata: true,
            collections: None,
        }
    }
}

#[derive(Default)]
struct ServerState {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    collections: Mutex<BTreeSet<String>>,
    requests: Mutex<Vec<String>>,
}

/// Threaded HTTP/WebDAV server on `127.0.0.1:0` serving HEAD, GET, PUT,
/// DELETE, `?metadata` and MKCOL from memory. Runs until the process exits.
pub struct TestServer {
    origin: String,
    options: Arc<ServerOptions>,
    state: Arc<ServerState>,
}

impl TestServer {
    pub fn start(options: ServerOptions) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let state = Arc::new(ServerState::default());
        if let Some(ref seeded) = options.collections {
            let mut collections = state.collections.lock().unwrap();
            collections.insert("/".to_string());
            collections.extend(seeded.iter().cloned());
        }
        let options = Arc::new(options);

        let (thread_state, thread_options) = (Arc::clone(&state), Arc::clone(&options));
        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { continue };
                let state = Arc::clone(&thread_state);
                let options = Arc::clone(&thread_options);
                std::thread::spawn(move || {
                    let _ = serve_connection(stream, &state, &options);
                });
            }
        });

        Self {
            origin: format!("http://127.0.0.1:{port}"),
            options,
            state,
        }
    }

    pub fn http() -> Self {
        Self::start(ServerOptions::default())
    }

    /// A WebDAV server whose only pre-existing collection is `root`.
    pub fn webdav(root: &str) -> Self {
        Self::start(ServerOptions {
            metadata: false,
            collections: Some(vec![root.to_string()]),
        })
    }

    /// Absolute URL for a server path such as `/data/`.
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.origin)
    }

    pub fn object(&self, path: &str) -> Option<Vec<u8>> {
        self.state.objects.lock().unwrap().get(path).cloned()
    }

    pub fn insert(&self, path: &str, data: &[u8]) {
        self.state
            .objects
            .lock()
            .unwrap()
            .insert(path.to_string(), data.to_vec());
    }

    pub fn has_collection(&self, path: &str) -> bool {
        self.state.collections.lock().unwrap().contains(path)
    }

    /// `"METHOD /path?query"` for every request served so far.
    pub fn requests(&self) -> Vec<String> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn metadata_enabled(&self) -> bool {
        self.options.metadata
    }
}

fn parent_collection(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(idx) => &trimmed[..=idx],
        None => "/",
    }
}

fn serve_connection(
    stream: TcpStream,
    state: &ServerState,
    options: &ServerOptions,
) -> std::io::Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut writer = stream;
    loop {
        let mut request_line = String::new();
        if reader.read_line(&mut request_line)? == 0 {
            return Ok(());
        }
        let mut parts = request_line.split_whitespace();
        let method = parts.next().unwrap_or("").to_string();
        let target = parts.next().unwrap_or("/").to_string();

        let mut content_length = 0usize;
        let mut chunked = false;
        loop {
            let mut line = String::new();
            reader.read_line(&mut line)?;
            let line = line.trim();
            if line.is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                let value = value.trim();
                if name.eq_ignore_ascii_case("content-length") {
                    content_length = value.parse().unwrap_or(0);
                } else if name.eq_ignore_ascii_case("transfer-encoding")
                    && value.eq_ignore_ascii_case("chunked")
                {
                    chunked = true;
                }
            }
        }

        let body = if chunked {
            read_chunked(&mut reader)?
        } else {
            let mut body = vec![0u8; content_length];
            reader.read_exact(&mut body)?;
            body
        };

        state
            .requests
            .lock()
            .unwrap()
            .push(format!("{method} {target}"));
        let (path, query) = match target.split_once('?') {
            Some((p, q)) => (p.to_string(), Some(q.to_string())),
            None => (target.clone(), None),
        };
        let response = handle(&method, &path, query.as_deref(), body, state, options);
        write_response(&mut writer, &method, response)?;
    }
}

fn read_chunked(reader: &mut impl BufRead) -> std::io::Result<Vec<u8>> {
    let mut body = Vec::new();
    loop {
        let mut size_line = String::new();
        reader.read_line(&mut size_line)?;
        let size = usize::from_str_radix(size_line.trim(), 16).unwrap_or(0);
        let mut chunk = vec![0u8; size + 2];
        reader.read_exact(&mut chunk)?;
        if size == 0 {
            return Ok(body);
        }
        body.extend_from_slice(&chunk[..size]);
    }
}

struct Response {
    status: u16,
    body: Vec<u8>,
    content_type: Option<&'static str>,
}

impl Response {
    fn empty(status: u16) -> Self {
        Self {
            status,
            body: Vec::new(),
            content_type: None,
        }
    }
}

fn handle(
    method: &str,
    path: &str,
    query: Option<&str>,
    body: Vec<u8>,
    state: &ServerState,
    options: &ServerOptions,
) -> Response {
    let strict = options.collections.is_some();
    let parent_missing =
        || strict && !state.collections.lock().unwrap().contains(parent_collection(path));

    match method {
        "HEAD" | "GET" if path.ends_with('/') && query.is_none() => Response::empty(200),
        "HEAD" | "GET" => {
            let objects = state.objects.lock().unwrap();
            let Some(data) = objects.get(path) else {
                return Response::empty(404);
            };
            if query.is_some_and(|q| q.split('&').any(|p| p == "metadata")) {
                if !options.metadata {
                    return Response::empty(400);
                }
                let json = serde_json::json!({
                    "md5sum": md5_hex(data),
                    "sha512sum": sha512_hex(data),
                    "length": data.len(),
                });
                return Response {
                    status: 200,
                    body: json.to_string().into_bytes(),
                    content_type: Some("application/json"),
                };
            }
            Response {
                status: 200,
                body: data.clone(),
                content_type: Some("application/octet-stream"),
            }
        }
        "PUT" => {
            if parent_missing() {
                return Response::empty(409);
            }
            state
                .objects
                .lock()
                .unwrap()
                .insert(path.to_string(), body);
            Response::empty(201)
        }
        "DELETE" => match state.objects.lock().unwrap().remove(path) {
            Some(_) => Response::empty(204),
            None => Response::empty(404),
        },
        "MKCOL" => {
            let collection = format!("{}/", path.trim_end_matches('/'));
            if state.collections.lock().unwrap().contains(&collection) {
                return Response::empty(405);
            }
            if parent_missing() {
                return Response::empty(409);
            }
            state.collections.lock().unwrap().insert(collection);
            Response::empty(201)
        }
        _ => Response::empty(405),
    }
}

fn write_response(writer: &mut TcpStream, method: &str, response: Response) -> std::io::Result<()> {
    let reason = match response.status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        409 => "Conflict",
        _ => "Unknown",
    };
    let mut head = format!(
        "HTTP/1.1 {} {reason}\r\nContent-Length: {}\r\n",
        response.status,
        response.body.len()
    );
    if let Some(content_type) = response.content_type {
        head.push_str(&format!("Content-Type: {content_type}\r\n"));
    }
    head.push_str("\r\n");
    writer.write_all(head.as_bytes())?;
    if method != "HEAD" {
        writer.write_all(&response.body)?;
    }
    writer.flush()
}
