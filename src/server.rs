//! HTTP service — request dispatcher, per-connection workers, lifecycle.
//!
//! One detached OS thread per accepted connection.  The open store is
//! shared behind a single `Mutex`, held for the whole of any store
//! operation (including the lazy resize inside a read); socket I/O and
//! response formatting happen outside the lock, on buffers owned by the
//! worker.  Store operations are therefore totally ordered, and readers
//! always observe a consistent snapshot.
//!
//! A termination signal (SIGINT/SIGTERM) is consumed by a dedicated
//! watcher thread which logs and exits the process; workers never observe
//! it and connections are not drained.

use log::{debug, info, warn};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use std::io::{self, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use crate::error::ImgFsError;
use crate::http::{self, HttpMessage, Parse, MAX_HEADER_SIZE};
use crate::http::{STATUS_ERROR, STATUS_FOUND, STATUS_NOT_FOUND, STATUS_OK};
use crate::metadata::{Resolution, MAX_IMG_ID};
use crate::store::{ImgFs, ListMode};

pub const DEFAULT_PORT: u16 = 8000;

/// Static page served at `/` and `/index.html`, looked up in the working
/// directory.
const BASE_FILE: &str = "index.html";

// ── Server ───────────────────────────────────────────────────────────────────

pub struct Server {
    listener: TcpListener,
    store:    Arc<Mutex<ImgFs>>,
}

impl Server {
    /// Bind the listening socket.  Port 0 picks an ephemeral port.
    pub fn bind(store: ImgFs, port: u16) -> Result<Self, ImgFsError> {
        let listener = TcpListener::bind(("0.0.0.0", port))?;
        Ok(Self { listener, store: Arc::new(Mutex::new(store)) })
    }

    pub fn local_port(&self) -> Result<u16, ImgFsError> {
        Ok(self.listener.local_addr()?.port())
    }

    /// Accept loop: one detached worker per connection.  A failure to
    /// spawn a worker drops that connection and keeps serving.  Returns
    /// only if `accept` itself fails.
    pub fn run(&self) -> Result<(), ImgFsError> {
        info!("listening on http://localhost:{}/", self.local_port()?);
        loop {
            let (stream, peer) = self.listener.accept()?;
            let store = Arc::clone(&self.store);
            let spawned = thread::Builder::new()
                .name("imgfs-worker".into())
                .spawn(move || {
                    if let Err(e) = handle_connection(stream, &store) {
                        debug!("connection from {peer} closed: {e}");
                    }
                })
                .map_err(|e| ImgFsError::Threading(e.to_string()));
            if let Err(e) = spawned {
                warn!("dropping connection from {peer}: {e}");
            }
        }
    }

    /// Install SIGINT/SIGTERM handling, then run the accept loop on the
    /// calling thread.  The first signal logs and exits the process.
    pub fn run_until_shutdown(self) -> Result<(), ImgFsError> {
        let mut signals = Signals::new([SIGINT, SIGTERM])?;
        thread::Builder::new()
            .name("imgfs-signals".into())
            .spawn(move || {
                if let Some(sig) = signals.forever().next() {
                    info!("caught signal {sig}, shutting down");
                    std::process::exit(0);
                }
            })
            .map_err(|e| ImgFsError::Threading(e.to_string()))?;
        self.run()
    }
}

// ── Connection worker ────────────────────────────────────────────────────────

/// Owned outcome of one parse attempt, so the receive buffer can be
/// mutated after the borrow held by [`Parse`] ends.
enum Action {
    Wait,
    Grow(usize),
    Reply(Vec<u8>),
    Close,
}

/// Read → parse → dispatch loop for one connection.
///
/// The buffer starts at [`MAX_HEADER_SIZE`] and grows to
/// `content_len + MAX_HEADER_SIZE` once a declared `Content-Length` is
/// known.  After a successful dispatch the buffer is zeroed and the byte
/// counter reset, so the connection can serve further requests; a full
/// buffer is fatal only while a message is still incomplete.
fn handle_connection(mut stream: TcpStream, store: &Mutex<ImgFs>) -> Result<(), ImgFsError> {
    let mut buf = vec![0u8; MAX_HEADER_SIZE];
    let mut total = 0usize;

    loop {
        let n = stream.read(&mut buf[total..])?;
        if n == 0 {
            return Ok(()); // client closed
        }
        total += n;

        let action = match http::parse(&buf[..total]) {
            Parse::Malformed => Action::Close,
            Parse::NeedMore { content_len: None } => Action::Wait,
            Parse::NeedMore { content_len: Some(len) } => Action::Grow(len),
            Parse::Ready(msg) => Action::Reply(dispatch(&msg, store)),
        };

        match action {
            Action::Close => return Err(ImgFsError::InvalidArgument),
            Action::Grow(content_len) => {
                let needed = content_len
                    .checked_add(MAX_HEADER_SIZE)
                    .ok_or(ImgFsError::OutOfMemory)?;
                if needed > buf.len() {
                    buf.try_reserve_exact(needed - buf.len())
                        .map_err(|_| ImgFsError::OutOfMemory)?;
                    buf.resize(needed, 0u8);
                }
                if total == buf.len() {
                    return Err(ImgFsError::Io(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "request exceeds receive buffer",
                    )));
                }
            }
            Action::Wait => {
                if total == buf.len() {
                    return Err(ImgFsError::Io(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "headers exceed receive buffer",
                    )));
                }
            }
            Action::Reply(reply) => {
                stream.write_all(&reply)?;
                buf.fill(0);
                total = 0;
            }
        }
    }
}

// ── Dispatcher ───────────────────────────────────────────────────────────────

/// Route one parsed request onto the store and format the full reply.
fn dispatch(msg: &HttpMessage<'_>, store: &Mutex<ImgFs>) -> Vec<u8> {
    debug!("{} {}", msg.method, msg.uri);

    if msg.uri == "/" || msg.match_uri("/index.html") {
        serve_file(BASE_FILE)
    } else if msg.match_uri("/imgfs/list") {
        handle_list(store)
    } else if msg.match_uri("/imgfs/read") {
        handle_read(msg, store)
    } else if msg.match_uri("/imgfs/insert") && msg.match_verb("POST") {
        handle_insert(msg, store)
    } else if msg.match_uri("/imgfs/delete") {
        handle_delete(msg, store)
    } else {
        reply_error(&ImgFsError::InvalidCommand)
    }
}

fn handle_list(store: &Mutex<ImgFs>) -> Vec<u8> {
    match lock(store).and_then(|fs| fs.list(ListMode::Json)) {
        Ok(json) => http::build_reply(
            STATUS_OK,
            "Content-Type: application/json\r\n",
            json.as_bytes(),
        ),
        Err(e) => reply_error(&e),
    }
}

fn handle_read(msg: &HttpMessage<'_>, store: &Mutex<ImgFs>) -> Vec<u8> {
    let Some(res_name) = query_var(msg, "res") else {
        return reply_error(&ImgFsError::NotEnoughArguments);
    };
    let Some(resolution) = Resolution::from_name(res_name) else {
        return reply_error(&ImgFsError::Resolutions);
    };
    let Some(img_id) = query_var(msg, "img_id") else {
        return reply_error(&ImgFsError::NotEnoughArguments);
    };
    if img_id.len() > MAX_IMG_ID {
        return reply_error(&ImgFsError::InvalidImgId);
    }

    match lock(store).and_then(|mut fs| fs.read(img_id, resolution)) {
        Ok(image) => http::build_reply(STATUS_OK, "Content-Type: image/jpeg\r\n", &image),
        Err(e) => reply_error(&e),
    }
}

fn handle_insert(msg: &HttpMessage<'_>, store: &Mutex<ImgFs>) -> Vec<u8> {
    let Some(name) = query_var(msg, "name") else {
        return reply_error(&ImgFsError::NotEnoughArguments);
    };
    if msg.body.is_empty() {
        return reply_error(&ImgFsError::InvalidArgument);
    }

    match lock(store).and_then(|mut fs| fs.insert(msg.body, name)) {
        Ok(()) => reply_302(),
        Err(e) => reply_error(&e),
    }
}

fn handle_delete(msg: &HttpMessage<'_>, store: &Mutex<ImgFs>) -> Vec<u8> {
    let Some(img_id) = query_var(msg, "img_id") else {
        return reply_error(&ImgFsError::NotEnoughArguments);
    };

    match lock(store).and_then(|mut fs| fs.delete(img_id)) {
        Ok(()) => reply_302(),
        Err(e) => reply_error(&e),
    }
}

// ── Reply helpers ────────────────────────────────────────────────────────────

fn lock(store: &Mutex<ImgFs>) -> Result<MutexGuard<'_, ImgFs>, ImgFsError> {
    store
        .lock()
        .map_err(|_| ImgFsError::Runtime("store lock poisoned".into()))
}

/// Non-empty query variable, or None.
fn query_var<'a>(msg: &HttpMessage<'a>, name: &str) -> Option<&'a str> {
    http::get_var(msg.uri, name).filter(|v| !v.is_empty())
}

fn reply_302() -> Vec<u8> {
    http::build_reply(STATUS_FOUND, "Location: /index.html\r\n", b"")
}

/// 500 with the stable taxonomy name in the body.
fn reply_error(err: &ImgFsError) -> Vec<u8> {
    let body = format!("Error: {}\n", err.kind());
    http::build_reply(STATUS_ERROR, "", body.as_bytes())
}

fn serve_file(path: &str) -> Vec<u8> {
    match std::fs::read(path) {
        Ok(body) => http::build_reply(
            STATUS_OK,
            "Content-Type: text/html; charset=utf-8\r\n",
            &body,
        ),
        Err(e) => {
            warn!("cannot serve {path}: {e}");
            http::build_reply(STATUS_NOT_FOUND, "", b"")
        }
    }
}
