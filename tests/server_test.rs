use imgfs::store::{CreateOptions, ImgFs};
use imgfs::Server;
use std::io::{Cursor, Read, Write};
use std::net::TcpStream;
use std::sync::{Barrier, OnceLock};
use std::thread;
use tempfile::TempDir;

// ── fixtures ─────────────────────────────────────────────────────────────────

fn sample_jpeg() -> &'static [u8] {
    static JPEG: OnceLock<Vec<u8>> = OnceLock::new();
    JPEG.get_or_init(|| {
        let img = image::RgbImage::from_fn(320, 240, |x, y| image::Rgb([x as u8, y as u8, 9]));
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageOutputFormat::Jpeg(90))
            .unwrap();
        buf
    })
}

/// Create a store, preload it, and serve it on an ephemeral port.
fn start_server(preload: &[&str]) -> (TempDir, u16) {
    let dir = TempDir::new().unwrap();
    let opts = CreateOptions { max_files: 8, thumb_res: (64, 64), small_res: (256, 256) };
    let mut fs = ImgFs::create(dir.path().join("t.imgfs"), opts).unwrap();
    for id in preload {
        fs.insert(sample_jpeg(), id).unwrap();
    }

    let server = Server::bind(fs, 0).unwrap();
    let port = server.local_port().unwrap();
    thread::spawn(move || {
        let _ = server.run();
    });
    (dir, port)
}

// ── bare-bones HTTP client ───────────────────────────────────────────────────

struct Response {
    status:  String,
    headers: String,
    body:    Vec<u8>,
}

fn send_on(stream: &mut TcpStream, method: &str, uri: &str, body: &[u8]) -> Response {
    let head = format!(
        "{method} {uri} HTTP/1.1\r\nHost: localhost\r\nContent-Length: {}\r\n\r\n",
        body.len()
    );
    stream.write_all(head.as_bytes()).unwrap();
    stream.write_all(body).unwrap();
    read_response(stream)
}

fn send(port: u16, method: &str, uri: &str, body: &[u8]) -> Response {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
    send_on(&mut stream, method, uri, body)
}

fn read_response(stream: &mut TcpStream) -> Response {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];

    let head_len = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        let n = stream.read(&mut chunk).unwrap();
        assert!(n > 0, "connection closed before response headers");
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8(buf[..head_len].to_vec()).unwrap();
    let (status, headers) = head.split_once("\r\n").unwrap_or((head.as_str(), ""));
    let (status, headers) = (status.to_owned(), headers.to_owned());

    let content_len: usize = headers
        .lines()
        .find_map(|l| l.strip_prefix("Content-Length: "))
        .expect("response without Content-Length")
        .parse()
        .unwrap();

    let body_start = head_len + 4;
    while buf.len() < body_start + content_len {
        let n = stream.read(&mut chunk).unwrap();
        assert!(n > 0, "connection closed mid-body");
        buf.extend_from_slice(&chunk[..n]);
    }

    Response { status, headers, body: buf[body_start..body_start + content_len].to_vec() }
}

// ── routes ───────────────────────────────────────────────────────────────────

#[test]
fn list_returns_json() {
    let (_dir, port) = start_server(&["pic1", "pic2"]);
    let r = send(port, "GET", "/imgfs/list", b"");
    assert_eq!(r.status, "HTTP/1.1 200 OK");
    assert!(r.headers.contains("Content-Type: application/json"));
    assert_eq!(r.body, br#"{"Images":["pic1","pic2"]}"#);
}

#[test]
fn read_orig_returns_stored_bytes() {
    let (_dir, port) = start_server(&["pic1"]);
    let r = send(port, "GET", "/imgfs/read?res=orig&img_id=pic1", b"");
    assert_eq!(r.status, "HTTP/1.1 200 OK");
    assert!(r.headers.contains("Content-Type: image/jpeg"));
    assert_eq!(r.body, sample_jpeg());
}

#[test]
fn read_thumb_is_stable_across_requests() {
    let (_dir, port) = start_server(&["pic1"]);
    let first = send(port, "GET", "/imgfs/read?res=thumb&img_id=pic1", b"");
    let second = send(port, "GET", "/imgfs/read?res=thumbnail&img_id=pic1", b"");
    assert_eq!(first.status, "HTTP/1.1 200 OK");
    assert!(!first.body.is_empty());
    assert_eq!(first.body, second.body);
}

#[test]
fn insert_redirects_and_persists() {
    let (_dir, port) = start_server(&[]);
    let r = send(port, "POST", "/imgfs/insert?name=fresh", sample_jpeg());
    assert_eq!(r.status, "HTTP/1.1 302 Found");
    assert!(r.headers.contains("Location: /index.html"));

    let list = send(port, "GET", "/imgfs/list", b"");
    assert_eq!(list.body, br#"{"Images":["fresh"]}"#);

    let back = send(port, "GET", "/imgfs/read?res=orig&img_id=fresh", b"");
    assert_eq!(back.body, sample_jpeg());
}

#[test]
fn delete_then_read_is_not_found() {
    let (_dir, port) = start_server(&["pic1", "pic2"]);

    let r = send(port, "GET", "/imgfs/delete?img_id=pic1", b"");
    assert_eq!(r.status, "HTTP/1.1 302 Found");
    assert!(r.headers.contains("Location: /index.html"));

    let r = send(port, "GET", "/imgfs/read?res=orig&img_id=pic1", b"");
    assert_eq!(r.status, "HTTP/1.1 500 Internal Server Error");
    assert!(String::from_utf8(r.body).unwrap().contains("ImageNotFound"));

    let list = send(port, "GET", "/imgfs/list", b"");
    assert_eq!(list.body, br#"{"Images":["pic2"]}"#);
}

#[test]
fn error_bodies_name_the_failure() {
    let (_dir, port) = start_server(&["pic1"]);

    let r = send(port, "GET", "/imgfs/read?res=huge&img_id=pic1", b"");
    assert_eq!(r.status, "HTTP/1.1 500 Internal Server Error");
    assert!(String::from_utf8(r.body).unwrap().contains("Resolutions"));

    let r = send(port, "GET", "/imgfs/read?img_id=pic1", b"");
    assert!(String::from_utf8(r.body).unwrap().contains("NotEnoughArguments"));

    let r = send(port, "GET", "/imgfs/rename?img_id=pic1", b"");
    assert!(String::from_utf8(r.body).unwrap().contains("InvalidCommand"));

    let r = send(port, "POST", "/imgfs/insert?name=pic1", sample_jpeg());
    assert!(String::from_utf8(r.body).unwrap().contains("DuplicateId"));

    // insert is POST-only; anything else falls through to the route error.
    let r = send(port, "GET", "/imgfs/insert?name=other", b"");
    assert!(String::from_utf8(r.body).unwrap().contains("InvalidCommand"));
}

#[test]
fn index_page_is_served_at_root() {
    let (_dir, port) = start_server(&[]);
    // cargo runs tests from the crate root, where index.html lives.
    let r = send(port, "GET", "/", b"");
    assert_eq!(r.status, "HTTP/1.1 200 OK");
    assert!(r.headers.contains("Content-Type: text/html"));
    assert!(!r.body.is_empty());
}

#[test]
fn connection_serves_multiple_requests() {
    let (_dir, port) = start_server(&["pic1"]);
    let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();

    let first = send_on(&mut stream, "GET", "/imgfs/list", b"");
    assert_eq!(first.status, "HTTP/1.1 200 OK");

    let second = send_on(&mut stream, "GET", "/imgfs/read?res=orig&img_id=pic1", b"");
    assert_eq!(second.status, "HTTP/1.1 200 OK");
    assert_eq!(second.body, sample_jpeg());
}

// ── concurrency ──────────────────────────────────────────────────────────────

#[test]
fn concurrent_duplicate_inserts_admit_exactly_one() {
    let (_dir, port) = start_server(&[]);
    let barrier = Barrier::new(2);

    let statuses: Vec<String> = thread::scope(|s| {
        let handles: Vec<_> = (0..2)
            .map(|_| {
                s.spawn(|| {
                    barrier.wait();
                    send(port, "POST", "/imgfs/insert?name=contested", sample_jpeg()).status
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let winners = statuses.iter().filter(|s| s.as_str() == "HTTP/1.1 302 Found").count();
    let losers = statuses
        .iter()
        .filter(|s| s.as_str() == "HTTP/1.1 500 Internal Server Error")
        .count();
    assert_eq!((winners, losers), (1, 1), "exactly one insert must win: {statuses:?}");

    let list = send(port, "GET", "/imgfs/list", b"");
    assert_eq!(list.body, br#"{"Images":["contested"]}"#);
}
