//! Integration tests for formpost against a loopback HTTP server

use formpost::{CancelHandle, Config, Error, LineBreaks, MultipartRequest, Result, SendPolicy};
use std::io::{self, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::Duration;

struct Captured {
    head: String,
    body: Vec<u8>,
}

impl Captured {
    fn header(&self, name: &str) -> Option<String> {
        self.head.lines().skip(1).find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.eq_ignore_ascii_case(name)
                .then(|| value.trim().to_string())
        })
    }
}

/// Accept one request, answer with `status` and `body`, hand back what was received
fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<Captured>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(10)))
            .unwrap();
        let captured = read_request(&mut stream);

        let response = format!(
            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        stream.write_all(response.as_bytes()).unwrap();
        stream.flush().unwrap();
        captured
    });

    (format!("http://{}/upload", addr), handle)
}

/// Accept one request and record every byte until the client goes away
fn capture_until_close() -> (String, JoinHandle<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(10)))
            .unwrap();

        let mut raw = Vec::new();
        let mut chunk = [0u8; 16 * 1024];
        loop {
            match stream.read(&mut chunk) {
                Ok(0) | Err(_) => return raw,
                Ok(n) => raw.extend_from_slice(&chunk[..n]),
            }
        }
    });

    (format!("http://{}/upload", addr), handle)
}

/// Yields `good` bytes of `a`, then fails
struct FailingReader {
    good: usize,
}

impl Read for FailingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.good == 0 {
            return Err(io::Error::other("disk gone"));
        }
        let n = buf.len().min(self.good);
        buf[..n].fill(b'a');
        self.good -= n;
        Ok(n)
    }
}

/// Yields `a` bytes forever, firing `cancel` after the first read
struct CancellingReader {
    cancel: CancelHandle,
    reads: usize,
}

impl Read for CancellingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reads += 1;
        if self.reads > 1 {
            self.cancel.cancel();
        }
        let n = buf.len().min(4096);
        buf[..n].fill(b'a');
        Ok(n)
    }
}

fn read_request(stream: &mut TcpStream) -> Captured {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 16 * 1024];

    let head_end = loop {
        if let Some(pos) = find(&buf, b"\r\n\r\n") {
            break pos + 4;
        }
        let n = stream.read(&mut chunk).unwrap();
        assert!(n > 0, "connection closed inside request head");
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8(buf[..head_end].to_vec()).unwrap();
    let mut raw = buf[head_end..].to_vec();

    let content_length = head.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        if key.eq_ignore_ascii_case("content-length") {
            value.trim().parse::<usize>().ok()
        } else {
            None
        }
    });

    let body = match content_length {
        Some(len) => {
            while raw.len() < len {
                let n = stream.read(&mut chunk).unwrap();
                assert!(n > 0, "connection closed inside request body");
                raw.extend_from_slice(&chunk[..n]);
            }
            raw
        }
        None => {
            while !raw.ends_with(b"0\r\n\r\n") {
                let n = stream.read(&mut chunk).unwrap();
                assert!(n > 0, "connection closed inside chunked body");
                raw.extend_from_slice(&chunk[..n]);
            }
            dechunk(&raw)
        }
    };

    Captured { head, body }
}

fn dechunk(mut data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    loop {
        let line_end = find(data, b"\r\n").unwrap();
        let size_field = std::str::from_utf8(&data[..line_end]).unwrap();
        let size = usize::from_str_radix(size_field.split(';').next().unwrap().trim(), 16).unwrap();
        data = &data[line_end + 2..];
        if size == 0 {
            return out;
        }
        out.extend_from_slice(&data[..size]);
        data = &data[size + 2..];
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[test]
fn test_post_fields_and_headers() -> Result<()> {
    let (url, server) = serve_once("200 OK", "{\"status\":\n\"stored\"}\n");

    let mut request = MultipartRequest::new();
    request
        .add_text("title", "text/plain", "quarterly report")?
        .add_bytes("flags", "application/octet-stream", vec![1u8, 2, 3])?
        .add_file_bytes("doc", "text/csv", "q3.csv", "a,b\n1,2\n")?;
    request.set_header("X-Request-Header", "request-value")?;
    request.set_header("Host", "evil.example.com")?;
    let boundary = request.boundary().clone();

    let text = request.execute(&url)?;
    assert_eq!(text, "{\"status\":\"stored\"}");

    let captured = server.join().unwrap();
    assert!(captured.head.starts_with("POST /upload HTTP/1.1\r\n"));
    assert_eq!(
        captured.header("content-type"),
        Some(format!("multipart/form-data; boundary={}", boundary))
    );
    assert_eq!(
        captured.header("x-request-header").as_deref(),
        Some("request-value")
    );
    assert_eq!(
        captured.header("host"),
        Some(url.trim_start_matches("http://").trim_end_matches("/upload").to_string())
    );

    let expected = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"title\"\r\nContent-Type: text/plain\r\n\r\nquarterly report\r\n\
         --{b}\r\nContent-Disposition: form-data; name=\"flags\"\r\nContent-Type: application/octet-stream\r\n\r\n\x01\x02\x03\r\n\
         --{b}\r\nContent-Disposition: form-data; name=\"doc\"; filename=\"q3.csv\"\r\nContent-Type: text/csv\r\n\r\na,b\n1,2\n\r\n\
         --{b}--\r\n",
        b = boundary
    );
    assert_eq!(String::from_utf8(captured.body).unwrap(), expected);

    Ok(())
}

#[test]
fn test_streams_large_file() -> Result<()> {
    let (url, server) = serve_once("200 OK", "received");

    let content: Vec<u8> = (0..2_500_000u32).map(|i| (i % 251) as u8).collect();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&content).unwrap();
    file.flush().unwrap();

    let mut request = MultipartRequest::new();
    request.add_file("blob", "application/octet-stream", "blob.bin", file.path())?;

    assert_eq!(request.execute(&url)?, "received");

    let captured = server.join().unwrap();
    let start = find(&captured.body, b"\r\n\r\n").unwrap() + 4;
    assert_eq!(&captured.body[start..start + content.len()], &content[..]);

    Ok(())
}

#[test]
fn test_preserve_line_breaks() -> Result<()> {
    let (url, server) = serve_once("200 OK", "one\ntwo\n");

    let config = Config::builder().line_breaks(LineBreaks::Preserve).build();
    let text = MultipartRequest::with_config(config).execute(&url)?;
    assert_eq!(text, "one\ntwo\n");

    server.join().unwrap();
    Ok(())
}

#[test]
fn test_error_status_codes() {
    let (url, server) = serve_once("500 Internal Server Error", "boom");

    let mut request = MultipartRequest::new();
    request.add_text("f", "text/plain", "x").unwrap();

    match request.execute(&url) {
        Err(Error::Status(status)) => assert_eq!(status.as_u16(), 500),
        other => panic!("Expected status error, got {:?}", other),
    }

    server.join().unwrap();
}

#[test]
fn test_unreachable_target() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let mut request = MultipartRequest::new();
    request.add_text("f", "text/plain", "x").unwrap();

    let result = request.execute(&format!("http://127.0.0.1:{}/upload", port));
    assert!(
        matches!(result, Err(Error::Connection { .. })),
        "Expected connection error, got {:?}",
        result
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_send_async() -> Result<()> {
    let (url, server) = serve_once("200 OK", "async ok");

    let mut request = MultipartRequest::new();
    request.add_stream(
        "notes",
        "text/plain",
        "notes.txt",
        std::io::Cursor::new(b"streamed".to_vec()),
    )?;

    let text = request.send(url).await?;
    assert_eq!(text, "async ok");

    let captured = tokio::task::spawn_blocking(move || server.join().unwrap())
        .await
        .unwrap();
    let body = String::from_utf8(captured.body).unwrap();
    assert!(body.contains("filename=\"notes.txt\"\r\nContent-Type: text/plain\r\n\r\nstreamed\r\n"));

    Ok(())
}

#[test]
fn test_aborted_body_never_completes() {
    let (url, server) = capture_until_close();

    let config = Config::builder().send_policy(SendPolicy::Abort).build();
    let mut request = MultipartRequest::with_config(config);
    request.add_stream(
        "blob",
        "application/octet-stream",
        "blob.bin",
        FailingReader { good: 5000 },
    ).unwrap();
    let boundary = request.boundary().clone();

    let result = request.execute(&url);
    assert!(matches!(result, Err(Error::Send(_))), "Expected send error, got {:?}", result);

    let raw = server.join().unwrap();
    assert!(find(&raw, b"0\r\n\r\n").is_none(), "chunked body was terminated");
    assert!(find(&raw, format!("--{}--", boundary).as_bytes()).is_none());
}

#[test]
fn test_cancelled_body_never_completes() {
    let (url, server) = capture_until_close();

    let mut request = MultipartRequest::new();
    let reader = CancellingReader {
        cancel: request.cancel_handle(),
        reads: 0,
    };
    request
        .add_stream("blob", "application/octet-stream", "blob.bin", reader)
        .unwrap();

    let result = request.execute(&url);
    assert!(matches!(result, Err(Error::Cancelled)), "Expected cancellation, got {:?}", result);

    let raw = server.join().unwrap();
    assert!(find(&raw, b"0\r\n\r\n").is_none(), "chunked body was terminated");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_execute_inside_multi_thread_runtime() -> Result<()> {
    let (url, server) = serve_once("200 OK", "blocking ok");

    let mut request = MultipartRequest::new();
    request.add_text("f", "text/plain", "x")?;
    assert_eq!(request.execute(&url)?, "blocking ok");

    server.join().unwrap();
    Ok(())
}

#[tokio::test]
async fn test_execute_inside_current_thread_runtime() -> Result<()> {
    let (url, server) = serve_once("200 OK", "blocking ok");

    let mut request = MultipartRequest::new();
    request.add_text("f", "text/plain", "x")?;
    assert_eq!(request.execute(&url)?, "blocking ok");

    server.join().unwrap();
    Ok(())
}
