use culvert::Error;
use culvert::Runtime;
use culvert::net::http::{HttpClient, HttpRequest, Transport};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;

/// Transport that replays scripted reads and records every write.
struct Scripted {
    reads: RefCell<VecDeque<Vec<u8>>>,
    writes: RefCell<Vec<u8>>,
}

impl Scripted {
    fn new(reads: &[&[u8]]) -> Self {
        Self {
            reads: RefCell::new(reads.iter().map(|chunk| chunk.to_vec()).collect()),
            writes: RefCell::new(Vec::new()),
        }
    }
}

impl Transport for Scripted {
    async fn sendmsg(&self, message: &[u8]) -> io::Result<()> {
        self.writes.borrow_mut().extend_from_slice(message);
        Ok(())
    }

    async fn recvmsg(&self, buffer: &mut [u8]) -> io::Result<usize> {
        match self.reads.borrow_mut().pop_front() {
            Some(chunk) => {
                assert!(chunk.len() <= buffer.len(), "scripted chunk too large");
                buffer[..chunk.len()].copy_from_slice(&chunk);
                Ok(chunk.len())
            }
            // Script exhausted: the peer has closed the connection.
            None => Ok(0),
        }
    }
}

/// Transport whose sends fail outright.
struct Broken;

impl Transport for Broken {
    async fn sendmsg(&self, _message: &[u8]) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "broken pipe"))
    }

    async fn recvmsg(&self, _buffer: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "broken pipe"))
    }
}

#[test]
fn response_with_content_length() {
    let mut rt = Runtime::new();

    rt.block_on(async {
        let transport = Scripted::new(&[
            b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\nContent-Type: text/plain\r\n\r\nhello",
        ]);
        let mut client = HttpClient::new(transport);

        let mut response = client
            .send_request(&HttpRequest::get("/greeting"))
            .await
            .expect("send request");

        assert_eq!(response.status(), 200);
        assert_eq!(response.header("content-type"), Some("text/plain"));
        assert_eq!(response.header("Content-Type"), Some("text/plain"));
        assert_eq!(response.content_length(), Some(5));

        let body = response.read_full_body().await.expect("read body");
        assert_eq!(body, b"hello", "body must start after the blank line");
    });
}

#[test]
fn malformed_head_kills_the_session() {
    let mut rt = Runtime::new();

    rt.block_on(async {
        // A garbage head followed by a perfectly valid response. The second
        // response must never be reachable: the stream is desynchronized.
        let transport = Scripted::new(&[
            b"BOGUS\r\nnot-a-header\r\n\r\n",
            b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n",
        ]);
        let mut client = HttpClient::new(transport);

        let first = client.send_request(&HttpRequest::get("/")).await;
        assert!(
            matches!(first, Err(Error::Malformed { .. })),
            "garbage head should be a parse error"
        );
        drop(first);

        let second = client.send_request(&HttpRequest::get("/")).await;
        assert!(
            matches!(second, Err(Error::SessionClosed)),
            "a protocol violation must leave the session dead"
        );
    });
}

#[test]
fn head_split_across_reads() {
    let mut rt = Runtime::new();

    rt.block_on(async {
        // The terminator itself straddles two reads.
        let transport = Scripted::new(&[
            b"HTTP/1.1 200 OK\r\nContent-Length: 4\r",
            b"\n\r\nbo",
            b"dy",
        ]);
        let mut client = HttpClient::new(transport);

        let mut response = client
            .send_request(&HttpRequest::get("/"))
            .await
            .expect("send request");

        assert_eq!(response.status(), 200);
        let body = response.read_full_body().await.expect("read body");
        assert_eq!(body, b"body");
    });
}

#[test]
fn missing_content_length_reads_until_close() {
    let mut rt = Runtime::new();

    rt.block_on(async {
        let transport = Scripted::new(&[
            b"HTTP/1.1 200 OK\r\n\r\nfirst ",
            b"second ",
            b"third",
        ]);
        let mut client = HttpClient::new(transport);

        let mut response = client
            .send_request(&HttpRequest::get("/stream"))
            .await
            .expect("send request");

        assert_eq!(response.content_length(), None);
        let body = response.read_full_body().await.expect("read body");
        assert_eq!(body, b"first second third");
    });
}

#[test]
fn request_wire_format() {
    let mut rt = Runtime::new();

    rt.block_on(async {
        let transport = Scripted::new(&[b"HTTP/1.1 204 No Content\r\n\r\n"]);
        let mut client = HttpClient::new(transport);

        let request = HttpRequest::get("/path/to/resource").header("Host", "example.com");
        let response = client.send_request(&request).await.expect("send request");
        assert_eq!(response.status(), 204);
        drop(response);

        let wire = client.transport().writes.borrow().clone();

        let text = String::from_utf8(wire).expect("request is utf-8");
        assert!(text.starts_with("GET /path/to/resource HTTP/1.1\r\n"));
        assert!(text.contains("Connection: keep-alive\r\n"));
        assert!(text.contains("Host: example.com\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    });
}

#[test]
fn leaked_response_leaves_the_session_busy() {
    let mut rt = Runtime::new();

    rt.block_on(async {
        let transport = Scripted::new(&[
            b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n",
        ]);
        let mut client = HttpClient::new(transport);

        let response = client
            .send_request(&HttpRequest::get("/"))
            .await
            .expect("first request");

        // Skipping the response's destructor never releases the session.
        std::mem::forget(response);

        let err = client
            .send_request(&HttpRequest::get("/again"))
            .await
            .expect_err("session still in use");
        assert!(matches!(err, Error::SessionBusy));
    });
}

#[test]
fn session_frees_on_response_drop() {
    let mut rt = Runtime::new();

    rt.block_on(async {
        let transport = Scripted::new(&[
            b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nab",
            b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\ncd",
        ]);
        let mut client = HttpClient::new(transport);

        let response = client
            .send_request(&HttpRequest::get("/one"))
            .await
            .expect("first request");
        assert_eq!(response.status(), 200);
        drop(response);

        // The session is free again once the response is dropped.
        let mut response = client
            .send_request(&HttpRequest::get("/two"))
            .await
            .expect("second request");
        let body = response.read_full_body().await.expect("read body");
        assert_eq!(body, b"cd");
    });
}

#[test]
fn close_before_head_kills_the_session() {
    let mut rt = Runtime::new();

    rt.block_on(async {
        let transport = Scripted::new(&[b"HTTP/1.1 200 OK\r\nContent-Le"]);
        let mut client = HttpClient::new(transport);

        let err = client
            .send_request(&HttpRequest::get("/"))
            .await
            .expect_err("connection closes mid-head");
        assert!(matches!(err, Error::ConnectionClosed));

        // Dead sessions refuse further requests.
        let err = client
            .send_request(&HttpRequest::get("/again"))
            .await
            .expect_err("dead session");
        assert!(matches!(err, Error::SessionClosed));
    });
}

#[test]
fn send_failure_kills_the_session() {
    let mut rt = Runtime::new();

    rt.block_on(async {
        let mut client = HttpClient::new(Broken);

        let err = client
            .send_request(&HttpRequest::get("/"))
            .await
            .expect_err("send fails");
        assert!(matches!(err, Error::Io(_)));

        let err = client
            .send_request(&HttpRequest::get("/"))
            .await
            .expect_err("dead session");
        assert!(matches!(err, Error::SessionClosed));
    });
}

#[test]
fn short_body_then_close_is_an_error() {
    let mut rt = Runtime::new();

    rt.block_on(async {
        let transport = Scripted::new(&[b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nonly"]);
        let mut client = HttpClient::new(transport);

        let mut response = client
            .send_request(&HttpRequest::get("/"))
            .await
            .expect("send request");

        let err = response
            .read_full_body()
            .await
            .expect_err("close before the declared length");
        assert!(matches!(err, Error::ConnectionClosed));
    });
}

#[test]
fn post_carries_body_and_length() {
    let mut rt = Runtime::new();

    rt.block_on(async {
        let transport = Scripted::new(&[b"HTTP/1.1 201 Created\r\nContent-Length: 0\r\n\r\n"]);
        let mut client = HttpClient::new(transport);

        let request = HttpRequest::post("/items", b"payload".to_vec());
        let response = client.send_request(&request).await.expect("send request");
        assert_eq!(response.status(), 201);
        assert_eq!(response.content_length(), Some(0));
    });
}
