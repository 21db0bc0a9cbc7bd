//! Best-effort SSH/HTTP identification of an open port.
//!
//! Opens its own connection, first listens for an unsolicited SSH banner and
//! otherwise sends an HTTP `HEAD /`. Every failure degrades to `None`.
use crate::scanner;
use crate::types::Banner;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time;

const PASSIVE_READ_LEN: usize = 128;
const HTTP_READ_LEN: usize = 2048;
const HTTP_HEAD_REQUEST: &[u8] = b"HEAD / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n";

/// Identify the service on `host:port`. Each connect, read and write is bounded by `timeout`.
pub async fn identify(host: &str, port: u16, timeout: Duration) -> Option<Banner> {
    let mut stream = scanner::connect(host, port, timeout).await.ok()?;

    // SSH servers speak first, so listen before sending anything.
    let mut buf = vec![0u8; PASSIVE_READ_LEN];
    match time::timeout(timeout, stream.read(&mut buf)).await {
        Ok(Ok(n)) if n > 0 => {
            if let Some(banner) = parse_ssh_banner(&buf[..n]) {
                return Some(banner);
            }
        }
        Ok(Ok(_)) => {}
        Ok(Err(_)) => return None,
        // Silence is expected from anything that waits for the client.
        Err(_) => {}
    }

    probe_http(&mut stream, timeout).await
}

async fn probe_http(stream: &mut TcpStream, timeout: Duration) -> Option<Banner> {
    time::timeout(timeout, stream.write_all(HTTP_HEAD_REQUEST))
        .await
        .ok()?
        .ok()?;

    let mut buf = vec![0u8; HTTP_READ_LEN];
    let n = time::timeout(timeout, stream.read(&mut buf))
        .await
        .ok()?
        .ok()?;
    if n == 0 {
        return None;
    }
    parse_http_response(&buf[..n])
}

/// Recognize an SSH identification string such as `SSH-2.0-OpenSSH_9.0`.
pub fn parse_ssh_banner(data: &[u8]) -> Option<Banner> {
    let text = String::from_utf8_lossy(data);
    let text = text.trim();
    if !text.starts_with("SSH-") {
        return None;
    }
    let line = text.lines().next().unwrap_or(text).trim();
    Some(Banner {
        text: line.to_string(),
        server: None,
    })
}

/// Recognize an HTTP response by its status line and pick up the `Server` header.
pub fn parse_http_response(data: &[u8]) -> Option<Banner> {
    let text = String::from_utf8_lossy(data);
    let status_line = text.lines().next().unwrap_or("").trim();
    if !status_line.starts_with("HTTP/") {
        return None;
    }
    Some(Banner {
        text: status_line.to_string(),
        server: server_header(&text),
    })
}

fn server_header(text: &str) -> Option<String> {
    text.lines()
        .skip(1)
        .take_while(|line| !line.is_empty())
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("server")
                .then(|| value.trim().to_string())
        })
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ssh_banner_first_line_only() {
        let b = parse_ssh_banner(b"SSH-2.0-OpenSSH_9.0\r\nextra kex bytes").unwrap();
        assert_eq!(b.text, "SSH-2.0-OpenSSH_9.0");
        assert_eq!(b.server, None);
    }

    #[test]
    fn non_ssh_greeting_ignored() {
        assert!(parse_ssh_banner(b"220 mail.example.com ESMTP\r\n").is_none());
        assert!(parse_ssh_banner(b"").is_none());
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let b = parse_ssh_banner(b"SSH-2.0-srv\xff\xfe\r\n").unwrap();
        assert!(b.text.starts_with("SSH-2.0-srv"));
        assert!(b.text.contains('\u{fffd}'));
    }

    #[test]
    fn http_status_and_server() {
        let resp = b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\nserver:  nginx/1.25.3 \r\n\r\n";
        let b = parse_http_response(resp).unwrap();
        assert_eq!(b.text, "HTTP/1.1 200 OK");
        assert_eq!(b.server.as_deref(), Some("nginx/1.25.3"));
        assert_eq!(b.to_string(), "HTTP/1.1 200 OK (Server: nginx/1.25.3)");
    }

    #[test]
    fn http_without_server_header() {
        let b = parse_http_response(b"HTTP/1.0 404 Not Found\r\n\r\n").unwrap();
        assert_eq!(b.text, "HTTP/1.0 404 Not Found");
        assert_eq!(b.server, None);
    }

    #[test]
    fn empty_server_header_is_unset() {
        let b = parse_http_response(b"HTTP/1.1 204 No Content\r\nServer:   \r\n\r\n").unwrap();
        assert_eq!(b.server, None);
    }

    #[test]
    fn non_http_response_rejected() {
        assert!(parse_http_response(b"+OK POP3 ready\r\n").is_none());
        assert!(parse_http_response(b"\r\nHTTP/1.1 200 OK\r\n").is_none());
    }
}
