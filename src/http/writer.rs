use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::http::response::{CONTENT_LENGTH, Response, StatusCode};

const HTTP_VERSION: &str = "HTTP/1.1";

/// Serializes status line, headers and body into one buffer.
///
/// Framing is owned here: `Content-Length` is written from the body and
/// `Connection` from `keep_alive`, whatever the handler set. Only a 101
/// keeps its own `Connection` header.
pub fn serialize_response(resp: &Response, keep_alive: bool) -> Vec<u8> {
    let mut buf = Vec::with_capacity(128 + resp.body.len());

    // Status line
    let status_line = format!(
        "{} {} {}\r\n",
        HTTP_VERSION,
        resp.status.as_u16(),
        resp.status.reason_phrase()
    );
    buf.extend_from_slice(status_line.as_bytes());

    let upgrade = resp.status == StatusCode::SwitchingProtocols;
    for (k, v) in &resp.headers {
        if k.eq_ignore_ascii_case(CONTENT_LENGTH)
            || (!upgrade && k.eq_ignore_ascii_case("Connection"))
        {
            continue;
        }
        write_header(&mut buf, k, v);
    }

    if !resp.status.forbids_body() {
        write_header(&mut buf, CONTENT_LENGTH, &resp.body.len().to_string());
    }

    if !upgrade || resp.header("Connection").is_none() {
        let value = if keep_alive { "keep-alive" } else { "close" };
        write_header(&mut buf, "Connection", value);
    }

    // Header/body separator
    buf.extend_from_slice(b"\r\n");

    if !resp.status.forbids_body() {
        buf.extend_from_slice(&resp.body);
    }

    buf
}

fn write_header(buf: &mut Vec<u8>, name: &str, value: &str) {
    buf.extend_from_slice(name.as_bytes());
    buf.extend_from_slice(b": ");
    buf.extend_from_slice(value.as_bytes());
    buf.extend_from_slice(b"\r\n");
}

/// A serialized response plus how much of it has reached the socket.
pub struct ResponseWriter {
    buffer: Vec<u8>,
    written: usize,
    status: StatusCode,
}

impl ResponseWriter {
    pub fn new(response: &Response, keep_alive: bool) -> Self {
        Self {
            buffer: serialize_response(response, keep_alive),
            written: 0,
            status: response.status,
        }
    }

    /// Same head as [`ResponseWriter::new`] without the body bytes, for HEAD.
    pub fn head_only(response: &Response, keep_alive: bool) -> Self {
        let mut writer = Self::new(response, keep_alive);
        if !response.status.forbids_body() {
            let head_len = writer.buffer.len() - response.body.len();
            writer.buffer.truncate(head_len);
        }
        writer
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn is_complete(&self) -> bool {
        self.written == self.buffer.len()
    }

    pub async fn write_to_stream<W>(&mut self, stream: &mut W) -> anyhow::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        while self.written < self.buffer.len() {
            let n = stream.write(&self.buffer[self.written..]).await?;

            if n == 0 {
                return Err(anyhow::anyhow!("connection closed while writing"));
            }

            self.written += n;
        }

        stream.flush().await?;
        Ok(())
    }
}
