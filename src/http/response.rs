//! Response assembly: status line and headers into the outbound buffer,
//! file content as a read-only memory map for zero-copy transmission.

use std::fs::{self, File};
use std::os::unix::fs::MetadataExt;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use memmap2::Mmap;

use crate::buffer::Buffer;
use crate::http::mime;

/// Closed status → reason-phrase table. Codes outside it fall back to 400.
fn reason_phrase(code: u16) -> Option<&'static str> {
    match code {
        200 => Some("OK"),
        400 => Some("Bad Request"),
        403 => Some("Forbidden"),
        404 => Some("Not Found"),
        _ => None,
    }
}

/// Closed status → error-page table, relative to the document root.
fn error_page(code: u16) -> Option<&'static str> {
    match code {
        400 => Some("/400.html"),
        403 => Some("/403.html"),
        404 => Some("/404.html"),
        _ => None,
    }
}

/// One response in flight on a connection.
///
/// `init` binds it to a resolved path under the document root; `make` emits
/// the status line and header block into the caller's outbound buffer and,
/// for a non-empty regular file, maps the content read-only instead of
/// copying it. The mapping is released by `unmap` (idempotent), by the next
/// `init`, or on drop — never twice.
#[derive(Debug, Default)]
pub struct Response {
    code: Option<u16>,
    keep_alive: bool,
    path: String,
    root: PathBuf,
    file: Option<Mmap>,
    file_len: usize,
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the descriptor for the next exchange. `code` of `None` means
    /// "derive": 200 unless the file lookup downgrades it.
    pub fn init(&mut self, root: &Path, path: String, keep_alive: bool, code: Option<u16>) {
        self.unmap();
        self.root = root.to_path_buf();
        self.path = path;
        self.keep_alive = keep_alive;
        self.code = code;
        self.file_len = 0;
    }

    /// Resolved status code; meaningful after `make`.
    pub fn code(&self) -> u16 {
        self.code.unwrap_or(200)
    }

    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// The mapped file bytes, when a file is being served zero-copy.
    pub fn file(&self) -> Option<&[u8]> {
        self.file.as_deref()
    }

    pub fn file_len(&self) -> usize {
        self.file_len
    }

    /// Release the mapped view. Safe to call any number of times.
    pub fn unmap(&mut self) {
        self.file = None;
        self.file_len = 0;
    }

    /// Emit status line + header block into `buf` and arm the mapped file.
    ///
    /// Lookup failures never surface as errors: a missing or unreadable
    /// target downgrades the status and substitutes the matching error
    /// page; if even that page is absent, a minimal HTML body is rendered
    /// inline into the buffer.
    pub fn make(&mut self, buf: &mut Buffer) {
        let mut code = self.code.unwrap_or(200);
        let mut size = None;

        // Success-track responses are downgraded by the file lookup; a
        // caller-supplied error code is kept as-is.
        if code < 400 {
            match fs::metadata(self.full_path()) {
                Err(_) => code = 404,
                Ok(meta) if meta.is_dir() => code = 404,
                Ok(meta) if meta.permissions().mode() & libc::S_IROTH == 0 => code = 403,
                Ok(meta) => size = Some(meta.size()),
            }
        }
        if let Some(page) = error_page(code) {
            self.path = page.to_string();
            size = fs::metadata(self.full_path()).ok().map(|m| m.size());
        }
        let (code, phrase) = match reason_phrase(code) {
            Some(phrase) => (code, phrase),
            None => (400, "Bad Request"),
        };
        self.code = Some(code);

        buf.append_str(&format!("HTTP/1.1 {} {}\r\n", code, phrase));
        buf.append_str(&format!(
            "Content-Type: {}\r\n",
            mime::content_type_for(&self.path)
        ));

        match size.filter(|&s| s > 0).and_then(|_| self.map_file()) {
            Some(map) => {
                self.file_len = map.len();
                buf.append_str(&format!("Content-Length: {}\r\n", map.len()));
                self.append_connection(buf);
                buf.append_str("\r\n");
                self.file = Some(map);
            }
            None => self.error_content(buf, code, phrase, "File NotFound!"),
        }
    }

    fn full_path(&self) -> PathBuf {
        self.root.join(self.path.trim_start_matches('/'))
    }

    fn map_file(&self) -> Option<Mmap> {
        let file = File::open(self.full_path()).ok()?;
        // Read-only mapping of a file we just opened read-only.
        unsafe { Mmap::map(&file) }.ok()
    }

    fn append_connection(&self, buf: &mut Buffer) {
        if self.keep_alive {
            buf.append_str("Connection: keep-alive\r\n");
            buf.append_str("Keep-Alive: max=6, timeout=120\r\n");
        } else {
            buf.append_str("Connection: close\r\n");
        }
    }

    /// Synthetic body used when no error page exists on disk.
    fn error_content(&self, buf: &mut Buffer, code: u16, phrase: &str, message: &str) {
        let body = format!(
            "<html><title>Error</title><body bgcolor=\"ffffff\">{} : {}\n\
             <p>{}</p><hr><em>rampart</em></body></html>",
            code, phrase, message
        );
        buf.append_str(&format!("Content-Length: {}\r\n", body.len()));
        self.append_connection(buf);
        buf.append_str("\r\n");
        buf.append_str(&body);
    }
}
