use crate::auth::CredentialVerifier;
use crate::buffer::Buffer;
use crate::http::request::Request;

/// Paths that resolve to a default page when requested without a suffix,
/// e.g. `/login` → `/login.html`.
const DEFAULT_ROUTES: [&str; 6] = [
    "/index",
    "/register",
    "/login",
    "/welcome",
    "/video",
    "/picture",
];

const LOGIN_PATH: &str = "/login.html";
const REGISTER_PATH: &str = "/register.html";

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    RequestLine,
    Headers,
    Body,
    Finish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    /// The request line does not match `METHOD SP PATH SP HTTP/VERSION`.
    /// Not recoverable; the caller answers with a 400.
    BadRequestLine,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStatus {
    /// A full request has been parsed; the `Request` is ready.
    Complete,
    /// Ran out of complete lines; feed more bytes and call `parse` again.
    Partial,
}

/// Incremental request parser.
///
/// A four-state machine (`RequestLine → Headers → Body → Finish`) driven by
/// CRLF-terminated lines pulled from the inbound buffer. States only move
/// forward; `init` is the sole way back. When the buffer holds no complete
/// line the parser returns `Partial` without consuming anything, so partial
/// network reads resume where they left off.
#[derive(Debug)]
pub struct RequestParser {
    state: ParseState,
    request: Request,
}

impl Default for RequestParser {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestParser {
    pub fn new() -> Self {
        Self {
            state: ParseState::RequestLine,
            request: Request::new(),
        }
    }

    /// Reset for the next request on the same connection.
    pub fn init(&mut self) {
        self.state = ParseState::RequestLine;
        self.request = Request::new();
    }

    pub fn state(&self) -> ParseState {
        self.state
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Consume as much of the buffer as possible, dispatching line by line
    /// on the current state.
    pub fn parse(
        &mut self,
        buf: &mut Buffer,
        verifier: &dyn CredentialVerifier,
    ) -> Result<ParseStatus, ParseError> {
        while buf.readable_bytes() > 0 && self.state != ParseState::Finish {
            if self.state == ParseState::Body {
                // The whole remainder is the single-line body; a trailing
                // CRLF is optional but consumed when present.
                let readable = buf.peek();
                let line_len = find_crlf(readable).unwrap_or(readable.len());
                let line = String::from_utf8_lossy(&readable[..line_len]).into_owned();
                let consume = (line_len + 2).min(buf.readable_bytes());
                self.parse_body(line, verifier);
                buf.retrieve(consume);
                continue;
            }

            let readable = buf.peek();
            let Some(line_len) = find_crlf(readable) else {
                return Ok(ParseStatus::Partial);
            };
            let line = String::from_utf8_lossy(&readable[..line_len]).into_owned();

            match self.state {
                ParseState::RequestLine => {
                    self.parse_request_line(&line)?;
                    self.rewrite_path();
                }
                ParseState::Headers => {
                    self.parse_header_line(&line);
                    // Only the blank-line CRLF left: a header-only request,
                    // go straight to Finish.
                    if buf.readable_bytes() <= 2 {
                        self.state = ParseState::Finish;
                    }
                }
                ParseState::Body | ParseState::Finish => unreachable!(),
            }
            buf.retrieve(line_len + 2);
        }

        tracing::debug!(
            method = %self.request.method,
            path = %self.request.path,
            version = %self.request.version,
            state = ?self.state,
            "parse pass"
        );

        if self.state == ParseState::Finish {
            Ok(ParseStatus::Complete)
        } else {
            Ok(ParseStatus::Partial)
        }
    }

    /// `METHOD SP PATH SP HTTP/VERSION`, anchored to the full line. None of
    /// the three tokens may contain a space; any of them may be empty.
    fn parse_request_line(&mut self, line: &str) -> Result<(), ParseError> {
        let (method, rest) = line.split_once(' ').ok_or(ParseError::BadRequestLine)?;
        let (path, rest) = rest.split_once(' ').ok_or(ParseError::BadRequestLine)?;
        let version = rest.strip_prefix("HTTP/").ok_or(ParseError::BadRequestLine)?;
        if version.contains(' ') {
            return Err(ParseError::BadRequestLine);
        }
        self.request.method = method.to_string();
        self.request.path = path.to_string();
        self.request.version = version.to_string();
        self.state = ParseState::Headers;
        Ok(())
    }

    fn rewrite_path(&mut self) {
        if self.request.path == "/" {
            self.request.path = "/index.html".to_string();
        } else if DEFAULT_ROUTES.contains(&self.request.path.as_str()) {
            self.request.path.push_str(".html");
        }
    }

    /// `KEY: VALUE` with at most one space after the colon stripped. A line
    /// without a colon — the blank terminator included — flips the state to
    /// Body instead of failing.
    fn parse_header_line(&mut self, line: &str) {
        match line.split_once(':') {
            Some((key, value)) => {
                let value = value.strip_prefix(' ').unwrap_or(value);
                self.request
                    .headers
                    .insert(key.to_string(), value.to_string());
            }
            None => self.state = ParseState::Body,
        }
    }

    fn parse_body(&mut self, line: String, verifier: &dyn CredentialVerifier) {
        self.request.body = line;
        self.handle_post(verifier);
        self.state = ParseState::Finish;
    }

    /// For an urlencoded POST: decode the form, and on the login/register
    /// routes let the verifier decide between the welcome and error pages.
    fn handle_post(&mut self, verifier: &dyn CredentialVerifier) {
        if self.request.method != "POST"
            || self.request.header("Content-Type") != Some(FORM_CONTENT_TYPE)
        {
            return;
        }
        self.decode_form();

        let is_login = match self.request.path.as_str() {
            LOGIN_PATH => true,
            REGISTER_PATH => false,
            _ => return,
        };
        let username = self.request.post("username").unwrap_or_default();
        let password = self.request.post("password").unwrap_or_default();
        let accepted = verifier.verify(username, password, is_login);
        tracing::debug!(username, is_login, accepted, "credential check");
        self.request.path = if accepted {
            "/welcome.html".to_string()
        } else {
            "/error.html".to_string()
        };
    }

    /// Standard urlencoded decoding: `+` → space, `%XY` → byte, pairs split
    /// on `&`/`=`, the final pair captured without a trailing `&`. Repeated
    /// keys keep the last value.
    fn decode_form(&mut self) {
        if self.request.body.is_empty() {
            return;
        }
        for (key, value) in url::form_urlencoded::parse(self.request.body.as_bytes()) {
            self.request
                .form
                .insert(key.into_owned(), value.into_owned());
        }
    }
}

fn find_crlf(haystack: &[u8]) -> Option<usize> {
    haystack.windows(2).position(|w| w == b"\r\n")
}
