//! Transport URL classification.
//!
//! A server URL names one of three transports plus an optional resource uri:
//!
//! ```text
//! riap+tcp://host:port[/uri]
//! riap+unix:<percent-encoded socket path>[//uri]
//! riap+pipe:<percent-encoded program>[//<arg>/<arg>/...][//uri]
//! ```
//!
//! Socket and program paths are resolved to absolute, symlink-free paths while
//! classifying, so two spellings of the same endpoint share one cache key.

use crate::error::{Result, RiapError};
use regex::Regex;
use serde::Serialize;
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

pub const TCP_SCHEME: &str = "riap+tcp";
pub const UNIX_SCHEME: &str = "riap+unix";
pub const PIPE_SCHEME: &str = "riap+pipe";

/// Matches the part of a TCP URL after `riap+tcp:`.
static TCP_REST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^//(\[[^\]/]+\]|[^/:\[\]]+):(\d+)(/.*)?$").expect("tcp url regex must compile")
});

/// Where a request should be sent, as classified from a server URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetDescriptor {
    Tcp {
        host: String,
        port: u16,
        embedded_uri: Option<String>,
    },
    Unix {
        socket_path: PathBuf,
        embedded_uri: Option<String>,
    },
    Pipe {
        program_path: PathBuf,
        program_args: Vec<String>,
        embedded_uri: Option<String>,
    },
}

impl TargetDescriptor {
    /// Classify a server URL.
    ///
    /// Every error returned here is terminal: the URL will not get better by
    /// retrying.
    pub fn classify(url: &str) -> Result<Self> {
        let (scheme, rest) = url.split_once(':').ok_or_else(|| RiapError::InvalidScheme {
            url: url.to_string(),
        })?;

        if scheme.eq_ignore_ascii_case(TCP_SCHEME) {
            classify_tcp(url, rest)
        } else if scheme.eq_ignore_ascii_case(UNIX_SCHEME) {
            classify_unix(url, rest)
        } else if scheme.eq_ignore_ascii_case(PIPE_SCHEME) {
            classify_pipe(url, rest)
        } else {
            Err(RiapError::InvalidScheme {
                url: url.to_string(),
            })
        }
    }

    pub fn scheme(&self) -> &'static str {
        match self {
            TargetDescriptor::Tcp { .. } => TCP_SCHEME,
            TargetDescriptor::Unix { .. } => UNIX_SCHEME,
            TargetDescriptor::Pipe { .. } => PIPE_SCHEME,
        }
    }

    pub fn embedded_uri(&self) -> Option<&str> {
        match self {
            TargetDescriptor::Tcp { embedded_uri, .. }
            | TargetDescriptor::Unix { embedded_uri, .. }
            | TargetDescriptor::Pipe { embedded_uri, .. } => embedded_uri.as_deref(),
        }
    }

    /// Canonical key identifying a reusable connection to this endpoint.
    pub fn cache_key(&self) -> String {
        match self {
            TargetDescriptor::Tcp { host, port, .. } => {
                format!("tcp:{}:{}", host.to_lowercase(), port)
            }
            TargetDescriptor::Unix { socket_path, .. } => {
                format!("unix:{}", socket_path.display())
            }
            TargetDescriptor::Pipe {
                program_path,
                program_args,
                ..
            } => format!("pipe:{}", display_command(program_path, program_args)),
        }
    }

    /// Human-readable endpoint for log and error messages.
    pub fn endpoint(&self) -> String {
        match self {
            TargetDescriptor::Tcp { host, port, .. } => format_host_port(host, *port),
            TargetDescriptor::Unix { socket_path, .. } => socket_path.display().to_string(),
            TargetDescriptor::Pipe {
                program_path,
                program_args,
                ..
            } => display_command(program_path, program_args),
        }
    }

    /// Pick the resource uri for a request.
    ///
    /// The uri embedded in the URL wins; otherwise the caller must have put a
    /// string under `uri` in the extra request fields.
    pub fn resolve_uri(&self, extra: &serde_json::Map<String, serde_json::Value>) -> Result<String> {
        if let Some(uri) = self.embedded_uri() {
            return Ok(uri.to_string());
        }
        match extra.get("uri") {
            Some(serde_json::Value::String(uri)) if !uri.is_empty() => Ok(uri.clone()),
            Some(serde_json::Value::String(_)) | None | Some(serde_json::Value::Null) => {
                Err(RiapError::MissingResourceUri)
            }
            Some(_) => Err(RiapError::validation("Request field `uri` must be a string")),
        }
    }
}

/// Flat view of a classified URL, for introspection without connecting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedUrl {
    pub scheme: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
    pub uri: Option<String>,
}

impl ParsedUrl {
    /// Flatten a descriptor; `uri` falls back to the extra request fields.
    pub fn new(
        target: &TargetDescriptor,
        extra: &serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        let uri = target.resolve_uri(extra).ok();
        let scheme = target.scheme().to_string();
        match target {
            TargetDescriptor::Tcp { host, port, .. } => Self {
                scheme,
                host: Some(host.clone()),
                port: Some(*port),
                path: None,
                args: None,
                uri,
            },
            TargetDescriptor::Unix { socket_path, .. } => Self {
                scheme,
                host: None,
                port: None,
                path: Some(socket_path.clone()),
                args: None,
                uri,
            },
            TargetDescriptor::Pipe {
                program_path,
                program_args,
                ..
            } => Self {
                scheme,
                host: None,
                port: None,
                path: Some(program_path.clone()),
                args: Some(program_args.clone()),
                uri,
            },
        }
    }
}

fn classify_tcp(url: &str, rest: &str) -> Result<TargetDescriptor> {
    let malformed = |message: &str| RiapError::MalformedUrl {
        url: url.to_string(),
        message: format!("{}, expected e.g. riap+tcp://localhost:5678/Foo/Bar", message),
    };

    let caps = TCP_REST
        .captures(rest)
        .ok_or_else(|| malformed("missing or invalid host:port"))?;

    let host = caps[1].trim_start_matches('[').trim_end_matches(']').to_string();
    let port: u16 = caps[2]
        .parse()
        .map_err(|_| malformed("port out of range"))?;
    let embedded_uri = match caps.get(3) {
        Some(path) => Some(decode(url, path.as_str())?.into_owned()),
        None => None,
    };

    Ok(TargetDescriptor::Tcp {
        host,
        port,
        embedded_uri,
    })
}

fn classify_unix(url: &str, rest: &str) -> Result<TargetDescriptor> {
    let (path_part, uri_part) = match rest.split_once("//") {
        Some((path, uri)) => (path, Some(uri)),
        None => (rest, None),
    };
    if path_part.is_empty() {
        return Err(RiapError::MalformedUrl {
            url: url.to_string(),
            message: "missing socket path, expected e.g. riap+unix:/var/run/apid.sock//Foo/Bar"
                .to_string(),
        });
    }

    let socket_path = resolve_path(&decode(url, path_part)?)?;
    let embedded_uri = uri_part.map(|uri| uri_from_segment(url, uri)).transpose()?.flatten();

    Ok(TargetDescriptor::Unix {
        socket_path,
        embedded_uri,
    })
}

fn classify_pipe(url: &str, rest: &str) -> Result<TargetDescriptor> {
    let mut parts = rest.splitn(3, "//");
    let program_part = parts.next().unwrap_or_default();
    let args_part = parts.next();
    let uri_part = parts.next();

    if program_part.is_empty() {
        return Err(RiapError::MalformedUrl {
            url: url.to_string(),
            message: "missing program path, expected e.g. riap+pipe:/usr/bin/server//arg1/arg2//Foo/Bar"
                .to_string(),
        });
    }

    let program_path = resolve_path(&decode(url, program_part)?)?;

    let mut program_args = Vec::new();
    if let Some(args) = args_part.filter(|a| !a.is_empty()) {
        // A trailing slash closes the argument list: `//a/b/`
        let args = args.strip_suffix('/').unwrap_or(args);
        for arg in args.split('/') {
            program_args.push(decode(url, arg)?.into_owned());
        }
    }

    let embedded_uri = uri_part.map(|uri| uri_from_segment(url, uri)).transpose()?.flatten();

    Ok(TargetDescriptor::Pipe {
        program_path,
        program_args,
        embedded_uri,
    })
}

/// Turn the segment after a `//` separator into a resource uri.
fn uri_from_segment(url: &str, raw: &str) -> Result<Option<String>> {
    if raw.is_empty() {
        return Ok(None);
    }
    let uri = decode(url, raw)?;
    if uri.starts_with('/') {
        Ok(Some(uri.into_owned()))
    } else {
        Ok(Some(format!("/{}", uri)))
    }
}

fn decode<'a>(url: &str, segment: &'a str) -> Result<Cow<'a, str>> {
    urlencoding::decode(segment).map_err(|e| RiapError::MalformedUrl {
        url: url.to_string(),
        message: format!("invalid percent-encoding in '{}': {}", segment, e),
    })
}

fn resolve_path(path: &str) -> Result<PathBuf> {
    std::fs::canonicalize(path).map_err(|source| RiapError::PathResolution {
        path: PathBuf::from(path),
        source,
    })
}

fn format_host_port(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

/// Format a program and its arguments as a copy-pasteable command line.
pub fn display_command(program: &Path, args: &[String]) -> String {
    let mut line = quote_word(&program.to_string_lossy()).into_owned();
    for arg in args {
        line.push(' ');
        line.push_str(&quote_word(arg));
    }
    line
}

fn quote_word(word: &str) -> Cow<'_, str> {
    let plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_@%+=:,./-".contains(c));
    if plain {
        Cow::Borrowed(word)
    } else {
        Cow::Owned(format!("'{}'", word.replace('\'', r"'\''")))
    }
}

/// Build a `riap+tcp` URL for `host:port`.
pub fn tcp_url(host: &str, port: u16) -> String {
    format!("{}://{}", TCP_SCHEME, format_host_port(host, port))
}

/// Build a `riap+unix` URL for a socket path.
pub fn unix_url(socket_path: impl AsRef<Path>) -> String {
    format!(
        "{}:{}",
        UNIX_SCHEME,
        urlencoding::encode(&socket_path.as_ref().to_string_lossy())
    )
}

/// Build a `riap+pipe` URL for a command argument vector.
pub fn pipe_url<S: AsRef<str>>(command: &[S]) -> Result<String> {
    let (program, args) = command
        .split_first()
        .ok_or_else(|| RiapError::validation("Please specify a command to run"))?;

    let mut url = format!("{}:{}", PIPE_SCHEME, urlencoding::encode(program.as_ref()));
    if !args.is_empty() {
        let encoded: Vec<Cow<'_, str>> =
            args.iter().map(|a| urlencoding::encode(a.as_ref())).collect();
        url.push_str("//");
        url.push_str(&encoded.join("/"));
    }
    Ok(url)
}
