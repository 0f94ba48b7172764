use crate::domain::errors::StoreError;
use crate::ports::outbound::{BackendKind, ChangeFeed, SharedStore};
use crate::COOKIE_CAPACITY;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

const ROOT_PATH: &str = "/";

#[derive(Debug, Clone, PartialEq, Eq)]
struct Cookie {
    name: String,
    path: String,
    value: String,
}

enum Jar {
    Memory(Arc<RwLock<Vec<Cookie>>>),
    File(PathBuf),
}

/// Shared cookie jar without change notification.
///
/// Every queue lives in one `name=value` cookie scoped to a path (`/` by
/// default), with no expiry or security attributes. Contexts must poll.
/// A pair longer than [`COOKIE_CAPACITY`] bytes is silently ignored by the
/// jar, leaving the previous value in place.
///
/// The jar lives either in memory, shared by every handle, or in a file
/// shared by every process that opens it.
pub struct CookieStore {
    jar: Jar,
    path: String,
}

impl CookieStore {
    /// Create an empty in-memory jar.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            jar: Jar::Memory(Arc::new(RwLock::new(Vec::new()))),
            path: ROOT_PATH.to_string(),
        }
    }

    /// Open a jar persisted at `path`. The file is created on first write.
    pub fn open<P: AsRef<Path>>(path: P) -> Self {
        Self {
            jar: Jar::File(path.as_ref().to_path_buf()),
            path: ROOT_PATH.to_string(),
        }
    }

    /// Scope reads and writes of this handle to a document path.
    pub fn with_path_scope(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Open another execution context on the same jar.
    #[must_use]
    pub fn handle(&self) -> Self {
        let jar = match &self.jar {
            Jar::Memory(cookies) => Jar::Memory(cookies.clone()),
            Jar::File(path) => Jar::File(path.clone()),
        };
        Self {
            jar,
            path: self.path.clone(),
        }
    }

    /// The cookie string visible to this handle, `a=1; b=2`.
    pub fn document_cookie(&self) -> Result<String, StoreError> {
        let cookies = self.load()?;
        let mut visible: Vec<&Cookie> = cookies
            .iter()
            .filter(|c| path_matches(&self.path, &c.path))
            .collect();
        // Longer paths first.
        visible.sort_by(|a, b| b.path.len().cmp(&a.path.len()));
        Ok(visible
            .iter()
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; "))
    }

    fn load(&self) -> Result<Vec<Cookie>, StoreError> {
        match &self.jar {
            Jar::Memory(cookies) => Ok(cookies.read().clone()),
            Jar::File(path) => match std::fs::read_to_string(path) {
                Ok(text) => Ok(text.lines().filter_map(parse_line).collect()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
                Err(e) => Err(e.into()),
            },
        }
    }

    fn set(&self, name: &str, raw_value: &str) -> Result<(), StoreError> {
        let value = escape_value(raw_value);
        let pair_len = name.len() + 1 + value.len();
        if pair_len > COOKIE_CAPACITY {
            warn!(
                cookie = name,
                size = pair_len,
                capacity = COOKIE_CAPACITY,
                "Cookie exceeds capacity, write ignored by jar"
            );
            return Ok(());
        }

        let cookie = Cookie {
            name: name.to_string(),
            path: self.path.clone(),
            value,
        };

        match &self.jar {
            Jar::Memory(cookies) => {
                upsert(&mut cookies.write(), cookie);
                Ok(())
            }
            Jar::File(path) => {
                let mut cookies = self.load()?;
                upsert(&mut cookies, cookie);
                save_file(path, &cookies)
            }
        }
    }
}

impl SharedStore for CookieStore {
    fn write(&self, name: &str, value: &str) -> Result<(), StoreError> {
        self.set(name, value)
    }

    fn read(&self, name: &str) -> Result<Option<String>, StoreError> {
        let cookies = self.load()?;
        Ok(cookies
            .iter()
            .filter(|c| c.name == name && path_matches(&self.path, &c.path))
            .max_by_key(|c| c.path.len())
            .map(|c| unescape_value(&c.value)))
    }

    /// Sets the cookie to an empty value, which reads back as `""`.
    fn clear(&self, name: &str) -> Result<(), StoreError> {
        self.set(name, "")
    }

    fn supports_change_notification(&self) -> bool {
        false
    }

    fn subscribe(&self, _name: &str) -> Option<ChangeFeed> {
        None
    }

    fn backend_kind(&self) -> BackendKind {
        BackendKind::CookieJar
    }

    fn is_blocking(&self) -> bool {
        matches!(self.jar, Jar::File(_))
    }
}

/// Cookie path matching: `/app` covers `/app` and `/app/x`, never `/apple`.
fn path_matches(doc_path: &str, cookie_path: &str) -> bool {
    match doc_path.strip_prefix(cookie_path) {
        Some(rest) => rest.is_empty() || cookie_path.ends_with('/') || rest.starts_with('/'),
        None => false,
    }
}

fn upsert(cookies: &mut Vec<Cookie>, cookie: Cookie) {
    match cookies
        .iter_mut()
        .find(|c| c.name == cookie.name && c.path == cookie.path)
    {
        Some(existing) => existing.value = cookie.value,
        None => cookies.push(cookie),
    }
}

/// Jar file format: one `name=value; path=/` line per cookie.
fn parse_line(line: &str) -> Option<Cookie> {
    let mut parts = line.split("; ");
    let (name, value) = parts.next()?.split_once('=')?;
    let path = parts
        .find_map(|attr| attr.strip_prefix("path="))
        .unwrap_or(ROOT_PATH);
    Some(Cookie {
        name: name.to_string(),
        path: path.to_string(),
        value: value.to_string(),
    })
}

fn save_file(path: &Path, cookies: &[Cookie]) -> Result<(), StoreError> {
    use std::io::Write;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            std::fs::create_dir_all(parent)?;
            parent
        }
        _ => Path::new("."),
    };

    let mut text = String::new();
    for c in cookies {
        text.push_str(&format!("{}={}; path={}\n", c.name, c.value, c.path));
    }

    // Fresh temp file per write, then an atomic rename over the jar.
    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    file.write_all(text.as_bytes())?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| StoreError::from(e.error))?;
    Ok(())
}

/// Escape the characters that would break the `name=value; attr` syntax.
fn escape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '%' => out.push_str("%25"),
            ';' => out.push_str("%3B"),
            '\n' => out.push_str("%0A"),
            '\r' => out.push_str("%0D"),
            _ => out.push(c),
        }
    }
    out
}

fn unescape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        let code = rest.get(pos + 1..pos + 3);
        match code.and_then(|h| u8::from_str_radix(h, 16).ok()) {
            Some(byte) if byte.is_ascii() => {
                out.push(byte as char);
                rest = &rest[pos + 3..];
            }
            _ => {
                out.push('%');
                rest = &rest[pos + 1..];
            }
        }
    }
    out.push_str(rest);
    out
}
