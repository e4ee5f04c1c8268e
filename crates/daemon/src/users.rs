//! User accounts, permissions, and the on-disk credential store.
//!
//! The database is a line-oriented text file; `#` lines and blank
//! lines are ignored and each record reads
//! `username:digest64hex:home_dir:permissions`. The digest field is a
//! fixed-width 64-hex-character SHA-256 of the password; permissions
//! are the bitset value in decimal or `0x` hex. Home directories are
//! virtual absolute paths.

use std::fmt;
use std::io;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use rustc_hash::FxHashMap;
use sha2::{Digest, Sha256};
use tracing::warn;

/// Reserved login name for the anonymous pseudo-user.
pub const ANONYMOUS: &str = "anonymous";

/// Per-user permission bitset.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Permissions(u8);

impl Permissions {
    /// Download files, read listings, change directory.
    pub const READ: Self = Self(0x01);
    /// Upload and overwrite files.
    pub const WRITE: Self = Self(0x02);
    /// Delete files.
    pub const DELETE: Self = Self(0x04);
    /// Rename files and directories.
    pub const RENAME: Self = Self(0x08);
    /// Create directories.
    pub const MKDIR: Self = Self(0x10);
    /// Remove directories.
    pub const RMDIR: Self = Self(0x20);
    /// Bypass the home-subtree sandbox.
    pub const ADMIN: Self = Self(0x40);
    /// Every bit set.
    pub const ALL: Self = Self(0xFF);

    /// Builds a bitset from its stored numeric value.
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// The stored numeric value.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Whether every bit of `required` is present.
    #[must_use]
    pub const fn contains(self, required: Self) -> bool {
        self.0 & required.0 == required.0
    }

    /// Whether the ADMIN bit is present.
    #[must_use]
    pub const fn is_admin(self) -> bool {
        self.contains(Self::ADMIN)
    }
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02x}", self.0)
    }
}

/// An account as loaded from the database (or synthesized for
/// anonymous logins). Immutable for the lifetime of a session.
#[derive(Clone, Debug)]
pub struct User {
    /// Login name.
    pub name: String,
    /// 64-hex SHA-256 password digest; `None` for anonymous.
    pub password_digest: Option<String>,
    /// Virtual absolute home directory.
    pub home: String,
    /// Granted permission bits.
    pub permissions: Permissions,
}

/// Hex-encoded SHA-256 of a password, matching the stored field width.
#[must_use]
pub fn password_digest(password: &str) -> String {
    let digest = Sha256::digest(password.as_bytes());
    let mut out = String::with_capacity(64);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// The credential store shared by every session.
#[derive(Debug)]
pub struct UserStore {
    users: Mutex<FxHashMap<String, User>>,
    anonymous_enabled: bool,
    anonymous_home: String,
}

impl UserStore {
    /// Creates an empty store with the given anonymous policy.
    #[must_use]
    pub fn new(anonymous_enabled: bool, anonymous_home: String) -> Self {
        Self {
            users: Mutex::new(FxHashMap::default()),
            anonymous_enabled,
            anonymous_home,
        }
    }

    fn users(&self) -> MutexGuard<'_, FxHashMap<String, User>> {
        self.users.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether anonymous logins are accepted.
    #[must_use]
    pub const fn anonymous_enabled(&self) -> bool {
        self.anonymous_enabled
    }

    /// Loads records from `path`, replacing the current contents.
    ///
    /// Malformed records are skipped with a warning naming the line;
    /// only an unreadable file is an error.
    pub fn load(&self, path: &Path) -> io::Result<usize> {
        let text = std::fs::read_to_string(path)?;
        let mut parsed = FxHashMap::default();
        for (index, line) in text.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            match parse_record(trimmed) {
                Some(user) => {
                    parsed.insert(user.name.clone(), user);
                }
                None => {
                    warn!(
                        file = %path.display(),
                        line = index + 1,
                        "skipping malformed user record"
                    );
                }
            }
        }
        let count = parsed.len();
        *self.users() = parsed;
        Ok(count)
    }

    /// Adds or replaces a single account.
    pub fn insert(&self, user: User) {
        self.users().insert(user.name.clone(), user);
    }

    /// Looks up an account by name.
    ///
    /// `anonymous` resolves to the synthetic read-only account when
    /// the policy allows it and no explicit record shadows it.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<User> {
        if let Some(user) = self.users().get(name).cloned() {
            return Some(user);
        }
        if name == ANONYMOUS && self.anonymous_enabled {
            return Some(User {
                name: ANONYMOUS.to_string(),
                password_digest: None,
                home: self.anonymous_home.clone(),
                permissions: Permissions::READ,
            });
        }
        None
    }

    /// Verifies a password against the stored digest.
    ///
    /// Anonymous accepts any password (clients conventionally send an
    /// email address).
    #[must_use]
    pub fn verify(&self, name: &str, password: &str) -> bool {
        match self.lookup(name) {
            Some(user) => match user.password_digest {
                Some(stored) => stored == password_digest(password),
                None => true,
            },
            None => false,
        }
    }
}

fn parse_record(line: &str) -> Option<User> {
    let mut fields = line.splitn(4, ':');
    let name = fields.next()?.trim();
    let digest = fields.next()?.trim();
    let home = fields.next()?.trim();
    let perms = fields.next()?.trim();

    if name.is_empty() || name.contains(char::is_whitespace) {
        return None;
    }
    if digest.len() != 64 || !digest.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    if !home.starts_with('/') {
        return None;
    }
    let bits = if let Some(hex) = perms.strip_prefix("0x").or_else(|| perms.strip_prefix("0X")) {
        u8::from_str_radix(hex, 16).ok()?
    } else {
        perms.parse::<u8>().ok()?
    };

    Some(User {
        name: name.to_string(),
        password_digest: Some(digest.to_ascii_lowercase()),
        home: home.to_string(),
        permissions: Permissions::from_bits(bits),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn store() -> UserStore {
        UserStore::new(true, String::from("/pub"))
    }

    #[test]
    fn digest_is_sixty_four_lowercase_hex() {
        let digest = password_digest("secret");
        assert_eq!(digest.len(), 64);
        assert!(digest.bytes().all(|b| b.is_ascii_hexdigit()));
        assert_eq!(digest, digest.to_ascii_lowercase());
    }

    #[test]
    fn load_parses_records_and_skips_garbage() {
        let store = store();
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(file, "# users").expect("write");
        writeln!(file).expect("write");
        writeln!(file, "bob:{}:/home/bob:0x0f", password_digest("hunter2")).expect("write");
        writeln!(file, "eve:{}:/home/eve:255", password_digest("pw")).expect("write");
        writeln!(file, "broken:record").expect("write");
        writeln!(file, "shorty:abcd:/home/shorty:1").expect("write");

        let count = store.load(file.path()).expect("load");
        assert_eq!(count, 2);

        let bob = store.lookup("bob").expect("bob");
        assert_eq!(bob.home, "/home/bob");
        assert!(bob.permissions.contains(Permissions::RENAME));
        assert!(!bob.permissions.is_admin());

        let eve = store.lookup("eve").expect("eve");
        assert_eq!(eve.permissions, Permissions::ALL);
        assert!(store.lookup("broken").is_none());
        assert!(store.lookup("shorty").is_none());
    }

    #[test]
    fn verify_checks_the_digest() {
        let store = store();
        store.insert(User {
            name: String::from("bob"),
            password_digest: Some(password_digest("hunter2")),
            home: String::from("/home/bob"),
            permissions: Permissions::READ,
        });
        assert!(store.verify("bob", "hunter2"));
        assert!(!store.verify("bob", "HUNTER2"));
        assert!(!store.verify("nobody", "x"));
    }

    #[test]
    fn anonymous_follows_policy() {
        let open = store();
        let anon = open.lookup(ANONYMOUS).expect("anonymous");
        assert_eq!(anon.home, "/pub");
        assert_eq!(anon.permissions, Permissions::READ);
        assert!(open.verify(ANONYMOUS, "user@example.com"));

        let closed = UserStore::new(false, String::from("/pub"));
        assert!(closed.lookup(ANONYMOUS).is_none());
        assert!(!closed.verify(ANONYMOUS, "user@example.com"));
    }

    #[test]
    fn permission_bit_arithmetic() {
        let rw = Permissions::from_bits(0x03);
        assert!(rw.contains(Permissions::READ));
        assert!(rw.contains(Permissions::WRITE));
        assert!(!rw.contains(Permissions::DELETE));
        assert!(Permissions::ALL.contains(Permissions::ADMIN));
    }
}
