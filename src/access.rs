// 🔐 Access Decision - who may download datasets and edit lookups
//
// Exports, new regions and new aid types are reserved for superusers. The
// export builder never checks this itself; request handlers call
// `privilege_for` first and refuse early.

use sha2::{Digest, Sha256};

use crate::config::AppConfig;

pub const PERMISSION_DENIED: &str = "You do not have permission to download the dataset.";
pub const REGION_PERMISSION_DENIED: &str = "You do not have permission to add a region.";
pub const TYPE_HELP_PERMISSION_DENIED: &str = "You do not have permission to add an aid type.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Privilege {
    Staff,
    Superuser,
}

impl Privilege {
    pub fn is_superuser(self) -> bool {
        self == Privilege::Superuser
    }
}

/// Privilege carried by an `Authorization` header value
///
/// Only `Bearer <admin token>` grants Superuser; with no admin token
/// configured every caller is Staff.
pub fn privilege_for(config: &AppConfig, authorization: Option<&str>) -> Privilege {
    let presented = authorization
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim);

    match (config.admin_token.as_deref(), presented) {
        (Some(expected), Some(token)) if !expected.is_empty() && tokens_match(token, expected) => {
            Privilege::Superuser
        }
        _ => Privilege::Staff,
    }
}

/// Compare fixed-length digests without short-circuiting on the first difference
fn tokens_match(presented: &str, expected: &str) -> bool {
    let presented = Sha256::digest(presented.as_bytes());
    let expected = Sha256::digest(expected.as_bytes());
    presented
        .iter()
        .zip(expected.iter())
        .fold(0u8, |diff, (a, b)| diff | (a ^ b))
        == 0
}
