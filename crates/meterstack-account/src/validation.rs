//! Input validation helpers.
//!
//! Bucket-name rules used by the `s3_buckets_only` listing filter, plus the
//! identifier checks shared by every operation.

use std::net::Ipv4Addr;

use crate::error::AccountError;

/// Minimum bucket name length.
const MIN_BUCKET_NAME_LEN: usize = 3;

/// Maximum bucket name length.
const MAX_BUCKET_NAME_LEN: usize = 63;

/// Whether `name` is a valid S3 bucket name.
///
/// The name must be 3 to 63 characters long and made of dot-separated
/// labels of lowercase letters, digits and hyphens, each label starting and
/// ending with a letter or digit. Names shaped like a dotted run of numbers
/// (`192.168.5.4`, `1.2`) are rejected.
///
/// # Examples
///
/// ```
/// use meterstack_account::validation::is_valid_bucket_name;
///
/// assert!(is_valid_bucket_name("my-valid.bucket"));
/// assert!(!is_valid_bucket_name("AB"));
/// assert!(!is_valid_bucket_name("192.168.5.4"));
/// ```
#[must_use]
pub fn is_valid_bucket_name(name: &str) -> bool {
    let len = name.len();
    if !(MIN_BUCKET_NAME_LEN..=MAX_BUCKET_NAME_LEN).contains(&len) {
        return false;
    }

    if name.parse::<Ipv4Addr>().is_ok() || looks_like_dotted_number(name) {
        return false;
    }

    name.split('.').all(is_valid_label)
}

fn is_valid_label(label: &str) -> bool {
    let bytes = label.as_bytes();
    let (Some(first), Some(last)) = (bytes.first(), bytes.last()) else {
        return false;
    };
    let alnum = |b: &u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    alnum(first) && alnum(last) && bytes.iter().all(|b| alnum(b) || *b == b'-')
}

/// `1.2`, `10.0.0.1.5`: at least one dot, only digit runs.
fn looks_like_dotted_number(name: &str) -> bool {
    name.contains('.')
        && name
            .split('.')
            .all(|part| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()))
}

/// Reject an empty identifier.
pub fn require_id(value: &str, what: &str) -> Result<(), AccountError> {
    if value.is_empty() {
        return Err(AccountError::BadRequest(format!("missing {what}")));
    }
    Ok(())
}
