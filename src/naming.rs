use sha2::{Digest, Sha256};

/// Maximum length of a DNS-1123 label
pub const MAX_NAME_LENGTH: usize = 63;

const HASH_LENGTH: usize = 10;

/// Join `parts` into a name which fits a DNS-1123 label.
///
/// The readable prefix is lowercased, every character outside `[a-z0-9-]`
/// becomes `-`, and it is truncated and trimmed to start and end
/// alphanumeric. A digest of the original parts is always appended. The
/// digest input length-prefixes every part, so `["a-b", "c"]` and
/// `["a", "b-c"]` produce different names even though their readable
/// prefixes are equal.
pub fn safe_concat_name(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.len().to_be_bytes());
        hasher.update(part.as_bytes());
    }
    let digest = hex::encode(hasher.finalize());

    let prefix: String = parts
        .join("-")
        .chars()
        .map(|c| match c.to_ascii_lowercase() {
            c @ ('a'..='z' | '0'..='9') => c,
            _ => '-',
        })
        .skip_while(|c| *c == '-')
        .take(MAX_NAME_LENGTH - HASH_LENGTH - 1)
        .collect();
    let prefix = prefix.trim_end_matches('-');

    match prefix.is_empty() {
        true => digest[..HASH_LENGTH].to_string(),
        false => format!("{prefix}-{}", &digest[..HASH_LENGTH]),
    }
}
