use uuid::Uuid;

const HEX: &[u8; 16] = b"0123456789abcdef";

/// Correlation key between emitted placeholder markup and the node it
/// later binds to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlaceholderId(String);

impl PlaceholderId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PlaceholderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Produces `prefix` followed by `suffix_len` random lowercase hex digits.
///
/// Uniqueness is probabilistic only. Ids live for one page and are used for
/// lookup, never for anything security sensitive.
#[derive(Debug, Clone)]
pub struct IdGenerator {
    prefix: String,
    suffix_len: usize,
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new("workbook-", 10)
    }
}

impl IdGenerator {
    pub fn new(prefix: impl Into<String>, suffix_len: usize) -> Self {
        Self {
            prefix: prefix.into(),
            suffix_len,
        }
    }

    pub fn generate(&self) -> PlaceholderId {
        let mut id = String::with_capacity(self.prefix.len() + self.suffix_len);
        id.push_str(&self.prefix);

        let mut remaining = self.suffix_len;
        while remaining > 0 {
            // v4 version/variant bits start at byte 6; the first six bytes
            // are uniformly random.
            let bytes = Uuid::new_v4().into_bytes();
            for nibble in bytes[..6].iter().flat_map(|b| [b >> 4, b & 0x0f]) {
                if remaining == 0 {
                    break;
                }
                id.push(HEX[nibble as usize] as char);
                remaining -= 1;
            }
        }

        PlaceholderId(id)
    }
}
