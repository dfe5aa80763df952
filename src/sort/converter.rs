/// Transforms a string into the bytes that are compared when sorting
pub trait BlobConverter: Send + Sync {
    fn convert(&self, input: &str, out: &mut Vec<u8>);
}

/// Case-insensitive ordering by sorting on the lowercase form
#[derive(Debug, Clone, Copy, Default)]
pub struct LowercaseConverter;

impl BlobConverter for LowercaseConverter {
    fn convert(&self, input: &str, out: &mut Vec<u8>) {
        for c in input.chars().flat_map(char::to_lowercase) {
            let mut utf8 = [0u8; 4];
            out.extend_from_slice(c.encode_utf8(&mut utf8).as_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercase_converter() {
        let mut out = Vec::new();
        LowercaseConverter.convert("ÅbC", &mut out);
        assert_eq!(out, "åbc".as_bytes());
    }
}
