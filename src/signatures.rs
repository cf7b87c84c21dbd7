//! File signature registry.
//!
//! Every recoverable format is described by its magic-byte header, an
//! optional footer, and a cap on how far a footer search may run. The
//! byte values here are the carving contract: recovered artifacts are
//! only usable if they match what real files of these formats contain.

/// A single file signature (magic bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    pub name: &'static str,
    pub header: &'static [u8],
    /// Empty slice means the format has no recognizable footer.
    pub footer: &'static [u8],
    /// Upper bound for the footer search, in bytes. Unconsulted when
    /// `footer` is empty.
    pub max_file_size: u64,
}

impl Signature {
    pub fn has_footer(&self) -> bool {
        !self.footer.is_empty()
    }

    /// Header bytes as spaced uppercase hex, for registry listings.
    pub fn header_hex(&self) -> String {
        self.header
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

const MIB: u64 = 1024 * 1024;

/// The built-in registry. Declaration order is match priority.
pub static SIGNATURES: &[Signature] = &[
    Signature {
        name: "JPEG",
        header: &[0xFF, 0xD8, 0xFF],
        footer: &[0xFF, 0xD9],
        max_file_size: 20 * MIB,
    },
    Signature {
        name: "PNG",
        header: &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A],
        footer: &[0x49, 0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82],
        max_file_size: 50 * MIB,
    },
    Signature {
        name: "PDF",
        header: &[0x25, 0x50, 0x44, 0x46],
        // %%EOF. Raw streams often carry several of these; the first one
        // terminates the carve.
        footer: &[0x25, 0x25, 0x45, 0x4F, 0x46],
        max_file_size: 100 * MIB,
    },
    Signature {
        name: "ZIP/Jar/Docx",
        header: &[0x50, 0x4B, 0x03, 0x04],
        // End of central directory record.
        footer: &[0x50, 0x4B, 0x05, 0x06],
        max_file_size: 500 * MIB,
    },
    Signature {
        name: "ELF",
        header: &[0x7F, 0x45, 0x4C, 0x46],
        footer: &[],
        max_file_size: 0,
    },
    Signature {
        name: "Mach-O (64-bit)",
        header: &[0xCF, 0xFA, 0xED, 0xFE],
        footer: &[],
        max_file_size: 0,
    },
];

/// Matches `prefix` against the built-in registry.
///
/// Returns the first signature, in declaration order, whose header is a
/// prefix of the buffer. Headers longer than the buffer cannot match, so
/// short buffers (including empty ones) are accepted.
pub fn match_signature(prefix: &[u8]) -> Option<&'static Signature> {
    match_signature_in(SIGNATURES, prefix)
}

/// Same match over a caller-supplied registry slice.
pub fn match_signature_in<'a>(registry: &'a [Signature], prefix: &[u8]) -> Option<&'a Signature> {
    registry
        .iter()
        .find(|sig| prefix.len() >= sig.header.len() && prefix[..sig.header.len()] == *sig.header)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jpeg_match() {
        let sig = match_signature(&[0xFF, 0xD8, 0xFF, 0xE0]).unwrap();
        assert_eq!(sig.name, "JPEG");
    }

    #[test]
    fn test_png_match() {
        let sig = match_signature(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]).unwrap();
        assert_eq!(sig.name, "PNG");
    }

    #[test]
    fn test_pdf_match() {
        let sig = match_signature(&[0x25, 0x50, 0x44, 0x46, 0x2D]).unwrap();
        assert_eq!(sig.name, "PDF");
    }

    #[test]
    fn test_no_match_for_unknown_data() {
        assert!(match_signature(&[0x00, 0x01, 0x02]).is_none());
    }

    #[test]
    fn test_short_buffer_cannot_match_longer_header() {
        // One byte of a JPEG header is not a JPEG.
        assert!(match_signature(&[0xFF]).is_none());
        assert!(match_signature(&[]).is_none());
    }

    #[test]
    fn test_match_is_deterministic() {
        let buf = [0x50, 0x4B, 0x03, 0x04, 0x14, 0x00];
        let first = match_signature(&buf).unwrap();
        let second = match_signature(&buf).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.name, "ZIP/Jar/Docx");
    }

    #[test]
    fn test_declaration_order_wins() {
        // Two synthetic signatures that both match the same prefix; the
        // one declared first must win.
        static AMBIGUOUS: &[Signature] = &[
            Signature {
                name: "broad",
                header: &[0xAA],
                footer: &[],
                max_file_size: 0,
            },
            Signature {
                name: "narrow",
                header: &[0xAA, 0xBB],
                footer: &[],
                max_file_size: 0,
            },
        ];
        let sig = match_signature_in(AMBIGUOUS, &[0xAA, 0xBB, 0xCC]).unwrap();
        assert_eq!(sig.name, "broad");
    }

    #[test]
    fn test_footer_invariant() {
        for sig in SIGNATURES {
            if sig.has_footer() {
                assert!(sig.max_file_size > 0, "{} has footer but no cap", sig.name);
            }
        }
    }

    #[test]
    fn test_header_hex() {
        let jpeg = &SIGNATURES[0];
        assert_eq!(jpeg.header_hex(), "FF D8 FF");
    }
}
