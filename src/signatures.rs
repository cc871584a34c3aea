use std::collections::HashSet;
use std::fmt;

use aho_corasick::AhoCorasick;
use serde::Serialize;

use crate::error::{Result, ScanError};

/// Shortest wildcard-free pattern prefix the automaton will anchor on.
const MIN_PREFIX_LEN: usize = 4;

/// Known encrypted-container formats plus the retained-for-review label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerFormat {
    Luks1,
    Luks2,
    BitLocker,
    VeraCrypt,
    Unknown,
}

impl fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ContainerFormat::Luks1 => "luks1",
            ContainerFormat::Luks2 => "luks2",
            ContainerFormat::BitLocker => "bitlocker",
            ContainerFormat::VeraCrypt => "veracrypt",
            ContainerFormat::Unknown => "unknown",
        };
        write!(f, "{name}")
    }
}

/// Where a pattern sits relative to the container it marks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    /// Pattern begins `delta` bytes after the container's first byte.
    RegionStart(u64),
    /// Pattern begins `delta` bytes before the container's last byte.
    RegionEnd(u64),
    /// Pattern only counts at this absolute image offset.
    Absolute(u64),
}

/// One byte pattern with optional don't-care positions.
#[derive(Debug, Clone)]
pub struct SignaturePattern {
    pub id: &'static str,
    bytes: Vec<u8>,
    mask: Vec<bool>,
    pub anchor: Anchor,
}

impl SignaturePattern {
    /// Exact-byte pattern, every position significant.
    pub fn exact(id: &'static str, bytes: Vec<u8>, anchor: Anchor) -> Self {
        let mask = vec![true; bytes.len()];
        Self {
            id,
            bytes,
            mask,
            anchor,
        }
    }

    /// Pattern with explicit don't-care positions (`false` in the mask).
    pub fn masked(id: &'static str, bytes: Vec<u8>, mask: Vec<bool>, anchor: Anchor) -> Self {
        Self {
            id,
            bytes,
            mask,
            anchor,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    fn prefix_len(&self) -> usize {
        self.mask.iter().take_while(|&&m| m).count()
    }

    fn matches(&self, window: &[u8]) -> bool {
        window.len() == self.bytes.len()
            && self
                .bytes
                .iter()
                .zip(&self.mask)
                .zip(window)
                .all(|((b, &m), w)| !m || b == w)
    }
}

/// Static description of one container format.
#[derive(Debug, Clone)]
pub struct FormatSpec {
    pub format: ContainerFormat,
    /// Smallest plausible container of this format, in bytes.
    pub min_region_len: u64,
    pub max_region_len: u64,
    /// Expected aggregate normalized entropy of a region holding this format.
    pub expected_entropy: f64,
    /// May be empty for formats with no plaintext structure (VeraCrypt).
    pub patterns: Vec<SignaturePattern>,
}

/// A pattern observed in the image. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHit {
    pub offset: u64,
    pub format: ContainerFormat,
    pub pattern_id: &'static str,
    pub len: usize,
}

/// Immutable registry of format specs, validated once at construction.
///
/// Matching runs an Aho-Corasick automaton over the wildcard-free prefix of
/// every pattern, then verifies the full masked pattern at each candidate
/// position. Same approach as classic multi-signature carving scanners.
pub struct SignatureRegistry {
    specs: Vec<FormatSpec>,
    automaton: Option<AhoCorasick>,
    /// Automaton pattern index -> (spec index, pattern index).
    pattern_lut: Vec<(usize, usize)>,
    min_region_len: u64,
}

impl SignatureRegistry {
    /// The built-in registry: LUKS1, LUKS2, BitLocker, VeraCrypt.
    ///
    /// VeraCrypt/TrueCrypt volumes carry no stable plaintext signature; the
    /// format is described by its entropy profile alone and surfaces through
    /// entropy-seeded regions.
    pub fn builtin() -> Result<Self> {
        const KB: u64 = 1024;
        const TB: u64 = KB * KB * KB * KB;

        Self::new(vec![
            FormatSpec {
                format: ContainerFormat::Luks1,
                min_region_len: 4 * KB,
                max_region_len: 2 * TB,
                expected_entropy: 0.95,
                patterns: vec![SignaturePattern::exact(
                    "luks1-primary-magic",
                    vec![0x4C, 0x55, 0x4B, 0x53, 0xBA, 0xBE, 0x00, 0x01],
                    Anchor::RegionStart(0),
                )],
            },
            FormatSpec {
                format: ContainerFormat::Luks2,
                min_region_len: 32 * KB,
                max_region_len: 2 * TB,
                expected_entropy: 0.93,
                patterns: vec![
                    SignaturePattern::exact(
                        "luks2-primary-magic",
                        vec![0x4C, 0x55, 0x4B, 0x53, 0xBA, 0xBE, 0x00, 0x02],
                        Anchor::RegionStart(0),
                    ),
                    // Secondary header at the default 16 KiB primary size.
                    SignaturePattern::exact(
                        "luks2-secondary-magic",
                        vec![0x53, 0x4B, 0x55, 0x4C, 0xBA, 0xBE, 0x00, 0x02],
                        Anchor::RegionStart(16 * KB),
                    ),
                ],
            },
            FormatSpec {
                format: ContainerFormat::BitLocker,
                min_region_len: 64 * KB,
                max_region_len: 2 * TB,
                expected_entropy: 0.90,
                patterns: vec![SignaturePattern::exact(
                    "fve-oem-id",
                    b"-FVE-FS-".to_vec(),
                    // OEM id sits 3 bytes into the volume header, after the
                    // jump instruction.
                    Anchor::RegionStart(3),
                )],
            },
            FormatSpec {
                format: ContainerFormat::VeraCrypt,
                min_region_len: 256 * KB,
                max_region_len: 2 * TB,
                expected_entropy: 0.998,
                patterns: Vec::new(),
            },
        ])
    }

    pub fn new(specs: Vec<FormatSpec>) -> Result<Self> {
        Self::validate(&specs)?;

        let mut prefixes: Vec<Vec<u8>> = Vec::new();
        let mut pattern_lut = Vec::new();
        for (spec_idx, spec) in specs.iter().enumerate() {
            for (pat_idx, pattern) in spec.patterns.iter().enumerate() {
                prefixes.push(pattern.bytes[..pattern.prefix_len()].to_vec());
                pattern_lut.push((spec_idx, pat_idx));
            }
        }

        let automaton = if prefixes.is_empty() {
            None
        } else {
            Some(
                AhoCorasick::new(&prefixes)
                    .map_err(|e| ScanError::Registry(format!("automaton build failed: {e}")))?,
            )
        };

        let min_region_len = specs
            .iter()
            .map(|s| s.min_region_len)
            .min()
            .ok_or_else(|| ScanError::Registry("registry defines no formats".into()))?;

        Ok(Self {
            specs,
            automaton,
            pattern_lut,
            min_region_len,
        })
    }

    fn validate(specs: &[FormatSpec]) -> Result<()> {
        let mut seen_ids = HashSet::new();
        let mut seen_defs: Vec<(&[u8], Anchor, ContainerFormat)> = Vec::new();

        for spec in specs {
            if spec.format == ContainerFormat::Unknown {
                return Err(ScanError::Registry(
                    "Unknown is a classifier outcome, not a registrable format".into(),
                ));
            }
            if spec.min_region_len == 0 || spec.min_region_len > spec.max_region_len {
                return Err(ScanError::Registry(format!(
                    "{}: bad region length bounds {}..{}",
                    spec.format, spec.min_region_len, spec.max_region_len
                )));
            }
            for pattern in &spec.patterns {
                if pattern.bytes.is_empty() {
                    return Err(ScanError::Registry(format!(
                        "{}: pattern {:?} has no bytes",
                        spec.format, pattern.id
                    )));
                }
                if pattern.mask.len() != pattern.bytes.len() {
                    return Err(ScanError::Registry(format!(
                        "{}: pattern {:?} mask length mismatch",
                        spec.format, pattern.id
                    )));
                }
                if pattern.prefix_len() < MIN_PREFIX_LEN {
                    return Err(ScanError::Registry(format!(
                        "{}: pattern {:?} needs at least {} leading significant bytes",
                        spec.format, pattern.id, MIN_PREFIX_LEN
                    )));
                }
                if !seen_ids.insert(pattern.id) {
                    return Err(ScanError::Registry(format!(
                        "duplicate pattern id {:?}",
                        pattern.id
                    )));
                }
                for (bytes, anchor, format) in &seen_defs {
                    if *bytes == pattern.bytes.as_slice() && *anchor == pattern.anchor {
                        return Err(ScanError::Registry(format!(
                            "contradictory definitions: {} and {} claim the same pattern",
                            format, spec.format
                        )));
                    }
                }
                seen_defs.push((&pattern.bytes, pattern.anchor, spec.format));
            }
        }
        Ok(())
    }

    #[inline]
    pub fn specs(&self) -> &[FormatSpec] {
        &self.specs
    }

    pub fn spec(&self, format: ContainerFormat) -> Option<&FormatSpec> {
        self.specs.iter().find(|s| s.format == format)
    }

    /// Smallest plausible container across all formats; regions shorter than
    /// this are noise.
    #[inline]
    pub fn min_region_len(&self) -> u64 {
        self.min_region_len
    }

    /// Matches every registered pattern against one block. Hit offsets are
    /// absolute image offsets; `block_offset` is the block's position.
    pub fn match_block(&self, block_offset: u64, data: &[u8]) -> Vec<SignatureHit> {
        let Some(automaton) = &self.automaton else {
            return Vec::new();
        };

        let mut hits = Vec::new();
        for mat in automaton.find_overlapping_iter(data) {
            let (spec_idx, pat_idx) = self.pattern_lut[mat.pattern().as_usize()];
            let spec = &self.specs[spec_idx];
            let pattern = &spec.patterns[pat_idx];

            let start = mat.start();
            let end = start + pattern.len();
            if end > data.len() || !pattern.matches(&data[start..end]) {
                continue;
            }

            let offset = block_offset + start as u64;
            if let Anchor::Absolute(required) = pattern.anchor {
                if offset != required {
                    continue;
                }
            }

            hits.push(SignatureHit {
                offset,
                format: spec.format,
                pattern_id: pattern.id,
                len: pattern.len(),
            });
        }
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_format(patterns: Vec<SignaturePattern>) -> Vec<FormatSpec> {
        vec![FormatSpec {
            format: ContainerFormat::Luks1,
            min_region_len: 4096,
            max_region_len: 1 << 40,
            expected_entropy: 0.95,
            patterns,
        }]
    }

    #[test]
    fn builtin_registry_loads() {
        let registry = SignatureRegistry::builtin().unwrap();
        assert_eq!(registry.specs().len(), 4);
        assert_eq!(registry.min_region_len(), 4096);
        assert!(registry.spec(ContainerFormat::VeraCrypt).is_some());
    }

    #[test]
    fn finds_luks_magic_at_absolute_offset() {
        let registry = SignatureRegistry::builtin().unwrap();
        let mut block = vec![0u8; 4096];
        block[100..108].copy_from_slice(&[0x4C, 0x55, 0x4B, 0x53, 0xBA, 0xBE, 0x00, 0x01]);

        let hits = registry.match_block(8192, &block);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].offset, 8292);
        assert_eq!(hits[0].format, ContainerFormat::Luks1);
        assert_eq!(hits[0].pattern_id, "luks1-primary-magic");
    }

    #[test]
    fn luks_versions_do_not_cross_match() {
        let registry = SignatureRegistry::builtin().unwrap();
        let mut block = vec![0u8; 512];
        block[..8].copy_from_slice(&[0x4C, 0x55, 0x4B, 0x53, 0xBA, 0xBE, 0x00, 0x02]);

        let hits = registry.match_block(0, &block);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].format, ContainerFormat::Luks2);
    }

    #[test]
    fn masked_positions_are_dont_care() {
        let pattern = SignaturePattern::masked(
            "jump-then-oem",
            vec![0xEB, 0x58, 0x90, 0x00, 0x2D, 0x46, 0x56, 0x45],
            vec![true, true, true, true, false, true, true, true],
            Anchor::RegionStart(0),
        );
        let registry = SignatureRegistry::new(single_format(vec![pattern])).unwrap();

        let mut block = vec![0u8; 64];
        block[..8].copy_from_slice(&[0xEB, 0x58, 0x90, 0x00, 0xFF, 0x46, 0x56, 0x45]);
        assert_eq!(registry.match_block(0, &block).len(), 1);

        // A significant position still has to match exactly.
        block[5] = 0x00;
        assert!(registry.match_block(0, &block).is_empty());
    }

    #[test]
    fn absolute_anchor_filters_by_image_offset() {
        let pattern = SignaturePattern::exact(
            "boot-sector-probe",
            vec![0xDE, 0xAD, 0xBE, 0xEF],
            Anchor::Absolute(4096),
        );
        let registry = SignatureRegistry::new(single_format(vec![pattern])).unwrap();

        let mut block = vec![0u8; 512];
        block[..4].copy_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);

        assert_eq!(registry.match_block(4096, &block).len(), 1);
        assert!(registry.match_block(0, &block).is_empty());
    }

    #[test]
    fn rejects_duplicate_pattern_ids() {
        let patterns = vec![
            SignaturePattern::exact("dup", vec![1, 2, 3, 4], Anchor::RegionStart(0)),
            SignaturePattern::exact("dup", vec![5, 6, 7, 8], Anchor::RegionStart(0)),
        ];
        assert!(matches!(
            SignatureRegistry::new(single_format(patterns)),
            Err(ScanError::Registry(_))
        ));
    }

    #[test]
    fn rejects_contradictory_cross_format_definitions() {
        let shared = vec![0xAA, 0xBB, 0xCC, 0xDD];
        let specs = vec![
            FormatSpec {
                format: ContainerFormat::Luks1,
                min_region_len: 4096,
                max_region_len: 1 << 40,
                expected_entropy: 0.95,
                patterns: vec![SignaturePattern::exact(
                    "first",
                    shared.clone(),
                    Anchor::RegionStart(0),
                )],
            },
            FormatSpec {
                format: ContainerFormat::BitLocker,
                min_region_len: 4096,
                max_region_len: 1 << 40,
                expected_entropy: 0.90,
                patterns: vec![SignaturePattern::exact(
                    "second",
                    shared,
                    Anchor::RegionStart(0),
                )],
            },
        ];
        assert!(matches!(
            SignatureRegistry::new(specs),
            Err(ScanError::Registry(_))
        ));
    }

    #[test]
    fn rejects_mask_length_mismatch_and_short_prefix() {
        let bad_mask = SignaturePattern::masked(
            "bad-mask",
            vec![1, 2, 3, 4],
            vec![true, true],
            Anchor::RegionStart(0),
        );
        assert!(matches!(
            SignatureRegistry::new(single_format(vec![bad_mask])),
            Err(ScanError::Registry(_))
        ));

        let short_prefix = SignaturePattern::masked(
            "short-prefix",
            vec![1, 2, 3, 4, 5],
            vec![true, false, true, true, true],
            Anchor::RegionStart(0),
        );
        assert!(matches!(
            SignatureRegistry::new(single_format(vec![short_prefix])),
            Err(ScanError::Registry(_))
        ));
    }

    #[test]
    fn pattern_straddling_block_end_is_not_matched() {
        let registry = SignatureRegistry::builtin().unwrap();
        // Only the first six bytes of the magic fit in this block.
        let mut block = vec![0u8; 64];
        block[58..64].copy_from_slice(&[0x4C, 0x55, 0x4B, 0x53, 0xBA, 0xBE]);
        assert!(registry.match_block(0, &block).is_empty());
    }
}
