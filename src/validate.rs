use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::classify::ClassifiedRegion;
use crate::entropy::normalized_entropy;
use crate::error::{Result, ScanError};
use crate::io::BlockReader;
use crate::signatures::{ContainerFormat, SignatureRegistry};

const LUKS_MAGIC: [u8; 6] = [0x4C, 0x55, 0x4B, 0x53, 0xBA, 0xBE];

const LUKS1_HEADER_LEN: usize = 592;
const LUKS1_KEYSLOT_BASE: usize = 208;
const LUKS1_KEYSLOT_STRIDE: usize = 48;
const LUKS1_KEYSLOT_ACTIVE: u32 = 0x00AC_71F3;
const LUKS1_KEYSLOT_INACTIVE: u32 = 0x0000_DEAD;

const LUKS2_MIN_HDR_SIZE: u64 = 16 * 1024;
const LUKS2_MAX_HDR_SIZE: u64 = 4 * 1024 * 1024;
const LUKS2_CSUM_OFFSET: usize = 448;
const LUKS2_CSUM_LEN: usize = 64;

const FVE_OEM_ID: &[u8; 8] = b"-FVE-FS-";

const VC_SALT_LEN: usize = 64;
const VC_SALT_MIN_ENTROPY: f64 = 0.65;
const VC_ZERO_RUN_LIMIT: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Pass,
    Fail,
    /// The check could not be evaluated (missing bytes, encrypted fields).
    /// Not a failure: absent evidence never rejects a region.
    Indeterminate,
}

/// One executed structural check, kept for the audit trail. A verdict
/// without its audit trail is not usable evidence.
#[derive(Debug, Clone, Serialize)]
pub struct CheckOutcome {
    pub name: &'static str,
    pub status: CheckStatus,
    pub detail: String,
}

impl CheckOutcome {
    fn pass(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            status: CheckStatus::Pass,
            detail: detail.into(),
        }
    }

    fn fail(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            status: CheckStatus::Fail,
            detail: detail.into(),
        }
    }

    fn indeterminate(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            status: CheckStatus::Indeterminate,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VerdictKind {
    Confirmed,
    Rejected,
    Inconclusive,
}

#[derive(Debug, Clone)]
pub struct Verdict {
    pub kind: VerdictKind,
    pub checks: Vec<CheckOutcome>,
}

/// Verdict keyed by the region it belongs to, for the join performed by the
/// finding record builder.
#[derive(Debug, Clone)]
pub struct VerdictReport {
    pub region_start: u64,
    pub verdict: Verdict,
}

/// Runs format-specific structural checks against labeled regions.
///
/// Checks apply in a fixed order and short-circuit: the first definitive
/// failure rejects the region, the first indeterminate outcome stops the
/// chain as inconclusive. `Unknown` regions never enter format checks and
/// are always inconclusive. Each check is a pure function of fetched bytes;
/// the validator only decides which windows to fetch.
pub struct Validator<'r> {
    registry: &'r SignatureRegistry,
}

impl<'r> Validator<'r> {
    pub fn new(registry: &'r SignatureRegistry) -> Self {
        Self { registry }
    }

    pub fn validate(
        &self,
        reader: &mut BlockReader,
        classified: &ClassifiedRegion,
    ) -> Result<VerdictReport> {
        let region = &classified.region;
        let format = classified.label.format;

        if format == ContainerFormat::Unknown {
            return Ok(VerdictReport {
                region_start: region.start,
                verdict: Verdict {
                    kind: VerdictKind::Inconclusive,
                    checks: Vec::new(),
                },
            });
        }

        let spec = self.registry.spec(format).ok_or_else(|| {
            ScanError::InternalConsistency(format!(
                "region at {} labeled {} but the registry has no such format",
                region.start, format
            ))
        })?;

        let mut outcomes = Vec::new();

        // Checks read at the container start the classifier derived from the
        // anchored hits, which need not coincide with the block-aligned
        // region start.
        let start = classified.container_start;

        // The smallest possible container of this format must fit between
        // its first byte and the end of the image; if the image ends first
        // the evidence is cut off, which is not a rejection.
        let available = reader.len().saturating_sub(start);
        if available < spec.min_region_len {
            outcomes.push(CheckOutcome::indeterminate(
                "min-extent",
                format!(
                    "image ends {} bytes after container start; smallest {} container is {} bytes",
                    available, format, spec.min_region_len
                ),
            ));
        } else {
            outcomes.push(CheckOutcome::pass(
                "min-extent",
                format!("{available} bytes available from container start"),
            ));
        }

        if outcomes.last().map(|o| o.status) == Some(CheckStatus::Pass) {
            match format {
                ContainerFormat::Luks1 => {
                    let probe = reader.read_at(start, LUKS1_HEADER_LEN)?;
                    outcomes.extend(luks1_checks(&probe));
                }
                ContainerFormat::Luks2 => {
                    luks2_checks(reader, start, &mut outcomes)?;
                }
                ContainerFormat::BitLocker => {
                    let probe = reader.read_at(start, 512)?;
                    outcomes.extend(bitlocker_checks(&probe));
                }
                ContainerFormat::VeraCrypt => {
                    let probe = reader.read_at(start, 512)?;
                    outcomes.extend(veracrypt_checks(&probe));
                }
                ContainerFormat::Unknown => unreachable!("handled above"),
            }
        }

        Ok(VerdictReport {
            region_start: region.start,
            verdict: settle(outcomes),
        })
    }
}

fn settle(checks: Vec<CheckOutcome>) -> Verdict {
    let kind = match checks.last().map(|o| o.status) {
        Some(CheckStatus::Pass) => VerdictKind::Confirmed,
        Some(CheckStatus::Fail) => VerdictKind::Rejected,
        Some(CheckStatus::Indeterminate) | None => VerdictKind::Inconclusive,
    };
    Verdict { kind, checks }
}

fn be_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([bytes[offset], bytes[offset + 1]])
}

fn be_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

fn be_u64(bytes: &[u8], offset: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[offset..offset + 8]);
    u64::from_be_bytes(raw)
}

/// Null-terminated printable ASCII field, as LUKS stores cipher and hash
/// names. Returns None when empty or containing non-printable bytes.
fn ascii_field(bytes: &[u8]) -> Option<&str> {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    if end == 0 {
        return None;
    }
    let field = &bytes[..end];
    if field.iter().all(|b| b.is_ascii_graphic()) {
        std::str::from_utf8(field).ok()
    } else {
        None
    }
}

fn luks1_checks(probe: &[u8]) -> Vec<CheckOutcome> {
    let mut out = Vec::new();

    if probe.len() < LUKS1_HEADER_LEN {
        out.push(CheckOutcome::indeterminate(
            "luks1-header-present",
            format!(
                "only {} of {} header bytes readable",
                probe.len(),
                LUKS1_HEADER_LEN
            ),
        ));
        return out;
    }
    out.push(CheckOutcome::pass("luks1-header-present", "592-byte phdr readable"));

    if probe[..6] != LUKS_MAGIC {
        out.push(CheckOutcome::fail("luks1-magic", "LUKS magic missing"));
        return out;
    }
    out.push(CheckOutcome::pass("luks1-magic", "LUKS magic present"));

    let version = be_u16(probe, 6);
    if version != 1 {
        out.push(CheckOutcome::fail(
            "luks1-version",
            format!("version field is {version}, expected 1"),
        ));
        return out;
    }
    out.push(CheckOutcome::pass("luks1-version", "version 1"));

    let cipher = ascii_field(&probe[8..40]);
    let mode = ascii_field(&probe[40..72]);
    let hash = ascii_field(&probe[72..104]);
    match (cipher, mode, hash) {
        (Some(c), Some(m), Some(h)) => {
            out.push(CheckOutcome::pass(
                "luks1-cipher-fields",
                format!("cipher={c} mode={m} hash={h}"),
            ));
        }
        _ => {
            out.push(CheckOutcome::fail(
                "luks1-cipher-fields",
                "cipher/mode/hash fields are not printable null-terminated ASCII",
            ));
            return out;
        }
    }

    let key_bytes = be_u32(probe, 108);
    if !(16..=256).contains(&key_bytes) {
        out.push(CheckOutcome::fail(
            "luks1-key-bytes",
            format!("master key length {key_bytes} outside 16..=256"),
        ));
        return out;
    }
    out.push(CheckOutcome::pass(
        "luks1-key-bytes",
        format!("master key length {key_bytes}"),
    ));

    let iterations = be_u32(probe, 164);
    if iterations < 1000 {
        out.push(CheckOutcome::fail(
            "luks1-iteration-floor",
            format!("PBKDF2 iteration count {iterations} below 1000"),
        ));
        return out;
    }
    out.push(CheckOutcome::pass(
        "luks1-iteration-floor",
        format!("{iterations} PBKDF2 iterations"),
    ));

    for slot in 0..8usize {
        let state = be_u32(probe, LUKS1_KEYSLOT_BASE + slot * LUKS1_KEYSLOT_STRIDE);
        if state != LUKS1_KEYSLOT_ACTIVE && state != LUKS1_KEYSLOT_INACTIVE {
            out.push(CheckOutcome::fail(
                "luks1-keyslot-states",
                format!("keyslot {slot} state {state:#010x} is neither active nor dead"),
            ));
            return out;
        }
    }
    out.push(CheckOutcome::pass(
        "luks1-keyslot-states",
        "all 8 keyslot state markers valid",
    ));

    out
}

fn luks2_checks(
    reader: &mut BlockReader,
    start: u64,
    out: &mut Vec<CheckOutcome>,
) -> Result<()> {
    let probe = reader.read_at(start, 512)?;
    if probe.len() < 512 {
        out.push(CheckOutcome::indeterminate(
            "luks2-header-present",
            format!("only {} of 512 binary header bytes readable", probe.len()),
        ));
        return Ok(());
    }
    out.push(CheckOutcome::pass(
        "luks2-header-present",
        "binary header readable",
    ));

    if probe[..6] != LUKS_MAGIC {
        out.push(CheckOutcome::fail("luks2-magic", "LUKS magic missing"));
        return Ok(());
    }
    out.push(CheckOutcome::pass("luks2-magic", "LUKS magic present"));

    let version = be_u16(&probe, 6);
    if version != 2 {
        out.push(CheckOutcome::fail(
            "luks2-version",
            format!("version field is {version}, expected 2"),
        ));
        return Ok(());
    }
    out.push(CheckOutcome::pass("luks2-version", "version 2"));

    let hdr_size = be_u64(&probe, 8);
    if !(LUKS2_MIN_HDR_SIZE..=LUKS2_MAX_HDR_SIZE).contains(&hdr_size) || hdr_size % 4096 != 0 {
        out.push(CheckOutcome::fail(
            "luks2-header-size",
            format!("hdr_size {hdr_size} outside 16 KiB..4 MiB or unaligned"),
        ));
        return Ok(());
    }
    out.push(CheckOutcome::pass(
        "luks2-header-size",
        format!("hdr_size {hdr_size}"),
    ));

    let alg = match ascii_field(&probe[72..104]) {
        Some(alg) if matches!(alg, "sha256" | "sha512" | "sha1") => {
            out.push(CheckOutcome::pass(
                "luks2-checksum-alg",
                format!("checksum algorithm {alg}"),
            ));
            alg.to_owned()
        }
        Some(alg) => {
            out.push(CheckOutcome::fail(
                "luks2-checksum-alg",
                format!("unrecognized checksum algorithm {alg:?}"),
            ));
            return Ok(());
        }
        None => {
            out.push(CheckOutcome::fail(
                "luks2-checksum-alg",
                "checksum algorithm field is not printable ASCII",
            ));
            return Ok(());
        }
    };

    let full = reader.read_at(start, hdr_size as usize)?;
    if full.len() < hdr_size as usize {
        out.push(CheckOutcome::indeterminate(
            "luks2-header-checksum",
            format!(
                "header claims {hdr_size} bytes but only {} are readable",
                full.len()
            ),
        ));
        return Ok(());
    }
    if alg != "sha256" {
        out.push(CheckOutcome::indeterminate(
            "luks2-header-checksum",
            format!("{alg} checksum verification not supported"),
        ));
        return Ok(());
    }

    // The stored checksum is computed over the whole header area with its
    // own field zeroed.
    let mut hasher = Sha256::new();
    hasher.update(&full[..LUKS2_CSUM_OFFSET]);
    hasher.update([0u8; LUKS2_CSUM_LEN]);
    hasher.update(&full[LUKS2_CSUM_OFFSET + LUKS2_CSUM_LEN..]);
    let computed = hasher.finalize();

    let stored = &full[LUKS2_CSUM_OFFSET..LUKS2_CSUM_OFFSET + 32];
    if computed.as_slice() == stored {
        out.push(CheckOutcome::pass(
            "luks2-header-checksum",
            "stored SHA-256 matches recomputed header digest",
        ));
    } else {
        out.push(CheckOutcome::fail(
            "luks2-header-checksum",
            format!(
                "stored {} != computed {}",
                hex::encode(stored),
                hex::encode(computed)
            ),
        ));
    }
    Ok(())
}

fn bitlocker_checks(probe: &[u8]) -> Vec<CheckOutcome> {
    let mut out = Vec::new();

    if probe.len() < 512 {
        out.push(CheckOutcome::indeterminate(
            "fve-header-present",
            format!("only {} of 512 volume header bytes readable", probe.len()),
        ));
        return out;
    }
    out.push(CheckOutcome::pass("fve-header-present", "volume header readable"));

    if probe[0] != 0xEB || probe[2] != 0x90 {
        out.push(CheckOutcome::fail(
            "fve-jump",
            format!("boot jump bytes {:02x} ?? {:02x} invalid", probe[0], probe[2]),
        ));
        return out;
    }
    out.push(CheckOutcome::pass("fve-jump", "boot jump instruction present"));

    if &probe[3..11] != FVE_OEM_ID {
        out.push(CheckOutcome::fail("fve-oem-id", "-FVE-FS- OEM id missing"));
        return out;
    }
    out.push(CheckOutcome::pass("fve-oem-id", "-FVE-FS- OEM id present"));

    let sector_size = u16::from_le_bytes([probe[11], probe[12]]);
    if !matches!(sector_size, 512 | 1024 | 2048 | 4096) {
        out.push(CheckOutcome::fail(
            "fve-sector-size",
            format!("bytes per sector {sector_size} not a legal value"),
        ));
        return out;
    }
    out.push(CheckOutcome::pass(
        "fve-sector-size",
        format!("{sector_size} bytes per sector"),
    ));

    let spc = probe[13];
    if spc == 0 || spc > 128 || !spc.is_power_of_two() {
        out.push(CheckOutcome::fail(
            "fve-cluster-size",
            format!("sectors per cluster {spc} not a power of two in 1..=128"),
        ));
        return out;
    }
    out.push(CheckOutcome::pass(
        "fve-cluster-size",
        format!("{spc} sectors per cluster"),
    ));

    out
}

fn veracrypt_checks(probe: &[u8]) -> Vec<CheckOutcome> {
    let mut out = Vec::new();

    if probe.len() < VC_SALT_LEN {
        out.push(CheckOutcome::indeterminate(
            "vc-salt-present",
            format!("only {} of {} salt bytes readable", probe.len(), VC_SALT_LEN),
        ));
        return out;
    }
    out.push(CheckOutcome::pass("vc-salt-present", "64-byte salt readable"));

    let salt_entropy = normalized_entropy(&probe[..VC_SALT_LEN]);
    if salt_entropy < VC_SALT_MIN_ENTROPY {
        out.push(CheckOutcome::fail(
            "vc-salt-randomness",
            format!("salt entropy {salt_entropy:.3} below {VC_SALT_MIN_ENTROPY}"),
        ));
        return out;
    }
    out.push(CheckOutcome::pass(
        "vc-salt-randomness",
        format!("salt entropy {salt_entropy:.3}"),
    ));

    let mut zero_run = 0usize;
    let mut longest = 0usize;
    for &b in probe {
        if b == 0 {
            zero_run += 1;
            longest = longest.max(zero_run);
        } else {
            zero_run = 0;
        }
    }
    if longest >= VC_ZERO_RUN_LIMIT {
        out.push(CheckOutcome::fail(
            "vc-zero-run",
            format!("{longest}-byte zero run inside encrypted header area"),
        ));
        return out;
    }
    out.push(CheckOutcome::pass(
        "vc-zero-run",
        format!("longest zero run {longest} bytes"),
    ));

    // Everything past the salt is ciphertext; without key material no field
    // can be decoded, so confirmation is impossible by design.
    out.push(CheckOutcome::indeterminate(
        "vc-encrypted-header",
        "header fields are encrypted; verification requires key material",
    ));

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::CandidateRegion;
    use crate::classify::FormatLabel;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn image_with(data: &[u8]) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(data).unwrap();
        f.flush().unwrap();
        f
    }

    fn classified(
        start: u64,
        end: u64,
        format: ContainerFormat,
    ) -> ClassifiedRegion {
        ClassifiedRegion {
            region: CandidateRegion {
                start,
                end,
                mean_entropy: 0.95,
                peak_entropy: 0.99,
                hits: Vec::new(),
                truncated: false,
            },
            label: FormatLabel {
                format,
                confidence: 0.9,
            },
            container_start: start,
        }
    }

    fn write_ascii(buf: &mut [u8], offset: usize, text: &str) {
        buf[offset..offset + text.len()].copy_from_slice(text.as_bytes());
    }

    pub fn luks1_header() -> Vec<u8> {
        let mut h = vec![0u8; LUKS1_HEADER_LEN];
        h[..6].copy_from_slice(&LUKS_MAGIC);
        h[6..8].copy_from_slice(&1u16.to_be_bytes());
        write_ascii(&mut h, 8, "aes");
        write_ascii(&mut h, 40, "xts-plain64");
        write_ascii(&mut h, 72, "sha256");
        h[104..108].copy_from_slice(&4096u32.to_be_bytes()); // payload offset
        h[108..112].copy_from_slice(&64u32.to_be_bytes()); // key bytes
        h[164..168].copy_from_slice(&250_000u32.to_be_bytes()); // iterations
        for slot in 0..8usize {
            let state = if slot == 0 {
                LUKS1_KEYSLOT_ACTIVE
            } else {
                LUKS1_KEYSLOT_INACTIVE
            };
            let at = LUKS1_KEYSLOT_BASE + slot * LUKS1_KEYSLOT_STRIDE;
            h[at..at + 4].copy_from_slice(&state.to_be_bytes());
        }
        h
    }

    pub fn luks2_header(hdr_size: usize) -> Vec<u8> {
        let mut h = vec![0u8; hdr_size];
        h[..6].copy_from_slice(&LUKS_MAGIC);
        h[6..8].copy_from_slice(&2u16.to_be_bytes());
        h[8..16].copy_from_slice(&(hdr_size as u64).to_be_bytes());
        h[16..24].copy_from_slice(&3u64.to_be_bytes()); // seqid
        write_ascii(&mut h, 72, "sha256");
        write_ascii(&mut h, 168, "f6f2bcbb-0001-4b6e-9d2f-0d8c2e6cdd10");
        // JSON metadata area begins after the 4096-byte binary header.
        write_ascii(&mut h, 4096, r#"{"config":{},"keyslots":{},"segments":{}}"#);

        let mut hasher = Sha256::new();
        hasher.update(&h[..LUKS2_CSUM_OFFSET]);
        hasher.update([0u8; LUKS2_CSUM_LEN]);
        hasher.update(&h[LUKS2_CSUM_OFFSET + LUKS2_CSUM_LEN..]);
        let digest = hasher.finalize();
        h[LUKS2_CSUM_OFFSET..LUKS2_CSUM_OFFSET + 32].copy_from_slice(&digest);
        h
    }

    pub fn bitlocker_header() -> Vec<u8> {
        let mut h = vec![0u8; 512];
        h[0] = 0xEB;
        h[1] = 0x58;
        h[2] = 0x90;
        h[3..11].copy_from_slice(FVE_OEM_ID);
        h[11..13].copy_from_slice(&512u16.to_le_bytes());
        h[13] = 8;
        h
    }

    fn validate_with(image: &[u8], classified: &ClassifiedRegion) -> VerdictReport {
        let registry = SignatureRegistry::builtin().unwrap();
        let validator = Validator::new(&registry);
        let img = image_with(image);
        let mut reader = BlockReader::open(img.path(), 4096).unwrap();
        validator.validate(&mut reader, classified).unwrap()
    }

    fn validate_image(
        image: &[u8],
        start: u64,
        end: u64,
        format: ContainerFormat,
    ) -> VerdictReport {
        validate_with(image, &classified(start, end, format))
    }

    fn failing_check(verdict: &Verdict) -> &str {
        verdict
            .checks
            .iter()
            .find(|c| c.status == CheckStatus::Fail)
            .map(|c| c.name)
            .unwrap_or("")
    }

    #[test]
    fn valid_luks1_header_is_confirmed() {
        let mut image = luks1_header();
        image.resize(8192, 0);
        let report = validate_image(&image, 0, 8192, ContainerFormat::Luks1);
        assert_eq!(report.verdict.kind, VerdictKind::Confirmed);
        assert!(report.verdict.checks.iter().all(|c| c.status == CheckStatus::Pass));
    }

    #[test]
    fn header_off_the_block_boundary_is_checked_at_the_container_start() {
        // Legacy partition alignment: the header sits at sector 1 while the
        // surrounding region opens at block 0.
        let mut image = vec![0u8; 512];
        image.extend_from_slice(&luks1_header());
        image.resize(16384, 0);

        let mut c = classified(0, 16384, ContainerFormat::Luks1);
        c.container_start = 512;
        let report = validate_with(&image, &c);
        assert_eq!(report.verdict.kind, VerdictKind::Confirmed);
        assert_eq!(report.region_start, 0);
    }

    #[test]
    fn luks1_bad_version_is_rejected_naming_the_check() {
        let mut image = luks1_header();
        image[6..8].copy_from_slice(&9u16.to_be_bytes());
        image.resize(8192, 0);
        let report = validate_image(&image, 0, 8192, ContainerFormat::Luks1);
        assert_eq!(report.verdict.kind, VerdictKind::Rejected);
        assert_eq!(failing_check(&report.verdict), "luks1-version");
    }

    #[test]
    fn luks1_corrupt_keyslot_is_rejected() {
        let mut image = luks1_header();
        image[LUKS1_KEYSLOT_BASE..LUKS1_KEYSLOT_BASE + 4]
            .copy_from_slice(&0xFFFF_FFFFu32.to_be_bytes());
        image.resize(8192, 0);
        let report = validate_image(&image, 0, 8192, ContainerFormat::Luks1);
        assert_eq!(report.verdict.kind, VerdictKind::Rejected);
        assert_eq!(failing_check(&report.verdict), "luks1-keyslot-states");
    }

    #[test]
    fn valid_luks2_header_is_confirmed() {
        let mut image = luks2_header(16384);
        image.resize(64 * 1024, 0);
        let report = validate_image(&image, 0, 64 * 1024, ContainerFormat::Luks2);
        assert_eq!(report.verdict.kind, VerdictKind::Confirmed);
    }

    #[test]
    fn luks2_checksum_mismatch_is_rejected_naming_the_check() {
        let mut image = luks2_header(16384);
        image[5000] ^= 0xFF; // corrupt the JSON area, magic stays intact
        image.resize(64 * 1024, 0);
        let report = validate_image(&image, 0, 64 * 1024, ContainerFormat::Luks2);
        assert_eq!(report.verdict.kind, VerdictKind::Rejected);
        assert_eq!(failing_check(&report.verdict), "luks2-header-checksum");
    }

    #[test]
    fn image_truncated_before_minimum_container_is_inconclusive() {
        // Image ends 6 KiB after the header start; the smallest LUKS2
        // container is 32 KiB.
        let image = luks2_header(16384)[..6144].to_vec();
        let report = validate_image(&image, 0, 6144, ContainerFormat::Luks2);
        assert_eq!(report.verdict.kind, VerdictKind::Inconclusive);
        assert_eq!(report.verdict.checks[0].name, "min-extent");
        assert_eq!(
            report.verdict.checks[0].status,
            CheckStatus::Indeterminate
        );
    }

    #[test]
    fn valid_bitlocker_header_is_confirmed() {
        let mut image = bitlocker_header();
        image.resize(128 * 1024, 0);
        let report = validate_image(&image, 0, 128 * 1024, ContainerFormat::BitLocker);
        assert_eq!(report.verdict.kind, VerdictKind::Confirmed);
    }

    #[test]
    fn bitlocker_bad_sector_size_is_rejected() {
        let mut image = bitlocker_header();
        image[11..13].copy_from_slice(&777u16.to_le_bytes());
        image.resize(128 * 1024, 0);
        let report = validate_image(&image, 0, 128 * 1024, ContainerFormat::BitLocker);
        assert_eq!(report.verdict.kind, VerdictKind::Rejected);
        assert_eq!(failing_check(&report.verdict), "fve-sector-size");
    }

    #[test]
    fn veracrypt_with_random_salt_is_inconclusive_by_design() {
        let mut image = vec![0u8; 512 * 1024];
        let mut state = 0x1234_5678_9ABC_DEFu64;
        for b in image.iter_mut() {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            *b = state as u8;
        }
        let report = validate_image(&image, 0, 512 * 1024, ContainerFormat::VeraCrypt);
        assert_eq!(report.verdict.kind, VerdictKind::Inconclusive);
        let last = report.verdict.checks.last().unwrap();
        assert_eq!(last.name, "vc-encrypted-header");
        assert_eq!(last.status, CheckStatus::Indeterminate);
    }

    #[test]
    fn veracrypt_with_zeroed_salt_is_rejected() {
        let image = vec![0u8; 512 * 1024];
        let report = validate_image(&image, 0, 512 * 1024, ContainerFormat::VeraCrypt);
        assert_eq!(report.verdict.kind, VerdictKind::Rejected);
        assert_eq!(failing_check(&report.verdict), "vc-salt-randomness");
    }

    #[test]
    fn unknown_regions_skip_checks_and_stay_inconclusive() {
        let image = vec![0u8; 8192];
        let report = validate_image(&image, 0, 8192, ContainerFormat::Unknown);
        assert_eq!(report.verdict.kind, VerdictKind::Inconclusive);
        assert!(report.verdict.checks.is_empty());
    }
}
