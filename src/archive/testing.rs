//! Byte-level ZIP fixtures for archives `ZipWriter` refuses to produce:
//! wrong checksums and sizes that disagree with the stored data.
//!
//! Every entry is stored uncompressed with an honest local header. Only the
//! central directory, which readers trust for sizes and checksums, is forged.

const LOCAL_HEADER_SIG: u32 = 0x0403_4b50;
const CENTRAL_HEADER_SIG: u32 = 0x0201_4b50;
const END_OF_CENTRAL_DIR_SIG: u32 = 0x0605_4b50;
const ZIP64_EXTRA_ID: u16 = 0x0001;
/// 1980-01-01 in MS-DOS date format.
const DOS_DATE: u16 = (1 << 5) | 1;

pub(crate) struct RawEntry<'a> {
    name: &'a str,
    data: &'a [u8],
    crc32: Option<u32>,
    declared_size: Option<u64>,
}

impl<'a> RawEntry<'a> {
    pub(crate) fn new(name: &'a str, data: &'a [u8]) -> Self {
        Self {
            name,
            data,
            crc32: None,
            declared_size: None,
        }
    }

    /// Record `crc32` in the central directory instead of the real checksum.
    pub(crate) fn with_crc32(mut self, crc32: u32) -> Self {
        self.crc32 = Some(crc32);
        self
    }

    /// Record `size` as the uncompressed size in the central directory.
    /// Sizes from `u32::MAX` up go into a ZIP64 extra field.
    pub(crate) fn declaring_size(mut self, size: u64) -> Self {
        self.declared_size = Some(size);
        self
    }
}

pub(crate) fn build_zip(entries: &[RawEntry<'_>]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut central = Vec::new();

    for entry in entries {
        let offset = out.len() as u32;
        let name = entry.name.as_bytes();
        let len = entry.data.len() as u32;
        let real_crc = crc32(entry.data);

        put_u32(&mut out, LOCAL_HEADER_SIG);
        put_u16(&mut out, 20); // version needed
        put_u16(&mut out, 0); // flags
        put_u16(&mut out, 0); // stored
        put_u16(&mut out, 0);
        put_u16(&mut out, DOS_DATE);
        put_u32(&mut out, real_crc);
        put_u32(&mut out, len);
        put_u32(&mut out, len);
        put_u16(&mut out, name.len() as u16);
        put_u16(&mut out, 0);
        out.extend_from_slice(name);
        out.extend_from_slice(entry.data);

        let declared = entry.declared_size.unwrap_or(u64::from(len));
        let mut extra = Vec::new();
        let central_size = if declared >= u64::from(u32::MAX) {
            put_u16(&mut extra, ZIP64_EXTRA_ID);
            put_u16(&mut extra, 8);
            extra.extend_from_slice(&declared.to_le_bytes());
            u32::MAX
        } else {
            declared as u32
        };

        put_u32(&mut central, CENTRAL_HEADER_SIG);
        put_u16(&mut central, 45); // version made by
        put_u16(&mut central, if extra.is_empty() { 20 } else { 45 });
        put_u16(&mut central, 0);
        put_u16(&mut central, 0);
        put_u16(&mut central, 0);
        put_u16(&mut central, DOS_DATE);
        put_u32(&mut central, entry.crc32.unwrap_or(real_crc));
        put_u32(&mut central, len);
        put_u32(&mut central, central_size);
        put_u16(&mut central, name.len() as u16);
        put_u16(&mut central, extra.len() as u16);
        put_u16(&mut central, 0); // comment
        put_u16(&mut central, 0); // disk
        put_u16(&mut central, 0); // internal attributes
        put_u32(&mut central, 0); // external attributes
        put_u32(&mut central, offset);
        central.extend_from_slice(name);
        central.extend_from_slice(&extra);
    }

    let central_offset = out.len() as u32;
    let central_len = central.len() as u32;
    out.extend_from_slice(&central);

    put_u32(&mut out, END_OF_CENTRAL_DIR_SIG);
    put_u16(&mut out, 0);
    put_u16(&mut out, 0);
    put_u16(&mut out, entries.len() as u16);
    put_u16(&mut out, entries.len() as u16);
    put_u32(&mut out, central_len);
    put_u32(&mut out, central_offset);
    put_u16(&mut out, 0);
    out
}

fn crc32(data: &[u8]) -> u32 {
    let mut crc = !0u32;
    for &byte in data {
        crc ^= u32::from(byte);
        for _ in 0..8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ 0xEDB8_8320
            } else {
                crc >> 1
            };
        }
    }
    !crc
}

fn put_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

#[test]
fn crc32_matches_reference_value() {
    assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
}
