//! Minimal reader for the legacy compound-file container that underlies
//! pre-2007 Office documents (`.doc`, `.xls`). It exposes only what
//! encryption detection needs: the stream directory and the bytes of a
//! named stream. Anything unreadable surfaces as an error so callers can
//! fail closed instead of passing an opaque file through.

use thiserror::Error;

const SIGNATURE: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

const FREE_SECT: u32 = 0xFFFF_FFFF;
const END_OF_CHAIN: u32 = 0xFFFF_FFFE;
const FAT_SECT: u32 = 0xFFFF_FFFD;
const DIFAT_SECT: u32 = 0xFFFF_FFFC;

const DIR_ENTRY_SIZE: usize = 128;
const MINI_SECTOR_SIZE: usize = 64;

const TYPE_STREAM: u8 = 2;
const TYPE_ROOT: u8 = 5;

/// Streams whose mere presence marks the document as encrypted.
const ENCRYPTION_STREAMS: [&str; 3] = ["encryptedstream", "encryptedpackage", "encryptioninfo"];

/// Offset of the FIB flag byte inside a Word `WordDocument` stream; bit 0
/// is the password-protection flag.
const WORD_FLAGS_OFFSET: usize = 11;
const WORD_ENCRYPTED_BIT: u8 = 0x01;

/// Excel BIFF record tag marking an encrypted workbook.
const FILEPASS_RECORD: u16 = 0x002F;

#[derive(Debug, Error)]
pub enum OleError {
    #[error("not a compound file")]
    BadSignature,
    #[error("compound file is corrupt: {0}")]
    Corrupt(&'static str),
}

struct DirEntry {
    name: String,
    entry_type: u8,
    start_sector: u32,
    size: u64,
}

pub struct CompoundFile<'a> {
    data: &'a [u8],
    sector_size: usize,
    mini_cutoff: u64,
    fat: Vec<u32>,
    mini_fat: Vec<u32>,
    entries: Vec<DirEntry>,
    mini_stream: Vec<u8>,
}

fn u16_at(data: &[u8], offset: usize) -> Result<u16, OleError> {
    data.get(offset..offset + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .ok_or(OleError::Corrupt("unexpected end of data"))
}

fn u32_at(data: &[u8], offset: usize) -> Result<u32, OleError> {
    data.get(offset..offset + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or(OleError::Corrupt("unexpected end of data"))
}

fn u64_at(data: &[u8], offset: usize) -> Result<u64, OleError> {
    data.get(offset..offset + 8)
        .map(|b| u64::from_le_bytes(b.try_into().unwrap()))
        .ok_or(OleError::Corrupt("unexpected end of data"))
}

/// Sector `n` lives at byte offset `(n + 1) * sector_size`; the header
/// occupies the space of sector -1.
fn read_sector(data: &[u8], sector_size: usize, sector: u32) -> Result<&[u8], OleError> {
    let start = (sector as usize)
        .checked_add(1)
        .and_then(|s| s.checked_mul(sector_size))
        .ok_or(OleError::Corrupt("sector offset overflow"))?;
    data.get(start..start + sector_size)
        .ok_or(OleError::Corrupt("sector out of range"))
}

fn read_chain(data: &[u8], sector_size: usize, fat: &[u32], start: u32) -> Result<Vec<u8>, OleError> {
    let mut out = Vec::new();
    let mut sector = start;
    let mut hops = 0usize;
    while sector != END_OF_CHAIN {
        if sector == FREE_SECT || sector == FAT_SECT || sector == DIFAT_SECT {
            return Err(OleError::Corrupt("chain references a non-data sector"));
        }
        hops += 1;
        if hops > fat.len() + 1 {
            return Err(OleError::Corrupt("sector chain cycle"));
        }
        out.extend_from_slice(read_sector(data, sector_size, sector)?);
        sector = *fat
            .get(sector as usize)
            .ok_or(OleError::Corrupt("sector not covered by FAT"))?;
    }
    Ok(out)
}

impl<'a> CompoundFile<'a> {
    pub fn parse(data: &'a [u8]) -> Result<Self, OleError> {
        if data.len() < 512 {
            return Err(OleError::Corrupt("shorter than a header"));
        }
        if data[..8] != SIGNATURE {
            return Err(OleError::BadSignature);
        }

        let sector_shift = u16_at(data, 30)?;
        if sector_shift != 9 && sector_shift != 12 {
            return Err(OleError::Corrupt("unsupported sector size"));
        }
        let sector_size = 1usize << sector_shift;

        if u16_at(data, 32)? != 6 {
            return Err(OleError::Corrupt("unsupported mini sector size"));
        }

        let first_dir_sector = u32_at(data, 48)?;
        let mini_cutoff = u32_at(data, 56)? as u64;
        let first_mini_fat = u32_at(data, 60)?;
        let first_difat = u32_at(data, 68)?;

        // The first 109 FAT sector locations sit in the header; larger
        // files chain additional DIFAT sectors after them.
        let mut fat_sectors = Vec::new();
        for i in 0..109 {
            let s = u32_at(data, 76 + i * 4)?;
            if s != FREE_SECT {
                fat_sectors.push(s);
            }
        }
        let mut difat_sector = first_difat;
        let mut hops = 0usize;
        while difat_sector != END_OF_CHAIN && difat_sector != FREE_SECT {
            hops += 1;
            if hops > data.len() / sector_size + 1 {
                return Err(OleError::Corrupt("DIFAT chain cycle"));
            }
            let sector = read_sector(data, sector_size, difat_sector)?;
            for chunk in sector[..sector_size - 4].chunks_exact(4) {
                let s = u32::from_le_bytes(chunk.try_into().unwrap());
                if s != FREE_SECT {
                    fat_sectors.push(s);
                }
            }
            difat_sector = u32::from_le_bytes(sector[sector_size - 4..].try_into().unwrap());
        }

        let mut fat = Vec::new();
        for s in &fat_sectors {
            for chunk in read_sector(data, sector_size, *s)?.chunks_exact(4) {
                fat.push(u32::from_le_bytes(chunk.try_into().unwrap()));
            }
        }

        let directory = read_chain(data, sector_size, &fat, first_dir_sector)?;
        let mut entries = Vec::new();
        for raw in directory.chunks_exact(DIR_ENTRY_SIZE) {
            let entry_type = raw[66];
            if entry_type == 0 {
                continue;
            }
            let name_len = u16::from_le_bytes([raw[64], raw[65]]) as usize;
            if name_len < 2 || name_len > 64 || name_len % 2 != 0 {
                return Err(OleError::Corrupt("bad directory entry name length"));
            }
            let units: Vec<u16> = raw[..name_len - 2]
                .chunks_exact(2)
                .map(|c| u16::from_le_bytes([c[0], c[1]]))
                .collect();
            let name = String::from_utf16(&units)
                .map_err(|_| OleError::Corrupt("directory name is not UTF-16"))?;
            let start_sector = u32_at(raw, 116)?;
            let mut size = u64_at(raw, 120)?;
            if sector_shift == 9 {
                // v3 writers leave garbage in the high half of the size field
                size &= 0xFFFF_FFFF;
            }
            entries.push(DirEntry {
                name,
                entry_type,
                start_sector,
                size,
            });
        }

        let root = entries
            .iter()
            .find(|e| e.entry_type == TYPE_ROOT)
            .ok_or(OleError::Corrupt("missing root entry"))?;
        let mini_stream = if root.size > 0 && root.start_sector != END_OF_CHAIN {
            let mut s = read_chain(data, sector_size, &fat, root.start_sector)?;
            if (root.size as usize) > s.len() {
                return Err(OleError::Corrupt("mini stream shorter than declared"));
            }
            s.truncate(root.size as usize);
            s
        } else {
            Vec::new()
        };

        let mini_fat = if first_mini_fat != END_OF_CHAIN && first_mini_fat != FREE_SECT {
            read_chain(data, sector_size, &fat, first_mini_fat)?
                .chunks_exact(4)
                .map(|c| u32::from_le_bytes(c.try_into().unwrap()))
                .collect()
        } else {
            Vec::new()
        };

        Ok(CompoundFile {
            data,
            sector_size,
            mini_cutoff,
            fat,
            mini_fat,
            entries,
            mini_stream,
        })
    }

    pub fn stream_names(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(|e| e.entry_type == TYPE_STREAM)
            .map(|e| e.name.as_str())
    }

    /// Reads the bytes of the stream with the given name (case-insensitive).
    /// Returns `Ok(None)` when no such stream exists.
    pub fn read_stream(&self, name: &str) -> Result<Option<Vec<u8>>, OleError> {
        let Some(entry) = self
            .entries
            .iter()
            .find(|e| e.entry_type == TYPE_STREAM && e.name.eq_ignore_ascii_case(name))
        else {
            return Ok(None);
        };

        let mut bytes = if entry.size < self.mini_cutoff {
            // small streams live inside the root entry's mini stream
            let mut out = Vec::new();
            let mut sector = entry.start_sector;
            let mut hops = 0usize;
            while sector != END_OF_CHAIN {
                hops += 1;
                if hops > self.mini_fat.len() + 1 {
                    return Err(OleError::Corrupt("mini sector chain cycle"));
                }
                let start = sector as usize * MINI_SECTOR_SIZE;
                let chunk = self
                    .mini_stream
                    .get(start..start + MINI_SECTOR_SIZE)
                    .ok_or(OleError::Corrupt("mini sector out of range"))?;
                out.extend_from_slice(chunk);
                sector = *self
                    .mini_fat
                    .get(sector as usize)
                    .ok_or(OleError::Corrupt("mini sector not covered by mini FAT"))?;
            }
            out
        } else {
            read_chain(self.data, self.sector_size, &self.fat, entry.start_sector)?
        };

        if entry.size as usize > bytes.len() {
            return Err(OleError::Corrupt("stream shorter than declared"));
        }
        bytes.truncate(entry.size as usize);
        Ok(Some(bytes))
    }
}

/// Decides whether a compound file is encrypted or password protected.
/// Checks, in order: well-known encryption stream names, the Word FIB
/// password bit, and an Excel FILEPASS record. Callers treat `Err` the
/// same as `Ok(true)`.
pub fn is_encrypted(data: &[u8]) -> Result<bool, OleError> {
    let file = CompoundFile::parse(data)?;

    if file
        .stream_names()
        .any(|n| ENCRYPTION_STREAMS.iter().any(|e| n.eq_ignore_ascii_case(e)))
    {
        return Ok(true);
    }

    if let Some(word) = file.read_stream("WordDocument")? {
        if word
            .get(WORD_FLAGS_OFFSET)
            .is_some_and(|b| b & WORD_ENCRYPTED_BIT != 0)
        {
            return Ok(true);
        }
    }

    if let Some(workbook) = file.read_stream("Workbook")? {
        if has_filepass_record(&workbook) {
            return Ok(true);
        }
    }

    Ok(false)
}

fn has_filepass_record(stream: &[u8]) -> bool {
    let mut pos = 0usize;
    while pos + 4 <= stream.len() {
        let record = u16::from_le_bytes([stream[pos], stream[pos + 1]]);
        let length = u16::from_le_bytes([stream[pos + 2], stream[pos + 3]]) as usize;
        if record == FILEPASS_RECORD {
            return true;
        }
        pos += 4 + length;
    }
    false
}
