use percent_encoding::percent_decode_str;
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;
use utoipa::ToSchema;

use crate::utils::ole;

/// Security policy applied to every uploaded file. Always passed in
/// explicitly so tests can construct arbitrary policies; nothing in the
/// validator reads ambient state.
#[derive(Debug, Clone)]
pub struct Policy {
    pub allowed_extensions: HashSet<String>,
    pub allowed_mime_types: HashSet<String>,
    pub max_file_size_bytes: u64,
}

impl Policy {
    pub fn new<I, J>(extensions: I, mime_types: J, max_file_size_bytes: u64) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
        J: IntoIterator,
        J::Item: AsRef<str>,
    {
        Self {
            allowed_extensions: extensions
                .into_iter()
                .map(|e| e.as_ref().to_lowercase())
                .collect(),
            allowed_mime_types: mime_types
                .into_iter()
                .map(|m| m.as_ref().to_lowercase())
                .collect(),
            max_file_size_bytes,
        }
    }
}

/// One user-correctable problem with an uploaded file. Violations are
/// returned as data, never thrown, so a single request can report every
/// problem at once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Violation {
    pub field: String,
    pub message: String,
}

impl Violation {
    pub fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Everything the validator sees about one uploaded file. Validation is a
/// pure function over this value: no I/O, no clock, no globals.
#[derive(Debug)]
pub struct FileCheck<'a> {
    pub file_name: &'a str,
    pub declared_mime: &'a str,
    pub declared_size: u64,
    pub bytes: &'a [u8],
}

/// Decodes percent-encoded (mis-encoded) names and strips any path
/// component. Must run identically when staging a name and when comparing
/// against staged names, or duplicate detection silently misses.
pub fn sanitize_file_name(raw: &str) -> String {
    let decoded = percent_decode_str(raw).decode_utf8_lossy();
    decoded
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or("")
        .trim()
        .to_string()
}

pub fn extension_of(file_name: &str) -> String {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}

/// Validates one file against the policy. Checks run in a fixed order and
/// short-circuit at the first failing group: later checks assume the
/// earlier structural ones passed and would only produce noise otherwise.
/// Within a group, every failing check reports.
pub fn validate_file(file: &FileCheck, policy: &Policy) -> Vec<Violation> {
    let violations = check_basic_attributes(file, policy);
    if !violations.is_empty() {
        return violations;
    }

    if let Some(v) = check_declared_mime(file, policy) {
        return vec![v];
    }

    // Formats that byte-signature detection cannot tell apart are checked
    // by structural heuristics instead; for them validation ends here.
    let extension = extension_of(file.file_name);
    if let Some(format) = TextFormat::from_extension(&extension) {
        return format.check(file.bytes).into_iter().collect();
    }

    let sniffed = match sniff(file.bytes) {
        Sniffed::Zip => {
            return vec![Violation::new(
                "file",
                "ZIP containers are not allowed, regardless of the declared file type",
            )];
        }
        Sniffed::Unknown => {
            return vec![Violation::new(
                "file",
                "Could not determine the file type from its content",
            )];
        }
        other => other,
    };

    if let Some(v) = check_signature_identity(file, &extension, &sniffed, policy) {
        return vec![v];
    }

    check_encryption(&sniffed, file.bytes).into_iter().collect()
}

fn check_basic_attributes(file: &FileCheck, policy: &Policy) -> Vec<Violation> {
    let mut violations = Vec::new();

    if file.declared_size == 0 {
        violations.push(Violation::new("size", "File is empty"));
    } else if file.declared_size > policy.max_file_size_bytes {
        violations.push(Violation::new(
            "size",
            format!(
                "File must be smaller than {} bytes",
                policy.max_file_size_bytes
            ),
        ));
    }

    if file.file_name.chars().count() > 255 {
        violations.push(Violation::new(
            "fileName",
            "File name must be 255 characters or fewer",
        ));
    }
    let name_ok = !file.file_name.is_empty()
        && file
            .file_name
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '.' | '-' | '_' | ' '));
    if !name_ok {
        violations.push(Violation::new(
            "fileName",
            "File name contains special characters that are not allowed",
        ));
    }

    violations
}

fn check_declared_mime(file: &FileCheck, policy: &Policy) -> Option<Violation> {
    let normalized = file
        .declared_mime
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_lowercase();

    if policy.allowed_mime_types.contains(&normalized) {
        return None;
    }
    Some(Violation::new(
        "mimeType",
        format!("File type '{}' is not allowed", file.declared_mime),
    ))
}

/// Closed set of formats validated by text/structure heuristics rather
/// than signature sniffing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextFormat {
    Html,
    Prj,
    Gis,
    Dbf,
    Shp,
    Shx,
}

/// ESRI shapefile file code 9994, big-endian.
const SHAPEFILE_MAGIC: [u8; 4] = [0x00, 0x00, 0x27, 0x0A];

/// First-byte version markers a dBASE table may carry.
const DBF_VERSION_MARKERS: [u8; 12] = [
    0x02, 0x03, 0x04, 0x05, 0x30, 0x31, 0x32, 0x43, 0x83, 0x8B, 0xCB, 0xF5,
];

impl TextFormat {
    fn from_extension(extension: &str) -> Option<Self> {
        match extension {
            "html" => Some(Self::Html),
            "prj" => Some(Self::Prj),
            "gis" => Some(Self::Gis),
            "dbf" => Some(Self::Dbf),
            "shp" => Some(Self::Shp),
            "shx" => Some(Self::Shx),
            _ => None,
        }
    }

    fn check(self, bytes: &[u8]) -> Option<Violation> {
        match self {
            Self::Html => {
                let head = text_head(bytes);
                if head.contains("<html") || head.contains("<!doctype html") {
                    None
                } else {
                    Some(Violation::new(
                        "file",
                        "HTML file is missing an <html> or doctype declaration",
                    ))
                }
            }
            Self::Prj => {
                let text = String::from_utf8_lossy(bytes);
                if text.starts_with("PROJCS[") || text.starts_with("GEOGCS[") {
                    None
                } else {
                    Some(Violation::new(
                        "file",
                        "Projection file does not start with a PROJCS or GEOGCS definition",
                    ))
                }
            }
            Self::Gis => {
                let head = text_head(bytes);
                if ["coordinate", "longitude", "latitude"]
                    .iter()
                    .any(|needle| head.contains(needle))
                {
                    None
                } else {
                    Some(Violation::new(
                        "file",
                        "GIS file does not contain any coordinate data",
                    ))
                }
            }
            Self::Dbf => {
                if bytes
                    .first()
                    .is_some_and(|b| DBF_VERSION_MARKERS.contains(b))
                {
                    None
                } else {
                    Some(Violation::new(
                        "file",
                        "File does not start with a valid dBASE version marker",
                    ))
                }
            }
            Self::Shp | Self::Shx => {
                if bytes.starts_with(&SHAPEFILE_MAGIC) {
                    None
                } else {
                    Some(Violation::new(
                        "file",
                        "File does not start with the ESRI shapefile header",
                    ))
                }
            }
        }
    }
}

/// Lowercased text view of roughly the first 200 bytes, which is where the
/// heuristic markers of the special text formats live.
fn text_head(bytes: &[u8]) -> String {
    String::from_utf8_lossy(&bytes[..bytes.len().min(200)]).to_lowercase()
}

const CFB_MAGIC: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
const ZIP_MAGICS: [&[u8]; 3] = [b"PK\x03\x04", b"PK\x05\x06", b"PK\x07\x08"];

#[derive(Debug)]
enum Sniffed {
    /// ZIP containers are banned outright: several legacy Office formats can
    /// mask a ZIP payload, and ZIP is not an allowed top-level type here.
    Zip,
    /// The legacy Office compound-file container. Old `.doc`/`.xls` files
    /// sniff as this generic container rather than as their own extension.
    CompoundFile,
    Known {
        extension: &'static str,
        mime_type: &'static str,
    },
    Unknown,
}

fn sniff(bytes: &[u8]) -> Sniffed {
    if ZIP_MAGICS.iter().any(|magic| bytes.starts_with(magic)) {
        return Sniffed::Zip;
    }
    if bytes.starts_with(&CFB_MAGIC) {
        return Sniffed::CompoundFile;
    }
    match infer::get(bytes) {
        Some(t) if t.extension() == "zip" || t.mime_type() == "application/zip" => Sniffed::Zip,
        Some(t) => Sniffed::Known {
            extension: t.extension(),
            mime_type: t.mime_type(),
        },
        None => Sniffed::Unknown,
    }
}

fn check_signature_identity(
    file: &FileCheck,
    declared_extension: &str,
    sniffed: &Sniffed,
    policy: &Policy,
) -> Option<Violation> {
    match sniffed {
        // accepted as an allowed pseudo-type alongside the real allow-lists
        Sniffed::CompoundFile => None,
        Sniffed::Known {
            extension,
            mime_type,
        } => {
            let allowed = policy.allowed_extensions.contains(*extension)
                && policy.allowed_mime_types.contains(*mime_type);
            let matches_declared = declared_extension == *extension
                || file.declared_mime.eq_ignore_ascii_case(mime_type);
            if allowed && matches_declared {
                None
            } else {
                Some(Violation::new(
                    "file",
                    format!(
                        "signature mismatch: declared as {} ({}) but detected as {} ({})",
                        declared_extension, file.declared_mime, extension, mime_type
                    ),
                ))
            }
        }
        Sniffed::Zip | Sniffed::Unknown => unreachable!("handled before cross-validation"),
    }
}

fn check_encryption(sniffed: &Sniffed, bytes: &[u8]) -> Option<Violation> {
    match sniffed {
        Sniffed::Known { mime_type, .. } if *mime_type == "application/pdf" => {
            // A parse failure counts as password protection. This knowingly
            // misclassifies a corrupted-but-unencrypted PDF; the trade-off
            // is that no unreadable document ever slips through.
            match lopdf::Document::load_mem(bytes) {
                Ok(doc) if doc.trailer.get(b"Encrypt").is_ok() => Some(encrypted_violation()),
                Ok(_) => None,
                Err(_) => Some(encrypted_violation()),
            }
        }
        Sniffed::CompoundFile => match ole::is_encrypted(bytes) {
            Ok(false) => None,
            // fail closed: an unreadable container is rejected, not passed
            Ok(true) | Err(_) => Some(encrypted_violation()),
        },
        _ => None,
    }
}

fn encrypted_violation() -> Violation {
    Violation::new(
        "file",
        "File is encrypted or password protected and cannot be accepted",
    )
}
