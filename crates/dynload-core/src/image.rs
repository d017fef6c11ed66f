//! Exported-name extraction from library images, on top of `object`.
//!
//! [`symbol_names`] reads an on-disk image: ELF of either class and byte
//! order, thin or universal Mach-O, and PE. Windows reads the export table of
//! the module `LoadLibrary` already mapped instead, through
//! [`mapped_image_size`] and [`mapped_export_names`].

use std::collections::HashSet;
use std::fmt;

use object::pe::{IMAGE_DIRECTORY_ENTRY_EXPORT, ImageDosHeader};
use object::read::macho::{FatArch, MachOFatFile32, MachOFatFile64};
use object::read::pe::{DataDirectories, ExportTable, ImageNtHeaders, ImageOptionalHeader};
use object::{
    Architecture, BinaryFormat, FileKind, Object, ObjectSymbol, SymbolKind, SymbolSection,
};

#[cfg(target_pointer_width = "64")]
type HostNtHeaders = object::pe::ImageNtHeaders64;
#[cfg(not(target_pointer_width = "64"))]
type HostNtHeaders = object::pe::ImageNtHeaders32;

/// Failure to read names out of a library image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageError {
    /// The bytes are not a well-formed object file
    Parse(object::Error),
    /// A real object file, but not a kind a loader maps (archives, COFF objects)
    UnsupportedFormat(FileKind),
    /// Universal binary without a slice for the requested architecture
    NoMatchingArch,
    /// The PE export directory points past the mapped image
    ExportDirectoryOutOfRange { address: u32, size: u32 },
}

impl fmt::Display for ImageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(e) => write!(f, "malformed image: {e}"),
            Self::UnsupportedFormat(kind) => write!(f, "unsupported object format: {kind:?}"),
            Self::NoMatchingArch => {
                write!(f, "universal binary has no slice for this architecture")
            }
            Self::ExportDirectoryOutOfRange { address, size } => write!(
                f,
                "export directory {address:#x}+{size:#x} lies outside the image"
            ),
        }
    }
}

impl std::error::Error for ImageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Parse(e) => Some(e),
            _ => None,
        }
    }
}

impl From<object::Error> for ImageError {
    fn from(e: object::Error) -> Self {
        Self::Parse(e)
    }
}

pub type ImageResult<T> = Result<T, ImageError>;

/// Architecture of the running process, for picking universal-binary slices.
#[must_use]
pub fn host_architecture() -> Option<Architecture> {
    if cfg!(target_arch = "x86_64") {
        Some(Architecture::X86_64)
    } else if cfg!(target_arch = "aarch64") {
        Some(Architecture::Aarch64)
    } else if cfg!(target_arch = "x86") {
        Some(Architecture::I386)
    } else if cfg!(target_arch = "arm") {
        Some(Architecture::Arm)
    } else if cfg!(target_arch = "powerpc64") {
        Some(Architecture::PowerPc64)
    } else if cfg!(target_arch = "powerpc") {
        Some(Architecture::PowerPc)
    } else {
        None
    }
}

/// Collect the names an on-disk library image defines.
///
/// ELF reports `.dynsym` first and then `.symtab`, each in table order, with
/// a name seen in both kept at its first position. Local entries are only
/// taken from `.symtab`. Mach-O reports external defined symbols without the
/// leading `_`; PE reports its export names.
pub fn symbol_names(data: &[u8]) -> ImageResult<Vec<String>> {
    symbol_names_for(data, host_architecture())
}

/// Same as [`symbol_names`], choosing universal-binary slices for `arch`.
pub fn symbol_names_for(data: &[u8], arch: Option<Architecture>) -> ImageResult<Vec<String>> {
    match FileKind::parse(data)? {
        FileKind::MachOFat32 => {
            let arches = MachOFatFile32::parse(data)?.arches();
            thin_names(fat_slice(arches, data, arch)?)
        }
        FileKind::MachOFat64 => {
            let arches = MachOFatFile64::parse(data)?.arches();
            thin_names(fat_slice(arches, data, arch)?)
        }
        FileKind::Elf32
        | FileKind::Elf64
        | FileKind::MachO32
        | FileKind::MachO64
        | FileKind::Pe32
        | FileKind::Pe64 => thin_names(data),
        other => Err(ImageError::UnsupportedFormat(other)),
    }
}

fn fat_slice<'data, A: FatArch>(
    arches: &'data [A],
    data: &'data [u8],
    arch: Option<Architecture>,
) -> ImageResult<&'data [u8]> {
    let wanted = arch.ok_or(ImageError::NoMatchingArch)?;
    let slice = arches
        .iter()
        .find(|a| a.architecture() == wanted)
        .ok_or(ImageError::NoMatchingArch)?;
    Ok(slice.data(data)?)
}

fn thin_names(data: &[u8]) -> ImageResult<Vec<String>> {
    let file = object::File::parse(data)?;
    let mut names = NameList::default();
    match file.format() {
        BinaryFormat::Pe => {
            for export in file.exports()? {
                names.push_bytes(export.name());
            }
        }
        BinaryFormat::MachO => {
            for symbol in file.symbols().filter(|s| is_exported(s, true)) {
                if let Ok(name) = symbol.name() {
                    names.push(name.strip_prefix('_').unwrap_or(name));
                }
            }
        }
        _ => {
            let dynamic = file.dynamic_symbols().filter(|s| is_exported(s, true));
            let stat = file.symbols().filter(|s| is_exported(s, false));
            for symbol in dynamic.chain(stat) {
                if let Ok(name) = symbol.name() {
                    names.push(name);
                }
            }
        }
    }
    Ok(names.into_vec())
}

/// Whether a symbol-table entry names something the image defines.
///
/// Untyped entries only count when not local; local untyped entries are
/// assembler labels.
fn is_exported<'data>(symbol: &impl ObjectSymbol<'data>, dynamic: bool) -> bool {
    let defined = matches!(
        symbol.section(),
        SymbolSection::Section(_) | SymbolSection::Common
    );
    let local = symbol.is_local();
    if !defined || (dynamic && local) {
        return false;
    }
    match symbol.kind() {
        SymbolKind::Text | SymbolKind::Data | SymbolKind::Tls => true,
        SymbolKind::Unknown | SymbolKind::Label => !local,
        _ => false,
    }
}

/// `SizeOfImage` of the PE module whose headers start `headers`.
pub fn mapped_image_size(headers: &[u8]) -> ImageResult<usize> {
    let (nt, _) = nt_headers(headers)?;
    Ok(nt.optional_header().size_of_image() as usize)
}

/// Export names of a PE module mapped at the start of `image`.
///
/// In a mapped module every RVA is an offset into `image`, so the export
/// directory is sliced out directly rather than through the section table.
pub fn mapped_export_names(image: &[u8]) -> ImageResult<Vec<String>> {
    let (_, directories) = nt_headers(image)?;
    let Some(directory) = directories.get(IMAGE_DIRECTORY_ENTRY_EXPORT) else {
        return Ok(Vec::new());
    };
    let (address, size) = directory.address_range();
    if size == 0 {
        return Ok(Vec::new());
    }
    let start = address as usize;
    let table = image
        .get(start..start.saturating_add(size as usize))
        .ok_or(ImageError::ExportDirectoryOutOfRange { address, size })?;

    let mut names = NameList::default();
    for export in ExportTable::parse(table, address)?.exports()? {
        if let Some(name) = export.name {
            names.push_bytes(name);
        }
    }
    Ok(names.into_vec())
}

fn nt_headers(image: &[u8]) -> ImageResult<(&HostNtHeaders, DataDirectories<'_>)> {
    let dos = ImageDosHeader::parse(image)?;
    let mut offset = u64::from(dos.nt_headers_offset());
    Ok(HostNtHeaders::parse(image, &mut offset)?)
}

/// Names in first-seen order, without empties or repeats.
#[derive(Default)]
struct NameList {
    names: Vec<String>,
    seen: HashSet<String>,
}

impl NameList {
    fn push(&mut self, name: &str) {
        if !name.is_empty() && self.seen.insert(name.to_owned()) {
            self.names.push(name.to_owned());
        }
    }

    fn push_bytes(&mut self, name: &[u8]) {
        if let Ok(name) = std::str::from_utf8(name) {
            self.push(name);
        }
    }

    fn into_vec(self) -> Vec<String> {
        self.names
    }
}
