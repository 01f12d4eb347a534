//! Struct marshaling between Rust values and kernel-ABI byte buffers
//!
//! Every structure that crosses the kernel boundary has a `#[repr(C)]` raw
//! form declared with [`kernel_struct!`], which also records its [`Layout`]
//! (field names, offsets and sizes). Values convert to and from the raw form
//! through [`NativeStruct`], and the free functions here move them in and out
//! of plain byte buffers.
//!
//! The set of marshaled structures is closed: [`StructKind`] has one variant
//! per kernel structure, so a missing layout is a compile error rather than a
//! lookup failure at runtime.

use crate::error::{Result, SysError};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// One field of a kernel structure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub offset: usize,
    pub size: usize,
}

/// Byte layout of a kernel structure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    /// C name of the structure
    pub name: &'static str,
    /// Total size in bytes, including trailing padding
    pub size: usize,
    pub fields: &'static [Field],
}

impl Layout {
    /// Look up a field by name
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Check that fields are in order, do not overlap, and cover every byte
    ///
    /// Implicit padding would leave bytes the marshaler never writes, so all
    /// padding in the kernel structures is spelled out as named fields.
    pub fn validate(&self) -> std::result::Result<(), String> {
        let mut end = 0;
        for field in self.fields {
            if field.offset != end {
                return Err(format!(
                    "{}: field {} at offset {} (expected {})",
                    self.name, field.name, field.offset, end
                ));
            }
            end = field.offset + field.size;
        }
        if end != self.size {
            return Err(format!(
                "{}: fields end at {} but size is {}",
                self.name, end, self.size
            ));
        }
        Ok(())
    }
}

/// Declare a `#[repr(C)]` kernel structure together with its [`Layout`]
#[macro_export]
macro_rules! kernel_struct {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident as $c_name:literal {
            $( $(#[$fmeta:meta])* $fvis:vis $field:ident : $ty:ty, )*
        }
    ) => {
        $(#[$meta])*
        #[repr(C)]
        #[derive(
            Clone,
            Copy,
            Debug,
            PartialEq,
            Eq,
            ::zerocopy::FromBytes,
            ::zerocopy::IntoBytes,
            ::zerocopy::Immutable,
            ::zerocopy::KnownLayout,
        )]
        $vis struct $name {
            $( $(#[$fmeta])* $fvis $field: $ty, )*
        }

        impl $name {
            /// Byte layout of this structure
            pub const LAYOUT: $crate::marshal::Layout = $crate::marshal::Layout {
                name: $c_name,
                size: ::core::mem::size_of::<$name>(),
                fields: &[
                    $(
                        $crate::marshal::Field {
                            name: stringify!($field),
                            offset: ::core::mem::offset_of!($name, $field),
                            size: ::core::mem::size_of::<$ty>(),
                        },
                    )*
                ],
            };
        }
    };
}

/// Implement [`NativeStruct`] for a raw structure that is its own value type
macro_rules! native_identity {
    ($ty:ty, $kind:expr) => {
        impl $crate::marshal::NativeStruct for $ty {
            type Raw = $ty;
            const KIND: $crate::marshal::StructKind = $kind;

            fn to_raw(&self) -> Self::Raw {
                *self
            }

            fn from_raw(raw: &Self::Raw) -> Self {
                *raw
            }
        }
    };
}
pub(crate) use native_identity;

/// Every structure exchanged with the kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StructKind {
    ChipInfo,
    LineAttribute,
    LineConfigAttribute,
    LineConfig,
    LineRequest,
    LineInfo,
    LineValues,
    LineEvent,
    SpiIocTransfer,
    I2cMsg,
    I2cRdwrIoctlData,
    PollFd,
}

impl StructKind {
    pub const ALL: [StructKind; 12] = [
        StructKind::ChipInfo,
        StructKind::LineAttribute,
        StructKind::LineConfigAttribute,
        StructKind::LineConfig,
        StructKind::LineRequest,
        StructKind::LineInfo,
        StructKind::LineValues,
        StructKind::LineEvent,
        StructKind::SpiIocTransfer,
        StructKind::I2cMsg,
        StructKind::I2cRdwrIoctlData,
        StructKind::PollFd,
    ];

    /// Layout of the kernel structure
    pub const fn layout(self) -> &'static Layout {
        use crate::poll::PollFd;
        use crate::uapi::{gpio, i2c, spi};

        match self {
            StructKind::ChipInfo => &gpio::RawChipInfo::LAYOUT,
            StructKind::LineAttribute => &gpio::RawLineAttribute::LAYOUT,
            StructKind::LineConfigAttribute => &gpio::RawLineConfigAttribute::LAYOUT,
            StructKind::LineConfig => &gpio::RawLineConfig::LAYOUT,
            StructKind::LineRequest => &gpio::RawLineRequest::LAYOUT,
            StructKind::LineInfo => &gpio::RawLineInfo::LAYOUT,
            StructKind::LineValues => &gpio::LineValues::LAYOUT,
            StructKind::LineEvent => &gpio::RawLineEvent::LAYOUT,
            StructKind::SpiIocTransfer => &spi::SpiIocTransfer::LAYOUT,
            StructKind::I2cMsg => &i2c::I2cMsg::LAYOUT,
            StructKind::I2cRdwrIoctlData => &i2c::I2cRdwrIoctlData::LAYOUT,
            StructKind::PollFd => &PollFd::LAYOUT,
        }
    }
}

/// Check every registered layout for gaps or overlaps
///
/// Meant to run once at startup; a failure means a structure definition no
/// longer matches the kernel ABI.
pub fn validate_layouts() -> std::result::Result<(), String> {
    for kind in StructKind::ALL {
        kind.layout().validate()?;
    }
    Ok(())
}

/// A value with a fixed kernel representation
pub trait NativeStruct: Sized {
    /// The `#[repr(C)]` form handed to the kernel
    type Raw: FromBytes + IntoBytes + Immutable + KnownLayout + Copy;

    const KIND: StructKind;

    fn to_raw(&self) -> Self::Raw;

    fn from_raw(raw: &Self::Raw) -> Self;

    fn layout() -> &'static Layout {
        Self::KIND.layout()
    }
}

/// Serialize a value into a freshly allocated buffer of exactly its layout size
pub fn serialize<T: NativeStruct>(value: &T) -> Vec<u8> {
    value.to_raw().as_bytes().to_vec()
}

/// Serialize a value into the start of `buf`
pub fn serialize_into<T: NativeStruct>(value: &T, buf: &mut [u8]) -> Result<()> {
    let layout = T::layout();
    let actual = buf.len();
    let dst = buf.get_mut(..layout.size).ok_or(SysError::BufferTooSmall {
        layout: layout.name,
        needed: layout.size,
        actual,
    })?;
    dst.copy_from_slice(value.to_raw().as_bytes());
    Ok(())
}

/// Deserialize a value from the start of `buf`
pub fn deserialize<T: NativeStruct>(buf: &[u8]) -> Result<T> {
    let layout = T::layout();
    let too_small = || SysError::BufferTooSmall {
        layout: layout.name,
        needed: layout.size,
        actual: buf.len(),
    };
    let src = buf.get(..layout.size).ok_or_else(too_small)?;
    let raw = T::Raw::read_from_bytes(src).map_err(|_| too_small())?;
    Ok(T::from_raw(&raw))
}

/// Serialize values back to back, item `i` at offset `i * layout.size`
pub fn serialize_array<T: NativeStruct>(values: &[T]) -> Vec<u8> {
    let size = T::layout().size;
    let mut buf = vec![0u8; size * values.len()];
    for (chunk, value) in buf.chunks_exact_mut(size).zip(values) {
        chunk.copy_from_slice(value.to_raw().as_bytes());
    }
    buf
}

/// Deserialize `count` values laid out back to back
pub fn deserialize_list<T: NativeStruct>(buf: &[u8], count: usize) -> Result<Vec<T>> {
    let layout = T::layout();
    let needed = layout.size * count;
    if buf.len() < needed {
        return Err(SysError::BufferTooSmall {
            layout: layout.name,
            needed,
            actual: buf.len(),
        });
    }
    buf[..needed]
        .chunks_exact(layout.size)
        .map(deserialize::<T>)
        .collect()
}

/// Copy a string into a fixed, NUL-terminated kernel name field
///
/// Input longer than `N - 1` bytes is truncated so the terminator always fits.
pub fn to_c_name<const N: usize>(name: &str) -> [u8; N] {
    let mut out = [0u8; N];
    let len = name.len().min(N.saturating_sub(1));
    out[..len].copy_from_slice(&name.as_bytes()[..len]);
    out
}

/// Read a NUL-terminated kernel name field
pub fn from_c_name<const N: usize>(raw: &[u8; N]) -> heapless::String<N> {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(N);
    let mut out = heapless::String::new();
    for ch in String::from_utf8_lossy(&raw[..end]).chars() {
        if out.push(ch).is_err() {
            break;
        }
    }
    out
}
