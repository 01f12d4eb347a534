//! ioctl request encoding and typed request helpers
//!
//! Request words follow the generic Linux `_IOC` packing:
//! `(dir << 30) | (size << 16) | (type << 8) | nr`.
//!
//! The helpers marshal their argument into a byte buffer, hand the buffer to
//! the kernel, and unmarshal whatever the kernel left in it. They are `unsafe`
//! because nothing ties a request word to the structure it expects.

use crate::error::{Result, SysError};
use crate::fd::FileDescriptor;
use crate::marshal::{self, NativeStruct};

use zerocopy::{FromBytes, Immutable, IntoBytes};

const NRBITS: u32 = 8;
const TYPEBITS: u32 = 8;
const SIZEBITS: u32 = 14;

const NRSHIFT: u32 = 0;
const TYPESHIFT: u32 = NRSHIFT + NRBITS;
const SIZESHIFT: u32 = TYPESHIFT + TYPEBITS;
const DIRSHIFT: u32 = SIZESHIFT + SIZEBITS;

/// Largest payload size a request word can carry
pub const MAX_SIZE: usize = (1 << SIZEBITS) - 1;

/// Data direction, seen from user space
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Direction {
    None = 0,
    Write = 1,
    Read = 2,
    ReadWrite = 3,
}

/// Pack a request word
pub const fn request_code(dir: Direction, ty: u8, nr: u8, size: usize) -> u32 {
    assert!(size <= MAX_SIZE, "ioctl payload too large");
    ((dir as u32) << DIRSHIFT)
        | ((size as u32) << SIZESHIFT)
        | ((ty as u32) << TYPESHIFT)
        | ((nr as u32) << NRSHIFT)
}

/// `_IO(type, nr)`
pub const fn io(ty: u8, nr: u8) -> u32 {
    request_code(Direction::None, ty, nr, 0)
}

/// `_IOR(type, nr, size)`
pub const fn ior(ty: u8, nr: u8, size: usize) -> u32 {
    request_code(Direction::Read, ty, nr, size)
}

/// `_IOW(type, nr, size)`
pub const fn iow(ty: u8, nr: u8, size: usize) -> u32 {
    request_code(Direction::Write, ty, nr, size)
}

/// `_IOWR(type, nr, size)`
pub const fn iowr(ty: u8, nr: u8, size: usize) -> u32 {
    request_code(Direction::ReadWrite, ty, nr, size)
}

/// Payload size encoded in a request word
pub const fn encoded_size(request: u32) -> usize {
    ((request >> SIZESHIFT) & ((1 << SIZEBITS) - 1)) as usize
}

/// Direction encoded in a request word
pub const fn encoded_direction(request: u32) -> Direction {
    match (request >> DIRSHIFT) & 0b11 {
        0 => Direction::None,
        1 => Direction::Write,
        2 => Direction::Read,
        _ => Direction::ReadWrite,
    }
}

fn check_size(request: u32, layout: &'static str, actual: usize) -> Result<()> {
    let encoded = encoded_size(request);
    if encoded != 0 && encoded != actual {
        return Err(SysError::SizeMismatch {
            request,
            layout,
            encoded,
            actual,
        });
    }
    Ok(())
}

/// Pass a small integer by reference and return what the kernel left in it
///
/// # Safety
///
/// `request` must take a pointer to a `V`.
pub unsafe fn ioctl_value<V>(fd: &FileDescriptor, request: u32, value: V) -> Result<V>
where
    V: FromBytes + IntoBytes + Immutable + Copy,
{
    check_size(request, std::any::type_name::<V>(), std::mem::size_of::<V>())?;
    let mut buf = value.as_bytes().to_vec();
    // SAFETY: `buf` holds exactly one `V`, as the caller guarantees `request` expects
    unsafe { fd.ioctl(request, buf.as_mut_ptr().cast())? };
    V::read_from_bytes(&buf).map_err(|_| SysError::BufferTooSmall {
        layout: std::any::type_name::<V>(),
        needed: std::mem::size_of::<V>(),
        actual: buf.len(),
    })
}

/// Marshal `value`, run the request, and unmarshal the same buffer
///
/// # Safety
///
/// `request` must take a pointer to `T`'s kernel structure. Pointers carried
/// inside `value` must be valid for the lengths they are paired with.
pub unsafe fn ioctl_in_place<T: NativeStruct>(
    fd: &FileDescriptor,
    request: u32,
    value: &T,
) -> Result<T> {
    let layout = T::layout();
    check_size(request, layout.name, layout.size)?;
    let mut buf = marshal::serialize(value);
    // SAFETY: `buf` is `layout.size` bytes of `T`'s kernel structure
    unsafe { fd.ioctl(request, buf.as_mut_ptr().cast())? };
    marshal::deserialize(&buf)
}

/// Run a request that only fills in a structure
///
/// # Safety
///
/// `request` must take a pointer to `T`'s kernel structure.
pub unsafe fn ioctl_out<T: NativeStruct>(fd: &FileDescriptor, request: u32) -> Result<T> {
    let layout = T::layout();
    check_size(request, layout.name, layout.size)?;
    let mut buf = vec![0u8; layout.size];
    // SAFETY: `buf` is a zeroed `T` kernel structure
    unsafe { fd.ioctl(request, buf.as_mut_ptr().cast())? };
    marshal::deserialize(&buf)
}

/// Run a request over an already marshaled buffer
///
/// # Safety
///
/// `buf` must hold what `request` expects, including any embedded pointers.
pub unsafe fn ioctl_buffer(fd: &FileDescriptor, request: u32, buf: &mut [u8]) -> Result<i32> {
    check_size(request, "buffer", buf.len())?;
    // SAFETY: forwarded from the caller
    unsafe { fd.ioctl(request, buf.as_mut_ptr().cast()) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeKernel;
    use crate::uapi::gpio::{LineValues, GPIO_V2_LINE_GET_VALUES_IOCTL};
    use nix::fcntl::OFlag;

    #[test]
    fn test_request_code_packing() {
        assert_eq!(io(0x07, 0x07), 0x0707);
        assert_eq!(ior(0xB4, 0x01, 68), 0x8044_B401);
        assert_eq!(iow(b'k', 1, 1), 0x4001_6B01);
        assert_eq!(iowr(0xB4, 0x07, 592), 0xC250_B407);
    }

    #[test]
    fn test_request_code_matches_nix() {
        assert_eq!(
            ior(b'k', 4, 4) as u64,
            nix::request_code_read!(b'k', 4, 4) as u64
        );
        assert_eq!(
            iow(b'k', 3, 1) as u64,
            nix::request_code_write!(b'k', 3, 1) as u64
        );
        assert_eq!(
            iowr(0xB4, 0x0E, 16) as u64,
            nix::request_code_readwrite!(0xB4, 0x0E, 16) as u64
        );
        assert_eq!(io(0x07, 0x05) as u64, nix::request_code_none!(0x07, 0x05) as u64);
    }

    #[test]
    fn test_decode_fields() {
        let req = iowr(0xB4, 0x0D, 272);
        assert_eq!(encoded_size(req), 272);
        assert_eq!(encoded_direction(req), Direction::ReadWrite);
        assert_eq!(encoded_direction(io(0x07, 0x07)), Direction::None);
    }

    #[test]
    fn test_size_mismatch_rejected_before_call() {
        let kernel = FakeKernel::new();
        kernel.add_file("/dev/gpiochip0", "");
        let fd = FileDescriptor::open(kernel.clone(), "/dev/gpiochip0", OFlag::O_RDWR).unwrap();

        let bad_request = iowr(0xB4, 0x0E, 24);
        let err = unsafe { ioctl_out::<LineValues>(&fd, bad_request) }.unwrap_err();
        assert!(matches!(
            err,
            SysError::SizeMismatch {
                encoded: 24,
                actual: 16,
                ..
            }
        ));
        assert!(kernel.ioctl_requests().is_empty());
    }

    #[test]
    fn test_in_place_reflects_kernel_writes() {
        let kernel = FakeKernel::new();
        kernel.add_file("/dev/gpiochip0", "");
        kernel.on_ioctl(GPIO_V2_LINE_GET_VALUES_IOCTL, |_, buf| {
            let mut values: LineValues = marshal::deserialize(buf).unwrap();
            values.bits = 0b101 & values.mask;
            marshal::serialize_into(&values, buf).unwrap();
            Ok(0)
        });
        let fd = FileDescriptor::open(kernel.clone(), "/dev/gpiochip0", OFlag::O_RDWR).unwrap();

        let request = LineValues {
            bits: 0,
            mask: 0b011,
        };
        let values = unsafe { ioctl_in_place(&fd, GPIO_V2_LINE_GET_VALUES_IOCTL, &request) }.unwrap();
        assert_eq!(values.bits, 0b001);
        assert_eq!(values.mask, 0b011);
        assert_eq!(kernel.ioctl_requests(), vec![GPIO_V2_LINE_GET_VALUES_IOCTL]);
    }

    #[test]
    fn test_value_round_trip_through_kernel() {
        let kernel = FakeKernel::new();
        kernel.add_file("/dev/spidev0.0", "");
        let rd_speed = ior(b'k', 4, 4);
        kernel.on_ioctl(rd_speed, |_, buf| {
            buf.copy_from_slice(&1_000_000u32.to_ne_bytes());
            Ok(0)
        });
        let fd = FileDescriptor::open(kernel, "/dev/spidev0.0", OFlag::O_RDWR).unwrap();
        let speed = unsafe { ioctl_value(&fd, rd_speed, 0u32) }.unwrap();
        assert_eq!(speed, 1_000_000);
    }
}
