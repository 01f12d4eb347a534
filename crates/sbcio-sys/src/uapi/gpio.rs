//! GPIO character device ABI, version 2 (`linux/gpio.h`)

use crate::error::{Result, SysError};
use crate::ioctl::{ior, iowr};
use crate::kernel_struct;
use crate::marshal::{from_c_name, native_identity, to_c_name, NativeStruct, StructKind};

use bitflags::bitflags;
use zerocopy::FromZeros;

pub const GPIO_MAX_NAME_SIZE: usize = 32;
pub const GPIO_V2_LINES_MAX: usize = 64;
pub const GPIO_V2_LINE_NUM_ATTRS_MAX: usize = 10;

const GPIO_IOC_MAGIC: u8 = 0xB4;

const GPIO_V2_LINE_ATTR_ID_FLAGS: u32 = 1;
const GPIO_V2_LINE_ATTR_ID_OUTPUT_VALUES: u32 = 2;
const GPIO_V2_LINE_ATTR_ID_DEBOUNCE: u32 = 3;

const GPIO_V2_LINE_EVENT_RISING_EDGE: u32 = 1;
const GPIO_V2_LINE_EVENT_FALLING_EDGE: u32 = 2;

kernel_struct! {
    /// `struct gpiochip_info`
    pub struct RawChipInfo as "gpiochip_info" {
        pub name: [u8; GPIO_MAX_NAME_SIZE],
        pub label: [u8; GPIO_MAX_NAME_SIZE],
        pub lines: u32,
    }
}

kernel_struct! {
    /// `struct gpio_v2_line_attribute`; `value` is the anonymous union
    pub struct RawLineAttribute as "gpio_v2_line_attribute" {
        pub id: u32,
        pub padding: u32,
        pub value: u64,
    }
}

kernel_struct! {
    /// `struct gpio_v2_line_config_attribute`
    pub struct RawLineConfigAttribute as "gpio_v2_line_config_attribute" {
        pub attr: RawLineAttribute,
        pub mask: u64,
    }
}

kernel_struct! {
    /// `struct gpio_v2_line_config`
    pub struct RawLineConfig as "gpio_v2_line_config" {
        pub flags: u64,
        pub num_attrs: u32,
        pub padding: [u32; 5],
        pub attrs: [RawLineConfigAttribute; GPIO_V2_LINE_NUM_ATTRS_MAX],
    }
}

kernel_struct! {
    /// `struct gpio_v2_line_request`
    pub struct RawLineRequest as "gpio_v2_line_request" {
        pub offsets: [u32; GPIO_V2_LINES_MAX],
        pub consumer: [u8; GPIO_MAX_NAME_SIZE],
        pub config: RawLineConfig,
        pub num_lines: u32,
        pub event_buffer_size: u32,
        pub padding: [u32; 5],
        pub fd: i32,
    }
}

kernel_struct! {
    /// `struct gpio_v2_line_info`
    pub struct RawLineInfo as "gpio_v2_line_info" {
        pub name: [u8; GPIO_MAX_NAME_SIZE],
        pub consumer: [u8; GPIO_MAX_NAME_SIZE],
        pub offset: u32,
        pub num_attrs: u32,
        pub flags: u64,
        pub attrs: [RawLineAttribute; GPIO_V2_LINE_NUM_ATTRS_MAX],
        pub padding: [u32; 4],
    }
}

kernel_struct! {
    /// `struct gpio_v2_line_values`: bit *i* is the *i*th requested line
    pub struct LineValues as "gpio_v2_line_values" {
        pub bits: u64,
        pub mask: u64,
    }
}

kernel_struct! {
    /// `struct gpio_v2_line_event`
    pub struct RawLineEvent as "gpio_v2_line_event" {
        pub timestamp_ns: u64,
        pub id: u32,
        pub offset: u32,
        pub seqno: u32,
        pub line_seqno: u32,
        pub padding: [u32; 6],
    }
}

native_identity!(LineValues, StructKind::LineValues);

pub const GPIO_GET_CHIPINFO_IOCTL: u32 = ior(GPIO_IOC_MAGIC, 0x01, RawChipInfo::LAYOUT.size);
pub const GPIO_V2_GET_LINEINFO_IOCTL: u32 = iowr(GPIO_IOC_MAGIC, 0x05, RawLineInfo::LAYOUT.size);
pub const GPIO_V2_GET_LINE_IOCTL: u32 = iowr(GPIO_IOC_MAGIC, 0x07, RawLineRequest::LAYOUT.size);
pub const GPIO_V2_LINE_SET_CONFIG_IOCTL: u32 =
    iowr(GPIO_IOC_MAGIC, 0x0D, RawLineConfig::LAYOUT.size);
pub const GPIO_V2_LINE_GET_VALUES_IOCTL: u32 =
    iowr(GPIO_IOC_MAGIC, 0x0E, LineValues::LAYOUT.size);
pub const GPIO_V2_LINE_SET_VALUES_IOCTL: u32 =
    iowr(GPIO_IOC_MAGIC, 0x0F, LineValues::LAYOUT.size);

bitflags! {
    /// `enum gpio_v2_line_flag`
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct LineFlags: u64 {
        const USED = 1 << 0;
        const ACTIVE_LOW = 1 << 1;
        const INPUT = 1 << 2;
        const OUTPUT = 1 << 3;
        const EDGE_RISING = 1 << 4;
        const EDGE_FALLING = 1 << 5;
        const OPEN_DRAIN = 1 << 6;
        const OPEN_SOURCE = 1 << 7;
        const BIAS_PULL_UP = 1 << 8;
        const BIAS_PULL_DOWN = 1 << 9;
        const BIAS_DISABLED = 1 << 10;
        const EVENT_CLOCK_REALTIME = 1 << 11;
        const EVENT_CLOCK_HTE = 1 << 12;
    }
}

/// Mask selecting the first `lines` requested lines
pub fn line_mask(lines: usize) -> u64 {
    if lines >= 64 {
        u64::MAX
    } else {
        (1u64 << lines) - 1
    }
}

/// Chip information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChipInfo {
    pub name: heapless::String<GPIO_MAX_NAME_SIZE>,
    pub label: heapless::String<GPIO_MAX_NAME_SIZE>,
    pub lines: u32,
}

impl NativeStruct for ChipInfo {
    type Raw = RawChipInfo;
    const KIND: StructKind = StructKind::ChipInfo;

    fn to_raw(&self) -> RawChipInfo {
        RawChipInfo {
            name: to_c_name(&self.name),
            label: to_c_name(&self.label),
            lines: self.lines,
        }
    }

    fn from_raw(raw: &RawChipInfo) -> Self {
        Self {
            name: from_c_name(&raw.name),
            label: from_c_name(&raw.label),
            lines: raw.lines,
        }
    }
}

/// One attribute of a line, decoded from the kernel union
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineAttribute {
    Flags(LineFlags),
    OutputValues(u64),
    /// Debounce period in microseconds
    Debounce(u32),
    Unknown { id: u32, value: u64 },
}

// The debounce period is a u32 at the start of the union.
fn debounce_to_union(period_us: u32) -> u64 {
    let mut bytes = [0u8; 8];
    bytes[..4].copy_from_slice(&period_us.to_ne_bytes());
    u64::from_ne_bytes(bytes)
}

fn debounce_from_union(value: u64) -> u32 {
    let bytes = value.to_ne_bytes();
    u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

impl NativeStruct for LineAttribute {
    type Raw = RawLineAttribute;
    const KIND: StructKind = StructKind::LineAttribute;

    fn to_raw(&self) -> RawLineAttribute {
        let (id, value) = match *self {
            LineAttribute::Flags(flags) => (GPIO_V2_LINE_ATTR_ID_FLAGS, flags.bits()),
            LineAttribute::OutputValues(bits) => (GPIO_V2_LINE_ATTR_ID_OUTPUT_VALUES, bits),
            LineAttribute::Debounce(us) => (GPIO_V2_LINE_ATTR_ID_DEBOUNCE, debounce_to_union(us)),
            LineAttribute::Unknown { id, value } => (id, value),
        };
        RawLineAttribute {
            id,
            padding: 0,
            value,
        }
    }

    fn from_raw(raw: &RawLineAttribute) -> Self {
        match raw.id {
            GPIO_V2_LINE_ATTR_ID_FLAGS => {
                LineAttribute::Flags(LineFlags::from_bits_retain(raw.value))
            }
            GPIO_V2_LINE_ATTR_ID_OUTPUT_VALUES => LineAttribute::OutputValues(raw.value),
            GPIO_V2_LINE_ATTR_ID_DEBOUNCE => {
                LineAttribute::Debounce(debounce_from_union(raw.value))
            }
            id => LineAttribute::Unknown {
                id,
                value: raw.value,
            },
        }
    }
}

/// An attribute applied to the lines selected by `mask`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineConfigAttribute {
    pub attr: LineAttribute,
    pub mask: u64,
}

impl NativeStruct for LineConfigAttribute {
    type Raw = RawLineConfigAttribute;
    const KIND: StructKind = StructKind::LineConfigAttribute;

    fn to_raw(&self) -> RawLineConfigAttribute {
        RawLineConfigAttribute {
            attr: self.attr.to_raw(),
            mask: self.mask,
        }
    }

    fn from_raw(raw: &RawLineConfigAttribute) -> Self {
        Self {
            attr: LineAttribute::from_raw(&raw.attr),
            mask: raw.mask,
        }
    }
}

/// Configuration for a group of requested lines
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineConfig {
    /// Flags for lines not covered by a flags attribute
    pub flags: LineFlags,
    pub attrs: heapless::Vec<LineConfigAttribute, GPIO_V2_LINE_NUM_ATTRS_MAX>,
}

impl LineConfig {
    pub fn new(flags: LineFlags) -> Self {
        Self {
            flags,
            attrs: heapless::Vec::new(),
        }
    }

    /// Attach an attribute to the lines in `mask`
    pub fn push_attribute(&mut self, attr: LineAttribute, mask: u64) -> Result<()> {
        self.attrs
            .push(LineConfigAttribute { attr, mask })
            .map_err(|_| SysError::CapacityExceeded {
                what: "line config attributes",
                capacity: GPIO_V2_LINE_NUM_ATTRS_MAX,
            })
    }

    pub fn with_attribute(mut self, attr: LineAttribute, mask: u64) -> Result<Self> {
        self.push_attribute(attr, mask)?;
        Ok(self)
    }
}

impl NativeStruct for LineConfig {
    type Raw = RawLineConfig;
    const KIND: StructKind = StructKind::LineConfig;

    fn to_raw(&self) -> RawLineConfig {
        let mut raw = RawLineConfig::new_zeroed();
        raw.flags = self.flags.bits();
        raw.num_attrs = self.attrs.len() as u32;
        for (slot, attr) in raw.attrs.iter_mut().zip(&self.attrs) {
            *slot = attr.to_raw();
        }
        raw
    }

    fn from_raw(raw: &RawLineConfig) -> Self {
        let count = (raw.num_attrs as usize).min(GPIO_V2_LINE_NUM_ATTRS_MAX);
        Self {
            flags: LineFlags::from_bits_retain(raw.flags),
            attrs: raw.attrs[..count]
                .iter()
                .map(LineConfigAttribute::from_raw)
                .collect(),
        }
    }
}

/// A request for a group of lines
///
/// After a successful `GPIO_V2_GET_LINE_IOCTL`, `fd` holds the new line
/// group descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineRequest {
    pub offsets: heapless::Vec<u32, GPIO_V2_LINES_MAX>,
    pub consumer: heapless::String<GPIO_MAX_NAME_SIZE>,
    pub config: LineConfig,
    /// Zero selects the kernel default
    pub event_buffer_size: u32,
    pub fd: i32,
}

impl LineRequest {
    pub fn new(offsets: &[u32], consumer: &str, config: LineConfig) -> Result<Self> {
        let offsets = heapless::Vec::from_slice(offsets).map_err(|_| SysError::CapacityExceeded {
            what: "requested lines",
            capacity: GPIO_V2_LINES_MAX,
        })?;
        Ok(Self {
            offsets,
            consumer: from_c_name(&to_c_name::<GPIO_MAX_NAME_SIZE>(consumer)),
            config,
            event_buffer_size: 0,
            fd: -1,
        })
    }
}

impl NativeStruct for LineRequest {
    type Raw = RawLineRequest;
    const KIND: StructKind = StructKind::LineRequest;

    fn to_raw(&self) -> RawLineRequest {
        let mut raw = RawLineRequest::new_zeroed();
        raw.offsets[..self.offsets.len()].copy_from_slice(&self.offsets);
        raw.consumer = to_c_name(&self.consumer);
        raw.config = self.config.to_raw();
        raw.num_lines = self.offsets.len() as u32;
        raw.event_buffer_size = self.event_buffer_size;
        raw.fd = self.fd;
        raw
    }

    fn from_raw(raw: &RawLineRequest) -> Self {
        let count = (raw.num_lines as usize).min(GPIO_V2_LINES_MAX);
        Self {
            offsets: raw.offsets[..count].iter().copied().collect(),
            consumer: from_c_name(&raw.consumer),
            config: LineConfig::from_raw(&raw.config),
            event_buffer_size: raw.event_buffer_size,
            fd: raw.fd,
        }
    }
}

/// Information about one line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineInfo {
    pub name: heapless::String<GPIO_MAX_NAME_SIZE>,
    pub consumer: heapless::String<GPIO_MAX_NAME_SIZE>,
    pub offset: u32,
    pub flags: LineFlags,
    pub attrs: heapless::Vec<LineAttribute, GPIO_V2_LINE_NUM_ATTRS_MAX>,
}

impl LineInfo {
    /// Query template for `offset`; the kernel fills in the rest
    pub fn query(offset: u32) -> Self {
        Self {
            name: heapless::String::new(),
            consumer: heapless::String::new(),
            offset,
            flags: LineFlags::empty(),
            attrs: heapless::Vec::new(),
        }
    }

    pub fn is_used(&self) -> bool {
        self.flags.contains(LineFlags::USED)
    }

    /// Hardware debounce period, if one is configured
    pub fn debounce_us(&self) -> Option<u32> {
        self.attrs.iter().find_map(|a| match a {
            LineAttribute::Debounce(us) => Some(*us),
            _ => None,
        })
    }
}

impl NativeStruct for LineInfo {
    type Raw = RawLineInfo;
    const KIND: StructKind = StructKind::LineInfo;

    fn to_raw(&self) -> RawLineInfo {
        let mut raw = RawLineInfo::new_zeroed();
        raw.name = to_c_name(&self.name);
        raw.consumer = to_c_name(&self.consumer);
        raw.offset = self.offset;
        raw.num_attrs = self.attrs.len() as u32;
        raw.flags = self.flags.bits();
        for (slot, attr) in raw.attrs.iter_mut().zip(&self.attrs) {
            *slot = attr.to_raw();
        }
        raw
    }

    fn from_raw(raw: &RawLineInfo) -> Self {
        let count = (raw.num_attrs as usize).min(GPIO_V2_LINE_NUM_ATTRS_MAX);
        Self {
            name: from_c_name(&raw.name),
            consumer: from_c_name(&raw.consumer),
            offset: raw.offset,
            flags: LineFlags::from_bits_retain(raw.flags),
            attrs: raw.attrs[..count]
                .iter()
                .map(LineAttribute::from_raw)
                .collect(),
        }
    }
}

/// Which edge produced a line event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEventKind {
    RisingEdge,
    FallingEdge,
    Unknown(u32),
}

/// An edge event read from a line group descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineEvent {
    pub timestamp_ns: u64,
    pub kind: LineEventKind,
    pub offset: u32,
    pub seqno: u32,
    pub line_seqno: u32,
}

impl NativeStruct for LineEvent {
    type Raw = RawLineEvent;
    const KIND: StructKind = StructKind::LineEvent;

    fn to_raw(&self) -> RawLineEvent {
        let id = match self.kind {
            LineEventKind::RisingEdge => GPIO_V2_LINE_EVENT_RISING_EDGE,
            LineEventKind::FallingEdge => GPIO_V2_LINE_EVENT_FALLING_EDGE,
            LineEventKind::Unknown(id) => id,
        };
        RawLineEvent {
            timestamp_ns: self.timestamp_ns,
            id,
            offset: self.offset,
            seqno: self.seqno,
            line_seqno: self.line_seqno,
            padding: [0; 6],
        }
    }

    fn from_raw(raw: &RawLineEvent) -> Self {
        let kind = match raw.id {
            GPIO_V2_LINE_EVENT_RISING_EDGE => LineEventKind::RisingEdge,
            GPIO_V2_LINE_EVENT_FALLING_EDGE => LineEventKind::FallingEdge,
            id => LineEventKind::Unknown(id),
        };
        Self {
            timestamp_ns: raw.timestamp_ns,
            kind,
            offset: raw.offset,
            seqno: raw.seqno,
            line_seqno: raw.line_seqno,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marshal::{deserialize, serialize};

    #[test]
    fn test_struct_sizes() {
        assert_eq!(RawChipInfo::LAYOUT.size, 68);
        assert_eq!(RawLineAttribute::LAYOUT.size, 16);
        assert_eq!(RawLineConfigAttribute::LAYOUT.size, 24);
        assert_eq!(RawLineConfig::LAYOUT.size, 272);
        assert_eq!(RawLineRequest::LAYOUT.size, 592);
        assert_eq!(RawLineInfo::LAYOUT.size, 256);
        assert_eq!(LineValues::LAYOUT.size, 16);
        assert_eq!(RawLineEvent::LAYOUT.size, 48);
    }

    #[test]
    fn test_field_offsets() {
        let info = &RawLineInfo::LAYOUT;
        assert_eq!(info.field("offset").unwrap().offset, 64);
        assert_eq!(info.field("flags").unwrap().offset, 72);
        assert_eq!(info.field("attrs").unwrap().offset, 80);

        let config = &RawLineConfig::LAYOUT;
        assert_eq!(config.field("attrs").unwrap().offset, 32);

        let request = &RawLineRequest::LAYOUT;
        assert_eq!(request.field("consumer").unwrap().offset, 256);
        assert_eq!(request.field("num_lines").unwrap().offset, 560);
        assert_eq!(request.field("event_buffer_size").unwrap().offset, 564);
    }

    #[test]
    fn test_ioctl_constants() {
        assert_eq!(GPIO_GET_CHIPINFO_IOCTL, 0x8044_B401);
        assert_eq!(GPIO_V2_GET_LINEINFO_IOCTL, 0xC100_B405);
        assert_eq!(GPIO_V2_GET_LINE_IOCTL, 0xC250_B407);
        assert_eq!(GPIO_V2_LINE_SET_CONFIG_IOCTL, 0xC110_B40D);
        assert_eq!(GPIO_V2_LINE_GET_VALUES_IOCTL, 0xC010_B40E);
        assert_eq!(GPIO_V2_LINE_SET_VALUES_IOCTL, 0xC010_B40F);
    }

    #[test]
    fn test_line_request_round_trip() {
        let config = LineConfig::new(LineFlags::INPUT | LineFlags::EDGE_RISING)
            .with_attribute(LineAttribute::Debounce(5_000), 0b11)
            .unwrap();
        let mut request = LineRequest::new(&[17, 27], "door-sensor", config).unwrap();
        request.event_buffer_size = 32;

        let buf = serialize(&request);
        assert_eq!(buf.len(), 592);
        assert_eq!(&buf[0..4], &17u32.to_ne_bytes());
        assert_eq!(&buf[4..8], &27u32.to_ne_bytes());
        assert_eq!(&buf[256..267], b"door-sensor");
        assert_eq!(&buf[560..564], &2u32.to_ne_bytes());

        let back: LineRequest = deserialize(&buf).unwrap();
        assert_eq!(back, request);
    }

    #[test]
    fn test_debounce_attribute_encoding() {
        let raw = LineAttribute::Debounce(1234).to_raw();
        assert_eq!(raw.id, 3);
        let bytes = serialize(&LineAttribute::Debounce(1234));
        assert_eq!(&bytes[8..12], &1234u32.to_ne_bytes());
        assert_eq!(&bytes[12..16], &[0, 0, 0, 0]);
        assert_eq!(
            LineAttribute::from_raw(&raw),
            LineAttribute::Debounce(1234)
        );
    }

    #[test]
    fn test_line_info_from_kernel_bytes() {
        let mut raw = RawLineInfo::new_zeroed();
        raw.name = to_c_name("GPIO17");
        raw.consumer = to_c_name("sysfs");
        raw.offset = 17;
        raw.flags = (LineFlags::USED | LineFlags::OUTPUT).bits();
        raw.num_attrs = 1;
        raw.attrs[0] = LineAttribute::Debounce(250).to_raw();

        let info = LineInfo::from_raw(&raw);
        assert_eq!(info.name.as_str(), "GPIO17");
        assert_eq!(info.consumer.as_str(), "sysfs");
        assert!(info.is_used());
        assert_eq!(info.debounce_us(), Some(250));
    }

    #[test]
    fn test_consumer_is_truncated() {
        let long = "a-consumer-label-well-beyond-thirty-one-bytes";
        let request = LineRequest::new(&[1], long, LineConfig::default()).unwrap();
        assert_eq!(request.consumer.len(), 31);
        assert!(long.starts_with(request.consumer.as_str()));
    }

    #[test]
    fn test_too_many_lines() {
        let offsets: Vec<u32> = (0..65).collect();
        assert!(matches!(
            LineRequest::new(&offsets, "x", LineConfig::default()),
            Err(SysError::CapacityExceeded { capacity: 64, .. })
        ));
    }

    #[test]
    fn test_event_kinds() {
        let mut raw = RawLineEvent::new_zeroed();
        raw.timestamp_ns = 99;
        raw.id = 2;
        assert_eq!(LineEvent::from_raw(&raw).kind, LineEventKind::FallingEdge);
        raw.id = 7;
        assert_eq!(LineEvent::from_raw(&raw).kind, LineEventKind::Unknown(7));
    }

    #[test]
    fn test_line_mask() {
        assert_eq!(line_mask(0), 0);
        assert_eq!(line_mask(3), 0b111);
        assert_eq!(line_mask(64), u64::MAX);
    }
}
