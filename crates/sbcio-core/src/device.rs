//! Device and provider contracts

use crate::error::ErrorKind;

/// Errors a device can report, classified by [`ErrorKind`]
pub trait DeviceError: std::error::Error + Send + Sync + 'static {
    fn kind(&self) -> ErrorKind;
}

/// An open device handle
///
/// A device owns its kernel resources from creation until [`close`](Self::close)
/// (or drop). Operations after close fail with an error of kind
/// [`ErrorKind::InvalidDescriptor`].
pub trait Device {
    type Config;
    type Error: DeviceError;

    /// The configuration the device was created from
    fn config(&self) -> &Self::Config;

    /// Release the device; closing twice is harmless
    fn close(&self) -> Result<(), Self::Error>;
}

/// Creates devices of one kind from their configuration
pub trait Provider {
    type Device: Device;

    fn create(
        &self,
        config: &<Self::Device as Device>::Config,
    ) -> Result<Self::Device, <Self::Device as Device>::Error>;
}
