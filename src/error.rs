/// Error kind returned by all fallible operations of the crate.
///
/// Modbus exception codes received from a peer are folded into the same enum,
/// so a client caller can distinguish a protocol-level failure (the peer
/// answered with an exception PDU) from a local failure (framing, checksum,
/// buffer capacity) or a transport failure by matching on the kind.
#[allow(clippy::module_name_repetitions)]
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ErrorKind {
    /// Modbus exception 01, the function code is not allowable for the server
    IllegalFunction,
    /// Modbus exception 02, the data address is not allowable for the server
    IllegalDataAddress,
    /// Modbus exception 03, a value in the request is not allowable
    IllegalDataValue,
    /// Modbus exception 04, unrecoverable error while performing the action
    SlaveDeviceFailure,
    /// Modbus exception 05, request accepted, a long processing is required
    Acknowledge,
    /// Modbus exception 06, the server is busy with a long-duration command
    SlaveDeviceBusy,
    /// Modbus exception 07, negative acknowledge
    NegativeAcknowledge,
    /// Modbus exception 08, memory parity error
    MemoryParityError,
    /// Modbus exception 10, no path from the gateway to the target device
    GatewayPathUnavailable,
    /// Modbus exception 11, the target device failed to respond
    GatewayTargetFailed,
    /// The peer replied with an exception code not defined by the standard
    UnknownError,
    /// Returned by a server callback to suppress the reply entirely
    Ignored,
    /// Operation failed without a more specific cause
    Failure,
    /// The transport signalled a timeout
    Timeout,
    /// An invalid argument was provided
    InvalidArgument,
    /// The operation is not possible in the current mode of operation
    InvalidMode,
    /// The requested functionality is not implemented
    NotImplemented,
    /// No free slot in the server callback table
    Capacity,
    /// The scratch buffer is too small to hold the frame
    Oob,
    /// The transport failed or was closed mid-frame
    Transport,
    /// The hostname could not be resolved
    HostResolution,
    /// The peer refused the connection
    ConnectionRefused,
    /// The socket could not be opened
    OpenSocket,
    /// The serial device could not be opened
    OpenSerial,
    /// The serial device rejected the requested configuration
    SerialConfig,
    /// CRC-16 or LRC verification failed
    FrameCrcError,
    /// Missing framing bytes, bad protocol id or inconsistent frame layout
    FrameBroken,
}

impl ErrorKind {
    /// Maps an on-wire exception code to the corresponding error kind.
    ///
    /// Codes not defined by the standard map to [`ErrorKind::UnknownError`].
    pub fn from_exception_code(code: u8) -> Self {
        match code {
            0x01 => ErrorKind::IllegalFunction,
            0x02 => ErrorKind::IllegalDataAddress,
            0x03 => ErrorKind::IllegalDataValue,
            0x04 => ErrorKind::SlaveDeviceFailure,
            0x05 => ErrorKind::Acknowledge,
            0x06 => ErrorKind::SlaveDeviceBusy,
            0x07 => ErrorKind::NegativeAcknowledge,
            0x08 => ErrorKind::MemoryParityError,
            0x0A => ErrorKind::GatewayPathUnavailable,
            0x0B => ErrorKind::GatewayTargetFailed,
            _ => ErrorKind::UnknownError,
        }
    }

    /// Returns the on-wire exception code if this kind is a Modbus exception.
    pub fn exception_code(&self) -> Option<u8> {
        match self {
            ErrorKind::IllegalFunction => Some(0x01),
            ErrorKind::IllegalDataAddress => Some(0x02),
            ErrorKind::IllegalDataValue => Some(0x03),
            ErrorKind::SlaveDeviceFailure => Some(0x04),
            ErrorKind::Acknowledge => Some(0x05),
            ErrorKind::SlaveDeviceBusy => Some(0x06),
            ErrorKind::NegativeAcknowledge => Some(0x07),
            ErrorKind::MemoryParityError => Some(0x08),
            ErrorKind::GatewayPathUnavailable => Some(0x0A),
            ErrorKind::GatewayTargetFailed => Some(0x0B),
            _ => None,
        }
    }

    /// Returns true if this kind is an exception code defined by the standard.
    pub fn is_exception(&self) -> bool {
        self.exception_code().is_some()
    }
}

impl core::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let msg: &str = match self {
            ErrorKind::IllegalFunction => "MODBUS ERROR CODE 01 - ILLEGAL FUNCTION",
            ErrorKind::IllegalDataAddress => "MODBUS ERROR CODE 02 - ILLEGAL DATA ADDRESS",
            ErrorKind::IllegalDataValue => "MODBUS ERROR CODE 03 - ILLEGAL DATA VALUE",
            ErrorKind::SlaveDeviceFailure => "MODBUS ERROR CODE 04 - SLAVE DEVICE FAILURE",
            ErrorKind::Acknowledge => "MODBUS ERROR CODE 05 - ACKNOWLEDGE",
            ErrorKind::SlaveDeviceBusy => "MODBUS ERROR CODE 06 - SLAVE DEVICE BUSY",
            ErrorKind::NegativeAcknowledge => "MODBUS ERROR CODE 07 - NEGATIVE ACKNOWLEDGE",
            ErrorKind::MemoryParityError => "MODBUS ERROR CODE 08 - MEMORY PARITY ERROR",
            ErrorKind::GatewayPathUnavailable => "MODBUS ERROR CODE 10 - GATEWAY PATH UNAVAILABLE",
            ErrorKind::GatewayTargetFailed => {
                "MODBUS ERROR CODE 11 - GATEWAY TARGET DEVICE FAILED TO RESPOND"
            }
            ErrorKind::UnknownError => "UNKNOWN MODBUS ERROR",
            ErrorKind::Ignored => "OPERATION IGNORED",
            ErrorKind::Failure => "OPERATION FAILED",
            ErrorKind::Timeout => "OPERATION TIMED OUT",
            ErrorKind::InvalidArgument => "INVALID ARGUMENT",
            ErrorKind::InvalidMode => "INVALID MODE OF OPERATION",
            ErrorKind::NotImplemented => "NOT IMPLEMENTED",
            ErrorKind::Capacity => "CALLBACK TABLE FULL",
            ErrorKind::Oob => "OUT OF BUFFER",
            ErrorKind::Transport => "TRANSPORT ERROR",
            ErrorKind::HostResolution => "HOSTNAME RESOLUTION FAILED",
            ErrorKind::ConnectionRefused => "CONNECTION REFUSED",
            ErrorKind::OpenSocket => "UNABLE TO OPEN SOCKET",
            ErrorKind::OpenSerial => "UNABLE TO OPEN SERIAL DEVICE",
            ErrorKind::SerialConfig => "INVALID SERIAL CONFIGURATION",
            ErrorKind::FrameCrcError => "FRAME CRC ERROR",
            ErrorKind::FrameBroken => "FRAME BROKEN",
        };
        write!(f, "{}", msg)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ErrorKind {}
