// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::{error, fmt, result};

/// A result of a function that may return a `Error`.
pub type Result<T> = result::Result<T, RtlsdrError>;

// Macro to create an error enum with From converters for each input error class
macro_rules! define_errcodes {
    [ $typename:ident => $( $name:ident $(: $class:ty)? ),+ ] => {
        #[derive(Debug)]
        pub enum $typename {
            $(
                $name $( ($class) )?,
            )+
        }

        impl fmt::Display for $typename {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                match *self {
                    $(
                        $typename::$name(ref err) => err.fmt(f),
                    )+
                }
            }
        }

        $( $(
            impl From<$class> for $typename {
                fn from(e: $class) -> Self {
                    $typename::$name(e)
                }
            } )?
        )+
    };
}

/// Detail carried by `RtlsdrError::TransportError`. One of these is built for
/// every USB control/bulk operation that returns a non-zero result code or a
/// `rusb` runtime error, so the error handler installed on the controller can
/// log precisely which operation failed.
#[derive(Debug)]
pub struct TransportErrorDetail {
    pub op: &'static str,
    pub value: u16,
    pub index: u16,
    pub code: Option<i32>,
    pub message: String,
}

impl fmt::Display for TransportErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "USB transport error during {} (value={:#06x}, index={:#06x}): {}",
            self.op, self.value, self.index, self.message
        )?;
        if let Some(code) = self.code {
            write!(f, " (code {})", code)?;
        }
        Ok(())
    }
}

define_errcodes![
    RtlsdrError =>
    Usb : rusb::Error,
    RtlsdrErr: String,
    PermissionDenied: String,
    DeviceNotFound: String,
    UnsupportedTuner: String,
    PllNotLocked: String,
    InvalidState: String,
    TransportError: TransportErrorDetail
];

impl RtlsdrError {
    pub fn transport(op: &'static str, value: u16, index: u16, message: impl Into<String>) -> Self {
        RtlsdrError::TransportError(TransportErrorDetail {
            op,
            value,
            index,
            code: None,
            message: message.into(),
        })
    }
}

impl error::Error for RtlsdrError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            RtlsdrError::Usb(e) => Some(e),
            _ => None,
        }
    }
}
