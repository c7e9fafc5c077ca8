/// Implements the string conversions shared by identifiers the remote source
/// hands out verbatim.
#[macro_export]
#[doc(hidden)]
macro_rules! impl_string_id {
    ($type:ident) => {
        impl $type {
            pub fn new(id: impl Into<String>) -> Self {
                $type(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl core::fmt::Display for $type {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl core::str::FromStr for $type {
            type Err = core::convert::Infallible;

            fn from_str(id: &str) -> Result<Self, Self::Err> {
                Ok($type(id.to_string()))
            }
        }

        impl From<&str> for $type {
            fn from(id: &str) -> Self {
                $type(id.to_string())
            }
        }

        impl From<String> for $type {
            fn from(id: String) -> Self {
                $type(id)
            }
        }
    };
}

/// Implements the integer conversions for identifiers the store assigns.
#[macro_export]
#[doc(hidden)]
macro_rules! impl_serial_id {
    ($type:ident) => {
        impl $type {
            pub fn as_i64(&self) -> i64 {
                self.0
            }
        }

        impl core::fmt::Display for $type {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $type {
            fn from(id: i64) -> Self {
                $type(id)
            }
        }
    };
}
