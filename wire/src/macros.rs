//! Declaration macros for wire enums and event payloads.
//!
//! Each payload is declared once as a field list; the layout, width, and
//! read/write code for every kind is generated from that single declaration.

/// Declares a one-byte enum field.
///
/// Unknown discriminants are rejected on read so that a decoded payload always
/// re-encodes to the exact bytes it came from.
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $raw:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        #[repr(u8)]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $raw ),+
        }

        impl $name {
            /// Every variant, in discriminant order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// Parses a raw discriminant.
            #[must_use]
            pub const fn from_raw(raw: u8) -> Option<Self> {
                match raw {
                    $( $raw => Some(Self::$variant), )+
                    _ => None,
                }
            }

            /// Returns the raw discriminant.
            #[must_use]
            pub const fn raw(self) -> u8 {
                self as u8
            }
        }

        impl $crate::field::WireField for $name {
            const WIDTH: usize = 1;

            fn write(self, writer: &mut stream::ByteWriter) {
                writer.write_u8(self.raw());
            }

            fn read(
                reader: &mut stream::ByteReader<'_>,
            ) -> Result<Self, $crate::error::FieldError> {
                let raw = reader.read_u8()?;
                Self::from_raw(raw).ok_or($crate::error::FieldError::InvalidValue {
                    field: stringify!($name),
                    raw: u32::from(raw),
                })
            }
        }
    };
}

/// Declares every event kind, its payload struct, and the [`Payload`] sum type.
///
/// [`Payload`]: crate::Payload
macro_rules! define_events {
    (
        $(
            $(#[$meta:meta])*
            $name:ident = $tag:literal {
                $( $(#[$fmeta:meta])* $field:ident : $ty:ty ),+ $(,)?
            }
        )+
    ) => {
        /// Event kind discriminant, written as the first byte of every frame.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        #[repr(u8)]
        pub enum EventKind {
            $( $name = $tag ),+
        }

        impl EventKind {
            /// Every kind, in tag order.
            pub const ALL: &'static [Self] = &[$(Self::$name),+];

            /// Parses a raw tag.
            #[must_use]
            pub const fn from_tag(tag: u8) -> Option<Self> {
                match tag {
                    $( $tag => Some(Self::$name), )+
                    _ => None,
                }
            }

            /// Returns the raw tag.
            #[must_use]
            pub const fn tag(self) -> u8 {
                self as u8
            }

            /// Static payload width in bytes (excluding the frame header).
            #[must_use]
            pub const fn payload_width(self) -> usize {
                match self {
                    $( Self::$name => $name::WIDTH, )+
                }
            }

            /// Human-readable kind name.
            #[must_use]
            pub const fn name(self) -> &'static str {
                match self {
                    $( Self::$name => stringify!($name), )+
                }
            }
        }

        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Default)]
            #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
            pub struct $name {
                $( $(#[$fmeta])* pub $field: $ty ),+
            }

            impl $name {
                /// Encoded payload width in bytes.
                pub const WIDTH: usize =
                    0 $( + <$ty as $crate::field::WireField>::WIDTH )+;

                /// Produces an empty payload of this kind, ready to read itself.
                #[must_use]
                pub fn empty_payload() -> Payload {
                    Payload::$name(Self::default())
                }

                fn write_fields(&self, writer: &mut stream::ByteWriter) {
                    $( $crate::field::WireField::write(self.$field, writer); )+
                }

                fn read_fields(
                    &mut self,
                    reader: &mut stream::ByteReader<'_>,
                ) -> Result<(), $crate::error::FieldError> {
                    $( self.$field = <$ty as $crate::field::WireField>::read(reader)?; )+
                    Ok(())
                }
            }

            impl From<$name> for Payload {
                fn from(payload: $name) -> Self {
                    Self::$name(payload)
                }
            }
        )+

        /// Kind-specific payload of an [`Event`](crate::Event).
        #[derive(Debug, Clone, Copy, PartialEq)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        pub enum Payload {
            $( $name($name) ),+
        }

        impl Payload {
            /// Returns the kind tag of this payload.
            #[must_use]
            pub const fn kind(&self) -> EventKind {
                match self {
                    $( Self::$name(_) => EventKind::$name, )+
                }
            }

            /// Produces the empty payload for `kind`.
            #[must_use]
            pub fn empty(kind: EventKind) -> Self {
                match kind {
                    $( EventKind::$name => $name::empty_payload(), )+
                }
            }

            pub(crate) fn write_body(&self, writer: &mut stream::ByteWriter) {
                match self {
                    $( Self::$name(payload) => payload.write_fields(writer), )+
                }
            }

            pub(crate) fn read_body(
                &mut self,
                reader: &mut stream::ByteReader<'_>,
            ) -> Result<(), $crate::error::FieldError> {
                match self {
                    $( Self::$name(payload) => payload.read_fields(reader), )+
                }
            }
        }

        pub(crate) fn standard_factories() -> Vec<(EventKind, $crate::registry::PayloadFactory)> {
            vec![ $( (EventKind::$name, $name::empty_payload as $crate::registry::PayloadFactory) ),+ ]
        }
    };
}
