//! Property types and well-known property ids.

use std::fmt;

/// Property value type, the low 16 bits of a property tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyType {
    Null,
    Integer16,
    Integer32,
    Floating32,
    Floating64,
    Currency,
    FloatingTime,
    ErrorCode,
    Boolean,
    Object,
    Integer64,
    String8,
    Unicode,
    Time,
    Guid,
    Binary,
    MultipleInteger16,
    MultipleInteger32,
    MultipleFloating32,
    MultipleFloating64,
    MultipleCurrency,
    MultipleFloatingTime,
    MultipleInteger64,
    MultipleString8,
    MultipleUnicode,
    MultipleTime,
    MultipleGuid,
    MultipleBinary,
    Unknown(u16),
}

impl PropertyType {
    /// Returns `true` for types whose value fits in the 4-byte slot of a
    /// property context record.
    pub fn is_inline_in_property_context(&self) -> bool {
        matches!(
            self,
            PropertyType::Null
                | PropertyType::Integer16
                | PropertyType::Integer32
                | PropertyType::Floating32
                | PropertyType::ErrorCode
                | PropertyType::Boolean
        )
    }

    /// Returns `true` for the 4-byte table columns stored inline rather than
    /// as a heap reference.
    pub fn is_inline_in_table_cell(&self) -> bool {
        matches!(
            self,
            PropertyType::Integer32 | PropertyType::Floating32 | PropertyType::ErrorCode
        )
    }

    pub fn is_multi_valued(&self) -> bool {
        u16::from(*self) & 0x1000 != 0
    }
}

impl From<u16> for PropertyType {
    fn from(value: u16) -> Self {
        match value {
            0x0001 => Self::Null,
            0x0002 => Self::Integer16,
            0x0003 => Self::Integer32,
            0x0004 => Self::Floating32,
            0x0005 => Self::Floating64,
            0x0006 => Self::Currency,
            0x0007 => Self::FloatingTime,
            0x000A => Self::ErrorCode,
            0x000B => Self::Boolean,
            0x000D => Self::Object,
            0x0014 => Self::Integer64,
            0x001E => Self::String8,
            0x001F => Self::Unicode,
            0x0040 => Self::Time,
            0x0048 => Self::Guid,
            0x0102 => Self::Binary,
            0x1002 => Self::MultipleInteger16,
            0x1003 => Self::MultipleInteger32,
            0x1004 => Self::MultipleFloating32,
            0x1005 => Self::MultipleFloating64,
            0x1006 => Self::MultipleCurrency,
            0x1007 => Self::MultipleFloatingTime,
            0x1014 => Self::MultipleInteger64,
            0x101E => Self::MultipleString8,
            0x101F => Self::MultipleUnicode,
            0x1040 => Self::MultipleTime,
            0x1048 => Self::MultipleGuid,
            0x1102 => Self::MultipleBinary,
            other => Self::Unknown(other),
        }
    }
}

impl From<PropertyType> for u16 {
    fn from(value: PropertyType) -> Self {
        match value {
            PropertyType::Null => 0x0001,
            PropertyType::Integer16 => 0x0002,
            PropertyType::Integer32 => 0x0003,
            PropertyType::Floating32 => 0x0004,
            PropertyType::Floating64 => 0x0005,
            PropertyType::Currency => 0x0006,
            PropertyType::FloatingTime => 0x0007,
            PropertyType::ErrorCode => 0x000A,
            PropertyType::Boolean => 0x000B,
            PropertyType::Object => 0x000D,
            PropertyType::Integer64 => 0x0014,
            PropertyType::String8 => 0x001E,
            PropertyType::Unicode => 0x001F,
            PropertyType::Time => 0x0040,
            PropertyType::Guid => 0x0048,
            PropertyType::Binary => 0x0102,
            PropertyType::MultipleInteger16 => 0x1002,
            PropertyType::MultipleInteger32 => 0x1003,
            PropertyType::MultipleFloating32 => 0x1004,
            PropertyType::MultipleFloating64 => 0x1005,
            PropertyType::MultipleCurrency => 0x1006,
            PropertyType::MultipleFloatingTime => 0x1007,
            PropertyType::MultipleInteger64 => 0x1014,
            PropertyType::MultipleString8 => 0x101E,
            PropertyType::MultipleUnicode => 0x101F,
            PropertyType::MultipleTime => 0x1040,
            PropertyType::MultipleGuid => 0x1048,
            PropertyType::MultipleBinary => 0x1102,
            PropertyType::Unknown(other) => other,
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}({:#06x})", self, u16::from(*self))
    }
}

/// Well-known property ids (the high 16 bits of a property tag).
pub mod tags {
    pub const MESSAGE_CLASS: u16 = 0x001A;
    pub const SUBJECT: u16 = 0x0037;
    pub const CLIENT_SUBMIT_TIME: u16 = 0x0039;
    pub const SENT_REPRESENTING_NAME: u16 = 0x0042;
    pub const CONVERSATION_TOPIC: u16 = 0x0070;
    pub const CONVERSATION_INDEX: u16 = 0x0071;
    pub const TRANSPORT_MESSAGE_HEADERS: u16 = 0x007D;
    pub const RECIPIENT_TYPE: u16 = 0x0C15;
    pub const SENDER_NAME: u16 = 0x0C1A;
    pub const SENDER_EMAIL_ADDRESS: u16 = 0x0C1F;
    pub const DISPLAY_TO: u16 = 0x0E04;
    pub const MESSAGE_DELIVERY_TIME: u16 = 0x0E06;
    pub const MESSAGE_FLAGS: u16 = 0x0E07;
    pub const MESSAGE_SIZE: u16 = 0x0E08;
    pub const ATTACH_SIZE: u16 = 0x0E20;
    pub const IMPORTANCE: u16 = 0x0017;
    pub const BODY: u16 = 0x1000;
    pub const RTF_COMPRESSED: u16 = 0x1009;
    pub const BODY_HTML: u16 = 0x1013;
    pub const INTERNET_MESSAGE_ID: u16 = 0x1035;
    pub const DISPLAY_NAME: u16 = 0x3001;
    pub const ADDRESS_TYPE: u16 = 0x3002;
    pub const EMAIL_ADDRESS: u16 = 0x3003;
    pub const CREATION_TIME: u16 = 0x3007;
    pub const LAST_MODIFICATION_TIME: u16 = 0x3008;
    pub const ATTACH_DATA: u16 = 0x3701;
    pub const ATTACH_FILENAME: u16 = 0x3704;
    pub const ATTACH_METHOD: u16 = 0x3705;
    pub const ATTACH_LONG_FILENAME: u16 = 0x3707;
    pub const ATTACH_MIME_TAG: u16 = 0x370E;
    pub const ATTACH_CONTENT_ID: u16 = 0x3712;
    pub const GIVEN_NAME: u16 = 0x3A06;
    pub const BUSINESS_TELEPHONE: u16 = 0x3A08;
    pub const HOME_TELEPHONE: u16 = 0x3A09;
    pub const SURNAME: u16 = 0x3A11;
    pub const COMPANY_NAME: u16 = 0x3A16;
    pub const TITLE: u16 = 0x3A17;
    pub const MOBILE_TELEPHONE: u16 = 0x3A1C;
    pub const SMTP_ADDRESS: u16 = 0x39FE;
    pub const CONTENT_COUNT: u16 = 0x3602;
    pub const CONTENT_UNREAD_COUNT: u16 = 0x3603;
    pub const SUBFOLDERS: u16 = 0x360A;
    pub const CONTAINER_CLASS: u16 = 0x3613;
    pub const INTERNET_CODEPAGE: u16 = 0x3FDE;
    pub const MESSAGE_CODEPAGE: u16 = 0x3FFD;
    pub const LTP_ROW_ID: u16 = 0x67F2;
    pub const LTP_ROW_VERSION: u16 = 0x67F3;
    pub const RECORD_KEY: u16 = 0x0FF9;
    pub const ENTRY_ID: u16 = 0x0FFF;
}
