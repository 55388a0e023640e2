use flagset::flags;
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::ToPrimitive;
use phf::phf_map;

/// Magic value in the first four bytes of the header. Encoded little-endian,
/// a package file starts with the bytes `56 4D 50 47` ("VMPG").
pub const PACKAGE_MAGIC: u32 = 0x4750_4D56;

/// Major format version emitted and accepted by this crate.
pub const FORMAT_VERSION_MAJOR: u16 = 1;
/// Minor format version emitted and accepted by this crate.
pub const FORMAT_VERSION_MINOR: u16 = 0;

/// Size of the fixed package header in bytes.
pub const PACKAGE_HEADER_SIZE: usize = 64;
/// Size of one table-of-contents entry in bytes.
pub const TOC_ENTRY_SIZE: usize = 64;
/// Maximum number of TOC entries a package may carry.
pub const MAX_TOC_ENTRIES: u32 = 256;
/// Hard cap on the total package size in bytes.
pub const MAX_PACKAGE_SIZE: usize = 1_048_576;

/// Size of the program configuration record in bytes.
pub const CONFIG_SIZE: usize = 7372;
/// Size of one parameter record inside the configuration record.
pub const PARAMETER_SIZE: usize = 572;
/// Maximum number of parameters a program can expose.
pub const MAX_PARAMETERS: usize = 12;
/// Maximum number of value labels a parameter can carry.
pub const MAX_VALUE_LABELS: usize = 16;
/// Highest raw value a parameter can take.
pub const MAX_PARAMETER_VALUE: u16 = 1023;

/// Size of the signed descriptor in bytes.
pub const DESCRIPTOR_SIZE: usize = 332;
/// Maximum number of artifacts the signed descriptor can reference.
pub const MAX_ARTIFACTS: usize = 8;

/// Size of an Ed25519 signature payload in bytes.
pub const SIGNATURE_SIZE: usize = 64;
/// Size of a raw Ed25519 key file in bytes.
pub const KEY_SIZE: usize = 32;
/// Size of a SHA-256 digest in bytes.
pub const DIGEST_SIZE: usize = 32;

/// Wire value of the linear control mode, the default for every parameter.
pub const CONTROL_MODE_LINEAR: u32 = 0;
/// Highest control mode value the configuration schema defines.
pub const MAX_CONTROL_MODE: u32 = 35;

// Package header field offsets.
pub(crate) const HDR_MAGIC: usize = 0;
pub(crate) const HDR_VERSION_MAJOR: usize = 4;
pub(crate) const HDR_VERSION_MINOR: usize = 6;
pub(crate) const HDR_HEADER_SIZE: usize = 8;
pub(crate) const HDR_FILE_SIZE: usize = 12;
pub(crate) const HDR_FLAGS: usize = 16;
pub(crate) const HDR_TOC_OFFSET: usize = 20;
pub(crate) const HDR_TOC_BYTES: usize = 24;
pub(crate) const HDR_TOC_COUNT: usize = 28;
pub(crate) const HDR_PACKAGE_SHA256: usize = 32;

// TOC entry field offsets, relative to the entry.
pub(crate) const TOC_TYPE: usize = 0;
pub(crate) const TOC_FLAGS: usize = 4;
pub(crate) const TOC_OFFSET: usize = 8;
pub(crate) const TOC_SIZE: usize = 12;
pub(crate) const TOC_SHA256: usize = 16;

// Configuration record field offsets.
pub(crate) const CFG_PROGRAM_ID: usize = 0;
pub(crate) const CFG_PROGRAM_ID_LEN: usize = 64;
pub(crate) const CFG_VERSION_MAJOR: usize = 64;
pub(crate) const CFG_VERSION_MINOR: usize = 66;
pub(crate) const CFG_VERSION_PATCH: usize = 68;
pub(crate) const CFG_ABI_MIN_MAJOR: usize = 70;
pub(crate) const CFG_ABI_MIN_MINOR: usize = 72;
pub(crate) const CFG_ABI_MAX_MAJOR: usize = 74;
pub(crate) const CFG_ABI_MAX_MINOR: usize = 76;
pub(crate) const CFG_HW_MASK: usize = 78;
pub(crate) const CFG_CORE_ID: usize = 82;
pub(crate) const CFG_PROGRAM_NAME: usize = 86;
pub(crate) const CFG_PROGRAM_NAME_LEN: usize = 32;
pub(crate) const CFG_AUTHOR: usize = 118;
pub(crate) const CFG_AUTHOR_LEN: usize = 64;
pub(crate) const CFG_LICENSE: usize = 182;
pub(crate) const CFG_LICENSE_LEN: usize = 32;
pub(crate) const CFG_CATEGORY: usize = 214;
pub(crate) const CFG_CATEGORY_LEN: usize = 32;
pub(crate) const CFG_DESCRIPTION: usize = 246;
pub(crate) const CFG_DESCRIPTION_LEN: usize = 128;
pub(crate) const CFG_URL: usize = 374;
pub(crate) const CFG_URL_LEN: usize = 128;
pub(crate) const CFG_PARAMETER_COUNT: usize = 502;
pub(crate) const CFG_RESERVED_PAD: usize = 504;
pub(crate) const CFG_PARAMETERS: usize = 506;
pub(crate) const CFG_RESERVED_TAIL: usize = 7370;

// String fields of the configuration record: name, offset, width.
pub(crate) const CFG_STRING_FIELDS: [(&str, usize, usize); 7] = [
    ("program_id", CFG_PROGRAM_ID, CFG_PROGRAM_ID_LEN),
    ("program_name", CFG_PROGRAM_NAME, CFG_PROGRAM_NAME_LEN),
    ("author", CFG_AUTHOR, CFG_AUTHOR_LEN),
    ("license", CFG_LICENSE, CFG_LICENSE_LEN),
    ("category", CFG_CATEGORY, CFG_CATEGORY_LEN),
    ("description", CFG_DESCRIPTION, CFG_DESCRIPTION_LEN),
    ("url", CFG_URL, CFG_URL_LEN),
];

// Parameter record field offsets, relative to the record.
pub(crate) const PAR_ID: usize = 0;
pub(crate) const PAR_CONTROL_MODE: usize = 4;
pub(crate) const PAR_MIN: usize = 8;
pub(crate) const PAR_MAX: usize = 10;
pub(crate) const PAR_INITIAL: usize = 12;
pub(crate) const PAR_DISPLAY_MIN: usize = 14;
pub(crate) const PAR_DISPLAY_MAX: usize = 16;
pub(crate) const PAR_FLOAT_DIGITS: usize = 18;
pub(crate) const PAR_LABEL_COUNT: usize = 19;
pub(crate) const PAR_NAME: usize = 22;
pub(crate) const PAR_VALUE_LABELS: usize = 54;
pub(crate) const PAR_SUFFIX: usize = 566;
pub(crate) const PAR_LABEL_LEN: usize = 32;
pub(crate) const PAR_SUFFIX_LEN: usize = 4;

// Signed descriptor field offsets.
pub(crate) const DESC_CONFIG_SHA256: usize = 0;
pub(crate) const DESC_ARTIFACT_COUNT: usize = 32;
pub(crate) const DESC_ARTIFACTS: usize = 36;
pub(crate) const DESC_ARTIFACT_SIZE: usize = 36;
pub(crate) const DESC_FLAGS: usize = 324;
pub(crate) const DESC_BUILD_ID: usize = 328;

// The offset tables and the record sizes must agree.
const _: () = assert!(CFG_PARAMETERS + MAX_PARAMETERS * PARAMETER_SIZE == CFG_RESERVED_TAIL);
const _: () = assert!(CFG_RESERVED_TAIL + 2 == CONFIG_SIZE);
const _: () = assert!(PAR_VALUE_LABELS + MAX_VALUE_LABELS * PAR_LABEL_LEN == PAR_SUFFIX);
const _: () = assert!(PAR_SUFFIX + PAR_SUFFIX_LEN + 2 == PARAMETER_SIZE);
const _: () = assert!(DESC_ARTIFACTS + MAX_ARTIFACTS * DESC_ARTIFACT_SIZE == DESC_FLAGS);
const _: () = assert!(DESC_BUILD_ID + 4 == DESCRIPTOR_SIZE);

flags! {
    /// Package header flag. Directly corresponds to the header's flags field.
    pub enum PackageFlag: u32 {
        /// The package carries an Ed25519 SIGNATURE payload.
        Signed = 0x0001,
    }

    /// Hardware platform a program can run on. The configuration record
    /// stores the union of these as a bitmask.
    pub enum HardwareFlag: u32 {
        /// SD platform with analog video I/O
        SdAnalog = 0x01,
        /// SD platform with HDMI video I/O
        SdHdmi = 0x02,
        /// SD platform with both analog and HDMI I/O
        SdDual = 0x04,
        /// HD platform with analog video I/O
        HdAnalog = 0x08,
        /// HD platform with HDMI video I/O
        HdHdmi = 0x10,
        /// HD platform with both analog and HDMI I/O
        HdDual = 0x20,
    }
}

/// Payload type of a TOC entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, ToPrimitive)]
pub enum EntryKind {
    /// Unused entry
    None = 0,
    /// Program configuration record
    Config = 1,
    /// Signed descriptor, the Ed25519 signing input
    SignedDescriptor = 2,
    /// Detached Ed25519 signature over the signed descriptor
    Signature = 3,
    /// Generic FPGA bitstream, not emitted by the current producer
    FpgaBitstream = 4,
    /// SD analog bitstream
    BitstreamSdAnalog = 5,
    /// SD HDMI bitstream
    BitstreamSdHdmi = 6,
    /// SD dual-output bitstream
    BitstreamSdDual = 7,
    /// HD analog bitstream
    BitstreamHdAnalog = 8,
    /// HD HDMI bitstream
    BitstreamHdHdmi = 9,
    /// HD dual-output bitstream
    BitstreamHdDual = 10,
}

impl EntryKind {
    /// Whether the entry carries FPGA bitstream data.
    pub fn is_bitstream(self) -> bool {
        self.to_u32().unwrap() >= 4
    }

    /// Returns the entry type's name as it appears in the format
    /// specification.
    pub fn name(self) -> &'static str {
        match self {
            EntryKind::None => "NONE",
            EntryKind::Config => "CONFIG",
            EntryKind::SignedDescriptor => "SIGNED_DESCRIPTOR",
            EntryKind::Signature => "SIGNATURE",
            EntryKind::FpgaBitstream => "FPGA_BITSTREAM",
            EntryKind::BitstreamSdAnalog => "BITSTREAM_SD_ANALOG",
            EntryKind::BitstreamSdHdmi => "BITSTREAM_SD_HDMI",
            EntryKind::BitstreamSdDual => "BITSTREAM_SD_DUAL",
            EntryKind::BitstreamHdAnalog => "BITSTREAM_HD_ANALOG",
            EntryKind::BitstreamHdHdmi => "BITSTREAM_HD_HDMI",
            EntryKind::BitstreamHdDual => "BITSTREAM_HD_DUAL",
        }
    }
}

/// Bitstream file names recognized in a program's `bitstreams/` directory,
/// in scan order. The order matches the entry type values ascending and
/// determines payload order in the package.
pub static BITSTREAM_FILES: [(EntryKind, &str); 6] = [
    (EntryKind::BitstreamSdAnalog, "sd_analog.bin"),
    (EntryKind::BitstreamSdHdmi, "sd_hdmi.bin"),
    (EntryKind::BitstreamSdDual, "sd_dual.bin"),
    (EntryKind::BitstreamHdAnalog, "hd_analog.bin"),
    (EntryKind::BitstreamHdHdmi, "hd_hdmi.bin"),
    (EntryKind::BitstreamHdDual, "hd_dual.bin"),
];

/// Video pixel pipeline a program targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, ToPrimitive)]
pub enum CoreKind {
    /// 30-bit YUV 4:4:4 pipeline, the platform default
    Yuv444_30b = 0,
    /// 20-bit YUV 4:2:2 pipeline
    Yuv422_20b = 1,
    /// 24-bit RGB 4:4:4 pipeline
    Rgb444_24b = 2,
}

/// Physical control slot a parameter is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, ToPrimitive)]
pub enum ParameterId {
    /// Not bound to a control
    None = 0,
    /// Rotary control 1
    Knob1 = 1,
    /// Rotary control 2
    Knob2 = 2,
    /// Rotary control 3
    Knob3 = 3,
    /// Rotary control 4
    Knob4 = 4,
    /// Rotary control 5
    Knob5 = 5,
    /// Rotary control 6
    Knob6 = 6,
    /// Rotary control 7
    Knob7 = 7,
    /// Rotary control 8
    Knob8 = 8,
    /// Toggle control 1
    Switch1 = 9,
    /// Toggle control 2
    Switch2 = 10,
    /// Toggle control 3
    Switch3 = 11,
    /// Toggle control 4
    Switch4 = 12,
}

pub(crate) static HARDWARE_FLAG_NAMES: phf::Map<&'static str, HardwareFlag> = phf_map! {
    "sd_analog" => HardwareFlag::SdAnalog,
    "sd_hdmi" => HardwareFlag::SdHdmi,
    "sd_dual" => HardwareFlag::SdDual,
    "hd_analog" => HardwareFlag::HdAnalog,
    "hd_hdmi" => HardwareFlag::HdHdmi,
    "hd_dual" => HardwareFlag::HdDual,
};

pub(crate) static CORE_NAMES: phf::Map<&'static str, CoreKind> = phf_map! {
    "yuv444_30b" => CoreKind::Yuv444_30b,
    "yuv422_20b" => CoreKind::Yuv422_20b,
    "rgb444_24b" => CoreKind::Rgb444_24b,
};

pub(crate) static PARAMETER_ID_NAMES: phf::Map<&'static str, ParameterId> = phf_map! {
    "none" => ParameterId::None,
    "knob1" => ParameterId::Knob1,
    "knob2" => ParameterId::Knob2,
    "knob3" => ParameterId::Knob3,
    "knob4" => ParameterId::Knob4,
    "knob5" => ParameterId::Knob5,
    "knob6" => ParameterId::Knob6,
    "knob7" => ParameterId::Knob7,
    "knob8" => ParameterId::Knob8,
    "switch1" => ParameterId::Switch1,
    "switch2" => ParameterId::Switch2,
    "switch3" => ParameterId::Switch3,
    "switch4" => ParameterId::Switch4,
};

// The wire field is a plain bounded integer; only the commonly used modes
// have names in the source document.
pub(crate) static CONTROL_MODE_NAMES: phf::Map<&'static str, u32> = phf_map! {
    "linear" => 0,
    "inverted" => 1,
    "log" => 2,
    "inverted_log" => 3,
    "exp" => 4,
    "inverted_exp" => 5,
    "stepped" => 6,
    "bipolar" => 7,
    "toggle" => 8,
    "momentary" => 9,
};
