//! Contract Table - the paths the downstream reader trusts blindly
//!
//! Scalar fields are described as data ([`SCALAR_FIELDS`]); the validator
//! iterates the table instead of branching per field.

use crate::container::ElementType;

pub const DATA_GROUP: &str = "/entry/data";
pub const DETECTOR_GROUP: &str = "/entry/instrument/detector";
pub const DETECTOR_SPECIFIC_GROUP: &str = "/entry/instrument/detector/detectorSpecific";

/// Groups that must resolve, checked in this order.
pub const REQUIRED_GROUPS: [&str; 3] = [DATA_GROUP, DETECTOR_GROUP, DETECTOR_SPECIFIC_GROUP];

pub const X_PIXEL_SIZE: &str = "/entry/instrument/detector/x_pixel_size";
pub const Y_PIXEL_SIZE: &str = "/entry/instrument/detector/y_pixel_size";
pub const NTRIGGER: &str = "/entry/instrument/detector/detectorSpecific/ntrigger";
pub const NIMAGES: &str = "/entry/instrument/detector/detectorSpecific/nimages";
pub const PIXEL_MASK: &str = "/entry/instrument/detector/detectorSpecific/pixel_mask";
pub const FLATFIELD: &str = "/entry/instrument/detector/detectorSpecific/flatfield";
pub const X_PIXELS_IN_DETECTOR: &str =
    "/entry/instrument/detector/detectorSpecific/x_pixels_in_detector";

pub const PIXEL_MASK_TYPE: ElementType = ElementType::UInt32;

/// Mask bit the reader maps to -1 (gap or dead pixel).
pub const MASK_GAP_BIT: u32 = 0b00001;
/// Mask bits the reader maps to -2 (overload, module edge).
pub const MASK_DEFECT_BITS: u32 = 0b11110;

pub const SINGLE_ENTRY_NAME: &str = "data";
pub const ENTRY_PREFIX: &str = "data_";
pub const ENTRY_DIGITS: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Required,
    /// Absence is tolerated; the reader falls back as described.
    Optional { fallback: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldRule {
    pub path: &'static str,
    pub presence: Presence,
    pub accepted: &'static [ElementType],
    /// Value must be strictly greater than zero.
    pub positive: bool,
}

impl FieldRule {
    pub fn accepts(&self, element_type: ElementType) -> bool {
        self.accepted.contains(&element_type)
    }

    /// Human-readable list of accepted types, e.g. `either float32 or float64`.
    pub fn accepted_description(&self) -> String {
        if self.accepted == ElementType::INTEGERS.as_slice() {
            return "an integer".to_string();
        }
        let names: Vec<_> = self.accepted.iter().map(|t| t.name()).collect();
        match names.split_last() {
            Some((last, [])) => last.to_string(),
            Some((last, rest)) => format!("either {} or {}", rest.join(", "), last),
            None => "nothing".to_string(),
        }
    }
}

pub static SCALAR_FIELDS: [FieldRule; 4] = [
    FieldRule {
        path: X_PIXEL_SIZE,
        presence: Presence::Optional { fallback: "the reader will return 0.0 for qx" },
        accepted: &ElementType::FLOATS,
        positive: false,
    },
    FieldRule {
        path: Y_PIXEL_SIZE,
        presence: Presence::Optional { fallback: "the reader will return 0.0 for qy" },
        accepted: &ElementType::FLOATS,
        positive: false,
    },
    FieldRule {
        path: NTRIGGER,
        presence: Presence::Optional { fallback: "the reader will assume ntrigger = 1" },
        accepted: &ElementType::INTEGERS,
        positive: true,
    },
    FieldRule {
        path: NIMAGES,
        presence: Presence::Required,
        accepted: &ElementType::INTEGERS,
        positive: true,
    },
];

/// Look up the rule for a scalar field.
pub fn scalar_rule(path: &str) -> Option<&'static FieldRule> {
    SCALAR_FIELDS.iter().find(|rule| rule.path == path)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
}

impl Axis {
    pub fn pixel_size_path(self) -> &'static str {
        match self {
            Axis::X => X_PIXEL_SIZE,
            Axis::Y => Y_PIXEL_SIZE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryName {
    /// `data`, written when everything lives in the master file.
    Single,
    /// `data_NNNNNN`.
    Numbered,
    Unrecognized,
}

impl EntryName {
    pub fn is_accepted(self) -> bool {
        !matches!(self, EntryName::Unrecognized)
    }
}

/// Classify a member of [`DATA_GROUP`] without a pattern engine.
pub fn classify_entry_name(name: &str) -> EntryName {
    if name == SINGLE_ENTRY_NAME {
        return EntryName::Single;
    }
    let Some(digits) = name.strip_prefix(ENTRY_PREFIX) else {
        return EntryName::Unrecognized;
    };
    if digits.len() == ENTRY_DIGITS && digits.bytes().all(|b| b.is_ascii_digit()) {
        EntryName::Numbered
    } else {
        EntryName::Unrecognized
    }
}

/// Absolute path of a member of [`DATA_GROUP`].
pub fn entry_path(name: &str) -> String {
    format!("{DATA_GROUP}/{name}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_names() {
        assert_eq!(classify_entry_name("data"), EntryName::Single);
        assert_eq!(classify_entry_name("data_000001"), EntryName::Numbered);
        assert_eq!(classify_entry_name("data_123456"), EntryName::Numbered);
        assert_eq!(classify_entry_name("data_00001"), EntryName::Unrecognized);
        assert_eq!(classify_entry_name("data_0000001"), EntryName::Unrecognized);
        assert_eq!(classify_entry_name("data_00000a"), EntryName::Unrecognized);
        assert_eq!(classify_entry_name("data_+00001"), EntryName::Unrecognized);
        assert_eq!(classify_entry_name("Data"), EntryName::Unrecognized);
        assert_eq!(classify_entry_name("mask"), EntryName::Unrecognized);
    }

    #[test]
    fn test_table_covers_scalar_fields() {
        assert_eq!(scalar_rule(NIMAGES).unwrap().presence, Presence::Required);
        assert!(matches!(
            scalar_rule(NTRIGGER).unwrap().presence,
            Presence::Optional { .. }
        ));
        assert!(scalar_rule(PIXEL_MASK).is_none());
    }

    #[test]
    fn test_accepted_description() {
        assert_eq!(
            scalar_rule(X_PIXEL_SIZE).unwrap().accepted_description(),
            "either float32 or float64"
        );
        assert_eq!(scalar_rule(NIMAGES).unwrap().accepted_description(), "an integer");
    }

    #[test]
    fn test_mask_bits_cover_low_five() {
        assert_eq!(MASK_GAP_BIT | MASK_DEFECT_BITS, 0b11111);
        assert_eq!(MASK_GAP_BIT & MASK_DEFECT_BITS, 0);
    }
}
