//! # ESP_33 Protocol Constants and Types
//!
//! Wire layout of the `ESP_33` message as expected by the brake-assist module.
//!
//! ```text
//! Byte 0: ESP_33_CHK                        [7:0]  XOR of bytes 1..7
//! Byte 1: ESP_33_BZ                         [3:0]  rolling counter 0-15
//! Byte 2: ESC_Warnruck_aktiv                [7:4]  0-9
//! Byte 4: ESC_Verz_Reg_aktiv                [7:4]  0-15
//!         ESC_Prefill_aktiv                 [0]
//! Byte 5: ESC_Verz_Reg_nicht_verfuegbar     [2]
//! Byte 7: ESC_Fahrer_Bremsdruck_bestimmend  [0]
//! ```
//!
//! Every bit not listed above is reserved and must stay zero.

/// CAN identifier of the ESP_33 message (11-bit standard frame)
pub const ESP_33_CAN_ID: u16 = 0x1AB;

/// Data length code; ESP_33 always carries 8 bytes
pub const ESP_33_DLC: usize = 8;

/// Index of the checksum byte
pub const ESP_33_CHECKSUM_BYTE: usize = 0;

/// Rolling counter wraps after this many values
pub const ESP_33_COUNTER_MODULUS: u8 = 16;

/// Raw ESP_33 payload
pub type FrameBytes = [u8; ESP_33_DLC];

/// Location and domain of one signal inside the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// Signal name as it appears in the vehicle message catalogue
    pub signal: &'static str,
    /// Human readable description
    pub description: &'static str,
    /// Byte index inside the payload
    pub byte: usize,
    /// Bits owned by the signal, already shifted into place
    pub mask: u8,
    /// Position of the signal's least significant bit
    pub shift: u8,
    /// Largest accepted value (inclusive)
    pub max: u8,
}

/// Settable ESP_33 signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    /// `ESP_33_BZ`, 4-bit rolling counter
    RollingCounter,
    /// `ESC_Warnruck_aktiv`, brake jerk warning source
    WarnPulseLevel,
    /// `ESC_Prefill_aktiv`
    PrefillActive,
    /// `ESC_Verz_Reg_aktiv`, deceleration request source
    DecelRegulationLevel,
    /// `ESC_Verz_Reg_nicht_verfuegbar`
    DecelRegulationUnavailable,
    /// `ESC_Fahrer_Bremsdruck_bestimmend`
    DriverBrakePressure,
}

impl Field {
    /// All settable fields in payload order.
    pub const ALL: [Field; 6] = [
        Field::RollingCounter,
        Field::WarnPulseLevel,
        Field::PrefillActive,
        Field::DecelRegulationLevel,
        Field::DecelRegulationUnavailable,
        Field::DriverBrakePressure,
    ];

    /// Returns the wire layout of this field.
    pub const fn spec(self) -> FieldSpec {
        match self {
            Field::RollingCounter => FieldSpec {
                signal: "ESP_33_BZ",
                description: "rolling counter",
                byte: 1,
                mask: 0b0000_1111,
                shift: 0,
                max: 15,
            },
            Field::WarnPulseLevel => FieldSpec {
                signal: "ESC_Warnruck_aktiv",
                description: "warn-pulse activation level",
                byte: 2,
                mask: 0b1111_0000,
                shift: 4,
                max: 9,
            },
            Field::PrefillActive => FieldSpec {
                signal: "ESC_Prefill_aktiv",
                description: "prefill active",
                byte: 4,
                mask: 0b0000_0001,
                shift: 0,
                max: 1,
            },
            Field::DecelRegulationLevel => FieldSpec {
                signal: "ESC_Verz_Reg_aktiv",
                description: "deceleration regulation activation level",
                byte: 4,
                mask: 0b1111_0000,
                shift: 4,
                max: 15,
            },
            Field::DecelRegulationUnavailable => FieldSpec {
                signal: "ESC_Verz_Reg_nicht_verfuegbar",
                description: "deceleration regulation unavailable",
                byte: 5,
                mask: 0b0000_0100,
                shift: 2,
                max: 1,
            },
            Field::DriverBrakePressure => FieldSpec {
                signal: "ESC_Fahrer_Bremsdruck_bestimmend",
                description: "driver brake pressure determining",
                byte: 7,
                mask: 0b0000_0001,
                shift: 0,
                max: 1,
            },
        }
    }

    /// Signal name of this field.
    pub const fn signal(self) -> &'static str {
        self.spec().signal
    }

    /// True for single-bit fields.
    pub const fn is_flag(self) -> bool {
        self.spec().max == 1
    }

    /// Value table of enumerated fields, indexed by raw value.
    ///
    /// Empty for fields without named values.
    pub fn value_labels(self) -> &'static [&'static str] {
        match self {
            Field::WarnPulseLevel => WARN_PULSE_VALUES,
            Field::DecelRegulationLevel => DECEL_REGULATION_VALUES,
            _ => &[],
        }
    }
}

/// Named values of `ESC_Warnruck_aktiv`
pub const WARN_PULSE_VALUES: &[&str] = &[
    "no_activity",
    "Activity_by_AWV",
    "Activity_by_vFGS",
    "Activity_by_RCTA",
    "Activity_by_FCWO",
    "Activity_by_FCWP",
    "Activity_by_EA",
    "Activity_by_PCF",
    "Activity_by_KAS",
    "Activity_by_AGW",
];

/// Named values of `ESC_Verz_Reg_aktiv`
pub const DECEL_REGULATION_VALUES: &[&str] = &[
    "keine_Aktivitaet",
    "Aktivitaet_TB_durch_AWV",
    "Aktivitaet_ZB_durch_AWV",
    "Aktivitaet_durch_vFGS",
    "Aktivitaet_durch_TSK",
    "Aktivitaet_durch_RCTA",
    "Aktivitaet_durch_PLA_IPA",
    "Aktivitaet_durch_STA",
    "Aktivitaet_durch_ARA",
    "Aktivitaet_durch_MKB",
    "Aktivitaet_durch_BFF",
    "Aktivitaet_durch_EA",
    "Aktivitaet_durch_PCF",
    "reserviert",
    "Initialisierung",
];

/// Bits that no signal owns, per byte. The checksum byte owns all of byte 0.
pub const RESERVED_MASK: FrameBytes = reserved_mask();

const fn reserved_mask() -> FrameBytes {
    let mut used = [0u8; ESP_33_DLC];
    used[ESP_33_CHECKSUM_BYTE] = 0xFF;

    let mut i = 0;
    while i < Field::ALL.len() {
        let spec = Field::ALL[i].spec();
        used[spec.byte] |= spec.mask;
        i += 1;
    }

    let mut reserved = [0u8; ESP_33_DLC];
    let mut b = 0;
    while b < ESP_33_DLC {
        reserved[b] = !used[b];
        b += 1;
    }

    reserved
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_constants() {
        assert_eq!(ESP_33_CAN_ID, 0x1AB);
        assert_eq!(ESP_33_DLC, 8);
        assert_eq!(ESP_33_CHECKSUM_BYTE, 0);
        assert_eq!(ESP_33_COUNTER_MODULUS, 16);
    }

    #[test]
    fn test_field_masks_are_disjoint() {
        for (i, a) in Field::ALL.iter().enumerate() {
            for b in Field::ALL.iter().skip(i + 1) {
                let (sa, sb) = (a.spec(), b.spec());
                if sa.byte == sb.byte {
                    assert_eq!(
                        sa.mask & sb.mask,
                        0,
                        "{} and {} overlap in byte {}",
                        sa.signal,
                        sb.signal,
                        sa.byte
                    );
                }
            }
        }
    }

    #[test]
    fn test_no_field_touches_checksum_byte() {
        for field in Field::ALL {
            assert_ne!(field.spec().byte, ESP_33_CHECKSUM_BYTE, "{:?}", field);
        }
    }

    #[test]
    fn test_masks_match_shift_and_max() {
        for field in Field::ALL {
            let spec = field.spec();
            let width = spec.mask.count_ones();
            assert_eq!(spec.mask >> spec.shift << spec.shift, spec.mask, "{:?}", field);
            assert_eq!((spec.mask >> spec.shift).trailing_ones(), width, "{:?}", field);
            assert!(u32::from(spec.max) < (1u32 << width), "{:?} max does not fit its mask", field);
        }
    }

    #[test]
    fn test_reserved_mask() {
        assert_eq!(RESERVED_MASK[0], 0x00);
        assert_eq!(RESERVED_MASK[1], 0xF0);
        assert_eq!(RESERVED_MASK[2], 0x0F);
        assert_eq!(RESERVED_MASK[3], 0xFF);
        assert_eq!(RESERVED_MASK[4], 0x0E);
        assert_eq!(RESERVED_MASK[5], 0xFB);
        assert_eq!(RESERVED_MASK[6], 0xFF);
        assert_eq!(RESERVED_MASK[7], 0xFE);
    }

    #[test]
    fn test_value_tables_fit_domain() {
        assert_eq!(WARN_PULSE_VALUES.len(), usize::from(Field::WarnPulseLevel.spec().max) + 1);
        assert!(DECEL_REGULATION_VALUES.len() <= usize::from(Field::DecelRegulationLevel.spec().max) + 1);
        assert!(Field::PrefillActive.value_labels().is_empty());
    }

    #[test]
    fn test_flags() {
        assert!(Field::PrefillActive.is_flag());
        assert!(Field::DecelRegulationUnavailable.is_flag());
        assert!(Field::DriverBrakePressure.is_flag());
        assert!(!Field::RollingCounter.is_flag());
        assert!(!Field::WarnPulseLevel.is_flag());
        assert!(!Field::DecelRegulationLevel.is_flag());
    }
}
