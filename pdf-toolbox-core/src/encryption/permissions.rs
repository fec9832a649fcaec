//! User access permissions stored in the `/P` entry of the encryption
//! dictionary (ISO 32000-1 Table 22)

use serde::{Deserialize, Serialize};

const PRINT: u32 = 1 << 2;
const MODIFY_CONTENTS: u32 = 1 << 3;
const COPY: u32 = 1 << 4;
const MODIFY_ANNOTATIONS: u32 = 1 << 5;
const FILL_FORMS: u32 = 1 << 8;
const ACCESSIBILITY: u32 = 1 << 9;
const ASSEMBLE: u32 = 1 << 10;
const PRINT_HIGH_QUALITY: u32 = 1 << 11;

/// Permission bits (32-bit value)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permissions {
    bits: u32,
}

/// The four switches offered by the encrypt panel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionFlags {
    /// Low and high quality printing
    pub allow_printing: bool,
    /// Text and graphics extraction, including accessibility
    pub allow_copying: bool,
    /// Content modification, form filling and page assembly
    pub allow_modification: bool,
    /// Adding and editing annotations
    pub allow_annotations: bool,
}

impl Default for PermissionFlags {
    fn default() -> Self {
        Self {
            allow_printing: true,
            allow_copying: true,
            allow_modification: false,
            allow_annotations: true,
        }
    }
}

impl Permissions {
    /// All operations prohibited.
    ///
    /// Bits 1-2 are 0, bits 7-8 and 13-32 are 1.
    pub fn new() -> Self {
        Self { bits: 0xFFFF_F0C0 }
    }

    pub fn all() -> Self {
        Self {
            bits: Self::new().bits
                | PRINT
                | MODIFY_CONTENTS
                | COPY
                | MODIFY_ANNOTATIONS
                | FILL_FORMS
                | ACCESSIBILITY
                | ASSEMBLE
                | PRINT_HIGH_QUALITY,
        }
    }

    pub fn from_flags(flags: PermissionFlags) -> Self {
        let mut perm = Self::new();
        if flags.allow_printing {
            perm.bits |= PRINT | PRINT_HIGH_QUALITY;
        }
        if flags.allow_copying {
            perm.bits |= COPY | ACCESSIBILITY;
        }
        if flags.allow_modification {
            perm.bits |= MODIFY_CONTENTS | FILL_FORMS | ASSEMBLE;
        }
        if flags.allow_annotations {
            perm.bits |= MODIFY_ANNOTATIONS;
        }
        perm
    }

    pub fn bits(&self) -> u32 {
        self.bits
    }

    /// Value written to `/P`, which PDF stores as a signed integer
    pub fn as_p_value(&self) -> i32 {
        self.bits as i32
    }

    pub fn from_p_value(p: i64) -> Self {
        Self { bits: p as u32 }
    }

    pub fn can_print(&self) -> bool {
        self.bits & PRINT != 0
    }

    pub fn can_modify_contents(&self) -> bool {
        self.bits & MODIFY_CONTENTS != 0
    }

    pub fn can_copy(&self) -> bool {
        self.bits & COPY != 0
    }

    pub fn can_modify_annotations(&self) -> bool {
        self.bits & MODIFY_ANNOTATIONS != 0
    }

    pub fn can_fill_forms(&self) -> bool {
        self.bits & FILL_FORMS != 0
    }

    pub fn can_assemble(&self) -> bool {
        self.bits & ASSEMBLE != 0
    }

    /// Flags as the encrypt panel would show them for an existing file
    pub fn flags(&self) -> PermissionFlags {
        PermissionFlags {
            allow_printing: self.can_print(),
            allow_copying: self.can_copy(),
            allow_modification: self.can_modify_contents(),
            allow_annotations: self.can_modify_annotations(),
        }
    }
}

impl Default for Permissions {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_permissions() {
        let perm = Permissions::new();
        assert_eq!(perm.bits(), 0xFFFF_F0C0);
        assert!(!perm.can_print());
        assert!(!perm.can_copy());
        assert_eq!(perm.as_p_value(), -3904);
    }

    #[test]
    fn test_printing_sets_both_print_bits() {
        let perm = Permissions::from_flags(PermissionFlags {
            allow_printing: true,
            allow_copying: false,
            allow_modification: false,
            allow_annotations: false,
        });
        assert!(perm.can_print());
        assert_ne!(perm.bits() & PRINT_HIGH_QUALITY, 0);
        assert!(!perm.can_copy());
    }

    #[test]
    fn test_modification_grants_forms_and_assembly() {
        let perm = Permissions::from_flags(PermissionFlags {
            allow_printing: false,
            allow_copying: false,
            allow_modification: true,
            allow_annotations: false,
        });
        assert!(perm.can_modify_contents());
        assert!(perm.can_fill_forms());
        assert!(perm.can_assemble());
        assert!(!perm.can_modify_annotations());
    }

    #[test]
    fn test_p_value_round_trip() {
        let perm = Permissions::from_flags(PermissionFlags::default());
        let restored = Permissions::from_p_value(i64::from(perm.as_p_value()));
        assert_eq!(restored, perm);
        assert_eq!(restored.flags(), PermissionFlags::default());
        assert_eq!(Permissions::all().flags().allow_modification, true);
    }
}
