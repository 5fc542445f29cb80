/*
Copyright 2025 Connor Nolan

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

//! Symbolic bit-fields: a label that hasn't been resolved to an address yet,
//! optionally sliced to a sub-range. `Field` unifies these with the concrete
//! fields from [`crate::bits`] so the format stage can treat both uniformly
//! until survey resolves the symbolic ones away.

use crate::bits::{self, BitsError, Concrete};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Absolute address: `u(addr, 32)`.
    Imm,
    /// PC-relative displacement: `i(addr - instr_addr, 32)`.
    Off,
}

/// A label reference, e.g. `main[19:12]` tagged `off8`. `hi`/`lo` are `None`
/// until either written explicitly in the source or populated by
/// [`apply_default_slice`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub label: String,
    pub mode: Mode,
    pub mode_width: u32,
    pub hi: Option<u32>,
    pub lo: Option<u32>,
    pub extra_tags: Vec<String>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReferenceError {
    #[error("slice [{hi}:{lo}] is reversed (hi < lo)")]
    ReversedSlice { hi: u32, lo: u32 },
    #[error(
        "slice [{hi}:{lo}] does not fit inside reference `{label}`'s own range [{outer_hi}:{outer_lo}]"
    )]
    OutOfOuterBounds {
        label: String,
        hi: u32,
        lo: u32,
        outer_hi: u32,
        outer_lo: u32,
    },
    #[error("reference `{label}` has an explicit range of width {actual}, but this position requires width {expected}")]
    WidthMismatch {
        label: String,
        expected: u32,
        actual: u32,
    },
    #[error(transparent)]
    Concrete(#[from] BitsError),
}

impl Reference {
    pub fn new(label: impl Into<String>, mode: Mode, mode_width: u32) -> Self {
        Reference {
            label: label.into(),
            mode,
            mode_width,
            hi: None,
            lo: None,
            extra_tags: Vec::new(),
        }
    }

    pub fn with_range(mut self, hi: u32, lo: u32) -> Self {
        self.hi = Some(hi);
        self.lo = Some(lo);
        self
    }

    /// Width of the field as currently sliced, or the tagged mode width if
    /// no range has been set yet.
    pub fn width(&self) -> u32 {
        match (self.hi, self.lo) {
            (Some(hi), Some(lo)) => hi - lo + 1,
            _ => self.mode_width,
        }
    }
}

/// A bit-field that is either fully resolved or still symbolic.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Concrete(Concrete),
    Symbolic(Reference),
}

impl Field {
    pub fn width(&self) -> u32 {
        match self {
            Field::Concrete(c) => c.width,
            Field::Symbolic(r) => r.width(),
        }
    }
}

/// Populate a bare reference (one written without `[hi:lo]`) with the
/// instruction format's default range for the slot it occupies. If the
/// reference already carries an explicit range, only check its width
/// matches what this slot requires; the range itself is left untouched.
pub fn apply_default_slice(
    reference: &mut Reference,
    default_hi: u32,
    default_lo: u32,
) -> Result<(), ReferenceError> {
    let required_width = default_hi - default_lo + 1;
    match (reference.hi, reference.lo) {
        (Some(_), Some(_)) => {
            let actual = reference.width();
            if actual != required_width {
                return Err(ReferenceError::WidthMismatch {
                    label: reference.label.clone(),
                    expected: required_width,
                    actual,
                });
            }
            Ok(())
        }
        _ => {
            reference.hi = Some(default_hi);
            reference.lo = Some(default_lo);
            Ok(())
        }
    }
}

/// Extract bits `[hi:lo]` from `field`, whether concrete or symbolic. For a
/// symbolic field, `hi`/`lo` are a request local to the field's own already
/// populated range: the outer range must have been established already, by
/// an explicit source-level slice or by [`apply_default_slice`].
pub fn slice_or_reference(field: &Field, hi: u32, lo: u32) -> Result<Field, ReferenceError> {
    if hi < lo {
        return Err(ReferenceError::ReversedSlice { hi, lo });
    }
    match field {
        Field::Concrete(c) => Ok(Field::Concrete(bits::slice(*c, hi, lo)?)),
        Field::Symbolic(r) => {
            let outer_lo = r.lo.expect("reference must be default-sliced before slicing");
            let outer_hi = r.hi.expect("reference must be default-sliced before slicing");
            let new_lo = outer_lo + lo;
            let new_hi = new_lo + (hi - lo);
            if new_hi > outer_hi {
                return Err(ReferenceError::OutOfOuterBounds {
                    label: r.label.clone(),
                    hi,
                    lo,
                    outer_hi,
                    outer_lo,
                });
            }
            let mut result = r.clone();
            result.hi = Some(new_hi);
            result.lo = Some(new_lo);
            Ok(Field::Symbolic(result))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_slice_populates_bare_reference() {
        let mut r = Reference::new("main", Mode::Off, 20);
        apply_default_slice(&mut r, 20, 1).unwrap();
        assert_eq!(r.hi, Some(20));
        assert_eq!(r.lo, Some(1));
    }

    #[test]
    fn default_slice_checks_width_of_explicit_range() {
        let mut r = Reference::new("main", Mode::Off, 20).with_range(19, 12);
        assert!(apply_default_slice(&mut r, 19, 12).is_ok());

        let mut bad = Reference::new("main", Mode::Off, 20).with_range(19, 12);
        assert!(apply_default_slice(&mut bad, 11, 0).is_err());
    }

    #[test]
    fn slice_or_reference_retags_width() {
        let r = Reference::new("main", Mode::Off, 20).with_range(20, 1);
        let field = Field::Symbolic(r);
        let sliced = slice_or_reference(&field, 3, 0).unwrap();
        match sliced {
            Field::Symbolic(r) => {
                assert_eq!(r.hi, Some(4));
                assert_eq!(r.lo, Some(1));
                assert_eq!(r.width(), 4);
            }
            _ => panic!("expected symbolic field"),
        }
    }

    #[test]
    fn slice_or_reference_rejects_out_of_bounds() {
        let r = Reference::new("main", Mode::Off, 8).with_range(11, 4);
        let field = Field::Symbolic(r);
        assert!(slice_or_reference(&field, 10, 0).is_err());
    }

    #[test]
    fn slice_or_reference_on_concrete_matches_plain_slice() {
        let c = bits::u(0b1011_0110, 8).unwrap();
        let field = Field::Concrete(c);
        let sliced = slice_or_reference(&field, 7, 4).unwrap();
        assert_eq!(sliced, Field::Concrete(bits::slice(c, 7, 4).unwrap()));
    }
}
