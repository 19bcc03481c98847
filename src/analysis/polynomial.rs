// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use num_bigint::BigUint;
use ruint::aliases::U256;

// ============================================================================
// Comparison Error
// ============================================================================

/// Raised when the signed difference of two polynomials carries both
/// positive and negative components, so neither equality nor an
/// ordering can be decided without a solver.  Callers silence this to
/// "not equal".
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct CmpError;

impl fmt::Debug for CmpError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "polynomial comparison undecidable")
    }
}

impl fmt::Display for CmpError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        // Just reuse debug formatting.
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for CmpError {}

// ============================================================================
// Polynomial
// ============================================================================

/// A linear combination of opaque symbolic terms plus an integer
/// constant: `Σ cᵢ·tᵢ + k`.  Terms are arbitrary-width tags (wide
/// enough to hold an encoded SHA3 pre-image descriptor), coefficients
/// are signed machine integers, and the constant is a 256-bit word
/// interpreted as two's-complement, i.e. normalised to the range
/// `[-2²⁵⁵, 2²⁵⁵)`.
#[derive(Clone, Debug, Default)]
pub struct Polynomial {
    terms: HashMap<BigUint, i64>,
    constant: U256,
}

impl Polynomial {
    pub fn new() -> Self {
        Self::default()
    }

    /// A polynomial holding just a constant.
    pub fn from_constant(constant: U256) -> Self {
        Polynomial { terms: HashMap::new(), constant }
    }

    /// A polynomial holding a single opaque term.
    pub fn from_term(term: BigUint) -> Self {
        let mut terms = HashMap::new();
        terms.insert(term, 1);
        Polynomial { terms, constant: U256::ZERO }
    }

    pub fn constant(&self) -> U256 {
        self.constant
    }

    /// Add another polynomial into this one, coefficient-wise.
    /// Wrapping addition of the constants implements the signed
    /// normalisation at the `2²⁵⁵` boundary.
    pub fn add(&mut self, other: &Polynomial) {
        for (term, n) in &other.terms {
            *self.terms.entry(term.clone()).or_insert(0) += n;
        }
        self.terms.retain(|_, n| *n != 0);
        self.constant = self.constant.wrapping_add(other.constant);
    }

    /// Subtract another polynomial from this one.
    pub fn sub(&mut self, other: &Polynomial) {
        for (term, n) in &other.terms {
            *self.terms.entry(term.clone()).or_insert(0) -= n;
        }
        self.terms.retain(|_, n| *n != 0);
        self.constant = self.constant.wrapping_sub(other.constant);
    }

    /// Compare two polynomials by inspecting the sign structure of
    /// their difference.  All components zero means equal; all
    /// residual components of one sign gives an ordering; a mix of
    /// signs is undecidable.
    pub fn compare(&self, other: &Polynomial) -> Result<Ordering, CmpError> {
        let mut diff = self.clone();
        diff.sub(other);
        let mut pos = 0;
        let mut neg = 0;
        for n in diff.terms.values() {
            if *n > 0 {
                pos += 1;
            } else if *n < 0 {
                neg += 1;
            }
        }
        match signum(diff.constant) {
            Ordering::Greater => pos += 1,
            Ordering::Less => neg += 1,
            Ordering::Equal => {}
        }
        if pos > 0 && neg == 0 {
            Ok(Ordering::Greater)
        } else if neg > 0 && pos == 0 {
            Ok(Ordering::Less)
        } else if pos == 0 && neg == 0 {
            Ok(Ordering::Equal)
        } else {
            Err(CmpError)
        }
    }

    /// Structural equality after subtraction.  Sound when it answers
    /// `true`; callers map the undecidable case to `false`.
    pub fn eq(&self, other: &Polynomial) -> Result<bool, CmpError> {
        Ok(self.compare(other)? == Ordering::Equal)
    }
}

/// Sign of a two's-complement 256-bit constant.
fn signum(constant: U256) -> Ordering {
    if constant == U256::ZERO {
        Ordering::Equal
    } else if constant.bit(255) {
        Ordering::Less
    } else {
        Ordering::Greater
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn term(n: u64) -> BigUint {
        BigUint::from(n)
    }

    #[test]
    fn test_eq_constants() {
        let a = Polynomial::from_constant(U256::from(5));
        let b = Polynomial::from_constant(U256::from(5));
        let c = Polynomial::from_constant(U256::from(7));
        assert_eq!(a.eq(&b), Ok(true));
        assert_eq!(a.eq(&c), Ok(false));
        assert_eq!(c.eq(&a), Ok(false));
    }

    #[test]
    fn test_eq_terms() {
        let mut a = Polynomial::from_term(term(0x33));
        a.add(&Polynomial::from_constant(U256::from(0x20)));
        let mut b = Polynomial::from_term(term(0x33));
        b.add(&Polynomial::from_constant(U256::from(0x20)));
        assert_eq!(a.eq(&b), Ok(true));
        // Same term, different constant
        let c = Polynomial::from_term(term(0x33));
        assert_eq!(a.eq(&c), Ok(false));
    }

    #[test]
    fn test_undecidable() {
        // x + 1 versus y: the difference holds a positive and a
        // negative component.
        let mut a = Polynomial::from_term(term(1));
        a.add(&Polynomial::from_constant(U256::from(1)));
        let b = Polynomial::from_term(term(2));
        assert_eq!(a.eq(&b), Err(CmpError));
        assert_eq!(a.eq(&b).unwrap_or(false), false);
    }

    #[test]
    fn test_add_sub_roundtrip() {
        let mut a = Polynomial::from_term(term(9));
        a.add(&Polynomial::from_constant(U256::from(100)));
        let b = a.clone();
        a.add(&b);
        a.sub(&b);
        assert_eq!(a.eq(&b), Ok(true));
    }

    #[test]
    fn test_signed_normalisation() {
        // 0 - 1 wraps to the all-ones word, which reads as -1.
        let mut a = Polynomial::from_constant(U256::ZERO);
        a.sub(&Polynomial::from_constant(U256::from(1)));
        assert_eq!(a.constant(), U256::MAX);
        assert_eq!(signum(a.constant()), Ordering::Less);
        // ... and adding 1 brings it back to zero.
        a.add(&Polynomial::from_constant(U256::from(1)));
        assert_eq!(a.constant(), U256::ZERO);
    }

    #[test]
    fn test_ordering() {
        let a = Polynomial::from_constant(U256::from(3));
        let b = Polynomial::from_constant(U256::from(5));
        assert_eq!(a.compare(&b), Ok(Ordering::Less));
        assert_eq!(b.compare(&a), Ok(Ordering::Greater));
    }
}
