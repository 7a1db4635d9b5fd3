//! `DomInterval` wraps an `InfInterval` with an `exact` bit (spec §3.4),
//! and `Domain` is a per-dimension vector of `DomInterval`s. Per the open
//! question in spec §9's Design Notes, `InfInterval` and `DomInterval` are
//! unified here: there is exactly one bounds-arithmetic implementation
//! (`interval.rs`), and `DomInterval` is a thin wrapper that ANDs `exact`
//! through every operator it delegates.

use crate::interval::{self, Bound, InfInterval};

/// An `InfInterval` plus whether the bound is known exact. `exact = false`
/// means the bound was derived by an unsolved equation (e.g. the fallback
/// branch of interval `mod`, or a divisor interval straddling zero) and may
/// over-approximate the true range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomInterval {
    pub bounds: InfInterval,
    pub exact: bool,
}

impl DomInterval {
    pub fn new(bounds: InfInterval, exact: bool) -> Self {
        DomInterval { bounds, exact }
    }

    pub fn single(v: i64) -> Self {
        DomInterval::new(InfInterval::single(v), true)
    }

    pub fn everything() -> Self {
        DomInterval::new(InfInterval::everything(), false)
    }

    pub fn is_empty(&self) -> bool {
        self.bounds.is_empty()
    }
}

impl std::ops::Add for DomInterval {
    type Output = DomInterval;
    fn add(self, rhs: DomInterval) -> DomInterval {
        DomInterval::new(self.bounds + rhs.bounds, self.exact && rhs.exact)
    }
}

impl std::ops::Sub for DomInterval {
    type Output = DomInterval;
    fn sub(self, rhs: DomInterval) -> DomInterval {
        DomInterval::new(self.bounds - rhs.bounds, self.exact && rhs.exact)
    }
}

impl std::ops::Neg for DomInterval {
    type Output = DomInterval;
    fn neg(self) -> DomInterval {
        DomInterval::new(-self.bounds, self.exact)
    }
}

pub fn mul_scalar(i: DomInterval, k: i64) -> DomInterval {
    DomInterval::new(interval::mul_scalar(i.bounds, k), i.exact)
}

pub fn div_scalar(i: DomInterval, k: i64) -> DomInterval {
    DomInterval::new(interval::div_scalar(i.bounds, k), i.exact)
}

pub fn zoom(i: DomInterval, b: i64) -> DomInterval {
    DomInterval::new(interval::zoom(i.bounds, b), i.exact)
}

pub fn decimate(i: DomInterval, b: i64) -> DomInterval {
    // `decimate` is inherently an over-approximation of the "maximal
    // covered sub-interval" relation, not an equality, so its result is
    // never more exact than its input even when the input was exact.
    DomInterval::new(interval::decimate(i.bounds, b), false)
}

pub fn unzoom(i: DomInterval, b: i64) -> DomInterval {
    DomInterval::new(interval::unzoom(i.bounds, b), false)
}

pub fn modulus(dividend: DomInterval, divisor: DomInterval) -> DomInterval {
    let result = interval::modulus(dividend.bounds, divisor.bounds);
    let passthrough = result == dividend.bounds;
    DomInterval::new(result, dividend.exact && divisor.exact && passthrough)
}

pub fn min(a: DomInterval, b: DomInterval) -> DomInterval {
    DomInterval::new(interval::min_interval(a.bounds, b.bounds), a.exact && b.exact)
}

pub fn max(a: DomInterval, b: DomInterval) -> DomInterval {
    DomInterval::new(interval::max_interval(a.bounds, b.bounds), a.exact && b.exact)
}

pub fn intersection(a: DomInterval, b: DomInterval) -> DomInterval {
    DomInterval::new(interval::intersection(a.bounds, b.bounds), a.exact && b.exact)
}

pub fn union(a: DomInterval, b: DomInterval) -> DomInterval {
    DomInterval::new(interval::union(a.bounds, b.bounds), a.exact && b.exact)
}

/// A function's domain along every dimension, in dimension-index order.
/// Every `Function` carries two (spec §3.4): `Valid`, where the callee
/// guarantees a meaningful value, and `Computable`, where it can be
/// evaluated at all.
#[derive(Debug, Clone, PartialEq)]
pub struct Domain(pub Vec<DomInterval>);

impl Domain {
    pub fn new(dims: Vec<DomInterval>) -> Self {
        Domain(dims)
    }

    pub fn ndims(&self) -> usize {
        self.0.len()
    }

    /// Intersects this domain with `other` dimension-wise, the operation a
    /// kernel that indexes a callee at `x-1 .. x+1` uses to narrow its own
    /// domain by the shifted callee domain (spec §3.4).
    pub fn intersect(&self, other: &Domain) -> Domain {
        assert_eq!(self.ndims(), other.ndims(), "domain dimensionality mismatch");
        Domain(
            self.0
                .iter()
                .zip(other.0.iter())
                .map(|(a, b)| intersection(*a, *b))
                .collect(),
        )
    }

    /// Shifts dimension `dim` by a constant offset, used to build the
    /// "shifted callee domain" mentioned in spec §3.4 before intersecting.
    pub fn shift_dim(&self, dim: usize, offset: i64) -> Domain {
        let mut dims = self.0.clone();
        dims[dim] = dims[dim] + DomInterval::single(offset);
        Domain(dims)
    }

    /// Invariant 6: the Valid domain of any Function is a subset of its
    /// Computable domain.
    pub fn is_subset_of(&self, other: &Domain) -> bool {
        assert_eq!(self.ndims(), other.ndims());
        self.0.iter().zip(other.0.iter()).all(|(a, b)| {
            b.bounds.min <= a.bounds.min && a.bounds.max <= b.bounds.max
        })
    }
}

fn _unused_bound_hint(_: Bound) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interval::InfInterval;

    fn fin(lo: i64, hi: i64) -> DomInterval {
        DomInterval::new(InfInterval::new(Bound::Finite(lo), Bound::Finite(hi)), true)
    }

    #[test]
    fn valid_subset_of_computable() {
        let valid = Domain::new(vec![fin(1, 8)]);
        let computable = Domain::new(vec![fin(0, 10)]);
        assert!(valid.is_subset_of(&computable));
        assert!(!computable.is_subset_of(&valid));
    }

    #[test]
    fn exact_bit_propagates_through_arithmetic() {
        let exact = fin(1, 8);
        let inexact = DomInterval::new(InfInterval::new(Bound::Finite(0), Bound::Finite(5)), false);
        assert!((exact + exact).exact);
        assert!(!(exact + inexact).exact);
    }

    #[test]
    fn domain_shift_and_intersect() {
        let d = Domain::new(vec![fin(3, 5)]);
        let shifted = d.shift_dim(0, -1);
        let narrowed = d.intersect(&shifted);
        assert_eq!(narrowed.0[0].bounds, InfInterval::new(Bound::Finite(3), Bound::Finite(4)));
    }
}
