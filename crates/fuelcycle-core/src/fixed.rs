use fixed::types::I32F32;

/// Q32.32 fixed-point: 32 integer bits, 32 fractional bits.
pub type Fixed64 = I32F32;

/// Resource quantities (kg or the commodity's own unit).
pub type Quantity = Fixed64;

/// Ticks are the atomic unit of simulation time.
pub type Ticks = u64;

/// Tolerance for every quantity comparison in the simulation: 1e-6 kg.
///
/// `4295 / 2^32` is the closest Q32.32 value to 1e-6.
pub const EPSILON: Quantity = Fixed64::from_bits(4295);

/// Convert an f64 to Fixed64. Use only for initialization, never in sim loop.
#[inline]
pub fn f64_to_fixed64(v: f64) -> Fixed64 {
    Fixed64::from_num(v)
}

/// Convert Fixed64 to f64. Use only for display, never in sim loop.
#[inline]
pub fn fixed64_to_f64(v: Fixed64) -> f64 {
    v.to_num::<f64>()
}

/// `a` is larger than `b` by more than [`EPSILON`].
#[inline]
pub fn exceeds(a: Quantity, b: Quantity) -> bool {
    a > b.saturating_add(EPSILON)
}

/// `a` and `b` differ by no more than [`EPSILON`].
#[inline]
pub fn approx_eq(a: Quantity, b: Quantity) -> bool {
    !exceeds(a, b) && !exceeds(b, a)
}

/// The quantity is meaningfully positive (greater than [`EPSILON`]).
#[inline]
pub fn is_positive(q: Quantity) -> bool {
    exceeds(q, Fixed64::ZERO)
}
