//! Random port selection.

use std::ops::RangeInclusive;
use std::sync::{LazyLock, Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Process-wide generator, seeded once from OS entropy.
static PORT_RNG: LazyLock<Mutex<StdRng>> = LazyLock::new(|| Mutex::new(StdRng::from_entropy()));

/// Pick a pseudo-random port from `range`.
///
/// The range must be non-empty; [`StubConfig::validate`](crate::StubConfig::validate)
/// guarantees this before any port is picked.
pub(crate) fn random_port(range: &RangeInclusive<u16>) -> u16 {
    let mut rng = PORT_RNG.lock().unwrap_or_else(PoisonError::into_inner);
    rng.gen_range(range.clone())
}

/// An endless sequence of random candidate ports.
pub(crate) fn candidate_ports(range: RangeInclusive<u16>) -> impl Iterator<Item = u16> {
    std::iter::repeat_with(move || random_port(&range))
}
