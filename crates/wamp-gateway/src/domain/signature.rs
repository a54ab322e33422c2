//! Call signatures.
//!
//! A signature disambiguates concurrent forwarded calls that share a socket
//! and a procedure. It is drawn at random and checked against the keys
//! already in flight for that pair, so two live calls never share one.

use rand::Rng;
use wamp_types::Signature;

/// Upper bound on draws before giving up.
pub const MAX_GENERATE_ATTEMPTS: usize = 10_000;

/// Draw a signature for which `is_taken` returns false.
///
/// Returns `None` after [`MAX_GENERATE_ATTEMPTS`] collisions.
pub fn generate_signature<F>(is_taken: F) -> Option<Signature>
where
    F: Fn(&Signature) -> bool,
{
    let mut rng = rand::thread_rng();
    (0..MAX_GENERATE_ATTEMPTS)
        .map(|_| Signature::new(format!("{:016x}", rng.gen::<u64>())))
        .find(|candidate| !is_taken(candidate))
}
